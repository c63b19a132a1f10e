use std::collections::BTreeMap;
use std::sync::Arc;

use gxp_core::model::{
    AnswerCounts, AssessmentRef, ComplianceReport, EnterpriseId, QuestionId, ReportAuthor,
    ReportId, ResponseMap, UserId,
};
use storage::repository::ReportRepository;
use tracing::info;

use crate::Clock;
use crate::error::ReportServiceError;

/// Aggregate figures over a list of reports.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReportSummary {
    pub reports: usize,
    pub counts: AnswerCounts,
    /// Mean of the per-report compliance percentages, truncated.
    pub average_compliance: u32,
}

impl ReportSummary {
    #[must_use]
    pub fn from_reports(reports: &[ComplianceReport]) -> Self {
        if reports.is_empty() {
            return Self::default();
        }
        let mut counts = AnswerCounts::default();
        let mut compliance_sum = 0_u64;
        for report in reports {
            let c = report.counts();
            counts.compliant += c.compliant;
            counts.non_compliant += c.non_compliant;
            counts.not_applicable += c.not_applicable;
            compliance_sum += u64::from(report.compliance_percentage());
        }
        let len = u64::try_from(reports.len()).unwrap_or(u64::MAX);
        Self {
            reports: reports.len(),
            counts,
            average_compliance: u32::try_from(compliance_sum / len).unwrap_or(u32::MAX),
        }
    }
}

/// Builds, stores and lists compliance reports.
#[derive(Clone)]
pub struct ReportService {
    clock: Clock,
    reports: Arc<dyn ReportRepository>,
}

impl ReportService {
    #[must_use]
    pub fn new(clock: Clock, reports: Arc<dyn ReportRepository>) -> Self {
        Self { clock, reports }
    }

    /// Build a report from finished responses and store it.
    ///
    /// # Errors
    ///
    /// Returns `ReportServiceError::Report` if there are no responses or the
    /// counts do not fit, and `ReportServiceError::Storage` if persistence fails.
    pub async fn record(
        &self,
        author: ReportAuthor,
        assessment: AssessmentRef,
        responses: &ResponseMap,
        question_texts: BTreeMap<QuestionId, String>,
        total_questions: usize,
    ) -> Result<ComplianceReport, ReportServiceError> {
        let report = ComplianceReport::from_responses(
            author,
            assessment,
            responses,
            question_texts,
            total_questions,
            self.clock.now(),
        )?;
        let id = self.reports.insert_report(&report).await?;
        info!(report_id = %id, compliance = report.compliance_percentage(), "recorded compliance report");
        Ok(report.with_id(id))
    }

    /// # Errors
    ///
    /// Returns `ReportServiceError::NotFound` for an unknown id.
    pub async fn get(&self, id: &ReportId) -> Result<ComplianceReport, ReportServiceError> {
        self.reports
            .get_report(id)
            .await?
            .ok_or_else(|| ReportServiceError::NotFound(id.clone()))
    }

    /// Reports completed by `user`, most recent first.
    ///
    /// # Errors
    ///
    /// Returns `ReportServiceError::Storage` on backend failure.
    pub async fn history_for_user(
        &self,
        user: &UserId,
    ) -> Result<Vec<ComplianceReport>, ReportServiceError> {
        Ok(self.reports.list_reports_for_user(user).await?)
    }

    /// Reports filed under `enterprise`, most recent first.
    ///
    /// # Errors
    ///
    /// Returns `ReportServiceError::Storage` on backend failure.
    pub async fn history_for_enterprise(
        &self,
        enterprise: &EnterpriseId,
    ) -> Result<Vec<ComplianceReport>, ReportServiceError> {
        Ok(self.reports.list_reports_for_enterprise(enterprise).await?)
    }

    /// # Errors
    ///
    /// Returns `ReportServiceError::Storage` on backend failure.
    pub async fn enterprise_summary(
        &self,
        enterprise: &EnterpriseId,
    ) -> Result<ReportSummary, ReportServiceError> {
        let reports = self.history_for_enterprise(enterprise).await?;
        Ok(ReportSummary::from_reports(&reports))
    }
}
