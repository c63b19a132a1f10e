use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

use crate::model::ids::{EnterpriseId, QuestionId, ReportId, UserId};
use crate::model::responses::{AnswerCounts, ResponseMap};
use crate::model::snapshot::AssessmentRef;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ReportError {
    #[error("report has no responses")]
    Empty,

    #[error("too many responses for a single report: {len}")]
    TooManyResponses { len: usize },

    #[error("answered count ({answered}) exceeds total questions ({total})")]
    CountMismatch { answered: u32, total: u32 },
}

/// Who completed an assessment, denormalized onto the report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportAuthor {
    pub user_id: UserId,
    pub email: String,
    pub name: String,
    pub department: String,
    pub job_title: String,
    pub enterprise_id: Option<EnterpriseId>,
    pub enterprise_name: String,
}

impl ReportAuthor {
    #[must_use]
    pub fn new(user_id: UserId, email: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            user_id,
            email: email.into(),
            name: name.into(),
            department: String::new(),
            job_title: String::new(),
            enterprise_id: None,
            enterprise_name: String::new(),
        }
    }
}

/// Final result of a completed assessment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComplianceReport {
    pub id: Option<ReportId>,
    pub author: ReportAuthor,
    pub assessment: AssessmentRef,
    total_questions: u32,
    counts: AnswerCounts,
    pub completed_at: DateTime<Utc>,
    /// Question id to string-encoded answer state.
    pub responses: BTreeMap<QuestionId, String>,
    pub question_texts: BTreeMap<QuestionId, String>,
}

impl ComplianceReport {
    /// Build a report from the responses of a finished questionnaire.
    ///
    /// # Errors
    ///
    /// Returns `ReportError::Empty` when nothing was answered, and
    /// `ReportError::TooManyResponses` if the question count cannot fit in `u32`.
    pub fn from_responses(
        author: ReportAuthor,
        assessment: AssessmentRef,
        responses: &ResponseMap,
        question_texts: BTreeMap<QuestionId, String>,
        total_questions: usize,
        completed_at: DateTime<Utc>,
    ) -> Result<Self, ReportError> {
        if responses.is_empty() {
            return Err(ReportError::Empty);
        }
        let total = u32::try_from(total_questions)
            .map_err(|_| ReportError::TooManyResponses { len: total_questions })?;

        Self::from_persisted(
            None,
            author,
            assessment,
            total,
            responses.counts(),
            completed_at,
            responses.encode(),
            question_texts,
        )
    }

    /// Rehydrate a report from persisted storage.
    ///
    /// # Errors
    ///
    /// Returns `ReportError::CountMismatch` if more answers are recorded than questions exist.
    #[allow(clippy::too_many_arguments)]
    pub fn from_persisted(
        id: Option<ReportId>,
        author: ReportAuthor,
        assessment: AssessmentRef,
        total_questions: u32,
        counts: AnswerCounts,
        completed_at: DateTime<Utc>,
        responses: BTreeMap<QuestionId, String>,
        question_texts: BTreeMap<QuestionId, String>,
    ) -> Result<Self, ReportError> {
        let answered = counts.total();
        if answered > total_questions {
            return Err(ReportError::CountMismatch {
                answered,
                total: total_questions,
            });
        }
        Ok(Self {
            id,
            author,
            assessment,
            total_questions,
            counts,
            completed_at,
            responses,
            question_texts,
        })
    }

    #[must_use]
    pub fn with_id(mut self, id: ReportId) -> Self {
        self.id = Some(id);
        self
    }

    #[must_use]
    pub fn total_questions(&self) -> u32 {
        self.total_questions
    }

    #[must_use]
    pub fn counts(&self) -> AnswerCounts {
        self.counts
    }

    /// Compliant share of applicable answers as a whole percentage, truncated.
    ///
    /// Not-applicable answers are excluded; zero when nothing applicable was answered.
    #[must_use]
    pub fn compliance_percentage(&self) -> u32 {
        let applicable = self.counts.compliant + self.counts.non_compliant;
        if applicable == 0 {
            return 0;
        }
        self.counts.compliant * 100 / applicable
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::answer::AnswerState;
    use crate::model::ids::AssessmentId;
    use crate::model::snapshot::AssessmentKind;
    use crate::time::fixed_now;

    fn assessment() -> AssessmentRef {
        AssessmentRef::new(AssessmentKind::Custom, AssessmentId::new("c1"), "Weekly walk").unwrap()
    }

    fn author() -> ReportAuthor {
        ReportAuthor::new(UserId::new("u1"), "qa@acme.test", "QA Lead")
    }

    fn responses(states: &[AnswerState]) -> ResponseMap {
        states
            .iter()
            .enumerate()
            .map(|(i, s)| (QuestionId::new(format!("q{i}")), *s))
            .collect()
    }

    #[test]
    fn report_counts_states() {
        let map = responses(&[
            AnswerState::Compliant,
            AnswerState::Compliant,
            AnswerState::NonCompliant,
            AnswerState::NotApplicable,
        ]);
        let report =
            ComplianceReport::from_responses(author(), assessment(), &map, BTreeMap::new(), 4, fixed_now())
                .unwrap();

        assert_eq!(report.total_questions(), 4);
        assert_eq!(report.counts().compliant, 2);
        assert_eq!(report.counts().non_compliant, 1);
        assert_eq!(report.counts().not_applicable, 1);
        assert_eq!(report.responses.len(), 4);
    }

    #[test]
    fn compliance_excludes_not_applicable_and_truncates() {
        let map = responses(&[
            AnswerState::Compliant,
            AnswerState::Compliant,
            AnswerState::NonCompliant,
            AnswerState::NotApplicable,
        ]);
        let report =
            ComplianceReport::from_responses(author(), assessment(), &map, BTreeMap::new(), 4, fixed_now())
                .unwrap();
        assert_eq!(report.compliance_percentage(), 66);
    }

    #[test]
    fn compliance_is_zero_without_applicable_answers() {
        let map = responses(&[AnswerState::NotApplicable]);
        let report =
            ComplianceReport::from_responses(author(), assessment(), &map, BTreeMap::new(), 1, fixed_now())
                .unwrap();
        assert_eq!(report.compliance_percentage(), 0);
    }

    #[test]
    fn empty_responses_are_rejected() {
        let err = ComplianceReport::from_responses(
            author(),
            assessment(),
            &ResponseMap::new(),
            BTreeMap::new(),
            3,
            fixed_now(),
        )
        .unwrap_err();
        assert_eq!(err, ReportError::Empty);
    }

    #[test]
    fn persisted_counts_cannot_exceed_total() {
        let counts = AnswerCounts {
            compliant: 3,
            non_compliant: 0,
            not_applicable: 0,
        };
        let err = ComplianceReport::from_persisted(
            None,
            author(),
            assessment(),
            2,
            counts,
            fixed_now(),
            BTreeMap::new(),
            BTreeMap::new(),
        )
        .unwrap_err();
        assert_eq!(err, ReportError::CountMismatch { answered: 3, total: 2 });
    }
}
