use async_trait::async_trait;
use gxp_core::model::{
    AnswerCounts, ComplianceReport, EnterpriseId, ReportAuthor, ReportId, UserId,
};
use sqlx::Row;
use sqlx::sqlite::SqliteRow;
use uuid::Uuid;

use super::SqliteRepository;
use super::mapping::{assessment_from_row, db, from_json, ser, to_json, u32_from_i64};
use crate::repository::{ReportRepository, StorageError};

const REPORT_COLUMNS: &str = r"
    id, author_id, author_email, author_name, author_department, author_job_title,
    enterprise_id, enterprise_name, kind, assessment_id, assessment_name, facility_id,
    facility_name, total_questions, compliant, non_compliant, not_applicable, completed_at,
    responses, question_texts
";

fn count(row: &SqliteRow, field: &'static str) -> Result<u32, StorageError> {
    u32_from_i64(field, row.try_get::<i64, _>(field).map_err(ser)?)
}

fn report_from_row(row: &SqliteRow) -> Result<ComplianceReport, StorageError> {
    let author = ReportAuthor {
        user_id: UserId::new(row.try_get::<String, _>("author_id").map_err(ser)?),
        email: row.try_get("author_email").map_err(ser)?,
        name: row.try_get("author_name").map_err(ser)?,
        department: row.try_get("author_department").map_err(ser)?,
        job_title: row.try_get("author_job_title").map_err(ser)?,
        enterprise_id: row
            .try_get::<Option<String>, _>("enterprise_id")
            .map_err(ser)?
            .map(EnterpriseId::new),
        enterprise_name: row.try_get("enterprise_name").map_err(ser)?,
    };
    let counts = AnswerCounts {
        compliant: count(row, "compliant")?,
        non_compliant: count(row, "non_compliant")?,
        not_applicable: count(row, "not_applicable")?,
    };

    ComplianceReport::from_persisted(
        Some(ReportId::new(row.try_get::<String, _>("id").map_err(ser)?)),
        author,
        assessment_from_row(row)?,
        count(row, "total_questions")?,
        counts,
        row.try_get("completed_at").map_err(ser)?,
        from_json("responses", &row.try_get::<String, _>("responses").map_err(ser)?)?,
        from_json(
            "question_texts",
            &row.try_get::<String, _>("question_texts").map_err(ser)?,
        )?,
    )
    .map_err(ser)
}

impl SqliteRepository {
    async fn list_reports_where(
        &self,
        column: &'static str,
        value: &str,
    ) -> Result<Vec<ComplianceReport>, StorageError> {
        let rows = sqlx::query(&format!(
            "SELECT {REPORT_COLUMNS} FROM reports WHERE {column} = ?1 ORDER BY completed_at DESC"
        ))
        .bind(value)
        .fetch_all(&self.pool)
        .await
        .map_err(db)?;

        rows.iter().map(report_from_row).collect()
    }
}

#[async_trait]
impl ReportRepository for SqliteRepository {
    async fn insert_report(&self, report: &ComplianceReport) -> Result<ReportId, StorageError> {
        let id = report
            .id
            .clone()
            .unwrap_or_else(|| ReportId::new(Uuid::new_v4().to_string()));
        let author = &report.author;
        let assessment = &report.assessment;
        let counts = report.counts();

        sqlx::query(&format!(
            "INSERT INTO reports ({REPORT_COLUMNS}) VALUES \
             (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19, ?20)"
        ))
        .bind(id.as_str())
        .bind(author.user_id.as_str())
        .bind(&author.email)
        .bind(&author.name)
        .bind(&author.department)
        .bind(&author.job_title)
        .bind(author.enterprise_id.as_ref().map(|e| e.as_str()))
        .bind(&author.enterprise_name)
        .bind(assessment.kind.as_str())
        .bind(assessment.assessment_id.as_str())
        .bind(&assessment.assessment_name)
        .bind(assessment.facility_id.as_ref().map(|f| f.as_str()))
        .bind(&assessment.facility_name)
        .bind(i64::from(report.total_questions()))
        .bind(i64::from(counts.compliant))
        .bind(i64::from(counts.non_compliant))
        .bind(i64::from(counts.not_applicable))
        .bind(report.completed_at)
        .bind(to_json(&report.responses)?)
        .bind(to_json(&report.question_texts)?)
        .execute(&self.pool)
        .await
        .map_err(db)?;

        Ok(id)
    }

    async fn get_report(&self, id: &ReportId) -> Result<Option<ComplianceReport>, StorageError> {
        let row = sqlx::query(&format!("SELECT {REPORT_COLUMNS} FROM reports WHERE id = ?1"))
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(db)?;

        row.as_ref().map(report_from_row).transpose()
    }

    async fn list_reports_for_user(
        &self,
        user: &UserId,
    ) -> Result<Vec<ComplianceReport>, StorageError> {
        self.list_reports_where("author_id", user.as_str()).await
    }

    async fn list_reports_for_enterprise(
        &self,
        enterprise: &EnterpriseId,
    ) -> Result<Vec<ComplianceReport>, StorageError> {
        self.list_reports_where("enterprise_id", enterprise.as_str())
            .await
    }
}
