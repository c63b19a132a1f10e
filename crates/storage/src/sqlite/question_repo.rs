use async_trait::async_trait;
use gxp_core::model::{AssessmentId, Question, QuestionId, QuestionSet};
use sqlx::Row;
use sqlx::sqlite::SqliteRow;

use super::SqliteRepository;
use super::mapping::{db, ser, u32_from_i64};
use crate::repository::{QuestionRepository, StorageError};

fn question_from_row(row: &SqliteRow) -> Result<Question, StorageError> {
    let ordinal = u32_from_i64("ordinal", row.try_get::<i64, _>("ordinal").map_err(ser)?)?;
    Question::new(
        QuestionId::new(row.try_get::<String, _>("id").map_err(ser)?),
        row.try_get::<String, _>("text").map_err(ser)?,
        ordinal,
    )
    .map_err(ser)
}

#[async_trait]
impl QuestionRepository for SqliteRepository {
    async fn save_questions(
        &self,
        assessment_id: &AssessmentId,
        questions: &QuestionSet,
    ) -> Result<(), StorageError> {
        let mut tx = self.pool.begin().await.map_err(db)?;

        sqlx::query("DELETE FROM questions WHERE assessment_id = ?1")
            .bind(assessment_id.as_str())
            .execute(&mut *tx)
            .await
            .map_err(db)?;

        for question in questions.iter() {
            sqlx::query(
                r"
                INSERT INTO questions (assessment_id, id, text, ordinal)
                VALUES (?1, ?2, ?3, ?4)
                ",
            )
            .bind(assessment_id.as_str())
            .bind(question.id().as_str())
            .bind(question.text())
            .bind(i64::from(question.ordinal()))
            .execute(&mut *tx)
            .await
            .map_err(db)?;
        }

        tx.commit().await.map_err(db)?;
        Ok(())
    }

    async fn get_questions(
        &self,
        assessment_id: &AssessmentId,
    ) -> Result<Option<Vec<Question>>, StorageError> {
        let rows = sqlx::query(
            r"
            SELECT id, text, ordinal
            FROM questions
            WHERE assessment_id = ?1
            ORDER BY ordinal ASC
            ",
        )
        .bind(assessment_id.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(db)?;

        if rows.is_empty() {
            return Ok(None);
        }
        rows.iter().map(question_from_row).collect::<Result<Vec<_>, _>>().map(Some)
    }
}
