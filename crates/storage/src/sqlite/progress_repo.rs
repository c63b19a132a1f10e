use async_trait::async_trait;
use gxp_core::model::{AssessmentKind, AssessmentRef, ProgressSnapshot, SnapshotId, UserId};
use sqlx::Row;
use sqlx::sqlite::SqliteRow;
use uuid::Uuid;

use super::SqliteRepository;
use super::mapping::{assessment_from_row, count_i64, db, from_json, ser, to_json, usize_from_i64};
use crate::repository::{ProgressRepository, StorageError};

const SNAPSHOT_COLUMNS: &str = r"
    id, owner_id, kind, assessment_id, assessment_name, facility_id, facility_name,
    current_index, total_questions, responses, question_texts, created_at, updated_at
";

fn snapshot_from_row(row: &SqliteRow) -> Result<ProgressSnapshot, StorageError> {
    Ok(ProgressSnapshot {
        id: Some(SnapshotId::new(row.try_get::<String, _>("id").map_err(ser)?)),
        owner_id: Some(UserId::new(row.try_get::<String, _>("owner_id").map_err(ser)?)),
        assessment: assessment_from_row(row)?,
        current_index: usize_from_i64(
            "current_index",
            row.try_get::<i64, _>("current_index").map_err(ser)?,
        )?,
        total_questions: usize_from_i64(
            "total_questions",
            row.try_get::<i64, _>("total_questions").map_err(ser)?,
        )?,
        responses: from_json(
            "responses",
            &row.try_get::<String, _>("responses").map_err(ser)?,
        )?,
        question_texts: from_json(
            "question_texts",
            &row.try_get::<String, _>("question_texts").map_err(ser)?,
        )?,
        created_at: row.try_get("created_at").map_err(ser)?,
        updated_at: row.try_get("updated_at").map_err(ser)?,
    })
}

// Template snapshots are scoped to their facility; `IS` matches NULL to NULL.
const MATCH_ASSESSMENT: &str = r"
    owner_id = ?1 AND kind = ?2 AND assessment_id = ?3
    AND (kind = 'custom' OR facility_id IS ?4)
";

#[async_trait]
impl ProgressRepository for SqliteRepository {
    async fn save_snapshot(&self, snapshot: &ProgressSnapshot) -> Result<SnapshotId, StorageError> {
        let owner = snapshot
            .owner_id
            .as_ref()
            .ok_or_else(|| StorageError::PermissionDenied("snapshot has no owner".into()))?;
        let assessment = &snapshot.assessment;
        let facility_id = assessment.facility_id.as_ref().map(|f| f.as_str());
        let responses = to_json(&snapshot.responses)?;
        let question_texts = to_json(&snapshot.question_texts)?;
        let current_index = count_i64("current_index", snapshot.current_index)?;
        let total_questions = count_i64("total_questions", snapshot.total_questions)?;

        let mut tx = self.pool.begin().await.map_err(db)?;

        let target: Option<String> = match &snapshot.id {
            Some(id) => Some(id.as_str().to_owned()),
            None => sqlx::query_scalar(&format!(
                "SELECT id FROM progress_snapshots WHERE {MATCH_ASSESSMENT} \
                 ORDER BY updated_at DESC LIMIT 1"
            ))
            .bind(owner.as_str())
            .bind(assessment.kind.as_str())
            .bind(assessment.assessment_id.as_str())
            .bind(facility_id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(db)?,
        };

        let id = match target {
            Some(id) => {
                let stored_owner: String =
                    sqlx::query_scalar("SELECT owner_id FROM progress_snapshots WHERE id = ?1")
                        .bind(&id)
                        .fetch_optional(&mut *tx)
                        .await
                        .map_err(db)?
                        .ok_or(StorageError::NotFound)?;
                if stored_owner != owner.as_str() {
                    return Err(StorageError::PermissionDenied(format!(
                        "snapshot {id} belongs to another user"
                    )));
                }

                sqlx::query(
                    r"
                    UPDATE progress_snapshots SET
                        kind = ?2,
                        assessment_id = ?3,
                        assessment_name = ?4,
                        facility_id = ?5,
                        facility_name = ?6,
                        current_index = ?7,
                        total_questions = ?8,
                        responses = ?9,
                        question_texts = ?10,
                        updated_at = ?11
                    WHERE id = ?1
                    ",
                )
                .bind(&id)
                .bind(assessment.kind.as_str())
                .bind(assessment.assessment_id.as_str())
                .bind(&assessment.assessment_name)
                .bind(facility_id)
                .bind(&assessment.facility_name)
                .bind(current_index)
                .bind(total_questions)
                .bind(&responses)
                .bind(&question_texts)
                .bind(snapshot.updated_at)
                .execute(&mut *tx)
                .await
                .map_err(db)?;
                id
            }
            None => {
                let id = Uuid::new_v4().to_string();
                sqlx::query(&format!(
                    "INSERT INTO progress_snapshots ({SNAPSHOT_COLUMNS}) \
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)"
                ))
                .bind(&id)
                .bind(owner.as_str())
                .bind(assessment.kind.as_str())
                .bind(assessment.assessment_id.as_str())
                .bind(&assessment.assessment_name)
                .bind(facility_id)
                .bind(&assessment.facility_name)
                .bind(current_index)
                .bind(total_questions)
                .bind(&responses)
                .bind(&question_texts)
                .bind(snapshot.created_at)
                .bind(snapshot.updated_at)
                .execute(&mut *tx)
                .await
                .map_err(db)?;
                id
            }
        };

        tx.commit().await.map_err(db)?;
        Ok(SnapshotId::new(id))
    }

    async fn get_snapshot(&self, id: &SnapshotId) -> Result<Option<ProgressSnapshot>, StorageError> {
        let row = sqlx::query(&format!(
            "SELECT {SNAPSHOT_COLUMNS} FROM progress_snapshots WHERE id = ?1"
        ))
        .bind(id.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(db)?;

        row.as_ref().map(snapshot_from_row).transpose()
    }

    async fn find_snapshot(
        &self,
        owner: &UserId,
        assessment: &AssessmentRef,
    ) -> Result<Option<ProgressSnapshot>, StorageError> {
        let facility_id = match assessment.kind {
            AssessmentKind::Custom => None,
            AssessmentKind::Template => assessment.facility_id.as_ref().map(|f| f.as_str()),
        };
        let row = sqlx::query(&format!(
            "SELECT {SNAPSHOT_COLUMNS} FROM progress_snapshots WHERE {MATCH_ASSESSMENT} \
             ORDER BY updated_at DESC LIMIT 1"
        ))
        .bind(owner.as_str())
        .bind(assessment.kind.as_str())
        .bind(assessment.assessment_id.as_str())
        .bind(facility_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db)?;

        row.as_ref().map(snapshot_from_row).transpose()
    }

    async fn list_snapshots(&self, owner: &UserId) -> Result<Vec<ProgressSnapshot>, StorageError> {
        let rows = sqlx::query(&format!(
            "SELECT {SNAPSHOT_COLUMNS} FROM progress_snapshots WHERE owner_id = ?1 \
             ORDER BY updated_at DESC"
        ))
        .bind(owner.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(db)?;

        rows.iter().map(snapshot_from_row).collect()
    }

    async fn delete_snapshot(&self, id: &SnapshotId) -> Result<(), StorageError> {
        let res = sqlx::query("DELETE FROM progress_snapshots WHERE id = ?1")
            .bind(id.as_str())
            .execute(&self.pool)
            .await
            .map_err(db)?;
        if res.rows_affected() == 0 {
            return Err(StorageError::NotFound);
        }
        Ok(())
    }
}
