use async_trait::async_trait;
use chrono::{DateTime, Utc};
use gxp_core::model::{EnterpriseId, Invitation, InvitationId, UserId};
use sqlx::Row;
use sqlx::sqlite::SqliteRow;

use super::SqliteRepository;
use super::mapping::{db, from_json, ser, to_json};
use crate::repository::{InvitationRepository, StorageError};

const INVITATION_COLUMNS: &str = r"
    id, token, email, display_name, enterprise_id, department, job_title,
    permissions, invited_by, invited_at, expires_at, used_at
";

fn invitation_from_row(row: &SqliteRow) -> Result<Invitation, StorageError> {
    Ok(Invitation {
        id: InvitationId::new(row.try_get::<String, _>("id").map_err(ser)?),
        token: row.try_get("token").map_err(ser)?,
        email: row.try_get("email").map_err(ser)?,
        display_name: row.try_get("display_name").map_err(ser)?,
        enterprise_id: EnterpriseId::new(row.try_get::<String, _>("enterprise_id").map_err(ser)?),
        department: row.try_get("department").map_err(ser)?,
        job_title: row.try_get("job_title").map_err(ser)?,
        permissions: from_json(
            "permissions",
            &row.try_get::<String, _>("permissions").map_err(ser)?,
        )?,
        invited_by: UserId::new(row.try_get::<String, _>("invited_by").map_err(ser)?),
        invited_at: row.try_get("invited_at").map_err(ser)?,
        expires_at: row.try_get("expires_at").map_err(ser)?,
        used_at: row.try_get("used_at").map_err(ser)?,
    })
}

#[async_trait]
impl InvitationRepository for SqliteRepository {
    async fn insert_invitation(&self, invitation: &Invitation) -> Result<(), StorageError> {
        sqlx::query(&format!(
            "INSERT INTO invitations ({INVITATION_COLUMNS}) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)"
        ))
        .bind(invitation.id.as_str())
        .bind(&invitation.token)
        .bind(&invitation.email)
        .bind(&invitation.display_name)
        .bind(invitation.enterprise_id.as_str())
        .bind(&invitation.department)
        .bind(&invitation.job_title)
        .bind(to_json(&invitation.permissions)?)
        .bind(invitation.invited_by.as_str())
        .bind(invitation.invited_at)
        .bind(invitation.expires_at)
        .bind(invitation.used_at)
        .execute(&self.pool)
        .await
        .map_err(db)?;
        Ok(())
    }

    async fn get_invitation(&self, id: &InvitationId) -> Result<Option<Invitation>, StorageError> {
        let row = sqlx::query(&format!(
            "SELECT {INVITATION_COLUMNS} FROM invitations WHERE id = ?1"
        ))
        .bind(id.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(db)?;

        row.as_ref().map(invitation_from_row).transpose()
    }

    async fn get_invitation_by_token(
        &self,
        token: &str,
    ) -> Result<Option<Invitation>, StorageError> {
        let row = sqlx::query(&format!(
            "SELECT {INVITATION_COLUMNS} FROM invitations WHERE token = ?1 AND used_at IS NULL"
        ))
        .bind(token)
        .fetch_optional(&self.pool)
        .await
        .map_err(db)?;

        row.as_ref().map(invitation_from_row).transpose()
    }

    async fn mark_invitation_used(
        &self,
        id: &InvitationId,
        used_at: DateTime<Utc>,
    ) -> Result<(), StorageError> {
        let res = sqlx::query("UPDATE invitations SET used_at = ?2 WHERE id = ?1")
            .bind(id.as_str())
            .bind(used_at)
            .execute(&self.pool)
            .await
            .map_err(db)?;
        if res.rows_affected() == 0 {
            return Err(StorageError::NotFound);
        }
        Ok(())
    }

    async fn list_invitations(
        &self,
        enterprise: &EnterpriseId,
    ) -> Result<Vec<Invitation>, StorageError> {
        let rows = sqlx::query(&format!(
            "SELECT {INVITATION_COLUMNS} FROM invitations WHERE enterprise_id = ?1 \
             ORDER BY invited_at DESC"
        ))
        .bind(enterprise.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(db)?;

        rows.iter().map(invitation_from_row).collect()
    }

    async fn delete_invitation(&self, id: &InvitationId) -> Result<(), StorageError> {
        let res = sqlx::query("DELETE FROM invitations WHERE id = ?1")
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
