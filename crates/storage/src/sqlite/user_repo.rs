use async_trait::async_trait;
use gxp_core::model::{EnterpriseId, InvitationPermissionSet, UserId, UserProfile, UserRole};
use sqlx::Row;
use sqlx::sqlite::SqliteRow;

use super::SqliteRepository;
use super::mapping::{db, from_json, ser, to_json};
use crate::repository::{StorageError, UserRepository};

const USER_COLUMNS: &str = r"
    uid, email, display_name, role, enterprise_id, department, job_title, permissions,
    is_active, created_by, created_at
";

fn user_from_row(row: &SqliteRow) -> Result<UserProfile, StorageError> {
    let role: UserRole = row
        .try_get::<String, _>("role")
        .map_err(ser)?
        .parse()
        .map_err(ser)?;
    let permissions: Option<InvitationPermissionSet> = row
        .try_get::<Option<String>, _>("permissions")
        .map_err(ser)?
        .map(|raw| from_json("permissions", &raw))
        .transpose()?;

    Ok(UserProfile {
        uid: UserId::new(row.try_get::<String, _>("uid").map_err(ser)?),
        email: row.try_get("email").map_err(ser)?,
        display_name: row.try_get("display_name").map_err(ser)?,
        role,
        enterprise_id: row
            .try_get::<Option<String>, _>("enterprise_id")
            .map_err(ser)?
            .map(EnterpriseId::new),
        department: row.try_get("department").map_err(ser)?,
        job_title: row.try_get("job_title").map_err(ser)?,
        permissions,
        is_active: row.try_get("is_active").map_err(ser)?,
        created_by: row
            .try_get::<Option<String>, _>("created_by")
            .map_err(ser)?
            .map(UserId::new),
        created_at: row.try_get("created_at").map_err(ser)?,
    })
}

const ON_UID_CONFLICT_UPDATE: &str = r"
    ON CONFLICT(uid) DO UPDATE SET
        email = excluded.email,
        display_name = excluded.display_name,
        role = excluded.role,
        enterprise_id = excluded.enterprise_id,
        department = excluded.department,
        job_title = excluded.job_title,
        permissions = excluded.permissions,
        is_active = excluded.is_active
";

impl SqliteRepository {
    async fn write_user(&self, user: &UserProfile, on_conflict: &str) -> Result<(), StorageError> {
        let permissions = user.permissions.as_ref().map(to_json).transpose()?;

        sqlx::query(&format!(
            r"
            INSERT INTO users ({USER_COLUMNS})
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
            {on_conflict}
            "
        ))
        .bind(user.uid.as_str())
        .bind(&user.email)
        .bind(&user.display_name)
        .bind(user.role.as_str())
        .bind(user.enterprise_id.as_ref().map(|e| e.as_str()))
        .bind(&user.department)
        .bind(&user.job_title)
        .bind(permissions)
        .bind(user.is_active)
        .bind(user.created_by.as_ref().map(|u| u.as_str()))
        .bind(user.created_at)
        .execute(&self.pool)
        .await
        .map_err(db)?;
        Ok(())
    }
}

#[async_trait]
impl UserRepository for SqliteRepository {
    async fn upsert_user(&self, user: &UserProfile) -> Result<(), StorageError> {
        self.write_user(user, ON_UID_CONFLICT_UPDATE).await
    }

    async fn insert_user(&self, user: &UserProfile) -> Result<(), StorageError> {
        // both the uid key and the email index surface as unique violations
        self.write_user(user, "").await
    }

    async fn get_user(&self, uid: &UserId) -> Result<Option<UserProfile>, StorageError> {
        let row = sqlx::query(&format!("SELECT {USER_COLUMNS} FROM users WHERE uid = ?1"))
            .bind(uid.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(db)?;

        row.as_ref().map(user_from_row).transpose()
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<UserProfile>, StorageError> {
        // the email column is declared COLLATE NOCASE
        let row = sqlx::query(&format!("SELECT {USER_COLUMNS} FROM users WHERE email = ?1"))
            .bind(email.trim())
            .fetch_optional(&self.pool)
            .await
            .map_err(db)?;

        row.as_ref().map(user_from_row).transpose()
    }

    async fn list_users(
        &self,
        enterprise: &EnterpriseId,
    ) -> Result<Vec<UserProfile>, StorageError> {
        let rows = sqlx::query(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE enterprise_id = ?1 ORDER BY display_name ASC"
        ))
        .bind(enterprise.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(db)?;

        rows.iter().map(user_from_row).collect()
    }

    async fn delete_user(&self, uid: &UserId) -> Result<(), StorageError> {
        let res = sqlx::query("DELETE FROM users WHERE uid = ?1")
            .bind(uid.as_str())
            .execute(&self.pool)
            .await
            .map_err(db)?;
        if res.rows_affected() == 0 {
            return Err(StorageError::NotFound);
        }
        Ok(())
    }
}
