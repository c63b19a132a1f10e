use async_trait::async_trait;
use gxp_core::model::{Enterprise, EnterpriseId, UserId};
use sqlx::Row;
use sqlx::sqlite::SqliteRow;

use super::SqliteRepository;
use super::mapping::{db, ser, u32_from_i64};
use crate::repository::{EnterpriseRepository, SeatReservation, StorageError};

const ENTERPRISE_COLUMNS: &str = r"
    id, company_name, contact_email, contact_phone, admin_email, admin_name, admin_uid,
    address, industry, user_limit, current_user_count, is_active, created_by, created_at,
    expires_at
";

fn enterprise_from_row(row: &SqliteRow) -> Result<Enterprise, StorageError> {
    Ok(Enterprise {
        id: EnterpriseId::new(row.try_get::<String, _>("id").map_err(ser)?),
        company_name: row.try_get("company_name").map_err(ser)?,
        contact_email: row.try_get("contact_email").map_err(ser)?,
        contact_phone: row.try_get("contact_phone").map_err(ser)?,
        admin_email: row.try_get("admin_email").map_err(ser)?,
        admin_name: row.try_get("admin_name").map_err(ser)?,
        admin_uid: row
            .try_get::<Option<String>, _>("admin_uid")
            .map_err(ser)?
            .map(UserId::new),
        address: row.try_get("address").map_err(ser)?,
        industry: row.try_get("industry").map_err(ser)?,
        user_limit: u32_from_i64("user_limit", row.try_get("user_limit").map_err(ser)?)?,
        current_user_count: u32_from_i64(
            "current_user_count",
            row.try_get("current_user_count").map_err(ser)?,
        )?,
        is_active: row.try_get("is_active").map_err(ser)?,
        created_by: UserId::new(row.try_get::<String, _>("created_by").map_err(ser)?),
        created_at: row.try_get("created_at").map_err(ser)?,
        expires_at: row.try_get("expires_at").map_err(ser)?,
    })
}

#[async_trait]
impl EnterpriseRepository for SqliteRepository {
    async fn upsert_enterprise(&self, enterprise: &Enterprise) -> Result<(), StorageError> {
        sqlx::query(&format!(
            r"
            INSERT INTO enterprises ({ENTERPRISE_COLUMNS})
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)
            ON CONFLICT(id) DO UPDATE SET
                company_name = excluded.company_name,
                contact_email = excluded.contact_email,
                contact_phone = excluded.contact_phone,
                admin_email = excluded.admin_email,
                admin_name = excluded.admin_name,
                admin_uid = excluded.admin_uid,
                address = excluded.address,
                industry = excluded.industry,
                user_limit = excluded.user_limit,
                current_user_count = excluded.current_user_count,
                is_active = excluded.is_active,
                expires_at = excluded.expires_at
            "
        ))
        .bind(enterprise.id.as_str())
        .bind(&enterprise.company_name)
        .bind(&enterprise.contact_email)
        .bind(&enterprise.contact_phone)
        .bind(&enterprise.admin_email)
        .bind(&enterprise.admin_name)
        .bind(enterprise.admin_uid.as_ref().map(|u| u.as_str()))
        .bind(&enterprise.address)
        .bind(&enterprise.industry)
        .bind(i64::from(enterprise.user_limit))
        .bind(i64::from(enterprise.current_user_count))
        .bind(enterprise.is_active)
        .bind(enterprise.created_by.as_str())
        .bind(enterprise.created_at)
        .bind(enterprise.expires_at)
        .execute(&self.pool)
        .await
        .map_err(db)?;
        Ok(())
    }

    async fn get_enterprise(&self, id: &EnterpriseId) -> Result<Option<Enterprise>, StorageError> {
        let row = sqlx::query(&format!(
            "SELECT {ENTERPRISE_COLUMNS} FROM enterprises WHERE id = ?1"
        ))
        .bind(id.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(db)?;

        row.as_ref().map(enterprise_from_row).transpose()
    }

    async fn list_enterprises(&self) -> Result<Vec<Enterprise>, StorageError> {
        let rows = sqlx::query(&format!(
            "SELECT {ENTERPRISE_COLUMNS} FROM enterprises ORDER BY company_name ASC"
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(db)?;

        rows.iter().map(enterprise_from_row).collect()
    }

    async fn delete_enterprise(&self, id: &EnterpriseId) -> Result<(), StorageError> {
        let res = sqlx::query("DELETE FROM enterprises WHERE id = ?1")
            .bind(id.as_str())
            .execute(&self.pool)
            .await
            .map_err(db)?;
        if res.rows_affected() == 0 {
            return Err(StorageError::NotFound);
        }
        Ok(())
    }

    async fn reserve_seat(&self, id: &EnterpriseId) -> Result<SeatReservation, StorageError> {
        let res = sqlx::query(
            r"
            UPDATE enterprises
            SET current_user_count = current_user_count + 1
            WHERE id = ?1 AND current_user_count < user_limit
            ",
        )
        .bind(id.as_str())
        .execute(&self.pool)
        .await
        .map_err(db)?;

        let enterprise = self
            .get_enterprise(id)
            .await?
            .ok_or(StorageError::NotFound)?;
        if res.rows_affected() == 0 {
            return Ok(SeatReservation::Full {
                limit: enterprise.user_limit,
            });
        }
        Ok(SeatReservation::Reserved(enterprise))
    }

    async fn release_seat(&self, id: &EnterpriseId) -> Result<(), StorageError> {
        let res = sqlx::query(
            r"
            UPDATE enterprises
            SET current_user_count = MAX(current_user_count - 1, 0)
            WHERE id = ?1
            ",
        )
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
