use async_trait::async_trait;
use gxp_core::model::{EnterpriseId, Facility, FacilityId, UserId};
use sqlx::Row;
use sqlx::sqlite::SqliteRow;

use super::SqliteRepository;
use super::mapping::{db, ser};
use crate::repository::{FacilityRepository, StorageError};

const FACILITY_COLUMNS: &str = r"
    id, enterprise_id, name, description, is_active, created_by, created_at, updated_by,
    updated_at
";

fn facility_from_row(row: &SqliteRow) -> Result<Facility, StorageError> {
    Ok(Facility {
        id: FacilityId::new(row.try_get::<String, _>("id").map_err(ser)?),
        enterprise_id: EnterpriseId::new(row.try_get::<String, _>("enterprise_id").map_err(ser)?),
        name: row.try_get("name").map_err(ser)?,
        description: row.try_get("description").map_err(ser)?,
        is_active: row.try_get("is_active").map_err(ser)?,
        created_by: UserId::new(row.try_get::<String, _>("created_by").map_err(ser)?),
        created_at: row.try_get("created_at").map_err(ser)?,
        updated_by: UserId::new(row.try_get::<String, _>("updated_by").map_err(ser)?),
        updated_at: row.try_get("updated_at").map_err(ser)?,
    })
}

#[async_trait]
impl FacilityRepository for SqliteRepository {
    async fn upsert_facility(&self, facility: &Facility) -> Result<(), StorageError> {
        sqlx::query(&format!(
            r"
            INSERT INTO facilities ({FACILITY_COLUMNS})
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                description = excluded.description,
                is_active = excluded.is_active,
                updated_by = excluded.updated_by,
                updated_at = excluded.updated_at
            "
        ))
        .bind(facility.id.as_str())
        .bind(facility.enterprise_id.as_str())
        .bind(&facility.name)
        .bind(&facility.description)
        .bind(facility.is_active)
        .bind(facility.created_by.as_str())
        .bind(facility.created_at)
        .bind(facility.updated_by.as_str())
        .bind(facility.updated_at)
        .execute(&self.pool)
        .await
        .map_err(db)?;
        Ok(())
    }

    async fn get_facility(&self, id: &FacilityId) -> Result<Option<Facility>, StorageError> {
        let row = sqlx::query(&format!(
            "SELECT {FACILITY_COLUMNS} FROM facilities WHERE id = ?1"
        ))
        .bind(id.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(db)?;

        row.as_ref().map(facility_from_row).transpose()
    }

    async fn list_facilities(
        &self,
        enterprise: &EnterpriseId,
    ) -> Result<Vec<Facility>, StorageError> {
        let rows = sqlx::query(&format!(
            "SELECT {FACILITY_COLUMNS} FROM facilities WHERE enterprise_id = ?1 ORDER BY name ASC"
        ))
        .bind(enterprise.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(db)?;

        rows.iter().map(facility_from_row).collect()
    }

    async fn delete_facility(&self, id: &FacilityId) -> Result<(), StorageError> {
        let res = sqlx::query("DELETE FROM facilities WHERE id = ?1")
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
