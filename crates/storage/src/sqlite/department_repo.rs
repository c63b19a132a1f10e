use async_trait::async_trait;
use gxp_core::model::{Department, DepartmentId, EnterpriseId};
use sqlx::Row;
use sqlx::sqlite::SqliteRow;

use super::SqliteRepository;
use super::mapping::{db, from_json, ser, to_json};
use crate::repository::{DepartmentRepository, StorageError};

const DEPARTMENT_COLUMNS: &str = r"
    id, enterprise_id, name, description, allowed_domains, is_active, created_at, updated_at
";

fn department_from_row(row: &SqliteRow) -> Result<Department, StorageError> {
    Ok(Department {
        id: DepartmentId::new(row.try_get::<String, _>("id").map_err(ser)?),
        enterprise_id: EnterpriseId::new(row.try_get::<String, _>("enterprise_id").map_err(ser)?),
        name: row.try_get("name").map_err(ser)?,
        description: row.try_get("description").map_err(ser)?,
        allowed_domains: from_json(
            "allowed_domains",
            &row.try_get::<String, _>("allowed_domains").map_err(ser)?,
        )?,
        is_active: row.try_get("is_active").map_err(ser)?,
        created_at: row.try_get("created_at").map_err(ser)?,
        updated_at: row.try_get("updated_at").map_err(ser)?,
    })
}

#[async_trait]
impl DepartmentRepository for SqliteRepository {
    async fn upsert_department(&self, department: &Department) -> Result<(), StorageError> {
        sqlx::query(&format!(
            r"
            INSERT INTO departments ({DEPARTMENT_COLUMNS})
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                description = excluded.description,
                allowed_domains = excluded.allowed_domains,
                is_active = excluded.is_active,
                updated_at = excluded.updated_at
            "
        ))
        .bind(department.id.as_str())
        .bind(department.enterprise_id.as_str())
        .bind(&department.name)
        .bind(&department.description)
        .bind(to_json(&department.allowed_domains)?)
        .bind(department.is_active)
        .bind(department.created_at)
        .bind(department.updated_at)
        .execute(&self.pool)
        .await
        .map_err(db)?;
        Ok(())
    }

    async fn get_department(
        &self,
        id: &DepartmentId,
    ) -> Result<Option<Department>, StorageError> {
        let row = sqlx::query(&format!(
            "SELECT {DEPARTMENT_COLUMNS} FROM departments WHERE id = ?1"
        ))
        .bind(id.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(db)?;

        row.as_ref().map(department_from_row).transpose()
    }

    async fn list_departments(
        &self,
        enterprise: &EnterpriseId,
    ) -> Result<Vec<Department>, StorageError> {
        let rows = sqlx::query(&format!(
            "SELECT {DEPARTMENT_COLUMNS} FROM departments WHERE enterprise_id = ?1 ORDER BY name ASC"
        ))
        .bind(enterprise.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(db)?;

        rows.iter().map(department_from_row).collect()
    }

    async fn delete_department(&self, id: &DepartmentId) -> Result<(), StorageError> {
        let res = sqlx::query("DELETE FROM departments WHERE id = ?1")
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
