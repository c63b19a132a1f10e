//! `SQLite` backend for every repository trait.
//!
//! One database holds the question sets, progress snapshots, compliance
//! reports, invitations and the enterprise directory (enterprises, their
//! facilities and departments, and user profiles). Directory rows cascade
//! from their enterprise, so foreign keys are switched on for each pooled
//! connection.

use std::time::Duration;

use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnection, SqlitePoolOptions};
use thiserror::Error;

use crate::repository::Storage;

mod department_repo;
mod enterprise_repo;
mod facility_repo;
mod invitation_repo;
mod mapping;
mod migrate;
mod progress_repo;
mod question_repo;
mod report_repo;
mod user_repo;

const MAX_CONNECTIONS: u32 = 5;
const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(5);

/// Applied to every new connection before it joins the pool.
const CONNECTION_PRAGMAS: &[&str] = &[
    // directory cascades depend on this
    "PRAGMA foreign_keys = ON;",
    // lets autosaves and report reads overlap
    "PRAGMA journal_mode = WAL;",
    "PRAGMA busy_timeout = 5000;",
];

#[derive(Clone)]
pub struct SqliteRepository {
    pool: SqlitePool,
}

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SqliteInitError {
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}

async fn prepare_connection(conn: &mut SqliteConnection) -> Result<(), sqlx::Error> {
    for pragma in CONNECTION_PRAGMAS {
        sqlx::query(pragma).execute(&mut *conn).await?;
    }
    Ok(())
}

impl SqliteRepository {
    /// Open a connection pool on `database_url` without touching the schema.
    ///
    /// # Errors
    ///
    /// Returns `SqliteInitError` if the database cannot be opened or a
    /// connection pragma is rejected.
    pub async fn connect(database_url: &str) -> Result<Self, SqliteInitError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(MAX_CONNECTIONS)
            .acquire_timeout(ACQUIRE_TIMEOUT)
            .after_connect(|conn, _meta| Box::pin(prepare_connection(conn)))
            .connect(database_url)
            .await?;
        Ok(Self { pool })
    }

    /// Open the pool and bring the questionnaire and directory tables up to
    /// date.
    ///
    /// # Errors
    ///
    /// Returns `SqliteInitError` if opening or migrating fails.
    pub async fn open(database_url: &str) -> Result<Self, SqliteInitError> {
        let repo = Self::connect(database_url).await?;
        repo.migrate().await?;
        Ok(repo)
    }

    #[must_use]
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Apply pending schema versions.
    ///
    /// # Errors
    ///
    /// Returns `SqliteInitError` if a migration statement fails.
    pub async fn migrate(&self) -> Result<(), SqliteInitError> {
        migrate::run_migrations(&self.pool).await
    }
}

impl Storage {
    /// All repositories served from one migrated `SQLite` database.
    ///
    /// # Errors
    ///
    /// Returns `SqliteInitError` from [`SqliteRepository::open`].
    pub async fn sqlite(database_url: &str) -> Result<Self, SqliteInitError> {
        Ok(Self::from_backend(SqliteRepository::open(database_url).await?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::Row;

    #[tokio::test]
    async fn pooled_connections_enforce_foreign_keys() {
        let repo = SqliteRepository::connect("sqlite::memory:").await.unwrap();
        let row = sqlx::query("PRAGMA foreign_keys;")
            .fetch_one(repo.pool())
            .await
            .unwrap();
        assert_eq!(row.get::<i64, _>(0), 1);
    }
}
