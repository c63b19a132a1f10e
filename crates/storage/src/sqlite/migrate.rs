use chrono::Utc;
use sqlx::SqlitePool;
use tracing::info;

use super::SqliteInitError;

const SCHEMA_V1: &[&str] = &[
    r"
        CREATE TABLE IF NOT EXISTS questions (
            assessment_id TEXT NOT NULL,
            id TEXT NOT NULL,
            text TEXT NOT NULL,
            ordinal INTEGER NOT NULL CHECK (ordinal >= 1),
            PRIMARY KEY (assessment_id, id),
            UNIQUE (assessment_id, ordinal)
        );
    ",
    r"
        CREATE TABLE IF NOT EXISTS progress_snapshots (
            id TEXT PRIMARY KEY,
            owner_id TEXT NOT NULL,
            kind TEXT NOT NULL CHECK (kind IN ('custom', 'template')),
            assessment_id TEXT NOT NULL,
            assessment_name TEXT NOT NULL,
            facility_id TEXT,
            facility_name TEXT NOT NULL,
            current_index INTEGER NOT NULL CHECK (current_index >= 0),
            total_questions INTEGER NOT NULL CHECK (total_questions >= 0),
            responses TEXT NOT NULL,
            question_texts TEXT NOT NULL,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );
    ",
    r"
        CREATE INDEX IF NOT EXISTS idx_progress_owner_updated
            ON progress_snapshots (owner_id, updated_at);
    ",
    r"
        CREATE TABLE IF NOT EXISTS enterprises (
            id TEXT PRIMARY KEY,
            company_name TEXT NOT NULL,
            contact_email TEXT NOT NULL,
            contact_phone TEXT NOT NULL,
            admin_email TEXT NOT NULL,
            admin_name TEXT NOT NULL,
            admin_uid TEXT,
            address TEXT NOT NULL,
            industry TEXT NOT NULL,
            user_limit INTEGER NOT NULL CHECK (user_limit >= 0),
            current_user_count INTEGER NOT NULL CHECK (current_user_count >= 0),
            is_active INTEGER NOT NULL,
            created_by TEXT NOT NULL,
            created_at TEXT NOT NULL,
            expires_at TEXT
        );
    ",
    r"
        CREATE TABLE IF NOT EXISTS facilities (
            id TEXT PRIMARY KEY,
            enterprise_id TEXT NOT NULL,
            name TEXT NOT NULL,
            description TEXT NOT NULL,
            is_active INTEGER NOT NULL,
            created_by TEXT NOT NULL,
            created_at TEXT NOT NULL,
            updated_by TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            FOREIGN KEY (enterprise_id) REFERENCES enterprises(id) ON DELETE CASCADE
        );
    ",
    r"
        CREATE TABLE IF NOT EXISTS departments (
            id TEXT PRIMARY KEY,
            enterprise_id TEXT NOT NULL,
            name TEXT NOT NULL,
            description TEXT NOT NULL,
            allowed_domains TEXT NOT NULL,
            is_active INTEGER NOT NULL,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            FOREIGN KEY (enterprise_id) REFERENCES enterprises(id) ON DELETE CASCADE
        );
    ",
    r"
        CREATE TABLE IF NOT EXISTS users (
            uid TEXT PRIMARY KEY,
            email TEXT NOT NULL UNIQUE COLLATE NOCASE,
            display_name TEXT NOT NULL,
            role TEXT NOT NULL,
            enterprise_id TEXT,
            department TEXT NOT NULL,
            job_title TEXT NOT NULL,
            permissions TEXT,
            is_active INTEGER NOT NULL,
            created_by TEXT,
            created_at TEXT NOT NULL
        );
    ",
    r"
        CREATE TABLE IF NOT EXISTS invitations (
            id TEXT PRIMARY KEY,
            token TEXT NOT NULL UNIQUE,
            email TEXT NOT NULL,
            display_name TEXT NOT NULL,
            enterprise_id TEXT NOT NULL,
            department TEXT NOT NULL,
            job_title TEXT NOT NULL,
            permissions TEXT NOT NULL,
            invited_by TEXT NOT NULL,
            invited_at TEXT NOT NULL,
            expires_at TEXT NOT NULL,
            used_at TEXT
        );
    ",
    r"
        CREATE TABLE IF NOT EXISTS reports (
            id TEXT PRIMARY KEY,
            author_id TEXT NOT NULL,
            author_email TEXT NOT NULL,
            author_name TEXT NOT NULL,
            author_department TEXT NOT NULL,
            author_job_title TEXT NOT NULL,
            enterprise_id TEXT,
            enterprise_name TEXT NOT NULL,
            kind TEXT NOT NULL CHECK (kind IN ('custom', 'template')),
            assessment_id TEXT NOT NULL,
            assessment_name TEXT NOT NULL,
            facility_id TEXT,
            facility_name TEXT NOT NULL,
            total_questions INTEGER NOT NULL CHECK (total_questions >= 0),
            compliant INTEGER NOT NULL CHECK (compliant >= 0),
            non_compliant INTEGER NOT NULL CHECK (non_compliant >= 0),
            not_applicable INTEGER NOT NULL CHECK (not_applicable >= 0),
            completed_at TEXT NOT NULL,
            responses TEXT NOT NULL,
            question_texts TEXT NOT NULL
        );
    ",
    r"
        CREATE INDEX IF NOT EXISTS idx_reports_author_completed
            ON reports (author_id, completed_at);
    ",
    r"
        CREATE INDEX IF NOT EXISTS idx_reports_enterprise_completed
            ON reports (enterprise_id, completed_at);
    ",
];

/// Brings the schema up to date. Safe to call on every start.
pub async fn run_migrations(pool: &SqlitePool) -> Result<(), SqliteInitError> {
    async fn is_applied(pool: &SqlitePool, version: i64) -> Result<bool, sqlx::Error> {
        let row = sqlx::query("SELECT 1 FROM schema_migrations WHERE version = ?1")
            .bind(version)
            .fetch_optional(pool)
            .await?;
        Ok(row.is_some())
    }

    sqlx::query(
        r"
            CREATE TABLE IF NOT EXISTS schema_migrations (
                version INTEGER PRIMARY KEY,
                applied_at TEXT NOT NULL
            );
            ",
    )
    .execute(pool)
    .await?;

    if !is_applied(pool, 1).await? {
        let mut tx = pool.begin().await?;

        for statement in SCHEMA_V1 {
            sqlx::query(statement).execute(&mut *tx).await?;
        }

        sqlx::query(
            r"
                INSERT INTO schema_migrations (version, applied_at)
                VALUES (?1, ?2)
                ON CONFLICT(version) DO NOTHING
            ",
        )
        .bind(1_i64)
        .bind(Utc::now())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        info!(version = 1, "applied sqlite schema migration");
    }

    Ok(())
}
