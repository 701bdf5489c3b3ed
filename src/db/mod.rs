//! Database module for AutoComply.
//!
//! Provides SQLite database operations using sqlx.

pub mod schema;
pub mod store;

use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Database connection error: {0}")]
    Connection(#[from] sqlx::Error),
    #[error("Migration error: {0}")]
    Migration(String),
}

pub type DbResult<T> = Result<T, DbError>;

/// Database connection pool
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Open (creating if necessary) the database at `db_path` and migrate it.
    pub async fn new(db_path: PathBuf) -> DbResult<Self> {
        // Ensure parent directory exists
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).ok();
        }

        let db_url = format!("sqlite:{}?mode=rwc", db_path.display());
        Self::connect(&db_url).await
    }

    /// Connect to an explicit sqlite URL (e.g. from `DATABASE_URL`).
    pub async fn connect(db_url: &str) -> DbResult<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .acquire_timeout(std::time::Duration::from_secs(30))
            .idle_timeout(std::time::Duration::from_secs(600))
            .connect(db_url)
            .await?;

        // WAL mode and busy timeout for better concurrency
        sqlx::query("PRAGMA journal_mode = WAL;")
            .execute(&pool)
            .await?;
        sqlx::query("PRAGMA busy_timeout = 5000;")
            .execute(&pool)
            .await?;
        sqlx::query("PRAGMA synchronous = NORMAL;")
            .execute(&pool)
            .await?;
        sqlx::query("PRAGMA foreign_keys = ON;")
            .execute(&pool)
            .await?;

        let db = Self { pool };
        db.run_migrations().await?;

        Ok(db)
    }

    /// Run database migrations: base DDL, then additive ALTERs.
    ///
    /// ALTER statements that fail with "duplicate column name" are treated as
    /// already applied so existing databases upgrade in place.
    async fn run_migrations(&self) -> DbResult<()> {
        sqlx::query(schema::CREATE_TABLES)
            .execute(&self.pool)
            .await
            .map_err(|e| DbError::Migration(e.to_string()))?;

        for stmt in schema::ADDITIVE_MIGRATIONS {
            if let Err(e) = sqlx::query(stmt).execute(&self.pool).await {
                let msg = e.to_string();
                if !msg.contains("duplicate column name") {
                    return Err(DbError::Migration(msg));
                }
            }
        }

        log::info!("Database migrations completed");
        Ok(())
    }

    /// Get the connection pool
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}
