//! AutoComply - compliance case workflow service core.
//!
//! Ingests regulatory submissions, opens reviewable cases, scores each case
//! with a deterministic rule engine, chains every scoring run into an
//! append-only audit history, and exports signed, redacted case bundles.
//! The REST transport binds to the functions in [`service`]; everything here
//! is transport-agnostic.

pub mod config;
pub mod db;
pub mod error;
pub mod integrity;
pub mod intelligence;
pub mod recompute;
pub mod redaction;
pub mod rules;
pub mod service;
pub mod signing;
pub mod storage;
pub mod workflow;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::Mutex;

use config::AppConfig;
use db::Database;
use error::AppResult;
use storage::Storage;

/// Application state shared across service operations.
///
/// Cloning is cheap: the database pool, blob storage, and throttle map are
/// behind `Arc`s, so recompute hooks can run on detached tasks.
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool
    pub db: Arc<Database>,
    /// Attachment blob storage
    pub storage: Arc<Storage>,
    /// Resolved configuration
    pub config: AppConfig,
    /// Per-case auto-recompute throttle: case id -> last claim time.
    /// In-process only; see the recompute module for multi-instance notes.
    pub recompute_throttle: Arc<Mutex<HashMap<String, Instant>>>,
}

impl AppState {
    /// Open the store (running migrations) and blob storage for `config`.
    pub async fn new(config: AppConfig) -> AppResult<Self> {
        let db = match &config.database_url {
            Some(url) => Database::connect(url).await?,
            None => Database::new(config.database_path()).await?,
        };
        let storage = Storage::new(config.uploads_root.clone());

        Ok(Self {
            db: Arc::new(db),
            storage: Arc::new(storage),
            config,
            recompute_throttle: Arc::new(Mutex::new(HashMap::new())),
        })
    }
}
