//! Database schema for the AutoComply case workflow store.
//!
//! All timestamps are stored as RFC 3339 TEXT in UTC. JSON columns are stored
//! as TEXT and parsed at the edge that needs them.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// SQL to create all tables and indexes. Idempotent.
pub const CREATE_TABLES: &str = r#"
-- Submissions table
CREATE TABLE IF NOT EXISTS submissions (
    id TEXT PRIMARY KEY,
    decision_type TEXT NOT NULL,
    submitted_by TEXT,
    account_id TEXT,
    location_id TEXT,
    form_data TEXT NOT NULL DEFAULT '{}',
    raw_payload TEXT,
    evaluator_output TEXT,
    status TEXT NOT NULL DEFAULT 'submitted' CHECK(status IN ('submitted', 'updated', 'cancelled')),
    created_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- Cases table
CREATE TABLE IF NOT EXISTS cases (
    id TEXT PRIMARY KEY,
    submission_id TEXT,
    decision_type TEXT NOT NULL,
    title TEXT NOT NULL,
    summary TEXT NOT NULL DEFAULT '',
    status TEXT NOT NULL DEFAULT 'new' CHECK(status IN ('new', 'in_review', 'needs_info', 'approved', 'rejected', 'blocked', 'closed')),
    assigned_to TEXT,
    assigned_at TEXT,
    due_at TEXT NOT NULL,
    packet_evidence_ids TEXT NOT NULL DEFAULT '[]',
    searchable_text TEXT NOT NULL DEFAULT '',
    reviewer_notes TEXT,
    admin_notes TEXT,
    created_at TEXT NOT NULL DEFAULT (datetime('now')),
    updated_at TEXT NOT NULL DEFAULT (datetime('now')),
    FOREIGN KEY (submission_id) REFERENCES submissions(id)
);

-- Evidence items owned by a case
CREATE TABLE IF NOT EXISTS evidence_items (
    id TEXT PRIMARY KEY,
    case_id TEXT NOT NULL,
    title TEXT NOT NULL,
    snippet TEXT NOT NULL DEFAULT '',
    citation TEXT NOT NULL DEFAULT '',
    source_id TEXT NOT NULL DEFAULT '',
    tags TEXT NOT NULL DEFAULT '[]',
    metadata TEXT NOT NULL DEFAULT '{}',
    included_in_packet INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL DEFAULT (datetime('now')),
    FOREIGN KEY (case_id) REFERENCES cases(id) ON DELETE CASCADE
);

-- Case timeline events
CREATE TABLE IF NOT EXISTS case_events (
    id TEXT PRIMARY KEY,
    case_id TEXT NOT NULL,
    created_at TEXT NOT NULL DEFAULT (datetime('now')),
    event_type TEXT NOT NULL,
    actor_role TEXT NOT NULL CHECK(actor_role IN ('submitter', 'verifier', 'admin', 'devsupport', 'system')),
    actor_id TEXT,
    message TEXT NOT NULL,
    payload_json TEXT NOT NULL DEFAULT '{}',
    FOREIGN KEY (case_id) REFERENCES cases(id) ON DELETE CASCADE
);

-- Attachment metadata (blobs live on the filesystem)
CREATE TABLE IF NOT EXISTS attachments (
    id TEXT PRIMARY KEY,
    case_id TEXT NOT NULL,
    submission_id TEXT,
    filename TEXT NOT NULL,
    content_type TEXT NOT NULL,
    size_bytes INTEGER NOT NULL,
    storage_path TEXT NOT NULL,
    uploaded_by TEXT NOT NULL DEFAULT '',
    description TEXT NOT NULL DEFAULT '',
    is_deleted INTEGER NOT NULL DEFAULT 0,
    deleted_at TEXT,
    deleted_by TEXT,
    delete_reason TEXT,
    is_redacted INTEGER NOT NULL DEFAULT 0,
    redacted_at TEXT,
    redacted_by TEXT,
    redact_reason TEXT,
    original_sha256 TEXT NOT NULL,
    created_at TEXT NOT NULL DEFAULT (datetime('now')),
    FOREIGN KEY (case_id) REFERENCES cases(id) ON DELETE CASCADE
);

-- Append-only intelligence history chain
CREATE TABLE IF NOT EXISTS intelligence_history (
    id TEXT PRIMARY KEY,
    case_id TEXT NOT NULL,
    computed_at TEXT NOT NULL DEFAULT (datetime('now')),
    confidence_score REAL NOT NULL,
    confidence_band TEXT NOT NULL CHECK(confidence_band IN ('low', 'medium', 'high', 'unknown')),
    rules_passed INTEGER NOT NULL DEFAULT 0,
    rules_total INTEGER NOT NULL DEFAULT 0,
    gap_count INTEGER NOT NULL DEFAULT 0,
    bias_count INTEGER NOT NULL DEFAULT 0,
    trigger_kind TEXT NOT NULL CHECK(trigger_kind IN ('manual', 'submission', 'evidence', 'request_info', 'decision', 'unknown')),
    actor_role TEXT NOT NULL CHECK(actor_role IN ('submitter', 'verifier', 'admin', 'devsupport', 'system')),
    input_hash TEXT NOT NULL,
    previous_run_id TEXT,
    payload_json TEXT NOT NULL DEFAULT '{}',
    FOREIGN KEY (case_id) REFERENCES cases(id) ON DELETE CASCADE
);

-- Indexes
CREATE INDEX IF NOT EXISTS idx_cases_status ON cases(status);
CREATE INDEX IF NOT EXISTS idx_cases_assigned_to ON cases(assigned_to);
CREATE INDEX IF NOT EXISTS idx_cases_created_at ON cases(created_at);
CREATE INDEX IF NOT EXISTS idx_cases_searchable_text ON cases(searchable_text);
CREATE INDEX IF NOT EXISTS idx_case_events_case_created ON case_events(case_id, created_at DESC);
CREATE INDEX IF NOT EXISTS idx_evidence_items_case_id ON evidence_items(case_id);
CREATE INDEX IF NOT EXISTS idx_intelligence_history_case_computed ON intelligence_history(case_id, computed_at DESC);
"#;

/// Additive migrations applied after CREATE_TABLES.
///
/// Each statement must be safe to re-run: "duplicate column name" errors are
/// swallowed by the migration runner so older databases upgrade in place.
pub const ADDITIVE_MIGRATIONS: &[&str] = &[
    "ALTER TABLE submissions ADD COLUMN evaluator_output TEXT",
    "ALTER TABLE cases ADD COLUMN reviewer_notes TEXT",
    "ALTER TABLE cases ADD COLUMN admin_notes TEXT",
    "ALTER TABLE attachments ADD COLUMN submission_id TEXT",
];

// ============================================
// Row structs
// ============================================

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Submission {
    pub id: String,
    pub decision_type: String,
    pub submitted_by: Option<String>,
    pub account_id: Option<String>,
    pub location_id: Option<String>,
    pub form_data: String, // JSON object
    pub raw_payload: Option<String>,
    pub evaluator_output: Option<String>,
    pub status: String,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Case {
    pub id: String,
    pub submission_id: Option<String>,
    pub decision_type: String,
    pub title: String,
    pub summary: String,
    pub status: String,
    pub assigned_to: Option<String>,
    pub assigned_at: Option<String>,
    pub due_at: String,
    pub packet_evidence_ids: String, // JSON array of evidence ids
    pub searchable_text: String,
    pub reviewer_notes: Option<String>,
    pub admin_notes: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct EvidenceItem {
    pub id: String,
    pub case_id: String,
    pub title: String,
    pub snippet: String,
    pub citation: String,
    pub source_id: String,
    pub tags: String,     // JSON array
    pub metadata: String, // JSON object
    pub included_in_packet: bool,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct CaseEvent {
    pub id: String,
    pub case_id: String,
    pub created_at: String,
    pub event_type: String,
    pub actor_role: String,
    pub actor_id: Option<String>,
    pub message: String,
    pub payload_json: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Attachment {
    pub id: String,
    pub case_id: String,
    pub submission_id: Option<String>,
    pub filename: String,
    pub content_type: String,
    pub size_bytes: i64,
    pub storage_path: String,
    pub uploaded_by: String,
    pub description: String,
    pub is_deleted: bool,
    pub deleted_at: Option<String>,
    pub deleted_by: Option<String>,
    pub delete_reason: Option<String>,
    pub is_redacted: bool,
    pub redacted_at: Option<String>,
    pub redacted_by: Option<String>,
    pub redact_reason: Option<String>,
    pub original_sha256: String,
    pub created_at: String,
}

/// One immutable record of an intelligence computation for a case.
///
/// `previous_run_id` links each entry to its immediate predecessor so the
/// full chain can be verified after the fact.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct HistoryEntry {
    pub id: String,
    pub case_id: String,
    pub computed_at: String,
    pub confidence_score: f64,
    pub confidence_band: String,
    pub rules_passed: i64,
    pub rules_total: i64,
    pub gap_count: i64,
    pub bias_count: i64,
    /// Wire name is `trigger`; the column avoids the SQL keyword.
    #[serde(rename = "trigger")]
    pub trigger_kind: String,
    pub actor_role: String,
    pub input_hash: String,
    pub previous_run_id: Option<String>,
    pub payload_json: String,
}
