//! Redaction and retention pipeline.
//!
//! Combines the PII scanner with role-gated redaction modes and the export
//! retention windows. Reports are deterministic for a fixed input and mode.

pub mod scanner;

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::db::schema::{EvidenceItem, HistoryEntry};
use crate::db::store::parse_ts;
use crate::workflow::ActorRole;

pub use scanner::{PiiFinding, REDACTION_SENTINEL};

/// How much PII leaves the building in an export.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RedactionMode {
    /// Replace detected values with the sentinel. Mandatory for verifier
    /// exports.
    Safe,
    /// Leave values intact; still report stats. Admin and devsupport only.
    Full,
}

impl RedactionMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            RedactionMode::Safe => "safe",
            RedactionMode::Full => "full",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "safe" => Some(Self::Safe),
            "full" => Some(Self::Full),
            _ => None,
        }
    }
}

/// Resolve the mode an export actually runs with.
///
/// Verifiers (and anyone below) are forced to safe regardless of what they
/// asked for; admin and devsupport get what they requested, defaulting to
/// full.
pub fn effective_mode(requested: Option<RedactionMode>, role: ActorRole) -> RedactionMode {
    match role {
        ActorRole::Admin | ActorRole::Devsupport => requested.unwrap_or(RedactionMode::Full),
        _ => RedactionMode::Safe,
    }
}

/// Export-time retention windows, in days.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RetentionPolicy {
    pub evidence_retention_days: i64,
    pub payload_retention_days: i64,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self {
            evidence_retention_days: 30,
            payload_retention_days: 90,
        }
    }
}

/// What retention actually removed from an export.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RetentionStats {
    pub evidence_pruned: i64,
    pub evidence_kept: i64,
    pub payloads_blanked: i64,
}

/// Apply retention to an export's working copies of evidence and history.
///
/// Evidence older than the evidence window is dropped outright. History
/// entries older than the payload window keep their metadata but lose their
/// payload blob. The store itself is never touched: history stays
/// append-only.
pub fn apply_retention(
    evidence: &mut Vec<EvidenceItem>,
    history: &mut [HistoryEntry],
    policy: &RetentionPolicy,
    now: DateTime<Utc>,
) -> RetentionStats {
    let evidence_cutoff = now - Duration::days(policy.evidence_retention_days);
    let payload_cutoff = now - Duration::days(policy.payload_retention_days);

    let mut stats = RetentionStats::default();

    evidence.retain(|item| {
        let keep = match parse_ts(&item.created_at) {
            Ok(ts) => ts >= evidence_cutoff,
            Err(_) => true,
        };
        if keep {
            stats.evidence_kept += 1;
        } else {
            stats.evidence_pruned += 1;
        }
        keep
    });

    for entry in history.iter_mut() {
        if let Ok(ts) = parse_ts(&entry.computed_at) {
            if ts < payload_cutoff && entry.payload_json != "{}" {
                entry.payload_json = "{}".to_string();
                stats.payloads_blanked += 1;
            }
        }
    }

    stats
}

/// Deterministic summary of what the redaction pass saw and did.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedactionReport {
    pub mode: String,
    pub findings_count: i64,
    pub redacted_fields_count: i64,
    pub redacted_fields_sample: Vec<String>,
    pub rules_triggered: BTreeMap<String, i64>,
    pub retention_applied: bool,
    pub retention_stats: RetentionStats,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pii_findings_sample: Option<Vec<PiiFinding>>,
}

const SAMPLE_LIMIT: usize = 10;

/// Build the report from a completed scan.
pub fn build_report(
    mode: RedactionMode,
    findings: &[PiiFinding],
    redacted_fields_count: usize,
    retention_stats: RetentionStats,
) -> RedactionReport {
    let mut rules_triggered: BTreeMap<String, i64> = BTreeMap::new();
    for finding in findings {
        *rules_triggered.entry(finding.rule.clone()).or_insert(0) += 1;
    }

    let sample: Vec<String> = findings
        .iter()
        .take(SAMPLE_LIMIT)
        .map(|f| f.path.clone())
        .collect();

    let pii_findings_sample = if findings.is_empty() {
        None
    } else {
        Some(findings.iter().take(SAMPLE_LIMIT).cloned().collect())
    };

    RedactionReport {
        mode: mode.as_str().to_string(),
        findings_count: findings.len() as i64,
        redacted_fields_count: redacted_fields_count as i64,
        redacted_fields_sample: sample,
        rules_triggered,
        retention_applied: true,
        retention_stats,
        pii_findings_sample,
    }
}
