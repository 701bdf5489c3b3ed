//! Decision intelligence repository.
//!
//! Runs the rule engine for a case, folds the results into a confidence
//! score, and appends one immutable history entry linked to its predecessor.
//! The append and its timeline event commit in a single transaction, and the
//! latest-entry read happens inside that same transaction, so two racing
//! writers cannot both claim the same predecessor.

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::db::schema::HistoryEntry;
use crate::db::store;
use crate::error::AppResult;
use crate::integrity;
use crate::rules;
use crate::workflow::{Actor, EventType};
use crate::AppState;

/// Scores never drop below this floor, preventing a degenerate "0%
/// everywhere" view when a form is entirely empty.
pub const MIN_CONFIDENCE: f64 = 5.0;

/// Minimum seconds between two history writes for the same case. Back-to-back
/// triggers inside this window return the existing entry unchanged.
pub const WRITE_GUARD_SECONDS: i64 = 2;

/// What caused a recompute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Trigger {
    Manual,
    Submission,
    Evidence,
    RequestInfo,
    Decision,
    Unknown,
}

impl Trigger {
    pub fn as_str(&self) -> &'static str {
        match self {
            Trigger::Manual => "manual",
            Trigger::Submission => "submission",
            Trigger::Evidence => "evidence",
            Trigger::RequestInfo => "request_info",
            Trigger::Decision => "decision",
            Trigger::Unknown => "unknown",
        }
    }
}

/// Confidence bands reviewers filter by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfidenceBand {
    Low,
    Medium,
    High,
    Unknown,
}

impl ConfidenceBand {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConfidenceBand::Low => "low",
            ConfidenceBand::Medium => "medium",
            ConfidenceBand::High => "high",
            ConfidenceBand::Unknown => "unknown",
        }
    }
}

/// Map a score to its band.
pub fn band_for(score: f64) -> ConfidenceBand {
    if score >= 80.0 {
        ConfidenceBand::High
    } else if score >= 50.0 {
        ConfidenceBand::Medium
    } else {
        ConfidenceBand::Low
    }
}

/// Percentage of passed rules, floored at `MIN_CONFIDENCE` and rounded to
/// two decimals.
pub fn compute_confidence(passed: usize, total: usize) -> f64 {
    let raw = if total == 0 {
        0.0
    } else {
        (passed as f64 / total as f64) * 100.0
    };
    let floored = raw.max(MIN_CONFIDENCE);
    (floored * 100.0).round() / 100.0
}

fn decision_for(band: ConfidenceBand) -> &'static str {
    match band {
        ConfidenceBand::High => "approve_recommended",
        ConfidenceBand::Medium => "review_recommended",
        ConfidenceBand::Low => "escalate_recommended",
        ConfidenceBand::Unknown => "unknown",
    }
}

/// Result of a recompute request: the governing entry, and whether it was
/// freshly written or returned unchanged by the write guard.
#[derive(Debug, Clone, Serialize)]
pub struct RecomputeOutcome {
    pub entry: HistoryEntry,
    pub recomputed: bool,
}

/// Compute intelligence for a case and append a history entry.
pub async fn recompute(
    state: &AppState,
    case_id: &str,
    trigger: Trigger,
    actor: &Actor,
) -> AppResult<RecomputeOutcome> {
    let pool = state.db.pool();

    let case = store::get_case(pool, case_id).await?;

    // Synthetic cases without a submission score against an empty form.
    let form_data = match &case.submission_id {
        Some(submission_id) => {
            let submission = store::get_submission(pool, submission_id).await?;
            serde_json::from_str(&submission.form_data).unwrap_or_else(|_| json!({}))
        }
        None => json!({}),
    };

    // Evidence participates in the input hash through stable, non-volatile
    // summaries (generated ids and timestamps are excluded).
    let mut evidence = store::list_evidence(pool, case_id).await?;
    evidence.sort_by(|a, b| (a.created_at.as_str(), a.id.as_str()).cmp(&(b.created_at.as_str(), b.id.as_str())));
    let evidence_summaries = json!(evidence
        .iter()
        .map(|e| json!({"title": e.title, "snippet": e.snippet, "citation": e.citation}))
        .collect::<Vec<_>>());

    let rule_results = rules::evaluate(&case.decision_type, &form_data);
    let total = rule_results.len();
    let passed = rule_results.iter().filter(|r| r.passed).count();

    let rules_hit: Vec<&str> = rule_results
        .iter()
        .filter(|r| r.passed)
        .map(|r| r.rule_id.as_str())
        .collect();
    let gaps: Vec<&str> = rule_results
        .iter()
        .filter(|r| !r.passed && !r.value_present)
        .map(|r| r.rule_id.as_str())
        .collect();
    let bias_flags: Vec<String> = Vec::new();

    let score = compute_confidence(passed, total);
    let band = band_for(score);
    let input_hash = integrity::compute_input_hash(&form_data, &evidence_summaries);

    let payload = json!({
        "decision": decision_for(band),
        "confidence_score": score,
        "confidence_band": band.as_str(),
        "rules_hit": rules_hit,
        "gaps": gaps,
        "bias_flags": bias_flags,
        "rule_results": rule_results,
        "reason": format!("{}/{} rules passed", passed, total),
        "trigger": trigger.as_str(),
    });

    let mut tx = pool.begin().await?;

    let previous = store::latest_history_entry(&mut tx, case_id).await?;

    if let Some(prev) = &previous {
        let prev_at = store::parse_ts(&prev.computed_at)?;
        let elapsed = chrono::Utc::now() - prev_at;
        if elapsed < chrono::Duration::seconds(WRITE_GUARD_SECONDS) {
            log::debug!(
                "Skipping intelligence write for case {}: last run {}s ago",
                case_id,
                elapsed.num_seconds()
            );
            return Ok(RecomputeOutcome {
                entry: prev.clone(),
                recomputed: false,
            });
        }
    }

    let entry = HistoryEntry {
        id: uuid::Uuid::new_v4().to_string(),
        case_id: case_id.to_string(),
        computed_at: store::now_ts(),
        confidence_score: score,
        confidence_band: band.as_str().to_string(),
        rules_passed: passed as i64,
        rules_total: total as i64,
        gap_count: gaps.len() as i64,
        bias_count: bias_flags.len() as i64,
        trigger_kind: trigger.as_str().to_string(),
        actor_role: actor.role.as_str().to_string(),
        input_hash,
        previous_run_id: previous.as_ref().map(|p| p.id.clone()),
        payload_json: payload.to_string(),
    };

    store::insert_history_entry(&mut tx, &entry).await?;
    store::insert_event(
        &mut tx,
        case_id,
        EventType::DecisionIntelligenceUpdated,
        actor,
        &format!(
            "Decision intelligence updated: {:.2}% ({})",
            score,
            band.as_str()
        ),
        &payload,
    )
    .await?;

    tx.commit().await?;

    log::info!(
        "Intelligence recomputed for case {}: {:.2}% ({}), trigger {}",
        case_id,
        score,
        band.as_str(),
        trigger.as_str()
    );

    Ok(RecomputeOutcome {
        entry,
        recomputed: true,
    })
}

/// Latest entry for a case without writing anything.
pub async fn latest_entry(state: &AppState, case_id: &str) -> AppResult<Option<HistoryEntry>> {
    let entries = store::list_history(state.db.pool(), case_id, 1).await?;
    Ok(entries.into_iter().next())
}
