//! Intelligence endpoints: manual recompute and history listing.

use serde::{Deserialize, Serialize};

use crate::db::schema::HistoryEntry;
use crate::db::store;
use crate::error::AppResult;
use crate::intelligence;
use crate::recompute;
use crate::workflow::Actor;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct RecomputeInput {
    pub reason: Option<String>,
    #[serde(default)]
    pub force: bool,
}

/// Response for the manual recompute endpoint. A throttled call is not an
/// error: it reports `recomputed: false` with the entry currently in force.
#[derive(Debug, Serialize)]
pub struct RecomputeResponse {
    pub recomputed: bool,
    pub entry: Option<HistoryEntry>,
}

/// Manual recompute. Honors the 30 s per-case throttle unless `force` is
/// set, which drops the throttle to zero (the internal 2 s write guard still
/// applies).
pub async fn recompute_case(
    state: &AppState,
    actor: &Actor,
    case_id: &str,
    input: RecomputeInput,
) -> AppResult<RecomputeResponse> {
    let pool = state.db.pool();
    store::get_case(pool, case_id).await?;

    let reason = input
        .reason
        .filter(|r| !r.trim().is_empty())
        .unwrap_or_else(|| "manual_recompute".to_string());
    let throttle_seconds = if input.force {
        0
    } else {
        recompute::DEFAULT_THROTTLE_SECONDS
    };

    if !recompute::try_claim(state, case_id, throttle_seconds).await {
        let entry = intelligence::latest_entry(state, case_id).await?;
        return Ok(RecomputeResponse {
            recomputed: false,
            entry,
        });
    }

    let trigger = recompute::map_reason_to_trigger(&reason);
    let outcome = intelligence::recompute(state, case_id, trigger, actor).await?;

    Ok(RecomputeResponse {
        recomputed: outcome.recomputed,
        entry: Some(outcome.entry),
    })
}

/// Intelligence history for a case, newest-first.
pub async fn history(
    state: &AppState,
    case_id: &str,
    limit: Option<i64>,
) -> AppResult<Vec<HistoryEntry>> {
    let pool = state.db.pool();
    store::get_case(pool, case_id).await?;
    store::list_history(pool, case_id, limit.unwrap_or(50)).await
}
