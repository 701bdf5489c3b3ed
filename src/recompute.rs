//! Auto-recompute orchestration.
//!
//! Workflow mutations call `maybe_recompute` to keep decision intelligence
//! current. A process-wide per-case throttle map bounds database churn, and
//! the intelligence call is wrapped in a crash-safe envelope: a failed
//! recompute is logged and swallowed so the mutation that triggered it is
//! never rolled back.

use std::time::{Duration, Instant};

use crate::intelligence::{self, Trigger};
use crate::workflow::Actor;
use crate::AppState;

/// Default spacing between auto-triggered recomputes for one case.
pub const DEFAULT_THROTTLE_SECONDS: u64 = 30;

/// Map a hook reason string to an intelligence trigger. Matching is
/// case-insensitive on substrings, with the explicit manual reason checked
/// first.
pub fn map_reason_to_trigger(reason: &str) -> Trigger {
    let lowered = reason.to_lowercase();
    if lowered == "manual_recompute" {
        Trigger::Manual
    } else if lowered.contains("submission") {
        Trigger::Submission
    } else if lowered.contains("evidence") || lowered.contains("attachment") {
        Trigger::Evidence
    } else if lowered.contains("request") || lowered.contains("info") {
        Trigger::RequestInfo
    } else if lowered.contains("decision") {
        Trigger::Decision
    } else {
        Trigger::Unknown
    }
}

/// Claim the throttle slot for a case. Returns false when the last claim is
/// younger than `throttle_seconds`. A zero throttle always claims.
///
/// The map is in-process memory; per-case entries mean recomputing one case
/// never blocks another. Multi-instance deployments coordinate externally or
/// accept one redundant recompute per window per instance.
pub async fn try_claim(state: &AppState, case_id: &str, throttle_seconds: u64) -> bool {
    if throttle_seconds == 0 {
        return true;
    }
    let mut throttle = state.recompute_throttle.lock().await;
    if let Some(last) = throttle.get(case_id) {
        if last.elapsed() < Duration::from_secs(throttle_seconds) {
            log::debug!(
                "Recompute throttled for case {} ({}s window)",
                case_id,
                throttle_seconds
            );
            return false;
        }
    }
    throttle.insert(case_id.to_string(), Instant::now());
    true
}

/// Recompute intelligence for a case unless throttled.
///
/// Returns true only when a new history entry was written. Failures are
/// logged with full context and reported as false; they never propagate to
/// the caller.
pub async fn maybe_recompute(
    state: &AppState,
    case_id: &str,
    reason: &str,
    throttle_seconds: u64,
    actor: &Actor,
) -> bool {
    if !try_claim(state, case_id, throttle_seconds).await {
        return false;
    }

    let trigger = map_reason_to_trigger(reason);
    match intelligence::recompute(state, case_id, trigger, actor).await {
        Ok(outcome) => outcome.recomputed,
        Err(e) => {
            log::error!(
                "Auto-recompute failed for case {} (reason '{}', trigger {}): {}",
                case_id,
                reason,
                trigger.as_str(),
                e
            );
            false
        }
    }
}

/// Workflow hook: run `maybe_recompute` on a detached task.
///
/// The spawned task survives cancellation of the request future that
/// triggered it, so a client dropping mid-flight cannot leave intelligence
/// stale.
pub async fn run_hook(state: &AppState, case_id: &str, reason: &str) -> bool {
    let state = state.clone();
    let case_id = case_id.to_string();
    let reason = reason.to_string();

    let handle = tokio::spawn(async move {
        maybe_recompute(
            &state,
            &case_id,
            &reason,
            DEFAULT_THROTTLE_SECONDS,
            &Actor::system(),
        )
        .await
    });

    match handle.await {
        Ok(recomputed) => recomputed,
        Err(e) => {
            log::error!("Recompute task failed to join: {}", e);
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reason_mapping() {
        assert_eq!(map_reason_to_trigger("manual_recompute"), Trigger::Manual);
        assert_eq!(map_reason_to_trigger("submission_created"), Trigger::Submission);
        assert_eq!(map_reason_to_trigger("Submission updated"), Trigger::Submission);
        assert_eq!(map_reason_to_trigger("evidence_attached"), Trigger::Evidence);
        assert_eq!(map_reason_to_trigger("attachment_uploaded"), Trigger::Evidence);
        assert_eq!(map_reason_to_trigger("request_info_created"), Trigger::RequestInfo);
        assert_eq!(map_reason_to_trigger("more info needed"), Trigger::RequestInfo);
        assert_eq!(map_reason_to_trigger("decision_saved"), Trigger::Decision);
        assert_eq!(map_reason_to_trigger("anything else"), Trigger::Unknown);
    }
}
