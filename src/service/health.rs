//! Health endpoints.

use serde_json::{json, Value};

use crate::config::EnvReport;
use crate::AppState;

/// Liveness probe. Touches no storage and must answer immediately.
pub fn healthz() -> Value {
    json!({"status": "ok"})
}

/// Environment validation view: boolean flags and warnings only, never
/// secret values.
pub fn health_details(state: &AppState) -> EnvReport {
    state.config.validate()
}
