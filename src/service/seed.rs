//! Dev seed data, gated by `DEV_SEED_TOKEN`.

use serde_json::json;

use crate::error::{AppError, AppResult};
use crate::workflow::{Actor, ActorRole};
use crate::AppState;

use super::submissions::{self, CreateSubmissionInput, SubmissionResponse};

/// Insert a demo CSF submission (and its case) for local frontend work.
///
/// Unavailable unless `DEV_SEED_TOKEN` is configured; the caller must present
/// the matching token.
pub async fn seed_demo_data(state: &AppState, token: &str) -> AppResult<SubmissionResponse> {
    let expected = state
        .config
        .dev_seed_token
        .as_deref()
        .ok_or_else(|| AppError::NotFound("seed endpoint unavailable".to_string()))?;
    if token != expected {
        return Err(AppError::BadRequest("invalid seed token".to_string()));
    }

    let actor = Actor::new(ActorRole::Submitter, "seed");
    let input = CreateSubmissionInput {
        decision_type: "csf_practitioner".to_string(),
        form_data: json!({
            "name": "Dr. Dana Demo",
            "licenseNumber": "NP.000001",
            "address": "100 Demo Way",
            "state": "OH",
            "specialty": "CNP",
            "experience": "3y",
            "zip": "43215",
            "email": "dana.demo@example.com",
        }),
        submitted_by: Some("seed".to_string()),
        account_id: Some("demo-account".to_string()),
        location_id: Some("demo-location".to_string()),
        raw_payload: None,
        evaluator_output: None,
    };

    let response = submissions::create_submission(state, &actor, input).await?;
    log::info!("Seeded demo case {}", response.case.id);
    Ok(response)
}
