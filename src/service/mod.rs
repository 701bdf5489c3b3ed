//! Service operation surface.
//!
//! One module per resource. These are the functions the HTTP frontend binds
//! to routes: each takes the shared `AppState`, the request `Actor`, and a
//! typed input, and returns `AppResult<T>` for the transport to serialize.

pub mod attachments;
pub mod cases;
pub mod evidence;
pub mod export;
pub mod health;
pub mod intelligence;
pub mod seed;
pub mod submissions;

use serde_json::Value;
use sqlx::SqlitePool;

use crate::db::schema::{Case, Submission};
use crate::db::store;
use crate::error::{AppError, AppResult};
use crate::workflow;

/// Reject writes against a case whose submission has been cancelled.
///
/// Reads are unaffected; only the cancellation flow itself may still append
/// its own timeline events.
pub(crate) async fn ensure_case_writable(pool: &SqlitePool, case: &Case) -> AppResult<()> {
    if let Some(submission_id) = &case.submission_id {
        let submission = store::get_submission(pool, submission_id).await?;
        if submission.status == "cancelled" {
            return Err(AppError::case_read_only());
        }
    }
    Ok(())
}

/// Parse a JSON TEXT column, tolerating legacy rows with malformed content.
pub(crate) fn parse_json(s: &str) -> Value {
    serde_json::from_str(s).unwrap_or(Value::Null)
}

/// Pull the applicant's display name out of form data, probing the same
/// aliases the rule packs use.
pub(crate) fn applicant_name(form_data: &Value) -> Option<String> {
    for alias in ["name", "practitionerName", "practitioner_name", "applicantName"] {
        if let Some(Value::String(s)) = crate::rules::resolve_path(form_data, alias) {
            let trimmed = s.trim();
            if !trimmed.is_empty() {
                return Some(trimmed.to_string());
            }
        }
    }
    None
}

/// Submission fields that participate in the case's searchable text.
pub(crate) fn submission_search_fields(submission: &Submission) -> Vec<String> {
    let form_data = parse_json(&submission.form_data);
    let mut fields = Vec::new();
    for value in [
        submission.submitted_by.as_deref(),
        submission.account_id.as_deref(),
        submission.location_id.as_deref(),
    ]
    .into_iter()
    .flatten()
    {
        fields.push(value.to_string());
    }
    if let Some(name) = applicant_name(&form_data) {
        fields.push(name);
    }
    if let Some(Value::String(email)) = crate::rules::resolve_path(&form_data, "email") {
        fields.push(email.clone());
    }
    fields
}

/// Recompute a case's denormalized search text after any contributing field
/// changed.
pub(crate) fn rebuild_searchable_text(case: &Case, submission: Option<&Submission>) -> String {
    let submission_fields = submission.map(submission_search_fields).unwrap_or_default();
    let mut parts: Vec<Option<&str>> = vec![
        Some(case.title.as_str()),
        Some(case.summary.as_str()),
        Some(case.decision_type.as_str()),
        case.assigned_to.as_deref(),
    ];
    for field in &submission_fields {
        parts.push(Some(field.as_str()));
    }
    workflow::build_searchable_text(&parts)
}
