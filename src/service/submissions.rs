//! Submission operations: ingest, read, submitter update, soft cancel.
//!
//! Creating a submission opens its linked case as a side effect and fires
//! the first recompute hook.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::db::schema::{Case, Submission};
use crate::db::store;
use crate::error::{AppError, AppResult};
use crate::recompute;
use crate::workflow::{self, Actor, ActorRole, CaseStatus, EventType};
use crate::AppState;

use super::{applicant_name, rebuild_searchable_text};

#[derive(Debug, Deserialize)]
pub struct CreateSubmissionInput {
    pub decision_type: String,
    pub form_data: Value,
    pub submitted_by: Option<String>,
    pub account_id: Option<String>,
    pub location_id: Option<String>,
    pub raw_payload: Option<Value>,
    pub evaluator_output: Option<Value>,
}

#[derive(Debug, Serialize)]
pub struct SubmissionResponse {
    pub submission: Submission,
    pub case: Case,
}

/// Ingest a submission and open its review case.
pub async fn create_submission(
    state: &AppState,
    actor: &Actor,
    input: CreateSubmissionInput,
) -> AppResult<SubmissionResponse> {
    if input.decision_type.trim().is_empty() {
        return Err(AppError::BadRequest("decision_type is required".to_string()));
    }
    if !input.form_data.is_object() {
        return Err(AppError::BadRequest("form_data must be a JSON object".to_string()));
    }

    let now = store::now_ts();
    let created_at = store::parse_ts(&now)?;

    let submission = Submission {
        id: uuid::Uuid::new_v4().to_string(),
        decision_type: input.decision_type.trim().to_string(),
        submitted_by: input.submitted_by,
        account_id: input.account_id,
        location_id: input.location_id,
        form_data: input.form_data.to_string(),
        raw_payload: input.raw_payload.map(|v| v.to_string()),
        evaluator_output: input.evaluator_output.map(|v| v.to_string()),
        status: "submitted".to_string(),
        created_at: now.clone(),
    };

    let title = match applicant_name(&input.form_data) {
        Some(name) => format!("{} review: {}", submission.decision_type, name),
        None => format!("{} review", submission.decision_type),
    };
    let summary = format!("Opened from submission {}", submission.id);
    let due_at = workflow::due_at_for(&submission.decision_type, created_at)
        .to_rfc3339_opts(chrono::SecondsFormat::Micros, true);

    let mut case = Case {
        id: uuid::Uuid::new_v4().to_string(),
        submission_id: Some(submission.id.clone()),
        decision_type: submission.decision_type.clone(),
        title,
        summary,
        status: CaseStatus::New.as_str().to_string(),
        assigned_to: None,
        assigned_at: None,
        due_at,
        packet_evidence_ids: "[]".to_string(),
        searchable_text: String::new(),
        reviewer_notes: None,
        admin_notes: None,
        created_at: now.clone(),
        updated_at: now,
    };
    case.searchable_text = rebuild_searchable_text(&case, Some(&submission));

    let mut tx = state.db.pool().begin().await?;
    store::insert_submission(&mut tx, &submission).await?;
    store::insert_case(&mut tx, &case).await?;
    store::insert_event(
        &mut tx,
        &case.id,
        EventType::CaseCreated,
        actor,
        "Case created from submission",
        &json!({
            "submission_id": submission.id,
            "decision_type": submission.decision_type,
        }),
    )
    .await?;
    tx.commit().await?;

    log::info!(
        "Submission {} ingested; case {} opened ({})",
        submission.id,
        case.id,
        case.decision_type
    );

    recompute::run_hook(state, &case.id, "submission_created").await;

    Ok(SubmissionResponse { submission, case })
}

pub async fn get_submission(state: &AppState, id: &str) -> AppResult<Submission> {
    store::get_submission(state.db.pool(), id).await
}

#[derive(Debug, Deserialize)]
pub struct PatchSubmissionInput {
    pub form_data: Option<Value>,
}

/// Submitter update. Replaces form data, marks the submission `updated`, and
/// moves a `needs_info` case back into review.
pub async fn patch_submission(
    state: &AppState,
    actor: &Actor,
    id: &str,
    input: PatchSubmissionInput,
) -> AppResult<Submission> {
    if actor.role != ActorRole::Submitter {
        return Err(AppError::Conflict(
            "only the submitter may update a submission".to_string(),
        ));
    }

    let pool = state.db.pool();
    let submission = store::get_submission(pool, id).await?;
    if submission.status == "cancelled" {
        return Err(AppError::Conflict("submission is cancelled".to_string()));
    }

    let form_data = match &input.form_data {
        Some(value) if !value.is_object() => {
            return Err(AppError::BadRequest("form_data must be a JSON object".to_string()))
        }
        Some(value) => value.to_string(),
        None => submission.form_data.clone(),
    };

    let mut case = store::get_case_for_submission(pool, id).await?;

    let mut tx = pool.begin().await?;
    store::update_submission_form(&mut tx, id, &form_data, "updated").await?;

    let updated_submission = Submission {
        form_data: form_data.clone(),
        status: "updated".to_string(),
        ..submission
    };

    // Resubmission on a needs_info case implicitly moves it back to review.
    let from = CaseStatus::from_str(&case.status);
    if from == Some(CaseStatus::NeedsInfo)
        && workflow::transition_allowed(CaseStatus::NeedsInfo, CaseStatus::InReview, actor.role)
    {
        case.status = CaseStatus::InReview.as_str().to_string();
        store::insert_event(
            &mut tx,
            &case.id,
            EventType::StatusChanged,
            actor,
            "Status changed: needs_info -> in_review",
            &json!({"from": "needs_info", "to": "in_review", "reason": "submission resubmitted"}),
        )
        .await?;
    }

    case.searchable_text = rebuild_searchable_text(&case, Some(&updated_submission));
    case.updated_at = store::now_ts();
    store::update_case(&mut tx, &case).await?;

    store::insert_event(
        &mut tx,
        &case.id,
        EventType::SubmissionUpdated,
        actor,
        "Submission updated by submitter",
        &json!({"submission_id": id}),
    )
    .await?;
    tx.commit().await?;

    recompute::run_hook(state, &case.id, "submission_updated").await;

    Ok(updated_submission)
}

/// Soft cancel. The submission becomes immutable and its case read-only.
pub async fn cancel_submission(state: &AppState, actor: &Actor, id: &str) -> AppResult<Submission> {
    if !matches!(actor.role, ActorRole::Submitter | ActorRole::Admin) {
        return Err(AppError::Conflict(
            "only the submitter or an admin may cancel a submission".to_string(),
        ));
    }

    let pool = state.db.pool();
    let submission = store::get_submission(pool, id).await?;
    if submission.status == "cancelled" {
        return Err(AppError::Conflict("submission is already cancelled".to_string()));
    }

    let case = store::get_case_for_submission(pool, id).await.ok();

    let mut tx = pool.begin().await?;
    store::set_submission_status(&mut tx, id, "cancelled").await?;
    if let Some(case) = &case {
        store::insert_event(
            &mut tx,
            &case.id,
            EventType::SubmissionCancelled,
            actor,
            "Submission cancelled; case is now read-only",
            &json!({"submission_id": id}),
        )
        .await?;
    }
    tx.commit().await?;

    log::info!("Submission {} cancelled", id);

    Ok(Submission {
        status: "cancelled".to_string(),
        ..submission
    })
}
