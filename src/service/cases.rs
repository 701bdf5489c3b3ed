//! Case operations: listing, snapshots, partial update, assignment, status
//! transitions, timeline, and manual notes.

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::db::schema::{Attachment, Case, CaseEvent, EvidenceItem, HistoryEntry, Submission};
use crate::db::store::{self, CaseFilters};
use crate::error::{AppError, AppResult};
use crate::recompute;
use crate::workflow::{self, Actor, ActorRole, CaseStatus, EventType, SlaInfo};
use crate::AppState;

use super::{ensure_case_writable, rebuild_searchable_text};

/// A case as returned from list endpoints: the stored row plus SLA fields
/// derived at read time.
#[derive(Debug, Serialize)]
pub struct CaseView {
    #[serde(flatten)]
    pub case: Case,
    pub sla: SlaInfo,
}

/// Full case snapshot for the detail view.
#[derive(Debug, Serialize)]
pub struct CaseSnapshot {
    pub case: Case,
    pub sla: SlaInfo,
    pub submission: Option<Submission>,
    pub evidence: Vec<EvidenceItem>,
    pub attachments: Vec<Attachment>,
    pub latest_intelligence: Option<HistoryEntry>,
}

fn sla_for(case: &Case) -> AppResult<SlaInfo> {
    let created_at = store::parse_ts(&case.created_at)?;
    let due_at = store::parse_ts(&case.due_at)?;
    let status = CaseStatus::from_str(&case.status).unwrap_or(CaseStatus::New);
    Ok(workflow::compute_sla(created_at, due_at, status, chrono::Utc::now()))
}

/// Query parameters for `GET /cases`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CaseListQuery {
    pub status: Option<String>,
    pub assigned_to: Option<String>,
    pub decision_type: Option<String>,
    pub q: Option<String>,
    pub overdue: bool,
    pub unassigned: bool,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

pub async fn list_cases(state: &AppState, query: CaseListQuery) -> AppResult<Vec<CaseView>> {
    if let Some(status) = &query.status {
        if CaseStatus::from_str(status).is_none() {
            return Err(AppError::BadRequest(format!("invalid status filter: {}", status)));
        }
    }

    let filters = CaseFilters {
        status: query.status,
        assigned_to: query.assigned_to,
        decision_type: query.decision_type,
        q: query.q,
        overdue: query.overdue,
        unassigned: query.unassigned,
        limit: query.limit,
        offset: query.offset,
    };

    let cases = store::list_cases(state.db.pool(), &filters).await?;
    let mut views = Vec::with_capacity(cases.len());
    for case in cases {
        let sla = sla_for(&case)?;
        views.push(CaseView { case, sla });
    }
    Ok(views)
}

pub async fn get_case_snapshot(state: &AppState, case_id: &str) -> AppResult<CaseSnapshot> {
    let pool = state.db.pool();
    let case = store::get_case(pool, case_id).await?;
    let sla = sla_for(&case)?;

    let submission = match &case.submission_id {
        Some(id) => Some(store::get_submission(pool, id).await?),
        None => None,
    };
    let evidence = store::list_evidence(pool, case_id).await?;
    let attachments = store::list_attachments(pool, case_id).await?;
    let latest_intelligence = store::list_history(pool, case_id, 1).await?.into_iter().next();

    Ok(CaseSnapshot {
        case,
        sla,
        submission,
        evidence,
        attachments,
        latest_intelligence,
    })
}

async fn load_submission_for(
    state: &AppState,
    case: &Case,
) -> AppResult<Option<Submission>> {
    match &case.submission_id {
        Some(id) => Ok(Some(store::get_submission(state.db.pool(), id).await?)),
        None => Ok(None),
    }
}

fn check_transition(from: &str, to: CaseStatus, role: ActorRole) -> AppResult<CaseStatus> {
    let from = CaseStatus::from_str(from)
        .ok_or_else(|| AppError::Internal(format!("case has unknown status: {}", from)))?;
    if !workflow::transition_allowed(from, to, role) {
        return Err(AppError::Conflict(format!(
            "illegal transition {} -> {} for role {}",
            from.as_str(),
            to.as_str(),
            role.as_str()
        )));
    }
    Ok(from)
}

/// Fire the recompute hooks a fresh status warrants.
async fn post_transition_hooks(state: &AppState, case_id: &str, to: CaseStatus) {
    match to {
        CaseStatus::Approved | CaseStatus::Rejected | CaseStatus::Blocked => {
            recompute::run_hook(state, case_id, "decision_saved").await;
        }
        CaseStatus::NeedsInfo => {
            recompute::run_hook(state, case_id, "request_info_created").await;
        }
        _ => {}
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct PatchCaseInput {
    pub title: Option<String>,
    pub summary: Option<String>,
    pub reviewer_notes: Option<String>,
    pub admin_notes: Option<String>,
    pub status: Option<String>,
    pub status_reason: Option<String>,
    /// `Some("")` unassigns; `Some(name)` assigns.
    pub assigned_to: Option<String>,
}

/// Partial update. Emits `status_changed`, `assigned`, or `unassigned`
/// events matching what actually changed.
pub async fn patch_case(
    state: &AppState,
    actor: &Actor,
    case_id: &str,
    input: PatchCaseInput,
) -> AppResult<Case> {
    let pool = state.db.pool();
    let mut case = store::get_case(pool, case_id).await?;
    ensure_case_writable(pool, &case).await?;

    let mut status_to: Option<CaseStatus> = None;
    if let Some(status) = &input.status {
        let to = CaseStatus::from_str(status)
            .ok_or_else(|| AppError::BadRequest(format!("invalid status: {}", status)))?;
        check_transition(&case.status, to, actor.role)?;
        status_to = Some(to);
    }

    if input.assigned_to.is_some() && !matches!(actor.role, ActorRole::Verifier | ActorRole::Admin)
    {
        return Err(AppError::Conflict(format!(
            "role {} may not change assignment",
            actor.role.as_str()
        )));
    }

    let submission = load_submission_for(state, &case).await?;

    let mut tx = pool.begin().await?;

    if let Some(title) = input.title {
        case.title = title;
    }
    if let Some(summary) = input.summary {
        case.summary = summary;
    }
    if let Some(notes) = input.reviewer_notes {
        case.reviewer_notes = Some(notes);
    }
    if let Some(notes) = input.admin_notes {
        case.admin_notes = Some(notes);
    }

    if let Some(to) = status_to {
        let from = case.status.clone();
        case.status = to.as_str().to_string();
        store::insert_event(
            &mut tx,
            case_id,
            EventType::StatusChanged,
            actor,
            &format!("Status changed: {} -> {}", from, to.as_str()),
            &json!({"from": from, "to": to.as_str(), "reason": input.status_reason}),
        )
        .await?;
    }

    match input.assigned_to {
        Some(assignee) if assignee.is_empty() => {
            let previous = case.assigned_to.take();
            case.assigned_at = None;
            store::insert_event(
                &mut tx,
                case_id,
                EventType::Unassigned,
                actor,
                "Case unassigned",
                &json!({"previous_assignee": previous}),
            )
            .await?;
        }
        Some(assignee) => {
            case.assigned_to = Some(assignee.clone());
            case.assigned_at = Some(store::now_ts());
            store::insert_event(
                &mut tx,
                case_id,
                EventType::Assigned,
                actor,
                &format!("Case assigned to {}", assignee),
                &json!({"assignee": assignee}),
            )
            .await?;
        }
        None => {}
    }

    case.searchable_text = rebuild_searchable_text(&case, submission.as_ref());
    case.updated_at = store::now_ts();
    store::update_case(&mut tx, &case).await?;
    tx.commit().await?;

    if let Some(to) = status_to {
        post_transition_hooks(state, case_id, to).await;
    }

    Ok(case)
}

/// Assign a case to a reviewer.
pub async fn assign_case(
    state: &AppState,
    actor: &Actor,
    case_id: &str,
    assignee: &str,
) -> AppResult<Case> {
    if !matches!(actor.role, ActorRole::Verifier | ActorRole::Admin) {
        return Err(AppError::Conflict(format!(
            "role {} may not assign cases",
            actor.role.as_str()
        )));
    }
    if assignee.trim().is_empty() {
        return Err(AppError::BadRequest("assignee is required".to_string()));
    }

    let pool = state.db.pool();
    let mut case = store::get_case(pool, case_id).await?;
    ensure_case_writable(pool, &case).await?;
    let submission = load_submission_for(state, &case).await?;

    case.assigned_to = Some(assignee.trim().to_string());
    case.assigned_at = Some(store::now_ts());
    case.searchable_text = rebuild_searchable_text(&case, submission.as_ref());
    case.updated_at = store::now_ts();

    let mut tx = pool.begin().await?;
    store::update_case(&mut tx, &case).await?;
    store::insert_event(
        &mut tx,
        case_id,
        EventType::Assigned,
        actor,
        &format!("Case assigned to {}", assignee.trim()),
        &json!({"assignee": assignee.trim()}),
    )
    .await?;
    tx.commit().await?;

    Ok(case)
}

/// Remove the current assignee.
pub async fn unassign_case(state: &AppState, actor: &Actor, case_id: &str) -> AppResult<Case> {
    if !matches!(actor.role, ActorRole::Verifier | ActorRole::Admin) {
        return Err(AppError::Conflict(format!(
            "role {} may not unassign cases",
            actor.role.as_str()
        )));
    }

    let pool = state.db.pool();
    let mut case = store::get_case(pool, case_id).await?;
    ensure_case_writable(pool, &case).await?;
    let submission = load_submission_for(state, &case).await?;

    let previous = case.assigned_to.take();
    case.assigned_at = None;
    case.searchable_text = rebuild_searchable_text(&case, submission.as_ref());
    case.updated_at = store::now_ts();

    let mut tx = pool.begin().await?;
    store::update_case(&mut tx, &case).await?;
    store::insert_event(
        &mut tx,
        case_id,
        EventType::Unassigned,
        actor,
        "Case unassigned",
        &json!({"previous_assignee": previous}),
    )
    .await?;
    tx.commit().await?;

    Ok(case)
}

#[derive(Debug, Deserialize)]
pub struct SetStatusInput {
    pub status: String,
    pub reason: Option<String>,
}

/// Explicit status transition endpoint.
pub async fn set_status(
    state: &AppState,
    actor: &Actor,
    case_id: &str,
    input: SetStatusInput,
) -> AppResult<Case> {
    let to = CaseStatus::from_str(&input.status)
        .ok_or_else(|| AppError::BadRequest(format!("invalid status: {}", input.status)))?;

    let pool = state.db.pool();
    let mut case = store::get_case(pool, case_id).await?;
    ensure_case_writable(pool, &case).await?;

    let from = check_transition(&case.status, to, actor.role)?;

    case.status = to.as_str().to_string();
    case.updated_at = store::now_ts();

    let mut tx = pool.begin().await?;
    store::update_case(&mut tx, &case).await?;
    store::insert_event(
        &mut tx,
        case_id,
        EventType::StatusChanged,
        actor,
        &format!("Status changed: {} -> {}", from.as_str(), to.as_str()),
        &json!({"from": from.as_str(), "to": to.as_str(), "reason": input.reason}),
    )
    .await?;
    tx.commit().await?;

    post_transition_hooks(state, case_id, to).await;

    Ok(case)
}

/// Timeline for a case, newest-first.
pub async fn list_case_events(
    state: &AppState,
    case_id: &str,
    limit: Option<i64>,
) -> AppResult<Vec<CaseEvent>> {
    let pool = state.db.pool();
    // Existence check so an unknown case id reads as NotFound, not empty.
    store::get_case(pool, case_id).await?;
    store::list_events(pool, case_id, limit.unwrap_or(100)).await
}

#[derive(Debug, Deserialize)]
pub struct AddNoteInput {
    pub note: String,
}

/// Manual audit note. Verifier notes accumulate on `reviewer_notes`, admin
/// and devsupport notes on `admin_notes`; every note lands on the timeline.
pub async fn add_note(
    state: &AppState,
    actor: &Actor,
    case_id: &str,
    input: AddNoteInput,
) -> AppResult<CaseEvent> {
    if input.note.trim().is_empty() {
        return Err(AppError::BadRequest("note is required".to_string()));
    }

    let pool = state.db.pool();
    let mut case = store::get_case(pool, case_id).await?;
    ensure_case_writable(pool, &case).await?;

    let note = input.note.trim().to_string();
    match actor.role {
        ActorRole::Verifier => {
            case.reviewer_notes = Some(match case.reviewer_notes.take() {
                Some(existing) => format!("{}\n{}", existing, note),
                None => note.clone(),
            });
        }
        ActorRole::Admin | ActorRole::Devsupport => {
            case.admin_notes = Some(match case.admin_notes.take() {
                Some(existing) => format!("{}\n{}", existing, note),
                None => note.clone(),
            });
        }
        _ => {}
    }
    case.updated_at = store::now_ts();

    let mut tx = pool.begin().await?;
    store::update_case(&mut tx, &case).await?;
    let event = store::insert_event(
        &mut tx,
        case_id,
        EventType::NoteAdded,
        actor,
        "Note added",
        &json!({"note": note}),
    )
    .await?;
    tx.commit().await?;

    Ok(event)
}

#[derive(Debug, Deserialize)]
pub struct RequestInfoInput {
    pub message: String,
}

/// Ask the submitter for more information. Moves the case to `needs_info`
/// and triggers a recompute.
pub async fn request_info(
    state: &AppState,
    actor: &Actor,
    case_id: &str,
    input: RequestInfoInput,
) -> AppResult<Case> {
    if input.message.trim().is_empty() {
        return Err(AppError::BadRequest("message is required".to_string()));
    }

    let pool = state.db.pool();
    let mut case = store::get_case(pool, case_id).await?;
    ensure_case_writable(pool, &case).await?;

    let from = check_transition(&case.status, CaseStatus::NeedsInfo, actor.role)?;

    case.status = CaseStatus::NeedsInfo.as_str().to_string();
    case.updated_at = store::now_ts();

    let mut tx = pool.begin().await?;
    store::update_case(&mut tx, &case).await?;
    store::insert_event(
        &mut tx,
        case_id,
        EventType::StatusChanged,
        actor,
        &format!("Status changed: {} -> needs_info", from.as_str()),
        &json!({"from": from.as_str(), "to": "needs_info", "reason": "information requested"}),
    )
    .await?;
    store::insert_event(
        &mut tx,
        case_id,
        EventType::RequestInfo,
        actor,
        "Information requested from submitter",
        &json!({"message": input.message.trim()}),
    )
    .await?;
    tx.commit().await?;

    recompute::run_hook(state, case_id, "request_info_created").await;

    Ok(case)
}
