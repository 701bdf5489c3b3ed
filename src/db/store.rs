//! Typed store operations for every entity, plus filtered case listing.
//!
//! Read paths take the pool; write paths take a `SqliteConnection` so the
//! service layer can group a mutation with its timeline event in one
//! transaction.

use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::{QueryBuilder, Sqlite, SqliteConnection, SqlitePool};

use crate::db::schema::{Attachment, Case, CaseEvent, EvidenceItem, HistoryEntry, Submission};
use crate::error::{AppError, AppResult};
use crate::workflow::{Actor, EventType};

/// Current UTC timestamp with fixed microsecond precision so stored strings
/// sort lexicographically in chronological order.
pub fn now_ts() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Parse a stored timestamp back into a `DateTime<Utc>`.
pub fn parse_ts(s: &str) -> AppResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| AppError::Internal(format!("invalid stored timestamp '{}': {}", s, e)))
}

// ============================================
// Submissions
// ============================================

pub async fn insert_submission(conn: &mut SqliteConnection, s: &Submission) -> AppResult<()> {
    sqlx::query(
        "INSERT INTO submissions (id, decision_type, submitted_by, account_id, location_id, form_data, raw_payload, evaluator_output, status, created_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&s.id)
    .bind(&s.decision_type)
    .bind(&s.submitted_by)
    .bind(&s.account_id)
    .bind(&s.location_id)
    .bind(&s.form_data)
    .bind(&s.raw_payload)
    .bind(&s.evaluator_output)
    .bind(&s.status)
    .bind(&s.created_at)
    .execute(conn)
    .await?;
    Ok(())
}

pub async fn get_submission(pool: &SqlitePool, id: &str) -> AppResult<Submission> {
    sqlx::query_as::<_, Submission>("SELECT * FROM submissions WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Submission not found: {}", id)))
}

pub async fn update_submission_form(
    conn: &mut SqliteConnection,
    id: &str,
    form_data: &str,
    status: &str,
) -> AppResult<()> {
    let result = sqlx::query("UPDATE submissions SET form_data = ?, status = ? WHERE id = ?")
        .bind(form_data)
        .bind(status)
        .bind(id)
        .execute(conn)
        .await?;
    if result.rows_affected() == 0 {
        return Err(AppError::NotFound(format!("Submission not found: {}", id)));
    }
    Ok(())
}

pub async fn set_submission_status(
    conn: &mut SqliteConnection,
    id: &str,
    status: &str,
) -> AppResult<()> {
    let result = sqlx::query("UPDATE submissions SET status = ? WHERE id = ?")
        .bind(status)
        .bind(id)
        .execute(conn)
        .await?;
    if result.rows_affected() == 0 {
        return Err(AppError::NotFound(format!("Submission not found: {}", id)));
    }
    Ok(())
}

// ============================================
// Cases
// ============================================

pub async fn insert_case(conn: &mut SqliteConnection, c: &Case) -> AppResult<()> {
    sqlx::query(
        "INSERT INTO cases (id, submission_id, decision_type, title, summary, status, assigned_to, assigned_at, due_at, packet_evidence_ids, searchable_text, reviewer_notes, admin_notes, created_at, updated_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&c.id)
    .bind(&c.submission_id)
    .bind(&c.decision_type)
    .bind(&c.title)
    .bind(&c.summary)
    .bind(&c.status)
    .bind(&c.assigned_to)
    .bind(&c.assigned_at)
    .bind(&c.due_at)
    .bind(&c.packet_evidence_ids)
    .bind(&c.searchable_text)
    .bind(&c.reviewer_notes)
    .bind(&c.admin_notes)
    .bind(&c.created_at)
    .bind(&c.updated_at)
    .execute(conn)
    .await?;
    Ok(())
}

pub async fn get_case(pool: &SqlitePool, id: &str) -> AppResult<Case> {
    sqlx::query_as::<_, Case>("SELECT * FROM cases WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Case not found: {}", id)))
}

pub async fn get_case_for_submission(pool: &SqlitePool, submission_id: &str) -> AppResult<Case> {
    sqlx::query_as::<_, Case>("SELECT * FROM cases WHERE submission_id = ?")
        .bind(submission_id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("No case for submission: {}", submission_id)))
}

/// Write back every mutable case field. `due_at` and `created_at` are
/// immutable after creation and deliberately not part of the update.
pub async fn update_case(conn: &mut SqliteConnection, c: &Case) -> AppResult<()> {
    let result = sqlx::query(
        "UPDATE cases SET title = ?, summary = ?, status = ?, assigned_to = ?, assigned_at = ?, packet_evidence_ids = ?, searchable_text = ?, reviewer_notes = ?, admin_notes = ?, updated_at = ? WHERE id = ?",
    )
    .bind(&c.title)
    .bind(&c.summary)
    .bind(&c.status)
    .bind(&c.assigned_to)
    .bind(&c.assigned_at)
    .bind(&c.packet_evidence_ids)
    .bind(&c.searchable_text)
    .bind(&c.reviewer_notes)
    .bind(&c.admin_notes)
    .bind(&c.updated_at)
    .bind(&c.id)
    .execute(conn)
    .await?;
    if result.rows_affected() == 0 {
        return Err(AppError::NotFound(format!("Case not found: {}", c.id)));
    }
    Ok(())
}

/// Delete a case and everything it owns. Blob files are left for the
/// retention sweep.
pub async fn delete_case(pool: &SqlitePool, id: &str) -> AppResult<()> {
    let mut tx = pool.begin().await?;
    sqlx::query("DELETE FROM evidence_items WHERE case_id = ?")
        .bind(id)
        .execute(&mut *tx)
        .await?;
    sqlx::query("DELETE FROM case_events WHERE case_id = ?")
        .bind(id)
        .execute(&mut *tx)
        .await?;
    sqlx::query("DELETE FROM intelligence_history WHERE case_id = ?")
        .bind(id)
        .execute(&mut *tx)
        .await?;
    sqlx::query("DELETE FROM attachments WHERE case_id = ?")
        .bind(id)
        .execute(&mut *tx)
        .await?;
    let result = sqlx::query("DELETE FROM cases WHERE id = ?")
        .bind(id)
        .execute(&mut *tx)
        .await?;
    if result.rows_affected() == 0 {
        return Err(AppError::NotFound(format!("Case not found: {}", id)));
    }
    tx.commit().await?;
    Ok(())
}

/// Filters for `list_cases`. Free-text `q` is matched as a substring of the
/// denormalized `searchable_text` after lowercasing and whitespace collapse.
#[derive(Debug, Clone, Default)]
pub struct CaseFilters {
    pub status: Option<String>,
    pub assigned_to: Option<String>,
    pub decision_type: Option<String>,
    pub q: Option<String>,
    pub overdue: bool,
    pub unassigned: bool,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

fn normalize_query(q: &str) -> String {
    q.to_lowercase().split_whitespace().collect::<Vec<_>>().join(" ")
}

pub async fn list_cases(pool: &SqlitePool, filters: &CaseFilters) -> AppResult<Vec<Case>> {
    let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new("SELECT * FROM cases WHERE 1=1");

    if let Some(status) = &filters.status {
        qb.push(" AND status = ").push_bind(status.clone());
    }
    if let Some(assigned_to) = &filters.assigned_to {
        qb.push(" AND assigned_to = ").push_bind(assigned_to.clone());
    }
    if let Some(decision_type) = &filters.decision_type {
        qb.push(" AND decision_type = ").push_bind(decision_type.clone());
    }
    if let Some(q) = &filters.q {
        let needle = format!("%{}%", normalize_query(q));
        qb.push(" AND searchable_text LIKE ").push_bind(needle);
    }
    if filters.unassigned {
        qb.push(" AND (assigned_to IS NULL OR assigned_to = '')");
    }
    if filters.overdue {
        qb.push(" AND due_at < ").push_bind(now_ts());
        qb.push(" AND status NOT IN ('approved', 'rejected', 'blocked', 'closed')");
    }

    qb.push(" ORDER BY created_at DESC");
    qb.push(" LIMIT ").push_bind(filters.limit.unwrap_or(50));
    qb.push(" OFFSET ").push_bind(filters.offset.unwrap_or(0));

    let cases = qb.build_query_as::<Case>().fetch_all(pool).await?;
    Ok(cases)
}

// ============================================
// Evidence
// ============================================

pub async fn insert_evidence(conn: &mut SqliteConnection, e: &EvidenceItem) -> AppResult<()> {
    sqlx::query(
        "INSERT INTO evidence_items (id, case_id, title, snippet, citation, source_id, tags, metadata, included_in_packet, created_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&e.id)
    .bind(&e.case_id)
    .bind(&e.title)
    .bind(&e.snippet)
    .bind(&e.citation)
    .bind(&e.source_id)
    .bind(&e.tags)
    .bind(&e.metadata)
    .bind(e.included_in_packet)
    .bind(&e.created_at)
    .execute(conn)
    .await?;
    Ok(())
}

pub async fn list_evidence(pool: &SqlitePool, case_id: &str) -> AppResult<Vec<EvidenceItem>> {
    let items = sqlx::query_as::<_, EvidenceItem>(
        "SELECT * FROM evidence_items WHERE case_id = ? ORDER BY created_at DESC",
    )
    .bind(case_id)
    .fetch_all(pool)
    .await?;
    Ok(items)
}

/// Flip `included_in_packet` so it mirrors the case's ordered id list.
pub async fn sync_packet_flags(
    conn: &mut SqliteConnection,
    case_id: &str,
    included_ids: &[String],
) -> AppResult<()> {
    sqlx::query("UPDATE evidence_items SET included_in_packet = 0 WHERE case_id = ?")
        .bind(case_id)
        .execute(&mut *conn)
        .await?;
    for id in included_ids {
        sqlx::query("UPDATE evidence_items SET included_in_packet = 1 WHERE id = ? AND case_id = ?")
            .bind(id)
            .bind(case_id)
            .execute(&mut *conn)
            .await?;
    }
    Ok(())
}

// ============================================
// Case events
// ============================================

/// Insert a timeline event. Called inside the same transaction as the
/// mutation it describes.
pub async fn insert_event(
    conn: &mut SqliteConnection,
    case_id: &str,
    event_type: EventType,
    actor: &Actor,
    message: &str,
    payload: &serde_json::Value,
) -> AppResult<CaseEvent> {
    let event = CaseEvent {
        id: uuid::Uuid::new_v4().to_string(),
        case_id: case_id.to_string(),
        created_at: now_ts(),
        event_type: event_type.as_str().to_string(),
        actor_role: actor.role.as_str().to_string(),
        actor_id: actor.id.clone(),
        message: message.to_string(),
        payload_json: payload.to_string(),
    };
    sqlx::query(
        "INSERT INTO case_events (id, case_id, created_at, event_type, actor_role, actor_id, message, payload_json)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&event.id)
    .bind(&event.case_id)
    .bind(&event.created_at)
    .bind(&event.event_type)
    .bind(&event.actor_role)
    .bind(&event.actor_id)
    .bind(&event.message)
    .bind(&event.payload_json)
    .execute(conn)
    .await?;
    Ok(event)
}

pub async fn list_events(
    pool: &SqlitePool,
    case_id: &str,
    limit: i64,
) -> AppResult<Vec<CaseEvent>> {
    let events = sqlx::query_as::<_, CaseEvent>(
        "SELECT * FROM case_events WHERE case_id = ? ORDER BY created_at DESC LIMIT ?",
    )
    .bind(case_id)
    .bind(limit)
    .fetch_all(pool)
    .await?;
    Ok(events)
}

// ============================================
// Attachments
// ============================================

pub async fn insert_attachment(conn: &mut SqliteConnection, a: &Attachment) -> AppResult<()> {
    sqlx::query(
        "INSERT INTO attachments (id, case_id, submission_id, filename, content_type, size_bytes, storage_path, uploaded_by, description, is_deleted, deleted_at, deleted_by, delete_reason, is_redacted, redacted_at, redacted_by, redact_reason, original_sha256, created_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&a.id)
    .bind(&a.case_id)
    .bind(&a.submission_id)
    .bind(&a.filename)
    .bind(&a.content_type)
    .bind(a.size_bytes)
    .bind(&a.storage_path)
    .bind(&a.uploaded_by)
    .bind(&a.description)
    .bind(a.is_deleted)
    .bind(&a.deleted_at)
    .bind(&a.deleted_by)
    .bind(&a.delete_reason)
    .bind(a.is_redacted)
    .bind(&a.redacted_at)
    .bind(&a.redacted_by)
    .bind(&a.redact_reason)
    .bind(&a.original_sha256)
    .bind(&a.created_at)
    .execute(conn)
    .await?;
    Ok(())
}

pub async fn get_attachment(pool: &SqlitePool, id: &str) -> AppResult<Attachment> {
    sqlx::query_as::<_, Attachment>("SELECT * FROM attachments WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Attachment not found: {}", id)))
}

pub async fn list_attachments(pool: &SqlitePool, case_id: &str) -> AppResult<Vec<Attachment>> {
    let attachments = sqlx::query_as::<_, Attachment>(
        "SELECT * FROM attachments WHERE case_id = ? ORDER BY created_at DESC",
    )
    .bind(case_id)
    .fetch_all(pool)
    .await?;
    Ok(attachments)
}

pub async fn mark_attachment_deleted(
    conn: &mut SqliteConnection,
    id: &str,
    actor: &Actor,
    reason: Option<&str>,
) -> AppResult<()> {
    let result = sqlx::query(
        "UPDATE attachments SET is_deleted = 1, deleted_at = ?, deleted_by = ?, delete_reason = ? WHERE id = ?",
    )
    .bind(now_ts())
    .bind(actor.id.as_deref().unwrap_or("unknown"))
    .bind(reason)
    .bind(id)
    .execute(conn)
    .await?;
    if result.rows_affected() == 0 {
        return Err(AppError::NotFound(format!("Attachment not found: {}", id)));
    }
    Ok(())
}

pub async fn mark_attachment_redacted(
    conn: &mut SqliteConnection,
    id: &str,
    actor: &Actor,
    reason: Option<&str>,
) -> AppResult<()> {
    let result = sqlx::query(
        "UPDATE attachments SET is_redacted = 1, redacted_at = ?, redacted_by = ?, redact_reason = ? WHERE id = ?",
    )
    .bind(now_ts())
    .bind(actor.id.as_deref().unwrap_or("unknown"))
    .bind(reason)
    .bind(id)
    .execute(conn)
    .await?;
    if result.rows_affected() == 0 {
        return Err(AppError::NotFound(format!("Attachment not found: {}", id)));
    }
    Ok(())
}

/// Soft-deleted attachments whose delete timestamp precedes `cutoff`; the
/// retention sweep removes their blob files.
pub async fn list_expired_deleted_attachments(
    pool: &SqlitePool,
    cutoff: &str,
) -> AppResult<Vec<Attachment>> {
    let attachments = sqlx::query_as::<_, Attachment>(
        "SELECT * FROM attachments WHERE is_deleted = 1 AND deleted_at IS NOT NULL AND deleted_at < ?",
    )
    .bind(cutoff)
    .fetch_all(pool)
    .await?;
    Ok(attachments)
}

// ============================================
// Intelligence history
// ============================================

pub async fn insert_history_entry(
    conn: &mut SqliteConnection,
    entry: &HistoryEntry,
) -> AppResult<()> {
    sqlx::query(
        "INSERT INTO intelligence_history (id, case_id, computed_at, confidence_score, confidence_band, rules_passed, rules_total, gap_count, bias_count, trigger_kind, actor_role, input_hash, previous_run_id, payload_json)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&entry.id)
    .bind(&entry.case_id)
    .bind(&entry.computed_at)
    .bind(entry.confidence_score)
    .bind(&entry.confidence_band)
    .bind(entry.rules_passed)
    .bind(entry.rules_total)
    .bind(entry.gap_count)
    .bind(entry.bias_count)
    .bind(&entry.trigger_kind)
    .bind(&entry.actor_role)
    .bind(&entry.input_hash)
    .bind(&entry.previous_run_id)
    .bind(&entry.payload_json)
    .execute(conn)
    .await?;
    Ok(())
}

/// Latest history entry for a case, by `computed_at`.
pub async fn latest_history_entry(
    conn: &mut SqliteConnection,
    case_id: &str,
) -> AppResult<Option<HistoryEntry>> {
    let entry = sqlx::query_as::<_, HistoryEntry>(
        "SELECT * FROM intelligence_history WHERE case_id = ? ORDER BY computed_at DESC LIMIT 1",
    )
    .bind(case_id)
    .fetch_optional(conn)
    .await?;
    Ok(entry)
}

pub async fn list_history(
    pool: &SqlitePool,
    case_id: &str,
    limit: i64,
) -> AppResult<Vec<HistoryEntry>> {
    let entries = sqlx::query_as::<_, HistoryEntry>(
        "SELECT * FROM intelligence_history WHERE case_id = ? ORDER BY computed_at DESC LIMIT ?",
    )
    .bind(case_id)
    .bind(limit)
    .fetch_all(pool)
    .await?;
    Ok(entries)
}

/// Full history oldest-first, the order chain verification and export use.
pub async fn list_history_oldest_first(
    pool: &SqlitePool,
    case_id: &str,
) -> AppResult<Vec<HistoryEntry>> {
    let entries = sqlx::query_as::<_, HistoryEntry>(
        "SELECT * FROM intelligence_history WHERE case_id = ? ORDER BY computed_at ASC",
    )
    .bind(case_id)
    .fetch_all(pool)
    .await?;
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_query() {
        assert_eq!(normalize_query("  Dr.   SMITH  "), "dr. smith");
        assert_eq!(normalize_query("csf\tpractitioner"), "csf practitioner");
    }

    #[test]
    fn test_now_ts_fixed_precision() {
        let ts = now_ts();
        assert!(ts.ends_with('Z'));
        // RFC 3339 with exactly microsecond precision: fixed 27-char width
        assert_eq!(ts.len(), 27);
        assert!(parse_ts(&ts).is_ok());
    }

    #[test]
    fn test_parse_ts_rejects_garbage() {
        assert!(parse_ts("yesterday").is_err());
    }
}
