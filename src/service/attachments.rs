//! Attachment operations: upload, listing, download with soft-delete and
//! redaction checks, removal, redaction, and the blob retention sweep.

use chrono::Duration;
use serde::Deserialize;
use serde_json::json;

use crate::db::schema::Attachment;
use crate::db::store;
use crate::error::{AppError, AppResult};
use crate::recompute;
use crate::workflow::{Actor, ActorRole, EventType};
use crate::AppState;

use super::ensure_case_writable;

/// Maximum attachment size: 10 MiB.
pub const MAX_ATTACHMENT_SIZE_BYTES: usize = 10 * 1024 * 1024;

/// Accepted content types and their file extensions.
const ACCEPTED_CONTENT_TYPES: &[(&str, &str)] = &[
    ("application/pdf", "pdf"),
    ("image/jpeg", "jpg"),
    ("image/png", "png"),
];

fn extension_for(content_type: &str) -> Option<&'static str> {
    ACCEPTED_CONTENT_TYPES
        .iter()
        .find(|(ct, _)| *ct == content_type)
        .map(|(_, ext)| *ext)
}

#[derive(Debug, Deserialize)]
pub struct UploadAttachmentInput {
    pub filename: String,
    pub content_type: String,
    pub description: Option<String>,
    pub data: Vec<u8>,
}

/// Upload an attachment: validate, write the blob, store metadata, emit the
/// timeline event.
pub async fn upload_attachment(
    state: &AppState,
    actor: &Actor,
    case_id: &str,
    input: UploadAttachmentInput,
) -> AppResult<Attachment> {
    if input.filename.is_empty() || input.filename.len() > 255 {
        return Err(AppError::BadRequest("invalid filename".to_string()));
    }
    if input.data.is_empty() {
        return Err(AppError::BadRequest("empty file".to_string()));
    }
    if input.data.len() > MAX_ATTACHMENT_SIZE_BYTES {
        return Err(AppError::BadRequest(format!(
            "file exceeds maximum upload size of {}MiB",
            MAX_ATTACHMENT_SIZE_BYTES / 1024 / 1024
        )));
    }
    let ext = extension_for(&input.content_type).ok_or_else(|| {
        AppError::BadRequest(format!(
            "unsupported content type: {} (accepted: PDF, JPEG, PNG)",
            input.content_type
        ))
    })?;

    let pool = state.db.pool();
    let case = store::get_case(pool, case_id).await?;
    ensure_case_writable(pool, &case).await?;

    let id = uuid::Uuid::new_v4().to_string();
    let (hash, storage_path) = state
        .storage
        .store_attachment(case_id, &id, ext, &input.data)
        .map_err(|e| AppError::Storage(format!("failed to store attachment: {}", e)))?;

    let attachment = Attachment {
        id,
        case_id: case_id.to_string(),
        submission_id: case.submission_id.clone(),
        filename: input.filename,
        content_type: input.content_type,
        size_bytes: input.data.len() as i64,
        storage_path: storage_path.to_string_lossy().to_string(),
        uploaded_by: actor.id.clone().unwrap_or_default(),
        description: input.description.unwrap_or_default(),
        is_deleted: false,
        deleted_at: None,
        deleted_by: None,
        delete_reason: None,
        is_redacted: false,
        redacted_at: None,
        redacted_by: None,
        redact_reason: None,
        original_sha256: hash,
        created_at: store::now_ts(),
    };

    let mut tx = pool.begin().await?;
    store::insert_attachment(&mut tx, &attachment).await?;
    store::insert_event(
        &mut tx,
        case_id,
        EventType::AttachmentAdded,
        actor,
        &format!("Attachment added: {}", attachment.filename),
        &json!({
            "attachment_id": attachment.id,
            "filename": attachment.filename,
            "content_type": attachment.content_type,
            "size_bytes": attachment.size_bytes,
        }),
    )
    .await?;
    tx.commit().await?;

    recompute::run_hook(state, case_id, "attachment_uploaded").await;

    Ok(attachment)
}

pub async fn list_attachments(state: &AppState, case_id: &str) -> AppResult<Vec<Attachment>> {
    let pool = state.db.pool();
    store::get_case(pool, case_id).await?;
    store::list_attachments(pool, case_id).await
}

/// Download an attachment's bytes.
///
/// Soft-deleted attachments are `Gone`; redacted ones are withheld with
/// `UnavailableForLegalReasons` so the UI can word each case correctly.
pub async fn download_attachment(
    state: &AppState,
    actor: &Actor,
    case_id: &str,
    attachment_id: &str,
) -> AppResult<(Attachment, Vec<u8>)> {
    let pool = state.db.pool();
    let attachment = store::get_attachment(pool, attachment_id).await?;
    if attachment.case_id != case_id {
        return Err(AppError::NotFound(format!(
            "Attachment not found on case: {}",
            attachment_id
        )));
    }
    if attachment.is_deleted {
        return Err(AppError::Gone("attachment has been deleted".to_string()));
    }
    if attachment.is_redacted {
        return Err(AppError::UnavailableForLegalReasons(
            "attachment has been redacted".to_string(),
        ));
    }

    let data = state
        .storage
        .read_file(std::path::Path::new(&attachment.storage_path))
        .map_err(|e| AppError::Storage(format!("failed to read attachment: {}", e)))?;

    let mut tx = pool.begin().await?;
    store::insert_event(
        &mut tx,
        case_id,
        EventType::AttachmentDownloaded,
        actor,
        &format!("Attachment downloaded: {}", attachment.filename),
        &json!({"attachment_id": attachment.id}),
    )
    .await?;
    tx.commit().await?;

    Ok((attachment, data))
}

#[derive(Debug, Default, Deserialize)]
pub struct RemoveAttachmentInput {
    pub reason: Option<String>,
}

/// Soft-delete an attachment. The blob stays on disk until the retention
/// sweep collects it.
pub async fn remove_attachment(
    state: &AppState,
    actor: &Actor,
    case_id: &str,
    attachment_id: &str,
    input: RemoveAttachmentInput,
) -> AppResult<Attachment> {
    let pool = state.db.pool();
    let case = store::get_case(pool, case_id).await?;
    ensure_case_writable(pool, &case).await?;

    let attachment = store::get_attachment(pool, attachment_id).await?;
    if attachment.case_id != case_id {
        return Err(AppError::NotFound(format!(
            "Attachment not found on case: {}",
            attachment_id
        )));
    }
    if attachment.is_deleted {
        return Err(AppError::Conflict("attachment is already deleted".to_string()));
    }

    let mut tx = pool.begin().await?;
    store::mark_attachment_deleted(&mut tx, attachment_id, actor, input.reason.as_deref()).await?;
    store::insert_event(
        &mut tx,
        case_id,
        EventType::EvidenceRemoved,
        actor,
        &format!("Attachment removed: {}", attachment.filename),
        &json!({"attachment_id": attachment.id, "reason": input.reason}),
    )
    .await?;
    tx.commit().await?;

    store::get_attachment(pool, attachment_id).await
}

#[derive(Debug, Default, Deserialize)]
pub struct RedactAttachmentInput {
    pub reason: Option<String>,
}

/// Redact an attachment. Downloads fail with the legal-hold kind afterwards.
pub async fn redact_attachment(
    state: &AppState,
    actor: &Actor,
    case_id: &str,
    attachment_id: &str,
    input: RedactAttachmentInput,
) -> AppResult<Attachment> {
    if actor.role == ActorRole::Submitter {
        return Err(AppError::Conflict(
            "submitters may not redact attachments".to_string(),
        ));
    }

    let pool = state.db.pool();
    let case = store::get_case(pool, case_id).await?;
    ensure_case_writable(pool, &case).await?;

    let attachment = store::get_attachment(pool, attachment_id).await?;
    if attachment.case_id != case_id {
        return Err(AppError::NotFound(format!(
            "Attachment not found on case: {}",
            attachment_id
        )));
    }
    if attachment.is_redacted {
        return Err(AppError::Conflict("attachment is already redacted".to_string()));
    }

    let mut tx = pool.begin().await?;
    store::mark_attachment_redacted(&mut tx, attachment_id, actor, input.reason.as_deref()).await?;
    store::insert_event(
        &mut tx,
        case_id,
        EventType::EvidenceRedacted,
        actor,
        &format!("Attachment redacted: {}", attachment.filename),
        &json!({"attachment_id": attachment.id, "reason": input.reason}),
    )
    .await?;
    tx.commit().await?;

    store::get_attachment(pool, attachment_id).await
}

/// Retention sweep: delete blob files of attachments soft-deleted longer ago
/// than the evidence retention window. Metadata rows stay. Intended to be
/// run daily by the operator's scheduler; logs the purge count.
pub async fn sweep_retention(state: &AppState) -> AppResult<u64> {
    let cutoff = (chrono::Utc::now()
        - Duration::days(state.config.retention.evidence_retention_days))
    .to_rfc3339_opts(chrono::SecondsFormat::Micros, true);

    let expired = store::list_expired_deleted_attachments(state.db.pool(), &cutoff).await?;

    let mut purged = 0u64;
    for attachment in &expired {
        match state.storage.delete_file(&attachment.storage_path) {
            Ok(()) => purged += 1,
            Err(e) => log::warn!(
                "Retention sweep could not delete blob {}: {}",
                attachment.storage_path,
                e
            ),
        }
    }

    log::info!("Retention sweep purged {} attachment blobs", purged);
    Ok(purged)
}
