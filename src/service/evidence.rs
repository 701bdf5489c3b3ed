//! Evidence operations: attach items to a case and curate the export packet.

use serde::Deserialize;
use serde_json::json;

use crate::db::schema::EvidenceItem;
use crate::db::store;
use crate::error::{AppError, AppResult};
use crate::recompute;
use crate::workflow::{Actor, EventType};
use crate::AppState;

use super::ensure_case_writable;

#[derive(Debug, Deserialize)]
pub struct AttachEvidenceInput {
    pub title: String,
    pub snippet: Option<String>,
    pub citation: Option<String>,
    pub source_id: Option<String>,
    pub tags: Option<Vec<String>>,
    pub metadata: Option<serde_json::Value>,
    #[serde(default)]
    pub include_in_packet: bool,
}

/// Attach an evidence item to a case.
pub async fn attach_evidence(
    state: &AppState,
    actor: &Actor,
    case_id: &str,
    input: AttachEvidenceInput,
) -> AppResult<EvidenceItem> {
    if input.title.trim().is_empty() {
        return Err(AppError::BadRequest("evidence title is required".to_string()));
    }

    let pool = state.db.pool();
    let mut case = store::get_case(pool, case_id).await?;
    ensure_case_writable(pool, &case).await?;

    let item = EvidenceItem {
        id: uuid::Uuid::new_v4().to_string(),
        case_id: case_id.to_string(),
        title: input.title.trim().to_string(),
        snippet: input.snippet.unwrap_or_default(),
        citation: input.citation.unwrap_or_default(),
        source_id: input.source_id.unwrap_or_default(),
        tags: json!(input.tags.unwrap_or_default()).to_string(),
        metadata: input.metadata.unwrap_or_else(|| json!({})).to_string(),
        included_in_packet: input.include_in_packet,
        created_at: store::now_ts(),
    };

    let mut tx = pool.begin().await?;
    store::insert_evidence(&mut tx, &item).await?;

    if input.include_in_packet {
        let mut packet: Vec<String> =
            serde_json::from_str(&case.packet_evidence_ids).unwrap_or_default();
        packet.push(item.id.clone());
        case.packet_evidence_ids = json!(packet).to_string();
        case.updated_at = store::now_ts();
        store::update_case(&mut tx, &case).await?;
    }

    store::insert_event(
        &mut tx,
        case_id,
        EventType::EvidenceAttached,
        actor,
        &format!("Evidence attached: {}", item.title),
        &json!({"evidence_id": item.id, "included_in_packet": item.included_in_packet}),
    )
    .await?;
    tx.commit().await?;

    recompute::run_hook(state, case_id, "evidence_attached").await;

    Ok(item)
}

#[derive(Debug, Deserialize)]
pub struct SetPacketInput {
    pub evidence_ids: Vec<String>,
}

/// Replace the ordered packet inclusion list. Every id must name evidence
/// owned by the case.
pub async fn set_packet(
    state: &AppState,
    actor: &Actor,
    case_id: &str,
    input: SetPacketInput,
) -> AppResult<Vec<String>> {
    let pool = state.db.pool();
    let mut case = store::get_case(pool, case_id).await?;
    ensure_case_writable(pool, &case).await?;

    let owned = store::list_evidence(pool, case_id).await?;
    for id in &input.evidence_ids {
        if !owned.iter().any(|e| &e.id == id) {
            return Err(AppError::BadRequest(format!(
                "evidence id not owned by case: {}",
                id
            )));
        }
    }

    case.packet_evidence_ids = json!(input.evidence_ids).to_string();
    case.updated_at = store::now_ts();

    let mut tx = pool.begin().await?;
    store::update_case(&mut tx, &case).await?;
    store::sync_packet_flags(&mut tx, case_id, &input.evidence_ids).await?;
    store::insert_event(
        &mut tx,
        case_id,
        EventType::EvidenceAttached,
        actor,
        &format!("Evidence packet updated ({} items)", input.evidence_ids.len()),
        &json!({"packet_evidence_ids": input.evidence_ids}),
    )
    .await?;
    tx.commit().await?;

    Ok(input.evidence_ids)
}
