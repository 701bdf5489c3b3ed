//! Audit export: assemble the case bundle, apply retention and redaction,
//! attach the integrity report, and sign the result.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::db::schema::{Case, CaseEvent, EvidenceItem, HistoryEntry, Submission};
use crate::db::store;
use crate::error::{AppError, AppResult};
use crate::integrity;
use crate::redaction::{self, scanner, RedactionMode};
use crate::signing;
use crate::workflow::{Actor, EventType};
use crate::AppState;

use super::parse_json;

/// Bundle format version stamped into `metadata`.
pub const FORMAT_VERSION: &str = "1.0";

/// Per-request export deadline.
pub const EXPORT_DEADLINE_SECS: u64 = 30;

const EVENT_EXPORT_LIMIT: i64 = 1000;

#[derive(Debug, Default, Deserialize)]
pub struct ExportQuery {
    #[serde(default)]
    pub include_payload: bool,
    /// Requested redaction mode; only honored for admin and devsupport.
    pub mode: Option<String>,
}

fn submission_to_value(s: &Submission) -> AppResult<Value> {
    let mut v = serde_json::to_value(s)?;
    if let Some(map) = v.as_object_mut() {
        map.insert("form_data".to_string(), parse_json(&s.form_data));
        if let Some(raw) = &s.raw_payload {
            map.insert("raw_payload".to_string(), parse_json(raw));
        }
        if let Some(output) = &s.evaluator_output {
            map.insert("evaluator_output".to_string(), parse_json(output));
        }
    }
    Ok(v)
}

fn case_to_value(c: &Case) -> AppResult<Value> {
    let mut v = serde_json::to_value(c)?;
    if let Some(map) = v.as_object_mut() {
        map.insert(
            "packet_evidence_ids".to_string(),
            parse_json(&c.packet_evidence_ids),
        );
    }
    Ok(v)
}

fn evidence_to_value(e: &EvidenceItem) -> AppResult<Value> {
    let mut v = serde_json::to_value(e)?;
    if let Some(map) = v.as_object_mut() {
        map.insert("tags".to_string(), parse_json(&e.tags));
        map.insert("metadata".to_string(), parse_json(&e.metadata));
    }
    Ok(v)
}

fn event_to_value(e: &CaseEvent) -> AppResult<Value> {
    let mut v = serde_json::to_value(e)?;
    if let Some(map) = v.as_object_mut() {
        map.remove("payload_json");
        map.insert("payload".to_string(), parse_json(&e.payload_json));
    }
    Ok(v)
}

fn history_to_value(h: &HistoryEntry) -> AppResult<Value> {
    let mut v = serde_json::to_value(h)?;
    if let Some(map) = v.as_object_mut() {
        map.remove("payload_json");
        map.insert("payload".to_string(), parse_json(&h.payload_json));
    }
    Ok(v)
}

/// Produce the signed export bundle for a case.
///
/// An invalid history chain does not block the export: the bundle is still
/// produced with `integrity_check.is_valid = false` reported in-band, and
/// the caller decides whether to trust it.
pub async fn export_case(
    state: &AppState,
    actor: &Actor,
    case_id: &str,
    query: ExportQuery,
) -> AppResult<Value> {
    let deadline = std::time::Duration::from_secs(EXPORT_DEADLINE_SECS);
    let bundle = tokio::time::timeout(deadline, assemble_bundle(state, actor, case_id, &query))
        .await
        .map_err(|_| {
            AppError::Internal(format!(
                "export deadline of {}s exceeded for case {}",
                EXPORT_DEADLINE_SECS, case_id
            ))
        })??;

    // The exported event is only recorded for bundles that actually went out.
    let mut tx = state.db.pool().begin().await?;
    store::insert_event(
        &mut tx,
        case_id,
        EventType::Exported,
        actor,
        "Case exported",
        &json!({
            "include_payload": query.include_payload,
            "redaction_mode": bundle["export_metadata"]["redaction_mode"],
        }),
    )
    .await?;
    tx.commit().await?;

    Ok(bundle)
}

async fn assemble_bundle(
    state: &AppState,
    actor: &Actor,
    case_id: &str,
    query: &ExportQuery,
) -> AppResult<Value> {
    let pool = state.db.pool();

    let case = store::get_case(pool, case_id).await?;
    let submission = match &case.submission_id {
        Some(id) => Some(store::get_submission(pool, id).await?),
        None => None,
    };
    let evidence = store::list_evidence(pool, case_id).await?;
    let events = store::list_events(pool, case_id, EVENT_EXPORT_LIMIT).await?;
    let attachments = store::list_attachments(pool, case_id).await?;
    let history = store::list_history_oldest_first(pool, case_id).await?;

    // Integrity runs over the stored chain, before any view transformation.
    let integrity_check = integrity::verify_chain(&history);
    let duplicate_analysis = integrity::analyze_duplicates(&history);

    // Retention works on copies: the store itself stays append-only.
    let mut evidence_work = evidence.clone();
    let mut history_work = history.clone();
    let retention_stats = redaction::apply_retention(
        &mut evidence_work,
        &mut history_work,
        &state.config.retention,
        chrono::Utc::now(),
    );
    if !query.include_payload {
        for entry in &mut history_work {
            entry.payload_json = "{}".to_string();
        }
    }

    let mut history_values = Vec::with_capacity(history_work.len());
    for entry in &history_work {
        history_values.push(history_to_value(entry)?);
    }

    let mut case_section = json!({
        "case": case_to_value(&case)?,
        "submission": match &submission {
            Some(s) => submission_to_value(s)?,
            None => Value::Null,
        },
        "evidence": evidence_work
            .iter()
            .map(evidence_to_value)
            .collect::<AppResult<Vec<_>>>()?,
        "events": events
            .iter()
            .map(event_to_value)
            .collect::<AppResult<Vec<_>>>()?,
        "attachments": attachments
            .iter()
            .map(|a| serde_json::to_value(a).map_err(AppError::from))
            .collect::<AppResult<Vec<_>>>()?,
    });

    let requested_mode = match &query.mode {
        Some(raw) => Some(RedactionMode::from_str(raw).ok_or_else(|| {
            AppError::BadRequest(format!("invalid redaction mode: {}", raw))
        })?),
        None => None,
    };
    let mode = redaction::effective_mode(requested_mode, actor.role);

    // Scan the case content and each run payload; metadata, hashes, and
    // integrity sections stay out of scope.
    let mut findings = scanner::scan(&case_section, "$.case");
    for (i, entry) in history_values.iter().enumerate() {
        findings.extend(scanner::scan(
            &entry["payload"],
            &format!("$.history[{}].payload", i),
        ));
    }

    let mut redacted_fields = 0;
    if mode == RedactionMode::Safe {
        redacted_fields += scanner::redact_in_place(&mut case_section);
        for entry in &mut history_values {
            if let Some(payload) = entry.get_mut("payload") {
                redacted_fields += scanner::redact_in_place(payload);
            }
        }
    }

    let report = redaction::build_report(mode, &findings, redacted_fields, retention_stats);

    let mut bundle = json!({
        "metadata": {
            "case_id": case_id,
            "export_timestamp": store::now_ts(),
            "total_entries": history.len(),
            "include_payload": query.include_payload,
            "format_version": FORMAT_VERSION,
        },
        "integrity_check": integrity_check,
        "duplicate_analysis": duplicate_analysis,
        "history": history_values,
        "case": case_section,
        "export_metadata": {
            "redaction_mode": mode.as_str(),
            "redacted_fields_count": report.redacted_fields_count,
            "retention_policy": state.config.retention,
            "redaction_report": report,
        },
    });

    let key = state.config.signing_key()?;
    signing::attach_signature(&mut bundle, key.as_bytes())?;

    Ok(bundle)
}

/// Consumer-side verification result.
#[derive(Debug, Clone, Serialize)]
pub struct ExportVerification {
    pub signature_valid: bool,
    pub integrity_valid: bool,
}

/// Verify a previously exported bundle: recompute the canonical HMAC, then
/// check the in-band integrity report.
pub fn verify_export(bundle: &Value, key: &[u8]) -> AppResult<ExportVerification> {
    let signature_valid = signing::verify_bundle(bundle, key)?;
    let integrity_valid = bundle
        .pointer("/integrity_check/is_valid")
        .and_then(Value::as_bool)
        .unwrap_or(false);
    Ok(ExportVerification {
        signature_valid,
        integrity_valid,
    })
}
