//! End-to-end scenarios over a temporary SQLite database.

use serde_json::json;
use tempfile::TempDir;

use autocomply::config::{AppConfig, DEV_DEFAULT_SIGNING_KEY};
use autocomply::error::AppError;
use autocomply::service::attachments::{self, RemoveAttachmentInput, UploadAttachmentInput};
use autocomply::service::cases::{self, CaseListQuery, SetStatusInput};
use autocomply::service::evidence::{self, AttachEvidenceInput, SetPacketInput};
use autocomply::service::export::{self, ExportQuery};
use autocomply::service::intelligence::{self as intel_service, RecomputeInput};
use autocomply::service::submissions::{self, CreateSubmissionInput, PatchSubmissionInput};
use autocomply::workflow::{Actor, ActorRole};
use autocomply::AppState;

async fn test_state() -> (AppState, TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let config = AppConfig {
        data_dir: dir.path().to_path_buf(),
        uploads_root: dir.path().join("uploads"),
        ..AppConfig::default()
    };
    let state = AppState::new(config).await.unwrap();
    (state, dir)
}

fn submitter() -> Actor {
    Actor::new(ActorRole::Submitter, "sub-1")
}

fn verifier() -> Actor {
    Actor::new(ActorRole::Verifier, "ver-1")
}

fn admin() -> Actor {
    Actor::new(ActorRole::Admin, "adm-1")
}

fn csf_input() -> CreateSubmissionInput {
    CreateSubmissionInput {
        decision_type: "csf".to_string(),
        form_data: json!({
            "name": "Dr. Smith",
            "licenseNumber": "NP.123",
            "address": "1 Main St",
            "state": "OH",
            "specialty": "CNP",
            "experience": "5y",
            "zip": "43215",
            "email": "x@y.com",
        }),
        submitted_by: Some("sub-1".to_string()),
        account_id: None,
        location_id: None,
        raw_payload: None,
        evaluator_output: None,
    }
}

// Scenario A: happy-path CSF submission.
#[tokio::test]
async fn csf_submission_scores_perfect_confidence() {
    let (state, _dir) = test_state().await;

    let response = submissions::create_submission(&state, &submitter(), csf_input())
        .await
        .unwrap();
    assert_eq!(response.case.status, "new");
    assert_eq!(response.case.submission_id.as_deref(), Some(response.submission.id.as_str()));

    let history = intel_service::history(&state, &response.case.id, None)
        .await
        .unwrap();
    assert_eq!(history.len(), 1);

    let entry = &history[0];
    assert_eq!(entry.confidence_score, 100.0);
    assert_eq!(entry.confidence_band, "high");
    assert_eq!(entry.rules_passed, 8);
    assert_eq!(entry.rules_total, 8);
    assert_eq!(entry.previous_run_id, None);
    assert_eq!(entry.trigger_kind, "submission");
}

// Scenario B: CSA with a missing state scores 3/5.
#[tokio::test]
async fn csa_missing_state_scores_medium() {
    let (state, _dir) = test_state().await;

    let input = CreateSubmissionInput {
        decision_type: "csa".to_string(),
        form_data: json!({"name": "X", "address": "Y", "zip": "43215"}),
        submitted_by: None,
        account_id: None,
        location_id: None,
        raw_payload: None,
        evaluator_output: None,
    };
    let response = submissions::create_submission(&state, &submitter(), input)
        .await
        .unwrap();

    let history = intel_service::history(&state, &response.case.id, None)
        .await
        .unwrap();
    assert_eq!(history.len(), 1);

    let entry = &history[0];
    assert_eq!(entry.rules_passed, 3);
    assert_eq!(entry.rules_total, 5);
    assert_eq!(entry.confidence_score, 60.0);
    assert_eq!(entry.confidence_band, "medium");

    let payload: serde_json::Value = serde_json::from_str(&entry.payload_json).unwrap();
    let rules_hit: Vec<&str> = payload["rules_hit"]
        .as_array()
        .unwrap()
        .iter()
        .map(|v| v.as_str().unwrap())
        .collect();
    assert!(!rules_hit.contains(&"state_valid"));
}

// Scenario C: manual recompute inside the throttle window is a no-op.
#[tokio::test]
async fn recompute_within_throttle_returns_existing_entry() {
    let (state, _dir) = test_state().await;

    let response = submissions::create_submission(&state, &submitter(), csf_input())
        .await
        .unwrap();

    let result = intel_service::recompute_case(
        &state,
        &verifier(),
        &response.case.id,
        RecomputeInput {
            reason: Some("manual_recompute".to_string()),
            force: false,
        },
    )
    .await
    .unwrap();

    assert!(!result.recomputed);
    let history = intel_service::history(&state, &response.case.id, None)
        .await
        .unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(result.entry.unwrap().id, history[0].id);
}

// Scenario D: a tampered chain link is reported in the export, and the
// bundle is still produced.
#[tokio::test]
async fn export_reports_tampered_chain() {
    let (state, _dir) = test_state().await;

    let response = submissions::create_submission(&state, &submitter(), csf_input())
        .await
        .unwrap();
    let case_id = response.case.id.clone();

    // Second run, spaced past the 2 s write guard.
    tokio::time::sleep(std::time::Duration::from_secs(3)).await;
    let second = intel_service::recompute_case(
        &state,
        &admin(),
        &case_id,
        RecomputeInput {
            reason: Some("manual_recompute".to_string()),
            force: true,
        },
    )
    .await
    .unwrap();
    assert!(second.recomputed);
    let e1 = second.entry.unwrap();

    let history = intel_service::history(&state, &case_id, None).await.unwrap();
    assert_eq!(history.len(), 2);

    // Tamper with the newest entry's chain link directly in the store.
    sqlx::query("UPDATE intelligence_history SET previous_run_id = ? WHERE id = ?")
        .bind("not-a-real-run-id")
        .bind(&e1.id)
        .execute(state.db.pool())
        .await
        .unwrap();

    let bundle = export::export_case(&state, &admin(), &case_id, ExportQuery::default())
        .await
        .unwrap();

    assert_eq!(bundle["integrity_check"]["is_valid"], json!(false));
    let broken = bundle["integrity_check"]["broken_links"].as_array().unwrap();
    assert_eq!(broken.len(), 1);
    assert_eq!(broken[0]["entry_id"], json!(e1.id));

    // The signature still verifies: tampering happened before signing.
    let verification =
        export::verify_export(&bundle, DEV_DEFAULT_SIGNING_KEY.as_bytes()).unwrap();
    assert!(verification.signature_valid);
    assert!(!verification.integrity_valid);
}

// Scenario E: verifier exports are forced to safe mode and PII is
// sentinel-replaced.
#[tokio::test]
async fn verifier_export_redacts_pii() {
    let (state, _dir) = test_state().await;

    let input = CreateSubmissionInput {
        decision_type: "csf".to_string(),
        form_data: json!({
            "name": "Dr. Smith",
            "email": "a@b.com",
            "phone": "555-987-6543",
        }),
        submitted_by: None,
        account_id: None,
        location_id: None,
        raw_payload: None,
        evaluator_output: None,
    };
    let response = submissions::create_submission(&state, &submitter(), input)
        .await
        .unwrap();

    let bundle = export::export_case(
        &state,
        &verifier(),
        &response.case.id,
        ExportQuery {
            include_payload: true,
            mode: Some("full".to_string()), // ignored for verifiers
        },
    )
    .await
    .unwrap();

    assert_eq!(bundle["export_metadata"]["redaction_mode"], json!("safe"));
    let report = &bundle["export_metadata"]["redaction_report"];
    assert!(report["rules_triggered"]["email"].as_i64().unwrap() >= 1);
    assert!(report["rules_triggered"]["phone"].as_i64().unwrap() >= 1);

    let form = &bundle["case"]["submission"]["form_data"];
    assert_eq!(form["email"], json!("[REDACTED]"));
    assert_eq!(form["phone"], json!("[REDACTED]"));
}

// Scenario F: a cancelled submission freezes its case.
#[tokio::test]
async fn cancelled_case_is_read_only() {
    let (state, _dir) = test_state().await;

    let response = submissions::create_submission(&state, &submitter(), csf_input())
        .await
        .unwrap();
    let case_id = response.case.id.clone();

    // Move into review first so an approve would otherwise be legal.
    cases::set_status(
        &state,
        &verifier(),
        &case_id,
        SetStatusInput {
            status: "in_review".to_string(),
            reason: None,
        },
    )
    .await
    .unwrap();

    submissions::cancel_submission(&state, &submitter(), &response.submission.id)
        .await
        .unwrap();

    let err = cases::set_status(
        &state,
        &verifier(),
        &case_id,
        SetStatusInput {
            status: "approved".to_string(),
            reason: None,
        },
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AppError::Conflict(_)));
    assert!(err.to_string().contains("read-only"));

    // Status unchanged, reads still work, and the timeline recorded the
    // cancellation.
    let snapshot = cases::get_case_snapshot(&state, &case_id).await.unwrap();
    assert_eq!(snapshot.case.status, "in_review");

    let events = cases::list_case_events(&state, &case_id, None).await.unwrap();
    assert!(events.iter().any(|e| e.event_type == "submission_cancelled"));

    // Every other mutation is refused too.
    assert!(matches!(
        cases::assign_case(&state, &verifier(), &case_id, "reviewer").await,
        Err(AppError::Conflict(_))
    ));
    assert!(matches!(
        evidence::attach_evidence(
            &state,
            &verifier(),
            &case_id,
            AttachEvidenceInput {
                title: "late evidence".to_string(),
                snippet: None,
                citation: None,
                source_id: None,
                tags: None,
                metadata: None,
                include_in_packet: false,
            }
        )
        .await,
        Err(AppError::Conflict(_))
    ));
}

#[tokio::test]
async fn assignment_round_trip_and_search() {
    let (state, _dir) = test_state().await;

    let response = submissions::create_submission(&state, &submitter(), csf_input())
        .await
        .unwrap();
    let case_id = response.case.id.clone();

    let case = cases::assign_case(&state, &verifier(), &case_id, "reviewer-9").await.unwrap();
    assert_eq!(case.assigned_to.as_deref(), Some("reviewer-9"));
    assert!(case.assigned_at.is_some());
    assert!(case.searchable_text.contains("reviewer-9"));

    // Assignee is searchable and the unassigned filter excludes the case.
    let hits = cases::list_cases(
        &state,
        CaseListQuery {
            q: Some("Reviewer-9".to_string()),
            ..CaseListQuery::default()
        },
    )
    .await
    .unwrap();
    assert_eq!(hits.len(), 1);

    let unassigned = cases::list_cases(
        &state,
        CaseListQuery {
            unassigned: true,
            ..CaseListQuery::default()
        },
    )
    .await
    .unwrap();
    assert!(unassigned.is_empty());

    let case = cases::unassign_case(&state, &verifier(), &case_id).await.unwrap();
    assert_eq!(case.assigned_to, None);

    let events = cases::list_case_events(&state, &case_id, None).await.unwrap();
    let types: Vec<&str> = events.iter().map(|e| e.event_type.as_str()).collect();
    assert!(types.contains(&"assigned"));
    assert!(types.contains(&"unassigned"));
}

#[tokio::test]
async fn submitter_cannot_pick_up_case() {
    let (state, _dir) = test_state().await;

    let response = submissions::create_submission(&state, &submitter(), csf_input())
        .await
        .unwrap();

    let err = cases::set_status(
        &state,
        &submitter(),
        &response.case.id,
        SetStatusInput {
            status: "in_review".to_string(),
            reason: None,
        },
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AppError::Conflict(_)));
}

#[tokio::test]
async fn needs_info_resubmit_reopens_review() {
    let (state, _dir) = test_state().await;

    let response = submissions::create_submission(&state, &submitter(), csf_input())
        .await
        .unwrap();
    let case_id = response.case.id.clone();

    cases::request_info(
        &state,
        &verifier(),
        &case_id,
        cases::RequestInfoInput {
            message: "please attach the state license".to_string(),
        },
    )
    .await
    .unwrap();

    let snapshot = cases::get_case_snapshot(&state, &case_id).await.unwrap();
    assert_eq!(snapshot.case.status, "needs_info");

    submissions::patch_submission(
        &state,
        &submitter(),
        &response.submission.id,
        PatchSubmissionInput {
            form_data: Some(json!({
                "name": "Dr. Smith",
                "licenseNumber": "NP.123",
                "address": "1 Main St",
                "state": "OH",
                "specialty": "CNP",
                "experience": "5y",
                "zip": "43215",
                "email": "x@y.com",
            })),
        },
    )
    .await
    .unwrap();

    let snapshot = cases::get_case_snapshot(&state, &case_id).await.unwrap();
    assert_eq!(snapshot.case.status, "in_review");

    let events = cases::list_case_events(&state, &case_id, None).await.unwrap();
    let types: Vec<&str> = events.iter().map(|e| e.event_type.as_str()).collect();
    assert!(types.contains(&"request_info"));
    assert!(types.contains(&"submission_updated"));
}

#[tokio::test]
async fn evidence_packet_rejects_foreign_ids() {
    let (state, _dir) = test_state().await;

    let response = submissions::create_submission(&state, &submitter(), csf_input())
        .await
        .unwrap();
    let case_id = response.case.id.clone();

    let item = evidence::attach_evidence(
        &state,
        &verifier(),
        &case_id,
        AttachEvidenceInput {
            title: "license registry extract".to_string(),
            snippet: Some("registry row for NP.123".to_string()),
            citation: Some("registry:ohio".to_string()),
            source_id: None,
            tags: Some(vec!["registry".to_string()]),
            metadata: None,
            include_in_packet: false,
        },
    )
    .await
    .unwrap();

    let packet = evidence::set_packet(
        &state,
        &verifier(),
        &case_id,
        SetPacketInput {
            evidence_ids: vec![item.id.clone()],
        },
    )
    .await
    .unwrap();
    assert_eq!(packet, vec![item.id.clone()]);

    let err = evidence::set_packet(
        &state,
        &verifier(),
        &case_id,
        SetPacketInput {
            evidence_ids: vec!["someone-elses-evidence".to_string()],
        },
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AppError::BadRequest(_)));
}

#[tokio::test]
async fn attachment_lifecycle_flags_gate_downloads() {
    let (state, _dir) = test_state().await;

    let response = submissions::create_submission(&state, &submitter(), csf_input())
        .await
        .unwrap();
    let case_id = response.case.id.clone();

    // Unsupported type is rejected up front.
    let err = attachments::upload_attachment(
        &state,
        &submitter(),
        &case_id,
        UploadAttachmentInput {
            filename: "notes.txt".to_string(),
            content_type: "text/plain".to_string(),
            description: None,
            data: b"hello".to_vec(),
        },
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AppError::BadRequest(_)));

    let attachment = attachments::upload_attachment(
        &state,
        &submitter(),
        &case_id,
        UploadAttachmentInput {
            filename: "license.pdf".to_string(),
            content_type: "application/pdf".to_string(),
            description: Some("scanned license".to_string()),
            data: b"%PDF-1.7 demo".to_vec(),
        },
    )
    .await
    .unwrap();
    assert_eq!(
        attachment.original_sha256,
        autocomply::storage::Storage::calculate_hash(b"%PDF-1.7 demo")
    );

    let (meta, data) = attachments::download_attachment(&state, &verifier(), &case_id, &attachment.id)
        .await
        .unwrap();
    assert_eq!(meta.filename, "license.pdf");
    assert_eq!(data, b"%PDF-1.7 demo");

    // Redacted downloads surface the legal-hold kind.
    attachments::redact_attachment(
        &state,
        &admin(),
        &case_id,
        &attachment.id,
        attachments::RedactAttachmentInput {
            reason: Some("contains PHI".to_string()),
        },
    )
    .await
    .unwrap();
    let err = attachments::download_attachment(&state, &verifier(), &case_id, &attachment.id)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::UnavailableForLegalReasons(_)));

    // A second attachment exercises soft deletion.
    let second = attachments::upload_attachment(
        &state,
        &submitter(),
        &case_id,
        UploadAttachmentInput {
            filename: "photo.png".to_string(),
            content_type: "image/png".to_string(),
            description: None,
            data: vec![0x89, 0x50, 0x4E, 0x47],
        },
    )
    .await
    .unwrap();
    attachments::remove_attachment(
        &state,
        &admin(),
        &case_id,
        &second.id,
        RemoveAttachmentInput {
            reason: Some("duplicate".to_string()),
        },
    )
    .await
    .unwrap();
    let err = attachments::download_attachment(&state, &verifier(), &case_id, &second.id)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Gone(_)));
}

#[tokio::test]
async fn export_round_trip_signature() {
    let (state, _dir) = test_state().await;

    let response = submissions::create_submission(&state, &submitter(), csf_input())
        .await
        .unwrap();

    let mut bundle = export::export_case(
        &state,
        &admin(),
        &response.case.id,
        ExportQuery {
            include_payload: true,
            mode: None,
        },
    )
    .await
    .unwrap();

    assert_eq!(bundle["metadata"]["format_version"], json!("1.0"));
    assert_eq!(bundle["export_metadata"]["redaction_mode"], json!("full"));

    let verification =
        export::verify_export(&bundle, DEV_DEFAULT_SIGNING_KEY.as_bytes()).unwrap();
    assert!(verification.signature_valid);
    assert!(verification.integrity_valid);

    // Any mutation of the history array breaks the signature.
    bundle["history"][0]["confidence_score"] = json!(1.0);
    let verification =
        export::verify_export(&bundle, DEV_DEFAULT_SIGNING_KEY.as_bytes()).unwrap();
    assert!(!verification.signature_valid);

    // An exported event landed on the timeline.
    let events = cases::list_case_events(&state, &response.case.id, None).await.unwrap();
    assert!(events.iter().any(|e| e.event_type == "exported"));
}

#[tokio::test]
async fn history_chain_links_and_stays_append_only() {
    let (state, _dir) = test_state().await;

    let response = submissions::create_submission(&state, &submitter(), csf_input())
        .await
        .unwrap();
    let case_id = response.case.id.clone();

    tokio::time::sleep(std::time::Duration::from_secs(3)).await;
    intel_service::recompute_case(
        &state,
        &admin(),
        &case_id,
        RecomputeInput {
            reason: Some("manual_recompute".to_string()),
            force: true,
        },
    )
    .await
    .unwrap();

    let newest_first = intel_service::history(&state, &case_id, None).await.unwrap();
    assert_eq!(newest_first.len(), 2);
    let (e1, e0) = (&newest_first[0], &newest_first[1]);
    assert_eq!(e0.previous_run_id, None);
    assert_eq!(e1.previous_run_id.as_deref(), Some(e0.id.as_str()));
    assert_eq!(e1.trigger_kind, "manual");

    // Unchanged inputs hash identically and show up in duplicate analysis.
    assert_eq!(e0.input_hash, e1.input_hash);
    let bundle = export::export_case(&state, &admin(), &case_id, ExportQuery::default())
        .await
        .unwrap();
    let groups = bundle["duplicate_analysis"]["duplicate_groups"].as_array().unwrap();
    assert_eq!(groups.len(), 1);
    assert_eq!(groups[0]["count"], json!(2));

    // Workflow churn never rewrites existing history rows.
    cases::set_status(
        &state,
        &verifier(),
        &case_id,
        SetStatusInput {
            status: "in_review".to_string(),
            reason: None,
        },
    )
    .await
    .unwrap();
    let after = intel_service::history(&state, &case_id, None).await.unwrap();
    assert_eq!(after.len(), 2);
    assert_eq!(after[1].id, e0.id);
    assert_eq!(after[1].computed_at, e0.computed_at);
    assert_eq!(after[1].payload_json, e0.payload_json);
}

#[tokio::test]
async fn overdue_filter_tracks_due_date() {
    let (state, _dir) = test_state().await;

    let response = submissions::create_submission(&state, &submitter(), csf_input())
        .await
        .unwrap();

    // Fresh CSF case: 24 h window, not overdue.
    let overdue = cases::list_cases(
        &state,
        CaseListQuery {
            overdue: true,
            ..CaseListQuery::default()
        },
    )
    .await
    .unwrap();
    assert!(overdue.is_empty());

    // Backdate the due date; the case becomes overdue until a terminal
    // decision clears it.
    sqlx::query("UPDATE cases SET due_at = ? WHERE id = ?")
        .bind("2000-01-01T00:00:00.000000Z")
        .bind(&response.case.id)
        .execute(state.db.pool())
        .await
        .unwrap();

    let overdue = cases::list_cases(
        &state,
        CaseListQuery {
            overdue: true,
            ..CaseListQuery::default()
        },
    )
    .await
    .unwrap();
    assert_eq!(overdue.len(), 1);
    assert!(overdue[0].sla.overdue);

    cases::set_status(
        &state,
        &verifier(),
        &response.case.id,
        SetStatusInput {
            status: "in_review".to_string(),
            reason: None,
        },
    )
    .await
    .unwrap();
    cases::set_status(
        &state,
        &verifier(),
        &response.case.id,
        SetStatusInput {
            status: "approved".to_string(),
            reason: Some("meets requirements".to_string()),
        },
    )
    .await
    .unwrap();

    let overdue = cases::list_cases(
        &state,
        CaseListQuery {
            overdue: true,
            ..CaseListQuery::default()
        },
    )
    .await
    .unwrap();
    assert!(overdue.is_empty());
}

#[tokio::test]
async fn retention_sweep_purges_expired_blobs() {
    let (state, _dir) = test_state().await;

    let response = submissions::create_submission(&state, &submitter(), csf_input())
        .await
        .unwrap();
    let case_id = response.case.id.clone();

    let attachment = attachments::upload_attachment(
        &state,
        &submitter(),
        &case_id,
        UploadAttachmentInput {
            filename: "old.pdf".to_string(),
            content_type: "application/pdf".to_string(),
            description: None,
            data: b"%PDF-1.7 old".to_vec(),
        },
    )
    .await
    .unwrap();

    attachments::remove_attachment(
        &state,
        &admin(),
        &case_id,
        &attachment.id,
        RemoveAttachmentInput { reason: None },
    )
    .await
    .unwrap();

    // Nothing to purge yet: the deletion is inside the retention window.
    assert_eq!(attachments::sweep_retention(&state).await.unwrap(), 0);

    // Age the soft-deletion past the window.
    sqlx::query("UPDATE attachments SET deleted_at = ? WHERE id = ?")
        .bind("2000-01-01T00:00:00.000000Z")
        .bind(&attachment.id)
        .execute(state.db.pool())
        .await
        .unwrap();

    assert_eq!(attachments::sweep_retention(&state).await.unwrap(), 1);
    assert!(!std::path::Path::new(&attachment.storage_path).exists());

    // Metadata row survives the sweep.
    let listed = attachments::list_attachments(&state, &case_id).await.unwrap();
    assert_eq!(listed.len(), 1);
    assert!(listed[0].is_deleted);
}

#[tokio::test]
async fn deleting_a_case_cascades_to_owned_rows() {
    use autocomply::db::store;

    let (state, _dir) = test_state().await;

    let response = submissions::create_submission(&state, &submitter(), csf_input())
        .await
        .unwrap();
    let case_id = response.case.id.clone();

    evidence::attach_evidence(
        &state,
        &verifier(),
        &case_id,
        AttachEvidenceInput {
            title: "registry extract".to_string(),
            snippet: None,
            citation: None,
            source_id: None,
            tags: None,
            metadata: None,
            include_in_packet: true,
        },
    )
    .await
    .unwrap();

    store::delete_case(state.db.pool(), &case_id).await.unwrap();

    assert!(matches!(
        store::get_case(state.db.pool(), &case_id).await,
        Err(AppError::NotFound(_))
    ));
    assert!(store::list_evidence(state.db.pool(), &case_id).await.unwrap().is_empty());
    assert!(store::list_events(state.db.pool(), &case_id, 100).await.unwrap().is_empty());
    assert!(store::list_history(state.db.pool(), &case_id, 100).await.unwrap().is_empty());
    assert!(store::list_attachments(state.db.pool(), &case_id).await.unwrap().is_empty());

    // The submission itself is not owned by the case and survives.
    assert!(store::get_submission(state.db.pool(), &response.submission.id).await.is_ok());
}

#[tokio::test]
async fn patch_case_updates_fields_and_notes() {
    let (state, _dir) = test_state().await;

    let response = submissions::create_submission(&state, &submitter(), csf_input())
        .await
        .unwrap();
    let case_id = response.case.id.clone();

    let case = cases::patch_case(
        &state,
        &verifier(),
        &case_id,
        cases::PatchCaseInput {
            title: Some("CSF review: Dr. Smith (priority)".to_string()),
            summary: Some("Escalated by intake".to_string()),
            status: Some("in_review".to_string()),
            assigned_to: Some("reviewer-2".to_string()),
            ..cases::PatchCaseInput::default()
        },
    )
    .await
    .unwrap();
    assert_eq!(case.title, "CSF review: Dr. Smith (priority)");
    assert_eq!(case.status, "in_review");
    assert_eq!(case.assigned_to.as_deref(), Some("reviewer-2"));
    assert!(case.searchable_text.contains("priority"));

    // Submitters cannot touch assignment via PATCH.
    let err = cases::patch_case(
        &state,
        &submitter(),
        &case_id,
        cases::PatchCaseInput {
            assigned_to: Some("someone".to_string()),
            ..cases::PatchCaseInput::default()
        },
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AppError::Conflict(_)));

    let event = cases::add_note(
        &state,
        &verifier(),
        &case_id,
        cases::AddNoteInput {
            note: "called the registry to confirm the license".to_string(),
        },
    )
    .await
    .unwrap();
    assert_eq!(event.event_type, "note_added");

    let snapshot = cases::get_case_snapshot(&state, &case_id).await.unwrap();
    assert!(snapshot
        .case
        .reviewer_notes
        .as_deref()
        .unwrap()
        .contains("registry"));
    assert!(snapshot.latest_intelligence.is_some());
}

#[tokio::test]
async fn cancelled_submission_reads_back_cancelled() {
    let (state, _dir) = test_state().await;

    let response = submissions::create_submission(&state, &submitter(), csf_input())
        .await
        .unwrap();

    submissions::cancel_submission(&state, &submitter(), &response.submission.id)
        .await
        .unwrap();

    let submission = submissions::get_submission(&state, &response.submission.id)
        .await
        .unwrap();
    assert_eq!(submission.status, "cancelled");

    // A second cancel is a conflict, and submitter PATCH is refused.
    assert!(matches!(
        submissions::cancel_submission(&state, &submitter(), &response.submission.id).await,
        Err(AppError::Conflict(_))
    ));
    assert!(matches!(
        submissions::patch_submission(
            &state,
            &submitter(),
            &response.submission.id,
            PatchSubmissionInput { form_data: None }
        )
        .await,
        Err(AppError::Conflict(_))
    ));
}

#[tokio::test]
async fn seed_endpoint_is_token_gated() {
    use autocomply::service::seed;

    let dir = tempfile::tempdir().unwrap();
    let config = AppConfig {
        data_dir: dir.path().to_path_buf(),
        uploads_root: dir.path().join("uploads"),
        dev_seed_token: Some("local-seed".to_string()),
        ..AppConfig::default()
    };
    let state = AppState::new(config).await.unwrap();

    assert!(matches!(
        seed::seed_demo_data(&state, "wrong-token").await,
        Err(AppError::BadRequest(_))
    ));

    let seeded = seed::seed_demo_data(&state, "local-seed").await.unwrap();
    assert_eq!(seeded.case.decision_type, "csf_practitioner");

    let history = intel_service::history(&state, &seeded.case.id, None).await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].confidence_band, "high");

    // Without a configured token the endpoint does not exist.
    let bare_dir = tempfile::tempdir().unwrap();
    let bare = AppState::new(AppConfig {
        data_dir: bare_dir.path().to_path_buf(),
        uploads_root: bare_dir.path().join("uploads"),
        ..AppConfig::default()
    })
    .await
    .unwrap();
    assert!(matches!(
        seed::seed_demo_data(&bare, "local-seed").await,
        Err(AppError::NotFound(_))
    ));
}

#[tokio::test]
async fn health_details_reports_flags_without_secrets() {
    use autocomply::service::health;

    let (state, _dir) = test_state().await;

    assert_eq!(health::healthz()["status"], json!("ok"));

    let report = health::health_details(&state);
    assert!(report.ok);
    assert_eq!(report.environment, "dev");
    assert!(!report.config.dev_seed_enabled);
}
