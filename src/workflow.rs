//! Case workflow rules.
//!
//! Pure state-machine logic for case statuses, role permissions, SLA math,
//! and the denormalized search text. No I/O lives here; the service layer
//! persists the outcomes and emits timeline events.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Role of the actor performing a request, carried by the HTTP frontend
/// in the `X-AutoComply-Role` header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActorRole {
    Submitter,
    Verifier,
    Admin,
    Devsupport,
    System,
}

impl ActorRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActorRole::Submitter => "submitter",
            ActorRole::Verifier => "verifier",
            ActorRole::Admin => "admin",
            ActorRole::Devsupport => "devsupport",
            ActorRole::System => "system",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "submitter" => Some(Self::Submitter),
            "verifier" => Some(Self::Verifier),
            "admin" => Some(Self::Admin),
            "devsupport" => Some(Self::Devsupport),
            "system" => Some(Self::System),
            _ => None,
        }
    }
}

/// The request actor: role plus an optional stable identity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Actor {
    pub role: ActorRole,
    pub id: Option<String>,
}

impl Actor {
    pub fn new(role: ActorRole, id: impl Into<String>) -> Self {
        Self {
            role,
            id: Some(id.into()),
        }
    }

    /// Actor for internally generated events (null identity).
    pub fn system() -> Self {
        Self {
            role: ActorRole::System,
            id: None,
        }
    }
}

/// Case status machine states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaseStatus {
    New,
    InReview,
    NeedsInfo,
    Approved,
    Rejected,
    Blocked,
    Closed,
}

impl CaseStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CaseStatus::New => "new",
            CaseStatus::InReview => "in_review",
            CaseStatus::NeedsInfo => "needs_info",
            CaseStatus::Approved => "approved",
            CaseStatus::Rejected => "rejected",
            CaseStatus::Blocked => "blocked",
            CaseStatus::Closed => "closed",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "new" => Some(Self::New),
            "in_review" => Some(Self::InReview),
            "needs_info" => Some(Self::NeedsInfo),
            "approved" => Some(Self::Approved),
            "rejected" => Some(Self::Rejected),
            "blocked" => Some(Self::Blocked),
            "closed" => Some(Self::Closed),
            _ => None,
        }
    }

    /// Terminal states admit no further transitions and stop the SLA clock.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            CaseStatus::Approved | CaseStatus::Rejected | CaseStatus::Blocked | CaseStatus::Closed
        )
    }
}

/// Whether `role` may move a case from `from` to `to`.
///
/// Terminal states admit nothing. `closed` is reachable from any non-terminal
/// state, admin only. The `needs_info -> in_review` edge is also open to the
/// submitter, covering the implicit transition on resubmit.
pub fn transition_allowed(from: CaseStatus, to: CaseStatus, role: ActorRole) -> bool {
    use ActorRole::*;
    use CaseStatus::*;

    if from.is_terminal() || from == to {
        return false;
    }

    match (from, to) {
        (New, InReview) | (New, NeedsInfo) => matches!(role, Verifier | Admin),
        (InReview, Approved) | (InReview, Rejected) | (InReview, Blocked) => {
            matches!(role, Verifier | Admin)
        }
        (NeedsInfo, InReview) => matches!(role, Submitter | Verifier | Admin),
        (_, Closed) => matches!(role, Admin),
        _ => false,
    }
}

/// Timeline event types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    CaseCreated,
    Assigned,
    Unassigned,
    StatusChanged,
    NoteAdded,
    EvidenceAttached,
    EvidenceRemoved,
    EvidenceRedacted,
    AttachmentAdded,
    AttachmentDownloaded,
    RequestInfo,
    SubmissionUpdated,
    SubmissionCancelled,
    DecisionIntelligenceUpdated,
    Exported,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::CaseCreated => "case_created",
            EventType::Assigned => "assigned",
            EventType::Unassigned => "unassigned",
            EventType::StatusChanged => "status_changed",
            EventType::NoteAdded => "note_added",
            EventType::EvidenceAttached => "evidence_attached",
            EventType::EvidenceRemoved => "evidence_removed",
            EventType::EvidenceRedacted => "evidence_redacted",
            EventType::AttachmentAdded => "attachment_added",
            EventType::AttachmentDownloaded => "attachment_downloaded",
            EventType::RequestInfo => "request_info",
            EventType::SubmissionUpdated => "submission_updated",
            EventType::SubmissionCancelled => "submission_cancelled",
            EventType::DecisionIntelligenceUpdated => "decision_intelligence_updated",
            EventType::Exported => "exported",
        }
    }
}

/// Review window in hours for a decision type. The CSF family reviews within
/// a day; everything else gets the license-family window.
pub fn sla_hours(decision_type: &str) -> i64 {
    if decision_type.to_lowercase().starts_with("csf") {
        24
    } else {
        48
    }
}

/// Compute the due timestamp for a new case.
pub fn due_at_for(decision_type: &str, created_at: DateTime<Utc>) -> DateTime<Utc> {
    created_at + Duration::hours(sla_hours(decision_type))
}

/// SLA view fields, derived at read time and never stored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlaInfo {
    pub age_hours: f64,
    pub remaining_hours: f64,
    pub overdue: bool,
}

/// Compute SLA fields for a case as of `now`.
pub fn compute_sla(
    created_at: DateTime<Utc>,
    due_at: DateTime<Utc>,
    status: CaseStatus,
    now: DateTime<Utc>,
) -> SlaInfo {
    let age = now - created_at;
    let remaining = due_at - now;
    SlaInfo {
        age_hours: age.num_seconds() as f64 / 3600.0,
        remaining_hours: remaining.num_seconds() as f64 / 3600.0,
        overdue: remaining < Duration::zero() && !status.is_terminal(),
    }
}

/// Build the denormalized search text for a case.
///
/// Lowercased, whitespace-collapsed concatenation of the case title, summary,
/// decision type, assignee, and the linked submission's identifying fields.
pub fn build_searchable_text(parts: &[Option<&str>]) -> String {
    let joined: Vec<String> = parts
        .iter()
        .flatten()
        .map(|s| s.to_lowercase())
        .collect();
    joined
        .join(" ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_role_round_trip() {
        for role in [
            ActorRole::Submitter,
            ActorRole::Verifier,
            ActorRole::Admin,
            ActorRole::Devsupport,
            ActorRole::System,
        ] {
            assert_eq!(ActorRole::from_str(role.as_str()), Some(role));
        }
        assert_eq!(ActorRole::from_str("auditor"), None);
    }

    #[test]
    fn test_status_round_trip() {
        for status in [
            CaseStatus::New,
            CaseStatus::InReview,
            CaseStatus::NeedsInfo,
            CaseStatus::Approved,
            CaseStatus::Rejected,
            CaseStatus::Blocked,
            CaseStatus::Closed,
        ] {
            assert_eq!(CaseStatus::from_str(status.as_str()), Some(status));
        }
    }

    #[test]
    fn test_transition_matrix() {
        use ActorRole::*;
        use CaseStatus::*;

        let all_statuses = [New, InReview, NeedsInfo, Approved, Rejected, Blocked, Closed];
        let all_roles = [Submitter, Verifier, Admin, Devsupport, System];

        // The full allow-list; everything else must be rejected.
        let allowed: &[(CaseStatus, CaseStatus, ActorRole)] = &[
            (New, InReview, Verifier),
            (New, InReview, Admin),
            (New, NeedsInfo, Verifier),
            (New, NeedsInfo, Admin),
            (InReview, Approved, Verifier),
            (InReview, Approved, Admin),
            (InReview, Rejected, Verifier),
            (InReview, Rejected, Admin),
            (InReview, Blocked, Verifier),
            (InReview, Blocked, Admin),
            (NeedsInfo, InReview, Submitter),
            (NeedsInfo, InReview, Verifier),
            (NeedsInfo, InReview, Admin),
            (New, Closed, Admin),
            (InReview, Closed, Admin),
            (NeedsInfo, Closed, Admin),
        ];

        for from in all_statuses {
            for to in all_statuses {
                for role in all_roles {
                    let expected = allowed.contains(&(from, to, role));
                    assert_eq!(
                        transition_allowed(from, to, role),
                        expected,
                        "{:?} -> {:?} as {:?}",
                        from,
                        to,
                        role
                    );
                }
            }
        }
    }

    #[test]
    fn test_terminal_states_frozen() {
        for from in [
            CaseStatus::Approved,
            CaseStatus::Rejected,
            CaseStatus::Blocked,
            CaseStatus::Closed,
        ] {
            assert!(!transition_allowed(from, CaseStatus::New, ActorRole::Admin));
            assert!(!transition_allowed(from, CaseStatus::Closed, ActorRole::Admin));
        }
    }

    #[test]
    fn test_sla_hours_by_family() {
        assert_eq!(sla_hours("csf"), 24);
        assert_eq!(sla_hours("csf_practitioner"), 24);
        assert_eq!(sla_hours("CSF_PHARMACY"), 24);
        assert_eq!(sla_hours("csa"), 48);
        assert_eq!(sla_hours("license_renewal"), 48);
    }

    #[test]
    fn test_compute_sla_overdue() {
        let created = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        let due = due_at_for("csf", created);
        assert_eq!(due, Utc.with_ymd_and_hms(2025, 1, 2, 0, 0, 0).unwrap());

        // Two days later, non-terminal case is overdue
        let now = Utc.with_ymd_and_hms(2025, 1, 3, 0, 0, 0).unwrap();
        let sla = compute_sla(created, due, CaseStatus::InReview, now);
        assert!(sla.overdue);
        assert!(sla.remaining_hours < 0.0);
        assert!((sla.age_hours - 48.0).abs() < f64::EPSILON);

        // Terminal case is never overdue
        let sla = compute_sla(created, due, CaseStatus::Approved, now);
        assert!(!sla.overdue);
    }

    #[test]
    fn test_build_searchable_text() {
        let text = build_searchable_text(&[
            Some("CSF  Review"),
            Some("Dr.\tSmith"),
            None,
            Some("csf_practitioner"),
        ]);
        assert_eq!(text, "csf review dr. smith csf_practitioner");
    }
}
