//! Integrity layer: canonical hashing, history chain verification, and
//! duplicate-input analysis.
//!
//! The chain (`previous_run_id` links) detects reordering and deletion of
//! history entries; it is not a signature. External integrity for exports is
//! provided separately by the HMAC in `signing`.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::{HashMap, HashSet};

use crate::db::schema::HistoryEntry;

/// Render a JSON value in canonical form: object keys sorted recursively,
/// minimal separators, no insignificant whitespace.
pub fn canonical_json(value: &Value) -> String {
    let mut out = String::new();
    write_canonical(value, &mut out);
    out
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Null => out.push_str("null"),
        Value::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
        Value::Number(n) => out.push_str(&n.to_string()),
        Value::String(s) => {
            // serde_json string escaping is deterministic
            out.push_str(&serde_json::to_string(s).unwrap_or_else(|_| "\"\"".to_string()));
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&serde_json::to_string(key).unwrap_or_else(|_| "\"\"".to_string()));
                out.push(':');
                write_canonical(&map[*key], out);
            }
            out.push('}');
        }
    }
}

/// SHA-256 over the canonical form of a JSON value, hex-encoded.
pub fn hash_canonical(value: &Value) -> String {
    let mut hasher = Sha256::new();
    hasher.update(canonical_json(value).as_bytes());
    hex::encode(hasher.finalize())
}

/// Hash of the inputs that determine a rule-engine run.
///
/// Only the submission form data, evidence summaries, and the rule pack
/// version participate. Volatile fields (timestamps, generated ids, actor
/// identity) are deliberately excluded: equal hashes must imply equal
/// rule-engine output.
pub fn compute_input_hash(form_data: &Value, evidence_summaries: &Value) -> String {
    let input = serde_json::json!({
        "form_data": form_data,
        "evidence_summaries": evidence_summaries,
        "rule_pack_version": crate::rules::RULE_PACK_VERSION,
    });
    hash_canonical(&input)
}

/// A break in the history chain: an entry whose `previous_run_id` does not
/// match the id of its chronological predecessor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrokenLink {
    pub entry_id: String,
    pub expected_previous: Option<String>,
    pub actual_previous: Option<String>,
}

/// Result of verifying a case's history chain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntegrityReport {
    pub is_valid: bool,
    pub broken_links: Vec<BrokenLink>,
    pub orphaned_entries: Vec<String>,
    pub total_entries: i64,
    pub verified_entries: i64,
}

/// A group of history entries sharing one input hash.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DuplicateGroup {
    pub input_hash: String,
    pub count: i64,
    pub entry_ids: Vec<String>,
}

/// Duplicate-input report. Duplicates are normal (a recompute on unchanged
/// inputs) but surfaced so reviewers can see them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DuplicateAnalysis {
    pub total_entries: i64,
    pub unique_hashes: i64,
    pub duplicate_groups: Vec<DuplicateGroup>,
}

/// Verify the chain for one case. `entries` must be ordered oldest-first by
/// `computed_at` (the order the store returns for verification).
pub fn verify_chain(entries: &[HistoryEntry]) -> IntegrityReport {
    let known_ids: HashSet<&str> = entries.iter().map(|e| e.id.as_str()).collect();

    let mut broken_links = Vec::new();
    let mut orphaned = Vec::new();
    let mut verified = 0i64;

    for (i, entry) in entries.iter().enumerate() {
        let expected = if i == 0 {
            None
        } else {
            Some(entries[i - 1].id.clone())
        };

        if entry.previous_run_id == expected {
            verified += 1;
        } else {
            broken_links.push(BrokenLink {
                entry_id: entry.id.clone(),
                expected_previous: expected,
                actual_previous: entry.previous_run_id.clone(),
            });
        }

        if let Some(prev) = &entry.previous_run_id {
            if !known_ids.contains(prev.as_str()) {
                orphaned.push(entry.id.clone());
            }
        }
    }

    IntegrityReport {
        is_valid: broken_links.is_empty() && orphaned.is_empty(),
        broken_links,
        orphaned_entries: orphaned,
        total_entries: entries.len() as i64,
        verified_entries: verified,
    }
}

/// Group entries by input hash and report any hash seen more than once.
pub fn analyze_duplicates(entries: &[HistoryEntry]) -> DuplicateAnalysis {
    let mut groups: HashMap<&str, Vec<&str>> = HashMap::new();
    for entry in entries {
        groups
            .entry(entry.input_hash.as_str())
            .or_default()
            .push(entry.id.as_str());
    }

    let unique_hashes = groups.len() as i64;
    let mut duplicate_groups: Vec<DuplicateGroup> = groups
        .into_iter()
        .filter(|(_, ids)| ids.len() > 1)
        .map(|(hash, ids)| DuplicateGroup {
            input_hash: hash.to_string(),
            count: ids.len() as i64,
            entry_ids: ids.into_iter().map(String::from).collect(),
        })
        .collect();
    duplicate_groups.sort_by(|a, b| a.input_hash.cmp(&b.input_hash));

    DuplicateAnalysis {
        total_entries: entries.len() as i64,
        unique_hashes,
        duplicate_groups,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn entry(id: &str, prev: Option<&str>, hash: &str, computed_at: &str) -> HistoryEntry {
        HistoryEntry {
            id: id.to_string(),
            case_id: "case-1".to_string(),
            computed_at: computed_at.to_string(),
            confidence_score: 100.0,
            confidence_band: "high".to_string(),
            rules_passed: 8,
            rules_total: 8,
            gap_count: 0,
            bias_count: 0,
            trigger_kind: "manual".to_string(),
            actor_role: "system".to_string(),
            input_hash: hash.to_string(),
            previous_run_id: prev.map(String::from),
            payload_json: "{}".to_string(),
        }
    }

    #[test]
    fn test_canonical_json_sorts_keys() {
        let a = json!({"b": 1, "a": {"d": 2, "c": [1, 2]}});
        assert_eq!(canonical_json(&a), r#"{"a":{"c":[1,2],"d":2},"b":1}"#);
    }

    #[test]
    fn test_hash_ignores_key_order() {
        let a: Value = serde_json::from_str(r#"{"x": 1, "y": {"b": 2, "a": 3}}"#).unwrap();
        let b: Value = serde_json::from_str(r#"{"y": {"a": 3, "b": 2}, "x": 1}"#).unwrap();
        assert_eq!(hash_canonical(&a), hash_canonical(&b));
    }

    #[test]
    fn test_hash_deterministic() {
        let form = json!({"name": "Dr. Smith", "state": "OH"});
        let evidence = json!([]);
        assert_eq!(
            compute_input_hash(&form, &evidence),
            compute_input_hash(&form, &evidence)
        );
    }

    #[test]
    fn test_hash_changes_with_input() {
        let evidence = json!([]);
        let a = compute_input_hash(&json!({"state": "OH"}), &evidence);
        let b = compute_input_hash(&json!({"state": "TX"}), &evidence);
        assert_ne!(a, b);
    }

    #[test]
    fn test_verify_intact_chain() {
        let entries = vec![
            entry("e0", None, "h0", "2025-01-01T00:00:00Z"),
            entry("e1", Some("e0"), "h1", "2025-01-01T00:00:05Z"),
            entry("e2", Some("e1"), "h2", "2025-01-01T00:00:10Z"),
        ];
        let report = verify_chain(&entries);
        assert!(report.is_valid);
        assert_eq!(report.total_entries, 3);
        assert_eq!(report.verified_entries, 3);
        assert!(report.broken_links.is_empty());
        assert!(report.orphaned_entries.is_empty());
    }

    #[test]
    fn test_verify_detects_tampered_link() {
        let entries = vec![
            entry("e0", None, "h0", "2025-01-01T00:00:00Z"),
            entry("e1", Some("bogus"), "h1", "2025-01-01T00:00:05Z"),
        ];
        let report = verify_chain(&entries);
        assert!(!report.is_valid);
        assert_eq!(report.broken_links.len(), 1);
        assert_eq!(report.broken_links[0].entry_id, "e1");
        assert_eq!(report.broken_links[0].expected_previous, Some("e0".to_string()));
        // "bogus" does not exist in this case's history at all
        assert_eq!(report.orphaned_entries, vec!["e1".to_string()]);
    }

    #[test]
    fn test_verify_first_entry_must_have_null_previous() {
        let entries = vec![entry("e0", Some("ghost"), "h0", "2025-01-01T00:00:00Z")];
        let report = verify_chain(&entries);
        assert!(!report.is_valid);
        assert_eq!(report.broken_links.len(), 1);
        assert_eq!(report.broken_links[0].expected_previous, None);
    }

    #[test]
    fn test_duplicate_analysis() {
        let entries = vec![
            entry("e0", None, "same", "2025-01-01T00:00:00Z"),
            entry("e1", Some("e0"), "same", "2025-01-01T00:00:05Z"),
            entry("e2", Some("e1"), "other", "2025-01-01T00:00:10Z"),
        ];
        let analysis = analyze_duplicates(&entries);
        assert_eq!(analysis.total_entries, 3);
        assert_eq!(analysis.unique_hashes, 2);
        assert_eq!(analysis.duplicate_groups.len(), 1);
        assert_eq!(analysis.duplicate_groups[0].input_hash, "same");
        assert_eq!(analysis.duplicate_groups[0].count, 2);
    }
}
