//! PII scanner.
//!
//! Walks a JSON value depth-first, object keys sorted, and reports findings
//! with JSONPath-style locations. Detection combines value patterns (email,
//! phone, SSN, DEA, license, ZIP) with a reserved list of sensitive field
//! names. The walk order is fully deterministic so repeated scans of the
//! same input produce byte-identical reports.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Sentinel written over redacted values.
pub const REDACTION_SENTINEL: &str = "[REDACTED]";

/// A single detected PII value or sensitive field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PiiFinding {
    pub path: String,
    pub field_name: String,
    pub rule: String,
    pub value_preview: String,
    pub confidence: f64,
}

struct PatternRule {
    name: &'static str,
    confidence: f64,
    regex: &'static Lazy<Regex>,
}

static EMAIL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}").unwrap());
static PHONE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\d{3}[-.\s]\d{3,4}(?:[-.\s]\d{4})?|\d{7}|\d{10}").unwrap());
static SSN_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d{3}-\d{2}-\d{4}").unwrap());
static DEA_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)dea-\d{9,}").unwrap());
static LICENSE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)lic(?:ense)?-\d+").unwrap());
static ZIP_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d{5}(-\d{4})?$").unwrap());

/// Pattern rules in fixed evaluation order.
static PATTERN_RULES: &[PatternRule] = &[
    PatternRule { name: "email", confidence: 0.95, regex: &EMAIL_RE },
    PatternRule { name: "phone", confidence: 0.70, regex: &PHONE_RE },
    PatternRule { name: "ssn", confidence: 0.99, regex: &SSN_RE },
    PatternRule { name: "dea", confidence: 0.90, regex: &DEA_RE },
    PatternRule { name: "license", confidence: 0.80, regex: &LICENSE_RE },
    PatternRule { name: "zip", confidence: 0.60, regex: &ZIP_RE },
];

/// Reserved field names that are sensitive regardless of value shape.
pub const SENSITIVE_FIELD_NAMES: [&str; 40] = [
    "patient_name", "patientname", "dob", "date_of_birth", "birthdate", "mrn",
    "medical_record_number", "ssn", "social_security_number", "tax_id", "ein",
    "dea_number", "npi", "license_number", "passport_number", "drivers_license",
    "phone", "phone_number", "mobile", "fax", "email", "email_address",
    "home_address", "street_address", "address", "zip", "zip_code", "postal_code",
    "account_number", "routing_number", "credit_card", "card_number", "cvv",
    "password", "secret", "api_key", "token", "diagnosis", "prescription",
    "medication",
];

fn is_sensitive_field(name: &str) -> bool {
    let lowered = name.to_lowercase();
    SENSITIVE_FIELD_NAMES.contains(&lowered.as_str())
}

fn preview(text: &str) -> String {
    if text.chars().count() <= 8 {
        text.to_string()
    } else {
        let head: String = text.chars().take(6).collect();
        format!("{}…", head)
    }
}

fn scan_string(path: &str, field_name: &str, text: &str, findings: &mut Vec<PiiFinding>) {
    for rule in PATTERN_RULES {
        if rule.regex.is_match(text) {
            findings.push(PiiFinding {
                path: path.to_string(),
                field_name: field_name.to_string(),
                rule: rule.name.to_string(),
                value_preview: preview(text),
                confidence: rule.confidence,
            });
        }
    }
}

fn walk(value: &Value, path: &str, field_name: &str, findings: &mut Vec<PiiFinding>) {
    match value {
        Value::String(s) => scan_string(path, field_name, s, findings),
        Value::Array(items) => {
            for (i, item) in items.iter().enumerate() {
                walk(item, &format!("{}[{}]", path, i), field_name, findings);
            }
        }
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            for key in keys {
                let child_path = format!("{}.{}", path, key);
                if is_sensitive_field(key) {
                    findings.push(PiiFinding {
                        path: child_path.clone(),
                        field_name: key.to_string(),
                        rule: "sensitive_field_name".to_string(),
                        value_preview: match &map[key] {
                            Value::String(s) => preview(s),
                            other => preview(&other.to_string()),
                        },
                        confidence: 0.85,
                    });
                }
                walk(&map[key], &child_path, key, findings);
            }
        }
        _ => {}
    }
}

/// Scan a JSON value, reporting findings under the given JSONPath prefix
/// (`$` for a whole document).
pub fn scan(value: &Value, prefix: &str) -> Vec<PiiFinding> {
    let mut findings = Vec::new();
    walk(value, prefix, "", &mut findings);
    findings
}

fn should_redact_string(text: &str) -> bool {
    PATTERN_RULES.iter().any(|r| r.regex.is_match(text))
}

fn redact_walk(value: &mut Value, under_sensitive_key: bool, count: &mut usize) {
    match value {
        Value::String(s) => {
            if (under_sensitive_key || should_redact_string(s)) && s.as_str() != REDACTION_SENTINEL {
                *value = Value::String(REDACTION_SENTINEL.to_string());
                *count += 1;
            }
        }
        Value::Number(_) | Value::Bool(_) => {
            if under_sensitive_key {
                *value = Value::String(REDACTION_SENTINEL.to_string());
                *count += 1;
            }
        }
        Value::Array(items) => {
            for item in items {
                redact_walk(item, under_sensitive_key, count);
            }
        }
        Value::Object(map) => {
            for (key, child) in map.iter_mut() {
                let sensitive = is_sensitive_field(key);
                redact_walk(child, sensitive, count);
            }
        }
        Value::Null => {}
    }
}

/// Replace every detected PII value with the sentinel, in place.
///
/// Returns the number of fields rewritten. Values under sensitive field names
/// are replaced wholesale; other strings only when a value pattern matches.
pub fn redact_in_place(value: &mut Value) -> usize {
    let mut count = 0;
    redact_walk(value, false, &mut count);
    count
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_scan_email_and_phone() {
        let data = json!({"contact": "a@b.com", "line": "call 555-987-6543"});
        let findings = scan(&data, "$");
        let rules: Vec<&str> = findings.iter().map(|f| f.rule.as_str()).collect();
        assert!(rules.contains(&"email"));
        assert!(rules.contains(&"phone"));
    }

    #[test]
    fn test_scan_paths_are_jsonpath_style() {
        let data = json!({"history": [{"payload": {"patient": {"contact_email": "a@b.com"}}}]});
        let findings = scan(&data, "$");
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].path, "$.history[0].payload.patient.contact_email");
    }

    #[test]
    fn test_sensitive_field_name_detection() {
        let data = json!({"patient_name": "Jane Roe", "note": "routine"});
        let findings = scan(&data, "$");
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].rule, "sensitive_field_name");
        assert_eq!(findings[0].field_name, "patient_name");
    }

    #[test]
    fn test_ssn_dea_license_zip() {
        let data = json!({
            "a": "123-45-6789",
            "b": "DEA-123456789",
            "c": "LIC-4455",
            "d": "43215-0001",
        });
        let findings = scan(&data, "$");
        let rules: Vec<&str> = findings.iter().map(|f| f.rule.as_str()).collect();
        assert!(rules.contains(&"ssn"));
        assert!(rules.contains(&"dea"));
        assert!(rules.contains(&"license"));
        assert!(rules.contains(&"zip"));
    }

    #[test]
    fn test_scan_deterministic_despite_key_order() {
        let a: Value = serde_json::from_str(r#"{"b": "a@b.com", "a": "c@d.com"}"#).unwrap();
        let b: Value = serde_json::from_str(r#"{"a": "c@d.com", "b": "a@b.com"}"#).unwrap();
        assert_eq!(scan(&a, "$"), scan(&b, "$"));
        // sorted key order: $.a before $.b
        assert_eq!(scan(&a, "$")[0].path, "$.a");
    }

    #[test]
    fn test_redact_in_place() {
        let mut data = json!({"email": "a@b.com", "note": "fine", "patient_name": "Jane"});
        let count = redact_in_place(&mut data);
        assert_eq!(count, 2);
        assert_eq!(data["email"], REDACTION_SENTINEL);
        assert_eq!(data["patient_name"], REDACTION_SENTINEL);
        assert_eq!(data["note"], "fine");
    }

    #[test]
    fn test_redact_idempotent() {
        let mut data = json!({"email": "a@b.com"});
        redact_in_place(&mut data);
        let second = redact_in_place(&mut data);
        assert_eq!(second, 0);
    }

    #[test]
    fn test_preview_truncates() {
        assert_eq!(preview("short"), "short");
        assert_eq!(preview("jane.roe@example.com"), "jane.r…");
    }

    #[test]
    fn test_sensitive_list_size() {
        assert_eq!(SENSITIVE_FIELD_NAMES.len(), 40);
    }
}
