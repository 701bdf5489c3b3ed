//! Rule engine.
//!
//! Stateless per-decision-type validators over submission form data. Rules
//! resolve fields by dot-path with a short alias list per rule, so the same
//! pack accepts `name`, `practitionerName`, or `practitioner_name`. No I/O,
//! no clock, no randomness: identical input always yields identical output.

pub mod csa;
pub mod csf;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Bumped whenever a pack's rule list or semantics change; feeds the
/// intelligence input hash so recomputes on a new pack version are visible.
pub const RULE_PACK_VERSION: &str = "2025.1";

/// Severity of a failed rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleSeverity {
    Critical,
    Medium,
    Low,
}

impl RuleSeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            RuleSeverity::Critical => "critical",
            RuleSeverity::Medium => "medium",
            RuleSeverity::Low => "low",
        }
    }
}

/// Outcome of a single rule evaluation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleResult {
    pub rule_id: String,
    pub passed: bool,
    pub severity: RuleSeverity,
    pub reason: String,
    pub field_path: String,
    /// Whether any aliased field resolved to a non-empty value. A failed rule
    /// with no value at all is a gap rather than an invalid entry.
    pub value_present: bool,
}

/// Validation applied to the resolved field value.
#[derive(Debug, Clone, Copy)]
pub enum Check {
    /// Non-empty value exists.
    Present,
    /// Two-letter code in the fixed 51-code state set.
    StateCode,
    /// Five digits or ZIP+4.
    ZipFormat,
    /// Standard mailbox shape.
    EmailFormat,
}

/// One rule in a pack: id, severity, alias list, and the check to run.
#[derive(Debug, Clone, Copy)]
pub struct Rule {
    pub id: &'static str,
    pub severity: RuleSeverity,
    pub label: &'static str,
    pub aliases: &'static [&'static str],
    pub check: Check,
}

/// US state and district codes accepted by `Check::StateCode`.
pub const STATE_CODES: [&str; 51] = [
    "AL", "AK", "AZ", "AR", "CA", "CO", "CT", "DE", "DC", "FL", "GA", "HI", "ID", "IL", "IN",
    "IA", "KS", "KY", "LA", "ME", "MD", "MA", "MI", "MN", "MS", "MO", "MT", "NE", "NV", "NH",
    "NJ", "NM", "NY", "NC", "ND", "OH", "OK", "OR", "PA", "RI", "SC", "SD", "TN", "TX", "UT",
    "VT", "VA", "WA", "WV", "WI", "WY",
];

static ZIP_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d{5}(-\d{4})?$").unwrap());
static EMAIL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}$").unwrap());

/// Navigate `form_data` by dot-path. Missing segments resolve to `None`.
pub fn resolve_path<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = value;
    for segment in path.split('.') {
        current = current.as_object()?.get(segment)?;
    }
    Some(current)
}

/// Resolve the first alias with a non-empty value. Returns the alias that
/// matched alongside its textual value.
fn resolve_aliases<'a>(form_data: &'a Value, aliases: &[&'static str]) -> Option<(&'static str, String)> {
    for alias in aliases {
        if let Some(v) = resolve_path(form_data, alias) {
            let text = match v {
                Value::String(s) => s.trim().to_string(),
                Value::Null => continue,
                other => other.to_string(),
            };
            if !text.is_empty() {
                return Some((alias, text));
            }
        }
    }
    None
}

/// Evaluate a single rule against form data.
pub fn evaluate_rule(rule: &Rule, form_data: &Value) -> RuleResult {
    let resolved = resolve_aliases(form_data, rule.aliases);
    let field_path = resolved
        .as_ref()
        .map(|(alias, _)| *alias)
        .unwrap_or(rule.aliases[0])
        .to_string();

    let (passed, value_present, reason) = match (&resolved, rule.check) {
        (None, _) => (
            false,
            false,
            format!("missing required field '{}'", rule.aliases[0]),
        ),
        (Some(_), Check::Present) => (true, true, format!("{} present", rule.label)),
        (Some((_, text)), Check::StateCode) => {
            let code = text.to_uppercase();
            if STATE_CODES.contains(&code.as_str()) {
                (true, true, format!("{} is a valid state code", rule.label))
            } else {
                (false, true, format!("'{}' is not a recognized state code", text))
            }
        }
        (Some((_, text)), Check::ZipFormat) => {
            if ZIP_RE.is_match(text) {
                (true, true, format!("{} is well-formed", rule.label))
            } else {
                (false, true, format!("'{}' is not a valid ZIP code", text))
            }
        }
        (Some((_, text)), Check::EmailFormat) => {
            if EMAIL_RE.is_match(text) {
                (true, true, format!("{} is well-formed", rule.label))
            } else {
                (false, true, format!("'{}' is not a valid email address", text))
            }
        }
    };

    RuleResult {
        rule_id: rule.id.to_string(),
        passed,
        severity: rule.severity,
        reason,
        field_path,
        value_present,
    }
}

/// Run the pack for `decision_type` against `form_data`.
///
/// Decision types starting with `csa` select the CSA pack; everything else,
/// including unknown types, falls back to the CSF pack so scoring always
/// produces a result.
pub fn evaluate(decision_type: &str, form_data: &Value) -> Vec<RuleResult> {
    let pack: &[Rule] = if decision_type.to_lowercase().starts_with("csa") {
        csa::RULES
    } else {
        csf::RULES
    };
    pack.iter().map(|r| evaluate_rule(r, form_data)).collect()
}
