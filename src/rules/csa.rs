//! Controlled Substance Application (CSA) family rule pack.
//!
//! Five rules covering applicant identity, location validity, and contact
//! details. Selected for any `csa*` decision type.

use super::{Check, Rule, RuleSeverity};

pub const RULES: &[Rule] = &[
    Rule {
        id: "name_present",
        severity: RuleSeverity::Critical,
        label: "applicant name",
        aliases: &["name", "applicantName", "applicant_name"],
        check: Check::Present,
    },
    Rule {
        id: "address_present",
        severity: RuleSeverity::Medium,
        label: "applicant address",
        aliases: &["address", "addressLine1", "address_line1"],
        check: Check::Present,
    },
    Rule {
        id: "state_valid",
        severity: RuleSeverity::Critical,
        label: "state code",
        aliases: &["state", "stateCode", "state_code"],
        check: Check::StateCode,
    },
    Rule {
        id: "zip_format",
        severity: RuleSeverity::Low,
        label: "ZIP code",
        aliases: &["zip", "zipCode", "zip_code", "postalCode"],
        check: Check::ZipFormat,
    },
    Rule {
        id: "email_format",
        severity: RuleSeverity::Low,
        label: "email address",
        aliases: &["email", "emailAddress", "email_address"],
        check: Check::EmailFormat,
    },
];

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::evaluate;
    use serde_json::json;

    #[test]
    fn test_pack_size() {
        assert_eq!(RULES.len(), 5);
    }

    #[test]
    fn test_missing_state_scores_three_of_five() {
        // name and address present, zip well-formed, state and email absent
        let form = json!({"name": "X", "address": "Y", "zip": "43215"});
        let results = evaluate("csa", &form);
        assert_eq!(results.len(), 5);
        assert_eq!(results.iter().filter(|r| r.passed).count(), 3);

        let passed_ids: Vec<&str> = results
            .iter()
            .filter(|r| r.passed)
            .map(|r| r.rule_id.as_str())
            .collect();
        assert!(!passed_ids.contains(&"state_valid"));
        assert!(!passed_ids.contains(&"email_format"));
    }
}
