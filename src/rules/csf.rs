//! Controlled Substance Form (CSF) family rule pack.
//!
//! Eight rules covering practitioner identity, licensure, location, and
//! contact details. Selected for any `csf*` decision type and as the
//! fallback pack for unknown types.

use super::{Check, Rule, RuleSeverity};

pub const RULES: &[Rule] = &[
    Rule {
        id: "name_present",
        severity: RuleSeverity::Critical,
        label: "practitioner name",
        aliases: &["name", "practitionerName", "practitioner_name"],
        check: Check::Present,
    },
    Rule {
        id: "license_present",
        severity: RuleSeverity::Critical,
        label: "license number",
        aliases: &["licenseNumber", "license_number", "license"],
        check: Check::Present,
    },
    Rule {
        id: "address_present",
        severity: RuleSeverity::Medium,
        label: "practice address",
        aliases: &["address", "addressLine1", "address_line1", "practiceAddress"],
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
        id: "specialty_present",
        severity: RuleSeverity::Medium,
        label: "specialty",
        aliases: &["specialty", "specialtyType", "specialty_type"],
        check: Check::Present,
    },
    Rule {
        id: "experience_present",
        severity: RuleSeverity::Low,
        label: "experience",
        aliases: &["experience", "yearsExperience", "years_experience"],
        check: Check::Present,
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
