//! Export bundle signing.
//!
//! HMAC-SHA256 over the canonical form of the bundle with the `signature`
//! field removed. The HMAC provides external integrity for exported bundles;
//! the in-store history chain is a separate guarantee and neither replaces
//! the other.

use hmac::{Hmac, Mac};
use serde_json::Value;
use sha2::Sha256;

use crate::error::{AppError, AppResult};
use crate::integrity::canonical_json;

type HmacSha256 = Hmac<Sha256>;

/// Algorithm label written into the bundle.
pub const SIGNATURE_ALGORITHM: &str = "hmac-sha256";

/// Sign a bundle that does not yet carry a `signature` field.
pub fn sign_bundle(bundle: &Value, key: &[u8]) -> AppResult<String> {
    let mut mac = HmacSha256::new_from_slice(key)
        .map_err(|e| AppError::Internal(format!("invalid signing key: {}", e)))?;
    mac.update(canonical_json(bundle).as_bytes());
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Attach the signature object to a bundle in place.
pub fn attach_signature(bundle: &mut Value, key: &[u8]) -> AppResult<()> {
    let value = sign_bundle(bundle, key)?;
    if let Some(map) = bundle.as_object_mut() {
        map.insert(
            "signature".to_string(),
            serde_json::json!({
                "algorithm": SIGNATURE_ALGORITHM,
                "value": value,
            }),
        );
        Ok(())
    } else {
        Err(AppError::Internal("export bundle is not an object".to_string()))
    }
}

/// Verify a signed bundle: strip the signature, recompute the canonical
/// HMAC, and compare in constant time.
pub fn verify_bundle(bundle: &Value, key: &[u8]) -> AppResult<bool> {
    let signature = bundle
        .get("signature")
        .and_then(|s| s.as_object())
        .ok_or_else(|| AppError::BadRequest("bundle has no signature".to_string()))?;

    let algorithm = signature.get("algorithm").and_then(Value::as_str);
    if algorithm != Some(SIGNATURE_ALGORITHM) {
        return Ok(false);
    }
    let value_hex = signature
        .get("value")
        .and_then(Value::as_str)
        .ok_or_else(|| AppError::BadRequest("signature has no value".to_string()))?;
    let expected = match hex::decode(value_hex) {
        Ok(bytes) => bytes,
        Err(_) => return Ok(false),
    };

    let mut unsigned = bundle.clone();
    if let Some(map) = unsigned.as_object_mut() {
        map.remove("signature");
    }

    let mut mac = HmacSha256::new_from_slice(key)
        .map_err(|e| AppError::Internal(format!("invalid signing key: {}", e)))?;
    mac.update(canonical_json(&unsigned).as_bytes());
    Ok(mac.verify_slice(&expected).is_ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const KEY: &[u8] = b"test-signing-key";

    #[test]
    fn test_sign_and_verify_round_trip() {
        let mut bundle = json!({"metadata": {"case_id": "c1"}, "history": [{"id": "e0"}]});
        attach_signature(&mut bundle, KEY).unwrap();
        assert_eq!(bundle["signature"]["algorithm"], SIGNATURE_ALGORITHM);
        assert!(verify_bundle(&bundle, KEY).unwrap());
    }

    #[test]
    fn test_tampered_bundle_fails_verification() {
        let mut bundle = json!({"metadata": {"case_id": "c1"}, "history": [{"id": "e0"}]});
        attach_signature(&mut bundle, KEY).unwrap();

        bundle["history"][0]["id"] = json!("e0-tampered");
        assert!(!verify_bundle(&bundle, KEY).unwrap());
    }

    #[test]
    fn test_wrong_key_fails_verification() {
        let mut bundle = json!({"metadata": {"case_id": "c1"}});
        attach_signature(&mut bundle, KEY).unwrap();
        assert!(!verify_bundle(&bundle, b"other-key").unwrap());
    }

    #[test]
    fn test_signature_is_key_order_independent() {
        let a: Value = serde_json::from_str(r#"{"x": 1, "y": 2}"#).unwrap();
        let b: Value = serde_json::from_str(r#"{"y": 2, "x": 1}"#).unwrap();
        assert_eq!(sign_bundle(&a, KEY).unwrap(), sign_bundle(&b, KEY).unwrap());
    }

    #[test]
    fn test_unsigned_bundle_is_rejected() {
        let bundle = json!({"metadata": {}});
        assert!(verify_bundle(&bundle, KEY).is_err());
    }
}
