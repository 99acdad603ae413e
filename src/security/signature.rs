//! Billplz X-Signature verification.
//!
//! Every field except `x_signature` is rendered as `key + value`, the pieces
//! are sorted ascending ignoring case, joined with `|`, and signed with
//! HMAC-SHA256 under the collection's X-Signature key (lowercase hex).

use hmac::{Hmac, Mac};
use sha2::Sha256;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

/// Field carrying the signature in callback payloads.
pub const SIGNATURE_FIELD: &str = "x_signature";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SignatureError {
    #[error("payload has no x_signature field")]
    Missing,
    #[error("x_signature is not valid hex")]
    Malformed,
    #[error("x_signature does not match the payload")]
    Mismatch,
    #[error("signing key is empty")]
    EmptyKey,
}

/// The exact string Billplz signs.
pub fn signing_string(fields: &[(String, String)]) -> String {
    let mut parts: Vec<String> = fields
        .iter()
        .filter(|(key, _)| key != SIGNATURE_FIELD)
        .map(|(key, value)| format!("{key}{value}"))
        .collect();
    parts.sort_by_cached_key(|part| part.to_ascii_lowercase());
    parts.join("|")
}

fn mac_for(fields: &[(String, String)], key: &str) -> Result<HmacSha256, SignatureError> {
    if key.is_empty() {
        return Err(SignatureError::EmptyKey);
    }
    let mut mac =
        HmacSha256::new_from_slice(key.as_bytes()).map_err(|_| SignatureError::EmptyKey)?;
    mac.update(signing_string(fields).as_bytes());
    Ok(mac)
}

/// Compute the signature for `fields` (ignoring any existing `x_signature`).
pub fn sign(fields: &[(String, String)], key: &str) -> Result<String, SignatureError> {
    Ok(hex::encode(mac_for(fields, key)?.finalize().into_bytes()))
}

/// Verify the `x_signature` carried in `fields`. Comparison is constant-time.
pub fn verify(fields: &[(String, String)], key: &str) -> Result<(), SignatureError> {
    let provided = fields
        .iter()
        .find(|(name, _)| name == SIGNATURE_FIELD)
        .map(|(_, value)| value.trim())
        .filter(|value| !value.is_empty())
        .ok_or(SignatureError::Missing)?;

    let provided = hex::decode(provided).map_err(|_| SignatureError::Malformed)?;
    mac_for(fields, key)?
        .verify_slice(&provided)
        .map_err(|_| SignatureError::Mismatch)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fields(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_signing_string_sorted_case_insensitively() {
        let f = fields(&[
            ("paid", "true"),
            ("id", "W_79pJDk"),
            ("Amount", "200"),
            ("x_signature", "ignored"),
        ]);
        assert_eq!(signing_string(&f), "Amount200|idW_79pJDk|paidtrue");
    }

    #[test]
    fn test_sign_then_verify() {
        let mut f = fields(&[("id", "W_79pJDk"), ("paid", "true"), ("amount", "200")]);
        let sig = sign(&f, "S-key").unwrap();
        assert_eq!(sig.len(), 64);
        f.push(("x_signature".into(), sig));
        assert_eq!(verify(&f, "S-key"), Ok(()));
    }

    #[test]
    fn test_tampered_payload_rejected() {
        let mut f = fields(&[("id", "W_79pJDk"), ("paid", "false"), ("amount", "200")]);
        let sig = sign(&f, "S-key").unwrap();
        f.push(("x_signature".into(), sig));
        f[1].1 = "true".into();
        assert_eq!(verify(&f, "S-key"), Err(SignatureError::Mismatch));
    }

    #[test]
    fn test_wrong_key_rejected() {
        let mut f = fields(&[("id", "W_79pJDk")]);
        let sig = sign(&f, "S-key").unwrap();
        f.push(("x_signature".into(), sig));
        assert_eq!(verify(&f, "other"), Err(SignatureError::Mismatch));
    }

    #[test]
    fn test_missing_and_malformed_signatures() {
        let f = fields(&[("id", "W_79pJDk")]);
        assert_eq!(verify(&f, "S-key"), Err(SignatureError::Missing));

        let f = fields(&[("id", "W_79pJDk"), ("x_signature", "zz-not-hex")]);
        assert_eq!(verify(&f, "S-key"), Err(SignatureError::Malformed));
    }
}
