//! Tenant slug rules.
//!
//! Format and reservation are separate checks: `api` is a well-formed slug
//! that nobody may register. Callers accepting a slug must consult both.

use sha2::{Digest, Sha256};

pub const MIN_SLUG_LEN: usize = 3;
pub const MAX_SLUG_LEN: usize = 63;

/// Subdomains owned by the platform itself.
const RESERVED_SLUGS: &[&str] = &[
    "about", "admin", "api", "app", "assets", "auth", "billing", "blog", "cdn", "dashboard",
    "dev", "docs", "help", "login", "logout", "mail", "register", "signup", "static", "status",
    "support", "www",
];

/// Host-label shape: `^[a-z0-9]([a-z0-9-]*[a-z0-9])?$`, 3 to 63 characters.
pub fn is_valid_slug(slug: &str) -> bool {
    let bytes = slug.as_bytes();
    if !(MIN_SLUG_LEN..=MAX_SLUG_LEN).contains(&bytes.len()) {
        return false;
    }
    let edge_ok = |b: u8| b.is_ascii_lowercase() || b.is_ascii_digit();
    let (first, last) = (bytes[0], bytes[bytes.len() - 1]);
    edge_ok(first) && edge_ok(last) && bytes.iter().all(|&b| edge_ok(b) || b == b'-')
}

pub fn is_reserved_tenant_slug(slug: &str) -> bool {
    RESERVED_SLUGS.contains(&slug.trim().to_ascii_lowercase().as_str())
}

/// Trim and lowercase user input before validation.
pub fn normalize_slug(raw: &str) -> String {
    raw.trim().to_ascii_lowercase()
}

/// Rate-limit key for availability checks. The slug is hashed so probing
/// input never lands verbatim in the counter store.
pub fn availability_rate_limit_key(client_ip: &str, slug: &str) -> String {
    let digest = hex::encode(Sha256::digest(slug.as_bytes()));
    format!("slug-availability:{client_ip}:{}", &digest[..16])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_slugs() {
        let longest = "a".repeat(63);
        for slug in ["api", "maahad-tahfiz", "sekolah1", "a1b", longest.as_str()] {
            assert!(is_valid_slug(slug), "{slug}");
        }
    }

    #[test]
    fn test_invalid_slugs() {
        let too_long = "a".repeat(64);
        for slug in ["ab", "-abc", "abc-", "Abc", "ab_c", "a b c", "", too_long.as_str()] {
            assert!(!is_valid_slug(slug), "{slug}");
        }
    }

    #[test]
    fn test_format_and_reservation_are_independent() {
        assert!(is_valid_slug("api"));
        assert!(is_reserved_tenant_slug("api"));
        assert!(is_reserved_tenant_slug(" WWW "));
        assert!(!is_reserved_tenant_slug("maahad-tahfiz"));
    }

    #[test]
    fn test_normalize() {
        assert_eq!(normalize_slug("  Maahad-Tahfiz "), "maahad-tahfiz");
    }

    #[test]
    fn test_rate_limit_key_hashes_slug() {
        let key = availability_rate_limit_key("203.0.113.8", "maahad");
        assert!(key.starts_with("slug-availability:203.0.113.8:"));
        assert!(!key.contains("maahad"));
        assert_eq!(key.rsplit(':').next().map(str::len), Some(16));
        assert_ne!(key, availability_rate_limit_key("203.0.113.8", "maahad2"));
    }
}
