//! Maps a request host onto the tenant it addresses.

use std::net::IpAddr;

use serde::Serialize;

use super::slug::{is_reserved_tenant_slug, is_valid_slug};
use crate::security::trust::strip_port;

/// What a host name points at.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum TenantHost {
    /// The platform's own site (base domain, `www`, configured marketing hosts,
    /// reserved subdomains).
    Marketing,
    /// `<slug>.<base domain>`.
    Subdomain(String),
    /// A school's own domain.
    Custom(String),
    Unknown,
}

pub fn resolve_tenant_host(host: &str, base_domain: &str, marketing_hosts: &[String]) -> TenantHost {
    let host = strip_port(host).trim_end_matches('.').to_ascii_lowercase();
    let base = base_domain.trim().trim_end_matches('.').to_ascii_lowercase();

    if host.is_empty() {
        return TenantHost::Unknown;
    }
    if host == base || marketing_hosts.iter().any(|m| m.eq_ignore_ascii_case(&host)) {
        return TenantHost::Marketing;
    }

    if let Some(label) = host.strip_suffix(&format!(".{base}")) {
        if label.contains('.') || !is_valid_slug(label) {
            return TenantHost::Unknown;
        }
        if is_reserved_tenant_slug(label) {
            return TenantHost::Marketing;
        }
        return TenantHost::Subdomain(label.to_string());
    }

    if host.contains('.') && host.parse::<IpAddr>().is_err() {
        TenantHost::Custom(host)
    } else {
        TenantHost::Unknown
    }
}
