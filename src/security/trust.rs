//! Trust-boundary resolution for forwarded headers.
//!
//! Forwarded headers are attacker-controlled unless a proxy the operator runs
//! overwrote them. Two signals establish that:
//! - the nearest hop of `x-forwarded-for` is on an allow-list, or
//! - a managed-edge marker header is present (the edge strips client copies).
//!
//! The edge marker is a heuristic. If the origin is reachable without going
//! through the edge, a client can send the marker itself and be believed.
//!
//! Nothing here fails a request: missing or malformed headers degrade to the
//! least-trusting answer (`"unknown"` client IP, no forwarded host).

use std::net::IpAddr;

use axum::http::{HeaderMap, Uri};

use crate::config::TrustConfig;

/// Client IP reported when no trustworthy value exists.
pub const UNKNOWN_CLIENT_IP: &str = "unknown";

const X_FORWARDED_FOR: &str = "x-forwarded-for";
const X_FORWARDED_HOST: &str = "x-forwarded-host";
const X_REAL_IP: &str = "x-real-ip";
const HOST: &str = "host";

/// A hosting edge that injects its own headers at the boundary.
#[derive(Debug, Clone, Copy)]
struct ManagedEdge {
    name: &'static str,
    /// Present only on requests that went through the edge.
    marker: &'static str,
    /// Client address as seen by the edge.
    connecting_ip: &'static str,
}

const MANAGED_EDGES: &[ManagedEdge] = &[
    ManagedEdge {
        name: "cloudflare",
        marker: "cf-ray",
        connecting_ip: "cf-connecting-ip",
    },
    ManagedEdge {
        name: "vercel",
        marker: "x-vercel-id",
        connecting_ip: "x-vercel-forwarded-for",
    },
];

/// Set of proxy hops, compared as IP addresses when parseable.
#[derive(Debug, Clone, Default)]
pub struct ProxyAllowList {
    entries: Vec<String>,
}

impl ProxyAllowList {
    /// Merge several configured lists into one.
    pub fn merged<'a>(lists: impl IntoIterator<Item = &'a [String]>) -> Self {
        let mut entries: Vec<String> = lists
            .into_iter()
            .flatten()
            .filter_map(|entry| canonical_hop(entry))
            .collect();
        entries.sort();
        entries.dedup();
        Self { entries }
    }

    pub fn contains(&self, hop: &str) -> bool {
        canonical_hop(hop).is_some_and(|hop| self.entries.binary_search(&hop).is_ok())
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Resolves the real client IP and request host for one request at a time.
#[derive(Debug, Clone)]
pub struct TrustResolver {
    client_ip_proxies: ProxyAllowList,
    host_proxies: ProxyAllowList,
    trust_forwarded_host: bool,
    trust_x_real_ip: bool,
}

impl TrustResolver {
    pub fn from_config(config: &TrustConfig) -> Self {
        Self {
            client_ip_proxies: ProxyAllowList::merged([
                config.rate_limit_trusted_proxy_ips.as_slice(),
                config.trusted_proxy_ips.as_slice(),
            ]),
            host_proxies: ProxyAllowList::merged([
                config.host_trusted_proxy_ips.as_slice(),
                config.trusted_proxy_ips.as_slice(),
            ]),
            trust_forwarded_host: config.trust_x_forwarded_host,
            trust_x_real_ip: config.rate_limit_trust_x_real_ip,
        }
    }

    /// The client IP for rate limiting. Never empty; `"unknown"` when untrusted.
    pub fn resolve_client_ip(&self, headers: &HeaderMap) -> String {
        if let Some(ip) = managed_edge_client_ip(headers) {
            return ip;
        }

        let chain = forwarded_chain(headers);
        let Some(nearest) = chain.last() else {
            if self.trust_x_real_ip {
                if let Some(ip) = header_str(headers, X_REAL_IP).and_then(normalize_hop) {
                    return ip;
                }
            }
            return UNKNOWN_CLIENT_IP.to_string();
        };

        if !self.client_ip_proxies.contains(nearest) {
            tracing::debug!(nearest_hop = %nearest, "Ignoring x-forwarded-for from untrusted hop");
            return UNKNOWN_CLIENT_IP.to_string();
        }

        chain
            .first()
            .and_then(|client| normalize_hop(client))
            .unwrap_or_else(|| UNKNOWN_CLIENT_IP.to_string())
    }

    /// The host the client addressed, lowercase and without a port.
    pub fn resolve_host(&self, headers: &HeaderMap, uri: &Uri) -> Option<String> {
        if let Some(forwarded) = header_str(headers, X_FORWARDED_HOST) {
            if self.forwarded_host_trusted(headers) {
                let first = forwarded.split(',').next().unwrap_or_default();
                if let Some(host) = normalize_host(first) {
                    return Some(host);
                }
            } else {
                tracing::debug!(forwarded_host = %forwarded, "Ignoring x-forwarded-host without trust signal");
            }
        }

        header_str(headers, HOST)
            .and_then(normalize_host)
            .or_else(|| uri.host().and_then(normalize_host))
    }

    fn forwarded_host_trusted(&self, headers: &HeaderMap) -> bool {
        if managed_edge(headers).is_some() || self.trust_forwarded_host {
            return true;
        }
        forwarded_chain(headers)
            .iter()
            .any(|hop| self.host_proxies.contains(hop))
    }
}

/// The first edge whose marker header is present.
fn managed_edge(headers: &HeaderMap) -> Option<&'static ManagedEdge> {
    MANAGED_EDGES
        .iter()
        .find(|edge| header_str(headers, edge.marker).is_some_and(|v| !v.is_empty()))
}

fn managed_edge_client_ip(headers: &HeaderMap) -> Option<String> {
    let edge = managed_edge(headers)?;
    let raw = header_str(headers, edge.connecting_ip)?;
    let ip = raw.split(',').next().and_then(normalize_hop)?;
    tracing::trace!(edge = edge.name, client_ip = %ip, "Client IP from managed edge");
    Some(ip)
}

/// All `x-forwarded-for` entries, client first, nearest hop last.
fn forwarded_chain(headers: &HeaderMap) -> Vec<String> {
    headers
        .get_all(X_FORWARDED_FOR)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(str::to_string)
        .collect()
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
}

/// Remove a `:port` suffix from an address or host, including `[v6]:port`.
pub fn strip_port(value: &str) -> &str {
    let value = value.trim();
    if let Some(rest) = value.strip_prefix('[') {
        return rest.split(']').next().unwrap_or(rest);
    }
    match value.matches(':').count() {
        1 => value.split(':').next().unwrap_or(value),
        _ => value,
    }
}

/// A hop as returned to callers: trimmed, port stripped, unquoted.
fn normalize_hop(raw: &str) -> Option<String> {
    let hop = strip_port(raw.trim().trim_matches('"'));
    (!hop.is_empty()).then(|| hop.to_string())
}

/// A hop as compared against allow-lists.
fn canonical_hop(raw: &str) -> Option<String> {
    let hop = normalize_hop(raw)?;
    Some(match hop.parse::<IpAddr>() {
        Ok(ip) => ip.to_string(),
        Err(_) => hop.to_ascii_lowercase(),
    })
}

fn normalize_host(raw: &str) -> Option<String> {
    let host = strip_port(raw).trim_end_matches('.').to_ascii_lowercase();
    (!host.is_empty()).then_some(host)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(pairs: &[(&'static str, &str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.append(*name, value.parse().unwrap());
        }
        map
    }

    fn resolver(config: TrustConfig) -> TrustResolver {
        TrustResolver::from_config(&config)
    }

    #[test]
    fn test_untrusted_chain_is_unknown() {
        let r = resolver(TrustConfig::default());
        let h = headers(&[("x-forwarded-for", "203.0.113.8, 10.0.0.9")]);
        assert_eq!(r.resolve_client_ip(&h), UNKNOWN_CLIENT_IP);
    }

    #[test]
    fn test_trusted_last_hop_returns_client() {
        let r = resolver(TrustConfig {
            rate_limit_trusted_proxy_ips: vec!["10.0.0.9".into()],
            ..Default::default()
        });
        let h = headers(&[("x-forwarded-for", "203.0.113.8, 10.0.0.9")]);
        assert_eq!(r.resolve_client_ip(&h), "203.0.113.8");
    }

    #[test]
    fn test_global_list_merged_for_client_ip() {
        let r = resolver(TrustConfig {
            trusted_proxy_ips: vec!["10.0.0.9".into()],
            ..Default::default()
        });
        let h = headers(&[("x-forwarded-for", " 203.0.113.8:51234 ,10.0.0.9:443")]);
        assert_eq!(r.resolve_client_ip(&h), "203.0.113.8");
    }

    #[test]
    fn test_only_last_hop_is_checked() {
        // A trusted address elsewhere in the chain does not make it trustworthy.
        let r = resolver(TrustConfig {
            rate_limit_trusted_proxy_ips: vec!["10.0.0.9".into()],
            ..Default::default()
        });
        let h = headers(&[("x-forwarded-for", "203.0.113.8, 10.0.0.9, 198.51.100.7")]);
        assert_eq!(r.resolve_client_ip(&h), UNKNOWN_CLIENT_IP);
    }

    #[test]
    fn test_multiple_forwarded_headers_form_one_chain() {
        let r = resolver(TrustConfig {
            rate_limit_trusted_proxy_ips: vec!["10.0.0.9".into()],
            ..Default::default()
        });
        let h = headers(&[
            ("x-forwarded-for", "203.0.113.8"),
            ("x-forwarded-for", "10.0.0.9"),
        ]);
        assert_eq!(r.resolve_client_ip(&h), "203.0.113.8");
    }

    #[test]
    fn test_managed_edge_ip_needs_no_allow_list() {
        let r = resolver(TrustConfig::default());
        let h = headers(&[("cf-ray", "abc"), ("cf-connecting-ip", "198.51.100.12")]);
        assert_eq!(r.resolve_client_ip(&h), "198.51.100.12");
    }

    #[test]
    fn test_edge_ip_without_marker_is_ignored() {
        let r = resolver(TrustConfig::default());
        let h = headers(&[("cf-connecting-ip", "198.51.100.12")]);
        assert_eq!(r.resolve_client_ip(&h), UNKNOWN_CLIENT_IP);
    }

    #[test]
    fn test_x_real_ip_only_when_enabled() {
        let h = headers(&[("x-real-ip", "198.51.100.40")]);
        assert_eq!(
            resolver(TrustConfig::default()).resolve_client_ip(&h),
            UNKNOWN_CLIENT_IP
        );

        let r = resolver(TrustConfig {
            rate_limit_trust_x_real_ip: true,
            ..Default::default()
        });
        assert_eq!(r.resolve_client_ip(&h), "198.51.100.40");
    }

    #[test]
    fn test_ipv6_hops_compare_canonically() {
        let r = resolver(TrustConfig {
            rate_limit_trusted_proxy_ips: vec!["2001:DB8::1".into()],
            ..Default::default()
        });
        let h = headers(&[("x-forwarded-for", "2001:db8::beef, [2001:db8:0::1]:443")]);
        assert_eq!(r.resolve_client_ip(&h), "2001:db8::beef");
    }

    #[test]
    fn test_forwarded_host_ignored_without_trust() {
        let r = resolver(TrustConfig::default());
        let h = headers(&[
            ("host", "origin.internal:8080"),
            ("x-forwarded-host", "evil.example"),
        ]);
        assert_eq!(
            r.resolve_host(&h, &Uri::from_static("/")),
            Some("origin.internal".to_string())
        );
    }

    #[test]
    fn test_forwarded_host_with_edge_marker() {
        let r = resolver(TrustConfig::default());
        let h = headers(&[
            ("host", "origin.internal"),
            ("x-forwarded-host", "Alnoor.Madrasah.App:443"),
            ("cf-ray", "8a1b"),
        ]);
        assert_eq!(
            r.resolve_host(&h, &Uri::from_static("/")),
            Some("alnoor.madrasah.app".to_string())
        );
    }

    #[test]
    fn test_forwarded_host_with_trusted_hop() {
        let r = resolver(TrustConfig {
            host_trusted_proxy_ips: vec!["10.0.0.9".into()],
            ..Default::default()
        });
        let h = headers(&[
            ("host", "origin.internal"),
            ("x-forwarded-host", "alnoor.madrasah.app"),
            ("x-forwarded-for", "203.0.113.8, 10.0.0.9"),
        ]);
        assert_eq!(
            r.resolve_host(&h, &Uri::from_static("/")),
            Some("alnoor.madrasah.app".to_string())
        );
    }

    #[test]
    fn test_rate_limit_list_does_not_trust_host() {
        let r = resolver(TrustConfig {
            rate_limit_trusted_proxy_ips: vec!["10.0.0.9".into()],
            ..Default::default()
        });
        let h = headers(&[
            ("host", "origin.internal"),
            ("x-forwarded-host", "alnoor.madrasah.app"),
            ("x-forwarded-for", "203.0.113.8, 10.0.0.9"),
        ]);
        assert_eq!(
            r.resolve_host(&h, &Uri::from_static("/")),
            Some("origin.internal".to_string())
        );
    }

    #[test]
    fn test_trust_all_forwarded_host_switch() {
        let r = resolver(TrustConfig {
            trust_x_forwarded_host: true,
            ..Default::default()
        });
        let h = headers(&[("x-forwarded-host", "a.madrasah.app, b.madrasah.app")]);
        assert_eq!(
            r.resolve_host(&h, &Uri::from_static("/")),
            Some("a.madrasah.app".to_string())
        );
    }

    #[test]
    fn test_host_falls_back_to_uri() {
        let r = resolver(TrustConfig::default());
        let uri: Uri = "http://Tenant.Madrasah.App:3000/api".parse().unwrap();
        assert_eq!(
            r.resolve_host(&HeaderMap::new(), &uri),
            Some("tenant.madrasah.app".to_string())
        );
        assert_eq!(r.resolve_host(&HeaderMap::new(), &Uri::from_static("/")), None);
    }

    #[test]
    fn test_strip_port() {
        assert_eq!(strip_port("10.0.0.1:8080"), "10.0.0.1");
        assert_eq!(strip_port("[::1]:443"), "::1");
        assert_eq!(strip_port("::1"), "::1");
        assert_eq!(strip_port("example.com"), "example.com");
    }
}
