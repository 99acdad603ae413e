//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the gateway.
//! All types derive Serde traits for deserialization from config files, and
//! every section has defaults so an empty file is a valid configuration.

use serde::{Deserialize, Serialize};

/// Admin key shipped in the defaults. Validation refuses it once the admin API is enabled.
pub const ADMIN_KEY_PLACEHOLDER: &str = "CHANGE_ME_IN_PRODUCTION";

/// Root configuration for the gateway.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct GatewayConfig {
    /// Listener configuration (bind address).
    pub listener: ListenerConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Request size limits.
    pub security: SecurityConfig,

    /// Trusted proxy hops and forwarded-header switches.
    pub trust: TrustConfig,

    /// Public endpoint throttling.
    pub rate_limit: RateLimitConfig,

    /// Tenant host routing.
    pub tenant: TenantConfig,

    /// Billplz payment gateway settings.
    pub billplz: BillplzConfig,

    /// Backing store (PostgREST-compatible endpoint).
    pub database: DatabaseConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    /// Admin API settings.
    pub admin: AdminConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
        }
    }
}

/// Timeout configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Total time allowed for a request/response in seconds.
    pub request_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self { request_secs: 30 }
    }
}

/// Request size limits.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// Maximum body size in bytes.
    pub max_body_size: usize,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            max_body_size: 1024 * 1024, // 1MB
        }
    }
}

/// Which forwarded headers may be believed, and from whom.
///
/// `trusted_proxy_ips` is the global list; the feature lists are merged with it.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct TrustConfig {
    /// Global trusted proxy hops (`TRUSTED_PROXY_IPS`).
    pub trusted_proxy_ips: Vec<String>,

    /// Hops trusted to set `x-forwarded-host` (`HOST_TRUSTED_PROXY_IPS`).
    pub host_trusted_proxy_ips: Vec<String>,

    /// Hops trusted to report the client IP (`RATE_LIMIT_TRUSTED_PROXY_IPS`).
    pub rate_limit_trusted_proxy_ips: Vec<String>,

    /// Believe `x-forwarded-host` unconditionally (`TRUST_X_FORWARDED_HOST`).
    pub trust_x_forwarded_host: bool,

    /// Fall back to `x-real-ip` when no forwarded chain exists (`RATE_LIMIT_TRUST_X_REAL_IP`).
    pub rate_limit_trust_x_real_ip: bool,
}

/// Rate limiting configuration for public endpoints.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Requests allowed per window on the slug availability endpoint.
    pub slug_availability_limit: u32,

    /// Window length for the slug availability endpoint in seconds.
    pub slug_availability_window_secs: u64,

    /// Tracked keys above which expired windows are pruned inline.
    pub max_tracked_keys: usize,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            slug_availability_limit: 40,
            slug_availability_window_secs: 60,
            max_tracked_keys: 100_000,
        }
    }
}

/// Tenant host routing.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TenantConfig {
    /// Domain under which tenants get `<slug>.<domain>` (`TENANT_SUBDOMAIN_BASE_DOMAIN`).
    pub subdomain_base_domain: String,

    /// Hosts serving the marketing site rather than a tenant (`APP_MARKETING_HOSTS`).
    pub marketing_hosts: Vec<String>,
}

impl Default for TenantConfig {
    fn default() -> Self {
        Self {
            subdomain_base_domain: "localhost".to_string(),
            marketing_hosts: vec!["localhost".to_string(), "www.localhost".to_string()],
        }
    }
}

/// Billplz payment gateway settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BillplzConfig {
    /// API base URL.
    pub api_base_url: String,

    /// Secret API key (HTTP basic auth username).
    pub api_key: String,

    /// Collection bills are created in.
    pub collection_id: String,

    /// Key used to verify the X-Signature of callbacks.
    pub x_signature_key: String,

    /// Public URL Billplz posts callbacks to.
    pub callback_url: String,

    /// Outbound request timeout in seconds.
    pub request_timeout_secs: u64,

    /// Minutes a created bill stays payable before the record is treated as expired.
    pub bill_ttl_minutes: i64,
}

impl Default for BillplzConfig {
    fn default() -> Self {
        Self {
            api_base_url: "https://www.billplz.com/".to_string(),
            api_key: String::new(),
            collection_id: String::new(),
            x_signature_key: String::new(),
            callback_url: String::new(),
            request_timeout_secs: 10,
            bill_ttl_minutes: 60,
        }
    }
}

/// Backing store endpoint.
///
/// Leaving both fields empty runs the gateway on the in-process store.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Base URL of the PostgREST-compatible API (`DATABASE_REST_URL`).
    pub rest_url: String,

    /// Service-role key (`DATABASE_SERVICE_ROLE_KEY`).
    pub service_role_key: String,

    /// Request timeout in seconds.
    pub request_timeout_secs: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            rest_url: String::new(),
            service_role_key: String::new(),
            request_timeout_secs: 10,
        }
    }
}

impl DatabaseConfig {
    pub fn is_configured(&self) -> bool {
        !self.rest_url.is_empty() && !self.service_role_key.is_empty()
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

/// Admin API configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AdminConfig {
    /// Mount the admin routes.
    pub enabled: bool,

    /// API key for authentication (Bearer token).
    pub api_key: String,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            api_key: ADMIN_KEY_PLACEHOLDER.to_string(),
        }
    }
}
