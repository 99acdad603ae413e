//! Configuration validation.
//!
//! Serde handles syntax; this module checks semantics. Validation is a pure
//! function that reports every problem at once, not just the first.

use std::net::{IpAddr, SocketAddr};

use thiserror::Error;

use crate::config::schema::{GatewayConfig, ADMIN_KEY_PLACEHOLDER};

/// A single semantic problem with a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("listener.bind_address `{0}` is not a socket address")]
    InvalidBindAddress(String),

    #[error("observability.metrics_address `{0}` is not a socket address")]
    InvalidMetricsAddress(String),

    #[error("trust.{field} entry `{value}` is not an IP address")]
    InvalidProxyIp { field: &'static str, value: String },

    #[error("rate_limit.{0} must be greater than zero")]
    ZeroRateLimit(&'static str),

    #[error("tenant.subdomain_base_domain must not be empty")]
    MissingBaseDomain,

    #[error("admin.api_key must be changed before enabling the admin API")]
    PlaceholderAdminKey,

    #[error("database.rest_url and database.service_role_key must be set together")]
    PartialDatabaseConfig,

    #[error("billplz.bill_ttl_minutes must be greater than zero")]
    InvalidBillTtl,
}

/// Validate a configuration, collecting all errors.
pub fn validate_config(config: &GatewayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::InvalidBindAddress(
            config.listener.bind_address.clone(),
        ));
    }

    if config.observability.metrics_enabled
        && config
            .observability
            .metrics_address
            .parse::<SocketAddr>()
            .is_err()
    {
        errors.push(ValidationError::InvalidMetricsAddress(
            config.observability.metrics_address.clone(),
        ));
    }

    let lists = [
        ("trusted_proxy_ips", &config.trust.trusted_proxy_ips),
        ("host_trusted_proxy_ips", &config.trust.host_trusted_proxy_ips),
        (
            "rate_limit_trusted_proxy_ips",
            &config.trust.rate_limit_trusted_proxy_ips,
        ),
    ];
    for (field, entries) in lists {
        for value in entries {
            if value.trim().parse::<IpAddr>().is_err() {
                errors.push(ValidationError::InvalidProxyIp {
                    field,
                    value: value.clone(),
                });
            }
        }
    }

    if config.rate_limit.slug_availability_limit == 0 {
        errors.push(ValidationError::ZeroRateLimit("slug_availability_limit"));
    }
    if config.rate_limit.slug_availability_window_secs == 0 {
        errors.push(ValidationError::ZeroRateLimit(
            "slug_availability_window_secs",
        ));
    }

    if config.tenant.subdomain_base_domain.trim().is_empty() {
        errors.push(ValidationError::MissingBaseDomain);
    }

    if config.admin.enabled
        && (config.admin.api_key.is_empty() || config.admin.api_key == ADMIN_KEY_PLACEHOLDER)
    {
        errors.push(ValidationError::PlaceholderAdminKey);
    }

    if config.database.rest_url.is_empty() != config.database.service_role_key.is_empty() {
        errors.push(ValidationError::PartialDatabaseConfig);
    }

    if config.billplz.bill_ttl_minutes <= 0 {
        errors.push(ValidationError::InvalidBillTtl);
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        assert_eq!(validate_config(&GatewayConfig::default()), Ok(()));
    }

    #[test]
    fn test_collects_every_error() {
        let mut config = GatewayConfig::default();
        config.listener.bind_address = "not-an-address".into();
        config.trust.rate_limit_trusted_proxy_ips = vec!["10.0.0.9".into(), "proxy.local".into()];
        config.rate_limit.slug_availability_limit = 0;
        config.admin.enabled = true;
        config.database.rest_url = "http://db.local".into();

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 5);
        assert!(errors.contains(&ValidationError::InvalidProxyIp {
            field: "rate_limit_trusted_proxy_ips",
            value: "proxy.local".into(),
        }));
        assert!(errors.contains(&ValidationError::PlaceholderAdminKey));
        assert!(errors.contains(&ValidationError::PartialDatabaseConfig));
    }

    #[test]
    fn test_ipv6_proxy_entries_accepted() {
        let mut config = GatewayConfig::default();
        config.trust.trusted_proxy_ips = vec!["2001:db8::1".into(), " 10.0.0.1 ".into()];
        assert!(validate_config(&config).is_ok());
    }
}
