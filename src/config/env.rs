//! Environment variable overrides.
//!
//! Deployments configure trust lists and secrets through the environment, so
//! every variable read here wins over the file value when it is set.

use crate::config::schema::GatewayConfig;

/// Split a comma-separated list, trimming entries and dropping empties.
pub fn parse_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(str::to_string)
        .collect()
}

/// `1`, `true`, `yes` and `on` (any case) are true; everything else is false.
pub fn parse_bool(raw: &str) -> bool {
    matches!(
        raw.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

/// Apply overrides from an arbitrary lookup (tests pass a map).
pub fn apply_env_overrides<F>(config: &mut GatewayConfig, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    let list = |key: &str, target: &mut Vec<String>| {
        if let Some(raw) = lookup(key) {
            *target = parse_list(&raw);
        }
    };
    list("TRUSTED_PROXY_IPS", &mut config.trust.trusted_proxy_ips);
    list("HOST_TRUSTED_PROXY_IPS", &mut config.trust.host_trusted_proxy_ips);
    list(
        "RATE_LIMIT_TRUSTED_PROXY_IPS",
        &mut config.trust.rate_limit_trusted_proxy_ips,
    );
    list("APP_MARKETING_HOSTS", &mut config.tenant.marketing_hosts);

    if let Some(raw) = lookup("TRUST_X_FORWARDED_HOST") {
        config.trust.trust_x_forwarded_host = parse_bool(&raw);
    }
    if let Some(raw) = lookup("RATE_LIMIT_TRUST_X_REAL_IP") {
        config.trust.rate_limit_trust_x_real_ip = parse_bool(&raw);
    }

    let text = |key: &str, target: &mut String| {
        if let Some(raw) = lookup(key) {
            *target = raw.trim().to_string();
        }
    };
    text(
        "TENANT_SUBDOMAIN_BASE_DOMAIN",
        &mut config.tenant.subdomain_base_domain,
    );
    text("BILLPLZ_API_KEY", &mut config.billplz.api_key);
    text("BILLPLZ_X_SIGNATURE_KEY", &mut config.billplz.x_signature_key);
    text("BILLPLZ_COLLECTION_ID", &mut config.billplz.collection_id);
    text("DATABASE_REST_URL", &mut config.database.rest_url);
    text(
        "DATABASE_SERVICE_ROLE_KEY",
        &mut config.database.service_role_key,
    );
    text("ADMIN_API_KEY", &mut config.admin.api_key);
}

/// Apply overrides from the process environment.
pub fn apply_process_env(config: &mut GatewayConfig) {
    apply_env_overrides(config, |key| std::env::var(key).ok());
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_parse_list_trims_and_drops_empties() {
        assert_eq!(
            parse_list(" 10.0.0.9, ,192.168.1.1 ,"),
            vec!["10.0.0.9".to_string(), "192.168.1.1".to_string()]
        );
        assert!(parse_list("").is_empty());
    }

    #[test]
    fn test_parse_bool() {
        assert!(parse_bool("TRUE"));
        assert!(parse_bool(" yes "));
        assert!(parse_bool("1"));
        assert!(!parse_bool("0"));
        assert!(!parse_bool("enabled"));
    }

    #[test]
    fn test_overrides_replace_file_values() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("TRUSTED_PROXY_IPS", "10.0.0.1"),
            ("RATE_LIMIT_TRUSTED_PROXY_IPS", "10.0.0.9, 10.0.0.10"),
            ("TRUST_X_FORWARDED_HOST", "on"),
            ("TENANT_SUBDOMAIN_BASE_DOMAIN", " madrasah.app "),
            ("APP_MARKETING_HOSTS", "madrasah.app,www.madrasah.app"),
        ]);

        let mut config = GatewayConfig::default();
        config.trust.host_trusted_proxy_ips = vec!["172.16.0.1".into()];
        apply_env_overrides(&mut config, |key| env.get(key).map(|v| v.to_string()));

        assert_eq!(config.trust.trusted_proxy_ips, vec!["10.0.0.1"]);
        assert_eq!(
            config.trust.rate_limit_trusted_proxy_ips,
            vec!["10.0.0.9", "10.0.0.10"]
        );
        // Untouched when the variable is absent.
        assert_eq!(config.trust.host_trusted_proxy_ips, vec!["172.16.0.1"]);
        assert!(config.trust.trust_x_forwarded_host);
        assert!(!config.trust.rate_limit_trust_x_real_ip);
        assert_eq!(config.tenant.subdomain_base_domain, "madrasah.app");
        assert_eq!(config.tenant.marketing_hosts.len(), 2);
    }
}
