//! Tenant validation helpers and host routing.
//!
//! # Data Flow
//! ```text
//! attributed host (security::trust)
//!     → host.rs (marketing / subdomain / custom domain)
//!     → lookup_tenant (TenantStore)
//!
//! slug input → slug.rs (format, reserved words)
//! plan code  → plan.rs (catalog, active-student caps)
//! ```

pub mod error;
pub mod host;
pub mod plan;
pub mod slug;
pub mod types;

pub use error::TenantError;
pub use host::{resolve_tenant_host, TenantHost};
pub use plan::{ensure_within_plan_cap, get_tenant_plan_cap, resolve_tenant_plan_code, TenantPlanCode};
pub use slug::{is_reserved_tenant_slug, is_valid_slug, normalize_slug};
pub use types::{Role, TenantRecord, TenantUser};

use crate::store::{StoreError, TenantStore};

/// Find the tenant a resolved host addresses. Marketing and unknown hosts
/// address no tenant.
pub async fn lookup_tenant(
    store: &dyn TenantStore,
    host: &TenantHost,
) -> Result<Option<TenantRecord>, StoreError> {
    match host {
        TenantHost::Subdomain(slug) => store.get_tenant_by_slug(slug).await,
        TenantHost::Custom(domain) => store.get_tenant_by_domain(domain).await,
        TenantHost::Marketing | TenantHost::Unknown => Ok(None),
    }
}
