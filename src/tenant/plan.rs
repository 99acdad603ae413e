//! Plan catalog and capacity caps.

use serde::{Deserialize, Serialize};

use super::error::TenantError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TenantPlanCode {
    Starter,
    Growth,
    Enterprise,
}

impl TenantPlanCode {
    pub const ALL: [TenantPlanCode; 3] = [
        TenantPlanCode::Starter,
        TenantPlanCode::Growth,
        TenantPlanCode::Enterprise,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            TenantPlanCode::Starter => "starter",
            TenantPlanCode::Growth => "growth",
            TenantPlanCode::Enterprise => "enterprise",
        }
    }
}

/// Case-insensitive catalog lookup.
///
/// Missing or blank input means the legacy default, `enterprise`. Anything
/// else that is not in the catalog is `None`, never a silent default.
pub fn resolve_tenant_plan_code(raw: Option<&str>) -> Option<TenantPlanCode> {
    let value = raw.map(str::trim).unwrap_or("");
    if value.is_empty() {
        return Some(TenantPlanCode::Enterprise);
    }
    TenantPlanCode::ALL
        .into_iter()
        .find(|plan| plan.as_str().eq_ignore_ascii_case(value))
}

/// Active-student cap. `None` means uncapped.
pub fn get_tenant_plan_cap(plan: TenantPlanCode) -> Option<u32> {
    match plan {
        TenantPlanCode::Starter => Some(50),
        TenantPlanCode::Growth => Some(300),
        TenantPlanCode::Enterprise => None,
    }
}

/// Fails when adding one more active student would exceed the plan cap.
pub fn ensure_within_plan_cap(plan: TenantPlanCode, active_students: u32) -> Result<(), TenantError> {
    match get_tenant_plan_cap(plan) {
        Some(cap) if active_students >= cap => Err(TenantError::PlanCapReached {
            plan: plan.as_str(),
            cap,
        }),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_plan_code() {
        assert_eq!(resolve_tenant_plan_code(None), Some(TenantPlanCode::Enterprise));
        assert_eq!(resolve_tenant_plan_code(Some("  ")), Some(TenantPlanCode::Enterprise));
        assert_eq!(resolve_tenant_plan_code(Some("GROWTH")), Some(TenantPlanCode::Growth));
        assert_eq!(resolve_tenant_plan_code(Some("starter")), Some(TenantPlanCode::Starter));
        assert_eq!(resolve_tenant_plan_code(Some("bogus")), None);
    }

    #[test]
    fn test_every_plan_has_a_cap_entry() {
        assert_eq!(get_tenant_plan_cap(TenantPlanCode::Starter), Some(50));
        assert_eq!(get_tenant_plan_cap(TenantPlanCode::Growth), Some(300));
        assert_eq!(get_tenant_plan_cap(TenantPlanCode::Enterprise), None);
    }

    #[test]
    fn test_plan_cap_enforcement() {
        assert!(ensure_within_plan_cap(TenantPlanCode::Starter, 49).is_ok());
        assert!(matches!(
            ensure_within_plan_cap(TenantPlanCode::Starter, 50),
            Err(TenantError::PlanCapReached { cap: 50, .. })
        ));
        assert!(ensure_within_plan_cap(TenantPlanCode::Enterprise, 100_000).is_ok());
    }
}
