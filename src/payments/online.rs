//! Online enrollment: paying a held seat and moving the registration into
//! the active student list.

use std::sync::Arc;

use uuid::Uuid;

use crate::payments::errors::{
    to_move_online_error, validate_move_online_apply_result, MoveOnlineError, OnlinePayError,
};
use crate::payments::types::{MoveOnlineApplyRow, MoveOnlineCommand, OnlinePayCommand, OnlinePayRow};
use crate::store::{PaymentStore, TenantStore};
use crate::tenant::{ensure_within_plan_cap, resolve_tenant_plan_code, TenantError, TenantUser};

pub struct OnlineEnrollmentService {
    payments: Arc<dyn PaymentStore>,
    tenants: Arc<dyn TenantStore>,
}

impl OnlineEnrollmentService {
    pub fn new(payments: Arc<dyn PaymentStore>, tenants: Arc<dyn TenantStore>) -> Self {
        Self { payments, tenants }
    }

    /// Pay a claim held for the signed-in parent.
    pub async fn pay_claim(
        &self,
        user: &TenantUser,
        claim_id: Option<Uuid>,
        payment_reference: Option<String>,
    ) -> Result<OnlinePayRow, OnlinePayError> {
        let claim_id =
            claim_id.ok_or_else(|| OnlinePayError::InvalidRequest("claim_id is required".into()))?;
        let parent_id = user.parent_id.ok_or_else(|| {
            OnlinePayError::InvalidRequest("account has no parent profile".into())
        })?;

        let cmd = OnlinePayCommand {
            tenant_id: user.tenant_id,
            parent_id,
            claim_id,
            payment_reference: payment_reference
                .map(|r| r.trim().to_string())
                .filter(|r| !r.is_empty()),
        };
        let row = self
            .payments
            .pay_online_claim(&cmd)
            .await
            .map_err(OnlinePayError::Store)?;

        if row.ok {
            tracing::info!(tenant_id = %cmd.tenant_id, claim_id = %claim_id, "Online claim paid");
            return Ok(row);
        }
        Err(OnlinePayError::from_code(row.code.as_deref().unwrap_or("unknown")))
    }

    /// Move a staging registration into the tenant's active students,
    /// honouring the plan cap.
    pub async fn move_online(
        &self,
        tenant_id: Uuid,
        staging_id: Uuid,
        student_id: Uuid,
    ) -> Result<MoveOnlineApplyRow, MoveOnlineError> {
        let tenant = self
            .tenants
            .get_tenant(tenant_id)
            .await
            .map_err(TenantError::from)?
            .ok_or(TenantError::NotFound)?;

        let plan_code = tenant.plan_code.as_deref();
        let plan = resolve_tenant_plan_code(plan_code)
            .ok_or_else(|| TenantError::UnknownPlan(plan_code.unwrap_or_default().to_string()))?;
        let active = self
            .tenants
            .count_active_students(tenant_id)
            .await
            .map_err(TenantError::from)?;
        ensure_within_plan_cap(plan, active)?;

        let cmd = MoveOnlineCommand {
            tenant_id,
            staging_id,
            student_id,
        };
        let rows = self
            .payments
            .apply_move_online(&cmd)
            .await
            .map_err(to_move_online_error)?;

        let row = rows.into_iter().next();
        validate_move_online_apply_result(row.as_ref(), staging_id, student_id)?;
        tracing::info!(%tenant_id, %staging_id, %student_id, "Registration moved online");

        row.ok_or(MoveOnlineError::NotApplied { staging_id })
    }
}
