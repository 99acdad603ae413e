use axum::http::StatusCode;
use thiserror::Error;

use crate::http::response::PublicError;
use crate::store::StoreError;

#[derive(Debug, Error)]
pub enum TenantError {
    #[error("slug must be 3-63 lowercase letters, digits or hyphens")]
    InvalidSlug,

    #[error("slug is reserved")]
    ReservedSlug,

    #[error("unknown plan code: {0}")]
    UnknownPlan(String),

    #[error("plan {plan} allows {cap} active students")]
    PlanCapReached { plan: &'static str, cap: u32 },

    #[error("tenant not found")]
    NotFound,

    /// The authenticated user belongs to a different tenant than the host.
    #[error("tenant mismatch")]
    Mismatch,

    #[error("tenant lookup failed: {0}")]
    Store(#[from] StoreError),
}

impl PublicError for TenantError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidSlug | Self::ReservedSlug | Self::UnknownPlan(_) => StatusCode::BAD_REQUEST,
            Self::PlanCapReached { .. } => StatusCode::CONFLICT,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::Mismatch => StatusCode::FORBIDDEN,
            Self::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn code(&self) -> &'static str {
        match self {
            Self::InvalidSlug => "invalid_slug",
            Self::ReservedSlug => "reserved_slug",
            Self::UnknownPlan(_) => "invalid_plan_code",
            Self::PlanCapReached { .. } => "plan_cap_reached",
            Self::NotFound => "tenant_not_found",
            Self::Mismatch => "tenant_mismatch",
            Self::Store(_) => "internal_error",
        }
    }

    fn public_message(&self) -> String {
        match self {
            Self::Store(_) => crate::http::response::GENERIC_MESSAGE.to_string(),
            other => other.to_string(),
        }
    }

    fn extra(&self) -> Option<serde_json::Value> {
        match self {
            Self::PlanCapReached { plan, cap } => Some(serde_json::json!({ "plan": plan, "cap": cap })),
            _ => None,
        }
    }
}
