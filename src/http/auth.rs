//! Session authentication for tenant users.
//!
//! Sessions are issued elsewhere; this only maps a bearer token to a
//! `TenantUser` through the session store.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::{header, StatusCode};

use crate::http::request::RequestContext;
use crate::http::response::{ApiError, GENERIC_MESSAGE};
use crate::http::server::AppState;
use crate::observability::redact_secrets;
use crate::tenant::{Role, TenantUser};

/// The authenticated user of a request.
#[derive(Debug, Clone)]
pub struct AuthUser(pub TenantUser);

impl AuthUser {
    pub fn require_role(&self, role: Role, ctx: &RequestContext) -> Result<&TenantUser, ApiError> {
        if self.0.role == role {
            Ok(&self.0)
        } else {
            Err(ctx.reject(
                StatusCode::FORBIDDEN,
                "forbidden",
                "Your account cannot perform this action.",
            ))
        }
    }
}

fn bearer_token(parts: &Parts) -> Option<&str> {
    let value = parts.headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    let token = token.trim();
    (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then_some(token)
}

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let ctx = match RequestContext::from_request_parts(parts, state).await {
            Ok(ctx) => ctx,
            Err(never) => match never {},
        };
        let unauthorized = || {
            ctx.reject(
                StatusCode::UNAUTHORIZED,
                "unauthorized",
                "Sign in to continue.",
            )
        };

        let token = bearer_token(parts).ok_or_else(unauthorized)?;
        match state.inner.sessions.resolve_session(token).await {
            Ok(Some(user)) => Ok(AuthUser(user)),
            Ok(None) => Err(unauthorized()),
            Err(error) => {
                tracing::error!(
                    request_id = %ctx.request_id,
                    error = %redact_secrets(&error.to_string()),
                    "Session lookup failed"
                );
                Err(ctx.reject(StatusCode::INTERNAL_SERVER_ERROR, "internal_error", GENERIC_MESSAGE))
            }
        }
    }
}
