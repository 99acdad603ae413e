//! Tenant routes: public slug checks and host resolution, plus the admin
//! staging → active move.

use std::time::Duration;

use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::http::auth::AuthUser;
use crate::http::request::{parse_json, RequestContext};
use crate::http::response::ApiError;
use crate::http::server::AppState;
use crate::observability::metrics;
use crate::security::RateLimitRule;
use crate::tenant::slug::availability_rate_limit_key;
use crate::tenant::{
    is_reserved_tenant_slug, is_valid_slug, lookup_tenant, normalize_slug, resolve_tenant_host, Role,
    TenantError, TenantHost,
};

#[derive(Debug, Deserialize)]
pub struct SlugQuery {
    #[serde(default)]
    slug: Option<String>,
}

/// `GET /api/public/tenant/slug-availability?slug=`
pub async fn slug_availability(
    State(state): State<AppState>,
    ctx: RequestContext,
    Query(query): Query<SlugQuery>,
) -> Result<Json<Value>, ApiError> {
    let slug = normalize_slug(query.slug.as_deref().unwrap_or_default());
    let config = &state.inner.config;

    let rule = RateLimitRule {
        key: availability_rate_limit_key(&ctx.client_ip, &slug),
        limit: config.rate_limit.slug_availability_limit,
        window: Duration::from_secs(config.rate_limit.slug_availability_window_secs),
    };
    let decision = state.inner.limiter.enforce(&rule);
    if !decision.allowed {
        metrics::record_rate_limited("slug_availability");
        tracing::debug!(request_id = %ctx.request_id, client_ip = %ctx.client_ip, "Slug availability throttled");
        return Err(ApiError::rate_limited(
            &ctx.request_id,
            decision.retry_after_secs.unwrap_or(1),
        ));
    }

    if !is_valid_slug(&slug) {
        return Err(ApiError::from_error(&TenantError::InvalidSlug, &ctx));
    }

    let available = if is_reserved_tenant_slug(&slug) {
        false
    } else {
        !state
            .inner
            .tenants
            .slug_exists(&slug)
            .await
            .map_err(|e| ApiError::from_error(&TenantError::from(e), &ctx))?
    };

    let domain = format!("{slug}.{}", config.tenant.subdomain_base_domain);
    Ok(Json(json!({
        "ok": true,
        "slug": slug,
        "domain": domain,
        "available": available,
    })))
}

fn addressed_host(state: &AppState, ctx: &RequestContext) -> TenantHost {
    let tenant = &state.inner.config.tenant;
    ctx.host
        .as_deref()
        .map(|host| resolve_tenant_host(host, &tenant.subdomain_base_domain, &tenant.marketing_hosts))
        .unwrap_or(TenantHost::Unknown)
}

/// `GET /api/public/tenant/resolve`
pub async fn resolve(
    State(state): State<AppState>,
    ctx: RequestContext,
) -> Result<Json<Value>, ApiError> {
    let target = addressed_host(&state, &ctx);
    let tenant = lookup_tenant(state.inner.tenants.as_ref(), &target)
        .await
        .map_err(|e| ApiError::from_error(&TenantError::from(e), &ctx))?;

    Ok(Json(json!({
        "ok": true,
        "host": ctx.host,
        "target": target,
        "tenant": tenant,
    })))
}

#[derive(Debug, Deserialize)]
struct MoveOnlineBody {
    staging_id: Uuid,
    #[serde(default)]
    student_id: Option<Uuid>,
}

/// `POST /api/tenant/online/move`
pub async fn move_online(
    State(state): State<AppState>,
    ctx: RequestContext,
    user: AuthUser,
    body: Bytes,
) -> Result<Json<Value>, ApiError> {
    let user = user.require_role(Role::Admin, &ctx)?;
    let body: MoveOnlineBody = parse_json(&body, &ctx)?;

    // A tenant host must agree with the session's tenant.
    let target = addressed_host(&state, &ctx);
    let host_tenant = lookup_tenant(state.inner.tenants.as_ref(), &target)
        .await
        .map_err(|e| ApiError::from_error(&TenantError::from(e), &ctx))?;
    if host_tenant.is_some_and(|t| t.id != user.tenant_id) {
        return Err(ApiError::from_error(&TenantError::Mismatch, &ctx));
    }

    let student_id = body.student_id.unwrap_or_else(Uuid::new_v4);
    let row = state
        .inner
        .enrollment
        .move_online(user.tenant_id, body.staging_id, student_id)
        .await
        .map_err(|e| ApiError::from_error(&e, &ctx))?;

    Ok(Json(json!({
        "ok": true,
        "staging_id": row.processed_staging_id,
        "student_id": row.processed_student_id,
    })))
}
