//! Request authentication and audit plumbing shared by all handlers.

use axum::http::HeaderMap;
use nx_audit::AuditRecord;
use nx_scope::{Access, Actor};
use tracing::warn;

use crate::error::ApiError;
use crate::state::AppState;

/// Resolve the bearer token to an [`Actor`] or fail with 401.
pub async fn require_actor(state: &AppState, headers: &HeaderMap) -> Result<Actor, ApiError> {
    let token = bearer_token(headers).ok_or(ApiError::Unauthorized)?;
    let actor = nx_db::users::resolve_session(&state.pool, token)
        .await?
        .ok_or(ApiError::Unauthorized)?;
    Ok(actor)
}

pub async fn require_staff(state: &AppState, headers: &HeaderMap) -> Result<Actor, ApiError> {
    let actor = require_actor(state, headers).await?;
    if !actor.is_provider_staff() {
        return Err(ApiError::Forbidden("staff_only"));
    }
    Ok(actor)
}

pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(axum::http::header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
}

/// Turn a scope decision into a handler result.
pub fn granted(access: Access) -> Result<(), ApiError> {
    match access.deny_reason() {
        None => Ok(()),
        Some(reason) => Err(ApiError::from_denial(reason)),
    }
}

/// Client address and user agent for audit records.
pub fn request_meta(headers: &HeaderMap) -> (Option<String>, Option<String>) {
    let ip = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|v| v.trim().to_string());
    let agent = headers
        .get(axum::http::header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    (ip, agent)
}

/// Seal and persist an audit record. Audit is best-effort from the request
/// path: a failure is logged, never turned into a client-facing error.
pub async fn record_audit(state: &AppState, record: AuditRecord) {
    let sealed = match record.seal() {
        Ok(sealed) => sealed,
        Err(err) => {
            warn!(error = %format!("{err:#}"), "audit record seal failed");
            return;
        }
    };
    if let Err(err) = nx_db::audit::insert_audit(&state.pool, &sealed).await {
        warn!(error = %format!("{err:#}"), "audit record insert failed");
    }
}
