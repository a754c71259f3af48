//! Session issuance and revocation. Both endpoints write audit events.

use std::sync::Arc;

use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;
use nx_audit::AuditRecord;
use nx_schemas::{AuditAction, AuditLevel};
use tracing::info;

use crate::api_types::{LoginRequest, LoginResponse, OkResponse};
use crate::auth::{bearer_token, record_audit, request_meta};
use crate::error::ApiError;
use crate::state::AppState;

pub(crate) async fn login(
    State(st): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, ApiError> {
    let (ip, agent) = request_meta(&headers);

    let Some((user, session)) = nx_db::users::login(
        &st.pool,
        &req.username,
        &req.password,
        st.config.session_ttl_hours,
    )
    .await?
    else {
        // Failed attempts are audited but get the same response regardless
        // of whether the username exists.
        record_audit(
            &st,
            AuditRecord::new(AuditAction::Login, format!("failed login for {}", req.username))
                .level(AuditLevel::Warning)
                .request_meta(ip, agent),
        )
        .await;
        return Err(ApiError::Unauthorized);
    };

    record_audit(
        &st,
        AuditRecord::new(AuditAction::Login, format!("{} logged in", user.username))
            .actor(user.id)
            .request_meta(ip, agent),
    )
    .await;

    info!(username = %user.username, "login");

    Ok(Json(LoginResponse {
        token: session.token,
        expires_at: session.expires_at_utc,
        user_id: user.id,
        username: user.username,
        is_staff: user.is_staff,
    }))
}

pub(crate) async fn logout(
    State(st): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<OkResponse>, ApiError> {
    let actor = crate::auth::require_actor(&st, &headers).await?;
    let token = bearer_token(&headers).ok_or(ApiError::Unauthorized)?;
    nx_db::users::revoke_session(&st.pool, token).await?;

    let (ip, agent) = request_meta(&headers);
    record_audit(
        &st,
        AuditRecord::new(AuditAction::Logout, "session revoked")
            .actor(actor.user_id)
            .request_meta(ip, agent),
    )
    .await;

    Ok(Json(OkResponse::yes()))
}
