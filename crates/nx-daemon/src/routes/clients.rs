//! Client (tenant) endpoints and membership management.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::Json;
use nx_audit::AuditRecord;
use nx_db::clients as db;
use nx_schemas::{AuditAction, ClientStatus, MemberRole};
use nx_scope::{check_read, check_write, ObjectScope, ScopeFilter};
use serde::Deserialize;
use uuid::Uuid;

use crate::api_types::{CreatedResponse, OkResponse};
use crate::auth::{granted, record_audit, request_meta, require_actor, require_staff};
use crate::error::ApiError;
use crate::state::AppState;

#[derive(Deserialize)]
pub(crate) struct ClientBody {
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
    pub main_contact_name: String,
    pub main_contact_email: String,
    #[serde(default)]
    pub industry: Option<String>,
    #[serde(default)]
    pub company_size: Option<String>,
    #[serde(default)]
    pub status: Option<ClientStatus>,
    #[serde(default)]
    pub notes: Option<String>,
}

impl ClientBody {
    fn into_new(self) -> db::NewClient {
        db::NewClient {
            name: self.name,
            email: self.email,
            phone: self.phone,
            address: self.address,
            main_contact_name: self.main_contact_name,
            main_contact_email: self.main_contact_email,
            industry: self.industry,
            company_size: self.company_size,
            status: self.status.unwrap_or(ClientStatus::Prospect),
            notes: self.notes,
        }
    }
}

pub(crate) async fn list(
    State(st): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<Vec<db::ClientRow>>, ApiError> {
    let actor = require_actor(&st, &headers).await?;
    let rows = db::list_clients(&st.pool, &ScopeFilter::for_actor(&actor)).await?;
    Ok(Json(rows))
}

pub(crate) async fn fetch(
    State(st): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Result<Json<db::ClientRow>, ApiError> {
    let actor = require_actor(&st, &headers).await?;
    let row = db::fetch_client(&st.pool, id).await?.ok_or(ApiError::NotFound)?;
    granted(check_read(&actor, &ObjectScope::client(row.id)))?;
    Ok(Json(row))
}

/// Only provider staff create tenants.
pub(crate) async fn create(
    State(st): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<ClientBody>,
) -> Result<Json<CreatedResponse>, ApiError> {
    let actor = require_staff(&st, &headers).await?;
    let new = body.into_new();
    let id = db::insert_client(&st.pool, &new).await?;

    let (ip, agent) = request_meta(&headers);
    record_audit(
        &st,
        AuditRecord::new(AuditAction::Create, format!("client {} created", new.name))
            .actor(actor.user_id)
            .entity("client", id)
            .scope(Some(id), None)
            .request_meta(ip, agent),
    )
    .await;

    Ok(Json(CreatedResponse { id }))
}

pub(crate) async fn update(
    State(st): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    Json(body): Json<ClientBody>,
) -> Result<Json<OkResponse>, ApiError> {
    let actor = require_actor(&st, &headers).await?;
    let existing = db::fetch_client(&st.pool, id).await?.ok_or(ApiError::NotFound)?;
    granted(check_write(&actor, &ObjectScope::client(existing.id)))?;

    let new = body.into_new();
    db::update_client(&st.pool, id, &new).await?;

    let (ip, agent) = request_meta(&headers);
    record_audit(
        &st,
        AuditRecord::new(AuditAction::Update, format!("client {} updated", new.name))
            .actor(actor.user_id)
            .entity("client", id)
            .scope(Some(id), None)
            .request_meta(ip, agent),
    )
    .await;

    Ok(Json(OkResponse::yes()))
}

// ---------------------------------------------------------------------------
// Memberships
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
pub(crate) struct AddMemberBody {
    pub user_id: Uuid,
    pub role: MemberRole,
    #[serde(default)]
    pub can_view_billing: bool,
    #[serde(default)]
    pub can_manage_team: bool,
}

pub(crate) async fn members(
    State(st): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<db::MemberRow>>, ApiError> {
    let actor = require_actor(&st, &headers).await?;
    granted(check_read(&actor, &ObjectScope::client(id)))?;
    let rows = db::list_members(&st.pool, id).await?;
    Ok(Json(rows))
}

/// Staff, or a member whose membership carries the team-management grant.
fn can_manage_members(actor: &nx_scope::Actor, client_id: Uuid) -> bool {
    actor.is_provider_staff()
        || actor
            .membership(client_id)
            .map(|m| m.can_manage_team)
            .unwrap_or(false)
}

pub(crate) async fn add_member(
    State(st): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    Json(body): Json<AddMemberBody>,
) -> Result<Json<CreatedResponse>, ApiError> {
    let actor = require_actor(&st, &headers).await?;
    granted(check_read(&actor, &ObjectScope::client(id)))?;
    if !can_manage_members(&actor, id) {
        return Err(ApiError::Forbidden("team_management_required"));
    }

    let member_id = match db::add_member(
        &st.pool,
        id,
        body.user_id,
        body.role,
        body.can_view_billing,
        body.can_manage_team,
    )
    .await
    {
        Ok(member_id) => member_id,
        Err(err) => {
            if let Some(db_err) = err.downcast_ref::<sqlx::Error>() {
                if nx_db::is_unique_constraint_violation(db_err, "uq_client_members_user_client") {
                    return Err(ApiError::Conflict("user is already a member".into()));
                }
            }
            return Err(err.into());
        }
    };

    let (ip, agent) = request_meta(&headers);
    record_audit(
        &st,
        AuditRecord::new(AuditAction::Create, "member added")
            .actor(actor.user_id)
            .entity("client_member", member_id)
            .scope(Some(id), None)
            .request_meta(ip, agent),
    )
    .await;

    Ok(Json(CreatedResponse { id: member_id }))
}

pub(crate) async fn remove_member(
    State(st): State<Arc<AppState>>,
    headers: HeaderMap,
    Path((id, user_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<OkResponse>, ApiError> {
    let actor = require_actor(&st, &headers).await?;
    granted(check_read(&actor, &ObjectScope::client(id)))?;
    if !can_manage_members(&actor, id) {
        return Err(ApiError::Forbidden("team_management_required"));
    }

    let removed = db::remove_member(&st.pool, id, user_id).await?;
    if !removed {
        return Err(ApiError::NotFound);
    }

    let (ip, agent) = request_meta(&headers);
    record_audit(
        &st,
        AuditRecord::new(AuditAction::Delete, "member removed")
            .actor(actor.user_id)
            .entity("client_member", user_id)
            .scope(Some(id), None)
            .request_meta(ip, agent),
    )
    .await;

    Ok(Json(OkResponse::yes()))
}
