//! Support ticket endpoints. Private tickets and internal messages stay on
//! the staff side of the fence.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::Json;
use nx_audit::AuditRecord;
use nx_db::support as db;
use nx_schemas::{AuditAction, Priority, TicketStatus};
use nx_scope::{check_read, check_write, ObjectScope, ScopeFilter};
use serde::Deserialize;
use uuid::Uuid;

use crate::api_types::{CreatedResponse, OkResponse};
use crate::auth::{granted, record_audit, request_meta, require_actor};
use crate::error::ApiError;
use crate::state::AppState;

pub(crate) async fn categories(
    State(st): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<Vec<db::CategoryRow>>, ApiError> {
    let _actor = require_actor(&st, &headers).await?;
    let rows = db::list_categories(&st.pool).await?;
    Ok(Json(rows))
}

// ---------------------------------------------------------------------------
// Tickets
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
pub(crate) struct ListQuery {
    #[serde(default)]
    pub status: Option<TicketStatus>,
}

pub(crate) async fn list(
    State(st): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(q): Query<ListQuery>,
) -> Result<Json<Vec<db::TicketRow>>, ApiError> {
    let actor = require_actor(&st, &headers).await?;
    let rows = db::list_tickets(
        &st.pool,
        &ScopeFilter::for_actor(&actor),
        q.status,
        actor.is_provider_staff(),
    )
    .await?;
    Ok(Json(rows))
}

pub(crate) async fn fetch(
    State(st): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Result<Json<db::TicketRow>, ApiError> {
    let actor = require_actor(&st, &headers).await?;
    let row = db::fetch_ticket(&st.pool, id).await?.ok_or(ApiError::NotFound)?;
    granted(check_read(
        &actor,
        &ObjectScope::client(row.client_id).with_ticket_public(row.is_public),
    ))?;
    Ok(Json(row))
}

#[derive(Deserialize)]
pub(crate) struct CreateTicketBody {
    pub client_id: Uuid,
    #[serde(default)]
    pub project_id: Option<Uuid>,
    #[serde(default)]
    pub category_id: Option<Uuid>,
    pub title: String,
    pub body: String,
    #[serde(default)]
    pub priority: Option<Priority>,
    #[serde(default)]
    pub is_public: Option<bool>,
}

pub(crate) async fn create(
    State(st): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<CreateTicketBody>,
) -> Result<Json<CreatedResponse>, ApiError> {
    let actor = require_actor(&st, &headers).await?;
    granted(check_read(&actor, &ObjectScope::client(body.client_id)))?;

    // Private tickets are opened by staff; client members always file public.
    let is_public = body.is_public.unwrap_or(true);
    if !is_public && !actor.is_provider_staff() {
        return Err(ApiError::Forbidden("private_ticket"));
    }

    let id = db::insert_ticket(
        &st.pool,
        &db::NewTicket {
            client_id: body.client_id,
            project_id: body.project_id,
            category_id: body.category_id,
            requester_id: Some(actor.user_id),
            title: body.title.clone(),
            body: body.body,
            priority: body.priority.unwrap_or(Priority::Normal),
            is_public,
        },
    )
    .await?;

    let (ip, agent) = request_meta(&headers);
    record_audit(
        &st,
        AuditRecord::new(AuditAction::Create, format!("ticket {} opened", body.title))
            .actor(actor.user_id)
            .entity("ticket", id)
            .scope(Some(body.client_id), body.project_id)
            .request_meta(ip, agent),
    )
    .await;

    Ok(Json(CreatedResponse { id }))
}

#[derive(Deserialize)]
pub(crate) struct UpdateStatusBody {
    pub status: TicketStatus,
    #[serde(default)]
    pub assigned_to: Option<Uuid>,
}

pub(crate) async fn update_status(
    State(st): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    Json(body): Json<UpdateStatusBody>,
) -> Result<Json<OkResponse>, ApiError> {
    let actor = require_actor(&st, &headers).await?;
    let ticket = db::fetch_ticket(&st.pool, id).await?.ok_or(ApiError::NotFound)?;
    granted(check_write(
        &actor,
        &ObjectScope::client(ticket.client_id).with_ticket_public(ticket.is_public),
    ))?;

    // Assignment targets provider staff; only staff reassign.
    if body.assigned_to.is_some() && !actor.is_provider_staff() {
        return Err(ApiError::Forbidden("assignment"));
    }

    db::update_ticket_status(&st.pool, id, body.status, body.assigned_to).await?;

    let (ip, agent) = request_meta(&headers);
    record_audit(
        &st,
        AuditRecord::new(
            AuditAction::Update,
            format!("ticket {} moved to {}", ticket.title, body.status.as_str()),
        )
        .actor(actor.user_id)
        .entity("ticket", id)
        .scope(Some(ticket.client_id), ticket.project_id)
        .request_meta(ip, agent),
    )
    .await;

    Ok(Json(OkResponse::yes()))
}

// ---------------------------------------------------------------------------
// Messages
// ---------------------------------------------------------------------------

pub(crate) async fn messages(
    State(st): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<db::TicketMessageRow>>, ApiError> {
    let actor = require_actor(&st, &headers).await?;
    let ticket = db::fetch_ticket(&st.pool, id).await?.ok_or(ApiError::NotFound)?;
    granted(check_read(
        &actor,
        &ObjectScope::client(ticket.client_id).with_ticket_public(ticket.is_public),
    ))?;
    let rows = db::list_messages(&st.pool, id, actor.is_provider_staff()).await?;
    Ok(Json(rows))
}

#[derive(Deserialize)]
pub(crate) struct MessageBody {
    pub body: String,
    #[serde(default)]
    pub is_internal: bool,
}

pub(crate) async fn add_message(
    State(st): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    Json(body): Json<MessageBody>,
) -> Result<Json<CreatedResponse>, ApiError> {
    let actor = require_actor(&st, &headers).await?;
    let ticket = db::fetch_ticket(&st.pool, id).await?.ok_or(ApiError::NotFound)?;
    granted(check_read(
        &actor,
        &ObjectScope::client(ticket.client_id).with_ticket_public(ticket.is_public),
    ))?;

    if body.is_internal && !actor.is_provider_staff() {
        return Err(ApiError::Forbidden("internal_note"));
    }

    let message_id =
        db::insert_message(&st.pool, id, actor.user_id, &body.body, body.is_internal).await?;

    let (ip, agent) = request_meta(&headers);
    record_audit(
        &st,
        AuditRecord::new(AuditAction::Create, "ticket message added")
            .actor(actor.user_id)
            .entity("ticket_message", message_id)
            .scope(Some(ticket.client_id), ticket.project_id)
            .request_meta(ip, agent),
    )
    .await;

    Ok(Json(CreatedResponse { id: message_id }))
}
