//! Task endpoints: CRUD, comments (internal comments hidden from client
//! members), attachment metadata.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::Json;
use chrono::NaiveDate;
use nx_audit::AuditRecord;
use nx_db::tasks as db;
use nx_schemas::{AuditAction, Priority, TaskKind, TaskStatus};
use nx_scope::{check_read, check_write, Actor, ObjectScope, ScopeFilter};
use rust_decimal::Decimal;
use serde::Deserialize;
use uuid::Uuid;

use crate::api_types::{CreatedResponse, OkResponse};
use crate::auth::{granted, record_audit, request_meta, require_actor};
use crate::error::ApiError;
use crate::state::AppState;

#[derive(Deserialize)]
pub(crate) struct ListQuery {
    #[serde(default)]
    pub project_id: Option<Uuid>,
    #[serde(default)]
    pub status: Option<TaskStatus>,
    #[serde(default)]
    pub assigned_to: Option<Uuid>,
}

pub(crate) async fn list(
    State(st): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(q): Query<ListQuery>,
) -> Result<Json<Vec<db::TaskRow>>, ApiError> {
    let actor = require_actor(&st, &headers).await?;
    let filter = db::TaskListFilter {
        project_id: q.project_id,
        status: q.status,
        assigned_to: q.assigned_to,
    };
    let rows = db::list_tasks(&st.pool, &ScopeFilter::for_actor(&actor), &filter).await?;
    Ok(Json(rows))
}

async fn fetch_checked(st: &AppState, actor: &Actor, id: Uuid) -> Result<db::TaskRow, ApiError> {
    let row = db::fetch_task(&st.pool, id).await?.ok_or(ApiError::NotFound)?;
    granted(check_read(actor, &ObjectScope::client(row.client_id)))?;
    Ok(row)
}

pub(crate) async fn fetch(
    State(st): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Result<Json<db::TaskRow>, ApiError> {
    let actor = require_actor(&st, &headers).await?;
    let row = fetch_checked(&st, &actor, id).await?;
    Ok(Json(row))
}

#[derive(Deserialize)]
pub(crate) struct CreateTaskBody {
    pub project_id: Uuid,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub milestone_id: Option<Uuid>,
    #[serde(default)]
    pub parent_task_id: Option<Uuid>,
    #[serde(default)]
    pub assigned_to: Option<Uuid>,
    #[serde(default)]
    pub priority: Option<Priority>,
    #[serde(default)]
    pub task_kind: Option<TaskKind>,
    #[serde(default)]
    pub due_date: Option<NaiveDate>,
    #[serde(default)]
    pub estimated_hours: Option<Decimal>,
    #[serde(default)]
    pub tags: Option<String>,
}

pub(crate) async fn create(
    State(st): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<CreateTaskBody>,
) -> Result<Json<CreatedResponse>, ApiError> {
    let actor = require_actor(&st, &headers).await?;
    let project = nx_db::projects::fetch_project(&st.pool, body.project_id)
        .await?
        .ok_or(ApiError::NotFound)?;
    granted(check_write(&actor, &ObjectScope::client(project.client_id)))?;

    let id = db::insert_task(
        &st.pool,
        &db::NewTask {
            project_id: body.project_id,
            milestone_id: body.milestone_id,
            parent_task_id: body.parent_task_id,
            assigned_to: body.assigned_to,
            created_by: Some(actor.user_id),
            title: body.title.clone(),
            description: body.description,
            priority: body.priority.unwrap_or(Priority::Normal),
            task_kind: body.task_kind.unwrap_or(TaskKind::Task),
            due_date: body.due_date,
            estimated_hours: body.estimated_hours,
            tags: body.tags,
        },
    )
    .await?;

    let (ip, agent) = request_meta(&headers);
    record_audit(
        &st,
        AuditRecord::new(AuditAction::Create, format!("task {} created", body.title))
            .actor(actor.user_id)
            .entity("task", id)
            .scope(Some(project.client_id), Some(body.project_id))
            .request_meta(ip, agent),
    )
    .await;

    Ok(Json(CreatedResponse { id }))
}

#[derive(Deserialize, Default)]
pub(crate) struct PatchTaskBody {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default, deserialize_with = "crate::api_types::double_option")]
    pub description: Option<Option<String>>,
    #[serde(default)]
    pub status: Option<TaskStatus>,
    #[serde(default)]
    pub priority: Option<Priority>,
    #[serde(default, deserialize_with = "crate::api_types::double_option")]
    pub assigned_to: Option<Option<Uuid>>,
    #[serde(default)]
    pub progress: Option<i32>,
    #[serde(default)]
    pub sort_order: Option<i32>,
    #[serde(default, deserialize_with = "crate::api_types::double_option")]
    pub tags: Option<Option<String>>,
}

pub(crate) async fn update(
    State(st): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    Json(body): Json<PatchTaskBody>,
) -> Result<Json<OkResponse>, ApiError> {
    let actor = require_actor(&st, &headers).await?;
    let existing = db::fetch_task(&st.pool, id).await?.ok_or(ApiError::NotFound)?;
    granted(check_write(&actor, &ObjectScope::client(existing.client_id)))?;

    if let Some(progress) = body.progress {
        if !(0..=100).contains(&progress) {
            return Err(ApiError::BadRequest("progress must be 0..=100".into()));
        }
    }

    db::update_task(
        &st.pool,
        id,
        &db::TaskPatch {
            title: body.title,
            description: body.description,
            status: body.status,
            priority: body.priority,
            assigned_to: body.assigned_to,
            progress: body.progress,
            sort_order: body.sort_order,
            tags: body.tags,
        },
    )
    .await?;

    let (ip, agent) = request_meta(&headers);
    record_audit(
        &st,
        AuditRecord::new(AuditAction::Update, format!("task {} updated", existing.title))
            .actor(actor.user_id)
            .entity("task", id)
            .scope(Some(existing.client_id), Some(existing.project_id))
            .request_meta(ip, agent),
    )
    .await;

    Ok(Json(OkResponse::yes()))
}

// ---------------------------------------------------------------------------
// Comments
// ---------------------------------------------------------------------------

pub(crate) async fn comments(
    State(st): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<db::TaskCommentRow>>, ApiError> {
    let actor = require_actor(&st, &headers).await?;
    let _task = fetch_checked(&st, &actor, id).await?;
    let rows = db::list_comments(&st.pool, id, actor.is_provider_staff()).await?;
    Ok(Json(rows))
}

#[derive(Deserialize)]
pub(crate) struct CommentBody {
    pub body: String,
    #[serde(default)]
    pub is_internal: bool,
}

pub(crate) async fn add_comment(
    State(st): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    Json(body): Json<CommentBody>,
) -> Result<Json<CreatedResponse>, ApiError> {
    let actor = require_actor(&st, &headers).await?;
    let task = fetch_checked(&st, &actor, id).await?;

    // Internal notes are a staff-only facility.
    if body.is_internal && !actor.is_provider_staff() {
        return Err(ApiError::Forbidden("internal_note"));
    }

    let comment_id =
        db::insert_comment(&st.pool, id, actor.user_id, &body.body, body.is_internal).await?;

    let (ip, agent) = request_meta(&headers);
    record_audit(
        &st,
        AuditRecord::new(AuditAction::Create, "task comment added")
            .actor(actor.user_id)
            .entity("task_comment", comment_id)
            .scope(Some(task.client_id), Some(task.project_id))
            .request_meta(ip, agent),
    )
    .await;

    Ok(Json(CreatedResponse { id: comment_id }))
}

// ---------------------------------------------------------------------------
// Attachments (metadata only; blob storage is outside the portal)
// ---------------------------------------------------------------------------

pub(crate) async fn attachments(
    State(st): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<db::TaskAttachmentRow>>, ApiError> {
    let actor = require_actor(&st, &headers).await?;
    let _task = fetch_checked(&st, &actor, id).await?;
    let rows = db::list_attachments(&st.pool, id).await?;
    Ok(Json(rows))
}

#[derive(Deserialize)]
pub(crate) struct AttachmentBody {
    pub file_name: String,
    pub file_size: i64,
    pub mime_type: String,
    pub storage_key: String,
}

pub(crate) async fn add_attachment(
    State(st): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    Json(body): Json<AttachmentBody>,
) -> Result<Json<CreatedResponse>, ApiError> {
    let actor = require_actor(&st, &headers).await?;
    let task = db::fetch_task(&st.pool, id).await?.ok_or(ApiError::NotFound)?;
    granted(check_write(&actor, &ObjectScope::client(task.client_id)))?;

    let attachment_id = db::insert_attachment(
        &st.pool,
        id,
        actor.user_id,
        &body.file_name,
        body.file_size,
        &body.mime_type,
        &body.storage_key,
    )
    .await?;

    let (ip, agent) = request_meta(&headers);
    record_audit(
        &st,
        AuditRecord::new(AuditAction::Create, "task attachment recorded")
            .actor(actor.user_id)
            .entity("task_attachment", attachment_id)
            .scope(Some(task.client_id), Some(task.project_id))
            .request_meta(ip, agent),
    )
    .await;

    Ok(Json(CreatedResponse { id: attachment_id }))
}
