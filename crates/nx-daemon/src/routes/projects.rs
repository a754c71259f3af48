//! Project and milestone endpoints.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::Json;
use chrono::NaiveDate;
use nx_audit::AuditRecord;
use nx_db::projects as db;
use nx_schemas::{AuditAction, Priority, ProjectStatus};
use nx_scope::{check_read, check_write, ObjectScope, ScopeFilter};
use rust_decimal::Decimal;
use serde::Deserialize;
use uuid::Uuid;

use crate::api_types::{CreatedResponse, OkResponse};
use crate::auth::{granted, record_audit, request_meta, require_actor, require_staff};
use crate::error::ApiError;
use crate::state::AppState;

#[derive(Deserialize)]
pub(crate) struct ListQuery {
    #[serde(default)]
    pub status: Option<ProjectStatus>,
}

pub(crate) async fn list(
    State(st): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(q): Query<ListQuery>,
) -> Result<Json<Vec<db::ProjectRow>>, ApiError> {
    let actor = require_actor(&st, &headers).await?;
    let rows = db::list_projects(&st.pool, &ScopeFilter::for_actor(&actor), q.status).await?;
    Ok(Json(rows))
}

pub(crate) async fn fetch(
    State(st): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Result<Json<db::ProjectRow>, ApiError> {
    let actor = require_actor(&st, &headers).await?;
    let row = db::fetch_project(&st.pool, id).await?.ok_or(ApiError::NotFound)?;
    granted(check_read(&actor, &ObjectScope::client(row.client_id)))?;
    Ok(Json(row))
}

#[derive(Deserialize)]
pub(crate) struct CreateProjectBody {
    pub client_id: Uuid,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub status: Option<ProjectStatus>,
    #[serde(default)]
    pub priority: Option<Priority>,
    #[serde(default)]
    pub start_date: Option<NaiveDate>,
    #[serde(default)]
    pub end_date: Option<NaiveDate>,
    #[serde(default)]
    pub estimated_hours: Option<Decimal>,
    #[serde(default)]
    pub manager_id: Option<Uuid>,
    #[serde(default)]
    pub notes: Option<String>,
}

/// Staff only; clients do not open their own projects.
pub(crate) async fn create(
    State(st): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<CreateProjectBody>,
) -> Result<Json<CreatedResponse>, ApiError> {
    let actor = require_staff(&st, &headers).await?;
    let new = db::NewProject {
        client_id: body.client_id,
        title: body.title.clone(),
        description: body.description,
        status: body.status.unwrap_or(ProjectStatus::Draft),
        priority: body.priority.unwrap_or(Priority::Normal),
        start_date: body.start_date,
        end_date: body.end_date,
        estimated_hours: body.estimated_hours,
        manager_id: body.manager_id,
        notes: body.notes,
    };
    let id = db::insert_project(&st.pool, &new).await?;

    let (ip, agent) = request_meta(&headers);
    record_audit(
        &st,
        AuditRecord::new(AuditAction::Create, format!("project {} created", body.title))
            .actor(actor.user_id)
            .entity("project", id)
            .scope(Some(new.client_id), Some(id))
            .request_meta(ip, agent),
    )
    .await;

    Ok(Json(CreatedResponse { id }))
}

#[derive(Deserialize, Default)]
pub(crate) struct PatchProjectBody {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default, deserialize_with = "crate::api_types::double_option")]
    pub description: Option<Option<String>>,
    #[serde(default)]
    pub status: Option<ProjectStatus>,
    #[serde(default)]
    pub priority: Option<Priority>,
    #[serde(default)]
    pub progress: Option<i32>,
    #[serde(default, deserialize_with = "crate::api_types::double_option")]
    pub notes: Option<Option<String>>,
}

pub(crate) async fn update(
    State(st): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    Json(body): Json<PatchProjectBody>,
) -> Result<Json<OkResponse>, ApiError> {
    let actor = require_actor(&st, &headers).await?;
    let existing = db::fetch_project(&st.pool, id).await?.ok_or(ApiError::NotFound)?;
    granted(check_write(&actor, &ObjectScope::client(existing.client_id)))?;

    if let Some(progress) = body.progress {
        if !(0..=100).contains(&progress) {
            return Err(ApiError::BadRequest("progress must be 0..=100".into()));
        }
    }

    let patch = db::ProjectPatch {
        title: body.title,
        description: body.description,
        status: body.status,
        priority: body.priority,
        progress: body.progress,
        notes: body.notes,
    };
    db::update_project(&st.pool, id, &patch).await?;

    let (ip, agent) = request_meta(&headers);
    record_audit(
        &st,
        AuditRecord::new(AuditAction::Update, format!("project {} updated", existing.title))
            .actor(actor.user_id)
            .entity("project", id)
            .scope(Some(existing.client_id), Some(id))
            .request_meta(ip, agent),
    )
    .await;

    Ok(Json(OkResponse::yes()))
}

// ---------------------------------------------------------------------------
// Milestones
// ---------------------------------------------------------------------------

pub(crate) async fn milestones(
    State(st): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<db::MilestoneRow>>, ApiError> {
    let actor = require_actor(&st, &headers).await?;
    let project = db::fetch_project(&st.pool, id).await?.ok_or(ApiError::NotFound)?;
    granted(check_read(&actor, &ObjectScope::client(project.client_id)))?;
    let rows = db::list_milestones(&st.pool, id).await?;
    Ok(Json(rows))
}

#[derive(Deserialize)]
pub(crate) struct MilestoneBody {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    pub due_date: NaiveDate,
    #[serde(default)]
    pub sort_order: i32,
}

pub(crate) async fn add_milestone(
    State(st): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    Json(body): Json<MilestoneBody>,
) -> Result<Json<CreatedResponse>, ApiError> {
    let actor = require_staff(&st, &headers).await?;
    let project = db::fetch_project(&st.pool, id).await?.ok_or(ApiError::NotFound)?;

    let milestone_id = db::insert_milestone(
        &st.pool,
        &db::NewMilestone {
            project_id: id,
            title: body.title,
            description: body.description,
            due_date: body.due_date,
            sort_order: body.sort_order,
        },
    )
    .await?;

    let (ip, agent) = request_meta(&headers);
    record_audit(
        &st,
        AuditRecord::new(AuditAction::Create, "milestone created")
            .actor(actor.user_id)
            .entity("milestone", milestone_id)
            .scope(Some(project.client_id), Some(id))
            .request_meta(ip, agent),
    )
    .await;

    Ok(Json(CreatedResponse { id: milestone_id }))
}
