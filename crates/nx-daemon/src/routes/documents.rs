//! Document endpoints. Internal-visibility documents never reach client
//! members; downloads bump the counter and leave an access-log row.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::Json;
use nx_audit::AuditRecord;
use nx_db::documents as db;
use nx_schemas::{AuditAction, DocVisibility, VersionStatus};
use nx_scope::{check_read, check_write, ObjectScope, ScopeFilter};
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
}

pub(crate) async fn list(
    State(st): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(q): Query<ListQuery>,
) -> Result<Json<Vec<db::DocumentRow>>, ApiError> {
    let actor = require_actor(&st, &headers).await?;
    let rows = db::list_documents(
        &st.pool,
        &ScopeFilter::for_actor(&actor),
        q.project_id,
        actor.is_provider_staff(),
    )
    .await?;
    Ok(Json(rows))
}

fn doc_scope(row: &db::DocumentRow) -> ObjectScope {
    ObjectScope::client(row.client_id).with_visibility(row.visibility)
}

pub(crate) async fn fetch(
    State(st): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Result<Json<db::DocumentRow>, ApiError> {
    let actor = require_actor(&st, &headers).await?;
    let row = db::fetch_document(&st.pool, id).await?.ok_or(ApiError::NotFound)?;
    granted(check_read(&actor, &doc_scope(&row)))?;

    let (ip, agent) = request_meta(&headers);
    db::record_view(&st.pool, id, Some(actor.user_id), ip, agent).await?;

    Ok(Json(row))
}

#[derive(Deserialize)]
pub(crate) struct CreateDocumentBody {
    pub project_id: Uuid,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub folder_id: Option<Uuid>,
    pub file_name: String,
    pub file_size: i64,
    pub mime_type: String,
    #[serde(default)]
    pub storage_bucket: Option<String>,
    #[serde(default)]
    pub storage_key: Option<String>,
    #[serde(default)]
    pub visibility: Option<DocVisibility>,
}

pub(crate) async fn create(
    State(st): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<CreateDocumentBody>,
) -> Result<Json<CreatedResponse>, ApiError> {
    let actor = require_actor(&st, &headers).await?;
    let project = nx_db::projects::fetch_project(&st.pool, body.project_id)
        .await?
        .ok_or(ApiError::NotFound)?;
    granted(check_write(&actor, &ObjectScope::client(project.client_id)))?;

    let visibility = body.visibility.unwrap_or(DocVisibility::Public);
    if visibility == DocVisibility::Internal && !actor.is_provider_staff() {
        return Err(ApiError::Forbidden("internal_document"));
    }

    let id = db::insert_document(
        &st.pool,
        &db::NewDocument {
            project_id: body.project_id,
            folder_id: body.folder_id,
            uploaded_by: Some(actor.user_id),
            title: body.title.clone(),
            description: body.description,
            file_name: body.file_name,
            file_size: body.file_size,
            mime_type: body.mime_type,
            storage_bucket: body.storage_bucket,
            storage_key: body.storage_key,
            visibility,
        },
    )
    .await?;

    let (ip, agent) = request_meta(&headers);
    record_audit(
        &st,
        AuditRecord::new(AuditAction::Create, format!("document {} uploaded", body.title))
            .actor(actor.user_id)
            .entity("document", id)
            .scope(Some(project.client_id), Some(body.project_id))
            .request_meta(ip, agent),
    )
    .await;

    Ok(Json(CreatedResponse { id }))
}

#[derive(Deserialize, Default)]
pub(crate) struct PatchDocumentBody {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default, deserialize_with = "crate::api_types::double_option")]
    pub description: Option<Option<String>>,
    #[serde(default, deserialize_with = "crate::api_types::double_option")]
    pub folder_id: Option<Option<Uuid>>,
    #[serde(default)]
    pub visibility: Option<DocVisibility>,
    #[serde(default)]
    pub version_status: Option<VersionStatus>,
}

pub(crate) async fn update(
    State(st): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    Json(body): Json<PatchDocumentBody>,
) -> Result<Json<OkResponse>, ApiError> {
    let actor = require_actor(&st, &headers).await?;
    let existing = db::fetch_document(&st.pool, id).await?.ok_or(ApiError::NotFound)?;
    granted(check_write(&actor, &doc_scope(&existing)))?;

    // Moving a document behind the internal wall is a staff action.
    if body.visibility == Some(DocVisibility::Internal) && !actor.is_provider_staff() {
        return Err(ApiError::Forbidden("internal_document"));
    }

    db::update_document(
        &st.pool,
        id,
        &db::DocumentPatch {
            title: body.title,
            description: body.description,
            folder_id: body.folder_id,
            visibility: body.visibility,
            version_status: body.version_status,
        },
    )
    .await?;

    let (ip, agent) = request_meta(&headers);
    record_audit(
        &st,
        AuditRecord::new(AuditAction::Update, format!("document {} updated", existing.title))
            .actor(actor.user_id)
            .entity("document", id)
            .scope(Some(existing.client_id), Some(existing.project_id))
            .request_meta(ip, agent),
    )
    .await;

    Ok(Json(OkResponse::yes()))
}

/// Registers a download: counter increment plus an access-log row, audited.
/// The actual bytes come from object storage; the portal only hands out
/// metadata.
pub(crate) async fn download(
    State(st): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Result<Json<db::DocumentRow>, ApiError> {
    let actor = require_actor(&st, &headers).await?;
    let row = db::fetch_document(&st.pool, id).await?.ok_or(ApiError::NotFound)?;
    granted(check_read(&actor, &doc_scope(&row)))?;

    let (ip, agent) = request_meta(&headers);
    db::record_download(&st.pool, id, Some(actor.user_id), ip.clone(), agent.clone()).await?;

    record_audit(
        &st,
        AuditRecord::new(AuditAction::Download, format!("document {} downloaded", row.title))
            .actor(actor.user_id)
            .entity("document", id)
            .scope(Some(row.client_id), Some(row.project_id))
            .request_meta(ip, agent),
    )
    .await;

    // Re-read so the response carries the bumped counter.
    let row = db::fetch_document(&st.pool, id).await?.ok_or(ApiError::NotFound)?;
    Ok(Json(row))
}

// ---------------------------------------------------------------------------
// Folders
// ---------------------------------------------------------------------------

pub(crate) async fn folders(
    State(st): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(project_id): Path<Uuid>,
) -> Result<Json<Vec<db::FolderRow>>, ApiError> {
    let actor = require_actor(&st, &headers).await?;
    let project = nx_db::projects::fetch_project(&st.pool, project_id)
        .await?
        .ok_or(ApiError::NotFound)?;
    granted(check_read(&actor, &ObjectScope::client(project.client_id)))?;
    let rows = db::list_folders(&st.pool, project_id).await?;
    Ok(Json(rows))
}

#[derive(Deserialize)]
pub(crate) struct FolderBody {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub parent_id: Option<Uuid>,
}

pub(crate) async fn add_folder(
    State(st): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(project_id): Path<Uuid>,
    Json(body): Json<FolderBody>,
) -> Result<Json<CreatedResponse>, ApiError> {
    let actor = require_actor(&st, &headers).await?;
    let project = nx_db::projects::fetch_project(&st.pool, project_id)
        .await?
        .ok_or(ApiError::NotFound)?;
    granted(check_write(&actor, &ObjectScope::client(project.client_id)))?;

    let id = db::insert_folder(
        &st.pool,
        project_id,
        body.parent_id,
        &body.name,
        body.description.as_deref(),
    )
    .await?;

    Ok(Json(CreatedResponse { id }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upload_without_visibility_defaults_to_public() {
        let body: CreateDocumentBody = serde_json::from_str(
            r#"{
                "project_id": "3e1f2b34-0000-0000-0000-000000000001",
                "title": "report",
                "file_name": "report.pdf",
                "file_size": 1024,
                "mime_type": "application/pdf"
            }"#,
        )
        .expect("minimal upload body");

        assert_eq!(body.visibility, None);
        assert_eq!(
            body.visibility.unwrap_or(DocVisibility::Public),
            DocVisibility::Public
        );
    }

    #[test]
    fn upload_accepts_every_visibility_value() {
        for (raw, expected) in [
            ("public", DocVisibility::Public),
            ("internal", DocVisibility::Internal),
            ("restricted", DocVisibility::Restricted),
        ] {
            let body: CreateDocumentBody = serde_json::from_str(&format!(
                r#"{{
                    "project_id": "3e1f2b34-0000-0000-0000-000000000001",
                    "title": "report",
                    "file_name": "report.pdf",
                    "file_size": 1024,
                    "mime_type": "application/pdf",
                    "visibility": "{raw}"
                }}"#
            ))
            .expect("upload body with visibility");
            assert_eq!(body.visibility, Some(expected));
        }
    }
}
