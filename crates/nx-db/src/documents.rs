//! Documents, folders, and the access log. Documents resolve to their
//! owning client through the project; the visibility column additionally
//! hides `internal` rows from non-staff at query time.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use nx_schemas::{DocVisibility, DocumentAction, VersionStatus};
use nx_scope::ScopeFilter;
use serde::Serialize;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::scope_bind;

#[derive(Debug, Clone, Serialize)]
pub struct DocumentRow {
    pub id: Uuid,
    pub project_id: Uuid,
    /// Owning client resolved through the project.
    pub client_id: Uuid,
    pub folder_id: Option<Uuid>,
    pub uploaded_by: Option<Uuid>,
    pub title: String,
    pub description: Option<String>,
    pub file_name: String,
    pub file_size: i64,
    pub mime_type: String,
    pub storage_bucket: Option<String>,
    pub storage_key: Option<String>,
    pub visibility: DocVisibility,
    pub version: String,
    pub version_status: VersionStatus,
    pub download_count: i32,
    pub last_downloaded_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct NewDocument {
    pub project_id: Uuid,
    pub folder_id: Option<Uuid>,
    pub uploaded_by: Option<Uuid>,
    pub title: String,
    pub description: Option<String>,
    pub file_name: String,
    pub file_size: i64,
    pub mime_type: String,
    pub storage_bucket: Option<String>,
    pub storage_key: Option<String>,
    pub visibility: DocVisibility,
}

const DOC_SELECT: &str = r#"
    select d.id, d.project_id, p.client_id, d.folder_id, d.uploaded_by,
           d.title, d.description, d.file_name, d.file_size, d.mime_type,
           d.storage_bucket, d.storage_key, d.visibility, d.version,
           d.version_status, d.download_count, d.last_downloaded_at
    from documents d
    join projects p on p.id = d.project_id
"#;

fn map_document(row: &sqlx::postgres::PgRow) -> Result<DocumentRow> {
    Ok(DocumentRow {
        id: row.try_get("id")?,
        project_id: row.try_get("project_id")?,
        client_id: row.try_get("client_id")?,
        folder_id: row.try_get("folder_id")?,
        uploaded_by: row.try_get("uploaded_by")?,
        title: row.try_get("title")?,
        description: row.try_get("description")?,
        file_name: row.try_get("file_name")?,
        file_size: row.try_get("file_size")?,
        mime_type: row.try_get("mime_type")?,
        storage_bucket: row.try_get("storage_bucket")?,
        storage_key: row.try_get("storage_key")?,
        visibility: DocVisibility::parse(&row.try_get::<String, _>("visibility")?)?,
        version: row.try_get("version")?,
        version_status: VersionStatus::parse(&row.try_get::<String, _>("version_status")?)?,
        download_count: row.try_get("download_count")?,
        last_downloaded_at: row.try_get("last_downloaded_at")?,
    })
}

pub async fn insert_document(pool: &PgPool, doc: &NewDocument) -> Result<Uuid> {
    let id = Uuid::new_v4();
    sqlx::query(
        r#"
        insert into documents (
          id, project_id, folder_id, uploaded_by, title, description,
          file_name, file_size, mime_type, storage_bucket, storage_key, visibility
        ) values ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
        "#,
    )
    .bind(id)
    .bind(doc.project_id)
    .bind(doc.folder_id)
    .bind(doc.uploaded_by)
    .bind(&doc.title)
    .bind(&doc.description)
    .bind(&doc.file_name)
    .bind(doc.file_size)
    .bind(&doc.mime_type)
    .bind(&doc.storage_bucket)
    .bind(&doc.storage_key)
    .bind(doc.visibility.as_str())
    .execute(pool)
    .await
    .context("insert_document failed")?;
    Ok(id)
}

#[derive(Debug, Clone, Default)]
pub struct DocumentPatch {
    pub title: Option<String>,
    pub description: Option<Option<String>>,
    pub folder_id: Option<Option<Uuid>>,
    pub visibility: Option<DocVisibility>,
    pub version_status: Option<VersionStatus>,
}

pub async fn update_document(pool: &PgPool, id: Uuid, patch: &DocumentPatch) -> Result<()> {
    sqlx::query(
        r#"
        update documents
        set title          = coalesce($2, title),
            description    = case when $3 then $4 else description end,
            folder_id      = case when $5 then $6 else folder_id end,
            visibility     = coalesce($7, visibility),
            version_status = coalesce($8, version_status),
            updated_at     = now()
        where id = $1
        "#,
    )
    .bind(id)
    .bind(&patch.title)
    .bind(patch.description.is_some())
    .bind(patch.description.clone().flatten())
    .bind(patch.folder_id.is_some())
    .bind(patch.folder_id.flatten())
    .bind(patch.visibility.map(|v| v.as_str()))
    .bind(patch.version_status.map(|v| v.as_str()))
    .execute(pool)
    .await
    .context("update_document failed")?;
    Ok(())
}

pub async fn fetch_document(pool: &PgPool, id: Uuid) -> Result<Option<DocumentRow>> {
    let row = sqlx::query(&format!("{DOC_SELECT} where d.id = $1"))
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("fetch_document failed")?;
    row.as_ref().map(map_document).transpose()
}

/// Scoped document list. `include_internal = false` (non-staff) filters
/// `visibility = 'internal'` rows out at query time, matching the
/// object-level rule in nx-scope.
pub async fn list_documents(
    pool: &PgPool,
    scope: &ScopeFilter,
    project_id: Option<Uuid>,
    include_internal: bool,
) -> Result<Vec<DocumentRow>> {
    let rows = sqlx::query(&format!(
        r#"
        {DOC_SELECT}
        where ($1::uuid[] is null or p.client_id = any($1))
          and ($2::uuid is null or d.project_id = $2)
          and ($3 or d.visibility <> 'internal')
        order by d.created_at desc
        "#
    ))
    .bind(scope_bind(scope))
    .bind(project_id)
    .bind(include_internal)
    .fetch_all(pool)
    .await
    .context("list_documents failed")?;

    rows.iter().map(map_document).collect()
}

/// Bump the download counter and write the access-log row atomically.
pub async fn record_download(
    pool: &PgPool,
    document_id: Uuid,
    user_id: Option<Uuid>,
    ip: Option<String>,
    user_agent: Option<String>,
) -> Result<()> {
    let mut tx = pool.begin().await.context("begin record_download tx")?;

    sqlx::query(
        r#"
        update documents
        set download_count = download_count + 1,
            last_downloaded_at = now(),
            updated_at = now()
        where id = $1
        "#,
    )
    .bind(document_id)
    .execute(&mut *tx)
    .await
    .context("download counter update failed")?;

    insert_access(&mut tx, document_id, user_id, DocumentAction::Download, ip, user_agent).await?;

    tx.commit().await.context("commit record_download tx")?;
    Ok(())
}

pub async fn record_view(
    pool: &PgPool,
    document_id: Uuid,
    user_id: Option<Uuid>,
    ip: Option<String>,
    user_agent: Option<String>,
) -> Result<()> {
    let mut tx = pool.begin().await.context("begin record_view tx")?;
    insert_access(&mut tx, document_id, user_id, DocumentAction::View, ip, user_agent).await?;
    tx.commit().await.context("commit record_view tx")?;
    Ok(())
}

async fn insert_access(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    document_id: Uuid,
    user_id: Option<Uuid>,
    action: DocumentAction,
    ip: Option<String>,
    user_agent: Option<String>,
) -> Result<()> {
    sqlx::query(
        r#"
        insert into document_access (id, document_id, user_id, action, ip_address, user_agent)
        values ($1, $2, $3, $4, $5, $6)
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(document_id)
    .bind(user_id)
    .bind(action.as_str())
    .bind(ip)
    .bind(user_agent)
    .execute(&mut **tx)
    .await
    .context("insert document_access failed")?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Folders
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct FolderRow {
    pub id: Uuid,
    pub project_id: Uuid,
    pub parent_id: Option<Uuid>,
    pub name: String,
    pub description: Option<String>,
    pub sort_order: i32,
}

pub async fn insert_folder(
    pool: &PgPool,
    project_id: Uuid,
    parent_id: Option<Uuid>,
    name: &str,
    description: Option<&str>,
) -> Result<Uuid> {
    let id = Uuid::new_v4();
    sqlx::query(
        r#"
        insert into document_folders (id, project_id, parent_id, name, description)
        values ($1, $2, $3, $4, $5)
        "#,
    )
    .bind(id)
    .bind(project_id)
    .bind(parent_id)
    .bind(name)
    .bind(description)
    .execute(pool)
    .await
    .context("insert_folder failed")?;
    Ok(id)
}

pub async fn list_folders(pool: &PgPool, project_id: Uuid) -> Result<Vec<FolderRow>> {
    let rows = sqlx::query(
        r#"
        select id, project_id, parent_id, name, description, sort_order
        from document_folders
        where project_id = $1
        order by sort_order, name
        "#,
    )
    .bind(project_id)
    .fetch_all(pool)
    .await
    .context("list_folders failed")?;

    rows.iter()
        .map(|row| {
            Ok(FolderRow {
                id: row.try_get("id")?,
                project_id: row.try_get("project_id")?,
                parent_id: row.try_get("parent_id")?,
                name: row.try_get("name")?,
                description: row.try_get("description")?,
                sort_order: row.try_get("sort_order")?,
            })
        })
        .collect()
}
