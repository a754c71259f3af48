//! Tasks, comments, attachments. Everything here resolves to its owning
//! client through the task's project (task -> project -> client).

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use nx_schemas::{Priority, TaskKind, TaskStatus};
use nx_scope::ScopeFilter;
use rust_decimal::Decimal;
use serde::Serialize;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::scope_bind;

#[derive(Debug, Clone, Serialize)]
pub struct TaskRow {
    pub id: Uuid,
    pub project_id: Uuid,
    /// Owning client resolved through the project.
    pub client_id: Uuid,
    pub milestone_id: Option<Uuid>,
    pub parent_task_id: Option<Uuid>,
    pub assigned_to: Option<Uuid>,
    pub created_by: Option<Uuid>,
    pub title: String,
    pub description: Option<String>,
    pub status: TaskStatus,
    pub priority: Priority,
    pub task_kind: TaskKind,
    pub due_date: Option<NaiveDate>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub estimated_hours: Option<Decimal>,
    pub actual_hours: Decimal,
    pub progress: i32,
    pub sort_order: i32,
    pub tags: Option<String>,
}

impl TaskRow {
    /// Comma tags as a trimmed list.
    pub fn tag_list(&self) -> Vec<String> {
        self.tags
            .as_deref()
            .unwrap_or("")
            .split(',')
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_string)
            .collect()
    }
}

#[derive(Debug, Clone)]
pub struct NewTask {
    pub project_id: Uuid,
    pub milestone_id: Option<Uuid>,
    pub parent_task_id: Option<Uuid>,
    pub assigned_to: Option<Uuid>,
    pub created_by: Option<Uuid>,
    pub title: String,
    pub description: Option<String>,
    pub priority: Priority,
    pub task_kind: TaskKind,
    pub due_date: Option<NaiveDate>,
    pub estimated_hours: Option<Decimal>,
    pub tags: Option<String>,
}

const TASK_SELECT: &str = r#"
    select t.id, t.project_id, p.client_id, t.milestone_id, t.parent_task_id,
           t.assigned_to, t.created_by, t.title, t.description, t.status,
           t.priority, t.task_kind, t.due_date, t.started_at, t.completed_at,
           t.estimated_hours, t.actual_hours, t.progress, t.sort_order, t.tags
    from tasks t
    join projects p on p.id = t.project_id
"#;

fn map_task(row: &sqlx::postgres::PgRow) -> Result<TaskRow> {
    Ok(TaskRow {
        id: row.try_get("id")?,
        project_id: row.try_get("project_id")?,
        client_id: row.try_get("client_id")?,
        milestone_id: row.try_get("milestone_id")?,
        parent_task_id: row.try_get("parent_task_id")?,
        assigned_to: row.try_get("assigned_to")?,
        created_by: row.try_get("created_by")?,
        title: row.try_get("title")?,
        description: row.try_get("description")?,
        status: TaskStatus::parse(&row.try_get::<String, _>("status")?)?,
        priority: Priority::parse(&row.try_get::<String, _>("priority")?)?,
        task_kind: TaskKind::parse(&row.try_get::<String, _>("task_kind")?)?,
        due_date: row.try_get("due_date")?,
        started_at: row.try_get("started_at")?,
        completed_at: row.try_get("completed_at")?,
        estimated_hours: row.try_get("estimated_hours")?,
        actual_hours: row.try_get("actual_hours")?,
        progress: row.try_get("progress")?,
        sort_order: row.try_get("sort_order")?,
        tags: row.try_get("tags")?,
    })
}

pub async fn insert_task(pool: &PgPool, task: &NewTask) -> Result<Uuid> {
    let id = Uuid::new_v4();
    sqlx::query(
        r#"
        insert into tasks (
          id, project_id, milestone_id, parent_task_id, assigned_to, created_by,
          title, description, priority, task_kind, due_date, estimated_hours, tags
        ) values ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
        "#,
    )
    .bind(id)
    .bind(task.project_id)
    .bind(task.milestone_id)
    .bind(task.parent_task_id)
    .bind(task.assigned_to)
    .bind(task.created_by)
    .bind(&task.title)
    .bind(&task.description)
    .bind(task.priority.as_str())
    .bind(task.task_kind.as_str())
    .bind(task.due_date)
    .bind(task.estimated_hours)
    .bind(&task.tags)
    .execute(pool)
    .await
    .context("insert_task failed")?;
    Ok(id)
}

#[derive(Debug, Clone, Default)]
pub struct TaskPatch {
    pub title: Option<String>,
    pub description: Option<Option<String>>,
    pub status: Option<TaskStatus>,
    pub priority: Option<Priority>,
    pub assigned_to: Option<Option<Uuid>>,
    pub progress: Option<i32>,
    pub sort_order: Option<i32>,
    pub tags: Option<Option<String>>,
}

pub async fn update_task(pool: &PgPool, id: Uuid, patch: &TaskPatch) -> Result<()> {
    // started_at / completed_at follow status transitions.
    sqlx::query(
        r#"
        update tasks
        set title       = coalesce($2, title),
            description = case when $3 then $4 else description end,
            status      = coalesce($5, status),
            priority    = coalesce($6, priority),
            assigned_to = case when $7 then $8 else assigned_to end,
            progress    = coalesce($9, progress),
            sort_order  = coalesce($10, sort_order),
            tags        = case when $11 then $12 else tags end,
            started_at  = case when $5 = 'in_progress' and started_at is null
                               then now() else started_at end,
            completed_at = case when $5 = 'done' and completed_at is null
                                then now() else completed_at end,
            updated_at  = now()
        where id = $1
        "#,
    )
    .bind(id)
    .bind(&patch.title)
    .bind(patch.description.is_some())
    .bind(patch.description.clone().flatten())
    .bind(patch.status.map(|s| s.as_str()))
    .bind(patch.priority.map(|p| p.as_str()))
    .bind(patch.assigned_to.is_some())
    .bind(patch.assigned_to.flatten())
    .bind(patch.progress)
    .bind(patch.sort_order)
    .bind(patch.tags.is_some())
    .bind(patch.tags.clone().flatten())
    .execute(pool)
    .await
    .context("update_task failed")?;
    Ok(())
}

pub async fn fetch_task(pool: &PgPool, id: Uuid) -> Result<Option<TaskRow>> {
    let row = sqlx::query(&format!("{TASK_SELECT} where t.id = $1"))
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("fetch_task failed")?;
    row.as_ref().map(map_task).transpose()
}

#[derive(Debug, Clone, Default)]
pub struct TaskListFilter {
    pub project_id: Option<Uuid>,
    pub status: Option<TaskStatus>,
    pub assigned_to: Option<Uuid>,
}

pub async fn list_tasks(
    pool: &PgPool,
    scope: &ScopeFilter,
    filter: &TaskListFilter,
) -> Result<Vec<TaskRow>> {
    let rows = sqlx::query(&format!(
        r#"
        {TASK_SELECT}
        where ($1::uuid[] is null or p.client_id = any($1))
          and ($2::uuid is null or t.project_id = $2)
          and ($3::text is null or t.status = $3)
          and ($4::uuid is null or t.assigned_to = $4)
        order by t.sort_order, t.created_at desc
        "#
    ))
    .bind(scope_bind(scope))
    .bind(filter.project_id)
    .bind(filter.status.map(|s| s.as_str()))
    .bind(filter.assigned_to)
    .fetch_all(pool)
    .await
    .context("list_tasks failed")?;

    rows.iter().map(map_task).collect()
}

// ---------------------------------------------------------------------------
// Comments
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct TaskCommentRow {
    pub id: Uuid,
    pub task_id: Uuid,
    pub client_id: Uuid,
    pub author_id: Uuid,
    pub body: String,
    pub is_internal: bool,
    pub created_at: DateTime<Utc>,
}

pub async fn insert_comment(
    pool: &PgPool,
    task_id: Uuid,
    author_id: Uuid,
    body: &str,
    is_internal: bool,
) -> Result<Uuid> {
    let id = Uuid::new_v4();
    sqlx::query(
        r#"
        insert into task_comments (id, task_id, author_id, body, is_internal)
        values ($1, $2, $3, $4, $5)
        "#,
    )
    .bind(id)
    .bind(task_id)
    .bind(author_id)
    .bind(body)
    .bind(is_internal)
    .execute(pool)
    .await
    .context("insert_comment failed")?;
    Ok(id)
}

/// Comments for a task. `include_internal = false` (client members) hides
/// provider-internal notes.
pub async fn list_comments(
    pool: &PgPool,
    task_id: Uuid,
    include_internal: bool,
) -> Result<Vec<TaskCommentRow>> {
    let rows = sqlx::query(
        r#"
        select c.id, c.task_id, p.client_id, c.author_id, c.body, c.is_internal, c.created_at
        from task_comments c
        join tasks t on t.id = c.task_id
        join projects p on p.id = t.project_id
        where c.task_id = $1
          and ($2 or not c.is_internal)
        order by c.created_at
        "#,
    )
    .bind(task_id)
    .bind(include_internal)
    .fetch_all(pool)
    .await
    .context("list_comments failed")?;

    rows.iter()
        .map(|row| {
            Ok(TaskCommentRow {
                id: row.try_get("id")?,
                task_id: row.try_get("task_id")?,
                client_id: row.try_get("client_id")?,
                author_id: row.try_get("author_id")?,
                body: row.try_get("body")?,
                is_internal: row.try_get("is_internal")?,
                created_at: row.try_get("created_at")?,
            })
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Attachments
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct TaskAttachmentRow {
    pub id: Uuid,
    pub task_id: Uuid,
    pub uploaded_by: Uuid,
    pub file_name: String,
    pub file_size: i64,
    pub mime_type: String,
    pub storage_key: String,
}

pub async fn insert_attachment(
    pool: &PgPool,
    task_id: Uuid,
    uploaded_by: Uuid,
    file_name: &str,
    file_size: i64,
    mime_type: &str,
    storage_key: &str,
) -> Result<Uuid> {
    let id = Uuid::new_v4();
    sqlx::query(
        r#"
        insert into task_attachments (id, task_id, uploaded_by, file_name, file_size, mime_type, storage_key)
        values ($1, $2, $3, $4, $5, $6, $7)
        "#,
    )
    .bind(id)
    .bind(task_id)
    .bind(uploaded_by)
    .bind(file_name)
    .bind(file_size)
    .bind(mime_type)
    .bind(storage_key)
    .execute(pool)
    .await
    .context("insert_attachment failed")?;
    Ok(id)
}

pub async fn list_attachments(pool: &PgPool, task_id: Uuid) -> Result<Vec<TaskAttachmentRow>> {
    let rows = sqlx::query(
        r#"
        select id, task_id, uploaded_by, file_name, file_size, mime_type, storage_key
        from task_attachments
        where task_id = $1
        order by created_at desc
        "#,
    )
    .bind(task_id)
    .fetch_all(pool)
    .await
    .context("list_attachments failed")?;

    rows.iter()
        .map(|row| {
            Ok(TaskAttachmentRow {
                id: row.try_get("id")?,
                task_id: row.try_get("task_id")?,
                uploaded_by: row.try_get("uploaded_by")?,
                file_name: row.try_get("file_name")?,
                file_size: row.try_get("file_size")?,
                mime_type: row.try_get("mime_type")?,
                storage_key: row.try_get("storage_key")?,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tag_list_trims_and_drops_empties() {
        let row = TaskRow {
            id: Uuid::new_v4(),
            project_id: Uuid::new_v4(),
            client_id: Uuid::new_v4(),
            milestone_id: None,
            parent_task_id: None,
            assigned_to: None,
            created_by: None,
            title: "t".into(),
            description: None,
            status: TaskStatus::Todo,
            priority: Priority::Normal,
            task_kind: TaskKind::Task,
            due_date: None,
            started_at: None,
            completed_at: None,
            estimated_hours: None,
            actual_hours: Decimal::ZERO,
            progress: 0,
            sort_order: 0,
            tags: Some(" backend, , urgent ,api".into()),
        };
        assert_eq!(row.tag_list(), vec!["backend", "urgent", "api"]);
    }
}
