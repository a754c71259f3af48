//! Projects and milestones. Projects own the client_id column directly;
//! milestones resolve through their project.

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use nx_schemas::{MilestoneStatus, Priority, ProjectStatus};
use nx_scope::ScopeFilter;
use rust_decimal::Decimal;
use serde::Serialize;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::scope_bind;

#[derive(Debug, Clone, Serialize)]
pub struct ProjectRow {
    pub id: Uuid,
    pub client_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub status: ProjectStatus,
    pub priority: Priority,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub completed_at: Option<DateTime<Utc>>,
    pub progress: i32,
    pub estimated_hours: Option<Decimal>,
    pub actual_hours: Decimal,
    pub manager_id: Option<Uuid>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone)]
pub struct NewProject {
    pub client_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub status: ProjectStatus,
    pub priority: Priority,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub estimated_hours: Option<Decimal>,
    pub manager_id: Option<Uuid>,
    pub notes: Option<String>,
}

const PROJECT_COLS: &str = r#"
    id, client_id, title, description, status, priority, start_date, end_date,
    completed_at, progress, estimated_hours, actual_hours, manager_id, notes
"#;

fn map_project(row: &sqlx::postgres::PgRow) -> Result<ProjectRow> {
    Ok(ProjectRow {
        id: row.try_get("id")?,
        client_id: row.try_get("client_id")?,
        title: row.try_get("title")?,
        description: row.try_get("description")?,
        status: ProjectStatus::parse(&row.try_get::<String, _>("status")?)?,
        priority: Priority::parse(&row.try_get::<String, _>("priority")?)?,
        start_date: row.try_get("start_date")?,
        end_date: row.try_get("end_date")?,
        completed_at: row.try_get("completed_at")?,
        progress: row.try_get("progress")?,
        estimated_hours: row.try_get("estimated_hours")?,
        actual_hours: row.try_get("actual_hours")?,
        manager_id: row.try_get("manager_id")?,
        notes: row.try_get("notes")?,
    })
}

pub async fn insert_project(pool: &PgPool, project: &NewProject) -> Result<Uuid> {
    let id = Uuid::new_v4();
    sqlx::query(
        r#"
        insert into projects (
          id, client_id, title, description, status, priority,
          start_date, end_date, estimated_hours, manager_id, notes
        ) values ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
        "#,
    )
    .bind(id)
    .bind(project.client_id)
    .bind(&project.title)
    .bind(&project.description)
    .bind(project.status.as_str())
    .bind(project.priority.as_str())
    .bind(project.start_date)
    .bind(project.end_date)
    .bind(project.estimated_hours)
    .bind(project.manager_id)
    .bind(&project.notes)
    .execute(pool)
    .await
    .context("insert_project failed")?;
    Ok(id)
}

#[derive(Debug, Clone, Default)]
pub struct ProjectPatch {
    pub title: Option<String>,
    pub description: Option<Option<String>>,
    pub status: Option<ProjectStatus>,
    pub priority: Option<Priority>,
    pub progress: Option<i32>,
    pub notes: Option<Option<String>>,
}

pub async fn update_project(pool: &PgPool, id: Uuid, patch: &ProjectPatch) -> Result<()> {
    // completed_at follows the status transition, not client input.
    sqlx::query(
        r#"
        update projects
        set title       = coalesce($2, title),
            description = case when $3 then $4 else description end,
            status      = coalesce($5, status),
            priority    = coalesce($6, priority),
            progress    = coalesce($7, progress),
            notes       = case when $8 then $9 else notes end,
            completed_at = case when $5 = 'completed' and completed_at is null
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
    .bind(patch.progress)
    .bind(patch.notes.is_some())
    .bind(patch.notes.clone().flatten())
    .execute(pool)
    .await
    .context("update_project failed")?;
    Ok(())
}

pub async fn fetch_project(pool: &PgPool, id: Uuid) -> Result<Option<ProjectRow>> {
    let row = sqlx::query(&format!("select {PROJECT_COLS} from projects where id = $1"))
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("fetch_project failed")?;
    row.as_ref().map(map_project).transpose()
}

pub async fn list_projects(
    pool: &PgPool,
    scope: &ScopeFilter,
    status: Option<ProjectStatus>,
) -> Result<Vec<ProjectRow>> {
    let rows = sqlx::query(&format!(
        r#"
        select {PROJECT_COLS}
        from projects
        where ($1::uuid[] is null or client_id = any($1))
          and ($2::text is null or status = $2)
        order by created_at desc
        "#
    ))
    .bind(scope_bind(scope))
    .bind(status.map(|s| s.as_str()))
    .fetch_all(pool)
    .await
    .context("list_projects failed")?;

    rows.iter().map(map_project).collect()
}

// ---------------------------------------------------------------------------
// Milestones
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct MilestoneRow {
    pub id: Uuid,
    pub project_id: Uuid,
    /// Owning client resolved through the project.
    pub client_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub status: MilestoneStatus,
    pub due_date: NaiveDate,
    pub completed_at: Option<DateTime<Utc>>,
    pub sort_order: i32,
    pub progress: i32,
}

#[derive(Debug, Clone)]
pub struct NewMilestone {
    pub project_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub due_date: NaiveDate,
    pub sort_order: i32,
}

pub async fn insert_milestone(pool: &PgPool, m: &NewMilestone) -> Result<Uuid> {
    let id = Uuid::new_v4();
    sqlx::query(
        r#"
        insert into milestones (id, project_id, title, description, due_date, sort_order)
        values ($1, $2, $3, $4, $5, $6)
        "#,
    )
    .bind(id)
    .bind(m.project_id)
    .bind(&m.title)
    .bind(&m.description)
    .bind(m.due_date)
    .bind(m.sort_order)
    .execute(pool)
    .await
    .context("insert_milestone failed")?;
    Ok(id)
}

fn map_milestone(row: &sqlx::postgres::PgRow) -> Result<MilestoneRow> {
    Ok(MilestoneRow {
        id: row.try_get("id")?,
        project_id: row.try_get("project_id")?,
        client_id: row.try_get("client_id")?,
        title: row.try_get("title")?,
        description: row.try_get("description")?,
        status: MilestoneStatus::parse(&row.try_get::<String, _>("status")?)?,
        due_date: row.try_get("due_date")?,
        completed_at: row.try_get("completed_at")?,
        sort_order: row.try_get("sort_order")?,
        progress: row.try_get("progress")?,
    })
}

pub async fn list_milestones(pool: &PgPool, project_id: Uuid) -> Result<Vec<MilestoneRow>> {
    let rows = sqlx::query(
        r#"
        select m.id, m.project_id, p.client_id, m.title, m.description, m.status,
               m.due_date, m.completed_at, m.sort_order, m.progress
        from milestones m
        join projects p on p.id = m.project_id
        where m.project_id = $1
        order by m.sort_order, m.due_date
        "#,
    )
    .bind(project_id)
    .fetch_all(pool)
    .await
    .context("list_milestones failed")?;

    rows.iter().map(map_milestone).collect()
}
