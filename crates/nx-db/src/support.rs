//! Support tickets. Tickets carry client_id directly; `is_public = false`
//! rows and internal messages are filtered out for non-staff at query time,
//! mirroring the object-level rules in nx-scope.

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use nx_schemas::{Priority, TicketStatus};
use nx_scope::ScopeFilter;
use serde::Serialize;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::scope_bind;

#[derive(Debug, Clone, Serialize)]
pub struct CategoryRow {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub color: String,
    pub is_active: bool,
    pub sort_order: i32,
}

pub async fn insert_category(
    pool: &PgPool,
    name: &str,
    description: Option<&str>,
    color: Option<&str>,
) -> Result<Uuid> {
    let id = Uuid::new_v4();
    sqlx::query(
        r#"
        insert into ticket_categories (id, name, description, color)
        values ($1, $2, $3, coalesce($4, '#007bff'))
        "#,
    )
    .bind(id)
    .bind(name)
    .bind(description)
    .bind(color)
    .execute(pool)
    .await
    .context("insert_category failed")?;
    Ok(id)
}

pub async fn list_categories(pool: &PgPool) -> Result<Vec<CategoryRow>> {
    let rows = sqlx::query(
        r#"
        select id, name, description, color, is_active, sort_order
        from ticket_categories
        where is_active
        order by sort_order, name
        "#,
    )
    .fetch_all(pool)
    .await
    .context("list_categories failed")?;

    rows.iter()
        .map(|row| {
            Ok(CategoryRow {
                id: row.try_get("id")?,
                name: row.try_get("name")?,
                description: row.try_get("description")?,
                color: row.try_get("color")?,
                is_active: row.try_get("is_active")?,
                sort_order: row.try_get("sort_order")?,
            })
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Tickets
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct TicketRow {
    pub id: Uuid,
    pub client_id: Uuid,
    pub project_id: Option<Uuid>,
    pub category_id: Option<Uuid>,
    pub requester_id: Option<Uuid>,
    pub assigned_to: Option<Uuid>,
    pub title: String,
    pub body: String,
    pub status: TicketStatus,
    pub priority: Priority,
    pub is_public: bool,
    pub resolved_at: Option<DateTime<Utc>>,
    pub closed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewTicket {
    pub client_id: Uuid,
    pub project_id: Option<Uuid>,
    pub category_id: Option<Uuid>,
    pub requester_id: Option<Uuid>,
    pub title: String,
    pub body: String,
    pub priority: Priority,
    pub is_public: bool,
}

const TICKET_COLS: &str = r#"
    id, client_id, project_id, category_id, requester_id, assigned_to,
    title, body, status, priority, is_public, resolved_at, closed_at, created_at
"#;

fn map_ticket(row: &sqlx::postgres::PgRow) -> Result<TicketRow> {
    Ok(TicketRow {
        id: row.try_get("id")?,
        client_id: row.try_get("client_id")?,
        project_id: row.try_get("project_id")?,
        category_id: row.try_get("category_id")?,
        requester_id: row.try_get("requester_id")?,
        assigned_to: row.try_get("assigned_to")?,
        title: row.try_get("title")?,
        body: row.try_get("body")?,
        status: TicketStatus::parse(&row.try_get::<String, _>("status")?)?,
        priority: Priority::parse(&row.try_get::<String, _>("priority")?)?,
        is_public: row.try_get("is_public")?,
        resolved_at: row.try_get("resolved_at")?,
        closed_at: row.try_get("closed_at")?,
        created_at: row.try_get("created_at")?,
    })
}

pub async fn insert_ticket(pool: &PgPool, ticket: &NewTicket) -> Result<Uuid> {
    let id = Uuid::new_v4();
    sqlx::query(
        r#"
        insert into tickets (
          id, client_id, project_id, category_id, requester_id,
          title, body, priority, is_public
        ) values ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        "#,
    )
    .bind(id)
    .bind(ticket.client_id)
    .bind(ticket.project_id)
    .bind(ticket.category_id)
    .bind(ticket.requester_id)
    .bind(&ticket.title)
    .bind(&ticket.body)
    .bind(ticket.priority.as_str())
    .bind(ticket.is_public)
    .execute(pool)
    .await
    .context("insert_ticket failed")?;
    Ok(id)
}

pub async fn fetch_ticket(pool: &PgPool, id: Uuid) -> Result<Option<TicketRow>> {
    let row = sqlx::query(&format!("select {TICKET_COLS} from tickets where id = $1"))
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("fetch_ticket failed")?;
    row.as_ref().map(map_ticket).transpose()
}

/// Scoped ticket list. `include_private = false` (non-staff) drops
/// `is_public = false` rows.
pub async fn list_tickets(
    pool: &PgPool,
    scope: &ScopeFilter,
    status: Option<TicketStatus>,
    include_private: bool,
) -> Result<Vec<TicketRow>> {
    let rows = sqlx::query(&format!(
        r#"
        select {TICKET_COLS}
        from tickets
        where ($1::uuid[] is null or client_id = any($1))
          and ($2::text is null or status = $2)
          and ($3 or is_public)
        order by created_at desc
        "#
    ))
    .bind(scope_bind(scope))
    .bind(status.map(|s| s.as_str()))
    .bind(include_private)
    .fetch_all(pool)
    .await
    .context("list_tickets failed")?;

    rows.iter().map(map_ticket).collect()
}

/// Status transition with the matching timestamp side effects.
pub async fn update_ticket_status(
    pool: &PgPool,
    id: Uuid,
    status: TicketStatus,
    assigned_to: Option<Uuid>,
) -> Result<()> {
    let res = sqlx::query(
        r#"
        update tickets
        set status = $2,
            assigned_to = coalesce($3, assigned_to),
            resolved_at = case when $2 = 'resolved' and resolved_at is null
                               then now() else resolved_at end,
            closed_at = case when $2 = 'closed' and closed_at is null
                             then now() else closed_at end,
            updated_at = now()
        where id = $1
        "#,
    )
    .bind(id)
    .bind(status.as_str())
    .bind(assigned_to)
    .execute(pool)
    .await
    .context("update_ticket_status failed")?;

    if res.rows_affected() == 0 {
        return Err(anyhow!("ticket {id} not found"));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Messages
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct TicketMessageRow {
    pub id: Uuid,
    pub ticket_id: Uuid,
    pub author_id: Uuid,
    pub body: String,
    pub is_internal: bool,
    pub created_at: DateTime<Utc>,
}

pub async fn insert_message(
    pool: &PgPool,
    ticket_id: Uuid,
    author_id: Uuid,
    body: &str,
    is_internal: bool,
) -> Result<Uuid> {
    let id = Uuid::new_v4();
    sqlx::query(
        r#"
        insert into ticket_messages (id, ticket_id, author_id, body, is_internal)
        values ($1, $2, $3, $4, $5)
        "#,
    )
    .bind(id)
    .bind(ticket_id)
    .bind(author_id)
    .bind(body)
    .bind(is_internal)
    .execute(pool)
    .await
    .context("insert_message failed")?;
    Ok(id)
}

pub async fn list_messages(
    pool: &PgPool,
    ticket_id: Uuid,
    include_internal: bool,
) -> Result<Vec<TicketMessageRow>> {
    let rows = sqlx::query(
        r#"
        select id, ticket_id, author_id, body, is_internal, created_at
        from ticket_messages
        where ticket_id = $1 and ($2 or not is_internal)
        order by created_at
        "#,
    )
    .bind(ticket_id)
    .bind(include_internal)
    .fetch_all(pool)
    .await
    .context("list_messages failed")?;

    rows.iter()
        .map(|row| {
            Ok(TicketMessageRow {
                id: row.try_get("id")?,
                ticket_id: row.try_get("ticket_id")?,
                author_id: row.try_get("author_id")?,
                body: row.try_get("body")?,
                is_internal: row.try_get("is_internal")?,
                created_at: row.try_get("created_at")?,
            })
        })
        .collect()
}
