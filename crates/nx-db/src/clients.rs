//! Tenants and memberships.

use anyhow::{Context, Result};
use nx_schemas::{ClientStatus, MemberRole};
use nx_scope::{Membership, ScopeFilter};
use serde::Serialize;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::scope_bind;

#[derive(Debug, Clone, Serialize)]
pub struct ClientRow {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub main_contact_name: String,
    pub main_contact_email: String,
    pub industry: Option<String>,
    pub company_size: Option<String>,
    pub status: ClientStatus,
    pub notes: Option<String>,
}

#[derive(Debug, Clone)]
pub struct NewClient {
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub main_contact_name: String,
    pub main_contact_email: String,
    pub industry: Option<String>,
    pub company_size: Option<String>,
    pub status: ClientStatus,
    pub notes: Option<String>,
}

const CLIENT_COLS: &str = r#"
    id, name, email, phone, address, main_contact_name, main_contact_email,
    industry, company_size, status, notes
"#;

fn map_client(row: &sqlx::postgres::PgRow) -> Result<ClientRow> {
    Ok(ClientRow {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        email: row.try_get("email")?,
        phone: row.try_get("phone")?,
        address: row.try_get("address")?,
        main_contact_name: row.try_get("main_contact_name")?,
        main_contact_email: row.try_get("main_contact_email")?,
        industry: row.try_get("industry")?,
        company_size: row.try_get("company_size")?,
        status: ClientStatus::parse(&row.try_get::<String, _>("status")?)?,
        notes: row.try_get("notes")?,
    })
}

pub async fn insert_client(pool: &PgPool, client: &NewClient) -> Result<Uuid> {
    let id = Uuid::new_v4();
    sqlx::query(
        r#"
        insert into clients (
          id, name, email, phone, address, main_contact_name, main_contact_email,
          industry, company_size, status, notes
        ) values ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
        "#,
    )
    .bind(id)
    .bind(&client.name)
    .bind(&client.email)
    .bind(&client.phone)
    .bind(&client.address)
    .bind(&client.main_contact_name)
    .bind(&client.main_contact_email)
    .bind(&client.industry)
    .bind(&client.company_size)
    .bind(client.status.as_str())
    .bind(&client.notes)
    .execute(pool)
    .await
    .context("insert_client failed")?;
    Ok(id)
}

pub async fn update_client(pool: &PgPool, id: Uuid, client: &NewClient) -> Result<()> {
    sqlx::query(
        r#"
        update clients
        set name = $2, email = $3, phone = $4, address = $5,
            main_contact_name = $6, main_contact_email = $7,
            industry = $8, company_size = $9, status = $10, notes = $11,
            updated_at = now()
        where id = $1
        "#,
    )
    .bind(id)
    .bind(&client.name)
    .bind(&client.email)
    .bind(&client.phone)
    .bind(&client.address)
    .bind(&client.main_contact_name)
    .bind(&client.main_contact_email)
    .bind(&client.industry)
    .bind(&client.company_size)
    .bind(client.status.as_str())
    .bind(&client.notes)
    .execute(pool)
    .await
    .context("update_client failed")?;
    Ok(())
}

pub async fn fetch_client(pool: &PgPool, id: Uuid) -> Result<Option<ClientRow>> {
    let row = sqlx::query(&format!("select {CLIENT_COLS} from clients where id = $1"))
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("fetch_client failed")?;
    row.as_ref().map(map_client).transpose()
}

pub async fn list_clients(pool: &PgPool, scope: &ScopeFilter) -> Result<Vec<ClientRow>> {
    let rows = sqlx::query(&format!(
        r#"
        select {CLIENT_COLS}
        from clients
        where ($1::uuid[] is null or id = any($1))
        order by created_at desc
        "#
    ))
    .bind(scope_bind(scope))
    .fetch_all(pool)
    .await
    .context("list_clients failed")?;

    rows.iter().map(map_client).collect()
}

// ---------------------------------------------------------------------------
// Memberships
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct MemberRow {
    pub id: Uuid,
    pub user_id: Uuid,
    pub client_id: Uuid,
    pub role: MemberRole,
    pub can_view_billing: bool,
    pub can_manage_team: bool,
}

pub async fn add_member(
    pool: &PgPool,
    client_id: Uuid,
    user_id: Uuid,
    role: MemberRole,
    can_view_billing: bool,
    can_manage_team: bool,
) -> Result<Uuid> {
    let id = Uuid::new_v4();
    sqlx::query(
        r#"
        insert into client_members (id, user_id, client_id, role, can_view_billing, can_manage_team)
        values ($1, $2, $3, $4, $5, $6)
        "#,
    )
    .bind(id)
    .bind(user_id)
    .bind(client_id)
    .bind(role.as_str())
    .bind(can_view_billing)
    .bind(can_manage_team)
    .execute(pool)
    .await
    .context("add_member failed")?;
    Ok(id)
}

pub async fn remove_member(pool: &PgPool, client_id: Uuid, user_id: Uuid) -> Result<bool> {
    let res = sqlx::query("delete from client_members where client_id = $1 and user_id = $2")
        .bind(client_id)
        .bind(user_id)
        .execute(pool)
        .await
        .context("remove_member failed")?;
    Ok(res.rows_affected() > 0)
}

pub async fn list_members(pool: &PgPool, client_id: Uuid) -> Result<Vec<MemberRow>> {
    let rows = sqlx::query(
        r#"
        select id, user_id, client_id, role, can_view_billing, can_manage_team
        from client_members
        where client_id = $1
        order by created_at
        "#,
    )
    .bind(client_id)
    .fetch_all(pool)
    .await
    .context("list_members failed")?;

    rows.iter()
        .map(|row| {
            Ok(MemberRow {
                id: row.try_get("id")?,
                user_id: row.try_get("user_id")?,
                client_id: row.try_get("client_id")?,
                role: MemberRole::parse(&row.try_get::<String, _>("role")?)?,
                can_view_billing: row.try_get("can_view_billing")?,
                can_manage_team: row.try_get("can_manage_team")?,
            })
        })
        .collect()
}

/// Memberships for actor construction at session resolution.
pub async fn load_memberships(pool: &PgPool, user_id: Uuid) -> Result<Vec<Membership>> {
    let rows = sqlx::query(
        r#"
        select client_id, role, can_view_billing, can_manage_team
        from client_members
        where user_id = $1
        "#,
    )
    .bind(user_id)
    .fetch_all(pool)
    .await
    .context("load_memberships failed")?;

    rows.iter()
        .map(|row| {
            Ok(Membership {
                client_id: row.try_get("client_id")?,
                role: MemberRole::parse(&row.try_get::<String, _>("role")?)?,
                can_view_billing: row.try_get("can_view_billing")?,
                can_manage_team: row.try_get("can_manage_team")?,
            })
        })
        .collect()
}
