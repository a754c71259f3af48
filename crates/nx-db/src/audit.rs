//! Audit trail persistence. Records arrive sealed (digest computed) from
//! nx-audit; this module only stores and lists them.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use nx_audit::AuditRecord;
use nx_schemas::{AuditAction, AuditLevel};
use nx_scope::ScopeFilter;
use serde::Serialize;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::scope_bind;

#[derive(Debug, Clone, Serialize)]
pub struct AuditRow {
    #[serde(flatten)]
    pub record: AuditRecord,
    pub created_at: DateTime<Utc>,
}

pub async fn insert_audit(pool: &PgPool, record: &AuditRecord) -> Result<()> {
    sqlx::query(
        r#"
        insert into audit_log (
          id, actor_id, action, level, description, entity_kind, entity_id,
          old_values, new_values, client_id, project_id, ip_address, user_agent, digest
        ) values ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
        "#,
    )
    .bind(record.id)
    .bind(record.actor_id)
    .bind(record.action.as_str())
    .bind(record.level.as_str())
    .bind(&record.description)
    .bind(&record.entity_kind)
    .bind(record.entity_id)
    .bind(&record.old_values)
    .bind(&record.new_values)
    .bind(record.client_id)
    .bind(record.project_id)
    .bind(&record.ip_address)
    .bind(&record.user_agent)
    .bind(&record.digest)
    .execute(pool)
    .await
    .context("insert_audit failed")?;
    Ok(())
}

fn map_audit(row: &sqlx::postgres::PgRow) -> Result<AuditRow> {
    Ok(AuditRow {
        record: AuditRecord {
            id: row.try_get("id")?,
            actor_id: row.try_get("actor_id")?,
            action: AuditAction::parse(&row.try_get::<String, _>("action")?)?,
            level: AuditLevel::parse(&row.try_get::<String, _>("level")?)?,
            description: row.try_get("description")?,
            entity_kind: row.try_get("entity_kind")?,
            entity_id: row.try_get("entity_id")?,
            old_values: row.try_get("old_values")?,
            new_values: row.try_get("new_values")?,
            client_id: row.try_get("client_id")?,
            project_id: row.try_get("project_id")?,
            ip_address: row.try_get("ip_address")?,
            user_agent: row.try_get("user_agent")?,
            digest: row.try_get("digest")?,
        },
        created_at: row.try_get("created_at")?,
    })
}

#[derive(Debug, Clone, Default)]
pub struct AuditListFilter {
    pub entity_kind: Option<String>,
    pub entity_id: Option<Uuid>,
    pub actor_id: Option<Uuid>,
    pub limit: Option<i64>,
}

/// Scoped audit listing. Rows with no client association (client_id null)
/// only show up for unrestricted scopes.
pub async fn list_audit(
    pool: &PgPool,
    scope: &ScopeFilter,
    filter: &AuditListFilter,
) -> Result<Vec<AuditRow>> {
    let rows = sqlx::query(
        r#"
        select id, actor_id, action, level, description, entity_kind, entity_id,
               old_values, new_values, client_id, project_id, ip_address,
               user_agent, digest, created_at
        from audit_log
        where ($1::uuid[] is null or client_id = any($1))
          and ($2::text is null or entity_kind = $2)
          and ($3::uuid is null or entity_id = $3)
          and ($4::uuid is null or actor_id = $4)
        order by created_at desc
        limit $5
        "#,
    )
    .bind(scope_bind(scope))
    .bind(&filter.entity_kind)
    .bind(filter.entity_id)
    .bind(filter.actor_id)
    .bind(filter.limit.unwrap_or(200))
    .fetch_all(pool)
    .await
    .context("list_audit failed")?;

    rows.iter().map(map_audit).collect()
}
