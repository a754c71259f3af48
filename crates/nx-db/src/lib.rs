//! Postgres layer for the NX portal.
//!
//! One module per business domain. Every list query takes a
//! [`nx_scope::ScopeFilter`] and narrows on the entity's owning-client
//! column, joining along the entity's fixed ownership path where the
//! column lives one hop away (tasks join projects, payments carry a
//! denormalized client_id, ...). Fetches return the resolved owning client
//! so callers can run the object-level check in `nx-scope`.
//!
//! Scoping convention in SQL: bind the filter as a nullable uuid array and
//! guard with `($n::uuid[] is null or client_id = any($n))` — NULL means
//! staff (no predicate), an empty array means a memberless actor (matches
//! nothing).

use anyhow::{Context, Result};
use nx_scope::ScopeFilter;
use sqlx::{postgres::PgPoolOptions, PgPool};
use uuid::Uuid;

pub mod audit;
pub mod billing;
pub mod clients;
pub mod documents;
pub mod payments;
pub mod projects;
pub mod support;
pub mod tasks;
pub mod users;

pub const ENV_DB_URL: &str = "NX_DATABASE_URL";

/// Connect to Postgres using NX_DATABASE_URL.
pub async fn connect_from_env() -> Result<PgPool> {
    let url =
        std::env::var(ENV_DB_URL).with_context(|| format!("missing env var {ENV_DB_URL}"))?;
    connect(&url).await
}

pub async fn connect(url: &str) -> Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(url)
        .await
        .context("failed to connect to Postgres")?;
    Ok(pool)
}

/// Run embedded SQLx migrations.
pub async fn migrate(pool: &PgPool) -> Result<()> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .context("db migrate failed")?;
    Ok(())
}

/// Simple status query (connectivity + schema presence).
pub async fn status(pool: &PgPool) -> Result<DbStatus> {
    let (one,): (i32,) = sqlx::query_as::<_, (i32,)>("select 1")
        .fetch_one(pool)
        .await
        .context("status connectivity query failed")?;

    let (exists,): (bool,) = sqlx::query_as::<_, (bool,)>(
        r#"
        select exists (
            select 1
            from information_schema.tables
            where table_schema='public' and table_name='clients'
        )
        "#,
    )
    .fetch_one(pool)
    .await
    .context("status table-exists query failed")?;

    Ok(DbStatus {
        ok: one == 1,
        has_schema: exists,
    })
}

#[derive(Debug, Clone)]
pub struct DbStatus {
    pub ok: bool,
    pub has_schema: bool,
}

/// Detect a Postgres unique constraint violation by name.
pub fn is_unique_constraint_violation(err: &sqlx::Error, constraint: &str) -> bool {
    match err {
        sqlx::Error::Database(db_err) => {
            db_err.constraint() == Some(constraint)
                || db_err.code().as_deref() == Some("23505")
                    && db_err.constraint() == Some(constraint)
        }
        _ => false,
    }
}

/// The nullable uuid-array bind for the scoping convention above.
pub(crate) fn scope_bind(scope: &ScopeFilter) -> Option<Vec<Uuid>> {
    scope.client_ids().map(|ids| ids.to_vec())
}
