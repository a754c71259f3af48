//! Accounts: users, profiles, bearer sessions.
//!
//! Passwords are argon2id hashes; session tokens are random 32-byte hex
//! strings of which only the sha256 digest is stored, so a leaked sessions
//! table cannot be replayed.

use anyhow::{anyhow, Context, Result};
use argon2::password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use chrono::{Duration, Utc};
use nx_schemas::{SessionToken, UserRole};
use nx_scope::{Actor, Membership};
use rand::RngCore;
use sha2::{Digest, Sha256};
use serde::Serialize;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::clients::load_memberships;

#[derive(Debug, Clone, Serialize)]
pub struct UserRow {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub full_name: String,
    pub is_staff: bool,
    pub is_superuser: bool,
    pub is_active: bool,
    pub role: UserRole,
}

#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub password: String,
    pub full_name: String,
    pub is_staff: bool,
    pub role: UserRole,
}

pub fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow!("password hashing failed: {e}"))?;
    Ok(hash.to_string())
}

pub fn verify_password(password: &str, stored_hash: &str) -> Result<bool> {
    let parsed =
        PasswordHash::new(stored_hash).map_err(|e| anyhow!("stored password hash invalid: {e}"))?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok())
}

pub async fn insert_user(pool: &PgPool, user: &NewUser) -> Result<Uuid> {
    let id = Uuid::new_v4();
    let password_hash = hash_password(&user.password)?;

    let mut tx = pool.begin().await.context("begin insert_user tx")?;

    sqlx::query(
        r#"
        insert into users (id, username, email, password_hash, full_name, is_staff)
        values ($1, $2, $3, $4, $5, $6)
        "#,
    )
    .bind(id)
    .bind(&user.username)
    .bind(&user.email)
    .bind(&password_hash)
    .bind(&user.full_name)
    .bind(user.is_staff)
    .execute(&mut *tx)
    .await
    .context("insert_user failed")?;

    sqlx::query(
        r#"
        insert into profiles (id, user_id, role)
        values ($1, $2, $3)
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(id)
    .bind(user.role.as_str())
    .execute(&mut *tx)
    .await
    .context("insert profile failed")?;

    tx.commit().await.context("commit insert_user tx")?;
    Ok(id)
}

pub async fn fetch_user(pool: &PgPool, user_id: Uuid) -> Result<UserRow> {
    let row = sqlx::query(
        r#"
        select u.id, u.username, u.email, u.full_name,
               u.is_staff, u.is_superuser, u.is_active, p.role
        from users u
        join profiles p on p.user_id = u.id
        where u.id = $1
        "#,
    )
    .bind(user_id)
    .fetch_one(pool)
    .await
    .context("fetch_user failed")?;

    map_user(&row)
}

pub async fn find_user_by_username(pool: &PgPool, username: &str) -> Result<Option<UserRow>> {
    let row = sqlx::query(
        r#"
        select u.id, u.username, u.email, u.full_name,
               u.is_staff, u.is_superuser, u.is_active, p.role
        from users u
        join profiles p on p.user_id = u.id
        where u.username = $1
        "#,
    )
    .bind(username)
    .fetch_optional(pool)
    .await
    .context("find_user_by_username failed")?;

    row.as_ref().map(map_user).transpose()
}

fn map_user(row: &sqlx::postgres::PgRow) -> Result<UserRow> {
    Ok(UserRow {
        id: row.try_get("id")?,
        username: row.try_get("username")?,
        email: row.try_get("email")?,
        full_name: row.try_get("full_name")?,
        is_staff: row.try_get("is_staff")?,
        is_superuser: row.try_get("is_superuser")?,
        is_active: row.try_get("is_active")?,
        role: UserRole::parse(&row.try_get::<String, _>("role")?)?,
    })
}

// ---------------------------------------------------------------------------
// Login / sessions
// ---------------------------------------------------------------------------

fn token_digest(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hex::encode(hasher.finalize())
}

fn fresh_token() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Verify credentials and issue a session. Returns `None` on bad
/// credentials or a disabled account — callers must not learn which.
pub async fn login(
    pool: &PgPool,
    username: &str,
    password: &str,
    ttl_hours: i64,
) -> Result<Option<(UserRow, SessionToken)>> {
    let stored: Option<(Uuid, String)> = sqlx::query_as(
        "select id, password_hash from users where username = $1 and is_active",
    )
    .bind(username)
    .fetch_optional(pool)
    .await
    .context("login lookup failed")?;

    let Some((user_id, password_hash)) = stored else {
        return Ok(None);
    };
    if !verify_password(password, &password_hash)? {
        return Ok(None);
    }

    let user = fetch_user(pool, user_id).await?;
    let session = create_session(pool, user_id, ttl_hours).await?;
    Ok(Some((user, session)))
}

pub async fn create_session(pool: &PgPool, user_id: Uuid, ttl_hours: i64) -> Result<SessionToken> {
    let token = fresh_token();
    let expires_at_utc = Utc::now() + Duration::hours(ttl_hours);

    sqlx::query(
        r#"
        insert into sessions (id, user_id, token_digest, expires_at_utc)
        values ($1, $2, $3, $4)
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(user_id)
    .bind(token_digest(&token))
    .bind(expires_at_utc)
    .execute(pool)
    .await
    .context("create_session failed")?;

    Ok(SessionToken {
        token,
        expires_at_utc,
    })
}

/// Resolve a bearer token to the acting user and their memberships.
/// Expired or unknown tokens and disabled accounts resolve to `None`.
pub async fn resolve_session(pool: &PgPool, token: &str) -> Result<Option<Actor>> {
    let row = sqlx::query(
        r#"
        select u.id, u.is_staff, u.is_superuser, p.role
        from sessions s
        join users u on u.id = s.user_id
        join profiles p on p.user_id = u.id
        where s.token_digest = $1
          and s.expires_at_utc > now()
          and u.is_active
        "#,
    )
    .bind(token_digest(token))
    .fetch_optional(pool)
    .await
    .context("resolve_session failed")?;

    let Some(row) = row else {
        return Ok(None);
    };

    let user_id: Uuid = row.try_get("id")?;
    let role = UserRole::parse(&row.try_get::<String, _>("role")?)?;
    let is_staff: bool = row.try_get("is_staff")?;
    let is_superuser: bool = row.try_get("is_superuser")?;

    let memberships: Vec<Membership> = load_memberships(pool, user_id).await?;

    Ok(Some(Actor {
        user_id,
        role,
        is_staff,
        is_superuser,
        memberships,
    }))
}

pub async fn revoke_session(pool: &PgPool, token: &str) -> Result<()> {
    sqlx::query("delete from sessions where token_digest = $1")
        .bind(token_digest(token))
        .execute(pool)
        .await
        .context("revoke_session failed")?;
    Ok(())
}

/// Housekeeping: drop expired sessions.
pub async fn purge_expired_sessions(pool: &PgPool) -> Result<u64> {
    let res = sqlx::query("delete from sessions where expires_at_utc <= now()")
        .execute(pool)
        .await
        .context("purge_expired_sessions failed")?;
    Ok(res.rows_affected())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn password_hash_verifies_and_rejects_wrong_password() {
        let hash = hash_password("correct horse").unwrap();
        assert!(verify_password("correct horse", &hash).unwrap());
        assert!(!verify_password("wrong horse", &hash).unwrap());
        // argon2id PHC string, never the clear password
        assert!(hash.starts_with("$argon2"));
        assert!(!hash.contains("correct horse"));
    }

    #[test]
    fn token_digest_is_stable_and_token_sized() {
        let t = fresh_token();
        assert_eq!(t.len(), 64); // 32 bytes hex
        assert_eq!(token_digest(&t), token_digest(&t));
        assert_ne!(token_digest(&t), t);
    }
}
