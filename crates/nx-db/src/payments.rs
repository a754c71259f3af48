//! Payments and the webhook inbox. Every provider notification is recorded
//! in `payment_webhooks` before any state changes, including ones that fail
//! signature verification. Applying a settlement result updates the payment
//! and its invoice in one transaction.

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Duration, Utc};
use nx_schemas::{PaymentMethod, PaymentStatus, WebhookStatus};
use nx_scope::ScopeFilter;
use rust_decimal::Decimal;
use serde::Serialize;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::scope_bind;

pub const PAYMENT_EXPIRY_HOURS: i64 = 1;

#[derive(Debug, Clone, Serialize)]
pub struct PaymentRow {
    pub id: Uuid,
    pub invoice_id: Uuid,
    pub client_id: Uuid,
    pub initiated_by: Option<Uuid>,
    pub provider_transaction_id: String,
    pub provider_payment_token: Option<String>,
    pub provider_checkout_url: Option<String>,
    pub amount: Decimal,
    pub currency: String,
    pub payment_method: Option<PaymentMethod>,
    pub status: PaymentStatus,
    pub description: Option<String>,
    pub initiated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
    pub fees_amount: Decimal,
    pub net_amount: Option<Decimal>,
}

#[derive(Debug, Clone)]
pub struct NewPayment {
    pub invoice_id: Uuid,
    pub client_id: Uuid,
    pub initiated_by: Option<Uuid>,
    pub provider_transaction_id: String,
    pub amount: Decimal,
    pub currency: String,
    pub description: Option<String>,
}

const PAYMENT_COLS: &str = r#"
    id, invoice_id, client_id, initiated_by, provider_transaction_id,
    provider_payment_token, provider_checkout_url, amount, currency,
    payment_method, status, description, initiated_at, completed_at,
    expires_at, fees_amount, net_amount
"#;

fn map_payment(row: &sqlx::postgres::PgRow) -> Result<PaymentRow> {
    let method: Option<String> = row.try_get("payment_method")?;
    Ok(PaymentRow {
        id: row.try_get("id")?,
        invoice_id: row.try_get("invoice_id")?,
        client_id: row.try_get("client_id")?,
        initiated_by: row.try_get("initiated_by")?,
        provider_transaction_id: row.try_get("provider_transaction_id")?,
        provider_payment_token: row.try_get("provider_payment_token")?,
        provider_checkout_url: row.try_get("provider_checkout_url")?,
        amount: row.try_get("amount")?,
        currency: row.try_get("currency")?,
        payment_method: method.as_deref().map(PaymentMethod::parse).transpose()?,
        status: PaymentStatus::parse(&row.try_get::<String, _>("status")?)?,
        description: row.try_get("description")?,
        initiated_at: row.try_get("initiated_at")?,
        completed_at: row.try_get("completed_at")?,
        expires_at: row.try_get("expires_at")?,
        fees_amount: row.try_get("fees_amount")?,
        net_amount: row.try_get("net_amount")?,
    })
}

/// Insert a pending payment with a 1 hour checkout window. Fails on a
/// duplicate provider transaction id (unique constraint).
pub async fn insert_payment(pool: &PgPool, payment: &NewPayment) -> Result<Uuid> {
    let id = Uuid::new_v4();
    let expires_at = Utc::now() + Duration::hours(PAYMENT_EXPIRY_HOURS);
    sqlx::query(
        r#"
        insert into payments (
          id, invoice_id, client_id, initiated_by, provider_transaction_id,
          amount, currency, description, expires_at
        ) values ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        "#,
    )
    .bind(id)
    .bind(payment.invoice_id)
    .bind(payment.client_id)
    .bind(payment.initiated_by)
    .bind(&payment.provider_transaction_id)
    .bind(payment.amount)
    .bind(&payment.currency)
    .bind(&payment.description)
    .bind(expires_at)
    .execute(pool)
    .await
    .context("insert_payment failed")?;
    Ok(id)
}

/// Store the checkout URL and token returned by the provider init call.
pub async fn update_after_init(
    pool: &PgPool,
    id: Uuid,
    checkout_url: &str,
    payment_token: Option<&str>,
    raw_response: &serde_json::Value,
) -> Result<()> {
    sqlx::query(
        r#"
        update payments
        set provider_checkout_url = $2,
            provider_payment_token = $3,
            raw_response = $4,
            updated_at = now()
        where id = $1
        "#,
    )
    .bind(id)
    .bind(checkout_url)
    .bind(payment_token)
    .bind(raw_response)
    .execute(pool)
    .await
    .context("update_after_init failed")?;
    Ok(())
}

pub async fn fetch_payment(pool: &PgPool, id: Uuid) -> Result<Option<PaymentRow>> {
    let row = sqlx::query(&format!("select {PAYMENT_COLS} from payments where id = $1"))
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("fetch_payment failed")?;
    row.as_ref().map(map_payment).transpose()
}

pub async fn fetch_by_transaction_id(
    pool: &PgPool,
    transaction_id: &str,
) -> Result<Option<PaymentRow>> {
    let row = sqlx::query(&format!(
        "select {PAYMENT_COLS} from payments where provider_transaction_id = $1"
    ))
    .bind(transaction_id)
    .fetch_optional(pool)
    .await
    .context("fetch_by_transaction_id failed")?;
    row.as_ref().map(map_payment).transpose()
}

pub async fn list_payments(
    pool: &PgPool,
    scope: &ScopeFilter,
    invoice_id: Option<Uuid>,
) -> Result<Vec<PaymentRow>> {
    let rows = sqlx::query(&format!(
        r#"
        select {PAYMENT_COLS}
        from payments
        where ($1::uuid[] is null or client_id = any($1))
          and ($2::uuid is null or invoice_id = $2)
        order by initiated_at desc
        "#
    ))
    .bind(scope_bind(scope))
    .bind(invoice_id)
    .fetch_all(pool)
    .await
    .context("list_payments failed")?;

    rows.iter().map(map_payment).collect()
}

/// Payments still mid-flight, used as a guardrail before running migrations.
pub async fn count_processing(pool: &PgPool) -> Result<i64> {
    let (count,): (i64,) = sqlx::query_as(
        "select count(*)::bigint from payments where status in ('pending', 'processing')",
    )
    .fetch_one(pool)
    .await
    .context("count_processing failed")?;
    Ok(count)
}

// ---------------------------------------------------------------------------
// Webhook inbox
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct NewWebhook {
    pub transaction_id: String,
    pub payment_id: Option<Uuid>,
    pub event_type: String,
    pub payload: serde_json::Value,
    pub signature: String,
    pub is_signature_valid: bool,
}

/// Record an inbound notification before any processing happens. Invalid
/// signatures are recorded too, flagged for operator review.
pub async fn record_webhook(pool: &PgPool, webhook: &NewWebhook) -> Result<Uuid> {
    let id = Uuid::new_v4();
    sqlx::query(
        r#"
        insert into payment_webhooks (
          id, transaction_id, payment_id, event_type, payload, signature, is_signature_valid
        ) values ($1, $2, $3, $4, $5, $6, $7)
        "#,
    )
    .bind(id)
    .bind(&webhook.transaction_id)
    .bind(webhook.payment_id)
    .bind(&webhook.event_type)
    .bind(&webhook.payload)
    .bind(&webhook.signature)
    .bind(webhook.is_signature_valid)
    .execute(pool)
    .await
    .context("record_webhook failed")?;
    Ok(id)
}

pub async fn mark_webhook(
    pool: &PgPool,
    id: Uuid,
    status: WebhookStatus,
    error: Option<&str>,
) -> Result<()> {
    sqlx::query(
        r#"
        update payment_webhooks
        set status = $2, processed_at = now(), error_message = $3
        where id = $1
        "#,
    )
    .bind(id)
    .bind(status.as_str())
    .bind(error)
    .execute(pool)
    .await
    .context("mark_webhook failed")?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Settlement
// ---------------------------------------------------------------------------

/// Move a payment to its settled status and, on completion, mark the invoice
/// paid, in one transaction. The row is locked first so concurrent webhook
/// and check-endpoint deliveries cannot double-apply; a payment already in a
/// terminal status is left untouched.
pub async fn apply_transition(
    pool: &PgPool,
    payment_id: Uuid,
    next: PaymentStatus,
    webhook_payload: Option<&serde_json::Value>,
) -> Result<PaymentStatus> {
    let mut tx = pool.begin().await.context("begin apply_transition tx")?;

    let row = sqlx::query("select status, invoice_id, amount from payments where id = $1 for update")
        .bind(payment_id)
        .fetch_optional(&mut *tx)
        .await
        .context("payment lock failed")?
        .ok_or_else(|| anyhow!("payment {payment_id} not found"))?;

    let current = PaymentStatus::parse(&row.try_get::<String, _>("status")?)?;
    let invoice_id: Uuid = row.try_get("invoice_id")?;
    let amount: Decimal = row.try_get("amount")?;

    if current.is_terminal() {
        tx.commit().await.context("commit apply_transition tx")?;
        return Ok(current);
    }

    sqlx::query(
        r#"
        update payments
        set status = $2,
            completed_at = case when $2 = 'completed' then now() else completed_at end,
            webhook_payload = coalesce($3, webhook_payload),
            updated_at = now()
        where id = $1
        "#,
    )
    .bind(payment_id)
    .bind(next.as_str())
    .bind(webhook_payload)
    .execute(&mut *tx)
    .await
    .context("payment status update failed")?;

    if next == PaymentStatus::Completed {
        sqlx::query(
            r#"
            update invoices
            set paid_amount = paid_amount + $2,
                status = case when paid_amount + $2 >= total then 'paid' else 'partially_paid' end,
                paid_at = case when paid_amount + $2 >= total and paid_at is null
                               then now() else paid_at end,
                updated_at = now()
            where id = $1
            "#,
        )
        .bind(invoice_id)
        .bind(amount)
        .execute(&mut *tx)
        .await
        .context("invoice settlement update failed")?;
    }

    tx.commit().await.context("commit apply_transition tx")?;
    Ok(next)
}

/// Expire pending payments whose checkout window has lapsed. Returns the
/// number of rows cancelled.
pub async fn expire_stale(pool: &PgPool) -> Result<u64> {
    let res = sqlx::query(
        r#"
        update payments
        set status = 'cancelled', updated_at = now()
        where status = 'pending' and expires_at is not null and expires_at < now()
        "#,
    )
    .execute(pool)
    .await
    .context("expire_stale failed")?;
    Ok(res.rows_affected())
}
