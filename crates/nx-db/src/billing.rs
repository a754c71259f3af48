//! Billing: quotes and invoices with line items.
//!
//! Numbering is `DV-YYYY-NNNN` (quotes) / `FA-YYYY-NNNN` (invoices),
//! sequential per calendar year, assigned inside the insert transaction.
//! Totals are always recomputed from line items server-side; clients never
//! send amounts.

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Datelike, NaiveDate, Utc};
use nx_schemas::{InvoiceStatus, QuoteStatus};
use nx_scope::ScopeFilter;
use rust_decimal::Decimal;
use serde::Serialize;
use sqlx::{PgPool, Postgres, Row, Transaction};
use uuid::Uuid;

use crate::scope_bind;

// ---------------------------------------------------------------------------
// Pure helpers
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Totals {
    pub subtotal: Decimal,
    pub tax_amount: Decimal,
    pub total: Decimal,
}

/// subtotal = Σ quantity × unit price; tax = subtotal × rate/100;
/// total = subtotal + tax. Rounded to 2 decimals at each step.
pub fn compute_totals(items: &[(Decimal, Decimal)], tax_rate: Decimal) -> Totals {
    let subtotal: Decimal = items
        .iter()
        .map(|(qty, unit)| (qty * unit).round_dp(2))
        .sum();
    let tax_amount = (subtotal * tax_rate / Decimal::from(100)).round_dp(2);
    Totals {
        subtotal,
        tax_amount,
        total: subtotal + tax_amount,
    }
}

pub fn format_number(prefix: &str, year: i32, seq: i64) -> String {
    format!("{prefix}-{year}-{seq:04}")
}

// ---------------------------------------------------------------------------
// Line items (shared row shape for quotes and invoices)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct LineItem {
    pub title: String,
    pub description: Option<String>,
    pub quantity: Decimal,
    pub unit_price: Decimal,
    pub sort_order: i32,
}

#[derive(Debug, Clone, Serialize)]
pub struct LineItemRow {
    pub id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub quantity: Decimal,
    pub unit_price: Decimal,
    pub total: Decimal,
    pub sort_order: i32,
}

fn map_item(row: &sqlx::postgres::PgRow) -> Result<LineItemRow> {
    Ok(LineItemRow {
        id: row.try_get("id")?,
        title: row.try_get("title")?,
        description: row.try_get("description")?,
        quantity: row.try_get("quantity")?,
        unit_price: row.try_get("unit_price")?,
        total: row.try_get("total")?,
        sort_order: row.try_get("sort_order")?,
    })
}

// ---------------------------------------------------------------------------
// Invoices
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct InvoiceRow {
    pub id: Uuid,
    pub client_id: Uuid,
    pub project_id: Option<Uuid>,
    pub quote_id: Option<Uuid>,
    pub invoice_number: String,
    pub title: String,
    pub description: Option<String>,
    pub status: InvoiceStatus,
    pub invoice_date: NaiveDate,
    pub due_date: NaiveDate,
    pub sent_at: Option<DateTime<Utc>>,
    pub paid_at: Option<DateTime<Utc>>,
    pub subtotal: Decimal,
    pub tax_rate: Decimal,
    pub tax_amount: Decimal,
    pub total: Decimal,
    pub paid_amount: Decimal,
    pub currency: String,
}

impl InvoiceRow {
    pub fn remaining_amount(&self) -> Decimal {
        self.total - self.paid_amount
    }
}

#[derive(Debug, Clone)]
pub struct NewInvoice {
    pub client_id: Uuid,
    pub project_id: Option<Uuid>,
    pub quote_id: Option<Uuid>,
    pub created_by: Option<Uuid>,
    pub title: String,
    pub description: Option<String>,
    pub due_date: NaiveDate,
    pub tax_rate: Decimal,
    pub currency: String,
    pub items: Vec<LineItem>,
}

const INVOICE_COLS: &str = r#"
    id, client_id, project_id, quote_id, invoice_number, title, description,
    status, invoice_date, due_date, sent_at, paid_at,
    subtotal, tax_rate, tax_amount, total, paid_amount, currency
"#;

fn map_invoice(row: &sqlx::postgres::PgRow) -> Result<InvoiceRow> {
    Ok(InvoiceRow {
        id: row.try_get("id")?,
        client_id: row.try_get("client_id")?,
        project_id: row.try_get("project_id")?,
        quote_id: row.try_get("quote_id")?,
        invoice_number: row.try_get("invoice_number")?,
        title: row.try_get("title")?,
        description: row.try_get("description")?,
        status: InvoiceStatus::parse(&row.try_get::<String, _>("status")?)?,
        invoice_date: row.try_get("invoice_date")?,
        due_date: row.try_get("due_date")?,
        sent_at: row.try_get("sent_at")?,
        paid_at: row.try_get("paid_at")?,
        subtotal: row.try_get("subtotal")?,
        tax_rate: row.try_get("tax_rate")?,
        tax_amount: row.try_get("tax_amount")?,
        total: row.try_get("total")?,
        paid_amount: row.try_get("paid_amount")?,
        currency: row.try_get("currency")?,
    })
}

async fn next_number(
    tx: &mut Transaction<'_, Postgres>,
    table: &str,
    prefix: &str,
) -> Result<String> {
    let year = Utc::now().year();
    // Sequential within the current year. The count runs inside the insert
    // transaction; the unique index on the number column catches the rare
    // concurrent collision.
    let (count,): (i64,) = sqlx::query_as(&format!(
        "select count(*)::bigint from {table} where date_part('year', created_at)::int = $1"
    ))
    .bind(year)
    .fetch_one(&mut **tx)
    .await
    .with_context(|| format!("{table} numbering count failed"))?;

    Ok(format_number(prefix, year, count + 1))
}

pub async fn insert_invoice(pool: &PgPool, invoice: &NewInvoice) -> Result<Uuid> {
    let id = Uuid::new_v4();
    let items: Vec<(Decimal, Decimal)> = invoice
        .items
        .iter()
        .map(|i| (i.quantity, i.unit_price))
        .collect();
    let totals = compute_totals(&items, invoice.tax_rate);

    let mut tx = pool.begin().await.context("begin insert_invoice tx")?;
    let number = next_number(&mut tx, "invoices", "FA").await?;

    sqlx::query(
        r#"
        insert into invoices (
          id, client_id, project_id, quote_id, created_by, invoice_number,
          title, description, due_date, subtotal, tax_rate, tax_amount, total, currency
        ) values ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
        "#,
    )
    .bind(id)
    .bind(invoice.client_id)
    .bind(invoice.project_id)
    .bind(invoice.quote_id)
    .bind(invoice.created_by)
    .bind(&number)
    .bind(&invoice.title)
    .bind(&invoice.description)
    .bind(invoice.due_date)
    .bind(totals.subtotal)
    .bind(invoice.tax_rate)
    .bind(totals.tax_amount)
    .bind(totals.total)
    .bind(&invoice.currency)
    .execute(&mut *tx)
    .await
    .context("insert_invoice failed")?;

    for item in &invoice.items {
        sqlx::query(
            r#"
            insert into invoice_items (id, invoice_id, title, description, quantity, unit_price, total, sort_order)
            values ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(id)
        .bind(&item.title)
        .bind(&item.description)
        .bind(item.quantity)
        .bind(item.unit_price)
        .bind((item.quantity * item.unit_price).round_dp(2))
        .bind(item.sort_order)
        .execute(&mut *tx)
        .await
        .context("insert invoice item failed")?;
    }

    tx.commit().await.context("commit insert_invoice tx")?;
    Ok(id)
}

/// Replace the line items of a draft invoice and recompute totals.
pub async fn replace_invoice_items(pool: &PgPool, invoice_id: Uuid, items: &[LineItem]) -> Result<()> {
    let mut tx = pool.begin().await.context("begin replace_invoice_items tx")?;

    let (status, tax_rate): (String, Decimal) =
        sqlx::query_as("select status, tax_rate from invoices where id = $1 for update")
            .bind(invoice_id)
            .fetch_one(&mut *tx)
            .await
            .context("invoice lookup failed")?;
    if status != "draft" {
        return Err(anyhow!("invoice items can only change while draft, status is {status}"));
    }

    sqlx::query("delete from invoice_items where invoice_id = $1")
        .bind(invoice_id)
        .execute(&mut *tx)
        .await
        .context("clear invoice items failed")?;

    for item in items {
        sqlx::query(
            r#"
            insert into invoice_items (id, invoice_id, title, description, quantity, unit_price, total, sort_order)
            values ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(invoice_id)
        .bind(&item.title)
        .bind(&item.description)
        .bind(item.quantity)
        .bind(item.unit_price)
        .bind((item.quantity * item.unit_price).round_dp(2))
        .bind(item.sort_order)
        .execute(&mut *tx)
        .await
        .context("insert invoice item failed")?;
    }

    let pairs: Vec<(Decimal, Decimal)> = items.iter().map(|i| (i.quantity, i.unit_price)).collect();
    let totals = compute_totals(&pairs, tax_rate);

    sqlx::query(
        r#"
        update invoices
        set subtotal = $2, tax_amount = $3, total = $4, updated_at = now()
        where id = $1
        "#,
    )
    .bind(invoice_id)
    .bind(totals.subtotal)
    .bind(totals.tax_amount)
    .bind(totals.total)
    .execute(&mut *tx)
    .await
    .context("invoice totals update failed")?;

    tx.commit().await.context("commit replace_invoice_items tx")?;
    Ok(())
}

pub async fn fetch_invoice(pool: &PgPool, id: Uuid) -> Result<Option<InvoiceRow>> {
    let row = sqlx::query(&format!("select {INVOICE_COLS} from invoices where id = $1"))
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("fetch_invoice failed")?;
    row.as_ref().map(map_invoice).transpose()
}

pub async fn list_invoices(pool: &PgPool, scope: &ScopeFilter) -> Result<Vec<InvoiceRow>> {
    let rows = sqlx::query(&format!(
        r#"
        select {INVOICE_COLS}
        from invoices
        where ($1::uuid[] is null or client_id = any($1))
        order by created_at desc
        "#
    ))
    .bind(scope_bind(scope))
    .fetch_all(pool)
    .await
    .context("list_invoices failed")?;

    rows.iter().map(map_invoice).collect()
}

pub async fn list_invoice_items(pool: &PgPool, invoice_id: Uuid) -> Result<Vec<LineItemRow>> {
    let rows = sqlx::query(
        r#"
        select id, title, description, quantity, unit_price, total, sort_order
        from invoice_items
        where invoice_id = $1
        order by sort_order
        "#,
    )
    .bind(invoice_id)
    .fetch_all(pool)
    .await
    .context("list_invoice_items failed")?;

    rows.iter().map(map_item).collect()
}

/// draft -> sent.
pub async fn mark_invoice_sent(pool: &PgPool, id: Uuid) -> Result<()> {
    let res = sqlx::query(
        r#"
        update invoices
        set status = 'sent', sent_at = now(), updated_at = now()
        where id = $1 and status = 'draft'
        "#,
    )
    .bind(id)
    .execute(pool)
    .await
    .context("mark_invoice_sent failed")?;

    if res.rows_affected() == 0 {
        return Err(anyhow!("invoice not in draft"));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Quotes
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct QuoteRow {
    pub id: Uuid,
    pub client_id: Uuid,
    pub project_id: Option<Uuid>,
    pub quote_number: String,
    pub title: String,
    pub description: Option<String>,
    pub status: QuoteStatus,
    pub quote_date: NaiveDate,
    pub valid_until: NaiveDate,
    pub sent_at: Option<DateTime<Utc>>,
    pub accepted_at: Option<DateTime<Utc>>,
    pub subtotal: Decimal,
    pub tax_rate: Decimal,
    pub tax_amount: Decimal,
    pub total: Decimal,
    pub currency: String,
}

#[derive(Debug, Clone)]
pub struct NewQuote {
    pub client_id: Uuid,
    pub project_id: Option<Uuid>,
    pub created_by: Option<Uuid>,
    pub title: String,
    pub description: Option<String>,
    pub valid_until: NaiveDate,
    pub tax_rate: Decimal,
    pub currency: String,
    pub items: Vec<LineItem>,
}

const QUOTE_COLS: &str = r#"
    id, client_id, project_id, quote_number, title, description, status,
    quote_date, valid_until, sent_at, accepted_at,
    subtotal, tax_rate, tax_amount, total, currency
"#;

fn map_quote(row: &sqlx::postgres::PgRow) -> Result<QuoteRow> {
    Ok(QuoteRow {
        id: row.try_get("id")?,
        client_id: row.try_get("client_id")?,
        project_id: row.try_get("project_id")?,
        quote_number: row.try_get("quote_number")?,
        title: row.try_get("title")?,
        description: row.try_get("description")?,
        status: QuoteStatus::parse(&row.try_get::<String, _>("status")?)?,
        quote_date: row.try_get("quote_date")?,
        valid_until: row.try_get("valid_until")?,
        sent_at: row.try_get("sent_at")?,
        accepted_at: row.try_get("accepted_at")?,
        subtotal: row.try_get("subtotal")?,
        tax_rate: row.try_get("tax_rate")?,
        tax_amount: row.try_get("tax_amount")?,
        total: row.try_get("total")?,
        currency: row.try_get("currency")?,
    })
}

pub async fn insert_quote(pool: &PgPool, quote: &NewQuote) -> Result<Uuid> {
    let id = Uuid::new_v4();
    let pairs: Vec<(Decimal, Decimal)> = quote.items.iter().map(|i| (i.quantity, i.unit_price)).collect();
    let totals = compute_totals(&pairs, quote.tax_rate);

    let mut tx = pool.begin().await.context("begin insert_quote tx")?;
    let number = next_number(&mut tx, "quotes", "DV").await?;

    sqlx::query(
        r#"
        insert into quotes (
          id, client_id, project_id, created_by, quote_number, title, description,
          valid_until, subtotal, tax_rate, tax_amount, total, currency
        ) values ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
        "#,
    )
    .bind(id)
    .bind(quote.client_id)
    .bind(quote.project_id)
    .bind(quote.created_by)
    .bind(&number)
    .bind(&quote.title)
    .bind(&quote.description)
    .bind(quote.valid_until)
    .bind(totals.subtotal)
    .bind(quote.tax_rate)
    .bind(totals.tax_amount)
    .bind(totals.total)
    .bind(&quote.currency)
    .execute(&mut *tx)
    .await
    .context("insert_quote failed")?;

    for item in &quote.items {
        sqlx::query(
            r#"
            insert into quote_items (id, quote_id, title, description, quantity, unit_price, total, sort_order)
            values ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(id)
        .bind(&item.title)
        .bind(&item.description)
        .bind(item.quantity)
        .bind(item.unit_price)
        .bind((item.quantity * item.unit_price).round_dp(2))
        .bind(item.sort_order)
        .execute(&mut *tx)
        .await
        .context("insert quote item failed")?;
    }

    tx.commit().await.context("commit insert_quote tx")?;
    Ok(id)
}

/// Replace the line items of a draft quote and recompute totals.
pub async fn replace_quote_items(pool: &PgPool, quote_id: Uuid, items: &[LineItem]) -> Result<()> {
    let mut tx = pool.begin().await.context("begin replace_quote_items tx")?;

    let (status, tax_rate): (String, Decimal) =
        sqlx::query_as("select status, tax_rate from quotes where id = $1 for update")
            .bind(quote_id)
            .fetch_one(&mut *tx)
            .await
            .context("quote lookup failed")?;
    if status != "draft" {
        return Err(anyhow!("quote items can only change while draft, status is {status}"));
    }

    sqlx::query("delete from quote_items where quote_id = $1")
        .bind(quote_id)
        .execute(&mut *tx)
        .await
        .context("clear quote items failed")?;

    for item in items {
        sqlx::query(
            r#"
            insert into quote_items (id, quote_id, title, description, quantity, unit_price, total, sort_order)
            values ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(quote_id)
        .bind(&item.title)
        .bind(&item.description)
        .bind(item.quantity)
        .bind(item.unit_price)
        .bind((item.quantity * item.unit_price).round_dp(2))
        .bind(item.sort_order)
        .execute(&mut *tx)
        .await
        .context("insert quote item failed")?;
    }

    let pairs: Vec<(Decimal, Decimal)> = items.iter().map(|i| (i.quantity, i.unit_price)).collect();
    let totals = compute_totals(&pairs, tax_rate);

    sqlx::query(
        r#"
        update quotes
        set subtotal = $2, tax_amount = $3, total = $4, updated_at = now()
        where id = $1
        "#,
    )
    .bind(quote_id)
    .bind(totals.subtotal)
    .bind(totals.tax_amount)
    .bind(totals.total)
    .execute(&mut *tx)
    .await
    .context("quote totals update failed")?;

    tx.commit().await.context("commit replace_quote_items tx")?;
    Ok(())
}

pub async fn fetch_quote(pool: &PgPool, id: Uuid) -> Result<Option<QuoteRow>> {
    let row = sqlx::query(&format!("select {QUOTE_COLS} from quotes where id = $1"))
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("fetch_quote failed")?;
    row.as_ref().map(map_quote).transpose()
}

pub async fn list_quotes(pool: &PgPool, scope: &ScopeFilter) -> Result<Vec<QuoteRow>> {
    let rows = sqlx::query(&format!(
        r#"
        select {QUOTE_COLS}
        from quotes
        where ($1::uuid[] is null or client_id = any($1))
        order by created_at desc
        "#
    ))
    .bind(scope_bind(scope))
    .fetch_all(pool)
    .await
    .context("list_quotes failed")?;

    rows.iter().map(map_quote).collect()
}

pub async fn list_quote_items(pool: &PgPool, quote_id: Uuid) -> Result<Vec<LineItemRow>> {
    let rows = sqlx::query(
        r#"
        select id, title, description, quantity, unit_price, total, sort_order
        from quote_items
        where quote_id = $1
        order by sort_order
        "#,
    )
    .bind(quote_id)
    .fetch_all(pool)
    .await
    .context("list_quote_items failed")?;

    rows.iter().map(map_item).collect()
}

/// sent -> accepted.
pub async fn mark_quote_accepted(pool: &PgPool, id: Uuid) -> Result<()> {
    let res = sqlx::query(
        r#"
        update quotes
        set status = 'accepted', accepted_at = now(), updated_at = now()
        where id = $1 and status = 'sent'
        "#,
    )
    .bind(id)
    .execute(pool)
    .await
    .context("mark_quote_accepted failed")?;

    if res.rows_affected() == 0 {
        return Err(anyhow!("quote not in sent state"));
    }
    Ok(())
}

/// draft -> sent.
pub async fn mark_quote_sent(pool: &PgPool, id: Uuid) -> Result<()> {
    let res = sqlx::query(
        r#"
        update quotes
        set status = 'sent', sent_at = now(), updated_at = now()
        where id = $1 and status = 'draft'
        "#,
    )
    .bind(id)
    .execute(pool)
    .await
    .context("mark_quote_sent failed")?;

    if res.rows_affected() == 0 {
        return Err(anyhow!("quote not in draft"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn d(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    #[test]
    fn totals_follow_quantity_times_unit_price_plus_tax() {
        let items = vec![(d("2.00"), d("100.00")), (d("1.50"), d("40.00"))];
        let t = compute_totals(&items, d("20.00"));
        assert_eq!(t.subtotal, d("260.00"));
        assert_eq!(t.tax_amount, d("52.00"));
        assert_eq!(t.total, d("312.00"));
    }

    #[test]
    fn totals_on_empty_items_are_zero() {
        let t = compute_totals(&[], d("20.00"));
        assert_eq!(t.subtotal, Decimal::ZERO);
        assert_eq!(t.total, Decimal::ZERO);
    }

    #[test]
    fn numbering_is_zero_padded_per_year() {
        assert_eq!(format_number("FA", 2026, 7), "FA-2026-0007");
        assert_eq!(format_number("DV", 2026, 1234), "DV-2026-1234");
        assert_eq!(format_number("FA", 2027, 10001), "FA-2027-10001");
    }

    #[test]
    fn remaining_amount_is_total_minus_paid() {
        let inv = InvoiceRow {
            id: Uuid::new_v4(),
            client_id: Uuid::new_v4(),
            project_id: None,
            quote_id: None,
            invoice_number: "FA-2026-0001".into(),
            title: "t".into(),
            description: None,
            status: InvoiceStatus::Sent,
            invoice_date: NaiveDate::from_ymd_opt(2026, 1, 1).unwrap(),
            due_date: NaiveDate::from_ymd_opt(2026, 2, 1).unwrap(),
            sent_at: None,
            paid_at: None,
            subtotal: d("100.00"),
            tax_rate: d("20.00"),
            tax_amount: d("20.00"),
            total: d("120.00"),
            paid_amount: d("50.00"),
            currency: "EUR".into(),
        };
        assert_eq!(inv.remaining_amount(), d("70.00"));
    }
}
