//! Quote and invoice endpoints. Client members only see billing when their
//! membership carries the billing grant; totals are always recomputed
//! server-side from line items.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::Json;
use chrono::NaiveDate;
use nx_audit::AuditRecord;
use nx_db::billing as db;
use nx_schemas::AuditAction;
use nx_scope::{check_read, check_write, ObjectScope, ScopeFilter};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::api_types::{CreatedResponse, OkResponse};
use crate::auth::{granted, record_audit, request_meta, require_actor, require_staff};
use crate::error::ApiError;
use crate::state::AppState;

#[derive(Deserialize)]
pub(crate) struct LineItemBody {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    pub quantity: Decimal,
    pub unit_price: Decimal,
    #[serde(default)]
    pub sort_order: i32,
}

fn to_items(items: Vec<LineItemBody>) -> Result<Vec<db::LineItem>, ApiError> {
    if items.is_empty() {
        return Err(ApiError::BadRequest("at least one line item required".into()));
    }
    items
        .into_iter()
        .map(|i| {
            if i.quantity <= Decimal::ZERO || i.unit_price < Decimal::ZERO {
                return Err(ApiError::BadRequest(
                    "quantity must be positive, unit_price non-negative".into(),
                ));
            }
            Ok(db::LineItem {
                title: i.title,
                description: i.description,
                quantity: i.quantity,
                unit_price: i.unit_price,
                sort_order: i.sort_order,
            })
        })
        .collect()
}

#[derive(Serialize)]
pub(crate) struct InvoiceDetail {
    #[serde(flatten)]
    pub invoice: db::InvoiceRow,
    pub items: Vec<db::LineItemRow>,
}

#[derive(Serialize)]
pub(crate) struct QuoteDetail {
    #[serde(flatten)]
    pub quote: db::QuoteRow,
    pub items: Vec<db::LineItemRow>,
}

// ---------------------------------------------------------------------------
// Invoices
// ---------------------------------------------------------------------------

pub(crate) async fn list_invoices(
    State(st): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<Vec<db::InvoiceRow>>, ApiError> {
    let actor = require_actor(&st, &headers).await?;
    let rows = db::list_invoices(&st.pool, &ScopeFilter::for_actor_billing(&actor)).await?;
    Ok(Json(rows))
}

pub(crate) async fn fetch_invoice(
    State(st): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Result<Json<InvoiceDetail>, ApiError> {
    let actor = require_actor(&st, &headers).await?;
    let invoice = db::fetch_invoice(&st.pool, id).await?.ok_or(ApiError::NotFound)?;
    granted(check_read(&actor, &ObjectScope::client(invoice.client_id).billing()))?;
    let items = db::list_invoice_items(&st.pool, id).await?;
    Ok(Json(InvoiceDetail { invoice, items }))
}

#[derive(Deserialize)]
pub(crate) struct CreateInvoiceBody {
    pub client_id: Uuid,
    #[serde(default)]
    pub project_id: Option<Uuid>,
    #[serde(default)]
    pub quote_id: Option<Uuid>,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    pub due_date: NaiveDate,
    #[serde(default)]
    pub tax_rate: Option<Decimal>,
    #[serde(default)]
    pub currency: Option<String>,
    pub items: Vec<LineItemBody>,
}

pub(crate) async fn create_invoice(
    State(st): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<CreateInvoiceBody>,
) -> Result<Json<CreatedResponse>, ApiError> {
    let actor = require_staff(&st, &headers).await?;
    let items = to_items(body.items)?;

    let id = db::insert_invoice(
        &st.pool,
        &db::NewInvoice {
            client_id: body.client_id,
            project_id: body.project_id,
            quote_id: body.quote_id,
            created_by: Some(actor.user_id),
            title: body.title.clone(),
            description: body.description,
            due_date: body.due_date,
            tax_rate: body.tax_rate.unwrap_or(Decimal::ZERO),
            currency: body.currency.unwrap_or_else(|| "EUR".into()),
            items,
        },
    )
    .await?;

    let (ip, agent) = request_meta(&headers);
    record_audit(
        &st,
        AuditRecord::new(AuditAction::Create, format!("invoice {} created", body.title))
            .actor(actor.user_id)
            .entity("invoice", id)
            .scope(Some(body.client_id), body.project_id)
            .request_meta(ip, agent),
    )
    .await;

    Ok(Json(CreatedResponse { id }))
}

/// Replace the line items of a draft invoice; totals are recomputed.
pub(crate) async fn replace_items(
    State(st): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    Json(items): Json<Vec<LineItemBody>>,
) -> Result<Json<OkResponse>, ApiError> {
    let actor = require_staff(&st, &headers).await?;
    let invoice = db::fetch_invoice(&st.pool, id).await?.ok_or(ApiError::NotFound)?;
    let items = to_items(items)?;

    db::replace_invoice_items(&st.pool, id, &items)
        .await
        .map_err(|err| ApiError::Conflict(format!("{err:#}")))?;

    let (ip, agent) = request_meta(&headers);
    record_audit(
        &st,
        AuditRecord::new(AuditAction::Update, format!("invoice {} items replaced", invoice.invoice_number))
            .actor(actor.user_id)
            .entity("invoice", id)
            .scope(Some(invoice.client_id), invoice.project_id)
            .request_meta(ip, agent),
    )
    .await;

    Ok(Json(OkResponse::yes()))
}

pub(crate) async fn send_invoice(
    State(st): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Result<Json<OkResponse>, ApiError> {
    let actor = require_staff(&st, &headers).await?;
    let invoice = db::fetch_invoice(&st.pool, id).await?.ok_or(ApiError::NotFound)?;

    db::mark_invoice_sent(&st.pool, id)
        .await
        .map_err(|err| ApiError::Conflict(format!("{err:#}")))?;

    let (ip, agent) = request_meta(&headers);
    record_audit(
        &st,
        AuditRecord::new(AuditAction::Send, format!("invoice {} sent", invoice.invoice_number))
            .actor(actor.user_id)
            .entity("invoice", id)
            .scope(Some(invoice.client_id), invoice.project_id)
            .request_meta(ip, agent),
    )
    .await;

    Ok(Json(OkResponse::yes()))
}

// ---------------------------------------------------------------------------
// Quotes
// ---------------------------------------------------------------------------

pub(crate) async fn list_quotes(
    State(st): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<Vec<db::QuoteRow>>, ApiError> {
    let actor = require_actor(&st, &headers).await?;
    let rows = db::list_quotes(&st.pool, &ScopeFilter::for_actor_billing(&actor)).await?;
    Ok(Json(rows))
}

pub(crate) async fn fetch_quote(
    State(st): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Result<Json<QuoteDetail>, ApiError> {
    let actor = require_actor(&st, &headers).await?;
    let quote = db::fetch_quote(&st.pool, id).await?.ok_or(ApiError::NotFound)?;
    granted(check_read(&actor, &ObjectScope::client(quote.client_id).billing()))?;
    let items = db::list_quote_items(&st.pool, id).await?;
    Ok(Json(QuoteDetail { quote, items }))
}

#[derive(Deserialize)]
pub(crate) struct CreateQuoteBody {
    pub client_id: Uuid,
    #[serde(default)]
    pub project_id: Option<Uuid>,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    pub valid_until: NaiveDate,
    #[serde(default)]
    pub tax_rate: Option<Decimal>,
    #[serde(default)]
    pub currency: Option<String>,
    pub items: Vec<LineItemBody>,
}

pub(crate) async fn create_quote(
    State(st): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<CreateQuoteBody>,
) -> Result<Json<CreatedResponse>, ApiError> {
    let actor = require_staff(&st, &headers).await?;
    let items = to_items(body.items)?;

    let id = db::insert_quote(
        &st.pool,
        &db::NewQuote {
            client_id: body.client_id,
            project_id: body.project_id,
            created_by: Some(actor.user_id),
            title: body.title.clone(),
            description: body.description,
            valid_until: body.valid_until,
            tax_rate: body.tax_rate.unwrap_or(Decimal::ZERO),
            currency: body.currency.unwrap_or_else(|| "EUR".into()),
            items,
        },
    )
    .await?;

    let (ip, agent) = request_meta(&headers);
    record_audit(
        &st,
        AuditRecord::new(AuditAction::Create, format!("quote {} created", body.title))
            .actor(actor.user_id)
            .entity("quote", id)
            .scope(Some(body.client_id), body.project_id)
            .request_meta(ip, agent),
    )
    .await;

    Ok(Json(CreatedResponse { id }))
}

/// Replace the line items of a draft quote; totals are recomputed.
pub(crate) async fn replace_quote_items(
    State(st): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    Json(items): Json<Vec<LineItemBody>>,
) -> Result<Json<OkResponse>, ApiError> {
    let actor = require_staff(&st, &headers).await?;
    let quote = db::fetch_quote(&st.pool, id).await?.ok_or(ApiError::NotFound)?;
    let items = to_items(items)?;

    db::replace_quote_items(&st.pool, id, &items)
        .await
        .map_err(|err| ApiError::Conflict(format!("{err:#}")))?;

    let (ip, agent) = request_meta(&headers);
    record_audit(
        &st,
        AuditRecord::new(AuditAction::Update, format!("quote {} items replaced", quote.quote_number))
            .actor(actor.user_id)
            .entity("quote", id)
            .scope(Some(quote.client_id), quote.project_id)
            .request_meta(ip, agent),
    )
    .await;

    Ok(Json(OkResponse::yes()))
}

pub(crate) async fn send_quote(
    State(st): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Result<Json<OkResponse>, ApiError> {
    let actor = require_staff(&st, &headers).await?;
    let quote = db::fetch_quote(&st.pool, id).await?.ok_or(ApiError::NotFound)?;

    db::mark_quote_sent(&st.pool, id)
        .await
        .map_err(|err| ApiError::Conflict(format!("{err:#}")))?;

    let (ip, agent) = request_meta(&headers);
    record_audit(
        &st,
        AuditRecord::new(AuditAction::Send, format!("quote {} sent", quote.quote_number))
            .actor(actor.user_id)
            .entity("quote", id)
            .scope(Some(quote.client_id), quote.project_id)
            .request_meta(ip, agent),
    )
    .await;

    Ok(Json(OkResponse::yes()))
}

/// Acceptance comes from the client side: an owner/admin member with the
/// billing grant (or staff acting on their behalf).
pub(crate) async fn accept_quote(
    State(st): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Result<Json<OkResponse>, ApiError> {
    let actor = require_actor(&st, &headers).await?;
    let quote = db::fetch_quote(&st.pool, id).await?.ok_or(ApiError::NotFound)?;
    granted(check_write(&actor, &ObjectScope::client(quote.client_id).billing()))?;

    db::mark_quote_accepted(&st.pool, id)
        .await
        .map_err(|err| ApiError::Conflict(format!("{err:#}")))?;

    let (ip, agent) = request_meta(&headers);
    record_audit(
        &st,
        AuditRecord::new(AuditAction::Approve, format!("quote {} accepted", quote.quote_number))
            .actor(actor.user_id)
            .entity("quote", id)
            .scope(Some(quote.client_id), quote.project_id)
            .request_meta(ip, agent),
    )
    .await;

    Ok(Json(OkResponse::yes()))
}
