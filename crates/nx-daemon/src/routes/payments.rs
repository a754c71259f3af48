//! Payment endpoints: checkout init, provider webhook intake, manual
//! status check. The webhook route is the only unauthenticated mutation
//! surface; it is gated by the HMAC signature instead of a session.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::Json;
use nx_audit::AuditRecord;
use nx_db::payments as db;
use nx_payments::{
    init_checkout, process_webhook, reconcile_transaction, CheckoutRequest, ReconcileOutcome,
    WebhookDisposition,
};
use nx_schemas::AuditAction;
use nx_scope::{check_read, ObjectScope, ScopeFilter};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth::{granted, record_audit, request_meta, require_actor};
use crate::error::ApiError;
use crate::state::AppState;

#[derive(Deserialize)]
pub(crate) struct ListQuery {
    #[serde(default)]
    pub invoice_id: Option<Uuid>,
}

pub(crate) async fn list(
    State(st): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(q): Query<ListQuery>,
) -> Result<Json<Vec<db::PaymentRow>>, ApiError> {
    let actor = require_actor(&st, &headers).await?;
    let rows =
        db::list_payments(&st.pool, &ScopeFilter::for_actor_billing(&actor), q.invoice_id).await?;
    Ok(Json(rows))
}

pub(crate) async fn fetch(
    State(st): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Result<Json<db::PaymentRow>, ApiError> {
    let actor = require_actor(&st, &headers).await?;
    let row = db::fetch_payment(&st.pool, id).await?.ok_or(ApiError::NotFound)?;
    granted(check_read(&actor, &ObjectScope::client(row.client_id).billing()))?;
    Ok(Json(row))
}

// ---------------------------------------------------------------------------
// Checkout
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
pub(crate) struct InitBody {
    pub invoice_id: Uuid,
}

#[derive(Serialize)]
pub(crate) struct InitResponse {
    pub payment_id: Uuid,
    pub transaction_id: String,
    pub checkout_url: String,
}

pub(crate) async fn init(
    State(st): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<InitBody>,
) -> Result<Json<InitResponse>, ApiError> {
    let actor = require_actor(&st, &headers).await?;
    let invoice = nx_db::billing::fetch_invoice(&st.pool, body.invoice_id)
        .await?
        .ok_or(ApiError::NotFound)?;
    granted(check_read(&actor, &ObjectScope::client(invoice.client_id).billing()))?;

    if invoice.remaining_amount() <= rust_decimal::Decimal::ZERO {
        return Err(ApiError::BadRequest(format!(
            "invoice {} has no outstanding balance",
            invoice.invoice_number
        )));
    }

    let user = nx_db::users::fetch_user(&st.pool, actor.user_id).await?;

    let session = init_checkout(
        &st.pool,
        st.provider.as_ref(),
        &st.config.provider,
        &CheckoutRequest {
            invoice_id: invoice.id,
            initiated_by: Some(actor.user_id),
            customer_name: user.full_name,
            customer_email: user.email,
        },
    )
    .await
    .map_err(ApiError::Upstream)?;

    let (ip, agent) = request_meta(&headers);
    record_audit(
        &st,
        AuditRecord::new(
            AuditAction::Payment,
            format!("checkout opened for invoice {}", invoice.invoice_number),
        )
        .actor(actor.user_id)
        .entity("payment", session.payment_id)
        .scope(Some(invoice.client_id), invoice.project_id)
        .request_meta(ip, agent),
    )
    .await;

    Ok(Json(InitResponse {
        payment_id: session.payment_id,
        transaction_id: session.transaction_id,
        checkout_url: session.checkout_url,
    }))
}

// ---------------------------------------------------------------------------
// Webhook
// ---------------------------------------------------------------------------

#[derive(Serialize)]
pub(crate) struct WebhookResponse {
    pub webhook_id: Uuid,
    pub disposition: &'static str,
}

/// Provider notification intake. No session auth; the `x-token` HMAC over
/// the raw body is the credential. Invalid signatures still get recorded
/// before the 403 goes out.
pub(crate) async fn webhook(
    State(st): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<WebhookResponse>, ApiError> {
    let signature = headers
        .get("x-token")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();

    let outcome = process_webhook(
        &st.pool,
        st.provider.as_ref(),
        &st.config.provider,
        &body,
        &signature,
    )
    .await?;

    let disposition = match &outcome.disposition {
        WebhookDisposition::InvalidSignature => {
            return Err(ApiError::Forbidden("invalid_signature"));
        }
        WebhookDisposition::Malformed => {
            return Err(ApiError::BadRequest("missing transaction id".into()));
        }
        WebhookDisposition::Reconciled(ReconcileOutcome::UnknownTransaction) => {
            return Err(ApiError::NotFound);
        }
        WebhookDisposition::Reconciled(ReconcileOutcome::Settled(_)) => "settled",
        WebhookDisposition::Reconciled(ReconcileOutcome::InFlight(_)) => "in_flight",
        WebhookDisposition::Reconciled(ReconcileOutcome::Unrecognized) => "ignored",
    };

    Ok(Json(WebhookResponse {
        webhook_id: outcome.webhook_id,
        disposition,
    }))
}

// ---------------------------------------------------------------------------
// Manual check
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
pub(crate) struct CheckQuery {
    pub transaction_id: String,
}

#[derive(Serialize)]
pub(crate) struct CheckResponse {
    pub transaction_id: String,
    pub outcome: &'static str,
    pub status: Option<&'static str>,
}

/// Re-checks one transaction against the provider on demand. Useful when a
/// webhook was lost; converges on the same state the webhook path would.
pub(crate) async fn check(
    State(st): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(q): Query<CheckQuery>,
) -> Result<Json<CheckResponse>, ApiError> {
    let actor = require_actor(&st, &headers).await?;
    let payment = db::fetch_by_transaction_id(&st.pool, &q.transaction_id)
        .await?
        .ok_or(ApiError::NotFound)?;
    granted(check_read(&actor, &ObjectScope::client(payment.client_id).billing()))?;

    let outcome = reconcile_transaction(&st.pool, st.provider.as_ref(), &q.transaction_id)
        .await
        .map_err(ApiError::Upstream)?;

    let (outcome_str, status) = match outcome {
        ReconcileOutcome::Settled(s) => ("settled", Some(s.as_str())),
        ReconcileOutcome::InFlight(s) => ("in_flight", Some(s.as_str())),
        ReconcileOutcome::UnknownTransaction => ("unknown_transaction", None),
        ReconcileOutcome::Unrecognized => ("unrecognized", None),
    };

    Ok(Json(CheckResponse {
        transaction_id: q.transaction_id,
        outcome: outcome_str,
        status,
    }))
}
