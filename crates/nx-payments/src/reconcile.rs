//! Checkout initialization and webhook reconciliation.
//!
//! Flow for an inbound notification:
//!   1. record the webhook row (invalid signatures included, flagged),
//!   2. verify the HMAC over the raw body,
//!   3. look up the payment by provider transaction id,
//!   4. re-check the transaction against the provider (the webhook body is
//!      never trusted for money state),
//!   5. plan and apply the status transition atomically,
//!   6. mark the webhook processed / ignored / failed.
//!
//! The check endpoint is the sole authority: when the re-check call fails,
//! the webhook is marked failed and nothing is applied. The claimed status
//! in the webhook body sits in attacker-forgeable bytes and is never used
//! as a fallback; the provider retries, or an operator re-runs the check.

use anyhow::{anyhow, Context, Result};
use nx_config::ProviderConfig;
use nx_db::payments::{self, NewPayment, NewWebhook, PaymentRow};
use nx_schemas::{PaymentStatus, ProviderInitRequest, WebhookPayload, WebhookStatus};
use rust_decimal::prelude::ToPrimitive;
use sqlx::PgPool;
use tracing::{info, warn};
use uuid::Uuid;

use crate::provider::ProviderApi;
use crate::signature::verify_signature;
use crate::transition::{plan_transition, TransitionPlan};

// ---------------------------------------------------------------------------
// Checkout
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct CheckoutRequest {
    pub invoice_id: Uuid,
    pub initiated_by: Option<Uuid>,
    pub customer_name: String,
    pub customer_email: String,
}

#[derive(Debug, Clone)]
pub struct CheckoutSession {
    pub payment_id: Uuid,
    pub transaction_id: String,
    pub checkout_url: String,
}

/// Open a checkout session for the outstanding balance of an invoice.
pub async fn init_checkout(
    pool: &PgPool,
    provider: &dyn ProviderApi,
    config: &ProviderConfig,
    req: &CheckoutRequest,
) -> Result<CheckoutSession> {
    let invoice = nx_db::billing::fetch_invoice(pool, req.invoice_id)
        .await?
        .ok_or_else(|| anyhow!("invoice {} not found", req.invoice_id))?;

    let amount = invoice.remaining_amount();
    if amount <= rust_decimal::Decimal::ZERO {
        return Err(anyhow!(
            "invoice {} has no outstanding balance",
            invoice.invoice_number
        ));
    }

    let transaction_id = format!("NX-{}", Uuid::new_v4());

    let payment_id = payments::insert_payment(
        pool,
        &NewPayment {
            invoice_id: invoice.id,
            client_id: invoice.client_id,
            initiated_by: req.initiated_by,
            provider_transaction_id: transaction_id.clone(),
            amount,
            currency: invoice.currency.clone(),
            description: Some(format!("Invoice {}", invoice.invoice_number)),
        },
    )
    .await?;

    let init = ProviderInitRequest {
        amount: amount
            .to_f64()
            .ok_or_else(|| anyhow!("amount {amount} not representable"))?,
        currency: invoice.currency.clone(),
        apikey: config.api_key.clone(),
        site_id: config.site_id.clone(),
        transaction_id: transaction_id.clone(),
        description: format!("Invoice {}", invoice.invoice_number),
        return_url: config.return_url.clone(),
        cancel_url: config.cancel_url.clone(),
        notify_url: config.notify_url.clone(),
        customer_name: req.customer_name.clone(),
        customer_email: req.customer_email.clone(),
    };

    let resp = provider.init_payment(&init).await?;

    let data = resp
        .data
        .as_ref()
        .ok_or_else(|| anyhow!("provider init response missing data"))?;
    let checkout_url = data
        .payment_url
        .clone()
        .ok_or_else(|| anyhow!("provider init response missing payment_url"))?;

    let raw = serde_json::to_value(&resp).context("serialize provider init response")?;
    payments::update_after_init(
        pool,
        payment_id,
        &checkout_url,
        data.payment_token.as_deref(),
        &raw,
    )
    .await?;

    info!(%transaction_id, invoice = %invoice.invoice_number, "checkout session opened");

    Ok(CheckoutSession {
        payment_id,
        transaction_id,
        checkout_url,
    })
}

// ---------------------------------------------------------------------------
// Reconciliation
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// Payment reached a settled status (completed, failed, cancelled).
    Settled(PaymentStatus),
    /// Payment is still in flight with the provider.
    InFlight(PaymentStatus),
    /// No payment matches the transaction id.
    UnknownTransaction,
    /// Provider reported a status we do not map; nothing was changed.
    Unrecognized,
}

/// Re-check a transaction against the provider and apply the result.
/// Callable from the webhook path and from the manual check endpoint; both
/// converge on the same authoritative provider state.
pub async fn reconcile_transaction(
    pool: &PgPool,
    provider: &dyn ProviderApi,
    transaction_id: &str,
) -> Result<ReconcileOutcome> {
    let Some(payment) = payments::fetch_by_transaction_id(pool, transaction_id).await? else {
        warn!(%transaction_id, "reconcile requested for unknown transaction");
        return Ok(ReconcileOutcome::UnknownTransaction);
    };

    let resp = provider.check_payment(transaction_id).await?;
    let Some(provider_status) = resp.status() else {
        warn!(%transaction_id, "provider check response carried no status");
        return Ok(ReconcileOutcome::Unrecognized);
    };

    match plan_transition(payment.status, provider_status) {
        TransitionPlan::AlreadySettled(status) => {
            info!(%transaction_id, status = status.as_str(), "already settled, no-op");
            Ok(ReconcileOutcome::Settled(status))
        }
        TransitionPlan::Unrecognized => {
            warn!(%transaction_id, provider_status, "unrecognized provider status");
            Ok(ReconcileOutcome::Unrecognized)
        }
        TransitionPlan::Apply(next) => {
            let applied = payments::apply_transition(pool, payment.id, next, None).await?;
            info!(%transaction_id, status = applied.as_str(), "payment reconciled");
            if applied == PaymentStatus::Processing {
                Ok(ReconcileOutcome::InFlight(applied))
            } else {
                Ok(ReconcileOutcome::Settled(applied))
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebhookDisposition {
    /// Signature failed verification; recorded and flagged, nothing applied.
    InvalidSignature,
    /// Body was unparseable or missing the transaction id.
    Malformed,
    Reconciled(ReconcileOutcome),
}

#[derive(Debug, Clone)]
pub struct WebhookOutcome {
    pub webhook_id: Uuid,
    pub disposition: WebhookDisposition,
}

/// Full webhook intake. Every notification is persisted before any
/// processing, so the inbox is a complete record of what the provider sent,
/// including forgeries.
pub async fn process_webhook(
    pool: &PgPool,
    provider: &dyn ProviderApi,
    config: &ProviderConfig,
    raw_body: &[u8],
    signature: &str,
) -> Result<WebhookOutcome> {
    let valid = verify_signature(&config.secret_key, raw_body, signature);

    let parsed: Option<WebhookPayload> = serde_json::from_slice(raw_body).ok();
    let transaction_id = parsed
        .as_ref()
        .and_then(|p| p.transaction_id.clone())
        .unwrap_or_default();
    let event_type = parsed
        .as_ref()
        .and_then(|p| p.event_type.clone())
        .unwrap_or_default();
    let payload: serde_json::Value =
        serde_json::from_slice(raw_body).unwrap_or(serde_json::Value::Null);

    let payment = if transaction_id.is_empty() {
        None
    } else {
        payments::fetch_by_transaction_id(pool, &transaction_id).await?
    };

    let webhook_id = payments::record_webhook(
        pool,
        &NewWebhook {
            transaction_id: transaction_id.clone(),
            payment_id: payment.as_ref().map(|p: &PaymentRow| p.id),
            event_type,
            payload,
            signature: signature.to_string(),
            is_signature_valid: valid,
        },
    )
    .await?;

    if !valid {
        warn!(%transaction_id, "webhook signature verification failed");
        payments::mark_webhook(pool, webhook_id, WebhookStatus::Failed, Some("invalid signature"))
            .await?;
        return Ok(WebhookOutcome {
            webhook_id,
            disposition: WebhookDisposition::InvalidSignature,
        });
    }

    if transaction_id.is_empty() {
        payments::mark_webhook(pool, webhook_id, WebhookStatus::Failed, Some("no transaction id"))
            .await?;
        return Ok(WebhookOutcome {
            webhook_id,
            disposition: WebhookDisposition::Malformed,
        });
    }

    let outcome = match reconcile_transaction(pool, provider, &transaction_id).await {
        Ok(outcome) => outcome,
        Err(err) => {
            payments::mark_webhook(
                pool,
                webhook_id,
                WebhookStatus::Failed,
                Some(&format!("{err:#}")),
            )
            .await?;
            return Err(err);
        }
    };

    let mark = match &outcome {
        ReconcileOutcome::Settled(_) | ReconcileOutcome::InFlight(_) => WebhookStatus::Processed,
        ReconcileOutcome::UnknownTransaction | ReconcileOutcome::Unrecognized => {
            WebhookStatus::Ignored
        }
    };
    payments::mark_webhook(pool, webhook_id, mark, None).await?;

    Ok(WebhookOutcome {
        webhook_id,
        disposition: WebhookDisposition::Reconciled(outcome),
    })
}
