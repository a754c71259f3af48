//! nx-payments
//!
//! Payment-provider integration: checkout initialization, webhook signature
//! verification, and settlement reconciliation. The provider's webhook is a
//! hint, never an authority; every notification is re-checked against the
//! provider's verification endpoint before any money state changes.
//!
//! This crate owns the provider abstraction; persistence lives in nx-db.

pub mod provider;
pub mod reconcile;
pub mod signature;
pub mod transition;

pub use provider::{HttpProvider, ProviderApi};
pub use reconcile::{
    init_checkout, process_webhook, reconcile_transaction, CheckoutRequest, CheckoutSession,
    ReconcileOutcome, WebhookDisposition, WebhookOutcome,
};
pub use signature::verify_signature;
pub use transition::plan_transition;
