//! Axum router for nx-daemon.
//!
//! `build_router` is the single entry point; `main.rs` calls it and attaches
//! middleware layers (CORS, tracing) afterwards so tests can use the bare
//! router. Handlers live in the per-domain submodules.

use std::sync::Arc;

use axum::routing::{get, post, put};
use axum::Router;

use crate::state::AppState;

pub mod audit;
pub mod auth;
pub mod billing;
pub mod clients;
pub mod documents;
pub mod health;
pub mod payments;
pub mod projects;
pub mod support;
pub mod tasks;

pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/v1/health", get(health::health))
        .route("/v1/auth/login", post(auth::login))
        .route("/v1/auth/logout", post(auth::logout))
        // Clients and memberships.
        .route("/v1/clients", get(clients::list).post(clients::create))
        .route("/v1/clients/:id", get(clients::fetch).put(clients::update))
        .route(
            "/v1/clients/:id/members",
            get(clients::members).post(clients::add_member),
        )
        .route(
            "/v1/clients/:id/members/:user_id",
            axum::routing::delete(clients::remove_member),
        )
        // Projects and milestones.
        .route("/v1/projects", get(projects::list).post(projects::create))
        .route("/v1/projects/:id", get(projects::fetch).put(projects::update))
        .route(
            "/v1/projects/:id/milestones",
            get(projects::milestones).post(projects::add_milestone),
        )
        // Tasks.
        .route("/v1/tasks", get(tasks::list).post(tasks::create))
        .route("/v1/tasks/:id", get(tasks::fetch).put(tasks::update))
        .route(
            "/v1/tasks/:id/comments",
            get(tasks::comments).post(tasks::add_comment),
        )
        .route(
            "/v1/tasks/:id/attachments",
            get(tasks::attachments).post(tasks::add_attachment),
        )
        // Documents and folders.
        .route("/v1/documents", get(documents::list).post(documents::create))
        .route("/v1/documents/:id", get(documents::fetch).put(documents::update))
        .route("/v1/documents/:id/download", post(documents::download))
        .route(
            "/v1/projects/:id/folders",
            get(documents::folders).post(documents::add_folder),
        )
        // Billing.
        .route("/v1/quotes", get(billing::list_quotes).post(billing::create_quote))
        .route("/v1/quotes/:id", get(billing::fetch_quote))
        .route("/v1/quotes/:id/items", put(billing::replace_quote_items))
        .route("/v1/quotes/:id/send", post(billing::send_quote))
        .route("/v1/quotes/:id/accept", post(billing::accept_quote))
        .route(
            "/v1/invoices",
            get(billing::list_invoices).post(billing::create_invoice),
        )
        .route("/v1/invoices/:id", get(billing::fetch_invoice))
        .route("/v1/invoices/:id/items", put(billing::replace_items))
        .route("/v1/invoices/:id/send", post(billing::send_invoice))
        // Payments.
        .route("/v1/payments", get(payments::list))
        .route("/v1/payments/:id", get(payments::fetch))
        .route("/v1/payments/init", post(payments::init))
        .route("/v1/payments/webhook", post(payments::webhook))
        .route("/v1/payments/check", get(payments::check))
        // Support.
        .route("/v1/support/categories", get(support::categories))
        .route("/v1/tickets", get(support::list).post(support::create))
        .route("/v1/tickets/:id", get(support::fetch).put(support::update_status))
        .route(
            "/v1/tickets/:id/messages",
            get(support::messages).post(support::add_message),
        )
        // Audit trail.
        .route("/v1/audit", get(audit::list))
        .with_state(state)
}
