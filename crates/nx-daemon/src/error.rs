//! API error type. Handlers return `Result<_, ApiError>`; the
//! `IntoResponse` impl maps each variant to a status code and a JSON body
//! of the shape `{"error": "..."}`. Internal details are logged, never sent.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use nx_scope::DenyReason;
use serde::Serialize;
use tracing::error;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("authentication required")]
    Unauthorized,
    #[error("forbidden: {0}")]
    Forbidden(&'static str),
    #[error("not found")]
    NotFound,
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    Conflict(String),
    #[error("payment provider unavailable")]
    Upstream(#[source] anyhow::Error),
    #[error("internal error")]
    Internal(#[from] anyhow::Error),
}

impl ApiError {
    /// Denials from the scope layer. Cross-tenant denials surface as 404 so
    /// object existence is not revealed to outsiders; overlay denials
    /// (internal document, private ticket, role too low) are honest 403s,
    /// the caller already knows the object exists.
    pub fn from_denial(reason: DenyReason) -> Self {
        match reason {
            DenyReason::NotAMember => ApiError::NotFound,
            other => ApiError::Forbidden(other.as_str()),
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::NotFound => StatusCode::NOT_FOUND,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Upstream(_) => StatusCode::BAD_GATEWAY,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        match &self {
            ApiError::Upstream(err) => error!(error = %format!("{err:#}"), "upstream failure"),
            ApiError::Internal(err) => error!(error = %format!("{err:#}"), "handler failure"),
            _ => {}
        }

        let body = ErrorBody {
            error: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}
