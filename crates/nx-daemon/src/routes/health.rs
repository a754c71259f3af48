use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;

use crate::api_types::HealthResponse;
use crate::state::AppState;

/// Liveness. `db_ok` goes false when the pool cannot reach Postgres; the
/// endpoint itself stays 200 so orchestrators can distinguish process-up
/// from db-up.
pub(crate) async fn health(State(st): State<Arc<AppState>>) -> impl IntoResponse {
    let db_ok = nx_db::status(&st.pool).await.map(|s| s.ok).unwrap_or(false);
    (
        StatusCode::OK,
        Json(HealthResponse {
            ok: true,
            service: st.build.service,
            version: st.build.version,
            db_ok,
        }),
    )
}
