//! Audit trail listing. Client members only see entries tied to their own
//! clients; unscoped entries (logins, admin actions) are staff-only.

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::HeaderMap;
use axum::Json;
use nx_db::audit as db;
use nx_scope::ScopeFilter;
use serde::Deserialize;
use uuid::Uuid;

use crate::auth::require_actor;
use crate::error::ApiError;
use crate::state::AppState;

#[derive(Deserialize)]
pub(crate) struct ListQuery {
    #[serde(default)]
    pub entity_kind: Option<String>,
    #[serde(default)]
    pub entity_id: Option<Uuid>,
    #[serde(default)]
    pub actor_id: Option<Uuid>,
    #[serde(default)]
    pub limit: Option<i64>,
}

pub(crate) async fn list(
    State(st): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(q): Query<ListQuery>,
) -> Result<Json<Vec<db::AuditRow>>, ApiError> {
    let actor = require_actor(&st, &headers).await?;
    let rows = db::list_audit(
        &st.pool,
        &ScopeFilter::for_actor(&actor),
        &db::AuditListFilter {
            entity_kind: q.entity_kind,
            entity_id: q.entity_id,
            actor_id: q.actor_id,
            limit: q.limit,
        },
    )
    .await?;
    Ok(Json(rows))
}
