use axum::{
    extract::State,
    http::HeaderMap,
    response::IntoResponse,
    routing::patch,
    Json, Router,
};
use serde::Deserialize;
use uuid::Uuid;

use super::extract::{JsonBody, PathParams};
use super::{utils, ApiError};
use crate::db::models::{TransactionKind, TransactionStatus};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct StatusChange {
    pub status: TransactionStatus,
}

// staff decision on a pending transaction
async fn set_status(
    headers: HeaderMap,
    State(state): State<AppState>,
    PathParams((kind, id)): PathParams<(TransactionKind, Uuid)>,
    JsonBody(change): JsonBody<StatusChange>,
) -> Result<impl IntoResponse, ApiError> {
    let admin = utils::require_staff(&headers, &state.auth)?;
    tracing::info!(
        "Staff {} sets {kind} {id} to {}",
        admin.user_id,
        change.status
    );

    let outcome = state.engine.set_status(kind, id, change.status).await?;
    if outcome.downgraded {
        tracing::warn!(
            "Approval of {kind} {} downgraded to {}",
            outcome.transaction.reference,
            outcome.transaction.status
        );
    }

    Ok(Json(outcome))
}

pub fn admin_routes(state: AppState) -> Router {
    Router::new()
        .route("/admin/tx/:kind/:id/status", patch(set_status))
        .with_state(state)
}
