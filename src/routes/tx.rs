use std::time::Duration;

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{
        sse::{Event, KeepAlive},
        IntoResponse, Sse,
    },
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use futures::Stream;
use tokio::sync::broadcast::error::RecvError;
use uuid::Uuid;

use super::extract::{JsonBody, PathParams, QueryParams};
use super::{utils, ApiError};
use crate::db::models::{TransactionFilter, TransactionKind};
use crate::error::LedgerError;
use crate::ledger::{DepositRequest, WithdrawalRequest};
use crate::AppState;

const PERFORMANCE_WINDOW_DAYS: i64 = 30;

async fn create_deposit(
    headers: HeaderMap,
    State(state): State<AppState>,
    JsonBody(request): JsonBody<DepositRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let identity = utils::validate_auth_token(&headers, &state.auth)?;
    tracing::info!("Deposit request from user: {}", identity.user_id);

    let record = state
        .requests
        .create_deposit(identity.user_id, request)
        .await?;
    Ok((StatusCode::CREATED, Json(record)))
}

async fn create_withdrawal(
    headers: HeaderMap,
    State(state): State<AppState>,
    JsonBody(request): JsonBody<WithdrawalRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let identity = utils::validate_auth_token(&headers, &state.auth)?;
    tracing::info!("Withdrawal request from user: {}", identity.user_id);

    let record = state
        .requests
        .create_withdrawal(identity.user_id, request)
        .await?;
    Ok((StatusCode::CREATED, Json(record)))
}

// return a specific transaction by its kind and id, only to its owner
async fn get_transaction(
    headers: HeaderMap,
    State(state): State<AppState>,
    PathParams((kind, id)): PathParams<(TransactionKind, Uuid)>,
) -> Result<impl IntoResponse, ApiError> {
    let identity = utils::validate_auth_token(&headers, &state.auth)?;

    match state.store.find_transaction(kind, id).await? {
        Some(record) if record.user_id == identity.user_id => Ok(Json(record)),
        _ => Err(LedgerError::NotFound(format!("{kind} {id}")).into()),
    }
}

// return the caller's transactions, newest first
async fn list_transactions(
    headers: HeaderMap,
    State(state): State<AppState>,
    QueryParams(filter): QueryParams<TransactionFilter>,
) -> Result<impl IntoResponse, ApiError> {
    let identity = utils::validate_auth_token(&headers, &state.auth)?;

    let records = state
        .store
        .list_transactions(identity.user_id, &filter)
        .await?;
    Ok(Json(records))
}

async fn wallet_summary(
    headers: HeaderMap,
    State(state): State<AppState>,
) -> Result<impl IntoResponse, ApiError> {
    let identity = utils::validate_auth_token(&headers, &state.auth)?;
    let summary = state.store.summary(identity.user_id).await?;
    Ok(Json(summary))
}

// approved totals per day over the recent window
async fn wallet_performance(
    headers: HeaderMap,
    State(state): State<AppState>,
) -> Result<impl IntoResponse, ApiError> {
    let identity = utils::validate_auth_token(&headers, &state.auth)?;
    let since = Utc::now() - chrono::Duration::days(PERFORMANCE_WINDOW_DAYS);
    let performance = state.store.performance(identity.user_id, since).await?;
    Ok(Json(performance))
}

async fn system_settings(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.settings.as_ref().clone())
}

// live notifications for the caller, as server-sent events
async fn notifications(
    headers: HeaderMap,
    State(state): State<AppState>,
) -> Result<Sse<impl Stream<Item = Result<Event, axum::Error>>>, ApiError> {
    let identity = utils::validate_auth_token(&headers, &state.auth)?;
    let user_id = identity.user_id;
    tracing::info!("Notification stream opened for user: {user_id}");

    let receiver = state.notifications.subscribe();
    let stream = futures::stream::unfold(receiver, move |mut receiver| async move {
        loop {
            match receiver.recv().await {
                Ok(event) if event.user_id == user_id => {
                    let item = Event::default().json_data(&event.notification);
                    return Some((item, receiver));
                }
                Ok(_) => continue,
                Err(RecvError::Lagged(missed)) => {
                    tracing::warn!("Notification stream for {user_id} skipped {missed} events");
                }
                Err(RecvError::Closed) => return None,
            }
        }
    });

    Ok(Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keep-alive-text"),
    ))
}

pub fn tx_route(state: AppState) -> Router {
    Router::new()
        .route("/tx/deposit", post(create_deposit))
        .route("/tx/withdrawal", post(create_withdrawal))
        .route("/tx/list", get(list_transactions))
        .route("/tx/:kind/:id", get(get_transaction))
        .route("/wallet", get(wallet_summary))
        .route("/wallet/performance", get(wallet_performance))
        .route("/settings", get(system_settings))
        .with_state(state)
}

pub fn notification_route(state: AppState) -> Router {
    Router::new()
        .route("/notifications", get(notifications))
        .with_state(state)
}
