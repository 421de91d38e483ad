use axum::{
    response::{IntoResponse, Response},
    Router,
};
use thiserror::Error;
use tower_http::{
    compression::CompressionLayer, limit::RequestBodyLimitLayer,
    validate_request::ValidateRequestHeaderLayer,
};

use crate::error::LedgerError;
use crate::AppState;
use auth::AuthError;

pub mod admin;
pub mod auth;
pub mod extract;
pub mod tx;
pub mod utils;

const BODY_LIMIT: usize = 1024 * 1024; // 1MB

#[derive(Error, Debug)]
pub enum ApiError {
    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::Auth(err) => err.into_response(),
            ApiError::Ledger(err) => err.into_response(),
        }
    }
}

pub fn router(state: AppState) -> Router {
    let auth_routes = auth::auth_routes(state.auth.clone());
    let transfer_routes = tx::tx_route(state.clone())
        .route_layer(ValidateRequestHeaderLayer::accept("application/json"))
        .route_layer(CompressionLayer::new().gzip(true));
    let admin_routes = admin::admin_routes(state.clone())
        .route_layer(ValidateRequestHeaderLayer::accept("application/json"));
    let notification_routes = tx::notification_route(state);

    let v1 = auth_routes
        .merge(transfer_routes)
        .merge(admin_routes)
        .merge(notification_routes);

    Router::new()
        .nest("/v1", v1)
        .layer(RequestBodyLimitLayer::new(BODY_LIMIT))
}
