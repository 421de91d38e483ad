use axum::{
    async_trait,
    extract::{
        rejection::{JsonRejection, PathRejection, QueryRejection},
        FromRequest, FromRequestParts, Path, Query, Request,
    },
    http::request::Parts,
    Json,
};
use serde::de::DeserializeOwned;

use crate::error::LedgerError;

// Extractors whose rejections render as a ledger validation error, so a
// malformed body, query or path gets the same JSON error shape as the rest.

pub struct JsonBody<T>(pub T);

#[async_trait]
impl<S, T> FromRequest<S> for JsonBody<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = LedgerError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(JsonBody(value)),
            Err(rejection) => Err(invalid_body(rejection)),
        }
    }
}

pub struct QueryParams<T>(pub T);

#[async_trait]
impl<S, T> FromRequestParts<S> for QueryParams<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = LedgerError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        match Query::<T>::from_request_parts(parts, state).await {
            Ok(Query(value)) => Ok(QueryParams(value)),
            Err(rejection) => Err(invalid_query(rejection)),
        }
    }
}

pub struct PathParams<T>(pub T);

#[async_trait]
impl<S, T> FromRequestParts<S> for PathParams<T>
where
    T: DeserializeOwned + Send,
    S: Send + Sync,
{
    type Rejection = LedgerError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        match Path::<T>::from_request_parts(parts, state).await {
            Ok(Path(value)) => Ok(PathParams(value)),
            Err(rejection) => Err(invalid_path(rejection)),
        }
    }
}

fn invalid_body(rejection: JsonRejection) -> LedgerError {
    tracing::debug!("Rejected request body: {rejection}");
    LedgerError::Validation(rejection.body_text())
}

fn invalid_query(rejection: QueryRejection) -> LedgerError {
    tracing::debug!("Rejected query string: {rejection}");
    LedgerError::Validation(rejection.body_text())
}

fn invalid_path(rejection: PathRejection) -> LedgerError {
    tracing::debug!("Rejected path: {rejection}");
    LedgerError::Validation(rejection.body_text())
}
