use std::sync::Arc;

use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use sqlx::postgres::PgPoolOptions;
use tower::ServiceExt;
use uuid::Uuid;

use wallet_ledger::config::SystemSettings;
use wallet_ledger::db::{auth::AuthRepository, MemoryLedgerStore};
use wallet_ledger::routes::{self, auth::AuthService};
use wallet_ledger::AppState;

const SECRET: &str = "test-secret";

// the ledger runs in memory; the pool is never connected
fn app() -> (Router, Arc<AuthService>) {
    let pool = PgPoolOptions::new()
        .connect_lazy("postgres://localhost/wallet_ledger")
        .unwrap();
    let auth = AuthService::new(AuthRepository::new(pool), SECRET.to_string());
    let state = AppState::new(
        auth,
        Arc::new(MemoryLedgerStore::new()),
        SystemSettings::default(),
        16,
    );
    let tokens = state.auth.clone();
    (routes::router(state), tokens)
}

async fn call(app: &Router, method: Method, uri: &str, token: Option<&str>, body: Option<Value>) -> (StatusCode, Value) {
    let mut request = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        request = request.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    let request = match body {
        Some(body) => request
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => request.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

#[tokio::test]
async fn deposit_approval_round_trip() {
    let (app, tokens) = app();
    let user_id = Uuid::new_v4();
    let user = tokens.issue_access_token(user_id, false).unwrap();
    let admin = tokens.issue_access_token(Uuid::new_v4(), true).unwrap();

    let (status, deposit) = call(
        &app,
        Method::POST,
        "/v1/tx/deposit",
        Some(&user),
        Some(json!({ "amount": "50.00", "method": "bank_transfer" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(deposit["status"], "pending");
    assert_eq!(deposit["type"], "deposit");
    let id = deposit["id"].as_str().unwrap().to_string();

    let (status, outcome) = call(
        &app,
        Method::PATCH,
        &format!("/v1/admin/tx/deposit/{id}/status"),
        Some(&admin),
        Some(json!({ "status": "approved" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(outcome["transaction"]["status"], "approved");
    assert_eq!(outcome["downgraded"], false);

    let (status, summary) = call(&app, Method::GET, "/v1/wallet", Some(&user), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(summary["balance"], "50.00");
    assert_eq!(summary["total_deposits"], "50.00");
}

#[tokio::test]
async fn admin_route_requires_staff() {
    let (app, tokens) = app();
    let user = tokens.issue_access_token(Uuid::new_v4(), false).unwrap();

    let (status, body) = call(
        &app,
        Method::PATCH,
        &format!("/v1/admin/tx/withdrawal/{}/status", Uuid::new_v4()),
        Some(&user),
        Some(json!({ "status": "approved" })),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["status"], 403);
}

#[tokio::test]
async fn missing_token_is_unauthorized() {
    let (app, _) = app();
    let (status, _) = call(&app, Method::GET, "/v1/tx/list", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn withdrawal_without_address_is_bad_request() {
    let (app, tokens) = app();
    let user = tokens.issue_access_token(Uuid::new_v4(), false).unwrap();

    let (status, body) = call(
        &app,
        Method::POST,
        "/v1/tx/withdrawal",
        Some(&user),
        Some(json!({ "amount": "10" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(
        body["error"],
        "Validation error: Withdrawal address is required"
    );
}

#[tokio::test]
async fn transactions_are_private_to_their_owner() {
    let (app, tokens) = app();
    let owner = tokens.issue_access_token(Uuid::new_v4(), false).unwrap();
    let stranger = tokens.issue_access_token(Uuid::new_v4(), false).unwrap();

    let (_, withdrawal) = call(
        &app,
        Method::POST,
        "/v1/tx/withdrawal",
        Some(&owner),
        Some(json!({ "amount": "5", "address": "bc1qowner" })),
    )
    .await;
    let uri = format!("/v1/tx/withdrawal/{}", withdrawal["id"].as_str().unwrap());

    let (status, _) = call(&app, Method::GET, &uri, Some(&owner), None).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = call(&app, Method::GET, &uri, Some(&stranger), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, list) = call(
        &app,
        Method::GET,
        "/v1/tx/list?type=withdrawal&status=pending",
        Some(&owner),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(list.as_array().unwrap().len(), 1);

    let (_, list) = call(&app, Method::GET, "/v1/tx/list?type=deposit", Some(&owner), None).await;
    assert!(list.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn settled_transaction_rejects_new_status() {
    let (app, tokens) = app();
    let user = tokens.issue_access_token(Uuid::new_v4(), false).unwrap();
    let admin = tokens.issue_access_token(Uuid::new_v4(), true).unwrap();

    let (_, deposit) = call(
        &app,
        Method::POST,
        "/v1/tx/deposit",
        Some(&user),
        Some(json!({ "amount": "12.5", "method": "card" })),
    )
    .await;
    let uri = format!(
        "/v1/admin/tx/deposit/{}/status",
        deposit["id"].as_str().unwrap()
    );

    let (status, _) = call(&app, Method::PATCH, &uri, Some(&admin), Some(json!({ "status": "rejected" }))).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = call(&app, Method::PATCH, &uri, Some(&admin), Some(json!({ "status": "approved" }))).await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn settings_expose_deposit_address() {
    let (app, _) = app();
    let (status, body) = call(&app, Method::GET, "/v1/settings", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body["deposit_wallet_address"],
        "bc1qcl84vkhs9aur0qcf02n8xfwk6pe95zrtq7f05w"
    );
}

#[tokio::test]
async fn malformed_input_gets_json_validation_error() {
    let (app, tokens) = app();
    let user = tokens.issue_access_token(Uuid::new_v4(), false).unwrap();

    let (status, body) = call(
        &app,
        Method::POST,
        "/v1/tx/deposit",
        Some(&user),
        Some(json!({ "amount": "abc", "method": "bank" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["status"], 400);
    assert!(body["error"]
        .as_str()
        .unwrap()
        .starts_with("Validation error: "));

    let (status, body) = call(&app, Method::GET, "/v1/tx/list?type=loan", Some(&user), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["status"], 400);

    let (status, body) = call(
        &app,
        Method::GET,
        &format!("/v1/tx/loan/{}", Uuid::new_v4()),
        Some(&user),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["status"], 400);

    let admin = tokens.issue_access_token(Uuid::new_v4(), true).unwrap();
    let (status, body) = call(
        &app,
        Method::PATCH,
        &format!("/v1/admin/tx/deposit/{}/status", Uuid::new_v4()),
        Some(&admin),
        Some(json!({ "status": "settled" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["status"], 400);
}

#[tokio::test]
async fn performance_reports_todays_approved_totals() {
    let (app, tokens) = app();
    let user = tokens.issue_access_token(Uuid::new_v4(), false).unwrap();
    let admin = tokens.issue_access_token(Uuid::new_v4(), true).unwrap();

    for amount in ["20.00", "5.50"] {
        let (_, deposit) = call(
            &app,
            Method::POST,
            "/v1/tx/deposit",
            Some(&user),
            Some(json!({ "amount": amount, "method": "card" })),
        )
        .await;
        let uri = format!(
            "/v1/admin/tx/deposit/{}/status",
            deposit["id"].as_str().unwrap()
        );
        let (status, _) = call(&app, Method::PATCH, &uri, Some(&admin), Some(json!({ "status": "approved" }))).await;
        assert_eq!(status, StatusCode::OK);
    }

    let (status, body) = call(&app, Method::GET, "/v1/wallet/performance", Some(&user), None).await;
    assert_eq!(status, StatusCode::OK);
    let deposits = body["deposits"].as_array().unwrap();
    assert_eq!(deposits.len(), 1);
    assert_eq!(deposits[0]["total"], "25.50");
    assert_eq!(
        deposits[0]["day"],
        chrono::Utc::now().date_naive().to_string()
    );
    assert!(body["withdrawals"].as_array().unwrap().is_empty());
}
