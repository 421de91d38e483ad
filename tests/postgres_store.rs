// Runs against a real database: DATABASE_URL=... cargo test -- --ignored
use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use sqlx::postgres::PgPoolOptions;
use uuid::Uuid;

use wallet_ledger::db::auth::AuthRepository;
use wallet_ledger::db::models::{TransactionFilter, TransactionStatus};
use wallet_ledger::db::{LedgerStore, PgLedgerStore};
use wallet_ledger::error::LedgerError;
use wallet_ledger::ledger::{DepositRequest, StatusEngine, TransactionRequests, WithdrawalRequest};
use wallet_ledger::notify::BroadcastDispatcher;

async fn connect() -> (PgLedgerStore, AuthRepository) {
    let url = dotenv::var("DATABASE_URL").unwrap();
    let pool = PgPoolOptions::new()
        .max_connections(8)
        .connect(&url)
        .await
        .unwrap();
    sqlx::migrate!("./migrations").run(&pool).await.unwrap();
    (PgLedgerStore::new(pool.clone()), AuthRepository::new(pool))
}

async fn user(repo: &AuthRepository) -> Uuid {
    repo.create_user(&format!("{}@ledger.test", Uuid::new_v4()), "hash", None)
        .await
        .unwrap()
        .id
}

#[tokio::test]
#[ignore = "needs DATABASE_URL"]
async fn approvals_lock_rows_and_never_overdraw() {
    let (store, repo) = connect().await;
    let store = Arc::new(store);
    let requests = TransactionRequests::new(store.clone());
    let engine = Arc::new(StatusEngine::new(
        store.clone(),
        Arc::new(BroadcastDispatcher::new(16)),
    ));
    let user_id = user(&repo).await;

    let deposit = requests
        .create_deposit(
            user_id,
            DepositRequest {
                amount: Some(Decimal::new(100, 0)),
                method: Some("bank_transfer".to_string()),
                proof: None,
            },
        )
        .await
        .unwrap();
    // wallet provisioned through ON CONFLICT DO NOTHING
    assert_eq!(store.wallet(user_id).await.unwrap().unwrap().balance, Decimal::ZERO);
    engine
        .set_status(deposit.kind, deposit.id, TransactionStatus::Approved)
        .await
        .unwrap();

    let mut handles = Vec::new();
    for _ in 0..5 {
        let withdrawal = requests
            .create_withdrawal(
                user_id,
                WithdrawalRequest {
                    amount: Some(Decimal::new(30, 0)),
                    address: Some("bc1qdestination".to_string()),
                },
            )
            .await
            .unwrap();
        let engine = engine.clone();
        handles.push(tokio::spawn(async move {
            engine
                .set_status(withdrawal.kind, withdrawal.id, TransactionStatus::Approved)
                .await
                .unwrap()
                .transaction
                .status
        }));
    }

    let mut approved = 0;
    for handle in handles {
        if handle.await.unwrap() == TransactionStatus::Approved {
            approved += 1;
        }
    }
    assert_eq!(approved, 3);
    assert_eq!(
        store.wallet(user_id).await.unwrap().unwrap().balance,
        Decimal::new(10, 0)
    );

    let summary = store.summary(user_id).await.unwrap();
    assert_eq!(summary.total_deposits, Decimal::new(100, 0));
    assert_eq!(summary.total_withdrawals, Decimal::new(90, 0));

    let performance = store
        .performance(user_id, Utc::now() - chrono::Duration::days(30))
        .await
        .unwrap();
    assert_eq!(performance.deposits.len(), 1);
    assert_eq!(performance.deposits[0].total, Decimal::new(100, 0));
    assert_eq!(performance.withdrawals[0].total, Decimal::new(90, 0));

    let rejected = store
        .list_transactions(
            user_id,
            &TransactionFilter {
                kind: None,
                status: Some(TransactionStatus::Rejected),
            },
        )
        .await
        .unwrap();
    assert_eq!(rejected.len(), 2);
}

#[tokio::test]
#[ignore = "needs DATABASE_URL"]
async fn unknown_user_cannot_create_transactions() {
    let (store, _) = connect().await;
    let requests = TransactionRequests::new(Arc::new(store));

    let err = requests
        .create_withdrawal(
            Uuid::new_v4(),
            WithdrawalRequest {
                amount: Some(Decimal::new(5, 0)),
                address: Some("bc1qdestination".to_string()),
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::NotFound(_)));
}
