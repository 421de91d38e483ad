use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use sqlx::{PgPool, Postgres, QueryBuilder, Transaction};
use uuid::Uuid;

use super::models::{
    DailyTotal, Performance, TransactionDetails, TransactionFilter, TransactionKind, TransactionRecord, TransactionStatus,
    Wallet, WalletSummary,
};
use super::store::{LedgerStore, LedgerUnit};
use super::{violates, FOREIGN_KEY_VIOLATION, UNIQUE_VIOLATION};
use crate::error::LedgerError;


// Both tables are read through one row shape; the columns a kind lacks are NULL.
fn select_columns(kind: TransactionKind) -> &'static str {
    match kind {
        TransactionKind::Deposit => {
            "SELECT id, user_id, reference, amount, status, method, proof, NULL::TEXT AS address, \
             created_at, updated_at FROM deposits"
        }
        TransactionKind::Withdrawal => {
            "SELECT id, user_id, reference, amount, status, NULL::TEXT AS method, NULL::TEXT AS proof, \
             address, created_at, updated_at FROM withdrawals"
        }
    }
}

fn table(kind: TransactionKind) -> &'static str {
    match kind {
        TransactionKind::Deposit => "deposits",
        TransactionKind::Withdrawal => "withdrawals",
    }
}

#[derive(Debug, sqlx::FromRow)]
struct TransactionRow {
    id: Uuid,
    user_id: Uuid,
    reference: String,
    amount: Decimal,
    status: String,
    method: Option<String>,
    proof: Option<String>,
    address: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TransactionRow {
    fn into_record(self, kind: TransactionKind) -> Result<TransactionRecord, LedgerError> {
        let details = match kind {
            TransactionKind::Deposit => TransactionDetails::Deposit {
                method: self.method.unwrap_or_default(),
                proof: self.proof,
            },
            TransactionKind::Withdrawal => TransactionDetails::Withdrawal {
                address: self.address.unwrap_or_default(),
            },
        };

        Ok(TransactionRecord {
            id: self.id,
            kind,
            user_id: self.user_id,
            reference: self.reference,
            amount: self.amount,
            status: self.status.parse()?,
            details,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct WalletRow {
    user_id: Uuid,
    balance: Decimal,
    updated_at: DateTime<Utc>,
}

impl From<WalletRow> for Wallet {
    fn from(row: WalletRow) -> Self {
        Wallet {
            user_id: row.user_id,
            balance: row.balance,
            updated_at: row.updated_at,
        }
    }
}

// Postgres repository
#[derive(Clone)]
pub struct PgLedgerStore {
    pool: PgPool,
}

impl PgLedgerStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn approved_total(
        &self,
        kind: TransactionKind,
        user_id: Uuid,
    ) -> Result<Decimal, LedgerError> {
        let sql = format!(
            "SELECT COALESCE(SUM(amount), 0) FROM {} WHERE user_id = $1 AND status = 'approved'",
            table(kind)
        );
        let total = sqlx::query_scalar::<_, Decimal>(&sql)
            .bind(user_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(total)
    }

    async fn approved_by_day(
        &self,
        kind: TransactionKind,
        user_id: Uuid,
        since: DateTime<Utc>,
    ) -> Result<Vec<DailyTotal>, LedgerError> {
        let sql = format!(
            "SELECT date_trunc('day', created_at AT TIME ZONE 'UTC')::DATE AS day, SUM(amount) AS total \
             FROM {} WHERE user_id = $1 AND status = 'approved' AND created_at >= $2 \
             GROUP BY day ORDER BY day",
            table(kind)
        );
        let rows = sqlx::query_as::<_, (NaiveDate, Decimal)>(&sql)
            .bind(user_id)
            .bind(since)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows
            .into_iter()
            .map(|(day, total)| DailyTotal { day, total })
            .collect())
    }
}

#[async_trait]
impl LedgerStore for PgLedgerStore {
    async fn begin(&self) -> Result<Box<dyn LedgerUnit>, LedgerError> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgLedgerUnit { tx }))
    }

    async fn reference_exists(
        &self,
        kind: TransactionKind,
        reference: &str,
    ) -> Result<bool, LedgerError> {
        let sql = format!(
            "SELECT EXISTS (SELECT 1 FROM {} WHERE reference = $1)",
            table(kind)
        );
        let exists = sqlx::query_scalar::<_, bool>(&sql)
            .bind(reference)
            .fetch_one(&self.pool)
            .await?;
        Ok(exists)
    }

    async fn wallet(&self, user_id: Uuid) -> Result<Option<Wallet>, LedgerError> {
        let row = sqlx::query_as::<_, WalletRow>(
            "SELECT user_id, balance, updated_at FROM wallets WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Wallet::from))
    }

    async fn find_transaction(
        &self,
        kind: TransactionKind,
        id: Uuid,
    ) -> Result<Option<TransactionRecord>, LedgerError> {
        let sql = format!("{} WHERE id = $1", select_columns(kind));
        sqlx::query_as::<_, TransactionRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .map(|row| row.into_record(kind))
            .transpose()
    }

    async fn list_transactions(
        &self,
        user_id: Uuid,
        filter: &TransactionFilter,
    ) -> Result<Vec<TransactionRecord>, LedgerError> {
        let mut records = Vec::new();

        for kind in [TransactionKind::Deposit, TransactionKind::Withdrawal] {
            if !filter.includes(kind) {
                continue;
            }

            let mut query_builder = QueryBuilder::<Postgres>::new(select_columns(kind));
            query_builder.push(" WHERE user_id = ").push_bind(user_id);
            if let Some(status) = filter.status {
                query_builder.push(" AND status = ").push_bind(status.as_str());
            }
            query_builder.push(" ORDER BY created_at DESC");

            let rows = query_builder
                .build_query_as::<TransactionRow>()
                .fetch_all(&self.pool)
                .await?;
            for row in rows {
                records.push(row.into_record(kind)?);
            }
        }

        records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(records)
    }

    async fn summary(&self, user_id: Uuid) -> Result<WalletSummary, LedgerError> {
        let balance = self
            .wallet(user_id)
            .await?
            .map_or(Decimal::ZERO, |wallet| wallet.balance);

        Ok(WalletSummary {
            balance,
            total_deposits: self.approved_total(TransactionKind::Deposit, user_id).await?,
            total_withdrawals: self
                .approved_total(TransactionKind::Withdrawal, user_id)
                .await?,
        })
    }

    async fn performance(
        &self,
        user_id: Uuid,
        since: DateTime<Utc>,
    ) -> Result<Performance, LedgerError> {
        Ok(Performance {
            deposits: self
                .approved_by_day(TransactionKind::Deposit, user_id, since)
                .await?,
            withdrawals: self
                .approved_by_day(TransactionKind::Withdrawal, user_id, since)
                .await?,
        })
    }
}

pub struct PgLedgerUnit {
    tx: Transaction<'static, Postgres>,
}

fn map_insert_error(err: sqlx::Error, record: &TransactionRecord) -> LedgerError {
    if violates(&err, UNIQUE_VIOLATION) {
        LedgerError::ReferenceCollision(record.reference.clone())
    } else if violates(&err, FOREIGN_KEY_VIOLATION) {
        LedgerError::NotFound(format!("user {}", record.user_id))
    } else {
        LedgerError::Storage(err)
    }
}

#[async_trait]
impl LedgerUnit for PgLedgerUnit {
    async fn insert_transaction(&mut self, record: &TransactionRecord) -> Result<(), LedgerError> {
        let result = match &record.details {
            TransactionDetails::Deposit { method, proof } => {
                sqlx::query(
                    r#"
                    INSERT INTO deposits (id, user_id, reference, amount, status, method, proof, created_at, updated_at)
                    VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
                    "#,
                )
                .bind(record.id)
                .bind(record.user_id)
                .bind(&record.reference)
                .bind(record.amount)
                .bind(record.status.as_str())
                .bind(method)
                .bind(proof)
                .bind(record.created_at)
                .bind(record.updated_at)
                .execute(&mut *self.tx)
                .await
            }
            TransactionDetails::Withdrawal { address } => {
                sqlx::query(
                    r#"
                    INSERT INTO withdrawals (id, user_id, reference, amount, status, address, created_at, updated_at)
                    VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                    "#,
                )
                .bind(record.id)
                .bind(record.user_id)
                .bind(&record.reference)
                .bind(record.amount)
                .bind(record.status.as_str())
                .bind(address)
                .bind(record.created_at)
                .bind(record.updated_at)
                .execute(&mut *self.tx)
                .await
            }
        };

        result
            .map(|_| ())
            .map_err(|err| map_insert_error(err, record))
    }

    async fn transaction_for_update(
        &mut self,
        kind: TransactionKind,
        id: Uuid,
    ) -> Result<Option<TransactionRecord>, LedgerError> {
        let sql = format!("{} WHERE id = $1 FOR UPDATE", select_columns(kind));
        sqlx::query_as::<_, TransactionRow>(&sql)
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await?
            .map(|row| row.into_record(kind))
            .transpose()
    }

    async fn wallet_for_update(&mut self, user_id: Uuid) -> Result<Wallet, LedgerError> {
        sqlx::query(
            "INSERT INTO wallets (user_id, balance) VALUES ($1, 0) ON CONFLICT (user_id) DO NOTHING",
        )
        .bind(user_id)
        .execute(&mut *self.tx)
        .await
        .map_err(|err| {
            if violates(&err, FOREIGN_KEY_VIOLATION) {
                LedgerError::NotFound(format!("user {user_id}"))
            } else {
                LedgerError::Storage(err)
            }
        })?;

        let row = sqlx::query_as::<_, WalletRow>(
            "SELECT user_id, balance, updated_at FROM wallets WHERE user_id = $1 FOR UPDATE",
        )
        .bind(user_id)
        .fetch_one(&mut *self.tx)
        .await?;

        Ok(row.into())
    }

    async fn save_wallet(&mut self, wallet: &Wallet) -> Result<(), LedgerError> {
        let result = sqlx::query(
            "UPDATE wallets SET balance = $2, updated_at = $3 WHERE user_id = $1",
        )
        .bind(wallet.user_id)
        .bind(wallet.balance)
        .bind(wallet.updated_at)
        .execute(&mut *self.tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(LedgerError::NotFound(format!(
                "wallet for user {}",
                wallet.user_id
            )));
        }
        Ok(())
    }

    async fn save_status(
        &mut self,
        kind: TransactionKind,
        id: Uuid,
        status: TransactionStatus,
    ) -> Result<TransactionRecord, LedgerError> {
        let mut query_builder = QueryBuilder::<Postgres>::new("UPDATE ");
        query_builder
            .push(table(kind))
            .push(" SET status = ")
            .push_bind(status.as_str())
            .push(", updated_at = NOW() WHERE id = ")
            .push_bind(id);

        let result = query_builder.build().execute(&mut *self.tx).await?;
        if result.rows_affected() == 0 {
            return Err(LedgerError::NotFound(format!("{kind} {id}")));
        }

        let sql = format!("{} WHERE id = $1", select_columns(kind));
        let row = sqlx::query_as::<_, TransactionRow>(&sql)
            .bind(id)
            .fetch_one(&mut *self.tx)
            .await?;
        row.into_record(kind)
    }

    async fn commit(self: Box<Self>) -> Result<(), LedgerError> {
        self.tx.commit().await?;
        Ok(())
    }
}
