use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::models::{
    Performance, TransactionFilter, TransactionKind, TransactionRecord, TransactionStatus, Wallet,
    WalletSummary,
};
use crate::error::LedgerError;

/// Durable storage of wallets and transactions.
///
/// Reads outside a unit of work are unlocked snapshots. Anything that writes
/// goes through [`LedgerStore::begin`].
#[async_trait]
pub trait LedgerStore: Send + Sync {
    async fn begin(&self) -> Result<Box<dyn LedgerUnit>, LedgerError>;

    async fn reference_exists(
        &self,
        kind: TransactionKind,
        reference: &str,
    ) -> Result<bool, LedgerError>;

    async fn wallet(&self, user_id: Uuid) -> Result<Option<Wallet>, LedgerError>;

    async fn find_transaction(
        &self,
        kind: TransactionKind,
        id: Uuid,
    ) -> Result<Option<TransactionRecord>, LedgerError>;

    /// Newest first.
    async fn list_transactions(
        &self,
        user_id: Uuid,
        filter: &TransactionFilter,
    ) -> Result<Vec<TransactionRecord>, LedgerError>;

    async fn summary(&self, user_id: Uuid) -> Result<WalletSummary, LedgerError>;

    /// Approved totals per day for transactions created at or after `since`.
    async fn performance(
        &self,
        user_id: Uuid,
        since: DateTime<Utc>,
    ) -> Result<Performance, LedgerError>;
}

/// One atomic scope. Rows read through the `*_for_update` methods stay locked
/// until the unit is committed or dropped; dropping without `commit` rolls
/// every write back.
#[async_trait]
pub trait LedgerUnit: Send {
    async fn insert_transaction(&mut self, record: &TransactionRecord) -> Result<(), LedgerError>;

    async fn transaction_for_update(
        &mut self,
        kind: TransactionKind,
        id: Uuid,
    ) -> Result<Option<TransactionRecord>, LedgerError>;

    /// Get-or-create: a missing wallet is provisioned with a zero balance.
    async fn wallet_for_update(&mut self, user_id: Uuid) -> Result<Wallet, LedgerError>;

    async fn save_wallet(&mut self, wallet: &Wallet) -> Result<(), LedgerError>;

    /// Returns the record as persisted, with a fresh `updated_at`.
    async fn save_status(
        &mut self,
        kind: TransactionKind,
        id: Uuid,
        status: TransactionStatus,
    ) -> Result<TransactionRecord, LedgerError>;

    async fn commit(self: Box<Self>) -> Result<(), LedgerError>;
}
