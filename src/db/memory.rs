use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

use super::models::{
    DailyTotal, Performance, TransactionFilter, TransactionKind, TransactionRecord,
    TransactionStatus, Wallet, WalletSummary,
};
use super::store::{LedgerStore, LedgerUnit};
use crate::error::LedgerError;

#[derive(Debug, Clone, Default)]
struct LedgerState {
    wallets: HashMap<Uuid, Wallet>,
    transactions: HashMap<(TransactionKind, Uuid), TransactionRecord>,
}

/// In-process ledger. A unit of work holds the whole state lock and edits a
/// private copy that replaces the shared state on commit, so units are
/// serialized and rollback is simply dropping the copy.
#[derive(Debug, Clone, Default)]
pub struct MemoryLedgerStore {
    state: Arc<Mutex<LedgerState>>,
}

impl MemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LedgerStore for MemoryLedgerStore {
    async fn begin(&self) -> Result<Box<dyn LedgerUnit>, LedgerError> {
        let guard = self.state.clone().lock_owned().await;
        let working = guard.clone();
        Ok(Box::new(MemoryUnit { guard, working }))
    }

    async fn reference_exists(
        &self,
        kind: TransactionKind,
        reference: &str,
    ) -> Result<bool, LedgerError> {
        let state = self.state.lock().await;
        Ok(state
            .transactions
            .values()
            .any(|record| record.kind == kind && record.reference == reference))
    }

    async fn wallet(&self, user_id: Uuid) -> Result<Option<Wallet>, LedgerError> {
        Ok(self.state.lock().await.wallets.get(&user_id).cloned())
    }

    async fn find_transaction(
        &self,
        kind: TransactionKind,
        id: Uuid,
    ) -> Result<Option<TransactionRecord>, LedgerError> {
        Ok(self.state.lock().await.transactions.get(&(kind, id)).cloned())
    }

    async fn list_transactions(
        &self,
        user_id: Uuid,
        filter: &TransactionFilter,
    ) -> Result<Vec<TransactionRecord>, LedgerError> {
        let state = self.state.lock().await;
        let mut records = state
            .transactions
            .values()
            .filter(|record| record.user_id == user_id)
            .filter(|record| filter.includes(record.kind))
            .filter(|record| filter.status.map_or(true, |status| record.status == status))
            .cloned()
            .collect::<Vec<_>>();
        records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(records)
    }

    async fn summary(&self, user_id: Uuid) -> Result<WalletSummary, LedgerError> {
        let state = self.state.lock().await;
        let approved_total = |kind: TransactionKind| {
            state
                .transactions
                .values()
                .filter(|record| {
                    record.user_id == user_id
                        && record.kind == kind
                        && record.status == TransactionStatus::Approved
                })
                .map(|record| record.amount)
                .sum::<Decimal>()
        };

        Ok(WalletSummary {
            balance: state
                .wallets
                .get(&user_id)
                .map_or(Decimal::ZERO, |wallet| wallet.balance),
            total_deposits: approved_total(TransactionKind::Deposit),
            total_withdrawals: approved_total(TransactionKind::Withdrawal),
        })
    }

    async fn performance(
        &self,
        user_id: Uuid,
        since: DateTime<Utc>,
    ) -> Result<Performance, LedgerError> {
        let state = self.state.lock().await;
        let by_day = |kind: TransactionKind| {
            let mut days = BTreeMap::new();
            for record in state.transactions.values().filter(|record| {
                record.user_id == user_id
                    && record.kind == kind
                    && record.status == TransactionStatus::Approved
                    && record.created_at >= since
            }) {
                *days
                    .entry(record.created_at.date_naive())
                    .or_insert(Decimal::ZERO) += record.amount;
            }
            days.into_iter()
                .map(|(day, total)| DailyTotal { day, total })
                .collect::<Vec<_>>()
        };

        Ok(Performance {
            deposits: by_day(TransactionKind::Deposit),
            withdrawals: by_day(TransactionKind::Withdrawal),
        })
    }
}

struct MemoryUnit {
    guard: OwnedMutexGuard<LedgerState>,
    working: LedgerState,
}

#[async_trait]
impl LedgerUnit for MemoryUnit {
    async fn insert_transaction(&mut self, record: &TransactionRecord) -> Result<(), LedgerError> {
        let taken = self
            .working
            .transactions
            .values()
            .any(|existing| existing.kind == record.kind && existing.reference == record.reference);
        if taken {
            return Err(LedgerError::ReferenceCollision(record.reference.clone()));
        }

        self.working
            .transactions
            .insert((record.kind, record.id), record.clone());
        Ok(())
    }

    async fn transaction_for_update(
        &mut self,
        kind: TransactionKind,
        id: Uuid,
    ) -> Result<Option<TransactionRecord>, LedgerError> {
        Ok(self.working.transactions.get(&(kind, id)).cloned())
    }

    async fn wallet_for_update(&mut self, user_id: Uuid) -> Result<Wallet, LedgerError> {
        Ok(self
            .working
            .wallets
            .entry(user_id)
            .or_insert_with(|| Wallet::new(user_id))
            .clone())
    }

    async fn save_wallet(&mut self, wallet: &Wallet) -> Result<(), LedgerError> {
        match self.working.wallets.get_mut(&wallet.user_id) {
            Some(stored) => {
                *stored = wallet.clone();
                Ok(())
            }
            None => Err(LedgerError::NotFound(format!(
                "wallet for user {}",
                wallet.user_id
            ))),
        }
    }

    async fn save_status(
        &mut self,
        kind: TransactionKind,
        id: Uuid,
        status: TransactionStatus,
    ) -> Result<TransactionRecord, LedgerError> {
        let record = self
            .working
            .transactions
            .get_mut(&(kind, id))
            .ok_or_else(|| LedgerError::NotFound(format!("{kind} {id}")))?;
        record.status = status;
        record.updated_at = Utc::now();
        Ok(record.clone())
    }

    async fn commit(self: Box<Self>) -> Result<(), LedgerError> {
        let MemoryUnit { mut guard, working } = *self;
        *guard = working;
        Ok(())
    }
}
