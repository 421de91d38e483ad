use std::sync::Arc;

use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::json;
use uuid::Uuid;

use crate::db::models::{BalanceDirection, TransactionKind, TransactionRecord, TransactionStatus};
use crate::db::store::LedgerStore;
use crate::error::LedgerError;
use crate::notify::{NotificationDispatcher, Severity};

/// What a call to [`StatusEngine::set_status`] did.
#[derive(Debug, Clone, Serialize)]
pub struct TransitionOutcome {
    pub transaction: TransactionRecord,
    pub previous: TransactionStatus,
    pub requested: TransactionStatus,
    /// False when the request repeated the persisted status.
    pub changed: bool,
    /// An approval that became a rejection for lack of funds.
    pub downgraded: bool,
    /// Wallet balance after the transition, when the wallet was touched.
    pub balance: Option<Decimal>,
}

pub struct StatusEngine {
    store: Arc<dyn LedgerStore>,
    dispatcher: Arc<dyn NotificationDispatcher>,
}

impl StatusEngine {
    pub fn new(store: Arc<dyn LedgerStore>, dispatcher: Arc<dyn NotificationDispatcher>) -> Self {
        Self { store, dispatcher }
    }

    /// Moves a transaction out of `pending`.
    ///
    /// The record and the owner's wallet are locked, the balance is updated
    /// and the status written in one unit of work. Approving a withdrawal the
    /// wallet cannot cover stores `rejected` instead and reports
    /// `downgraded`. Repeating the persisted status is a no-op; any other
    /// change to an approved or rejected record is an `InvalidTransition`.
    /// Notifications go out only after the commit.
    pub async fn set_status(
        &self,
        kind: TransactionKind,
        id: Uuid,
        requested: TransactionStatus,
    ) -> Result<TransitionOutcome, LedgerError> {
        let mut unit = self.store.begin().await?;

        let current = unit
            .transaction_for_update(kind, id)
            .await?
            .ok_or_else(|| LedgerError::NotFound(format!("{kind} {id}")))?;
        let previous = current.status;

        if previous == requested {
            tracing::debug!("{kind} {} already {previous}", current.reference);
            return Ok(TransitionOutcome {
                transaction: current,
                previous,
                requested,
                changed: false,
                downgraded: false,
                balance: None,
            });
        }
        if previous.is_terminal() || requested == TransactionStatus::Pending {
            return Err(LedgerError::InvalidTransition {
                from: previous,
                to: requested,
            });
        }

        let mut wallet = unit.wallet_for_update(current.user_id).await?;
        let mut applied = requested;
        let mut balance = None;

        if requested == TransactionStatus::Approved {
            let direction = match kind {
                TransactionKind::Deposit => BalanceDirection::Add,
                TransactionKind::Withdrawal => BalanceDirection::Subtract,
            };

            match wallet.update_balance(current.amount, direction) {
                Ok(new_balance) => {
                    unit.save_wallet(&wallet).await?;
                    balance = Some(new_balance);
                }
                Err(LedgerError::InsufficientBalance {
                    available,
                    requested: amount,
                }) => {
                    tracing::warn!(
                        "Withdrawal {} of {amount} exceeds balance {available}, rejecting",
                        current.reference
                    );
                    applied = TransactionStatus::Rejected;
                }
                Err(err) => return Err(err),
            }
        }

        let transaction = unit.save_status(kind, id, applied).await?;
        unit.commit().await?;

        tracing::info!(
            "{kind} {} moved from {previous} to {applied}",
            transaction.reference
        );
        self.dispatch(&transaction, balance);

        Ok(TransitionOutcome {
            transaction,
            previous,
            requested,
            changed: true,
            downgraded: applied != requested,
            balance,
        })
    }

    fn dispatch(&self, transaction: &TransactionRecord, balance: Option<Decimal>) {
        let kind = transaction.kind;
        let status = transaction.status;
        let severity = match status {
            TransactionStatus::Approved => Severity::Success,
            _ => Severity::Error,
        };

        self.dispatcher.notify(
            transaction.user_id,
            &format!(
                "Your {kind} of {} has been {status}!",
                transaction.amount
            ),
            severity,
        );
        self.dispatcher.transaction_update(
            transaction.user_id,
            &format!("{kind}_{status}"),
            json!({
                "type": kind,
                "transaction": {
                    "id": transaction.id,
                    "reference": transaction.reference,
                    "type": kind,
                    "amount": transaction.amount,
                    "status": status,
                    "created_at": transaction.created_at,
                    "updated_at": transaction.updated_at,
                }
            }),
        );

        if status == TransactionStatus::Approved {
            if let Some(balance) = balance {
                self.dispatcher.balance_update(transaction.user_id, balance);
            }
        }
    }
}
