use std::sync::Arc;

use rust_decimal::Decimal;
use serde::Deserialize;
use uuid::Uuid;

use super::reference::{ReferenceGenerator, MAX_REFERENCE_ATTEMPTS};
use crate::db::models::{TransactionDetails, TransactionKind, TransactionRecord};
use crate::db::store::LedgerStore;
use crate::error::LedgerError;

const MAX_AMOUNT_SCALE: u32 = 2;
const MAX_METHOD_LEN: usize = 64;
const MAX_TEXT_LEN: usize = 255;
// inserts racing on the same reference get a fresh one this many times
const MAX_INSERT_ATTEMPTS: usize = 3;

fn max_amount() -> Decimal {
    // 12 digits, 2 of them decimal
    Decimal::new(999_999_999_999, 2)
}

#[derive(Debug, Default, Deserialize)]
pub struct DepositRequest {
    pub amount: Option<Decimal>,
    pub method: Option<String>,
    pub proof: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct WithdrawalRequest {
    pub amount: Option<Decimal>,
    pub address: Option<String>,
}

pub fn validate_amount(amount: Option<Decimal>) -> Result<Decimal, LedgerError> {
    let amount = amount.ok_or_else(|| LedgerError::Validation("Amount is required".to_string()))?;

    if amount <= Decimal::ZERO {
        return Err(LedgerError::Validation(
            "Amount must be greater than zero".to_string(),
        ));
    }
    if amount.normalize().scale() > MAX_AMOUNT_SCALE {
        return Err(LedgerError::Validation(format!(
            "Amount must have at most {MAX_AMOUNT_SCALE} decimal places"
        )));
    }
    if amount > max_amount() {
        return Err(LedgerError::Validation(format!(
            "Amount must not exceed {}",
            max_amount()
        )));
    }

    Ok(amount.round_dp(MAX_AMOUNT_SCALE))
}

fn required_text(
    value: Option<String>,
    field: &str,
    max_len: usize,
) -> Result<String, LedgerError> {
    let value = value
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .ok_or_else(|| LedgerError::Validation(format!("{field} is required")))?;

    if value.chars().count() > max_len {
        return Err(LedgerError::Validation(format!(
            "{field} must be at most {max_len} characters"
        )));
    }
    Ok(value)
}

/// Validates incoming deposit/withdrawal requests and records them as pending.
pub struct TransactionRequests {
    store: Arc<dyn LedgerStore>,
    references: ReferenceGenerator,
}

impl TransactionRequests {
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        Self::with_reference_attempts(store, MAX_REFERENCE_ATTEMPTS)
    }

    pub fn with_reference_attempts(store: Arc<dyn LedgerStore>, attempts: usize) -> Self {
        Self {
            store,
            references: ReferenceGenerator::new(attempts),
        }
    }

    pub async fn create_deposit(
        &self,
        user_id: Uuid,
        request: DepositRequest,
    ) -> Result<TransactionRecord, LedgerError> {
        let amount = validate_amount(request.amount)?;
        let method = required_text(request.method, "Payment method", MAX_METHOD_LEN)?;
        let proof = match request.proof {
            Some(proof) if !proof.trim().is_empty() => {
                Some(required_text(Some(proof), "Proof of payment", MAX_TEXT_LEN)?)
            }
            _ => None,
        };

        self.record_pending(user_id, amount, TransactionDetails::Deposit { method, proof })
            .await
    }

    pub async fn create_withdrawal(
        &self,
        user_id: Uuid,
        request: WithdrawalRequest,
    ) -> Result<TransactionRecord, LedgerError> {
        let amount = validate_amount(request.amount)?;
        let address = required_text(request.address, "Withdrawal address", MAX_TEXT_LEN)?;

        self.record_pending(user_id, amount, TransactionDetails::Withdrawal { address })
            .await
    }

    async fn record_pending(
        &self,
        user_id: Uuid,
        amount: Decimal,
        details: TransactionDetails,
    ) -> Result<TransactionRecord, LedgerError> {
        let kind = match details {
            TransactionDetails::Deposit { .. } => TransactionKind::Deposit,
            TransactionDetails::Withdrawal { .. } => TransactionKind::Withdrawal,
        };

        let mut attempt = 0;
        loop {
            attempt += 1;
            let store = self.store.as_ref();
            let reference = self
                .references
                .generate(|candidate| async move { store.reference_exists(kind, &candidate).await })
                .await?;
            let record = TransactionRecord::new_pending(user_id, reference, amount, details.clone());

            // the wallet is provisioned together with the user's first transaction
            let mut unit = self.store.begin().await?;
            unit.wallet_for_update(user_id).await?;
            match unit.insert_transaction(&record).await {
                Ok(()) => {
                    unit.commit().await?;
                    tracing::info!(
                        "Created pending {kind} {} for user {user_id}: {amount}",
                        record.reference
                    );
                    return Ok(record);
                }
                Err(LedgerError::ReferenceCollision(reference)) if attempt < MAX_INSERT_ATTEMPTS => {
                    tracing::warn!("Reference {reference} claimed concurrently, retrying");
                }
                Err(err) => return Err(err),
            }
        }
    }
}
