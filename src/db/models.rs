use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

use crate::error::LedgerError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionKind {
    Deposit,
    Withdrawal,
}

impl TransactionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionKind::Deposit => "deposit",
            TransactionKind::Withdrawal => "withdrawal",
        }
    }
}

impl fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    Pending,
    Approved,
    Rejected,
}

impl TransactionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Pending => "pending",
            TransactionStatus::Approved => "approved",
            TransactionStatus::Rejected => "rejected",
        }
    }

    /// Approved and rejected records never change status again.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, TransactionStatus::Pending)
    }
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransactionStatus {
    type Err = LedgerError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "pending" => Ok(TransactionStatus::Pending),
            "approved" => Ok(TransactionStatus::Approved),
            "rejected" => Ok(TransactionStatus::Rejected),
            other => Err(LedgerError::Validation(format!(
                "Unknown transaction status: {other}"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BalanceDirection {
    Add,
    Subtract,
}

// NUMERIC(14, 2) in the wallets table
pub fn max_balance() -> Decimal {
    Decimal::new(99_999_999_999_999, 2)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Wallet {
    pub user_id: Uuid,
    pub balance: Decimal,
    pub updated_at: DateTime<Utc>,
}

impl Wallet {
    pub fn new(user_id: Uuid) -> Self {
        Self {
            user_id,
            balance: Decimal::ZERO,
            updated_at: Utc::now(),
        }
    }

    /// The only way a balance changes. A subtraction larger than the balance
    /// leaves the wallet untouched and reports `InsufficientBalance`; an
    /// addition past [`max_balance`] leaves it untouched too.
    pub fn update_balance(
        &mut self,
        amount: Decimal,
        direction: BalanceDirection,
    ) -> Result<Decimal, LedgerError> {
        if amount <= Decimal::ZERO {
            return Err(LedgerError::Validation(
                "Balance updates require a positive amount".to_string(),
            ));
        }

        self.balance = match direction {
            BalanceDirection::Add if self.balance + amount <= max_balance() => self.balance + amount,
            BalanceDirection::Add => {
                return Err(LedgerError::Validation(format!(
                    "Balance cannot exceed {}",
                    max_balance()
                )));
            }
            BalanceDirection::Subtract if self.balance >= amount => self.balance - amount,
            BalanceDirection::Subtract => {
                return Err(LedgerError::InsufficientBalance {
                    available: self.balance,
                    requested: amount,
                });
            }
        };
        self.updated_at = Utc::now();

        Ok(self.balance)
    }
}

/// Per-kind metadata carried by a transaction record.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum TransactionDetails {
    Deposit {
        method: String,
        proof: Option<String>,
    },
    Withdrawal {
        address: String,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransactionRecord {
    pub id: Uuid,
    #[serde(rename = "type")]
    pub kind: TransactionKind,
    pub user_id: Uuid,
    pub reference: String,
    pub amount: Decimal,
    pub status: TransactionStatus,
    #[serde(flatten)]
    pub details: TransactionDetails,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TransactionRecord {
    pub fn new_pending(
        user_id: Uuid,
        reference: String,
        amount: Decimal,
        details: TransactionDetails,
    ) -> Self {
        let now = Utc::now();
        let kind = match details {
            TransactionDetails::Deposit { .. } => TransactionKind::Deposit,
            TransactionDetails::Withdrawal { .. } => TransactionKind::Withdrawal,
        };
        Self {
            id: Uuid::new_v4(),
            kind,
            user_id,
            reference,
            amount,
            status: TransactionStatus::Pending,
            details,
            created_at: now,
            updated_at: now,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TransactionFilter {
    #[serde(rename = "type", default, deserialize_with = "kind_or_all")]
    pub kind: Option<TransactionKind>,
    pub status: Option<TransactionStatus>,
}

// `all` (or nothing) means both kinds
fn kind_or_all<'de, D>(deserializer: D) -> Result<Option<TransactionKind>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<String>::deserialize(deserializer)?.as_deref() {
        None | Some("") | Some("all") => Ok(None),
        Some("deposit") => Ok(Some(TransactionKind::Deposit)),
        Some("withdrawal") => Ok(Some(TransactionKind::Withdrawal)),
        Some(other) => Err(serde::de::Error::custom(format!(
            "unknown transaction type: {other}"
        ))),
    }
}

impl TransactionFilter {
    pub fn includes(&self, kind: TransactionKind) -> bool {
        self.kind.map_or(true, |wanted| wanted == kind)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WalletSummary {
    pub balance: Decimal,
    pub total_deposits: Decimal,
    pub total_withdrawals: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailyTotal {
    pub day: NaiveDate,
    pub total: Decimal,
}

/// Approved amounts per UTC day, oldest day first.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Performance {
    pub deposits: Vec<DailyTotal>,
    pub withdrawals: Vec<DailyTotal>,
}
