use crate::error::LedgerError;
use chrono::{DateTime, Datelike, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Represents a positive monetary amount for an operation request.
///
/// This is a wrapper around `rust_decimal::Decimal` that guarantees the
/// magnitude of a deposit, withdrawal or transfer is strictly positive.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
pub struct Amount(Decimal);

impl Amount {
    pub fn new(value: Decimal) -> Result<Self, LedgerError> {
        if value > Decimal::ZERO {
            Ok(Self(value))
        } else {
            Err(LedgerError::BadRequest(
                "amount must be greater than zero".to_string(),
            ))
        }
    }

    pub fn value(&self) -> Decimal {
        self.0
    }
}

impl TryFrom<Decimal> for Amount {
    type Error = LedgerError;

    fn try_from(value: Decimal) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Amount> for Decimal {
    fn from(amount: Amount) -> Self {
        amount.0
    }
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AccountKind {
    Saving,
    Current,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AccountStatus {
    Open,
    Frozen,
    Closed,
}

/// A monetary account owned by a single user.
///
/// The balance is only ever mutated by the ledger engine through `credit`
/// and `debit`; everything else is immutable after issuance except `status`.
/// `version` is an optimistic-concurrency counter bumped by the store on
/// every successful save.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct Account {
    /// Store-assigned internal id. Zero until first saved.
    pub id: u64,
    /// Human-facing account number, unique and immutable once issued.
    pub number: String,
    pub kind: AccountKind,
    pub status: AccountStatus,
    /// Non-negative balance, the net effect of all SUCCESS transactions.
    pub balance: Decimal,
    /// Owner identity (email), the unit of authorization for
    /// non-privileged callers.
    pub owner: String,
    pub created_at: DateTime<Utc>,
    pub version: u64,
}

impl Account {
    /// Creates a new open account with a zero balance, not yet persisted.
    pub fn open(number: String, kind: AccountKind, owner: String) -> Self {
        Self {
            id: 0,
            number,
            kind,
            status: AccountStatus::Open,
            balance: Decimal::ZERO,
            owner,
            created_at: Utc::now(),
            version: 0,
        }
    }

    /// Adds funds to the balance.
    pub fn credit(&mut self, amount: Amount) {
        self.balance += amount.value();
    }

    /// Removes funds from the balance if sufficient.
    pub fn debit(&mut self, amount: Amount) -> Result<(), LedgerError> {
        if self.balance < amount.value() {
            return Err(LedgerError::BadRequest("insufficient balance".to_string()));
        }
        self.balance -= amount.value();
        Ok(())
    }
}

/// Formats an account number from a store-issued sequence value,
/// e.g. `ACC-2026-000042`.
pub fn format_account_number(sequence: u64) -> String {
    format!("ACC-{}-{:06}", Utc::now().year(), sequence)
}
