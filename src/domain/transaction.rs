use crate::domain::account::Account;
use crate::error::LedgerError;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionKind {
    Deposit,
    Withdraw,
    TransferDebit,
    TransferCredit,
}

/// Status lifecycle of a transaction record.
///
/// `Initiated` is set at record creation, `Pending` is used by transfers
/// only, and `Success`/`Failed` are terminal. A record in a terminal status
/// is never mutated again.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionStatus {
    Initiated,
    Pending,
    Success,
    Failed,
}

impl TransactionStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TransactionStatus::Success | TransactionStatus::Failed)
    }
}

/// One attempted balance-affecting operation on one account.
///
/// For transfers, two records (one debit leg, one credit leg) share a
/// `transfer_id`. `before_amount` snapshots the balance at creation and
/// `remaining_amount` equals it until the mutation succeeds.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct TransactionRecord {
    /// Store-assigned internal id. Zero until first saved.
    pub id: u64,
    /// Globally unique, caller-opaque reference number.
    pub reference_number: String,
    pub kind: TransactionKind,
    pub amount: Decimal,
    pub before_amount: Decimal,
    pub remaining_amount: Decimal,
    pub status: TransactionStatus,
    pub description: Option<String>,
    pub account_id: u64,
    pub account_number: String,
    /// Correlation key shared by the two legs of a transfer.
    pub transfer_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl TransactionRecord {
    /// Creates an `Initiated` record against `account`, snapshotting its
    /// current balance. The requested amount is recorded as-is, even when
    /// invalid, so that rejected requests still leave a trail.
    pub fn initiate(
        account: &Account,
        kind: TransactionKind,
        amount: Decimal,
        description: Option<String>,
        transfer_id: Option<String>,
    ) -> Self {
        Self {
            id: 0,
            reference_number: Uuid::new_v4().to_string(),
            kind,
            amount,
            before_amount: account.balance,
            remaining_amount: account.balance,
            status: TransactionStatus::Initiated,
            description,
            account_id: account.id,
            account_number: account.number.clone(),
            transfer_id,
            created_at: Utc::now(),
        }
    }

    /// Advances the status. Transitions out of a terminal status are
    /// invariant violations and rejected.
    pub fn transition(&mut self, next: TransactionStatus) -> Result<(), LedgerError> {
        if self.status.is_terminal() {
            return Err(LedgerError::Conflict(format!(
                "transaction {} already {:?}",
                self.reference_number, self.status
            )));
        }
        self.status = next;
        Ok(())
    }

    /// Records the post-mutation balance and marks the record `Success`.
    pub fn complete(&mut self, remaining: Decimal) -> Result<(), LedgerError> {
        self.remaining_amount = remaining;
        self.transition(TransactionStatus::Success)
    }
}

/// Generates a transfer correlation id, e.g. `TRF-1767225600000-<uuid>`.
pub fn new_transfer_id() -> String {
    format!("TRF-{}-{}", Utc::now().timestamp_millis(), Uuid::new_v4())
}
