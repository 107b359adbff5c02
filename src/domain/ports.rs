use crate::domain::account::Account;
use crate::domain::audit::{AuditAction, AuditEntityType, AuditEvent};
use crate::domain::statement::{Page, PageRequest, StatementQuery};
use crate::domain::transaction::TransactionRecord;
use crate::error::Result;
use async_trait::async_trait;

pub type AccountStoreBox = Box<dyn AccountStore>;
pub type TransactionStoreBox = Box<dyn TransactionStore>;
pub type AuditSinkBox = Box<dyn AuditSink>;

/// Both sides of a transfer as committed by the store.
#[derive(Debug, Clone)]
pub struct TransferCommit {
    pub source: Account,
    pub dest: Account,
    pub debit: TransactionRecord,
    pub credit: TransactionRecord,
}

/// Store port for account records.
///
/// `save` assigns an id to unsaved accounts (id 0), bumps the version
/// counter, and fails with `Conflict` when the persisted version differs
/// from the one the caller loaded.
#[async_trait]
pub trait AccountStore: Send + Sync {
    async fn save(&self, account: Account) -> Result<Account>;

    /// Persists a mutated account together with the terminal transaction
    /// record describing the mutation, as one unit: either both rows are
    /// stored or neither is. A balance change is never visible without its
    /// terminal record, and vice versa.
    async fn commit(
        &self,
        account: Account,
        record: TransactionRecord,
    ) -> Result<(Account, TransactionRecord)>;

    /// Persists both sides of a transfer atomically: two version-checked
    /// account updates plus their terminal legs, applied in deterministic
    /// account-number order. Nothing is stored unless everything is.
    async fn commit_transfer(
        &self,
        source: Account,
        dest: Account,
        debit: TransactionRecord,
        credit: TransactionRecord,
    ) -> Result<TransferCommit>;

    async fn find_by_number(&self, number: &str) -> Result<Option<Account>>;

    async fn find_by_id(&self, id: u64) -> Result<Option<Account>>;

    async fn all_accounts(&self) -> Result<Vec<Account>>;

    /// Issues the next value of the account-number sequence.
    async fn next_sequence(&self) -> Result<u64>;
}

/// Store port for transaction records.
///
/// `save` assigns an id to unsaved records and enforces reference-number
/// uniqueness; updates to a stored record are matched by id.
#[async_trait]
pub trait TransactionStore: Send + Sync {
    async fn save(&self, record: TransactionRecord) -> Result<TransactionRecord>;

    async fn find_by_id(&self, id: u64) -> Result<Option<TransactionRecord>>;

    /// Filtered, paged statement query for one account, newest first.
    async fn filter_statements(
        &self,
        account_number: &str,
        query: &StatementQuery,
        page: PageRequest,
    ) -> Result<Page<TransactionRecord>>;
}

/// Append-only sink for operation outcomes. Fire-and-forget from the
/// engine's perspective: a failed audit write never rolls back the
/// financial mutation.
#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn record(&self, event: AuditEvent) -> Result<()>;

    async fn record_success(
        &self,
        action: AuditAction,
        entity_type: AuditEntityType,
        entity_id: Option<u64>,
        description: String,
    ) -> Result<()> {
        self.record(AuditEvent::success(action, entity_type, entity_id, description))
            .await
    }

    async fn record_failure(
        &self,
        action: AuditAction,
        entity_type: AuditEntityType,
        entity_id: Option<u64>,
        description: String,
    ) -> Result<()> {
        self.record(AuditEvent::failure(action, entity_type, entity_id, description))
            .await
    }
}
