use crate::domain::account::Account;
use crate::domain::audit::AuditEvent;
use crate::domain::ports::{AccountStore, AuditSink, TransactionStore, TransferCommit};
use crate::domain::statement::{Page, PageRequest, StatementQuery};
use crate::domain::transaction::TransactionRecord;
use crate::error::{LedgerError, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Default)]
struct AccountState {
    by_id: HashMap<u64, Account>,
    number_index: HashMap<String, u64>,
    next_id: u64,
    sequence: u64,
}

impl AccountState {
    fn check_version(&self, account: &Account) -> Result<()> {
        let stored = self
            .by_id
            .get(&account.id)
            .ok_or_else(|| LedgerError::NotFound(format!("account with id {}", account.id)))?;
        if stored.version != account.version {
            return Err(LedgerError::Conflict(format!(
                "account {} was modified concurrently",
                account.number
            )));
        }
        Ok(())
    }

    /// Version-checked upsert shared by `save` and the commit paths.
    fn put(&mut self, mut account: Account) -> Result<Account> {
        if account.id == 0 {
            if self.number_index.contains_key(&account.number) {
                return Err(LedgerError::Conflict(format!(
                    "account number {} already exists",
                    account.number
                )));
            }
            self.next_id += 1;
            account.id = self.next_id;
        } else {
            self.check_version(&account)?;
        }
        account.version += 1;
        self.number_index.insert(account.number.clone(), account.id);
        self.by_id.insert(account.id, account.clone());
        Ok(account)
    }
}

#[derive(Default)]
struct TransactionState {
    by_id: HashMap<u64, TransactionRecord>,
    reference_index: HashMap<String, u64>,
    next_id: u64,
}

impl TransactionState {
    /// Everything `put` would reject, checked without mutating. Lets the
    /// commit paths validate all rows before touching any of them.
    fn precheck(&self, record: &TransactionRecord) -> Result<()> {
        if record.id == 0 {
            if self.reference_index.contains_key(&record.reference_number) {
                return Err(LedgerError::Conflict(format!(
                    "reference number {} already exists",
                    record.reference_number
                )));
            }
        } else if !self.by_id.contains_key(&record.id) {
            return Err(LedgerError::NotFound(format!(
                "transaction with id {}",
                record.id
            )));
        }
        Ok(())
    }

    fn put(&mut self, mut record: TransactionRecord) -> Result<TransactionRecord> {
        self.precheck(&record)?;
        if record.id == 0 {
            self.next_id += 1;
            record.id = self.next_id;
            self.reference_index
                .insert(record.reference_number.clone(), record.id);
        }
        self.by_id.insert(record.id, record.clone());
        Ok(record)
    }
}

#[derive(Default)]
struct LedgerState {
    accounts: AccountState,
    transactions: TransactionState,
}

/// A thread-safe in-memory store for accounts and transaction records.
///
/// One `Arc<RwLock<..>>` over both entity maps, so a balance write and its
/// terminal transaction record commit under the same lock. Enforces the
/// optimistic version discipline the engine relies on and reference-number
/// uniqueness across all records. `Clone` shares the state.
#[derive(Default, Clone)]
pub struct InMemoryStore {
    state: Arc<RwLock<LedgerState>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a pre-built account, assigning its id. Used by the CLI seed
    /// path and tests.
    pub async fn seed(&self, account: Account) -> Result<Account> {
        let mut state = self.state.write().await;
        state.accounts.put(account)
    }
}

#[async_trait]
impl AccountStore for InMemoryStore {
    async fn save(&self, account: Account) -> Result<Account> {
        let mut state = self.state.write().await;
        state.accounts.put(account)
    }

    async fn commit(
        &self,
        account: Account,
        record: TransactionRecord,
    ) -> Result<(Account, TransactionRecord)> {
        let mut state = self.state.write().await;
        // All checks before any mutation, so a version conflict leaves the
        // record row exactly as it was.
        state.transactions.precheck(&record)?;
        let account = state.accounts.put(account)?;
        let record = state.transactions.put(record)?;
        Ok((account, record))
    }

    async fn commit_transfer(
        &self,
        source: Account,
        dest: Account,
        debit: TransactionRecord,
        credit: TransactionRecord,
    ) -> Result<TransferCommit> {
        // Deterministic account order avoids deadlocks between opposite
        // transfers on stores with row-level locking; one write lock makes
        // the whole commit atomic here.
        let mut state = self.state.write().await;
        let (a, b) = if source.number <= dest.number {
            (&source, &dest)
        } else {
            (&dest, &source)
        };
        state.accounts.check_version(a)?;
        state.accounts.check_version(b)?;
        state.transactions.precheck(&debit)?;
        state.transactions.precheck(&credit)?;

        let source = state.accounts.put(source)?;
        let dest = state.accounts.put(dest)?;
        let debit = state.transactions.put(debit)?;
        let credit = state.transactions.put(credit)?;
        Ok(TransferCommit {
            source,
            dest,
            debit,
            credit,
        })
    }

    async fn find_by_number(&self, number: &str) -> Result<Option<Account>> {
        let state = self.state.read().await;
        Ok(state
            .accounts
            .number_index
            .get(number)
            .and_then(|id| state.accounts.by_id.get(id))
            .cloned())
    }

    async fn find_by_id(&self, id: u64) -> Result<Option<Account>> {
        let state = self.state.read().await;
        Ok(state.accounts.by_id.get(&id).cloned())
    }

    async fn all_accounts(&self) -> Result<Vec<Account>> {
        let state = self.state.read().await;
        let mut accounts: Vec<Account> = state.accounts.by_id.values().cloned().collect();
        accounts.sort_by(|a, b| a.number.cmp(&b.number));
        Ok(accounts)
    }

    async fn next_sequence(&self) -> Result<u64> {
        let mut state = self.state.write().await;
        state.accounts.sequence += 1;
        Ok(state.accounts.sequence)
    }
}

#[async_trait]
impl TransactionStore for InMemoryStore {
    async fn save(&self, record: TransactionRecord) -> Result<TransactionRecord> {
        let mut state = self.state.write().await;
        state.transactions.put(record)
    }

    async fn find_by_id(&self, id: u64) -> Result<Option<TransactionRecord>> {
        let state = self.state.read().await;
        Ok(state.transactions.by_id.get(&id).cloned())
    }

    async fn filter_statements(
        &self,
        account_number: &str,
        query: &StatementQuery,
        page: PageRequest,
    ) -> Result<Page<TransactionRecord>> {
        let state = self.state.read().await;
        let mut matches: Vec<TransactionRecord> = state
            .transactions
            .by_id
            .values()
            .filter(|record| record.account_number == account_number)
            .filter(|record| query.from_date.is_none_or(|from| record.created_at >= from))
            .filter(|record| query.to_date.is_none_or(|to| record.created_at <= to))
            .filter(|record| query.min_amount.is_none_or(|min| record.amount >= min))
            .filter(|record| query.max_amount.is_none_or(|max| record.amount <= max))
            .cloned()
            .collect();
        // Newest first; id breaks ties for records created in the same tick.
        matches.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));

        let total = matches.len();
        let items = matches
            .into_iter()
            .skip(page.offset())
            .take(page.size)
            .collect();
        Ok(Page {
            items,
            page: page.page,
            size: page.size,
            total,
        })
    }
}

/// An in-memory audit sink recording events for inspection.
#[derive(Default, Clone)]
pub struct MemoryAuditSink {
    events: Arc<RwLock<Vec<AuditEvent>>>,
}

impl MemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn events(&self) -> Vec<AuditEvent> {
        self.events.read().await.clone()
    }
}

#[async_trait]
impl AuditSink for MemoryAuditSink {
    async fn record(&self, event: AuditEvent) -> Result<()> {
        self.events.write().await.push(event);
        Ok(())
    }
}
