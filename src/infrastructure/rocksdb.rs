use crate::domain::account::Account;
use crate::domain::ports::{AccountStore, TransactionStore, TransferCommit};
use crate::domain::statement::{Page, PageRequest, StatementQuery};
use crate::domain::transaction::TransactionRecord;
use crate::error::{LedgerError, Result};
use async_trait::async_trait;
use rocksdb::{ColumnFamilyDescriptor, DB, Options, WriteBatch};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Column family for account states, keyed by internal id.
pub const CF_ACCOUNTS: &str = "accounts";
/// Column family mapping account numbers to internal ids.
pub const CF_ACCOUNT_NUMBERS: &str = "account_numbers";
/// Column family for transaction records, keyed by internal id.
pub const CF_TRANSACTIONS: &str = "transactions";
/// Column family mapping reference numbers to transaction ids.
pub const CF_REFERENCES: &str = "references";
/// Column family for id and sequence counters.
pub const CF_META: &str = "meta";

const KEY_ACCOUNT_ID: &[u8] = b"account_id";
const KEY_ACCOUNT_SEQ: &[u8] = b"account_seq";
const KEY_TRANSACTION_ID: &[u8] = b"transaction_id";

/// A persistent store implementation using RocksDB.
///
/// Accounts and transactions live in separate column families with JSON
/// values; secondary index families resolve account numbers and reference
/// numbers to internal ids. Writes are serialized through one mutex so the
/// read-compare-write version check stays atomic. `Clone` shares the
/// underlying `Arc<DB>`.
#[derive(Clone)]
pub struct RocksDbStore {
    db: Arc<DB>,
    write_guard: Arc<Mutex<()>>,
}

impl RocksDbStore {
    /// Opens or creates a RocksDB instance at the specified path, ensuring
    /// all required column families exist.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let cfs = [
            CF_ACCOUNTS,
            CF_ACCOUNT_NUMBERS,
            CF_TRANSACTIONS,
            CF_REFERENCES,
            CF_META,
        ]
        .into_iter()
        .map(|name| ColumnFamilyDescriptor::new(name, Options::default()))
        .collect::<Vec<_>>();

        let db = DB::open_cf_descriptors(&opts, path, cfs)
            .map_err(LedgerError::internal)?;

        Ok(Self {
            db: Arc::new(db),
            write_guard: Arc::new(Mutex::new(())),
        })
    }

    fn cf(&self, name: &str) -> Result<&rocksdb::ColumnFamily> {
        self.db.cf_handle(name).ok_or_else(|| {
            LedgerError::internal(std::io::Error::other(format!(
                "column family {name} not found"
            )))
        })
    }

    fn next_counter(&self, key: &[u8]) -> Result<u64> {
        let cf = self.cf(CF_META)?;
        let current = self
            .db
            .get_cf(&cf, key)
            .map_err(LedgerError::internal)?
            .map(|bytes| {
                let mut buf = [0u8; 8];
                buf.copy_from_slice(&bytes);
                u64::from_be_bytes(buf)
            })
            .unwrap_or(0);
        let next = current + 1;
        self.db
            .put_cf(&cf, key, next.to_be_bytes())
            .map_err(LedgerError::internal)?;
        Ok(next)
    }

    fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        cf_name: &str,
        key: &[u8],
    ) -> Result<Option<T>> {
        let cf = self.cf(cf_name)?;
        match self.db.get_cf(&cf, key).map_err(LedgerError::internal)? {
            Some(bytes) => {
                let value = serde_json::from_slice(&bytes).map_err(LedgerError::internal)?;
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }

    fn account_by_id(&self, id: u64) -> Result<Option<Account>> {
        self.get_json(CF_ACCOUNTS, &id.to_be_bytes())
    }

    /// Version check plus batched write of the account row and its number
    /// index entry. Caller must hold the write guard.
    fn stage_account(&self, batch: &mut WriteBatch, mut account: Account) -> Result<Account> {
        if account.id == 0 {
            let number_cf = self.cf(CF_ACCOUNT_NUMBERS)?;
            if self
                .db
                .get_cf(&number_cf, account.number.as_bytes())
                .map_err(LedgerError::internal)?
                .is_some()
            {
                return Err(LedgerError::Conflict(format!(
                    "account number {} already exists",
                    account.number
                )));
            }
            account.id = self.next_counter(KEY_ACCOUNT_ID)?;
        } else {
            let stored = self.account_by_id(account.id)?.ok_or_else(|| {
                LedgerError::NotFound(format!("account with id {}", account.id))
            })?;
            if stored.version != account.version {
                return Err(LedgerError::Conflict(format!(
                    "account {} was modified concurrently",
                    account.number
                )));
            }
        }
        account.version += 1;

        let value = serde_json::to_vec(&account).map_err(LedgerError::internal)?;
        batch.put_cf(&self.cf(CF_ACCOUNTS)?, account.id.to_be_bytes(), value);
        batch.put_cf(
            &self.cf(CF_ACCOUNT_NUMBERS)?,
            account.number.as_bytes(),
            account.id.to_be_bytes(),
        );
        Ok(account)
    }

    /// Reference-uniqueness check plus batched write of the record row and
    /// its reference index entry. Caller must hold the write guard.
    fn stage_record(
        &self,
        batch: &mut WriteBatch,
        mut record: TransactionRecord,
    ) -> Result<TransactionRecord> {
        if record.id == 0 {
            let refs_cf = self.cf(CF_REFERENCES)?;
            if self
                .db
                .get_cf(&refs_cf, record.reference_number.as_bytes())
                .map_err(LedgerError::internal)?
                .is_some()
            {
                return Err(LedgerError::Conflict(format!(
                    "reference number {} already exists",
                    record.reference_number
                )));
            }
            record.id = self.next_counter(KEY_TRANSACTION_ID)?;
        } else if self
            .get_json::<TransactionRecord>(CF_TRANSACTIONS, &record.id.to_be_bytes())?
            .is_none()
        {
            return Err(LedgerError::NotFound(format!(
                "transaction with id {}",
                record.id
            )));
        }

        let value = serde_json::to_vec(&record).map_err(LedgerError::internal)?;
        batch.put_cf(&self.cf(CF_TRANSACTIONS)?, record.id.to_be_bytes(), value);
        batch.put_cf(
            &self.cf(CF_REFERENCES)?,
            record.reference_number.as_bytes(),
            record.id.to_be_bytes(),
        );
        Ok(record)
    }
}

#[async_trait]
impl AccountStore for RocksDbStore {
    async fn save(&self, account: Account) -> Result<Account> {
        let _guard = self.write_guard.lock().await;
        let mut batch = WriteBatch::default();
        let account = self.stage_account(&mut batch, account)?;
        self.db.write(batch).map_err(LedgerError::internal)?;
        Ok(account)
    }

    async fn commit(
        &self,
        account: Account,
        record: TransactionRecord,
    ) -> Result<(Account, TransactionRecord)> {
        let _guard = self.write_guard.lock().await;
        // Account row and terminal record go into one batch; either write
        // commits both or neither.
        let mut batch = WriteBatch::default();
        let account = self.stage_account(&mut batch, account)?;
        let record = self.stage_record(&mut batch, record)?;
        self.db.write(batch).map_err(LedgerError::internal)?;
        Ok((account, record))
    }

    async fn commit_transfer(
        &self,
        source: Account,
        dest: Account,
        debit: TransactionRecord,
        credit: TransactionRecord,
    ) -> Result<TransferCommit> {
        let _guard = self.write_guard.lock().await;
        let mut batch = WriteBatch::default();
        // Deterministic account order; both accounts and both legs are
        // staged into one batch, so nothing is stored unless everything is.
        let (source, dest) = if source.number <= dest.number {
            let source = self.stage_account(&mut batch, source)?;
            let dest = self.stage_account(&mut batch, dest)?;
            (source, dest)
        } else {
            let dest = self.stage_account(&mut batch, dest)?;
            let source = self.stage_account(&mut batch, source)?;
            (source, dest)
        };
        let debit = self.stage_record(&mut batch, debit)?;
        let credit = self.stage_record(&mut batch, credit)?;
        self.db.write(batch).map_err(LedgerError::internal)?;
        Ok(TransferCommit {
            source,
            dest,
            debit,
            credit,
        })
    }

    async fn find_by_number(&self, number: &str) -> Result<Option<Account>> {
        let cf = self.cf(CF_ACCOUNT_NUMBERS)?;
        let id_bytes = self
            .db
            .get_cf(&cf, number.as_bytes())
            .map_err(LedgerError::internal)?;
        match id_bytes {
            Some(bytes) => {
                let mut buf = [0u8; 8];
                buf.copy_from_slice(&bytes);
                self.account_by_id(u64::from_be_bytes(buf))
            }
            None => Ok(None),
        }
    }

    async fn find_by_id(&self, id: u64) -> Result<Option<Account>> {
        self.account_by_id(id)
    }

    async fn all_accounts(&self) -> Result<Vec<Account>> {
        let cf = self.cf(CF_ACCOUNTS)?;
        let mut accounts = Vec::new();
        for item in self.db.iterator_cf(&cf, rocksdb::IteratorMode::Start) {
            let (_key, value) = item.map_err(LedgerError::internal)?;
            let account: Account =
                serde_json::from_slice(&value).map_err(LedgerError::internal)?;
            accounts.push(account);
        }
        accounts.sort_by(|a, b| a.number.cmp(&b.number));
        Ok(accounts)
    }

    async fn next_sequence(&self) -> Result<u64> {
        let _guard = self.write_guard.lock().await;
        self.next_counter(KEY_ACCOUNT_SEQ)
    }
}

#[async_trait]
impl TransactionStore for RocksDbStore {
    async fn save(&self, record: TransactionRecord) -> Result<TransactionRecord> {
        let _guard = self.write_guard.lock().await;
        let mut batch = WriteBatch::default();
        let record = self.stage_record(&mut batch, record)?;
        self.db.write(batch).map_err(LedgerError::internal)?;
        Ok(record)
    }

    async fn find_by_id(&self, id: u64) -> Result<Option<TransactionRecord>> {
        self.get_json(CF_TRANSACTIONS, &id.to_be_bytes())
    }

    async fn filter_statements(
        &self,
        account_number: &str,
        query: &StatementQuery,
        page: PageRequest,
    ) -> Result<Page<TransactionRecord>> {
        let cf = self.cf(CF_TRANSACTIONS)?;
        let mut matches = Vec::new();
        for item in self.db.iterator_cf(&cf, rocksdb::IteratorMode::Start) {
            let (_key, value) = item.map_err(LedgerError::internal)?;
            let record: TransactionRecord =
                serde_json::from_slice(&value).map_err(LedgerError::internal)?;
            if record.account_number != account_number {
                continue;
            }
            if query.from_date.is_some_and(|from| record.created_at < from)
                || query.to_date.is_some_and(|to| record.created_at > to)
                || query.min_amount.is_some_and(|min| record.amount < min)
                || query.max_amount.is_some_and(|max| record.amount > max)
            {
                continue;
            }
            matches.push(record);
        }
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
