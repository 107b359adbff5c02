use crate::domain::account::{Account, AccountKind, AccountStatus, Amount, format_account_number};
use crate::domain::audit::{AuditAction, AuditEntityType};
use crate::domain::ports::{AccountStoreBox, AuditSinkBox, TransactionStoreBox};
use crate::domain::statement::{Page, PageRequest, StatementQuery};
use crate::domain::transaction::{
    TransactionKind, TransactionRecord, TransactionStatus, new_transfer_id,
};
use crate::domain::validation::validate_ownership;
use crate::error::{LedgerError, Result};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::future::Future;
use std::time::Duration;
use tokio::time::timeout;

/// Identity of the party invoking an operation. Privileged callers may act
/// on any account; everyone else is subject to ownership checks.
#[derive(Debug, Clone)]
pub struct Caller {
    pub identity: String,
    pub privileged: bool,
}

impl Caller {
    pub fn user(identity: impl Into<String>) -> Self {
        Self {
            identity: identity.into(),
            privileged: false,
        }
    }

    pub fn privileged(identity: impl Into<String>) -> Self {
        Self {
            identity: identity.into(),
            privileged: true,
        }
    }
}

#[derive(Debug, Clone)]
pub struct DepositRequest {
    pub account_number: String,
    pub amount: Decimal,
    pub description: Option<String>,
}

#[derive(Debug, Clone)]
pub struct WithdrawRequest {
    pub account_number: String,
    pub amount: Decimal,
    pub description: Option<String>,
}

#[derive(Debug, Clone)]
pub struct TransferRequest {
    pub from_account_number: String,
    pub to_account_number: String,
    pub amount: Decimal,
    pub description: Option<String>,
}

/// Caller-facing summary of one transaction record.
#[derive(Debug, Clone, PartialEq)]
pub struct TransactionReceipt {
    pub kind: TransactionKind,
    pub amount: Decimal,
    pub status: TransactionStatus,
    pub before_balance: Decimal,
    pub after_balance: Decimal,
    pub reference_number: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<&TransactionRecord> for TransactionReceipt {
    fn from(record: &TransactionRecord) -> Self {
        Self {
            kind: record.kind,
            amount: record.amount,
            status: record.status,
            before_balance: record.before_amount,
            after_balance: record.remaining_amount,
            reference_number: record.reference_number.clone(),
            description: record.description.clone(),
            created_at: record.created_at,
        }
    }
}

/// Caller-facing summary of a completed transfer. Balances are those of the
/// source leg; the transfer id stays internal for reconciliation queries.
#[derive(Debug, Clone, PartialEq)]
pub struct TransferReceipt {
    pub from_account_number: String,
    pub to_account_number: String,
    pub amount: Decimal,
    pub before_balance: Decimal,
    pub after_balance: Decimal,
    pub debit_reference_number: String,
    pub credit_reference_number: String,
    pub description: Option<String>,
    pub status: TransactionStatus,
    pub created_at: DateTime<Utc>,
}

/// Privileged view of a transaction record, including the transfer id.
#[derive(Debug, Clone, PartialEq)]
pub struct TransactionDetails {
    pub id: u64,
    pub account_number: String,
    pub kind: TransactionKind,
    pub amount: Decimal,
    pub status: TransactionStatus,
    pub before_balance: Decimal,
    pub after_balance: Decimal,
    pub reference_number: String,
    pub description: Option<String>,
    pub transfer_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<&TransactionRecord> for TransactionDetails {
    fn from(record: &TransactionRecord) -> Self {
        Self {
            id: record.id,
            account_number: record.account_number.clone(),
            kind: record.kind,
            amount: record.amount,
            status: record.status,
            before_balance: record.before_amount,
            after_balance: record.remaining_amount,
            reference_number: record.reference_number.clone(),
            description: record.description.clone(),
            transfer_id: record.transfer_id.clone(),
            created_at: record.created_at,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct EngineConfig {
    /// Upper bound on any single store interaction. A timed-out operation
    /// is reported failed; no operation blocks indefinitely.
    pub store_timeout: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            store_timeout: Duration::from_secs(5),
        }
    }
}

/// The ledger engine: enacts deposit, withdraw and transfer, maintains the
/// balance/transaction invariants, and emits audit events.
///
/// The engine holds no locks of its own. Serialization is delegated to the
/// stores: account saves carry optimistic version checks and transfer pairs
/// are applied atomically in deterministic account order.
pub struct LedgerEngine {
    accounts: AccountStoreBox,
    transactions: TransactionStoreBox,
    audit: AuditSinkBox,
    config: EngineConfig,
}

impl LedgerEngine {
    pub fn new(
        accounts: AccountStoreBox,
        transactions: TransactionStoreBox,
        audit: AuditSinkBox,
    ) -> Self {
        Self::with_config(accounts, transactions, audit, EngineConfig::default())
    }

    pub fn with_config(
        accounts: AccountStoreBox,
        transactions: TransactionStoreBox,
        audit: AuditSinkBox,
        config: EngineConfig,
    ) -> Self {
        Self {
            accounts,
            transactions,
            audit,
            config,
        }
    }

    /// Deposits `request.amount` into the target account.
    ///
    /// A transaction record is persisted in `Initiated` status before any
    /// business rule runs, so every attempt leaves a durable trail. On
    /// failure the record is marked `Failed` and the balance is untouched.
    pub async fn deposit(
        &self,
        request: DepositRequest,
        caller: &Caller,
    ) -> Result<TransactionReceipt> {
        let account = self.require_account(&request.account_number).await?;
        let mut record = self
            .bounded(self.transactions.save(TransactionRecord::initiate(
                &account,
                TransactionKind::Deposit,
                request.amount,
                request.description.clone(),
                None,
            )))
            .await?;

        match self.apply_deposit(&account, &request, caller, &mut record).await {
            Ok(()) => {
                self.audit_success(
                    AuditAction::Deposit,
                    AuditEntityType::Transaction,
                    Some(record.id),
                    format!(
                        "deposited {} to account {}",
                        request.amount, account.number
                    ),
                )
                .await;
                tracing::info!(
                    account = %account.number,
                    amount = %request.amount,
                    reference = %record.reference_number,
                    "deposit succeeded"
                );
                Ok(TransactionReceipt::from(&record))
            }
            Err(err) => {
                self.fail_records(&mut [&mut record], AuditAction::Deposit, &err)
                    .await;
                Err(err)
            }
        }
    }

    async fn apply_deposit(
        &self,
        account: &Account,
        request: &DepositRequest,
        caller: &Caller,
        record: &mut TransactionRecord,
    ) -> Result<()> {
        if !caller.privileged {
            validate_ownership(account, &caller.identity)?;
        }
        let amount = positive_amount(request.amount, "deposit")?;

        let mut updated = account.clone();
        updated.credit(amount);
        // The balance write and the terminal row commit as one unit; on
        // failure the stored row is still the one `record` holds.
        let mut done = record.clone();
        done.complete(updated.balance)?;
        let (_, done) = self.bounded(self.accounts.commit(updated, done)).await?;
        *record = done;
        Ok(())
    }

    /// Withdraws `request.amount` from the target account, rejecting
    /// non-positive amounts and insufficient balances.
    pub async fn withdraw(
        &self,
        request: WithdrawRequest,
        caller: &Caller,
    ) -> Result<TransactionReceipt> {
        let account = self.require_account(&request.account_number).await?;
        let mut record = self
            .bounded(self.transactions.save(TransactionRecord::initiate(
                &account,
                TransactionKind::Withdraw,
                request.amount,
                request.description.clone(),
                None,
            )))
            .await?;

        match self.apply_withdraw(&account, &request, caller, &mut record).await {
            Ok(()) => {
                self.audit_success(
                    AuditAction::Withdraw,
                    AuditEntityType::Transaction,
                    Some(record.id),
                    format!(
                        "withdrew {} from account {}",
                        request.amount, account.number
                    ),
                )
                .await;
                tracing::info!(
                    account = %account.number,
                    amount = %request.amount,
                    reference = %record.reference_number,
                    "withdrawal succeeded"
                );
                Ok(TransactionReceipt::from(&record))
            }
            Err(err) => {
                self.fail_records(&mut [&mut record], AuditAction::Withdraw, &err)
                    .await;
                Err(err)
            }
        }
    }

    async fn apply_withdraw(
        &self,
        account: &Account,
        request: &WithdrawRequest,
        caller: &Caller,
        record: &mut TransactionRecord,
    ) -> Result<()> {
        if !caller.privileged {
            validate_ownership(account, &caller.identity)?;
        }
        let amount = positive_amount(request.amount, "withdraw")?;

        let mut updated = account.clone();
        updated.debit(amount)?;
        let mut done = record.clone();
        done.complete(updated.balance)?;
        let (_, done) = self.bounded(self.accounts.commit(updated, done)).await?;
        *record = done;
        Ok(())
    }

    /// Moves `request.amount` from the source account to the destination.
    ///
    /// Both transfer legs are persisted `Initiated` before validation so a
    /// rejected transfer still leaves a trail, transition through `Pending`
    /// once validation passes, and reach a terminal status together. The
    /// balance pair update is all-or-nothing.
    pub async fn transfer(
        &self,
        request: TransferRequest,
        caller: &Caller,
    ) -> Result<TransferReceipt> {
        let source = self.require_account(&request.from_account_number).await?;
        let dest = self.require_account(&request.to_account_number).await?;

        let transfer_id = new_transfer_id();
        let mut debit = self
            .bounded(self.transactions.save(TransactionRecord::initiate(
                &source,
                TransactionKind::TransferDebit,
                request.amount,
                request.description.clone(),
                Some(transfer_id.clone()),
            )))
            .await?;
        let mut credit = self
            .bounded(self.transactions.save(TransactionRecord::initiate(
                &dest,
                TransactionKind::TransferCredit,
                request.amount,
                request.description.clone(),
                Some(transfer_id),
            )))
            .await?;

        match self
            .apply_transfer(&source, &dest, &request, caller, &mut debit, &mut credit)
            .await
        {
            Ok(()) => {
                self.audit_success(
                    AuditAction::Transfer,
                    AuditEntityType::Transaction,
                    Some(debit.id),
                    format!(
                        "transferred {} from account {} to account {}",
                        request.amount, source.number, dest.number
                    ),
                )
                .await;
                tracing::info!(
                    from = %source.number,
                    to = %dest.number,
                    amount = %request.amount,
                    "transfer succeeded"
                );
                Ok(TransferReceipt {
                    from_account_number: request.from_account_number,
                    to_account_number: request.to_account_number,
                    amount: debit.amount,
                    before_balance: debit.before_amount,
                    after_balance: debit.remaining_amount,
                    debit_reference_number: debit.reference_number,
                    credit_reference_number: credit.reference_number,
                    description: debit.description,
                    status: debit.status,
                    created_at: debit.created_at,
                })
            }
            Err(err) => {
                self.fail_records(&mut [&mut debit, &mut credit], AuditAction::Transfer, &err)
                    .await;
                Err(err)
            }
        }
    }

    async fn apply_transfer(
        &self,
        source: &Account,
        dest: &Account,
        request: &TransferRequest,
        caller: &Caller,
        debit: &mut TransactionRecord,
        credit: &mut TransactionRecord,
    ) -> Result<()> {
        // Ownership is required for the source only; transfers to
        // third-party accounts are legitimate.
        if !caller.privileged {
            validate_ownership(source, &caller.identity)?;
        }
        let amount = positive_amount(request.amount, "transfer")?;
        if request.from_account_number == request.to_account_number {
            return Err(LedgerError::BadRequest(
                "transfer between the same account is not allowed".to_string(),
            ));
        }
        if source.balance < amount.value() {
            return Err(LedgerError::BadRequest("insufficient balance".to_string()));
        }

        // A transfer is a two-account mutation and must be observable as in
        // flight before any balance changes.
        debit.transition(TransactionStatus::Pending)?;
        credit.transition(TransactionStatus::Pending)?;
        *debit = self.bounded(self.transactions.save(debit.clone())).await?;
        *credit = self.bounded(self.transactions.save(credit.clone())).await?;

        let mut new_source = source.clone();
        let mut new_dest = dest.clone();
        // debit() re-checks the balance immediately before mutation.
        new_source.debit(amount)?;
        new_dest.credit(amount);

        // Both balances and both terminal legs commit as one unit. If the
        // commit fails nothing was applied and the in-memory legs are still
        // Pending, so the failure path marks them Failed.
        let mut debit_done = debit.clone();
        let mut credit_done = credit.clone();
        debit_done.complete(new_source.balance)?;
        credit_done.complete(new_dest.balance)?;
        let committed = self
            .bounded(
                self.accounts
                    .commit_transfer(new_source, new_dest, debit_done, credit_done),
            )
            .await?;
        *debit = committed.debit;
        *credit = committed.credit;
        Ok(())
    }

    /// Filtered, paged transaction history for one account, newest first.
    pub async fn statement(
        &self,
        account_number: &str,
        query: StatementQuery,
        page: PageRequest,
        caller: &Caller,
    ) -> Result<Page<TransactionReceipt>> {
        let account = self.require_account(account_number).await?;
        if !caller.privileged {
            validate_ownership(&account, &caller.identity)?;
        }
        if let (Some(from), Some(to)) = (query.from_date, query.to_date)
            && from > to
        {
            return Err(LedgerError::BadRequest(
                "from date cannot be after to date".to_string(),
            ));
        }

        let records = self
            .bounded(self.transactions.filter_statements(account_number, &query, page))
            .await?;
        Ok(records.map(|record| TransactionReceipt::from(&record)))
    }

    /// Privileged lookup of a single transaction by internal id.
    pub async fn transaction(&self, id: u64, caller: &Caller) -> Result<TransactionDetails> {
        if !caller.privileged {
            return Err(LedgerError::AccessDenied(
                "transaction lookup requires a privileged caller".to_string(),
            ));
        }
        let record = self
            .bounded(self.transactions.find_by_id(id))
            .await?
            .ok_or_else(|| LedgerError::NotFound(format!("transaction with id {id}")))?;
        Ok(TransactionDetails::from(&record))
    }

    /// Ownership-checked account lookup by number.
    pub async fn account(&self, account_number: &str, caller: &Caller) -> Result<Account> {
        let account = self.require_account(account_number).await?;
        if !caller.privileged {
            validate_ownership(&account, &caller.identity)?;
        }
        Ok(account)
    }

    /// Opens a new account with a generated number and zero balance.
    /// Non-privileged callers may only open accounts for themselves.
    pub async fn open_account(
        &self,
        kind: AccountKind,
        owner: &str,
        caller: &Caller,
    ) -> Result<Account> {
        if !caller.privileged && caller.identity != owner {
            return Err(LedgerError::AccessDenied(
                "you may only open accounts for yourself".to_string(),
            ));
        }

        let sequence = self.bounded(self.accounts.next_sequence()).await?;
        let number = format_account_number(sequence);
        let account = self
            .bounded(
                self.accounts
                    .save(Account::open(number, kind, owner.to_string())),
            )
            .await?;

        self.audit_success(
            AuditAction::AccountCreated,
            AuditEntityType::Account,
            Some(account.id),
            format!("created account {} for {}", account.number, account.owner),
        )
        .await;
        tracing::info!(account = %account.number, owner = %account.owner, "account opened");
        Ok(account)
    }

    /// Privileged status change. Accounts are never deleted; closure is a
    /// status change, and a closed account stays closed.
    pub async fn change_account_status(
        &self,
        account_number: &str,
        status: AccountStatus,
        caller: &Caller,
    ) -> Result<Account> {
        if !caller.privileged {
            return Err(LedgerError::AccessDenied(
                "status changes require a privileged caller".to_string(),
            ));
        }
        let mut account = self.require_account(account_number).await?;
        if account.status == AccountStatus::Closed && status == AccountStatus::Open {
            return Err(LedgerError::BadRequest(
                "a closed account cannot be reopened".to_string(),
            ));
        }
        account.status = status;
        let account = self.bounded(self.accounts.save(account)).await?;

        self.audit_success(
            AuditAction::AccountUpdated,
            AuditEntityType::Account,
            Some(account.id),
            format!("changed status of account {} to {:?}", account.number, status),
        )
        .await;
        Ok(account)
    }

    /// Current state of every account, for end-of-run reporting.
    pub async fn all_accounts(&self) -> Result<Vec<Account>> {
        self.bounded(self.accounts.all_accounts()).await
    }

    async fn require_account(&self, number: &str) -> Result<Account> {
        self.bounded(self.accounts.find_by_number(number))
            .await?
            .ok_or_else(|| LedgerError::NotFound(format!("account {number}")))
    }

    /// Marks every record `Failed`, persists best-effort, and emits one
    /// audit failure event referencing the first record.
    async fn fail_records(
        &self,
        records: &mut [&mut TransactionRecord],
        action: AuditAction,
        err: &LedgerError,
    ) {
        for record in records.iter_mut() {
            // A terminal record was already committed together with its
            // balance write and is not rewritten; only in-flight rows are
            // marked failed.
            if record.transition(TransactionStatus::Failed).is_ok() {
                match self.bounded(self.transactions.save(record.clone())).await {
                    Ok(saved) => **record = saved,
                    Err(save_err) => tracing::warn!(
                        reference = %record.reference_number,
                        error = %save_err,
                        "could not persist failed transaction record"
                    ),
                }
            }
        }
        let entity_id = records.first().map(|record| record.id);
        self.audit_failure(action, AuditEntityType::Transaction, entity_id, err.to_string())
            .await;
    }

    async fn audit_success(
        &self,
        action: AuditAction,
        entity_type: AuditEntityType,
        entity_id: Option<u64>,
        description: String,
    ) {
        if let Err(err) = self
            .audit
            .record_success(action, entity_type, entity_id, description)
            .await
        {
            tracing::warn!(error = %err, "audit write failed");
        }
    }

    async fn audit_failure(
        &self,
        action: AuditAction,
        entity_type: AuditEntityType,
        entity_id: Option<u64>,
        description: String,
    ) {
        if let Err(err) = self
            .audit
            .record_failure(action, entity_type, entity_id, description)
            .await
        {
            tracing::warn!(error = %err, "audit write failed");
        }
    }

    /// Bounds a store interaction by the configured timeout.
    async fn bounded<T>(&self, fut: impl Future<Output = Result<T>>) -> Result<T> {
        match timeout(self.config.store_timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(LedgerError::Timeout),
        }
    }
}

/// Validates a request amount, naming the operation in the error message.
fn positive_amount(value: Decimal, operation: &str) -> Result<Amount> {
    Amount::new(value).map_err(|_| {
        LedgerError::BadRequest(format!("{operation} amount must be greater than zero"))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::audit::AuditStatus;
    use crate::domain::ports::{AccountStore, TransactionStore};
    use crate::infrastructure::in_memory::{InMemoryStore, MemoryAuditSink};
    use async_trait::async_trait;
    use rust_decimal_macros::dec;
    use std::sync::atomic::{AtomicUsize, Ordering};

    async fn seeded_store(balances: &[(&str, &str, Decimal)]) -> InMemoryStore {
        let store = InMemoryStore::new();
        for (number, owner, balance) in balances {
            let mut account = Account::open(
                number.to_string(),
                AccountKind::Current,
                owner.to_string(),
            );
            account.balance = *balance;
            store.seed(account).await.unwrap();
        }
        store
    }

    async fn seeded_engine(balances: &[(&str, &str, Decimal)]) -> (LedgerEngine, MemoryAuditSink) {
        let store = seeded_store(balances).await;
        let sink = MemoryAuditSink::new();
        let engine = LedgerEngine::new(
            Box::new(store.clone()),
            Box::new(store),
            Box::new(sink.clone()),
        );
        (engine, sink)
    }

    /// Account store whose commit methods fail a configured number of
    /// times before delegating, standing in for a store outage that hits
    /// exactly when money would move.
    struct FlakyCommitStore {
        inner: InMemoryStore,
        failures_left: AtomicUsize,
    }

    impl FlakyCommitStore {
        fn new(inner: InMemoryStore, failures: usize) -> Self {
            Self {
                inner,
                failures_left: AtomicUsize::new(failures),
            }
        }

        fn take_failure(&self) -> bool {
            self.failures_left
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
        }
    }

    #[async_trait]
    impl AccountStore for FlakyCommitStore {
        async fn save(&self, account: Account) -> Result<Account> {
            AccountStore::save(&self.inner, account).await
        }

        async fn commit(
            &self,
            account: Account,
            record: TransactionRecord,
        ) -> Result<(Account, TransactionRecord)> {
            if self.take_failure() {
                return Err(LedgerError::internal(std::io::Error::other("disk full")));
            }
            self.inner.commit(account, record).await
        }

        async fn commit_transfer(
            &self,
            source: Account,
            dest: Account,
            debit: TransactionRecord,
            credit: TransactionRecord,
        ) -> Result<crate::domain::ports::TransferCommit> {
            if self.take_failure() {
                return Err(LedgerError::internal(std::io::Error::other("disk full")));
            }
            self.inner.commit_transfer(source, dest, debit, credit).await
        }

        async fn find_by_number(&self, number: &str) -> Result<Option<Account>> {
            self.inner.find_by_number(number).await
        }

        async fn find_by_id(&self, id: u64) -> Result<Option<Account>> {
            AccountStore::find_by_id(&self.inner, id).await
        }

        async fn all_accounts(&self) -> Result<Vec<Account>> {
            self.inner.all_accounts().await
        }

        async fn next_sequence(&self) -> Result<u64> {
            self.inner.next_sequence().await
        }
    }

    /// Account store whose commit sleeps past any reasonable deadline.
    struct SlowCommitStore {
        inner: InMemoryStore,
        delay: Duration,
    }

    #[async_trait]
    impl AccountStore for SlowCommitStore {
        async fn save(&self, account: Account) -> Result<Account> {
            AccountStore::save(&self.inner, account).await
        }

        async fn commit(
            &self,
            account: Account,
            record: TransactionRecord,
        ) -> Result<(Account, TransactionRecord)> {
            tokio::time::sleep(self.delay).await;
            self.inner.commit(account, record).await
        }

        async fn commit_transfer(
            &self,
            source: Account,
            dest: Account,
            debit: TransactionRecord,
            credit: TransactionRecord,
        ) -> Result<crate::domain::ports::TransferCommit> {
            tokio::time::sleep(self.delay).await;
            self.inner.commit_transfer(source, dest, debit, credit).await
        }

        async fn find_by_number(&self, number: &str) -> Result<Option<Account>> {
            self.inner.find_by_number(number).await
        }

        async fn find_by_id(&self, id: u64) -> Result<Option<Account>> {
            AccountStore::find_by_id(&self.inner, id).await
        }

        async fn all_accounts(&self) -> Result<Vec<Account>> {
            self.inner.all_accounts().await
        }

        async fn next_sequence(&self) -> Result<u64> {
            self.inner.next_sequence().await
        }
    }

    #[tokio::test]
    async fn test_deposit_success() {
        let (engine, sink) =
            seeded_engine(&[("ACC-1", "alice@example.com", dec!(1000))]).await;

        let receipt = engine
            .deposit(
                DepositRequest {
                    account_number: "ACC-1".to_string(),
                    amount: dec!(200),
                    description: None,
                },
                &Caller::user("alice@example.com"),
            )
            .await
            .unwrap();

        assert_eq!(receipt.status, TransactionStatus::Success);
        assert_eq!(receipt.before_balance, dec!(1000));
        assert_eq!(receipt.after_balance, dec!(1200));

        let account = engine
            .account("ACC-1", &Caller::user("alice@example.com"))
            .await
            .unwrap();
        assert_eq!(account.balance, dec!(1200));
        assert_eq!(sink.events().await.len(), 1);
        assert_eq!(sink.events().await[0].status, AuditStatus::Success);
    }

    #[tokio::test]
    async fn test_deposit_unknown_account() {
        let (engine, sink) = seeded_engine(&[]).await;

        let result = engine
            .deposit(
                DepositRequest {
                    account_number: "ACC-404".to_string(),
                    amount: dec!(10),
                    description: None,
                },
                &Caller::user("alice@example.com"),
            )
            .await;

        assert!(matches!(result, Err(LedgerError::NotFound(_))));
        // Nothing to record against: the account resolution precedes the row.
        assert!(sink.events().await.is_empty());
    }

    #[tokio::test]
    async fn test_deposit_non_positive_amount_leaves_failed_record() {
        let (engine, sink) =
            seeded_engine(&[("ACC-1", "alice@example.com", dec!(1000))]).await;

        let result = engine
            .deposit(
                DepositRequest {
                    account_number: "ACC-1".to_string(),
                    amount: dec!(0),
                    description: None,
                },
                &Caller::user("alice@example.com"),
            )
            .await;

        let err = result.unwrap_err();
        assert!(matches!(err, LedgerError::BadRequest(_)));
        assert!(err
            .to_string()
            .contains("deposit amount must be greater than zero"));
        let account = engine
            .account("ACC-1", &Caller::user("alice@example.com"))
            .await
            .unwrap();
        assert_eq!(account.balance, dec!(1000));

        let details = engine
            .transaction(1, &Caller::privileged("admin@example.com"))
            .await
            .unwrap();
        assert_eq!(details.status, TransactionStatus::Failed);
        assert_eq!(sink.events().await[0].status, AuditStatus::Failed);
    }

    #[tokio::test]
    async fn test_amount_errors_name_the_operation() {
        let (engine, _) = seeded_engine(&[
            ("ACC-1", "alice@example.com", dec!(1000)),
            ("ACC-2", "bob@example.com", dec!(0)),
        ])
        .await;
        let alice = Caller::user("alice@example.com");

        let err = engine
            .withdraw(
                WithdrawRequest {
                    account_number: "ACC-1".to_string(),
                    amount: dec!(-5),
                    description: None,
                },
                &alice,
            )
            .await
            .unwrap_err();
        assert!(err
            .to_string()
            .contains("withdraw amount must be greater than zero"));

        let err = engine
            .transfer(
                TransferRequest {
                    from_account_number: "ACC-1".to_string(),
                    to_account_number: "ACC-2".to_string(),
                    amount: dec!(0),
                    description: None,
                },
                &alice,
            )
            .await
            .unwrap_err();
        assert!(err
            .to_string()
            .contains("transfer amount must be greater than zero"));
    }

    #[tokio::test]
    async fn test_withdraw_non_owner_denied() {
        let (engine, sink) =
            seeded_engine(&[("ACC-1", "alice@example.com", dec!(1000))]).await;

        let result = engine
            .withdraw(
                WithdrawRequest {
                    account_number: "ACC-1".to_string(),
                    amount: dec!(100),
                    description: None,
                },
                &Caller::user("mallory@example.com"),
            )
            .await;

        assert!(matches!(result, Err(LedgerError::AccessDenied(_))));
        let account = engine
            .account("ACC-1", &Caller::privileged("admin@example.com"))
            .await
            .unwrap();
        assert_eq!(account.balance, dec!(1000));
        assert_eq!(sink.events().await[0].status, AuditStatus::Failed);
    }

    #[tokio::test]
    async fn test_privileged_caller_skips_ownership() {
        let (engine, _) = seeded_engine(&[("ACC-1", "alice@example.com", dec!(1000))]).await;

        let receipt = engine
            .withdraw(
                WithdrawRequest {
                    account_number: "ACC-1".to_string(),
                    amount: dec!(100),
                    description: None,
                },
                &Caller::privileged("admin@example.com"),
            )
            .await
            .unwrap();
        assert_eq!(receipt.after_balance, dec!(900));
    }

    #[tokio::test]
    async fn test_transfer_self_rejected_before_balance_check() {
        let (engine, _) = seeded_engine(&[("ACC-1", "alice@example.com", dec!(1000))]).await;

        // Rejected even though the balance would cover it.
        let result = engine
            .transfer(
                TransferRequest {
                    from_account_number: "ACC-1".to_string(),
                    to_account_number: "ACC-1".to_string(),
                    amount: dec!(10),
                    description: None,
                },
                &Caller::user("alice@example.com"),
            )
            .await;
        assert!(matches!(result, Err(LedgerError::BadRequest(_))));

        // And also when the balance would not.
        let result = engine
            .transfer(
                TransferRequest {
                    from_account_number: "ACC-1".to_string(),
                    to_account_number: "ACC-1".to_string(),
                    amount: dec!(999999),
                    description: None,
                },
                &Caller::user("alice@example.com"),
            )
            .await;
        let err = result.unwrap_err();
        assert!(err.to_string().contains("same account"));
    }

    #[tokio::test]
    async fn test_transaction_lookup_requires_privilege() {
        let (engine, _) = seeded_engine(&[("ACC-1", "alice@example.com", dec!(1000))]).await;
        let result = engine.transaction(1, &Caller::user("alice@example.com")).await;
        assert!(matches!(result, Err(LedgerError::AccessDenied(_))));
    }

    #[tokio::test]
    async fn test_open_account_for_self() {
        let (engine, sink) = seeded_engine(&[]).await;
        let account = engine
            .open_account(
                AccountKind::Saving,
                "alice@example.com",
                &Caller::user("alice@example.com"),
            )
            .await
            .unwrap();

        assert!(account.number.starts_with("ACC-"));
        assert_eq!(account.balance, Decimal::ZERO);
        assert_eq!(account.status, AccountStatus::Open);
        assert_eq!(sink.events().await[0].action, AuditAction::AccountCreated);

        let result = engine
            .open_account(
                AccountKind::Saving,
                "bob@example.com",
                &Caller::user("alice@example.com"),
            )
            .await;
        assert!(matches!(result, Err(LedgerError::AccessDenied(_))));
    }

    #[tokio::test]
    async fn test_closed_account_stays_closed() {
        let (engine, _) = seeded_engine(&[("ACC-1", "alice@example.com", dec!(0))]).await;
        let admin = Caller::privileged("admin@example.com");

        engine
            .change_account_status("ACC-1", AccountStatus::Closed, &admin)
            .await
            .unwrap();
        let result = engine
            .change_account_status("ACC-1", AccountStatus::Open, &admin)
            .await;
        assert!(matches!(result, Err(LedgerError::BadRequest(_))));
    }

    #[tokio::test]
    async fn test_statement_rejects_inverted_date_range() {
        let (engine, _) = seeded_engine(&[("ACC-1", "alice@example.com", dec!(1000))]).await;

        let query = StatementQuery {
            from_date: Some(Utc::now()),
            to_date: Some(Utc::now() - chrono::Duration::days(1)),
            ..Default::default()
        };
        let result = engine
            .statement(
                "ACC-1",
                query,
                PageRequest::default(),
                &Caller::user("alice@example.com"),
            )
            .await;
        assert!(matches!(result, Err(LedgerError::BadRequest(_))));
    }

    #[tokio::test]
    async fn test_deposit_commit_failure_leaves_failed_row() {
        let store = seeded_store(&[("ACC-1", "alice@example.com", dec!(1000))]).await;
        let sink = MemoryAuditSink::new();
        let engine = LedgerEngine::new(
            Box::new(FlakyCommitStore::new(store.clone(), 1)),
            Box::new(store.clone()),
            Box::new(sink.clone()),
        );

        let err = engine
            .deposit(
                DepositRequest {
                    account_number: "ACC-1".to_string(),
                    amount: dec!(200),
                    description: None,
                },
                &Caller::user("alice@example.com"),
            )
            .await
            .unwrap_err();
        assert!(err.is_retryable());

        // Money did not move and the attempt row is terminal, so a retry
        // cannot double-apply.
        let account = store.find_by_number("ACC-1").await.unwrap().unwrap();
        assert_eq!(account.balance, dec!(1000));
        let row = TransactionStore::find_by_id(&store, 1).await.unwrap().unwrap();
        assert_eq!(row.status, TransactionStatus::Failed);
        let events = sink.events().await;
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].status, AuditStatus::Failed);

        // The retry goes through once the store recovers.
        engine
            .deposit(
                DepositRequest {
                    account_number: "ACC-1".to_string(),
                    amount: dec!(200),
                    description: None,
                },
                &Caller::user("alice@example.com"),
            )
            .await
            .unwrap();
        let account = store.find_by_number("ACC-1").await.unwrap().unwrap();
        assert_eq!(account.balance, dec!(1200));
    }

    #[tokio::test]
    async fn test_transfer_commit_failure_leaves_failed_legs() {
        let store = seeded_store(&[
            ("ACC-1", "alice@example.com", dec!(1000)),
            ("ACC-2", "bob@example.com", dec!(500)),
        ])
        .await;
        let sink = MemoryAuditSink::new();
        let engine = LedgerEngine::new(
            Box::new(FlakyCommitStore::new(store.clone(), 1)),
            Box::new(store.clone()),
            Box::new(sink.clone()),
        );

        let err = engine
            .transfer(
                TransferRequest {
                    from_account_number: "ACC-1".to_string(),
                    to_account_number: "ACC-2".to_string(),
                    amount: dec!(400),
                    description: None,
                },
                &Caller::user("alice@example.com"),
            )
            .await
            .unwrap_err();
        assert!(err.is_retryable());

        // Neither balance changed and both legs are terminal, not Pending.
        assert_eq!(
            store.find_by_number("ACC-1").await.unwrap().unwrap().balance,
            dec!(1000)
        );
        assert_eq!(
            store.find_by_number("ACC-2").await.unwrap().unwrap().balance,
            dec!(500)
        );
        for id in [1, 2] {
            let leg = TransactionStore::find_by_id(&store, id).await.unwrap().unwrap();
            assert_eq!(leg.status, TransactionStatus::Failed);
        }
        assert_eq!(sink.events().await[0].status, AuditStatus::Failed);
    }

    #[tokio::test]
    async fn test_slow_store_times_out_with_terminal_row() {
        let store = seeded_store(&[("ACC-1", "alice@example.com", dec!(1000))]).await;
        let sink = MemoryAuditSink::new();
        let engine = LedgerEngine::with_config(
            Box::new(SlowCommitStore {
                inner: store.clone(),
                delay: Duration::from_secs(2),
            }),
            Box::new(store.clone()),
            Box::new(sink.clone()),
            EngineConfig {
                store_timeout: Duration::from_millis(20),
            },
        );

        let result = engine
            .deposit(
                DepositRequest {
                    account_number: "ACC-1".to_string(),
                    amount: dec!(200),
                    description: None,
                },
                &Caller::user("alice@example.com"),
            )
            .await;
        assert!(matches!(result, Err(LedgerError::Timeout)));

        // The timed-out commit never reached the store; the row is marked
        // failed and the balance is untouched.
        let account = store.find_by_number("ACC-1").await.unwrap().unwrap();
        assert_eq!(account.balance, dec!(1000));
        let row = TransactionStore::find_by_id(&store, 1).await.unwrap().unwrap();
        assert_eq!(row.status, TransactionStatus::Failed);
        assert_eq!(sink.events().await[0].status, AuditStatus::Failed);
    }
}
