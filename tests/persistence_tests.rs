#![cfg(feature = "storage-rocksdb")]

use bankledger::application::engine::{Caller, DepositRequest, LedgerEngine};
use bankledger::domain::account::{Account, AccountKind};
use bankledger::domain::ports::{AccountStore, AccountStoreBox, TransactionStoreBox};
use bankledger::domain::transaction::TransactionStatus;
use bankledger::infrastructure::in_memory::MemoryAuditSink;
use bankledger::infrastructure::rocksdb::RocksDbStore;
use rust_decimal_macros::dec;
use tempfile::tempdir;

fn engine_over(store: RocksDbStore) -> LedgerEngine {
    let accounts: AccountStoreBox = Box::new(store.clone());
    let transactions: TransactionStoreBox = Box::new(store);
    LedgerEngine::new(accounts, transactions, Box::new(MemoryAuditSink::new()))
}

#[tokio::test]
async fn test_ledger_state_survives_restart() {
    let dir = tempdir().unwrap();
    let alice = Caller::user("alice@example.com");

    {
        let store = RocksDbStore::open(dir.path()).unwrap();
        let mut account = Account::open(
            "ACC-2026-000001".to_string(),
            AccountKind::Saving,
            "alice@example.com".to_string(),
        );
        account.balance = dec!(1000);
        AccountStore::save(&store, account).await.unwrap();

        let engine = engine_over(store);
        let receipt = engine
            .deposit(
                DepositRequest {
                    account_number: "ACC-2026-000001".to_string(),
                    amount: dec!(200),
                    description: None,
                },
                &alice,
            )
            .await
            .unwrap();
        assert_eq!(receipt.after_balance, dec!(1200));
    }

    // Reopen the database: balance and transaction history are still there.
    let engine = engine_over(RocksDbStore::open(dir.path()).unwrap());
    let account = engine.account("ACC-2026-000001", &alice).await.unwrap();
    assert_eq!(account.balance, dec!(1200));

    let admin = Caller::privileged("admin@example.com");
    let record = engine.transaction(1, &admin).await.unwrap();
    assert_eq!(record.status, TransactionStatus::Success);
    assert_eq!(record.after_balance, dec!(1200));
}
