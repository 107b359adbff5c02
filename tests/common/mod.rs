use bankledger::application::engine::LedgerEngine;
use bankledger::domain::account::{Account, AccountKind};
use bankledger::infrastructure::in_memory::{InMemoryStore, MemoryAuditSink};
use rust_decimal::Decimal;

/// Builds an engine over one in-memory store, preloaded with the given
/// `(number, owner, balance)` accounts, plus a handle on the audit sink.
pub async fn seeded_engine(
    balances: &[(&str, &str, Decimal)],
) -> (LedgerEngine, MemoryAuditSink) {
    let store = InMemoryStore::new();
    for (number, owner, balance) in balances {
        let mut account = Account::open(
            number.to_string(),
            AccountKind::Current,
            owner.to_string(),
        );
        account.balance = *balance;
        store.seed(account).await.expect("seed account");
    }

    let sink = MemoryAuditSink::new();
    let engine = LedgerEngine::new(
        Box::new(store.clone()),
        Box::new(store),
        Box::new(sink.clone()),
    );
    (engine, sink)
}
