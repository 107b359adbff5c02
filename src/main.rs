use bankledger::application::engine::{
    Caller, DepositRequest, LedgerEngine, TransferRequest, WithdrawRequest,
};
use bankledger::domain::ports::{AccountStore, AccountStoreBox, TransactionStoreBox};
use bankledger::domain::validation::validate_open;
use bankledger::error::LedgerError;
use bankledger::infrastructure::audit_log::TracingAuditSink;
use bankledger::infrastructure::in_memory::InMemoryStore;
use bankledger::interfaces::csv::account_csv::{AccountSeedReader, AccountWriter};
use bankledger::interfaces::csv::operation_reader::{OperationKind, OperationReader, OperationRow};
use clap::Parser;
use miette::{IntoDiagnostic, Result};
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Input operations CSV file
    input: PathBuf,

    /// Account seed CSV file applied before processing operations
    #[arg(long)]
    accounts: Option<PathBuf>,

    /// Path to persistent database (optional). If provided, uses RocksDB.
    #[arg(long)]
    db_path: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();

    let engine = if let Some(db_path) = cli.db_path {
        build_rocksdb_engine(db_path, cli.accounts.as_deref()).await?
    } else {
        let store = InMemoryStore::new();
        if let Some(seed) = cli.accounts.as_deref() {
            seed_accounts(&store, seed).await.into_diagnostic()?;
        }
        let accounts: AccountStoreBox = Box::new(store.clone());
        let transactions: TransactionStoreBox = Box::new(store);
        LedgerEngine::new(accounts, transactions, Box::new(TracingAuditSink::new()))
    };

    // Process operations, reporting per-row failures without stopping.
    let file = File::open(&cli.input).into_diagnostic()?;
    let reader = OperationReader::new(file);
    for row_result in reader.operations() {
        match row_result {
            Ok(row) => {
                if let Err(e) = run_operation(&engine, row).await {
                    eprintln!("Error processing operation: {e}");
                }
            }
            Err(e) => {
                eprintln!("Error reading operation: {e}");
            }
        }
    }

    // Output final account state.
    let accounts = engine.all_accounts().await.into_diagnostic()?;
    let stdout = io::stdout();
    let mut writer = AccountWriter::new(stdout.lock());
    writer.write_accounts(&accounts).into_diagnostic()?;

    Ok(())
}

#[cfg(feature = "storage-rocksdb")]
async fn build_rocksdb_engine(db_path: PathBuf, seed: Option<&Path>) -> Result<LedgerEngine> {
    use bankledger::infrastructure::rocksdb::RocksDbStore;

    let store = RocksDbStore::open(db_path).into_diagnostic()?;
    if let Some(seed) = seed {
        seed_accounts(&store, seed).await.into_diagnostic()?;
    }
    let accounts: AccountStoreBox = Box::new(store.clone());
    let transactions: TransactionStoreBox = Box::new(store);
    Ok(LedgerEngine::new(
        accounts,
        transactions,
        Box::new(TracingAuditSink::new()),
    ))
}

#[cfg(not(feature = "storage-rocksdb"))]
async fn build_rocksdb_engine(_db_path: PathBuf, _seed: Option<&Path>) -> Result<LedgerEngine> {
    Err(miette::miette!(
        "--db-path requires a build with the storage-rocksdb feature"
    ))
}

/// Loads seed accounts into the store. Only open accounts may be seeded;
/// frozen or closed rows are a seed-file mistake and abort the run.
async fn seed_accounts<S: AccountStore>(store: &S, path: &Path) -> bankledger::error::Result<usize> {
    let file = File::open(path)?;
    let reader = AccountSeedReader::new(file);
    let mut count = 0;
    for row in reader.accounts() {
        let account = row?.into_account()?;
        validate_open(&account)?;
        store.save(account).await?;
        count += 1;
    }
    tracing::info!(count, "seeded accounts");
    Ok(count)
}

async fn run_operation(engine: &LedgerEngine, row: OperationRow) -> bankledger::error::Result<()> {
    let caller = if row.is_privileged() {
        Caller::privileged(row.caller.clone())
    } else {
        Caller::user(row.caller.clone())
    };

    match row.op {
        OperationKind::Deposit => {
            engine
                .deposit(
                    DepositRequest {
                        account_number: row.account,
                        amount: row.amount,
                        description: row.description,
                    },
                    &caller,
                )
                .await?;
        }
        OperationKind::Withdraw => {
            engine
                .withdraw(
                    WithdrawRequest {
                        account_number: row.account,
                        amount: row.amount,
                        description: row.description,
                    },
                    &caller,
                )
                .await?;
        }
        OperationKind::Transfer => {
            let to_account = row.to_account.ok_or_else(|| {
                LedgerError::BadRequest("transfer requires a destination account".to_string())
            })?;
            engine
                .transfer(
                    TransferRequest {
                        from_account_number: row.account,
                        to_account_number: to_account,
                        amount: row.amount,
                        description: row.description,
                    },
                    &caller,
                )
                .await?;
        }
    }
    Ok(())
}
