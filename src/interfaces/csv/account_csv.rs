use crate::domain::account::{Account, AccountKind, AccountStatus};
use crate::error::{LedgerError, Result};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::io::{Read, Write};

/// One account seed row: the initial ledger state a CLI run starts from.
#[derive(Debug, Deserialize, PartialEq, Clone)]
pub struct AccountSeedRow {
    pub number: String,
    pub owner: String,
    pub kind: AccountKind,
    pub balance: Decimal,
    /// Defaults to OPEN when the column is absent or empty.
    #[serde(default)]
    pub status: Option<AccountStatus>,
}

impl AccountSeedRow {
    /// Builds an open account carrying the seeded balance, not yet saved.
    pub fn into_account(self) -> Result<Account> {
        if self.balance < Decimal::ZERO {
            return Err(LedgerError::BadRequest(format!(
                "seed balance for account {} must not be negative",
                self.number
            )));
        }
        let status = self.status;
        let mut account = Account::open(self.number, self.kind, self.owner);
        account.balance = self.balance;
        if let Some(status) = status {
            account.status = status;
        }
        Ok(account)
    }
}

/// Reads account seed rows from a CSV source.
pub struct AccountSeedReader<R: Read> {
    reader: csv::Reader<R>,
}

impl<R: Read> AccountSeedReader<R> {
    pub fn new(source: R) -> Self {
        let reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .flexible(true)
            .from_reader(source);
        Self { reader }
    }

    pub fn accounts(self) -> impl Iterator<Item = Result<AccountSeedRow>> {
        self.reader
            .into_deserialize()
            .map(|result| result.map_err(LedgerError::from))
    }
}

#[derive(Serialize)]
struct AccountStateRow<'a> {
    number: &'a str,
    owner: &'a str,
    kind: AccountKind,
    status: AccountStatus,
    balance: Decimal,
}

/// Writes final account state as CSV.
pub struct AccountWriter<W: Write> {
    writer: csv::Writer<W>,
}

impl<W: Write> AccountWriter<W> {
    pub fn new(target: W) -> Self {
        Self {
            writer: csv::Writer::from_writer(target),
        }
    }

    pub fn write_accounts(&mut self, accounts: &[Account]) -> Result<()> {
        for account in accounts {
            self.writer.serialize(AccountStateRow {
                number: &account.number,
                owner: &account.owner,
                kind: account.kind,
                status: account.status,
                balance: account.balance,
            })?;
        }
        self.writer.flush()?;
        Ok(())
    }
}
