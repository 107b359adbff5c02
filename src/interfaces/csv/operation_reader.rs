use crate::error::{LedgerError, Result};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::io::Read;

#[derive(Debug, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    Deposit,
    Withdraw,
    Transfer,
}

/// One operation request row from a CSV stream.
///
/// `to_account` is only meaningful for transfers; `privileged` defaults to
/// false when the column is empty.
#[derive(Debug, Deserialize, PartialEq, Clone)]
pub struct OperationRow {
    pub op: OperationKind,
    pub account: String,
    pub to_account: Option<String>,
    pub amount: Decimal,
    pub caller: String,
    pub privileged: Option<bool>,
    pub description: Option<String>,
}

impl OperationRow {
    pub fn is_privileged(&self) -> bool {
        self.privileged.unwrap_or(false)
    }
}

/// Reads operation requests from a CSV source.
///
/// Wraps `csv::Reader` and provides an iterator over `Result<OperationRow>`,
/// trimming whitespace and tolerating short records so large files can be
/// processed in a streaming fashion.
pub struct OperationReader<R: Read> {
    reader: csv::Reader<R>,
}

impl<R: Read> OperationReader<R> {
    pub fn new(source: R) -> Self {
        let reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .flexible(true)
            .from_reader(source);
        Self { reader }
    }

    pub fn operations(self) -> impl Iterator<Item = Result<OperationRow>> {
        self.reader
            .into_deserialize()
            .map(|result| result.map_err(LedgerError::from))
    }
}
