use thiserror::Error;

pub type Result<T> = std::result::Result<T, LedgerError>;

/// Error taxonomy for the ledger.
///
/// `NotFound`, `BadRequest` and `AccessDenied` are business-rule rejections
/// surfaced to the caller as-is. `Conflict` and `Timeout` come from the
/// store layer and are safe to retry because no balance mutation committed.
#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("access denied: {0}")]
    AccessDenied(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("store operation timed out")]
    Timeout,
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("internal error: {0}")]
    Internal(Box<dyn std::error::Error + Send + Sync>),
}

impl LedgerError {
    /// Whether the caller may retry the same request. Business-rule
    /// rejections are deterministic and never retried.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            LedgerError::Conflict(_) | LedgerError::Timeout | LedgerError::Internal(_)
        )
    }

    pub fn internal(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        LedgerError::Internal(Box::new(err))
    }
}
