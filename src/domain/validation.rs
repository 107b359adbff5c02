use crate::domain::account::{Account, AccountStatus};
use crate::error::{LedgerError, Result};

/// Fails with `AccessDenied` when `caller_identity` does not own the
/// account. Side-effect free; privileged callers skip this check entirely
/// at the call site.
pub fn validate_ownership(account: &Account, caller_identity: &str) -> Result<()> {
    if account.owner != caller_identity {
        return Err(LedgerError::AccessDenied(
            "you are not allowed to access this account".to_string(),
        ));
    }
    Ok(())
}

/// Fails when the account is not in `Open` status.
pub fn validate_open(account: &Account) -> Result<()> {
    if account.status != AccountStatus::Open {
        return Err(LedgerError::BadRequest(format!(
            "account {} is not open: {:?}",
            account.number, account.status
        )));
    }
    Ok(())
}
