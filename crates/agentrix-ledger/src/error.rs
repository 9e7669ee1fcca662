//! Ledger error types

use agentrix_types::{AccountId, AccountStatus};
use rust_decimal::Decimal;
use thiserror::Error;

/// Errors that can occur in ledger operations
///
/// Every error aborts the unit of work it was raised in.
#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("Account not found: {account}")]
    AccountNotFound { account: String },

    #[error("Wallet address {address} is already bound to another account")]
    WalletAddressConflict { address: String },

    #[error("Account {account} is {status}, cannot {action}")]
    InvalidState {
        account: AccountId,
        status: AccountStatus,
        action: &'static str,
    },

    #[error("Insufficient {currency} balance: have {available}, need {required}")]
    InsufficientFunds {
        currency: String,
        available: Decimal,
        required: Decimal,
    },

    #[error("Account {account} still holds {total} and cannot be closed")]
    NonEmptyAccount { account: AccountId, total: Decimal },

    #[error("Invalid amount: {message}")]
    InvalidAmount { message: String },

    #[error("Invalid input: {message}")]
    InvalidInput { message: String },

    #[error("Account {account} does not belong to {owner}")]
    NotOwner { account: AccountId, owner: String },

    #[error("Invariant violated on account {account}: {message}")]
    InvariantViolation { account: AccountId, message: String },

    #[error("Storage error: {message}")]
    Storage { message: String },
}

/// Coarse classification callers branch on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    Conflict,
    InvalidState,
    InsufficientFunds,
    NonEmptyAccount,
    Validation,
    Storage,
}

impl LedgerError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::AccountNotFound { .. } => ErrorKind::NotFound,
            Self::WalletAddressConflict { .. } => ErrorKind::Conflict,
            Self::InvalidState { .. } => ErrorKind::InvalidState,
            Self::InsufficientFunds { .. } => ErrorKind::InsufficientFunds,
            Self::NonEmptyAccount { .. } => ErrorKind::NonEmptyAccount,
            Self::InvalidAmount { .. } | Self::InvalidInput { .. } | Self::NotOwner { .. } => {
                ErrorKind::Validation
            }
            Self::InvariantViolation { .. } | Self::Storage { .. } => ErrorKind::Storage,
        }
    }

    pub(crate) fn not_found(account: impl ToString) -> Self {
        Self::AccountNotFound {
            account: account.to_string(),
        }
    }

    pub(crate) fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    pub fn storage(message: impl ToString) -> Self {
        Self::Storage {
            message: message.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, LedgerError>;

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_kinds() {
        assert_eq!(LedgerError::not_found("acct_x").kind(), ErrorKind::NotFound);
        assert_eq!(
            LedgerError::WalletAddressConflict {
                address: "0xabc".into()
            }
            .kind(),
            ErrorKind::Conflict
        );
        assert_eq!(
            LedgerError::invalid_input("empty name").kind(),
            ErrorKind::Validation
        );
    }

    #[test]
    fn test_insufficient_funds_message() {
        let err = LedgerError::InsufficientFunds {
            currency: "USDC".into(),
            available: dec!(50),
            required: dec!(60),
        };
        assert_eq!(
            err.to_string(),
            "Insufficient USDC balance: have 50, need 60"
        );
    }
}
