//! Database error types
//!
//! [`DbError`] covers pool bootstrap and migrations. Store operations report
//! through the owning domain's error type instead, so `sqlx::Error` is mapped
//! at the repository boundary.

use agentrix_agent::AgentError;
use agentrix_ledger::LedgerError;
use thiserror::Error;

/// Unique index guarding wallet address reuse
pub(crate) const WALLET_ADDRESS_INDEX: &str = "accounts_wallet_address_key";

/// Database bootstrap errors
#[derive(Debug, Error)]
pub enum DbError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Migration error: {0}")]
    Migration(String),

    #[error("Query error: {0}")]
    Query(#[from] sqlx::Error),
}

/// Result type for database operations
pub type DbResult<T> = Result<T, DbError>;

pub(crate) fn ledger_storage(err: sqlx::Error) -> LedgerError {
    LedgerError::storage(err)
}

pub(crate) fn agent_storage(err: sqlx::Error) -> AgentError {
    AgentError::storage(err)
}

/// Map an account insert failure, recognising wallet address reuse
pub(crate) fn insert_account_error(err: sqlx::Error, wallet_address: Option<&str>) -> LedgerError {
    let violates_wallet_index = err
        .as_database_error()
        .map(|db| db.is_unique_violation() && db.constraint() == Some(WALLET_ADDRESS_INDEX))
        .unwrap_or(false);
    match (violates_wallet_index, wallet_address) {
        (true, Some(address)) => LedgerError::WalletAddressConflict {
            address: address.to_string(),
        },
        _ => ledger_storage(err),
    }
}
