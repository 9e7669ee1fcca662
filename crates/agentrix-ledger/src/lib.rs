//! Agentrix Ledger - unified accounts for users, agents, merchants and the platform
//!
//! The ledger is:
//! - Account-keyed by [`AccountId`], each account owned by exactly one actor
//! - Single primary currency per account, plus lazily created side balances
//! - Mutated only through [`Ledger`] operations, each one a unit of work
//! - Lock-ordered (rows are always locked in ascending id order)
//!
//! # Invariants
//!
//! 1. `available`, `frozen` and `pending` balances are never negative
//! 2. A failed operation leaves balances, counters and history untouched
//! 3. At most one default account per owner at any observable point
//! 4. A wallet address is bound to at most one account
//! 5. `closed` is terminal
//!
//! History rows are informational. Balances are the only source of truth.

pub mod account;
pub mod config;
pub mod engine;
pub mod error;
pub mod history;
pub mod memory;
pub mod store;

pub use account::{
    check_amount_scale, Account, AccountLimits, AccountStats, BalanceView, NewAccount, AMOUNT_SCALE,
};
pub use config::LedgerConfig;
pub use engine::{FundOperation, Ledger, TransferOutcome};
pub use error::{ErrorKind, LedgerError, Result};
pub use history::{Direction, HistoryEntry, HistoryKind, HistoryQuery, HistoryStream};
pub use memory::MemoryAccountStore;
pub use store::{AccountStore, Mutation};

pub use agentrix_types::{
    AccountId, AccountStatus, ChainType, Owner, OwnerType, WalletType, DEFAULT_CURRENCY,
};
