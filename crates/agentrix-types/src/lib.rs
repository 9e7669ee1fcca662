//! Agentrix Types - Canonical domain types for the unified ledger
//!
//! This crate contains the foundational types shared by the ledger, the
//! agent directory and the persistence layer, with zero dependencies on
//! other agentrix crates:
//!
//! - Identity types (`AccountId`, `AgentId`) and account ownership (`Owner`)
//! - Account classification (`OwnerType`, `WalletType`, `ChainType`, `AccountStatus`)
//! - Agent classification (`AgentStatus`, `AgentType`, `RiskLevel`)
//! - Human-diagnosable code generation (`ACC-…`, `AGT-…`)
//!
//! Every enum has a stable lower-case string form used both on the wire and
//! in the database, parsed back with [`std::str::FromStr`].

#[macro_use]
mod macros;

pub mod identity;
pub mod account;
pub mod agent;
pub mod code;
pub mod error;

pub use identity::*;
pub use account::*;
pub use agent::*;
pub use code::*;
pub use error::*;

/// Currency used for new accounts when the caller does not name one
pub const DEFAULT_CURRENCY: &str = "USDC";
