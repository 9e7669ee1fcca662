//! Agentrix Agent - autonomous agents on the unified ledger
//!
//! Two services sit on top of [`agentrix_ledger`]:
//!
//! - [`SpendingPolicyEvaluator`]: allow/deny for a proposed spend against the
//!   agent's single, daily and monthly caps, plus the rolling usage counters
//!   and credit score
//! - [`AgentDirectory`]: agent registration, lifecycle and the link to the
//!   agent's ledger accounts
//!
//! The evaluator never moves funds. A spend is checked, executed on the
//! [`Ledger`](agentrix_ledger::Ledger) and then recorded, in three separate
//! calls made by the caller.

pub mod credit;
pub mod directory;
pub mod error;
pub mod memory;
pub mod model;
pub mod policy;
pub mod store;

pub use credit::{CreditScoreChange, INITIAL_CREDIT_SCORE, MAX_CREDIT_SCORE, MIN_CREDIT_SCORE};
pub use directory::AgentDirectory;
pub use error::{AgentError, Result};
pub use memory::MemoryAgentStore;
pub use model::{
    AgentAccount, AgentCallbacks, AgentPage, AgentUpdate, NewAgent, PageRequest, SpendingLimits,
};
pub use policy::{evaluate, DenyReason, SpendingDecision, SpendingPolicyEvaluator};
pub use store::{AgentMutation, AgentStore};

pub use agentrix_types::{AgentId, AgentStatus, AgentType, RiskLevel};
