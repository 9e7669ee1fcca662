//! Agent error types

use agentrix_ledger::{ErrorKind, LedgerError};
use agentrix_types::{AgentId, AgentStatus};
use thiserror::Error;

/// Errors raised by the agent directory, the spending policy evaluator and
/// agent stores
#[derive(Error, Debug)]
pub enum AgentError {
    #[error("Agent not found: {agent}")]
    AgentNotFound { agent: String },

    #[error("Agent {agent} is {from}, cannot {action}")]
    InvalidTransition {
        agent: AgentId,
        from: AgentStatus,
        action: &'static str,
    },

    #[error("Invalid amount: {message}")]
    InvalidAmount { message: String },

    #[error("Invalid input: {message}")]
    InvalidInput { message: String },

    /// The agent row exists but has no default account
    #[error("Agent {agent_id} was created but its default account was not: {source}")]
    AccountProvisioning {
        agent_id: AgentId,
        #[source]
        source: LedgerError,
    },

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error("Storage error: {message}")]
    Storage { message: String },
}

impl AgentError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::AgentNotFound { .. } => ErrorKind::NotFound,
            Self::InvalidTransition { .. } => ErrorKind::InvalidState,
            Self::InvalidAmount { .. } | Self::InvalidInput { .. } => ErrorKind::Validation,
            Self::AccountProvisioning { source, .. } => source.kind(),
            Self::Ledger(err) => err.kind(),
            Self::Storage { .. } => ErrorKind::Storage,
        }
    }

    pub fn not_found(agent: impl ToString) -> Self {
        Self::AgentNotFound {
            agent: agent.to_string(),
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

pub type Result<T> = std::result::Result<T, AgentError>;
