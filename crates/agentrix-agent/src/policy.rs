//! Agent spending policy evaluator
//!
//! Callers follow a three-step protocol: [`SpendingPolicyEvaluator::check_spending_limit`],
//! then the ledger operation, then [`SpendingPolicyEvaluator::record_spending`].
//! The check reserves nothing, so two concurrent spends can both pass it and
//! jointly exceed a cap.

use std::fmt;
use std::sync::Arc;

use agentrix_ledger::AMOUNT_SCALE;
use agentrix_types::{AgentId, AgentStatus};
use chrono::Utc;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::credit::CREDIT_SCORE_SCALE;
use crate::{AgentAccount, AgentError, AgentStore, Result};

/// Why a spend was denied
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "rule", rename_all = "snake_case")]
pub enum DenyReason {
    AgentNotActive { status: AgentStatus },
    SingleTxLimitExceeded { limit: Decimal },
    DailyLimitExceeded { limit: Decimal, used: Decimal },
    MonthlyLimitExceeded { limit: Decimal, used: Decimal },
}

impl fmt::Display for DenyReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AgentNotActive { status } => write!(f, "agent is {}, not active", status),
            Self::SingleTxLimitExceeded { limit } => {
                write!(f, "exceeds single transaction limit {}", limit)
            }
            Self::DailyLimitExceeded { limit, used } => {
                write!(f, "exceeds daily limit {} ({} already used)", limit, used)
            }
            Self::MonthlyLimitExceeded { limit, used } => {
                write!(f, "exceeds monthly limit {} ({} already used)", limit, used)
            }
        }
    }
}

/// Outcome of a spending check
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpendingDecision {
    pub allowed: bool,
    pub reason: Option<DenyReason>,
}

impl SpendingDecision {
    pub fn allow() -> Self {
        Self {
            allowed: true,
            reason: None,
        }
    }

    pub fn deny(reason: DenyReason) -> Self {
        Self {
            allowed: false,
            reason: Some(reason),
        }
    }
}

/// Evaluate `amount` against the agent's state and caps, in order:
/// lifecycle, single transaction, daily, monthly
pub fn evaluate(agent: &AgentAccount, amount: Decimal) -> SpendingDecision {
    if !agent.is_active() {
        return SpendingDecision::deny(DenyReason::AgentNotActive {
            status: agent.status,
        });
    }
    let limits = match &agent.spending_limits {
        Some(limits) => limits,
        None => return SpendingDecision::allow(),
    };

    if let Some(limit) = limits.single_tx_limit {
        if amount > limit {
            return SpendingDecision::deny(DenyReason::SingleTxLimitExceeded { limit });
        }
    }
    if let Some(limit) = limits.daily_limit {
        if exceeds(agent.used_today_amount, amount, limit) {
            return SpendingDecision::deny(DenyReason::DailyLimitExceeded {
                limit,
                used: agent.used_today_amount,
            });
        }
    }
    if let Some(limit) = limits.monthly_limit {
        if exceeds(agent.used_month_amount, amount, limit) {
            return SpendingDecision::deny(DenyReason::MonthlyLimitExceeded {
                limit,
                used: agent.used_month_amount,
            });
        }
    }
    SpendingDecision::allow()
}

/// An unrepresentable total is over any cap
fn exceeds(used: Decimal, amount: Decimal, limit: Decimal) -> bool {
    used.checked_add(amount).map_or(true, |total| total > limit)
}

/// Spending gate and counters for agents
#[derive(Clone)]
pub struct SpendingPolicyEvaluator {
    agents: Arc<dyn AgentStore>,
}

impl SpendingPolicyEvaluator {
    pub fn new(agents: Arc<dyn AgentStore>) -> Self {
        Self { agents }
    }

    /// Read-only allow/deny for a proposed spend
    pub async fn check_spending_limit(
        &self,
        agent_id: &AgentId,
        amount: Decimal,
    ) -> Result<SpendingDecision> {
        let amount = require_positive(amount)?;
        let agent = self
            .agents
            .find(agent_id)
            .await?
            .ok_or_else(|| AgentError::not_found(agent_id))?;

        let decision = evaluate(&agent, amount);
        if let Some(reason) = &decision.reason {
            warn!(agent_id = %agent_id, %amount, %reason, "spend denied");
        }
        Ok(decision)
    }

    /// Count a completed spend, whether or not the ledger operation succeeded
    pub async fn record_spending(
        &self,
        agent_id: &AgentId,
        amount: Decimal,
        success: bool,
    ) -> Result<AgentAccount> {
        let amount = require_positive(amount)?;
        let agent = self
            .agents
            .record_spending(agent_id, amount, success, Utc::now())
            .await?;
        info!(
            agent_id = %agent_id,
            %amount,
            success,
            used_today = %agent.used_today_amount,
            "spend recorded"
        );
        Ok(agent)
    }

    pub async fn update_credit_score(
        &self,
        agent_id: &AgentId,
        delta: Decimal,
        reason: Option<String>,
    ) -> Result<AgentAccount> {
        if delta.normalize().scale() > CREDIT_SCORE_SCALE {
            return Err(AgentError::InvalidAmount {
                message: format!(
                    "credit score delta {} has more than {} decimal places",
                    delta, CREDIT_SCORE_SCALE
                ),
            });
        }
        let agent = self
            .agents
            .update(agent_id, &mut |agent: &mut AgentAccount| {
                agent.adjust_credit_score(delta, reason.clone(), Utc::now());
                Ok(())
            })
            .await?;
        info!(
            agent_id = %agent_id,
            %delta,
            score = %agent.credit_score,
            risk_level = %agent.risk_level,
            "credit score updated"
        );
        Ok(agent)
    }

    pub async fn reset_daily_usage(&self) -> Result<u64> {
        let touched = self.agents.reset_daily_usage().await?;
        info!(agents = touched, "daily usage reset");
        Ok(touched)
    }

    pub async fn reset_monthly_usage(&self) -> Result<u64> {
        let touched = self.agents.reset_monthly_usage().await?;
        info!(agents = touched, "monthly usage reset");
        Ok(touched)
    }
}

fn require_positive(amount: Decimal) -> Result<Decimal> {
    if amount <= Decimal::ZERO {
        return Err(AgentError::InvalidAmount {
            message: format!("amount must be greater than zero, got {}", amount),
        });
    }
    if amount.normalize().scale() > AMOUNT_SCALE {
        return Err(AgentError::InvalidAmount {
            message: format!("{} has more than {} decimal places", amount, AMOUNT_SCALE),
        });
    }
    Ok(amount)
}
