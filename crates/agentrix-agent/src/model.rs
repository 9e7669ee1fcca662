//! Agent identity, lifecycle and spending counters

use agentrix_ledger::account::normalize_currency;
use agentrix_types::{generate_agent_code, AccountId, AgentId, AgentStatus, AgentType, RiskLevel};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::credit::{
    adjust_score, risk_level_for, CreditScoreChange, CREDIT_HISTORY_LIMIT, INITIAL_CREDIT_SCORE,
};
use crate::{AgentError, Result};

/// Per-agent spending caps
///
/// An absent cap never denies. A cap of zero is a real cap and denies every
/// spend; leave the field `None` for no limit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpendingLimits {
    pub single_tx_limit: Option<Decimal>,
    pub daily_limit: Option<Decimal>,
    pub monthly_limit: Option<Decimal>,
    /// Currency of the caps, also the primary currency of the agent's default account
    #[serde(default = "default_limit_currency")]
    pub currency: String,
}

fn default_limit_currency() -> String {
    agentrix_types::DEFAULT_CURRENCY.to_string()
}

impl Default for SpendingLimits {
    fn default() -> Self {
        Self {
            single_tx_limit: None,
            daily_limit: None,
            monthly_limit: None,
            currency: default_limit_currency(),
        }
    }
}

impl SpendingLimits {
    pub fn new(currency: impl Into<String>) -> Self {
        Self {
            currency: currency.into(),
            ..Self::default()
        }
    }

    pub fn single_tx(mut self, limit: Decimal) -> Self {
        self.single_tx_limit = Some(limit);
        self
    }

    pub fn daily(mut self, limit: Decimal) -> Self {
        self.daily_limit = Some(limit);
        self
    }

    pub fn monthly(mut self, limit: Decimal) -> Self {
        self.monthly_limit = Some(limit);
        self
    }

    fn normalized(mut self) -> Result<Self> {
        for (name, limit) in [
            ("single_tx_limit", self.single_tx_limit),
            ("daily_limit", self.daily_limit),
            ("monthly_limit", self.monthly_limit),
        ] {
            if matches!(limit, Some(l) if l.is_sign_negative() && !l.is_zero()) {
                return Err(AgentError::invalid_input(format!(
                    "{} must not be negative",
                    name
                )));
            }
        }
        self.currency = normalize_currency(&self.currency)
            .map_err(|err| AgentError::invalid_input(err.to_string()))?;
        Ok(self)
    }
}

/// Callback URLs the agent's operator registered
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentCallbacks {
    pub webhook_url: Option<String>,
    pub payment_success_url: Option<String>,
    pub payment_failure_url: Option<String>,
    pub auth_callback_url: Option<String>,
}

/// An autonomous agent with its own ledger account and spending policy
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentAccount {
    pub id: AgentId,
    /// External-facing `AGT-…` code
    pub agent_unique_id: String,
    pub name: String,
    pub description: Option<String>,
    pub avatar_url: Option<String>,
    /// Human user that operates the agent
    pub owner_id: String,
    pub agent_type: AgentType,
    pub capabilities: Vec<String>,
    pub spending_limits: Option<SpendingLimits>,
    pub callbacks: Option<AgentCallbacks>,
    pub metadata: serde_json::Value,

    pub status: AgentStatus,
    pub status_reason: Option<String>,

    pub credit_score: Decimal,
    pub credit_score_updated_at: Option<DateTime<Utc>>,
    pub risk_level: RiskLevel,
    /// Newest last
    pub credit_history: Vec<CreditScoreChange>,

    pub default_account_id: Option<AccountId>,
    pub external_wallet_address: Option<String>,

    // Rolling usage, zeroed by the periodic resets
    pub used_today_amount: Decimal,
    pub used_month_amount: Decimal,

    pub total_transactions: i64,
    pub successful_transactions: i64,
    pub failed_transactions: i64,
    pub total_transaction_amount: Decimal,

    pub activated_at: Option<DateTime<Utc>>,
    pub last_active_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Request to register an agent
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewAgent {
    pub name: String,
    pub owner_id: String,
    pub description: Option<String>,
    pub avatar_url: Option<String>,
    pub agent_type: Option<AgentType>,
    pub capabilities: Vec<String>,
    pub spending_limits: Option<SpendingLimits>,
    pub callbacks: Option<AgentCallbacks>,
    pub metadata: Option<serde_json::Value>,
}

impl NewAgent {
    pub fn new(name: impl Into<String>, owner_id: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            owner_id: owner_id.into(),
            description: None,
            avatar_url: None,
            agent_type: None,
            capabilities: Vec::new(),
            spending_limits: None,
            callbacks: None,
            metadata: None,
        }
    }

    pub fn agent_type(mut self, agent_type: AgentType) -> Self {
        self.agent_type = Some(agent_type);
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn capabilities<I, S>(mut self, capabilities: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.capabilities = capabilities.into_iter().map(Into::into).collect();
        self
    }

    pub fn spending_limits(mut self, limits: SpendingLimits) -> Self {
        self.spending_limits = Some(limits);
        self
    }

    pub fn callbacks(mut self, callbacks: AgentCallbacks) -> Self {
        self.callbacks = Some(callbacks);
        self
    }

    pub fn metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = Some(metadata);
        self
    }

    /// Validate and materialize a draft agent
    pub fn into_agent(self) -> Result<AgentAccount> {
        let name = self.name.trim().to_string();
        if name.is_empty() {
            return Err(AgentError::invalid_input("agent name is required"));
        }
        if self.owner_id.trim().is_empty() {
            return Err(AgentError::invalid_input("owner id is required"));
        }
        let spending_limits = self
            .spending_limits
            .map(SpendingLimits::normalized)
            .transpose()?;

        let now = Utc::now();
        Ok(AgentAccount {
            id: AgentId::new(),
            agent_unique_id: generate_agent_code(),
            name,
            description: self.description,
            avatar_url: self.avatar_url,
            owner_id: self.owner_id,
            agent_type: self.agent_type.unwrap_or_default(),
            capabilities: self.capabilities,
            spending_limits,
            callbacks: self.callbacks,
            metadata: self.metadata.unwrap_or(serde_json::Value::Null),
            status: AgentStatus::Draft,
            status_reason: None,
            credit_score: INITIAL_CREDIT_SCORE,
            credit_score_updated_at: None,
            risk_level: risk_level_for(INITIAL_CREDIT_SCORE),
            credit_history: Vec::new(),
            default_account_id: None,
            external_wallet_address: None,
            used_today_amount: Decimal::ZERO,
            used_month_amount: Decimal::ZERO,
            total_transactions: 0,
            successful_transactions: 0,
            failed_transactions: 0,
            total_transaction_amount: Decimal::ZERO,
            activated_at: None,
            last_active_at: None,
            created_at: now,
            updated_at: now,
        })
    }
}

/// Partial update; `None` leaves the field as is
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AgentUpdate {
    pub name: Option<String>,
    pub description: Option<String>,
    pub avatar_url: Option<String>,
    pub capabilities: Option<Vec<String>>,
    pub spending_limits: Option<SpendingLimits>,
    pub callbacks: Option<AgentCallbacks>,
    /// Shallow-merged into the existing metadata object
    pub metadata: Option<serde_json::Value>,
}

impl AgentUpdate {
    /// Validate ahead of taking any lock
    pub(crate) fn validated(mut self) -> Result<Self> {
        if let Some(name) = &self.name {
            let name = name.trim();
            if name.is_empty() {
                return Err(AgentError::invalid_input("agent name is required"));
            }
            self.name = Some(name.to_string());
        }
        self.spending_limits = self
            .spending_limits
            .map(SpendingLimits::normalized)
            .transpose()?;
        Ok(self)
    }
}

impl AgentAccount {
    pub fn is_active(&self) -> bool {
        self.status.is_active()
    }

    pub fn apply_update(&mut self, update: AgentUpdate) {
        if let Some(name) = update.name {
            self.name = name;
        }
        if let Some(description) = update.description {
            self.description = Some(description);
        }
        if let Some(avatar_url) = update.avatar_url {
            self.avatar_url = Some(avatar_url);
        }
        if let Some(capabilities) = update.capabilities {
            self.capabilities = capabilities;
        }
        if let Some(limits) = update.spending_limits {
            self.spending_limits = Some(limits);
        }
        if let Some(callbacks) = update.callbacks {
            self.callbacks = Some(callbacks);
        }
        if let Some(patch) = update.metadata {
            merge_metadata(&mut self.metadata, patch);
        }
    }

    fn invalid(&self, action: &'static str) -> AgentError {
        AgentError::InvalidTransition {
            agent: self.id,
            from: self.status,
            action,
        }
    }

    /// draft | suspended → active
    pub fn activate(&mut self, now: DateTime<Utc>) -> Result<()> {
        match self.status {
            AgentStatus::Draft | AgentStatus::Suspended => {
                self.status = AgentStatus::Active;
                self.status_reason = None;
                self.activated_at = Some(now);
                Ok(())
            }
            AgentStatus::Active | AgentStatus::Revoked => Err(self.invalid("activate")),
        }
    }

    /// active → suspended
    pub fn suspend(&mut self, reason: Option<String>) -> Result<()> {
        if self.status != AgentStatus::Active {
            return Err(self.invalid("suspend"));
        }
        self.status = AgentStatus::Suspended;
        self.status_reason = reason;
        Ok(())
    }

    /// suspended → active
    pub fn resume(&mut self) -> Result<()> {
        if self.status != AgentStatus::Suspended {
            return Err(self.invalid("resume"));
        }
        self.status = AgentStatus::Active;
        self.status_reason = None;
        Ok(())
    }

    /// Any state except revoked → revoked
    pub fn revoke(&mut self, reason: Option<String>) -> Result<()> {
        if self.status.is_terminal() {
            return Err(self.invalid("revoke"));
        }
        self.status = AgentStatus::Revoked;
        self.status_reason = reason;
        Ok(())
    }

    /// Returns the audit entry that was appended
    pub fn adjust_credit_score(
        &mut self,
        delta: Decimal,
        reason: Option<String>,
        now: DateTime<Utc>,
    ) -> CreditScoreChange {
        let new_score = adjust_score(self.credit_score, delta);
        self.credit_score = new_score;
        self.risk_level = risk_level_for(new_score);
        self.credit_score_updated_at = Some(now);

        let change = CreditScoreChange {
            delta,
            new_score,
            reason,
            changed_at: now,
        };
        self.credit_history.push(change.clone());
        if self.credit_history.len() > CREDIT_HISTORY_LIMIT {
            let excess = self.credit_history.len() - CREDIT_HISTORY_LIMIT;
            self.credit_history.drain(..excess);
        }
        change
    }

    /// Fold one recorded spend into the counters
    ///
    /// All-or-nothing: an overflowing counter leaves the agent untouched.
    pub fn record_spend(
        &mut self,
        amount: Decimal,
        success: bool,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let used_today = add_usage(self.used_today_amount, amount, "daily usage")?;
        let used_month = add_usage(self.used_month_amount, amount, "monthly usage")?;
        let total_amount =
            add_usage(self.total_transaction_amount, amount, "total transaction amount")?;

        self.used_today_amount = used_today;
        self.used_month_amount = used_month;
        self.total_transaction_amount = total_amount;
        self.total_transactions += 1;
        if success {
            self.successful_transactions += 1;
        } else {
            self.failed_transactions += 1;
        }
        self.last_active_at = Some(now);
        Ok(())
    }
}

fn add_usage(counter: Decimal, amount: Decimal, what: &str) -> Result<Decimal> {
    counter
        .checked_add(amount)
        .ok_or_else(|| AgentError::InvalidAmount {
            message: format!("{} overflow", what),
        })
}

fn merge_metadata(target: &mut serde_json::Value, patch: serde_json::Value) {
    match (target, patch) {
        (serde_json::Value::Object(existing), serde_json::Value::Object(patch)) => {
            for (key, value) in patch {
                existing.insert(key, value);
            }
        }
        (target, patch) => *target = patch,
    }
}

/// Page of agents, newest first
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentPage {
    pub items: Vec<AgentAccount>,
    pub total: u64,
}

/// 1-based page request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRequest {
    pub page: u32,
    pub limit: u32,
}

impl Default for PageRequest {
    fn default() -> Self {
        Self { page: 1, limit: 20 }
    }
}

impl PageRequest {
    pub fn new(page: u32, limit: u32) -> Self {
        Self {
            page: page.max(1),
            limit: limit.clamp(1, 100),
        }
    }

    pub fn offset(&self) -> u64 {
        u64::from(self.page.max(1) - 1) * u64::from(self.limit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use serde_json::json;

    fn draft() -> AgentAccount {
        NewAgent::new("Shopper", "user-1").into_agent().unwrap()
    }

    #[test]
    fn test_new_agent_defaults() {
        let agent = draft();
        assert_eq!(agent.status, AgentStatus::Draft);
        assert_eq!(agent.agent_type, AgentType::Personal);
        assert_eq!(agent.credit_score, dec!(500));
        assert_eq!(agent.risk_level, RiskLevel::Medium);
        assert!(agent.agent_unique_id.starts_with("AGT-"));
        assert!(agent.default_account_id.is_none());
    }

    #[test]
    fn test_limits_validated() {
        let err = NewAgent::new("Shopper", "user-1")
            .spending_limits(SpendingLimits::new("usdc").daily(dec!(-1)))
            .into_agent()
            .unwrap_err();
        assert!(matches!(err, AgentError::InvalidInput { .. }));

        let agent = NewAgent::new("Shopper", "user-1")
            .spending_limits(SpendingLimits::new("usdc").daily(dec!(10)))
            .into_agent()
            .unwrap();
        assert_eq!(agent.spending_limits.unwrap().currency, "USDC");
    }

    #[test]
    fn test_lifecycle_state_machine() {
        let now = Utc::now();
        let mut agent = draft();
        agent.activate(now).unwrap();
        assert_eq!(agent.activated_at, Some(now));
        assert!(agent.activate(now).is_err());
        assert!(agent.resume().is_err());

        agent.suspend(Some("review".into())).unwrap();
        assert_eq!(agent.status_reason.as_deref(), Some("review"));
        assert!(agent.suspend(None).is_err());
        agent.resume().unwrap();
        assert!(agent.status_reason.is_none());

        agent.revoke(None).unwrap();
        for result in [agent.activate(now), agent.resume(), agent.suspend(None), agent.revoke(None)] {
            assert!(matches!(result, Err(AgentError::InvalidTransition { .. })));
        }
    }

    #[test]
    fn test_draft_can_be_revoked() {
        let mut agent = draft();
        agent.revoke(Some("never used".into())).unwrap();
        assert_eq!(agent.status, AgentStatus::Revoked);
    }

    #[test]
    fn test_credit_history_capped() {
        let mut agent = draft();
        for _ in 0..(CREDIT_HISTORY_LIMIT + 5) {
            agent.adjust_credit_score(dec!(1), None, Utc::now());
        }
        assert_eq!(agent.credit_history.len(), CREDIT_HISTORY_LIMIT);
        assert_eq!(agent.credit_score, dec!(605));
        assert_eq!(agent.credit_history.last().unwrap().new_score, dec!(605));
    }

    #[test]
    fn test_record_spend_overflow_leaves_counters() {
        let mut agent = draft();
        agent.used_month_amount = Decimal::MAX;
        let err = agent.record_spend(dec!(1), true, Utc::now()).unwrap_err();
        assert!(matches!(err, AgentError::InvalidAmount { .. }));
        assert_eq!(agent.used_today_amount, Decimal::ZERO);
        assert_eq!(agent.total_transactions, 0);
        assert!(agent.last_active_at.is_none());

        agent.used_month_amount = Decimal::ZERO;
        agent.record_spend(dec!(1), false, Utc::now()).unwrap();
        assert_eq!(agent.failed_transactions, 1);
    }

    #[test]
    fn test_metadata_shallow_merge() {
        let mut agent = NewAgent::new("Shopper", "user-1")
            .metadata(json!({"model": "a", "region": "eu"}))
            .into_agent()
            .unwrap();
        agent.apply_update(AgentUpdate {
            metadata: Some(json!({"model": "b", "tier": 2})),
            ..Default::default()
        });
        assert_eq!(agent.metadata, json!({"model": "b", "region": "eu", "tier": 2}));
    }

    #[test]
    fn test_page_offset() {
        assert_eq!(PageRequest::default().offset(), 0);
        assert_eq!(PageRequest::new(3, 10).offset(), 20);
        assert_eq!(PageRequest::new(0, 0), PageRequest { page: 1, limit: 1 });
    }
}
