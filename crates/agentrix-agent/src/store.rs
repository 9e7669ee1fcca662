//! Agent storage seam

use agentrix_types::AgentId;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use crate::{AgentAccount, AgentPage, PageRequest, Result};

/// Body of a read-modify-write on one agent row
pub type AgentMutation<'a> = dyn FnMut(&mut AgentAccount) -> Result<()> + Send + 'a;

/// Durable agent storage
#[async_trait]
pub trait AgentStore: Send + Sync {
    async fn insert(&self, agent: AgentAccount) -> Result<AgentAccount>;

    async fn find(&self, id: &AgentId) -> Result<Option<AgentAccount>>;

    async fn find_by_unique_id(&self, unique_id: &str) -> Result<Option<AgentAccount>>;

    /// Newest first, with the owner's total agent count
    async fn list_by_owner(&self, owner_id: &str, page: PageRequest) -> Result<AgentPage>;

    /// Apply `mutation` to the row under an exclusive lock
    ///
    /// Returns `AgentNotFound` for unknown ids. When the mutation fails
    /// nothing is written. The usage counters are left to
    /// [`record_spending`](Self::record_spending) and the resets; changes the
    /// mutation makes to them are not persisted.
    async fn update(&self, id: &AgentId, mutation: &mut AgentMutation<'_>) -> Result<AgentAccount>;

    /// Add `amount` to both rolling counters and bump the outcome counters
    async fn record_spending(
        &self,
        id: &AgentId,
        amount: Decimal,
        success: bool,
        at: DateTime<Utc>,
    ) -> Result<AgentAccount>;

    /// Zero `used_today_amount` on every active agent; returns how many were touched
    async fn reset_daily_usage(&self) -> Result<u64>;

    /// Zero `used_month_amount` on every active agent; returns how many were touched
    async fn reset_monthly_usage(&self) -> Result<u64>;
}
