//! In-memory agent store

use std::sync::Arc;

use agentrix_types::AgentId;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use rust_decimal::Decimal;
use tokio::sync::Mutex;

use crate::{AgentAccount, AgentError, AgentMutation, AgentPage, AgentStore, PageRequest, Result};

/// Agent store backed by process memory, one lock per agent row
#[derive(Default)]
pub struct MemoryAgentStore {
    agents: DashMap<AgentId, Arc<Mutex<AgentAccount>>>,
    unique_ids: DashMap<String, AgentId>,
}

impl MemoryAgentStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn cell(&self, id: &AgentId) -> Result<Arc<Mutex<AgentAccount>>> {
        self.agents
            .get(id)
            .map(|cell| cell.value().clone())
            .ok_or_else(|| AgentError::not_found(id))
    }

    fn cells(&self) -> Vec<Arc<Mutex<AgentAccount>>> {
        self.agents.iter().map(|cell| cell.value().clone()).collect()
    }
}

#[async_trait]
impl AgentStore for MemoryAgentStore {
    async fn insert(&self, agent: AgentAccount) -> Result<AgentAccount> {
        match self.unique_ids.entry(agent.agent_unique_id.clone()) {
            Entry::Occupied(_) => {
                return Err(AgentError::invalid_input(format!(
                    "agent code {} already exists",
                    agent.agent_unique_id
                )))
            }
            Entry::Vacant(slot) => {
                slot.insert(agent.id);
            }
        }
        self.agents
            .insert(agent.id, Arc::new(Mutex::new(agent.clone())));
        Ok(agent)
    }

    async fn find(&self, id: &AgentId) -> Result<Option<AgentAccount>> {
        let cell = match self.agents.get(id) {
            Some(cell) => cell.value().clone(),
            None => return Ok(None),
        };
        let agent = cell.lock().await.clone();
        Ok(Some(agent))
    }

    async fn find_by_unique_id(&self, unique_id: &str) -> Result<Option<AgentAccount>> {
        let id = match self.unique_ids.get(unique_id) {
            Some(id) => *id.value(),
            None => return Ok(None),
        };
        self.find(&id).await
    }

    async fn list_by_owner(&self, owner_id: &str, page: PageRequest) -> Result<AgentPage> {
        let mut owned = Vec::new();
        for cell in self.cells() {
            let agent = cell.lock().await;
            if agent.owner_id == owner_id {
                owned.push(agent.clone());
            }
        }
        owned.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        let total = owned.len() as u64;
        let items = owned
            .into_iter()
            .skip(page.offset() as usize)
            .take(page.limit as usize)
            .collect();
        Ok(AgentPage { items, total })
    }

    async fn update(&self, id: &AgentId, mutation: &mut AgentMutation<'_>) -> Result<AgentAccount> {
        let cell = self.cell(id)?;
        let mut stored = cell.lock().await;

        let mut working = stored.clone();
        mutation(&mut working)?;

        working.used_today_amount = stored.used_today_amount;
        working.used_month_amount = stored.used_month_amount;
        working.total_transactions = stored.total_transactions;
        working.successful_transactions = stored.successful_transactions;
        working.failed_transactions = stored.failed_transactions;
        working.total_transaction_amount = stored.total_transaction_amount;
        working.last_active_at = stored.last_active_at;
        working.updated_at = Utc::now();

        *stored = working.clone();
        Ok(working)
    }

    async fn record_spending(
        &self,
        id: &AgentId,
        amount: Decimal,
        success: bool,
        at: DateTime<Utc>,
    ) -> Result<AgentAccount> {
        let cell = self.cell(id)?;
        let mut agent = cell.lock().await;
        agent.record_spend(amount, success, at)?;
        agent.updated_at = at;
        Ok(agent.clone())
    }

    async fn reset_daily_usage(&self) -> Result<u64> {
        let mut touched = 0;
        for cell in self.cells() {
            let mut agent = cell.lock().await;
            if agent.is_active() {
                agent.used_today_amount = Decimal::ZERO;
                agent.updated_at = Utc::now();
                touched += 1;
            }
        }
        Ok(touched)
    }

    async fn reset_monthly_usage(&self) -> Result<u64> {
        let mut touched = 0;
        for cell in self.cells() {
            let mut agent = cell.lock().await;
            if agent.is_active() {
                agent.used_month_amount = Decimal::ZERO;
                agent.updated_at = Utc::now();
                touched += 1;
            }
        }
        Ok(touched)
    }
}
