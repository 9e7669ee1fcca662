//! Agent account repository

use agentrix_agent::{AgentAccount, AgentError, AgentMutation, AgentPage, AgentStore, PageRequest, Result};
use agentrix_types::AgentId;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::types::Json;
use sqlx::PgPool;

use crate::error::agent_storage;
use crate::models::{DbAgent, AGENT_COLUMNS};

const UNIQUE_ID_INDEX: &str = "agent_accounts_agent_unique_id_key";

/// PostgreSQL-backed agent store
///
/// Usage counters only ever change through single-statement increments and
/// resets, so concurrent `record_spending` calls never lose an update.
#[derive(Clone)]
pub struct PgAgentStore {
    pool: PgPool,
}

impl PgAgentStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn decode(row: DbAgent) -> Result<AgentAccount> {
        row.into_agent().map_err(AgentError::storage)
    }
}

#[async_trait]
impl AgentStore for PgAgentStore {
    async fn insert(&self, agent: AgentAccount) -> Result<AgentAccount> {
        let row = sqlx::query_as::<_, DbAgent>(&format!(
            r#"
            INSERT INTO agent_accounts
                (id, agent_unique_id, name, description, avatar_url, owner_id, agent_type,
                 capabilities, spending_limits, callbacks, metadata, status, status_reason,
                 credit_score, credit_score_updated_at, risk_level, credit_history,
                 default_account_id, external_wallet_address, used_today_amount,
                 used_month_amount, total_transactions, successful_transactions,
                 failed_transactions, total_transaction_amount, activated_at, last_active_at,
                 created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17,
                    $18, $19, $20, $21, $22, $23, $24, $25, $26, $27, $28, $29)
            RETURNING {}
            "#,
            AGENT_COLUMNS
        ))
        .bind(agent.id.0)
        .bind(&agent.agent_unique_id)
        .bind(&agent.name)
        .bind(&agent.description)
        .bind(&agent.avatar_url)
        .bind(&agent.owner_id)
        .bind(agent.agent_type.as_str())
        .bind(Json(&agent.capabilities))
        .bind(agent.spending_limits.as_ref().map(Json))
        .bind(agent.callbacks.as_ref().map(Json))
        .bind(&agent.metadata)
        .bind(agent.status.as_str())
        .bind(&agent.status_reason)
        .bind(agent.credit_score)
        .bind(agent.credit_score_updated_at)
        .bind(agent.risk_level.as_str())
        .bind(Json(&agent.credit_history))
        .bind(agent.default_account_id.map(|id| id.0))
        .bind(&agent.external_wallet_address)
        .bind(agent.used_today_amount)
        .bind(agent.used_month_amount)
        .bind(agent.total_transactions)
        .bind(agent.successful_transactions)
        .bind(agent.failed_transactions)
        .bind(agent.total_transaction_amount)
        .bind(agent.activated_at)
        .bind(agent.last_active_at)
        .bind(agent.created_at)
        .bind(agent.updated_at)
        .fetch_one(&self.pool)
        .await
        .map_err(|err| {
            let duplicate = err
                .as_database_error()
                .map(|db| db.is_unique_violation() && db.constraint() == Some(UNIQUE_ID_INDEX))
                .unwrap_or(false);
            if duplicate {
                AgentError::InvalidInput {
                    message: format!("agent code {} already exists", agent.agent_unique_id),
                }
            } else {
                agent_storage(err)
            }
        })?;
        Self::decode(row)
    }

    async fn find(&self, id: &AgentId) -> Result<Option<AgentAccount>> {
        let row = sqlx::query_as::<_, DbAgent>(&format!(
            "SELECT {} FROM agent_accounts WHERE id = $1",
            AGENT_COLUMNS
        ))
        .bind(id.0)
        .fetch_optional(&self.pool)
        .await
        .map_err(agent_storage)?;
        row.map(Self::decode).transpose()
    }

    async fn find_by_unique_id(&self, unique_id: &str) -> Result<Option<AgentAccount>> {
        let row = sqlx::query_as::<_, DbAgent>(&format!(
            "SELECT {} FROM agent_accounts WHERE agent_unique_id = $1",
            AGENT_COLUMNS
        ))
        .bind(unique_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(agent_storage)?;
        row.map(Self::decode).transpose()
    }

    async fn list_by_owner(&self, owner_id: &str, page: PageRequest) -> Result<AgentPage> {
        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM agent_accounts WHERE owner_id = $1")
            .bind(owner_id)
            .fetch_one(&self.pool)
            .await
            .map_err(agent_storage)?;

        let rows = sqlx::query_as::<_, DbAgent>(&format!(
            r#"
            SELECT {} FROM agent_accounts
            WHERE owner_id = $1
            ORDER BY created_at DESC
            LIMIT $2 OFFSET $3
            "#,
            AGENT_COLUMNS
        ))
        .bind(owner_id)
        .bind(i64::from(page.limit))
        .bind(i64::try_from(page.offset()).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await
        .map_err(agent_storage)?;

        Ok(AgentPage {
            items: rows.into_iter().map(Self::decode).collect::<Result<_>>()?,
            total: u64::try_from(total).unwrap_or_default(),
        })
    }

    async fn update(&self, id: &AgentId, mutation: &mut AgentMutation<'_>) -> Result<AgentAccount> {
        let mut tx = self.pool.begin().await.map_err(agent_storage)?;

        let row = sqlx::query_as::<_, DbAgent>(&format!(
            "SELECT {} FROM agent_accounts WHERE id = $1 FOR UPDATE",
            AGENT_COLUMNS
        ))
        .bind(id.0)
        .fetch_optional(&mut *tx)
        .await
        .map_err(agent_storage)?
        .ok_or_else(|| AgentError::not_found(id))?;

        let mut agent = Self::decode(row)?;
        mutation(&mut agent)?;

        // Usage counters belong to record_spending and the resets
        let row = sqlx::query_as::<_, DbAgent>(&format!(
            r#"
            UPDATE agent_accounts
            SET name = $2,
                description = $3,
                avatar_url = $4,
                agent_type = $5,
                capabilities = $6,
                spending_limits = $7,
                callbacks = $8,
                metadata = $9,
                status = $10,
                status_reason = $11,
                credit_score = $12,
                credit_score_updated_at = $13,
                risk_level = $14,
                credit_history = $15,
                default_account_id = $16,
                external_wallet_address = $17,
                activated_at = $18,
                updated_at = NOW()
            WHERE id = $1
            RETURNING {}
            "#,
            AGENT_COLUMNS
        ))
        .bind(id.0)
        .bind(&agent.name)
        .bind(&agent.description)
        .bind(&agent.avatar_url)
        .bind(agent.agent_type.as_str())
        .bind(Json(&agent.capabilities))
        .bind(agent.spending_limits.as_ref().map(Json))
        .bind(agent.callbacks.as_ref().map(Json))
        .bind(&agent.metadata)
        .bind(agent.status.as_str())
        .bind(&agent.status_reason)
        .bind(agent.credit_score)
        .bind(agent.credit_score_updated_at)
        .bind(agent.risk_level.as_str())
        .bind(Json(&agent.credit_history))
        .bind(agent.default_account_id.map(|id| id.0))
        .bind(&agent.external_wallet_address)
        .bind(agent.activated_at)
        .fetch_one(&mut *tx)
        .await
        .map_err(agent_storage)?;

        tx.commit().await.map_err(agent_storage)?;
        Self::decode(row)
    }

    async fn record_spending(
        &self,
        id: &AgentId,
        amount: Decimal,
        success: bool,
        at: DateTime<Utc>,
    ) -> Result<AgentAccount> {
        let row = sqlx::query_as::<_, DbAgent>(&format!(
            r#"
            UPDATE agent_accounts
            SET used_today_amount = used_today_amount + $2,
                used_month_amount = used_month_amount + $2,
                total_transactions = total_transactions + 1,
                successful_transactions = successful_transactions + CASE WHEN $3 THEN 1 ELSE 0 END,
                failed_transactions = failed_transactions + CASE WHEN $3 THEN 0 ELSE 1 END,
                total_transaction_amount = total_transaction_amount + $2,
                last_active_at = $4,
                updated_at = $4
            WHERE id = $1
            RETURNING {}
            "#,
            AGENT_COLUMNS
        ))
        .bind(id.0)
        .bind(amount)
        .bind(success)
        .bind(at)
        .fetch_optional(&self.pool)
        .await
        .map_err(agent_storage)?
        .ok_or_else(|| AgentError::not_found(id))?;
        Self::decode(row)
    }

    async fn reset_daily_usage(&self) -> Result<u64> {
        let result = sqlx::query(
            "UPDATE agent_accounts SET used_today_amount = 0, updated_at = NOW() WHERE status = 'active'",
        )
        .execute(&self.pool)
        .await
        .map_err(agent_storage)?;
        Ok(result.rows_affected())
    }

    async fn reset_monthly_usage(&self) -> Result<u64> {
        let result = sqlx::query(
            "UPDATE agent_accounts SET used_month_amount = 0, updated_at = NOW() WHERE status = 'active'",
        )
        .execute(&self.pool)
        .await
        .map_err(agent_storage)?;
        Ok(result.rows_affected())
    }
}
