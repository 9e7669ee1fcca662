//! Database models - mapped from PostgreSQL tables
//!
//! Enum columns are stored as their lower-case string form and parsed back on
//! read; a value that does not parse is reported as a storage error.

use std::collections::BTreeMap;
use std::str::FromStr;

use agentrix_agent::{AgentAccount, AgentCallbacks, CreditScoreChange, SpendingLimits};
use agentrix_ledger::{Account, AccountLimits, HistoryEntry};
use agentrix_types::{AccountId, AgentId, HistoryEntryId};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::types::Json;
use sqlx::FromRow;
use uuid::Uuid;

fn parse_column<T>(column: &str, value: &str) -> Result<T, String>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value
        .parse()
        .map_err(|err| format!("column {}: {}", column, err))
}

// ============================================================================
// Account Models
// ============================================================================

pub(crate) const ACCOUNT_COLUMNS: &str = "id, account_code, name, owner_id, owner_type, user_id, \
     wallet_type, chain_type, wallet_address, custody_wallet_id, currency, available_balance, \
     frozen_balance, pending_balance, multi_currency_balances, balance_updated_at, \
     single_tx_limit, daily_limit, monthly_limit, status, status_reason, total_deposit, \
     total_withdraw, transaction_count, is_default, metadata, created_at, updated_at";

#[derive(Debug, Clone, FromRow)]
pub struct DbAccount {
    pub id: Uuid,
    pub account_code: String,
    pub name: String,
    pub owner_id: String,
    pub owner_type: String,
    pub user_id: Option<String>,
    pub wallet_type: String,
    pub chain_type: String,
    pub wallet_address: Option<String>,
    pub custody_wallet_id: Option<String>,
    pub currency: String,
    pub available_balance: Decimal,
    pub frozen_balance: Decimal,
    pub pending_balance: Decimal,
    pub multi_currency_balances: Json<BTreeMap<String, Decimal>>,
    pub balance_updated_at: Option<DateTime<Utc>>,
    pub single_tx_limit: Option<Decimal>,
    pub daily_limit: Option<Decimal>,
    pub monthly_limit: Option<Decimal>,
    pub status: String,
    pub status_reason: Option<String>,
    pub total_deposit: Decimal,
    pub total_withdraw: Decimal,
    pub transaction_count: i64,
    pub is_default: bool,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl DbAccount {
    pub fn into_account(self) -> Result<Account, String> {
        Ok(Account {
            id: AccountId::from_uuid(self.id),
            account_code: self.account_code,
            name: self.name,
            owner_id: self.owner_id,
            owner_type: parse_column("owner_type", &self.owner_type)?,
            user_id: self.user_id,
            wallet_type: parse_column("wallet_type", &self.wallet_type)?,
            chain_type: parse_column("chain_type", &self.chain_type)?,
            wallet_address: self.wallet_address,
            custody_wallet_id: self.custody_wallet_id,
            currency: self.currency,
            available_balance: self.available_balance,
            frozen_balance: self.frozen_balance,
            pending_balance: self.pending_balance,
            multi_currency_balances: self.multi_currency_balances.0,
            balance_updated_at: self.balance_updated_at,
            limits: AccountLimits {
                single_tx_limit: self.single_tx_limit,
                daily_limit: self.daily_limit,
                monthly_limit: self.monthly_limit,
            },
            status: parse_column("status", &self.status)?,
            status_reason: self.status_reason,
            total_deposit: self.total_deposit,
            total_withdraw: self.total_withdraw,
            transaction_count: self.transaction_count,
            is_default: self.is_default,
            metadata: self.metadata,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

pub(crate) const HISTORY_COLUMNS: &str = "id, account_id, kind, amount, currency, direction, \
     counterparty_id, reference, description, reason, created_at";

#[derive(Debug, Clone, FromRow)]
pub struct DbHistoryEntry {
    pub id: Uuid,
    pub account_id: Uuid,
    pub kind: String,
    pub amount: Decimal,
    pub currency: String,
    pub direction: Option<String>,
    pub counterparty_id: Option<Uuid>,
    pub reference: Option<String>,
    pub description: Option<String>,
    pub reason: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl DbHistoryEntry {
    pub fn into_entry(self) -> Result<HistoryEntry, String> {
        let direction = match self.direction.as_deref() {
            Some(direction) => Some(parse_column("direction", direction)?),
            None => None,
        };
        Ok(HistoryEntry {
            id: HistoryEntryId::from_uuid(self.id),
            account_id: AccountId::from_uuid(self.account_id),
            kind: parse_column("kind", &self.kind)?,
            amount: self.amount,
            currency: self.currency,
            direction,
            counterparty: self.counterparty_id.map(AccountId::from_uuid),
            reference: self.reference,
            description: self.description,
            reason: self.reason,
            created_at: self.created_at,
        })
    }
}

// ============================================================================
// Agent Models
// ============================================================================

pub(crate) const AGENT_COLUMNS: &str = "id, agent_unique_id, name, description, avatar_url, \
     owner_id, agent_type, capabilities, spending_limits, callbacks, metadata, status, \
     status_reason, credit_score, credit_score_updated_at, risk_level, credit_history, \
     default_account_id, external_wallet_address, used_today_amount, used_month_amount, \
     total_transactions, successful_transactions, failed_transactions, \
     total_transaction_amount, activated_at, last_active_at, created_at, updated_at";

#[derive(Debug, Clone, FromRow)]
pub struct DbAgent {
    pub id: Uuid,
    pub agent_unique_id: String,
    pub name: String,
    pub description: Option<String>,
    pub avatar_url: Option<String>,
    pub owner_id: String,
    pub agent_type: String,
    pub capabilities: Json<Vec<String>>,
    pub spending_limits: Option<Json<SpendingLimits>>,
    pub callbacks: Option<Json<AgentCallbacks>>,
    pub metadata: serde_json::Value,
    pub status: String,
    pub status_reason: Option<String>,
    pub credit_score: Decimal,
    pub credit_score_updated_at: Option<DateTime<Utc>>,
    pub risk_level: String,
    pub credit_history: Json<Vec<CreditScoreChange>>,
    pub default_account_id: Option<Uuid>,
    pub external_wallet_address: Option<String>,
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

impl DbAgent {
    pub fn into_agent(self) -> Result<AgentAccount, String> {
        Ok(AgentAccount {
            id: AgentId::from_uuid(self.id),
            agent_unique_id: self.agent_unique_id,
            name: self.name,
            description: self.description,
            avatar_url: self.avatar_url,
            owner_id: self.owner_id,
            agent_type: parse_column("agent_type", &self.agent_type)?,
            capabilities: self.capabilities.0,
            spending_limits: self.spending_limits.map(|limits| limits.0),
            callbacks: self.callbacks.map(|callbacks| callbacks.0),
            metadata: self.metadata,
            status: parse_column("status", &self.status)?,
            status_reason: self.status_reason,
            credit_score: self.credit_score,
            credit_score_updated_at: self.credit_score_updated_at,
            risk_level: parse_column("risk_level", &self.risk_level)?,
            credit_history: self.credit_history.0,
            default_account_id: self.default_account_id.map(AccountId::from_uuid),
            external_wallet_address: self.external_wallet_address,
            used_today_amount: self.used_today_amount,
            used_month_amount: self.used_month_amount,
            total_transactions: self.total_transactions,
            successful_transactions: self.successful_transactions,
            failed_transactions: self.failed_transactions,
            total_transaction_amount: self.total_transaction_amount,
            activated_at: self.activated_at,
            last_active_at: self.last_active_at,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}
