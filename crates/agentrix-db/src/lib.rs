//! Agentrix Database Layer
//!
//! PostgreSQL persistence for the unified ledger and the agent registry.
//!
//! # Architecture
//!
//! - **accounts / account_history**: [`PgAccountStore`], the durable
//!   [`AccountStore`](agentrix_ledger::AccountStore) behind [`Ledger`]
//! - **agent_accounts**: [`PgAgentStore`], the durable
//!   [`AgentStore`](agentrix_agent::AgentStore)
//!
//! Schema changes live in `migrations/` and are applied with
//! [`Database::migrate`].

pub mod config;
pub mod error;
pub mod models;
pub mod repos;

use std::sync::Arc;

use agentrix_ledger::{Ledger, LedgerConfig};
use sqlx::postgres::{PgPool, PgPoolOptions};
use tracing::info;

pub use config::DatabaseConfig;
pub use error::{DbError, DbResult};
pub use models::*;
pub use repos::*;

/// Database connection pool
#[derive(Clone)]
pub struct Database {
    /// PostgreSQL connection pool
    pub pg: PgPool,
}

impl Database {
    /// Connect to PostgreSQL
    pub async fn connect(config: &DatabaseConfig) -> DbResult<Self> {
        info!("Connecting to PostgreSQL: {}", config.postgres_url_masked());

        let pg = PgPoolOptions::new()
            .max_connections(config.pg_max_connections)
            .min_connections(config.pg_min_connections)
            .acquire_timeout(std::time::Duration::from_secs(config.pg_acquire_timeout_secs))
            .connect(&config.postgres_url)
            .await
            .map_err(|e| DbError::Connection(format!("PostgreSQL: {}", e)))?;

        info!("Connected to PostgreSQL");
        Ok(Self { pg })
    }

    /// Run database migrations
    pub async fn migrate(&self) -> DbResult<()> {
        info!("Running database migrations...");
        sqlx::migrate!("./migrations")
            .run(&self.pg)
            .await
            .map_err(|e| DbError::Migration(e.to_string()))?;
        info!("Migrations complete");
        Ok(())
    }

    pub async fn health_check(&self) -> DbResult<HealthStatus> {
        let postgres = sqlx::query("SELECT 1").fetch_one(&self.pg).await.is_ok();
        Ok(HealthStatus {
            postgres,
            healthy: postgres,
        })
    }

    pub fn account_store(&self, history_retention: usize) -> PgAccountStore {
        PgAccountStore::new(self.pg.clone(), history_retention)
    }

    pub fn agent_store(&self) -> PgAgentStore {
        PgAgentStore::new(self.pg.clone())
    }

    /// Ledger engine over the `accounts` table
    pub fn ledger(&self, config: LedgerConfig) -> Ledger {
        let store = self.account_store(config.history_retention);
        Ledger::new(Arc::new(store), config)
    }
}

/// Health status of the database connection
#[derive(Debug, Clone)]
pub struct HealthStatus {
    pub postgres: bool,
    pub healthy: bool,
}
