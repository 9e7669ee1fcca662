//! Account and history repository
//!
//! Implements [`AccountStore`] on PostgreSQL. A unit of work is one
//! transaction: rows are taken with `SELECT ... FOR UPDATE` in ascending id
//! order, the mutation runs against the locked copies, and the updated rows
//! plus their history are written before `COMMIT`. Dropping the transaction
//! on any error rolls everything back.

use std::collections::HashMap;

use agentrix_ledger::{
    Account, AccountStore, HistoryEntry, HistoryQuery, LedgerError, Mutation, Result,
};
use agentrix_types::{AccountId, Owner};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::types::Json;
use sqlx::{PgPool, Postgres, Transaction};
use tracing::debug;
use uuid::Uuid;

use crate::error::{insert_account_error, ledger_storage};
use crate::models::{DbAccount, DbHistoryEntry, ACCOUNT_COLUMNS, HISTORY_COLUMNS};

/// PostgreSQL-backed account store
#[derive(Clone)]
pub struct PgAccountStore {
    pool: PgPool,
    history_retention: i64,
}

impl PgAccountStore {
    pub fn new(pool: PgPool, history_retention: usize) -> Self {
        Self {
            pool,
            history_retention: i64::try_from(history_retention.max(1)).unwrap_or(i64::MAX),
        }
    }

    fn account_not_found(id: &AccountId) -> LedgerError {
        LedgerError::AccountNotFound {
            account: id.to_string(),
        }
    }

    fn decode(row: DbAccount) -> Result<Account> {
        row.into_account().map_err(LedgerError::storage)
    }

    /// Serialize default changes for one owner until the transaction ends
    async fn lock_owner(tx: &mut Transaction<'_, Postgres>, owner: &Owner) -> Result<()> {
        sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1))")
            .bind(owner.to_string())
            .execute(&mut **tx)
            .await
            .map_err(ledger_storage)?;
        Ok(())
    }

    /// Clear the default flag on the owner's rows, except `keep`
    ///
    /// Rows are locked in id order first so this never interleaves badly
    /// with a concurrent unit of work on the same accounts.
    async fn demote_defaults(
        tx: &mut Transaction<'_, Postgres>,
        owner: &Owner,
        keep: Option<Uuid>,
    ) -> Result<()> {
        sqlx::query(
            "SELECT id FROM accounts WHERE owner_id = $1 AND owner_type = $2 ORDER BY id FOR UPDATE",
        )
        .bind(&owner.id)
        .bind(owner.owner_type.as_str())
        .fetch_all(&mut **tx)
        .await
        .map_err(ledger_storage)?;

        let demoted = sqlx::query(
            r#"
            UPDATE accounts
            SET is_default = FALSE, updated_at = NOW()
            WHERE owner_id = $1 AND owner_type = $2 AND is_default
              AND ($3::uuid IS NULL OR id <> $3)
            "#,
        )
        .bind(&owner.id)
        .bind(owner.owner_type.as_str())
        .bind(keep)
        .execute(&mut **tx)
        .await
        .map_err(ledger_storage)?;

        if demoted.rows_affected() > 0 {
            debug!(owner = %owner, demoted = demoted.rows_affected(), "demoted default account");
        }
        Ok(())
    }

    async fn lock_row(tx: &mut Transaction<'_, Postgres>, id: &AccountId) -> Result<Account> {
        let row = sqlx::query_as::<_, DbAccount>(&format!(
            "SELECT {} FROM accounts WHERE id = $1 FOR UPDATE",
            ACCOUNT_COLUMNS
        ))
        .bind(id.0)
        .fetch_optional(&mut **tx)
        .await
        .map_err(ledger_storage)?
        .ok_or_else(|| Self::account_not_found(id))?;
        Self::decode(row)
    }

    async fn write_row(tx: &mut Transaction<'_, Postgres>, account: &Account) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE accounts
            SET available_balance = $2,
                frozen_balance = $3,
                pending_balance = $4,
                multi_currency_balances = $5,
                balance_updated_at = $6,
                single_tx_limit = $7,
                daily_limit = $8,
                monthly_limit = $9,
                status = $10,
                status_reason = $11,
                total_deposit = $12,
                total_withdraw = $13,
                transaction_count = $14,
                metadata = $15,
                updated_at = $16
            WHERE id = $1
            "#,
        )
        .bind(account.id.0)
        .bind(account.available_balance)
        .bind(account.frozen_balance)
        .bind(account.pending_balance)
        .bind(Json(&account.multi_currency_balances))
        .bind(account.balance_updated_at)
        .bind(account.limits.single_tx_limit)
        .bind(account.limits.daily_limit)
        .bind(account.limits.monthly_limit)
        .bind(account.status.as_str())
        .bind(&account.status_reason)
        .bind(account.total_deposit)
        .bind(account.total_withdraw)
        .bind(account.transaction_count)
        .bind(&account.metadata)
        .bind(account.updated_at)
        .execute(&mut **tx)
        .await
        .map_err(ledger_storage)?;
        Ok(())
    }

    async fn append_history(tx: &mut Transaction<'_, Postgres>, entry: &HistoryEntry) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO account_history
                (id, account_id, kind, amount, currency, direction, counterparty_id,
                 reference, description, reason, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(entry.id.0)
        .bind(entry.account_id.0)
        .bind(entry.kind.as_str())
        .bind(entry.amount)
        .bind(&entry.currency)
        .bind(entry.direction.map(|direction| direction.as_str()))
        .bind(entry.counterparty.map(|counterparty| counterparty.0))
        .bind(&entry.reference)
        .bind(&entry.description)
        .bind(&entry.reason)
        .bind(entry.created_at)
        .execute(&mut **tx)
        .await
        .map_err(ledger_storage)?;
        Ok(())
    }

    async fn trim_history(&self, tx: &mut Transaction<'_, Postgres>, id: Uuid) -> Result<()> {
        sqlx::query(
            r#"
            DELETE FROM account_history
            WHERE account_id = $1
              AND seq NOT IN (
                  SELECT seq FROM account_history
                  WHERE account_id = $1
                  ORDER BY seq DESC
                  LIMIT $2
              )
            "#,
        )
        .bind(id)
        .bind(self.history_retention)
        .execute(&mut **tx)
        .await
        .map_err(ledger_storage)?;
        Ok(())
    }
}

#[async_trait]
impl AccountStore for PgAccountStore {
    async fn insert(&self, account: Account) -> Result<Account> {
        let owner = account.owner();
        let mut tx = self.pool.begin().await.map_err(ledger_storage)?;

        if account.is_default {
            Self::lock_owner(&mut tx, &owner).await?;
            Self::demote_defaults(&mut tx, &owner, None).await?;
        }

        let row = sqlx::query_as::<_, DbAccount>(&format!(
            r#"
            INSERT INTO accounts
                (id, account_code, name, owner_id, owner_type, user_id, wallet_type, chain_type,
                 wallet_address, custody_wallet_id, currency, available_balance, frozen_balance,
                 pending_balance, multi_currency_balances, balance_updated_at, single_tx_limit,
                 daily_limit, monthly_limit, status, status_reason, total_deposit, total_withdraw,
                 transaction_count, is_default, metadata, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17,
                    $18, $19, $20, $21, $22, $23, $24, $25, $26, $27, $28)
            RETURNING {}
            "#,
            ACCOUNT_COLUMNS
        ))
        .bind(account.id.0)
        .bind(&account.account_code)
        .bind(&account.name)
        .bind(&account.owner_id)
        .bind(account.owner_type.as_str())
        .bind(&account.user_id)
        .bind(account.wallet_type.as_str())
        .bind(account.chain_type.as_str())
        .bind(&account.wallet_address)
        .bind(&account.custody_wallet_id)
        .bind(&account.currency)
        .bind(account.available_balance)
        .bind(account.frozen_balance)
        .bind(account.pending_balance)
        .bind(Json(&account.multi_currency_balances))
        .bind(account.balance_updated_at)
        .bind(account.limits.single_tx_limit)
        .bind(account.limits.daily_limit)
        .bind(account.limits.monthly_limit)
        .bind(account.status.as_str())
        .bind(&account.status_reason)
        .bind(account.total_deposit)
        .bind(account.total_withdraw)
        .bind(account.transaction_count)
        .bind(account.is_default)
        .bind(&account.metadata)
        .bind(account.created_at)
        .bind(account.updated_at)
        .fetch_one(&mut *tx)
        .await
        .map_err(|err| insert_account_error(err, account.wallet_address.as_deref()))?;

        tx.commit().await.map_err(ledger_storage)?;
        Self::decode(row)
    }

    async fn find(&self, id: &AccountId) -> Result<Option<Account>> {
        let row = sqlx::query_as::<_, DbAccount>(&format!(
            "SELECT {} FROM accounts WHERE id = $1",
            ACCOUNT_COLUMNS
        ))
        .bind(id.0)
        .fetch_optional(&self.pool)
        .await
        .map_err(ledger_storage)?;
        row.map(Self::decode).transpose()
    }

    async fn find_by_code(&self, code: &str) -> Result<Option<Account>> {
        let row = sqlx::query_as::<_, DbAccount>(&format!(
            "SELECT {} FROM accounts WHERE account_code = $1",
            ACCOUNT_COLUMNS
        ))
        .bind(code)
        .fetch_optional(&self.pool)
        .await
        .map_err(ledger_storage)?;
        row.map(Self::decode).transpose()
    }

    async fn find_many(&self, ids: &[AccountId]) -> Result<Vec<Account>> {
        let uuids: Vec<Uuid> = ids.iter().map(|id| id.0).collect();
        let rows = sqlx::query_as::<_, DbAccount>(&format!(
            "SELECT {} FROM accounts WHERE id = ANY($1)",
            ACCOUNT_COLUMNS
        ))
        .bind(&uuids)
        .fetch_all(&self.pool)
        .await
        .map_err(ledger_storage)?;

        let mut by_id = HashMap::with_capacity(rows.len());
        for row in rows {
            let account = Self::decode(row)?;
            by_id.insert(account.id, account);
        }
        Ok(ids.iter().filter_map(|id| by_id.remove(id)).collect())
    }

    async fn list_by_owner(&self, owner: &Owner) -> Result<Vec<Account>> {
        let rows = sqlx::query_as::<_, DbAccount>(&format!(
            r#"
            SELECT {} FROM accounts
            WHERE owner_id = $1 AND owner_type = $2
            ORDER BY is_default DESC, created_at DESC
            "#,
            ACCOUNT_COLUMNS
        ))
        .bind(&owner.id)
        .bind(owner.owner_type.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(ledger_storage)?;
        rows.into_iter().map(Self::decode).collect()
    }

    async fn find_default(&self, owner: &Owner) -> Result<Option<Account>> {
        let row = sqlx::query_as::<_, DbAccount>(&format!(
            "SELECT {} FROM accounts WHERE owner_id = $1 AND owner_type = $2 AND is_default",
            ACCOUNT_COLUMNS
        ))
        .bind(&owner.id)
        .bind(owner.owner_type.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(ledger_storage)?;
        row.map(Self::decode).transpose()
    }

    async fn promote_default(&self, id: &AccountId, owner: &Owner) -> Result<Account> {
        let current = self
            .find(id)
            .await?
            .ok_or_else(|| Self::account_not_found(id))?;
        if !current.is_owned_by(owner) {
            return Err(LedgerError::NotOwner {
                account: *id,
                owner: owner.to_string(),
            });
        }

        let mut tx = self.pool.begin().await.map_err(ledger_storage)?;
        Self::lock_owner(&mut tx, owner).await?;
        Self::demote_defaults(&mut tx, owner, Some(id.0)).await?;

        let row = sqlx::query_as::<_, DbAccount>(&format!(
            "UPDATE accounts SET is_default = TRUE, updated_at = NOW() WHERE id = $1 RETURNING {}",
            ACCOUNT_COLUMNS
        ))
        .bind(id.0)
        .fetch_one(&mut *tx)
        .await
        .map_err(ledger_storage)?;

        tx.commit().await.map_err(ledger_storage)?;
        Self::decode(row)
    }

    async fn with_locked(
        &self,
        ids: &[AccountId],
        mutation: &mut Mutation<'_>,
    ) -> Result<Vec<Account>> {
        let mut lock_order = ids.to_vec();
        lock_order.sort();
        lock_order.dedup();
        if lock_order.len() != ids.len() {
            return Err(LedgerError::InvalidInput {
                message: "a unit of work cannot lock the same account twice".to_string(),
            });
        }

        let mut tx = self.pool.begin().await.map_err(ledger_storage)?;

        let mut locked = HashMap::with_capacity(ids.len());
        for id in &lock_order {
            debug!(account_id = %id, "acquiring row lock");
            locked.insert(*id, Self::lock_row(&mut tx, id).await?);
        }
        let mut working = ids
            .iter()
            .map(|id| locked.remove(id).ok_or_else(|| Self::account_not_found(id)))
            .collect::<Result<Vec<_>>>()?;

        let entries = mutation(working.as_mut_slice())?;
        for account in &working {
            account.ensure_non_negative()?;
        }

        let now = Utc::now();
        for account in working.iter_mut() {
            account.updated_at = now;
            Self::write_row(&mut tx, account).await?;
        }
        for entry in &entries {
            Self::append_history(&mut tx, entry).await?;
        }
        let mut trimmed: Vec<Uuid> = entries.iter().map(|entry| entry.account_id.0).collect();
        trimmed.sort();
        trimmed.dedup();
        for account_id in trimmed {
            self.trim_history(&mut tx, account_id).await?;
        }

        tx.commit().await.map_err(ledger_storage)?;
        Ok(working)
    }

    async fn history(&self, id: &AccountId, query: &HistoryQuery) -> Result<Vec<HistoryEntry>> {
        let exists: bool = sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM accounts WHERE id = $1)")
            .bind(id.0)
            .fetch_one(&self.pool)
            .await
            .map_err(ledger_storage)?;
        if !exists {
            return Err(Self::account_not_found(id));
        }

        let kinds: Option<Vec<String>> = query.stream.map(|stream| {
            stream
                .kinds()
                .iter()
                .map(|kind| kind.as_str().to_string())
                .collect()
        });
        let rows = sqlx::query_as::<_, DbHistoryEntry>(&format!(
            r#"
            SELECT {} FROM account_history
            WHERE account_id = $1 AND ($2::text[] IS NULL OR kind = ANY($2))
            ORDER BY seq DESC
            LIMIT $3 OFFSET $4
            "#,
            HISTORY_COLUMNS
        ))
        .bind(id.0)
        .bind(kinds)
        .bind(i64::try_from(query.limit).unwrap_or(i64::MAX))
        .bind(i64::try_from(query.offset).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await
        .map_err(ledger_storage)?;

        rows.into_iter()
            .map(|row| row.into_entry().map_err(LedgerError::storage))
            .collect()
    }
}
