//! In-memory account store
//!
//! Each row sits behind its own `tokio::sync::Mutex`, so a unit of work only
//! blocks other work on the same accounts. Default-account changes and owner
//! listings additionally serialize on a per-owner lock, taken before any row
//! lock.

use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;

use agentrix_types::{AccountId, Owner};
use async_trait::async_trait;
use chrono::Utc;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::debug;

use crate::{
    Account, AccountStore, HistoryEntry, HistoryQuery, LedgerError, Mutation, Result,
};

#[derive(Clone)]
struct Row {
    owner: Owner,
    cell: Arc<Mutex<Account>>,
}

/// Account store backed by process memory
pub struct MemoryAccountStore {
    rows: DashMap<AccountId, Row>,
    codes: DashMap<String, AccountId>,
    wallets: DashMap<String, AccountId>,
    owners: DashMap<Owner, Arc<Mutex<()>>>,
    history: DashMap<AccountId, VecDeque<HistoryEntry>>,
    history_retention: usize,
}

impl MemoryAccountStore {
    pub fn new(history_retention: usize) -> Self {
        Self {
            rows: DashMap::new(),
            codes: DashMap::new(),
            wallets: DashMap::new(),
            owners: DashMap::new(),
            history: DashMap::new(),
            history_retention: history_retention.max(1),
        }
    }

    fn row(&self, id: &AccountId) -> Result<Row> {
        self.rows
            .get(id)
            .map(|row| row.value().clone())
            .ok_or_else(|| LedgerError::not_found(id))
    }

    fn owner_lock(&self, owner: &Owner) -> Arc<Mutex<()>> {
        self.owners
            .entry(owner.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .value()
            .clone()
    }

    /// Rows of `owner`, collected before any await so no map guard is held
    fn owner_rows(&self, owner: &Owner) -> Vec<Row> {
        self.rows
            .iter()
            .filter(|row| &row.value().owner == owner)
            .map(|row| row.value().clone())
            .collect()
    }

    /// Caller must hold the owner lock
    async fn snapshot_owner(&self, owner: &Owner) -> Vec<Account> {
        let mut accounts = Vec::new();
        for row in self.owner_rows(owner) {
            accounts.push(row.cell.lock().await.clone());
        }
        accounts.sort_by(|a, b| {
            b.is_default
                .cmp(&a.is_default)
                .then(b.created_at.cmp(&a.created_at))
        });
        accounts
    }

    /// Caller must hold the owner lock
    async fn demote_defaults(&self, owner: &Owner, keep: Option<AccountId>) {
        for row in self.owner_rows(owner) {
            let mut account = row.cell.lock().await;
            if account.is_default && Some(account.id) != keep {
                account.is_default = false;
                account.updated_at = Utc::now();
                debug!(account_id = %account.id, owner = %owner, "demoted default account");
            }
        }
    }

    fn append_history(&self, entry: HistoryEntry) {
        let mut trail = self.history.entry(entry.account_id).or_default();
        trail.push_front(entry);
        trail.truncate(self.history_retention);
    }
}

impl Default for MemoryAccountStore {
    fn default() -> Self {
        Self::new(crate::LedgerConfig::default().history_retention)
    }
}

#[async_trait]
impl AccountStore for MemoryAccountStore {
    async fn insert(&self, account: Account) -> Result<Account> {
        let owner = account.owner();
        let _owner_guard = if account.is_default {
            Some(self.owner_lock(&owner).lock_owned().await)
        } else {
            None
        };

        if let Some(address) = &account.wallet_address {
            match self.wallets.entry(address.clone()) {
                Entry::Occupied(_) => {
                    return Err(LedgerError::WalletAddressConflict {
                        address: address.clone(),
                    })
                }
                Entry::Vacant(slot) => {
                    slot.insert(account.id);
                }
            }
        }

        if account.is_default {
            self.demote_defaults(&owner, None).await;
        }

        self.codes.insert(account.account_code.clone(), account.id);
        self.rows.insert(
            account.id,
            Row {
                owner,
                cell: Arc::new(Mutex::new(account.clone())),
            },
        );
        Ok(account)
    }

    async fn find(&self, id: &AccountId) -> Result<Option<Account>> {
        let row = match self.rows.get(id) {
            Some(row) => row.value().clone(),
            None => return Ok(None),
        };
        let account = row.cell.lock().await.clone();
        Ok(Some(account))
    }

    async fn find_by_code(&self, code: &str) -> Result<Option<Account>> {
        let id = match self.codes.get(code) {
            Some(id) => *id.value(),
            None => return Ok(None),
        };
        self.find(&id).await
    }

    async fn find_many(&self, ids: &[AccountId]) -> Result<Vec<Account>> {
        let mut accounts = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(account) = self.find(id).await? {
                accounts.push(account);
            }
        }
        Ok(accounts)
    }

    async fn list_by_owner(&self, owner: &Owner) -> Result<Vec<Account>> {
        let lock = self.owner_lock(owner);
        let _guard = lock.lock().await;
        Ok(self.snapshot_owner(owner).await)
    }

    async fn find_default(&self, owner: &Owner) -> Result<Option<Account>> {
        Ok(self
            .list_by_owner(owner)
            .await?
            .into_iter()
            .find(|account| account.is_default))
    }

    async fn promote_default(&self, id: &AccountId, owner: &Owner) -> Result<Account> {
        let row = self.row(id)?;
        if &row.owner != owner {
            return Err(LedgerError::NotOwner {
                account: *id,
                owner: owner.to_string(),
            });
        }

        let lock = self.owner_lock(owner);
        let _guard = lock.lock().await;
        self.demote_defaults(owner, Some(*id)).await;

        let mut account = row.cell.lock().await;
        account.is_default = true;
        account.updated_at = Utc::now();
        Ok(account.clone())
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
            return Err(LedgerError::invalid_input(
                "a unit of work cannot lock the same account twice",
            ));
        }

        let rows = lock_order
            .iter()
            .map(|id| self.row(id))
            .collect::<Result<Vec<_>>>()?;

        let mut guards: BTreeMap<AccountId, OwnedMutexGuard<Account>> = BTreeMap::new();
        for (id, row) in lock_order.iter().zip(rows) {
            debug!(account_id = %id, "acquiring row lock");
            guards.insert(*id, row.cell.lock_owned().await);
        }

        let mut working = Vec::with_capacity(ids.len());
        for id in ids {
            let guard = guards.get(id).ok_or_else(|| LedgerError::not_found(id))?;
            working.push(Account::clone(guard));
        }

        let entries = mutation(working.as_mut_slice())?;
        for account in &working {
            account.ensure_non_negative()?;
        }

        let now = Utc::now();
        for account in working.iter_mut() {
            account.updated_at = now;
            if let Some(guard) = guards.get_mut(&account.id) {
                **guard = account.clone();
            }
        }
        for entry in entries {
            self.append_history(entry);
        }
        Ok(working)
    }

    async fn history(&self, id: &AccountId, query: &HistoryQuery) -> Result<Vec<HistoryEntry>> {
        if !self.rows.contains_key(id) {
            return Err(LedgerError::not_found(id));
        }
        let entries = match self.history.get(id) {
            Some(trail) => trail
                .iter()
                .filter(|entry| query.matches(entry))
                .skip(query.offset)
                .take(query.limit)
                .cloned()
                .collect(),
            None => Vec::new(),
        };
        Ok(entries)
    }
}
