//! Account storage seam
//!
//! The ledger engine never touches rows directly: every balance change is a
//! [`Mutation`] handed to [`AccountStore::with_locked`], which owns locking,
//! persistence and rollback.

use agentrix_types::{AccountId, Owner};
use async_trait::async_trait;

use crate::{Account, HistoryEntry, HistoryQuery, Result};

/// Body of a unit of work
///
/// Receives the locked accounts in the order they were requested and returns
/// the history rows to append. Returning `Err` discards every change.
pub type Mutation<'a> = dyn FnMut(&mut [Account]) -> Result<Vec<HistoryEntry>> + Send + 'a;

/// Durable account storage
///
/// Implementors MUST:
/// 1. Acquire row-level exclusive locks in ascending [`AccountId`] order,
///    whatever order the ids were passed in
/// 2. Reject the unit of work if any mutated account fails
///    [`Account::ensure_non_negative`]
/// 3. Persist every mutated row and every history row together, or nothing
/// 4. Keep at most `history_retention` history rows per account
#[async_trait]
pub trait AccountStore: Send + Sync {
    /// Insert a new row
    ///
    /// Fails with `WalletAddressConflict` if the wallet address is bound to
    /// another account. When `account.is_default`, the owner's previous
    /// default is demoted in the same unit of work.
    async fn insert(&self, account: Account) -> Result<Account>;

    async fn find(&self, id: &AccountId) -> Result<Option<Account>>;

    async fn find_by_code(&self, code: &str) -> Result<Option<Account>>;

    /// Accounts for the ids that exist; unknown ids are skipped
    async fn find_many(&self, ids: &[AccountId]) -> Result<Vec<Account>>;

    /// Default account first, then newest first
    async fn list_by_owner(&self, owner: &Owner) -> Result<Vec<Account>>;

    async fn find_default(&self, owner: &Owner) -> Result<Option<Account>>;

    /// Make `id` the owner's only default account
    ///
    /// Fails with `NotOwner` if the account belongs to someone else.
    async fn promote_default(&self, id: &AccountId, owner: &Owner) -> Result<Account>;

    /// Run `mutation` against the locked rows as one unit of work
    ///
    /// `ids` must be distinct. Returns the persisted accounts in `ids` order.
    async fn with_locked(
        &self,
        ids: &[AccountId],
        mutation: &mut Mutation<'_>,
    ) -> Result<Vec<Account>>;

    /// Newest first
    async fn history(&self, id: &AccountId, query: &HistoryQuery) -> Result<Vec<HistoryEntry>>;
}
