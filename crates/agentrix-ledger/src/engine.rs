//! Ledger engine
//!
//! The only component that mutates balances. Every operation is one call to
//! [`AccountStore::with_locked`], so it either commits in full or leaves the
//! accounts, counters and history exactly as they were.

use std::collections::BTreeMap;
use std::sync::Arc;

use agentrix_types::{AccountId, AccountStatus, ChainType, Owner, WalletType};
use chrono::Utc;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::account::{add_amount, check_amount_scale, normalize_currency};
use crate::{
    Account, AccountStats, AccountStore, BalanceView, Direction, HistoryEntry, HistoryKind,
    HistoryQuery, LedgerConfig, LedgerError, MemoryAccountStore, NewAccount, Result,
};

/// Amount and annotations for a deposit, withdrawal or transfer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FundOperation {
    pub amount: Decimal,
    /// Defaults to the account's primary currency
    pub currency: Option<String>,
    /// Free-text annotation; not used for deduplication
    pub reference: Option<String>,
    pub description: Option<String>,
}

impl FundOperation {
    pub fn new(amount: Decimal) -> Self {
        Self {
            amount,
            currency: None,
            reference: None,
            description: None,
        }
    }

    pub fn currency(mut self, currency: impl Into<String>) -> Self {
        self.currency = Some(currency.into());
        self
    }

    pub fn reference(mut self, reference: impl Into<String>) -> Self {
        self.reference = Some(reference.into());
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    fn normalized_currency(&self) -> Result<Option<String>> {
        self.currency.as_deref().map(normalize_currency).transpose()
    }
}

/// Both sides of a completed transfer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferOutcome {
    pub from: Account,
    pub to: Account,
}

/// The ledger engine
#[derive(Clone)]
pub struct Ledger {
    store: Arc<dyn AccountStore>,
    config: LedgerConfig,
}

impl Ledger {
    pub fn new(store: Arc<dyn AccountStore>, config: LedgerConfig) -> Self {
        Self { store, config }
    }

    /// Ledger over a fresh [`MemoryAccountStore`] with default configuration
    pub fn in_memory() -> Self {
        Self::in_memory_with(LedgerConfig::default())
    }

    pub fn in_memory_with(config: LedgerConfig) -> Self {
        let store = MemoryAccountStore::new(config.history_retention);
        Self::new(Arc::new(store), config)
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn AccountStore> {
        &self.store
    }

    // ========================================================================
    // Creation & lookup
    // ========================================================================

    pub async fn create_account(&self, request: NewAccount) -> Result<Account> {
        let account = request.into_account(&self.config.default_currency)?;
        let account = self.store.insert(account).await?;
        info!(
            account_id = %account.id,
            account_code = %account.account_code,
            owner = %account.owner(),
            is_default = account.is_default,
            "account created"
        );
        Ok(account)
    }

    /// Virtual, multi-chain default account for a newly registered user
    pub async fn create_user_default_account(
        &self,
        user_id: &str,
        user_name: Option<&str>,
    ) -> Result<Account> {
        let name = match user_name {
            Some(user_name) => format!("{}'s Main Account", user_name),
            None => "Main Account".to_string(),
        };
        let request = NewAccount::new(name, Owner::user(user_id), WalletType::Virtual)
            .chain(ChainType::Multi)
            .user_link(user_id)
            .default_account();
        self.create_account(request).await
    }

    /// Virtual, multi-chain settlement account for a merchant
    pub async fn create_merchant_default_account(
        &self,
        merchant_id: &str,
        merchant_name: Option<&str>,
    ) -> Result<Account> {
        let name = match merchant_name {
            Some(merchant_name) => format!("{} Settlement Account", merchant_name),
            None => "Merchant Settlement Account".to_string(),
        };
        let request = NewAccount::new(name, Owner::merchant(merchant_id), WalletType::Virtual)
            .chain(ChainType::Multi)
            .default_account();
        self.create_account(request).await
    }

    pub async fn get_account(&self, id: &AccountId) -> Result<Account> {
        self.store
            .find(id)
            .await?
            .ok_or_else(|| LedgerError::not_found(id))
    }

    pub async fn get_account_by_code(&self, code: &str) -> Result<Account> {
        self.store
            .find_by_code(code)
            .await?
            .ok_or_else(|| LedgerError::not_found(code))
    }

    /// Batch lookup; ids that do not resolve are left out
    pub async fn get_accounts(&self, ids: &[AccountId]) -> Result<Vec<Account>> {
        self.store.find_many(ids).await
    }

    /// Default account first, then newest first
    pub async fn list_accounts(&self, owner: &Owner) -> Result<Vec<Account>> {
        self.store.list_by_owner(owner).await
    }

    pub async fn default_account(&self, owner: &Owner) -> Result<Option<Account>> {
        self.store.find_default(owner).await
    }

    pub async fn set_default_account(&self, id: &AccountId, owner: &Owner) -> Result<Account> {
        let account = self.store.promote_default(id, owner).await?;
        info!(account_id = %account.id, owner = %owner, "default account changed");
        Ok(account)
    }

    // ========================================================================
    // Read models
    // ========================================================================

    pub async fn balance(&self, id: &AccountId) -> Result<BalanceView> {
        Ok(self.get_account(id).await?.balance_view())
    }

    pub async fn multi_currency_balances(&self, id: &AccountId) -> Result<BTreeMap<String, Decimal>> {
        Ok(self.get_account(id).await?.multi_currency_view())
    }

    pub async fn stats(&self, id: &AccountId) -> Result<AccountStats> {
        Ok(self.get_account(id).await?.stats())
    }

    pub async fn history(&self, id: &AccountId, query: &HistoryQuery) -> Result<Vec<HistoryEntry>> {
        self.store.history(id, query).await
    }

    // ========================================================================
    // Fund movements
    // ========================================================================

    pub async fn deposit(&self, id: &AccountId, op: FundOperation) -> Result<Account> {
        let amount = require_positive(op.amount)?;
        let currency = op.normalized_currency()?;

        let accounts = self
            .store
            .with_locked(&[*id], &mut |accounts: &mut [Account]| {
                let account = one(accounts)?;
                account.require_status(AccountStatus::Active, "deposit")?;

                let currency = currency.clone().unwrap_or_else(|| account.currency.clone());
                let now = Utc::now();
                account.credit(&currency, amount)?;
                account.total_deposit = add_amount(account.total_deposit, amount, "total deposit")?;
                account.count_transaction(now);

                Ok(vec![HistoryEntry::new(
                    account.id,
                    HistoryKind::Deposit,
                    amount,
                    currency,
                    now,
                )
                .annotated(op.reference.clone(), op.description.clone())])
            })
            .await?;

        let account = first(accounts)?;
        info!(account_id = %account.id, %amount, "deposit completed");
        Ok(account)
    }

    pub async fn withdraw(&self, id: &AccountId, op: FundOperation) -> Result<Account> {
        let amount = require_positive(op.amount)?;
        let currency = op.normalized_currency()?;

        let accounts = self
            .store
            .with_locked(&[*id], &mut |accounts: &mut [Account]| {
                let account = one(accounts)?;
                account.require_status(AccountStatus::Active, "withdraw")?;

                let currency = currency.clone().unwrap_or_else(|| account.currency.clone());
                let now = Utc::now();
                account.debit(&currency, amount)?;
                account.total_withdraw =
                    add_amount(account.total_withdraw, amount, "total withdraw")?;
                account.count_transaction(now);

                Ok(vec![HistoryEntry::new(
                    account.id,
                    HistoryKind::Withdrawal,
                    amount,
                    currency,
                    now,
                )
                .annotated(op.reference.clone(), op.description.clone())])
            })
            .await?;

        let account = first(accounts)?;
        info!(account_id = %account.id, %amount, "withdrawal completed");
        Ok(account)
    }

    /// Move funds between two accounts
    ///
    /// The debit always comes out of the source's primary available balance.
    /// The credit lands in `op.currency` on the destination, defaulting to the
    /// source's primary currency.
    pub async fn transfer(
        &self,
        from_id: &AccountId,
        to_id: &AccountId,
        op: FundOperation,
    ) -> Result<TransferOutcome> {
        let amount = require_positive(op.amount)?;
        if from_id == to_id {
            return Err(LedgerError::invalid_input(
                "source and destination accounts must differ",
            ));
        }
        let currency = op.normalized_currency()?;

        let accounts = self
            .store
            .with_locked(&[*from_id, *to_id], &mut |accounts: &mut [Account]| {
                let (from, to) = pair(accounts)?;
                from.require_status(AccountStatus::Active, "send a transfer")?;
                to.require_status(AccountStatus::Active, "receive a transfer")?;

                let currency = currency.clone().unwrap_or_else(|| from.currency.clone());
                let now = Utc::now();

                let source_currency = from.currency.clone();
                from.debit(&source_currency, amount)?;
                from.total_withdraw = add_amount(from.total_withdraw, amount, "total withdraw")?;
                from.count_transaction(now);

                to.credit(&currency, amount)?;
                to.total_deposit = add_amount(to.total_deposit, amount, "total deposit")?;
                to.count_transaction(now);

                let leg = |account: AccountId| {
                    HistoryEntry::new(account, HistoryKind::Transfer, amount, currency.clone(), now)
                        .annotated(op.reference.clone(), op.description.clone())
                };
                Ok(vec![
                    leg(from.id).transfer_leg(Direction::Out, to.id),
                    leg(to.id).transfer_leg(Direction::In, from.id),
                ])
            })
            .await?;

        let mut accounts = accounts.into_iter();
        let (from, to) = match (accounts.next(), accounts.next()) {
            (Some(from), Some(to)) => (from, to),
            _ => return Err(LedgerError::storage("transfer did not return both accounts")),
        };
        info!(from = %from.id, to = %to.id, %amount, "transfer completed");
        Ok(TransferOutcome { from, to })
    }

    // ========================================================================
    // Holds
    // ========================================================================

    /// Move `amount` from available to frozen
    pub async fn freeze_balance(
        &self,
        id: &AccountId,
        amount: Decimal,
        reason: Option<String>,
    ) -> Result<Account> {
        self.move_hold(id, amount, reason, HistoryKind::Freeze).await
    }

    /// Move `amount` from frozen back to available
    pub async fn unfreeze_balance(
        &self,
        id: &AccountId,
        amount: Decimal,
        reason: Option<String>,
    ) -> Result<Account> {
        self.move_hold(id, amount, reason, HistoryKind::Unfreeze).await
    }

    async fn move_hold(
        &self,
        id: &AccountId,
        amount: Decimal,
        reason: Option<String>,
        kind: HistoryKind,
    ) -> Result<Account> {
        let amount = require_positive(amount)?;

        let accounts = self
            .store
            .with_locked(&[*id], &mut |accounts: &mut [Account]| {
                let account = one(accounts)?;
                let now = Utc::now();
                match kind {
                    HistoryKind::Unfreeze => {
                        account.require_open("unfreeze funds")?;
                        if account.frozen_balance < amount {
                            return Err(LedgerError::InsufficientFunds {
                                currency: account.currency.clone(),
                                available: account.frozen_balance,
                                required: amount,
                            });
                        }
                        let available =
                            add_amount(account.available_balance, amount, "available balance")?;
                        account.frozen_balance -= amount;
                        account.available_balance = available;
                    }
                    _ => {
                        account.require_open("freeze funds")?;
                        let currency = account.currency.clone();
                        let frozen = add_amount(account.frozen_balance, amount, "frozen balance")?;
                        account.debit(&currency, amount)?;
                        account.frozen_balance = frozen;
                    }
                }
                account.touch_balance(now);

                Ok(vec![HistoryEntry::new(
                    account.id,
                    kind,
                    amount,
                    account.currency.clone(),
                    now,
                )
                .with_reason(reason.clone())])
            })
            .await?;

        let account = first(accounts)?;
        info!(account_id = %account.id, %amount, action = %kind, "balance hold updated");
        Ok(account)
    }

    // ========================================================================
    // Status transitions
    // ========================================================================

    /// Block deposits, withdrawals and transfers without moving balances
    pub async fn freeze_account(&self, id: &AccountId, reason: Option<String>) -> Result<Account> {
        let account = self
            .transition(id, "freeze", |account| {
                account.require_status(AccountStatus::Active, "freeze")?;
                account.status = AccountStatus::Frozen;
                account.status_reason = reason.clone();
                Ok(())
            })
            .await?;
        info!(account_id = %account.id, reason = ?account.status_reason, "account frozen");
        Ok(account)
    }

    /// Freeze an active account, or replace the reason on one that is already frozen
    pub async fn enforce_freeze(&self, id: &AccountId, reason: String) -> Result<Account> {
        let account = self
            .transition(id, "freeze", |account| {
                account.require_open("freeze")?;
                account.status = AccountStatus::Frozen;
                account.status_reason = Some(reason.clone());
                Ok(())
            })
            .await?;
        info!(
            account_id = %account.id,
            reason = ?account.status_reason,
            "account freeze enforced"
        );
        Ok(account)
    }

    pub async fn unfreeze_account(&self, id: &AccountId, reason: Option<String>) -> Result<Account> {
        let account = self
            .transition(id, "unfreeze", |account| {
                account.require_status(AccountStatus::Frozen, "unfreeze")?;
                account.status = AccountStatus::Active;
                account.status_reason = None;
                Ok(())
            })
            .await?;
        info!(account_id = %account.id, reason = ?reason, "account unfrozen");
        Ok(account)
    }

    /// Terminal; requires every primary balance component to be zero
    pub async fn close_account(&self, id: &AccountId, reason: Option<String>) -> Result<Account> {
        let account = self
            .transition(id, "close", |account| {
                account.require_open("close")?;
                let total = account.total_balance();
                if !total.is_zero() {
                    return Err(LedgerError::NonEmptyAccount {
                        account: account.id,
                        total,
                    });
                }
                account.status = AccountStatus::Closed;
                account.status_reason = reason.clone();
                Ok(())
            })
            .await?;
        info!(account_id = %account.id, "account closed");
        Ok(account)
    }

    async fn transition<F>(&self, id: &AccountId, action: &'static str, mut apply: F) -> Result<Account>
    where
        F: FnMut(&mut Account) -> Result<()> + Send,
    {
        debug!(account_id = %id, action, "status transition requested");
        let accounts = self
            .store
            .with_locked(&[*id], &mut |accounts: &mut [Account]| {
                apply(one(accounts)?)?;
                Ok(Vec::new())
            })
            .await?;
        first(accounts)
    }
}

/// Positive and within the stored scale, checked before any lock is taken
fn require_positive(amount: Decimal) -> Result<Decimal> {
    if amount <= Decimal::ZERO {
        return Err(LedgerError::InvalidAmount {
            message: format!("amount must be greater than zero, got {}", amount),
        });
    }
    check_amount_scale(amount)?;
    Ok(amount)
}

fn one(accounts: &mut [Account]) -> Result<&mut Account> {
    match accounts {
        [account] => Ok(account),
        _ => Err(LedgerError::storage("expected exactly one locked account")),
    }
}

fn pair(accounts: &mut [Account]) -> Result<(&mut Account, &mut Account)> {
    match accounts {
        [from, to] => Ok((from, to)),
        _ => Err(LedgerError::storage("expected exactly two locked accounts")),
    }
}

fn first(accounts: Vec<Account>) -> Result<Account> {
    accounts
        .into_iter()
        .next()
        .ok_or_else(|| LedgerError::storage("unit of work returned no account"))
}

impl std::fmt::Debug for Ledger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ledger").field("config", &self.config).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ErrorKind, HistoryStream};
    use rust_decimal_macros::dec;

    async fn funded(ledger: &Ledger, amount: Decimal) -> Account {
        let account = ledger
            .create_account(NewAccount::new("Main", Owner::user("u-1"), WalletType::Virtual))
            .await
            .unwrap();
        if amount > Decimal::ZERO {
            ledger
                .deposit(&account.id, FundOperation::new(amount))
                .await
                .unwrap()
        } else {
            account
        }
    }

    #[tokio::test]
    async fn test_account_lifecycle_scenario() {
        let ledger = Ledger::in_memory();
        let account = funded(&ledger, Decimal::ZERO).await;
        let id = account.id;
        assert_eq!(account.available_balance, Decimal::ZERO);

        let account = ledger.deposit(&id, FundOperation::new(dec!(100))).await.unwrap();
        assert_eq!(account.available_balance, dec!(100));

        let account = ledger.withdraw(&id, FundOperation::new(dec!(30))).await.unwrap();
        assert_eq!(account.available_balance, dec!(70));
        assert_eq!(account.total_withdraw, dec!(30));

        let account = ledger.freeze_balance(&id, dec!(20), None).await.unwrap();
        assert_eq!(account.available_balance, dec!(50));
        assert_eq!(account.frozen_balance, dec!(20));

        let err = ledger
            .withdraw(&id, FundOperation::new(dec!(60)))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InsufficientFunds);
        let unchanged = ledger.get_account(&id).await.unwrap();
        assert_eq!(unchanged.available_balance, dec!(50));
        assert_eq!(unchanged.frozen_balance, dec!(20));
        assert_eq!(unchanged.total_withdraw, dec!(30));
        assert_eq!(unchanged.transaction_count, 2);

        let account = ledger.unfreeze_balance(&id, dec!(20), None).await.unwrap();
        assert_eq!(account.available_balance, dec!(70));
        assert_eq!(account.frozen_balance, Decimal::ZERO);

        let err = ledger.close_account(&id, None).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NonEmptyAccount);

        ledger.withdraw(&id, FundOperation::new(dec!(70))).await.unwrap();
        let account = ledger
            .close_account(&id, Some("user request".into()))
            .await
            .unwrap();
        assert_eq!(account.status, AccountStatus::Closed);
        assert_eq!(account.status_reason.as_deref(), Some("user request"));
    }

    #[tokio::test]
    async fn test_non_positive_amounts_rejected() {
        let ledger = Ledger::in_memory();
        let account = funded(&ledger, dec!(10)).await;

        for amount in [Decimal::ZERO, dec!(-5)] {
            let err = ledger
                .deposit(&account.id, FundOperation::new(amount))
                .await
                .unwrap_err();
            assert!(matches!(err, LedgerError::InvalidAmount { .. }));
        }
        let err = ledger
            .freeze_balance(&account.id, Decimal::ZERO, None)
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::InvalidAmount { .. }));
    }

    #[tokio::test]
    async fn test_amounts_beyond_stored_scale_rejected() {
        let ledger = Ledger::in_memory();
        let account = funded(&ledger, dec!(10)).await;

        let err = ledger
            .deposit(&account.id, FundOperation::new(dec!(0.000000001)))
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::InvalidAmount { .. }));
        let err = ledger
            .freeze_balance(&account.id, dec!(1.123456789), None)
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::InvalidAmount { .. }));

        let unchanged = ledger.get_account(&account.id).await.unwrap();
        assert_eq!(unchanged.available_balance, dec!(10));
        assert_eq!(unchanged.transaction_count, 1);

        let account = ledger
            .deposit(&account.id, FundOperation::new(dec!(0.00000001)))
            .await
            .unwrap();
        assert_eq!(account.available_balance, dec!(10.00000001));
    }

    #[tokio::test]
    async fn test_overflowing_credit_is_an_error() {
        let ledger = Ledger::in_memory();
        let full = funded(&ledger, Decimal::MAX).await;

        let err = ledger
            .deposit(&full.id, FundOperation::new(dec!(1)))
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::InvalidAmount { .. }));

        let sender = funded(&ledger, dec!(5)).await;
        let err = ledger
            .transfer(&sender.id, &full.id, FundOperation::new(dec!(5)))
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::InvalidAmount { .. }));

        let full = ledger.get_account(&full.id).await.unwrap();
        let sender = ledger.get_account(&sender.id).await.unwrap();
        assert_eq!(full.available_balance, Decimal::MAX);
        assert_eq!(full.transaction_count, 1);
        assert_eq!(sender.available_balance, dec!(5));
        assert_eq!(sender.total_withdraw, Decimal::ZERO);
    }

    #[tokio::test]
    async fn test_lifetime_total_overflow_is_an_error() {
        let ledger = Ledger::in_memory();
        let account = funded(&ledger, Decimal::MAX).await;
        ledger
            .withdraw(&account.id, FundOperation::new(Decimal::MAX))
            .await
            .unwrap();

        let err = ledger
            .deposit(&account.id, FundOperation::new(dec!(1)))
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::InvalidAmount { .. }));
        let stats = ledger.stats(&account.id).await.unwrap();
        assert_eq!(stats.total_deposit, Decimal::MAX);
        assert_eq!(stats.transaction_count, 2);
        assert_eq!(ledger.balance(&account.id).await.unwrap().available_balance, Decimal::ZERO);
    }

    #[tokio::test]
    async fn test_close_rejected_while_funds_are_held() {
        let ledger = Ledger::in_memory();
        let account = funded(&ledger, dec!(5)).await;
        ledger.freeze_balance(&account.id, dec!(5), None).await.unwrap();

        let err = ledger.close_account(&account.id, None).await.unwrap_err();
        assert!(matches!(
            err,
            LedgerError::NonEmptyAccount { total, .. } if total == dec!(5)
        ));
        let still_open = ledger.get_account(&account.id).await.unwrap();
        assert_eq!(still_open.status, AccountStatus::Active);
        assert_eq!(still_open.available_balance, Decimal::ZERO);
        assert_eq!(still_open.frozen_balance, dec!(5));

        ledger.unfreeze_balance(&account.id, dec!(5), None).await.unwrap();
        ledger.withdraw(&account.id, FundOperation::new(dec!(5))).await.unwrap();
        let closed = ledger.close_account(&account.id, None).await.unwrap();
        assert_eq!(closed.status, AccountStatus::Closed);
    }

    #[tokio::test]
    async fn test_close_rejected_while_pending() {
        let ledger = Ledger::in_memory();
        let mut account = NewAccount::new("Main", Owner::user("u-1"), WalletType::Virtual)
            .into_account("USDC")
            .unwrap();
        account.pending_balance = dec!(2);
        let account = ledger.store().insert(account).await.unwrap();

        let err = ledger.close_account(&account.id, None).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NonEmptyAccount);
        let still_open = ledger.get_account(&account.id).await.unwrap();
        assert_eq!(still_open.status, AccountStatus::Active);
    }

    #[tokio::test]
    async fn test_side_currency_deposit_and_withdraw() {
        let ledger = Ledger::in_memory();
        let account = funded(&ledger, dec!(5)).await;

        let account = ledger
            .deposit(&account.id, FundOperation::new(dec!(2.5)).currency("eth"))
            .await
            .unwrap();
        assert_eq!(account.available_balance, dec!(5));
        assert_eq!(account.multi_currency_balances["ETH"], dec!(2.5));
        assert_eq!(account.total_deposit, dec!(7.5));

        let err = ledger
            .withdraw(&account.id, FundOperation::new(dec!(3)).currency("ETH"))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            LedgerError::InsufficientFunds { ref currency, .. } if currency == "ETH"
        ));

        let balances = ledger.multi_currency_balances(&account.id).await.unwrap();
        assert_eq!(balances["USDC"], dec!(5));
        assert_eq!(balances["ETH"], dec!(2.5));
    }

    #[tokio::test]
    async fn test_transfer_conserves_primary_balance() {
        let ledger = Ledger::in_memory();
        let a = funded(&ledger, dec!(100)).await;
        let b = funded(&ledger, dec!(40)).await;

        let outcome = ledger
            .transfer(&a.id, &b.id, FundOperation::new(dec!(25)).reference("order-1"))
            .await
            .unwrap();
        assert_eq!(outcome.from.id, a.id);
        assert_eq!(outcome.to.id, b.id);
        assert_eq!(outcome.from.available_balance, dec!(75));
        assert_eq!(outcome.to.available_balance, dec!(65));
        assert_eq!(
            outcome.from.available_balance + outcome.to.available_balance,
            dec!(140)
        );

        let out = ledger
            .history(&a.id, &HistoryQuery::stream(HistoryStream::Funds))
            .await
            .unwrap();
        assert_eq!(out[0].kind, HistoryKind::Transfer);
        assert_eq!(out[0].direction, Some(Direction::Out));
        assert_eq!(out[0].counterparty, Some(b.id));
        assert_eq!(out[0].reference.as_deref(), Some("order-1"));

        let incoming = ledger.history(&b.id, &HistoryQuery::default()).await.unwrap();
        assert_eq!(incoming[0].direction, Some(Direction::In));
        assert_eq!(incoming[0].counterparty, Some(a.id));
    }

    #[tokio::test]
    async fn test_transfer_in_side_currency_debits_source_primary() {
        let ledger = Ledger::in_memory();
        let a = funded(&ledger, dec!(10)).await;
        let b = funded(&ledger, Decimal::ZERO).await;

        let outcome = ledger
            .transfer(&a.id, &b.id, FundOperation::new(dec!(4)).currency("SOL"))
            .await
            .unwrap();
        assert_eq!(outcome.from.available_balance, dec!(6));
        assert_eq!(outcome.to.available_balance, Decimal::ZERO);
        assert_eq!(outcome.to.multi_currency_balances["SOL"], dec!(4));
    }

    #[tokio::test]
    async fn test_transfer_rejections_leave_state_unchanged() {
        let ledger = Ledger::in_memory();
        let a = funded(&ledger, dec!(10)).await;
        let b = funded(&ledger, dec!(10)).await;

        let err = ledger
            .transfer(&a.id, &a.id, FundOperation::new(dec!(1)))
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::InvalidInput { .. }));

        let err = ledger
            .transfer(&a.id, &b.id, FundOperation::new(dec!(11)))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InsufficientFunds);

        ledger.freeze_account(&b.id, None).await.unwrap();
        let err = ledger
            .transfer(&a.id, &b.id, FundOperation::new(dec!(1)))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidState);

        let a = ledger.get_account(&a.id).await.unwrap();
        let b = ledger.get_account(&b.id).await.unwrap();
        assert_eq!(a.available_balance, dec!(10));
        assert_eq!(b.available_balance, dec!(10));
        assert_eq!(a.transaction_count, 1);

        let err = ledger
            .transfer(&a.id, &AccountId::new(), FundOperation::new(dec!(1)))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_freeze_account_blocks_movements_not_holds() {
        let ledger = Ledger::in_memory();
        let account = funded(&ledger, dec!(50)).await;

        let frozen = ledger
            .freeze_account(&account.id, Some("chargeback".into()))
            .await
            .unwrap();
        assert_eq!(frozen.status, AccountStatus::Frozen);
        assert_eq!(frozen.available_balance, dec!(50));

        let err = ledger.freeze_account(&account.id, None).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidState);
        let err = ledger
            .deposit(&account.id, FundOperation::new(dec!(1)))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidState);

        let held = ledger.freeze_balance(&account.id, dec!(5), None).await.unwrap();
        assert_eq!(held.frozen_balance, dec!(5));

        let active = ledger.unfreeze_account(&account.id, None).await.unwrap();
        assert_eq!(active.status, AccountStatus::Active);
        assert!(active.status_reason.is_none());

        let err = ledger.unfreeze_account(&account.id, None).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidState);
    }

    #[tokio::test]
    async fn test_enforce_freeze_restamps_reason() {
        let ledger = Ledger::in_memory();
        let account = funded(&ledger, dec!(3)).await;

        let frozen = ledger
            .enforce_freeze(&account.id, "fraud review".into())
            .await
            .unwrap();
        assert_eq!(frozen.status, AccountStatus::Frozen);
        let frozen = ledger
            .enforce_freeze(&account.id, "owner revoked".into())
            .await
            .unwrap();
        assert_eq!(frozen.status_reason.as_deref(), Some("owner revoked"));
        assert_eq!(frozen.available_balance, dec!(3));

        let empty = funded(&ledger, Decimal::ZERO).await;
        ledger.close_account(&empty.id, None).await.unwrap();
        let err = ledger
            .enforce_freeze(&empty.id, "owner revoked".into())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidState);
    }

    #[tokio::test]
    async fn test_closed_is_terminal() {
        let ledger = Ledger::in_memory();
        let account = funded(&ledger, Decimal::ZERO).await;
        ledger.close_account(&account.id, None).await.unwrap();

        let err = ledger.close_account(&account.id, None).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidState);
        let err = ledger.freeze_account(&account.id, None).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidState);
        let err = ledger.unfreeze_account(&account.id, None).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidState);
        let err = ledger
            .deposit(&account.id, FundOperation::new(dec!(1)))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidState);
        let err = ledger
            .unfreeze_balance(&account.id, dec!(1), None)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidState);
    }

    #[tokio::test]
    async fn test_freeze_round_trip_and_freeze_stream() {
        let ledger = Ledger::in_memory();
        let account = funded(&ledger, dec!(12.345678)).await;

        ledger
            .freeze_balance(&account.id, dec!(2.000001), Some("dispute".into()))
            .await
            .unwrap();
        let err = ledger
            .unfreeze_balance(&account.id, dec!(3), None)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InsufficientFunds);
        let restored = ledger
            .unfreeze_balance(&account.id, dec!(2.000001), None)
            .await
            .unwrap();
        assert_eq!(restored.available_balance, dec!(12.345678));
        assert_eq!(restored.frozen_balance, Decimal::ZERO);

        let holds = ledger
            .history(&account.id, &HistoryQuery::stream(HistoryStream::Freezes))
            .await
            .unwrap();
        let kinds: Vec<HistoryKind> = holds.iter().map(|e| e.kind).collect();
        assert_eq!(kinds, vec![HistoryKind::Unfreeze, HistoryKind::Freeze]);
        assert_eq!(holds[1].reason.as_deref(), Some("dispute"));

        let funds = ledger
            .history(&account.id, &HistoryQuery::stream(HistoryStream::Funds))
            .await
            .unwrap();
        assert_eq!(funds.len(), 1);
    }

    #[tokio::test]
    async fn test_stats() {
        let ledger = Ledger::in_memory();
        let account = funded(&ledger, dec!(100)).await;
        ledger
            .withdraw(&account.id, FundOperation::new(dec!(40)))
            .await
            .unwrap();

        let stats = ledger.stats(&account.id).await.unwrap();
        assert_eq!(stats.total_deposit, dec!(100));
        assert_eq!(stats.total_withdraw, dec!(40));
        assert_eq!(stats.transaction_count, 2);
        assert_eq!(stats.net_flow, dec!(60));
    }

    #[tokio::test]
    async fn test_defaults_per_owner() {
        let ledger = Ledger::in_memory();
        let first = ledger
            .create_user_default_account("u-7", Some("Ada"))
            .await
            .unwrap();
        assert!(first.is_default);
        assert_eq!(first.user_id.as_deref(), Some("u-7"));
        assert_eq!(first.name, "Ada's Main Account");

        let second = ledger
            .create_account(
                NewAccount::new("Savings", Owner::user("u-7"), WalletType::Custodial)
                    .default_account(),
            )
            .await
            .unwrap();
        let owner = Owner::user("u-7");
        let default = ledger.default_account(&owner).await.unwrap().unwrap();
        assert_eq!(default.id, second.id);

        ledger.set_default_account(&first.id, &owner).await.unwrap();
        let listed = ledger.list_accounts(&owner).await.unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].id, first.id);
        assert_eq!(listed.iter().filter(|a| a.is_default).count(), 1);

        let err = ledger
            .set_default_account(&first.id, &Owner::merchant("u-7"))
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::NotOwner { .. }));
    }

    #[tokio::test]
    async fn test_lookup_by_code_and_batch() {
        let ledger = Ledger::in_memory();
        let merchant = ledger
            .create_merchant_default_account("m-1", None)
            .await
            .unwrap();
        assert!(merchant.account_code.starts_with("ACC-MER-"));
        assert_eq!(merchant.name, "Merchant Settlement Account");

        let found = ledger
            .get_account_by_code(&merchant.account_code)
            .await
            .unwrap();
        assert_eq!(found.id, merchant.id);

        let err = ledger.get_account_by_code("ACC-NOPE").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);

        let batch = ledger
            .get_accounts(&[merchant.id, AccountId::new()])
            .await
            .unwrap();
        assert_eq!(batch.len(), 1);

        let view = ledger.balance(&merchant.id).await.unwrap();
        assert_eq!(view.total_balance, Decimal::ZERO);
        assert_eq!(view.currency, "USDC");
    }
}
