//! Ledger account record and its validation rules

use std::collections::BTreeMap;

use agentrix_types::{
    generate_account_code, AccountId, AccountStatus, ChainType, Owner, OwnerType, WalletType,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{LedgerError, Result};

/// Decimal places kept for amounts and balances; storage columns hold no more
pub const AMOUNT_SCALE: u32 = 8;

/// Reject amounts with more fractional digits than [`AMOUNT_SCALE`]
pub fn check_amount_scale(amount: Decimal) -> Result<()> {
    if amount.normalize().scale() > AMOUNT_SCALE {
        return Err(LedgerError::InvalidAmount {
            message: format!(
                "{} has more than {} decimal places",
                amount, AMOUNT_SCALE
            ),
        });
    }
    Ok(())
}

/// `value + amount`, or `InvalidAmount` when the sum does not fit a Decimal
pub(crate) fn add_amount(value: Decimal, amount: Decimal, what: &str) -> Result<Decimal> {
    value
        .checked_add(amount)
        .ok_or_else(|| LedgerError::InvalidAmount {
            message: format!("{} overflow", what),
        })
}

/// Optional per-account caps
///
/// Advisory metadata only: the ledger never enforces them. The spending gate
/// for agents lives on the agent record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountLimits {
    pub single_tx_limit: Option<Decimal>,
    pub daily_limit: Option<Decimal>,
    pub monthly_limit: Option<Decimal>,
}

impl AccountLimits {
    fn validate(&self) -> Result<()> {
        for (name, limit) in [
            ("single_tx_limit", self.single_tx_limit),
            ("daily_limit", self.daily_limit),
            ("monthly_limit", self.monthly_limit),
        ] {
            if let Some(limit) = limit {
                if limit.is_sign_negative() {
                    return Err(LedgerError::invalid_input(format!(
                        "{} must not be negative",
                        name
                    )));
                }
                check_amount_scale(limit)?;
            }
        }
        Ok(())
    }
}

/// A ledger account owned by exactly one user, agent, merchant or platform
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub id: AccountId,
    /// External-facing `ACC-…` code
    pub account_code: String,
    pub name: String,

    pub owner_id: String,
    pub owner_type: OwnerType,
    /// Direct link to the user identity, only for user-owned accounts
    pub user_id: Option<String>,

    pub wallet_type: WalletType,
    pub chain_type: ChainType,
    pub wallet_address: Option<String>,
    /// Wallet id at the external custody provider
    pub custody_wallet_id: Option<String>,

    /// Primary currency
    pub currency: String,
    pub available_balance: Decimal,
    pub frozen_balance: Decimal,
    pub pending_balance: Decimal,
    /// Non-primary currency balances, created on first deposit
    pub multi_currency_balances: BTreeMap<String, Decimal>,
    pub balance_updated_at: Option<DateTime<Utc>>,

    pub limits: AccountLimits,

    pub status: AccountStatus,
    pub status_reason: Option<String>,

    pub total_deposit: Decimal,
    pub total_withdraw: Decimal,
    pub transaction_count: i64,

    pub is_default: bool,
    pub metadata: serde_json::Value,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Request to open an account
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewAccount {
    pub name: String,
    pub owner: Owner,
    pub wallet_type: WalletType,
    pub chain_type: Option<ChainType>,
    pub currency: Option<String>,
    pub wallet_address: Option<String>,
    pub custody_wallet_id: Option<String>,
    pub user_id: Option<String>,
    pub is_default: bool,
    pub limits: AccountLimits,
    pub metadata: Option<serde_json::Value>,
}

impl NewAccount {
    pub fn new(name: impl Into<String>, owner: Owner, wallet_type: WalletType) -> Self {
        Self {
            name: name.into(),
            owner,
            wallet_type,
            chain_type: None,
            currency: None,
            wallet_address: None,
            custody_wallet_id: None,
            user_id: None,
            is_default: false,
            limits: AccountLimits::default(),
            metadata: None,
        }
    }

    pub fn chain(mut self, chain_type: ChainType) -> Self {
        self.chain_type = Some(chain_type);
        self
    }

    pub fn currency(mut self, currency: impl Into<String>) -> Self {
        self.currency = Some(currency.into());
        self
    }

    pub fn wallet_address(mut self, address: impl Into<String>) -> Self {
        self.wallet_address = Some(address.into());
        self
    }

    pub fn custody_wallet(mut self, wallet_id: impl Into<String>) -> Self {
        self.custody_wallet_id = Some(wallet_id.into());
        self
    }

    pub fn user_link(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn default_account(mut self) -> Self {
        self.is_default = true;
        self
    }

    pub fn limits(mut self, limits: AccountLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = Some(metadata);
        self
    }

    /// Validate and materialize the account row
    pub fn into_account(self, default_currency: &str) -> Result<Account> {
        let name = self.name.trim().to_string();
        if name.is_empty() {
            return Err(LedgerError::invalid_input("account name is required"));
        }
        if self.owner.id.trim().is_empty() {
            return Err(LedgerError::invalid_input("owner id is required"));
        }
        if self.user_id.is_some() && self.owner.owner_type != OwnerType::User {
            return Err(LedgerError::invalid_input(
                "user link is only allowed on user-owned accounts",
            ));
        }
        let wallet_address = match self.wallet_address {
            Some(address) => {
                let address = address.trim().to_string();
                if address.is_empty() {
                    return Err(LedgerError::invalid_input("wallet address is empty"));
                }
                Some(address)
            }
            None => None,
        };
        let currency = normalize_currency(self.currency.as_deref().unwrap_or(default_currency))?;
        self.limits.validate()?;

        let now = Utc::now();
        Ok(Account {
            id: AccountId::new(),
            account_code: generate_account_code(self.owner.owner_type),
            name,
            owner_id: self.owner.id,
            owner_type: self.owner.owner_type,
            user_id: self.user_id,
            wallet_type: self.wallet_type,
            chain_type: self.chain_type.unwrap_or_default(),
            wallet_address,
            custody_wallet_id: self.custody_wallet_id,
            currency,
            available_balance: Decimal::ZERO,
            frozen_balance: Decimal::ZERO,
            pending_balance: Decimal::ZERO,
            multi_currency_balances: BTreeMap::new(),
            balance_updated_at: None,
            limits: self.limits,
            status: AccountStatus::Active,
            status_reason: None,
            total_deposit: Decimal::ZERO,
            total_withdraw: Decimal::ZERO,
            transaction_count: 0,
            is_default: self.is_default,
            metadata: self.metadata.unwrap_or(serde_json::Value::Null),
            created_at: now,
            updated_at: now,
        })
    }
}

/// Upper-case and validate a currency code (2-10 ASCII alphanumerics)
pub fn normalize_currency(code: &str) -> Result<String> {
    let code = code.trim().to_uppercase();
    let valid_len = (2..=10).contains(&code.len());
    if !valid_len || !code.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(LedgerError::invalid_input(format!(
            "invalid currency code {:?}",
            code
        )));
    }
    Ok(code)
}

/// Balance snapshot in the primary currency
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceView {
    pub available_balance: Decimal,
    pub frozen_balance: Decimal,
    pub pending_balance: Decimal,
    pub total_balance: Decimal,
    pub currency: String,
}

/// Lifetime flow aggregates
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountStats {
    pub total_deposit: Decimal,
    pub total_withdraw: Decimal,
    pub transaction_count: i64,
    pub net_flow: Decimal,
}

impl Account {
    pub fn owner(&self) -> Owner {
        Owner::new(self.owner_id.clone(), self.owner_type)
    }

    pub fn is_owned_by(&self, owner: &Owner) -> bool {
        self.owner_id == owner.id && self.owner_type == owner.owner_type
    }

    pub fn is_primary(&self, currency: &str) -> bool {
        self.currency == currency
    }

    /// Sum of the three primary balance components
    ///
    /// Credits refuse to push this sum past `Decimal::MAX`, so saturation
    /// never shows on rows the ledger wrote.
    pub fn total_balance(&self) -> Decimal {
        self.available_balance
            .saturating_add(self.frozen_balance)
            .saturating_add(self.pending_balance)
    }

    /// Spendable balance in `currency`: the primary available balance or a side balance
    pub fn spendable(&self, currency: &str) -> Decimal {
        if self.is_primary(currency) {
            self.available_balance
        } else {
            self.multi_currency_balances
                .get(currency)
                .copied()
                .unwrap_or(Decimal::ZERO)
        }
    }

    pub fn balance_view(&self) -> BalanceView {
        BalanceView {
            available_balance: self.available_balance,
            frozen_balance: self.frozen_balance,
            pending_balance: self.pending_balance,
            total_balance: self.total_balance(),
            currency: self.currency.clone(),
        }
    }

    /// Primary available balance plus every side balance, keyed by currency
    pub fn multi_currency_view(&self) -> BTreeMap<String, Decimal> {
        let mut balances = self.multi_currency_balances.clone();
        balances.insert(self.currency.clone(), self.available_balance);
        balances
    }

    pub fn stats(&self) -> AccountStats {
        AccountStats {
            total_deposit: self.total_deposit,
            total_withdraw: self.total_withdraw,
            transaction_count: self.transaction_count,
            net_flow: self.total_deposit.saturating_sub(self.total_withdraw),
        }
    }

    pub(crate) fn require_status(&self, status: AccountStatus, action: &'static str) -> Result<()> {
        if self.status != status {
            return Err(LedgerError::InvalidState {
                account: self.id,
                status: self.status,
                action,
            });
        }
        Ok(())
    }

    pub(crate) fn require_open(&self, action: &'static str) -> Result<()> {
        if self.status.is_closed() {
            return Err(LedgerError::InvalidState {
                account: self.id,
                status: self.status,
                action,
            });
        }
        Ok(())
    }

    /// Leaves the account untouched when the new balance would overflow
    pub(crate) fn credit(&mut self, currency: &str, amount: Decimal) -> Result<()> {
        if self.is_primary(currency) {
            let available = add_amount(self.available_balance, amount, "available balance")?;
            let held = add_amount(self.frozen_balance, self.pending_balance, "total balance")?;
            add_amount(available, held, "total balance")?;
            self.available_balance = available;
        } else {
            let balance = add_amount(self.spendable(currency), amount, "side balance")?;
            self.multi_currency_balances
                .insert(currency.to_string(), balance);
        }
        Ok(())
    }

    pub(crate) fn debit(&mut self, currency: &str, amount: Decimal) -> Result<()> {
        let available = self.spendable(currency);
        if available < amount {
            return Err(LedgerError::InsufficientFunds {
                currency: currency.to_string(),
                available,
                required: amount,
            });
        }
        if self.is_primary(currency) {
            self.available_balance -= amount;
        } else {
            self.multi_currency_balances
                .insert(currency.to_string(), available - amount);
        }
        Ok(())
    }

    pub(crate) fn touch_balance(&mut self, now: DateTime<Utc>) {
        self.balance_updated_at = Some(now);
    }

    pub(crate) fn count_transaction(&mut self, now: DateTime<Utc>) {
        self.transaction_count += 1;
        self.touch_balance(now);
    }

    /// Every balance component, primary and side, must be ≥ 0
    pub fn ensure_non_negative(&self) -> Result<()> {
        let primary = [
            ("available", self.available_balance),
            ("frozen", self.frozen_balance),
            ("pending", self.pending_balance),
        ];
        for (name, value) in primary {
            if value.is_sign_negative() && !value.is_zero() {
                return Err(LedgerError::InvariantViolation {
                    account: self.id,
                    message: format!("{} balance is negative ({})", name, value),
                });
            }
        }
        for (currency, value) in &self.multi_currency_balances {
            if value.is_sign_negative() && !value.is_zero() {
                return Err(LedgerError::InvariantViolation {
                    account: self.id,
                    message: format!("{} side balance is negative ({})", currency, value),
                });
            }
        }
        Ok(())
    }
}
