//! Account history
//!
//! An append-only trail per account, written in the same unit of work as the
//! balance change it describes and trimmed to the configured retention.

use std::fmt;
use std::str::FromStr;

use agentrix_types::{AccountId, HistoryEntryId, ParseEnumError};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// What happened to the account
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HistoryKind {
    Deposit,
    Withdrawal,
    Transfer,
    Freeze,
    Unfreeze,
}

impl HistoryKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Deposit => "deposit",
            Self::Withdrawal => "withdrawal",
            Self::Transfer => "transfer",
            Self::Freeze => "freeze",
            Self::Unfreeze => "unfreeze",
        }
    }

    pub fn stream(&self) -> HistoryStream {
        match self {
            Self::Deposit | Self::Withdrawal | Self::Transfer => HistoryStream::Funds,
            Self::Freeze | Self::Unfreeze => HistoryStream::Freezes,
        }
    }
}

impl fmt::Display for HistoryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HistoryKind {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "deposit" => Ok(Self::Deposit),
            "withdrawal" => Ok(Self::Withdrawal),
            "transfer" => Ok(Self::Transfer),
            "freeze" => Ok(Self::Freeze),
            "unfreeze" => Ok(Self::Unfreeze),
            other => Err(ParseEnumError {
                kind: "history kind",
                value: other.to_string(),
            }),
        }
    }
}

/// Side of a transfer, seen from the account holding the entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    In,
    Out,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::In => "in",
            Self::Out => "out",
        }
    }
}

impl FromStr for Direction {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "in" => Ok(Self::In),
            "out" => Ok(Self::Out),
            other => Err(ParseEnumError {
                kind: "transfer direction",
                value: other.to_string(),
            }),
        }
    }
}

/// Fund movements and balance freezes are kept as separate trails
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HistoryStream {
    Funds,
    Freezes,
}

impl HistoryStream {
    pub fn kinds(&self) -> &'static [HistoryKind] {
        match self {
            Self::Funds => &[
                HistoryKind::Deposit,
                HistoryKind::Withdrawal,
                HistoryKind::Transfer,
            ],
            Self::Freezes => &[HistoryKind::Freeze, HistoryKind::Unfreeze],
        }
    }
}

/// One row of an account's trail
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub id: HistoryEntryId,
    pub account_id: AccountId,
    pub kind: HistoryKind,
    pub amount: Decimal,
    pub currency: String,
    pub direction: Option<Direction>,
    pub counterparty: Option<AccountId>,
    /// Free-text annotation, not a dedup key
    pub reference: Option<String>,
    pub description: Option<String>,
    pub reason: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl HistoryEntry {
    pub fn new(
        account_id: AccountId,
        kind: HistoryKind,
        amount: Decimal,
        currency: impl Into<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: HistoryEntryId::new(),
            account_id,
            kind,
            amount,
            currency: currency.into(),
            direction: None,
            counterparty: None,
            reference: None,
            description: None,
            reason: None,
            created_at,
        }
    }

    pub fn annotated(mut self, reference: Option<String>, description: Option<String>) -> Self {
        self.reference = reference;
        self.description = description;
        self
    }

    pub fn transfer_leg(mut self, direction: Direction, counterparty: AccountId) -> Self {
        self.direction = Some(direction);
        self.counterparty = Some(counterparty);
        self
    }

    pub fn with_reason(mut self, reason: Option<String>) -> Self {
        self.reason = reason;
        self
    }
}

/// Page through an account's trail, newest first
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryQuery {
    pub stream: Option<HistoryStream>,
    pub limit: usize,
    pub offset: usize,
}

impl Default for HistoryQuery {
    fn default() -> Self {
        Self {
            stream: None,
            limit: 50,
            offset: 0,
        }
    }
}

impl HistoryQuery {
    pub fn stream(stream: HistoryStream) -> Self {
        Self {
            stream: Some(stream),
            ..Self::default()
        }
    }

    pub fn matches(&self, entry: &HistoryEntry) -> bool {
        self.stream
            .map_or(true, |stream| entry.kind.stream() == stream)
    }
}
