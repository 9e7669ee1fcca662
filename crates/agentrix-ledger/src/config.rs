//! Ledger configuration

use agentrix_types::DEFAULT_CURRENCY;
use serde::{Deserialize, Serialize};

/// Ledger configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerConfig {
    /// Primary currency for accounts created without one
    #[serde(default = "default_currency")]
    pub default_currency: String,
    /// Newest history rows kept per account; older rows are trimmed
    #[serde(default = "default_history_retention")]
    pub history_retention: usize,
}

fn default_currency() -> String {
    DEFAULT_CURRENCY.to_string()
}

fn default_history_retention() -> usize {
    1000
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            default_currency: default_currency(),
            history_retention: default_history_retention(),
        }
    }
}

impl LedgerConfig {
    /// Read overrides from `AGENTRIX_DEFAULT_CURRENCY` and `AGENTRIX_HISTORY_RETENTION`
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            default_currency: std::env::var("AGENTRIX_DEFAULT_CURRENCY")
                .ok()
                .map(|c| c.trim().to_uppercase())
                .filter(|c| !c.is_empty())
                .unwrap_or(defaults.default_currency),
            history_retention: std::env::var("AGENTRIX_HISTORY_RETENTION")
                .ok()
                .and_then(|s| s.parse().ok())
                .filter(|n| *n > 0)
                .unwrap_or(defaults.history_retention),
        }
    }
}
