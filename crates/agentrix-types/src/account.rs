//! Ledger account classification

define_str_enum! {
    /// Kind of economic actor that owns an account
    OwnerType, "owner type" {
        User => "user",
        Agent => "agent",
        Merchant => "merchant",
        Platform => "platform",
    }
}

impl OwnerType {
    /// Three-letter prefix used in account codes (`USE`, `AGE`, `MER`, `PLA`)
    pub fn code_prefix(&self) -> String {
        self.as_str().to_uppercase().chars().take(3).collect()
    }
}

define_str_enum! {
    /// Who holds the keys for the funds behind an account
    WalletType, "wallet type" {
        Custodial => "custodial",
        NonCustodial => "non_custodial",
        /// Record-keeping only, no on-chain counterpart
        Virtual => "virtual",
    }
}

define_str_enum! {
    /// Chain family of the wallet behind an account
    ChainType, "chain type" {
        Evm => "evm",
        Solana => "solana",
        Bitcoin => "bitcoin",
        Multi => "multi",
    }
}

impl Default for ChainType {
    fn default() -> Self {
        Self::Multi
    }
}

define_str_enum! {
    /// Account lifecycle: `active ⇄ frozen`, `active | frozen → closed`
    AccountStatus, "account status" {
        Active => "active",
        Frozen => "frozen",
        Closed => "closed",
    }
}

impl AccountStatus {
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Active)
    }

    pub fn is_closed(&self) -> bool {
        matches!(self, Self::Closed)
    }
}
