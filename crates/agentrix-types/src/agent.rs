//! Agent classification

define_str_enum! {
    /// Agent lifecycle: `draft → active ⇄ suspended`, any non-revoked state `→ revoked`
    AgentStatus, "agent status" {
        Draft => "draft",
        Active => "active",
        Suspended => "suspended",
        Revoked => "revoked",
    }
}

impl AgentStatus {
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Active)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Revoked)
    }
}

define_str_enum! {
    /// What the agent acts on behalf of
    AgentType, "agent type" {
        Personal => "personal",
        Merchant => "merchant",
        Platform => "platform",
        ThirdParty => "third_party",
    }
}

impl Default for AgentType {
    fn default() -> Self {
        Self::Personal
    }
}

define_str_enum! {
    /// Risk tier derived from the agent's credit score
    RiskLevel, "risk level" {
        Low => "low",
        Medium => "medium",
        High => "high",
        Critical => "critical",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_agent_status_round_trip() {
        for status in AgentStatus::ALL {
            assert_eq!(AgentStatus::from_str(status.as_str()).unwrap(), *status);
        }
        assert!(AgentStatus::Revoked.is_terminal());
        assert!(!AgentStatus::Suspended.is_terminal());
    }

    #[test]
    fn test_unknown_risk_level() {
        let err = RiskLevel::from_str("extreme").unwrap_err();
        assert_eq!(err.kind, "risk level");
        assert_eq!(err.value, "extreme");
    }
}
