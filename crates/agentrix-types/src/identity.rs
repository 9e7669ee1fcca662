//! Identity types for Agentrix
//!
//! Internal identities are strongly typed wrappers around UUIDs so an
//! account id can never be passed where an agent id is expected. Ids are
//! `Ord`: the ledger relies on that ordering to lock accounts
//! deterministically.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::OwnerType;

/// Macro to generate ID types with common implementations
macro_rules! define_id_type {
    ($name:ident, $prefix:literal, $doc:literal) => {
        #[doc = $doc]
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub Uuid);

        impl $name {
            /// Create a new random ID
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            /// Create from an existing UUID
            pub fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            /// Parse from a string (with or without prefix)
            pub fn parse(s: &str) -> Result<Self, uuid::Error> {
                let s = s.strip_prefix(concat!($prefix, "_")).unwrap_or(s);
                Ok(Self(Uuid::parse_str(s)?))
            }

            /// Get the inner UUID
            pub fn as_uuid(&self) -> &Uuid {
                &self.0
            }

            /// Convert to prefixed string
            pub fn to_prefixed_string(&self) -> String {
                format!("{}_{}", $prefix, self.0)
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}_{}", $prefix, self.0)
            }
        }

        impl From<Uuid> for $name {
            fn from(uuid: Uuid) -> Self {
                Self(uuid)
            }
        }

        impl AsRef<Uuid> for $name {
            fn as_ref(&self) -> &Uuid {
                &self.0
            }
        }
    };
}

define_id_type!(AccountId, "acct", "Unique identifier for a ledger account");
define_id_type!(AgentId, "agent", "Unique identifier for an autonomous agent");
define_id_type!(HistoryEntryId, "hist", "Unique identifier for an account history entry");

/// The actor that owns a ledger account
///
/// `id` is a foreign identity whose meaning depends on `owner_type`: a user
/// id issued by the auth layer, an [`AgentId`], a merchant id or a platform
/// name. Only agent ids are minted by this workspace.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Owner {
    pub id: String,
    pub owner_type: OwnerType,
}

impl Owner {
    pub fn new(id: impl Into<String>, owner_type: OwnerType) -> Self {
        Self {
            id: id.into(),
            owner_type,
        }
    }

    pub fn user(id: impl Into<String>) -> Self {
        Self::new(id, OwnerType::User)
    }

    /// Agent owners are keyed by the bare UUID, without the `agent_` prefix
    pub fn agent(id: AgentId) -> Self {
        Self::new(id.0.to_string(), OwnerType::Agent)
    }

    pub fn merchant(id: impl Into<String>) -> Self {
        Self::new(id, OwnerType::Merchant)
    }

    pub fn platform(id: impl Into<String>) -> Self {
        Self::new(id, OwnerType::Platform)
    }
}

impl fmt::Display for Owner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.owner_type, self.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_account_id_creation() {
        let id = AccountId::new();
        assert!(id.to_string().starts_with("acct_"));
    }

    #[test]
    fn test_id_parsing() {
        let id = AgentId::new();
        let parsed = AgentId::parse(&id.to_string()).unwrap();
        assert_eq!(id, parsed);
        assert_eq!(AgentId::parse(&id.0.to_string()).unwrap(), id);
    }

    #[test]
    fn test_ids_order_like_their_uuids() {
        let a = AccountId::from_uuid(Uuid::from_u128(1));
        let b = AccountId::from_uuid(Uuid::from_u128(2));
        assert!(a < b);
        let mut ids = vec![b, a];
        ids.sort();
        assert_eq!(ids, vec![a, b]);
    }

    #[test]
    fn test_ids_serialize_as_bare_uuid() {
        let uuid = Uuid::new_v4();
        let json = serde_json::to_string(&AccountId::from_uuid(uuid)).unwrap();
        assert_eq!(json, format!("\"{}\"", uuid));
    }

    #[test]
    fn test_agent_owner_uses_bare_uuid() {
        let agent = AgentId::new();
        let owner = Owner::agent(agent);
        assert_eq!(owner.id, agent.0.to_string());
        assert_eq!(owner.owner_type, OwnerType::Agent);
        assert_eq!(owner.to_string(), format!("agent:{}", agent.0));
    }
}
