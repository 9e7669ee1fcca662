//! Agent account directory
//!
//! Binds each agent to the ledger. Agent creation and revocation are two-step:
//! the agent row changes first, the ledger follow-up runs afterwards and is
//! not rolled back with it.

use std::sync::Arc;

use agentrix_ledger::{Account, ChainType, Ledger, NewAccount, Owner, WalletType};
use agentrix_types::AgentId;
use chrono::Utc;
use tracing::{error, info, warn};

use crate::{
    AgentAccount, AgentError, AgentPage, AgentStore, AgentUpdate, NewAgent, PageRequest, Result,
};

/// Agent registry with ledger linkage
#[derive(Clone)]
pub struct AgentDirectory {
    agents: Arc<dyn AgentStore>,
    ledger: Ledger,
}

impl AgentDirectory {
    pub fn new(agents: Arc<dyn AgentStore>, ledger: Ledger) -> Self {
        Self { agents, ledger }
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    /// Register a draft agent and provision its default virtual account
    ///
    /// If the account cannot be created the agent stays registered without
    /// one and `AccountProvisioning` is returned.
    pub async fn create(&self, request: NewAgent) -> Result<AgentAccount> {
        let agent = self.agents.insert(request.into_agent()?).await?;
        info!(agent_id = %agent.id, agent_code = %agent.agent_unique_id, "agent registered");

        let mut account_request = NewAccount::new(
            format!("{} Main Account", agent.name),
            Owner::agent(agent.id),
            WalletType::Virtual,
        )
        .chain(ChainType::Multi)
        .default_account();
        if let Some(limits) = &agent.spending_limits {
            account_request = account_request.currency(limits.currency.clone());
        }

        let account = match self.ledger.create_account(account_request).await {
            Ok(account) => account,
            Err(source) => {
                error!(
                    agent_id = %agent.id,
                    error = %source,
                    "agent registered without a default account"
                );
                return Err(AgentError::AccountProvisioning {
                    agent_id: agent.id,
                    source,
                });
            }
        };

        let agent = self
            .agents
            .update(&agent.id, &mut |agent: &mut AgentAccount| {
                agent.default_account_id = Some(account.id);
                Ok(())
            })
            .await?;
        info!(agent_id = %agent.id, account_id = %account.id, "default account linked");
        Ok(agent)
    }

    pub async fn get(&self, id: &AgentId) -> Result<AgentAccount> {
        self.agents
            .find(id)
            .await?
            .ok_or_else(|| AgentError::not_found(id))
    }

    pub async fn get_by_unique_id(&self, unique_id: &str) -> Result<AgentAccount> {
        self.agents
            .find_by_unique_id(unique_id)
            .await?
            .ok_or_else(|| AgentError::not_found(unique_id))
    }

    pub async fn list_by_owner(&self, owner_id: &str, page: PageRequest) -> Result<AgentPage> {
        self.agents.list_by_owner(owner_id, page).await
    }

    pub async fn update(&self, id: &AgentId, update: AgentUpdate) -> Result<AgentAccount> {
        let update = update.validated()?;
        let mut patch = Some(update);
        self.agents
            .update(id, &mut |agent: &mut AgentAccount| {
                if let Some(update) = patch.take() {
                    agent.apply_update(update);
                }
                Ok(())
            })
            .await
    }

    pub async fn activate(&self, id: &AgentId) -> Result<AgentAccount> {
        let agent = self
            .agents
            .update(id, &mut |agent: &mut AgentAccount| agent.activate(Utc::now()))
            .await?;
        info!(agent_id = %id, "agent activated");
        Ok(agent)
    }

    pub async fn suspend(&self, id: &AgentId, reason: Option<String>) -> Result<AgentAccount> {
        let agent = self
            .agents
            .update(id, &mut |agent: &mut AgentAccount| agent.suspend(reason.clone()))
            .await?;
        info!(agent_id = %id, reason = ?agent.status_reason, "agent suspended");
        Ok(agent)
    }

    pub async fn resume(&self, id: &AgentId) -> Result<AgentAccount> {
        let agent = self
            .agents
            .update(id, &mut |agent: &mut AgentAccount| agent.resume())
            .await?;
        info!(agent_id = %id, "agent resumed");
        Ok(agent)
    }

    /// Revoke the agent, then freeze its default account
    ///
    /// An account that is already frozen gets the revocation as its reason.
    /// The freeze is best effort: a failure is logged and the revocation
    /// stands.
    pub async fn revoke(&self, id: &AgentId, reason: Option<String>) -> Result<AgentAccount> {
        let agent = self
            .agents
            .update(id, &mut |agent: &mut AgentAccount| agent.revoke(reason.clone()))
            .await?;
        info!(agent_id = %id, reason = ?agent.status_reason, "agent revoked");

        if let Some(account_id) = agent.default_account_id {
            let freeze_reason = format!(
                "Agent revoked: {}",
                reason.as_deref().unwrap_or("no reason given")
            );
            if let Err(err) = self
                .ledger
                .enforce_freeze(&account_id, freeze_reason)
                .await
            {
                warn!(
                    agent_id = %id,
                    account_id = %account_id,
                    error = %err,
                    "could not freeze default account of revoked agent"
                );
            }
        }
        Ok(agent)
    }

    /// Open a non-default, non-custodial account bound to an external wallet
    pub async fn link_external_wallet(
        &self,
        id: &AgentId,
        wallet_address: &str,
        chain_type: ChainType,
    ) -> Result<Account> {
        let agent = self.get(id).await?;
        let wallet_address = wallet_address.trim();
        let short: String = wallet_address.chars().take(8).collect();

        let account = self
            .ledger
            .create_account(
                NewAccount::new(
                    format!("External Wallet {}...", short),
                    Owner::agent(agent.id),
                    WalletType::NonCustodial,
                )
                .chain(chain_type)
                .wallet_address(wallet_address),
            )
            .await?;

        let address = wallet_address.to_string();
        self.agents
            .update(id, &mut |agent: &mut AgentAccount| {
                agent.external_wallet_address = Some(address.clone());
                Ok(())
            })
            .await?;
        info!(agent_id = %id, account_id = %account.id, chain = %chain_type, "external wallet linked");
        Ok(account)
    }

    /// The agent's ledger accounts, default first
    pub async fn accounts(&self, id: &AgentId) -> Result<Vec<Account>> {
        let agent = self.get(id).await?;
        Ok(self.ledger.list_accounts(&Owner::agent(agent.id)).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{MemoryAgentStore, SpendingLimits};
    use agentrix_ledger::{AccountStatus, ErrorKind};
    use agentrix_types::AgentStatus;
    use rust_decimal_macros::dec;

    fn directory() -> AgentDirectory {
        AgentDirectory::new(Arc::new(MemoryAgentStore::new()), Ledger::in_memory())
    }

    #[tokio::test]
    async fn test_create_provisions_default_account() {
        let directory = directory();
        let agent = directory
            .create(
                NewAgent::new("Travel Bot", "user-9")
                    .spending_limits(SpendingLimits::new("EURC").daily(dec!(500))),
            )
            .await
            .unwrap();
        assert_eq!(agent.status, AgentStatus::Draft);

        let account_id = agent.default_account_id.unwrap();
        let account = directory.ledger().get_account(&account_id).await.unwrap();
        assert!(account.is_default);
        assert_eq!(account.wallet_type, WalletType::Virtual);
        assert_eq!(account.currency, "EURC");
        assert_eq!(account.owner(), Owner::agent(agent.id));
        assert!(account.account_code.starts_with("ACC-AGE-"));
    }

    #[tokio::test]
    async fn test_revoke_freezes_default_account() {
        let directory = directory();
        let agent = directory.create(NewAgent::new("Bot", "u-1")).await.unwrap();
        directory.activate(&agent.id).await.unwrap();

        let revoked = directory
            .revoke(&agent.id, Some("compromised key".into()))
            .await
            .unwrap();
        assert_eq!(revoked.status, AgentStatus::Revoked);

        let account = directory
            .ledger()
            .get_account(&agent.default_account_id.unwrap())
            .await
            .unwrap();
        assert_eq!(account.status, AccountStatus::Frozen);
        assert_eq!(
            account.status_reason.as_deref(),
            Some("Agent revoked: compromised key")
        );

        let err = directory.activate(&agent.id).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidState);
    }

    #[tokio::test]
    async fn test_revoke_restamps_already_frozen_account() {
        let directory = directory();
        let agent = directory.create(NewAgent::new("Bot", "u-1")).await.unwrap();
        let account_id = agent.default_account_id.unwrap();
        directory
            .ledger()
            .freeze_account(&account_id, Some("manual hold".into()))
            .await
            .unwrap();

        let revoked = directory.revoke(&agent.id, None).await.unwrap();
        assert_eq!(revoked.status, AgentStatus::Revoked);

        let account = directory.ledger().get_account(&account_id).await.unwrap();
        assert_eq!(account.status, AccountStatus::Frozen);
        assert_eq!(
            account.status_reason.as_deref(),
            Some("Agent revoked: no reason given")
        );
    }

    #[tokio::test]
    async fn test_revoke_stands_when_freeze_fails() {
        let directory = directory();
        let agent = directory.create(NewAgent::new("Bot", "u-1")).await.unwrap();
        let account_id = agent.default_account_id.unwrap();
        directory
            .ledger()
            .close_account(&account_id, Some("retired".into()))
            .await
            .unwrap();

        let revoked = directory.revoke(&agent.id, None).await.unwrap();
        assert_eq!(revoked.status, AgentStatus::Revoked);
        let stored = directory.get(&agent.id).await.unwrap();
        assert_eq!(stored.status, AgentStatus::Revoked);

        let account = directory.ledger().get_account(&account_id).await.unwrap();
        assert_eq!(account.status, AccountStatus::Closed);
        assert_eq!(account.status_reason.as_deref(), Some("retired"));
    }

    #[tokio::test]
    async fn test_link_external_wallet() {
        let directory = directory();
        let agent = directory.create(NewAgent::new("Bot", "u-1")).await.unwrap();

        let account = directory
            .link_external_wallet(&agent.id, "0x1234567890abcdef", ChainType::Evm)
            .await
            .unwrap();
        assert!(!account.is_default);
        assert_eq!(account.wallet_type, WalletType::NonCustodial);
        assert_eq!(account.chain_type, ChainType::Evm);
        assert_eq!(account.name, "External Wallet 0x123456...");

        let agent = directory.get(&agent.id).await.unwrap();
        assert_eq!(
            agent.external_wallet_address.as_deref(),
            Some("0x1234567890abcdef")
        );

        let accounts = directory.accounts(&agent.id).await.unwrap();
        assert_eq!(accounts.len(), 2);
        assert!(accounts[0].is_default);

        let other = directory.create(NewAgent::new("Other", "u-2")).await.unwrap();
        let err = directory
            .link_external_wallet(&other.id, "0x1234567890abcdef", ChainType::Evm)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);
    }

    #[tokio::test]
    async fn test_update_and_lookups() {
        let directory = directory();
        let agent = directory.create(NewAgent::new("Bot", "u-1")).await.unwrap();

        let updated = directory
            .update(
                &agent.id,
                AgentUpdate {
                    name: Some("  Better Bot ".into()),
                    capabilities: Some(vec!["checkout".into()]),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.name, "Better Bot");
        assert_eq!(updated.capabilities, vec!["checkout".to_string()]);

        let err = directory
            .update(
                &agent.id,
                AgentUpdate {
                    name: Some(" ".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);

        let found = directory
            .get_by_unique_id(&agent.agent_unique_id)
            .await
            .unwrap();
        assert_eq!(found.id, agent.id);

        let page = directory
            .list_by_owner("u-1", PageRequest::default())
            .await
            .unwrap();
        assert_eq!(page.total, 1);

        let err = directory.get(&AgentId::new()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }
}
