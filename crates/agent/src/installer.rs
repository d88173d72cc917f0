use std::collections::BTreeSet;
use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use loadout_core::domain::agent::{AccountId, AgentId, NewAgent, NewVersion};
use loadout_core::errors::{ApplicationError, DomainError};
use loadout_core::managed::ManagedAgentDefinition;
use loadout_core::resolver::INITIAL_VERSION_NAME;
use loadout_db::repositories::{AgentStores, RepositoryError};

pub const ALL_INSTALLED_DETAIL: &str = "All personal accounts already have this agent installed.";

#[derive(Debug, Error)]
pub enum InstallError {
    #[error("account `{0}` was not found")]
    AccountNotFound(AccountId),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
    #[error("initial version for agent `{agent_id}` could not be created: {source}")]
    Version {
        agent_id: AgentId,
        #[source]
        source: RepositoryError,
    },
}

impl From<InstallError> for ApplicationError {
    fn from(value: InstallError) -> Self {
        match value {
            InstallError::AccountNotFound(id) => DomainError::AccountNotFound(id.0).into(),
            other => ApplicationError::Persistence(other.to_string()),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct InstallFailure {
    pub account_id: AccountId,
    pub reason: String,
}

/// Outcome of a bulk install. Per-account failures are collected here, never raised.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct InstallSummary {
    pub installed: Vec<AccountId>,
    pub failed: Vec<InstallFailure>,
    pub total_missing: usize,
    pub details: Vec<String>,
}

impl InstallSummary {
    fn record(mut self, account_id: AccountId, outcome: Result<AgentId, InstallError>) -> Self {
        match outcome {
            Ok(_) => {
                self.details.push(format!("Installed for {account_id}"));
                self.installed.push(account_id);
            }
            Err(error) => {
                let reason = error.to_string();
                self.details.push(format!("Failed to install for {account_id}: {reason}"));
                self.failed.push(InstallFailure { account_id, reason });
            }
        }
        self
    }

    pub fn installed_count(&self) -> usize {
        self.installed.len()
    }

    pub fn failed_count(&self) -> usize {
        self.failed.len()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct InstallStats {
    pub total_agents: u64,
}

/// Keeps one up-to-date instance of a managed definition per personal account.
pub struct ManagedAgentInstaller {
    definition: Arc<ManagedAgentDefinition>,
    stores: AgentStores,
}

impl ManagedAgentInstaller {
    pub fn new(definition: Arc<ManagedAgentDefinition>, stores: AgentStores) -> Self {
        Self { definition, stores }
    }

    pub fn definition(&self) -> &ManagedAgentDefinition {
        &self.definition
    }

    /// Installs for every personal account that lacks an instance. Accounts are processed in
    /// order and one failure never stops the rest.
    pub async fn install_for_all_users(&self) -> Result<InstallSummary, InstallError> {
        let flag = self.definition.metadata_flag();
        let accounts: BTreeSet<AccountId> =
            self.stores.accounts.list_personal_account_ids().await?.into_iter().collect();
        let existing: BTreeSet<AccountId> =
            self.stores.agents.account_ids_with_flag(flag).await?.into_iter().collect();
        let missing: Vec<AccountId> = accounts.difference(&existing).cloned().collect();

        info!(
            event_name = "agent.installer.bulk_started",
            managed_agent_key = self.definition.key(),
            total_missing = missing.len(),
            "installing managed agent for missing accounts"
        );

        let mut summary = InstallSummary { total_missing: missing.len(), ..InstallSummary::default() };
        for account_id in missing {
            let outcome = self.create_agent_for_user(&account_id).await;
            if let Err(failure) = &outcome {
                error!(
                    event_name = "agent.installer.install_failed",
                    managed_agent_key = self.definition.key(),
                    account_id = %account_id,
                    error = %failure,
                    "managed agent install failed"
                );
            }
            summary = summary.record(account_id, outcome);
        }

        if summary.total_missing == 0 {
            summary.details.push(ALL_INSTALLED_DETAIL.to_string());
        }

        info!(
            event_name = "agent.installer.bulk_finished",
            managed_agent_key = self.definition.key(),
            installed = summary.installed_count(),
            failed = summary.failed_count(),
            "bulk install finished"
        );
        Ok(summary)
    }

    /// Returns the existing instance, or replaces it when `replace_existing` is set.
    pub async fn ensure_for_user(
        &self,
        account_id: &AccountId,
        replace_existing: bool,
    ) -> Result<AgentId, InstallError> {
        if self.stores.accounts.find_by_id(account_id).await?.is_none() {
            return Err(InstallError::AccountNotFound(account_id.clone()));
        }

        let existing =
            self.stores.agents.find_with_flag(account_id, self.definition.metadata_flag()).await?;

        if let Some(existing) = existing {
            if !replace_existing {
                debug!(
                    event_name = "agent.installer.already_installed",
                    managed_agent_key = self.definition.key(),
                    account_id = %account_id,
                    agent_id = %existing.id,
                    "managed agent already installed"
                );
                return Ok(existing.id);
            }
            self.delete_agent(&existing.id).await?;
            info!(
                event_name = "agent.installer.removed_for_reinstall",
                managed_agent_key = self.definition.key(),
                account_id = %account_id,
                agent_id = %existing.id,
                "existing instance removed for reinstall"
            );
        }

        self.create_agent_for_user(account_id).await
    }

    pub async fn get_stats(&self) -> Result<InstallStats, InstallError> {
        let total_agents =
            self.stores.agents.count_with_flag(self.definition.metadata_flag()).await?;
        Ok(InstallStats { total_agents })
    }

    /// Writes the agent row and its `v1` version from the definition as it is right now.
    pub async fn create_agent_for_user(&self, account_id: &AccountId) -> Result<AgentId, InstallError> {
        let definition = &self.definition;
        let system_prompt = definition.system_prompt();

        let agent = self
            .stores
            .agents
            .create(NewAgent {
                account_id: account_id.clone(),
                name: definition.name().to_string(),
                description: Some(definition.description().to_string()),
                icon: definition.icon().clone(),
                system_prompt: system_prompt.clone(),
                configured_mcps: definition.configured_mcps(),
                custom_mcps: definition.custom_mcps(),
                tool_flags: definition.tool_flags(),
                metadata: definition.build_metadata(),
                is_default: definition.is_default_for_new_accounts(),
            })
            .await?;

        let version = NewVersion {
            agent_id: agent.id.clone(),
            user_id: account_id.clone(),
            system_prompt,
            configured_mcps: definition.configured_mcps(),
            custom_mcps: definition.custom_mcps(),
            tool_flags: definition.tool_flags(),
            model: Some(definition.model()),
            version_name: INITIAL_VERSION_NAME.to_string(),
            change_description: definition.change_description().to_string(),
        };
        if let Err(source) = self.stores.versions.create_version(version).await {
            if let Err(cleanup) = self.stores.agents.delete(&agent.id).await {
                warn!(
                    event_name = "agent.installer.orphan_cleanup_failed",
                    agent_id = %agent.id,
                    error = %cleanup,
                    "agent without an initial version could not be removed"
                );
            }
            return Err(InstallError::Version { agent_id: agent.id, source });
        }

        info!(
            event_name = "agent.installer.installed",
            managed_agent_key = definition.key(),
            account_id = %account_id,
            agent_id = %agent.id,
            "managed agent installed"
        );
        Ok(agent.id)
    }

    /// Removes an instance. Trigger cleanup is best effort; the agent delete is not.
    async fn delete_agent(&self, agent_id: &AgentId) -> Result<(), InstallError> {
        match self.stores.triggers.list_for_agent(agent_id).await {
            Ok(triggers) => {
                for trigger in triggers {
                    if let Err(cleanup) = self.stores.triggers.delete(&trigger.id).await {
                        warn!(
                            event_name = "agent.installer.trigger_cleanup_failed",
                            agent_id = %agent_id,
                            trigger_id = %trigger.id,
                            error = %cleanup,
                            "failed cleaning trigger"
                        );
                    }
                }
            }
            Err(cleanup) => warn!(
                event_name = "agent.installer.trigger_cleanup_failed",
                agent_id = %agent_id,
                error = %cleanup,
                "trigger cleanup failed"
            ),
        }

        self.stores.agents.delete(agent_id).await?;
        Ok(())
    }
}
