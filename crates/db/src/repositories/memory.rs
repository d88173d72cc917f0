use std::collections::HashMap;

use chrono::Utc;
use tokio::sync::RwLock;
use uuid::Uuid;

use loadout_core::domain::agent::{
    AccountId, AccountRecord, AgentId, AgentRecord, LegacyVersionFields, NewAgent, NewVersion,
    TriggerId, TriggerRecord, VersionId, VersionRecord,
};

use super::{
    carries_flag, version_config_for, AccountRepository, AgentRepository, RepositoryError,
    TriggerRepository, VersionRepository,
};

/// One process-local store backing every repository trait, so versions can advance their
/// agent and deleting an agent drops its versions and triggers.
#[derive(Default)]
pub struct InMemoryAgentStore {
    accounts: RwLock<HashMap<String, AccountRecord>>,
    agents: RwLock<HashMap<String, AgentRecord>>,
    versions: RwLock<HashMap<String, VersionRecord>>,
    triggers: RwLock<HashMap<String, TriggerRecord>>,
}

impl InMemoryAgentStore {
    async fn flagged(&self, flag: &str) -> Vec<AgentRecord> {
        let agents = self.agents.read().await;
        let mut flagged: Vec<AgentRecord> =
            agents.values().filter(|agent| carries_flag(&agent.metadata, flag)).cloned().collect();
        flagged.sort_by(|left, right| {
            left.created_at.cmp(&right.created_at).then_with(|| left.id.cmp(&right.id))
        });
        flagged
    }
}

#[async_trait::async_trait]
impl AccountRepository for InMemoryAgentStore {
    async fn find_by_id(&self, id: &AccountId) -> Result<Option<AccountRecord>, RepositoryError> {
        let accounts = self.accounts.read().await;
        Ok(accounts.get(&id.0).cloned())
    }

    async fn save(&self, account: AccountRecord) -> Result<(), RepositoryError> {
        let mut accounts = self.accounts.write().await;
        accounts.insert(account.id.0.clone(), account);
        Ok(())
    }

    async fn list_personal_account_ids(&self) -> Result<Vec<AccountId>, RepositoryError> {
        let accounts = self.accounts.read().await;
        let mut personal: Vec<&AccountRecord> =
            accounts.values().filter(|account| account.personal_account).collect();
        personal.sort_by(|left, right| {
            left.created_at.cmp(&right.created_at).then_with(|| left.id.cmp(&right.id))
        });
        Ok(personal.into_iter().map(|account| account.id.clone()).collect())
    }
}

#[async_trait::async_trait]
impl AgentRepository for InMemoryAgentStore {
    async fn find_by_id(&self, id: &AgentId) -> Result<Option<AgentRecord>, RepositoryError> {
        let agents = self.agents.read().await;
        Ok(agents.get(&id.0).cloned())
    }

    async fn find_with_flag(
        &self,
        account_id: &AccountId,
        flag: &str,
    ) -> Result<Option<AgentRecord>, RepositoryError> {
        Ok(self.flagged(flag).await.into_iter().find(|agent| &agent.account_id == account_id))
    }

    async fn account_ids_with_flag(&self, flag: &str) -> Result<Vec<AccountId>, RepositoryError> {
        let mut account_ids: Vec<AccountId> =
            self.flagged(flag).await.into_iter().map(|agent| agent.account_id).collect();
        account_ids.sort();
        account_ids.dedup();
        Ok(account_ids)
    }

    async fn count_with_flag(&self, flag: &str) -> Result<u64, RepositoryError> {
        Ok(self.flagged(flag).await.len() as u64)
    }

    async fn create(&self, agent: NewAgent) -> Result<AgentRecord, RepositoryError> {
        if !self.accounts.read().await.contains_key(&agent.account_id.0) {
            return Err(RepositoryError::NotFound(format!("account `{}`", agent.account_id)));
        }

        let now = Utc::now();
        let record = AgentRecord {
            id: AgentId(Uuid::new_v4().to_string()),
            account_id: agent.account_id,
            name: agent.name,
            description: agent.description,
            icon: agent.icon,
            system_prompt: Some(agent.system_prompt),
            configured_mcps: serde_json::Value::Array(agent.configured_mcps),
            custom_mcps: serde_json::Value::Array(agent.custom_mcps),
            tool_flags: serde_json::to_value(&agent.tool_flags)
                .map_err(|error| RepositoryError::Decode(error.to_string()))?,
            metadata: serde_json::Value::Object(agent.metadata),
            is_default: agent.is_default,
            current_version_id: None,
            version_count: 0,
            created_at: now,
            updated_at: now,
        };

        let mut agents = self.agents.write().await;
        agents.insert(record.id.0.clone(), record.clone());
        Ok(record)
    }

    async fn delete(&self, id: &AgentId) -> Result<bool, RepositoryError> {
        let removed = self.agents.write().await.remove(&id.0).is_some();
        if removed {
            self.versions.write().await.retain(|_, version| &version.agent_id != id);
            self.triggers.write().await.retain(|_, trigger| &trigger.agent_id != id);
        }
        Ok(removed)
    }
}

#[async_trait::async_trait]
impl VersionRepository for InMemoryAgentStore {
    async fn find_by_id(&self, id: &VersionId) -> Result<Option<VersionRecord>, RepositoryError> {
        let versions = self.versions.read().await;
        Ok(versions.get(&id.0).cloned())
    }

    async fn list_for_agent(
        &self,
        agent_id: &AgentId,
    ) -> Result<Vec<VersionRecord>, RepositoryError> {
        let versions = self.versions.read().await;
        let mut listed: Vec<VersionRecord> =
            versions.values().filter(|version| &version.agent_id == agent_id).cloned().collect();
        listed.sort_by_key(|version| version.version_number);
        Ok(listed)
    }

    async fn create_version(&self, version: NewVersion) -> Result<VersionId, RepositoryError> {
        let mut agents = self.agents.write().await;
        let agent = agents
            .get_mut(&version.agent_id.0)
            .ok_or_else(|| RepositoryError::NotFound(format!("agent `{}`", version.agent_id)))?;

        let config = serde_json::to_value(version_config_for(&version, &agent.metadata))
            .map_err(|error| RepositoryError::Decode(error.to_string()))?;
        let now = Utc::now();
        let record = VersionRecord {
            id: VersionId(Uuid::new_v4().to_string()),
            agent_id: version.agent_id,
            version_number: agent.version_count + 1,
            version_name: version.version_name,
            config: Some(config),
            legacy: LegacyVersionFields::default(),
            change_description: Some(version.change_description),
            created_by: version.user_id,
            created_at: now,
        };

        agent.current_version_id = Some(record.id.clone());
        agent.version_count += 1;
        agent.updated_at = now;

        let id = record.id.clone();
        self.versions.write().await.insert(id.0.clone(), record);
        Ok(id)
    }
}

#[async_trait::async_trait]
impl TriggerRepository for InMemoryAgentStore {
    async fn list_for_agent(
        &self,
        agent_id: &AgentId,
    ) -> Result<Vec<TriggerRecord>, RepositoryError> {
        let triggers = self.triggers.read().await;
        let mut listed: Vec<TriggerRecord> =
            triggers.values().filter(|trigger| &trigger.agent_id == agent_id).cloned().collect();
        listed.sort_by(|left, right| {
            left.created_at.cmp(&right.created_at).then_with(|| left.id.0.cmp(&right.id.0))
        });
        Ok(listed)
    }

    async fn save(&self, trigger: TriggerRecord) -> Result<(), RepositoryError> {
        let mut triggers = self.triggers.write().await;
        triggers.insert(trigger.id.0.clone(), trigger);
        Ok(())
    }

    async fn delete(&self, id: &TriggerId) -> Result<bool, RepositoryError> {
        Ok(self.triggers.write().await.remove(&id.0).is_some())
    }
}
