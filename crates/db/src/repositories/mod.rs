use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use loadout_core::domain::agent::{
    AccountId, AccountRecord, AgentId, AgentRecord, NewAgent, NewVersion, TriggerId,
    TriggerRecord, VersionId, VersionRecord,
};
use loadout_core::lenient::is_truthy;
use loadout_core::managed::definition::CENTRALLY_MANAGED_KEY;
use loadout_core::resolver::{build_unified_config, UnifiedConfigParts, VersionConfig};

pub mod account;
pub mod agent;
pub mod memory;
mod rows;
pub mod trigger;
pub mod version;

pub use account::SqlAccountRepository;
pub use agent::SqlAgentRepository;
pub use memory::InMemoryAgentStore;
pub use trigger::SqlTriggerRepository;
pub use version::SqlVersionRepository;

use crate::DbPool;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("not found: {0}")]
    NotFound(String),
}

#[async_trait]
pub trait AccountRepository: Send + Sync {
    async fn find_by_id(&self, id: &AccountId) -> Result<Option<AccountRecord>, RepositoryError>;
    async fn save(&self, account: AccountRecord) -> Result<(), RepositoryError>;
    async fn list_personal_account_ids(&self) -> Result<Vec<AccountId>, RepositoryError>;
}

/// Row-level access to agents. `flag` arguments name a metadata key; an agent carries the
/// flag when the key is present and truthy.
#[async_trait]
pub trait AgentRepository: Send + Sync {
    async fn find_by_id(&self, id: &AgentId) -> Result<Option<AgentRecord>, RepositoryError>;

    /// Oldest agent of `account_id` carrying `flag`.
    async fn find_with_flag(
        &self,
        account_id: &AccountId,
        flag: &str,
    ) -> Result<Option<AgentRecord>, RepositoryError>;

    async fn account_ids_with_flag(&self, flag: &str) -> Result<Vec<AccountId>, RepositoryError>;
    async fn count_with_flag(&self, flag: &str) -> Result<u64, RepositoryError>;
    async fn create(&self, agent: NewAgent) -> Result<AgentRecord, RepositoryError>;

    /// Returns whether a row was removed.
    async fn delete(&self, id: &AgentId) -> Result<bool, RepositoryError>;
}

/// Version storage plus the versioning collaborator used when agents are created.
#[async_trait]
pub trait VersionRepository: Send + Sync {
    async fn find_by_id(&self, id: &VersionId) -> Result<Option<VersionRecord>, RepositoryError>;
    async fn list_for_agent(&self, agent_id: &AgentId)
        -> Result<Vec<VersionRecord>, RepositoryError>;

    /// Persists a new version and makes it the agent's current one.
    async fn create_version(&self, version: NewVersion) -> Result<VersionId, RepositoryError>;
}

#[async_trait]
pub trait TriggerRepository: Send + Sync {
    async fn list_for_agent(&self, agent_id: &AgentId)
        -> Result<Vec<TriggerRecord>, RepositoryError>;
    async fn save(&self, trigger: TriggerRecord) -> Result<(), RepositoryError>;
    async fn delete(&self, id: &TriggerId) -> Result<bool, RepositoryError>;
}

/// The four repositories an installer or runtime needs, behind trait objects.
#[derive(Clone)]
pub struct AgentStores {
    pub accounts: Arc<dyn AccountRepository>,
    pub agents: Arc<dyn AgentRepository>,
    pub versions: Arc<dyn VersionRepository>,
    pub triggers: Arc<dyn TriggerRepository>,
}

impl AgentStores {
    pub fn sql(pool: DbPool) -> Self {
        Self {
            accounts: Arc::new(SqlAccountRepository::new(pool.clone())),
            agents: Arc::new(SqlAgentRepository::new(pool.clone())),
            versions: Arc::new(SqlVersionRepository::new(pool.clone())),
            triggers: Arc::new(SqlTriggerRepository::new(pool)),
        }
    }

    pub fn in_memory(store: Arc<InMemoryAgentStore>) -> Self {
        Self {
            accounts: store.clone(),
            agents: store.clone(),
            versions: store.clone(),
            triggers: store,
        }
    }
}

/// Nested config stored on a new version. Managed instances carry their metadata along.
pub(crate) fn version_config_for(version: &NewVersion, agent_metadata: &Value) -> VersionConfig {
    let managed_agent_metadata = agent_metadata
        .as_object()
        .filter(|metadata| metadata.get(CENTRALLY_MANAGED_KEY).is_some_and(is_truthy))
        .cloned();

    build_unified_config(UnifiedConfigParts {
        system_prompt: version.system_prompt.clone(),
        model: version.model.clone(),
        tool_flags: version.tool_flags.clone(),
        configured_mcps: version.configured_mcps.clone(),
        custom_mcps: version.custom_mcps.clone(),
        workflows: Vec::new(),
        triggers: Vec::new(),
        managed_agent_metadata,
    })
}

pub(crate) fn carries_flag(metadata: &Value, flag: &str) -> bool {
    metadata.get(flag).is_some_and(is_truthy)
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use serde_json::json;

    use loadout_core::domain::agent::{AccountId, AgentId, NewVersion};
    use loadout_core::domain::tool_flags::StoredToolFlag;

    use super::{carries_flag, version_config_for};

    fn new_version() -> NewVersion {
        let mut tool_flags = BTreeMap::new();
        tool_flags.insert("web_search_tool".to_string(), StoredToolFlag::Flag(true));
        tool_flags.insert(
            "sheets_tool".to_string(),
            StoredToolFlag::Detailed { enabled: false, description: Some("Sheets".to_string()) },
        );
        NewVersion {
            agent_id: AgentId("agent-1".to_string()),
            user_id: AccountId("acct-1".to_string()),
            system_prompt: "Be brief.".to_string(),
            configured_mcps: vec![json!({"name": "search"})],
            custom_mcps: Vec::new(),
            tool_flags,
            model: Some("gpt-5".to_string()),
            version_name: "v1".to_string(),
            change_description: "first".to_string(),
        }
    }

    #[test]
    fn version_config_embeds_metadata_only_for_managed_instances() {
        let managed = version_config_for(
            &new_version(),
            &json!({"centrally_managed": true, "is_loadout_default": true}),
        );
        let custom = version_config_for(&new_version(), &json!({"team": "ops"}));

        assert_eq!(
            managed.managed_agent_metadata.and_then(|metadata| metadata.get("is_loadout_default").cloned()),
            Some(json!(true))
        );
        assert!(custom.managed_agent_metadata.is_none());
        assert_eq!(custom.tools.agentpress.get("sheets_tool"), Some(&false));
        assert_eq!(custom.tools.mcp, vec![json!({"name": "search"})]);
    }

    #[test]
    fn flags_use_loose_truthiness() {
        assert!(carries_flag(&json!({"flag": 1}), "flag"));
        assert!(!carries_flag(&json!({"flag": ""}), "flag"));
        assert!(!carries_flag(&json!(["flag"]), "flag"));
    }
}
