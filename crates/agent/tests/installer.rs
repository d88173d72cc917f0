use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use serde_json::json;

use loadout_agent::installer::{InstallError, ManagedAgentInstaller, ALL_INSTALLED_DETAIL};
use loadout_core::config::AppConfig;
use loadout_core::domain::agent::{
    AccountId, AccountRecord, AgentId, AgentRecord, NewAgent, TriggerId, TriggerRecord,
};
use loadout_core::managed::catalog::{FLAGSHIP_FLAG, FLAGSHIP_KEY};
use loadout_core::managed::{ManagedAgentCatalog, ManagedAgentDefinition};
use loadout_db::repositories::{
    AccountRepository, AgentRepository, AgentStores, InMemoryAgentStore, RepositoryError,
    TriggerRepository, VersionRepository,
};

fn flagship() -> Arc<ManagedAgentDefinition> {
    ManagedAgentCatalog::builtin(&AppConfig::default().agents)
        .by_key(FLAGSHIP_KEY)
        .expect("flagship definition")
}

async fn store_with_accounts(accounts: &[(&str, bool)]) -> Arc<InMemoryAgentStore> {
    let store = Arc::new(InMemoryAgentStore::default());
    let start = Utc::now();
    for (offset, (id, personal)) in accounts.iter().enumerate() {
        AccountRepository::save(
            store.as_ref(),
            AccountRecord {
                id: AccountId((*id).to_string()),
                name: format!("Account {id}"),
                personal_account: *personal,
                created_at: start + Duration::seconds(offset as i64),
            },
        )
        .await
        .expect("save account");
    }
    store
}

fn account(id: &str) -> AccountId {
    AccountId(id.to_string())
}

#[tokio::test]
async fn ensure_for_user_is_idempotent() {
    let store = store_with_accounts(&[("acct-1", true)]).await;
    let installer = ManagedAgentInstaller::new(flagship(), AgentStores::in_memory(store.clone()));

    let first = installer.ensure_for_user(&account("acct-1"), false).await.expect("first install");
    let second = installer.ensure_for_user(&account("acct-1"), false).await.expect("second install");

    assert_eq!(first, second);
    assert_eq!(installer.get_stats().await.expect("stats").total_agents, 1);

    let agent = AgentRepository::find_by_id(store.as_ref(), &first)
        .await
        .expect("find agent")
        .expect("agent exists");
    assert_eq!(agent.metadata[FLAGSHIP_FLAG], json!(true));
    assert_eq!(agent.metadata["managed_agent_key"], json!(FLAGSHIP_KEY));
    assert!(agent.is_default);

    let versions = VersionRepository::list_for_agent(store.as_ref(), &first).await.expect("versions");
    assert_eq!(versions.len(), 1);
    assert_eq!(versions[0].version_name, "v1");
    assert_eq!(agent.current_version_id, Some(versions[0].id.clone()));
}

#[tokio::test]
async fn replace_existing_creates_a_new_instance_and_cleans_triggers() {
    let store = store_with_accounts(&[("acct-1", true)]).await;
    let installer = ManagedAgentInstaller::new(flagship(), AgentStores::in_memory(store.clone()));
    let original = installer.ensure_for_user(&account("acct-1"), false).await.expect("install");
    TriggerRepository::save(
        store.as_ref(),
        TriggerRecord {
            id: TriggerId("daily".to_string()),
            agent_id: original.clone(),
            name: "Daily summary".to_string(),
            trigger_type: "schedule".to_string(),
            config: json!({"cron": "0 8 * * *"}),
            is_active: true,
            created_at: Utc::now(),
        },
    )
    .await
    .expect("save trigger");

    let replaced = installer.ensure_for_user(&account("acct-1"), true).await.expect("reinstall");

    assert_ne!(replaced, original);
    assert!(AgentRepository::find_by_id(store.as_ref(), &original).await.expect("find").is_none());
    assert!(TriggerRepository::list_for_agent(store.as_ref(), &original)
        .await
        .expect("list triggers")
        .is_empty());
    assert_eq!(installer.get_stats().await.expect("stats").total_agents, 1);
}

#[tokio::test]
async fn unknown_accounts_are_rejected() {
    let store = store_with_accounts(&[]).await;
    let installer = ManagedAgentInstaller::new(flagship(), AgentStores::in_memory(store));

    let result = installer.ensure_for_user(&account("ghost"), false).await;

    assert!(matches!(result, Err(InstallError::AccountNotFound(ref id)) if id.0 == "ghost"));
}

#[tokio::test]
async fn install_for_all_users_fills_only_missing_personal_accounts() {
    let store =
        store_with_accounts(&[("acct-1", true), ("acct-2", true), ("acct-3", true), ("team", false)])
            .await;
    let installer = ManagedAgentInstaller::new(flagship(), AgentStores::in_memory(store));
    installer.ensure_for_user(&account("acct-2"), false).await.expect("pre-install");

    let summary = installer.install_for_all_users().await.expect("bulk install");

    assert_eq!(summary.total_missing, 2);
    assert_eq!(summary.installed, vec![account("acct-1"), account("acct-3")]);
    assert!(summary.failed.is_empty());
    assert_eq!(summary.details, vec!["Installed for acct-1", "Installed for acct-3"]);
    assert_eq!(installer.get_stats().await.expect("stats").total_agents, 3);

    let rerun = installer.install_for_all_users().await.expect("second bulk install");
    assert_eq!(rerun.total_missing, 0);
    assert_eq!(rerun.installed_count(), 0);
    assert_eq!(rerun.details, vec![ALL_INSTALLED_DETAIL.to_string()]);
}

/// Delegates to the in-memory store but refuses to create agents for one account.
struct FailingAgents {
    inner: Arc<InMemoryAgentStore>,
    failing: AccountId,
}

#[async_trait]
impl AgentRepository for FailingAgents {
    async fn find_by_id(&self, id: &AgentId) -> Result<Option<AgentRecord>, RepositoryError> {
        AgentRepository::find_by_id(self.inner.as_ref(), id).await
    }

    async fn find_with_flag(
        &self,
        account_id: &AccountId,
        flag: &str,
    ) -> Result<Option<AgentRecord>, RepositoryError> {
        self.inner.find_with_flag(account_id, flag).await
    }

    async fn account_ids_with_flag(&self, flag: &str) -> Result<Vec<AccountId>, RepositoryError> {
        self.inner.account_ids_with_flag(flag).await
    }

    async fn count_with_flag(&self, flag: &str) -> Result<u64, RepositoryError> {
        self.inner.count_with_flag(flag).await
    }

    async fn create(&self, agent: NewAgent) -> Result<AgentRecord, RepositoryError> {
        if agent.account_id == self.failing {
            return Err(RepositoryError::Decode("simulated write failure".to_string()));
        }
        self.inner.create(agent).await
    }

    async fn delete(&self, id: &AgentId) -> Result<bool, RepositoryError> {
        AgentRepository::delete(self.inner.as_ref(), id).await
    }
}

#[tokio::test]
async fn one_failing_account_does_not_stop_the_rest() {
    let store = store_with_accounts(&[("acct-1", true), ("acct-bad", true), ("acct-3", true)]).await;
    let mut stores = AgentStores::in_memory(store.clone());
    stores.agents = Arc::new(FailingAgents { inner: store, failing: account("acct-bad") });
    let installer = ManagedAgentInstaller::new(flagship(), stores);

    let summary = installer.install_for_all_users().await.expect("bulk install never raises");

    assert_eq!(summary.total_missing, 3);
    assert_eq!(summary.installed, vec![account("acct-1"), account("acct-3")]);
    assert_eq!(summary.failed_count(), 1);
    assert_eq!(summary.failed[0].account_id, account("acct-bad"));
    assert!(summary.failed[0].reason.contains("simulated write failure"));
    assert!(summary
        .details
        .iter()
        .any(|detail| detail.starts_with("Failed to install for acct-bad:")));
}
