use std::sync::Arc;

use serde_json::json;

use loadout_agent::installer::ManagedAgentInstaller;
use loadout_core::config::{AppConfig, LoadOptions};
use loadout_core::domain::agent::AccountId;
use loadout_core::managed::{ManagedAgentCatalog, ManagedAgentDefinition};
use loadout_db::repositories::AgentStores;

use crate::commands::{
    async_runtime, load_config, open_database, to_data, CommandFailure, CommandResult,
    EXIT_NOT_FOUND,
};

pub fn install_all(options: &LoadOptions, agent_key: &str) -> CommandResult {
    let command = "install-all";
    let result = with_installer(options, agent_key, |installer| async move {
        let summary = installer
            .install_for_all_users()
            .await
            .map_err(|error| CommandFailure::from_application(command, error))?;
        let message = format!(
            "{}: installed {}, failed {} of {} missing",
            installer.definition().key(),
            summary.installed_count(),
            summary.failed_count(),
            summary.total_missing
        );
        Ok::<_, CommandFailure>((message, to_data(&summary)?))
    });
    render(command, result)
}

pub fn install_user(
    options: &LoadOptions,
    agent_key: &str,
    account_id: &str,
    replace_existing: bool,
) -> CommandResult {
    let command = "install-user";
    let account_id = AccountId(account_id.to_string());
    let result = with_installer(options, agent_key, |installer| async move {
        let agent_id = installer
            .ensure_for_user(&account_id, replace_existing)
            .await
            .map_err(|error| CommandFailure::from_application(command, error))?;
        let message = format!("{} ready for {account_id}", installer.definition().key());
        Ok::<_, CommandFailure>((message, json!({ "account_id": account_id, "agent_id": agent_id })))
    });
    render(command, result)
}

pub fn stats(options: &LoadOptions, agent_key: &str) -> CommandResult {
    let command = "stats";
    let result = with_installer(options, agent_key, |installer| async move {
        let stats = installer
            .get_stats()
            .await
            .map_err(|error| CommandFailure::from_application(command, error))?;
        let message =
            format!("{}: {} installed instances", installer.definition().key(), stats.total_agents);
        Ok::<_, CommandFailure>((message, to_data(&stats)?))
    });
    render(command, result)
}

pub(crate) fn find_definition(
    config: &AppConfig,
    agent_key: &str,
) -> Result<Arc<ManagedAgentDefinition>, CommandFailure> {
    let catalog = ManagedAgentCatalog::builtin(&config.agents);
    catalog.by_key(agent_key).ok_or_else(|| {
        CommandFailure::new(
            "unknown_agent",
            format!(
                "no managed agent with key `{agent_key}` (known: {})",
                catalog.keys().join(", ")
            ),
            EXIT_NOT_FOUND,
        )
    })
}

fn with_installer<F, Fut>(
    options: &LoadOptions,
    agent_key: &str,
    operation: F,
) -> Result<(String, serde_json::Value), CommandFailure>
where
    F: FnOnce(Arc<ManagedAgentInstaller>) -> Fut,
    Fut: std::future::Future<Output = Result<(String, serde_json::Value), CommandFailure>>,
{
    let config = load_config(options)?;
    let definition = find_definition(&config, agent_key)?;
    let runtime = async_runtime()?;

    runtime.block_on(async {
        let pool = open_database(&config).await?;
        let installer =
            Arc::new(ManagedAgentInstaller::new(definition, AgentStores::sql(pool.clone())));
        let outcome = operation(installer).await;
        pool.close().await;
        outcome
    })
}

fn render(
    command: &str,
    result: Result<(String, serde_json::Value), CommandFailure>,
) -> CommandResult {
    match result {
        Ok((message, data)) => CommandResult::success_with_data(command, message, Some(data)),
        Err(failure) => failure.into_result(command),
    }
}
