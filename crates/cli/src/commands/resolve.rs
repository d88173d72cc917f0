use std::sync::Arc;

use serde_json::json;

use loadout_agent::runtime::AgentRuntime;
use loadout_agent::tools::AgentConfigTool;
use loadout_core::config::{AppConfig, LoadOptions};
use loadout_core::domain::agent::AgentId;
use loadout_db::repositories::AgentStores;

use crate::commands::{
    async_runtime, load_config, open_database, to_data, CommandFailure, CommandResult,
    EXIT_CONFIG,
};

pub fn run(options: &LoadOptions, agent_id: &str) -> CommandResult {
    match execute(options, AgentId(agent_id.to_string())) {
        Ok((message, data)) => CommandResult::success_with_data("resolve", message, Some(data)),
        Err(failure) => failure.into_result("resolve"),
    }
}

fn execute(
    options: &LoadOptions,
    agent_id: AgentId,
) -> Result<(String, serde_json::Value), CommandFailure> {
    let config = load_config(options)?;
    let runtime = async_runtime()?;

    runtime.block_on(async {
        let pool = open_database(&config).await?;
        let agent_runtime = agent_runtime(&config, AgentStores::sql(pool.clone()))?;
        let plan = agent_runtime.prepare_run(&agent_id).await;
        pool.close().await;

        let plan = plan.map_err(|error| CommandFailure::from_application("resolve", error))?;
        let tools: Vec<&str> =
            plan.tool_schemas.iter().map(|schema| schema.function_name.as_str()).collect();
        let message = format!(
            "{} resolves to model {} with {} tools",
            plan.config.agent_id,
            plan.model_id,
            tools.len()
        );
        let data = json!({
            "config": to_data(&plan.config)?,
            "model_id": plan.model_id,
            "call_params": plan.call_params,
            "tools": tools,
        });
        Ok::<_, CommandFailure>((message, data))
    })
}

/// Runtime context with the built-in capabilities registered.
pub(crate) fn agent_runtime(
    config: &AppConfig,
    stores: AgentStores,
) -> Result<AgentRuntime, CommandFailure> {
    AgentRuntime::from_config(config, stores, |registry, parts| {
        registry.register(
            Arc::new(AgentConfigTool::new(
                parts.stores.clone(),
                parts.resolver.clone(),
                parts.selector.clone(),
            )),
            None,
        );
    })
    .map_err(|error| CommandFailure::new("model_catalog", error.to_string(), EXIT_CONFIG))
}
