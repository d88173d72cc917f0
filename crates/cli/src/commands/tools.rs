use std::sync::Arc;

use serde_json::json;

use loadout_core::config::LoadOptions;
use loadout_db::repositories::{AgentStores, InMemoryAgentStore};

use crate::commands::resolve::agent_runtime;
use crate::commands::{load_config, CommandFailure, CommandResult};

pub fn run(options: &LoadOptions, with_examples: bool) -> CommandResult {
    match execute(options, with_examples) {
        Ok((message, data)) => CommandResult::success_with_data("tools", message, Some(data)),
        Err(failure) => failure.into_result("tools"),
    }
}

fn execute(
    options: &LoadOptions,
    with_examples: bool,
) -> Result<(String, serde_json::Value), CommandFailure> {
    let config = load_config(options)?;
    // Listing never invokes a tool, so no database is needed.
    let runtime = agent_runtime(&config, AgentStores::in_memory(Arc::new(InMemoryAgentStore::default())))?;
    let registry = runtime.registry();

    let tools: Vec<_> = registry
        .iter()
        .map(|entry| {
            json!({
                "function_name": entry.schema.function_name,
                "provider": entry.provider.name(),
                "invocable": entry.schema.is_invocable(),
            })
        })
        .collect();

    let mut data = json!({ "tools": tools });
    if with_examples {
        data["examples"] = json!(registry.build_usage_examples());
    }

    Ok((format!("{} capabilities registered", registry.len()), data))
}
