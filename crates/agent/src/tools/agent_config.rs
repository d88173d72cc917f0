use std::sync::Arc;

use anyhow::{anyhow, Context};
use async_trait::async_trait;
use serde_json::{json, Value};

use loadout_core::domain::agent::AgentId;
use loadout_core::models::ModelSelector;
use loadout_core::resolver::ConfigResolver;
use loadout_db::repositories::AgentStores;

use super::{ToolProvider, ToolSchema};
use crate::runtime::load_unified_config;

pub const AGENT_CONFIG_TOOL: &str = "agent_config_tool";

/// Lets an agent inspect its own resolved configuration and the models it could run on.
pub struct AgentConfigTool {
    stores: AgentStores,
    resolver: Arc<ConfigResolver>,
    selector: Arc<ModelSelector>,
}

impl AgentConfigTool {
    pub fn new(
        stores: AgentStores,
        resolver: Arc<ConfigResolver>,
        selector: Arc<ModelSelector>,
    ) -> Self {
        Self { stores, resolver, selector }
    }
}

#[async_trait]
impl ToolProvider for AgentConfigTool {
    fn name(&self) -> &'static str {
        AGENT_CONFIG_TOOL
    }

    fn schemas(&self) -> Vec<ToolSchema> {
        vec![
            ToolSchema::invocable(
                "get_current_agent_config",
                json!({
                    "type": "function",
                    "function": {
                        "name": "get_current_agent_config",
                        "description": "Return the resolved configuration of an agent, including its prompt, model and enabled tools.",
                        "parameters": {
                            "type": "object",
                            "properties": {
                                "agent_id": {"type": "string", "description": "Agent to inspect."}
                            },
                            "required": ["agent_id"]
                        }
                    }
                }),
            ),
            ToolSchema::invocable(
                "list_available_models",
                json!({
                    "type": "function",
                    "function": {
                        "name": "list_available_models",
                        "description": "List catalog models with their capabilities, limits and pricing.",
                        "parameters": {
                            "type": "object",
                            "properties": {
                                "include_disabled": {"type": "boolean", "default": false}
                            }
                        }
                    }
                }),
            ),
            ToolSchema::documentation(
                "agent_config_overview",
                json!({
                    "text": "Managed agents cannot change fields their restrictions lock; \
                             inspect `restrictions` before proposing edits."
                }),
            ),
        ]
    }

    async fn invoke(&self, function_name: &str, arguments: Value) -> anyhow::Result<Value> {
        match function_name {
            "get_current_agent_config" => {
                let agent_id = arguments
                    .get("agent_id")
                    .and_then(Value::as_str)
                    .filter(|id| !id.is_empty())
                    .ok_or_else(|| anyhow!("`agent_id` is required"))?;
                let config =
                    load_unified_config(&self.stores, &self.resolver, &AgentId(agent_id.to_string()))
                        .await?;
                serde_json::to_value(config).context("serialize agent config")
            }
            "list_available_models" => {
                let include_disabled =
                    arguments.get("include_disabled").and_then(Value::as_bool).unwrap_or(false);
                serde_json::to_value(self.selector.list_models(include_disabled))
                    .context("serialize model list")
            }
            other => Err(anyhow!("unknown function `{other}` for {AGENT_CONFIG_TOOL}")),
        }
    }
}
