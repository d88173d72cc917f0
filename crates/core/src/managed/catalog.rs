use std::sync::Arc;

use serde_json::{json, Value};

use crate::config::AgentsConfig;
use crate::domain::agent::AgentIcon;
use crate::domain::tool_flags::baseline_tool_flags;
use crate::managed::definition::{ManagedAgentDefinition, PromptSource, Restrictions};

pub const FLAGSHIP_KEY: &str = "loadout_default";
pub const FLAGSHIP_FLAG: &str = "is_loadout_default";
pub const BRIDGE_KEY: &str = "code_bridge";
pub const BRIDGE_FLAG: &str = "is_code_bridge_default";

const FLAGSHIP_PROMPT: &str = "You are Loadout, an autonomous assistant. Plan before acting, \
use the tools you have been given when they help, and report clearly what you did and what \
remains open.";

const BRIDGE_PREAMBLE: &str = "You are the official command-line coding bridge agent. Follow \
the repository guide below exactly; it is mirrored from the project's guide file.\n\n";

const BRIDGE_FALLBACK: &str = "The repository guide file was not found. Check the project \
layout so the guide is present before relying on this agent.";

/// Whether an agent instance is one of the managed definitions.
#[derive(Clone, Debug, PartialEq)]
pub enum AgentKind {
    Managed(Arc<ManagedAgentDefinition>),
    Custom,
}

impl AgentKind {
    pub fn is_managed(&self) -> bool {
        matches!(self, Self::Managed(_))
    }
}

/// The closed set of managed-agent definitions known to the process.
#[derive(Clone, Debug, Default)]
pub struct ManagedAgentCatalog {
    definitions: Vec<Arc<ManagedAgentDefinition>>,
}

impl ManagedAgentCatalog {
    pub fn new(definitions: Vec<ManagedAgentDefinition>) -> Self {
        Self { definitions: definitions.into_iter().map(Arc::new).collect() }
    }

    pub fn builtin(config: &AgentsConfig) -> Self {
        Self::new(vec![flagship_definition(config), bridge_definition(config)])
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<ManagedAgentDefinition>> {
        self.definitions.iter()
    }

    pub fn by_key(&self, key: &str) -> Option<Arc<ManagedAgentDefinition>> {
        self.definitions.iter().find(|definition| definition.key() == key).cloned()
    }

    /// First definition whose flag is truthy in `metadata`. Non-object metadata matches
    /// nothing.
    pub fn by_metadata(&self, metadata: &Value) -> Option<Arc<ManagedAgentDefinition>> {
        let entries = metadata.as_object()?;
        self.definitions.iter().find(|definition| definition.marks(entries)).cloned()
    }

    pub fn classify(&self, metadata: &Value) -> AgentKind {
        self.by_metadata(metadata).map_or(AgentKind::Custom, AgentKind::Managed)
    }

    /// Restrictions of the matching definition, or none for custom agents.
    pub fn default_restrictions(&self, metadata: &Value) -> Restrictions {
        self.by_metadata(metadata)
            .map(|definition| definition.restrictions().clone())
            .unwrap_or_default()
    }

    pub fn keys(&self) -> Vec<&str> {
        self.definitions.iter().map(|definition| definition.key()).collect()
    }
}

pub fn flagship_definition(config: &AgentsConfig) -> ManagedAgentDefinition {
    ManagedAgentDefinition::builder(FLAGSHIP_KEY, FLAGSHIP_FLAG, "Loadout")
        .description("Loadout is your AI assistant with centrally managed instructions.")
        .model(config.flagship_model.clone())
        .prompt(PromptSource::Inline(FLAGSHIP_PROMPT.to_string()))
        .tool_flags(baseline_tool_flags())
        .icon(AgentIcon::new("sun", "#F59E0B", "#FFF3CD"))
        .restrictions(Restrictions::locked_identity())
        .change_description("Initial Loadout agent installation")
        .default_for_new_accounts(true)
        .build()
}

pub fn bridge_definition(config: &AgentsConfig) -> ManagedAgentDefinition {
    let guide_name = config
        .guide_path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| config.guide_path.display().to_string());

    ManagedAgentDefinition::builder(BRIDGE_KEY, BRIDGE_FLAG, "Code Bridge")
        .description(
            "Official agent for the command-line coding bridge, with a protected prompt and the \
             default tool set.",
        )
        .model(config.bridge_model.clone())
        .prompt(PromptSource::File {
            path: config.guide_path.clone(),
            preamble: BRIDGE_PREAMBLE.to_string(),
            fallback: BRIDGE_FALLBACK.to_string(),
        })
        .tool_flags(baseline_tool_flags())
        .icon(AgentIcon::new("code-xml", "#4C1D95", "#EDE9FE"))
        .restrictions(Restrictions::locked_identity())
        .change_description("Initial Code Bridge agent installation")
        .extra_metadata("source_prompt", json!(guide_name))
        .extra_metadata("notes", json!("Centrally managed command-line coding bridge agent"))
        .build()
}
