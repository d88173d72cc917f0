//! Builds the runtime view of an agent from its persisted row, its active version, and the
//! managed-agent definition it may belong to. Also builds the nested config document stored
//! on new versions.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::domain::agent::{AccountId, AgentId, AgentRecord, VersionId, VersionRecord};
use crate::domain::tool_flags::{
    baseline_tool_flags, normalize_for_run, settings_from_flags, simplify_for_storage,
    StoredToolFlag, ToolSettings,
};
use crate::lenient::{is_truthy, kind_of, list_or_empty, object_or_empty, string_or_none};
use crate::managed::catalog::{AgentKind, ManagedAgentCatalog};
use crate::managed::definition::{
    ManagedAgentDefinition, Restrictions, CENTRALLY_MANAGED_KEY, RESTRICTIONS_KEY,
};

pub const FALLBACK_SYSTEM_PROMPT: &str = "You are a helpful AI assistant.";
pub const FALLBACK_AGENT_NAME: &str = "Unnamed Agent";
pub const INITIAL_VERSION_NAME: &str = "v1";

/// Fully resolved configuration handed to the execution engine. Built fresh on every call.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct UnifiedAgentConfig {
    pub agent_id: AgentId,
    pub name: String,
    pub description: Option<String>,
    pub system_prompt: String,
    /// `None` for custom agents without a configured model; callers apply their own default.
    pub model: Option<String>,
    pub agentpress_tools: ToolSettings,
    pub configured_mcps: Vec<Value>,
    pub custom_mcps: Vec<Value>,
    pub workflows: Vec<Value>,
    pub triggers: Vec<Value>,
    pub icon_name: Option<String>,
    pub icon_color: Option<String>,
    pub icon_background: Option<String>,
    pub is_default: bool,
    pub centrally_managed: bool,
    pub managed_agent_key: Option<String>,
    pub restrictions: Restrictions,
    pub version_name: String,
    pub account_id: AccountId,
    pub current_version_id: Option<VersionId>,
}

impl UnifiedAgentConfig {
    pub fn enabled_tools(&self) -> impl Iterator<Item = &str> {
        self.agentpress_tools
            .iter()
            .filter(|(_, setting)| setting.enabled)
            .map(|(name, _)| name.as_str())
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct VersionTools {
    pub agentpress: BTreeMap<String, bool>,
    pub mcp: Vec<Value>,
    pub custom_mcp: Vec<Value>,
}

/// Nested `config` document persisted on a version.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct VersionConfig {
    pub system_prompt: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    pub tools: VersionTools,
    pub workflows: Vec<Value>,
    pub triggers: Vec<Value>,
    pub metadata: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub managed_agent_metadata: Option<Map<String, Value>>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct UnifiedConfigParts {
    pub system_prompt: String,
    pub model: Option<String>,
    pub tool_flags: BTreeMap<String, StoredToolFlag>,
    pub configured_mcps: Vec<Value>,
    pub custom_mcps: Vec<Value>,
    pub workflows: Vec<Value>,
    pub triggers: Vec<Value>,
    pub managed_agent_metadata: Option<Map<String, Value>>,
}

/// Collapses tool flags to booleans and nests the tool-server lists under `tools`.
pub fn build_unified_config(parts: UnifiedConfigParts) -> VersionConfig {
    VersionConfig {
        system_prompt: parts.system_prompt,
        model: parts.model,
        tools: VersionTools {
            agentpress: simplify_for_storage(&parts.tool_flags),
            mcp: parts.configured_mcps,
            custom_mcp: parts.custom_mcps,
        },
        workflows: parts.workflows,
        triggers: parts.triggers,
        metadata: Map::new(),
        managed_agent_metadata: parts.managed_agent_metadata.filter(|metadata| !metadata.is_empty()),
    }
}

/// Version contents read in either the nested or the flat legacy shape.
#[derive(Debug, Default)]
struct VersionSnapshot {
    system_prompt: Option<String>,
    model: Option<String>,
    tool_flags: Value,
    configured_mcps: Vec<Value>,
    custom_mcps: Vec<Value>,
    workflows: Vec<Value>,
    triggers: Vec<Value>,
}

impl VersionSnapshot {
    fn read(version: &VersionRecord) -> Self {
        match &version.config {
            Some(Value::Object(config)) if !config.is_empty() => Self::from_nested(config),
            Some(Value::Object(_)) | Some(Value::Null) | None => Self::from_legacy(version),
            Some(other) => {
                warn!(
                    event_name = "core.resolver.malformed_version_config",
                    version_id = %version.id,
                    found = kind_of(other),
                    "version config is not an object, reading legacy fields"
                );
                Self::from_legacy(version)
            }
        }
    }

    fn from_nested(config: &Map<String, Value>) -> Self {
        let tools = object_or_empty("tools", config.get("tools"));
        Self {
            system_prompt: string_or_none("system_prompt", config.get("system_prompt")),
            model: string_or_none("model", config.get("model")),
            tool_flags: tools.get("agentpress").cloned().unwrap_or(Value::Null),
            configured_mcps: list_or_empty("tools.mcp", tools.get("mcp")),
            custom_mcps: list_or_empty("tools.custom_mcp", tools.get("custom_mcp")),
            workflows: list_or_empty("workflows", config.get("workflows")),
            triggers: list_or_empty("triggers", config.get("triggers")),
        }
    }

    fn from_legacy(version: &VersionRecord) -> Self {
        let legacy = &version.legacy;
        Self {
            system_prompt: legacy.system_prompt.clone(),
            model: legacy.model.clone(),
            tool_flags: legacy.tool_flags.clone(),
            configured_mcps: list_or_empty("configured_mcps", Some(&legacy.configured_mcps)),
            custom_mcps: list_or_empty("custom_mcps", Some(&legacy.custom_mcps)),
            workflows: Vec::new(),
            triggers: Vec::new(),
        }
    }
}

/// Resolves agents against the process-wide managed-agent catalog.
#[derive(Clone, Debug)]
pub struct ConfigResolver {
    managed: Arc<ManagedAgentCatalog>,
}

impl ConfigResolver {
    pub fn new(managed: Arc<ManagedAgentCatalog>) -> Self {
        Self { managed }
    }

    pub fn managed(&self) -> &ManagedAgentCatalog {
        &self.managed
    }

    /// Never fails: malformed stored data degrades to the documented fallbacks.
    pub fn resolve(&self, agent: &AgentRecord, version: Option<&VersionRecord>) -> UnifiedAgentConfig {
        match self.managed.classify(&agent.metadata) {
            AgentKind::Managed(definition) => resolve_managed(agent, version, &definition),
            AgentKind::Custom => match version {
                Some(version) => resolve_custom(agent, version),
                None => resolve_custom_fallback(agent),
            },
        }
    }
}

fn metadata_of(agent: &AgentRecord) -> Map<String, Value> {
    object_or_empty("metadata", Some(&agent.metadata))
}

fn instance_restrictions(metadata: &Map<String, Value>) -> Restrictions {
    metadata.get(RESTRICTIONS_KEY).map(Restrictions::from_value).unwrap_or_default()
}

fn flagged_managed(metadata: &Map<String, Value>) -> bool {
    metadata.get(CENTRALLY_MANAGED_KEY).is_some_and(is_truthy)
}

fn resolve_managed(
    agent: &AgentRecord,
    version: Option<&VersionRecord>,
    definition: &ManagedAgentDefinition,
) -> UnifiedAgentConfig {
    debug!(
        event_name = "core.resolver.managed",
        agent_id = %agent.id,
        managed_agent_key = definition.key(),
        "resolving centrally managed agent from live definition"
    );

    let metadata = metadata_of(agent);
    let restrictions = definition.restrictions().merged_with(&instance_restrictions(&metadata));
    let icon = agent.icon.or_defaults(definition.icon());
    let snapshot = version.map(VersionSnapshot::read).unwrap_or_default();

    UnifiedAgentConfig {
        agent_id: agent.id.clone(),
        name: definition.name().to_string(),
        description: Some(definition.description().to_string()),
        system_prompt: definition.system_prompt(),
        model: Some(definition.model()),
        agentpress_tools: settings_from_flags(definition.tool_flags()),
        configured_mcps: snapshot.configured_mcps,
        custom_mcps: snapshot.custom_mcps,
        workflows: snapshot.workflows,
        triggers: snapshot.triggers,
        icon_name: icon.name,
        icon_color: icon.color,
        icon_background: icon.background,
        is_default: agent.is_default || definition.is_default_for_new_accounts(),
        centrally_managed: true,
        managed_agent_key: Some(definition.key().to_string()),
        restrictions,
        version_name: version_name(version),
        account_id: agent.account_id.clone(),
        current_version_id: agent.current_version_id.clone(),
    }
}

fn resolve_custom(agent: &AgentRecord, version: &VersionRecord) -> UnifiedAgentConfig {
    debug!(
        event_name = "core.resolver.custom",
        agent_id = %agent.id,
        version_name = %version.version_name,
        "resolving custom agent from version snapshot"
    );

    let metadata = metadata_of(agent);
    let snapshot = VersionSnapshot::read(version);

    UnifiedAgentConfig {
        agent_id: agent.id.clone(),
        name: agent.name.clone(),
        description: agent.description.clone(),
        system_prompt: snapshot.system_prompt.unwrap_or_default(),
        model: snapshot.model,
        agentpress_tools: normalize_for_run(&snapshot.tool_flags),
        configured_mcps: snapshot.configured_mcps,
        custom_mcps: snapshot.custom_mcps,
        workflows: snapshot.workflows,
        triggers: snapshot.triggers,
        icon_name: agent.icon.name.clone(),
        icon_color: agent.icon.color.clone(),
        icon_background: agent.icon.background.clone(),
        is_default: agent.is_default,
        centrally_managed: flagged_managed(&metadata),
        managed_agent_key: None,
        restrictions: instance_restrictions(&metadata),
        version_name: version_name(Some(version)),
        account_id: agent.account_id.clone(),
        current_version_id: agent.current_version_id.clone(),
    }
}

fn resolve_custom_fallback(agent: &AgentRecord) -> UnifiedAgentConfig {
    warn!(
        event_name = "core.resolver.missing_version",
        agent_id = %agent.id,
        current_version_id = ?agent.current_version_id,
        "no version data for custom agent, using default configuration"
    );

    let metadata = metadata_of(agent);
    let name =
        if agent.name.trim().is_empty() { FALLBACK_AGENT_NAME.to_string() } else { agent.name.clone() };

    UnifiedAgentConfig {
        agent_id: agent.id.clone(),
        name,
        description: Some(agent.description.clone().unwrap_or_default()),
        system_prompt: FALLBACK_SYSTEM_PROMPT.to_string(),
        model: None,
        agentpress_tools: settings_from_flags(baseline_tool_flags()),
        configured_mcps: Vec::new(),
        custom_mcps: Vec::new(),
        workflows: Vec::new(),
        triggers: Vec::new(),
        icon_name: agent.icon.name.clone(),
        icon_color: agent.icon.color.clone(),
        icon_background: agent.icon.background.clone(),
        is_default: agent.is_default,
        centrally_managed: flagged_managed(&metadata),
        managed_agent_key: None,
        restrictions: instance_restrictions(&metadata),
        version_name: INITIAL_VERSION_NAME.to_string(),
        account_id: agent.account_id.clone(),
        current_version_id: agent.current_version_id.clone(),
    }
}

fn version_name(version: Option<&VersionRecord>) -> String {
    version
        .map(|version| version.version_name.trim())
        .filter(|name| !name.is_empty())
        .unwrap_or(INITIAL_VERSION_NAME)
        .to_string()
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::fs;
    use std::sync::Arc;

    use chrono::Utc;
    use serde_json::{json, Value};
    use tempfile::TempDir;

    use super::{
        build_unified_config, ConfigResolver, UnifiedConfigParts, FALLBACK_SYSTEM_PROMPT,
    };
    use crate::config::AppConfig;
    use crate::domain::agent::{
        AccountId, AgentIcon, AgentId, AgentRecord, LegacyVersionFields, VersionId, VersionRecord,
    };
    use crate::domain::tool_flags::{normalize_for_run, StoredToolFlag, ToolSetting};
    use crate::managed::catalog::{ManagedAgentCatalog, BRIDGE_FLAG, FLAGSHIP_FLAG};

    fn agent(metadata: Value) -> AgentRecord {
        AgentRecord {
            id: AgentId("agent-1".to_string()),
            account_id: AccountId("acct-1".to_string()),
            name: "Research helper".to_string(),
            description: Some("Finds things".to_string()),
            icon: AgentIcon::default(),
            system_prompt: Some("stale prompt stored on the row".to_string()),
            configured_mcps: json!([{"name": "row-level"}]),
            custom_mcps: json!([]),
            tool_flags: json!({"shell_tool": false}),
            metadata,
            is_default: false,
            current_version_id: Some(VersionId("ver-1".to_string())),
            version_count: 1,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn version(config: Option<Value>, legacy: LegacyVersionFields) -> VersionRecord {
        VersionRecord {
            id: VersionId("ver-1".to_string()),
            agent_id: AgentId("agent-1".to_string()),
            version_number: 2,
            version_name: "v2".to_string(),
            config,
            legacy,
            change_description: None,
            created_by: AccountId("acct-1".to_string()),
            created_at: Utc::now(),
        }
    }

    fn resolver_with_guide(guide: &std::path::Path) -> ConfigResolver {
        let mut agents = AppConfig::default().agents;
        agents.guide_path = guide.to_path_buf();
        ConfigResolver::new(Arc::new(ManagedAgentCatalog::builtin(&agents)))
    }

    fn resolver() -> ConfigResolver {
        resolver_with_guide(std::path::Path::new("does-not-exist/GUIDE.md"))
    }

    #[test]
    fn managed_agent_reflects_definition_changes_made_after_install() {
        let dir = TempDir::new().expect("tempdir");
        let guide = dir.path().join("GUIDE.md");
        fs::write(&guide, "original guide").expect("write guide");
        let resolver = resolver_with_guide(&guide);
        let installed = agent(json!({ BRIDGE_FLAG: true, "centrally_managed": true }));

        let before = resolver.resolve(&installed, None);
        fs::write(&guide, "edited guide").expect("edit guide");
        let after = resolver.resolve(&installed, None);

        assert!(before.system_prompt.ends_with("original guide"));
        assert!(after.system_prompt.ends_with("edited guide"));
        assert_eq!(after.name, "Code Bridge");
        assert_eq!(after.model.as_deref(), Some("claude-sonnet-4-5"));
        assert!(after.agentpress_tools["shell_tool"].enabled);
        assert!(after.configured_mcps.is_empty());
        assert!(after.workflows.is_empty());
        assert_eq!(after.version_name, "v1");
        assert_eq!(after.icon_name.as_deref(), Some("code-xml"));
        assert!(after.centrally_managed);
        assert_eq!(after.managed_agent_key.as_deref(), Some("code_bridge"));
    }

    #[test]
    fn managed_restrictions_merge_instance_overrides() {
        let installed = agent(json!({
            FLAGSHIP_FLAG: true,
            "restrictions": {"name_editable": true, "mcps_editable": false}
        }));

        let config = resolver().resolve(&installed, None);

        assert!(config.restrictions.is_editable("name_editable"));
        assert!(!config.restrictions.is_editable("mcps_editable"));
        assert!(!config.restrictions.is_editable("system_prompt_editable"));
        assert!(config.is_default);
    }

    #[test]
    fn managed_agent_takes_lists_from_version_snapshot() {
        let installed = agent(json!({ FLAGSHIP_FLAG: true }));
        let snapshot = version(
            Some(json!({
                "system_prompt": "user edited prompt",
                "tools": {"agentpress": {"shell_tool": false}, "mcp": [{"name": "github"}], "custom_mcp": []},
                "workflows": [{"id": "wf-1"}],
                "triggers": [{"id": "tr-1"}]
            })),
            LegacyVersionFields::default(),
        );

        let config = resolver().resolve(&installed, Some(&snapshot));

        assert_ne!(config.system_prompt, "user edited prompt");
        assert!(config.agentpress_tools["shell_tool"].enabled);
        assert_eq!(config.configured_mcps, vec![json!({"name": "github"})]);
        assert_eq!(config.workflows, vec![json!({"id": "wf-1"})]);
        assert_eq!(config.triggers, vec![json!({"id": "tr-1"})]);
        assert_eq!(config.version_name, "v2");
    }

    #[test]
    fn custom_agent_prefers_nested_config_over_legacy_fields() {
        let custom = agent(json!({"restrictions": {"tools_editable": false}}));
        let snapshot = version(
            Some(json!({
                "system_prompt": "nested prompt",
                "model": "gpt-5",
                "tools": {
                    "agentpress": {"browser_tool": true, "vision_tool": {"enabled": false, "description": "Look"}},
                    "mcp": [{"name": "linear"}],
                    "custom_mcp": [{"name": "internal"}]
                },
                "workflows": [],
                "triggers": [{"id": "nightly"}]
            })),
            LegacyVersionFields {
                system_prompt: Some("legacy prompt".to_string()),
                model: Some("legacy-model".to_string()),
                ..LegacyVersionFields::default()
            },
        );

        let config = resolver().resolve(&custom, Some(&snapshot));

        assert_eq!(config.system_prompt, "nested prompt");
        assert_eq!(config.model.as_deref(), Some("gpt-5"));
        assert_eq!(
            config.agentpress_tools["browser_tool"],
            ToolSetting { enabled: true, description: "browser_tool tool".to_string() }
        );
        assert_eq!(config.agentpress_tools["vision_tool"].description, "Look");
        assert_eq!(config.custom_mcps, vec![json!({"name": "internal"})]);
        assert_eq!(config.triggers.len(), 1);
        assert!(!config.restrictions.is_editable("tools_editable"));
        assert!(!config.centrally_managed);
        assert_eq!(config.name, "Research helper");
    }

    #[test]
    fn custom_agent_reads_legacy_fields_when_config_is_empty() {
        let custom = agent(json!({}));
        let snapshot = version(
            Some(json!({})),
            LegacyVersionFields {
                system_prompt: Some("legacy prompt".to_string()),
                model: Some("claude-haiku-4-5".to_string()),
                configured_mcps: json!([{"name": "slack"}]),
                custom_mcps: Value::Null,
                tool_flags: json!({"files_tool": true}),
            },
        );

        let config = resolver().resolve(&custom, Some(&snapshot));

        assert_eq!(config.system_prompt, "legacy prompt");
        assert_eq!(config.model.as_deref(), Some("claude-haiku-4-5"));
        assert_eq!(config.configured_mcps, vec![json!({"name": "slack"})]);
        assert!(config.custom_mcps.is_empty());
        assert!(config.workflows.is_empty());
        assert!(config.agentpress_tools["files_tool"].enabled);
    }

    #[test]
    fn custom_agent_without_version_falls_back_to_baseline() {
        let mut custom = agent(json!({"centrally_managed": false}));
        custom.name = "  ".to_string();
        custom.description = None;

        let config = resolver().resolve(&custom, None);

        assert_eq!(config.system_prompt, FALLBACK_SYSTEM_PROMPT);
        assert_eq!(config.model, None);
        assert_eq!(config.name, "Unnamed Agent");
        assert_eq!(config.description.as_deref(), Some(""));
        assert_eq!(config.agentpress_tools.len(), 20);
        assert!(config.agentpress_tools["shell_tool"].enabled);
        assert!(config.agentpress_tools["web_search_tool"].enabled);
        assert!(!config.agentpress_tools["sheets_tool"].enabled);
        assert!(!config.agentpress_tools["people_search_tool"].enabled);
        assert!(config.configured_mcps.is_empty());
        assert!(config.triggers.is_empty());
        assert_eq!(config.version_name, "v1");
    }

    #[test]
    fn centrally_managed_marker_uses_loose_truthiness() {
        let resolve = |marker: Value| {
            resolver().resolve(&agent(json!({ "centrally_managed": marker })), None).centrally_managed
        };

        assert!(resolve(json!(true)));
        assert!(resolve(json!(1)));
        assert!(resolve(json!("yes")));
        assert!(!resolve(json!(0)));
        assert!(!resolve(json!("")));
        assert!(!resolve(Value::Null));
    }

    #[test]
    fn malformed_version_data_degrades_without_failing() {
        let custom = agent(json!("metadata should be an object"));
        let snapshot = version(
            Some(json!({
                "system_prompt": 17,
                "model": ["gpt-5"],
                "tools": {"agentpress": "everything", "mcp": {"oops": true}},
                "workflows": "none",
                "triggers": null
            })),
            LegacyVersionFields::default(),
        );

        let config = resolver().resolve(&custom, Some(&snapshot));

        assert_eq!(config.system_prompt, "");
        assert_eq!(config.model, None);
        assert!(config.agentpress_tools.is_empty());
        assert!(config.configured_mcps.is_empty());
        assert!(config.workflows.is_empty());
        assert!(config.restrictions.is_empty());

        let odd = version(Some(json!("not a document")), LegacyVersionFields {
            system_prompt: Some("legacy".to_string()),
            ..LegacyVersionFields::default()
        });
        assert_eq!(resolver().resolve(&custom, Some(&odd)).system_prompt, "legacy");
    }

    #[test]
    fn built_config_round_trips_through_run_normalization() {
        let mut flags = BTreeMap::new();
        flags.insert("shell_tool".to_string(), StoredToolFlag::Flag(true));
        flags.insert(
            "browser_tool".to_string(),
            StoredToolFlag::Detailed { enabled: false, description: None },
        );

        let built = build_unified_config(UnifiedConfigParts {
            system_prompt: "prompt".to_string(),
            tool_flags: flags,
            configured_mcps: vec![json!({"name": "github"})],
            ..UnifiedConfigParts::default()
        });
        let stored = serde_json::to_value(&built).expect("serialize");

        assert_eq!(stored["tools"]["agentpress"], json!({"browser_tool": false, "shell_tool": true}));
        assert_eq!(stored["tools"]["mcp"], json!([{"name": "github"}]));
        assert_eq!(stored["tools"]["custom_mcp"], json!([]));
        assert_eq!(stored["metadata"], json!({}));
        assert!(stored.get("managed_agent_metadata").is_none());

        let settings = normalize_for_run(&stored["tools"]["agentpress"]);
        assert_eq!(
            settings["shell_tool"],
            ToolSetting { enabled: true, description: "shell_tool tool".to_string() }
        );
        assert_eq!(
            settings["browser_tool"],
            ToolSetting { enabled: false, description: "browser_tool tool".to_string() }
        );
    }

    #[test]
    fn managed_metadata_side_channel_is_embedded_when_present() {
        let mut side_channel = serde_json::Map::new();
        side_channel.insert("managed_agent_key".to_string(), json!("loadout_default"));

        let built = build_unified_config(UnifiedConfigParts {
            managed_agent_metadata: Some(side_channel),
            ..UnifiedConfigParts::default()
        });

        assert_eq!(
            serde_json::to_value(&built).expect("serialize")["managed_agent_metadata"],
            json!({"managed_agent_key": "loadout_default"})
        );
    }
}
