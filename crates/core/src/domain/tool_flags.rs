use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::lenient::{is_truthy, kind_of};

/// Tool-flag entry as it is persisted. Older rows store a bare boolean per tool; current rows
/// store an object with an optional description.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StoredToolFlag {
    Flag(bool),
    Detailed {
        enabled: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        description: Option<String>,
    },
}

/// Runtime shape of a tool flag, consumed by the execution engine.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolSetting {
    pub enabled: bool,
    pub description: String,
}

pub type ToolSettings = BTreeMap<String, ToolSetting>;

/// Capabilities enabled for a custom agent that has no version snapshot yet.
pub const BASELINE_TOOL_FLAGS: &[(&str, bool)] = &[
    ("shell_tool", true),
    ("files_tool", true),
    ("deploy_tool", true),
    ("expose_tool", true),
    ("web_search_tool", true),
    ("image_search_tool", true),
    ("vision_tool", true),
    ("image_edit_tool", true),
    ("presentation_outline_tool", true),
    ("presentation_tool", true),
    ("sheets_tool", false),
    ("browser_tool", true),
    ("data_providers_tool", true),
    ("people_search_tool", false),
    ("agent_config_tool", true),
    ("mcp_search_tool", true),
    ("credential_profile_tool", true),
    ("agent_creation_tool", true),
    ("workflow_tool", true),
    ("trigger_tool", true),
];

impl StoredToolFlag {
    pub fn enabled(&self) -> bool {
        match self {
            Self::Flag(enabled) | Self::Detailed { enabled, .. } => *enabled,
        }
    }

    /// Reads one persisted entry. Objects without `enabled` count as disabled; any other
    /// shape falls back to its truthiness.
    pub fn from_value(tool_name: &str, value: &Value) -> Self {
        match value {
            Value::Bool(enabled) => Self::Flag(*enabled),
            Value::Object(entries) => Self::Detailed {
                enabled: entries.get("enabled").map(is_truthy).unwrap_or(false),
                description: entries.get("description").and_then(Value::as_str).map(str::to_owned),
            },
            other => {
                warn!(
                    event_name = "core.tool_flags.malformed_entry",
                    tool_name,
                    found = kind_of(other),
                    "unexpected tool flag shape, using its truthiness"
                );
                Self::Flag(is_truthy(other))
            }
        }
    }

    pub fn into_setting(self, tool_name: &str) -> ToolSetting {
        match self {
            Self::Flag(enabled) => ToolSetting { enabled, description: default_description(tool_name) },
            Self::Detailed { enabled, description } => ToolSetting {
                enabled,
                description: description
                    .filter(|text| !text.is_empty())
                    .unwrap_or_else(|| default_description(tool_name)),
            },
        }
    }
}

pub fn default_description(tool_name: &str) -> String {
    format!("{tool_name} tool")
}

/// Parses a persisted tool-flag map. Anything other than an object yields an empty map.
pub fn parse_stored_flags(value: &Value) -> BTreeMap<String, StoredToolFlag> {
    match value {
        Value::Null => BTreeMap::new(),
        Value::Object(entries) => entries
            .iter()
            .map(|(name, entry)| (name.clone(), StoredToolFlag::from_value(name, entry)))
            .collect(),
        other => {
            warn!(
                event_name = "core.tool_flags.malformed_map",
                found = kind_of(other),
                "tool flags are not a map, treating as empty"
            );
            BTreeMap::new()
        }
    }
}

/// Normalizes a persisted tool-flag map into the runtime `{enabled, description}` shape.
pub fn normalize_for_run(value: &Value) -> ToolSettings {
    settings_from_flags(parse_stored_flags(value))
}

pub fn settings_from_flags(flags: BTreeMap<String, StoredToolFlag>) -> ToolSettings {
    flags
        .into_iter()
        .map(|(name, flag)| {
            let setting = flag.into_setting(&name);
            (name, setting)
        })
        .collect()
}

/// Collapses flags to bare booleans for storage inside a version config.
pub fn simplify_for_storage(flags: &BTreeMap<String, StoredToolFlag>) -> BTreeMap<String, bool> {
    flags.iter().map(|(name, flag)| (name.clone(), flag.enabled())).collect()
}

pub fn baseline_tool_flags() -> BTreeMap<String, StoredToolFlag> {
    BASELINE_TOOL_FLAGS
        .iter()
        .map(|(name, enabled)| ((*name).to_string(), StoredToolFlag::Flag(*enabled)))
        .collect()
}
