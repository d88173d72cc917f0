use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::domain::tool_flags::StoredToolFlag;

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AgentId(pub String);

impl fmt::Display for AgentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AccountId(pub String);

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VersionId(pub String);

impl fmt::Display for VersionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TriggerId(pub String);

impl fmt::Display for TriggerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Icon triple shown next to an agent. Any part may be missing on persisted rows.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentIcon {
    pub name: Option<String>,
    pub color: Option<String>,
    pub background: Option<String>,
}

impl AgentIcon {
    pub fn new(
        name: impl Into<String>,
        color: impl Into<String>,
        background: impl Into<String>,
    ) -> Self {
        Self { name: Some(name.into()), color: Some(color.into()), background: Some(background.into()) }
    }

    /// Fills every missing part from `defaults`. Empty strings count as missing.
    pub fn or_defaults(&self, defaults: &AgentIcon) -> AgentIcon {
        fn pick(own: &Option<String>, fallback: &Option<String>) -> Option<String> {
            own.as_ref().filter(|value| !value.is_empty()).or(fallback.as_ref()).cloned()
        }

        AgentIcon {
            name: pick(&self.name, &defaults.name),
            color: pick(&self.color, &defaults.color),
            background: pick(&self.background, &defaults.background),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountRecord {
    pub id: AccountId,
    pub name: String,
    pub personal_account: bool,
    pub created_at: DateTime<Utc>,
}

/// A persisted agent row.
///
/// The JSON-typed columns stay as raw [`Value`]s: rows written by older releases (or edited
/// by hand) may not match the current shape, and the resolver is responsible for reading them
/// leniently.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AgentRecord {
    pub id: AgentId,
    pub account_id: AccountId,
    pub name: String,
    pub description: Option<String>,
    pub icon: AgentIcon,
    pub system_prompt: Option<String>,
    pub configured_mcps: Value,
    pub custom_mcps: Value,
    pub tool_flags: Value,
    pub metadata: Value,
    pub is_default: bool,
    pub current_version_id: Option<VersionId>,
    pub version_count: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct NewAgent {
    pub account_id: AccountId,
    pub name: String,
    pub description: Option<String>,
    pub icon: AgentIcon,
    pub system_prompt: String,
    pub configured_mcps: Vec<Value>,
    pub custom_mcps: Vec<Value>,
    pub tool_flags: BTreeMap<String, StoredToolFlag>,
    pub metadata: Map<String, Value>,
    pub is_default: bool,
}

/// Flat version fields written before versions carried a nested `config` document.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct LegacyVersionFields {
    pub system_prompt: Option<String>,
    pub model: Option<String>,
    pub configured_mcps: Value,
    pub custom_mcps: Value,
    pub tool_flags: Value,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct VersionRecord {
    pub id: VersionId,
    pub agent_id: AgentId,
    pub version_number: i64,
    pub version_name: String,
    pub config: Option<Value>,
    pub legacy: LegacyVersionFields,
    pub change_description: Option<String>,
    pub created_by: AccountId,
    pub created_at: DateTime<Utc>,
}

/// Arguments accepted by the versioning collaborator.
#[derive(Clone, Debug, PartialEq)]
pub struct NewVersion {
    pub agent_id: AgentId,
    pub user_id: AccountId,
    pub system_prompt: String,
    pub configured_mcps: Vec<Value>,
    pub custom_mcps: Vec<Value>,
    pub tool_flags: BTreeMap<String, StoredToolFlag>,
    pub model: Option<String>,
    pub version_name: String,
    pub change_description: String,
}

/// A trigger attached to an agent. Only deleted here; scheduling lives elsewhere.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TriggerRecord {
    pub id: TriggerId,
    pub agent_id: AgentId,
    pub name: String,
    pub trigger_type: String,
    pub config: Value,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}
