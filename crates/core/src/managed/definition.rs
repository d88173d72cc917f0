use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::PathBuf;

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tracing::warn;

use crate::domain::agent::AgentIcon;
use crate::domain::tool_flags::StoredToolFlag;
use crate::lenient::{is_truthy, kind_of};

pub const CENTRALLY_MANAGED_KEY: &str = "centrally_managed";
pub const MANAGED_AGENT_KEY: &str = "managed_agent_key";
pub const INSTALLATION_DATE_KEY: &str = "installation_date";
pub const RESTRICTIONS_KEY: &str = "restrictions";

/// Where a managed agent's system prompt comes from. Resolved on every call.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PromptSource {
    Inline(String),
    /// `preamble` followed by the trimmed file contents, or by `fallback` when the file
    /// cannot be read.
    File { path: PathBuf, preamble: String, fallback: String },
}

impl PromptSource {
    pub fn load(&self) -> String {
        match self {
            Self::Inline(prompt) => prompt.clone(),
            Self::File { path, preamble, fallback } => match fs::read_to_string(path) {
                Ok(contents) => format!("{preamble}{}", contents.trim()),
                Err(error) => {
                    warn!(
                        event_name = "core.managed.prompt_file_unavailable",
                        path = %path.display(),
                        missing = error.kind() == io::ErrorKind::NotFound,
                        error = %error,
                        "prompt file could not be read, using fallback text"
                    );
                    format!("{preamble}{fallback}")
                }
            },
        }
    }
}

/// Field name to editability. Absent fields are editable.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Restrictions(BTreeMap<String, bool>);

impl Restrictions {
    pub fn new(entries: &[(&str, bool)]) -> Self {
        Self(entries.iter().map(|(field, editable)| ((*field).to_string(), *editable)).collect())
    }

    /// Prompt, tools, name and description locked; tool servers editable.
    pub fn locked_identity() -> Self {
        Self::new(&[
            ("system_prompt_editable", false),
            ("tools_editable", false),
            ("name_editable", false),
            ("description_editable", false),
            ("mcps_editable", true),
        ])
    }

    /// Reads an instance-level override map. Non-boolean entries use their truthiness.
    pub fn from_value(value: &Value) -> Self {
        match value {
            Value::Null => Self::default(),
            Value::Object(entries) => Self(
                entries
                    .iter()
                    .map(|(field, editable)| {
                        let editable = match editable {
                            Value::Bool(flag) => *flag,
                            other => {
                                warn!(
                                    event_name = "core.managed.malformed_restriction",
                                    field = %field,
                                    found = kind_of(other),
                                    "restriction entry is not a boolean, using its truthiness"
                                );
                                is_truthy(other)
                            }
                        };
                        (field.clone(), editable)
                    })
                    .collect(),
            ),
            other => {
                warn!(
                    event_name = "core.managed.malformed_restrictions",
                    found = kind_of(other),
                    "restrictions are not a map, ignoring"
                );
                Self::default()
            }
        }
    }

    /// Overrides win per key.
    pub fn merged_with(&self, overrides: &Restrictions) -> Restrictions {
        let mut merged = self.0.clone();
        merged.extend(overrides.0.iter().map(|(field, editable)| (field.clone(), *editable)));
        Restrictions(merged)
    }

    pub fn is_editable(&self, field: &str) -> bool {
        self.0.get(field).copied().unwrap_or(true)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, bool)> {
        self.0.iter().map(|(field, editable)| (field.as_str(), *editable))
    }

    pub fn to_value(&self) -> Value {
        Value::Object(self.0.iter().map(|(field, editable)| (field.clone(), json!(editable))).collect())
    }
}

/// Immutable identity of a centrally managed agent.
///
/// Fields are private and every accessor hands out an owned value, so a caller can never
/// alter what other callers observe. The prompt is re-read from its source on each call.
#[derive(Clone, Debug, PartialEq)]
pub struct ManagedAgentDefinition {
    key: String,
    metadata_flag: String,
    name: String,
    description: String,
    model: String,
    prompt: PromptSource,
    tool_flags: BTreeMap<String, StoredToolFlag>,
    configured_mcps: Vec<Value>,
    custom_mcps: Vec<Value>,
    icon: AgentIcon,
    restrictions: Restrictions,
    change_description: String,
    default_for_new_accounts: bool,
    extra_metadata: Map<String, Value>,
}

impl ManagedAgentDefinition {
    pub fn builder(
        key: impl Into<String>,
        metadata_flag: impl Into<String>,
        name: impl Into<String>,
    ) -> ManagedAgentDefinitionBuilder {
        ManagedAgentDefinitionBuilder::new(key.into(), metadata_flag.into(), name.into())
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn metadata_flag(&self) -> &str {
        &self.metadata_flag
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn model(&self) -> String {
        self.model.clone()
    }

    pub fn system_prompt(&self) -> String {
        self.prompt.load()
    }

    pub fn prompt_source(&self) -> &PromptSource {
        &self.prompt
    }

    pub fn tool_flags(&self) -> BTreeMap<String, StoredToolFlag> {
        self.tool_flags.clone()
    }

    pub fn configured_mcps(&self) -> Vec<Value> {
        self.configured_mcps.clone()
    }

    pub fn custom_mcps(&self) -> Vec<Value> {
        self.custom_mcps.clone()
    }

    pub fn icon(&self) -> &AgentIcon {
        &self.icon
    }

    pub fn restrictions(&self) -> &Restrictions {
        &self.restrictions
    }

    pub fn change_description(&self) -> &str {
        &self.change_description
    }

    pub fn is_default_for_new_accounts(&self) -> bool {
        self.default_for_new_accounts
    }

    /// Whether `metadata` marks an instance of this definition.
    pub fn marks(&self, metadata: &Map<String, Value>) -> bool {
        metadata.get(&self.metadata_flag).is_some_and(is_truthy)
    }

    /// Metadata written onto a freshly installed instance. Extra entries never replace the
    /// marker, key, timestamp or restrictions.
    pub fn build_metadata(&self) -> Map<String, Value> {
        let mut metadata = self.extra_metadata.clone();
        metadata.insert(self.metadata_flag.clone(), Value::Bool(true));
        metadata.insert(CENTRALLY_MANAGED_KEY.to_string(), Value::Bool(true));
        metadata.insert(MANAGED_AGENT_KEY.to_string(), Value::String(self.key.clone()));
        metadata.insert(
            INSTALLATION_DATE_KEY.to_string(),
            Value::String(Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)),
        );
        metadata.insert(RESTRICTIONS_KEY.to_string(), self.restrictions.to_value());
        metadata
    }
}

#[derive(Debug)]
pub struct ManagedAgentDefinitionBuilder {
    definition: ManagedAgentDefinition,
}

impl ManagedAgentDefinitionBuilder {
    fn new(key: String, metadata_flag: String, name: String) -> Self {
        Self {
            definition: ManagedAgentDefinition {
                key,
                metadata_flag,
                name,
                description: String::new(),
                model: String::new(),
                prompt: PromptSource::Inline(String::new()),
                tool_flags: BTreeMap::new(),
                configured_mcps: Vec::new(),
                custom_mcps: Vec::new(),
                icon: AgentIcon::new("sparkles", "#2563EB", "#EFF6FF"),
                restrictions: Restrictions::default(),
                change_description: "Initial centrally managed agent installation".to_string(),
                default_for_new_accounts: false,
                extra_metadata: Map::new(),
            },
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.definition.description = description.into();
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.definition.model = model.into();
        self
    }

    pub fn prompt(mut self, prompt: PromptSource) -> Self {
        self.definition.prompt = prompt;
        self
    }

    pub fn tool_flags(mut self, tool_flags: BTreeMap<String, StoredToolFlag>) -> Self {
        self.definition.tool_flags = tool_flags;
        self
    }

    pub fn configured_mcps(mut self, configured_mcps: Vec<Value>) -> Self {
        self.definition.configured_mcps = configured_mcps;
        self
    }

    pub fn custom_mcps(mut self, custom_mcps: Vec<Value>) -> Self {
        self.definition.custom_mcps = custom_mcps;
        self
    }

    pub fn icon(mut self, icon: AgentIcon) -> Self {
        self.definition.icon = icon;
        self
    }

    pub fn restrictions(mut self, restrictions: Restrictions) -> Self {
        self.definition.restrictions = restrictions;
        self
    }

    pub fn change_description(mut self, change_description: impl Into<String>) -> Self {
        self.definition.change_description = change_description.into();
        self
    }

    pub fn default_for_new_accounts(mut self, default_for_new_accounts: bool) -> Self {
        self.definition.default_for_new_accounts = default_for_new_accounts;
        self
    }

    pub fn extra_metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.definition.extra_metadata.insert(key.into(), value);
        self
    }

    pub fn build(self) -> ManagedAgentDefinition {
        self.definition
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use serde_json::{json, Map, Value};
    use tempfile::TempDir;

    use super::{ManagedAgentDefinition, PromptSource, Restrictions};
    use crate::domain::tool_flags::StoredToolFlag;

    fn definition(prompt: PromptSource) -> ManagedAgentDefinition {
        let mut tools = std::collections::BTreeMap::new();
        tools.insert("shell_tool".to_string(), StoredToolFlag::Flag(true));

        ManagedAgentDefinition::builder("helper", "is_helper_default", "Helper")
            .model("gpt-5")
            .prompt(prompt)
            .tool_flags(tools)
            .configured_mcps(vec![json!({"name": "search"})])
            .restrictions(Restrictions::locked_identity())
            .extra_metadata("notes", json!("managed helper"))
            .extra_metadata("centrally_managed", json!(false))
            .build()
    }

    #[test]
    fn metadata_is_stamped_with_marker_key_and_restrictions() {
        let definition = definition(PromptSource::Inline("Be helpful.".to_string()));

        let metadata = definition.build_metadata();

        assert_eq!(metadata.get("is_helper_default"), Some(&json!(true)));
        assert_eq!(metadata.get("centrally_managed"), Some(&json!(true)));
        assert_eq!(metadata.get("managed_agent_key"), Some(&json!("helper")));
        assert_eq!(metadata.get("notes"), Some(&json!("managed helper")));
        assert_eq!(
            metadata.get("restrictions").and_then(|value| value.get("system_prompt_editable")),
            Some(&json!(false))
        );
        let stamped = metadata.get("installation_date").and_then(Value::as_str).unwrap_or_default();
        assert!(chrono::DateTime::parse_from_rfc3339(stamped).is_ok());
    }

    #[test]
    fn accessor_copies_do_not_alias_shared_state() {
        let definition = definition(PromptSource::Inline("Be helpful.".to_string()));

        let mut tools = definition.tool_flags();
        tools.insert("shell_tool".to_string(), StoredToolFlag::Flag(false));
        let mut servers = definition.configured_mcps();
        servers.clear();
        let mut metadata = definition.build_metadata();
        metadata.insert("restrictions".to_string(), json!({}));

        assert_eq!(definition.tool_flags()["shell_tool"], StoredToolFlag::Flag(true));
        assert_eq!(definition.configured_mcps().len(), 1);
        assert!(!definition.restrictions().is_editable("tools_editable"));
    }

    #[test]
    fn file_prompts_are_read_on_every_call() {
        let dir = TempDir::new().expect("tempdir");
        let path = dir.path().join("guide.md");
        fs::write(&path, "first revision\n").expect("write guide");
        let definition = definition(PromptSource::File {
            path: path.clone(),
            preamble: "Follow the guide.\n\n".to_string(),
            fallback: "guide missing".to_string(),
        });

        assert_eq!(definition.system_prompt(), "Follow the guide.\n\nfirst revision");

        fs::write(&path, "second revision").expect("rewrite guide");
        assert_eq!(definition.system_prompt(), "Follow the guide.\n\nsecond revision");

        fs::remove_file(&path).expect("remove guide");
        assert_eq!(definition.system_prompt(), "Follow the guide.\n\nguide missing");
    }

    #[test]
    fn instance_restrictions_override_per_key() {
        let base = Restrictions::locked_identity();
        let overrides =
            Restrictions::from_value(&json!({"name_editable": true, "mcps_editable": 0}));

        let merged = base.merged_with(&overrides);

        assert!(merged.is_editable("name_editable"));
        assert!(!merged.is_editable("mcps_editable"));
        assert!(!merged.is_editable("system_prompt_editable"));
        assert!(merged.is_editable("unlisted_field"));
        assert!(Restrictions::from_value(&json!("locked")).is_empty());
    }

    #[test]
    fn marks_checks_flag_truthiness() {
        let definition = definition(PromptSource::Inline(String::new()));
        let mut metadata = Map::new();

        assert!(!definition.marks(&metadata));
        metadata.insert("is_helper_default".to_string(), json!("yes"));
        assert!(definition.marks(&metadata));
        metadata.insert("is_helper_default".to_string(), json!(false));
        assert!(!definition.marks(&metadata));
    }
}
