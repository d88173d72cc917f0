use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use tracing::{debug, warn};

use super::examples::usage_example;
use super::{ToolError, ToolHandle, ToolProvider, ToolSchema};

/// One registered function: the provider that implements it and its invocable schema.
#[derive(Clone)]
pub struct RegisteredTool {
    pub provider: Arc<dyn ToolProvider>,
    pub schema: ToolSchema,
}

impl RegisteredTool {
    pub fn handle(&self) -> ToolHandle {
        ToolHandle::new(self.schema.function_name.clone(), self.provider.clone())
    }
}

impl std::fmt::Debug for RegisteredTool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegisteredTool")
            .field("provider", &self.provider.name())
            .field("schema", &self.schema)
            .finish()
    }
}

/// Callable functions exposed to a model. Populated once at startup, read afterwards.
///
/// A function name maps to at most one entry. Registering a name again replaces the
/// earlier entry in place, so listing order stays the order names were first seen.
#[derive(Default)]
pub struct CapabilityRegistry {
    entries: Vec<RegisteredTool>,
    index: HashMap<String, usize>,
}

impl CapabilityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers every invocable schema of `provider`, limited to `allowed` when given.
    /// Returns how many functions were registered.
    pub fn register(&mut self, provider: Arc<dyn ToolProvider>, allowed: Option<&[&str]>) -> usize {
        let mut registered = 0;

        for schema in provider.schemas() {
            if !schema.is_invocable() {
                continue;
            }
            if let Some(allowed) = allowed {
                if !allowed.contains(&schema.function_name.as_str()) {
                    continue;
                }
            }

            let name = schema.function_name.clone();
            let entry = RegisteredTool { provider: provider.clone(), schema };
            match self.index.get(&name) {
                Some(&position) => {
                    warn!(
                        event_name = "agent.registry.name_collision",
                        function_name = %name,
                        previous_provider = self.entries[position].provider.name(),
                        provider = provider.name(),
                        "function registered twice, keeping the latest"
                    );
                    self.entries[position] = entry;
                }
                None => {
                    self.index.insert(name, self.entries.len());
                    self.entries.push(entry);
                }
            }
            registered += 1;
        }

        debug!(
            event_name = "agent.registry.registered",
            provider = provider.name(),
            registered,
            "tool provider registered"
        );
        registered
    }

    pub fn get_callable(&self, name: &str) -> Result<ToolHandle, ToolError> {
        self.lookup(name).map(RegisteredTool::handle).ok_or_else(|| ToolError::NotFound(name.to_string()))
    }

    /// Registered entry for `name`. A miss is logged and returned as `None`.
    pub fn describe(&self, name: &str) -> Option<&RegisteredTool> {
        let found = self.lookup(name);
        if found.is_none() {
            warn!(event_name = "agent.registry.unknown_tool", function_name = name, "tool not found");
        }
        found
    }

    pub fn list_schemas(&self) -> Vec<&ToolSchema> {
        self.entries.iter().map(|entry| &entry.schema).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &RegisteredTool> {
        self.entries.iter()
    }

    /// Example invocation per registered function, keyed by declared function name.
    pub fn build_usage_examples(&self) -> BTreeMap<String, String> {
        self.entries
            .iter()
            .map(|entry| (entry.schema.declared_name().to_string(), usage_example(&entry.schema)))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn lookup(&self, name: &str) -> Option<&RegisteredTool> {
        self.index.get(name).map(|&position| &self.entries[position])
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use anyhow::bail;
    use async_trait::async_trait;
    use serde_json::{json, Value};

    use super::CapabilityRegistry;
    use crate::tools::{ToolError, ToolProvider, ToolSchema};

    struct FileTool;

    #[async_trait]
    impl ToolProvider for FileTool {
        fn name(&self) -> &'static str {
            "files_tool"
        }

        fn schemas(&self) -> Vec<ToolSchema> {
            vec![
                ToolSchema::invocable("read_file", function("read_file", json!({"path": {"type": "string"}}))),
                ToolSchema::invocable("delete_file", function("delete_file", json!({"path": {"type": "string"}}))),
                ToolSchema::documentation("file_guide", json!({"text": "how to use files"})),
            ]
        }

        async fn invoke(&self, function_name: &str, arguments: Value) -> anyhow::Result<Value> {
            match function_name {
                "read_file" => Ok(json!({"path": arguments["path"], "contents": "hello"})),
                other => bail!("{other} is not allowed here"),
            }
        }
    }

    struct ShadowTool;

    #[async_trait]
    impl ToolProvider for ShadowTool {
        fn name(&self) -> &'static str {
            "shadow_tool"
        }

        fn schemas(&self) -> Vec<ToolSchema> {
            vec![ToolSchema::invocable("read_file", function("read_file", json!({})))]
        }

        async fn invoke(&self, _function_name: &str, _arguments: Value) -> anyhow::Result<Value> {
            Ok(json!("shadowed"))
        }
    }

    struct EmptyTool;

    #[async_trait]
    impl ToolProvider for EmptyTool {
        fn name(&self) -> &'static str {
            "empty_tool"
        }

        fn schemas(&self) -> Vec<ToolSchema> {
            Vec::new()
        }

        async fn invoke(&self, _function_name: &str, _arguments: Value) -> anyhow::Result<Value> {
            Ok(Value::Null)
        }
    }

    fn function(name: &str, properties: Value) -> Value {
        json!({
            "type": "function",
            "function": {
                "name": name,
                "description": format!("{name} function"),
                "parameters": {"type": "object", "properties": properties, "required": ["path"]}
            }
        })
    }

    #[test]
    fn registers_every_invocable_schema_without_a_filter() {
        let mut registry = CapabilityRegistry::new();

        assert_eq!(registry.register(Arc::new(FileTool), None), 2);

        let names: Vec<&str> =
            registry.list_schemas().iter().map(|schema| schema.function_name.as_str()).collect();
        assert_eq!(names, vec!["read_file", "delete_file"]);
        assert!(registry.describe("file_guide").is_none());
        assert_eq!(
            registry.describe("delete_file").map(|entry| entry.provider.name()),
            Some("files_tool")
        );
    }

    #[test]
    fn allowed_names_limit_what_is_registered() {
        let mut registry = CapabilityRegistry::new();

        registry.register(Arc::new(FileTool), Some(&["read_file"]));

        assert_eq!(registry.len(), 1);
        assert!(registry.describe("delete_file").is_none());
        assert!(matches!(registry.get_callable("delete_file"), Err(ToolError::NotFound(name)) if name == "delete_file"));
    }

    #[test]
    fn empty_providers_register_nothing() {
        let mut registry = CapabilityRegistry::new();

        assert_eq!(registry.register(Arc::new(EmptyTool), None), 0);
        assert!(registry.is_empty());
        assert!(registry.build_usage_examples().is_empty());
    }

    #[tokio::test]
    async fn later_registration_wins_and_keeps_position() {
        let mut registry = CapabilityRegistry::new();
        registry.register(Arc::new(FileTool), None);
        registry.register(Arc::new(ShadowTool), None);

        let names: Vec<&str> =
            registry.list_schemas().iter().map(|schema| schema.function_name.as_str()).collect();
        assert_eq!(names, vec!["read_file", "delete_file"]);

        let handle = registry.get_callable("read_file").expect("read_file registered");
        assert_eq!(handle.provider_name(), "shadow_tool");
        assert_eq!(handle.call(json!({})).await, Ok(json!("shadowed")));
    }

    #[tokio::test]
    async fn invocation_failures_carry_the_function_name() {
        let mut registry = CapabilityRegistry::new();
        registry.register(Arc::new(FileTool), None);

        let read = registry.get_callable("read_file").expect("read_file");
        assert_eq!(
            read.call(json!({"path": "notes.md"})).await,
            Ok(json!({"path": "notes.md", "contents": "hello"}))
        );

        let delete = registry.get_callable("delete_file").expect("delete_file");
        assert_eq!(
            delete.call(json!({"path": "notes.md"})).await,
            Err(ToolError::Invocation {
                name: "delete_file".to_string(),
                message: "delete_file is not allowed here".to_string(),
            })
        );
    }
}
