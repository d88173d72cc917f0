use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

pub mod agent_config;
pub mod examples;
pub mod registry;

pub use agent_config::AgentConfigTool;
pub use examples::{example_value, usage_example};
pub use registry::{CapabilityRegistry, RegisteredTool};

/// How a schema may be used. Only `Invocable` schemas are exposed for function calling.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SchemaKind {
    Invocable,
    Documentation,
}

/// A function schema in the function-calling shape
/// (`{"type": "function", "function": {"name", "description", "parameters"}}`).
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ToolSchema {
    pub function_name: String,
    pub kind: SchemaKind,
    pub schema: Value,
}

impl ToolSchema {
    pub fn invocable(function_name: impl Into<String>, schema: Value) -> Self {
        Self { function_name: function_name.into(), kind: SchemaKind::Invocable, schema }
    }

    pub fn documentation(function_name: impl Into<String>, schema: Value) -> Self {
        Self { function_name: function_name.into(), kind: SchemaKind::Documentation, schema }
    }

    pub fn is_invocable(&self) -> bool {
        self.kind == SchemaKind::Invocable
    }

    /// The `parameters` object of the function, or `null` when absent.
    pub fn parameters(&self) -> &Value {
        self.schema.pointer("/function/parameters").unwrap_or(&Value::Null)
    }

    /// Declared function name, falling back to the registration name.
    pub fn declared_name(&self) -> &str {
        self.schema
            .pointer("/function/name")
            .and_then(Value::as_str)
            .unwrap_or(&self.function_name)
    }
}

/// A group of callable functions. The group name is what agent tool flags refer to.
#[async_trait]
pub trait ToolProvider: Send + Sync {
    fn name(&self) -> &'static str;
    fn schemas(&self) -> Vec<ToolSchema>;
    async fn invoke(&self, function_name: &str, arguments: Value) -> anyhow::Result<Value>;
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ToolError {
    #[error("tool not found: {0}")]
    NotFound(String),
    #[error("tool `{name}` failed: {message}")]
    Invocation { name: String, message: String },
}

/// A registered function bound to the provider that implements it.
#[derive(Clone)]
pub struct ToolHandle {
    function_name: String,
    provider: Arc<dyn ToolProvider>,
}

impl ToolHandle {
    pub(crate) fn new(function_name: String, provider: Arc<dyn ToolProvider>) -> Self {
        Self { function_name, provider }
    }

    pub fn function_name(&self) -> &str {
        &self.function_name
    }

    pub fn provider_name(&self) -> &'static str {
        self.provider.name()
    }

    pub async fn call(&self, arguments: Value) -> Result<Value, ToolError> {
        self.provider.invoke(&self.function_name, arguments).await.map_err(|error| {
            ToolError::Invocation { name: self.function_name.clone(), message: format!("{error:#}") }
        })
    }
}

impl fmt::Debug for ToolHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolHandle")
            .field("function_name", &self.function_name)
            .field("provider", &self.provider.name())
            .finish()
    }
}
