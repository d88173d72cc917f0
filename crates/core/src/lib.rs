pub mod config;
pub mod domain;
pub mod errors;
pub mod lenient;
pub mod managed;
pub mod models;
pub mod resolver;

pub use domain::agent::{
    AccountId, AccountRecord, AgentIcon, AgentId, AgentRecord, LegacyVersionFields, NewAgent,
    NewVersion, TriggerId, TriggerRecord, VersionId, VersionRecord,
};
pub use domain::tool_flags::{StoredToolFlag, ToolSetting, ToolSettings};
pub use errors::{ApplicationError, DomainError, InterfaceError, ModelError};
pub use managed::{AgentKind, ManagedAgentCatalog, ManagedAgentDefinition, PromptSource, Restrictions};
pub use models::{ModelCatalog, ModelSelector, ProviderAvailability, SelectionCriteria};
pub use resolver::{
    build_unified_config, ConfigResolver, UnifiedAgentConfig, UnifiedConfigParts, VersionConfig,
};
