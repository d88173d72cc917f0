use std::collections::HashSet;
use std::sync::Arc;

use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{info, warn};

use loadout_core::config::AppConfig;
use loadout_core::domain::agent::{AgentId, VersionRecord};
use loadout_core::errors::{ApplicationError, DomainError, ModelError};
use loadout_core::managed::ManagedAgentCatalog;
use loadout_core::models::{CatalogError, ModelCatalog, ModelSelector, ProviderAvailability};
use loadout_core::resolver::{ConfigResolver, UnifiedAgentConfig};
use loadout_db::repositories::{AgentStores, RepositoryError};

use crate::tools::{CapabilityRegistry, ToolSchema};

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("agent `{0}` was not found")]
    AgentNotFound(AgentId),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
    #[error("no model is available to run agent `{0}`")]
    NoModelAvailable(AgentId),
    #[error(transparent)]
    Model(#[from] ModelError),
}

impl From<RuntimeError> for ApplicationError {
    fn from(value: RuntimeError) -> Self {
        match value {
            RuntimeError::AgentNotFound(id) => DomainError::AgentNotFound(id.0).into(),
            RuntimeError::Repository(error) => ApplicationError::Persistence(error.to_string()),
            RuntimeError::NoModelAvailable(_) => DomainError::Model(ModelError::NoneAvailable).into(),
            RuntimeError::Model(error) => DomainError::Model(error).into(),
        }
    }
}

/// Everything the execution engine needs for one run of an agent.
#[derive(Clone, Debug, Serialize)]
pub struct RunPlan {
    pub config: UnifiedAgentConfig,
    pub model_id: String,
    pub call_params: Map<String, Value>,
    pub tool_schemas: Vec<ToolSchema>,
}

/// Loads an agent and its current version, then resolves the unified config. A version that
/// cannot be loaded is treated as absent.
pub async fn load_unified_config(
    stores: &AgentStores,
    resolver: &ConfigResolver,
    agent_id: &AgentId,
) -> Result<UnifiedAgentConfig, RuntimeError> {
    let agent = stores
        .agents
        .find_by_id(agent_id)
        .await?
        .ok_or_else(|| RuntimeError::AgentNotFound(agent_id.clone()))?;

    let version: Option<VersionRecord> = match &agent.current_version_id {
        Some(version_id) => match stores.versions.find_by_id(version_id).await {
            Ok(Some(version)) => Some(version),
            Ok(None) => {
                warn!(
                    event_name = "agent.runtime.version_missing",
                    agent_id = %agent.id,
                    version_id = %version_id,
                    "current version not found, resolving without it"
                );
                None
            }
            Err(error) => {
                warn!(
                    event_name = "agent.runtime.version_load_failed",
                    agent_id = %agent.id,
                    version_id = %version_id,
                    error = %error,
                    "current version could not be loaded, resolving without it"
                );
                None
            }
        },
        None => None,
    };

    Ok(resolver.resolve(&agent, version.as_ref()))
}

/// Shared pieces handed to provider registration in [`AgentRuntime::from_config`].
pub struct RuntimeParts<'a> {
    pub stores: &'a AgentStores,
    pub resolver: &'a Arc<ConfigResolver>,
    pub selector: &'a Arc<ModelSelector>,
}

/// Process-wide context: repositories, resolver, model selector and capability registry.
/// Built once at startup and shared by request handlers.
pub struct AgentRuntime {
    stores: AgentStores,
    resolver: Arc<ConfigResolver>,
    selector: Arc<ModelSelector>,
    registry: Arc<CapabilityRegistry>,
    default_model: Option<String>,
}

impl AgentRuntime {
    pub fn new(
        stores: AgentStores,
        resolver: Arc<ConfigResolver>,
        selector: Arc<ModelSelector>,
        registry: Arc<CapabilityRegistry>,
    ) -> Self {
        Self { stores, resolver, selector, registry, default_model: None }
    }

    /// Model used when an agent does not name one. Falls back to the catalog default.
    pub fn with_default_model(mut self, default_model: Option<String>) -> Self {
        self.default_model = default_model.filter(|model| !model.trim().is_empty());
        self
    }

    /// Builds the model catalog and managed-agent catalog described by `config`. `register`
    /// adds capability providers and receives the shared stores, resolver and selector so
    /// providers can read agent data.
    pub fn from_config<F>(
        config: &AppConfig,
        stores: AgentStores,
        register: F,
    ) -> Result<Self, CatalogError>
    where
        F: FnOnce(&mut CapabilityRegistry, &RuntimeParts<'_>),
    {
        let availability = config.models.detect_providers.then(ProviderAvailability::detect);
        let catalog = ModelCatalog::from_config(&config.models, availability.as_ref())?;
        let managed = ManagedAgentCatalog::builtin(&config.agents);

        let resolver = Arc::new(ConfigResolver::new(Arc::new(managed)));
        let selector = Arc::new(ModelSelector::new(Arc::new(catalog)));
        let mut registry = CapabilityRegistry::new();
        register(
            &mut registry,
            &RuntimeParts { stores: &stores, resolver: &resolver, selector: &selector },
        );

        Ok(Self::new(stores, resolver, selector, Arc::new(registry))
            .with_default_model(config.models.default_model.clone()))
    }

    pub fn stores(&self) -> &AgentStores {
        &self.stores
    }

    pub fn resolver(&self) -> &Arc<ConfigResolver> {
        &self.resolver
    }

    pub fn selector(&self) -> &Arc<ModelSelector> {
        &self.selector
    }

    pub fn registry(&self) -> &Arc<CapabilityRegistry> {
        &self.registry
    }

    pub async fn resolve(&self, agent_id: &AgentId) -> Result<UnifiedAgentConfig, RuntimeError> {
        load_unified_config(&self.stores, &self.resolver, agent_id).await
    }

    pub async fn prepare_run(&self, agent_id: &AgentId) -> Result<RunPlan, RuntimeError> {
        let config = self.resolve(agent_id).await?;
        let model_id = self.choose_model(&config)?;
        let call_params = self.selector.call_params(&model_id, Map::new());
        let tool_schemas = self.tool_schemas_for(&config);

        info!(
            event_name = "agent.runtime.run_prepared",
            agent_id = %config.agent_id,
            model_id = %model_id,
            centrally_managed = config.centrally_managed,
            tool_count = tool_schemas.len(),
            "run prepared"
        );

        Ok(RunPlan { config, model_id, call_params, tool_schemas })
    }

    /// Configured model (alias-resolved), then the configured default, then the catalog
    /// default. Unknown ids pass through; disabled ones are rejected.
    fn choose_model(&self, config: &UnifiedAgentConfig) -> Result<String, RuntimeError> {
        let requested = config
            .model
            .clone()
            .filter(|model| !model.trim().is_empty())
            .or_else(|| self.default_model.clone());

        let model_id = match requested {
            Some(model) => self.selector.resolve_id(&model),
            None => self
                .selector
                .default_model()
                .map(|model| model.id.clone())
                .ok_or_else(|| RuntimeError::NoModelAvailable(config.agent_id.clone()))?,
        };

        match self.selector.validate(&model_id) {
            Ok(_) => Ok(model_id),
            Err(ModelError::NotFound(_)) => {
                warn!(
                    event_name = "agent.runtime.unknown_model",
                    agent_id = %config.agent_id,
                    model_id = %model_id,
                    "model is not in the catalog, passing it through"
                );
                Ok(model_id)
            }
            Err(error) => Err(error.into()),
        }
    }

    /// Schemas whose provider group or function name is an enabled tool flag.
    fn tool_schemas_for(&self, config: &UnifiedAgentConfig) -> Vec<ToolSchema> {
        let enabled: HashSet<&str> = config.enabled_tools().collect();
        self.registry
            .iter()
            .filter(|entry| {
                enabled.contains(entry.provider.name())
                    || enabled.contains(entry.schema.function_name.as_str())
            })
            .map(|entry| entry.schema.clone())
            .collect()
    }
}
