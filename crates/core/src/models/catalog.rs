use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use crate::config::ModelsConfig;
use crate::models::builtin::builtin_models;
use crate::models::provider::ProviderAvailability;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelCapability {
    Chat,
    FunctionCalling,
    Vision,
    Thinking,
    StructuredOutput,
    WebSearch,
}

impl ModelCapability {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Chat => "chat",
            Self::FunctionCalling => "function_calling",
            Self::Vision => "vision",
            Self::Thinking => "thinking",
            Self::StructuredOutput => "structured_output",
            Self::WebSearch => "web_search",
        }
    }
}

impl fmt::Display for ModelCapability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ModelCapability {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "chat" => Ok(Self::Chat),
            "function_calling" => Ok(Self::FunctionCalling),
            "vision" => Ok(Self::Vision),
            "thinking" => Ok(Self::Thinking),
            "structured_output" => Ok(Self::StructuredOutput),
            "web_search" => Ok(Self::WebSearch),
            other => Err(format!("unknown model capability `{other}`")),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelProvider {
    OpenAi,
    Anthropic,
    Google,
    Xai,
    OpenRouter,
    MoonshotAi,
    Groq,
}

impl ModelProvider {
    pub const ALL: [ModelProvider; 7] = [
        Self::OpenAi,
        Self::Anthropic,
        Self::Google,
        Self::Xai,
        Self::OpenRouter,
        Self::MoonshotAi,
        Self::Groq,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::OpenAi => "openai",
            Self::Anthropic => "anthropic",
            Self::Google => "google",
            Self::Xai => "xai",
            Self::OpenRouter => "openrouter",
            Self::MoonshotAi => "moonshotai",
            Self::Groq => "groq",
        }
    }
}

impl fmt::Display for ModelProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Prices in currency units per million tokens.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelPricing {
    pub input_cost_per_million: Decimal,
    pub output_cost_per_million: Decimal,
}

impl ModelPricing {
    pub fn per_million(input: Decimal, output: Decimal) -> Self {
        Self { input_cost_per_million: input, output_cost_per_million: output }
    }

    pub fn input_cost_per_token(&self) -> Decimal {
        self.input_cost_per_million / Decimal::from(1_000_000u32)
    }

    pub fn output_cost_per_token(&self) -> Decimal {
        self.output_cost_per_million / Decimal::from(1_000_000u32)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ModelDescriptor {
    pub id: String,
    pub name: String,
    pub provider: ModelProvider,
    pub aliases: Vec<String>,
    pub capabilities: Vec<ModelCapability>,
    pub context_window: u32,
    pub max_output_tokens: Option<u32>,
    pub pricing: Option<ModelPricing>,
    pub enabled: bool,
    pub recommended: bool,
    pub priority: i32,
    pub beta: bool,
}

impl ModelDescriptor {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        provider: ModelProvider,
        context_window: u32,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            provider,
            aliases: Vec::new(),
            capabilities: vec![ModelCapability::Chat],
            context_window,
            max_output_tokens: None,
            pricing: None,
            enabled: true,
            recommended: false,
            priority: 0,
            beta: false,
        }
    }

    pub fn with_aliases(mut self, aliases: &[&str]) -> Self {
        self.aliases = aliases.iter().map(|alias| (*alias).to_string()).collect();
        self
    }

    pub fn with_capabilities(mut self, capabilities: &[ModelCapability]) -> Self {
        self.capabilities = capabilities.to_vec();
        self
    }

    pub fn with_max_output(mut self, max_output_tokens: u32) -> Self {
        self.max_output_tokens = Some(max_output_tokens);
        self
    }

    pub fn with_pricing(mut self, pricing: ModelPricing) -> Self {
        self.pricing = Some(pricing);
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn recommended(mut self) -> Self {
        self.recommended = true;
        self
    }

    pub fn beta(mut self) -> Self {
        self.beta = true;
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    pub fn has_capability(&self, capability: ModelCapability) -> bool {
        self.capabilities.contains(&capability)
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum CatalogError {
    #[error("model id `{0}` is declared more than once")]
    DuplicateId(String),
    #[error("alias `{alias}` of `{model_id}` collides with `{existing}`")]
    AliasCollision { alias: String, model_id: String, existing: String },
}

/// Table of known models. Ids and aliases are matched case-insensitively.
#[derive(Clone, Debug, Default)]
pub struct ModelCatalog {
    models: Vec<ModelDescriptor>,
    index: HashMap<String, usize>,
}

impl ModelCatalog {
    pub fn new(models: Vec<ModelDescriptor>) -> Result<Self, CatalogError> {
        let mut index: HashMap<String, usize> = HashMap::new();

        for (position, model) in models.iter().enumerate() {
            let key = model.id.to_lowercase();
            if index.insert(key, position).is_some() {
                return Err(CatalogError::DuplicateId(model.id.clone()));
            }
        }

        for (position, model) in models.iter().enumerate() {
            for alias in &model.aliases {
                let key = alias.to_lowercase();
                match index.get(&key) {
                    Some(existing) if *existing == position => {}
                    Some(existing) => {
                        return Err(CatalogError::AliasCollision {
                            alias: alias.clone(),
                            model_id: model.id.clone(),
                            existing: models[*existing].id.clone(),
                        });
                    }
                    None => {
                        index.insert(key, position);
                    }
                }
            }
        }

        Ok(Self { models, index })
    }

    pub fn builtin() -> Result<Self, CatalogError> {
        Self::new(builtin_models())
    }

    /// Builds the process catalog: built-in models, provider detection when enabled, then the
    /// configured disable list.
    pub fn from_config(
        config: &ModelsConfig,
        availability: Option<&ProviderAvailability>,
    ) -> Result<Self, CatalogError> {
        let mut catalog = Self::builtin()?;

        if config.detect_providers {
            if let Some(availability) = availability {
                catalog.apply_provider_availability(availability);
            }
        }

        for model_id in &config.disabled {
            if !catalog.disable(model_id) {
                warn!(
                    event_name = "core.models.unknown_disabled_model",
                    model_id = %model_id,
                    "configured disabled model is not in the catalog"
                );
            }
        }

        Ok(catalog)
    }

    pub fn get(&self, id_or_alias: &str) -> Option<&ModelDescriptor> {
        self.index.get(&id_or_alias.to_lowercase()).map(|position| &self.models[*position])
    }

    /// Canonical id for an id or alias, or `None` when the input is unknown.
    pub fn resolve_alias(&self, id_or_alias: &str) -> Option<&str> {
        self.get(id_or_alias).map(|model| model.id.as_str())
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ModelDescriptor> {
        self.models.iter()
    }

    pub fn enabled(&self) -> impl Iterator<Item = &ModelDescriptor> {
        self.models.iter().filter(|model| model.enabled)
    }

    /// Models ordered by descending priority, then name.
    pub fn list(&self, include_disabled: bool) -> Vec<&ModelDescriptor> {
        let mut models: Vec<&ModelDescriptor> =
            self.models.iter().filter(|model| include_disabled || model.enabled).collect();
        models.sort_by(|left, right| {
            right.priority.cmp(&left.priority).then_with(|| left.name.cmp(&right.name))
        });
        models
    }

    pub fn models_with_capability(&self, capability: ModelCapability) -> Vec<&ModelDescriptor> {
        self.enabled().filter(|model| model.has_capability(capability)).collect()
    }

    pub fn context_window(&self, id_or_alias: &str, default: u32) -> u32 {
        self.get(id_or_alias).map(|model| model.context_window).unwrap_or(default)
    }

    /// Returns `false` when the id is unknown.
    pub fn disable(&mut self, id_or_alias: &str) -> bool {
        self.with_model_mut(id_or_alias, |model| model.enabled = false)
    }

    pub fn set_recommended(&mut self, id_or_alias: &str, recommended: bool) -> bool {
        self.with_model_mut(id_or_alias, |model| model.recommended = recommended)
    }

    /// Disables models whose provider has no credentials and flags each enabled provider's
    /// preferred model as recommended.
    pub fn apply_provider_availability(&mut self, availability: &ProviderAvailability) {
        for model in &mut self.models {
            if !availability.is_enabled(model.provider) {
                model.enabled = false;
            }
        }

        for provider in availability.enabled_providers() {
            if let Some(model_id) = ProviderAvailability::preferred_model(provider) {
                self.set_recommended(model_id, true);
            }
        }

        info!(
            event_name = "core.models.providers_detected",
            enabled = %availability.describe_enabled(),
            enabled_models = self.enabled().count(),
            "applied provider availability to model catalog"
        );
    }

    fn with_model_mut(&mut self, id_or_alias: &str, apply: impl FnOnce(&mut ModelDescriptor)) -> bool {
        match self.index.get(&id_or_alias.to_lowercase()) {
            Some(position) => {
                apply(&mut self.models[*position]);
                true
            }
            None => false,
        }
    }
}
