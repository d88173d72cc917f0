use std::sync::Arc;

use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::{json, Map, Value};
use tracing::warn;

use crate::errors::ModelError;
use crate::models::catalog::{ModelCapability, ModelCatalog, ModelDescriptor, ModelProvider};

pub const DEFAULT_CONTEXT_WINDOW: u32 = 31_000;
const UNKNOWN_MODEL_RETRIES: u32 = 3;

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SelectionCriteria {
    pub required_capabilities: Vec<ModelCapability>,
    pub min_context_window: Option<u32>,
    pub prefer_cheaper: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TokenKind {
    Input,
    Output,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TokenLimitCheck {
    pub fits: bool,
    pub limit: u32,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PricingInfo {
    pub input_per_million: Decimal,
    pub output_per_million: Decimal,
}

/// Serialisable summary of one catalog entry.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ModelInfo {
    pub id: String,
    pub name: String,
    pub provider: ModelProvider,
    pub context_window: u32,
    pub max_output_tokens: Option<u32>,
    pub capabilities: Vec<ModelCapability>,
    pub pricing: Option<PricingInfo>,
    pub enabled: bool,
    pub beta: bool,
    pub priority: i32,
    pub recommended: bool,
}

impl From<&ModelDescriptor> for ModelInfo {
    fn from(model: &ModelDescriptor) -> Self {
        Self {
            id: model.id.clone(),
            name: model.name.clone(),
            provider: model.provider,
            context_window: model.context_window,
            max_output_tokens: model.max_output_tokens,
            capabilities: model.capabilities.clone(),
            pricing: model.pricing.map(|pricing| PricingInfo {
                input_per_million: pricing.input_cost_per_million,
                output_per_million: pricing.output_cost_per_million,
            }),
            enabled: model.enabled,
            beta: model.beta,
            priority: model.priority,
            recommended: model.recommended,
        }
    }
}

/// Resolution, validation, pricing and ranking policy over a shared [`ModelCatalog`].
#[derive(Clone, Debug)]
pub struct ModelSelector {
    catalog: Arc<ModelCatalog>,
}

impl ModelSelector {
    pub fn new(catalog: Arc<ModelCatalog>) -> Self {
        Self { catalog }
    }

    pub fn catalog(&self) -> &ModelCatalog {
        &self.catalog
    }

    /// Canonical id for an alias. Unknown input is passed through unchanged.
    pub fn resolve_id(&self, input_id: &str) -> String {
        self.catalog.resolve_alias(input_id).unwrap_or(input_id).to_string()
    }

    pub fn validate(&self, model_id: &str) -> Result<&ModelDescriptor, ModelError> {
        let model =
            self.catalog.get(model_id).ok_or_else(|| ModelError::NotFound(model_id.to_string()))?;
        if !model.enabled {
            return Err(ModelError::Disabled { id: model.id.clone(), name: model.name.clone() });
        }
        Ok(model)
    }

    /// Returns `None` when the model is unknown or has no pricing.
    pub fn estimate_cost(
        &self,
        model_id: &str,
        input_tokens: u64,
        output_tokens: u64,
    ) -> Option<Decimal> {
        let Some(pricing) = self.catalog.get(model_id).and_then(|model| model.pricing) else {
            warn!(
                event_name = "core.models.pricing_unavailable",
                model_id,
                "no pricing available for model"
            );
            return None;
        };

        Some(
            Decimal::from(input_tokens) * pricing.input_cost_per_token()
                + Decimal::from(output_tokens) * pricing.output_cost_per_token(),
        )
    }

    pub fn select_best(&self, criteria: &SelectionCriteria) -> Result<&ModelDescriptor, ModelError> {
        let mut candidates: Vec<&ModelDescriptor> = self
            .catalog
            .enabled()
            .filter(|model| {
                criteria
                    .required_capabilities
                    .iter()
                    .all(|capability| model.has_capability(*capability))
            })
            .filter(|model| {
                criteria.min_context_window.map_or(true, |floor| model.context_window >= floor)
            })
            .collect();

        if criteria.prefer_cheaper && candidates.iter().any(|model| model.pricing.is_some()) {
            candidates.retain(|model| model.pricing.is_some());
            candidates.sort_by_key(|model| {
                model.pricing.map(|pricing| pricing.input_cost_per_million).unwrap_or(Decimal::MAX)
            });
        } else {
            candidates.sort_by_key(|model| (-i64::from(model.priority), !model.recommended));
        }

        candidates.into_iter().next().ok_or(ModelError::NoneAvailable)
    }

    /// Highest-priority recommended model, else highest-priority enabled model.
    pub fn default_model(&self) -> Option<&ModelDescriptor> {
        let highest = |recommended_only: bool| {
            self.catalog
                .enabled()
                .filter(|model| !recommended_only || model.recommended)
                .fold(None::<&ModelDescriptor>, |best, model| match best {
                    Some(current) if current.priority >= model.priority => Some(current),
                    _ => Some(model),
                })
        };

        highest(true).or_else(|| highest(false))
    }

    /// Unknown models never fit and report a limit of zero.
    pub fn check_token_limit(&self, model_id: &str, count: u32, kind: TokenKind) -> TokenLimitCheck {
        let Some(model) = self.catalog.get(model_id) else {
            return TokenLimitCheck { fits: false, limit: 0 };
        };

        let limit = match kind {
            TokenKind::Input => model.context_window,
            TokenKind::Output => model.max_output_tokens.unwrap_or(model.context_window),
        };
        TokenLimitCheck { fits: count <= limit, limit }
    }

    pub fn context_window(&self, model_id: &str) -> u32 {
        self.catalog.context_window(model_id, DEFAULT_CONTEXT_WINDOW)
    }

    pub fn model_info(&self, model_id: &str) -> Option<ModelInfo> {
        self.catalog.get(model_id).map(ModelInfo::from)
    }

    pub fn list_models(&self, include_disabled: bool) -> Vec<ModelInfo> {
        let models = self.catalog.list(include_disabled);
        if models.is_empty() {
            warn!(
                event_name = "core.models.catalog_empty",
                include_disabled,
                "no models available, check provider configuration"
            );
        }
        models.into_iter().map(ModelInfo::from).collect()
    }

    /// Keyword parameters handed to the model-calling transport. Overrides win.
    pub fn call_params(&self, model_id: &str, overrides: Map<String, Value>) -> Map<String, Value> {
        let mut params = Map::new();

        match self.catalog.get(model_id) {
            Some(model) => {
                params.insert("model".to_string(), json!(model.id));
                if let Some(max_output) = model.max_output_tokens {
                    params.insert("max_tokens".to_string(), json!(max_output));
                }
            }
            None => {
                warn!(
                    event_name = "core.models.unknown_call_params",
                    model_id,
                    "model not in catalog, using basic call parameters"
                );
                params.insert("model".to_string(), json!(model_id));
                params.insert("num_retries".to_string(), json!(UNKNOWN_MODEL_RETRIES));
            }
        }

        params.extend(overrides);
        params
    }
}
