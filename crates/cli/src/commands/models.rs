use std::sync::Arc;

use serde_json::json;

use loadout_core::config::{AppConfig, LoadOptions};
use loadout_core::models::{ModelCatalog, ModelSelector, ProviderAvailability};

use crate::commands::{load_config, to_data, CommandFailure, CommandResult, EXIT_CONFIG};

pub fn run(options: &LoadOptions, include_disabled: bool) -> CommandResult {
    match execute(options, include_disabled) {
        Ok((message, data)) => CommandResult::success_with_data("models", message, Some(data)),
        Err(failure) => failure.into_result("models"),
    }
}

fn execute(
    options: &LoadOptions,
    include_disabled: bool,
) -> Result<(String, serde_json::Value), CommandFailure> {
    let config = load_config(options)?;
    let selector = selector_for(&config)?;

    let models = selector.list_models(include_disabled);
    let default_model = selector.default_model().map(|model| model.id.clone());
    let message = format!(
        "{} models listed, default {}",
        models.len(),
        default_model.as_deref().unwrap_or("<none>")
    );

    Ok((message, json!({ "default_model": default_model, "models": to_data(&models)? })))
}

pub(crate) fn selector_for(config: &AppConfig) -> Result<ModelSelector, CommandFailure> {
    let availability = config.models.detect_providers.then(ProviderAvailability::detect);
    let catalog = ModelCatalog::from_config(&config.models, availability.as_ref()).map_err(|error| {
        CommandFailure::new("model_catalog", error.to_string(), EXIT_CONFIG)
    })?;
    Ok(ModelSelector::new(Arc::new(catalog)))
}
