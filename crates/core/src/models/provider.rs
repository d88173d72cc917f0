use std::collections::BTreeMap;

use secrecy::SecretString;
use tracing::debug;

use crate::models::catalog::ModelProvider;

/// Environment variables that enable each provider. Any one non-blank variable is enough.
const PROVIDER_ENV_VARS: &[(ModelProvider, &[&str])] = &[
    (ModelProvider::OpenAi, &["OPENAI_API_KEY"]),
    (ModelProvider::Anthropic, &["ANTHROPIC_API_KEY"]),
    (ModelProvider::Google, &["GEMINI_API_KEY", "GOOGLE_API_KEY"]),
    (ModelProvider::Xai, &["XAI_API_KEY"]),
    (ModelProvider::OpenRouter, &["OPENROUTER_API_KEY"]),
    (ModelProvider::MoonshotAi, &["OPENROUTER_API_KEY"]),
    (ModelProvider::Groq, &["GROQ_API_KEY"]),
];

/// Order in which providers are consulted when picking a single recommended model.
const RECOMMENDATION_ORDER: &[ModelProvider] = &[
    ModelProvider::OpenAi,
    ModelProvider::Google,
    ModelProvider::Xai,
    ModelProvider::Anthropic,
    ModelProvider::MoonshotAi,
];

/// Providers whose credentials are present in the environment.
///
/// Keys are only checked for presence; the value is kept as a [`SecretString`] so it never
/// shows up in `Debug` output or logs.
#[derive(Debug, Default)]
pub struct ProviderAvailability {
    credentials: BTreeMap<ModelProvider, SecretString>,
}

impl ProviderAvailability {
    pub fn detect() -> Self {
        Self::detect_with(|var| std::env::var(var).ok())
    }

    pub fn detect_with(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut credentials = BTreeMap::new();

        for (provider, vars) in PROVIDER_ENV_VARS {
            let key = vars
                .iter()
                .filter_map(|var| lookup(var))
                .find(|value| !value.trim().is_empty());
            match key {
                Some(value) => {
                    credentials.insert(*provider, SecretString::from(value));
                }
                None => debug!(
                    event_name = "core.models.provider_missing_key",
                    provider = %provider,
                    "provider disabled, no API key configured"
                ),
            }
        }

        Self { credentials }
    }

    pub fn is_enabled(&self, provider: ModelProvider) -> bool {
        self.credentials.contains_key(&provider)
    }

    pub fn enabled_providers(&self) -> impl Iterator<Item = ModelProvider> + '_ {
        self.credentials.keys().copied()
    }

    pub fn credential(&self, provider: ModelProvider) -> Option<&SecretString> {
        self.credentials.get(&provider)
    }

    /// The model each provider recommends by default, when it has one.
    pub fn preferred_model(provider: ModelProvider) -> Option<&'static str> {
        match provider {
            ModelProvider::OpenAi => Some("gpt-5-mini"),
            ModelProvider::Google => Some("gemini-2.5-pro"),
            ModelProvider::Xai => Some("grok-4-fast"),
            ModelProvider::MoonshotAi => Some("kimi-k2"),
            ModelProvider::Anthropic | ModelProvider::OpenRouter | ModelProvider::Groq => None,
        }
    }

    /// Single recommended model across enabled providers, following the fixed provider order.
    pub fn recommended_model(&self) -> Option<&'static str> {
        RECOMMENDATION_ORDER
            .iter()
            .filter(|provider| self.is_enabled(**provider))
            .find_map(|provider| Self::preferred_model(*provider))
            .or_else(|| self.enabled_providers().find_map(Self::preferred_model))
    }

    pub fn describe_enabled(&self) -> String {
        let names: Vec<&str> = self.enabled_providers().map(ModelProvider::as_str).collect();
        if names.is_empty() {
            "none".to_string()
        } else {
            names.join(", ")
        }
    }
}
