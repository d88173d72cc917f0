use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub models: ModelsConfig,
    pub agents: AgentsConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct ModelsConfig {
    /// Model used when an agent has none configured. Falls back to the catalog default.
    pub default_model: Option<String>,
    /// Disable models whose provider has no API key in the environment.
    pub detect_providers: bool,
    pub disabled: Vec<String>,
}

#[derive(Clone, Debug)]
pub struct AgentsConfig {
    pub flagship_model: String,
    /// Guide appended to the bridge agent's prompt. Read on every resolution.
    pub guide_path: PathBuf,
    pub bridge_model: String,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub database_url: Option<String>,
    pub log_level: Option<String>,
    pub default_model: Option<String>,
    pub detect_providers: Option<bool>,
    pub guide_path: Option<PathBuf>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: "sqlite://loadout.db".to_string(),
                max_connections: 5,
                timeout_secs: 30,
            },
            models: ModelsConfig { default_model: None, detect_providers: false, disabled: Vec::new() },
            agents: AgentsConfig {
                flagship_model: "claude-sonnet-4-5".to_string(),
                guide_path: PathBuf::from("guides/code-bridge.md"),
                bridge_model: "claude-sonnet-4-5".to_string(),
            },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("loadout.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(database) = patch.database {
            if let Some(url) = database.url {
                self.database.url = url;
            }
            if let Some(max_connections) = database.max_connections {
                self.database.max_connections = max_connections;
            }
            if let Some(timeout_secs) = database.timeout_secs {
                self.database.timeout_secs = timeout_secs;
            }
        }

        if let Some(models) = patch.models {
            if let Some(default_model) = models.default_model {
                self.models.default_model = Some(default_model);
            }
            if let Some(detect_providers) = models.detect_providers {
                self.models.detect_providers = detect_providers;
            }
            if let Some(disabled) = models.disabled {
                self.models.disabled = disabled;
            }
        }

        if let Some(agents) = patch.agents {
            if let Some(flagship_model) = agents.flagship_model {
                self.agents.flagship_model = flagship_model;
            }
            if let Some(guide_path) = agents.guide_path {
                self.agents.guide_path = guide_path;
            }
            if let Some(bridge_model) = agents.bridge_model {
                self.agents.bridge_model = bridge_model;
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("LOADOUT_DATABASE_URL") {
            self.database.url = value;
        }
        if let Some(value) = read_env("LOADOUT_DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections = parse_u32("LOADOUT_DATABASE_MAX_CONNECTIONS", &value)?;
        }
        if let Some(value) = read_env("LOADOUT_DATABASE_TIMEOUT_SECS") {
            self.database.timeout_secs = parse_u64("LOADOUT_DATABASE_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("LOADOUT_MODELS_DEFAULT_MODEL") {
            self.models.default_model = Some(value);
        }
        if let Some(value) = read_env("LOADOUT_MODELS_DETECT_PROVIDERS") {
            self.models.detect_providers = parse_bool("LOADOUT_MODELS_DETECT_PROVIDERS", &value)?;
        }
        if let Some(value) = read_env("LOADOUT_MODELS_DISABLED") {
            self.models.disabled = split_list(&value);
        }

        if let Some(value) = read_env("LOADOUT_AGENTS_FLAGSHIP_MODEL") {
            self.agents.flagship_model = value;
        }
        if let Some(value) = read_env("LOADOUT_AGENTS_GUIDE_PATH") {
            self.agents.guide_path = PathBuf::from(value);
        }
        if let Some(value) = read_env("LOADOUT_AGENTS_BRIDGE_MODEL") {
            self.agents.bridge_model = value;
        }

        let log_level = read_env("LOADOUT_LOGGING_LEVEL").or_else(|| read_env("LOADOUT_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("LOADOUT_LOGGING_FORMAT").or_else(|| read_env("LOADOUT_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(database_url) = overrides.database_url {
            self.database.url = database_url;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(default_model) = overrides.default_model {
            self.models.default_model = Some(default_model);
        }
        if let Some(detect_providers) = overrides.detect_providers {
            self.models.detect_providers = detect_providers;
        }
        if let Some(guide_path) = overrides.guide_path {
            self.agents.guide_path = guide_path;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_database(&self.database)?;
        validate_models(&self.models)?;
        validate_agents(&self.agents)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("loadout.toml"), PathBuf::from("config/loadout.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn validate_database(database: &DatabaseConfig) -> Result<(), ConfigError> {
    let url = database.url.trim();
    let sqlite_url =
        url.starts_with("sqlite://") || url.starts_with("sqlite::") || url == ":memory:";
    if !sqlite_url {
        return Err(ConfigError::Validation(
            "database.url must be a sqlite URL (`sqlite://...`, `sqlite::...`, or `:memory:`)"
                .to_string(),
        ));
    }

    if database.max_connections == 0 {
        return Err(ConfigError::Validation(
            "database.max_connections must be greater than zero".to_string(),
        ));
    }

    if database.timeout_secs == 0 || database.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "database.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    Ok(())
}

fn validate_models(models: &ModelsConfig) -> Result<(), ConfigError> {
    if models.default_model.as_deref().is_some_and(|model| model.trim().is_empty()) {
        return Err(ConfigError::Validation(
            "models.default_model must not be blank when set".to_string(),
        ));
    }

    if models.disabled.iter().any(|model| model.trim().is_empty()) {
        return Err(ConfigError::Validation(
            "models.disabled must not contain blank model ids".to_string(),
        ));
    }

    Ok(())
}

fn validate_agents(agents: &AgentsConfig) -> Result<(), ConfigError> {
    if agents.flagship_model.trim().is_empty() {
        return Err(ConfigError::Validation("agents.flagship_model is required".to_string()));
    }
    if agents.bridge_model.trim().is_empty() {
        return Err(ConfigError::Validation("agents.bridge_model is required".to_string()));
    }
    if agents.guide_path.as_os_str().is_empty() {
        return Err(ConfigError::Validation("agents.guide_path is required".to_string()));
    }

    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(str::to_string)
        .collect()
}

fn parse_u32(key: &str, value: &str) -> Result<u32, ConfigError> {
    value.parse::<u32>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.parse::<u64>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    value.parse::<bool>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    database: Option<DatabasePatch>,
    models: Option<ModelsPatch>,
    agents: Option<AgentsPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct DatabasePatch {
    url: Option<String>,
    max_connections: Option<u32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct ModelsPatch {
    default_model: Option<String>,
    detect_providers: Option<bool>,
    disabled: Option<Vec<String>>,
}

#[derive(Debug, Default, Deserialize)]
struct AgentsPatch {
    flagship_model: Option<String>,
    guide_path: Option<PathBuf>,
    bridge_model: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}
