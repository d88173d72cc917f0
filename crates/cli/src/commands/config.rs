use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use loadout_core::config::{AppConfig, ConfigOverrides, LoadOptions};
use loadout_core::models::{ModelProvider, ProviderAvailability};
use secrecy::ExposeSecret;
use toml::Value;

/// One effective value with the env keys that may have set it.
struct Field {
    key_path: &'static str,
    env_keys: &'static [&'static str],
    value: String,
}

pub fn run(options: &LoadOptions) -> String {
    let config = match AppConfig::load(options.clone()) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };

    let config_file_path = detect_config_path(options.config_path.as_deref());
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());

    let mut lines = vec!["effective config (source precedence: flag > env > file > default):".to_string()];
    for field in fields(&config) {
        let source = match flag_for(field.key_path, &options.overrides) {
            Some(flag) => format!("flag ({flag})"),
            None => field_source(
                field.key_path,
                field.env_keys,
                config_file_doc.as_ref(),
                config_file_path.as_deref(),
            ),
        };
        lines.push(render_line(field.key_path, &field.value, source));
    }

    let availability = ProviderAvailability::detect();
    lines.push("provider credentials:".to_string());
    for provider in ModelProvider::ALL {
        let value = availability
            .credential(provider)
            .map(|key| redact_key(key.expose_secret()))
            .unwrap_or_else(|| "<unset>".to_string());
        lines.push(format!("- {} = {value}", provider.as_str()));
    }

    lines.join("\n")
}

fn fields(config: &AppConfig) -> Vec<Field> {
    vec![
        Field {
            key_path: "database.url",
            env_keys: &["LOADOUT_DATABASE_URL"],
            value: config.database.url.clone(),
        },
        Field {
            key_path: "database.max_connections",
            env_keys: &["LOADOUT_DATABASE_MAX_CONNECTIONS"],
            value: config.database.max_connections.to_string(),
        },
        Field {
            key_path: "database.timeout_secs",
            env_keys: &["LOADOUT_DATABASE_TIMEOUT_SECS"],
            value: config.database.timeout_secs.to_string(),
        },
        Field {
            key_path: "models.default_model",
            env_keys: &["LOADOUT_MODELS_DEFAULT_MODEL"],
            value: config.models.default_model.clone().unwrap_or_else(|| "<catalog default>".to_string()),
        },
        Field {
            key_path: "models.detect_providers",
            env_keys: &["LOADOUT_MODELS_DETECT_PROVIDERS"],
            value: config.models.detect_providers.to_string(),
        },
        Field {
            key_path: "models.disabled",
            env_keys: &["LOADOUT_MODELS_DISABLED"],
            value: format!("[{}]", config.models.disabled.join(", ")),
        },
        Field {
            key_path: "agents.flagship_model",
            env_keys: &["LOADOUT_AGENTS_FLAGSHIP_MODEL"],
            value: config.agents.flagship_model.clone(),
        },
        Field {
            key_path: "agents.guide_path",
            env_keys: &["LOADOUT_AGENTS_GUIDE_PATH"],
            value: config.agents.guide_path.display().to_string(),
        },
        Field {
            key_path: "agents.bridge_model",
            env_keys: &["LOADOUT_AGENTS_BRIDGE_MODEL"],
            value: config.agents.bridge_model.clone(),
        },
        Field {
            key_path: "logging.level",
            env_keys: &["LOADOUT_LOGGING_LEVEL", "LOADOUT_LOG_LEVEL"],
            value: config.logging.level.clone(),
        },
        Field {
            key_path: "logging.format",
            env_keys: &["LOADOUT_LOGGING_FORMAT", "LOADOUT_LOG_FORMAT"],
            value: format!("{:?}", config.logging.format),
        },
    ]
}

fn flag_for(key_path: &str, overrides: &ConfigOverrides) -> Option<&'static str> {
    let (flag, set) = match key_path {
        "database.url" => ("--database-url", overrides.database_url.is_some()),
        "logging.level" => ("--log-level", overrides.log_level.is_some()),
        "models.default_model" => ("--default-model", overrides.default_model.is_some()),
        "models.detect_providers" => ("--detect-providers", overrides.detect_providers.is_some()),
        "agents.guide_path" => ("--guide-path", overrides.guide_path.is_some()),
        _ => return None,
    };
    set.then_some(flag)
}

fn detect_config_path(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return path.exists().then(|| path.to_path_buf());
    }

    [PathBuf::from("loadout.toml"), PathBuf::from("config/loadout.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    key_path: &str,
    env_keys: &[&str],
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    if let Some(env_key) = env_keys.iter().find(|key| env::var_os(key).is_some()) {
        return format!("env ({env_key})");
    }

    if let Some(doc) = config_file_doc {
        if contains_path(doc, key_path) {
            let file_path = config_file_path
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "config file".to_string());
            return format!("file ({file_path})");
        }
    }

    "default".to_string()
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}

fn render_line(key: &str, value: &str, source: String) -> String {
    format!("- {key} = {value} (source: {source})")
}

fn redact_key(key: &str) -> String {
    let trimmed = key.trim();
    if trimmed.is_empty() {
        return "<empty>".to_string();
    }

    if let Some((prefix, _)) = trimmed.split_once('-') {
        return format!("{prefix}-***");
    }

    "<redacted>".to_string()
}

#[cfg(test)]
mod tests {
    use loadout_core::config::ConfigOverrides;

    use super::{contains_path, flag_for, redact_key};

    #[test]
    fn redaction_keeps_only_the_key_prefix() {
        assert_eq!(redact_key("sk-live-abcdef"), "sk-***");
        assert_eq!(redact_key("abcdef"), "<redacted>");
        assert_eq!(redact_key("   "), "<empty>");
    }

    #[test]
    fn command_line_overrides_are_attributed_to_their_flag() {
        let overrides = ConfigOverrides {
            database_url: Some("sqlite::memory:".to_string()),
            ..ConfigOverrides::default()
        };

        assert_eq!(flag_for("database.url", &overrides), Some("--database-url"));
        assert_eq!(flag_for("logging.level", &overrides), None);
        assert_eq!(flag_for("database.timeout_secs", &overrides), None);
    }

    #[test]
    fn dotted_paths_walk_nested_tables() {
        let doc: toml::Value = "[agents]\nguide_path = \"guide.md\"\n".parse().expect("toml");

        assert!(contains_path(&doc, "agents.guide_path"));
        assert!(!contains_path(&doc, "agents.bridge_model"));
        assert!(!contains_path(&doc, "database.url"));
    }
}
