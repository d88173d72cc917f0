use std::env;
use std::sync::{Mutex, OnceLock};

use chrono::{Duration, Utc};
use serde_json::Value;
use tempfile::TempDir;

use loadout_cli::commands::{config, doctor, install, migrate, models, resolve, tools};
use loadout_core::config::LoadOptions;
use loadout_core::domain::agent::{AccountId, AccountRecord};
use loadout_db::repositories::{AccountRepository, SqlAccountRepository};
use loadout_db::{connect, migrations};

#[test]
fn migrate_returns_success_with_valid_env() {
    with_env(&[("LOADOUT_DATABASE_URL", "sqlite::memory:")], || {
        let result = migrate::run(&options());
        assert_eq!(result.exit_code, 0, "expected successful migrate run");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "migrate");
        assert_eq!(payload["status"], "ok");
    });
}

#[test]
fn migrate_returns_config_failure_for_non_sqlite_url() {
    with_env(&[("LOADOUT_DATABASE_URL", "postgres://localhost/loadout")], || {
        let result = migrate::run(&options());
        assert_eq!(result.exit_code, 2, "expected config validation failure code");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "migrate");
        assert_eq!(payload["status"], "error");
        assert_eq!(payload["error_class"], "config_validation");
    });
}

#[test]
fn install_user_is_idempotent_and_counted_by_stats() {
    let database = SeededDatabase::new(&[("acct-1", true)]);
    with_env(&[("LOADOUT_DATABASE_URL", database.url.as_str())], || {
        let first = install::install_user(&options(), "loadout_default", "acct-1", false);
        assert_eq!(first.exit_code, 0, "expected install success: {}", first.output);
        let first_payload = parse_payload(&first.output);
        assert_eq!(first_payload["command"], "install-user");
        assert_eq!(first_payload["data"]["account_id"], "acct-1");

        let second = install::install_user(&options(), "loadout_default", "acct-1", false);
        let second_payload = parse_payload(&second.output);
        assert_eq!(second_payload["data"]["agent_id"], first_payload["data"]["agent_id"]);

        let stats = install::stats(&options(), "loadout_default");
        assert_eq!(stats.exit_code, 0);
        assert_eq!(parse_payload(&stats.output)["data"]["total_agents"], 1);

        let bridge_stats = install::stats(&options(), "code_bridge");
        assert_eq!(parse_payload(&bridge_stats.output)["data"]["total_agents"], 0);
    });
}

#[test]
fn install_user_replace_creates_a_new_instance() {
    let database = SeededDatabase::new(&[("acct-1", true)]);
    with_env(&[("LOADOUT_DATABASE_URL", database.url.as_str())], || {
        let first = parse_payload(
            &install::install_user(&options(), "code_bridge", "acct-1", false).output,
        );
        let replaced =
            parse_payload(&install::install_user(&options(), "code_bridge", "acct-1", true).output);

        assert_eq!(replaced["status"], "ok");
        assert_ne!(replaced["data"]["agent_id"], first["data"]["agent_id"]);

        let stats = install::stats(&options(), "code_bridge");
        assert_eq!(parse_payload(&stats.output)["data"]["total_agents"], 1);
    });
}

#[test]
fn install_reports_not_found_for_unknown_account_and_agent_key() {
    let database = SeededDatabase::new(&[]);
    with_env(&[("LOADOUT_DATABASE_URL", database.url.as_str())], || {
        let missing_account = install::install_user(&options(), "loadout_default", "ghost", false);
        assert_eq!(missing_account.exit_code, 6);
        assert_eq!(parse_payload(&missing_account.output)["error_class"], "not_found");

        let unknown_key = install::stats(&options(), "nope");
        assert_eq!(unknown_key.exit_code, 6);
        let payload = parse_payload(&unknown_key.output);
        assert_eq!(payload["error_class"], "unknown_agent");
        assert!(payload["message"].as_str().unwrap_or_default().contains("loadout_default"));
    });
}

#[test]
fn install_all_covers_personal_accounts_only() {
    let database = SeededDatabase::new(&[("acct-1", true), ("acct-2", true), ("team", false)]);
    with_env(&[("LOADOUT_DATABASE_URL", database.url.as_str())], || {
        let result = install::install_all(&options(), "loadout_default");
        assert_eq!(result.exit_code, 0, "expected bulk install success: {}", result.output);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "install-all");
        assert_eq!(payload["data"]["total_missing"], 2);
        assert_eq!(payload["data"]["installed"], serde_json::json!(["acct-1", "acct-2"]));
        assert_eq!(payload["data"]["failed"], serde_json::json!([]));

        let rerun = parse_payload(&install::install_all(&options(), "loadout_default").output);
        assert_eq!(rerun["data"]["total_missing"], 0);
    });
}

#[test]
fn resolve_returns_model_and_enabled_tools() {
    let database = SeededDatabase::new(&[("acct-1", true)]);
    with_env(&[("LOADOUT_DATABASE_URL", database.url.as_str())], || {
        let installed =
            parse_payload(&install::install_user(&options(), "loadout_default", "acct-1", false).output);
        let agent_id = installed["data"]["agent_id"].as_str().expect("agent id").to_string();

        let result = resolve::run(&options(), &agent_id);
        assert_eq!(result.exit_code, 0, "expected resolve success: {}", result.output);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["data"]["model_id"], "claude-sonnet-4-5");
        assert_eq!(payload["data"]["config"]["centrally_managed"], true);
        let tools = payload["data"]["tools"].as_array().expect("tools");
        assert!(tools.iter().any(|tool| tool == "get_current_agent_config"));

        let missing = resolve::run(&options(), "missing-agent");
        assert_eq!(missing.exit_code, 6);
        let failure = parse_payload(&missing.output);
        assert_eq!(failure["error_class"], "not_found");
        assert!(failure["message"]
            .as_str()
            .unwrap_or_default()
            .starts_with("agent `missing-agent` was not found."));
        assert!(failure["correlation_id"].as_str().is_some_and(|id| id.starts_with("resolve-")));
    });
}

#[test]
fn models_hide_disabled_entries_unless_requested() {
    with_env(&[("LOADOUT_MODELS_DISABLED", "kimi-k2")], || {
        let enabled = parse_payload(&models::run(&options(), false).output);
        assert_eq!(enabled["status"], "ok");
        assert_eq!(enabled["data"]["default_model"], "claude-sonnet-4-5");
        assert!(!model_ids(&enabled).contains(&"kimi-k2".to_string()));

        let all = parse_payload(&models::run(&options(), true).output);
        assert!(model_ids(&all).contains(&"kimi-k2".to_string()));
    });
}

#[test]
fn tools_lists_capabilities_with_examples() {
    with_env(&[], || {
        let result = tools::run(&options(), true);
        assert_eq!(result.exit_code, 0);

        let payload = parse_payload(&result.output);
        let listed = payload["data"]["tools"].as_array().expect("tools");
        assert!(listed.iter().any(|tool| tool["function_name"] == "list_available_models"));
        let example = payload["data"]["examples"]["get_current_agent_config"]
            .as_str()
            .expect("usage example");
        assert!(example.contains("agent_id"));
    });
}

#[test]
fn doctor_json_reports_each_check() {
    let guide_dir = TempDir::new().expect("tempdir");
    let missing_guide = guide_dir.path().join("missing.md");
    let guide = missing_guide.to_string_lossy().into_owned();
    with_env(
        &[("LOADOUT_DATABASE_URL", "sqlite::memory:"), ("LOADOUT_AGENTS_GUIDE_PATH", guide.as_str())],
        || {
            let output = doctor::run(&options(), true);
            let report = parse_payload(&output);

            assert_eq!(report["overall_status"], "pass");
            let checks = report["checks"].as_array().expect("checks");
            let status_of = |name: &str| {
                checks
                    .iter()
                    .find(|check| check["name"] == name)
                    .map(|check| check["status"].clone())
                    .unwrap_or(Value::Null)
            };
            assert_eq!(status_of("config_validation"), "pass");
            assert_eq!(status_of("model_catalog"), "pass");
            assert_eq!(status_of("guide_file"), "warn");
            assert_eq!(status_of("database_connectivity"), "pass");
        },
    );
}

#[test]
fn doctor_skips_dependent_checks_when_config_fails() {
    with_env(&[("LOADOUT_DATABASE_TIMEOUT_SECS", "0")], || {
        let report = parse_payload(&doctor::run(&options(), true));

        assert_eq!(report["overall_status"], "fail");
        let statuses: Vec<&str> = report["checks"]
            .as_array()
            .expect("checks")
            .iter()
            .filter_map(|check| check["status"].as_str())
            .collect();
        assert_eq!(statuses, vec!["fail", "skipped", "skipped", "skipped"]);
    });
}

#[test]
fn config_attributes_env_sources() {
    with_env(&[("LOADOUT_DATABASE_URL", "sqlite::memory:")], || {
        let output = config::run(&options());

        assert!(output.contains("- database.url = sqlite::memory: (source: env (LOADOUT_DATABASE_URL))"));
        assert!(output.contains("- logging.level = info (source: default)"));
        assert!(output.contains("provider credentials:"));
    });
}

fn options() -> LoadOptions {
    LoadOptions::default()
}

fn model_ids(payload: &Value) -> Vec<String> {
    payload["data"]["models"]
        .as_array()
        .expect("models")
        .iter()
        .filter_map(|model| model["id"].as_str().map(str::to_owned))
        .collect()
}

/// File-backed database with migrations applied and the given accounts inserted.
struct SeededDatabase {
    _dir: TempDir,
    url: String,
}

impl SeededDatabase {
    fn new(accounts: &[(&str, bool)]) -> Self {
        let dir = TempDir::new().expect("tempdir");
        let url = format!("sqlite://{}", dir.path().join("loadout.db").display());

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .expect("runtime");
        runtime.block_on(async {
            let pool = connect(&url).await.expect("connect");
            migrations::run_pending(&pool).await.expect("migrate");
            let repository = SqlAccountRepository::new(pool.clone());
            let start = Utc::now();
            for (offset, (id, personal)) in accounts.iter().enumerate() {
                repository
                    .save(AccountRecord {
                        id: AccountId((*id).to_string()),
                        name: format!("Account {id}"),
                        personal_account: *personal,
                        created_at: start + Duration::seconds(offset as i64),
                    })
                    .await
                    .expect("save account");
            }
            pool.close().await;
        });

        Self { _dir: dir, url }
    }
}

fn parse_payload(output: &str) -> Value {
    serde_json::from_str(output).expect("command output should be valid JSON")
}

fn with_env(vars: &[(&str, &str)], test_fn: impl FnOnce()) {
    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    let _guard =
        ENV_LOCK.get_or_init(|| Mutex::new(())).lock().expect("env mutex should not be poisoned");

    let keys = [
        "LOADOUT_DATABASE_URL",
        "LOADOUT_DATABASE_MAX_CONNECTIONS",
        "LOADOUT_DATABASE_TIMEOUT_SECS",
        "LOADOUT_MODELS_DEFAULT_MODEL",
        "LOADOUT_MODELS_DETECT_PROVIDERS",
        "LOADOUT_MODELS_DISABLED",
        "LOADOUT_AGENTS_FLAGSHIP_MODEL",
        "LOADOUT_AGENTS_GUIDE_PATH",
        "LOADOUT_AGENTS_BRIDGE_MODEL",
        "LOADOUT_LOGGING_LEVEL",
        "LOADOUT_LOGGING_FORMAT",
        "LOADOUT_LOG_LEVEL",
        "LOADOUT_LOG_FORMAT",
    ];

    let previous_values: Vec<(&str, Option<String>)> =
        keys.iter().map(|key| (*key, env::var(key).ok())).collect();

    for key in &keys {
        env::remove_var(key);
    }
    for (key, value) in vars {
        env::set_var(key, value);
    }

    let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(test_fn));

    for (key, previous) in previous_values {
        match previous {
            Some(value) => env::set_var(key, value),
            None => env::remove_var(key),
        }
    }

    if let Err(panic) = outcome {
        std::panic::resume_unwind(panic);
    }
}
