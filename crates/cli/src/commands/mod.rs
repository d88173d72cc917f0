pub mod config;
pub mod doctor;
pub mod install;
pub mod migrate;
pub mod models;
pub mod resolve;
pub mod tools;

use serde::Serialize;
use serde_json::Value;

use loadout_core::config::{AppConfig, LoadOptions};
use loadout_core::errors::{ApplicationError, InterfaceError};
use loadout_db::{connect_from_config, migrations, DbPool};

pub const EXIT_CONFIG: u8 = 2;
pub const EXIT_RUNTIME: u8 = 3;
pub const EXIT_DATABASE: u8 = 4;
pub const EXIT_OPERATION: u8 = 5;
pub const EXIT_NOT_FOUND: u8 = 6;

#[derive(Debug, Clone)]
pub struct CommandResult {
    pub exit_code: u8,
    pub output: String,
}

#[derive(Debug, Serialize)]
struct CommandOutcome {
    command: String,
    status: String,
    error_class: Option<String>,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    correlation_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<Value>,
}

impl CommandResult {
    pub fn success(command: &str, message: impl Into<String>) -> Self {
        Self::success_with_data(command, message, None)
    }

    pub fn success_with_data(command: &str, message: impl Into<String>, data: Option<Value>) -> Self {
        let payload = CommandOutcome {
            command: command.to_string(),
            status: "ok".to_string(),
            error_class: None,
            message: message.into(),
            correlation_id: None,
            data,
        };
        Self { exit_code: 0, output: serialize_payload(payload) }
    }

    pub fn failure(
        command: &str,
        error_class: &str,
        message: impl Into<String>,
        exit_code: u8,
    ) -> Self {
        Self::failure_with_correlation(command, error_class, message, exit_code, None)
    }

    fn failure_with_correlation(
        command: &str,
        error_class: &str,
        message: impl Into<String>,
        exit_code: u8,
        correlation_id: Option<String>,
    ) -> Self {
        let payload = CommandOutcome {
            command: command.to_string(),
            status: "error".to_string(),
            error_class: Some(error_class.to_string()),
            message: message.into(),
            correlation_id,
            data: None,
        };
        Self { exit_code, output: serialize_payload(payload) }
    }
}

/// A failed step inside a command, before it is rendered as a [`CommandResult`].
#[derive(Debug)]
pub(crate) struct CommandFailure {
    pub error_class: &'static str,
    pub message: String,
    pub exit_code: u8,
    pub correlation_id: Option<String>,
}

impl CommandFailure {
    pub(crate) fn new(error_class: &'static str, message: impl Into<String>, exit_code: u8) -> Self {
        Self { error_class, message: message.into(), exit_code, correlation_id: None }
    }

    /// Maps an application error through the interface layer. The correlation id names the
    /// command and this process so the failure can be matched with its log lines.
    pub(crate) fn from_application(command: &str, error: impl Into<ApplicationError>) -> Self {
        let error = error.into();
        let detail = error.to_string();
        let interface = error.into_interface(format!("{command}-{}", std::process::id()));
        let (error_class, exit_code) = match &interface {
            InterfaceError::NotFound { .. } => ("not_found", EXIT_NOT_FOUND),
            InterfaceError::BadRequest { .. } => ("rejected", EXIT_OPERATION),
            InterfaceError::ServiceUnavailable { .. } => ("persistence", EXIT_OPERATION),
        };

        Self {
            error_class,
            message: format!("{detail}. {}", interface.user_message()),
            exit_code,
            correlation_id: Some(interface.correlation_id().to_string()),
        }
    }

    pub(crate) fn into_result(self, command: &str) -> CommandResult {
        CommandResult::failure_with_correlation(
            command,
            self.error_class,
            self.message,
            self.exit_code,
            self.correlation_id,
        )
    }
}

pub(crate) fn load_config(options: &LoadOptions) -> Result<AppConfig, CommandFailure> {
    AppConfig::load(options.clone()).map_err(|error| {
        CommandFailure::new("config_validation", format!("configuration issue: {error}"), EXIT_CONFIG)
    })
}

pub(crate) fn async_runtime() -> Result<tokio::runtime::Runtime, CommandFailure> {
    tokio::runtime::Builder::new_current_thread().enable_all().build().map_err(|error| {
        CommandFailure::new(
            "runtime_init",
            format!("failed to initialize async runtime: {error}"),
            EXIT_RUNTIME,
        )
    })
}

/// Connects and brings the schema up to date. Every command that touches agent data goes
/// through here.
pub(crate) async fn open_database(config: &AppConfig) -> Result<DbPool, CommandFailure> {
    let pool = connect_from_config(&config.database)
        .await
        .map_err(|error| CommandFailure::new("db_connectivity", error.to_string(), EXIT_DATABASE))?;
    migrations::run_pending(&pool)
        .await
        .map_err(|error| CommandFailure::new("migration", error.to_string(), EXIT_OPERATION))?;
    Ok(pool)
}

pub(crate) fn to_data(value: &impl Serialize) -> Result<Value, CommandFailure> {
    serde_json::to_value(value)
        .map_err(|error| CommandFailure::new("serialization", error.to_string(), EXIT_OPERATION))
}

fn serialize_payload(payload: CommandOutcome) -> String {
    serde_json::to_string(&payload).unwrap_or_else(|error| {
        format!(
            "{{\"command\":\"unknown\",\"status\":\"error\",\"error_class\":\"serialization\",\"message\":\"{}\"}}",
            error.to_string().replace('\\', "\\\\").replace('"', "\\\"")
        )
    })
}
