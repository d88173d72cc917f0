pub mod commands;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use loadout_core::config::{AppConfig, ConfigOverrides, LoadOptions, LogFormat, LoggingConfig};

#[derive(Debug, Parser)]
#[command(
    name = "loadout",
    about = "Loadout operator CLI",
    long_about = "Install centrally managed agents, inspect the model catalog, resolve agent configuration, and check runtime readiness.",
    after_help = "Examples:\n  loadout install-all --agent loadout_default\n  loadout install-user acct-123 --agent code_bridge --replace\n  loadout resolve 6f1c...\n  loadout doctor --json"
)]
pub struct Cli {
    #[command(flatten)]
    global: GlobalArgs,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Args)]
struct GlobalArgs {
    #[arg(long, global = true, help = "Config file path (defaults to loadout.toml or config/loadout.toml)")]
    config: Option<PathBuf>,
    #[arg(long, global = true, help = "Override database.url")]
    database_url: Option<String>,
    #[arg(long, global = true, help = "Override logging.level")]
    log_level: Option<String>,
    #[arg(long, global = true, help = "Override models.default_model")]
    default_model: Option<String>,
    #[arg(long, global = true, help = "Override models.detect_providers")]
    detect_providers: Option<bool>,
    #[arg(long, global = true, help = "Override agents.guide_path")]
    guide_path: Option<PathBuf>,
}

impl GlobalArgs {
    fn load_options(self) -> LoadOptions {
        LoadOptions {
            require_file: self.config.is_some(),
            config_path: self.config,
            overrides: ConfigOverrides {
                database_url: self.database_url,
                log_level: self.log_level,
                default_model: self.default_model,
                detect_providers: self.detect_providers,
                guide_path: self.guide_path,
            },
        }
    }
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Install a managed agent for every personal account that lacks it")]
    InstallAll {
        #[arg(long, help = "Managed agent key, e.g. loadout_default or code_bridge")]
        agent: String,
    },
    #[command(about = "Ensure one account has a managed agent instance")]
    InstallUser {
        account_id: String,
        #[arg(long, help = "Managed agent key")]
        agent: String,
        #[arg(long, help = "Delete the existing instance and install a fresh one")]
        replace: bool,
    },
    #[command(about = "Count installed instances of a managed agent")]
    Stats {
        #[arg(long, help = "Managed agent key")]
        agent: String,
    },
    #[command(about = "List catalog models with capabilities and pricing")]
    Models {
        #[arg(long, help = "Include disabled models")]
        all: bool,
    },
    #[command(about = "Resolve an agent's effective configuration and model for a run")]
    Resolve { agent_id: String },
    #[command(about = "List registered capabilities")]
    Tools {
        #[arg(long, help = "Include a usage example per function")]
        examples: bool,
    },
    #[command(about = "Apply pending database migrations and return structured status output")]
    Migrate,
    #[command(about = "Inspect effective configuration values with source attribution and redaction")]
    Config,
    #[command(about = "Validate config, model catalog, guide file, and DB connectivity")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();
    let options = cli.global.load_options();

    let logging = AppConfig::load(options.clone())
        .map(|config| config.logging)
        .unwrap_or_else(|_| AppConfig::default().logging);
    init_logging(&logging);

    let result = match cli.command {
        Command::InstallAll { agent } => commands::install::install_all(&options, &agent),
        Command::InstallUser { account_id, agent, replace } => {
            commands::install::install_user(&options, &agent, &account_id, replace)
        }
        Command::Stats { agent } => commands::install::stats(&options, &agent),
        Command::Models { all } => commands::models::run(&options, all),
        Command::Resolve { agent_id } => commands::resolve::run(&options, &agent_id),
        Command::Tools { examples } => commands::tools::run(&options, examples),
        Command::Migrate => commands::migrate::run(&options),
        Command::Config => {
            commands::CommandResult { exit_code: 0, output: commands::config::run(&options) }
        }
        Command::Doctor { json } => {
            commands::CommandResult { exit_code: 0, output: commands::doctor::run(&options, json) }
        }
    };

    if result.exit_code != 0 {
        tracing::warn!(
            event_name = "cli.command.failed",
            exit_code = result.exit_code,
            "command finished with an error"
        );
    }

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}

/// Logs go to stderr so stdout carries only the command payload. `RUST_LOG` wins over the
/// configured level.
pub fn init_logging(logging: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(logging.level.trim().to_ascii_lowercase()));
    let builder =
        tracing_subscriber::fmt().with_target(false).with_writer(std::io::stderr).with_env_filter(filter);

    let _ = match logging.format {
        LogFormat::Compact => builder.compact().try_init(),
        LogFormat::Pretty => builder.pretty().try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
}
