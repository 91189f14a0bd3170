pub mod commands;
pub mod logging;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use logicall_core::config::{AppConfig, LoadOptions};

use crate::commands::resolve::ResolveArgs;

#[derive(Debug, Parser)]
#[command(
    name = "logicall",
    about = "Logicall voice agent operator CLI",
    long_about = "Inspect configuration, prepare the record store and dry-run profile and \
                  tool resolution for Logicall voice agents.",
    after_help = "Examples:\n  logicall config\n  logicall seed --tenant acme\n  \
                  logicall resolve --metadata '{\"profile_id\":\"default\"}'\n  \
                  logicall tools hang_up http:weather_current@1"
)]
pub struct Cli {
    #[arg(long, global = true, help = "Path to a logicall.toml config file")]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Inspect effective configuration values with source attribution")]
    Config,
    #[command(about = "Apply pending store migrations and return structured status output")]
    Migrate,
    #[command(about = "Write the default profile, presets and HTTP tools for a tenant")]
    Seed {
        #[arg(long, help = "Tenant to seed (defaults to agent.tenant_id)")]
        tenant: Option<String>,
    },
    #[command(about = "Resolve the profile, tools and session models a job would start with")]
    Resolve {
        #[arg(long, help = "Tenant to resolve for (defaults to agent.tenant_id)")]
        tenant: Option<String>,
        #[arg(long)]
        profile_id: Option<String>,
        #[arg(long)]
        profile_version: Option<String>,
        #[arg(long, help = "Room metadata JSON carrying profile_id/profile_version")]
        metadata: Option<String>,
    },
    #[command(about = "Resolve tool ids through the sandbox")]
    Tools {
        #[arg(required = true)]
        ids: Vec<String>,
    },
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();
    let options = || LoadOptions { config_path: cli.config.clone(), ..LoadOptions::default() };

    // Logging goes to stderr; a broken config is reported by the command.
    if let Ok(config) = AppConfig::load(options()) {
        logging::init(&config.logging);
    }

    let result = match cli.command {
        Command::Config => commands::config::run(options()),
        Command::Migrate => commands::migrate::run(options()),
        Command::Seed { tenant } => commands::seed::run(options(), tenant),
        Command::Resolve { tenant, profile_id, profile_version, metadata } => {
            commands::resolve::run(
                options(),
                ResolveArgs { tenant_id: tenant, profile_id, profile_version, metadata },
            )
        }
        Command::Tools { ids } => commands::tools::run(options(), ids),
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
