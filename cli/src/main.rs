// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! # Anchor Provisioner CLI
//!
//! The `anchor` binary drives the provisioning engine directly: it deploys
//! and manages containerised Minecraft servers, installs modpacks into data
//! directories, and runs the maintenance loop.
//!
//! ## Commands
//!
//! - `anchor server create|list|status|start|stop|delete|client` - Server lifecycle
//! - `anchor pack install|defaults|manifest` - Modpack tooling against plain directories
//! - `anchor files ls|cat|mkdir|rm|upload` - Server data volume access
//! - `anchor config show|validate|generate` - Configuration management
//! - `anchor daemon` - Missing-container sweeps and task/clipboard expiry

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::PathBuf;

use anchor_provisioner::commands::{
    self, ConfigCommand, DaemonArgs, FilesCommand, PackCommand, ServerCommand,
};
use anchor_provisioner_core::domain::config::ProvisionerConfigManifest;

/// Anchor - Minecraft server deployment and modpack provisioning
#[derive(Parser)]
#[command(name = "anchor")]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Path to configuration file (overrides discovery)
    #[arg(
        short,
        long,
        global = true,
        env = "ANCHOR_CONFIG_PATH",
        value_name = "FILE"
    )]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error); defaults to the configured level
    #[arg(long, global = true, env = "ANCHOR_LOG_LEVEL")]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Deploy and manage servers
    #[command(name = "server")]
    Server {
        #[command(subcommand)]
        command: ServerCommand,
    },

    /// Modpack installation tooling
    #[command(name = "pack")]
    Pack {
        #[command(subcommand)]
        command: PackCommand,
    },

    /// Browse and edit a server's data volume
    #[command(name = "files")]
    Files {
        #[command(subcommand)]
        command: FilesCommand,
    },

    /// Configuration management
    #[command(name = "config")]
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },

    /// Run the maintenance loop
    #[command(name = "daemon")]
    Daemon {
        #[command(flatten)]
        args: DaemonArgs,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    init_logging(cli.config.clone(), cli.log_level.as_deref())?;

    match cli.command {
        Some(Commands::Server { command }) => {
            commands::server::handle_command(command, cli.config).await
        }
        Some(Commands::Pack { command }) => commands::pack::handle_command(command).await,
        Some(Commands::Files { command }) => {
            commands::files::handle_command(command, cli.config).await
        }
        Some(Commands::Config { command }) => {
            commands::config::handle_command(command, cli.config).await
        }
        Some(Commands::Daemon { args }) => commands::daemon::run(args, cli.config).await,
        None => {
            eprintln!("{}", "No command specified. Use --help for usage.".yellow());
            std::process::exit(1);
        }
    }
}

/// Initialize tracing subscriber for logging
///
/// `RUST_LOG` wins over `--log-level`, which wins over the configured level.
/// The configured format selects compact text or JSON lines.
fn init_logging(config_path: Option<PathBuf>, level_override: Option<&str>) -> Result<()> {
    let logging = ProvisionerConfigManifest::from_yaml_file_or_default(config_path).logging();
    let level = level_override.unwrap_or(&logging.level);

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(level))
        .context("Failed to create log filter")?;

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false);

    if logging.format.eq_ignore_ascii_case("json") {
        builder.json().init();
    } else {
        builder.compact().init();
    }

    Ok(())
}
