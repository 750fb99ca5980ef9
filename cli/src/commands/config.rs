// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Configuration management commands
//!
//! Commands: show, validate, generate

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::Colorize;
use std::path::PathBuf;

use anchor_provisioner_core::domain::config::ProvisionerConfigManifest;

#[derive(Subcommand)]
pub enum ConfigCommand {
    /// Show current configuration
    Show {
        /// Show config file paths checked
        #[arg(long)]
        paths: bool,

        /// Print the effective manifest as YAML
        #[arg(long)]
        yaml: bool,
    },

    /// Validate configuration file
    Validate {
        /// Path to config file (default: discover)
        #[arg(value_name = "FILE")]
        file: Option<PathBuf>,
    },

    /// Generate a configuration file populated with defaults
    Generate {
        /// Output path (default: ./anchor-config.yaml)
        #[arg(short, long, default_value = "./anchor-config.yaml")]
        output: PathBuf,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

pub async fn handle_command(
    command: ConfigCommand,
    config_override: Option<PathBuf>,
) -> Result<()> {
    match command {
        ConfigCommand::Show { paths, yaml } => show(config_override, paths, yaml).await,
        ConfigCommand::Validate { file } => validate(file.or(config_override)).await,
        ConfigCommand::Generate { output, force } => generate(output, force).await,
    }
}

async fn show(config_override: Option<PathBuf>, show_paths: bool, as_yaml: bool) -> Result<()> {
    let config = ProvisionerConfigManifest::load_or_default(config_override.clone())
        .context("Failed to load configuration")?;

    if show_paths {
        println!("{}", "Configuration discovery paths:".bold());
        if let Some(path) = &config_override {
            println!("  1. --config flag: {}", path.display());
        } else {
            println!("  1. --config flag: {}", "(not set)".dimmed());
        }
        println!(
            "  2. ANCHOR_CONFIG_PATH: {}",
            std::env::var("ANCHOR_CONFIG_PATH")
                .unwrap_or_else(|_| "(not set)".to_string())
                .dimmed()
        );
        println!("  3. ./anchor-config.yaml");
        println!("  4. ~/.anchor/config.yaml");
        println!("  5. /etc/anchor/config.yaml");
        println!();
    }

    if as_yaml {
        print!("{}", serde_yaml::to_string(&config)?);
        return Ok(());
    }

    let spec = &config.spec;
    println!("{}", "Current configuration:".bold());
    println!();

    println!("{}", "Node:".bold());
    println!("  Name: {}", config.metadata.name);
    println!();

    println!("{}", "Storage:".bold());
    println!("  Servers root: {}", spec.storage.servers_root.display());
    println!("  Backend: {:?}", spec.storage.backend);
    if spec.storage.database_url.is_some() {
        println!("  Database URL: {}", "(set)".dimmed());
    }
    println!();

    println!("{}", "Runtime:".bold());
    println!(
        "  Docker socket: {}",
        spec.runtime.docker_socket.as_deref().unwrap_or("(platform default)")
    );
    println!("  Image repository: {}", spec.runtime.image_repository);
    println!("  Container port: {}", spec.runtime.container_port);
    println!("  Ping timeout: {}s", spec.runtime.ping_timeout_secs);
    println!("  Stop timeout: {}s", spec.runtime.stop_timeout_secs);
    println!();

    println!("{}", "Ports:".bold());
    println!("  Range: {}-{}", spec.ports.range_start, spec.ports.range_end);
    println!("  Attempts: {}", spec.ports.max_attempts);
    println!("  Public host: {}", spec.ports.public_host);
    println!();

    println!("{}", "Maintenance:".bold());
    println!("  Sweep interval: {}s", spec.maintenance.sweep_interval_secs);
    println!("  Clipboard TTL: {}s", spec.maintenance.clipboard_ttl_secs);
    println!("  Task retention: {}s", spec.maintenance.task_retention_secs);
    println!();

    let logging = config.logging();
    println!("{}", "Logging:".bold());
    println!("  Level: {}", logging.level);
    println!("  Format: {}", logging.format);

    Ok(())
}

async fn validate(config_path: Option<PathBuf>) -> Result<()> {
    println!("Validating configuration...");

    let config = ProvisionerConfigManifest::load_or_default(config_path)
        .context("Failed to load configuration")?;

    config
        .validate()
        .context("Configuration validation failed")?;

    println!("{}", "✓ Configuration is valid".green());

    Ok(())
}

async fn generate(output: PathBuf, force: bool) -> Result<()> {
    if output.exists() && !force {
        anyhow::bail!(
            "{} already exists; pass --force to overwrite",
            output.display()
        );
    }

    ProvisionerConfigManifest::default()
        .to_yaml_file(&output)
        .with_context(|| format!("Failed to write config to {:?}", output))?;

    println!(
        "{}",
        format!("✓ Configuration generated: {}", output.display()).green()
    );

    Ok(())
}
