// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Modpack commands
//!
//! Work directly on directories, without Docker or a server record.
//! Commands: install, defaults, manifest

use anyhow::{anyhow, Context, Result};
use clap::Subcommand;
use colored::Colorize;
use std::path::PathBuf;

use crate::context;

#[derive(Subcommand)]
pub enum PackCommand {
    /// Install a zip or mrpack archive into a server data directory
    Install {
        /// Pack archive (.zip or .mrpack)
        #[arg(value_name = "ARCHIVE")]
        archive: PathBuf,

        /// Server data directory (created if missing)
        #[arg(value_name = "DATA_DIR")]
        data_dir: PathBuf,

        /// Also write eula.txt and server.properties defaults
        #[arg(long)]
        defaults: bool,

        /// Server display name used for the MOTD
        #[arg(long, default_value = "Minecraft Server")]
        motd: String,
    },

    /// Write eula.txt and server.properties defaults without overwriting
    Defaults {
        #[arg(value_name = "DATA_DIR")]
        data_dir: PathBuf,

        #[arg(long, default_value = "Minecraft Server")]
        motd: String,
    },

    /// Print the SHA-256 manifest of a client distribution directory
    Manifest {
        #[arg(value_name = "DIR")]
        dir: PathBuf,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

pub async fn handle_command(command: PackCommand) -> Result<()> {
    match command {
        PackCommand::Install {
            archive,
            data_dir,
            defaults,
            motd,
        } => install(archive, data_dir, defaults, &motd).await,
        PackCommand::Defaults { data_dir, motd } => {
            context::installer()?
                .ensure_server_defaults(&data_dir, &motd)
                .await
                .context("Failed to write server defaults")?;
            println!("{} Defaults written to {}", "✓".green(), data_dir.display());
            Ok(())
        }
        PackCommand::Manifest { dir, json } => manifest(dir, json).await,
    }
}

async fn install(archive: PathBuf, data_dir: PathBuf, defaults: bool, motd: &str) -> Result<()> {
    let pack_name = archive
        .file_name()
        .and_then(|n| n.to_str())
        .map(str::to_string)
        .ok_or_else(|| anyhow!("Archive path has no file name: {}", archive.display()))?;

    let installer = context::installer()?;
    println!("{} {}", "Installing".bold(), pack_name);

    let report = installer
        .install_pack_to_server_data(&archive, &pack_name, &data_dir)
        .await
        .with_context(|| format!("Failed to install {}", archive.display()))?;

    if defaults {
        installer
            .ensure_server_defaults(&data_dir, motd)
            .await
            .context("Failed to write server defaults")?;
    }

    println!("{} Pack installed into {}", "✓".green(), data_dir.display());
    if let Some(format) = report.format {
        println!("  Format:           {:?}", format);
    }
    println!("  Extracted:        {}", report.extracted);
    println!("  Downloaded:       {}", report.downloaded);
    println!("  Skipped:          {}", report.skipped);
    println!("  Client-only mods: {}", report.removed_client_mods);
    Ok(())
}

async fn manifest(dir: PathBuf, json: bool) -> Result<()> {
    let entries = context::installer()?
        .build_client_manifest(&dir)
        .await
        .with_context(|| format!("Failed to hash {}", dir.display()))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }

    for entry in &entries {
        println!("{}  {:>10}  {}", entry.hash, entry.size, entry.path);
    }
    println!("{}", format!("{} files", entries.len()).dimmed());
    Ok(())
}
