// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Server file commands
//!
//! Paths are relative to the server's data volume.
//! Commands: ls, cat, write, mkdir, rm, upload

use anyhow::{anyhow, Context, Result};
use clap::Subcommand;
use colored::Colorize;
use std::path::PathBuf;

use anchor_provisioner_core::domain::server::ContainerId;

use crate::context::Services;

#[derive(Subcommand)]
pub enum FilesCommand {
    /// List a directory
    Ls {
        server: String,

        #[arg(default_value = "/")]
        path: String,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print a text file
    Cat {
        server: String,
        path: String,
    },

    /// Replace the contents of an existing text file with a local file
    Write {
        server: String,
        path: String,

        /// Local file providing the new contents
        #[arg(long, value_name = "FILE")]
        from: PathBuf,
    },

    /// Create a directory (and parents)
    Mkdir {
        server: String,
        path: String,
    },

    /// Delete a file or directory tree
    Rm {
        server: String,
        path: String,
    },

    /// Copy a local file into the data volume root
    Upload {
        server: String,

        #[arg(value_name = "FILE")]
        file: PathBuf,
    },
}

pub async fn handle_command(command: FilesCommand, config_path: Option<PathBuf>) -> Result<()> {
    let services = Services::from_config_path(config_path).await?;
    let files = &services.files;

    match command {
        FilesCommand::Ls { server, path, json } => {
            let entries = files.list(&ContainerId::new(server), &path).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&entries)?);
                return Ok(());
            }
            if entries.is_empty() {
                println!("{}", "(empty)".dimmed());
            }
            for entry in entries {
                if entry.is_directory() {
                    println!("{:>10}  {}/", "-", entry.name.blue().bold());
                } else {
                    println!("{:>10}  {}", entry.size, entry.name);
                }
            }
            Ok(())
        }
        FilesCommand::Cat { server, path } => {
            let content = files.read(&ContainerId::new(server), &path).await?;
            print!("{}", content);
            Ok(())
        }
        FilesCommand::Write { server, path, from } => {
            let content = tokio::fs::read_to_string(&from)
                .await
                .with_context(|| format!("Failed to read {}", from.display()))?;
            files.write(&ContainerId::new(server), &path, &content).await?;
            println!("{} Wrote {}", "✓".green(), path);
            Ok(())
        }
        FilesCommand::Mkdir { server, path } => {
            files.create_folder(&ContainerId::new(server), &path).await?;
            println!("{} Created {}", "✓".green(), path);
            Ok(())
        }
        FilesCommand::Rm { server, path } => {
            files.delete(&ContainerId::new(server), &path).await?;
            println!("{} Deleted {}", "✓".green(), path);
            Ok(())
        }
        FilesCommand::Upload { server, file } => upload(&services, server, file).await,
    }
}

/// The file manager moves uploads into place, so hand it a scratch copy
/// rather than the operator's original.
async fn upload(services: &Services, server: String, file: PathBuf) -> Result<()> {
    let file_name = file
        .file_name()
        .and_then(|n| n.to_str())
        .map(str::to_string)
        .ok_or_else(|| anyhow!("Upload path has no file name: {}", file.display()))?;

    let scratch = tempfile::NamedTempFile::new().context("Failed to create scratch file")?;
    tokio::fs::copy(&file, scratch.path())
        .await
        .with_context(|| format!("Failed to read {}", file.display()))?;
    let (_, scratch_path) = scratch.keep().context("Failed to keep scratch file")?;

    let stored = match services
        .files
        .upload(&ContainerId::new(server), &file_name, &scratch_path)
        .await
    {
        Ok(stored) => stored,
        Err(e) => {
            let _ = tokio::fs::remove_file(&scratch_path).await;
            return Err(e.into());
        }
    };
    println!("{} Uploaded to {}", "✓".green(), stored.display());
    Ok(())
}
