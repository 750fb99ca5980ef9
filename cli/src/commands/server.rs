// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Server lifecycle commands
//!
//! Commands: create, list, status, start, stop, delete, client

use anyhow::{anyhow, Context, Result};
use clap::Subcommand;
use colored::Colorize;
use futures::StreamExt;
use std::path::PathBuf;

use anchor_provisioner_core::application::{ClientUpload, CreateServerRequest};
use anchor_provisioner_core::domain::deploy_task::{DeployTask, TaskId};
use anchor_provisioner_core::domain::server::{
    ContainerId, LoaderSpec, MemorySpec, OwnerId, RuntimeHints, ServerRecord, ServerStatus,
};

use crate::context::Services;

#[derive(Subcommand)]
pub enum ServerCommand {
    /// Deploy a new server and follow its progress
    Create {
        /// Display name (sanitised into the container name)
        name: String,

        /// Minecraft version
        #[arg(long, default_value = "1.20.1")]
        version: String,

        /// JVM heap size (e.g. 2G, 1536M)
        #[arg(long, default_value = "2G")]
        memory: String,

        /// Owning user id
        #[arg(long, env = "ANCHOR_OWNER_ID", default_value_t = 1)]
        owner: i64,

        /// Mod loader (vanilla, fabric, forge, neoforge, quilt)
        #[arg(long)]
        loader: Option<String>,

        /// Pinned loader version
        #[arg(long, requires = "loader")]
        loader_version: Option<String>,

        /// Game version used for runtime selection when it differs from --version
        #[arg(long)]
        mc_version: Option<String>,

        /// Client pack to publish and install before the server starts
        #[arg(long, value_name = "FILE")]
        pack: Option<PathBuf>,

        /// Distribution kind recorded for the pack
        #[arg(long, default_value = "modpack")]
        pack_kind: String,
    },

    /// List servers owned by a user
    List {
        #[arg(long, env = "ANCHOR_OWNER_ID", default_value_t = 1)]
        owner: i64,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show the runtime status of a server
    Status {
        /// Container id
        id: String,
    },

    /// Start a stopped server
    Start {
        id: String,
    },

    /// Stop a running server
    Stop {
        id: String,
    },

    /// Delete a server, its container and its files
    Delete {
        id: String,

        /// Skip confirmation
        #[arg(short, long)]
        yes: bool,
    },

    /// Show the client distribution of a server
    Client {
        id: String,
    },
}

pub async fn handle_command(command: ServerCommand, config_path: Option<PathBuf>) -> Result<()> {
    let services = Services::from_config_path(config_path).await?;

    match command {
        ServerCommand::Create {
            name,
            version,
            memory,
            owner,
            loader,
            loader_version,
            mc_version,
            pack,
            pack_kind,
        } => {
            let loader = loader
                .map(|kind| -> Result<LoaderSpec> {
                    Ok(LoaderSpec {
                        kind: kind.parse()?,
                        version: loader_version,
                    })
                })
                .transpose()?;
            let pack = pack.map(|path| pack_upload(path, pack_kind)).transpose()?;

            let request = CreateServerRequest {
                owner: OwnerId(owner),
                name,
                version,
                memory: MemorySpec::parse(&memory)?,
                task_id: Some(TaskId::generate()),
                runtime: RuntimeHints { mc_version, loader },
                pack,
            };
            create(&services, request).await
        }
        ServerCommand::List { owner, json } => list(&services, OwnerId(owner), json).await,
        ServerCommand::Status { id } => {
            let status = services.lifecycle.get_status(&ContainerId::new(id)).await;
            println!("{}", paint_status(status));
            Ok(())
        }
        ServerCommand::Start { id } => {
            let status = services.lifecycle.start_server(&ContainerId::new(id)).await?;
            println!("{} Server {}", "✓".green(), paint_status(status));
            Ok(())
        }
        ServerCommand::Stop { id } => {
            let status = services.lifecycle.stop_server(&ContainerId::new(id)).await?;
            println!("{} Server {}", "✓".green(), paint_status(status));
            Ok(())
        }
        ServerCommand::Delete { id, yes } => delete(&services, ContainerId::new(id), yes).await,
        ServerCommand::Client { id } => client(&services, ContainerId::new(id)).await,
    }
}

fn pack_upload(path: PathBuf, kind: String) -> Result<ClientUpload> {
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .map(str::to_string)
        .ok_or_else(|| anyhow!("Pack path has no file name: {}", path.display()))?;
    if !path.is_file() {
        anyhow::bail!("Pack file not found: {}", path.display());
    }
    Ok(ClientUpload {
        path,
        file_name,
        kind,
    })
}

/// Run the deployment in the background and render its progress snapshots.
/// Ctrl+C requests cancellation with deletion.
async fn create(services: &Services, request: CreateServerRequest) -> Result<()> {
    let task_id = request
        .task_id
        .clone()
        .ok_or_else(|| anyhow!("Deployment requires a task id"))?;
    println!("{} {}", "Deploying".bold(), request.name);
    println!("  Task: {}", task_id.to_string().dimmed());

    let mut progress = services.lifecycle.tracker().subscribe_stream(&task_id);
    let lifecycle = services.lifecycle.clone();
    let deployment = tokio::spawn(async move { lifecycle.create_server(request).await });

    let mut cancel_requested = false;
    loop {
        tokio::select! {
            update = progress.next() => match update {
                Some(task) => {
                    print_progress(&task);
                    if task.is_finished() {
                        break;
                    }
                }
                None => break,
            },
            _ = tokio::signal::ctrl_c(), if !cancel_requested => {
                cancel_requested = true;
                println!("{}", "Cancelling deployment...".yellow());
                if let Err(e) = services.lifecycle.cancel_deployment(&task_id, true).await {
                    eprintln!("{} Cancel failed: {}", "✗".red(), e);
                }
            }
        }
    }
    drop(progress);

    let record = deployment
        .await
        .context("Deployment task aborted")?
        .context("Deployment failed")?;

    println!();
    println!("{} Server deployed", "✓".green());
    print_record(&record);
    Ok(())
}

fn print_progress(task: &DeployTask) {
    let line = format!("  [{:>3}%] {:<20} {}", task.percent, task.stage.as_str(), task.message);
    if task.error {
        println!("{}", line.red());
    } else if task.done {
        println!("{}", line.green());
    } else {
        println!("{}", line);
    }
}

async fn list(services: &Services, owner: OwnerId, json: bool) -> Result<()> {
    let servers = services.lifecycle.list_servers(owner).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&servers)?);
        return Ok(());
    }

    if servers.is_empty() {
        println!("{}", "No servers found".dimmed());
        return Ok(());
    }

    println!(
        "{:<14} {:<24} {:<10} {:<7} {}",
        "ID".bold(),
        "NAME".bold(),
        "VERSION".bold(),
        "PORT".bold(),
        "STATUS".bold()
    );
    for server in servers {
        println!(
            "{:<14} {:<24} {:<10} {:<7} {}",
            short_id(&server.container_id),
            server.name,
            server.version,
            server.port,
            paint_status(server.status)
        );
    }
    Ok(())
}

async fn delete(services: &Services, id: ContainerId, yes: bool) -> Result<()> {
    if !yes {
        let record = services.lifecycle.get_server(&id).await?;
        println!(
            "This removes {} and everything under {}",
            record.name.bold(),
            record.server_root().display()
        );
        println!("Re-run with {} to confirm.", "--yes".bold());
        return Ok(());
    }

    let report = services.lifecycle.delete_server(&id).await?;
    println!("{} Server {} deleted", "✓".green(), short_id(&id));
    println!("  Container removed: {}", report.container_removed);
    println!("  Record removed:    {}", report.record_removed);
    println!("  Files removed:     {}", report.directory_removed);
    Ok(())
}

async fn client(services: &Services, id: ContainerId) -> Result<()> {
    match services.lifecycle.client_distribution(&id).await? {
        Some(distribution) => {
            println!("{}", "Client distribution:".bold());
            println!("  Type:  {}", distribution.kind);
            println!("  Value: {}", distribution.value);
        }
        None => println!("{}", "No client distribution published".dimmed()),
    }

    let manifest = services.lifecycle.client_manifest(&id).await?;
    if manifest.is_empty() {
        return Ok(());
    }
    println!();
    println!("{} ({} files)", "Manifest:".bold(), manifest.len());
    for entry in manifest {
        let hash = entry.hash.get(..12).unwrap_or(&entry.hash);
        println!("  {}  {:>10}  {}", hash, entry.size, entry.path);
    }
    Ok(())
}

fn print_record(record: &ServerRecord) {
    println!("  ID:      {}", record.container_id);
    println!("  Name:    {}", record.name);
    println!("  Version: {}", record.version);
    if let Some(loader) = &record.loader {
        println!(
            "  Loader:  {} {}",
            loader.kind.as_str(),
            loader.version.as_deref().unwrap_or("")
        );
    }
    println!("  Port:    {}", record.port);
    println!("  Data:    {}", record.volume_path.display());
    println!("  Status:  {}", paint_status(record.status));
}

fn short_id(id: &ContainerId) -> &str {
    let raw = id.as_str();
    &raw[..raw.len().min(12)]
}

fn paint_status(status: ServerStatus) -> colored::ColoredString {
    match status {
        ServerStatus::Running => status.as_str().green(),
        ServerStatus::Created | ServerStatus::Stopped => status.as_str().yellow(),
        ServerStatus::Missing => status.as_str().red(),
        ServerStatus::Unknown => status.as_str().dimmed(),
    }
}
