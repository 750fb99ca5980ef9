// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Service wiring shared by the command handlers
//!
//! Builds the provisioning services from a loaded configuration manifest:
//! Docker runtime, server repository, deploy task tracker, modpack installer,
//! port allocator and file manager.

use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use anchor_provisioner_core::application::{
    create_server_repository, DeployTaskTracker, FileManager, LifecycleSettings, ModpackInstaller,
    PortAllocator, ServerLifecycleService,
};
use anchor_provisioner_core::domain::config::ProvisionerConfigManifest;
use anchor_provisioner_core::infrastructure::{
    DockerRuntime, HttpPackDownloader, InMemoryClipboardStore, InMemoryDeployTaskStore,
};

/// Upper bound for a single mod download
const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(120);

/// Load, override and validate the configuration
pub fn load_config(config_path: Option<PathBuf>) -> Result<ProvisionerConfigManifest> {
    let config = ProvisionerConfigManifest::load_or_default(config_path)
        .context("Failed to load configuration")?;
    config.validate().context("Invalid configuration")?;
    Ok(config)
}

/// Modpack installer backed by the HTTP downloader
pub fn installer() -> Result<ModpackInstaller> {
    let downloader =
        HttpPackDownloader::new(DOWNLOAD_TIMEOUT).context("Failed to build HTTP client")?;
    Ok(ModpackInstaller::new(Arc::new(downloader)))
}

/// Fully wired provisioning services
pub struct Services {
    pub config: ProvisionerConfigManifest,
    pub lifecycle: Arc<ServerLifecycleService>,
    pub files: Arc<FileManager>,
}

impl Services {
    pub async fn build(config: ProvisionerConfigManifest) -> Result<Self> {
        let spec = &config.spec;

        let runtime = DockerRuntime::new(
            spec.runtime.docker_socket.clone(),
            spec.runtime.stop_timeout_secs,
        )
        .context("Failed to connect to Docker")?;

        let repository = create_server_repository(&spec.storage.storage_backend()).await?;
        let tracker = DeployTaskTracker::new(Arc::new(InMemoryDeployTaskStore::new()));

        let lifecycle = ServerLifecycleService::new(
            Arc::new(runtime),
            repository.clone(),
            tracker,
            Arc::new(installer()?),
            PortAllocator::from_config(&spec.ports),
            LifecycleSettings::from_config(spec),
        );

        let files = FileManager::new(repository, Arc::new(InMemoryClipboardStore::new()))
            .with_clipboard_ttl(spec.maintenance.clipboard_ttl());

        info!(
            servers_root = %spec.storage.servers_root.display(),
            image_repository = %spec.runtime.image_repository,
            "Provisioning services initialised"
        );

        Ok(Self {
            config,
            lifecycle: Arc::new(lifecycle),
            files: Arc::new(files),
        })
    }

    /// Load configuration and build services in one step
    pub async fn from_config_path(config_path: Option<PathBuf>) -> Result<Self> {
        Self::build(load_config(config_path)?).await
    }
}
