// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Server Lifecycle Application Service
//!
//! Orchestrates deployment and lifecycle of containerised game servers:
//! - Domain layer: ServerRecord aggregate, Java runtime resolution, deploy stages
//! - Infrastructure layer: ContainerRuntime, ServerRepository, PackDownloader
//! - Deploy Task Tracker: progress snapshots and cooperative cancellation
//!
//! The persisted status of a server is a cache of runtime truth. Listing
//! re-derives it from the runtime and writes back whatever changed.
//!
//! Destruction is idempotent: stop and remove swallow only the runtime error
//! kinds that mean "already gone", so a user delete racing the background
//! sweep converges without error.

use chrono::Utc;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::application::deploy_tracker::{DeployTaskTracker, TrackerError};
use crate::application::modpack_installer::{ClientUpload, ModpackInstaller};
use crate::application::port_allocator::PortAllocator;
use crate::domain::config::ProvisionerConfigSpec;
use crate::domain::deploy_task::{DeployStage, DeployTask, DeployTaskUpdate, TaskId};
use crate::domain::java_runtime::{resolve_java_runtime, server_image};
use crate::domain::modpack::{ClientDistributionDescriptor, ClientManifestEntry, InstallError};
use crate::domain::path_guard::{PathGuard, PathGuardError};
use crate::domain::repository::{RepositoryError, ServerRepository};
use crate::domain::runtime::{
    tolerate, ContainerRuntime, ContainerSpec, RuntimeError, RuntimeErrorKind,
};
use crate::domain::server::{
    sanitize_container_name, ClientDistribution, ContainerId, MemorySpec, OwnerId, RuntimeHints,
    ServerListing, ServerRecord, ServerStatus, CLIENT_DESCRIPTOR_FILE,
};

#[derive(Debug, Error)]
pub enum ProvisionError {
    #[error("Container runtime unavailable: {0}. Is Docker running and is the socket reachable?")]
    RuntimeUnavailable(String),

    #[error("Unable to obtain server image '{image}': pull failed and no local copy exists ({message}). Check network access or configure a registry mirror")]
    ImageUnavailable { image: String, message: String },

    #[error("Server not found: {0}")]
    NotFound(ContainerId),

    #[error("File not found: {0}")]
    FileNotFound(String),

    #[error("Deployment cancelled: {0}")]
    Cancelled(TaskId),

    #[error(transparent)]
    Tracker(#[from] TrackerError),

    #[error(transparent)]
    InvalidPath(#[from] PathGuardError),

    #[error("Runtime error: {0}")]
    Runtime(#[from] RuntimeError),

    #[error("Repository error: {0}")]
    Repository(#[from] RepositoryError),

    #[error("Pack installation failed: {0}")]
    Install(#[from] InstallError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Deployment parameters taken from configuration
#[derive(Debug, Clone)]
pub struct LifecycleSettings {
    pub servers_root: PathBuf,
    pub image_repository: String,
    pub container_port: u16,
    pub public_host: String,
    pub ping_timeout: Duration,
}

impl LifecycleSettings {
    pub fn from_config(spec: &ProvisionerConfigSpec) -> Self {
        Self {
            servers_root: spec.storage.servers_root.clone(),
            image_repository: spec.runtime.image_repository.clone(),
            container_port: spec.runtime.container_port,
            public_host: spec.ports.public_host.clone(),
            ping_timeout: spec.runtime.ping_timeout(),
        }
    }
}

/// A deployment request as validated by the caller
#[derive(Debug, Clone)]
pub struct CreateServerRequest {
    pub owner: OwnerId,
    pub name: String,
    pub version: String,
    pub memory: MemorySpec,
    pub task_id: Option<TaskId>,
    pub runtime: RuntimeHints,
    /// Pack published and installed before the deployment completes
    pub pack: Option<ClientUpload>,
}

/// What a deletion actually removed
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeletionReport {
    pub container_removed: bool,
    pub record_removed: bool,
    pub directory_removed: bool,
}

pub struct ServerLifecycleService {
    runtime: Arc<dyn ContainerRuntime>,
    repository: Arc<dyn ServerRepository>,
    tracker: DeployTaskTracker,
    installer: Arc<ModpackInstaller>,
    ports: PortAllocator,
    settings: LifecycleSettings,
    guard: PathGuard,
}

impl ServerLifecycleService {
    pub fn new(
        runtime: Arc<dyn ContainerRuntime>,
        repository: Arc<dyn ServerRepository>,
        tracker: DeployTaskTracker,
        installer: Arc<ModpackInstaller>,
        ports: PortAllocator,
        settings: LifecycleSettings,
    ) -> Self {
        Self {
            runtime,
            repository,
            tracker,
            installer,
            ports,
            settings,
            guard: PathGuard::new(),
        }
    }

    pub fn tracker(&self) -> &DeployTaskTracker {
        &self.tracker
    }

    // ========================================================================
    // Deployment
    // ========================================================================

    /// Deploy a new server, reporting progress to `request.task_id` if given.
    ///
    /// Any failure other than cancellation is published as a failed terminal
    /// snapshot before being returned.
    pub async fn create_server(&self, request: CreateServerRequest) -> Result<ServerRecord, ProvisionError> {
        let task = request.task_id.clone();
        let result = self.provision(&request).await;

        if let (Err(e), Some(task)) = (&result, &task) {
            if !matches!(e, ProvisionError::Cancelled(_)) {
                error!(task_id = %task, error = %e, "Deployment failed");
                self.tracker.report(task, DeployTaskUpdate::failed(e.to_string()));
            }
        }
        result
    }

    fn progress(&self, task: Option<&TaskId>, update: DeployTaskUpdate) {
        if let Some(task) = task {
            self.tracker.report(task, update);
        }
    }

    async fn provision(&self, request: &CreateServerRequest) -> Result<ServerRecord, ProvisionError> {
        let task = request.task_id.as_ref();
        if let Some(task) = task {
            self.tracker.init(task, DeployStage::Init, "Preparing deployment", 5);
        }

        self.ping().await?;
        self.checkpoint(task, DeployStage::Init, None).await?;

        let safe_name = sanitize_container_name(&request.name);
        let millis = Utc::now().timestamp_millis();
        let server_dir = self
            .guard
            .resolve(&self.settings.servers_root, &format!("{}_{}", safe_name, millis))?;
        let data_dir = server_dir.join("data");
        tokio::fs::create_dir_all(&data_dir).await?;

        let record = match self.create_container(request, task, &safe_name, millis, &data_dir).await {
            Ok(record) => record,
            Err(e) => {
                discard_dir(&server_dir).await;
                return Err(e);
            }
        };
        self.checkpoint(task, DeployStage::WritingState, Some(&record.container_id)).await?;

        if let Some(pack) = &request.pack {
            self.publish_client_pack(&record.container_id, pack, task).await?;
        }

        self.progress(task, DeployTaskUpdate::completed("Deployment complete"));
        info!(container_id = %record.container_id, name = %record.name, port = record.port, "Server deployed");
        Ok(record)
    }

    /// Steps up to and including persistence. On failure nothing but the
    /// server directory is left behind.
    async fn create_container(
        &self,
        request: &CreateServerRequest,
        task: Option<&TaskId>,
        safe_name: &str,
        millis: i64,
        data_dir: &Path,
    ) -> Result<ServerRecord, ProvisionError> {
        let port = self.ports.allocate(self.repository.as_ref()).await?;

        let mc_version = request
            .runtime
            .mc_version
            .as_deref()
            .filter(|v| !v.trim().is_empty())
            .unwrap_or(&request.version);
        let java_major = resolve_java_runtime(Some(mc_version).filter(|v| !v.trim().is_empty()));
        let image = server_image(&self.settings.image_repository, java_major);

        self.progress(
            task,
            DeployTaskUpdate::stage(DeployStage::PullingImage, format!("Pulling server image {}", image), 20),
        );
        self.ensure_image(&image).await?;
        self.checkpoint(task, DeployStage::PullingImage, None).await?;

        self.progress(
            task,
            DeployTaskUpdate::stage(DeployStage::CreatingContainer, "Creating container", 55),
        );
        let loader = request.runtime.loader.as_ref();
        let spec = ContainerSpec {
            name: format!("mc_{}_{}", safe_name, millis),
            image: image.clone(),
            env: ContainerSpec::server_env(&request.memory, Some(mc_version), java_major, loader),
            data_dir: data_dir.to_path_buf(),
            container_port: self.settings.container_port,
            host_port: port,
            tty: true,
            open_stdin: true,
        };
        let container_id = self.runtime.create_container(&spec).await?;
        info!(container_id = %container_id, image = %image, java = java_major, port, "Container created");

        self.progress(
            task,
            DeployTaskUpdate::stage(DeployStage::WritingState, "Saving server record", 70)
                .with_container(container_id.clone()),
        );
        let record = ServerRecord {
            container_id: container_id.clone(),
            owner: request.owner,
            name: request.name.clone(),
            port,
            volume_path: data_dir.to_path_buf(),
            version: request.version.clone(),
            loader: loader.cloned(),
            status: ServerStatus::Created,
            client_distribution: None,
            created_at: Utc::now(),
        };
        if let Err(e) = self.persist_new(&record).await {
            warn!(container_id = %container_id, error = %e, "Failed to persist server, removing container");
            if let Err(cleanup) = tolerate(self.runtime.remove_container(&container_id).await, &[RuntimeErrorKind::NotFound]) {
                warn!(container_id = %container_id, error = %cleanup, "Failed to remove orphaned container");
            }
            if let Err(cleanup) = self.repository.delete(&container_id).await {
                warn!(container_id = %container_id, error = %cleanup, "Failed to remove partial server record");
            }
            return Err(e);
        }
        Ok(record)
    }

    async fn persist_new(&self, record: &ServerRecord) -> Result<(), ProvisionError> {
        self.repository.save(record).await?;
        self.repository
            .save_listing(&ServerListing {
                container_id: record.container_id.clone(),
                name: record.name.clone(),
                ip_address: self.settings.public_host.clone(),
                port: record.port,
                description: format!("Docker Server: {}", record.name),
            })
            .await?;
        Ok(())
    }

    async fn ping(&self) -> Result<(), ProvisionError> {
        match tokio::time::timeout(self.settings.ping_timeout, self.runtime.ping()).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(ProvisionError::RuntimeUnavailable(e.message)),
            Err(_) => Err(ProvisionError::RuntimeUnavailable(format!(
                "no response within {:?}",
                self.settings.ping_timeout
            ))),
        }
    }

    /// Pull `image`, falling back to a locally cached copy
    async fn ensure_image(&self, image: &str) -> Result<(), ProvisionError> {
        let pull_error = match self.runtime.pull_image(image).await {
            Ok(()) => return Ok(()),
            Err(e) => e,
        };
        warn!(image, error = %pull_error, "Image pull failed, checking local cache");

        match self.runtime.image_exists(image).await {
            Ok(true) => {
                info!(image, "Using locally cached image");
                Ok(())
            }
            Ok(false) | Err(_) => Err(ProvisionError::ImageUnavailable {
                image: image.to_string(),
                message: pull_error.message,
            }),
        }
    }

    /// Honour a pending cancellation on entering `stage`.
    ///
    /// The container, if one exists and deletion was requested, is destroyed
    /// before the cancelled snapshot is published.
    async fn checkpoint(
        &self,
        task: Option<&TaskId>,
        stage: DeployStage,
        container: Option<&ContainerId>,
    ) -> Result<(), ProvisionError> {
        let Some(task) = task else {
            return Ok(());
        };
        let Some(request) = self.tracker.pending_cancel(task, stage) else {
            return Ok(());
        };

        info!(task_id = %task, stage = stage.as_str(), "Honouring cancellation");
        let message = match container {
            Some(id) if request.delete_on_cancel => {
                self.delete_server(id).await?;
                "Deployment cancelled and server deleted"
            }
            _ => "Deployment cancelled",
        };
        self.tracker.report(task, DeployTaskUpdate::cancelled(message));
        Err(ProvisionError::Cancelled(task.clone()))
    }

    /// Record the intent to abort `task_id`.
    ///
    /// With `delete_on_cancel` and a container already named by the snapshot,
    /// the server is destroyed right away; the running deployment still stops
    /// at its next checkpoint.
    pub async fn cancel_deployment(&self, task_id: &TaskId, delete_on_cancel: bool) -> Result<DeployTask, ProvisionError> {
        self.tracker.request_cancel(task_id, delete_on_cancel)?;

        let container = self.tracker.snapshot(task_id).and_then(|s| s.container_id);
        let message = match container {
            Some(id) if delete_on_cancel => {
                self.delete_server(&id).await?;
                "Deployment cancelled and server deleted"
            }
            _ => "Deployment cancelled",
        };
        Ok(self.tracker.report(task_id, DeployTaskUpdate::cancelled(message)))
    }

    // ========================================================================
    // Status & lifecycle
    // ========================================================================

    /// Current status as observed by the runtime.
    ///
    /// A 404-class lookup failure means `missing`; any other failure is
    /// inconclusive and yields `unknown`.
    pub async fn get_status(&self, id: &ContainerId) -> ServerStatus {
        match self.runtime.inspect_container(id).await {
            Ok(inspection) => ServerStatus::from_runtime_state(inspection.state.as_deref()),
            Err(e) if e.is(RuntimeErrorKind::NotFound) => ServerStatus::Missing,
            Err(e) => {
                debug!(container_id = %id, error = %e, "Inspect inconclusive");
                ServerStatus::Unknown
            }
        }
    }

    /// The owner's servers with status reconciled against the runtime
    pub async fn list_servers(&self, owner: OwnerId) -> Result<Vec<ServerRecord>, ProvisionError> {
        let mut records = self.repository.find_by_owner(owner).await?;
        for record in &mut records {
            let observed = self.get_status(&record.container_id).await;
            if observed != record.status {
                debug!(
                    container_id = %record.container_id,
                    from = %record.status,
                    to = %observed,
                    "Reconciling server status"
                );
                self.repository.update_status(&record.container_id, observed).await?;
                record.status = observed;
            }
        }
        Ok(records)
    }

    pub async fn get_server(&self, id: &ContainerId) -> Result<ServerRecord, ProvisionError> {
        self.repository
            .find_by_id(id)
            .await?
            .ok_or_else(|| ProvisionError::NotFound(id.clone()))
    }

    pub async fn start_server(&self, id: &ContainerId) -> Result<ServerStatus, ProvisionError> {
        let result = self.runtime.start_container(id).await;
        self.settle_transition(id, result, "start").await
    }

    pub async fn stop_server(&self, id: &ContainerId) -> Result<ServerStatus, ProvisionError> {
        let result = self.runtime.stop_container(id).await;
        self.settle_transition(id, result, "stop").await
    }

    async fn settle_transition(
        &self,
        id: &ContainerId,
        result: Result<(), RuntimeError>,
        action: &str,
    ) -> Result<ServerStatus, ProvisionError> {
        match result {
            Ok(()) => {}
            Err(e) if e.is(RuntimeErrorKind::AlreadyInState) => {
                debug!(container_id = %id, action, "Container already in requested state");
            }
            Err(e) if e.is(RuntimeErrorKind::NotFound) => {
                warn!(container_id = %id, action, "Container no longer exists, marking missing");
                self.persist_status(id, ServerStatus::Missing).await?;
                return Err(ProvisionError::NotFound(id.clone()));
            }
            Err(e) => return Err(e.into()),
        }

        let status = self.get_status(id).await;
        self.persist_status(id, status).await?;
        info!(container_id = %id, action, status = %status, "Server state changed");
        Ok(status)
    }

    async fn persist_status(&self, id: &ContainerId, status: ServerStatus) -> Result<(), ProvisionError> {
        match self.repository.update_status(id, status).await {
            Ok(()) | Err(RepositoryError::NotFound(_)) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Destroy a server: container, record, listing and on-disk tree.
    ///
    /// Safe to call on a server that is partially or fully gone. Runtime
    /// failures outside the benign set do not stop the remaining steps but
    /// are returned once they have run.
    pub async fn delete_server(&self, id: &ContainerId) -> Result<DeletionReport, ProvisionError> {
        let record = self.repository.find_by_id(id).await?;
        let mut report = DeletionReport::default();
        let mut unexpected: Option<RuntimeError> = None;

        let running = match self.runtime.inspect_container(id).await {
            Ok(inspection) => ServerStatus::from_runtime_state(inspection.state.as_deref()) == ServerStatus::Running,
            Err(_) => false,
        };
        if running {
            let stopped = tolerate(
                self.runtime.stop_container(id).await,
                &[RuntimeErrorKind::NotFound, RuntimeErrorKind::AlreadyInState],
            );
            if let Err(e) = stopped {
                warn!(container_id = %id, error = %e, "Failed to stop container before removal");
                unexpected.get_or_insert(e);
            }
        }

        match tolerate(self.runtime.remove_container(id).await, &[RuntimeErrorKind::NotFound]) {
            Ok(removed) => report.container_removed = removed,
            Err(e) => {
                warn!(container_id = %id, error = %e, "Failed to remove container");
                unexpected.get_or_insert(e);
            }
        }

        self.repository.delete(id).await?;
        self.repository.delete_listing(id).await?;
        report.record_removed = record.is_some();

        if let Some(record) = record {
            let root = record.server_root();
            match tokio::fs::remove_dir_all(&root).await {
                Ok(()) => report.directory_removed = true,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }

        info!(
            container_id = %id,
            container_removed = report.container_removed,
            record_removed = report.record_removed,
            directory_removed = report.directory_removed,
            "Server deleted"
        );

        match unexpected {
            Some(e) => Err(e.into()),
            None => Ok(report),
        }
    }

    /// Delete every known server whose container has disappeared from the
    /// runtime. Returns the ids that were removed.
    pub async fn sweep_missing(&self) -> Result<Vec<ContainerId>, ProvisionError> {
        let mut removed = Vec::new();
        for record in self.repository.list_all().await? {
            if self.get_status(&record.container_id).await != ServerStatus::Missing {
                continue;
            }
            match self.delete_server(&record.container_id).await {
                Ok(_) => removed.push(record.container_id),
                Err(e) => warn!(container_id = %record.container_id, error = %e, "Sweep failed to delete missing server"),
            }
        }
        if !removed.is_empty() {
            info!(count = removed.len(), "Swept missing servers");
        }
        Ok(removed)
    }

    // ========================================================================
    // Client distribution
    // ========================================================================

    /// Publish `upload` as the server's client distribution and, for pack
    /// archives, install it into the data volume.
    ///
    /// With a task the server is started afterwards; a start failure is
    /// flagged on the snapshot without failing the publish.
    pub async fn publish_client_pack(
        &self,
        id: &ContainerId,
        upload: &ClientUpload,
        task: Option<&TaskId>,
    ) -> Result<ClientDistributionDescriptor, ProvisionError> {
        let record = self.get_server(id).await?;

        self.checkpoint(task, DeployStage::InstallingPack, Some(id)).await?;
        self.progress(
            task,
            DeployTaskUpdate::stage(DeployStage::InstallingPack, "Installing server modpack", 80),
        );
        let descriptor = self
            .installer
            .publish_client_distribution(&record.client_dir(), upload)
            .await?;
        if upload.format().is_some() {
            self.installer
                .install_pack_to_server_data(&upload.path, &upload.file_name, &record.volume_path)
                .await?;
        }

        self.progress(
            task,
            DeployTaskUpdate::stage(DeployStage::ApplyingDefaults, "Writing server defaults", 90),
        );
        self.installer
            .ensure_server_defaults(&record.volume_path, &record.name)
            .await?;

        if let Some(task) = task {
            self.checkpoint(Some(task), DeployStage::StartingServer, Some(id)).await?;
            self.tracker.report(
                task,
                DeployTaskUpdate::stage(DeployStage::StartingServer, "Starting server", 95),
            );
            if let Err(e) = self.start_server(id).await {
                warn!(container_id = %id, error = %e, "Server failed to start after pack install");
                self.tracker.report(
                    task,
                    DeployTaskUpdate {
                        message: Some(format!("Server failed to start: {}", e)),
                        ..Default::default()
                    }
                    .with_error(),
                );
            }
        }

        Ok(descriptor)
    }

    /// Download manifest of the client distribution directory
    pub async fn client_manifest(&self, id: &ContainerId) -> Result<Vec<ClientManifestEntry>, ProvisionError> {
        let record = self.get_server(id).await?;
        Ok(self.installer.build_client_manifest(&record.client_dir()).await?)
    }

    /// Absolute path of a file inside the client distribution directory
    pub async fn client_file(&self, id: &ContainerId, relative: &str) -> Result<PathBuf, ProvisionError> {
        let record = self.get_server(id).await?;
        let path = self.guard.resolve(&record.client_dir(), relative)?;
        if !tokio::fs::try_exists(&path).await? {
            return Err(ProvisionError::FileNotFound(relative.to_string()));
        }
        Ok(path)
    }

    pub async fn has_client_config(&self, id: &ContainerId) -> Result<bool, ProvisionError> {
        match self.repository.find_by_id(id).await? {
            Some(record) => Ok(tokio::fs::try_exists(record.client_dir().join(CLIENT_DESCRIPTOR_FILE)).await?),
            None => Ok(false),
        }
    }

    pub async fn set_client_distribution(
        &self,
        id: &ContainerId,
        distribution: ClientDistribution,
    ) -> Result<(), ProvisionError> {
        match self.repository.update_client_distribution(id, &distribution).await {
            Ok(()) => Ok(()),
            Err(RepositoryError::NotFound(_)) => Err(ProvisionError::NotFound(id.clone())),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn client_distribution(&self, id: &ContainerId) -> Result<Option<ClientDistribution>, ProvisionError> {
        Ok(self.get_server(id).await?.client_distribution)
    }
}

async fn discard_dir(dir: &Path) {
    match tokio::fs::remove_dir_all(dir).await {
        Ok(()) => debug!(dir = %dir.display(), "Removed abandoned server directory"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!(dir = %dir.display(), error = %e, "Failed to remove abandoned server directory"),
    }
}
