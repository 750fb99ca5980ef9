// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Integration tests for server deployment
//!
//! These tests drive `ServerLifecycleService` against an in-process container
//! runtime and verify:
//! 1. Java runtime and image selection from the requested version
//! 2. Deploy task progress ordering and terminal snapshots
//! 3. Cooperative cancellation with and without deletion
//! 4. Idempotent deletion and the missing-container sweep
//! 5. Pack publishing as part of a deployment

use anchor_provisioner_core::application::deploy_tracker::{DeployTaskTracker, Subscription};
use anchor_provisioner_core::application::file_manager::FileManager;
use anchor_provisioner_core::application::modpack_installer::{ClientUpload, ModpackInstaller};
use anchor_provisioner_core::application::port_allocator::PortAllocator;
use anchor_provisioner_core::application::server_lifecycle::{
    CreateServerRequest, LifecycleSettings, ProvisionError, ServerLifecycleService,
};
use anchor_provisioner_core::domain::deploy_task::{DeployStage, DeployTask, TaskId};
use anchor_provisioner_core::domain::modpack::{InstallError, PackDownloader};
use anchor_provisioner_core::domain::runtime::{
    ContainerInspection, ContainerRuntime, ContainerSpec, RuntimeError,
};
use anchor_provisioner_core::domain::server::{
    ContainerId, LoaderKind, LoaderSpec, MemorySpec, OwnerId, RuntimeHints, ServerStatus,
};
use anchor_provisioner_core::infrastructure::repositories::InMemoryServerRepository;
use anchor_provisioner_core::infrastructure::{InMemoryClipboardStore, InMemoryDeployTaskStore};
use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::io::Write;
use std::path::Path;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use zip::write::SimpleFileOptions;
use zip::ZipWriter;

type CreateHook = Box<dyn Fn(&ContainerId) + Send + Sync>;

/// In-process stand-in for the Docker engine
#[derive(Default)]
struct FakeRuntime {
    containers: Mutex<HashMap<ContainerId, String>>,
    specs: Mutex<Vec<ContainerSpec>>,
    pull_fails: Mutex<bool>,
    cached_images: Mutex<Vec<String>>,
    unreachable: Mutex<bool>,
    on_create: Mutex<Option<CreateHook>>,
    counter: AtomicU32,
}

impl FakeRuntime {
    fn vanish(&self, id: &ContainerId) {
        self.containers.lock().remove(id);
    }
}

#[async_trait]
impl ContainerRuntime for FakeRuntime {
    async fn ping(&self) -> Result<(), RuntimeError> {
        if *self.unreachable.lock() {
            return Err(RuntimeError::unavailable("connection refused"));
        }
        Ok(())
    }

    async fn pull_image(&self, image: &str) -> Result<(), RuntimeError> {
        if *self.pull_fails.lock() {
            return Err(RuntimeError::other(format!("pull of {} timed out", image)));
        }
        Ok(())
    }

    async fn image_exists(&self, image: &str) -> Result<bool, RuntimeError> {
        Ok(self.cached_images.lock().iter().any(|i| i == image))
    }

    async fn create_container(&self, spec: &ContainerSpec) -> Result<ContainerId, RuntimeError> {
        let n = self.counter.fetch_add(1, Ordering::SeqCst);
        let id = ContainerId::new(format!("c{:04}", n));
        self.containers.lock().insert(id.clone(), "created".to_string());
        self.specs.lock().push(spec.clone());
        if let Some(hook) = self.on_create.lock().as_ref() {
            hook(&id);
        }
        Ok(id)
    }

    async fn start_container(&self, id: &ContainerId) -> Result<(), RuntimeError> {
        let mut containers = self.containers.lock();
        match containers.get_mut(id) {
            Some(state) if state == "running" => Err(RuntimeError::already_in_state("already started")),
            Some(state) => {
                *state = "running".to_string();
                Ok(())
            }
            None => Err(RuntimeError::not_found("no such container")),
        }
    }

    async fn stop_container(&self, id: &ContainerId) -> Result<(), RuntimeError> {
        let mut containers = self.containers.lock();
        match containers.get_mut(id) {
            Some(state) if state != "running" => Err(RuntimeError::already_in_state("already stopped")),
            Some(state) => {
                *state = "exited".to_string();
                Ok(())
            }
            None => Err(RuntimeError::not_found("no such container")),
        }
    }

    async fn inspect_container(&self, id: &ContainerId) -> Result<ContainerInspection, RuntimeError> {
        match self.containers.lock().get(id) {
            Some(state) => Ok(ContainerInspection {
                id: id.clone(),
                state: Some(state.clone()),
            }),
            None => Err(RuntimeError::not_found("no such container")),
        }
    }

    async fn remove_container(&self, id: &ContainerId) -> Result<(), RuntimeError> {
        match self.containers.lock().remove(id) {
            Some(_) => Ok(()),
            None => Err(RuntimeError::not_found("no such container")),
        }
    }
}

struct OfflineDownloader;

#[async_trait]
impl PackDownloader for OfflineDownloader {
    async fn download(&self, url: &str) -> Result<Bytes, InstallError> {
        Err(InstallError::Download {
            url: url.to_string(),
            message: "offline".to_string(),
        })
    }
}

struct Harness {
    _dir: TempDir,
    root: std::path::PathBuf,
    runtime: Arc<FakeRuntime>,
    repository: Arc<InMemoryServerRepository>,
    service: Arc<ServerLifecycleService>,
}

fn harness() -> Harness {
    let dir = TempDir::new().unwrap();
    let root = dir.path().join("servers");
    let runtime = Arc::new(FakeRuntime::default());
    let repository = Arc::new(InMemoryServerRepository::new());
    let service = ServerLifecycleService::new(
        runtime.clone(),
        repository.clone(),
        DeployTaskTracker::new(Arc::new(InMemoryDeployTaskStore::new())),
        Arc::new(ModpackInstaller::new(Arc::new(OfflineDownloader))),
        PortAllocator::new(30000..=39999, 20).without_bind_probe(),
        LifecycleSettings {
            servers_root: root.clone(),
            image_repository: "itzg/minecraft-server".to_string(),
            container_port: 25565,
            public_host: "127.0.0.1".to_string(),
            ping_timeout: Duration::from_secs(2),
        },
    );
    Harness {
        _dir: dir,
        root,
        runtime,
        repository,
        service: Arc::new(service),
    }
}

fn request(name: &str, version: &str, task: Option<&TaskId>) -> CreateServerRequest {
    CreateServerRequest {
        owner: OwnerId(1),
        name: name.to_string(),
        version: version.to_string(),
        memory: MemorySpec::parse("2G").unwrap(),
        task_id: task.cloned(),
        runtime: RuntimeHints::default(),
        pack: None,
    }
}

fn record_snapshots(tracker: &DeployTaskTracker, task: &TaskId) -> (Arc<Mutex<Vec<DeployTask>>>, Subscription) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    let subscription = tracker.subscribe(task, Arc::new(move |t: &DeployTask| sink.lock().push(t.clone())));
    (seen, subscription)
}

fn write_zip(path: &Path, entries: &[(&str, &[u8])]) {
    let mut writer = ZipWriter::new(std::fs::File::create(path).unwrap());
    for (name, contents) in entries {
        writer.start_file(*name, SimpleFileOptions::default()).unwrap();
        writer.write_all(contents).unwrap();
    }
    writer.finish().unwrap();
}

#[tokio::test]
async fn test_deploy_1_20_5_selects_java_21() {
    let h = harness();
    let task = TaskId::new("deploy-1");
    let (seen, _sub) = record_snapshots(h.service.tracker(), &task);

    let record = h
        .service
        .create_server(request("Test", "1.20.5", Some(&task)))
        .await
        .unwrap();

    let spec = h.runtime.specs.lock()[0].clone();
    assert_eq!(spec.image, "itzg/minecraft-server:java21");
    assert_eq!(spec.env.get("JAVA_VERSION").map(String::as_str), Some("21"));
    assert_eq!(spec.env.get("VERSION").map(String::as_str), Some("1.20.5"));
    assert_eq!(spec.env.get("EULA").map(String::as_str), Some("TRUE"));
    assert_eq!(spec.host_port, record.port);
    assert_eq!(spec.data_dir, record.volume_path);
    assert!(spec.name.starts_with("mc_Test_"));

    let snapshots = seen.lock();
    let percents: Vec<u8> = snapshots.iter().map(|s| s.percent).collect();
    assert!(percents.windows(2).all(|w| w[0] <= w[1]), "{:?}", percents);

    let last = snapshots.last().unwrap();
    assert_eq!(last.percent, 100);
    assert!(last.done);
    assert!(!last.error);
    assert_eq!(last.stage, DeployStage::Done);
    assert_eq!(last.container_id.as_ref(), Some(&record.container_id));
}

#[tokio::test]
async fn test_runtime_hints_override_version_and_loader() {
    let h = harness();
    let mut req = request("Modded", "1.16.5", None);
    req.runtime = RuntimeHints {
        mc_version: Some("1.18.2".to_string()),
        loader: Some(LoaderSpec {
            kind: LoaderKind::Forge,
            version: Some("40.2.0".to_string()),
        }),
    };

    h.service.create_server(req).await.unwrap();
    let spec = h.runtime.specs.lock()[0].clone();
    assert_eq!(spec.image, "itzg/minecraft-server:java17");
    assert_eq!(spec.env.get("VERSION").map(String::as_str), Some("1.18.2"));
    assert_eq!(spec.env.get("TYPE").map(String::as_str), Some("FORGE"));
    assert_eq!(spec.env.get("FORGE_VERSION").map(String::as_str), Some("40.2.0"));
}

#[tokio::test]
async fn test_unreachable_runtime_fails_fast() {
    let h = harness();
    *h.runtime.unreachable.lock() = true;
    let task = TaskId::new("deploy-2");

    let result = h.service.create_server(request("Test", "1.20.1", Some(&task))).await;
    assert!(matches!(result, Err(ProvisionError::RuntimeUnavailable(_))));

    let snapshot = h.service.tracker().snapshot(&task).unwrap();
    assert!(snapshot.done && snapshot.error);
    assert_eq!(snapshot.stage, DeployStage::Failed);
    assert!(h.runtime.specs.lock().is_empty());
}

#[tokio::test]
async fn test_image_pull_falls_back_to_local_cache() {
    let h = harness();
    *h.runtime.pull_fails.lock() = true;

    let result = h.service.create_server(request("Test", "1.12.2", None)).await;
    assert!(matches!(result, Err(ProvisionError::ImageUnavailable { .. })));
    // abandoned server directory is cleaned up
    let leftovers = std::fs::read_dir(&h.root).map(|d| d.count()).unwrap_or(0);
    assert_eq!(leftovers, 0);

    h.runtime
        .cached_images
        .lock()
        .push("itzg/minecraft-server:java8".to_string());
    let record = h.service.create_server(request("Test", "1.12.2", None)).await.unwrap();
    assert_eq!(record.status, ServerStatus::Created);
}

#[tokio::test]
async fn test_cancel_with_delete_after_container_known() {
    let h = harness();
    let task = TaskId::new("deploy-3");
    let record = h
        .service
        .create_server(request("Test", "1.20.1", Some(&task)))
        .await
        .unwrap();

    let snapshot = h.service.cancel_deployment(&task, true).await.unwrap();
    assert_eq!(snapshot.stage, DeployStage::Cancelled);
    assert!(snapshot.done && snapshot.error);

    let listed = h.service.list_servers(OwnerId(1)).await.unwrap();
    assert!(listed.iter().all(|r| r.container_id != record.container_id));
    assert!(!record.server_root().exists());
    assert!(h.runtime.containers.lock().is_empty());
}

#[tokio::test]
async fn test_cancel_requested_mid_deployment_is_honoured_at_checkpoint() {
    let h = harness();
    let task = TaskId::new("deploy-4");
    let tracker = h.service.tracker().clone();
    let cancel_task = task.clone();
    *h.runtime.on_create.lock() = Some(Box::new(move |_| {
        tracker.request_cancel(&cancel_task, true).unwrap();
    }));

    let result = h.service.create_server(request("Test", "1.20.1", Some(&task))).await;
    assert!(matches!(result, Err(ProvisionError::Cancelled(_))));

    let snapshot = h.service.tracker().snapshot(&task).unwrap();
    assert_eq!(snapshot.stage, DeployStage::Cancelled);
    assert!(h.service.list_servers(OwnerId(1)).await.unwrap().is_empty());
    assert!(h.runtime.containers.lock().is_empty());
}

#[tokio::test]
async fn test_cancel_without_delete_keeps_server() {
    let h = harness();
    let task = TaskId::new("deploy-5");
    let tracker = h.service.tracker().clone();
    let cancel_task = task.clone();
    *h.runtime.on_create.lock() = Some(Box::new(move |_| {
        tracker.request_cancel(&cancel_task, false).unwrap();
    }));

    let result = h.service.create_server(request("Keep", "1.20.1", Some(&task))).await;
    assert!(matches!(result, Err(ProvisionError::Cancelled(_))));
    assert_eq!(h.service.list_servers(OwnerId(1)).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_cancel_unknown_task() {
    let h = harness();
    assert!(matches!(
        h.service.cancel_deployment(&TaskId::new("nope"), true).await,
        Err(ProvisionError::Tracker(_))
    ));
}

#[tokio::test]
async fn test_delete_twice_is_not_an_error() {
    let h = harness();
    let record = h.service.create_server(request("Test", "1.20.1", None)).await.unwrap();
    h.service.start_server(&record.container_id).await.unwrap();

    let first = h.service.delete_server(&record.container_id).await.unwrap();
    assert!(first.container_removed && first.record_removed && first.directory_removed);

    let second = h.service.delete_server(&record.container_id).await.unwrap();
    assert!(!second.container_removed && !second.record_removed && !second.directory_removed);
    assert!(h.repository.listing(&record.container_id).is_none());
}

#[tokio::test]
async fn test_start_stop_are_idempotent() {
    let h = harness();
    let record = h.service.create_server(request("Test", "1.20.1", None)).await.unwrap();
    let id = &record.container_id;

    assert_eq!(h.service.start_server(id).await.unwrap(), ServerStatus::Running);
    assert_eq!(h.service.start_server(id).await.unwrap(), ServerStatus::Running);
    assert_eq!(h.service.stop_server(id).await.unwrap(), ServerStatus::Stopped);
    assert_eq!(h.service.stop_server(id).await.unwrap(), ServerStatus::Stopped);

    h.runtime.vanish(id);
    assert!(matches!(h.service.stop_server(id).await, Err(ProvisionError::NotFound(_))));
}

#[tokio::test]
async fn test_listing_reconciles_and_sweep_removes_missing() {
    let h = harness();
    let kept = h.service.create_server(request("Kept", "1.20.1", None)).await.unwrap();
    let gone = h.service.create_server(request("Gone", "1.20.1", None)).await.unwrap();
    h.service.start_server(&kept.container_id).await.unwrap();
    h.runtime.vanish(&gone.container_id);

    let listed = h.service.list_servers(OwnerId(1)).await.unwrap();
    let status_of = |id: &ContainerId| listed.iter().find(|r| &r.container_id == id).map(|r| r.status);
    assert_eq!(status_of(&kept.container_id), Some(ServerStatus::Running));
    assert_eq!(status_of(&gone.container_id), Some(ServerStatus::Missing));

    let swept = h.service.sweep_missing().await.unwrap();
    assert_eq!(swept, vec![gone.container_id.clone()]);
    assert!(!gone.server_root().exists());
    assert_eq!(h.service.list_servers(OwnerId(1)).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_fresh_server_lists_no_files() {
    let h = harness();
    let record = h.service.create_server(request("Test", "1.20.1", None)).await.unwrap();
    let files = FileManager::new(h.repository.clone(), Arc::new(InMemoryClipboardStore::new()));
    assert!(files.list(&record.container_id, "/").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_deploy_with_pack_installs_and_starts() {
    let h = harness();
    let upload_dir = TempDir::new().unwrap();
    let upload = upload_dir.path().join("upload.tmp");
    write_zip(
        &upload,
        &[
            ("overrides/config/common.toml", b"common"),
            ("server-overrides/config/server.toml", b"server"),
        ],
    );

    let task = TaskId::new("deploy-6");
    let (seen, _sub) = record_snapshots(h.service.tracker(), &task);
    let mut req = request("Packed", "1.20.1", Some(&task));
    req.pack = Some(ClientUpload {
        path: upload,
        file_name: "Packed.zip".to_string(),
        kind: "full".to_string(),
    });

    let record = h.service.create_server(req).await.unwrap();
    let data = &record.volume_path;
    assert_eq!(std::fs::read(data.join("config/server.toml")).unwrap(), b"server");
    assert!(!data.join("config/common.toml").exists());
    assert!(data.join("eula.txt").exists());
    assert!(data.join("server.properties").exists());
    assert!(h.service.has_client_config(&record.container_id).await.unwrap());

    let manifest = h.service.client_manifest(&record.container_id).await.unwrap();
    assert!(manifest.iter().any(|e| e.path == "overrides/config/common.toml"));

    let stages: Vec<DeployStage> = seen.lock().iter().map(|s| s.stage).collect();
    assert!(stages.contains(&DeployStage::InstallingPack));
    assert!(stages.contains(&DeployStage::StartingServer));
    assert_eq!(h.service.get_status(&record.container_id).await, ServerStatus::Running);

    let last = seen.lock().last().cloned().unwrap();
    assert!(last.done && !last.error && last.percent == 100);
}
