// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use thiserror::Error;

use crate::domain::server::{ContainerId, LoaderKind, LoaderSpec, MemorySpec};

/// Port the Minecraft server listens on inside the container.
pub const MINECRAFT_CONTAINER_PORT: u16 = 25565;

/// Mount point of the data volume inside the container.
pub const CONTAINER_DATA_PATH: &str = "/data";

/// Everything needed to create one server container
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContainerSpec {
    pub name: String,
    pub image: String,
    pub env: HashMap<String, String>,
    /// Host directory bound at [`CONTAINER_DATA_PATH`]
    pub data_dir: PathBuf,
    pub container_port: u16,
    pub host_port: u16,
    pub tty: bool,
    pub open_stdin: bool,
}

impl ContainerSpec {
    /// Environment understood by the server image
    pub fn server_env(
        memory: &MemorySpec,
        mc_version: Option<&str>,
        java_major: u32,
        loader: Option<&LoaderSpec>,
    ) -> HashMap<String, String> {
        let mut env = HashMap::new();
        env.insert("EULA".to_string(), "TRUE".to_string());
        env.insert("MEMORY".to_string(), memory.as_str().to_string());
        if let Some(version) = mc_version.filter(|v| !v.trim().is_empty()) {
            env.insert("VERSION".to_string(), version.to_string());
        }
        env.insert("JAVA_VERSION".to_string(), java_major.to_string());
        env.insert("JAVA_VERSION_OVERRIDE".to_string(), java_major.to_string());

        if let Some(loader) = loader {
            if loader.kind != LoaderKind::Vanilla {
                env.insert("TYPE".to_string(), loader.kind.as_str().to_uppercase());
                if let (Some(var), Some(version)) = (loader.kind.version_variable(), &loader.version) {
                    env.insert(var.to_string(), version.clone());
                }
            }
        }
        env
    }

    /// `"<host_dir>:/data"` bind string
    pub fn data_bind(&self) -> String {
        format!("{}:{}", self.data_dir.display(), CONTAINER_DATA_PATH)
    }

    /// `"<port>/tcp"` key used for exposure and port bindings
    pub fn port_key(&self) -> String {
        format!("{}/tcp", self.container_port)
    }
}

/// Subset of an inspect response the lifecycle manager cares about
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerInspection {
    pub id: ContainerId,
    /// Raw runtime state (`running`, `exited`, ...), if reported
    pub state: Option<String>,
}

/// Classification of a runtime failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RuntimeErrorKind {
    /// The engine could not be reached at all
    Unavailable,
    /// The referenced container or image does not exist (404)
    NotFound,
    /// Start/stop requested for a container already in that state (304)
    AlreadyInState,
    Other,
}

#[derive(Debug, Error)]
#[error("{message}")]
pub struct RuntimeError {
    pub kind: RuntimeErrorKind,
    pub message: String,
}

impl RuntimeError {
    pub fn new(kind: RuntimeErrorKind, message: impl Into<String>) -> Self {
        Self { kind, message: message.into() }
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(RuntimeErrorKind::Unavailable, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(RuntimeErrorKind::NotFound, message)
    }

    pub fn already_in_state(message: impl Into<String>) -> Self {
        Self::new(RuntimeErrorKind::AlreadyInState, message)
    }

    pub fn other(message: impl Into<String>) -> Self {
        Self::new(RuntimeErrorKind::Other, message)
    }

    pub fn is(&self, kind: RuntimeErrorKind) -> bool {
        self.kind == kind
    }
}

/// Run a cleanup step, swallowing only the error kinds listed in `benign`.
///
/// Returns `Ok(true)` when the step succeeded, `Ok(false)` when it failed with
/// a benign kind, and the error itself otherwise.
pub fn tolerate<T>(
    result: Result<T, RuntimeError>,
    benign: &[RuntimeErrorKind],
) -> Result<bool, RuntimeError> {
    match result {
        Ok(_) => Ok(true),
        Err(e) if benign.contains(&e.kind) => {
            tracing::debug!(kind = ?e.kind, error = %e, "Ignoring benign runtime error");
            Ok(false)
        }
        Err(e) => Err(e),
    }
}

/// Container engine the lifecycle manager drives
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Cheap reachability probe
    async fn ping(&self) -> Result<(), RuntimeError>;

    async fn pull_image(&self, image: &str) -> Result<(), RuntimeError>;

    async fn image_exists(&self, image: &str) -> Result<bool, RuntimeError>;

    async fn create_container(&self, spec: &ContainerSpec) -> Result<ContainerId, RuntimeError>;

    async fn start_container(&self, id: &ContainerId) -> Result<(), RuntimeError>;

    async fn stop_container(&self, id: &ContainerId) -> Result<(), RuntimeError>;

    async fn inspect_container(&self, id: &ContainerId) -> Result<ContainerInspection, RuntimeError>;

    /// Forced removal, including a running container
    async fn remove_container(&self, id: &ContainerId) -> Result<(), RuntimeError>;
}
