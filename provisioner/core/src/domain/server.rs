// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::LazyLock;
use thiserror::Error;

/// Directory (sibling of `data/`) holding the client distribution.
pub const CLIENT_DIR_NAME: &str = "ClientForServer";

/// Descriptor written inside the client distribution directory.
pub const CLIENT_DESCRIPTOR_FILE: &str = "client_config.json";

// ============================================================================
// Value Objects
// ============================================================================

/// Identifier assigned to a container by the container runtime
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContainerId(pub String);

impl ContainerId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ContainerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Owning user, as authenticated by the HTTP layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OwnerId(pub i64);

impl std::fmt::Display for OwnerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle status of a server, as last observed from the container runtime.
///
/// The persisted value is a cache of runtime truth and is re-derived on every
/// listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServerStatus {
    Created,
    Running,
    Stopped,
    /// The container no longer exists in the runtime
    Missing,
    /// The runtime could not be asked conclusively
    Unknown,
}

impl ServerStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ServerStatus::Created => "created",
            ServerStatus::Running => "running",
            ServerStatus::Stopped => "stopped",
            ServerStatus::Missing => "missing",
            ServerStatus::Unknown => "unknown",
        }
    }

    /// Normalise a raw runtime state (`running`, `exited`, `paused`, ...).
    pub fn from_runtime_state(state: Option<&str>) -> Self {
        match state {
            None => ServerStatus::Unknown,
            Some("running") | Some("restarting") | Some("paused") => ServerStatus::Running,
            Some("created") => ServerStatus::Created,
            Some(_) => ServerStatus::Stopped,
        }
    }
}

impl std::fmt::Display for ServerStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ServerStatus {
    type Err = ServerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "created" => Ok(ServerStatus::Created),
            "running" => Ok(ServerStatus::Running),
            "stopped" => Ok(ServerStatus::Stopped),
            "missing" => Ok(ServerStatus::Missing),
            "unknown" => Ok(ServerStatus::Unknown),
            other => Err(ServerError::InvalidStatus(other.to_string())),
        }
    }
}

/// Mod loader flavour understood by the server image
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoaderKind {
    Vanilla,
    Fabric,
    Forge,
    NeoForge,
    Quilt,
    Other(String),
}

impl LoaderKind {
    pub fn as_str(&self) -> &str {
        match self {
            LoaderKind::Vanilla => "vanilla",
            LoaderKind::Fabric => "fabric",
            LoaderKind::Forge => "forge",
            LoaderKind::NeoForge => "neoforge",
            LoaderKind::Quilt => "quilt",
            LoaderKind::Other(name) => name,
        }
    }

    /// Name of the environment variable that pins this loader's version.
    pub fn version_variable(&self) -> Option<&'static str> {
        match self {
            LoaderKind::Fabric => Some("FABRIC_LOADER_VERSION"),
            LoaderKind::Forge => Some("FORGE_VERSION"),
            LoaderKind::NeoForge => Some("NEOFORGE_VERSION"),
            _ => None,
        }
    }
}

impl FromStr for LoaderKind {
    type Err = ServerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lowered = s.trim().to_lowercase();
        Ok(match lowered.as_str() {
            "" => return Err(ServerError::InvalidLoader(s.to_string())),
            "vanilla" => LoaderKind::Vanilla,
            "fabric" => LoaderKind::Fabric,
            "forge" => LoaderKind::Forge,
            "neoforge" => LoaderKind::NeoForge,
            "quilt" => LoaderKind::Quilt,
            _ => LoaderKind::Other(lowered),
        })
    }
}

/// Declared mod loader and optional pinned version
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoaderSpec {
    pub kind: LoaderKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

/// JVM heap size passed to the server image (e.g. `2G`, `1536M`)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MemorySpec(String);

static MEMORY_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[1-9][0-9]*[KkMmGg]?$").expect("memory pattern is a valid regex"));

impl MemorySpec {
    pub fn parse(raw: &str) -> Result<Self, ServerError> {
        let trimmed = raw.trim();
        if MEMORY_PATTERN.is_match(trimmed) {
            Ok(Self(trimmed.to_uppercase()))
        } else {
            Err(ServerError::InvalidMemory(raw.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// How a server's client content is distributed (`{type, value}`)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientDistribution {
    #[serde(rename = "type")]
    pub kind: String,
    pub value: String,
}

// ============================================================================
// Aggregates
// ============================================================================

/// A deployed server and its persisted state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerRecord {
    pub container_id: ContainerId,
    pub owner: OwnerId,
    pub name: String,
    pub port: u16,
    /// Host directory bound into the container as `/data`
    pub volume_path: PathBuf,
    pub version: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub loader: Option<LoaderSpec>,
    pub status: ServerStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_distribution: Option<ClientDistribution>,
    pub created_at: DateTime<Utc>,
}

impl ServerRecord {
    /// Per-server directory holding `data/` and `ClientForServer/`.
    /// Removed as a whole when the server is deleted.
    pub fn server_root(&self) -> PathBuf {
        server_root_of(&self.volume_path)
    }

    pub fn client_dir(&self) -> PathBuf {
        self.server_root().join(CLIENT_DIR_NAME)
    }
}

pub(crate) fn server_root_of(volume_path: &Path) -> PathBuf {
    volume_path
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| volume_path.to_path_buf())
}

/// Row in the public server list that accompanies each deployed server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerListing {
    pub container_id: ContainerId,
    pub name: String,
    pub ip_address: String,
    pub port: u16,
    pub description: String,
}

/// Optional overrides for runtime selection supplied with a deploy request
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuntimeHints {
    /// Game version used for image selection; falls back to the declared version
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mc_version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub loader: Option<LoaderSpec>,
}

/// Reduce a user-supplied name to `[a-zA-Z0-9_.-]`, falling back to `server`.
pub fn sanitize_container_name(name: &str) -> String {
    let safe: String = name
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
        .collect();
    if safe.is_empty() {
        "server".to_string()
    } else {
        safe
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ServerError {
    #[error("Invalid server status: {0}")]
    InvalidStatus(String),

    #[error("Invalid loader type: '{0}'")]
    InvalidLoader(String),

    #[error("Invalid memory specification '{0}' (expected e.g. 2G or 1536M)")]
    InvalidMemory(String),
}
