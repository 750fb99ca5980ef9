// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Provisioner Configuration Types
//
// Defines the configuration schema for a provisioner node, including:
// - Kubernetes-style manifest format (apiVersion/kind/metadata/spec)
// - Server storage location and persistence backend
// - Container runtime connection and server image
// - Host port allocation range
// - Maintenance intervals (missing-container sweep, clipboard and task expiry)
// - Logging settings

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::domain::repository::{PostgresConfig, StorageBackend};
use crate::domain::runtime::MINECRAFT_CONTAINER_PORT;

pub const API_VERSION: &str = "anchor.mc/v1";
pub const KIND: &str = "ProvisionerConfig";

/// Top-level Kubernetes-style provisioner configuration manifest
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvisionerConfigManifest {
    /// API version (must be "anchor.mc/v1")
    #[serde(rename = "apiVersion")]
    pub api_version: String,

    /// Resource kind (must be "ProvisionerConfig")
    pub kind: String,

    pub metadata: ManifestMetadata,

    #[serde(default)]
    pub spec: ProvisionerConfigSpec,
}

/// Manifest metadata (Kubernetes-style)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestMetadata {
    /// Human-readable node name
    pub name: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub labels: Option<HashMap<String, String>>,
}

/// Configuration content under spec:
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProvisionerConfigSpec {
    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub runtime: RuntimeConfig,

    #[serde(default)]
    pub ports: PortsConfig,

    #[serde(default)]
    pub maintenance: MaintenanceConfig,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub observability: Option<ObservabilityConfig>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    #[default]
    Memory,
    Postgres,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Directory holding one subdirectory per server
    #[serde(default = "default_servers_root")]
    pub servers_root: PathBuf,

    #[serde(default)]
    pub backend: BackendKind,

    /// PostgreSQL connection string (required for the postgres backend)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub database_url: Option<String>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            servers_root: default_servers_root(),
            backend: BackendKind::Memory,
            database_url: None,
        }
    }
}

impl StorageConfig {
    pub fn storage_backend(&self) -> StorageBackend {
        match (self.backend, &self.database_url) {
            (BackendKind::Postgres, Some(url)) => StorageBackend::PostgreSQL(PostgresConfig {
                connection_string: url.clone(),
            }),
            _ => StorageBackend::InMemory,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// Docker socket or endpoint; local defaults when absent
    #[serde(skip_serializing_if = "Option::is_none")]
    pub docker_socket: Option<String>,

    /// Server image repository; the tag is `java<N>`
    #[serde(default = "default_image_repository")]
    pub image_repository: String,

    #[serde(default = "default_container_port")]
    pub container_port: u16,

    /// Reachability probe timeout in seconds
    #[serde(default = "default_ping_timeout")]
    pub ping_timeout_secs: u64,

    /// Graceful stop timeout in seconds before the runtime kills the server
    #[serde(default = "default_stop_timeout")]
    pub stop_timeout_secs: u64,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            docker_socket: None,
            image_repository: default_image_repository(),
            container_port: default_container_port(),
            ping_timeout_secs: default_ping_timeout(),
            stop_timeout_secs: default_stop_timeout(),
        }
    }
}

impl RuntimeConfig {
    pub fn ping_timeout(&self) -> Duration {
        Duration::from_secs(self.ping_timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortsConfig {
    #[serde(default = "default_range_start")]
    pub range_start: u16,

    #[serde(default = "default_range_end")]
    pub range_end: u16,

    /// Draws attempted before accepting an unchecked port
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Address published in the public server listing
    #[serde(default = "default_public_host")]
    pub public_host: String,
}

impl Default for PortsConfig {
    fn default() -> Self {
        Self {
            range_start: default_range_start(),
            range_end: default_range_end(),
            max_attempts: default_max_attempts(),
            public_host: default_public_host(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MaintenanceConfig {
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,

    #[serde(default = "default_clipboard_ttl")]
    pub clipboard_ttl_secs: u64,

    /// How long finished deploy tasks stay queryable
    #[serde(default = "default_task_retention")]
    pub task_retention_secs: u64,
}

impl Default for MaintenanceConfig {
    fn default() -> Self {
        Self {
            sweep_interval_secs: default_sweep_interval(),
            clipboard_ttl_secs: default_clipboard_ttl(),
            task_retention_secs: default_task_retention(),
        }
    }
}

impl MaintenanceConfig {
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    pub fn clipboard_ttl(&self) -> Duration {
        Duration::from_secs(self.clipboard_ttl_secs)
    }

    pub fn task_retention(&self) -> Duration {
        Duration::from_secs(self.task_retention_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub logging: Option<LoggingConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (e.g., "info", "debug", "trace")
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Output format ("json" or "text")
    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_servers_root() -> PathBuf {
    PathBuf::from("./minecraft_servers")
}

fn default_image_repository() -> String {
    "itzg/minecraft-server".to_string()
}

fn default_container_port() -> u16 {
    MINECRAFT_CONTAINER_PORT
}

fn default_ping_timeout() -> u64 {
    5
}

fn default_stop_timeout() -> u64 {
    30
}

fn default_range_start() -> u16 {
    10000
}

fn default_range_end() -> u16 {
    65535
}

fn default_max_attempts() -> u32 {
    20
}

fn default_public_host() -> String {
    "127.0.0.1".to_string()
}

fn default_sweep_interval() -> u64 {
    300
}

fn default_clipboard_ttl() -> u64 {
    300
}

fn default_task_retention() -> u64 {
    3600
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}

impl Default for ProvisionerConfigManifest {
    fn default() -> Self {
        let hostname = hostname::get()
            .ok()
            .and_then(|h| h.into_string().ok())
            .unwrap_or_else(|| "anchor-node".to_string());

        Self {
            api_version: API_VERSION.to_string(),
            kind: KIND.to_string(),
            metadata: ManifestMetadata {
                name: hostname,
                version: Some("1.0.0".to_string()),
                labels: None,
            },
            spec: ProvisionerConfigSpec::default(),
        }
    }
}

impl ProvisionerConfigManifest {
    /// Load configuration from YAML file
    pub fn from_yaml_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to YAML file
    pub fn to_yaml_file(&self, path: impl AsRef<Path>) -> anyhow::Result<()> {
        let yaml = serde_yaml::to_string(self)?;
        std::fs::write(path, yaml)?;
        Ok(())
    }

    /// Parse configuration from YAML string
    pub fn from_yaml_str(yaml: &str) -> anyhow::Result<Self> {
        let config = serde_yaml::from_str(yaml)?;
        Ok(config)
    }

    /// Discover configuration file using precedence order
    /// 1. ANCHOR_CONFIG_PATH environment variable
    /// 2. ./anchor-config.yaml (working directory)
    /// 3. ~/.anchor/config.yaml (user home)
    /// 4. /etc/anchor/config.yaml (system, Unix) or C:\ProgramData\Anchor\config.yaml (Windows)
    pub fn discover_config() -> Option<PathBuf> {
        if let Ok(path) = std::env::var("ANCHOR_CONFIG_PATH") {
            let path = PathBuf::from(path);
            if path.exists() {
                return Some(path);
            }
        }

        let cwd = PathBuf::from("./anchor-config.yaml");
        if cwd.exists() {
            return Some(cwd);
        }

        if let Some(home) = dirs::home_dir() {
            let user_config = home.join(".anchor").join("config.yaml");
            if user_config.exists() {
                return Some(user_config);
            }
        }

        #[cfg(unix)]
        let system_config = PathBuf::from("/etc/anchor/config.yaml");
        #[cfg(windows)]
        let system_config = PathBuf::from("C:\\ProgramData\\Anchor\\config.yaml");

        if system_config.exists() {
            return Some(system_config);
        }

        None
    }

    /// Load configuration with discovery, fallback to default
    pub fn load_or_default(cli_path: Option<PathBuf>) -> anyhow::Result<Self> {
        if let Some(path) = cli_path {
            tracing::info!("Loading configuration from explicit path: {:?}", path);
            let mut config = Self::from_yaml_file(&path)
                .map_err(|e| anyhow::anyhow!("Failed to load config at {:?}: {}", path, e))?;
            config.apply_env_overrides();
            return Ok(config);
        }

        if let Some(config_path) = Self::discover_config() {
            tracing::info!("Loading configuration from discovered path: {:?}", config_path);
            let mut config = Self::from_yaml_file(config_path)?;
            config.apply_env_overrides();
            Ok(config)
        } else {
            tracing::warn!("No configuration file found in standard locations. Using defaults.");
            let mut config = Self::default();
            config.apply_env_overrides();
            Ok(config)
        }
    }

    /// Best-effort load used before logging is initialised: unreadable or
    /// missing files yield the defaults instead of an error.
    pub fn from_yaml_file_or_default(cli_path: Option<PathBuf>) -> Self {
        cli_path
            .or_else(Self::discover_config)
            .and_then(|path| Self::from_yaml_file(path).ok())
            .unwrap_or_default()
    }

    /// Apply environment variable overrides to configuration
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|key| std::env::var(key).ok());
    }

    /// Apply overrides from an arbitrary variable source
    pub fn apply_overrides_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(val) = lookup("ANCHOR_SERVERS_ROOT") {
            tracing::info!("Environment override: ANCHOR_SERVERS_ROOT={}", val);
            self.spec.storage.servers_root = PathBuf::from(val);
        }

        if let Some(val) = lookup("ANCHOR_DATABASE_URL") {
            tracing::info!("Environment override: ANCHOR_DATABASE_URL (postgres backend)");
            self.spec.storage.database_url = Some(val);
            self.spec.storage.backend = BackendKind::Postgres;
        }

        if let Some(val) = lookup("ANCHOR_DOCKER_SOCKET") {
            tracing::info!("Environment override: ANCHOR_DOCKER_SOCKET={}", val);
            self.spec.runtime.docker_socket = Some(val);
        }

        if let Some(val) = lookup("ANCHOR_IMAGE_REPOSITORY") {
            tracing::info!("Environment override: ANCHOR_IMAGE_REPOSITORY={}", val);
            self.spec.runtime.image_repository = val;
        }

        if let Some(val) = lookup("ANCHOR_PUBLIC_HOST") {
            tracing::info!("Environment override: ANCHOR_PUBLIC_HOST={}", val);
            self.spec.ports.public_host = val;
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.api_version != API_VERSION {
            anyhow::bail!("Invalid apiVersion: '{}'. Must be '{}'", self.api_version, API_VERSION);
        }

        if self.kind != KIND {
            anyhow::bail!("Invalid kind: '{}'. Must be '{}'", self.kind, KIND);
        }

        if self.metadata.name.is_empty() {
            anyhow::bail!("metadata.name cannot be empty");
        }

        if self.spec.storage.servers_root.as_os_str().is_empty() {
            anyhow::bail!("spec.storage.servers_root cannot be empty");
        }

        if self.spec.storage.backend == BackendKind::Postgres
            && self.spec.storage.database_url.as_deref().is_none_or(str::is_empty)
        {
            anyhow::bail!("spec.storage.database_url is required for the postgres backend");
        }

        if self.spec.runtime.image_repository.is_empty() {
            anyhow::bail!("spec.runtime.image_repository cannot be empty");
        }

        let ports = &self.spec.ports;
        if ports.range_start == 0 || ports.range_start > ports.range_end {
            anyhow::bail!(
                "Invalid port range {}-{}: start must be non-zero and not above end",
                ports.range_start,
                ports.range_end
            );
        }

        if ports.max_attempts == 0 {
            anyhow::bail!("spec.ports.max_attempts must be at least 1");
        }

        if self.spec.maintenance.sweep_interval_secs == 0 {
            anyhow::bail!("spec.maintenance.sweep_interval_secs must be greater than zero");
        }

        if self.spec.runtime.ping_timeout_secs == 0 {
            anyhow::bail!("spec.runtime.ping_timeout_secs must be greater than zero");
        }

        Ok(())
    }

    /// Effective logging settings
    pub fn logging(&self) -> LoggingConfig {
        self.spec
            .observability
            .as_ref()
            .and_then(|o| o.logging.clone())
            .unwrap_or_else(|| LoggingConfig {
                level: default_log_level(),
                format: default_log_format(),
            })
    }
}
