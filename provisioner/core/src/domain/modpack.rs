// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Modpack Domain
//!
//! Pack formats, archive root rules, client-only mod classification and the
//! client distribution descriptors. Everything here is pure; reading archives
//! and touching disk happens in `infrastructure::archive` and
//! `application::modpack_installer`.
//!
//! # Archive roots
//!
//! Generic zip packs are laid out inconsistently. Entries are mapped into the
//! server data directory by [`ArchiveLayout`], which evaluates an ordered rule
//! list, first match wins:
//!
//! | Order | Root                | Rewrite                       |
//! |-------|---------------------|-------------------------------|
//! | 1     | `server-overrides/` | strip root (exclusive if present anywhere) |
//! | 2     | `overrides/`        | strip root                    |
//! | 3     | `mods/`, `config/`, `defaultconfigs/`, `kubejs/`, `scripts/`, `datapacks/`, `global_packs/` | keep from the content dir |
//! | 4     | `server/`           | strip root                    |
//!
//! A root matches at the start of an entry name or nested one level or more
//! below it (`MyPack/overrides/...`).

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::LazyLock;
use thiserror::Error;

use crate::domain::path_guard::PathGuardError;

/// Index file at the root of a `.mrpack` archive.
pub const MRPACK_INDEX_FILE: &str = "modrinth.index.json";

// ============================================================================
// Pack formats
// ============================================================================

/// Archive family, detected by file extension
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PackFormat {
    /// Index-manifest pack: JSON index of downloads plus override roots
    Mrpack,
    /// Generic zip: implicit file tree under conventional roots
    Zip,
}

impl PackFormat {
    pub fn from_file_name(name: &str) -> Option<Self> {
        let lowered = name.to_lowercase();
        if lowered.ends_with(".mrpack") {
            Some(PackFormat::Mrpack)
        } else if lowered.ends_with(".zip") {
            Some(PackFormat::Zip)
        } else {
            None
        }
    }
}

/// `modrinth.index.json`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MrpackIndex {
    #[serde(default)]
    pub format_version: Option<u32>,
    #[serde(default)]
    pub game: Option<String>,
    #[serde(default)]
    pub version_id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub files: Vec<MrpackFile>,
    #[serde(default)]
    pub dependencies: HashMap<String, String>,
}

impl MrpackIndex {
    pub fn parse(text: &str) -> Result<Self, InstallError> {
        serde_json::from_str(text)
            .map_err(|e| InstallError::PackFormat(format!("Invalid {}: {}", MRPACK_INDEX_FILE, e)))
    }

    /// Files that belong on a server, in index order
    pub fn server_files(&self) -> impl Iterator<Item = &MrpackFile> {
        self.files.iter().filter(|f| f.is_server_supported())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MrpackFile {
    /// Target path relative to the data directory; entries without one are skipped
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub hashes: HashMap<String, String>,
    #[serde(default)]
    pub env: Option<MrpackEnv>,
    #[serde(default)]
    pub downloads: Vec<String>,
    #[serde(default)]
    pub file_size: Option<u64>,
}

impl MrpackFile {
    /// Only an explicit `unsupported` server environment excludes a file
    pub fn is_server_supported(&self) -> bool {
        !self
            .env
            .as_ref()
            .and_then(|env| env.server.as_deref())
            .is_some_and(|side| side.eq_ignore_ascii_case("unsupported"))
    }

    /// Declared target path, if present and non-blank
    pub fn target_path(&self) -> Option<&str> {
        self.path.as_deref().filter(|p| !p.trim().is_empty())
    }

    pub fn primary_download(&self) -> Option<&str> {
        self.downloads.first().map(String::as_str)
    }

    pub fn sha1(&self) -> Option<&str> {
        self.hashes.get("sha1").map(String::as_str)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MrpackEnv {
    #[serde(default)]
    pub client: Option<String>,
    #[serde(default)]
    pub server: Option<String>,
}

// ============================================================================
// Archive root rules
// ============================================================================

/// How a matched entry path is rewritten
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RootRewrite {
    /// Drop everything up to and including the root directory
    StripRoot,
    /// Drop everything before the root directory, keep the root itself
    KeepRoot,
}

/// One `(predicate, rewrite)` rule of the archive layout
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RootRule {
    pub root: &'static str,
    pub rewrite: RootRewrite,
    /// Also match the root below a wrapper directory
    pub nested: bool,
}

impl RootRule {
    const fn strip(root: &'static str) -> Self {
        Self { root, rewrite: RootRewrite::StripRoot, nested: true }
    }

    const fn keep(root: &'static str) -> Self {
        Self { root, rewrite: RootRewrite::KeepRoot, nested: true }
    }

    const fn top_level(self) -> Self {
        Self { nested: false, ..self }
    }

    /// Byte offset of the root directory inside `name`, if it occurs at the
    /// start or (for nested rules) after a separator
    fn locate(&self, name: &str) -> Option<usize> {
        let dir = format!("{}/", self.root);
        if name.starts_with(&dir) {
            return Some(0);
        }
        if !self.nested {
            return None;
        }
        name.find(&format!("/{}", dir)).map(|idx| idx + 1)
    }

    pub fn matches(&self, name: &str) -> bool {
        self.locate(name).is_some()
    }

    /// Rewritten data-relative path; `None` when the rule does not match
    pub fn apply(&self, name: &str) -> Option<String> {
        let start = self.locate(name)?;
        let rewritten = match self.rewrite {
            RootRewrite::StripRoot => &name[start + self.root.len() + 1..],
            RootRewrite::KeepRoot => &name[start..],
        };
        Some(rewritten.to_string())
    }
}

pub const SERVER_OVERRIDES_ROOT: RootRule = RootRule::strip("server-overrides");
pub const OVERRIDES_ROOT: RootRule = RootRule::strip("overrides");
pub const SERVER_ROOT: RootRule = RootRule::strip("server");

/// Conventional content directories copied from wherever they appear
pub const CONTENT_DIRS: [&str; 7] = [
    "mods",
    "config",
    "defaultconfigs",
    "kubejs",
    "scripts",
    "datapacks",
    "global_packs",
];

/// Ordered root rules for a particular archive
#[derive(Debug, Clone)]
pub struct ArchiveLayout {
    rules: Vec<RootRule>,
}

impl ArchiveLayout {
    /// Layout for a generic zip pack, given all of its entry names
    pub fn detect<'a>(names: impl IntoIterator<Item = &'a str>) -> Self {
        let has_server_overrides = names
            .into_iter()
            .any(|name| SERVER_OVERRIDES_ROOT.matches(&normalize_entry_name(name)));

        if has_server_overrides {
            return Self { rules: vec![SERVER_OVERRIDES_ROOT] };
        }

        let mut rules = vec![OVERRIDES_ROOT];
        rules.extend(CONTENT_DIRS.iter().map(|dir| RootRule::keep(dir)));
        rules.push(SERVER_ROOT);
        Self { rules }
    }

    /// Layout for the override roots of an index-manifest pack. Only
    /// top-level roots count there.
    pub fn mrpack_overrides<'a>(names: impl IntoIterator<Item = &'a str>) -> Self {
        let top_server_overrides = SERVER_OVERRIDES_ROOT.top_level();
        let has_server_overrides = names
            .into_iter()
            .any(|name| top_server_overrides.matches(&normalize_entry_name(name)));
        let root = if has_server_overrides { top_server_overrides } else { OVERRIDES_ROOT.top_level() };
        Self { rules: vec![root] }
    }

    pub fn rules(&self) -> &[RootRule] {
        &self.rules
    }

    /// Data-relative target for `entry_name`, or `None` if the entry is not
    /// part of the server content
    pub fn resolve(&self, entry_name: &str) -> Option<String> {
        let name = normalize_entry_name(entry_name);
        let rewritten = self.rules.iter().find_map(|rule| rule.apply(&name))?;
        let trimmed = rewritten.trim_matches('/');
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    }
}

/// Archive entry names with Windows separators unified
pub fn normalize_entry_name(name: &str) -> String {
    name.replace('\\', "/")
}

// ============================================================================
// Client-only mod classification
// ============================================================================

/// Filename fragments of well-known client-only mods
pub const CLIENT_ONLY_NAME_HINTS: [&str; 14] = [
    "sodium",
    "iris",
    "oculus",
    "optifine",
    "embeddium",
    "rubidium",
    "entityculling",
    "entity_culling",
    "litematica",
    "malilib",
    "minihud",
    "xaerominimap",
    "xaeroworldmap",
    "journeymap",
];

pub fn is_client_only_by_name(file_name: &str) -> bool {
    let lowered = file_name.to_lowercase();
    CLIENT_ONLY_NAME_HINTS.iter().any(|hint| lowered.contains(hint))
}

/// Embedded loader metadata conventions, inspected in this order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModMetadata {
    Fabric,
    Quilt,
    Forge,
    NeoForge,
}

impl ModMetadata {
    pub const PROBE_ORDER: [ModMetadata; 4] = [
        ModMetadata::Fabric,
        ModMetadata::Quilt,
        ModMetadata::Forge,
        ModMetadata::NeoForge,
    ];

    /// Entry name of the metadata file inside the jar
    pub fn entry_name(&self) -> &'static str {
        match self {
            ModMetadata::Fabric => "fabric.mod.json",
            ModMetadata::Quilt => "quilt.mod.json",
            ModMetadata::Forge => "META-INF/mods.toml",
            ModMetadata::NeoForge => "META-INF/neoforge.mods.toml",
        }
    }

    /// Whether `text` declares a client-only environment.
    ///
    /// Unparseable metadata is an error; callers keep such jars.
    pub fn declares_client_only(&self, text: &str) -> Result<bool, serde_json::Error> {
        match self {
            ModMetadata::Fabric => {
                let value: serde_json::Value = serde_json::from_str(text)?;
                Ok(environment_is_client(value.get("environment")))
            }
            ModMetadata::Quilt => {
                let value: serde_json::Value = serde_json::from_str(text)?;
                let candidates = [
                    value.get("environment"),
                    value.pointer("/metadata/environment"),
                    value.pointer("/quilt_loader/metadata/environment"),
                ];
                let declared = candidates
                    .into_iter()
                    .flatten()
                    .find(|v| v.as_str().is_some_and(|s| !s.is_empty()));
                Ok(environment_is_client(declared))
            }
            ModMetadata::Forge | ModMetadata::NeoForge => {
                Ok(TOML_CLIENT_ONLY.iter().any(|pattern| pattern.is_match(text)))
            }
        }
    }
}

static TOML_CLIENT_ONLY: LazyLock<[Regex; 3]> = LazyLock::new(|| {
    [
        Regex::new(r"(?i)clientSideOnly\s*=\s*true").expect("valid regex"),
        Regex::new(r"(?i)clientOnly\s*=\s*true").expect("valid regex"),
        Regex::new(r#"(?i)side\s*=\s*"CLIENT""#).expect("valid regex"),
    ]
});

fn environment_is_client(value: Option<&serde_json::Value>) -> bool {
    value
        .and_then(|v| v.as_str())
        .is_some_and(|env| env.eq_ignore_ascii_case("client"))
}

// ============================================================================
// Client distribution
// ============================================================================

/// One file a client must hold to match the server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientManifestEntry {
    /// Forward-slash path relative to the client distribution directory
    pub path: String,
    pub size: u64,
    /// Lowercase hex SHA-256
    pub hash: String,
}

/// `client_config.json` written next to the client distribution content
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientDistributionDescriptor {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub main_file: Option<String>,
    pub updated_at: DateTime<Utc>,
}

/// Default kind of a client upload
pub const DEFAULT_CLIENT_KIND: &str = "full";

/// Kind recorded for an upload that is kept as a single file
pub fn stored_file_kind(kind: &str) -> String {
    if kind == DEFAULT_CLIENT_KIND {
        "modpack".to_string()
    } else {
        kind.to_string()
    }
}

// ============================================================================
// Downloads & errors
// ============================================================================

/// Fetches manifest-listed files
#[async_trait]
pub trait PackDownloader: Send + Sync {
    async fn download(&self, url: &str) -> Result<Bytes, InstallError>;
}

/// What an installation did
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstallReport {
    pub format: Option<PackFormat>,
    /// Files written from the archive itself
    pub extracted: usize,
    /// Files fetched from manifest download URLs
    pub downloaded: usize,
    /// Manifest entries skipped as server-unsupported or lacking a URL
    pub skipped: usize,
    /// Client-only jars deleted from `mods/`
    pub removed_client_mods: usize,
}

#[derive(Debug, Error)]
pub enum InstallError {
    #[error("Unsupported pack format: {0}")]
    UnsupportedFormat(String),

    #[error("Pack format error: {0}")]
    PackFormat(String),

    #[error(transparent)]
    InvalidPath(#[from] PathGuardError),

    #[error("Download of {url} failed: {message}")]
    Download { url: String, message: String },

    #[error("Hash mismatch for {path}: expected {expected}, got {actual}")]
    HashMismatch {
        path: String,
        expected: String,
        actual: String,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
