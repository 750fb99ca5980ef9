// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Server File Management Types
//!
//! Directory entries returned by the file manager, the copy clipboard that
//! backs copy/paste between paths of one server, and file operation errors.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use crate::domain::path_guard::PathGuardError;
use crate::domain::repository::RepositoryError;
use crate::domain::server::ContainerId;

/// File type for directory entries
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum FileType {
    File,
    Directory,
}

/// Directory entry
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct FileEntry {
    /// File/directory name (not including path)
    pub name: String,
    pub file_type: FileType,
    /// Size in bytes (0 for directories)
    pub size: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub modified: Option<DateTime<Utc>>,
}

impl FileEntry {
    pub fn is_directory(&self) -> bool {
        self.file_type == FileType::Directory
    }
}

/// Clipboard key: one copied path per server
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ClipboardKey {
    pub server: ContainerId,
    pub source_relative: String,
}

impl ClipboardKey {
    pub fn new(server: &ContainerId, source_relative: impl Into<String>) -> Self {
        Self {
            server: server.clone(),
            source_relative: source_relative.into(),
        }
    }
}

/// A copied file awaiting paste
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClipboardEntry {
    /// Guard-resolved absolute source path
    pub source: PathBuf,
    pub server: ContainerId,
    pub created_at: DateTime<Utc>,
}

impl ClipboardEntry {
    pub fn is_expired(&self, ttl: Duration, now: DateTime<Utc>) -> bool {
        let ttl = chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::MAX);
        now.signed_duration_since(self.created_at) > ttl
    }
}

/// Process-owned clipboard table
pub trait ClipboardStore: Send + Sync {
    fn put(&self, key: ClipboardKey, entry: ClipboardEntry);

    fn get(&self, key: &ClipboardKey) -> Option<ClipboardEntry>;

    fn remove(&self, key: &ClipboardKey) -> Option<ClipboardEntry>;

    /// Drop entries older than `ttl`, returning how many were dropped
    fn prune_expired(&self, ttl: Duration, now: DateTime<Utc>) -> usize;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn clear(&self);
}

/// File manager errors
#[derive(Debug, Error)]
pub enum FileError {
    #[error("Server not found: {0}")]
    ServerNotFound(ContainerId),

    #[error("File not found: {0}")]
    NotFound(String),

    #[error("Is a directory: {0}")]
    IsADirectory(String),

    #[error(transparent)]
    InvalidPath(#[from] PathGuardError),

    #[error("No copied file found")]
    NoCopiedFile,

    #[error("Source file no longer exists")]
    SourceGone,

    #[error(transparent)]
    Repository(#[from] RepositoryError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
