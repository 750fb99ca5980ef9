// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Path Guard Domain Service
//!
//! Joins user-supplied relative paths onto a server-owned base directory and
//! refuses any result that would land outside that base. Every filesystem
//! operation performed on behalf of a caller (file manager, archive extraction,
//! manifest downloads, client file lookup) resolves its target through here.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Traversal-safe path resolution for server data volumes

use std::path::{Component, Path, PathBuf};
use thiserror::Error;

/// Path guard errors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PathGuardError {
    #[error("Invalid path: {0}")]
    InvalidPath(String),

    #[error("Path too long: {0}")]
    PathTooLong(String),
}

/// Path guard domain service
///
/// Resolution is purely lexical: `.` segments are dropped, `..` segments pop
/// the previously pushed segment, and leading separators are ignored so that
/// `"/config"` and `"config"` address the same file. A `..` that would climb
/// above the base is rejected rather than clamped.
///
/// Backslashes are treated as separators because archive entry names and
/// browser uploads from Windows clients routinely contain them.
#[derive(Debug, Clone)]
pub struct PathGuard {
    /// Maximum allowed relative path length (default: 4096)
    max_path_len: usize,
}

impl PathGuard {
    /// Create a new path guard with default settings
    pub fn new() -> Self {
        Self { max_path_len: 4096 }
    }

    /// Create a path guard with custom max length
    pub fn with_max_length(max_path_len: usize) -> Self {
        Self { max_path_len }
    }

    /// Resolve `relative` beneath `base`
    ///
    /// An empty relative path, `"/"` or `"."` resolves to `base` itself.
    ///
    /// # Examples
    /// ```
    /// use anchor_provisioner_core::domain::path_guard::PathGuard;
    /// use std::path::{Path, PathBuf};
    ///
    /// let guard = PathGuard::new();
    /// let base = Path::new("/srv/servers/alpha");
    ///
    /// let ok = guard.resolve(base, "data/server.properties").unwrap();
    /// assert_eq!(ok, PathBuf::from("/srv/servers/alpha/data/server.properties"));
    ///
    /// assert!(guard.resolve(base, "../../etc/passwd").is_err());
    /// ```
    pub fn resolve(&self, base: &Path, relative: &str) -> Result<PathBuf, PathGuardError> {
        if relative.len() > self.max_path_len {
            return Err(PathGuardError::PathTooLong(relative.to_string()));
        }

        if relative.contains('\0') {
            tracing::warn!(path = %relative.escape_debug(), "Path contains null byte");
            return Err(PathGuardError::InvalidPath(relative.to_string()));
        }

        let unified = relative.replace('\\', "/");
        let mut segments: Vec<&std::ffi::OsStr> = Vec::new();

        for component in Path::new(&unified).components() {
            match component {
                Component::Prefix(_) | Component::RootDir | Component::CurDir => {}
                Component::Normal(part) => segments.push(part),
                Component::ParentDir => {
                    if segments.pop().is_none() {
                        tracing::warn!(
                            path = %relative,
                            base = %base.display(),
                            "Path traversal attempt detected"
                        );
                        return Err(PathGuardError::InvalidPath(relative.to_string()));
                    }
                }
            }
        }

        let mut resolved = base.to_path_buf();
        resolved.extend(segments);

        if !resolved.starts_with(base) {
            tracing::warn!(
                path = %relative,
                base = %base.display(),
                "Resolved path escapes base directory"
            );
            return Err(PathGuardError::InvalidPath(relative.to_string()));
        }

        Ok(resolved)
    }

    /// Express `absolute` relative to `base` using forward slashes
    ///
    /// Used to report archive and manifest paths back to clients in a
    /// platform-independent form.
    pub fn relative_to(&self, base: &Path, absolute: &Path) -> Result<String, PathGuardError> {
        let stripped = absolute
            .strip_prefix(base)
            .map_err(|_| PathGuardError::InvalidPath(absolute.display().to_string()))?;

        let parts: Vec<String> = stripped
            .components()
            .filter_map(|c| match c {
                Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
                _ => None,
            })
            .collect();

        Ok(parts.join("/"))
    }
}

impl Default for PathGuard {
    fn default() -> Self {
        Self::new()
    }
}
