// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! File Manager Application Service
//!
//! Listing, text editing, deletion, folder creation, copy/paste and upload
//! scoped to one server's data volume. Every user-supplied path goes through
//! the [`PathGuard`]; nothing outside the volume is reachable.
//!
//! Paths are relative to the `data/` volume bound into the container, not to
//! the per-server directory above it, so `/` lists the world data.

use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use crate::domain::files::{
    ClipboardEntry, ClipboardKey, ClipboardStore, FileEntry, FileError, FileType,
};
use crate::domain::path_guard::PathGuard;
use crate::domain::repository::ServerRepository;
use crate::domain::server::ContainerId;

/// Default lifetime of a clipboard entry
pub const DEFAULT_CLIPBOARD_TTL: Duration = Duration::from_secs(5 * 60);

pub struct FileManager {
    repository: Arc<dyn ServerRepository>,
    clipboard: Arc<dyn ClipboardStore>,
    guard: PathGuard,
    clipboard_ttl: Duration,
}

impl FileManager {
    pub fn new(repository: Arc<dyn ServerRepository>, clipboard: Arc<dyn ClipboardStore>) -> Self {
        Self {
            repository,
            clipboard,
            guard: PathGuard::new(),
            clipboard_ttl: DEFAULT_CLIPBOARD_TTL,
        }
    }

    pub fn with_clipboard_ttl(mut self, ttl: Duration) -> Self {
        self.clipboard_ttl = ttl;
        self
    }

    async fn volume(&self, server: &ContainerId) -> Result<PathBuf, FileError> {
        self.repository
            .find_by_id(server)
            .await?
            .map(|record| record.volume_path)
            .ok_or_else(|| FileError::ServerNotFound(server.clone()))
    }

    async fn resolve(&self, server: &ContainerId, relative: &str) -> Result<PathBuf, FileError> {
        let volume = self.volume(server).await?;
        Ok(self.guard.resolve(&volume, relative)?)
    }

    /// Entries of the directory at `relative`, directories first, then by
    /// name. A missing directory lists as empty.
    pub async fn list(&self, server: &ContainerId, relative: &str) -> Result<Vec<FileEntry>, FileError> {
        let target = self.resolve(server, relative).await?;

        let mut dir = match tokio::fs::read_dir(&target).await {
            Ok(dir) => dir,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut entries = Vec::new();
        while let Some(entry) = dir.next_entry().await? {
            let metadata = entry.metadata().await?;
            let file_type = if metadata.is_dir() {
                FileType::Directory
            } else {
                FileType::File
            };
            entries.push(FileEntry {
                name: entry.file_name().to_string_lossy().into_owned(),
                file_type,
                size: if metadata.is_dir() { 0 } else { metadata.len() },
                modified: metadata.modified().ok().map(DateTime::<Utc>::from),
            });
        }

        entries.sort_by(|a, b| {
            b.is_directory()
                .cmp(&a.is_directory())
                .then_with(|| a.name.cmp(&b.name))
        });
        Ok(entries)
    }

    async fn existing_file(&self, server: &ContainerId, relative: &str) -> Result<PathBuf, FileError> {
        let target = self.resolve(server, relative).await?;
        let metadata = match tokio::fs::metadata(&target).await {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(FileError::NotFound(relative.to_string()))
            }
            Err(e) => return Err(e.into()),
        };
        if metadata.is_dir() {
            return Err(FileError::IsADirectory(relative.to_string()));
        }
        Ok(target)
    }

    /// UTF-8 contents of an existing file
    pub async fn read(&self, server: &ContainerId, relative: &str) -> Result<String, FileError> {
        let target = self.existing_file(server, relative).await?;
        Ok(tokio::fs::read_to_string(&target).await?)
    }

    /// Replace the contents of an existing file. New files arrive through
    /// [`FileManager::upload`] or [`FileManager::paste`].
    pub async fn write(&self, server: &ContainerId, relative: &str, content: &str) -> Result<(), FileError> {
        let target = self.existing_file(server, relative).await?;
        tokio::fs::write(&target, content).await?;
        debug!(container_id = %server, path = relative, bytes = content.len(), "Wrote file");
        Ok(())
    }

    /// Remove a file or directory tree; a missing target is not an error.
    /// The volume root itself cannot be deleted.
    pub async fn delete(&self, server: &ContainerId, relative: &str) -> Result<(), FileError> {
        let volume = self.volume(server).await?;
        let target = self.guard.resolve(&volume, relative)?;
        if target == volume {
            return Err(FileError::IsADirectory(relative.to_string()));
        }

        let metadata = match tokio::fs::symlink_metadata(&target).await {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e.into()),
        };
        if metadata.is_dir() {
            tokio::fs::remove_dir_all(&target).await?;
        } else {
            tokio::fs::remove_file(&target).await?;
        }
        info!(container_id = %server, path = relative, "Deleted path");
        Ok(())
    }

    pub async fn create_folder(&self, server: &ContainerId, relative: &str) -> Result<(), FileError> {
        let target = self.resolve(server, relative).await?;
        tokio::fs::create_dir_all(&target).await?;
        Ok(())
    }

    /// Remember `relative` for a later [`FileManager::paste`].
    ///
    /// Expired clipboard entries of every server are pruned first.
    pub async fn copy(&self, server: &ContainerId, relative: &str) -> Result<(), FileError> {
        let source = self.existing_file(server, relative).await?;

        let now = Utc::now();
        let pruned = self.clipboard.prune_expired(self.clipboard_ttl, now);
        if pruned > 0 {
            debug!(pruned, "Pruned expired clipboard entries");
        }

        self.clipboard.put(
            ClipboardKey::new(server, relative),
            ClipboardEntry {
                source,
                server: server.clone(),
                created_at: now,
            },
        );
        Ok(())
    }

    /// Copy the file previously copied from `source_relative` to
    /// `target_relative`, creating parent directories as needed.
    pub async fn paste(
        &self,
        server: &ContainerId,
        target_relative: &str,
        source_relative: &str,
    ) -> Result<(), FileError> {
        let target = self.resolve(server, target_relative).await?;

        let key = ClipboardKey::new(server, source_relative);
        let entry = self.clipboard.get(&key).ok_or(FileError::NoCopiedFile)?;
        if entry.is_expired(self.clipboard_ttl, Utc::now()) {
            self.clipboard.remove(&key);
            return Err(FileError::NoCopiedFile);
        }

        if !tokio::fs::try_exists(&entry.source).await? {
            return Err(FileError::SourceGone);
        }

        if target == entry.source {
            debug!(container_id = %server, file = target_relative, "Paste onto its own source, nothing to copy");
            self.clipboard.remove(&key);
            return Ok(());
        }

        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        copy_into_place(&entry.source, &target).await?;
        self.clipboard.remove(&key);

        info!(
            container_id = %server,
            from = source_relative,
            to = target_relative,
            "Pasted file"
        );
        Ok(())
    }

    /// Move an uploaded temporary file into the volume as `file_name`
    pub async fn upload(&self, server: &ContainerId, file_name: &str, temp_path: &Path) -> Result<PathBuf, FileError> {
        let target = self.resolve(server, file_name).await?;
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        if tokio::fs::rename(temp_path, &target).await.is_err() {
            // cross-device moves fall back to copy + remove
            tokio::fs::copy(temp_path, &target).await?;
            tokio::fs::remove_file(temp_path).await?;
        }
        info!(container_id = %server, file = file_name, "Uploaded file");
        Ok(target)
    }

    /// Drop clipboard entries older than the TTL
    pub fn prune_clipboard(&self) -> usize {
        self.clipboard.prune_expired(self.clipboard_ttl, Utc::now())
    }
}

/// Copy `source` to a sibling of `target`, then rename it over `target`.
/// A failed copy leaves any existing `target` untouched.
async fn copy_into_place(source: &Path, target: &Path) -> Result<(), FileError> {
    let file_name = target
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let staging = target.with_file_name(format!(".{}.paste-{}", file_name, uuid::Uuid::new_v4()));

    if let Err(e) = tokio::fs::copy(source, &staging).await {
        let _ = tokio::fs::remove_file(&staging).await;
        return Err(e.into());
    }
    if let Err(e) = tokio::fs::rename(&staging, target).await {
        let _ = tokio::fs::remove_file(&staging).await;
        return Err(e.into());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::path_guard::PathGuardError;
    use crate::domain::server::{OwnerId, ServerRecord, ServerStatus};
    use crate::infrastructure::clipboard::InMemoryClipboardStore;
    use crate::infrastructure::repositories::InMemoryServerRepository;
    use tempfile::TempDir;

    async fn setup() -> (TempDir, FileManager, Arc<InMemoryClipboardStore>, ContainerId) {
        let dir = TempDir::new().unwrap();
        let volume = dir.path().join("alpha_1").join("data");
        std::fs::create_dir_all(&volume).unwrap();

        let repo = Arc::new(InMemoryServerRepository::new());
        let id = ContainerId::new("c1");
        repo.save(&ServerRecord {
            container_id: id.clone(),
            owner: OwnerId(1),
            name: "alpha".into(),
            port: 30000,
            volume_path: volume,
            version: "1.20.1".into(),
            loader: None,
            status: ServerStatus::Created,
            client_distribution: None,
            created_at: Utc::now(),
        })
        .await
        .unwrap();

        let clipboard = Arc::new(InMemoryClipboardStore::new());
        let manager = FileManager::new(repo, clipboard.clone());
        (dir, manager, clipboard, id)
    }

    #[tokio::test]
    async fn test_list_empty_and_missing() {
        let (_dir, fm, _, id) = setup().await;
        assert!(fm.list(&id, "/").await.unwrap().is_empty());
        assert!(fm.list(&id, "world/region").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_list_orders_directories_first() {
        let (dir, fm, _, id) = setup().await;
        fm.create_folder(&id, "mods").await.unwrap();
        let tmp = dir.path().join("a.tmp");
        std::fs::write(&tmp, b"hello").unwrap();
        fm.upload(&id, "a.txt", &tmp).await.unwrap();
        assert!(!tmp.exists());

        let entries = fm.list(&id, "").await.unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].name, "mods");
        assert!(entries[0].is_directory());
        assert_eq!(entries[1].name, "a.txt");
        assert_eq!(entries[1].size, 5);
    }

    #[tokio::test]
    async fn test_read_write_errors() {
        let (_dir, fm, _, id) = setup().await;
        assert!(matches!(fm.read(&id, "nope.txt").await, Err(FileError::NotFound(_))));
        fm.create_folder(&id, "config").await.unwrap();
        assert!(matches!(fm.read(&id, "config").await, Err(FileError::IsADirectory(_))));
        assert!(matches!(fm.write(&id, "new.txt", "x").await, Err(FileError::NotFound(_))));
        assert!(matches!(
            fm.read(&id, "../../etc/passwd").await,
            Err(FileError::InvalidPath(PathGuardError::InvalidPath(_)))
        ));
        assert!(matches!(
            fm.list(&ContainerId::new("ghost"), "/").await,
            Err(FileError::ServerNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_write_then_read() {
        let (dir, fm, _, id) = setup().await;
        std::fs::write(dir.path().join("alpha_1/data/server.properties"), "motd=a\n").unwrap();
        fm.write(&id, "/server.properties", "motd=b\n").await.unwrap();
        assert_eq!(fm.read(&id, "server.properties").await.unwrap(), "motd=b\n");
    }

    #[tokio::test]
    async fn test_delete_is_idempotent_and_protects_root() {
        let (_dir, fm, _, id) = setup().await;
        fm.create_folder(&id, "world/region").await.unwrap();
        fm.delete(&id, "world").await.unwrap();
        fm.delete(&id, "world").await.unwrap();
        assert!(fm.list(&id, "/").await.unwrap().is_empty());
        assert!(fm.delete(&id, "/").await.is_err());
    }

    #[tokio::test]
    async fn test_copy_paste_roundtrip_consumes_entry() {
        let (dir, fm, clipboard, id) = setup().await;
        let bytes = [0u8, 159, 146, 150, 255];
        std::fs::write(dir.path().join("alpha_1/data/level.dat"), bytes).unwrap();

        fm.copy(&id, "level.dat").await.unwrap();
        fm.paste(&id, "backup/level.dat", "level.dat").await.unwrap();

        assert_eq!(std::fs::read(dir.path().join("alpha_1/data/backup/level.dat")).unwrap(), bytes);
        assert!(clipboard.is_empty());
        assert!(matches!(
            fm.paste(&id, "backup/again.dat", "level.dat").await,
            Err(FileError::NoCopiedFile)
        ));
    }

    #[tokio::test]
    async fn test_paste_onto_source_keeps_contents() {
        let (dir, fm, clipboard, id) = setup().await;
        let source = dir.path().join("alpha_1/data/a.txt");
        std::fs::write(&source, b"precious world data").unwrap();

        fm.copy(&id, "a.txt").await.unwrap();
        fm.paste(&id, "/a.txt", "a.txt").await.unwrap();

        assert_eq!(std::fs::read(&source).unwrap(), b"precious world data");
        assert!(clipboard.is_empty());
    }

    #[tokio::test]
    async fn test_paste_overwrites_existing_target_without_leftovers() {
        let (dir, fm, _clipboard, id) = setup().await;
        let data = dir.path().join("alpha_1/data");
        std::fs::write(data.join("a.txt"), b"new").unwrap();
        std::fs::write(data.join("b.txt"), b"old contents").unwrap();

        fm.copy(&id, "a.txt").await.unwrap();
        fm.paste(&id, "b.txt", "a.txt").await.unwrap();

        assert_eq!(std::fs::read(data.join("b.txt")).unwrap(), b"new");
        let mut names: Vec<String> = std::fs::read_dir(&data)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        assert_eq!(names, vec!["a.txt", "b.txt"]);
    }

    #[tokio::test]
    async fn test_paste_after_expiry_or_source_removal() {
        let (dir, fm, clipboard, id) = setup().await;
        let source = dir.path().join("alpha_1/data/a.txt");
        std::fs::write(&source, b"a").unwrap();

        clipboard.put(
            ClipboardKey::new(&id, "a.txt"),
            ClipboardEntry {
                source: source.clone(),
                server: id.clone(),
                created_at: Utc::now() - chrono::Duration::minutes(6),
            },
        );
        assert!(matches!(fm.paste(&id, "b.txt", "a.txt").await, Err(FileError::NoCopiedFile)));
        assert!(clipboard.is_empty());

        fm.copy(&id, "a.txt").await.unwrap();
        std::fs::remove_file(&source).unwrap();
        assert!(matches!(fm.paste(&id, "b.txt", "a.txt").await, Err(FileError::SourceGone)));
    }

    #[tokio::test]
    async fn test_copy_prunes_stale_entries() {
        let (dir, fm, clipboard, id) = setup().await;
        std::fs::write(dir.path().join("alpha_1/data/a.txt"), b"a").unwrap();
        clipboard.put(
            ClipboardKey::new(&ContainerId::new("other"), "x"),
            ClipboardEntry {
                source: PathBuf::from("/gone"),
                server: ContainerId::new("other"),
                created_at: Utc::now() - chrono::Duration::minutes(10),
            },
        );

        fm.copy(&id, "a.txt").await.unwrap();
        assert_eq!(clipboard.len(), 1);
        assert!(clipboard.get(&ClipboardKey::new(&id, "a.txt")).is_some());
    }
}
