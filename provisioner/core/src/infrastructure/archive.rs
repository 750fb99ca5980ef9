// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Zip Archive Access
//!
//! Blocking reader over `.zip`, `.mrpack` and `.jar` files. Callers on the
//! async path wrap these calls in `tokio::task::spawn_blocking`.
//!
//! # Architecture
//!
//! - **Layer:** Infrastructure Layer
//! - **Purpose:** Archive reading and guarded extraction

use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use zip::result::ZipError;
use zip::ZipArchive;

use crate::domain::modpack::{normalize_entry_name, InstallError, ModMetadata};
use crate::domain::path_guard::PathGuard;

fn zip_error(path: &Path, err: ZipError) -> InstallError {
    match err {
        ZipError::Io(e) => InstallError::Io(e),
        other => InstallError::PackFormat(format!("{}: {}", path.display(), other)),
    }
}

pub struct PackArchive {
    path: PathBuf,
    archive: ZipArchive<File>,
}

impl PackArchive {
    pub fn open(path: &Path) -> Result<Self, InstallError> {
        let file = File::open(path)?;
        let archive = ZipArchive::new(file).map_err(|e| zip_error(path, e))?;
        Ok(Self {
            path: path.to_path_buf(),
            archive,
        })
    }

    /// Raw entry names in archive order
    pub fn entry_names(&self) -> Vec<String> {
        self.archive.file_names().map(str::to_string).collect()
    }

    /// UTF-8 contents of `name`, or `None` if the archive has no such entry
    pub fn read_text(&mut self, name: &str) -> Result<Option<String>, InstallError> {
        let mut entry = match self.archive.by_name(name) {
            Ok(entry) => entry,
            Err(ZipError::FileNotFound) => return Ok(None),
            Err(e) => return Err(zip_error(&self.path, e)),
        };
        let mut text = String::new();
        entry.read_to_string(&mut text)?;
        Ok(Some(text))
    }

    /// Extract every entry for which `resolve` yields a data-relative path.
    ///
    /// Targets are joined onto `dest` through `guard`; an entry that would
    /// escape fails the whole extraction. Returns the number of files written.
    pub fn extract_with(
        &mut self,
        dest: &Path,
        guard: &PathGuard,
        resolve: impl Fn(&str) -> Option<String>,
    ) -> Result<usize, InstallError> {
        let mut written = 0;

        for index in 0..self.archive.len() {
            let mut entry = self.archive.by_index(index).map_err(|e| zip_error(&self.path, e))?;
            let Some(relative) = resolve(entry.name()) else {
                continue;
            };

            let target = guard.resolve(dest, &relative)?;
            if entry.is_dir() {
                std::fs::create_dir_all(&target)?;
                continue;
            }

            if let Some(parent) = target.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let mut out = File::create(&target)?;
            std::io::copy(&mut entry, &mut out)?;
            written += 1;
        }

        tracing::debug!(archive = %self.path.display(), dest = %dest.display(), written, "Extracted archive");
        Ok(written)
    }

    /// Extract the whole archive verbatim beneath `dest`
    pub fn extract_all(&mut self, dest: &Path, guard: &PathGuard) -> Result<usize, InstallError> {
        self.extract_with(dest, guard, |name| {
            let normalized = normalize_entry_name(name);
            let trimmed = normalized.trim_matches('/');
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        })
    }

    /// First embedded loader metadata file found, in probe order
    pub fn loader_metadata(&mut self) -> Result<Option<(ModMetadata, String)>, InstallError> {
        for metadata in ModMetadata::PROBE_ORDER {
            if let Some(text) = self.read_text(metadata.entry_name())? {
                return Ok(Some((metadata, text)));
            }
        }
        Ok(None)
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::io::Write;
    use std::path::Path;
    use zip::write::SimpleFileOptions;
    use zip::ZipWriter;

    /// Write a zip at `path` holding `(name, contents)` entries
    pub fn write_zip(path: &Path, entries: &[(&str, &[u8])]) {
        let file = std::fs::File::create(path).unwrap();
        let mut writer = ZipWriter::new(file);
        for (name, contents) in entries {
            if name.ends_with('/') {
                writer.add_directory(*name, SimpleFileOptions::default()).unwrap();
            } else {
                writer.start_file(*name, SimpleFileOptions::default()).unwrap();
                writer.write_all(contents).unwrap();
            }
        }
        writer.finish().unwrap();
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::write_zip;
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_read_text_missing_entry_is_none() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a.zip");
        write_zip(&path, &[("fabric.mod.json", br#"{"environment":"client"}"#)]);

        let mut archive = PackArchive::open(&path).unwrap();
        assert!(archive.read_text("quilt.mod.json").unwrap().is_none());
        let (kind, text) = archive.loader_metadata().unwrap().unwrap();
        assert_eq!(kind, ModMetadata::Fabric);
        assert!(text.contains("client"));
    }

    #[test]
    fn test_extract_all_and_traversal() {
        let dir = TempDir::new().unwrap();
        let dest = dir.path().join("out");
        std::fs::create_dir_all(&dest).unwrap();

        let good = dir.path().join("good.zip");
        write_zip(&good, &[("options.txt", b"fov:90"), ("config/", b""), ("config/a.toml", b"x=1")]);
        let mut archive = PackArchive::open(&good).unwrap();
        assert_eq!(archive.extract_all(&dest, &PathGuard::new()).unwrap(), 2);
        assert_eq!(std::fs::read(dest.join("config/a.toml")).unwrap(), b"x=1");

        let evil = dir.path().join("evil.zip");
        write_zip(&evil, &[("../../escape.txt", b"nope")]);
        let mut archive = PackArchive::open(&evil).unwrap();
        assert!(matches!(
            archive.extract_all(&dest, &PathGuard::new()),
            Err(InstallError::InvalidPath(_))
        ));
        assert!(!dir.path().join("escape.txt").exists());
    }

    #[test]
    fn test_open_non_zip_is_format_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("broken.zip");
        std::fs::write(&path, b"definitely not a zip").unwrap();
        assert!(matches!(PackArchive::open(&path), Err(InstallError::PackFormat(_))));
    }
}
