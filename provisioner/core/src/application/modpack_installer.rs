// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Modpack Installer Application Service
//!
//! Materialises modpack content on disk:
//! - Server provisioning from `.mrpack` (index + overrides + downloads) and
//!   generic `.zip` packs (root-detected file tree)
//! - Client-only mod filtering of the resulting `mods/` directory
//! - First-boot defaults (`eula.txt`, `server.properties`)
//! - Client distribution directory publishing and its download manifest
//!
//! Archive and hashing work runs on the blocking pool.

use chrono::Utc;
use sha1::Sha1;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::domain::modpack::{
    is_client_only_by_name, stored_file_kind, ArchiveLayout, ClientDistributionDescriptor,
    ClientManifestEntry, InstallError, InstallReport, MrpackIndex, PackDownloader, PackFormat,
    MRPACK_INDEX_FILE,
};
use crate::domain::path_guard::PathGuard;
use crate::domain::server::CLIENT_DESCRIPTOR_FILE;
use crate::infrastructure::archive::PackArchive;

/// Longest motd written into a fresh `server.properties`
pub const MOTD_MAX_CHARS: usize = 58;

const DEFAULT_MOTD: &str = "Minecraft Server";

/// A file uploaded for client distribution
#[derive(Debug, Clone)]
pub struct ClientUpload {
    /// Temporary location of the uploaded bytes
    pub path: PathBuf,
    /// Name the file was uploaded under; decides the pack format
    pub file_name: String,
    /// Distribution kind (`full`, `modpack`, ...)
    pub kind: String,
}

impl ClientUpload {
    pub fn format(&self) -> Option<PackFormat> {
        PackFormat::from_file_name(&self.file_name)
    }
}

pub struct ModpackInstaller {
    guard: PathGuard,
    downloader: Arc<dyn PackDownloader>,
}

async fn blocking<T, F>(f: F) -> Result<T, InstallError>
where
    F: FnOnce() -> Result<T, InstallError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| InstallError::Io(std::io::Error::other(format!("Blocking task failed: {}", e))))?
}

impl ModpackInstaller {
    pub fn new(downloader: Arc<dyn PackDownloader>) -> Self {
        Self {
            guard: PathGuard::new(),
            downloader,
        }
    }

    /// Install `archive` (named `pack_name`) into `data_dir` and strip
    /// client-only mods from the result
    pub async fn install_pack_to_server_data(
        &self,
        archive: &Path,
        pack_name: &str,
        data_dir: &Path,
    ) -> Result<InstallReport, InstallError> {
        let format = PackFormat::from_file_name(pack_name)
            .ok_or_else(|| InstallError::UnsupportedFormat(pack_name.to_string()))?;

        info!(pack = pack_name, ?format, data_dir = %data_dir.display(), "Installing pack into server data");
        tokio::fs::create_dir_all(data_dir).await?;

        let mut report = match format {
            PackFormat::Zip => self.install_zip(archive, data_dir).await?,
            PackFormat::Mrpack => self.install_mrpack(archive, data_dir).await?,
        };
        report.format = Some(format);
        report.removed_client_mods = self.remove_client_only_mods(&data_dir.join("mods")).await?;

        info!(
            pack = pack_name,
            extracted = report.extracted,
            downloaded = report.downloaded,
            skipped = report.skipped,
            removed_client_mods = report.removed_client_mods,
            "Pack installed"
        );
        Ok(report)
    }

    async fn install_zip(&self, archive: &Path, data_dir: &Path) -> Result<InstallReport, InstallError> {
        let archive = archive.to_path_buf();
        let data_dir = data_dir.to_path_buf();
        let guard = self.guard.clone();

        let extracted = blocking(move || {
            let mut pack = PackArchive::open(&archive)?;
            let names = pack.entry_names();
            let layout = ArchiveLayout::detect(names.iter().map(String::as_str));
            pack.extract_with(&data_dir, &guard, |name| layout.resolve(name))
        })
        .await?;

        Ok(InstallReport {
            extracted,
            ..Default::default()
        })
    }

    async fn install_mrpack(&self, archive: &Path, data_dir: &Path) -> Result<InstallReport, InstallError> {
        let archive = archive.to_path_buf();
        let target = data_dir.to_path_buf();
        let guard = self.guard.clone();

        let (index, extracted) = blocking(move || {
            let mut pack = PackArchive::open(&archive)?;
            let text = pack
                .read_text(MRPACK_INDEX_FILE)?
                .ok_or_else(|| InstallError::PackFormat(format!("Missing {}", MRPACK_INDEX_FILE)))?;
            let index = MrpackIndex::parse(&text)?;

            let names = pack.entry_names();
            let layout = ArchiveLayout::mrpack_overrides(names.iter().map(String::as_str));
            let extracted = pack.extract_with(&target, &guard, |name| layout.resolve(name))?;
            Ok((index, extracted))
        })
        .await?;

        let mut report = InstallReport {
            extracted,
            ..Default::default()
        };

        for file in &index.files {
            let Some(path) = file.target_path() else {
                warn!("Pack file entry has no path, skipping");
                report.skipped += 1;
                continue;
            };
            if !file.is_server_supported() {
                debug!(path, "Skipping server-unsupported pack file");
                report.skipped += 1;
                continue;
            }
            let Some(url) = file.primary_download() else {
                warn!(path, "Pack file has no download URL");
                report.skipped += 1;
                continue;
            };

            let target = self.guard.resolve(data_dir, path)?;
            let bytes = self.downloader.download(url).await?;

            if let Some(expected) = file.sha1() {
                let actual = hex::encode(Sha1::digest(&bytes));
                if !actual.eq_ignore_ascii_case(expected) {
                    return Err(InstallError::HashMismatch {
                        path: path.to_string(),
                        expected: expected.to_string(),
                        actual,
                    });
                }
            }

            if let Some(parent) = target.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            tokio::fs::write(&target, &bytes).await?;
            report.downloaded += 1;
        }

        Ok(report)
    }

    /// Delete every client-only `.jar` directly inside `mods_dir`.
    ///
    /// A missing directory removes nothing. Jars whose metadata cannot be
    /// read or parsed are kept.
    pub async fn remove_client_only_mods(&self, mods_dir: &Path) -> Result<usize, InstallError> {
        let mods_dir = mods_dir.to_path_buf();
        blocking(move || remove_client_only_mods_blocking(&mods_dir)).await
    }

    /// Write `eula.txt` and a minimal `server.properties` unless present
    pub async fn ensure_server_defaults(&self, data_dir: &Path, display_name: &str) -> Result<(), InstallError> {
        tokio::fs::create_dir_all(data_dir).await?;

        let eula = data_dir.join("eula.txt");
        if !tokio::fs::try_exists(&eula).await? {
            tokio::fs::write(&eula, "eula=true\n").await?;
        }

        let properties = data_dir.join("server.properties");
        if !tokio::fs::try_exists(&properties).await? {
            tokio::fs::write(&properties, default_server_properties(display_name)).await?;
            debug!(path = %properties.display(), "Wrote default server.properties");
        }
        Ok(())
    }

    /// Replace `client_dir` with the uploaded content and its descriptor
    pub async fn publish_client_distribution(
        &self,
        client_dir: &Path,
        upload: &ClientUpload,
    ) -> Result<ClientDistributionDescriptor, InstallError> {
        match tokio::fs::remove_dir_all(client_dir).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        tokio::fs::create_dir_all(client_dir).await?;

        let extract = upload.format() == Some(PackFormat::Zip) && upload.kind != "modpack";
        let descriptor = if extract {
            let source = upload.path.clone();
            let dest = client_dir.to_path_buf();
            let guard = self.guard.clone();
            let files = blocking(move || PackArchive::open(&source)?.extract_all(&dest, &guard)).await?;
            debug!(files, dir = %client_dir.display(), "Extracted client distribution");

            ClientDistributionDescriptor {
                kind: upload.kind.clone(),
                main_file: None,
                updated_at: Utc::now(),
            }
        } else {
            let target = self.guard.resolve(client_dir, &upload.file_name)?;
            tokio::fs::copy(&upload.path, &target).await?;

            ClientDistributionDescriptor {
                kind: stored_file_kind(&upload.kind),
                main_file: Some(self.guard.relative_to(client_dir, &target)?),
                updated_at: Utc::now(),
            }
        };

        let json = serde_json::to_vec(&descriptor)
            .map_err(|e| InstallError::PackFormat(format!("Failed to encode descriptor: {}", e)))?;
        tokio::fs::write(client_dir.join(CLIENT_DESCRIPTOR_FILE), json).await?;

        info!(dir = %client_dir.display(), kind = %descriptor.kind, "Published client distribution");
        Ok(descriptor)
    }

    /// Path, size and SHA-256 of every file under `client_dir`, sorted by
    /// path. A missing directory yields an empty manifest.
    pub async fn build_client_manifest(&self, client_dir: &Path) -> Result<Vec<ClientManifestEntry>, InstallError> {
        let root = client_dir.to_path_buf();
        let guard = self.guard.clone();
        blocking(move || build_manifest_blocking(&root, &guard)).await
    }
}

fn default_server_properties(display_name: &str) -> String {
    let flattened = display_name.replace("\r\n", " ").replace('\n', " ");
    let motd: String = if flattened.is_empty() {
        DEFAULT_MOTD.to_string()
    } else {
        flattened.chars().take(MOTD_MAX_CHARS).collect()
    };

    [
        format!("motd={}", motd),
        "online-mode=true".to_string(),
        "allow-flight=false".to_string(),
        "enable-command-block=false".to_string(),
        "max-players=20".to_string(),
        "view-distance=10".to_string(),
        "sync-chunk-writes=false".to_string(),
    ]
    .join("\n")
        + "\n"
}

fn is_client_only_jar(path: &Path) -> bool {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    if is_client_only_by_name(&name) {
        return true;
    }

    let metadata = PackArchive::open(path).and_then(|mut jar| jar.loader_metadata());
    match metadata {
        Ok(Some((kind, text))) => kind.declares_client_only(&text).unwrap_or_else(|e| {
            debug!(jar = %name, ?kind, error = %e, "Unparseable mod metadata, keeping jar");
            false
        }),
        Ok(None) => false,
        Err(e) => {
            debug!(jar = %name, error = %e, "Unreadable jar, keeping it");
            false
        }
    }
}

fn remove_client_only_mods_blocking(mods_dir: &Path) -> Result<usize, InstallError> {
    let entries = match std::fs::read_dir(mods_dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(e.into()),
    };

    let mut removed = 0;
    for entry in entries {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let path = entry.path();
        let is_jar = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("jar"));
        if is_jar && is_client_only_jar(&path) {
            std::fs::remove_file(&path)?;
            info!(jar = %path.display(), "Removed client-only mod");
            removed += 1;
        }
    }
    Ok(removed)
}

fn build_manifest_blocking(root: &Path, guard: &PathGuard) -> Result<Vec<ClientManifestEntry>, InstallError> {
    if !root.is_dir() {
        return Ok(Vec::new());
    }

    let mut entries = Vec::new();
    for entry in WalkDir::new(root).follow_links(false) {
        let entry = entry.map_err(|e| InstallError::Io(std::io::Error::other(e)))?;
        if !entry.file_type().is_file() {
            continue;
        }

        let mut file = std::fs::File::open(entry.path())?;
        let mut hasher = Sha256::new();
        let size = std::io::copy(&mut file, &mut hasher)?;

        entries.push(ClientManifestEntry {
            path: guard.relative_to(root, entry.path())?,
            size,
            hash: hex::encode(hasher.finalize()),
        });
    }

    entries.sort_by(|a, b| a.path.cmp(&b.path));
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::archive::test_support::write_zip;
    use async_trait::async_trait;
    use bytes::Bytes;
    use std::collections::HashMap;
    use tempfile::TempDir;

    struct StaticDownloader(HashMap<String, Bytes>);

    #[async_trait]
    impl PackDownloader for StaticDownloader {
        async fn download(&self, url: &str) -> Result<Bytes, InstallError> {
            self.0.get(url).cloned().ok_or_else(|| InstallError::Download {
                url: url.to_string(),
                message: "404".into(),
            })
        }
    }

    fn installer(files: &[(&str, &[u8])]) -> ModpackInstaller {
        let map = files
            .iter()
            .map(|(url, body)| (url.to_string(), Bytes::copy_from_slice(body)))
            .collect();
        ModpackInstaller::new(Arc::new(StaticDownloader(map)))
    }

    #[tokio::test]
    async fn test_zip_server_overrides_win() {
        let dir = TempDir::new().unwrap();
        let pack = dir.path().join("pack.zip");
        write_zip(
            &pack,
            &[
                ("overrides/config/generic.toml", b"generic"),
                ("server-overrides/config/server.toml", b"server"),
            ],
        );
        let data = dir.path().join("data");

        let report = installer(&[]).install_pack_to_server_data(&pack, "pack.zip", &data).await.unwrap();
        assert_eq!(report.extracted, 1);
        assert_eq!(std::fs::read(data.join("config/server.toml")).unwrap(), b"server");
        assert!(!data.join("config/generic.toml").exists());
    }

    #[tokio::test]
    async fn test_mrpack_downloads_server_files_and_verifies_hash() {
        let dir = TempDir::new().unwrap();
        let jar = b"server-capable jar bytes";
        let sha1 = hex::encode(Sha1::digest(jar));
        let index = format!(
            r#"{{"formatVersion":1,"game":"minecraft","versionId":"1","name":"p","files":[
                {{"path":"mods/server.jar","hashes":{{"sha1":"{sha1}"}},"downloads":["https://cdn/server.jar"],"env":{{"client":"required","server":"required"}}}},
                {{"path":"mods/client.jar","downloads":["https://cdn/client.jar"],"env":{{"client":"required","server":"unsupported"}}}}
            ]}}"#
        );
        let pack = dir.path().join("p.mrpack");
        write_zip(
            &pack,
            &[
                (MRPACK_INDEX_FILE, index.as_bytes()),
                ("overrides/config/a.toml", b"a=1"),
            ],
        );
        let data = dir.path().join("data");

        let report = installer(&[("https://cdn/server.jar", jar)])
            .install_pack_to_server_data(&pack, "p.mrpack", &data)
            .await
            .unwrap();

        assert_eq!(report.downloaded, 1);
        assert_eq!(report.skipped, 1);
        assert_eq!(report.extracted, 1);
        assert_eq!(std::fs::read(data.join("mods/server.jar")).unwrap(), jar);
        assert!(!data.join("mods/client.jar").exists());
    }

    #[tokio::test]
    async fn test_mrpack_entry_without_path_is_skipped() {
        let dir = TempDir::new().unwrap();
        let index = r#"{"files":[
            {"downloads":["https://cdn/orphan.jar"]},
            {"path":"mods/kept.jar","downloads":["https://cdn/kept.jar"]}
        ]}"#;
        let pack = dir.path().join("p.mrpack");
        write_zip(&pack, &[(MRPACK_INDEX_FILE, index.as_bytes())]);
        let data = dir.path().join("data");

        let report = installer(&[("https://cdn/kept.jar", b"kept")])
            .install_pack_to_server_data(&pack, "p.mrpack", &data)
            .await
            .unwrap();

        assert_eq!(report.downloaded, 1);
        assert_eq!(report.skipped, 1);
        assert_eq!(std::fs::read(data.join("mods/kept.jar")).unwrap(), b"kept");
    }

    #[tokio::test]
    async fn test_mrpack_hash_mismatch_fails() {
        let dir = TempDir::new().unwrap();
        let index = r#"{"files":[{"path":"mods/a.jar","hashes":{"sha1":"00"},"downloads":["https://cdn/a.jar"]}]}"#;
        let pack = dir.path().join("p.mrpack");
        write_zip(&pack, &[(MRPACK_INDEX_FILE, index.as_bytes())]);

        let result = installer(&[("https://cdn/a.jar", b"tampered")])
            .install_pack_to_server_data(&pack, "p.mrpack", &dir.path().join("data"))
            .await;
        assert!(matches!(result, Err(InstallError::HashMismatch { .. })));
    }

    #[tokio::test]
    async fn test_mrpack_without_index_is_format_error() {
        let dir = TempDir::new().unwrap();
        let pack = dir.path().join("p.mrpack");
        write_zip(&pack, &[("overrides/a.txt", b"a")]);
        let result = installer(&[])
            .install_pack_to_server_data(&pack, "p.mrpack", &dir.path().join("data"))
            .await;
        assert!(matches!(result, Err(InstallError::PackFormat(_))));
    }

    #[tokio::test]
    async fn test_unknown_extension_rejected() {
        let dir = TempDir::new().unwrap();
        let result = installer(&[])
            .install_pack_to_server_data(&dir.path().join("x.rar"), "x.rar", &dir.path().join("data"))
            .await;
        assert!(matches!(result, Err(InstallError::UnsupportedFormat(_))));
    }

    #[tokio::test]
    async fn test_client_only_filtering() {
        let dir = TempDir::new().unwrap();
        let mods = dir.path().join("mods");
        std::fs::create_dir_all(&mods).unwrap();

        write_zip(&mods.join("zoom.jar"), &[("fabric.mod.json", br#"{"id":"zoom","environment":"client"}"#)]);
        write_zip(&mods.join("hud.jar"), &[("META-INF/mods.toml", b"[[mods]]\nclientSideOnly=true\n")]);
        write_zip(&mods.join("lib.jar"), &[("fabric.mod.json", br#"{"id":"lib","environment":"*"}"#)]);
        write_zip(&mods.join("plain.jar"), &[("com/example/A.class", b"\xca\xfe")]);
        write_zip(&mods.join("broken.jar"), &[("fabric.mod.json", b"{ not json")]);
        std::fs::write(mods.join("sodium-fabric.jar"), b"not even a zip").unwrap();
        std::fs::write(mods.join("notes.txt"), b"sodium").unwrap();

        let removed = installer(&[]).remove_client_only_mods(&mods).await.unwrap();
        assert_eq!(removed, 3);
        assert!(!mods.join("zoom.jar").exists());
        assert!(!mods.join("hud.jar").exists());
        assert!(!mods.join("sodium-fabric.jar").exists());
        assert!(mods.join("lib.jar").exists());
        assert!(mods.join("plain.jar").exists());
        assert!(mods.join("broken.jar").exists());
        assert!(mods.join("notes.txt").exists());
    }

    #[tokio::test]
    async fn test_missing_mods_dir_removes_nothing() {
        let dir = TempDir::new().unwrap();
        assert_eq!(installer(&[]).remove_client_only_mods(&dir.path().join("mods")).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_server_defaults_never_overwrite() {
        let dir = TempDir::new().unwrap();
        let data = dir.path().join("data");
        let installer = installer(&[]);

        let long_name = format!("Line one\nLine two {}", "x".repeat(80));
        installer.ensure_server_defaults(&data, &long_name).await.unwrap();
        let props = std::fs::read_to_string(data.join("server.properties")).unwrap();
        let motd = props.lines().next().unwrap().trim_start_matches("motd=");
        assert_eq!(motd.chars().count(), MOTD_MAX_CHARS);
        assert!(motd.starts_with("Line one Line two"));
        assert!(props.contains("online-mode=true\n"));
        assert_eq!(std::fs::read_to_string(data.join("eula.txt")).unwrap(), "eula=true\n");

        std::fs::write(data.join("server.properties"), "motd=custom\n").unwrap();
        installer.ensure_server_defaults(&data, "Other").await.unwrap();
        assert_eq!(std::fs::read_to_string(data.join("server.properties")).unwrap(), "motd=custom\n");
    }

    #[test]
    fn test_empty_name_uses_default_motd() {
        assert!(default_server_properties("").starts_with("motd=Minecraft Server\n"));
    }

    #[tokio::test]
    async fn test_publish_extracts_plain_zip_and_builds_manifest() {
        let dir = TempDir::new().unwrap();
        let upload_path = dir.path().join("upload.tmp");
        write_zip(&upload_path, &[("mods/a.jar", b"aaa"), ("options.txt", b"fov:90")]);
        let client_dir = dir.path().join("ClientForServer");
        std::fs::create_dir_all(&client_dir).unwrap();
        std::fs::write(client_dir.join("stale.txt"), b"old").unwrap();

        let installer = installer(&[]);
        let descriptor = installer
            .publish_client_distribution(
                &client_dir,
                &ClientUpload { path: upload_path, file_name: "client.zip".into(), kind: "full".into() },
            )
            .await
            .unwrap();
        assert_eq!(descriptor.kind, "full");
        assert!(descriptor.main_file.is_none());
        assert!(!client_dir.join("stale.txt").exists());

        let manifest = installer.build_client_manifest(&client_dir).await.unwrap();
        let paths: Vec<_> = manifest.iter().map(|e| e.path.as_str()).collect();
        assert_eq!(paths, vec![CLIENT_DESCRIPTOR_FILE, "mods/a.jar", "options.txt"]);
        let jar = manifest.iter().find(|e| e.path == "mods/a.jar").unwrap();
        assert_eq!(jar.size, 3);
        assert_eq!(jar.hash, hex::encode(Sha256::digest(b"aaa")));
    }

    #[tokio::test]
    async fn test_publish_keeps_mrpack_as_single_file() {
        let dir = TempDir::new().unwrap();
        let upload_path = dir.path().join("upload.tmp");
        std::fs::write(&upload_path, b"mrpack bytes").unwrap();
        let client_dir = dir.path().join("ClientForServer");

        let descriptor = installer(&[])
            .publish_client_distribution(
                &client_dir,
                &ClientUpload { path: upload_path, file_name: "Pack.mrpack".into(), kind: "full".into() },
            )
            .await
            .unwrap();
        assert_eq!(descriptor.kind, "modpack");
        assert_eq!(descriptor.main_file.as_deref(), Some("Pack.mrpack"));
        assert_eq!(std::fs::read(client_dir.join("Pack.mrpack")).unwrap(), b"mrpack bytes");

        let written: ClientDistributionDescriptor =
            serde_json::from_slice(&std::fs::read(client_dir.join(CLIENT_DESCRIPTOR_FILE)).unwrap()).unwrap();
        assert_eq!(written, descriptor);
    }

    #[tokio::test]
    async fn test_manifest_of_missing_dir_is_empty() {
        let dir = TempDir::new().unwrap();
        let manifest = installer(&[]).build_client_manifest(&dir.path().join("nope")).await.unwrap();
        assert!(manifest.is_empty());
    }
}
