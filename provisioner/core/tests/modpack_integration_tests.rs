// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Integration tests for modpack installation
//!
//! Builds real zip/mrpack archives on disk and installs them through the
//! public `ModpackInstaller` API.

use anchor_provisioner_core::application::modpack_installer::ModpackInstaller;
use anchor_provisioner_core::domain::modpack::{InstallError, PackDownloader, PackFormat};
use async_trait::async_trait;
use bytes::Bytes;
use sha1::{Digest, Sha1};
use std::collections::HashMap;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;
use zip::write::SimpleFileOptions;
use zip::ZipWriter;

struct MapDownloader(HashMap<String, Vec<u8>>);

#[async_trait]
impl PackDownloader for MapDownloader {
    async fn download(&self, url: &str) -> Result<Bytes, InstallError> {
        self.0
            .get(url)
            .map(|b| Bytes::from(b.clone()))
            .ok_or_else(|| InstallError::Download {
                url: url.to_string(),
                message: "not found".to_string(),
            })
    }
}

fn write_zip(path: &Path, entries: &[(&str, &[u8])]) {
    let mut writer = ZipWriter::new(std::fs::File::create(path).unwrap());
    for (name, contents) in entries {
        writer.start_file(*name, SimpleFileOptions::default()).unwrap();
        writer.write_all(contents).unwrap();
    }
    writer.finish().unwrap();
}

fn jar_bytes(dir: &Path, name: &str, entries: &[(&str, &[u8])]) -> Vec<u8> {
    let path = dir.join(name);
    write_zip(&path, entries);
    std::fs::read(path).unwrap()
}

#[tokio::test]
async fn test_server_overrides_replace_generic_overrides() {
    let dir = TempDir::new().unwrap();
    let pack = dir.path().join("pack.zip");
    write_zip(
        &pack,
        &[
            ("MyPack/overrides/config/a.toml", b"client"),
            ("MyPack/overrides/mods/shared.jar", b"x"),
            ("MyPack/server-overrides/config/a.toml", b"server"),
            ("MyPack/server-overrides/start.sh", b"#!/bin/sh"),
        ],
    );
    let data = dir.path().join("data");

    let installer = ModpackInstaller::new(Arc::new(MapDownloader(HashMap::new())));
    let report = installer
        .install_pack_to_server_data(&pack, "pack.zip", &data)
        .await
        .unwrap();

    assert_eq!(report.format, Some(PackFormat::Zip));
    assert_eq!(std::fs::read(data.join("config/a.toml")).unwrap(), b"server");
    assert!(data.join("start.sh").exists());
    assert!(!data.join("mods/shared.jar").exists());
}

#[tokio::test]
async fn test_plain_content_dirs_are_kept_in_place() {
    let dir = TempDir::new().unwrap();
    let pack = dir.path().join("pack.zip");
    write_zip(
        &pack,
        &[
            ("mods/lib.jar", b"lib"),
            ("kubejs/startup.js", b"//"),
            ("README.md", b"ignored"),
        ],
    );
    let data = dir.path().join("data");

    ModpackInstaller::new(Arc::new(MapDownloader(HashMap::new())))
        .install_pack_to_server_data(&pack, "pack.zip", &data)
        .await
        .unwrap();

    assert!(data.join("mods/lib.jar").exists());
    assert!(data.join("kubejs/startup.js").exists());
    assert!(!data.join("README.md").exists());
}

#[tokio::test]
async fn test_mrpack_install_filters_client_only_downloads() {
    let dir = TempDir::new().unwrap();
    let fixtures = dir.path().join("fixtures");
    std::fs::create_dir_all(&fixtures).unwrap();

    let server_jar = jar_bytes(
        &fixtures,
        "server.jar",
        &[("fabric.mod.json", br#"{"id":"lithium","environment":"*"}"#)],
    );
    // listed as server-capable but declares itself client-only
    let sneaky_jar = jar_bytes(
        &fixtures,
        "zoomify.jar",
        &[("fabric.mod.json", br#"{"id":"zoomify","environment":"client"}"#)],
    );
    let server_sha1 = hex::encode(Sha1::digest(&server_jar));

    let index = format!(
        r#"{{
            "formatVersion": 1,
            "game": "minecraft",
            "versionId": "1.0.0",
            "name": "Test Pack",
            "files": [
                {{"path": "mods/lithium.jar", "hashes": {{"sha1": "{server_sha1}"}},
                  "env": {{"client": "optional", "server": "required"}},
                  "downloads": ["https://cdn.example/lithium.jar"], "fileSize": {size}}},
                {{"path": "mods/zoomify.jar",
                  "env": {{"client": "required", "server": "optional"}},
                  "downloads": ["https://cdn.example/zoomify.jar"]}},
                {{"path": "mods/iris.jar",
                  "env": {{"client": "required", "server": "unsupported"}},
                  "downloads": ["https://cdn.example/iris.jar"]}}
            ],
            "dependencies": {{"minecraft": "1.20.1", "fabric-loader": "0.15.0"}}
        }}"#,
        size = server_jar.len()
    );

    let pack = dir.path().join("pack.mrpack");
    write_zip(
        &pack,
        &[
            ("modrinth.index.json", index.as_bytes()),
            ("overrides/config/lithium.properties", b"a=1"),
            ("client-overrides/options.txt", b"fov:90"),
        ],
    );

    let downloads = HashMap::from([
        ("https://cdn.example/lithium.jar".to_string(), server_jar.clone()),
        ("https://cdn.example/zoomify.jar".to_string(), sneaky_jar),
    ]);
    let data = dir.path().join("data");
    let report = ModpackInstaller::new(Arc::new(MapDownloader(downloads)))
        .install_pack_to_server_data(&pack, "pack.mrpack", &data)
        .await
        .unwrap();

    assert_eq!(report.format, Some(PackFormat::Mrpack));
    assert_eq!(report.downloaded, 2);
    assert_eq!(report.skipped, 1);
    assert_eq!(report.removed_client_mods, 1);
    assert_eq!(std::fs::read(data.join("mods/lithium.jar")).unwrap(), server_jar);
    assert!(!data.join("mods/zoomify.jar").exists());
    assert!(!data.join("mods/iris.jar").exists());
    assert!(data.join("config/lithium.properties").exists());
    assert!(!data.join("options.txt").exists());
}

#[tokio::test]
async fn test_traversal_entry_aborts_install() {
    let dir = TempDir::new().unwrap();
    let pack = dir.path().join("evil.zip");
    write_zip(&pack, &[("overrides/../../../escape.txt", b"nope")]);
    let data = dir.path().join("srv").join("data");

    let result = ModpackInstaller::new(Arc::new(MapDownloader(HashMap::new())))
        .install_pack_to_server_data(&pack, "evil.zip", &data)
        .await;
    assert!(matches!(result, Err(InstallError::InvalidPath(_))));
    assert!(!dir.path().join("escape.txt").exists());
}
