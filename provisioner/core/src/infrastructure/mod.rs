// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

pub mod archive;
pub mod clipboard;
pub mod db;
pub mod downloader;
pub mod repositories;
pub mod runtime;
pub mod task_store;

pub use clipboard::InMemoryClipboardStore;
pub use downloader::HttpPackDownloader;
pub use runtime::DockerRuntime;
pub use task_store::InMemoryDeployTaskStore;
