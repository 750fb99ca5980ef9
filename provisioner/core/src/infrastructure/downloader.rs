// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::Client;
use std::time::Duration;
use tracing::debug;

use crate::domain::modpack::{InstallError, PackDownloader};

const USER_AGENT: &str = concat!("anchor-provisioner/", env!("CARGO_PKG_VERSION"));

/// Fetches modpack manifest files over HTTP(S)
#[derive(Clone)]
pub struct HttpPackDownloader {
    client: Client,
}

impl HttpPackDownloader {
    pub fn new(timeout: Duration) -> Result<Self, InstallError> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()
            .map_err(|e| InstallError::Download {
                url: String::new(),
                message: format!("Failed to build HTTP client: {}", e),
            })?;
        Ok(Self { client })
    }
}

#[async_trait]
impl PackDownloader for HttpPackDownloader {
    async fn download(&self, url: &str) -> Result<Bytes, InstallError> {
        let failed = |e: reqwest::Error| InstallError::Download {
            url: url.to_string(),
            message: e.to_string(),
        };

        debug!(url, "Downloading pack file");
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(failed)?
            .error_for_status()
            .map_err(failed)?;

        response.bytes().await.map_err(failed)
    }
}
