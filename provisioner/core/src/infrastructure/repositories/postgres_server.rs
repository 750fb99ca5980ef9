// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Postgres Server
//!
//! `ServerRepository` over the `docker_servers` table and the public
//! `servers` listing table. Both tables are created by the external
//! migration tooling.
//!
//! # Architecture
//!
//! - **Layer:** Infrastructure Layer
//! - **Purpose:** Implements postgres server persistence

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgRow};
use sqlx::Row;
use std::path::PathBuf;

use crate::domain::repository::{RepositoryError, ServerRepository};
use crate::domain::server::{
    ClientDistribution, ContainerId, LoaderKind, LoaderSpec, OwnerId, ServerListing, ServerRecord,
    ServerStatus,
};

const SELECT_COLUMNS: &str = r#"
    container_id, user_id, name, port, volume_path, version,
    loader_type, loader_version, status,
    client_config_type, client_config_value, created_at
"#;

pub struct PostgresServerRepository {
    pool: PgPool,
}

impl PostgresServerRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ServerRepository for PostgresServerRepository {
    async fn save(&self, record: &ServerRecord) -> Result<(), RepositoryError> {
        let (client_type, client_value) = match &record.client_distribution {
            Some(d) => (Some(d.kind.as_str()), Some(d.value.as_str())),
            None => (None, None),
        };

        sqlx::query(
            r#"
            INSERT INTO docker_servers (
                container_id, user_id, name, port, volume_path, version,
                loader_type, loader_version, status,
                client_config_type, client_config_value, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            ON CONFLICT (container_id) DO UPDATE SET
                name = EXCLUDED.name,
                port = EXCLUDED.port,
                volume_path = EXCLUDED.volume_path,
                version = EXCLUDED.version,
                loader_type = EXCLUDED.loader_type,
                loader_version = EXCLUDED.loader_version,
                status = EXCLUDED.status,
                client_config_type = EXCLUDED.client_config_type,
                client_config_value = EXCLUDED.client_config_value
            "#,
        )
        .bind(record.container_id.as_str())
        .bind(record.owner.0)
        .bind(&record.name)
        .bind(i32::from(record.port))
        .bind(record.volume_path.to_string_lossy().into_owned())
        .bind(&record.version)
        .bind(record.loader.as_ref().map(|l| l.kind.as_str().to_string()))
        .bind(record.loader.as_ref().and_then(|l| l.version.clone()))
        .bind(record.status.as_str())
        .bind(client_type)
        .bind(client_value)
        .bind(record.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| RepositoryError::Database(format!("Failed to save server: {}", e)))?;

        Ok(())
    }

    async fn find_by_id(&self, id: &ContainerId) -> Result<Option<ServerRecord>, RepositoryError> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM docker_servers WHERE container_id = $1",
            SELECT_COLUMNS
        ))
        .bind(id.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.map(parse_server_row).transpose()
    }

    async fn find_by_owner(&self, owner: OwnerId) -> Result<Vec<ServerRecord>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM docker_servers WHERE user_id = $1 ORDER BY created_at ASC",
            SELECT_COLUMNS
        ))
        .bind(owner.0)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(parse_server_row).collect()
    }

    async fn list_all(&self) -> Result<Vec<ServerRecord>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM docker_servers ORDER BY created_at ASC",
            SELECT_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(parse_server_row).collect()
    }

    async fn update_status(&self, id: &ContainerId, status: ServerStatus) -> Result<(), RepositoryError> {
        let result = sqlx::query("UPDATE docker_servers SET status = $1 WHERE container_id = $2")
            .bind(status.as_str())
            .bind(id.as_str())
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound(id.to_string()));
        }
        Ok(())
    }

    async fn update_client_distribution(
        &self,
        id: &ContainerId,
        distribution: &ClientDistribution,
    ) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            r#"
            UPDATE docker_servers
            SET client_config_type = $1, client_config_value = $2
            WHERE container_id = $3
            "#,
        )
        .bind(&distribution.kind)
        .bind(&distribution.value)
        .bind(id.as_str())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound(id.to_string()));
        }
        Ok(())
    }

    async fn ports_in_use(&self) -> Result<Vec<u16>, RepositoryError> {
        let rows = sqlx::query("SELECT port FROM docker_servers")
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter()
            .map(|row| {
                let port: i32 = row.try_get("port")?;
                u16::try_from(port)
                    .map_err(|_| RepositoryError::Serialization(format!("Invalid port value: {}", port)))
            })
            .collect()
    }

    async fn delete(&self, id: &ContainerId) -> Result<(), RepositoryError> {
        sqlx::query("DELETE FROM docker_servers WHERE container_id = $1")
            .bind(id.as_str())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn save_listing(&self, listing: &ServerListing) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"
            INSERT INTO servers (name, ip_address, port, description, container_id)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(&listing.name)
        .bind(&listing.ip_address)
        .bind(i32::from(listing.port))
        .bind(&listing.description)
        .bind(listing.container_id.as_str())
        .execute(&self.pool)
        .await
        .map_err(|e| RepositoryError::Database(format!("Failed to save server listing: {}", e)))?;

        Ok(())
    }

    async fn delete_listing(&self, id: &ContainerId) -> Result<(), RepositoryError> {
        sqlx::query("DELETE FROM servers WHERE container_id = $1")
            .bind(id.as_str())
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

fn parse_server_row(row: PgRow) -> Result<ServerRecord, RepositoryError> {
    let container_id: String = row.try_get("container_id")?;
    let owner: i64 = row.try_get("user_id")?;
    let port: i32 = row.try_get("port")?;
    let volume_path: String = row.try_get("volume_path")?;
    let version: Option<String> = row.try_get("version")?;
    let loader_type: Option<String> = row.try_get("loader_type")?;
    let loader_version: Option<String> = row.try_get("loader_version")?;
    let status: String = row.try_get("status")?;
    let client_type: Option<String> = row.try_get("client_config_type")?;
    let client_value: Option<String> = row.try_get("client_config_value")?;
    let created_at: DateTime<Utc> = row.try_get("created_at")?;

    let port = u16::try_from(port)
        .map_err(|_| RepositoryError::Serialization(format!("Invalid port value: {}", port)))?;

    let status = status
        .parse::<ServerStatus>()
        .map_err(|e| RepositoryError::Serialization(e.to_string()))?;

    let loader = match loader_type {
        Some(kind) if !kind.is_empty() => Some(LoaderSpec {
            kind: kind
                .parse::<LoaderKind>()
                .map_err(|e| RepositoryError::Serialization(e.to_string()))?,
            version: loader_version,
        }),
        _ => None,
    };

    let client_distribution = match (client_type, client_value) {
        (Some(kind), Some(value)) => Some(ClientDistribution { kind, value }),
        _ => None,
    };

    Ok(ServerRecord {
        container_id: ContainerId::new(container_id),
        owner: OwnerId(owner),
        name: row.try_get("name")?,
        port,
        volume_path: PathBuf::from(volume_path),
        version: version.unwrap_or_default(),
        loader,
        status,
        client_distribution,
        created_at,
    })
}
