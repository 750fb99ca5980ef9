// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Domain Repository Interfaces
//!
//! Persistence contract for the `ServerRecord` aggregate and its public
//! listing row. Implemented in `crate::infrastructure::repositories`.
//!
//! | Trait | Aggregate | Implementations |
//! |-------|-----------|----------------|
//! | `ServerRepository` | `ServerRecord` | `InMemoryServerRepository`, `PostgresServerRepository` |

use async_trait::async_trait;

use crate::domain::server::{
    ClientDistribution, ContainerId, OwnerId, ServerListing, ServerRecord, ServerStatus,
};

/// Storage backend for pluggable persistence
#[derive(Debug, Clone)]
pub enum StorageBackend {
    InMemory,
    PostgreSQL(PostgresConfig),
}

#[derive(Debug, Clone)]
pub struct PostgresConfig {
    pub connection_string: String,
}

/// Repository interface for ServerRecord aggregates
#[async_trait]
pub trait ServerRepository: Send + Sync {
    /// Save record (create or update)
    async fn save(&self, record: &ServerRecord) -> Result<(), RepositoryError>;

    async fn find_by_id(&self, id: &ContainerId) -> Result<Option<ServerRecord>, RepositoryError>;

    async fn find_by_owner(&self, owner: OwnerId) -> Result<Vec<ServerRecord>, RepositoryError>;

    async fn list_all(&self) -> Result<Vec<ServerRecord>, RepositoryError>;

    async fn update_status(&self, id: &ContainerId, status: ServerStatus) -> Result<(), RepositoryError>;

    async fn update_client_distribution(
        &self,
        id: &ContainerId,
        distribution: &ClientDistribution,
    ) -> Result<(), RepositoryError>;

    /// Ports held by any persisted record
    async fn ports_in_use(&self) -> Result<Vec<u16>, RepositoryError>;

    /// Delete record; deleting an absent record is not an error
    async fn delete(&self, id: &ContainerId) -> Result<(), RepositoryError>;

    async fn save_listing(&self, listing: &ServerListing) -> Result<(), RepositoryError>;

    /// Delete listing row; deleting an absent row is not an error
    async fn delete_listing(&self, id: &ContainerId) -> Result<(), RepositoryError>;
}

/// Repository errors
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("Entity not found: {0}")]
    NotFound(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Unknown error: {0}")]
    Unknown(String),
}

impl From<sqlx::Error> for RepositoryError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => RepositoryError::NotFound("Row not found".to_string()),
            _ => RepositoryError::Database(err.to_string()),
        }
    }
}

impl From<serde_json::Error> for RepositoryError {
    fn from(err: serde_json::Error) -> Self {
        RepositoryError::Serialization(err.to_string())
    }
}
