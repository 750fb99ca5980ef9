// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Repository Implementations
//!
//! Infrastructure implementations of the `ServerRepository` abstraction
//! defined in the domain layer.
//!
//! # Architecture
//!
//! - **Layer:** Infrastructure
//! - **Purpose:** Persist and retrieve server records and listing rows
//! - **Pattern:** Repository (DDD), Adapter (Hexagonal Architecture)
//!
//! # Available Implementations
//!
//! - **PostgresServerRepository** - `docker_servers` + `servers` tables
//! - **InMemoryServerRepository** - HashMap-backed storage for tests and
//!   single-node development

pub mod postgres_server;

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

use crate::domain::repository::{RepositoryError, ServerRepository};
use crate::domain::server::{
    ClientDistribution, ContainerId, OwnerId, ServerListing, ServerRecord, ServerStatus,
};

pub use postgres_server::PostgresServerRepository;

#[derive(Clone, Default)]
pub struct InMemoryServerRepository {
    records: Arc<RwLock<HashMap<ContainerId, ServerRecord>>>,
    listings: Arc<RwLock<HashMap<ContainerId, ServerListing>>>,
}

impl InMemoryServerRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Listing row for `id`, if one is stored
    pub fn listing(&self, id: &ContainerId) -> Option<ServerListing> {
        self.listings.read().get(id).cloned()
    }
}

#[async_trait]
impl ServerRepository for InMemoryServerRepository {
    async fn save(&self, record: &ServerRecord) -> Result<(), RepositoryError> {
        self.records
            .write()
            .insert(record.container_id.clone(), record.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: &ContainerId) -> Result<Option<ServerRecord>, RepositoryError> {
        Ok(self.records.read().get(id).cloned())
    }

    async fn find_by_owner(&self, owner: OwnerId) -> Result<Vec<ServerRecord>, RepositoryError> {
        let mut records: Vec<ServerRecord> = self
            .records
            .read()
            .values()
            .filter(|r| r.owner == owner)
            .cloned()
            .collect();
        records.sort_by_key(|r| r.created_at);
        Ok(records)
    }

    async fn list_all(&self) -> Result<Vec<ServerRecord>, RepositoryError> {
        let mut records: Vec<ServerRecord> = self.records.read().values().cloned().collect();
        records.sort_by_key(|r| r.created_at);
        Ok(records)
    }

    async fn update_status(&self, id: &ContainerId, status: ServerStatus) -> Result<(), RepositoryError> {
        match self.records.write().get_mut(id) {
            Some(record) => {
                record.status = status;
                Ok(())
            }
            None => Err(RepositoryError::NotFound(id.to_string())),
        }
    }

    async fn update_client_distribution(
        &self,
        id: &ContainerId,
        distribution: &ClientDistribution,
    ) -> Result<(), RepositoryError> {
        match self.records.write().get_mut(id) {
            Some(record) => {
                record.client_distribution = Some(distribution.clone());
                Ok(())
            }
            None => Err(RepositoryError::NotFound(id.to_string())),
        }
    }

    async fn ports_in_use(&self) -> Result<Vec<u16>, RepositoryError> {
        Ok(self.records.read().values().map(|r| r.port).collect())
    }

    async fn delete(&self, id: &ContainerId) -> Result<(), RepositoryError> {
        self.records.write().remove(id);
        Ok(())
    }

    async fn save_listing(&self, listing: &ServerListing) -> Result<(), RepositoryError> {
        self.listings
            .write()
            .insert(listing.container_id.clone(), listing.clone());
        Ok(())
    }

    async fn delete_listing(&self, id: &ContainerId) -> Result<(), RepositoryError> {
        self.listings.write().remove(id);
        Ok(())
    }
}
