// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Repository Factory - Application Layer
//!
//! Creates the concrete `ServerRepository` for the configured storage backend.

use anyhow::Result;
use std::sync::Arc;

use crate::domain::repository::{ServerRepository, StorageBackend};
use crate::infrastructure::db::Database;
use crate::infrastructure::repositories::postgres_server::PostgresServerRepository;
use crate::infrastructure::repositories::InMemoryServerRepository;

/// Creates a ServerRepository implementation based on the configured backend
pub async fn create_server_repository(backend: &StorageBackend) -> Result<Arc<dyn ServerRepository>> {
    match backend {
        StorageBackend::InMemory => Ok(Arc::new(InMemoryServerRepository::new())),
        StorageBackend::PostgreSQL(config) => {
            let database = Database::connect(&config.connection_string).await?;
            Ok(Arc::new(PostgresServerRepository::new(database.pool().clone())))
        }
    }
}
