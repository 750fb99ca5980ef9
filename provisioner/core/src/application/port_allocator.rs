// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use rand::Rng;
use std::collections::HashSet;
use std::net::{Ipv4Addr, TcpListener};
use std::ops::RangeInclusive;
use tracing::{debug, warn};

use crate::domain::config::PortsConfig;
use crate::domain::repository::{RepositoryError, ServerRepository};

/// Random host port selection with bind-check-and-retry.
///
/// A candidate is rejected when a persisted server already holds it or when
/// the host refuses a TCP bind on it. After `max_attempts` rejected draws the
/// last candidate is returned anyway.
#[derive(Debug, Clone)]
pub struct PortAllocator {
    range: RangeInclusive<u16>,
    max_attempts: u32,
    probe_bind: bool,
}

impl PortAllocator {
    pub fn new(range: RangeInclusive<u16>, max_attempts: u32) -> Self {
        Self {
            range,
            max_attempts: max_attempts.max(1),
            probe_bind: true,
        }
    }

    pub fn from_config(config: &PortsConfig) -> Self {
        Self::new(config.range_start..=config.range_end, config.max_attempts)
    }

    /// Skip the host bind probe (only persisted records are consulted)
    pub fn without_bind_probe(mut self) -> Self {
        self.probe_bind = false;
        self
    }

    fn draw(&self) -> u16 {
        rand::rng().random_range(self.range.clone())
    }

    fn is_bindable(port: u16) -> bool {
        TcpListener::bind((Ipv4Addr::UNSPECIFIED, port)).is_ok()
    }

    pub async fn allocate(&self, repository: &dyn ServerRepository) -> Result<u16, RepositoryError> {
        let taken: HashSet<u16> = repository.ports_in_use().await?.into_iter().collect();

        let mut last = None;
        for attempt in 1..=self.max_attempts {
            let candidate = self.draw();
            last = Some(candidate);
            if taken.contains(&candidate) {
                debug!(port = candidate, attempt, "Port held by another server, redrawing");
                continue;
            }
            if self.probe_bind && !Self::is_bindable(candidate) {
                debug!(port = candidate, attempt, "Port not bindable on host, redrawing");
                continue;
            }
            return Ok(candidate);
        }

        let candidate = last.unwrap_or_else(|| self.draw());
        warn!(
            port = candidate,
            attempts = self.max_attempts,
            "No free port found within attempt budget, using last candidate"
        );
        Ok(candidate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::repository::ServerRepository;
    use crate::domain::server::{ContainerId, OwnerId, ServerRecord, ServerStatus};
    use crate::infrastructure::repositories::InMemoryServerRepository;
    use chrono::Utc;
    use std::path::PathBuf;

    async fn repo_with_port(port: u16) -> InMemoryServerRepository {
        let repo = InMemoryServerRepository::new();
        repo.save(&ServerRecord {
            container_id: ContainerId::new("held"),
            owner: OwnerId(1),
            name: "held".into(),
            port,
            volume_path: PathBuf::from("/srv/held/data"),
            version: "1.20.1".into(),
            loader: None,
            status: ServerStatus::Running,
            client_distribution: None,
            created_at: Utc::now(),
        })
        .await
        .unwrap();
        repo
    }

    #[tokio::test]
    async fn test_allocation_avoids_persisted_ports() {
        let repo = repo_with_port(40000).await;
        let allocator = PortAllocator::new(40000..=40001, 50).without_bind_probe();
        for _ in 0..20 {
            assert_eq!(allocator.allocate(&repo).await.unwrap(), 40001);
        }
    }

    #[tokio::test]
    async fn test_exhausted_range_falls_back_to_last_draw() {
        let repo = repo_with_port(40000).await;
        let allocator = PortAllocator::new(40000..=40000, 3).without_bind_probe();
        assert_eq!(allocator.allocate(&repo).await.unwrap(), 40000);
    }

    #[tokio::test]
    async fn test_bound_port_is_skipped() {
        let listener = TcpListener::bind((Ipv4Addr::UNSPECIFIED, 0)).unwrap();
        let busy = listener.local_addr().unwrap().port();
        let allocator = PortAllocator::new(busy..=busy, 2);
        // only candidate is busy: fallback returns it after the budget
        let repo = InMemoryServerRepository::new();
        assert_eq!(allocator.allocate(&repo).await.unwrap(), busy);
        assert!(!PortAllocator::is_bindable(busy));
    }
}
