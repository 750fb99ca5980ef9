// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::time::Duration;

use crate::domain::files::{ClipboardEntry, ClipboardKey, ClipboardStore};

/// HashMap-backed clipboard shared by every file manager of the process
#[derive(Default)]
pub struct InMemoryClipboardStore {
    entries: RwLock<HashMap<ClipboardKey, ClipboardEntry>>,
}

impl InMemoryClipboardStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ClipboardStore for InMemoryClipboardStore {
    fn put(&self, key: ClipboardKey, entry: ClipboardEntry) {
        self.entries.write().insert(key, entry);
    }

    fn get(&self, key: &ClipboardKey) -> Option<ClipboardEntry> {
        self.entries.read().get(key).cloned()
    }

    fn remove(&self, key: &ClipboardKey) -> Option<ClipboardEntry> {
        self.entries.write().remove(key)
    }

    fn prune_expired(&self, ttl: Duration, now: DateTime<Utc>) -> usize {
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|_, entry| !entry.is_expired(ttl, now));
        before - entries.len()
    }

    fn len(&self) -> usize {
        self.entries.read().len()
    }

    fn clear(&self) {
        self.entries.write().clear();
    }
}
