// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Deploy Task Store - In-memory task table with callback fan-out
//
// Holds progress snapshots, cancellation requests and per-task subscribers.
// One instance is created per process (or per test) and injected into the
// tracker; nothing here is global.
//
// Subscribers are invoked after the table lock is released, so a callback may
// call back into the store (e.g. to unsubscribe itself).

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

use crate::domain::deploy_task::{
    CancelRequest, DeployTask, DeployTaskStore, ProgressCallback, SubscriberId, TaskId,
};

#[derive(Default)]
struct TaskTable {
    tasks: HashMap<TaskId, DeployTask>,
    cancels: HashMap<TaskId, CancelRequest>,
    subscribers: HashMap<TaskId, Vec<(SubscriberId, ProgressCallback)>>,
}

#[derive(Default)]
pub struct InMemoryDeployTaskStore {
    table: Mutex<TaskTable>,
    next_subscriber: AtomicU64,
}

impl InMemoryDeployTaskStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live subscribers for `task_id`
    pub fn subscriber_count(&self, task_id: &TaskId) -> usize {
        self.table
            .lock()
            .subscribers
            .get(task_id)
            .map_or(0, Vec::len)
    }
}

impl DeployTaskStore for InMemoryDeployTaskStore {
    fn get(&self, task_id: &TaskId) -> Option<DeployTask> {
        self.table.lock().tasks.get(task_id).cloned()
    }

    fn update(
        &self,
        task_id: &TaskId,
        mutate: &mut dyn FnMut(Option<&DeployTask>) -> DeployTask,
    ) -> DeployTask {
        let (snapshot, callbacks) = {
            let mut table = self.table.lock();
            let next = mutate(table.tasks.get(task_id));
            table.tasks.insert(task_id.clone(), next.clone());
            let callbacks: Vec<ProgressCallback> = table
                .subscribers
                .get(task_id)
                .map(|subs| subs.iter().map(|(_, cb)| cb.clone()).collect())
                .unwrap_or_default();
            (next, callbacks)
        };

        for callback in &callbacks {
            callback(&snapshot);
        }
        snapshot
    }

    fn delete(&self, task_id: &TaskId) {
        let mut table = self.table.lock();
        table.tasks.remove(task_id);
        table.cancels.remove(task_id);
    }

    fn subscribe(&self, task_id: &TaskId, callback: ProgressCallback) -> SubscriberId {
        let id = SubscriberId(self.next_subscriber.fetch_add(1, Ordering::Relaxed));
        self.table
            .lock()
            .subscribers
            .entry(task_id.clone())
            .or_default()
            .push((id, callback));
        debug!(task_id = %task_id, subscriber = id.0, "Subscribed to deploy task");
        id
    }

    fn unsubscribe(&self, task_id: &TaskId, subscriber: SubscriberId) {
        let mut table = self.table.lock();
        if let Some(subs) = table.subscribers.get_mut(task_id) {
            subs.retain(|(id, _)| *id != subscriber);
            if subs.is_empty() {
                table.subscribers.remove(task_id);
            }
        }
    }

    fn set_cancel(&self, task_id: &TaskId, request: CancelRequest) {
        self.table.lock().cancels.insert(task_id.clone(), request);
    }

    fn cancel_request(&self, task_id: &TaskId) -> Option<CancelRequest> {
        self.table.lock().cancels.get(task_id).copied()
    }

    fn snapshots(&self) -> Vec<DeployTask> {
        self.table.lock().tasks.values().cloned().collect()
    }

    fn clear(&self) {
        let mut table = self.table.lock();
        table.tasks.clear();
        table.cancels.clear();
        table.subscribers.clear();
    }
}
