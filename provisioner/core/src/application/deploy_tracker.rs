// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Deploy Task Tracker Application Service
//!
//! Records per-task deployment progress and cancellation intent, and fans
//! every snapshot out to the task's subscribers (a live progress stream, an
//! internal waiter, ...).
//!
//! Cancellation is cooperative: `request_cancel` only records intent. The
//! deployment polls [`DeployTaskTracker::pending_cancel`] when it reaches a
//! stage whose [`Cancellation`] is `Checkpoint` and performs its own cleanup.
//!
//! Reporting is lossless and in arrival order for a single writer per task;
//! tasks are fully independent of each other.

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use chrono::Utc;
use futures::Stream;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::{debug, warn};

use crate::domain::deploy_task::{
    CancelRequest, Cancellation, DeployStage, DeployTask, DeployTaskStore, DeployTaskUpdate,
    ProgressCallback, SubscriberId, TaskId,
};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TrackerError {
    #[error("Deploy task not found: {0}")]
    TaskNotFound(TaskId),
}

#[derive(Clone)]
pub struct DeployTaskTracker {
    store: Arc<dyn DeployTaskStore>,
}

impl DeployTaskTracker {
    pub fn new(store: Arc<dyn DeployTaskStore>) -> Self {
        Self { store }
    }

    /// Create or overwrite the initial snapshot of `task_id`
    pub fn init(
        &self,
        task_id: &TaskId,
        stage: DeployStage,
        message: impl Into<String>,
        percent: u8,
    ) -> DeployTask {
        let message = message.into();
        self.store.update(task_id, &mut |_| {
            DeployTask::new(task_id.clone(), stage, message.clone(), percent)
        })
    }

    /// Merge `update` into the current snapshot and publish the result.
    ///
    /// Reporting against an unknown task starts it from an `init` snapshot.
    pub fn report(&self, task_id: &TaskId, update: DeployTaskUpdate) -> DeployTask {
        self.store.update(task_id, &mut |current| {
            let mut next = current
                .cloned()
                .unwrap_or_else(|| DeployTask::new(task_id.clone(), DeployStage::Init, "", 0));

            if let Some(percent) = update.percent {
                if percent < next.percent && !next.is_finished() {
                    warn!(
                        task_id = %task_id,
                        from = next.percent,
                        to = percent,
                        "Deploy task progress moved backwards"
                    );
                }
            }

            next.apply(&update);
            next
        })
    }

    /// Register `callback` for every subsequent snapshot of `task_id`.
    ///
    /// The callback stays registered until the returned guard is dropped.
    pub fn subscribe(&self, task_id: &TaskId, callback: ProgressCallback) -> Subscription {
        let id = self.store.subscribe(task_id, callback);
        Subscription {
            store: self.store.clone(),
            task_id: task_id.clone(),
            id,
        }
    }

    /// Snapshots of `task_id` as an async stream, starting with the current
    /// snapshot if one exists. The stream ends when it is dropped.
    pub fn subscribe_stream(&self, task_id: &TaskId) -> ProgressStream {
        let (tx, rx) = mpsc::unbounded_channel();
        if let Some(current) = self.store.get(task_id) {
            let _ = tx.send(current);
        }
        let subscription = self.subscribe(
            task_id,
            Arc::new(move |task: &DeployTask| {
                let _ = tx.send(task.clone());
            }),
        );
        ProgressStream {
            inner: UnboundedReceiverStream::new(rx),
            _subscription: subscription,
        }
    }

    /// Record the intent to abort `task_id`
    pub fn request_cancel(&self, task_id: &TaskId, delete_on_cancel: bool) -> Result<(), TrackerError> {
        if self.store.get(task_id).is_none() {
            return Err(TrackerError::TaskNotFound(task_id.clone()));
        }
        self.store.set_cancel(
            task_id,
            CancelRequest {
                cancel: true,
                delete_on_cancel,
            },
        );
        debug!(task_id = %task_id, delete_on_cancel, "Cancellation requested");
        Ok(())
    }

    pub fn is_cancelled(&self, task_id: &TaskId) -> bool {
        self.store.cancel_request(task_id).is_some_and(|r| r.cancel)
    }

    pub fn cancel_request(&self, task_id: &TaskId) -> Option<CancelRequest> {
        self.store.cancel_request(task_id)
    }

    /// Cancellation to honour on entering `stage`, if any. Stages that defer
    /// cancellation never report one.
    pub fn pending_cancel(&self, task_id: &TaskId, stage: DeployStage) -> Option<CancelRequest> {
        if stage.cancellation() != Cancellation::Checkpoint {
            return None;
        }
        self.store.cancel_request(task_id).filter(|r| r.cancel)
    }

    /// One-shot snapshot for polling clients
    pub fn snapshot(&self, task_id: &TaskId) -> Option<DeployTask> {
        self.store.get(task_id)
    }

    /// Drop a task's snapshot and cancellation record
    pub fn forget(&self, task_id: &TaskId) {
        self.store.delete(task_id);
    }

    /// Drop finished tasks last updated more than `retention` ago
    pub fn prune_finished(&self, retention: Duration) -> usize {
        let retention = chrono::Duration::from_std(retention).unwrap_or(chrono::Duration::MAX);
        let now = Utc::now();
        let stale: Vec<TaskId> = self
            .store
            .snapshots()
            .into_iter()
            .filter(|t| t.is_finished() && now.signed_duration_since(t.updated_at) > retention)
            .map(|t| t.task_id)
            .collect();

        for task_id in &stale {
            self.store.delete(task_id);
        }
        if !stale.is_empty() {
            debug!(count = stale.len(), "Pruned finished deploy tasks");
        }
        stale.len()
    }

    /// Remove every task, cancellation record and subscriber
    pub fn teardown(&self) {
        self.store.clear();
    }
}

/// Registration guard returned by [`DeployTaskTracker::subscribe`]
pub struct Subscription {
    store: Arc<dyn DeployTaskStore>,
    task_id: TaskId,
    id: SubscriberId,
}

impl Subscription {
    pub fn task_id(&self) -> &TaskId {
        &self.task_id
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.store.unsubscribe(&self.task_id, self.id);
    }
}

/// Live progress stream; unsubscribes when dropped
pub struct ProgressStream {
    inner: UnboundedReceiverStream<DeployTask>,
    _subscription: Subscription,
}

impl Stream for ProgressStream {
    type Item = DeployTask;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.inner).poll_next(cx)
    }
}
