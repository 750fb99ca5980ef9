// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Deploy Task
//!
//! Progress snapshot for one deployment attempt, the named stages a
//! deployment moves through, and the store contract the tracker is built on.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Deployment progress model and cancellation checkpoints

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::domain::server::ContainerId;

/// Caller-chosen identifier of a deployment attempt, independent of the
/// container id that the attempt eventually produces.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(pub String);

impl TaskId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Random task id for callers that do not supply their own
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Whether a stage may be interrupted by a pending cancellation request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cancellation {
    /// A cancellation request is honoured when this stage is reached
    Checkpoint,
    /// The stage runs to completion; cancellation is deferred to the next checkpoint
    Deferred,
    /// The task has already ended
    Terminal,
}

/// Named phase of a deployment.
///
/// Every stage must declare its cancellation behaviour in
/// [`DeployStage::cancellation`]; adding a variant without doing so fails to
/// compile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DeployStage {
    Init,
    PullingImage,
    CreatingContainer,
    WritingState,
    InstallingPack,
    ApplyingDefaults,
    StartingServer,
    Done,
    Cancelled,
    Failed,
}

impl DeployStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeployStage::Init => "init",
            DeployStage::PullingImage => "pulling-image",
            DeployStage::CreatingContainer => "creating-container",
            DeployStage::WritingState => "writing-state",
            DeployStage::InstallingPack => "installing-pack",
            DeployStage::ApplyingDefaults => "applying-defaults",
            DeployStage::StartingServer => "starting-server",
            DeployStage::Done => "done",
            DeployStage::Cancelled => "cancelled",
            DeployStage::Failed => "failed",
        }
    }

    pub fn cancellation(&self) -> Cancellation {
        match self {
            DeployStage::Init => Cancellation::Checkpoint,
            DeployStage::PullingImage => Cancellation::Checkpoint,
            DeployStage::CreatingContainer => Cancellation::Deferred,
            DeployStage::WritingState => Cancellation::Checkpoint,
            DeployStage::InstallingPack => Cancellation::Checkpoint,
            DeployStage::ApplyingDefaults => Cancellation::Deferred,
            DeployStage::StartingServer => Cancellation::Checkpoint,
            DeployStage::Done | DeployStage::Cancelled | DeployStage::Failed => Cancellation::Terminal,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.cancellation() == Cancellation::Terminal
    }
}

impl std::fmt::Display for DeployStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Full progress snapshot, as published to subscribers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeployTask {
    pub task_id: TaskId,
    pub stage: DeployStage,
    pub message: String,
    /// 0..=100, non-decreasing while the task is live
    pub percent: u8,
    pub done: bool,
    pub error: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub container_id: Option<ContainerId>,
    pub updated_at: DateTime<Utc>,
}

impl DeployTask {
    pub fn new(task_id: TaskId, stage: DeployStage, message: impl Into<String>, percent: u8) -> Self {
        Self {
            task_id,
            stage,
            message: message.into(),
            percent: percent.min(100),
            done: false,
            error: false,
            container_id: None,
            updated_at: Utc::now(),
        }
    }

    /// Merge `update` into this snapshot, last write wins per field
    pub fn apply(&mut self, update: &DeployTaskUpdate) {
        if let Some(stage) = update.stage {
            self.stage = stage;
        }
        if let Some(message) = &update.message {
            self.message = message.clone();
        }
        if let Some(percent) = update.percent {
            self.percent = percent.min(100);
        }
        if let Some(done) = update.done {
            self.done = done;
        }
        if let Some(error) = update.error {
            self.error = error;
        }
        if let Some(container_id) = &update.container_id {
            self.container_id = Some(container_id.clone());
        }
        self.updated_at = Utc::now();
    }

    /// Finished successfully, failed, or was cancelled
    pub fn is_finished(&self) -> bool {
        self.done || self.stage.is_terminal()
    }
}

/// Partial update merged into a snapshot by `report`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeployTaskUpdate {
    pub stage: Option<DeployStage>,
    pub message: Option<String>,
    pub percent: Option<u8>,
    pub done: Option<bool>,
    pub error: Option<bool>,
    pub container_id: Option<ContainerId>,
}

impl DeployTaskUpdate {
    /// Move to `stage` with a message and progress value
    pub fn stage(stage: DeployStage, message: impl Into<String>, percent: u8) -> Self {
        Self {
            stage: Some(stage),
            message: Some(message.into()),
            percent: Some(percent),
            ..Default::default()
        }
    }

    /// Successful terminal snapshot
    pub fn completed(message: impl Into<String>) -> Self {
        Self::stage(DeployStage::Done, message, 100).with_done()
    }

    /// Failed terminal snapshot
    pub fn failed(message: impl Into<String>) -> Self {
        Self::stage(DeployStage::Failed, message, 100).with_done().with_error()
    }

    /// Cancelled terminal snapshot
    pub fn cancelled(message: impl Into<String>) -> Self {
        Self::stage(DeployStage::Cancelled, message, 100).with_done().with_error()
    }

    pub fn with_container(mut self, container_id: ContainerId) -> Self {
        self.container_id = Some(container_id);
        self
    }

    pub fn with_done(mut self) -> Self {
        self.done = Some(true);
        self
    }

    pub fn with_error(mut self) -> Self {
        self.error = Some(true);
        self
    }
}

/// Recorded intent to abort a deployment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelRequest {
    pub cancel: bool,
    pub delete_on_cancel: bool,
}

/// Callback invoked synchronously with every published snapshot
pub type ProgressCallback = Arc<dyn Fn(&DeployTask) + Send + Sync>;

/// Handle identifying one subscriber of one task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriberId(pub u64);

/// Storage for task snapshots, subscribers and cancellation requests.
///
/// Implementations must make `update` atomic with respect to other `update`
/// calls for the same task and must invoke subscribers with the resulting
/// snapshot; callbacks must not be invoked while an internal lock is held.
pub trait DeployTaskStore: Send + Sync {
    fn get(&self, task_id: &TaskId) -> Option<DeployTask>;

    /// Replace the snapshot with `mutate(current)` and publish the result
    fn update(
        &self,
        task_id: &TaskId,
        mutate: &mut dyn FnMut(Option<&DeployTask>) -> DeployTask,
    ) -> DeployTask;

    /// Drop the snapshot and any cancellation request; subscribers are kept
    fn delete(&self, task_id: &TaskId);

    fn subscribe(&self, task_id: &TaskId, callback: ProgressCallback) -> SubscriberId;

    fn unsubscribe(&self, task_id: &TaskId, subscriber: SubscriberId);

    fn set_cancel(&self, task_id: &TaskId, request: CancelRequest);

    fn cancel_request(&self, task_id: &TaskId) -> Option<CancelRequest>;

    /// Snapshots of every known task
    fn snapshots(&self) -> Vec<DeployTask>;

    /// Remove everything (process shutdown / test teardown)
    fn clear(&self);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_live_stage_declares_cancellation() {
        let live = [
            DeployStage::Init,
            DeployStage::PullingImage,
            DeployStage::CreatingContainer,
            DeployStage::WritingState,
            DeployStage::InstallingPack,
            DeployStage::ApplyingDefaults,
            DeployStage::StartingServer,
        ];
        for stage in live {
            assert_ne!(stage.cancellation(), Cancellation::Terminal, "{stage}");
        }
        assert!(DeployStage::Done.is_terminal());
        assert!(DeployStage::Cancelled.is_terminal());
        assert!(DeployStage::Failed.is_terminal());
    }

    #[test]
    fn test_apply_merges_fields() {
        let mut task = DeployTask::new(TaskId::new("t1"), DeployStage::Init, "Preparing", 5);
        task.apply(
            &DeployTaskUpdate::stage(DeployStage::WritingState, "Saving", 70)
                .with_container(ContainerId::new("c1")),
        );
        assert_eq!(task.stage, DeployStage::WritingState);
        assert_eq!(task.percent, 70);
        assert_eq!(task.container_id, Some(ContainerId::new("c1")));
        assert!(!task.done);

        // container id survives an update that doesn't mention it
        task.apply(&DeployTaskUpdate::completed("Deployed"));
        assert_eq!(task.container_id, Some(ContainerId::new("c1")));
        assert!(task.done);
        assert!(!task.error);
        assert_eq!(task.percent, 100);
    }

    #[test]
    fn test_percent_is_clamped() {
        let mut task = DeployTask::new(TaskId::new("t1"), DeployStage::Init, "", 150);
        assert_eq!(task.percent, 100);
        task.apply(&DeployTaskUpdate { percent: Some(250), ..Default::default() });
        assert_eq!(task.percent, 100);
    }

    #[test]
    fn test_snapshot_serialises_with_wire_names() {
        let task = DeployTask::new(TaskId::new("t9"), DeployStage::PullingImage, "Pulling", 20);
        let json = serde_json::to_value(&task).unwrap();
        assert_eq!(json["taskId"], "t9");
        assert_eq!(json["stage"], "pulling-image");
        assert_eq!(json["percent"], 20);
        assert!(json.get("containerId").is_none());
    }
}
