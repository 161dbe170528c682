//! Run events and notifiers for observability.
//!
//! The orchestrator emits one event per step of a run so consumers can log
//! progress, stream it somewhere, or assert on it in tests.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use sightline_detection::TaskStatus;
use tokio::sync::mpsc;

use crate::stage::{BranchKind, StageTag};
use crate::state::RunState;

/// Events emitted during a pipeline run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum PipelineEvent {
  RunStarted { run_id: String, prompt: String },

  /// The classifier decided which branch the run takes.
  BranchChosen { run_id: String, branch: BranchKind },

  /// A describer or transform stage produced its text.
  StageCompleted {
    run_id: String,
    stage: StageTag,
    text: String,
  },

  DetectionSubmitted {
    run_id: String,
    task_uuid: String,
    labels: Vec<String>,
  },

  /// Polling stopped; `status` is `unknown` on timeout.
  DetectionFinished {
    run_id: String,
    task_uuid: String,
    status: TaskStatus,
    attempts: u32,
  },

  RunCompleted {
    run_id: String,
    path: PathBuf,
    annotated: bool,
  },

  /// `failed_at` is the last state the run reached.
  RunFailed {
    run_id: String,
    failed_at: RunState,
    error: String,
  },
}

/// Receives pipeline events.
///
/// `notify` is called inline from the run, so implementations should not
/// block.
pub trait PipelineNotifier: Send + Sync {
  fn notify(&self, event: PipelineEvent);
}

/// Discards all events.
#[derive(Debug, Clone, Default)]
pub struct NoopNotifier;

impl PipelineNotifier for NoopNotifier {
  fn notify(&self, _event: PipelineEvent) {}
}

/// Sends events to an unbounded channel.
#[derive(Debug, Clone)]
pub struct ChannelNotifier {
  // a run emits a handful of events
  sender: mpsc::UnboundedSender<PipelineEvent>,
}

impl ChannelNotifier {
  pub fn new(sender: mpsc::UnboundedSender<PipelineEvent>) -> Self {
    Self { sender }
  }
}

impl PipelineNotifier for ChannelNotifier {
  fn notify(&self, event: PipelineEvent) {
    // receiver may be gone
    let _ = self.sender.send(event);
  }
}
