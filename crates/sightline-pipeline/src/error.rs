use sightline_artifact::ArtifactError;
use sightline_detection::DetectionError;
use sightline_ports::PortError;
use thiserror::Error;

use crate::stage::StageTag;
use crate::state::RunState;

/// Errors that abort a pipeline run.
#[derive(Debug, Error)]
pub enum PipelineError {
  /// The classifier could not decide.
  #[error("classification failed: {source}")]
  Classification {
    #[source]
    source: PortError,
  },

  /// A describer or transform stage failed or produced nothing.
  #[error("stage '{stage}' failed: {message}")]
  Generation { stage: StageTag, message: String },

  /// The input image could not be read.
  #[error("input image unavailable: {source}")]
  Input {
    #[source]
    source: PortError,
  },

  #[error("detection submission failed: {message}")]
  Submission {
    status: Option<u16>,
    message: String,
  },

  #[error("status poll for task '{task_uuid}' failed: {message}")]
  PollTransport {
    task_uuid: String,
    status: Option<u16>,
    message: String,
  },

  /// The service reported the task as failed.
  #[error("detection task '{task_uuid}' failed")]
  TaskFailed {
    task_uuid: String,
    payload: serde_json::Value,
  },

  /// Still pending when the retry budget ran out; it may still finish
  /// upstream, so a re-submit can make sense.
  #[error("detection task '{task_uuid}' timed out after {attempts} status requests")]
  TaskTimeout { task_uuid: String, attempts: u32 },

  /// Any other detection client failure (bad endpoint, unreadable body).
  #[error("detection error: {0}")]
  Detection(DetectionError),

  #[error("failed to write artifact: {0}")]
  Artifact(#[from] ArtifactError),

  #[error("invalid run transition from {from} to {to}")]
  InvalidTransition { from: RunState, to: RunState },

  #[error("run cancelled")]
  Cancelled,
}

impl PipelineError {
  pub(crate) fn generation(stage: StageTag, source: PortError) -> Self {
    Self::Generation {
      stage,
      message: source.to_string(),
    }
  }
}

impl From<DetectionError> for PipelineError {
  fn from(err: DetectionError) -> Self {
    match err {
      DetectionError::Submission { status, message } => Self::Submission { status, message },
      DetectionError::PollTransport {
        task_uuid,
        status,
        message,
      } => Self::PollTransport {
        task_uuid,
        status,
        message,
      },
      DetectionError::TaskFailed { task_uuid, payload } => Self::TaskFailed { task_uuid, payload },
      DetectionError::TaskTimeout {
        task_uuid,
        attempts,
      } => Self::TaskTimeout {
        task_uuid,
        attempts,
      },
      DetectionError::Cancelled => Self::Cancelled,
      other => Self::Detection(other),
    }
  }
}
