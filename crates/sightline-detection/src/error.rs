use thiserror::Error;

/// Errors that can occur while running a detection task.
#[derive(Debug, Error)]
pub enum DetectionError {
  /// The label text did not contain any usable label.
  #[error("no detection labels in '{label_text}'")]
  NoLabels { label_text: String },

  /// The configured service URL cannot be used.
  #[error("invalid detection endpoint '{url}': {message}")]
  InvalidEndpoint { url: String, message: String },

  /// Submission was rejected or never reached the service. Not retried.
  #[error("detection submission failed: {message}")]
  Submission {
    status: Option<u16>,
    message: String,
  },

  /// A status request failed. Ends polling immediately.
  #[error("status poll for task '{task_uuid}' failed: {message}")]
  PollTransport {
    task_uuid: String,
    status: Option<u16>,
    message: String,
  },

  /// The service answered 200 with a body we do not understand.
  #[error("invalid response from detection service: {message}")]
  InvalidResponse { message: String },

  /// The service reported the task as failed.
  #[error("detection task '{task_uuid}' failed")]
  TaskFailed {
    task_uuid: String,
    payload: serde_json::Value,
  },

  /// The task was still pending when the retry budget ran out.
  /// It may still complete on the service side.
  #[error("detection task '{task_uuid}' still pending after {attempts} status requests")]
  TaskTimeout { task_uuid: String, attempts: u32 },

  #[error("detection cancelled")]
  Cancelled,
}

impl DetectionError {
  pub(crate) fn invalid_response(message: impl Into<String>) -> Self {
    Self::InvalidResponse {
      message: message.into(),
    }
  }

  /// HTTP status attached to the error, if the service answered at all.
  pub fn status(&self) -> Option<u16> {
    match self {
      Self::Submission { status, .. } | Self::PollTransport { status, .. } => *status,
      _ => None,
    }
  }
}
