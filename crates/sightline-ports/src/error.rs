use thiserror::Error;

/// Errors returned by port implementations.
#[derive(Debug, Error)]
pub enum PortError {
  /// The input cannot be processed (e.g. an empty prompt).
  #[error("invalid input: {message}")]
  InvalidInput { message: String },

  /// HTTP request to the backing model failed.
  #[error("http error: {0}")]
  Http(#[from] reqwest::Error),

  /// The model endpoint answered with a non-success status.
  #[error("model endpoint returned {status}: {body}")]
  Status { status: u16, body: String },

  /// The response did not have the expected shape.
  #[error("invalid response: {message}")]
  InvalidResponse { message: String },

  /// An instruction template failed to render.
  #[error("failed to render template '{name}': {message}")]
  Template { name: String, message: String },

  /// The image could not be read.
  #[error("failed to read image '{path}': {source}")]
  Image {
    path: String,
    #[source]
    source: std::io::Error,
  },
}

impl PortError {
  pub fn invalid_input(message: impl Into<String>) -> Self {
    Self::InvalidInput {
      message: message.into(),
    }
  }

  pub fn invalid_response(message: impl Into<String>) -> Self {
    Self::InvalidResponse {
      message: message.into(),
    }
  }
}

/// Cap upstream bodies embedded in error messages.
pub fn truncate_body(body: &str) -> String {
  const LIMIT: usize = 500;
  if body.len() <= LIMIT {
    return body.to_string();
  }
  let mut end = LIMIT;
  while !body.is_char_boundary(end) {
    end -= 1;
  }
  format!("{}...", &body[..end])
}
