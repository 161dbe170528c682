use thiserror::Error;

/// Errors raised while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
  /// The configuration file exists but could not be read.
  #[error("failed to read config file '{path}': {source}")]
  Read {
    path: String,
    #[source]
    source: std::io::Error,
  },

  /// The document is not valid JSON or does not match the schema.
  #[error("invalid config document: {0}")]
  Parse(#[from] serde_json::Error),

  /// A value is outside its allowed range.
  #[error("invalid value for '{field}': {message}")]
  Invalid { field: String, message: String },
}

impl ConfigError {
  pub(crate) fn invalid(field: &str, message: impl Into<String>) -> Self {
    Self::Invalid {
      field: field.to_string(),
      message: message.into(),
    }
  }
}
