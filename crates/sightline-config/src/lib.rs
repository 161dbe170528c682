//! Sightline Config
//!
//! This crate contains the serializable configuration types for sightline.
//! A single JSON document describes the remote detection service, the chat
//! models behind the describer and text-transform stages, the prompt templates
//! each stage renders, and where the final image is written.
//!
//! Every section has defaults, so an empty `{}` is a valid configuration:
//!
//! ```json
//! {
//!   "detection": { "token": "...", "targets": ["bbox", "mask"] },
//!   "pipeline": { "statement_chain": "elaborate" },
//!   "output": { "path": "annotated.png" }
//! }
//! ```
//!
//! Secrets can also come from the environment, see [`SightlineConfig::apply_env`].

mod chat;
mod detection;
mod enums;
mod error;
mod prompts;

use std::path::Path;

use serde::{Deserialize, Serialize};

pub use chat::ChatConfig;
pub use detection::{DetectionConfig, SegmentationOptions};
pub use enums::{DetectionTarget, StatementChain};
pub use error::ConfigError;
pub use prompts::{DescriberPrompts, PromptTemplates, TransformPrompts};

/// Environment variable holding the detection service token.
pub const DETECTION_TOKEN_ENV: &str = "SIGHTLINE_DETECTION_TOKEN";

/// Environment variable holding the chat API key.
pub const CHAT_API_KEY_ENV: &str = "SIGHTLINE_CHAT_API_KEY";

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SightlineConfig {
  pub detection: DetectionConfig,
  pub segmentation: SegmentationOptions,
  pub chat: ChatConfig,
  pub prompts: PromptTemplates,
  pub pipeline: PipelineOptions,
  pub output: OutputConfig,
}

/// Orchestrator behaviour switches.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineOptions {
  /// Which transform chain statement prompts go through.
  pub statement_chain: StatementChain,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
  /// Where the final image is written.
  pub path: String,
}

impl Default for OutputConfig {
  fn default() -> Self {
    Self {
      path: "output.jpg".to_string(),
    }
  }
}

impl SightlineConfig {
  /// Parse a configuration from a JSON string.
  pub fn from_json(content: &str) -> Result<Self, ConfigError> {
    let config: SightlineConfig = serde_json::from_str(content)?;
    Ok(config)
  }

  /// Load a configuration file, falling back to defaults when it does not exist.
  pub fn load(path: &Path) -> Result<Self, ConfigError> {
    match std::fs::read_to_string(path) {
      Ok(content) => Self::from_json(&content),
      Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
      Err(e) => Err(ConfigError::Read {
        path: path.display().to_string(),
        source: e,
      }),
    }
  }

  /// Fill secrets from the process environment when set.
  pub fn apply_env(&mut self) {
    self.apply_env_from(|key| std::env::var(key).ok());
  }

  /// Same as [`apply_env`](Self::apply_env) with an injectable lookup.
  pub fn apply_env_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(token) = lookup(DETECTION_TOKEN_ENV).filter(|t| !t.is_empty()) {
      self.detection.token = Some(token);
    }
    if let Some(key) = lookup(CHAT_API_KEY_ENV).filter(|k| !k.is_empty()) {
      self.chat.api_key = Some(key);
    }
  }

  /// Check value ranges that serde cannot express.
  pub fn validate(&self) -> Result<(), ConfigError> {
    self.detection.validate()?;
    self.segmentation.validate()?;

    if self.chat.base_url.trim().is_empty() {
      return Err(ConfigError::invalid("chat.base_url", "must not be empty"));
    }
    if self.output.path.trim().is_empty() {
      return Err(ConfigError::invalid("output.path", "must not be empty"));
    }

    Ok(())
  }

  /// A copy with every secret replaced, safe to print.
  pub fn redacted(&self) -> Self {
    let mut copy = self.clone();
    if copy.detection.token.is_some() {
      copy.detection.token = Some("***".to_string());
    }
    if copy.chat.api_key.is_some() {
      copy.chat.api_key = Some("***".to_string());
    }
    copy
  }
}
