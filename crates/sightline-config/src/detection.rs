use serde::{Deserialize, Serialize};

use crate::enums::DetectionTarget;
use crate::error::ConfigError;

/// Remote detection service settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionConfig {
  /// Service root, e.g. "https://api.deepdataspace.com".
  pub base_url: String,

  /// Access token sent in the `Token` header.
  /// A per-run token takes precedence over this one.
  #[serde(skip_serializing_if = "Option::is_none")]
  pub token: Option<String>,

  /// Detection model identifier.
  pub model: String,

  pub targets: Vec<DetectionTarget>,

  /// Maximum number of status requests per task.
  pub max_attempts: u32,

  /// Fixed wait between status requests.
  pub poll_interval_ms: u64,

  /// Per-request HTTP timeout.
  pub request_timeout_ms: u64,
}

impl Default for DetectionConfig {
  fn default() -> Self {
    Self {
      base_url: "https://api.deepdataspace.com".to_string(),
      token: None,
      model: "GroundingDino-1.6-Pro".to_string(),
      targets: vec![DetectionTarget::Bbox],
      max_attempts: 60,
      poll_interval_ms: 1000,
      request_timeout_ms: 30_000,
    }
  }
}

impl DetectionConfig {
  pub(crate) fn validate(&self) -> Result<(), ConfigError> {
    if self.base_url.trim().is_empty() {
      return Err(ConfigError::invalid("detection.base_url", "must not be empty"));
    }
    if self.model.trim().is_empty() {
      return Err(ConfigError::invalid("detection.model", "must not be empty"));
    }
    if self.targets.is_empty() {
      return Err(ConfigError::invalid(
        "detection.targets",
        "at least one target is required",
      ));
    }
    if self.max_attempts == 0 {
      return Err(ConfigError::invalid(
        "detection.max_attempts",
        "must be greater than zero",
      ));
    }
    Ok(())
  }
}

/// Segmentation options.
///
/// `sam_type` and `text_threshold` are carried for backends that segment
/// locally; the remote service only sees the detected boxes, which are
/// filtered by `box_threshold`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SegmentationOptions {
  pub sam_type: String,
  pub box_threshold: f32,
  pub text_threshold: f32,
}

impl Default for SegmentationOptions {
  fn default() -> Self {
    Self {
      sam_type: "sam2.1_hiera_small".to_string(),
      box_threshold: 0.3,
      text_threshold: 0.25,
    }
  }
}

impl SegmentationOptions {
  pub(crate) fn validate(&self) -> Result<(), ConfigError> {
    check_unit_range("segmentation.box_threshold", self.box_threshold)?;
    check_unit_range("segmentation.text_threshold", self.text_threshold)?;
    if self.sam_type.trim().is_empty() {
      return Err(ConfigError::invalid("segmentation.sam_type", "must not be empty"));
    }
    Ok(())
  }
}

fn check_unit_range(field: &str, value: f32) -> Result<(), ConfigError> {
  if !(0.0..=1.0).contains(&value) {
    return Err(ConfigError::invalid(
      field,
      format!("{} is outside [0, 1]", value),
    ));
  }
  Ok(())
}
