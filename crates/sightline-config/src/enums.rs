use serde::{Deserialize, Serialize};

/// What the detection service should return for each object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectionTarget {
  Bbox,
  Mask,
}

/// Transform chain applied to statement (non-question) prompts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatementChain {
  /// One extraction of the objects related to the prompt.
  #[default]
  Direct,
  /// Extract, elaborate, filter by relevance, then extract a plain list.
  Elaborate,
}
