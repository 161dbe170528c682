use serde::{Deserialize, Serialize};

use crate::error::PipelineError;

/// Which step produced a piece of text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageTag {
  /// First, unhinted describer pass.
  Description,
  /// Second describer pass, informed by the classification.
  Answer,
  Extraction,
  Elaboration,
  Filtered,
  FinalLabels,
}

impl StageTag {
  pub fn as_str(&self) -> &'static str {
    match self {
      StageTag::Description => "description",
      StageTag::Answer => "answer",
      StageTag::Extraction => "extraction",
      StageTag::Elaboration => "elaboration",
      StageTag::Filtered => "filtered",
      StageTag::FinalLabels => "final_labels",
    }
  }
}

impl std::fmt::Display for StageTag {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str(self.as_str())
  }
}

/// Output of one text-producing stage. Never empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageResult {
  tag: StageTag,
  text: String,
}

impl StageResult {
  /// Wrap stage output, rejecting empty or whitespace-only text.
  pub fn new(tag: StageTag, text: impl Into<String>) -> Result<Self, PipelineError> {
    let text = text.into();
    if text.trim().is_empty() {
      return Err(PipelineError::Generation {
        stage: tag,
        message: "empty output".to_string(),
      });
    }
    Ok(Self { tag, text })
  }

  pub fn tag(&self) -> StageTag {
    self.tag
  }

  pub fn text(&self) -> &str {
    &self.text
  }

  /// Hand the same text on as the final label string.
  pub fn into_labels(self) -> StageResult {
    StageResult {
      tag: StageTag::FinalLabels,
      text: self.text,
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BranchKind {
  Question,
  Statement,
}

/// The two exclusive processing paths, each carrying the input it needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Branch {
  /// The answer already names the objects of interest.
  Question { answer: StageResult },
  /// The answer is prose that still has to be mined for objects.
  Statement { description: StageResult },
}

impl Branch {
  pub fn select(is_question: bool, primary: StageResult) -> Self {
    if is_question {
      Branch::Question { answer: primary }
    } else {
      Branch::Statement {
        description: primary,
      }
    }
  }

  pub fn kind(&self) -> BranchKind {
    match self {
      Branch::Question { .. } => BranchKind::Question,
      Branch::Statement { .. } => BranchKind::Statement,
    }
  }
}
