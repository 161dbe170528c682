use serde::{Deserialize, Serialize};

use crate::error::PipelineError;
use crate::stage::BranchKind;

/// Progress of a single run.
///
/// ```text
/// Start → Described → Branched{Question|Statement} → LabelsReady → Detecting → Done
///   └──────────┴──────────────┴──────────────────────────┴─────────────┴──────→ Failed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "branch", rename_all = "snake_case")]
pub enum RunState {
  Start,
  Described,
  Branched(BranchKind),
  LabelsReady,
  Detecting,
  Done,
  Failed,
}

impl RunState {
  pub fn is_terminal(&self) -> bool {
    matches!(self, RunState::Done | RunState::Failed)
  }

  pub fn can_transition_to(&self, next: RunState) -> bool {
    use RunState::*;
    match (self, next) {
      (Done | Failed, _) => false,
      (_, Failed) => true,
      (Start, Described) => true,
      (Described, Branched(_)) => true,
      (Branched(_), LabelsReady) => true,
      (LabelsReady, Detecting) => true,
      (Detecting, Done) => true,
      _ => false,
    }
  }

  /// Move to `next`, rejecting anything outside the forward path.
  pub fn advance(&mut self, next: RunState) -> Result<(), PipelineError> {
    if !self.can_transition_to(next) {
      return Err(PipelineError::InvalidTransition {
        from: *self,
        to: next,
      });
    }
    *self = next;
    Ok(())
  }

  pub fn as_str(&self) -> &'static str {
    match self {
      RunState::Start => "start",
      RunState::Described => "described",
      RunState::Branched(BranchKind::Question) => "branched_question",
      RunState::Branched(BranchKind::Statement) => "branched_statement",
      RunState::LabelsReady => "labels_ready",
      RunState::Detecting => "detecting",
      RunState::Done => "done",
      RunState::Failed => "failed",
    }
  }
}

impl std::fmt::Display for RunState {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str(self.as_str())
  }
}
