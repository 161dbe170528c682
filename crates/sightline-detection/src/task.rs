use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sightline_ports::truncate_body;

use crate::error::DetectionError;

/// Status of a remote detection task.
///
/// `Unknown` is never reported by the service; the client assigns it when
/// the retry budget runs out while the task is still pending.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
  Waiting,
  Running,
  Success,
  Failed,
  Unknown,
}

impl TaskStatus {
  /// Parse a status string from the service. `unknown` is not accepted.
  pub fn from_wire(s: &str) -> Option<Self> {
    match s.trim().to_ascii_lowercase().as_str() {
      "waiting" => Some(Self::Waiting),
      "running" => Some(Self::Running),
      "success" => Some(Self::Success),
      "failed" => Some(Self::Failed),
      _ => None,
    }
  }

  pub fn as_str(&self) -> &'static str {
    match self {
      Self::Waiting => "waiting",
      Self::Running => "running",
      Self::Success => "success",
      Self::Failed => "failed",
      Self::Unknown => "unknown",
    }
  }

  pub fn is_terminal(&self) -> bool {
    matches!(self, Self::Success | Self::Failed | Self::Unknown)
  }

  pub fn is_pending(&self) -> bool {
    matches!(self, Self::Waiting | Self::Running)
  }
}

impl std::fmt::Display for TaskStatus {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str(self.as_str())
  }
}

/// One object found by the service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectedObject {
  #[serde(default)]
  pub category: String,

  pub score: f32,

  /// `[x1, y1, x2, y2]` in image pixels.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub bbox: Option<[f64; 4]>,

  /// Mask payload, passed through untouched.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub mask: Option<Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DetectionResult {
  #[serde(default)]
  pub objects: Vec<DetectedObject>,
}

impl DetectionResult {
  pub fn is_empty(&self) -> bool {
    self.objects.is_empty()
  }

  /// Drop objects scoring below `threshold`.
  pub fn retain_above(&mut self, threshold: f32) {
    self.objects.retain(|o| o.score >= threshold);
  }
}

/// A submitted detection job as seen from this client.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DetectionTask {
  pub task_uuid: String,
  pub status: TaskStatus,
  /// Status requests made so far.
  pub attempts: u32,
  /// Last `data` object returned by the service.
  #[serde(skip_serializing_if = "Option::is_none")]
  pub payload: Option<Value>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub result: Option<DetectionResult>,
}

impl DetectionTask {
  pub fn new(task_uuid: impl Into<String>) -> Self {
    Self {
      task_uuid: task_uuid.into(),
      status: TaskStatus::Waiting,
      attempts: 0,
      payload: None,
      result: None,
    }
  }

  /// Record one status observation.
  ///
  /// Once the task is terminal further observations are ignored and
  /// `Ok(false)` is returned. A `success` whose `result` does not parse is
  /// an `InvalidResponse` and leaves the task unchanged.
  pub fn observe(
    &mut self,
    status: TaskStatus,
    data: Value,
    attempts: u32,
  ) -> Result<bool, DetectionError> {
    if self.status.is_terminal() {
      return Ok(false);
    }

    if status == TaskStatus::Success {
      self.result = Some(parse_result(&self.task_uuid, &data)?);
    }
    self.attempts = attempts;
    self.status = status;
    self.payload = Some(data);
    Ok(true)
  }

  /// Mark a still-pending task as timed out.
  pub fn mark_timed_out(&mut self) {
    if self.status.is_pending() {
      self.status = TaskStatus::Unknown;
    }
  }

  pub fn is_terminal(&self) -> bool {
    self.status.is_terminal()
  }

  /// Keep a succeeded task; turn `failed` and timed-out tasks into their
  /// distinct errors.
  pub fn into_success(self) -> Result<DetectionTask, DetectionError> {
    match self.status {
      TaskStatus::Success => Ok(self),
      TaskStatus::Failed => Err(DetectionError::TaskFailed {
        task_uuid: self.task_uuid,
        payload: self.payload.unwrap_or(Value::Null),
      }),
      _ => Err(DetectionError::TaskTimeout {
        task_uuid: self.task_uuid,
        attempts: self.attempts,
      }),
    }
  }
}

/// A missing or null `result` is a success with no objects.
fn parse_result(task_uuid: &str, data: &Value) -> Result<DetectionResult, DetectionError> {
  match data.get("result") {
    None | Some(Value::Null) => Ok(DetectionResult::default()),
    Some(raw) => DetectionResult::deserialize(raw).map_err(|e| {
      DetectionError::invalid_response(format!(
        "task '{}' succeeded with an unreadable result ({}): {}",
        task_uuid,
        e,
        truncate_body(&raw.to_string())
      ))
    }),
  }
}

/// Bounded number of status requests with a fixed interval between them.
#[derive(Debug, Clone)]
pub struct RetryBudget {
  max_attempts: u32,
  interval: Duration,
  used: u32,
}

impl RetryBudget {
  pub fn new(max_attempts: u32, interval: Duration) -> Self {
    Self {
      max_attempts,
      interval,
      used: 0,
    }
  }

  /// Take one attempt. Returns the 1-based attempt number, or `None` when
  /// the budget is spent.
  pub fn try_consume(&mut self) -> Option<u32> {
    if self.used >= self.max_attempts {
      return None;
    }
    self.used += 1;
    Some(self.used)
  }

  pub fn used(&self) -> u32 {
    self.used
  }

  pub fn is_exhausted(&self) -> bool {
    self.used >= self.max_attempts
  }

  pub fn interval(&self) -> Duration {
    self.interval
  }
}
