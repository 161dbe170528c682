use std::time::Duration;

use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::Value;
use sightline_config::{DetectionConfig, DetectionTarget};
use sightline_ports::truncate_body;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};
use url::Url;

use crate::delay::{Delay, TokioDelay, cancellable};
use crate::error::DetectionError;
use crate::request::{DetectionRequest, parse_labels};
use crate::task::{DetectionTask, RetryBudget, TaskStatus};

#[derive(Debug, Deserialize)]
struct SubmitResponse {
  #[serde(default)]
  code: i64,
  #[serde(default)]
  msg: Option<String>,
  #[serde(default)]
  data: Option<SubmitData>,
}

#[derive(Debug, Deserialize)]
struct SubmitData {
  #[serde(default)]
  task_uuid: Option<String>,
}

/// Client for the remote detection service.
///
/// Holds configuration only; every call builds its own request, so one
/// client can serve concurrent runs.
pub struct DetectionClient<D: Delay = TokioDelay> {
  client: Client,
  base_url: Url,
  model: String,
  targets: Vec<DetectionTarget>,
  token: Option<String>,
  max_attempts: u32,
  poll_interval: Duration,
  request_timeout: Duration,
  delay: D,
}

impl DetectionClient<TokioDelay> {
  pub fn new(config: &DetectionConfig) -> Result<Self, DetectionError> {
    Self::with_delay(config, TokioDelay)
  }
}

impl<D: Delay> DetectionClient<D> {
  /// Create a client with a custom wait between polls.
  pub fn with_delay(config: &DetectionConfig, delay: D) -> Result<Self, DetectionError> {
    Ok(Self {
      client: Client::new(),
      base_url: normalize_base(&config.base_url)?,
      model: config.model.clone(),
      targets: config.targets.clone(),
      token: config.token.clone(),
      max_attempts: config.max_attempts,
      poll_interval: Duration::from_millis(config.poll_interval_ms),
      request_timeout: Duration::from_millis(config.request_timeout_ms),
      delay,
    })
  }

  /// Build a request for `image` from free-form label text.
  pub fn build_request(&self, image: &str, label_text: &str) -> Result<DetectionRequest, DetectionError> {
    let labels = parse_labels(label_text);
    if labels.is_empty() {
      return Err(DetectionError::NoLabels {
        label_text: label_text.to_string(),
      });
    }

    DetectionRequest::builder(image)
      .labels(labels)
      .model(&self.model)
      .targets(self.targets.iter().copied())
      .build()
  }

  /// Submit, poll to a terminal status, and return the succeeded task.
  ///
  /// `token` overrides the configured access token for this call.
  #[instrument(name = "detection", skip(self, image, token, cancel), fields(model = %self.model))]
  pub async fn run_detection(
    &self,
    image: &str,
    label_text: &str,
    token: Option<&str>,
    cancel: &CancellationToken,
  ) -> Result<DetectionTask, DetectionError> {
    let request = self.build_request(image, label_text)?;
    let task_uuid = self.submit(&request, token, cancel).await?;
    self
      .poll_until_terminal(&task_uuid, token, cancel)
      .await?
      .into_success()
  }

  /// Submit a detection job and return its task id. Never retried.
  #[instrument(
    name = "detection_submit",
    skip(self, request, token, cancel),
    fields(labels = request.prompts().len())
  )]
  pub async fn submit(
    &self,
    request: &DetectionRequest,
    token: Option<&str>,
    cancel: &CancellationToken,
  ) -> Result<String, DetectionError> {
    let url = self.endpoint("tasks/detection")?;

    let mut builder = self
      .client
      .post(url)
      .timeout(self.request_timeout)
      .json(request);
    if let Some(token) = self.resolve_token(token) {
      builder = builder.header("Token", token);
    }

    let response = cancellable(cancel, builder.send())
      .await?
      .map_err(|e| submission_error(None, e.to_string()))?;
    let status = response.status();
    let body = cancellable(cancel, response.text())
      .await?
      .map_err(|e| submission_error(Some(status), e.to_string()))?;

    if status != StatusCode::OK {
      return Err(submission_error(
        Some(status),
        format!("HTTP {}: {}", status.as_u16(), truncate_body(&body)),
      ));
    }

    let parsed: SubmitResponse = serde_json::from_str(&body).map_err(|e| {
      DetectionError::invalid_response(format!(
        "submit response is not valid JSON ({}): {}",
        e,
        truncate_body(&body)
      ))
    })?;

    if parsed.code != 0 {
      return Err(submission_error(
        Some(status),
        format!(
          "service returned code {}: {}",
          parsed.code,
          parsed.msg.as_deref().unwrap_or("")
        ),
      ));
    }

    let task_uuid = parsed
      .data
      .and_then(|d| d.task_uuid)
      .filter(|id| !id.trim().is_empty())
      .ok_or_else(|| DetectionError::invalid_response("submit response has no data.task_uuid"))?;

    info!(task_uuid = %task_uuid, "detection_submitted");
    Ok(task_uuid)
  }

  /// Read the current status of a task once.
  ///
  /// Returns the parsed status and the raw `data` object.
  pub async fn fetch_status(
    &self,
    task_uuid: &str,
    token: Option<&str>,
    cancel: &CancellationToken,
  ) -> Result<(TaskStatus, Value), DetectionError> {
    let url = self.endpoint(&format!("task_statuses/{}", task_uuid))?;

    let mut builder = self.client.get(url).timeout(self.request_timeout);
    if let Some(token) = self.resolve_token(token) {
      builder = builder.header("Token", token);
    }

    let poll_error = |status: Option<StatusCode>, message: String| DetectionError::PollTransport {
      task_uuid: task_uuid.to_string(),
      status: status.map(|s| s.as_u16()),
      message,
    };

    let response = cancellable(cancel, builder.send())
      .await?
      .map_err(|e| poll_error(None, e.to_string()))?;
    let status = response.status();
    let body = cancellable(cancel, response.text())
      .await?
      .map_err(|e| poll_error(Some(status), e.to_string()))?;

    if status != StatusCode::OK {
      return Err(poll_error(
        Some(status),
        format!("HTTP {}: {}", status.as_u16(), truncate_body(&body)),
      ));
    }

    let mut parsed: Value = serde_json::from_str(&body).map_err(|e| {
      DetectionError::invalid_response(format!(
        "status response is not valid JSON ({}): {}",
        e,
        truncate_body(&body)
      ))
    })?;

    let data = match parsed.get_mut("data") {
      Some(data) if data.is_object() => data.take(),
      _ => {
        return Err(DetectionError::invalid_response(
          "status response has no data object",
        ));
      }
    };

    let raw = data
      .get("status")
      .and_then(Value::as_str)
      .ok_or_else(|| DetectionError::invalid_response("status response has no data.status"))?;
    let task_status = TaskStatus::from_wire(raw).ok_or_else(|| {
      DetectionError::invalid_response(format!("unrecognized task status '{}'", raw))
    })?;

    Ok((task_status, data))
  }

  /// Poll until the task is terminal or the retry budget runs out.
  ///
  /// A pending task left when the budget is spent comes back with status
  /// `Unknown`. Transport failures end the loop with `PollTransport`, and a
  /// `success` with an unreadable result with `InvalidResponse`.
  #[instrument(name = "detection_poll", skip(self, token, cancel), fields(max_attempts = self.max_attempts))]
  pub async fn poll_until_terminal(
    &self,
    task_uuid: &str,
    token: Option<&str>,
    cancel: &CancellationToken,
  ) -> Result<DetectionTask, DetectionError> {
    let mut task = DetectionTask::new(task_uuid);
    let mut budget = RetryBudget::new(self.max_attempts, self.poll_interval);

    while let Some(attempt) = budget.try_consume() {
      if cancel.is_cancelled() {
        return Err(DetectionError::Cancelled);
      }

      let (status, data) = self.fetch_status(task_uuid, token, cancel).await?;
      task.observe(status, data, attempt)?;
      debug!(task_uuid = %task_uuid, attempt, status = %status, "poll_status");

      if task.is_terminal() {
        info!(task_uuid = %task_uuid, attempts = attempt, status = %status, "detection_finished");
        return Ok(task);
      }

      if !budget.is_exhausted() {
        self.delay.wait(budget.interval(), cancel).await?;
      }
    }

    task.mark_timed_out();
    warn!(
      task_uuid = %task_uuid,
      attempts = budget.used(),
      "detection_timeout"
    );
    Ok(task)
  }

  fn resolve_token<'a>(&'a self, token: Option<&'a str>) -> Option<&'a str> {
    token.or(self.token.as_deref())
  }

  fn endpoint(&self, path: &str) -> Result<Url, DetectionError> {
    self
      .base_url
      .join(path)
      .map_err(|e| DetectionError::InvalidEndpoint {
        url: format!("{}{}", self.base_url, path),
        message: e.to_string(),
      })
  }
}

fn submission_error(status: Option<StatusCode>, message: String) -> DetectionError {
  DetectionError::Submission {
    status: status.map(|s| s.as_u16()),
    message,
  }
}

/// Parse the base URL, keeping any path prefix joinable.
fn normalize_base(raw: &str) -> Result<Url, DetectionError> {
  let trimmed = raw.trim();
  let with_slash = if trimmed.ends_with('/') {
    trimmed.to_string()
  } else {
    format!("{}/", trimmed)
  };

  let url = Url::parse(&with_slash).map_err(|e| DetectionError::InvalidEndpoint {
    url: raw.to_string(),
    message: e.to_string(),
  })?;

  if !matches!(url.scheme(), "http" | "https") {
    return Err(DetectionError::InvalidEndpoint {
      url: raw.to_string(),
      message: format!("unsupported scheme '{}'", url.scheme()),
    });
  }
  Ok(url)
}
