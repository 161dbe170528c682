//! Detection request body and label parsing.

use serde::Serialize;
use sightline_config::DetectionTarget;

use crate::error::DetectionError;

/// One prompt entry of a detection request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PromptEntry {
  Text { text: String },
}

/// Body of `POST /tasks/detection`.
///
/// Built per call through [`DetectionRequestBuilder`]; nothing is shared
/// between requests.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DetectionRequest {
  image: String,
  prompts: Vec<PromptEntry>,
  model: String,
  targets: Vec<DetectionTarget>,
}

impl DetectionRequest {
  pub fn builder(image: impl Into<String>) -> DetectionRequestBuilder {
    DetectionRequestBuilder {
      image: image.into(),
      labels: Vec::new(),
      model: None,
      targets: Vec::new(),
    }
  }

  pub fn image(&self) -> &str {
    &self.image
  }

  pub fn prompts(&self) -> &[PromptEntry] {
    &self.prompts
  }

  pub fn model(&self) -> &str {
    &self.model
  }

  pub fn targets(&self) -> &[DetectionTarget] {
    &self.targets
  }
}

pub struct DetectionRequestBuilder {
  image: String,
  labels: Vec<String>,
  model: Option<String>,
  targets: Vec<DetectionTarget>,
}

impl DetectionRequestBuilder {
  pub fn label(mut self, label: impl Into<String>) -> Self {
    self.labels.push(label.into());
    self
  }

  pub fn labels<I, S>(mut self, labels: I) -> Self
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    self.labels.extend(labels.into_iter().map(Into::into));
    self
  }

  pub fn model(mut self, model: impl Into<String>) -> Self {
    self.model = Some(model.into());
    self
  }

  pub fn target(mut self, target: DetectionTarget) -> Self {
    if !self.targets.contains(&target) {
      self.targets.push(target);
    }
    self
  }

  pub fn targets(self, targets: impl IntoIterator<Item = DetectionTarget>) -> Self {
    targets.into_iter().fold(self, |b, t| b.target(t))
  }

  /// Finish the request. Duplicate labels are collapsed; at least one label
  /// is required. Targets default to `bbox`.
  pub fn build(self) -> Result<DetectionRequest, DetectionError> {
    let mut seen: Vec<String> = Vec::new();
    let mut prompts = Vec::new();
    for label in self.labels {
      let label = label.trim().to_string();
      let key = label.to_lowercase();
      if label.is_empty() || seen.contains(&key) {
        continue;
      }
      seen.push(key);
      prompts.push(PromptEntry::Text { text: label });
    }

    if prompts.is_empty() {
      return Err(DetectionError::NoLabels {
        label_text: String::new(),
      });
    }

    let targets = if self.targets.is_empty() {
      vec![DetectionTarget::Bbox]
    } else {
      self.targets
    };

    Ok(DetectionRequest {
      image: self.image,
      prompts,
      model: self
        .model
        .unwrap_or_else(|| "GroundingDino-1.6-Pro".to_string()),
      targets,
    })
  }
}

/// Split label text produced by the text stages into distinct labels.
///
/// Accepts comma, semicolon or newline separated lists, with or without list
/// numbering ("1. dog, 2. grass."), an optional leading "Answer:", and
/// trailing periods. "none" entries are dropped. Order of first occurrence
/// is kept; duplicates are compared case-insensitively.
pub fn parse_labels(label_text: &str) -> Vec<String> {
  let mut labels: Vec<String> = Vec::new();

  for piece in label_text.split([',', ';', '\n']) {
    let label = clean_label(piece);
    if label.is_empty() || label.eq_ignore_ascii_case("none") {
      continue;
    }
    if labels.iter().any(|l| l.eq_ignore_ascii_case(&label)) {
      continue;
    }
    labels.push(label);
  }

  labels
}

fn clean_label(piece: &str) -> String {
  let mut s = piece.trim();

  if let Some(prefix) = s.get(..7)
    && prefix.eq_ignore_ascii_case("answer:")
  {
    s = s[7..].trim_start();
  }

  // "1." / "2)" numbering
  let digits = s.chars().take_while(|c| c.is_ascii_digit()).count();
  if digits > 0 {
    let rest = &s[digits..];
    if let Some(stripped) = rest.strip_prefix('.').or_else(|| rest.strip_prefix(')')) {
      s = stripped.trim_start();
    }
  }

  s = s.trim_start_matches(['-', '*', '•']).trim();
  s = s.trim_end_matches(['.', '!']).trim();
  s = s.trim_matches(['"', '\'']).trim();

  s.to_string()
}
