use sightline_ports::ImageRef;

/// Input of one pipeline run.
///
/// Built once per run and never mutated; the orchestrator only borrows it.
#[derive(Clone)]
pub struct PromptContext {
  prompt: String,
  image: ImageRef,
  token: Option<String>,
}

impl PromptContext {
  pub fn new(prompt: impl Into<String>, image: ImageRef) -> Self {
    Self {
      prompt: prompt.into(),
      image,
      token: None,
    }
  }

  /// Detection token for this run, overriding the configured one.
  pub fn with_token(mut self, token: impl Into<String>) -> Self {
    self.token = Some(token.into());
    self
  }

  pub fn prompt(&self) -> &str {
    &self.prompt
  }

  pub fn image(&self) -> &ImageRef {
    &self.image
  }

  pub fn token(&self) -> Option<&str> {
    self.token.as_deref()
  }
}

impl std::fmt::Debug for PromptContext {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("PromptContext")
      .field("prompt", &self.prompt)
      .field("image", &self.image)
      .field("token", &self.token.as_ref().map(|_| "<redacted>"))
      .finish()
  }
}
