use std::collections::BTreeMap;

use async_trait::async_trait;

use crate::chat::{ChatClient, ChatMessage};
use crate::error::PortError;
use crate::template::render_template;

/// An instruction template plus the named values it may reference.
///
/// The stage input is bound to `question` at render time, so the same
/// instruction can be applied to whatever the previous stage produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instruction {
  name: String,
  template: String,
  context: BTreeMap<String, String>,
}

impl Instruction {
  pub fn new(name: impl Into<String>, template: impl Into<String>) -> Self {
    Self {
      name: name.into(),
      template: template.into(),
      context: BTreeMap::new(),
    }
  }

  /// Bind an additional template variable.
  pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
    self.context.insert(key.into(), value.into());
    self
  }

  pub fn name(&self) -> &str {
    &self.name
  }

  /// Render the instruction with `input` bound to `question`.
  pub fn render(&self, input: &str) -> Result<String, PortError> {
    let mut context = self.context.clone();
    context.insert("question".to_string(), input.to_string());
    render_template(&self.name, &self.template, &context)
  }
}

/// Rewrites text according to an instruction.
#[async_trait]
pub trait TextTransformPort: Send + Sync {
  async fn transform(&self, input: &str, instruction: &Instruction) -> Result<String, PortError>;
}

/// Transformer backed by a chat model: the rendered instruction is sent as a
/// single user message.
pub struct ChatTransformer {
  client: ChatClient,
  model: String,
}

impl ChatTransformer {
  pub fn new(client: ChatClient, model: impl Into<String>) -> Self {
    Self {
      client,
      model: model.into(),
    }
  }
}

#[async_trait]
impl TextTransformPort for ChatTransformer {
  async fn transform(&self, input: &str, instruction: &Instruction) -> Result<String, PortError> {
    let text = instruction.render(input)?;
    let messages = [ChatMessage::user(text)];
    self.client.complete(&self.model, &messages).await
  }
}
