use std::collections::BTreeMap;

use async_trait::async_trait;
use sightline_config::DescriberPrompts;

use crate::chat::{ChatClient, ChatMessage};
use crate::error::PortError;
use crate::image::ImageRef;
use crate::template::render_template;

/// Answers a prompt about an image.
///
/// `hint` is `None` for a plain description and `Some(is_question)` once the
/// prompt has been classified; implementations may phrase the request to the
/// model differently for each case.
#[async_trait]
pub trait DescriberPort: Send + Sync {
  async fn describe(
    &self,
    image: &ImageRef,
    prompt: &str,
    hint: Option<bool>,
  ) -> Result<String, PortError>;
}

/// Describer backed by a vision-capable chat model.
pub struct ChatDescriber {
  client: ChatClient,
  model: String,
  prompts: DescriberPrompts,
}

impl ChatDescriber {
  pub fn new(client: ChatClient, model: impl Into<String>, prompts: DescriberPrompts) -> Self {
    Self {
      client,
      model: model.into(),
      prompts,
    }
  }

  /// The instruction text sent for `prompt` under `hint`.
  pub fn instruction(&self, prompt: &str, hint: Option<bool>) -> Result<String, PortError> {
    let (name, template) = match hint {
      None => ("describer.plain", &self.prompts.plain),
      Some(true) => ("describer.question", &self.prompts.question),
      Some(false) => ("describer.statement", &self.prompts.statement),
    };
    let context = BTreeMap::from([("prompt".to_string(), prompt.to_string())]);
    render_template(name, template, &context)
  }
}

#[async_trait]
impl DescriberPort for ChatDescriber {
  async fn describe(
    &self,
    image: &ImageRef,
    prompt: &str,
    hint: Option<bool>,
  ) -> Result<String, PortError> {
    let text = self.instruction(prompt, hint)?;
    let image_ref = image.remote_reference().await?;
    let messages = [ChatMessage::user_with_image(text, image_ref)];
    self.client.complete(&self.model, &messages).await
  }
}
