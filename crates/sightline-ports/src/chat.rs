//! Minimal OpenAI-compatible chat completions client.

use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use sightline_config::ChatConfig;
use tracing::debug;

use crate::error::{PortError, truncate_body};

/// A single chat message.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatMessage {
  pub role: String,
  pub content: MessageContent,
}

impl ChatMessage {
  pub fn system(text: impl Into<String>) -> Self {
    Self {
      role: "system".to_string(),
      content: MessageContent::Text(text.into()),
    }
  }

  pub fn user(text: impl Into<String>) -> Self {
    Self {
      role: "user".to_string(),
      content: MessageContent::Text(text.into()),
    }
  }

  /// A user message carrying text and an image.
  pub fn user_with_image(text: impl Into<String>, image_url: impl Into<String>) -> Self {
    Self {
      role: "user".to_string(),
      content: MessageContent::Parts(vec![
        ContentPart::Text { text: text.into() },
        ContentPart::ImageUrl {
          image_url: ImageUrl {
            url: image_url.into(),
          },
        },
      ]),
    }
  }
}

/// Message content: plain text or multi-part (text + image).
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum MessageContent {
  Text(String),
  Parts(Vec<ContentPart>),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
  Text { text: String },
  ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImageUrl {
  pub url: String,
}

#[derive(Debug, Serialize)]
struct CompletionRequest<'a> {
  model: &'a str,
  messages: &'a [ChatMessage],
  max_tokens: u32,
  temperature: f32,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
  #[serde(default)]
  choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
  message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
  #[serde(default)]
  content: Option<String>,
}

/// Client for a `/chat/completions` endpoint.
///
/// Cheap to clone; clones share the underlying connection pool.
#[derive(Debug, Clone)]
pub struct ChatClient {
  client: Client,
  base_url: String,
  api_key: Option<String>,
  max_tokens: u32,
  temperature: f32,
  timeout: Duration,
}

impl ChatClient {
  pub fn new(config: &ChatConfig) -> Self {
    Self {
      client: Client::new(),
      base_url: config.base_url.trim_end_matches('/').to_string(),
      api_key: config.api_key.clone(),
      max_tokens: config.max_tokens,
      temperature: config.temperature,
      timeout: Duration::from_millis(config.request_timeout_ms),
    }
  }

  /// Send `messages` to `model` and return the first choice's text.
  pub async fn complete(&self, model: &str, messages: &[ChatMessage]) -> Result<String, PortError> {
    let url = format!("{}/chat/completions", self.base_url);
    let body = CompletionRequest {
      model,
      messages,
      max_tokens: self.max_tokens,
      temperature: self.temperature,
    };

    debug!(model = %model, messages = messages.len(), "chat_request");

    let mut request = self
      .client
      .post(&url)
      .timeout(self.timeout)
      .json(&body);
    if let Some(key) = &self.api_key {
      request = request.bearer_auth(key);
    }

    let response = request.send().await?;
    let status = response.status();
    if !status.is_success() {
      let text = response.text().await.unwrap_or_default();
      return Err(PortError::Status {
        status: status.as_u16(),
        body: truncate_body(&text),
      });
    }

    let completion: CompletionResponse = response.json().await?;
    let content = completion
      .choices
      .into_iter()
      .next()
      .ok_or_else(|| PortError::invalid_response("no choices in response"))?
      .message
      .content
      .unwrap_or_default();

    Ok(content.trim().to_string())
  }
}
