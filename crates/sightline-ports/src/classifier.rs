use async_trait::async_trait;
use tracing::debug;

use crate::chat::{ChatClient, ChatMessage};
use crate::error::PortError;

/// Decides whether a prompt is a question.
#[async_trait]
pub trait ClassifierPort: Send + Sync {
  async fn is_question(&self, text: &str) -> Result<bool, PortError>;
}

/// Words that open a question when they lead the sentence.
const QUESTION_OPENERS: &[&str] = &[
  "what", "which", "who", "whom", "whose", "where", "when", "why", "how", "is", "are", "am", "was",
  "were", "do", "does", "did", "can", "could", "should", "would", "will", "shall", "may", "might",
  "has", "have", "had",
];

/// Rule-based classifier: a trailing `?` or a leading interrogative or
/// auxiliary word marks a question.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeuristicClassifier;

impl HeuristicClassifier {
  pub fn classify(text: &str) -> Result<bool, PortError> {
    let text = text.trim();
    if text.is_empty() {
      return Err(PortError::invalid_input("cannot classify an empty prompt"));
    }

    if text.ends_with('?') {
      return Ok(true);
    }

    let first = text
      .split_whitespace()
      .next()
      .map(|w| {
        w.trim_matches(|c: char| !c.is_alphanumeric() && c != '\'')
          .to_lowercase()
      })
      .unwrap_or_default();

    // "what's", "who's", "how'd"
    let stem = first.split('\'').next().unwrap_or_default();

    Ok(QUESTION_OPENERS.contains(&stem))
  }
}

#[async_trait]
impl ClassifierPort for HeuristicClassifier {
  async fn is_question(&self, text: &str) -> Result<bool, PortError> {
    Self::classify(text)
  }
}

/// Asks a chat model for a yes/no verdict.
pub struct ChatClassifier {
  client: ChatClient,
  model: String,
}

impl ChatClassifier {
  pub fn new(client: ChatClient, model: impl Into<String>) -> Self {
    Self {
      client,
      model: model.into(),
    }
  }
}

#[async_trait]
impl ClassifierPort for ChatClassifier {
  async fn is_question(&self, text: &str) -> Result<bool, PortError> {
    if text.trim().is_empty() {
      return Err(PortError::invalid_input("cannot classify an empty prompt"));
    }

    let messages = [
      ChatMessage::system(
        "Decide whether the user's text is a question. Reply with exactly one word: yes or no.",
      ),
      ChatMessage::user(text),
    ];
    let reply = self.client.complete(&self.model, &messages).await?;
    debug!(reply = %reply, "classifier_reply");

    parse_verdict(&reply)
  }
}

fn parse_verdict(reply: &str) -> Result<bool, PortError> {
  let word = reply
    .split_whitespace()
    .next()
    .map(|w| w.trim_matches(|c: char| !c.is_alphabetic()).to_lowercase())
    .unwrap_or_default();

  match word.as_str() {
    "yes" | "true" => Ok(true),
    "no" | "false" => Ok(false),
    _ => Err(PortError::invalid_response(format!(
      "expected yes or no, got '{}'",
      reply
    ))),
  }
}
