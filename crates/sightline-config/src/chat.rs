use serde::{Deserialize, Serialize};

/// OpenAI-compatible chat endpoint used by the describer and transform stages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatConfig {
  /// API root; `/chat/completions` is appended.
  pub base_url: String,

  #[serde(skip_serializing_if = "Option::is_none")]
  pub api_key: Option<String>,

  /// Vision-language model answering questions about the image.
  pub describer_model: String,

  /// Text model running the extraction and filtering templates.
  pub transform_model: String,

  pub max_tokens: u32,
  pub temperature: f32,
  pub request_timeout_ms: u64,
}

impl Default for ChatConfig {
  fn default() -> Self {
    Self {
      base_url: "http://localhost:8000/v1".to_string(),
      api_key: None,
      describer_model: "llava-hf/llava-onevision-qwen2-0.5b-ov-hf".to_string(),
      transform_model: "llama3.2".to_string(),
      max_tokens: 200,
      temperature: 0.0,
      request_timeout_ms: 120_000,
    }
  }
}
