//! Anthropic Messages API adapter. Text generation only; no speech.

use reqwest::header::CONTENT_TYPE;
use reqwest::RequestBuilder;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;

use super::{ChatBackend, ChatPrompt};
use crate::config::ProviderConfig;
use crate::error::ProviderError;

pub const DEFAULT_MODEL: &str = "claude-3-5-sonnet-latest";
pub const DEFAULT_BASE_URL: &str = "https://api.anthropic.com/v1";
const API_VERSION: &str = "2023-06-01";

#[derive(Clone)]
pub struct AnthropicAdapter {
  api_key: String,
  model: String,
  base_url: String,
}

impl AnthropicAdapter {
  pub fn new(cfg: ProviderConfig) -> Self {
    Self {
      api_key: cfg.api_key,
      model: cfg.model,
      base_url: cfg.base_url.unwrap_or_else(|| DEFAULT_BASE_URL.into()),
    }
  }
}

#[derive(Serialize)]
struct MessagesRequest<'a> {
  model: &'a str,
  max_tokens: u32,
  temperature: f32,
  system: &'a str,
  messages: Vec<Message<'a>>,
}

#[derive(Serialize)]
struct Message<'a> {
  role: &'a str,
  content: &'a str,
}

#[derive(Deserialize)]
struct MessagesResponse {
  #[serde(default)]
  content: Vec<ContentBlock>,
  #[serde(default)]
  stop_reason: Option<String>,
  #[serde(default)]
  usage: Option<Usage>,
}

#[derive(Deserialize)]
struct ContentBlock {
  #[serde(rename = "type", default)]
  kind: String,
  #[serde(default)]
  text: Option<String>,
}

#[derive(Deserialize)]
struct Usage {
  #[serde(default)] input_tokens: Option<u32>,
  #[serde(default)] output_tokens: Option<u32>,
}

impl ChatBackend for AnthropicAdapter {
  fn tag(&self) -> &'static str {
    "anthropic"
  }

  fn model(&self) -> &str {
    &self.model
  }

  fn chat_request(&self, http: &reqwest::Client, prompt: &ChatPrompt<'_>) -> RequestBuilder {
    // No JSON mode on this API; the prompt itself demands JSON.
    let req = MessagesRequest {
      model: &self.model,
      max_tokens: prompt.max_tokens,
      temperature: prompt.temperature,
      system: prompt.system,
      messages: vec![Message { role: "user", content: prompt.user }],
    };
    http
      .post(format!("{}/messages", self.base_url))
      .header("x-api-key", &self.api_key)
      .header("anthropic-version", API_VERSION)
      .header(CONTENT_TYPE, "application/json")
      .json(&req)
  }

  fn chat_text(&self, body: Value) -> Result<String, ProviderError> {
    let body: MessagesResponse = serde_json::from_value(body)
      .map_err(|e| ProviderError::Malformed { provider: "anthropic", message: e.to_string() })?;
    if let Some(usage) = &body.usage {
      info!(target: "millionaire_api", provider = "anthropic", input_tokens = ?usage.input_tokens, output_tokens = ?usage.output_tokens, stop_reason = ?body.stop_reason, "Anthropic usage");
    }
    let text: String = body
      .content
      .into_iter()
      .filter(|b| b.kind.is_empty() || b.kind == "text")
      .filter_map(|b| b.text)
      .collect();
    let text = text.trim().to_string();
    if text.is_empty() {
      return Err(ProviderError::EmptyResponse { provider: "anthropic" });
    }
    Ok(text)
  }
}
