//! OpenAI chat.completions adapter, public and Azure-hosted.
//!
//! The two share request/response bodies and differ in URL layout and auth:
//!   public: `{base}/chat/completions`, `Authorization: Bearer <key>`
//!   azure:  `{base}/openai/deployments/{model}/chat/completions?api-version=V`, `api-key: <key>`
//! Azure mode is selected by the presence of an API version.
//!
//! NOTE: We never log the API key; usage is logged as token counts only.

use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use reqwest::RequestBuilder;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;

use super::{ChatBackend, ChatPrompt};
use crate::config::ProviderConfig;
use crate::domain::SpeechRequest;
use crate::error::ProviderError;

pub const DEFAULT_MODEL: &str = "gpt-4o-mini";
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

#[derive(Clone)]
pub struct OpenAiAdapter {
  api_key: String,
  model: String,
  base_url: String,
  api_version: Option<String>,
}

impl OpenAiAdapter {
  pub fn new(cfg: ProviderConfig) -> Self {
    Self {
      api_key: cfg.api_key,
      model: cfg.model,
      base_url: cfg.base_url.unwrap_or_else(|| DEFAULT_BASE_URL.into()),
      api_version: cfg.api_version,
    }
  }

  pub fn is_azure(&self) -> bool {
    self.api_version.is_some()
  }

  /// `path` is relative to the deployment (azure) or the API root (public).
  fn post(&self, http: &reqwest::Client, deployment: &str, path: &str) -> RequestBuilder {
    match &self.api_version {
      Some(version) => http
        .post(format!("{}/openai/deployments/{}/{}", self.base_url, deployment, path))
        .query(&[("api-version", version.as_str())])
        .header("api-key", &self.api_key),
      None => http
        .post(format!("{}/{}", self.base_url, path))
        .header(AUTHORIZATION, format!("Bearer {}", self.api_key)),
    }
  }
}

impl ChatBackend for OpenAiAdapter {
  fn tag(&self) -> &'static str {
    if self.is_azure() { "azure" } else { "openai" }
  }

  fn model(&self) -> &str {
    &self.model
  }

  fn supports_speech(&self) -> bool {
    true
  }

  fn chat_request(&self, http: &reqwest::Client, prompt: &ChatPrompt<'_>) -> RequestBuilder {
    let req = ChatCompletionRequest {
      model: self.model.clone(),
      messages: vec![
        ChatMessageReq { role: "system".into(), content: prompt.system.into() },
        ChatMessageReq { role: "user".into(), content: prompt.user.into() },
      ],
      temperature: prompt.temperature,
      response_format: prompt.json.then(|| ResponseFormat { r#type: "json_object".into() }),
      max_tokens: Some(prompt.max_tokens),
    };
    self
      .post(http, &self.model, "chat/completions")
      .header(CONTENT_TYPE, "application/json")
      .json(&req)
  }

  fn chat_text(&self, body: Value) -> Result<String, ProviderError> {
    let body: ChatCompletionResponse = serde_json::from_value(body)
      .map_err(|e| ProviderError::Malformed { provider: self.tag(), message: e.to_string() })?;
    if let Some(usage) = &body.usage {
      info!(target: "millionaire_api", provider = self.tag(), prompt_tokens = ?usage.prompt_tokens, completion_tokens = ?usage.completion_tokens, total_tokens = ?usage.total_tokens, "OpenAI usage");
    }
    let text = body
      .choices
      .into_iter()
      .next()
      .and_then(|c| c.message.content)
      .unwrap_or_default()
      .trim()
      .to_string();
    if text.is_empty() {
      return Err(ProviderError::EmptyResponse { provider: self.tag() });
    }
    Ok(text)
  }

  fn speech_request(&self, http: &reqwest::Client, speech: &SpeechRequest) -> Result<RequestBuilder, ProviderError> {
    let req = SpeechRequestBody {
      model: &speech.model,
      input: &speech.input,
      voice: &speech.voice,
      response_format: speech.format.vendor_name(),
    };
    Ok(
      self
        .post(http, &speech.model, "audio/speech")
        .header(CONTENT_TYPE, "application/json")
        .json(&req),
    )
  }
}

// --- Chat DTOs ---

#[derive(Serialize)]
struct ChatCompletionRequest {
  model: String,
  messages: Vec<ChatMessageReq>,
  temperature: f32,
  #[serde(skip_serializing_if = "Option::is_none")]
  response_format: Option<ResponseFormat>,
  #[serde(skip_serializing_if = "Option::is_none")]
  max_tokens: Option<u32>,
}
#[derive(Serialize)]
struct ChatMessageReq { role: String, content: String }
#[derive(Serialize)]
struct ResponseFormat { #[serde(rename = "type")] r#type: String }

#[derive(Deserialize)]
struct ChatCompletionResponse {
  choices: Vec<ChatChoice>,
  #[serde(default)] usage: Option<Usage>,
}
#[derive(Deserialize)]
struct ChatChoice { message: ChatMessageResp }
#[derive(Deserialize)]
struct ChatMessageResp { content: Option<String> }
#[derive(Deserialize)]
struct Usage {
  #[serde(default)] prompt_tokens: Option<u32>,
  #[serde(default)] completion_tokens: Option<u32>,
  #[serde(default)] total_tokens: Option<u32>,
}

#[derive(Serialize)]
struct SpeechRequestBody<'a> {
  model: &'a str,
  input: &'a str,
  voice: &'a str,
  response_format: &'a str,
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  fn adapter(api_version: Option<&str>) -> OpenAiAdapter {
    OpenAiAdapter::new(ProviderConfig {
      api_key: "k".into(),
      model: "gpt-test".into(),
      base_url: Some("https://example.test".into()),
      api_version: api_version.map(String::from),
    })
  }

  #[test]
  fn tags_by_auth_mode() {
    assert_eq!(adapter(None).tag(), "openai");
    assert_eq!(adapter(Some("2024-06-01")).tag(), "azure");
  }

  #[test]
  fn public_request_shape() {
    let http = reqwest::Client::new();
    let prompt = ChatPrompt { system: "s", user: "u", temperature: 0.5, max_tokens: 100, json: true };
    let req = adapter(None).chat_request(&http, &prompt).build().unwrap();
    assert_eq!(req.url().as_str(), "https://example.test/chat/completions");
    assert_eq!(req.headers()[AUTHORIZATION], "Bearer k");
  }

  #[test]
  fn azure_request_shape() {
    let http = reqwest::Client::new();
    let prompt = ChatPrompt { system: "s", user: "u", temperature: 0.5, max_tokens: 100, json: false };
    let req = adapter(Some("2024-06-01")).chat_request(&http, &prompt).build().unwrap();
    assert_eq!(
      req.url().as_str(),
      "https://example.test/openai/deployments/gpt-test/chat/completions?api-version=2024-06-01"
    );
    assert_eq!(req.headers()["api-key"], "k");
    assert!(req.headers().get(AUTHORIZATION).is_none());
  }

  #[test]
  fn extracts_first_choice() {
    let body = json!({ "choices": [{ "message": { "content": " {\"questions\": []} " } }], "usage": { "total_tokens": 9 } });
    assert_eq!(adapter(None).chat_text(body).unwrap(), "{\"questions\": []}");
  }

  #[test]
  fn empty_choices_are_an_error() {
    let body = json!({ "choices": [] });
    assert!(matches!(adapter(None).chat_text(body), Err(ProviderError::EmptyResponse { .. })));
    assert!(matches!(adapter(None).chat_text(json!({ "nope": 1 })), Err(ProviderError::Malformed { .. })));
  }
}
