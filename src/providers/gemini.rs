//! Google Gemini `generateContent` adapter.
//! Short question batches are padded by repeating the last valid item.

use reqwest::header::CONTENT_TYPE;
use reqwest::RequestBuilder;
use serde_json::{json, Value};
use tracing::info;

use super::{ChatBackend, ChatPrompt};
use crate::config::ProviderConfig;
use crate::error::ProviderError;
use crate::normalize::Reconcile;

pub const DEFAULT_MODEL: &str = "gemini-1.5-flash";
pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

#[derive(Clone)]
pub struct GeminiAdapter {
  api_key: String,
  model: String,
  base_url: String,
}

impl GeminiAdapter {
  pub fn new(cfg: ProviderConfig) -> Self {
    Self {
      api_key: cfg.api_key,
      model: cfg.model,
      base_url: cfg.base_url.unwrap_or_else(|| DEFAULT_BASE_URL.into()),
    }
  }
}

impl ChatBackend for GeminiAdapter {
  fn tag(&self) -> &'static str {
    "gemini"
  }

  fn model(&self) -> &str {
    &self.model
  }

  fn reconcile(&self) -> Reconcile {
    Reconcile::PadWithLast
  }

  fn chat_request(&self, http: &reqwest::Client, prompt: &ChatPrompt<'_>) -> RequestBuilder {
    let mut generation = json!({
      "temperature": prompt.temperature,
      "maxOutputTokens": prompt.max_tokens,
    });
    if prompt.json {
      generation["responseMimeType"] = json!("application/json");
    }
    let body = json!({
      "systemInstruction": { "parts": [{ "text": prompt.system }] },
      "contents": [{ "role": "user", "parts": [{ "text": prompt.user }] }],
      "generationConfig": generation,
    });
    // Key goes in a header rather than `?key=` so it never shows up in logged URLs.
    http
      .post(format!("{}/models/{}:generateContent", self.base_url, self.model))
      .header("x-goog-api-key", &self.api_key)
      .header(CONTENT_TYPE, "application/json")
      .json(&body)
  }

  fn chat_text(&self, body: Value) -> Result<String, ProviderError> {
    if let Some(usage) = body.get("usageMetadata") {
      let count = |key: &str| usage.get(key).and_then(serde_json::Value::as_u64);
      let (prompt_tokens, completion_tokens, total_tokens) =
        (count("promptTokenCount"), count("candidatesTokenCount"), count("totalTokenCount"));
      info!(
        target: "millionaire_api",
        provider = "gemini",
        ?prompt_tokens,
        ?completion_tokens,
        ?total_tokens,
        "Gemini usage"
      );
    }
    let parts = body
      .pointer("/candidates/0/content/parts")
      .and_then(Value::as_array)
      .ok_or_else(|| ProviderError::Malformed {
        provider: "gemini",
        message: "candidates[0].content.parts missing".into(),
      })?;
    let text: String = parts.iter().filter_map(|p| p.get("text").and_then(Value::as_str)).collect();
    let text = text.trim().to_string();
    if text.is_empty() {
      return Err(ProviderError::EmptyResponse { provider: "gemini" });
    }
    Ok(text)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn adapter() -> GeminiAdapter {
    GeminiAdapter::new(ProviderConfig {
      api_key: "g-key".into(),
      model: "gemini-test".into(),
      base_url: None,
      api_version: None,
    })
  }

  #[test]
  fn request_shape() {
    let http = reqwest::Client::new();
    let prompt = ChatPrompt { system: "s", user: "u", temperature: 0.7, max_tokens: 64, json: true };
    let req = adapter().chat_request(&http, &prompt).build().unwrap();
    assert_eq!(
      req.url().as_str(),
      "https://generativelanguage.googleapis.com/v1beta/models/gemini-test:generateContent"
    );
    assert_eq!(req.headers()["x-goog-api-key"], "g-key");
    assert!(req.url().query().is_none());
  }

  #[test]
  fn extracts_candidate_text() {
    let body = json!({
      "candidates": [{ "content": { "parts": [{ "text": "{\"questions\"" }, { "text": ": []}" }] } }],
      "usageMetadata": { "promptTokenCount": 9, "candidatesTokenCount": 3, "totalTokenCount": 12 }
    });
    assert_eq!(adapter().chat_text(body).unwrap(), "{\"questions\": []}");
  }

  #[test]
  fn missing_candidates_is_malformed() {
    assert!(matches!(adapter().chat_text(json!({ "candidates": [] })), Err(ProviderError::Malformed { .. })));
  }

  #[test]
  fn pads_short_batches() {
    assert_eq!(adapter().reconcile(), Reconcile::PadWithLast);
  }
}
