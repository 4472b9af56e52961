//! Provider layer: one uniform client over several vendor APIs.
//!
//! - `ChatBackend` is the vendor contract (endpoint, auth, body shape, text extraction).
//! - `Provider` is the closed set of adapters, dispatched by variant.
//! - `LlmClient` owns the HTTP client and retry policy and turns raw vendor text
//!   into domain values through `crate::normalize`.
//! - `make_provider` is the factory: provider name + layered settings → client.

pub mod anthropic;
pub mod gemini;
pub mod openai;
pub mod transport;

use std::time::{Duration, Instant};

use reqwest::RequestBuilder;
use serde_json::Value;
use tracing::{error, info, instrument};

use crate::config::{resolve_provider_config, EnvLookup, LlmOverrides, ProviderConfig, Prompts};
use crate::domain::{Difficulty, ExplainRequest, Question, SpeechRequest};
use crate::error::{ConfigError, ProviderError};
use crate::normalize::{normalize_explanation, normalize_questions, BatchContext, Reconcile};
use crate::util::fill_template;

use self::anthropic::AnthropicAdapter;
use self::gemini::GeminiAdapter;
use self::openai::OpenAiAdapter;
use self::transport::{send, send_json, with_retry, RetryPolicy};

/// One chat-style call: a system instruction plus one user message.
pub struct ChatPrompt<'a> {
  pub system: &'a str,
  pub user: &'a str,
  pub temperature: f32,
  pub max_tokens: u32,
  /// Ask the vendor for JSON mode where it has one.
  pub json: bool,
}

fn unsupported_speech(tag: &str) -> ProviderError {
  ProviderError::Unsupported(format!("speech synthesis is not supported by the '{}' provider", tag))
}

/// What each vendor adapter must provide.
pub trait ChatBackend: Send + Sync {
  /// Short provider name used in logs, errors, and generated ids.
  fn tag(&self) -> &'static str;
  fn model(&self) -> &str;
  fn chat_request(&self, http: &reqwest::Client, prompt: &ChatPrompt<'_>) -> RequestBuilder;
  /// Pull the generated text out of a decoded response body.
  fn chat_text(&self, body: Value) -> Result<String, ProviderError>;

  fn reconcile(&self) -> Reconcile {
    Reconcile::Truncate
  }

  fn supports_speech(&self) -> bool {
    false
  }

  fn speech_request(&self, _http: &reqwest::Client, _speech: &SpeechRequest) -> Result<RequestBuilder, ProviderError> {
    Err(unsupported_speech(self.tag()))
  }
}

/// Provider names accepted in `LLM_PROVIDER`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProviderKind {
  Gemini,
  OpenAi,
  AzureOpenAi,
  Anthropic,
}

impl ProviderKind {
  /// `""`/`"none"` → `Ok(None)`; unknown names are a configuration error.
  pub fn parse(name: &str) -> Result<Option<Self>, ConfigError> {
    match name.trim().to_ascii_lowercase().as_str() {
      "" | "none" => Ok(None),
      "gemini" | "google" => Ok(Some(ProviderKind::Gemini)),
      "openai" | "gpt" | "oai" => Ok(Some(ProviderKind::OpenAi)),
      "azure" | "azure-openai" | "azureopenai" => Ok(Some(ProviderKind::AzureOpenAi)),
      "anthropic" | "claude" => Ok(Some(ProviderKind::Anthropic)),
      other => Err(ConfigError::UnknownProvider(other.to_string())),
    }
  }

  pub fn default_model(&self) -> &'static str {
    match self {
      ProviderKind::Gemini => gemini::DEFAULT_MODEL,
      ProviderKind::OpenAi | ProviderKind::AzureOpenAi => openai::DEFAULT_MODEL,
      ProviderKind::Anthropic => anthropic::DEFAULT_MODEL,
    }
  }

  fn label(&self) -> &'static str {
    match self {
      ProviderKind::Gemini => "gemini",
      ProviderKind::OpenAi => "openai",
      ProviderKind::AzureOpenAi => "azure",
      ProviderKind::Anthropic => "anthropic",
    }
  }
}

pub enum Provider {
  Gemini(GeminiAdapter),
  OpenAi(OpenAiAdapter),
  Anthropic(AnthropicAdapter),
}

impl Provider {
  pub fn backend(&self) -> &dyn ChatBackend {
    match self {
      Provider::Gemini(a) => a,
      Provider::OpenAi(a) => a,
      Provider::Anthropic(a) => a,
    }
  }
}

/// Build the configured provider. `Ok(None)` means "no provider selected".
pub fn make_provider(
  name: &str,
  overrides: &LlmOverrides,
  env: EnvLookup<'_>,
  timeout: Duration,
) -> Result<Option<LlmClient>, ConfigError> {
  let Some(kind) = ProviderKind::parse(name)? else { return Ok(None) };
  let cfg = resolve_provider_config(kind.default_model(), overrides, env);
  if cfg.api_key.is_empty() {
    return Err(ConfigError::Missing { provider: kind.label(), setting: "API key", var: "LLM_API_KEY" });
  }

  let provider = match kind {
    ProviderKind::Gemini => Provider::Gemini(GeminiAdapter::new(cfg)),
    ProviderKind::Anthropic => Provider::Anthropic(AnthropicAdapter::new(cfg)),
    ProviderKind::OpenAi | ProviderKind::AzureOpenAi => {
      if kind == ProviderKind::AzureOpenAi || cfg.api_version.is_some() {
        check_azure(&cfg)?;
      }
      Provider::OpenAi(OpenAiAdapter::new(cfg))
    }
  };

  let http = reqwest::Client::builder()
    .timeout(timeout)
    .user_agent(concat!("millionaire-api/", env!("CARGO_PKG_VERSION")))
    .build()
    .map_err(|e| ConfigError::Client(e.to_string()))?;

  Ok(Some(LlmClient { http, provider, retry: RetryPolicy::default() }))
}

/// Enterprise-hosted endpoints need both a versioned API and a non-public base URL.
fn check_azure(cfg: &ProviderConfig) -> Result<(), ConfigError> {
  let Some(base) = cfg.base_url.as_deref() else {
    return Err(ConfigError::Missing { provider: "azure", setting: "endpoint", var: "LLM_BASE_URL" });
  };
  if cfg.api_version.is_none() {
    return Err(ConfigError::Missing { provider: "azure", setting: "API version", var: "LLM_API_VERSION" });
  }
  if base.to_ascii_lowercase().contains("api.openai.com") {
    return Err(ConfigError::InvalidEndpoint {
      provider: "azure",
      message: "endpoint is api.openai.com; expected an Azure endpoint like https://<resource>.openai.azure.com".into(),
    });
  }
  Ok(())
}

/// A configured provider plus the HTTP client and retry policy used to call it.
pub struct LlmClient {
  http: reqwest::Client,
  provider: Provider,
  retry: RetryPolicy,
}

impl LlmClient {
  #[cfg(test)]
  pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
    self.retry = retry;
    self
  }

  pub fn name(&self) -> &'static str {
    self.provider.backend().tag()
  }

  pub fn model(&self) -> &str {
    self.provider.backend().model()
  }

  /// One chat call with the transient-failure retry policy applied.
  async fn chat(&self, prompt: &ChatPrompt<'_>) -> Result<String, ProviderError> {
    let backend = self.provider.backend();
    let http = &self.http;
    let tag = backend.tag();
    let start = Instant::now();
    let result = with_retry(self.retry, tag, move || async move {
      let body = send_json(tag, backend.chat_request(http, prompt)).await?;
      backend.chat_text(body)
    })
    .await;
    let elapsed = start.elapsed();
    match &result {
      Ok(text) => info!(target: "millionaire_api", provider = tag, ?elapsed, response_len = text.len(), "Model response received"),
      Err(e) => error!(target: "millionaire_api", provider = tag, ?elapsed, error = %e, "Model call failed"),
    }
    result
  }

  /// Generate one question per planned difficulty, drawing categories from `categories`.
  #[instrument(level = "info", skip_all, fields(provider = self.name(), model = %self.model(), count = difficulties.len()))]
  pub async fn generate_questions(
    &self,
    prompts: &Prompts,
    categories: &[String],
    difficulties: &[Difficulty],
  ) -> Result<Vec<Question>, ProviderError> {
    let count = difficulties.len().to_string();
    let cats = if categories.is_empty() { "General Knowledge".to_string() } else { categories.join(", ") };
    let diffs = difficulties.iter().map(|d| d.as_str()).collect::<Vec<_>>().join(", ");
    let user = fill_template(
      &prompts.questions_user_template,
      &[("count", &count), ("categories", &cats), ("difficulties", &diffs)],
    );
    let prompt = ChatPrompt {
      system: &prompts.questions_system,
      user: &user,
      temperature: 0.7,
      max_tokens: question_token_budget(difficulties.len()),
      json: true,
    };

    let raw = self.chat(&prompt).await?;
    let backend = self.provider.backend();
    let ctx = BatchContext { provider: backend.tag(), categories, difficulties };
    let questions = normalize_questions(&raw, &ctx, backend.reconcile())?;
    info!(target: "millionaire_api", provider = backend.tag(), requested = difficulties.len(), returned = questions.len(), "Questions normalized");
    Ok(questions)
  }

  #[instrument(level = "info", skip_all, fields(provider = self.name(), choices = req.choices.len()))]
  pub async fn explain(&self, prompts: &Prompts, req: &ExplainRequest) -> Result<String, ProviderError> {
    let user = explain_user_message(prompts, req);
    let prompt = ChatPrompt {
      system: &prompts.explain_system,
      user: &user,
      temperature: 0.3,
      max_tokens: 400,
      json: false,
    };
    let raw = self.chat(&prompt).await?;
    normalize_explanation(&raw, self.name())
  }

  /// Start a speech synthesis call; the caller decides whether to buffer or stream the body.
  #[instrument(level = "info", skip_all, fields(provider = self.name(), model = %speech.model, voice = %speech.voice, input_len = speech.input.len()))]
  pub async fn synthesize(&self, speech: &SpeechRequest) -> Result<reqwest::Response, ProviderError> {
    let backend = self.provider.backend();
    let tag = backend.tag();
    if !backend.supports_speech() {
      return Err(unsupported_speech(tag));
    }
    let http = &self.http;
    with_retry(self.retry, tag, move || async move {
      send(tag, backend.speech_request(http, speech)?).await
    })
    .await
  }
}

fn question_token_budget(count: usize) -> u32 {
  let per_question = 160u32;
  (256 + per_question.saturating_mul(count as u32)).min(8192)
}

fn explain_user_message(prompts: &Prompts, req: &ExplainRequest) -> String {
  let choices = req
    .choices
    .iter()
    .enumerate()
    .map(|(i, c)| format!("{}. {}", i + 1, c))
    .collect::<Vec<_>>()
    .join("\n");
  let correct = &req.choices[req.correct_index];
  let picked = req
    .user_index
    .and_then(|i| req.choices.get(i))
    .map(String::as_str)
    .unwrap_or("(no answer)");
  let mistake_note = match req.user_index {
    Some(i) if i != req.correct_index => " and why the player's pick is wrong",
    _ => "",
  };
  fill_template(
    &prompts.explain_user_template,
    &[
      ("prompt", &req.prompt),
      ("choices", &choices),
      ("correct", correct),
      ("picked", picked),
      ("style", req.style.as_deref().unwrap_or("concise")),
      ("mistake_note", mistake_note),
    ],
  )
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::domain::{difficulty_plan, AudioFormat};
  use std::collections::HashMap;

  fn env_of(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let map: HashMap<String, String> = pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
    move |k| map.get(k).cloned()
  }

  fn build(name: &str, pairs: &[(&str, &str)]) -> Result<Option<LlmClient>, ConfigError> {
    make_provider(name, &LlmOverrides::default(), &env_of(pairs), Duration::from_secs(5))
  }

  fn fast() -> RetryPolicy {
    RetryPolicy { max_attempts: 3, initial_delay: Duration::from_millis(1) }
  }

  fn client_for(name: &str, server: &mockito::Server, extra: &[(&str, &str)]) -> LlmClient {
    let url = server.url();
    let mut pairs = vec![("LLM_API_KEY", "test-key"), ("LLM_BASE_URL", url.as_str())];
    pairs.extend_from_slice(extra);
    build(name, &pairs).unwrap().unwrap().with_retry_policy(fast())
  }

  fn questions_json(n: usize) -> String {
    let items: Vec<Value> = (0..n)
      .map(|i| {
        serde_json::json!({
          "id": format!("q{}", i + 1),
          "category": "Science",
          "difficulty": "easy",
          "prompt": format!("Question {}?", i + 1),
          "choices": ["a", "b", "c", "d"],
          "correctIndex": i % 4
        })
      })
      .collect();
    serde_json::json!({ "questions": items }).to_string()
  }

  fn openai_body(content: &str) -> String {
    serde_json::json!({ "choices": [{ "message": { "content": content } }] }).to_string()
  }

  fn pool() -> Vec<String> {
    vec!["Science".to_string()]
  }

  #[test]
  fn none_and_empty_mean_absent() {
    assert!(build("", &[]).unwrap().is_none());
    assert!(build("none", &[]).unwrap().is_none());
    assert!(build(" NONE ", &[]).unwrap().is_none());
  }

  #[test]
  fn unknown_name_is_config_error() {
    assert!(matches!(build("llama-farm", &[]), Err(ConfigError::UnknownProvider(_))));
  }

  #[test]
  fn missing_key_is_config_error() {
    assert!(matches!(build("gemini", &[]), Err(ConfigError::Missing { setting: "API key", .. })));
  }

  #[test]
  fn aliases_resolve() {
    let key = [("LLM_API_KEY", "k")];
    assert_eq!(build("google", &key).unwrap().unwrap().name(), "gemini");
    assert_eq!(build("gpt", &key).unwrap().unwrap().name(), "openai");
    assert_eq!(build("claude", &key).unwrap().unwrap().name(), "anthropic");
  }

  #[test]
  fn default_models() {
    let key = [("LLM_API_KEY", "k")];
    assert_eq!(build("gemini", &key).unwrap().unwrap().model(), "gemini-1.5-flash");
    assert_eq!(build("openai", &key).unwrap().unwrap().model(), "gpt-4o-mini");
    assert_eq!(build("anthropic", &key).unwrap().unwrap().model(), "claude-3-5-sonnet-latest");
  }

  #[test]
  fn api_version_switches_openai_to_azure() {
    let client = build(
      "openai",
      &[("LLM_API_KEY", "k"), ("LLM_BASE_URL", "https://res.openai.azure.com"), ("LLM_API_VERSION", "2024-06-01")],
    )
    .unwrap()
    .unwrap();
    assert_eq!(client.name(), "azure");
  }

  #[test]
  fn azure_requires_endpoint_and_version() {
    assert!(matches!(
      build("azure", &[("LLM_API_KEY", "k"), ("LLM_API_VERSION", "v")]),
      Err(ConfigError::Missing { setting: "endpoint", .. })
    ));
    assert!(matches!(
      build("azure", &[("LLM_API_KEY", "k"), ("LLM_BASE_URL", "https://res.openai.azure.com")]),
      Err(ConfigError::Missing { setting: "API version", .. })
    ));
    assert!(matches!(
      build("azure", &[("LLM_API_KEY", "k"), ("LLM_BASE_URL", "https://api.openai.com/v1"), ("LLM_API_VERSION", "v")]),
      Err(ConfigError::InvalidEndpoint { .. })
    ));
  }

  #[test]
  fn explicit_override_beats_env() {
    let overrides = LlmOverrides { api_key: Some("arg".into()), model: Some("arg-model".into()), ..Default::default() };
    let client = make_provider("openai", &overrides, &env_of(&[]), Duration::from_secs(5)).unwrap().unwrap();
    assert_eq!(client.model(), "arg-model");
  }

  #[test]
  fn explain_message_mentions_mistake() {
    let req = ExplainRequest {
      prompt: "2+2?".into(),
      choices: vec!["3".into(), "4".into()],
      correct_index: 1,
      user_index: Some(0),
      style: None,
    };
    let msg = explain_user_message(&Prompts::default(), &req);
    assert!(msg.contains("Correct answer: 4"));
    assert!(msg.contains("Player picked: 3"));
    assert!(msg.contains("why the player's pick is wrong"));
  }

  #[tokio::test]
  async fn openai_generates_questions() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
      .mock("POST", "/chat/completions")
      .match_header("authorization", "Bearer test-key")
      .with_status(200)
      .with_header("content-type", "application/json")
      .with_body(openai_body(&questions_json(3)))
      .create_async()
      .await;

    let client = client_for("openai", &server, &[]);
    let plan = difficulty_plan(3);
    let qs = client.generate_questions(&Prompts::default(), &pool(), &plan).await.unwrap();
    assert_eq!(qs.len(), 3);
    assert_eq!(qs[2].correct_index, 2);
    mock.assert_async().await;
  }

  #[tokio::test]
  async fn transient_failures_exhaust_retries() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
      .mock("POST", "/chat/completions")
      .with_status(503)
      .with_body(r#"{"error":{"message":"overloaded"}}"#)
      .expect(3)
      .create_async()
      .await;

    let client = client_for("openai", &server, &[]);
    let err = client.generate_questions(&Prompts::default(), &pool(), &difficulty_plan(2)).await.unwrap_err();
    assert!(matches!(err, ProviderError::RetriesExhausted { attempts: 3, .. }), "{err:?}");
    mock.assert_async().await;
  }

  #[tokio::test]
  async fn client_errors_are_not_retried() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
      .mock("POST", "/chat/completions")
      .with_status(401)
      .with_body(r#"{"error":{"message":"invalid api key"}}"#)
      .expect(1)
      .create_async()
      .await;

    let client = client_for("openai", &server, &[]);
    let err = client.generate_questions(&Prompts::default(), &pool(), &difficulty_plan(2)).await.unwrap_err();
    match err {
      ProviderError::Http { status, message, .. } => {
        assert_eq!(status, 401);
        assert_eq!(message, "invalid api key");
      }
      other => panic!("unexpected: {other:?}"),
    }
    mock.assert_async().await;
  }

  #[tokio::test]
  async fn openai_short_batch_is_left_short() {
    let mut server = mockito::Server::new_async().await;
    server
      .mock("POST", "/chat/completions")
      .with_status(200)
      .with_body(openai_body(&questions_json(2)))
      .create_async()
      .await;

    let client = client_for("openai", &server, &[]);
    let qs = client.generate_questions(&Prompts::default(), &pool(), &difficulty_plan(5)).await.unwrap();
    assert_eq!(qs.len(), 2);
  }

  #[tokio::test]
  async fn gemini_pads_short_batch() {
    let mut server = mockito::Server::new_async().await;
    let body = serde_json::json!({
      "candidates": [{ "content": { "parts": [{ "text": format!("```json\n{}\n```", questions_json(2)) }] } }]
    });
    server
      .mock("POST", "/models/gemini-1.5-flash:generateContent")
      .match_header("x-goog-api-key", "test-key")
      .with_status(200)
      .with_body(body.to_string())
      .create_async()
      .await;

    let client = client_for("gemini", &server, &[]);
    let plan = difficulty_plan(7);
    let qs = client.generate_questions(&Prompts::default(), &pool(), &plan).await.unwrap();
    assert_eq!(qs.len(), 7);
    assert_eq!(qs[6].id, "q2-dup7");
    assert_eq!(qs[6].difficulty, Difficulty::Medium);
  }

  #[tokio::test]
  async fn anthropic_explains() {
    let mut server = mockito::Server::new_async().await;
    server
      .mock("POST", "/messages")
      .match_header("x-api-key", "test-key")
      .with_status(200)
      .with_body(r#"{"content":[{"type":"text","text":"Four is two plus two."}]}"#)
      .create_async()
      .await;

    let client = client_for("anthropic", &server, &[]);
    let req = ExplainRequest {
      prompt: "2+2?".into(),
      choices: vec!["3".into(), "4".into()],
      correct_index: 1,
      user_index: None,
      style: Some("playful".into()),
    };
    assert_eq!(client.explain(&Prompts::default(), &req).await.unwrap(), "Four is two plus two.");
  }

  #[tokio::test]
  async fn azure_speech_uses_deployment_path() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
      .mock("POST", "/openai/deployments/tts-1/audio/speech")
      .match_query(mockito::Matcher::UrlEncoded("api-version".into(), "2024-06-01".into()))
      .match_header("api-key", "test-key")
      .with_status(200)
      .with_header("content-type", "audio/mpeg")
      .with_body([0x49u8, 0x44, 0x33])
      .create_async()
      .await;

    let client = client_for("azure", &server, &[("LLM_API_VERSION", "2024-06-01")]);
    let speech = SpeechRequest { input: "hi".into(), voice: "alloy".into(), model: "tts-1".into(), format: AudioFormat::Mp3 };
    let res = client.synthesize(&speech).await.unwrap();
    assert_eq!(res.bytes().await.unwrap().as_ref(), &[0x49u8, 0x44, 0x33]);
    mock.assert_async().await;
  }

  #[tokio::test]
  async fn gemini_speech_is_unsupported() {
    let client = build("gemini", &[("LLM_API_KEY", "k")]).unwrap().unwrap();
    assert!(!client.provider.backend().supports_speech());
    assert!(build("openai", &[("LLM_API_KEY", "k")]).unwrap().unwrap().provider.backend().supports_speech());
    let speech = SpeechRequest { input: "hi".into(), voice: "alloy".into(), model: "tts".into(), format: AudioFormat::Wav };
    assert!(matches!(client.synthesize(&speech).await, Err(ProviderError::Unsupported(_))));
  }
}
