//! Shared HTTP plumbing for every adapter: send, status/error mapping, and the
//! transient-failure retry loop.

use std::future::Future;
use std::time::Duration;

use reqwest::RequestBuilder;
use serde::Deserialize;
use serde_json::Value;
use tracing::warn;

use crate::error::ProviderError;
use crate::util::trunc_for_log;

/// Exponential backoff on transient failures; `max_attempts` counts the first try.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
  pub max_attempts: u32,
  pub initial_delay: Duration,
}

impl Default for RetryPolicy {
  fn default() -> Self {
    Self { max_attempts: 3, initial_delay: Duration::from_millis(800) }
  }
}

/// Run `op`, retrying while it fails transiently. Non-transient errors return at once.
pub async fn with_retry<T, F, Fut>(policy: RetryPolicy, provider: &'static str, mut op: F) -> Result<T, ProviderError>
where
  F: FnMut() -> Fut,
  Fut: Future<Output = Result<T, ProviderError>>,
{
  let mut delay = policy.initial_delay;
  let mut attempt = 0u32;
  loop {
    attempt += 1;
    match op().await {
      Ok(v) => return Ok(v),
      Err(e) if e.is_transient() => {
        if attempt >= policy.max_attempts {
          return Err(ProviderError::RetriesExhausted { provider, attempts: attempt, last: Box::new(e) });
        }
        warn!(target: "millionaire_api", provider, attempt, delay_ms = delay.as_millis() as u64, error = %e, "Transient provider failure; backing off");
        tokio::time::sleep(delay).await;
        delay *= 2;
      }
      Err(e) => return Err(e),
    }
  }
}

/// Send and require a 2xx status.
pub async fn send(provider: &'static str, req: RequestBuilder) -> Result<reqwest::Response, ProviderError> {
  let res = req.send().await.map_err(|e| classify(provider, e))?;
  let status = res.status();
  if status.is_success() {
    return Ok(res);
  }
  let body = res.text().await.unwrap_or_default();
  let message = extract_error_message(&body).unwrap_or_else(|| trunc_for_log(&body, 300));
  Err(ProviderError::Http { provider, status: status.as_u16(), message })
}

/// Send and decode a JSON body.
pub async fn send_json(provider: &'static str, req: RequestBuilder) -> Result<Value, ProviderError> {
  let res = send(provider, req).await?;
  res.json::<Value>().await.map_err(|e| {
    if e.is_timeout() {
      ProviderError::Timeout { provider }
    } else {
      ProviderError::Malformed { provider, message: e.without_url().to_string() }
    }
  })
}

fn classify(provider: &'static str, e: reqwest::Error) -> ProviderError {
  if e.is_timeout() {
    ProviderError::Timeout { provider }
  } else {
    // URLs may carry credentials (query keys); keep them out of messages.
    ProviderError::Network { provider, message: e.without_url().to_string() }
  }
}

/// Vendors wrap errors as `{"error": {"message": ...}}` or `{"error": "..."}`.
fn extract_error_message(body: &str) -> Option<String> {
  #[derive(Deserialize)]
  struct EWrap {
    error: EBody,
  }
  #[derive(Deserialize)]
  #[serde(untagged)]
  enum EBody {
    Obj { message: String },
    Text(String),
  }
  match serde_json::from_str::<EWrap>(body).ok()?.error {
    EBody::Obj { message } | EBody::Text(message) => Some(message),
  }
}
