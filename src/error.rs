//! Error taxonomy.
//!
//! - `ConfigError`: raised while building the provider at startup. Logged, never fatal
//!   to the process; the service then runs unconfigured.
//! - `ProviderError`: raised by an adapter call. Transient variants are retried by
//!   the transport before being surfaced.
//! - `ApiError`: what handlers return. Renders `{"error": {"code", "message"}}`.

use axum::{
  http::StatusCode,
  response::{IntoResponse, Response},
  Json,
};
use serde_json::json;
use thiserror::Error;
use tracing::error;

#[derive(Debug, Error)]
pub enum ConfigError {
  #[error("unknown LLM provider: {0}")]
  UnknownProvider(String),
  #[error("{provider}: missing {setting} (set {var})")]
  Missing {
    provider: &'static str,
    setting: &'static str,
    var: &'static str,
  },
  #[error("{provider}: {message}")]
  InvalidEndpoint {
    provider: &'static str,
    message: String,
  },
  #[error("invalid value for {key}: {value:?}")]
  InvalidValue { key: &'static str, value: String },
  #[error("failed to build HTTP client: {0}")]
  Client(String),
}

#[derive(Debug, Error)]
pub enum ProviderError {
  #[error("{provider} HTTP {status}: {message}")]
  Http {
    provider: &'static str,
    status: u16,
    message: String,
  },
  #[error("{provider} request timed out")]
  Timeout { provider: &'static str },
  #[error("{provider} request failed: {message}")]
  Network {
    provider: &'static str,
    message: String,
  },
  #[error("{provider} returned a malformed response: {message}")]
  Malformed {
    provider: &'static str,
    message: String,
  },
  #[error("{provider} returned an empty response")]
  EmptyResponse { provider: &'static str },
  #[error("{provider} returned no valid questions")]
  NoValidQuestions { provider: &'static str },
  #[error("{provider} error after {attempts} attempts: {last}")]
  RetriesExhausted {
    provider: &'static str,
    attempts: u32,
    last: Box<ProviderError>,
  },
  #[error("{0}")]
  Unsupported(String),
}

impl ProviderError {
  /// 429/500/502/503/504 and timeouts are worth another attempt.
  pub fn is_transient(&self) -> bool {
    match self {
      ProviderError::Http { status, .. } => matches!(status, 429 | 500 | 502 | 503 | 504),
      ProviderError::Timeout { .. } => true,
      _ => false,
    }
  }
}

#[derive(Debug, Error)]
pub enum ApiError {
  #[error("{message}")]
  BadRequest { code: &'static str, message: String },
  #[error("LLM provider is not configured")]
  NotConfigured,
  #[error(transparent)]
  Provider(#[from] ProviderError),
  #[error("{0}")]
  Internal(String),
}

impl ApiError {
  pub fn bad_request(code: &'static str, message: impl Into<String>) -> Self {
    ApiError::BadRequest { code, message: message.into() }
  }

  fn status_and_code(&self) -> (StatusCode, &'static str) {
    match self {
      ApiError::BadRequest { code, .. } => (StatusCode::BAD_REQUEST, code),
      ApiError::NotConfigured => (StatusCode::SERVICE_UNAVAILABLE, "LLM_NOT_CONFIGURED"),
      ApiError::Provider(ProviderError::Unsupported(_)) => (StatusCode::NOT_IMPLEMENTED, "UNSUPPORTED"),
      ApiError::Provider(_) => (StatusCode::BAD_GATEWAY, "PROVIDER_ERROR"),
      ApiError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL"),
    }
  }
}

impl IntoResponse for ApiError {
  fn into_response(self) -> Response {
    let (status, code) = self.status_and_code();
    // Internal details stay in the logs.
    let message = match &self {
      ApiError::Internal(detail) => {
        error!(target: "millionaire_api", %detail, "internal error");
        "Internal server error".to_string()
      }
      other => other.to_string(),
    };
    (status, Json(json!({ "error": { "code": code, "message": message } }))).into_response()
  }
}
