//! HTTP endpoint handlers. These are thin wrappers that forward to core logic.
//! Each handler is instrumented and logs request parameters and basic result info.

use std::sync::Arc;
use axum::{
  extract::{rejection::JsonRejection, Query, State},
  http::header,
  response::IntoResponse,
  Json,
};
use tracing::{info, instrument};

use crate::domain::CATEGORIES;
use crate::error::ApiError;
use crate::logic::*;
use crate::protocol::*;
use crate::state::AppState;

fn json_body<T>(body: Result<Json<T>, JsonRejection>) -> Result<T, ApiError> {
  body
    .map(|Json(v)| v)
    .map_err(|e| ApiError::bad_request("INVALID_JSON", e.body_text()))
}

#[instrument(level = "info", skip(state))]
pub async fn http_health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
  Json(HealthOut {
    ok: true,
    llm: LlmHealth { provider: state.provider_label(), enabled: state.llm.is_some() },
  })
}

#[instrument(level = "info")]
pub async fn http_categories() -> impl IntoResponse {
  Json(CategoriesOut { categories: CATEGORIES.to_vec() })
}

#[instrument(level = "info", skip(state, body))]
pub async fn http_post_questions(
  State(state): State<Arc<AppState>>,
  body: Result<Json<QuestionsIn>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
  let body = json_body(body)?;
  let requested = body.categories.unwrap_or_default();
  let questions = serve_questions(&state, &requested, body.count).await?;
  info!(target: "millionaire_api", served = questions.len(), "HTTP questions served");
  Ok(Json(QuestionsOut { questions }))
}

/// `?count=5&categories=Science&categories=Music` or `?categories=Science,Music`.
/// A non-numeric count is ignored and the default applies.
#[instrument(level = "info", skip(state, params))]
pub async fn http_get_questions(
  State(state): State<Arc<AppState>>,
  Query(params): Query<Vec<(String, String)>>,
) -> Result<impl IntoResponse, ApiError> {
  let (requested, count) = questions_query(&params);
  let questions = serve_questions(&state, &requested, count).await?;
  info!(target: "millionaire_api", served = questions.len(), "HTTP questions served");
  Ok(Json(QuestionsOut { questions }))
}

fn questions_query(params: &[(String, String)]) -> (Vec<String>, Option<i64>) {
  let mut requested = Vec::new();
  let mut count = None;
  for (key, value) in params {
    match key.as_str() {
      "categories" | "category" => requested.extend(
        value.split(',').map(str::trim).filter(|s| !s.is_empty()).map(String::from),
      ),
      "count" => count = value.trim().parse::<i64>().ok(),
      _ => {}
    }
  }
  (requested, count)
}

#[instrument(level = "info", skip(state, body))]
pub async fn http_post_explain(
  State(state): State<Arc<AppState>>,
  body: Result<Json<ExplainIn>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
  let req = validate_explain(json_body(body)?)?;
  let explanation = explain_answer(&state, &req).await?;
  info!(target: "millionaire_api", len = explanation.len(), "HTTP explanation served");
  Ok(Json(ExplainOut { explanation }))
}

#[instrument(level = "info", skip(state, body))]
pub async fn http_post_tts(
  State(state): State<Arc<AppState>>,
  body: Result<Json<TtsIn>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
  let (speech, stream) = speech_request_from(json_body(body)?, &state.settings.tts)?;
  let content_type = speech.format.content_type();
  let audio = synthesize_speech(&state, &speech, stream).await?;
  Ok(([(header::CONTENT_TYPE, content_type)], audio))
}
