//! Core behaviors behind the HTTP handlers.
//!
//! This includes:
//!   - Serving question batches (provider first, then the fallback policy)
//!   - Explaining answers (provider, or a one-line local explanation)
//!   - Validating and relaying speech synthesis

use axum::body::Body;
use tracing::{info, instrument, warn};

use crate::config::{FallbackPolicy, TtsDefaults};
use crate::domain::{category_pool, clamp_count, difficulty_plan, AudioFormat, ExplainRequest, Question, SpeechRequest};
use crate::error::{ApiError, ProviderError};
use crate::fallback::{fallback_questions, fallback_questions_shuffled};
use crate::protocol::{ExplainIn, TtsIn};
use crate::state::AppState;

/// Upper bound on synthesized input, in characters.
const MAX_TTS_INPUT_CHARS: usize = 4096;

#[instrument(level = "info", skip(state, requested), fields(requested_categories = requested.len()))]
pub async fn serve_questions(state: &AppState, requested: &[String], count: Option<i64>) -> Result<Vec<Question>, ApiError> {
  let pool = category_pool(requested);
  let total = clamp_count(count);
  let plan = difficulty_plan(total);
  let policy = state.settings.fallback;

  match &state.llm {
    Some(llm) => match llm.generate_questions(&state.prompts, &pool, &plan).await {
      Ok(questions) => {
        info!(target: "millionaire_api", provider = llm.name(), count = questions.len(), "Questions served from provider");
        return Ok(questions);
      }
      Err(e) if policy == FallbackPolicy::Error => return Err(e.into()),
      Err(e) => warn!(target: "millionaire_api", provider = llm.name(), error = %e, "Provider failed; falling back to built-in generator"),
    },
    None if policy == FallbackPolicy::Error => return Err(ApiError::NotConfigured),
    None => {}
  }

  let questions = if state.settings.fallback_randomize {
    fallback_questions_shuffled(&pool, total, &mut rand::thread_rng())
  } else {
    fallback_questions(&pool, total)
  };
  info!(target: "millionaire_api", count = questions.len(), "Questions served from built-in generator");
  Ok(questions)
}

/// 400 unless there is a prompt, at least two choices, and an in-range correct index.
/// An out-of-range `userIndex` is treated as "no answer".
pub fn validate_explain(body: ExplainIn) -> Result<ExplainRequest, ApiError> {
  let prompt = body
    .prompt
    .map(|p| p.trim().to_string())
    .filter(|p| !p.is_empty())
    .ok_or_else(|| ApiError::bad_request("INVALID_REQUEST", "prompt is required"))?;
  let choices = body.choices.unwrap_or_default();
  if choices.len() < 2 {
    return Err(ApiError::bad_request("INVALID_REQUEST", "at least 2 choices are required"));
  }
  let in_range = |i: i64| usize::try_from(i).ok().filter(|i| *i < choices.len());
  let correct_index = body
    .correct_index
    .and_then(in_range)
    .ok_or_else(|| ApiError::bad_request("INVALID_REQUEST", "correctIndex must index into choices"))?;
  let user_index = body.user_index.and_then(in_range);
  let style = body.style.map(|s| s.trim().to_string()).filter(|s| !s.is_empty());

  Ok(ExplainRequest { prompt, choices, correct_index, user_index, style })
}

#[instrument(level = "info", skip(state, req), fields(prompt_len = req.prompt.len()))]
pub async fn explain_answer(state: &AppState, req: &ExplainRequest) -> Result<String, ApiError> {
  let policy = state.settings.fallback;
  match &state.llm {
    Some(llm) => match llm.explain(&state.prompts, req).await {
      Ok(text) => return Ok(text),
      Err(e) if policy == FallbackPolicy::Error => return Err(e.into()),
      Err(e) => warn!(target: "millionaire_api", provider = llm.name(), error = %e, "Explain failed; using local explanation"),
    },
    None if policy == FallbackPolicy::Error => return Err(ApiError::NotConfigured),
    None => {}
  }
  Ok(explain_local(req))
}

fn explain_local(req: &ExplainRequest) -> String {
  let correct = &req.choices[req.correct_index];
  match req.user_index {
    Some(i) if i == req.correct_index => format!("Correct! The answer is \"{}\".", correct),
    Some(i) => format!("The correct answer is \"{}\", not \"{}\".", correct, req.choices[i]),
    None => format!("The correct answer is \"{}\".", correct),
  }
}

/// Apply defaults and validate a `/tts` body. Returns the request and whether to stream.
pub fn speech_request_from(body: TtsIn, defaults: &TtsDefaults) -> Result<(SpeechRequest, bool), ApiError> {
  let format_name = body.format.unwrap_or_else(|| defaults.format.clone());
  let format = AudioFormat::parse(&format_name).ok_or_else(|| {
    ApiError::bad_request(
      "UNSUPPORTED_FORMAT",
      format!("unsupported audio format '{}'; expected one of mp3, wav, flac, ogg, aac", format_name),
    )
  })?;

  let input = body
    .input
    .or(body.text)
    .map(|s| s.trim().to_string())
    .filter(|s| !s.is_empty())
    .ok_or_else(|| ApiError::bad_request("INVALID_REQUEST", "input (or text) is required"))?;
  if input.chars().count() > MAX_TTS_INPUT_CHARS {
    return Err(ApiError::bad_request(
      "INPUT_TOO_LONG",
      format!("input exceeds {} characters", MAX_TTS_INPUT_CHARS),
    ));
  }

  let pick = |v: Option<String>, default: &str| v.map(|s| s.trim().to_string()).filter(|s| !s.is_empty()).unwrap_or_else(|| default.to_string());
  let speech = SpeechRequest {
    input,
    voice: pick(body.voice, &defaults.voice),
    model: pick(body.model, &defaults.model),
    format,
  };
  Ok((speech, body.stream.unwrap_or(false)))
}

/// Call the provider and produce the response body, buffered or streamed.
#[instrument(level = "info", skip(state, speech), fields(format = ?speech.format))]
pub async fn synthesize_speech(state: &AppState, speech: &SpeechRequest, stream: bool) -> Result<Body, ApiError> {
  let llm = state.llm.as_ref().ok_or(ApiError::NotConfigured)?;
  let res = llm.synthesize(speech).await?;
  if stream {
    return Ok(Body::from_stream(res.bytes_stream()));
  }
  let bytes = res.bytes().await.map_err(|e| {
    ApiError::Provider(ProviderError::Network { provider: llm.name(), message: e.without_url().to_string() })
  })?;
  info!(target: "millionaire_api", provider = llm.name(), bytes = bytes.len(), "Speech synthesized");
  Ok(Body::from(bytes))
}
