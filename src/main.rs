//! Millionaire quiz API backend
//!
//! - Axum HTTP API: questions, categories, answer explanations, speech
//! - Optional LLM provider (Gemini, OpenAI, Azure OpenAI, Anthropic)
//! - Built-in question generator when no provider is available
//!
//! Important env variables (also read from `.env`, then `.env.local`):
//!   PORT                : u16 (default 5177)
//!   LLM_PROVIDER        : gemini | openai | azure | anthropic | none (default none)
//!   LLM_API_KEY         : provider key (required when a provider is selected)
//!   LLM_MODEL           : model / deployment name (per-provider default)
//!   LLM_BASE_URL        : override endpoint (required for Azure)
//!   LLM_API_VERSION     : Azure API version; switches openai to Azure mode
//!   LLM_TIMEOUT_SECS    : per-request timeout (default 60)
//!   LLM_FALLBACK        : builtin (default) | error
//!   FALLBACK_RANDOMIZE  : shuffle fallback choices
//!   TTS_MODEL / TTS_VOICE / TTS_FORMAT : speech defaults
//!   CORS_ALLOW_ORIGINS  : comma-separated allow-list (default any)
//!   PROMPTS_CONFIG_PATH : TOML prompt templates
//!   DEBUG_ATTACH / DEBUG_PORT : log pid and port for a debugger to attach
//!   LOG_LEVEL           : tracing filter, e.g. "debug" or full directives
//!   LOG_FORMAT          : "pretty" (default) or "json"

mod telemetry;
mod util;
mod domain;
mod error;
mod config;
mod normalize;
mod fallback;
mod providers;
mod state;
mod protocol;
mod logic;
mod routes;

use std::{net::SocketAddr, sync::Arc};
use tokio::net::TcpListener;
use tracing::{error, info, warn};

use crate::config::{load_dotenv_files, Settings};
use crate::routes::build_router;
use crate::state::AppState;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
  if let Ok(dir) = std::env::current_dir() {
    load_dotenv_files(&dir);
  }
  telemetry::init_tracing();

  let settings = match Settings::from_env() {
    Ok(s) => s,
    Err(e) => {
      error!(target: "millionaire_api", error = %e, "Invalid configuration");
      return Err(e.into());
    }
  };

  if settings.debug_attach {
    info!(target: "millionaire_api", pid = std::process::id(), port = settings.debug_port, "Debug attach enabled; attach a debugger to this pid");
  }

  let addr = SocketAddr::from(([0, 0, 0, 0], settings.port));

  // Shared application state (settings, prompts, provider client).
  let state = Arc::new(AppState::new(settings));
  let app = build_router(state);

  let listener = TcpListener::bind(addr).await?;
  info!(target: "millionaire_api", %addr, "HTTP server listening");
  axum::serve(listener, app).with_graceful_shutdown(shutdown_signal()).await?;
  info!(target: "millionaire_api", "Server stopped");
  Ok(())
}

async fn shutdown_signal() {
  if let Err(e) = tokio::signal::ctrl_c().await {
    warn!(target: "millionaire_api", error = %e, "Failed to listen for Ctrl-C");
    std::future::pending::<()>().await;
  }
  info!(target: "millionaire_api", "Shutdown signal received");
}
