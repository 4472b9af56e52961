//! Application state: settings, prompts, and the optional provider client.
//!
//! Built once at startup and shared read-only (behind `Arc`) by every handler.
//! A provider that fails to build is logged and treated as absent; the service
//! still starts and `/health` reports it as disabled.

use tracing::{error, info, instrument, warn};

use crate::config::{load_prompts, process_env, FallbackPolicy, LlmOverrides, Prompts, Settings};
use crate::providers::{make_provider, LlmClient};

pub struct AppState {
    pub settings: Settings,
    pub prompts: Prompts,
    pub llm: Option<LlmClient>,
}

impl AppState {
    /// Build state from settings: load prompt templates, resolve the provider.
    #[instrument(level = "info", skip_all, fields(provider = %settings.llm_provider))]
    pub fn new(settings: Settings) -> Self {
        let prompts = load_prompts(settings.prompts_path.as_deref());

        let llm = match make_provider(
            &settings.llm_provider,
            &LlmOverrides::default(),
            &process_env,
            settings.llm_timeout,
        ) {
            Ok(Some(client)) => {
                info!(target: "millionaire_api", provider = client.name(), model = %client.model(), "LLM provider initialized");
                Some(client)
            }
            Ok(None) => {
                info!(target: "millionaire_api", "LLM provider not configured; using built-in generator");
                None
            }
            Err(e) => {
                error!(target: "millionaire_api", provider = %settings.llm_provider, error = %e, "Failed to initialize LLM provider");
                None
            }
        };

        if llm.is_none() && settings.fallback == FallbackPolicy::Error {
            warn!(target: "millionaire_api", "LLM_FALLBACK=error and no provider: /questions and /explain will answer 503");
        }

        Self::with_parts(settings, prompts, llm)
    }

    pub fn with_parts(settings: Settings, prompts: Prompts, llm: Option<LlmClient>) -> Self {
        Self { settings, prompts, llm }
    }

    /// Name reported by `/health`: the configured value, or null when none was set.
    pub fn provider_label(&self) -> Option<String> {
        match &self.llm {
            Some(client) => Some(client.name().to_string()),
            None if self.settings.llm_provider.is_empty() => None,
            None => Some(self.settings.llm_provider.clone()),
        }
    }
}
