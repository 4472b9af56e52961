//! Runtime configuration.
//!
//! Sources, highest precedence first:
//!   1. explicit call-time arguments (`LlmOverrides`)
//!   2. process environment, after `.env` and `.env.local` were loaded
//!   3. built-in defaults (per-provider default model, ports, TTS voice, ...)
//!
//! Prompt templates can be overridden from a TOML file (`PROMPTS_CONFIG_PATH`).

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use tracing::{error, info, warn};

use crate::domain::AudioFormat;
use crate::error::ConfigError;

/// Environment lookup. Production uses `process_env`; tests pass a map.
pub type EnvLookup<'a> = &'a dyn Fn(&str) -> Option<String>;

/// Read a variable, treating blank values as unset.
pub fn process_env(key: &str) -> Option<String> {
  std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

/// Load `.env`, then `.env.local` on top of it. Missing files are fine.
pub fn load_dotenv_files(dir: &Path) {
  let base = dir.join(".env");
  if base.exists() {
    if let Err(e) = dotenvy::from_path(&base) {
      eprintln!("failed to load {}: {e}", base.display());
    }
  }
  let local = dir.join(".env.local");
  if local.exists() {
    if let Err(e) = dotenvy::from_path_override(&local) {
      eprintln!("failed to load {}: {e}", local.display());
    }
  }
}

/// What to do when no provider is available or a provider call fails.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FallbackPolicy {
  /// Serve the local generator (questions) or a local explanation.
  Builtin,
  /// Report 503 `LLM_NOT_CONFIGURED` / 502 `PROVIDER_ERROR`.
  Error,
}

impl FallbackPolicy {
  fn parse(s: &str) -> Option<Self> {
    match s.trim().to_ascii_lowercase().as_str() {
      "builtin" | "fallback" | "local" => Some(FallbackPolicy::Builtin),
      "error" | "strict" | "none" => Some(FallbackPolicy::Error),
      _ => None,
    }
  }
}

#[derive(Clone, Debug)]
pub struct TtsDefaults {
  pub model: String,
  pub voice: String,
  pub format: String,
}

#[derive(Clone, Debug)]
pub struct Settings {
  pub port: u16,
  pub llm_provider: String,
  pub llm_timeout: Duration,
  pub fallback: FallbackPolicy,
  pub fallback_randomize: bool,
  pub tts: TtsDefaults,
  /// Empty means "allow any origin".
  pub cors_origins: Vec<String>,
  pub debug_attach: bool,
  pub debug_port: u16,
  pub prompts_path: Option<String>,
}

impl Settings {
  pub fn from_env() -> Result<Self, ConfigError> {
    Self::from_lookup(&process_env)
  }

  pub fn from_lookup(env: EnvLookup<'_>) -> Result<Self, ConfigError> {
    let port = parse_or(env, "PORT", 5177u16)?;
    let timeout_secs = parse_or(env, "LLM_TIMEOUT_SECS", 60u64)?;
    let fallback = match env("LLM_FALLBACK") {
      None => FallbackPolicy::Builtin,
      Some(v) => FallbackPolicy::parse(&v)
        .ok_or(ConfigError::InvalidValue { key: "LLM_FALLBACK", value: v })?,
    };

    let tts_format = env("TTS_FORMAT").unwrap_or_else(|| "mp3".into()).trim().to_ascii_lowercase();
    if AudioFormat::parse(&tts_format).is_none() {
      return Err(ConfigError::InvalidValue { key: "TTS_FORMAT", value: tts_format });
    }

    let cors_origins = env("CORS_ALLOW_ORIGINS")
      .map(|v| {
        v.split(',')
          .map(|s| s.trim().to_string())
          .filter(|s| !s.is_empty() && s != "*")
          .collect()
      })
      .unwrap_or_default();

    Ok(Self {
      port,
      llm_provider: env("LLM_PROVIDER").unwrap_or_default().trim().to_ascii_lowercase(),
      llm_timeout: Duration::from_secs(timeout_secs.max(1)),
      fallback,
      fallback_randomize: flag(env, "FALLBACK_RANDOMIZE"),
      tts: TtsDefaults {
        model: env("TTS_MODEL").unwrap_or_else(|| "gpt-4o-mini-tts".into()),
        voice: env("TTS_VOICE").unwrap_or_else(|| "alloy".into()),
        format: tts_format,
      },
      cors_origins,
      debug_attach: flag(env, "DEBUG_ATTACH"),
      debug_port: parse_or(env, "DEBUG_PORT", 5678u16)?,
      prompts_path: env("PROMPTS_CONFIG_PATH"),
    })
  }
}

fn flag(env: EnvLookup<'_>, key: &str) -> bool {
  env(key)
    .map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"))
    .unwrap_or(false)
}

fn parse_or<T: std::str::FromStr>(env: EnvLookup<'_>, key: &'static str, default: T) -> Result<T, ConfigError> {
  match env(key) {
    None => Ok(default),
    Some(v) => v.trim().parse::<T>().map_err(|_| ConfigError::InvalidValue { key, value: v }),
  }
}

/// Explicit call-time settings; each one beats the matching `LLM_*` variable.
#[derive(Clone, Debug, Default)]
pub struct LlmOverrides {
  pub api_key: Option<String>,
  pub model: Option<String>,
  pub base_url: Option<String>,
  pub api_version: Option<String>,
}

/// Resolved connection info for one vendor.
#[derive(Clone)]
pub struct ProviderConfig {
  pub api_key: String,
  pub model: String,
  pub base_url: Option<String>,
  /// Only set when supplied explicitly; its presence selects Azure-style auth.
  pub api_version: Option<String>,
}

impl std::fmt::Debug for ProviderConfig {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("ProviderConfig")
      .field("api_key", &if self.api_key.is_empty() { "<unset>" } else { "<redacted>" })
      .field("model", &self.model)
      .field("base_url", &self.base_url)
      .field("api_version", &self.api_version)
      .finish()
  }
}

/// Layered resolution: explicit argument > generic `LLM_*` variable > provider default.
pub fn resolve_provider_config(default_model: &str, overrides: &LlmOverrides, env: EnvLookup<'_>) -> ProviderConfig {
  let pick = |explicit: &Option<String>, var: &str| -> Option<String> {
    explicit
      .as_ref()
      .map(|s| s.trim().to_string())
      .filter(|s| !s.is_empty())
      .or_else(|| env(var).map(|s| s.trim().to_string()).filter(|s| !s.is_empty()))
  };

  ProviderConfig {
    api_key: pick(&overrides.api_key, "LLM_API_KEY").unwrap_or_default(),
    model: pick(&overrides.model, "LLM_MODEL").unwrap_or_else(|| default_model.to_string()),
    base_url: pick(&overrides.base_url, "LLM_BASE_URL").map(|u| u.trim_end_matches('/').to_string()),
    api_version: pick(&overrides.api_version, "LLM_API_VERSION"),
  }
}

#[derive(Clone, Debug, Deserialize, Default)]
pub struct PromptsFile {
  #[serde(default)]
  pub prompts: Prompts,
}

/// Prompt templates. `{placeholders}` are filled by `util::fill_template`.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Prompts {
  pub questions_system: String,
  pub questions_user_template: String,
  pub explain_system: String,
  pub explain_user_template: String,
}

impl Default for Prompts {
  fn default() -> Self {
    Self {
      questions_system: "You are a question generator for a Who Wants to Be a Millionaire style quiz. Return strictly and only valid JSON matching the schema explained below.".into(),
      questions_user_template: "Generate questions for the following requirements.\n- Number of questions: {count}\n- Allowed categories: {categories}\n- Difficulties in order: {difficulties}\n\nRules:\n- Each question must have exactly 4 choices.\n- correctIndex is the 0-based index of the correct choice.\n- category must be one from the allowed list.\n- Keep prompts short and clear; no explanations.\n\nOutput JSON object with a single field 'questions' that is an array of objects with keys: id (string), category (string), difficulty (string), prompt (string), choices (string[4]), correctIndex (number).\nExample: {\"questions\": [{\"id\": \"q1\", \"category\": \"Science\", \"difficulty\": \"easy\", \"prompt\": \"What is H2O?\", \"choices\": [\"Water\", \"Oxygen\", \"Hydrogen\", \"Helium\"], \"correctIndex\": 0}]}\nReturn only JSON.".into(),
      explain_system: "You are a friendly quiz host. Explain answers briefly and accurately. Output plain text only.".into(),
      explain_user_template: "Question: {prompt}\nChoices:\n{choices}\nCorrect answer: {correct}\nPlayer picked: {picked}\nStyle: {style}\n\nExplain in 1-3 sentences why the correct answer is right{mistake_note}.".into(),
    }
  }
}

/// Load prompt overrides from TOML. Any IO or parse error keeps the defaults.
pub fn load_prompts(path: Option<&str>) -> Prompts {
  let Some(path) = path else { return Prompts::default() };
  match std::fs::read_to_string(path) {
    Ok(s) => match toml::from_str::<PromptsFile>(&s) {
      Ok(file) => {
        info!(target: "millionaire_api", %path, "Loaded prompt templates (TOML)");
        file.prompts
      }
      Err(e) => {
        error!(target: "millionaire_api", %path, error = %e, "Failed to parse prompt TOML; using defaults");
        Prompts::default()
      }
    },
    Err(e) => {
      warn!(target: "millionaire_api", %path, error = %e, "Failed to read prompt TOML; using defaults");
      Prompts::default()
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::collections::HashMap;

  fn env_of(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let map: HashMap<String, String> = pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
    move |k| map.get(k).cloned()
  }

  #[test]
  fn explicit_beats_env_beats_default() {
    let env = env_of(&[("LLM_API_KEY", "env-key"), ("LLM_MODEL", "env-model")]);
    let cfg = resolve_provider_config("default-model", &LlmOverrides::default(), &env);
    assert_eq!(cfg.api_key, "env-key");
    assert_eq!(cfg.model, "env-model");
    assert!(cfg.base_url.is_none());

    let overrides = LlmOverrides { model: Some("arg-model".into()), ..Default::default() };
    let cfg = resolve_provider_config("default-model", &overrides, &env);
    assert_eq!(cfg.model, "arg-model");
    assert_eq!(cfg.api_key, "env-key");

    let cfg = resolve_provider_config("default-model", &LlmOverrides::default(), &env_of(&[]));
    assert_eq!(cfg.model, "default-model");
    assert_eq!(cfg.api_key, "");
  }

  #[test]
  fn api_version_only_when_supplied() {
    let cfg = resolve_provider_config("m", &LlmOverrides::default(), &env_of(&[("LLM_API_KEY", "k")]));
    assert!(cfg.api_version.is_none());

    let cfg = resolve_provider_config(
      "m",
      &LlmOverrides::default(),
      &env_of(&[("LLM_API_VERSION", "2024-06-01"), ("LLM_BASE_URL", "https://x.openai.azure.com/")]),
    );
    assert_eq!(cfg.api_version.as_deref(), Some("2024-06-01"));
    assert_eq!(cfg.base_url.as_deref(), Some("https://x.openai.azure.com"));
  }

  #[test]
  fn debug_output_hides_key() {
    let cfg = resolve_provider_config("m", &LlmOverrides::default(), &env_of(&[("LLM_API_KEY", "sk-secret")]));
    assert!(!format!("{cfg:?}").contains("sk-secret"));
  }

  #[test]
  fn settings_defaults() {
    let s = Settings::from_lookup(&env_of(&[])).unwrap();
    assert_eq!(s.port, 5177);
    assert_eq!(s.llm_provider, "");
    assert_eq!(s.llm_timeout, Duration::from_secs(60));
    assert_eq!(s.fallback, FallbackPolicy::Builtin);
    assert!(!s.fallback_randomize);
    assert_eq!(s.tts.format, "mp3");
    assert!(s.cors_origins.is_empty());
    assert!(!s.debug_attach);
  }

  #[test]
  fn settings_parse_values() {
    let s = Settings::from_lookup(&env_of(&[
      ("PORT", "8080"),
      ("LLM_PROVIDER", " Gemini "),
      ("LLM_FALLBACK", "error"),
      ("FALLBACK_RANDOMIZE", "true"),
      ("CORS_ALLOW_ORIGINS", "http://localhost:5173, http://127.0.0.1:5173"),
      ("DEBUG_ATTACH", "1"),
    ]))
    .unwrap();
    assert_eq!(s.port, 8080);
    assert_eq!(s.llm_provider, "gemini");
    assert_eq!(s.fallback, FallbackPolicy::Error);
    assert!(s.fallback_randomize);
    assert_eq!(s.cors_origins.len(), 2);
    assert!(s.debug_attach);
  }

  #[test]
  fn settings_reject_garbage() {
    assert!(Settings::from_lookup(&env_of(&[("PORT", "eighty")])).is_err());
    assert!(Settings::from_lookup(&env_of(&[("LLM_FALLBACK", "maybe")])).is_err());
    assert!(matches!(
      Settings::from_lookup(&env_of(&[("TTS_FORMAT", "xml")])),
      Err(ConfigError::InvalidValue { key: "TTS_FORMAT", .. })
    ));
    assert_eq!(Settings::from_lookup(&env_of(&[("TTS_FORMAT", "OGG")])).unwrap().tts.format, "ogg");
  }

  #[test]
  fn prompts_toml_partial_override() {
    let file: PromptsFile = toml::from_str("[prompts]\nexplain_system = \"Be terse.\"\n").unwrap();
    assert_eq!(file.prompts.explain_system, "Be terse.");
    assert_eq!(file.prompts.questions_system, Prompts::default().questions_system);
  }
}
