//! Public HTTP request/response DTOs (serde ready).
//! Field names follow the web client's camelCase contract.

use serde::{Deserialize, Serialize};

use crate::domain::Question;

#[derive(Debug, Default, Deserialize)]
pub struct QuestionsIn {
    #[serde(default)]
    pub categories: Option<Vec<String>>,
    #[serde(default)]
    pub count: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct QuestionsOut {
    pub questions: Vec<Question>,
}

#[derive(Debug, Serialize)]
pub struct CategoriesOut {
    pub categories: Vec<&'static str>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExplainIn {
    #[serde(default)]
    pub prompt: Option<String>,
    #[serde(default)]
    pub choices: Option<Vec<String>>,
    #[serde(default)]
    pub correct_index: Option<i64>,
    #[serde(default)]
    pub user_index: Option<i64>,
    #[serde(default)]
    pub style: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ExplainOut {
    pub explanation: String,
}

/// `input` and `text` are synonyms; `input` wins when both are sent.
#[derive(Debug, Default, Deserialize)]
pub struct TtsIn {
    #[serde(default)]
    pub input: Option<String>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub voice: Option<String>,
    #[serde(default)]
    pub format: Option<String>,
    #[serde(default)]
    pub stream: Option<bool>,
    #[serde(default)]
    pub model: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct LlmHealth {
    pub provider: Option<String>,
    pub enabled: bool,
}

#[derive(Debug, Serialize)]
pub struct HealthOut {
    pub ok: bool,
    pub llm: LlmHealth,
}
