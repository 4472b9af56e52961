//! Domain models: questions, the difficulty band policy, and the category catalog.

use serde::{Deserialize, Serialize};

/// Fixed category catalog served by `/categories`. Order is part of the API.
pub const CATEGORIES: [&str; 13] = [
  "General Knowledge",
  "Science",
  "Geography",
  "Movies",
  "Sports",
  "History",
  "Music",
  "Technology",
  "Physics",
  "Literature",
  "Mathematics",
  "Chemistry",
  "World History",
];

pub const DEFAULT_QUESTION_COUNT: i64 = 15;
pub const MAX_QUESTION_COUNT: usize = 100;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
  Easy,
  Medium,
  Hard,
}

impl Difficulty {
  pub fn as_str(&self) -> &'static str {
    match self {
      Difficulty::Easy => "easy",
      Difficulty::Medium => "medium",
      Difficulty::Hard => "hard",
    }
  }

  /// Band policy: ordinals 1-5 easy, 6-10 medium, 11+ hard.
  pub fn for_ordinal(ordinal: usize) -> Self {
    match ordinal {
      0..=5 => Difficulty::Easy,
      6..=10 => Difficulty::Medium,
      _ => Difficulty::Hard,
    }
  }

  /// Lenient parse used on provider output ("Easy", " hard ").
  pub fn parse(s: &str) -> Option<Self> {
    match s.trim().to_ascii_lowercase().as_str() {
      "easy" => Some(Difficulty::Easy),
      "medium" => Some(Difficulty::Medium),
      "hard" => Some(Difficulty::Hard),
      _ => None,
    }
  }
}

impl std::fmt::Display for Difficulty {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str(self.as_str())
  }
}

/// One trivia item. Field names follow the client's camelCase contract.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Question {
  pub id: String,
  pub category: String,
  pub difficulty: Difficulty,
  pub prompt: String,
  pub choices: Vec<String>,
  pub correct_index: usize,
}

/// Ordered difficulty labels for a batch of `count` questions.
pub fn difficulty_plan(count: usize) -> Vec<Difficulty> {
  (1..=count).map(Difficulty::for_ordinal).collect()
}

/// Clamp a client-supplied count: missing → default, floored at 1, capped.
pub fn clamp_count(count: Option<i64>) -> usize {
  let n = count.unwrap_or(DEFAULT_QUESTION_COUNT).max(1);
  usize::try_from(n).unwrap_or(MAX_QUESTION_COUNT).min(MAX_QUESTION_COUNT)
}

/// Keep only catalog categories (case-insensitive, canonical spelling, no duplicates).
/// An empty selection means the whole catalog.
pub fn category_pool<S: AsRef<str>>(requested: &[S]) -> Vec<String> {
  let mut pool: Vec<String> = Vec::new();
  for r in requested {
    let wanted = r.as_ref().trim();
    if let Some(canon) = CATEGORIES.iter().find(|c| c.eq_ignore_ascii_case(wanted)) {
      if !pool.iter().any(|p| p == canon) {
        pool.push((*canon).to_string());
      }
    }
  }
  if pool.is_empty() {
    CATEGORIES.iter().map(|c| c.to_string()).collect()
  } else {
    pool
  }
}

/// A validated explanation request (at least two choices, index in range).
#[derive(Clone, Debug)]
pub struct ExplainRequest {
  pub prompt: String,
  pub choices: Vec<String>,
  pub correct_index: usize,
  pub user_index: Option<usize>,
  pub style: Option<String>,
}

/// Audio containers the `/tts` endpoint can return.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AudioFormat {
  Mp3,
  Wav,
  Flac,
  Ogg,
  Aac,
}

impl AudioFormat {
  pub fn parse(s: &str) -> Option<Self> {
    match s.trim().to_ascii_lowercase().as_str() {
      "mp3" => Some(AudioFormat::Mp3),
      "wav" => Some(AudioFormat::Wav),
      "flac" => Some(AudioFormat::Flac),
      "ogg" => Some(AudioFormat::Ogg),
      "aac" => Some(AudioFormat::Aac),
      _ => None,
    }
  }

  pub fn content_type(&self) -> &'static str {
    match self {
      AudioFormat::Mp3 => "audio/mpeg",
      AudioFormat::Wav => "audio/wav",
      AudioFormat::Flac => "audio/flac",
      AudioFormat::Ogg => "audio/ogg",
      AudioFormat::Aac => "audio/aac",
    }
  }

  /// Name used in OpenAI-style `response_format`; Ogg is delivered as Opus-in-Ogg.
  pub fn vendor_name(&self) -> &'static str {
    match self {
      AudioFormat::Mp3 => "mp3",
      AudioFormat::Wav => "wav",
      AudioFormat::Flac => "flac",
      AudioFormat::Ogg => "opus",
      AudioFormat::Aac => "aac",
    }
  }
}

/// One speech synthesis call, with defaults already applied.
#[derive(Clone, Debug)]
pub struct SpeechRequest {
  pub input: String,
  pub voice: String,
  pub model: String,
  pub format: AudioFormat,
}
