//! Built-in question generator used when no provider is available (or it failed).
//! Guarantees the game is playable offline.

use rand::seq::SliceRandom;
use rand::Rng;

use crate::domain::{difficulty_plan, Question};

const PLACEHOLDER_CHOICES: [&str; 4] = ["A", "B", "C", "D"];

/// Deterministic batch: identical `(pool, count)` always yields identical output.
pub fn fallback_questions(pool: &[String], count: usize) -> Vec<Question> {
  difficulty_plan(count)
    .into_iter()
    .enumerate()
    .map(|(i, difficulty)| {
      let label = difficulty.as_str();
      let category = if pool.is_empty() {
        "General Knowledge".to_string()
      } else {
        pool[(i + label.len()) % pool.len()].clone()
      };
      Question {
        id: format!("api-{}-{}", label, i + 1),
        category,
        difficulty,
        prompt: format!("Generated {} question #{}", label, i + 1),
        choices: PLACEHOLDER_CHOICES.iter().map(|c| c.to_string()).collect(),
        correct_index: 0,
      }
    })
    .collect()
}

/// Same batch with each question's choices shuffled; `correct_index` follows the answer.
pub fn fallback_questions_shuffled<R: Rng + ?Sized>(pool: &[String], count: usize, rng: &mut R) -> Vec<Question> {
  let mut out = fallback_questions(pool, count);
  for q in &mut out {
    let answer = q.choices[q.correct_index].clone();
    q.choices.shuffle(rng);
    q.correct_index = q.choices.iter().position(|c| *c == answer).unwrap_or(0);
  }
  out
}
