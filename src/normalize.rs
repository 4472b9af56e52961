//! Provider output → validated domain values.
//!
//! Pure functions, no I/O. A bad item is skipped, never repaired; the batch only
//! fails when nothing usable is left.

use std::collections::HashSet;

use serde_json::Value;
use tracing::debug;

use crate::domain::{Difficulty, Question};
use crate::error::ProviderError;
use crate::util::{strip_code_fences, trunc_for_log};

/// How a short batch is reconciled with the requested count.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Reconcile {
  /// Keep what we have.
  Truncate,
  /// Duplicate the last valid item until the plan is filled.
  PadWithLast,
}

/// Inputs a batch is normalized against.
pub struct BatchContext<'a> {
  pub provider: &'static str,
  pub categories: &'a [String],
  pub difficulties: &'a [Difficulty],
}

pub fn normalize_questions(raw: &str, ctx: &BatchContext<'_>, reconcile: Reconcile) -> Result<Vec<Question>, ProviderError> {
  let items = parse_items(raw).map_err(|message| ProviderError::Malformed {
    provider: ctx.provider,
    message: format!("{message} :: {}", trunc_for_log(raw, 200)),
  })?;

  let mut out: Vec<Question> = Vec::with_capacity(ctx.difficulties.len());
  let mut seen: HashSet<String> = HashSet::new();
  for (i, item) in items.iter().enumerate() {
    match coerce_item(item, i, ctx) {
      Some(mut q) => {
        q.id = claim_id(&mut seen, &q.id, &(i + 1).to_string());
        out.push(q);
      }
      None => debug!(target: "millionaire_api", provider = ctx.provider, index = i, "Dropped invalid question item"),
    }
  }

  if out.is_empty() {
    return Err(ProviderError::NoValidQuestions { provider: ctx.provider });
  }

  let target = ctx.difficulties.len();
  out.truncate(target);
  if reconcile == Reconcile::PadWithLast && out.len() < target {
    let last = out[out.len() - 1].clone();
    while out.len() < target {
      let n = out.len();
      let mut dup = last.clone();
      dup.id = claim_id(&mut seen, &last.id, &format!("dup{}", n + 1));
      dup.difficulty = ctx.difficulties[n];
      out.push(dup);
    }
  }
  Ok(out)
}

/// Reserve `id` in the batch, or `<id>-<suffix>` (then `-2`, `-3`, ...) when taken.
fn claim_id(seen: &mut HashSet<String>, id: &str, suffix: &str) -> String {
  if seen.insert(id.to_string()) {
    return id.to_string();
  }
  let base = format!("{id}-{suffix}");
  let mut candidate = base.clone();
  let mut n = 2;
  while !seen.insert(candidate.clone()) {
    candidate = format!("{base}-{n}");
    n += 1;
  }
  candidate
}

/// `{"questions": [...]}` or a bare array.
fn parse_items(raw: &str) -> Result<Vec<Value>, String> {
  let text = strip_code_fences(raw);
  let value: Value = serde_json::from_str(text).map_err(|e| format!("invalid JSON: {e}"))?;
  match value {
    Value::Array(items) => Ok(items),
    Value::Object(mut map) => match map.remove("questions") {
      Some(Value::Array(items)) => Ok(items),
      _ => Err("questions array missing".into()),
    },
    _ => Err("expected an object or array".into()),
  }
}

fn coerce_item(item: &Value, i: usize, ctx: &BatchContext<'_>) -> Option<Question> {
  let obj = item.as_object()?;

  let choices = obj.get("choices")?.as_array()?;
  if choices.len() != 4 {
    return None;
  }
  let choices: Vec<String> = choices.iter().map(scalar_to_string).collect::<Option<_>>()?;

  let correct_index = obj.get("correctIndex").and_then(to_index)?;
  if correct_index > 3 {
    return None;
  }

  let prompt = ["prompt", "question"]
    .iter()
    .filter_map(|k| obj.get(*k).and_then(scalar_to_string))
    .map(|s| s.trim().to_string())
    .find(|s| !s.is_empty())?;

  let id = obj
    .get("id")
    .and_then(scalar_to_string)
    .map(|s| s.trim().to_string())
    .filter(|s| !s.is_empty())
    .unwrap_or_else(|| format!("{}-{}", ctx.provider, i + 1));

  // Categories outside the requested pool are replaced by the round-robin pick.
  let returned = obj.get("category").and_then(scalar_to_string);
  let category = match returned.as_deref().map(str::trim) {
    Some(c) if ctx.categories.is_empty() && !c.is_empty() => c.to_string(),
    Some(c) => ctx
      .categories
      .iter()
      .find(|p| p.eq_ignore_ascii_case(c))
      .cloned()
      .unwrap_or_else(|| round_robin(ctx, i)),
    None => round_robin(ctx, i),
  };

  let planned = ctx
    .difficulties
    .get(i)
    .or_else(|| ctx.difficulties.last())
    .copied()
    .unwrap_or(Difficulty::Easy);
  let difficulty = obj
    .get("difficulty")
    .and_then(Value::as_str)
    .and_then(Difficulty::parse)
    .unwrap_or(planned);

  Some(Question { id, category, difficulty, prompt, choices, correct_index })
}

fn round_robin(ctx: &BatchContext<'_>, i: usize) -> String {
  if ctx.categories.is_empty() {
    "General Knowledge".to_string()
  } else {
    ctx.categories[i % ctx.categories.len()].clone()
  }
}

fn scalar_to_string(v: &Value) -> Option<String> {
  match v {
    Value::String(s) => Some(s.clone()),
    Value::Number(n) => Some(n.to_string()),
    Value::Bool(b) => Some(b.to_string()),
    _ => None,
  }
}

/// Integers, integral floats, and numeric strings. Negative values are rejected.
fn to_index(v: &Value) -> Option<usize> {
  match v {
    Value::Number(n) => {
      if let Some(u) = n.as_u64() {
        usize::try_from(u).ok()
      } else {
        let f = n.as_f64()?;
        (f >= 0.0 && f.fract() == 0.0).then_some(f as usize)
      }
    }
    Value::String(s) => s.trim().parse::<usize>().ok(),
    _ => None,
  }
}

/// Explanation text: plain text, or a JSON object carrying `explanation`.
pub fn normalize_explanation(raw: &str, provider: &'static str) -> Result<String, ProviderError> {
  let text = strip_code_fences(raw);
  let text = match serde_json::from_str::<Value>(text) {
    Ok(Value::Object(map)) => match map.get("explanation").and_then(Value::as_str) {
      Some(s) => s.trim().to_string(),
      None => text.to_string(),
    },
    _ => text.to_string(),
  };
  if text.is_empty() {
    Err(ProviderError::EmptyResponse { provider })
  } else {
    Ok(text)
  }
}
