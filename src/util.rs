//! Small utility helpers used across modules.

/// Very small and safe string templating.
/// Replaces occurrences of `{key}` in the template with provided values.
pub fn fill_template(tpl: &str, pairs: &[(&str, &str)]) -> String {
  let mut out = tpl.to_string();
  for (k, v) in pairs {
    let needle = format!("{{{}}}", k);
    out = out.replace(&needle, v);
  }
  out
}

/// Remove a surrounding markdown code fence (```json ... ```), if any.
pub fn strip_code_fences(raw: &str) -> &str {
  let text = raw.trim();
  let Some(rest) = text.strip_prefix("```") else { return text };
  // Drop the info string ("json", "JSON", ...) up to the first newline.
  let body = match rest.find('\n') {
    Some(nl) => &rest[nl + 1..],
    None => rest.trim_start_matches(|c: char| c.is_ascii_alphabetic()),
  };
  body.trim_end().trim_end_matches("```").trim()
}

/// Log-safe truncation for large strings, cut on a char boundary.
pub fn trunc_for_log(s: &str, max: usize) -> String {
  if s.len() <= max {
    return s.to_string();
  }
  let mut cut = max;
  while !s.is_char_boundary(cut) {
    cut -= 1;
  }
  format!("{}… ({} bytes total)", &s[..cut], s.len())
}
