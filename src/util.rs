//! Small utility helpers used across modules.

use std::collections::HashSet;

/// Very small and safe string templating.
/// Replaces occurrences of `{key}` in the template with provided values.
/// Values are inserted verbatim and are not re-scanned for placeholders.
pub fn fill_template(tpl: &str, pairs: &[(&str, &str)]) -> String {
  let mut out = String::with_capacity(tpl.len());
  let mut rest = tpl;
  while let Some(start) = rest.find('{') {
    out.push_str(&rest[..start]);
    let after = &rest[start + 1..];
    let replaced = after.find('}').and_then(|end| {
      let key = &after[..end];
      pairs.iter().find(|(k, _)| *k == key).map(|(_, v)| (end, *v))
    });
    match replaced {
      Some((end, v)) => {
        out.push_str(v);
        rest = &after[end + 1..];
      }
      None => {
        out.push('{');
        rest = after;
      }
    }
  }
  out.push_str(rest);
  out
}

/// Log-safe truncation for large strings.
/// Avoids spamming logs with huge request/response payloads.
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

/// Drop repeated non-blank lines, keeping the first occurrence of each in order.
/// Blank lines always pass so paragraph breaks survive.
pub fn dedupe_lines(text: &str) -> String {
  let mut seen = HashSet::new();
  text
    .split('\n')
    .filter(|line| line.trim().is_empty() || seen.insert(*line))
    .collect::<Vec<_>>()
    .join("\n")
}

/// Trimmed, non-empty view of an optional string field.
pub fn non_blank(s: Option<&str>) -> Option<&str> {
  s.map(str::trim).filter(|t| !t.is_empty())
}
