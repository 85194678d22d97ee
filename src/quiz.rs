//! Quiz generation (the cache-miss path) and the strict decoder for model output.
//!
//! Flow:
//! 1) Embed "<level> student aiming to achieve <goal>." and fetch the top-K material.
//! 2) Send quiz instructions + student context + material to the text model.
//! 3) Decode the reply into exactly three questions, or fail with a named error.

use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use crate::domain::{QuizQuestionSet, StudentProfile, QUIZ_LEN};
use crate::error::AppError;
use crate::gemini::ModelKind;
use crate::prompt::Prompt;
use crate::retrieval::{quiz_material, retrieve};
use crate::state::AppState;
use crate::util::trunc_for_log;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum QuizDecodeError {
  #[error("model returned no text")]
  EmptyResponse,
  #[error("response is not a bracket-delimited JSON array")]
  NotAnArray,
  #[error("response is not a JSON array of strings: {0}")]
  InvalidJson(String),
  #[error("expected 3 questions, got {0}")]
  WrongCount(usize),
  #[error("question {0} is empty")]
  EmptyQuestion(usize),
  #[error("question {0} repeats an earlier question")]
  DuplicateQuestion(usize),
}

/// Remove one surrounding Markdown code fence (```` ```json ```` / ```` ``` ````), if present.
fn strip_code_fences(raw: &str) -> &str {
  let mut s = raw.trim();
  if let Some(rest) = s.strip_prefix("```") {
    // Drop the info string ("json", "JSON", ...) up to the first newline or bracket.
    let info_end = rest.find(|c: char| c == '\n' || c == '[').unwrap_or(rest.len());
    s = rest[info_end..].trim_start();
  }
  if let Some(rest) = s.strip_suffix("```") {
    s = rest.trim_end();
  }
  s.trim()
}

/// Strict decoder: exactly `QUIZ_LEN` distinct non-empty strings in a JSON array, nothing else.
pub fn decode_quiz(raw: &str) -> Result<QuizQuestionSet, QuizDecodeError> {
  let text = strip_code_fences(raw);
  if !(text.starts_with('[') && text.ends_with(']')) {
    return Err(QuizDecodeError::NotAnArray);
  }

  let items: Vec<String> =
    serde_json::from_str(text).map_err(|e| QuizDecodeError::InvalidJson(e.to_string()))?;
  if items.len() != QUIZ_LEN {
    return Err(QuizDecodeError::WrongCount(items.len()));
  }
  if let Some(i) = items.iter().position(|q| q.trim().is_empty()) {
    return Err(QuizDecodeError::EmptyQuestion(i + 1));
  }

  let items: Vec<String> = items.into_iter().map(|q| q.trim().to_string()).collect();
  if let Some(i) = (1..items.len()).find(|&i| items[..i].contains(&items[i])) {
    return Err(QuizDecodeError::DuplicateQuestion(i + 1));
  }
  QuizQuestionSet::new(items).ok_or(QuizDecodeError::WrongCount(QUIZ_LEN))
}

/// Retrieval + model call + decode. Nothing is cached here; see `crate::store`.
#[instrument(level = "info", skip(state, profile), fields(key = %profile.session_key()))]
pub async fn generate_quiz(state: &AppState, profile: &StudentProfile) -> Result<QuizQuestionSet, AppError> {
  let model = state.model()?;

  let query = Prompt::quiz_query(profile).render(&state.prompts);
  let matches = retrieve(model.as_ref(), state.index(), &query, state.retrieval.quiz_top_k).await?;
  let material = quiz_material(matches.as_deref());

  let prompt = Prompt::quiz_generation(profile, &material).render(&state.prompts);
  let start = std::time::Instant::now();
  let raw = model.generate_text(ModelKind::Text, &prompt).await?;
  let elapsed = start.elapsed();

  let raw = raw.ok_or(QuizDecodeError::EmptyResponse)?;
  debug!(target: "quiz", raw = %trunc_for_log(&raw, 200), "Raw generated quiz");

  match decode_quiz(&raw) {
    Ok(set) => {
      info!(target: "quiz", ?elapsed, material_hits = matches.map(|m| m.len()).unwrap_or(0), "Quiz generated");
      Ok(set)
    }
    Err(e) => {
      warn!(target: "quiz", ?elapsed, error = %e, "Generated quiz rejected");
      Err(e.into())
    }
  }
}
