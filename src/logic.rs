//! Core behaviors behind the HTTP handlers.
//!
//! This includes:
//!   - Serving a quiz question by number (cache-or-generate)
//!   - Grading a free-text answer
//!   - Building a study plan from that grading
//!   - The onboarding chat (retrieval-augmented, stateless)
//!
//! Inputs arrive already validated (see `crate::protocol`).

use tracing::{debug, info, instrument};

use crate::domain::{ChatMessage, StudentProfile, QUIZ_LEN};
use crate::error::AppError;
use crate::gemini::{ModelKind, Turn};
use crate::prompt::Prompt;
use crate::quiz::generate_quiz;
use crate::retrieval::{chat_material, retrieve};
use crate::state::AppState;
use crate::util::dedupe_lines;

/// Returned when the model answers without any text.
pub const NO_VALID_RESPONSE: &str = "No valid response received from AI";

#[instrument(level = "info", skip(state, profile), fields(key = %profile.session_key()))]
pub async fn get_question(state: &AppState, profile: &StudentProfile, question_number: i64) -> Result<String, AppError> {
  let number = usize::try_from(question_number)
    .ok()
    .filter(|n| (1..=QUIZ_LEN).contains(n))
    .ok_or_else(|| AppError::InvalidArgument("Invalid question number".into()))?;

  let key = profile.session_key();
  let set = state
    .quizzes
    .get_or_create(&key, Box::pin(generate_quiz(state, profile)))
    .await?;

  let question = set
    .question(number)
    .ok_or_else(|| AppError::InvalidArgument("Invalid question number".into()))?;
  info!(target: "quiz", %key, number, "Quiz question served");
  Ok(question.to_string())
}

#[instrument(level = "info", skip(state, profile, question, answer), fields(question_len = question.len(), answer_len = answer.len()))]
pub async fn analyze(state: &AppState, profile: &StudentProfile, question: &str, answer: &str) -> Result<String, AppError> {
  let model = state.model()?;
  let prompt = Prompt::analysis(profile, question, answer).render(&state.prompts);
  let text = model.generate_text(ModelKind::Text, &prompt).await?;
  debug!(target: "codeapalooza_backend", has_text = text.is_some(), "Analysis generated");
  Ok(text.unwrap_or_else(|| NO_VALID_RESPONSE.to_string()))
}

#[instrument(level = "info", skip(state, profile, analysis), fields(analysis_len = analysis.len()))]
pub async fn plan(state: &AppState, profile: &StudentProfile, analysis: &str) -> Result<String, AppError> {
  let model = state.model()?;
  let prompt = Prompt::study_plan(profile, analysis).render(&state.prompts);
  let text = model.generate_text(ModelKind::Text, &prompt).await?;
  debug!(target: "codeapalooza_backend", has_text = text.is_some(), "Study plan generated");
  Ok(text.unwrap_or_else(|| NO_VALID_RESPONSE.to_string()))
}

/// One reply to the transcript. The latest message is embedded, its nearest
/// neighbours are appended to it, and the whole transcript goes to the chat model.
#[instrument(level = "info", skip(state, messages), fields(messages = messages.len()))]
pub async fn chat(state: &AppState, messages: &[ChatMessage]) -> Result<String, AppError> {
  let Some((last, prior)) = messages.split_last() else {
    return Err(AppError::validation("Invalid input data"));
  };
  let model = state.model()?;

  let matches = retrieve(model.as_ref(), state.index(), &last.content, state.retrieval.chat_top_k).await?;
  let material = chat_material(&state.prompts.chat_material_header, matches.as_deref());

  let mut turns = Vec::with_capacity(messages.len() + 1);
  turns.push(Turn::user(state.prompts.chat_system.as_str()));
  turns.extend(prior.iter().map(|m| Turn { role: m.chat_role(), text: m.content.clone() }));
  turns.push(Turn::user(format!("{}{}", last.content, material)));

  let text = model
    .generate(ModelKind::Chat, &turns)
    .await?
    .unwrap_or_else(|| NO_VALID_RESPONSE.to_string());

  if state.chat.dedupe_lines {
    Ok(dedupe_lines(&text))
  } else {
    Ok(text)
  }
}
