//! HTTP endpoint handlers. These are thin wrappers that validate the body and forward to core logic.
//! Each handler is instrumented; logs carry sizes and outcomes, never the student's text.

use std::{convert::Infallible, sync::Arc};

use axum::{
  body::{Body, Bytes},
  extract::{rejection::JsonRejection, State},
  http::header::CONTENT_TYPE,
  response::{IntoResponse, Response},
  Json,
};
use tracing::{info, instrument, warn};

use crate::error::AppError;
use crate::logic;
use crate::protocol::*;
use crate::state::AppState;

/// Malformed bodies are client errors like any missing field.
fn body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, AppError> {
  match payload {
    Ok(Json(v)) => Ok(v),
    Err(rejection) => {
      warn!(target: "codeapalooza_backend", error = %rejection.body_text(), "Rejected request body");
      Err(AppError::validation("Invalid input data"))
    }
  }
}

#[instrument(level = "info")]
pub async fn http_health() -> impl IntoResponse { Json(HealthOut { ok: true }) }

#[instrument(level = "info", skip_all)]
pub async fn http_post_quiz(
  State(state): State<Arc<AppState>>,
  payload: Result<Json<Vec<QuizIn>>, JsonRejection>,
) -> Result<String, AppError> {
  let entries = body(payload)?;
  let entry = entries.first().ok_or_else(|| AppError::validation("Invalid input data"))?;
  let (profile, number) = entry.validate()?;
  let question = logic::get_question(&state, &profile, number).await?;
  info!(target: "quiz", key = %profile.session_key(), number, question_len = question.len(), "HTTP quiz served");
  Ok(question)
}

#[instrument(level = "info", skip_all)]
pub async fn http_post_analysis(
  State(state): State<Arc<AppState>>,
  payload: Result<Json<AnalysisIn>, JsonRejection>,
) -> Result<String, AppError> {
  let req = body(payload)?;
  let (profile, question, answer) = req.validate()?;
  let critique = logic::analyze(&state, &profile, question, answer).await?;
  info!(target: "codeapalooza_backend", critique_len = critique.len(), "HTTP analysis served");
  Ok(critique)
}

#[instrument(level = "info", skip_all)]
pub async fn http_post_study_plan(
  State(state): State<Arc<AppState>>,
  payload: Result<Json<StudyPlanIn>, JsonRejection>,
) -> Result<String, AppError> {
  let req = body(payload)?;
  let (profile, analysis) = req.validate()?;
  let plan = logic::plan(&state, &profile, analysis).await?;
  info!(target: "codeapalooza_backend", plan_len = plan.len(), "HTTP study plan served");
  Ok(plan)
}

/// Replies as a streamed text body; the reply is currently sent as a single chunk.
#[instrument(level = "info", skip_all)]
pub async fn http_post_chat(
  State(state): State<Arc<AppState>>,
  payload: Result<Json<Vec<ChatMessage>>, JsonRejection>,
) -> Result<Response, AppError> {
  let messages = body(payload)?;
  validate_chat(&messages)?;
  let reply = logic::chat(&state, &messages).await?;
  info!(target: "codeapalooza_backend", messages = messages.len(), reply_len = reply.len(), "HTTP chat served");

  let stream = futures::stream::once(async move { Ok::<_, Infallible>(Bytes::from(reply)) });
  Ok(([(CONTENT_TYPE, "text/plain; charset=utf-8")], Body::from_stream(stream)).into_response())
}
