//! Error taxonomy shared by core logic and HTTP handlers.
//!
//! - `Validation` / `InvalidArgument` are client mistakes (400).
//! - `Generation` means the model answered but not in the expected shape (500).
//! - `Upstream` covers transport and API failures of the model or vector index (500).
//!
//! 500 responses carry a generic message; the detailed cause only goes to the logs.

use axum::{
  http::StatusCode,
  response::{IntoResponse, Response},
  Json,
};
use serde::Serialize;
use thiserror::Error;
use tracing::error;

use crate::quiz::QuizDecodeError;
use crate::util::trunc_for_log;

#[derive(Debug, Error)]
pub enum AppError {
  #[error("{0}")]
  Validation(String),

  #[error("{0}")]
  InvalidArgument(String),

  #[error("quiz generation failed: {0}")]
  Generation(#[from] QuizDecodeError),

  #[error(transparent)]
  Upstream(#[from] UpstreamError),
}

/// Longest raw upstream error body kept in an error message.
pub const MAX_ERROR_BODY: usize = 512;

/// Failures talking to the language model or the vector index.
#[derive(Debug, Error)]
pub enum UpstreamError {
  #[error("{0} is not configured")]
  NotConfigured(&'static str),

  #[error("{service} HTTP {status}: {message}")]
  Http { service: &'static str, status: u16, message: String },

  #[error("{service} network error: {message}")]
  Network { service: &'static str, message: String },

  #[error("{service} request timed out")]
  Timeout { service: &'static str },

  #[error("{service} response could not be decoded: {message}")]
  Decode { service: &'static str, message: String },

  #[error("embedding response contained no values")]
  EmptyEmbedding,
}

impl UpstreamError {
  /// Non-2xx reply. Uses the parsed API message when there is one, otherwise a
  /// truncated copy of the raw body (HTML error pages can be large).
  pub fn http(service: &'static str, status: u16, parsed: Option<String>, body: &str) -> Self {
    let message = parsed.unwrap_or_else(|| trunc_for_log(body, MAX_ERROR_BODY));
    UpstreamError::Http { service, status, message }
  }

  /// Classify a reqwest transport error for the given service.
  pub fn from_reqwest(service: &'static str, e: reqwest::Error) -> Self {
    if e.is_timeout() {
      UpstreamError::Timeout { service }
    } else if e.is_decode() {
      UpstreamError::Decode { service, message: e.to_string() }
    } else {
      UpstreamError::Network { service, message: e.to_string() }
    }
  }
}

impl AppError {
  pub fn validation(msg: impl Into<String>) -> Self {
    AppError::Validation(msg.into())
  }

  pub fn status(&self) -> StatusCode {
    match self {
      AppError::Validation(_) | AppError::InvalidArgument(_) => StatusCode::BAD_REQUEST,
      AppError::Generation(_) | AppError::Upstream(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
  }

  /// Message safe to hand back to the browser.
  fn public_message(&self) -> String {
    match self {
      AppError::Validation(m) | AppError::InvalidArgument(m) => m.clone(),
      AppError::Generation(_) => "Quiz generation failed".into(),
      AppError::Upstream(_) => "Upstream service error".into(),
    }
  }
}

#[derive(Serialize)]
struct ErrorBody {
  error: String,
}

impl IntoResponse for AppError {
  fn into_response(self) -> Response {
    let status = self.status();
    if status.is_server_error() {
      error!(target: "codeapalooza_backend", error = %self, %status, "Request failed");
    }
    (status, Json(ErrorBody { error: self.public_message() })).into_response()
  }
}
