//! Domain models: the student's self-description, the quiz cache key, the cached
//! question set, and chat transcript messages.

use std::fmt;

use serde::Deserialize;

use crate::error::AppError;

/// Number of questions in every generated quiz.
pub const QUIZ_LEN: usize = 3;

/// What the student told us about themselves. Both fields are trimmed and non-empty.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StudentProfile {
  technical_level: String,
  goal: String,
}

impl StudentProfile {
  pub fn new(technical_level: Option<&str>, goal: Option<&str>) -> Result<Self, AppError> {
    let technical_level = technical_level.map(str::trim).unwrap_or_default();
    let goal = goal.map(str::trim).unwrap_or_default();
    if technical_level.is_empty() || goal.is_empty() {
      return Err(AppError::validation("Technical level and goal are required"));
    }
    Ok(Self { technical_level: technical_level.to_string(), goal: goal.to_string() })
  }

  pub fn technical_level(&self) -> &str { &self.technical_level }
  pub fn goal(&self) -> &str { &self.goal }

  /// Cache key for this profile. Carries no user identity: equal profiles share a quiz.
  pub fn session_key(&self) -> SessionKey {
    SessionKey(format!("{}-{}", self.technical_level, self.goal))
  }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct SessionKey(String);

impl SessionKey {
  pub fn as_str(&self) -> &str { &self.0 }
}

impl fmt::Display for SessionKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// Exactly `QUIZ_LEN` distinct non-empty questions, ordered easy → hard.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct QuizQuestionSet {
  questions: [String; QUIZ_LEN],
}

impl QuizQuestionSet {
  /// Returns None unless there are exactly `QUIZ_LEN` non-blank, pairwise distinct questions.
  pub fn new(questions: Vec<String>) -> Option<Self> {
    if questions.iter().any(|q| q.trim().is_empty()) {
      return None;
    }
    if (1..questions.len()).any(|i| questions[..i].contains(&questions[i])) {
      return None;
    }
    let questions: [String; QUIZ_LEN] = questions.try_into().ok()?;
    Some(Self { questions })
  }

  /// 1-based lookup; None outside 1..=QUIZ_LEN.
  pub fn question(&self, number: usize) -> Option<&str> {
    number.checked_sub(1).and_then(|i| self.questions.get(i)).map(String::as_str)
  }

  #[cfg(test)]
  pub fn questions(&self) -> &[String] { &self.questions }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChatRole {
  User,
  Assistant,
}

impl From<&str> for ChatRole {
  fn from(s: &str) -> Self {
    if s == "assistant" { ChatRole::Assistant } else { ChatRole::User }
  }
}

/// One transcript entry as sent by the browser.
#[derive(Clone, Debug, Deserialize)]
pub struct ChatMessage {
  #[serde(default)]
  pub role: String,
  #[serde(default)]
  pub content: String,
}

impl ChatMessage {
  pub fn chat_role(&self) -> ChatRole { ChatRole::from(self.role.as_str()) }
}
