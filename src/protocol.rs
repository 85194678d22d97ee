//! Public request/response structs for the HTTP endpoints (serde ready).
//! Field names follow the browser client (camelCase). Every required field is
//! an `Option` here so that a missing field becomes our own 400, not a serde 422.

use serde::{Deserialize, Serialize};

use crate::domain::StudentProfile;
use crate::error::AppError;
use crate::util::non_blank;

pub use crate::domain::ChatMessage;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentInfoIn {
    #[serde(default)]
    pub technical_level: Option<String>,
    #[serde(default)]
    pub goal: Option<String>,
}

impl StudentInfoIn {
    pub fn profile(&self) -> Result<StudentProfile, AppError> {
        StudentProfile::new(self.technical_level.as_deref(), self.goal.as_deref())
    }
}

/// One element of the `/api/quiz` array. Extra fields (e.g. `name`) are ignored.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuizIn {
    #[serde(default)]
    pub technical_level: Option<String>,
    #[serde(default)]
    pub goal: Option<String>,
    #[serde(default)]
    pub question_number: Option<i64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisIn {
    #[serde(default)]
    pub student_info: Option<StudentInfoIn>,
    #[serde(default)]
    pub question: Option<String>,
    #[serde(default)]
    pub user_answer: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StudyPlanIn {
    #[serde(default)]
    pub student_info: Option<StudentInfoIn>,
    #[serde(default)]
    pub ai_analysis: Option<String>,
}

impl QuizIn {
    /// Validated profile plus the requested question number (default 1, not yet range-checked).
    pub fn validate(&self) -> Result<(StudentProfile, i64), AppError> {
        let profile = StudentProfile::new(self.technical_level.as_deref(), self.goal.as_deref())?;
        Ok((profile, self.question_number.unwrap_or(1)))
    }
}

impl AnalysisIn {
    pub fn validate(&self) -> Result<(StudentProfile, &str, &str), AppError> {
        let (Some(info), Some(question), Some(answer)) = (
            self.student_info.as_ref(),
            non_blank(self.question.as_deref()),
            non_blank(self.user_answer.as_deref()),
        ) else {
            return Err(AppError::validation(
                "Student info, question, and user answer are all required.",
            ));
        };
        Ok((info.profile()?, question, answer))
    }
}

impl StudyPlanIn {
    pub fn validate(&self) -> Result<(StudentProfile, &str), AppError> {
        let (Some(info), Some(analysis)) = (
            self.student_info.as_ref(),
            non_blank(self.ai_analysis.as_deref()),
        ) else {
            return Err(AppError::validation("Student info and AI analysis are required."));
        };
        Ok((info.profile()?, analysis))
    }
}

/// The transcript must be non-empty and end with a message that has content.
pub fn validate_chat(messages: &[ChatMessage]) -> Result<(), AppError> {
    let last = messages
        .last()
        .ok_or_else(|| AppError::validation("Invalid input data"))?;
    if last.content.trim().is_empty() {
        return Err(AppError::validation("No content in the last message"));
    }
    Ok(())
}

#[derive(Serialize)]
pub struct HealthOut {
    pub ok: bool,
}
