//! Typed prompts: a template id plus named parameters, rendered against the
//! configured `Prompts` table. Keeps every model-facing text in one place.

use crate::config::Prompts;
use crate::domain::StudentProfile;
use crate::util::fill_template;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TemplateId {
  /// Text embedded to look up quiz material.
  QuizQuery,
  /// Quiz instructions + student context + retrieved material.
  QuizGeneration,
  Analysis,
  StudyPlan,
}

#[derive(Clone, Debug)]
pub struct Prompt {
  template: TemplateId,
  params: Vec<(&'static str, String)>,
}

impl Prompt {
  fn new(template: TemplateId, profile: &StudentProfile) -> Self {
    Self {
      template,
      params: vec![
        ("technical_level", profile.technical_level().to_string()),
        ("goal", profile.goal().to_string()),
      ],
    }
  }

  fn with(mut self, key: &'static str, value: &str) -> Self {
    self.params.push((key, value.to_string()));
    self
  }

  pub fn quiz_query(profile: &StudentProfile) -> Self {
    Self::new(TemplateId::QuizQuery, profile)
  }

  pub fn quiz_generation(profile: &StudentProfile, material: &str) -> Self {
    Self::new(TemplateId::QuizGeneration, profile).with("material", material)
  }

  pub fn analysis(profile: &StudentProfile, question: &str, answer: &str) -> Self {
    Self::new(TemplateId::Analysis, profile)
      .with("question", question)
      .with("answer", answer)
  }

  pub fn study_plan(profile: &StudentProfile, analysis: &str) -> Self {
    Self::new(TemplateId::StudyPlan, profile).with("analysis", analysis)
  }

  #[cfg(test)]
  pub fn template(&self) -> TemplateId { self.template }

  #[cfg(test)]
  pub fn param(&self, key: &str) -> Option<&str> {
    self.params.iter().find(|(k, _)| *k == key).map(|(_, v)| v.as_str())
  }

  pub fn render(&self, prompts: &Prompts) -> String {
    let pairs: Vec<(&str, &str)> = self.params.iter().map(|(k, v)| (*k, v.as_str())).collect();
    match self.template {
      TemplateId::QuizQuery => fill_template(&prompts.quiz_query_template, &pairs),
      TemplateId::QuizGeneration => format!(
        "{}\n\n{}",
        prompts.quiz_system,
        fill_template(&prompts.quiz_user_template, &pairs)
      ),
      TemplateId::Analysis => fill_template(&prompts.analysis_template, &pairs),
      TemplateId::StudyPlan => fill_template(&prompts.study_plan_template, &pairs),
    }
  }
}
