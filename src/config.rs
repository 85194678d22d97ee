//! Configuration: environment settings for the upstream services plus an optional
//! TOML agent config (prompt overrides, retrieval sizes, quiz cache and chat options).
//!
//! See `AgentConfig` and `Prompts` for the TOML schema.

use std::time::Duration;

use serde::Deserialize;
use tracing::{error, info};

const DEFAULT_GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
const DEFAULT_UPSTREAM_TIMEOUT_SECS: u64 = 60;

#[derive(Clone, Debug, Deserialize, Default)]
pub struct AgentConfig {
  #[serde(default)]
  pub prompts: Prompts,
  #[serde(default)]
  pub retrieval: RetrievalCfg,
  #[serde(default)]
  pub quiz: QuizCfg,
  #[serde(default)]
  pub chat: ChatCfg,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct RetrievalCfg {
  /// Matches spliced into the quiz-generation prompt.
  pub quiz_top_k: u32,
  /// Matches appended to the latest chat message.
  pub chat_top_k: u32,
}

impl Default for RetrievalCfg {
  fn default() -> Self {
    Self { quiz_top_k: 3, chat_top_k: 1 }
  }
}

#[derive(Clone, Debug, Deserialize, Default)]
#[serde(default)]
pub struct QuizCfg {
  /// Regenerate cached quizzes older than this. None keeps them for the process lifetime.
  pub ttl_secs: Option<u64>,
}

impl QuizCfg {
  pub fn ttl(&self) -> Option<Duration> {
    self.ttl_secs.map(Duration::from_secs)
  }
}

#[derive(Clone, Debug, Deserialize, Default)]
#[serde(default)]
pub struct ChatCfg {
  /// Drop repeated lines from chat replies before sending them.
  pub dedupe_lines: bool,
}

/// Prompt templates. `{key}` placeholders are filled by `crate::prompt`.
/// Any field can be overridden from TOML; missing fields keep their defaults.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Prompts {
  pub quiz_system: String,
  pub quiz_user_template: String,
  pub quiz_query_template: String,
  pub analysis_template: String,
  pub study_plan_template: String,
  pub chat_system: String,
  pub chat_material_header: String,
}

impl Default for Prompts {
  fn default() -> Self {
    Self {
      quiz_system: DEFAULT_QUIZ_SYSTEM.trim().into(),
      quiz_user_template: "The student is at a {technical_level} level and wants to achieve {goal}.\nBased on their background and this material: {material}, generate 3 quiz questions and format them as a JSON array of 3 strings.".into(),
      quiz_query_template: "{technical_level} student aiming to achieve {goal}.".into(),
      analysis_template: DEFAULT_ANALYSIS_TEMPLATE.trim().into(),
      study_plan_template: DEFAULT_STUDY_PLAN_TEMPLATE.trim().into(),
      chat_system: DEFAULT_CHAT_SYSTEM.trim().into(),
      chat_material_header: "Let's analyze your computer science background! Kindly carefully read this question and write your analysis\n\n".into(),
    }
  }
}

const DEFAULT_QUIZ_SYSTEM: &str = r#"
You are an expert in Computer Science, and your name is Code-a-palooza.

You will generate 3 quiz questions based on the student's current technical level and goal.

The questions should be a bit more advanced than their current knowledge but relevant to their goal.

First Question: General Knowledge (easy)
The first question should test their general knowledge about the goal they want. Ask about anything general related to that goal.
For example, if the goal of the student is to become a data scientist, ask them about the most important task a data scientist should do.

Second Question: Critical Thinking (medium)
The second question should test the student's ability to think critically based on the goal and their technical level.
For example: "Let's say we have a dataset of 1000 rows and 10 columns, one of the columns is about a person's age. How would you analyze this data, and what would you do with an age entry that is negative? State all steps you can think of."

Third Question: In-depth Technical Knowledge (hard)
The third question should test the student's in-depth technical knowledge about the goal.
For example: "Discuss the difference between supervised and unsupervised learning, and suggest an algorithm for each. Explain step by step how the algorithm works."

All questions should require critical thinking. Each quiz should be at least 2 lines, and each quiz can contain more than 1 question.

IMPORTANT: Format your response as a valid JSON array of 3 strings, where each string is a question. Do not include any Markdown formatting, code blocks, or other text. Only return the raw JSON array.
"#;

const DEFAULT_ANALYSIS_TEMPLATE: &str = r#"
You are a Computer Science expert. The question was:
"{question}"

The student answered:
"{answer}"

The student's technical level is:
"{technical_level}"

The student's goal is:
"{goal}"

Please analyze this answer. Analyze the problem solving skills, critical thinking skills, their knowledge of their goal, and their logic.
Take into consideration the technical level they are in.

Your response should look like this:

Let's check the answer together!

You were able to answer correctly: (enumerate the correct parts of the answer), which shows that you have good skills in (based on correct answers, mention the skills).

However, you missed the following points: (enumerate the wrong parts of the answer), which shows that you need to improve in (based on incorrect answers, mention the skills to improve).

IMPORTANT:
- Respond in clear and concise sentences. Do not make the response long.
- Format the response in plain text without any unnecessary symbols.
- Do NOT include any quotation marks, stars, hashtags, or other Markdown formatting.
- List all items in a simple, readable format.
- When talking about the improvements, start a new line.
"#;

const DEFAULT_STUDY_PLAN_TEMPLATE: &str = r#"
Based on the following student information and AI analysis, create a personalized study plan:

Student Technical Level: {technical_level}
Student Goal: {goal}
AI Analysis: {analysis}

The study plan should address the areas of improvement identified in the AI analysis and include:
1. A list of 3-5 specific topics to focus on
2. Recommended resources (books, online courses, tutorials) for each topic
3. A suggested timeline for completing each topic (e.g., 1 week, 2 weeks)
4. At least one hands-on project idea related to the student's goal

IMPORTANT:
- Format the response in plain text without any unnecessary symbols.
- Do NOT include any quotation marks, hashtags, or other Markdown formatting.
- List all items in a simple, readable format.
"#;

const DEFAULT_CHAT_SYSTEM: &str = r#"
You are an expert in Computer Science, and your name is Code-a-palooza. You will assist computer science students by firstly introducing yourself and saying the following:

"I'm Code-a-palooza, an expert in Computer Science. I am here to help you with any difficulty you're facing in computer science. Let's begin by getting to know you now!"

Next, you should ask the student about their name, major, and what they know in general about computer science.

After that, you need to understand the student's background in computer science and generate a quiz question.

The quiz question should be about the student's background in computer science and a little bit more advanced than what they said about themselves.

Next, you ask the student to analyze the answer.

You should let the student know:

1) How well they did in the quiz
2) What they need to improve
3) What was wrong in their answer
"#;

/// Settings for the language-model API, read from the environment.
#[derive(Clone, Debug)]
pub struct GeminiSettings {
  pub api_key: String,
  pub base_url: String,
  pub text_model: String,
  pub chat_model: String,
  pub embedding_model: String,
  pub timeout: Duration,
}

impl GeminiSettings {
  /// None when GEMINI_API_KEY is unset.
  pub fn from_env() -> Option<Self> {
    let api_key = std::env::var("GEMINI_API_KEY").ok().filter(|k| !k.is_empty())?;
    Some(Self {
      api_key,
      base_url: env_or("GEMINI_BASE_URL", DEFAULT_GEMINI_BASE_URL),
      text_model: env_or("GEMINI_TEXT_MODEL", "gemini-1.5-pro-latest"),
      chat_model: env_or("GEMINI_CHAT_MODEL", "gemini-pro"),
      embedding_model: env_or("GEMINI_EMBEDDING_MODEL", "embedding-001"),
      timeout: upstream_timeout(),
    })
  }
}

/// Settings for the vector-index API, read from the environment.
#[derive(Clone, Debug)]
pub struct PineconeSettings {
  pub api_key: String,
  pub index_host: String,
  pub namespace: String,
  pub timeout: Duration,
}

impl PineconeSettings {
  /// None when PINECONE_API_KEY or PINECONE_INDEX_HOST is unset.
  pub fn from_env() -> Option<Self> {
    let api_key = std::env::var("PINECONE_API_KEY").ok().filter(|k| !k.is_empty())?;
    let index_host = match std::env::var("PINECONE_INDEX_HOST") {
      Ok(h) if !h.is_empty() => h,
      _ => {
        error!(target: "codeapalooza_backend", "PINECONE_API_KEY set without PINECONE_INDEX_HOST; retrieval disabled");
        return None;
      }
    };
    Some(Self {
      api_key,
      index_host: normalize_host(&index_host),
      namespace: env_or("PINECONE_NAMESPACE", "ns1"),
      timeout: upstream_timeout(),
    })
  }
}

/// Pinecone hands out bare hostnames; accept those as well as full URLs.
fn normalize_host(host: &str) -> String {
  let host = host.trim_end_matches('/');
  if host.starts_with("http://") || host.starts_with("https://") {
    host.to_string()
  } else {
    format!("https://{host}")
  }
}

fn env_or(key: &str, default: &str) -> String {
  std::env::var(key).ok().filter(|v| !v.is_empty()).unwrap_or_else(|| default.to_string())
}

fn upstream_timeout() -> Duration {
  let secs = std::env::var("UPSTREAM_TIMEOUT_SECS")
    .ok()
    .and_then(|s| s.parse::<u64>().ok())
    .unwrap_or(DEFAULT_UPSTREAM_TIMEOUT_SECS);
  Duration::from_secs(secs)
}

/// Attempt to load `AgentConfig` from AGENT_CONFIG_PATH. On any parsing/IO error, returns None.
pub fn load_agent_config_from_env() -> Option<AgentConfig> {
  let path = std::env::var("AGENT_CONFIG_PATH").ok()?;
  match std::fs::read_to_string(&path) {
    Ok(s) => match parse_agent_config(&s) {
      Ok(cfg) => {
        info!(target: "codeapalooza_backend", %path, "Loaded agent config (TOML)");
        Some(cfg)
      }
      Err(e) => {
        error!(target: "codeapalooza_backend", %path, error = %e, "Failed to parse TOML config");
        None
      }
    },
    Err(e) => {
      error!(target: "codeapalooza_backend", %path, error = %e, "Failed to read TOML config file");
      None
    }
  }
}

pub fn parse_agent_config(s: &str) -> Result<AgentConfig, toml::de::Error> {
  toml::from_str::<AgentConfig>(s)
}
