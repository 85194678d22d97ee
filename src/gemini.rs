//! Minimal Gemini client for our use-cases, behind the `LanguageModel` trait.
//!
//! We only call `generateContent` (plain text out) and `embedContent`.
//! Calls are instrumented and log model names, latencies, and response sizes (not contents).
//!
//! NOTE: the API key travels in the `x-goog-api-key` header so it never shows up in URLs or logs.

use std::time::Instant;

use async_trait::async_trait;
use reqwest::header::{CONTENT_TYPE, USER_AGENT};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use crate::config::GeminiSettings;
use crate::domain::ChatRole;
use crate::error::UpstreamError;

const SERVICE: &str = "gemini";

/// Which configured model a generation call should use.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ModelKind {
  /// Quiz, analysis and study plan.
  Text,
  /// Conversational onboarding.
  Chat,
}

/// One turn of a generation request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Turn {
  pub role: ChatRole,
  pub text: String,
}

impl Turn {
  pub fn user(text: impl Into<String>) -> Self {
    Self { role: ChatRole::User, text: text.into() }
  }
}

#[async_trait]
pub trait LanguageModel: Send + Sync {
  /// Generate a reply to the transcript. `Ok(None)` means the model answered without any text.
  async fn generate(&self, kind: ModelKind, turns: &[Turn]) -> Result<Option<String>, UpstreamError>;

  /// Embed `text` into a vector for similarity search.
  async fn embed(&self, text: &str) -> Result<Vec<f32>, UpstreamError>;

  /// Single-turn convenience wrapper around `generate`.
  async fn generate_text(&self, kind: ModelKind, prompt: &str) -> Result<Option<String>, UpstreamError> {
    self.generate(kind, &[Turn::user(prompt)]).await
  }
}

#[derive(Clone)]
pub struct Gemini {
  client: reqwest::Client,
  api_key: String,
  pub base_url: String,
  pub text_model: String,
  pub chat_model: String,
  pub embedding_model: String,
}

impl Gemini {
  pub fn new(settings: GeminiSettings) -> Result<Self, UpstreamError> {
    let client = reqwest::Client::builder()
      .timeout(settings.timeout)
      .build()
      .map_err(|e| UpstreamError::from_reqwest(SERVICE, e))?;

    Ok(Self {
      client,
      api_key: settings.api_key,
      base_url: settings.base_url.trim_end_matches('/').to_string(),
      text_model: settings.text_model,
      chat_model: settings.chat_model,
      embedding_model: settings.embedding_model,
    })
  }

  fn model_for(&self, kind: ModelKind) -> &str {
    match kind {
      ModelKind::Text => &self.text_model,
      ModelKind::Chat => &self.chat_model,
    }
  }

  async fn post<B: Serialize, T: for<'a> Deserialize<'a>>(&self, url: &str, body: &B) -> Result<T, UpstreamError> {
    let res = self.client.post(url)
      .header(USER_AGENT, "codeapalooza-backend/0.1")
      .header(CONTENT_TYPE, "application/json")
      .header("x-goog-api-key", &self.api_key)
      .json(body)
      .send()
      .await
      .map_err(|e| UpstreamError::from_reqwest(SERVICE, e))?;

    let status = res.status();
    if !status.is_success() {
      let body = res.text().await.unwrap_or_default();
      return Err(UpstreamError::http(SERVICE, status.as_u16(), extract_gemini_error(&body), &body));
    }

    res.json::<T>().await.map_err(|e| UpstreamError::Decode { service: SERVICE, message: e.to_string() })
  }
}

#[async_trait]
impl LanguageModel for Gemini {
  #[instrument(level = "info", skip(self, turns), fields(model = %self.model_for(kind), turns = turns.len()))]
  async fn generate(&self, kind: ModelKind, turns: &[Turn]) -> Result<Option<String>, UpstreamError> {
    let model = self.model_for(kind);
    let url = format!("{}/models/{}:generateContent", self.base_url, model);
    let req = GenerateContentRequest {
      contents: turns
        .iter()
        .map(|t| Content {
          role: match t.role {
            ChatRole::User => "user",
            ChatRole::Assistant => "model",
          },
          parts: vec![PartReq { text: &t.text }],
        })
        .collect(),
    };

    let start = Instant::now();
    let body: GenerateContentResponse = self.post(&url, &req).await?;
    let elapsed = start.elapsed();

    if let Some(usage) = &body.usage_metadata {
      info!(?elapsed, prompt_tokens = ?usage.prompt_token_count, candidates_tokens = ?usage.candidates_token_count, total_tokens = ?usage.total_token_count, "Gemini usage");
    }

    let text = body.first_text();
    debug!(?elapsed, response_len = text.as_ref().map(|t| t.len()).unwrap_or(0), "Gemini response received");
    Ok(text)
  }

  #[instrument(level = "info", skip(self, text), fields(model = %self.embedding_model, text_len = text.len()))]
  async fn embed(&self, text: &str) -> Result<Vec<f32>, UpstreamError> {
    let url = format!("{}/models/{}:embedContent", self.base_url, self.embedding_model);
    let req = EmbedContentRequest {
      model: format!("models/{}", self.embedding_model),
      content: EmbedContent { parts: vec![PartReq { text }] },
    };

    let body: EmbedContentResponse = self.post(&url, &req).await?;
    let values = body.embedding.map(|e| e.values).unwrap_or_default();
    if values.is_empty() {
      return Err(UpstreamError::EmptyEmbedding);
    }
    debug!(dims = values.len(), "Embedding received");
    Ok(values)
  }
}

// --- Gemini DTOs ---

#[derive(Serialize)]
struct GenerateContentRequest<'a> {
  contents: Vec<Content<'a>>,
}
#[derive(Serialize)]
struct Content<'a> { role: &'a str, parts: Vec<PartReq<'a>> }
#[derive(Serialize)]
struct PartReq<'a> { text: &'a str }

#[derive(Serialize)]
struct EmbedContentRequest<'a> {
  model: String,
  content: EmbedContent<'a>,
}
#[derive(Serialize)]
struct EmbedContent<'a> { parts: Vec<PartReq<'a>> }

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
  #[serde(default)] candidates: Vec<Candidate>,
  #[serde(default)] usage_metadata: Option<UsageMetadata>,
}

impl GenerateContentResponse {
  /// Text of the first candidate: its content parts joined, else the legacy `output` field.
  fn first_text(&self) -> Option<String> {
    let candidate = self.candidates.first()?;
    let from_parts: String = candidate
      .content
      .iter()
      .flat_map(|c| c.parts.iter())
      .filter_map(|p| p.text.as_deref())
      .collect();
    if !from_parts.trim().is_empty() {
      return Some(from_parts);
    }
    candidate.output.clone().filter(|o| !o.trim().is_empty())
  }
}

#[derive(Deserialize)]
struct Candidate {
  #[serde(default)] content: Option<CandidateContent>,
  #[serde(default)] output: Option<String>,
}
#[derive(Deserialize)]
struct CandidateContent { #[serde(default)] parts: Vec<PartResp> }
#[derive(Deserialize)]
struct PartResp { #[serde(default)] text: Option<String> }
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct UsageMetadata {
  #[serde(default)] prompt_token_count: Option<u32>,
  #[serde(default)] candidates_token_count: Option<u32>,
  #[serde(default)] total_token_count: Option<u32>,
}

#[derive(Deserialize)]
struct EmbedContentResponse {
  #[serde(default)] embedding: Option<Embedding>,
}
#[derive(Deserialize)]
struct Embedding { #[serde(default)] values: Vec<f32> }

/// Try to extract a clean error message from a Gemini error body.
fn extract_gemini_error(body: &str) -> Option<String> {
  #[derive(Deserialize)]
  struct EWrap { error: EObj }
  #[derive(Deserialize)]
  struct EObj { message: String }
  serde_json::from_str::<EWrap>(body).ok().map(|w| w.error.message)
}
