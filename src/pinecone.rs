//! Pinecone data-plane client behind the `VectorIndex` trait.
//!
//! Only `POST /query` is used: top-K nearest neighbours with metadata. Each indexed
//! record carries its source text in `metadata.content`.

use async_trait::async_trait;
use reqwest::header::{CONTENT_TYPE, USER_AGENT};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::config::PineconeSettings;
use crate::error::UpstreamError;

const SERVICE: &str = "pinecone";
const API_VERSION: &str = "2024-07";

/// One nearest-neighbour hit.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct VectorMatch {
  pub id: String,
  pub score: f32,
  /// `metadata.content`, when the record has one.
  pub content: Option<String>,
}

#[async_trait]
pub trait VectorIndex: Send + Sync {
  async fn query(&self, vector: &[f32], top_k: u32) -> Result<Vec<VectorMatch>, UpstreamError>;
}

#[derive(Clone)]
pub struct Pinecone {
  client: reqwest::Client,
  api_key: String,
  pub index_host: String,
  pub namespace: String,
}

impl Pinecone {
  pub fn new(settings: PineconeSettings) -> Result<Self, UpstreamError> {
    let client = reqwest::Client::builder()
      .timeout(settings.timeout)
      .build()
      .map_err(|e| UpstreamError::from_reqwest(SERVICE, e))?;
    Ok(Self {
      client,
      api_key: settings.api_key,
      index_host: settings.index_host,
      namespace: settings.namespace,
    })
  }
}

#[async_trait]
impl VectorIndex for Pinecone {
  #[instrument(level = "info", skip(self, vector), fields(dims = vector.len(), namespace = %self.namespace))]
  async fn query(&self, vector: &[f32], top_k: u32) -> Result<Vec<VectorMatch>, UpstreamError> {
    let url = format!("{}/query", self.index_host);
    let req = QueryRequest {
      namespace: &self.namespace,
      vector,
      top_k,
      include_metadata: true,
    };

    let res = self.client.post(&url)
      .header(USER_AGENT, "codeapalooza-backend/0.1")
      .header(CONTENT_TYPE, "application/json")
      .header("Api-Key", &self.api_key)
      .header("X-Pinecone-API-Version", API_VERSION)
      .json(&req)
      .send()
      .await
      .map_err(|e| UpstreamError::from_reqwest(SERVICE, e))?;

    let status = res.status();
    if !status.is_success() {
      let body = res.text().await.unwrap_or_default();
      return Err(UpstreamError::http(SERVICE, status.as_u16(), extract_pinecone_error(&body), &body));
    }

    let body: QueryResponse = res
      .json()
      .await
      .map_err(|e| UpstreamError::Decode { service: SERVICE, message: e.to_string() })?;

    let matches: Vec<VectorMatch> = body
      .matches
      .into_iter()
      .map(|m| VectorMatch {
        id: m.id,
        score: m.score,
        content: m.metadata.and_then(|md| md.content),
      })
      .collect();
    debug!(hits = matches.len(), "Vector query done");
    Ok(matches)
  }
}

// --- Pinecone DTOs ---

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct QueryRequest<'a> {
  namespace: &'a str,
  vector: &'a [f32],
  top_k: u32,
  include_metadata: bool,
}

#[derive(Deserialize)]
struct QueryResponse {
  #[serde(default)] matches: Vec<MatchResp>,
}
#[derive(Deserialize)]
struct MatchResp {
  #[serde(default)] id: String,
  #[serde(default)] score: f32,
  #[serde(default)] metadata: Option<Metadata>,
}
#[derive(Deserialize)]
struct Metadata {
  #[serde(default)] content: Option<String>,
}

/// Pinecone errors come as `{"code": .., "message": ..}` or `{"error": {"message": ..}}`.
fn extract_pinecone_error(body: &str) -> Option<String> {
  #[derive(Deserialize)]
  struct Flat { message: String }
  #[derive(Deserialize)]
  struct Wrapped { error: Flat }
  serde_json::from_str::<Wrapped>(body)
    .map(|w| w.error.message)
    .or_else(|_| serde_json::from_str::<Flat>(body).map(|f| f.message))
    .ok()
}
