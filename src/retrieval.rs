//! Semantic retrieval: embed a query, ask the vector index for neighbours, and
//! format what comes back as prompt material.

use tracing::{debug, instrument, warn};

use crate::error::UpstreamError;
use crate::gemini::LanguageModel;
use crate::pinecone::{VectorIndex, VectorMatch};

/// Top-K lookup for `text`. Returns None when no vector index is configured,
/// in which case the embedding call is skipped as well.
#[instrument(level = "info", skip(model, index, text), fields(text_len = text.len(), has_index = index.is_some()))]
pub async fn retrieve(
  model: &dyn LanguageModel,
  index: Option<&dyn VectorIndex>,
  text: &str,
  top_k: u32,
) -> Result<Option<Vec<VectorMatch>>, UpstreamError> {
  let Some(index) = index else {
    warn!(target: "codeapalooza_backend", "Vector index not configured; continuing without retrieved material");
    return Ok(None);
  };
  let vector = model.embed(text).await?;
  let matches = index.query(&vector, top_k).await?;
  if let Some(best) = matches.first() {
    debug!(target: "codeapalooza_backend", hits = matches.len(), best_id = %best.id, best_score = best.score, "Retrieved material");
  }
  Ok(Some(matches))
}

/// Material block spliced into the quiz-generation prompt.
pub fn quiz_material(matches: Option<&[VectorMatch]>) -> String {
  match matches {
    None => "No relevant material available.".into(),
    Some(matches) => {
      let mut out = String::from("Here's some material related to your goal:\n");
      for m in matches {
        out.push_str(&format!("\nContent: {}\n", m.content.as_deref().unwrap_or("No content")));
      }
      out
    }
  }
}

/// Material appended to the latest chat message, after `header`.
pub fn chat_material(header: &str, matches: Option<&[VectorMatch]>) -> String {
  let mut out = header.to_string();
  match matches {
    Some(matches) if !matches.is_empty() => {
      for m in matches {
        out.push_str(&format!("\nContent: {}\n", m.content.as_deref().unwrap_or("No content provided")));
      }
    }
    _ => out.push_str("\nNo relevant matches found.\n"),
  }
  out
}
