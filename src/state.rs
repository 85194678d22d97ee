//! Application state: prompts, upstream clients, and the quiz session store.
//!
//! This module owns:
//!   - the prompts table (from TOML or defaults)
//!   - the optional language model and vector index clients
//!   - the quiz store shared by every request
//!
//! A missing model makes every generating endpoint fail with `NotConfigured`;
//! a missing vector index only drops the retrieved material from prompts.

use std::sync::Arc;

use tracing::{error, info, instrument};

use crate::config::{
    load_agent_config_from_env, AgentConfig, ChatCfg, GeminiSettings, PineconeSettings, Prompts,
    RetrievalCfg,
};
use crate::error::{AppError, UpstreamError};
use crate::gemini::{Gemini, LanguageModel};
use crate::pinecone::{Pinecone, VectorIndex};
use crate::store::{InMemoryQuizStore, QuizStore};

#[derive(Clone)]
pub struct AppState {
    pub model: Option<Arc<dyn LanguageModel>>,
    pub index: Option<Arc<dyn VectorIndex>>,
    pub quizzes: Arc<dyn QuizStore>,
    pub prompts: Prompts,
    pub retrieval: RetrievalCfg,
    pub chat: ChatCfg,
}

impl AppState {
    /// Build state from env: load config, init Gemini and Pinecone clients, create the quiz store.
    #[instrument(level = "info", skip_all)]
    pub fn from_env() -> Self {
        let cfg = load_agent_config_from_env().unwrap_or_default();

        let model: Option<Arc<dyn LanguageModel>> = match GeminiSettings::from_env().map(Gemini::new) {
            Some(Ok(g)) => {
                info!(target: "codeapalooza_backend", base_url = %g.base_url, text_model = %g.text_model, chat_model = %g.chat_model, embedding_model = %g.embedding_model, "Gemini enabled.");
                Some(Arc::new(g))
            }
            Some(Err(e)) => {
                error!(target: "codeapalooza_backend", error = %e, "Failed to build Gemini client");
                None
            }
            None => {
                error!(target: "codeapalooza_backend", "Gemini disabled (no GEMINI_API_KEY). Generating endpoints will fail.");
                None
            }
        };

        let index: Option<Arc<dyn VectorIndex>> = match PineconeSettings::from_env().map(Pinecone::new) {
            Some(Ok(p)) => {
                info!(target: "codeapalooza_backend", index_host = %p.index_host, namespace = %p.namespace, "Pinecone enabled.");
                Some(Arc::new(p))
            }
            Some(Err(e)) => {
                error!(target: "codeapalooza_backend", error = %e, "Failed to build Pinecone client");
                None
            }
            None => {
                info!(target: "codeapalooza_backend", "Pinecone disabled. Prompts will carry no retrieved material.");
                None
            }
        };

        Self::new(cfg, model, index)
    }

    /// Assemble state from explicit parts (used by `from_env` and tests).
    pub fn new(
        cfg: AgentConfig,
        model: Option<Arc<dyn LanguageModel>>,
        index: Option<Arc<dyn VectorIndex>>,
    ) -> Self {
        let ttl = cfg.quiz.ttl();
        info!(target: "quiz", ttl_secs = ?ttl.map(|t| t.as_secs()), quiz_top_k = cfg.retrieval.quiz_top_k, chat_top_k = cfg.retrieval.chat_top_k, "Quiz store ready");
        Self {
            model,
            index,
            quizzes: Arc::new(InMemoryQuizStore::new(ttl)),
            prompts: cfg.prompts,
            retrieval: cfg.retrieval,
            chat: cfg.chat,
        }
    }

    pub fn model(&self) -> Result<&Arc<dyn LanguageModel>, AppError> {
        self.model
            .as_ref()
            .ok_or(AppError::Upstream(UpstreamError::NotConfigured("language model")))
    }

    pub fn index(&self) -> Option<&dyn VectorIndex> {
        self.index.as_deref()
    }
}
