//! Code-a-palooza · CS tutoring backend
//!
//! - Axum HTTP API: onboarding chat, quiz, answer analysis, study plan
//! - Gemini for generation and embeddings, Pinecone for retrieval
//! - Static UI fallback (STATIC_DIR/index.html)
//!
//! Important env variables:
//!   PORT                   : u16 (default 3000)
//!   GEMINI_API_KEY         : enables the language model (required for every generating endpoint)
//!   GEMINI_BASE_URL        : default "https://generativelanguage.googleapis.com/v1beta"
//!   GEMINI_TEXT_MODEL      : default "gemini-1.5-pro-latest"
//!   GEMINI_CHAT_MODEL      : default "gemini-pro"
//!   GEMINI_EMBEDDING_MODEL : default "embedding-001"
//!   PINECONE_API_KEY       : enables retrieval (with PINECONE_INDEX_HOST)
//!   PINECONE_INDEX_HOST    : data-plane host of the index
//!   PINECONE_NAMESPACE     : default "ns1"
//!   UPSTREAM_TIMEOUT_SECS  : default 60
//!   AGENT_CONFIG_PATH      : path to TOML config (prompts, retrieval, quiz cache, chat)
//!   STATIC_DIR             : default "./static"
//!   LOG_LEVEL              : tracing filter, e.g. "debug" or full directives
//!   LOG_FORMAT             : "pretty" (default) or "json"

mod config;
mod domain;
mod error;
mod gemini;
mod logic;
mod pinecone;
mod prompt;
mod protocol;
mod quiz;
mod retrieval;
mod routes;
mod state;
mod store;
mod telemetry;
mod util;

use std::{net::SocketAddr, sync::Arc};
use tokio::net::TcpListener;
use tracing::info;

use crate::routes::build_router;
use crate::state::AppState;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
  telemetry::init_tracing();

  // Shared application state (quiz store, Gemini/Pinecone clients, prompts).
  let state = Arc::new(AppState::from_env());

  let static_dir = std::env::var("STATIC_DIR").unwrap_or_else(|_| "./static".into());
  let app = build_router(state, &static_dir);

  let addr: SocketAddr = std::env::var("PORT")
    .ok()
    .and_then(|p| p.parse::<u16>().ok())
    .map(|port| SocketAddr::from(([0, 0, 0, 0], port)))
    .unwrap_or_else(|| SocketAddr::from(([0, 0, 0, 0], 3000)));

  let listener = TcpListener::bind(addr).await?;
  info!(target: "codeapalooza_backend", %addr, %static_dir, "HTTP server listening");
  axum::serve(listener, app)
    .with_graceful_shutdown(shutdown_signal())
    .await?;
  Ok(())
}

async fn shutdown_signal() {
  if let Err(e) = tokio::signal::ctrl_c().await {
    tracing::error!(target: "codeapalooza_backend", error = %e, "Failed to listen for shutdown signal");
    std::future::pending::<()>().await;
  }
  info!(target: "codeapalooza_backend", "Shutdown signal received");
}
