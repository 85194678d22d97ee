//! Router-level tests with counting fakes for the model and the vector index.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::{
    body::{to_bytes, Body},
    http::{header::CONTENT_TYPE, Method, Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use tower::ServiceExt;

use super::build_router;
use crate::config::AgentConfig;
use crate::domain::ChatRole;
use crate::error::UpstreamError;
use crate::gemini::{LanguageModel, ModelKind, Turn};
use crate::logic::NO_VALID_RESPONSE;
use crate::pinecone::{VectorIndex, VectorMatch};
use crate::state::AppState;

const QUIZ_JSON: &str = r#"["What does a data scientist do first?", "How would you clean negative ages?", "Compare supervised and unsupervised learning."]"#;

struct FakeModel {
    quiz_reply: String,
    text_reply: Option<String>,
    chat_reply: String,
    fail: bool,
    generate_calls: AtomicUsize,
    embed_calls: AtomicUsize,
    last_turns: Mutex<Vec<Turn>>,
}

impl FakeModel {
    fn new() -> Self {
        Self {
            quiz_reply: QUIZ_JSON.into(),
            text_reply: Some("Let's check the answer together!".into()),
            chat_reply: "Hello, I'm Code-a-palooza.".into(),
            fail: false,
            generate_calls: AtomicUsize::new(0),
            embed_calls: AtomicUsize::new(0),
            last_turns: Mutex::new(Vec::new()),
        }
    }

    fn calls(&self) -> usize {
        self.generate_calls.load(Ordering::SeqCst) + self.embed_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LanguageModel for FakeModel {
    async fn generate(&self, kind: ModelKind, turns: &[Turn]) -> Result<Option<String>, UpstreamError> {
        self.generate_calls.fetch_add(1, Ordering::SeqCst);
        *self.last_turns.lock().unwrap() = turns.to_vec();
        if self.fail {
            return Err(UpstreamError::Http {
                service: "gemini",
                status: 403,
                message: "key sk-very-secret rejected".into(),
            });
        }
        let is_quiz = turns.iter().any(|t| t.text.contains("format them as a JSON array"));
        Ok(match kind {
            ModelKind::Text if is_quiz => Some(self.quiz_reply.clone()),
            ModelKind::Text => self.text_reply.clone(),
            ModelKind::Chat => Some(self.chat_reply.clone()),
        })
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, UpstreamError> {
        self.embed_calls.fetch_add(1, Ordering::SeqCst);
        Ok(vec![text.len() as f32, 1.0])
    }
}

#[derive(Default)]
struct FakeIndex {
    queries: AtomicUsize,
    last_top_k: AtomicUsize,
}

#[async_trait]
impl VectorIndex for FakeIndex {
    async fn query(&self, _vector: &[f32], top_k: u32) -> Result<Vec<VectorMatch>, UpstreamError> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        self.last_top_k.store(top_k as usize, Ordering::SeqCst);
        Ok(vec![VectorMatch {
            id: "doc-1".into(),
            score: 0.92,
            content: Some("Data cleaning handles invalid values.".into()),
        }])
    }
}

fn app_with(cfg: AgentConfig, model: Option<Arc<FakeModel>>, index: Option<Arc<FakeIndex>>) -> Router {
    let model = model.map(|m| m as Arc<dyn LanguageModel>);
    let index = index.map(|i| i as Arc<dyn VectorIndex>);
    let state = AppState::new(cfg, model, index);
    build_router(Arc::new(state), "./static-test-missing")
}

fn app(model: &Arc<FakeModel>, index: &Arc<FakeIndex>) -> Router {
    app_with(AgentConfig::default(), Some(Arc::clone(model)), Some(Arc::clone(index)))
}

async fn post(app: &Router, uri: &str, body: &str) -> (StatusCode, Option<String>, String) {
    let request = Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header(CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .expect("request should build");
    let response = app.clone().oneshot(request).await.expect("router should respond");
    let status = response.status();
    let content_type = response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(String::from);
    let bytes = to_bytes(response.into_body(), usize::MAX).await.expect("body should read");
    (status, content_type, String::from_utf8(bytes.to_vec()).expect("utf-8 body"))
}

fn quiz_body(level: &str, goal: &str, number: Value) -> String {
    json!([{ "technicalLevel": level, "goal": goal, "questionNumber": number }]).to_string()
}

#[tokio::test]
async fn quiz_questions_come_from_one_cached_set() {
    let model = Arc::new(FakeModel::new());
    let index = Arc::new(FakeIndex::default());
    let app = app(&model, &index);

    let mut seen = Vec::new();
    for n in 1..=3 {
        let (status, content_type, text) = post(&app, "/api/quiz", &quiz_body("beginner", "data scientist", json!(n))).await;
        assert_eq!(status, StatusCode::OK);
        assert!(content_type.unwrap().starts_with("text/plain"));
        assert!(!text.is_empty());
        seen.push(text);
    }
    assert_eq!(seen[0], "What does a data scientist do first?");
    assert_ne!(seen[0], seen[1]);
    assert_ne!(seen[1], seen[2]);
    assert_ne!(seen[0], seen[2]);

    let (_, _, again) = post(&app, "/api/quiz", &quiz_body("beginner", "data scientist", json!(2))).await;
    assert_eq!(again, seen[1]);

    assert_eq!(model.generate_calls.load(Ordering::SeqCst), 1);
    assert_eq!(model.embed_calls.load(Ordering::SeqCst), 1);
    assert_eq!(index.queries.load(Ordering::SeqCst), 1);
    assert_eq!(index.last_top_k.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn quiz_prompt_carries_profile_and_material() {
    let model = Arc::new(FakeModel::new());
    let index = Arc::new(FakeIndex::default());
    let app = app(&model, &index);

    let body = json!([{ "name": "Ada", "technicalLevel": " beginner ", "goal": "data scientist" }]).to_string();
    let (status, _, _) = post(&app, "/api/quiz", &body).await;
    assert_eq!(status, StatusCode::OK);

    let turns = model.last_turns.lock().unwrap().clone();
    assert_eq!(turns.len(), 1);
    assert!(turns[0].text.contains("beginner level and wants to achieve data scientist"));
    assert!(turns[0].text.contains("Content: Data cleaning handles invalid values."));
}

#[tokio::test]
async fn quiz_without_vector_index_skips_embedding() {
    let model = Arc::new(FakeModel::new());
    let app = app_with(AgentConfig::default(), Some(Arc::clone(&model)), None);

    let (status, _, text) = post(&app, "/api/quiz", &quiz_body("beginner", "data scientist", json!(2))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(text, "How would you clean negative ages?");
    assert_eq!(model.embed_calls.load(Ordering::SeqCst), 0);
    assert_eq!(model.generate_calls.load(Ordering::SeqCst), 1);

    let turns = model.last_turns.lock().unwrap().clone();
    assert!(turns[0].text.contains("No relevant material available."));
    assert!(!turns[0].text.contains("Content:"));
}

#[tokio::test]
async fn repeated_quiz_questions_are_rejected_and_not_cached() {
    let model = Arc::new(FakeModel { quiz_reply: r#"["Same?", "Same?", "Same?"]"#.into(), ..FakeModel::new() });
    let index = Arc::new(FakeIndex::default());
    let app = app(&model, &index);

    let body = quiz_body("beginner", "web dev", json!(1));
    let (status, _, text) = post(&app, "/api/quiz", &body).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(serde_json::from_str::<Value>(&text).unwrap()["error"], "Quiz generation failed");

    post(&app, "/api/quiz", &body).await;
    assert_eq!(model.generate_calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn quiz_number_out_of_range_is_rejected_before_generation() {
    let model = Arc::new(FakeModel::new());
    let index = Arc::new(FakeIndex::default());
    let app = app(&model, &index);

    for n in [json!(0), json!(4), json!(-1), json!(1000)] {
        let (status, _, text) = post(&app, "/api/quiz", &quiz_body("beginner", "web dev", n)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(serde_json::from_str::<Value>(&text).unwrap()["error"], "Invalid question number");
    }
    assert_eq!(model.calls(), 0);
    assert_eq!(index.queries.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn quiz_missing_fields_are_client_errors() {
    let model = Arc::new(FakeModel::new());
    let index = Arc::new(FakeIndex::default());
    let app = app(&model, &index);

    let bodies = [
        "[]".to_string(),
        "[{}]".to_string(),
        json!([{ "technicalLevel": "beginner" }]).to_string(),
        json!([{ "technicalLevel": "   ", "goal": "ml" }]).to_string(),
        json!({ "technicalLevel": "beginner", "goal": "ml" }).to_string(),
        json!([{ "technicalLevel": "beginner", "goal": "ml", "questionNumber": "two" }]).to_string(),
        "not json".to_string(),
    ];
    for body in bodies {
        let (status, _, _) = post(&app, "/api/quiz", &body).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "body: {body}");
    }
    assert_eq!(model.calls(), 0);
}

#[tokio::test]
async fn malformed_quiz_output_is_a_server_error_and_not_cached() {
    let model = Arc::new(FakeModel { quiz_reply: "Here are three questions: ...".into(), ..FakeModel::new() });
    let index = Arc::new(FakeIndex::default());
    let app = app(&model, &index);

    for _ in 0..2 {
        let (status, _, text) = post(&app, "/api/quiz", &quiz_body("beginner", "ml", json!(1))).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(serde_json::from_str::<Value>(&text).unwrap()["error"], "Quiz generation failed");
    }
    assert_eq!(model.generate_calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn fenced_quiz_output_is_accepted() {
    let model = Arc::new(FakeModel { quiz_reply: format!("```json\n{QUIZ_JSON}\n```"), ..FakeModel::new() });
    let index = Arc::new(FakeIndex::default());
    let app = app(&model, &index);

    let (status, _, text) = post(&app, "/api/quiz", &quiz_body("beginner", "ml", json!(3))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(text, "Compare supervised and unsupervised learning.");
}

#[tokio::test]
async fn analysis_returns_model_text() {
    let model = Arc::new(FakeModel::new());
    let index = Arc::new(FakeIndex::default());
    let app = app(&model, &index);

    let body = json!({
        "studentInfo": { "technicalLevel": "beginner", "goal": "data scientist" },
        "question": "What is overfitting?",
        "userAnswer": "When the model memorizes the training data."
    });
    let (status, content_type, text) = post(&app, "/api/analysis", &body.to_string()).await;
    assert_eq!(status, StatusCode::OK);
    assert!(content_type.unwrap().starts_with("text/plain"));
    assert_eq!(text, "Let's check the answer together!");

    let turns = model.last_turns.lock().unwrap().clone();
    assert!(turns[0].text.contains("When the model memorizes the training data."));
    assert!(turns[0].text.contains("What is overfitting?"));
    // Grading never touches retrieval.
    assert_eq!(model.embed_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn analysis_without_model_text_returns_sentinel() {
    let model = Arc::new(FakeModel { text_reply: None, ..FakeModel::new() });
    let index = Arc::new(FakeIndex::default());
    let app = app(&model, &index);

    let body = json!({
        "studentInfo": { "technicalLevel": "beginner", "goal": "ml" },
        "question": "q",
        "userAnswer": "a"
    });
    let (status, _, text) = post(&app, "/api/analysis", &body.to_string()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(text, NO_VALID_RESPONSE);
}

#[tokio::test]
async fn analysis_and_plan_validate_before_calling_the_model() {
    let model = Arc::new(FakeModel::new());
    let index = Arc::new(FakeIndex::default());
    let app = app(&model, &index);

    let analysis_bodies = [
        json!({ "question": "q", "userAnswer": "a" }),
        json!({ "studentInfo": { "technicalLevel": "b", "goal": "g" }, "userAnswer": "a" }),
        json!({ "studentInfo": { "technicalLevel": "b", "goal": "g" }, "question": "q" }),
        json!({ "studentInfo": { "goal": "g" }, "question": "q", "userAnswer": "a" }),
    ];
    for body in analysis_bodies {
        let (status, _, _) = post(&app, "/api/analysis", &body.to_string()).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "body: {body}");
    }

    let plan_bodies = [
        json!({ "aiAnalysis": "weak on SQL" }),
        json!({ "studentInfo": { "technicalLevel": "b", "goal": "g" } }),
        json!({ "studentInfo": { "technicalLevel": "b" }, "aiAnalysis": "weak on SQL" }),
    ];
    for body in plan_bodies {
        let (status, _, _) = post(&app, "/api/studyplan", &body.to_string()).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "body: {body}");
    }
    assert_eq!(model.calls(), 0);
}

#[tokio::test]
async fn study_plan_embeds_analysis() {
    let model = Arc::new(FakeModel { text_reply: Some("Week 1: SQL joins".into()), ..FakeModel::new() });
    let index = Arc::new(FakeIndex::default());
    let app = app(&model, &index);

    let body = json!({
        "studentInfo": { "technicalLevel": "intermediate", "goal": "data engineer" },
        "aiAnalysis": "You missed window functions."
    });
    let (status, _, text) = post(&app, "/api/studyplan", &body.to_string()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(text, "Week 1: SQL joins");

    let turns = model.last_turns.lock().unwrap().clone();
    assert!(turns[0].text.contains("AI Analysis: You missed window functions."));
    assert!(turns[0].text.contains("Student Goal: data engineer"));
}

#[tokio::test]
async fn chat_augments_last_message_and_maps_roles() {
    let model = Arc::new(FakeModel::new());
    let index = Arc::new(FakeIndex::default());
    let app = app(&model, &index);

    let body = json!([
        { "role": "assistant", "content": "Welcome! Let's get to know you!" },
        { "role": "user", "content": "I'm Ada, I know Python." }
    ]);
    let (status, content_type, text) = post(&app, "/api/chat", &body.to_string()).await;
    assert_eq!(status, StatusCode::OK);
    assert!(content_type.unwrap().starts_with("text/plain"));
    assert_eq!(text, "Hello, I'm Code-a-palooza.");
    assert_eq!(index.last_top_k.load(Ordering::SeqCst), 1);

    let turns = model.last_turns.lock().unwrap().clone();
    assert_eq!(turns.len(), 3);
    assert!(turns[0].text.contains("your name is Code-a-palooza"));
    assert_eq!(turns[1].role, ChatRole::Assistant);
    assert_eq!(turns[2].role, ChatRole::User);
    assert!(turns[2].text.starts_with("I'm Ada, I know Python.Let's analyze your computer science background!"));
    assert!(turns[2].text.contains("\nContent: Data cleaning handles invalid values.\n"));
}

#[tokio::test]
async fn chat_without_vector_index_reports_no_matches() {
    let model = Arc::new(FakeModel::new());
    let app = app_with(AgentConfig::default(), Some(Arc::clone(&model)), None);

    let body = json!([{ "role": "user", "content": "I know some Java." }]);
    let (status, _, text) = post(&app, "/api/chat", &body.to_string()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(text, "Hello, I'm Code-a-palooza.");
    assert_eq!(model.embed_calls.load(Ordering::SeqCst), 0);

    let turns = model.last_turns.lock().unwrap().clone();
    let last = &turns.last().unwrap().text;
    assert!(last.starts_with("I know some Java.Let's analyze your computer science background!"));
    assert!(last.ends_with("\nNo relevant matches found.\n"));
}

#[tokio::test]
async fn chat_rejects_empty_input() {
    let model = Arc::new(FakeModel::new());
    let index = Arc::new(FakeIndex::default());
    let app = app(&model, &index);

    for body in ["[]", r#"[{"role":"user","content":"  "}]"#, r#"[{"role":"user"}]"#, "{}"] {
        let (status, _, _) = post(&app, "/api/chat", body).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "body: {body}");
    }
    assert_eq!(model.calls(), 0);
}

#[tokio::test]
async fn chat_dedupes_lines_only_when_enabled() {
    let repeated = "Step one\nStep one\nDone".to_string();
    let body = json!([{ "role": "user", "content": "hi" }]).to_string();

    let model = Arc::new(FakeModel { chat_reply: repeated.clone(), ..FakeModel::new() });
    let (_, _, text) = post(&app(&model, &Arc::new(FakeIndex::default())), "/api/chat", &body).await;
    assert_eq!(text, repeated);

    let mut cfg = AgentConfig::default();
    cfg.chat.dedupe_lines = true;
    let model = Arc::new(FakeModel { chat_reply: repeated, ..FakeModel::new() });
    let app = app_with(cfg, Some(model), Some(Arc::new(FakeIndex::default())));
    let (_, _, text) = post(&app, "/api/chat", &body).await;
    assert_eq!(text, "Step one\nDone");
}

#[tokio::test]
async fn upstream_failures_do_not_leak_details() {
    let model = Arc::new(FakeModel { fail: true, ..FakeModel::new() });
    let index = Arc::new(FakeIndex::default());
    let app = app(&model, &index);

    let body = json!({
        "studentInfo": { "technicalLevel": "beginner", "goal": "ml" },
        "aiAnalysis": "needs practice"
    });
    let (status, _, text) = post(&app, "/api/studyplan", &body.to_string()).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(!text.contains("sk-very-secret"));
    assert_eq!(serde_json::from_str::<Value>(&text).unwrap()["error"], "Upstream service error");
}

#[tokio::test]
async fn missing_model_is_a_server_error() {
    let app = app_with(AgentConfig::default(), None, Some(Arc::new(FakeIndex::default())));
    let (status, _, _) = post(&app, "/api/quiz", &quiz_body("beginner", "ml", json!(1))).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
}

#[tokio::test]
async fn health_is_ok() {
    let model = Arc::new(FakeModel::new());
    let app = app(&model, &Arc::new(FakeIndex::default()));
    let request = Request::builder().uri("/api/health").body(Body::empty()).unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert_eq!(serde_json::from_slice::<Value>(&bytes).unwrap(), json!({ "ok": true }));
}
