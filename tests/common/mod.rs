#![allow(dead_code)]

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use axum::{routing::post, Json, Router};
use content_activator::activation::Activator;
use content_activator::audit::FileLogStore;
use content_activator::cms::{CmsError, ContentSource, LogReceipt, MockSource};
use content_activator::enrichment::EnrichmentProvider;
use content_activator::marketing::MarketingPlatform;
use content_activator::model::{
    AIEnrichmentPayload, ActivationLog, ActivationPayload, ArticleIn, PlatformResponse,
};
use serde_json::{json, Value};
use std::collections::{BTreeMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::Mutex;

/// Serve `app` on an ephemeral local port and return its base URL.
pub async fn serve(app: Router) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

/// OpenAI-compatible chat endpoint answering the meta and keyword prompts.
pub async fn spawn_fake_openai() -> String {
    async fn chat(Json(body): Json<Value>) -> Json<Value> {
        let system = body["messages"][0]["content"].as_str().unwrap_or_default();
        let content = if system.contains("keywords") {
            "marketing automation, content strategy, campaign lists, developer onboarding"
        } else {
            "Connect your CMS to campaign lists and let AI metadata do the heavy lifting. Start automating today."
        };
        Json(json!({
            "id": "chatcmpl-test",
            "choices": [{ "index": 0, "message": { "role": "assistant", "content": content } }]
        }))
    }
    let base = serve(Router::new().route("/v1/chat/completions", post(chat))).await;
    format!("{base}/v1")
}

pub fn enrichment_ok() -> AIEnrichmentPayload {
    AIEnrichmentPayload {
        seo_score: 85,
        readability_score: Some(78),
        suggested_meta_description: "A practical guide to marketing automation.".into(),
        keywords: vec!["marketing".into(), "automation".into(), "guide".into()],
        keyword_density: BTreeMap::new(),
        tone_analysis: BTreeMap::from([("professional".to_string(), 0.9)]),
        content_gaps: vec![],
        error: None,
        fallback: false,
        provider: Some("stub".into()),
    }
}

pub fn enrichment_fallback() -> AIEnrichmentPayload {
    AIEnrichmentPayload {
        seo_score: 70,
        readability_score: None,
        suggested_meta_description: "Learn about getting started.".into(),
        keywords: vec!["marketing".into(), "automation".into(), "strategy".into()],
        keyword_density: BTreeMap::new(),
        tone_analysis: BTreeMap::new(),
        content_gaps: vec![],
        error: Some("OpenAI API error: timed out".into()),
        fallback: true,
        provider: Some("stub".into()),
    }
}

#[derive(Clone)]
pub struct StubEnrichment {
    payload: AIEnrichmentPayload,
    calls: Arc<Mutex<Vec<String>>>,
}

impl StubEnrichment {
    pub fn new(payload: AIEnrichmentPayload) -> Self {
        Self {
            payload,
            calls: Arc::default(),
        }
    }

    pub async fn calls(&self) -> Vec<String> {
        self.calls.lock().await.clone()
    }
}

#[async_trait]
impl EnrichmentProvider for StubEnrichment {
    fn name(&self) -> &'static str {
        "stub"
    }

    async fn enrich(&self, article: &ArticleIn) -> AIEnrichmentPayload {
        self.calls.lock().await.push(article.title.clone());
        self.payload.clone()
    }
}

#[derive(Clone, Default)]
pub struct RecordingPlatform {
    responses: Arc<Mutex<VecDeque<Result<PlatformResponse>>>>,
    calls: Arc<Mutex<Vec<ActivationPayload>>>,
}

impl RecordingPlatform {
    pub fn with_responses(responses: Vec<Result<PlatformResponse>>) -> Self {
        Self {
            responses: Arc::new(Mutex::new(VecDeque::from(responses))),
            ..Default::default()
        }
    }

    pub fn failing(message: &str) -> Self {
        Self::with_responses(vec![Err(anyhow!(message.to_string()))])
    }

    pub async fn calls(&self) -> Vec<ActivationPayload> {
        self.calls.lock().await.clone()
    }
}

#[async_trait]
impl MarketingPlatform for RecordingPlatform {
    fn name(&self) -> &'static str {
        "recording"
    }

    async fn add_to_list(&self, payload: &ActivationPayload) -> Result<PlatformResponse> {
        self.calls.lock().await.push(payload.clone());
        let next = self.responses.lock().await.pop_front();
        next.unwrap_or_else(|| {
            Ok(PlatformResponse {
                request_id: "req-1".into(),
                success: true,
                list_id: payload.list_id.clone(),
                list_name: None,
                contacts_processed: payload.contacts.len(),
                platform: "recording".into(),
                mock: true,
                simulated_latency_ms: None,
            })
        })
    }
}

/// Fixture reads, but every log write is rejected.
#[derive(Clone, Default)]
pub struct ReadOnlySource {
    inner: MockSource,
}

#[async_trait]
impl ContentSource for ReadOnlySource {
    fn name(&self) -> &'static str {
        "read-only"
    }

    async fn get_article(&self, entry_id: &str) -> Result<ArticleIn, CmsError> {
        self.inner.get_article(entry_id).await
    }

    async fn write_activation_log(&self, _log: &ActivationLog) -> Result<LogReceipt, CmsError> {
        Err(anyhow!("management API unavailable").into())
    }
}

pub fn log_path(dir: &Path) -> PathBuf {
    dir.join("activation_logs.jsonl")
}

pub fn activator(
    dir: &Path,
    source: Arc<dyn ContentSource>,
    enrichment: Arc<dyn EnrichmentProvider>,
    platform: Arc<dyn MarketingPlatform>,
) -> Activator {
    Activator::new(
        source,
        enrichment,
        platform,
        Arc::new(FileLogStore::new(log_path(dir))),
    )
    .with_contacts(vec!["demo@example.com".into(), "ops@example.com".into()])
}

/// Every record in the JSON-lines file, oldest first.
pub fn read_logs(dir: &Path) -> Vec<ActivationLog> {
    match std::fs::read_to_string(log_path(dir)) {
        Ok(raw) => raw
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect(),
        Err(_) => Vec::new(),
    }
}
