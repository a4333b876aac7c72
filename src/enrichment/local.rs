use anyhow::{anyhow, ensure, Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, instrument, warn};

use super::{excerpt, fallback_payload, finalize_keywords, keyword_density, tone, EnrichmentProvider};
use crate::config::Local;
use crate::model::{AIEnrichmentPayload, ArticleIn};
use crate::validation::truncate_chars;

const PROVIDER: &str = "ollama";
const FALLBACK_KEYWORDS: &[&str] = &["local", "model", "fallback"];
const DEFAULT_KEYWORDS: &[&str] = &["marketing", "content", "automation"];
const PROMPT_CONTEXT_CHARS: usize = 500;

/// Local inference server speaking the Ollama `/api/generate` protocol.
#[derive(Debug, Clone)]
pub struct LocalModelProvider {
    http: Client,
    base_url: String,
    model: String,
    meta_max: usize,
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    response: String,
}

impl LocalModelProvider {
    pub fn from_config(cfg: &Local, meta_max: usize) -> Result<Self> {
        let http = Client::builder()
            .user_agent("content-activator/0.1")
            .timeout(Duration::from_secs(cfg.timeout_seconds))
            .no_proxy()
            .build()
            .context("failed to build local model HTTP client")?;
        Ok(Self {
            http,
            base_url: cfg.base_url.trim_end_matches('/').to_string(),
            model: cfg.model.clone(),
            meta_max,
        })
    }

    async fn generate(&self, prompt: &str) -> Result<String> {
        let url = format!("{}/api/generate", self.base_url);
        debug!(%url, model = %self.model, "sending generate request");
        let res = self
            .http
            .post(&url)
            .json(&GenerateRequest {
                model: &self.model,
                prompt,
                stream: false,
            })
            .send()
            .await
            .context("failed to reach local model server")?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(anyhow!("local model error {}: {}", status, body));
        }
        let payload: GenerateResponse = res.json().await.context("invalid local model response")?;
        Ok(payload.response.trim().to_string())
    }

    async fn try_enrich(&self, article: &ArticleIn) -> Result<AIEnrichmentPayload> {
        let context = excerpt(&article.body, PROMPT_CONTEXT_CHARS);
        let summary_prompt = format!(
            "Generate a concise SEO meta description (max 160 characters) for this article: Title: \"{}\" Content: \"{}\"",
            article.title, context
        );
        let keywords_prompt = format!(
            "Extract 5 SEO keywords from this text: \"{}\" Return only the keywords separated by commas.",
            context
        );

        let summary = clean_summary(&self.generate(&summary_prompt).await?);
        ensure!(!summary.is_empty(), "empty meta description from local model");
        let raw = parse_keywords(&self.generate(&keywords_prompt).await?);
        let keywords = finalize_keywords(raw, DEFAULT_KEYWORDS);

        Ok(AIEnrichmentPayload {
            seo_score: 80,
            readability_score: Some(75),
            suggested_meta_description: truncate_chars(&summary, self.meta_max),
            keyword_density: keyword_density(&article.body, &keywords),
            keywords,
            tone_analysis: tone(0.8, 0.75, 0.7),
            content_gaps: vec![
                "Generated by local Ollama model".to_string(),
                format!("Model: {}", self.model),
            ],
            error: None,
            fallback: false,
            provider: Some(PROVIDER.to_string()),
        })
    }
}

/// Models like to answer "Here is a description: ...". Keep what follows the
/// first colon and drop surrounding quotes.
fn clean_summary(text: &str) -> String {
    let text = match text.split_once(':') {
        Some((_, rest)) => rest.trim(),
        None => text.trim(),
    };
    text.trim_matches('"').trim_matches('\'').trim().to_string()
}

fn parse_keywords(text: &str) -> Vec<String> {
    let text = match text.split_once(':') {
        Some((_, rest)) => rest.trim(),
        None => text.trim(),
    };
    text.split(',')
        .map(|kw| kw.trim().to_lowercase())
        .filter(|kw| kw.chars().count() > 2)
        .collect()
}

#[async_trait]
impl EnrichmentProvider for LocalModelProvider {
    fn name(&self) -> &'static str {
        PROVIDER
    }

    #[instrument(skip_all, fields(title = %article.title, model = %self.model))]
    async fn enrich(&self, article: &ArticleIn) -> AIEnrichmentPayload {
        match self.try_enrich(article).await {
            Ok(payload) => payload,
            Err(err) => {
                warn!(error = %format!("{err:#}"), "local model enrichment failed; using fallback");
                fallback_payload(
                    PROVIDER,
                    format!(
                        "Learn about {} with our comprehensive guide and expert insights.",
                        article.title.to_lowercase()
                    ),
                    FALLBACK_KEYWORDS,
                    format!("Ollama error: {err:#}"),
                    self.meta_max,
                )
            }
        }
    }
}
