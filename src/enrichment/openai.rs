use anyhow::{anyhow, ensure, Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use tracing::{debug, instrument, warn};

use super::{excerpt, fallback_payload, finalize_keywords, keyword_density, tone, EnrichmentProvider};
use crate::config::OpenAi;
use crate::model::{AIEnrichmentPayload, ArticleIn};
use crate::validation::truncate_chars;

const PROVIDER: &str = "openai";
const FALLBACK_KEYWORDS: &[&str] = &["marketing", "automation", "strategy"];
const PROMPT_CONTEXT_CHARS: usize = 1000;

const META_PROMPT: &str = "Generate a concise meta description (max 160 characters) for this marketing article. Focus on key benefits and include a subtle call to action.";
const KEYWORDS_PROMPT: &str = "Extract 3-7 relevant SEO keywords from this marketing content. Return only the keywords as a comma-separated list.";

/// Hosted chat-completion provider (OpenAI or any compatible endpoint).
#[derive(Clone)]
pub struct OpenAiProvider {
    http: Client,
    base_url: String,
    api_key: String,
    model: String,
    meta_max: usize,
}

impl fmt::Debug for OpenAiProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenAiProvider")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("api_key", &"<redacted>")
            .finish_non_exhaustive()
    }
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: Message,
}

#[derive(Deserialize)]
struct Message {
    #[serde(default)]
    content: Option<String>,
}

impl OpenAiProvider {
    pub fn from_config(cfg: &OpenAi, meta_max: usize) -> Result<Self> {
        let http = Client::builder()
            .user_agent("content-activator/0.1")
            .timeout(Duration::from_secs(cfg.timeout_seconds))
            .no_proxy()
            .build()
            .context("failed to build OpenAI HTTP client")?;
        Ok(Self {
            http,
            base_url: cfg.base_url.trim_end_matches('/').to_string(),
            api_key: cfg.api_key.clone(),
            model: cfg.model.clone(),
            meta_max,
        })
    }

    pub fn build_request(
        &self,
        system: &str,
        user: &str,
        max_tokens: u32,
        temperature: f32,
    ) -> Result<reqwest::Request> {
        let body = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage { role: "system", content: system },
                ChatMessage { role: "user", content: user },
            ],
            max_tokens,
            temperature,
        };
        self.http
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .build()
            .context("failed to build chat completion request")
    }

    async fn complete(&self, system: &str, user: &str, max_tokens: u32, temperature: f32) -> Result<String> {
        let request = self.build_request(system, user, max_tokens, temperature)?;
        debug!(url = %request.url(), "sending chat completion request");
        let res = self
            .http
            .execute(request)
            .await
            .context("failed to reach chat completion endpoint")?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(anyhow!("chat completion error {}: {}", status, body));
        }
        let payload: ChatResponse = res.json().await.context("invalid chat completion response")?;
        let content = payload
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| anyhow!("chat completion returned no content"))?;
        Ok(content.trim().to_string())
    }

    async fn try_enrich(&self, article: &ArticleIn) -> Result<AIEnrichmentPayload> {
        let context = format!(
            "Title: {}\n\nContent: {}",
            article.title,
            excerpt(&article.body, PROMPT_CONTEXT_CHARS)
        );
        let summary = self.complete(META_PROMPT, &context, 50, 0.7).await?;
        ensure!(!summary.is_empty(), "empty meta description from model");
        let keywords_text = self.complete(KEYWORDS_PROMPT, &context, 30, 0.3).await?;

        let raw: Vec<String> = keywords_text.split(',').map(|k| k.trim().to_string()).collect();
        let keywords = finalize_keywords(raw, FALLBACK_KEYWORDS);
        Ok(AIEnrichmentPayload {
            seo_score: 85,
            readability_score: Some(78),
            suggested_meta_description: truncate_chars(&summary, self.meta_max),
            keyword_density: keyword_density(&article.body, &keywords),
            keywords,
            tone_analysis: tone(0.9, 0.8, 0.85),
            content_gaps: vec![
                "Consider adding more specific metrics".to_string(),
                "Include customer success examples".to_string(),
                "Add clearer call-to-action positioning".to_string(),
            ],
            error: None,
            fallback: false,
            provider: Some(PROVIDER.to_string()),
        })
    }

    fn fallback(&self, article: &ArticleIn, err: &anyhow::Error) -> AIEnrichmentPayload {
        fallback_payload(
            PROVIDER,
            format!(
                "Learn about {} and discover actionable insights for your marketing strategy.",
                article.title.to_lowercase()
            ),
            FALLBACK_KEYWORDS,
            format!("OpenAI API error: {err:#}"),
            self.meta_max,
        )
    }
}

#[async_trait]
impl EnrichmentProvider for OpenAiProvider {
    fn name(&self) -> &'static str {
        PROVIDER
    }

    #[instrument(skip_all, fields(title = %article.title))]
    async fn enrich(&self, article: &ArticleIn) -> AIEnrichmentPayload {
        match self.try_enrich(article).await {
            Ok(payload) => payload,
            Err(err) => {
                warn!(error = %format!("{err:#}"), "openai enrichment failed; using fallback");
                self.fallback(article, &err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider(base_url: &str) -> OpenAiProvider {
        let cfg = OpenAi {
            api_key: "sk-test".into(),
            base_url: base_url.into(),
            model: "gpt-4o-mini".into(),
            timeout_seconds: 2,
        };
        OpenAiProvider::from_config(&cfg, 160).unwrap()
    }

    #[test]
    fn build_request_sets_headers_and_body() {
        let p = provider("https://api.openai.com/v1/");
        let request = p.build_request("sys", "user", 50, 0.7).unwrap();
        assert_eq!(request.method(), reqwest::Method::POST);
        assert_eq!(request.url().as_str(), "https://api.openai.com/v1/chat/completions");
        assert_eq!(
            request
                .headers()
                .get("Authorization")
                .and_then(|h| h.to_str().ok())
                .unwrap(),
            "Bearer sk-test"
        );
        let body: serde_json::Value =
            serde_json::from_slice(request.body().and_then(|b| b.as_bytes()).unwrap()).unwrap();
        assert_eq!(body["model"], "gpt-4o-mini");
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][1]["content"], "user");
        assert_eq!(body["max_tokens"], 50);
    }

    #[test]
    fn debug_redacts_key() {
        let p = provider("https://api.openai.com/v1");
        let dbg = format!("{:?}", p);
        assert!(!dbg.contains("sk-test"));
        assert!(dbg.contains("<redacted>"));
    }

    #[tokio::test]
    async fn unreachable_endpoint_yields_fallback() {
        let p = provider("http://127.0.0.1:9/v1");
        let article = ArticleIn {
            title: "Getting Started".into(),
            body: "b".repeat(120),
            summary: None,
            campaign_tags: vec!["tutorial".into()],
            alt_text: None,
            has_images: false,
            cta_text: None,
            cta_url: None,
            content_type: "article".into(),
        };
        let payload = p.enrich(&article).await;
        assert!(payload.fallback);
        assert!(payload.error.as_deref().unwrap().starts_with("OpenAI API error"));
        assert_eq!(
            payload.suggested_meta_description,
            "Learn about getting started and discover actionable insights for your marketing strategy."
        );
        assert_eq!(payload.keywords, vec!["marketing", "automation", "strategy"]);
    }
}
