use async_trait::async_trait;
use once_cell::sync::Lazy;
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::info;

use super::{article_from_fields, CmsError, ContentSource, LogReceipt};
use crate::model::{ActivationLog, ArticleIn};

/// Fixture entries in delivery-API field shape.
static FIXTURES: Lazy<BTreeMap<&'static str, Value>> = Lazy::new(|| {
    BTreeMap::from([
        (
            "sample-article",
            json!({
                "title": "Sample Marketing Article",
                "body": "This is a sample article body with sufficient length to meet validation requirements. Marketing automation is transforming how businesses engage with prospects and customers across the entire lifecycle.",
                "summary": "Brief overview of marketing automation benefits",
                "campaignTags": ["thought-leadership", "marketer", "awareness"],
                "hasImages": true,
                "altText": "Marketing automation dashboard screenshot",
                "ctaText": "Learn More",
                "ctaUrl": "https://example.com/learn-more"
            }),
        ),
        (
            "getting-started",
            json!({
                "title": "Getting Started with Marketing Automation",
                "body": "Marketing automation helps teams deliver the right message at the right time. This guide walks through connecting your content platform, enriching articles with AI generated metadata and pushing them to campaign lists so every launch reaches the audience it was written for.",
                "campaignTags": ["tutorial", "developer", "awareness"],
                "hasImages": false,
                "ctaText": "Start the tutorial",
                "ctaUrl": "https://example.com/getting-started"
            }),
        ),
        (
            "launch-announcement",
            json!({
                "title": "Getting Started",
                "body": "Our new activation pipeline is live. Read how the product team planned the launch, why we believe content should reach campaign lists the moment it is published, and what comes next for marketers who want their best thinking in front of the right audience.",
                "campaignTags": ["product-launch", "thought-leadership"],
                "hasImages": false
            }),
        ),
        (
            "missing-alt-text",
            json!({
                "title": "Case Study: Scaling Content Operations",
                "body": "A global software company cut its campaign launch time in half by automating content enrichment and list routing. This case study covers the rollout, the metrics that mattered and the lessons learned along the way.",
                "campaignTags": ["case-study", "enterprise", "consideration"],
                "hasImages": true
            }),
        ),
    ])
});

/// In-process content source backed by fixtures. Logs written to it are kept
/// in memory.
#[derive(Debug, Clone, Default)]
pub struct MockSource {
    written: Arc<Mutex<Vec<ActivationLog>>>,
}

impl MockSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Logs acknowledged so far, oldest first.
    pub async fn written(&self) -> Vec<ActivationLog> {
        self.written.lock().await.clone()
    }
}

#[async_trait]
impl ContentSource for MockSource {
    fn name(&self) -> &'static str {
        "mock"
    }

    async fn get_article(&self, entry_id: &str) -> Result<ArticleIn, CmsError> {
        let fields: &Map<String, Value> = FIXTURES
            .get(entry_id)
            .and_then(Value::as_object)
            .ok_or_else(|| CmsError::NotFound(entry_id.to_string()))?;
        article_from_fields(entry_id, fields)
    }

    async fn write_activation_log(&self, log: &ActivationLog) -> Result<LogReceipt, CmsError> {
        let mut written = self.written.lock().await;
        written.push(log.clone());
        info!(entry_id = %log.entry_id, total = written.len(), "activation log kept in memory");
        Ok(LogReceipt {
            destination: "memory".to_string(),
            id: Some(log.activation_id.clone()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validation::validate_article;

    #[tokio::test]
    async fn fixtures_load() {
        let source = MockSource::new();
        let article = source.get_article("getting-started").await.unwrap();
        assert_eq!(article.title, "Getting Started with Marketing Automation");
        assert!(validate_article(&article).is_ok());
        assert!(validate_article(&source.get_article("sample-article").await.unwrap()).is_ok());

        let launch = source.get_article("launch-announcement").await.unwrap();
        assert_eq!(launch.title, "Getting Started");
        assert_eq!(launch.campaign_tags, vec!["product-launch", "thought-leadership"]);
        assert!(!launch.has_images);
        assert!(validate_article(&launch).is_ok());
    }

    #[tokio::test]
    async fn missing_alt_text_fixture_fails_validation() {
        let article = MockSource::new().get_article("missing-alt-text").await.unwrap();
        let err = validate_article(&article).unwrap_err();
        assert_eq!(err.fields().collect::<Vec<_>>(), vec!["alt_text"]);
    }

    #[tokio::test]
    async fn unknown_entry_is_not_found() {
        let err = MockSource::new().get_article("nope").await.unwrap_err();
        assert!(matches!(err, CmsError::NotFound(id) if id == "nope"));
    }
}
