//! Content sources: where articles are read from and where activation logs
//! can be written back to.
use async_trait::async_trait;
use serde::Serialize;
use serde_json::{Map, Value};
use std::sync::Arc;
use thiserror::Error;

use crate::config::{Cms, SourceKind};
use crate::model::{ActivationLog, ArticleIn};

pub mod contentful;
pub mod mock;

pub use contentful::ContentfulClient;
pub use mock::MockSource;

#[derive(Debug, Error)]
pub enum CmsError {
    #[error("content entry '{0}' not found")]
    NotFound(String),
    #[error("content entry '{entry_id}' is malformed: {reason}")]
    Malformed { entry_id: String, reason: String },
    #[error(transparent)]
    Upstream(#[from] anyhow::Error),
}

/// Acknowledgement of a log written to the content source.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct LogReceipt {
    pub destination: String,
    pub id: Option<String>,
}

#[async_trait]
pub trait ContentSource: Send + Sync {
    fn name(&self) -> &'static str;

    async fn get_article(&self, entry_id: &str) -> Result<ArticleIn, CmsError>;

    async fn write_activation_log(&self, log: &ActivationLog) -> Result<LogReceipt, CmsError>;
}

/// Build the content source selected by configuration.
pub fn build_source(cfg: &Cms) -> anyhow::Result<Arc<dyn ContentSource>> {
    let source: Arc<dyn ContentSource> = match cfg.source {
        SourceKind::Mock => Arc::new(MockSource::new()),
        SourceKind::Contentful => Arc::new(ContentfulClient::from_config(&cfg.contentful)?),
    };
    Ok(source)
}

/// First present, non-null field among the given spellings.
fn field<'a>(fields: &'a Map<String, Value>, names: &[&str]) -> Option<&'a Value> {
    names
        .iter()
        .filter_map(|n| fields.get(*n))
        .find(|v| !v.is_null())
}

/// Flatten a field to text. Rich-text documents are reduced to the
/// concatenation of their text nodes, paragraphs separated by a blank line.
pub(crate) fn plain_text(value: &Value) -> String {
    fn walk(node: &Value, out: &mut String) {
        match node {
            Value::String(s) => out.push_str(s),
            Value::Object(obj) => {
                if let Some(Value::String(text)) = obj.get("value") {
                    out.push_str(text);
                }
                if let Some(Value::Array(children)) = obj.get("content") {
                    for child in children {
                        walk(child, out);
                    }
                }
                if obj.get("nodeType").and_then(Value::as_str) == Some("paragraph") {
                    out.push_str("\n\n");
                }
            }
            Value::Array(items) => items.iter().for_each(|i| walk(i, out)),
            _ => {}
        }
    }
    let mut out = String::new();
    walk(value, &mut out);
    out.trim().to_string()
}

fn optional_text(fields: &Map<String, Value>, names: &[&str]) -> Option<String> {
    field(fields, names)
        .map(plain_text)
        .filter(|s| !s.is_empty())
}

/// Map CMS entry fields onto an article. Both camelCase and snake_case
/// field names are accepted; type mismatches are reported as `Malformed`.
pub(crate) fn article_from_fields(
    entry_id: &str,
    fields: &Map<String, Value>,
) -> Result<ArticleIn, CmsError> {
    let malformed = |reason: &str| CmsError::Malformed {
        entry_id: entry_id.to_string(),
        reason: reason.to_string(),
    };

    let campaign_tags = match field(fields, &["campaignTags", "campaign_tags"]) {
        None => Vec::new(),
        Some(Value::Array(items)) => items
            .iter()
            .map(|t| t.as_str().map(str::to_string))
            .collect::<Option<Vec<_>>>()
            .ok_or_else(|| malformed("campaign tags must be strings"))?,
        Some(Value::String(s)) => s.split(',').map(|t| t.trim().to_string()).collect(),
        Some(_) => return Err(malformed("campaign tags must be a list")),
    };
    let has_images = match field(fields, &["hasImages", "has_images"]) {
        None => false,
        Some(v) => v.as_bool().ok_or_else(|| malformed("hasImages must be a boolean"))?,
    };

    Ok(ArticleIn {
        title: field(fields, &["title"]).map(plain_text).unwrap_or_default(),
        body: field(fields, &["body"]).map(plain_text).unwrap_or_default(),
        summary: optional_text(fields, &["summary", "aiSummary", "ai_summary"]),
        campaign_tags,
        alt_text: optional_text(fields, &["altText", "alt_text"]),
        has_images,
        cta_text: optional_text(fields, &["ctaText", "cta_text"]),
        cta_url: optional_text(fields, &["ctaUrl", "cta_url"]),
        content_type: optional_text(fields, &["contentType", "content_type"])
            .unwrap_or_else(|| "article".to_string()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn fields(v: Value) -> Map<String, Value> {
        v.as_object().cloned().unwrap()
    }

    #[test]
    fn camel_and_snake_case_are_accepted() {
        let camel = fields(json!({
            "title": "T",
            "body": "B",
            "campaignTags": ["webinar"],
            "hasImages": true,
            "altText": "alt",
            "ctaUrl": "https://example.com"
        }));
        let snake = fields(json!({
            "title": "T",
            "body": "B",
            "campaign_tags": ["webinar"],
            "has_images": true,
            "alt_text": "alt",
            "cta_url": "https://example.com"
        }));
        let a = article_from_fields("e", &camel).unwrap();
        let b = article_from_fields("e", &snake).unwrap();
        assert_eq!(a, b);
        assert!(a.has_images);
        assert_eq!(a.content_type, "article");
    }

    #[test]
    fn ai_summary_maps_to_summary() {
        let f = fields(json!({"title": "T", "body": "B", "ai_summary": "short"}));
        assert_eq!(article_from_fields("e", &f).unwrap().summary.as_deref(), Some("short"));
    }

    #[test]
    fn rich_text_body_is_flattened() {
        let f = fields(json!({
            "title": "T",
            "body": {
                "nodeType": "document",
                "content": [
                    {"nodeType": "paragraph", "content": [{"nodeType": "text", "value": "Hello "}, {"nodeType": "text", "value": "world."}]},
                    {"nodeType": "paragraph", "content": [{"nodeType": "text", "value": "Second."}]}
                ]
            }
        }));
        assert_eq!(article_from_fields("e", &f).unwrap().body, "Hello world.\n\nSecond.");
    }

    #[test]
    fn wrong_types_are_malformed() {
        let f = fields(json!({"title": "T", "hasImages": "yes"}));
        assert!(matches!(
            article_from_fields("e", &f),
            Err(CmsError::Malformed { .. })
        ));
        let f = fields(json!({"title": "T", "campaignTags": [1, 2]}));
        assert!(matches!(
            article_from_fields("e", &f),
            Err(CmsError::Malformed { .. })
        ));
    }
}
