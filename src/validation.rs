//! Inbound and outbound record validation.
//!
//! Inbound validation is the only fatal check in the pipeline: it runs before
//! any external call and reports every rejected field at once.
use reqwest::Url;
use std::fmt;

use crate::model::{ArticleIn, FieldError};
use crate::vocabulary;

pub const TITLE_MAX: usize = 70;
pub const BODY_MIN: usize = 100;
pub const SUMMARY_MAX: usize = 160;
pub const CTA_TEXT_MAX: usize = 80;

/// All field errors found in one record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationErrors {
    pub errors: Vec<FieldError>,
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .errors
            .iter()
            .map(|e| format!("{}: {}", e.field, e.reason))
            .collect();
        write!(f, "validation failed: {}", parts.join("; "))
    }
}

impl std::error::Error for ValidationErrors {}

impl ValidationErrors {
    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.errors.iter().map(|e| e.field.as_str())
    }
}

/// Validate an inbound article against field constraints and the controlled
/// vocabulary.
pub fn validate_article(article: &ArticleIn) -> Result<(), ValidationErrors> {
    let mut errors = Vec::new();

    let title_len = article.title.chars().count();
    if article.title.trim().is_empty() {
        errors.push(FieldError::new("title", "title must be non-empty"));
    } else if title_len > TITLE_MAX {
        errors.push(FieldError::new(
            "title",
            format!("title must be at most {TITLE_MAX} characters (got {title_len})"),
        ));
    }

    let body_len = article.body.chars().count();
    if body_len < BODY_MIN {
        errors.push(FieldError::new(
            "body",
            format!("body must be at least {BODY_MIN} characters (got {body_len})"),
        ));
    }

    if let Some(summary) = &article.summary {
        let len = summary.chars().count();
        if len > SUMMARY_MAX {
            errors.push(FieldError::new(
                "summary",
                format!("summary must be at most {SUMMARY_MAX} characters (got {len})"),
            ));
        }
    }

    if article.campaign_tags.is_empty() {
        errors.push(FieldError::new(
            "campaign_tags",
            "at least one campaign tag is required",
        ));
    } else if let Some(err) = tag_error(&article.campaign_tags) {
        errors.push(err);
    }

    if article.has_images && article.alt_text.as_deref().map_or(true, |t| t.trim().is_empty()) {
        errors.push(FieldError::new(
            "alt_text",
            "alt text is required when the article contains images",
        ));
    }

    if let Some(text) = &article.cta_text {
        let len = text.chars().count();
        if len > CTA_TEXT_MAX {
            errors.push(FieldError::new(
                "cta_text",
                format!("CTA text must be at most {CTA_TEXT_MAX} characters (got {len})"),
            ));
        }
    }

    if let Some(url) = article.cta_url.as_deref().filter(|u| !u.is_empty()) {
        if !is_http_url(url) {
            errors.push(FieldError::new(
                "cta_url",
                "CTA URL must be a valid HTTP/HTTPS URL",
            ));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(ValidationErrors { errors })
    }
}

fn tag_error(tags: &[String]) -> Option<FieldError> {
    let invalid = vocabulary::invalid_tags(tags);
    if invalid.is_empty() {
        return None;
    }
    let mut reason = format!("invalid tags: {}", invalid.join(", "));
    let hints: Vec<String> = invalid
        .iter()
        .filter_map(|tag| {
            let s = vocabulary::suggestions(tag);
            (!s.is_empty()).then(|| format!("'{}' -> [{}]", tag, s.join(", ")))
        })
        .collect();
    if !hints.is_empty() {
        reason.push_str(&format!("; suggestions: {}", hints.join(", ")));
    }
    Some(FieldError::new("campaign_tags", reason))
}

/// Invalid inbound tags, exactly as they appear in a validation failure.
pub fn rejected_tags(article: &ArticleIn) -> Vec<String> {
    vocabulary::invalid_tags(&article.campaign_tags)
}

fn is_http_url(raw: &str) -> bool {
    if !(raw.starts_with("http://") || raw.starts_with("https://")) {
        return false;
    }
    Url::parse(raw).map(|u| u.host_str().is_some()).unwrap_or(false)
}

/// Truncate to at most `max` characters without splitting a code point.
pub fn truncate_chars(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => s[..idx].to_string(),
        None => s.to_string(),
    }
}
