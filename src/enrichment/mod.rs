//! AI enrichment providers.
//!
//! Every provider is infallible from the caller's point of view: upstream
//! failures (timeouts, auth, malformed output) are logged and replaced with a
//! deterministic fallback payload carrying `fallback = true` and an `error`.
use anyhow::Result;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::config::{Ai, AiProviderKind};
use crate::model::{AIEnrichmentPayload, ArticleIn};
use crate::validation::truncate_chars;

pub mod local;
pub mod openai;

pub use local::LocalModelProvider;
pub use openai::OpenAiProvider;

pub const MIN_KEYWORDS: usize = 3;
pub const MAX_KEYWORDS: usize = 7;

#[async_trait]
pub trait EnrichmentProvider: Send + Sync {
    fn name(&self) -> &'static str;

    async fn enrich(&self, article: &ArticleIn) -> AIEnrichmentPayload;
}

/// Build the provider selected by configuration.
pub fn build_provider(cfg: &Ai) -> Result<Arc<dyn EnrichmentProvider>> {
    let provider: Arc<dyn EnrichmentProvider> = match cfg.provider {
        AiProviderKind::OpenAi => {
            Arc::new(OpenAiProvider::from_config(&cfg.openai, cfg.meta_description_max)?)
        }
        AiProviderKind::Local => {
            Arc::new(LocalModelProvider::from_config(&cfg.local, cfg.meta_description_max)?)
        }
    };
    Ok(provider)
}

/// Trim, deduplicate (case-insensitively), cap at seven and pad from
/// `defaults` so the result always holds between three and seven keywords.
pub(crate) fn finalize_keywords(raw: Vec<String>, defaults: &[&str]) -> Vec<String> {
    fn push(kw: &str, out: &mut Vec<String>) {
        let kw = kw.trim();
        if kw.is_empty() || out.len() >= MAX_KEYWORDS {
            return;
        }
        if !out.iter().any(|k| k.eq_ignore_ascii_case(kw)) {
            out.push(kw.to_string());
        }
    }

    let mut out: Vec<String> = Vec::new();
    for kw in &raw {
        push(kw, &mut out);
    }
    for kw in defaults {
        if out.len() >= MIN_KEYWORDS {
            break;
        }
        push(kw, &mut out);
    }
    out
}

/// Occurrences of each keyword per hundred body words, two decimals.
pub(crate) fn keyword_density(body: &str, keywords: &[String]) -> BTreeMap<String, f64> {
    let words = body.split_whitespace().count();
    let lower = body.to_lowercase();
    keywords
        .iter()
        .map(|kw| {
            let density = if words == 0 {
                0.0
            } else {
                let hits = lower.matches(&kw.to_lowercase()).count();
                round2(hits as f64 / words as f64 * 100.0)
            };
            (kw.clone(), density)
        })
        .collect()
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

pub(crate) fn tone(professional: f64, confident: f64, action_oriented: f64) -> BTreeMap<String, f64> {
    BTreeMap::from([
        ("professional".to_string(), professional),
        ("confident".to_string(), confident),
        ("action_oriented".to_string(), action_oriented),
    ])
}

/// Fallback payload shared by all providers.
pub(crate) fn fallback_payload(
    provider: &str,
    meta_description: String,
    keywords: &[&str],
    error: String,
    meta_max: usize,
) -> AIEnrichmentPayload {
    AIEnrichmentPayload {
        seo_score: 70,
        readability_score: None,
        suggested_meta_description: truncate_chars(&meta_description, meta_max),
        keywords: finalize_keywords(Vec::new(), keywords),
        keyword_density: BTreeMap::new(),
        tone_analysis: BTreeMap::new(),
        content_gaps: Vec::new(),
        error: Some(error),
        fallback: true,
        provider: Some(provider.to_string()),
    }
}

/// Leading slice of the body used as prompt context.
pub(crate) fn excerpt(body: &str, max: usize) -> String {
    truncate_chars(body, max)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kws(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn keywords_are_padded_to_three() {
        let out = finalize_keywords(kws(&["seo"]), &["marketing", "automation", "strategy"]);
        assert_eq!(out, vec!["seo", "marketing", "automation"]);
    }

    #[test]
    fn keywords_are_capped_and_deduplicated() {
        let raw = kws(&["a1", "A1", "b2", " ", "c3", "d4", "e5", "f6", "g7", "h8"]);
        let out = finalize_keywords(raw, &["x"]);
        assert_eq!(out, vec!["a1", "b2", "c3", "d4", "e5", "f6", "g7"]);
    }

    #[test]
    fn density_is_per_hundred_words() {
        let body = "Marketing automation makes marketing simple";
        let d = keyword_density(body, &kws(&["marketing", "absent"]));
        assert_eq!(d["marketing"], 40.0);
        assert_eq!(d["absent"], 0.0);
        assert_eq!(keyword_density("", &kws(&["x"]))["x"], 0.0);
    }

    #[test]
    fn fallback_respects_meta_bound() {
        let long = "word ".repeat(100);
        let p = fallback_payload("openai", long, &["a", "b", "c"], "boom".into(), 160);
        assert!(p.fallback);
        assert_eq!(p.suggested_meta_description.chars().count(), 160);
        assert_eq!(p.keywords.len(), 3);
        assert_eq!(p.error.as_deref(), Some("boom"));
    }
}
