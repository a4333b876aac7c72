//! Controlled vocabulary of campaign tags.
//!
//! The set is closed: inbound content carrying any other tag is rejected,
//! while the outbound mapping drops unknown tags and reports them.
use once_cell::sync::Lazy;
use std::collections::BTreeSet;

const CONTENT_TYPES: &[&str] = &[
    "product-launch",
    "thought-leadership",
    "case-study",
    "webinar",
    "ebook",
    "release-notes",
    "tutorial",
    "whitepaper",
    "demo",
    "blog-post",
];

const AUDIENCES: &[&str] = &[
    "developer",
    "marketer",
    "enterprise",
    "startup",
    "technical-decision-maker",
    "content-creator",
    "product-manager",
    "executive",
];

const FUNNEL_STAGES: &[&str] = &["awareness", "consideration", "decision", "retention", "advocacy"];

const CAMPAIGN_TYPES: &[&str] = &[
    "demand-gen",
    "brand-awareness",
    "product-adoption",
    "customer-success",
    "lead-nurture",
    "competitive-intelligence",
];

static VOCABULARY: Lazy<BTreeSet<&'static str>> = Lazy::new(|| {
    CONTENT_TYPES
        .iter()
        .chain(AUDIENCES)
        .chain(FUNNEL_STAGES)
        .chain(CAMPAIGN_TYPES)
        .copied()
        .collect()
});

const SUGGESTION_CUTOFF: f64 = 0.6;
const MAX_SUGGESTIONS: usize = 3;

/// Every permissible tag, sorted.
pub fn all() -> impl Iterator<Item = &'static str> {
    VOCABULARY.iter().copied()
}

pub fn contains(tag: &str) -> bool {
    VOCABULARY.contains(tag)
}

/// Tags not in the vocabulary, sorted and deduplicated.
pub fn invalid_tags<'a>(tags: impl IntoIterator<Item = &'a String>) -> Vec<String> {
    tags.into_iter()
        .filter(|t| !contains(t))
        .cloned()
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// Up to three vocabulary tags similar to `tag`, best match first.
pub fn suggestions(tag: &str) -> Vec<&'static str> {
    let mut scored: Vec<(f64, &'static str)> = VOCABULARY
        .iter()
        .map(|candidate| (similarity(tag, candidate), *candidate))
        .filter(|(score, _)| *score >= SUGGESTION_CUTOFF)
        .collect();
    scored.sort_by(|a, b| b.0.total_cmp(&a.0).then_with(|| a.1.cmp(b.1)));
    scored.into_iter().take(MAX_SUGGESTIONS).map(|(_, t)| t).collect()
}

/// Result of mapping free-form tags onto the vocabulary.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TagMapping {
    pub mapped: Vec<String>,
    pub dropped: Vec<String>,
}

/// Normalize tags and keep only vocabulary members, preserving order and
/// removing duplicates. Nothing here fails; unknown tags land in `dropped`.
pub fn map_tags<'a>(tags: impl IntoIterator<Item = &'a String>) -> TagMapping {
    let mut out = TagMapping::default();
    for raw in tags {
        let tag = raw.trim().to_lowercase();
        if contains(&tag) {
            if !out.mapped.contains(&tag) {
                out.mapped.push(tag);
            }
        } else if !out.dropped.contains(raw) {
            out.dropped.push(raw.clone());
        }
    }
    out
}

/// Normalized edit-distance similarity in `0.0..=1.0`.
fn similarity(a: &str, b: &str) -> f64 {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let longest = a.len().max(b.len());
    if longest == 0 {
        return 1.0;
    }
    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut cur = vec![0; b.len() + 1];
    for (i, ca) in a.iter().enumerate() {
        cur[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let cost = usize::from(ca != cb);
            cur[j + 1] = (prev[j] + cost).min(prev[j + 1] + 1).min(cur[j] + 1);
        }
        std::mem::swap(&mut prev, &mut cur);
    }
    1.0 - prev[b.len()] as f64 / longest as f64
}
