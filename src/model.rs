use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

fn default_content_type() -> String {
    "article".to_string()
}

fn default_true() -> bool {
    true
}

/// Inbound content record as fetched from the CMS.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ArticleIn {
    pub title: String,
    pub body: String,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub campaign_tags: Vec<String>,
    #[serde(default)]
    pub alt_text: Option<String>,
    #[serde(default)]
    pub has_images: bool,
    #[serde(default)]
    pub cta_text: Option<String>,
    #[serde(default)]
    pub cta_url: Option<String>,
    #[serde(default = "default_content_type")]
    pub content_type: String,
}

/// Output of the enrichment step. Providers always produce one of these,
/// falling back to deterministic values when the upstream model fails.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AIEnrichmentPayload {
    pub seo_score: u8,
    #[serde(default)]
    pub readability_score: Option<u8>,
    pub suggested_meta_description: String,
    pub keywords: Vec<String>,
    #[serde(default)]
    pub keyword_density: BTreeMap<String, f64>,
    /// Brand-voice category -> score in `0.0..=1.0`.
    #[serde(default)]
    pub tone_analysis: BTreeMap<String, f64>,
    #[serde(default)]
    pub content_gaps: Vec<String>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub fallback: bool,
    #[serde(default)]
    pub provider: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Cta {
    pub text: Option<String>,
    pub url: Option<String>,
}

/// Outbound record sent to the marketing platform.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ActivationPayload {
    pub entry_id: String,
    pub title: String,
    pub meta_description: String,
    pub campaign_tags: Vec<String>,
    pub dropped_tags: Vec<String>,
    pub brand_voice: BTreeMap<String, f64>,
    pub cta: Option<Cta>,
    pub list_id: String,
    pub contacts: Vec<String>,
    pub timestamp: DateTime<Utc>,
}

/// Normalized result of a marketing platform list push.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PlatformResponse {
    pub request_id: String,
    pub success: bool,
    pub list_id: String,
    pub list_name: Option<String>,
    pub contacts_processed: usize,
    pub platform: String,
    #[serde(default)]
    pub mock: bool,
    #[serde(default)]
    pub simulated_latency_ms: Option<u64>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ActivationStatus {
    Completed,
    PartiallyCompleted,
    Failed,
}

impl ActivationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActivationStatus::Completed => "completed",
            ActivationStatus::PartiallyCompleted => "partially_completed",
            ActivationStatus::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Validating,
    Enriching,
    Publishing,
    Logging,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Validating => "validating",
            Stage::Enriching => "enriching",
            Stage::Publishing => "publishing",
            Stage::Logging => "logging",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StageOutcome {
    Ok,
    Degraded,
    Skipped,
    Failed,
}

/// One pipeline stage as recorded in the audit log.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Transition {
    pub stage: Stage,
    pub outcome: StageOutcome,
    #[serde(default)]
    pub detail: Option<String>,
    pub at: DateTime<Utc>,
}

/// A single rejected field.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FieldError {
    pub field: String,
    pub reason: String,
}

impl FieldError {
    pub fn new(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ValidationReport {
    pub passed: bool,
    #[serde(default)]
    pub errors: Vec<FieldError>,
    #[serde(default)]
    pub dropped_tags: Vec<String>,
    #[serde(default)]
    pub advisories: Vec<String>,
}

/// Audit record written exactly once per activation attempt.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ActivationLog {
    pub activation_id: String,
    pub entry_id: String,
    pub timestamp: DateTime<Utc>,
    pub status: ActivationStatus,
    #[serde(default)]
    pub ai_outputs: Option<AIEnrichmentPayload>,
    pub validation: ValidationReport,
    #[serde(default)]
    pub platform_response: Option<PlatformResponse>,
    #[serde(default)]
    pub platform_error: Option<String>,
    #[serde(default)]
    pub brand_voice: BTreeMap<String, f64>,
    pub transitions: Vec<Transition>,
    #[serde(default)]
    pub errors: Vec<String>,
    pub processing_time: f64,
}

/// Body of `POST /activate`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ActivationRequest {
    pub entry_id: String,
    #[serde(alias = "list_id")]
    pub marketo_list_id: String,
    #[serde(default = "default_true")]
    pub enrichment_enabled: bool,
}

/// Response body of `POST /activate`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ActivationResult {
    pub activation_id: String,
    pub entry_id: String,
    pub status: ActivationStatus,
    pub processing_time: f64,
    pub enrichment_data: Option<AIEnrichmentPayload>,
    pub marketing_response: Option<PlatformResponse>,
    pub errors: Vec<String>,
    pub timestamp: DateTime<Utc>,
}

impl From<&ActivationLog> for ActivationResult {
    fn from(log: &ActivationLog) -> Self {
        Self {
            activation_id: log.activation_id.clone(),
            entry_id: log.entry_id.clone(),
            status: log.status,
            processing_time: log.processing_time,
            enrichment_data: log.ai_outputs.clone(),
            marketing_response: log.platform_response.clone(),
            errors: log.errors.clone(),
            timestamp: log.timestamp,
        }
    }
}
