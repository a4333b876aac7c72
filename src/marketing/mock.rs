use anyhow::Result;
use async_trait::async_trait;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::time::Duration;
use tracing::info;

use super::MarketingPlatform;
use crate::config;
use crate::model::{ActivationPayload, PlatformResponse};

const KNOWN_LISTS: &[(&str, &str)] = &[
    ("ML_DEMO_001", "Product Launch Prospects"),
    ("ML_DEMO_002", "Thought Leadership Audience"),
    ("ML_DEMO_003", "Developer Community"),
    ("HS_LIST_001", "HubSpot Marketing Qualified Leads"),
    ("HS_LIST_002", "Content Engagement Audience"),
];

/// Tag -> list used when the requested list is unknown.
const TAG_ROUTES: &[(&str, &str)] = &[
    ("product-launch", "ML_DEMO_001"),
    ("thought-leadership", "ML_DEMO_002"),
    ("developer", "ML_DEMO_003"),
];

/// Simulated platform with fixed latency and deterministic list routing.
#[derive(Debug, Clone)]
pub struct MockPlatform {
    latency: Duration,
}

impl MockPlatform {
    pub fn new(latency: Duration) -> Self {
        Self { latency }
    }

    pub fn from_config(cfg: &config::MockPlatform) -> Self {
        Self::new(Duration::from_millis(cfg.latency_ms))
    }
}

fn list_name(id: &str) -> Option<&'static str> {
    KNOWN_LISTS.iter().find(|(k, _)| *k == id).map(|(_, v)| *v)
}

/// Pick the list a payload lands on: a known requested list wins, then the
/// first tag with a route, then the requested id as-is.
pub fn route(requested: &str, tags: &[String]) -> (String, String) {
    if let Some(name) = list_name(requested) {
        return (requested.to_string(), name.to_string());
    }
    let routed = tags.iter().find_map(|tag| {
        TAG_ROUTES
            .iter()
            .find(|(t, _)| *t == tag.as_str())
            .map(|(_, list)| *list)
    });
    match routed.and_then(|id| list_name(id).map(|name| (id, name))) {
        Some((id, name)) => (id.to_string(), name.to_string()),
        None => (requested.to_string(), format!("Unknown List ({requested})")),
    }
}

fn request_id(entry_id: &str, list_id: &str) -> String {
    let mut hasher = DefaultHasher::new();
    entry_id.hash(&mut hasher);
    list_id.hash(&mut hasher);
    format!("mock_request_{}", 1000 + hasher.finish() % 9000)
}

#[async_trait]
impl MarketingPlatform for MockPlatform {
    fn name(&self) -> &'static str {
        "mock"
    }

    async fn add_to_list(&self, payload: &ActivationPayload) -> Result<PlatformResponse> {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        let (list_id, list_name) = route(&payload.list_id, &payload.campaign_tags);
        info!(%list_id, %list_name, contacts = payload.contacts.len(), "mock list push");
        Ok(PlatformResponse {
            request_id: request_id(&payload.entry_id, &list_id),
            success: true,
            list_id,
            list_name: Some(list_name),
            contacts_processed: payload.contacts.len(),
            platform: "mock".to_string(),
            mock: true,
            simulated_latency_ms: Some(self.latency.as_millis() as u64),
        })
    }
}
