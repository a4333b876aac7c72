//! Marketing platform adapters.
//!
//! Every adapter pushes the configured audience contacts for one activation
//! onto a named list and reports what the platform processed.
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde::Serialize;
use reqwest::Url;
use std::sync::Arc;

use crate::config::{Marketing, PlatformKind};
use crate::model::{ActivationPayload, PlatformResponse};

pub mod hubspot;
pub mod marketo;
pub mod mock;

pub use hubspot::HubSpotClient;
pub use marketo::MarketoClient;
pub use mock::MockPlatform;

#[async_trait]
pub trait MarketingPlatform: Send + Sync {
    fn name(&self) -> &'static str;

    async fn add_to_list(&self, payload: &ActivationPayload) -> Result<PlatformResponse>;
}

/// `base` with `segments` appended. Each segment is percent-encoded on its
/// own, so ids cannot add path levels, a query or a fragment.
pub(crate) fn endpoint(base: &Url, segments: &[&str]) -> Result<Url> {
    let mut url = base.clone();
    url.path_segments_mut()
        .map_err(|_| anyhow!("base URL {base} cannot carry a path"))?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}

/// Build the platform selected by configuration.
pub fn build_platform(cfg: &Marketing) -> Result<Arc<dyn MarketingPlatform>> {
    let platform: Arc<dyn MarketingPlatform> = match cfg.platform {
        PlatformKind::Mock => Arc::new(MockPlatform::from_config(&cfg.mock)),
        PlatformKind::Marketo => Arc::new(MarketoClient::from_config(&cfg.marketo)?),
        PlatformKind::HubSpot => Arc::new(HubSpotClient::from_config(&cfg.hubspot)?),
    };
    Ok(platform)
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct PlatformDetails {
    pub name: &'static str,
    pub description: &'static str,
    pub setup_complexity: &'static str,
    pub api_docs: &'static str,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct PlatformInfo {
    pub current_platform: &'static str,
    pub platform_details: PlatformDetails,
    pub available_platforms: Vec<&'static str>,
}

fn details(kind: PlatformKind) -> PlatformDetails {
    match kind {
        PlatformKind::Marketo => PlatformDetails {
            name: "Marketo",
            description: "Enterprise marketing automation platform",
            setup_complexity: "High (requires sandbox approval)",
            api_docs: "https://developers.marketo.com/rest-api/",
        },
        PlatformKind::HubSpot => PlatformDetails {
            name: "HubSpot",
            description: "Accessible marketing automation with free tier",
            setup_complexity: "Low (free developer account)",
            api_docs: "https://developers.hubspot.com/docs/api/overview",
        },
        PlatformKind::Mock => PlatformDetails {
            name: "Mock Service",
            description: "Development/testing service with simulated responses",
            setup_complexity: "None (no external dependencies)",
            api_docs: "Built-in mock implementation",
        },
    }
}

/// Describe the configured platform and the alternatives.
pub fn platform_info(kind: PlatformKind) -> PlatformInfo {
    PlatformInfo {
        current_platform: kind.as_str(),
        platform_details: details(kind),
        available_platforms: [PlatformKind::Marketo, PlatformKind::HubSpot, PlatformKind::Mock]
            .iter()
            .map(PlatformKind::as_str)
            .collect(),
    }
}
