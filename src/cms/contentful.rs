use anyhow::{anyhow, Context};
use async_trait::async_trait;
use reqwest::{Client, StatusCode, Url};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::fmt;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

use super::{article_from_fields, CmsError, ContentSource, LogReceipt};
use crate::config::Contentful;
use crate::model::{ActivationLog, ArticleIn};

const TIMEOUT: Duration = Duration::from_secs(15);
const MANAGEMENT_MEDIA_TYPE: &str = "application/vnd.contentful.management.v1+json";

/// Contentful client: Delivery API for reads, Management API for log writes.
#[derive(Clone)]
pub struct ContentfulClient {
    http: Client,
    delivery_base: Url,
    management_base: Url,
    space_id: String,
    environment: String,
    delivery_token: String,
    management_token: String,
    locale: String,
    log_content_type: String,
}

impl fmt::Debug for ContentfulClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContentfulClient")
            .field("space_id", &self.space_id)
            .field("environment", &self.environment)
            .field("delivery_base", &self.delivery_base)
            .finish_non_exhaustive()
    }
}

#[derive(Deserialize)]
struct Sys {
    id: String,
}

#[derive(Deserialize)]
struct Entry {
    sys: Sys,
    #[serde(default)]
    fields: Map<String, Value>,
}

fn base(raw: &str) -> anyhow::Result<Url> {
    Url::parse(&format!("{}/", raw.trim_end_matches('/')))
        .with_context(|| format!("invalid Contentful base URL: {raw}"))
}

impl ContentfulClient {
    pub fn from_config(cfg: &Contentful) -> anyhow::Result<Self> {
        let http = Client::builder()
            .user_agent("content-activator/0.1")
            .timeout(TIMEOUT)
            .no_proxy()
            .build()
            .context("failed to build Contentful HTTP client")?;
        Ok(Self {
            http,
            delivery_base: base(&cfg.delivery_base_url)?,
            management_base: base(&cfg.management_base_url)?,
            space_id: cfg.space_id.clone(),
            environment: cfg.environment.clone(),
            delivery_token: cfg.delivery_token.clone(),
            management_token: cfg.management_token.clone(),
            locale: cfg.locale.clone(),
            log_content_type: cfg.log_content_type.clone(),
        })
    }

    /// `{base}/spaces/{space}/environments/{env}/entries[/{entry_id}]`, every
    /// part pushed as its own percent-encoded segment.
    fn entries_url(&self, base: &Url, entry_id: Option<&str>) -> anyhow::Result<Url> {
        let mut url = base.clone();
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|_| anyhow!("Contentful base URL {base} cannot carry a path"))?;
            segments.pop_if_empty().extend([
                "spaces",
                self.space_id.as_str(),
                "environments",
                self.environment.as_str(),
                "entries",
            ]);
            if let Some(id) = entry_id {
                segments.push(id);
            }
        }
        Ok(url)
    }

    pub fn build_entry_request(&self, entry_id: &str) -> anyhow::Result<reqwest::Request> {
        let mut url = self.entries_url(&self.delivery_base, Some(entry_id))?;
        url.query_pairs_mut().append_pair("locale", &self.locale);
        self.http
            .get(url)
            .bearer_auth(&self.delivery_token)
            .build()
            .context("failed to build Contentful delivery request")
    }

    pub fn build_log_request(&self, log: &ActivationLog) -> anyhow::Result<reqwest::Request> {
        let url = self.entries_url(&self.management_base, None)?;
        self.http
            .post(url)
            .bearer_auth(&self.management_token)
            .header("Content-Type", MANAGEMENT_MEDIA_TYPE)
            .header("X-Contentful-Content-Type", &self.log_content_type)
            .json(&self.log_entry_body(log)?)
            .build()
            .context("failed to build Contentful management request")
    }

    /// Management API entries carry every field keyed by locale.
    fn log_entry_body(&self, log: &ActivationLog) -> anyhow::Result<Value> {
        let record = serde_json::to_value(log).context("failed to serialize activation log")?;
        let localized = |v: Value| json!({ self.locale.as_str(): v });
        Ok(json!({
            "fields": {
                "activationId": localized(json!(log.activation_id)),
                "entryId": localized(json!(log.entry_id)),
                "status": localized(json!(log.status.as_str())),
                "timestamp": localized(json!(log.timestamp.to_rfc3339())),
                "processingTime": localized(json!(log.processing_time)),
                "record": localized(record),
            }
        }))
    }
}

#[async_trait]
impl ContentSource for ContentfulClient {
    fn name(&self) -> &'static str {
        "contentful"
    }

    #[instrument(skip(self))]
    async fn get_article(&self, entry_id: &str) -> Result<ArticleIn, CmsError> {
        let request = self.build_entry_request(entry_id)?;
        debug!(url = %request.url(), "fetching Contentful entry");
        let res = self
            .http
            .execute(request)
            .await
            .context("failed to reach Contentful delivery API")?;
        match res.status() {
            StatusCode::NOT_FOUND => return Err(CmsError::NotFound(entry_id.to_string())),
            status if !status.is_success() => {
                let body = res.text().await.unwrap_or_default();
                warn!(%status, "Contentful delivery error");
                return Err(anyhow!("contentful error {}: {}", status, body).into());
            }
            _ => {}
        }
        let entry: Entry = res
            .json()
            .await
            .context("invalid Contentful entry JSON")?;
        article_from_fields(&entry.sys.id, &entry.fields)
    }

    #[instrument(skip_all, fields(entry_id = %log.entry_id))]
    async fn write_activation_log(&self, log: &ActivationLog) -> Result<LogReceipt, CmsError> {
        if self.management_token.trim().is_empty() {
            return Err(anyhow!("no Contentful management token configured").into());
        }
        let res = self
            .http
            .execute(self.build_log_request(log)?)
            .await
            .context("failed to reach Contentful management API")?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(anyhow!("contentful log write error {}: {}", status, body).into());
        }
        let created: Entry = res
            .json()
            .await
            .context("invalid Contentful management response")?;
        info!(cms_entry = %created.sys.id, "activation log written to Contentful");
        Ok(LogReceipt {
            destination: "contentful".to_string(),
            id: Some(created.sys.id),
        })
    }
}
