use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use reqwest::{Client, Method, StatusCode, Url};
use serde::Deserialize;
use serde_json::{json, Value};
use std::fmt;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

use super::{endpoint, MarketingPlatform};
use crate::config::HubSpot;
use crate::model::{ActivationPayload, PlatformResponse};

const TIMEOUT: Duration = Duration::from_secs(30);

/// HubSpot CRM client authenticated with a private-app access token.
#[derive(Clone)]
pub struct HubSpotClient {
    http: Client,
    base_url: Url,
    token: String,
}

impl fmt::Debug for HubSpotClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HubSpotClient")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

#[derive(Deserialize)]
struct ContactResponse {
    id: String,
}

#[derive(Deserialize)]
struct SearchResponse {
    #[serde(default)]
    results: Vec<ContactResponse>,
}

impl HubSpotClient {
    pub fn from_config(cfg: &HubSpot) -> Result<Self> {
        let base_url = Url::parse(&format!("{}/", cfg.base_url.trim_end_matches('/')))
            .with_context(|| format!("invalid HubSpot base URL: {}", cfg.base_url))?;
        let http = Client::builder()
            .user_agent("content-activator/0.1")
            .timeout(TIMEOUT)
            .no_proxy()
            .build()
            .context("failed to build HubSpot HTTP client")?;
        Ok(Self {
            http,
            base_url,
            token: cfg.access_token.clone(),
        })
    }

    pub fn build_request(&self, method: Method, path: &[&str], body: &Value) -> Result<reqwest::Request> {
        let url = endpoint(&self.base_url, path)?;
        self.http
            .request(method, url)
            .header("Authorization", format!("Bearer {}", self.token))
            .header("Content-Type", "application/json")
            .json(body)
            .build()
            .context("failed to build HubSpot request")
    }

    async fn send(&self, method: Method, path: &[&str], body: &Value) -> Result<reqwest::Response> {
        let request = self.build_request(method, path, body)?;
        debug!(method = %request.method(), url = %request.url(), "hubspot request");
        let res = self
            .http
            .execute(request)
            .await
            .context("failed to reach HubSpot")?;
        if res.status() == StatusCode::TOO_MANY_REQUESTS {
            let body = res.text().await.unwrap_or_default();
            warn!("rate limited by HubSpot: {}", body);
            bail!("received 429 from HubSpot: {}", body);
        }
        Ok(res)
    }

    async fn expect_success(res: reqwest::Response, what: &str) -> Result<reqwest::Response> {
        if res.status().is_success() {
            return Ok(res);
        }
        let status = res.status();
        let body = res.text().await.unwrap_or_default();
        Err(anyhow!("hubspot {} error {}: {}", what, status, body))
    }

    async fn find_contact(&self, email: &str) -> Result<Option<String>> {
        let query = json!({
            "filterGroups": [{
                "filters": [{ "propertyName": "email", "operator": "EQ", "value": email }]
            }]
        });
        let res = self
            .send(Method::POST, &["crm", "v3", "objects", "contacts", "search"], &query)
            .await?;
        let res = Self::expect_success(res, "contact search").await?;
        let found: SearchResponse = res.json().await.context("invalid HubSpot search response")?;
        Ok(found.results.into_iter().next().map(|c| c.id))
    }

    /// Create the contact, or update it in place when HubSpot reports it
    /// already exists. Returns the contact id.
    async fn upsert_contact(&self, email: &str, properties: &Value) -> Result<String> {
        let body = json!({ "properties": properties });
        let res = self.send(Method::POST, &["crm", "v3", "objects", "contacts"], &body).await?;
        if res.status() != StatusCode::CONFLICT {
            let res = Self::expect_success(res, "contact create").await?;
            let created: ContactResponse =
                res.json().await.context("invalid HubSpot contact response")?;
            return Ok(created.id);
        }

        let id = self
            .find_contact(email)
            .await?
            .ok_or_else(|| anyhow!("hubspot reported a conflict for {email} but search found nothing"))?;
        let res = self
            .send(Method::PATCH, &["crm", "v3", "objects", "contacts", id.as_str()], &body)
            .await?;
        Self::expect_success(res, "contact update").await?;
        Ok(id)
    }
}

fn contact_properties(email: &str, payload: &ActivationPayload) -> Value {
    json!({
        "email": email,
        "firstname": "Demo",
        "lastname": "Lead",
        "lifecyclestage": "lead",
        "last_content_engaged": payload.title,
        "campaign_tags": payload.campaign_tags.join(";"),
    })
}

#[async_trait]
impl MarketingPlatform for HubSpotClient {
    fn name(&self) -> &'static str {
        "hubspot"
    }

    #[instrument(skip_all, fields(entry_id = %payload.entry_id, list_id = %payload.list_id))]
    async fn add_to_list(&self, payload: &ActivationPayload) -> Result<PlatformResponse> {
        let mut ids = Vec::with_capacity(payload.contacts.len());
        for email in &payload.contacts {
            let id = self
                .upsert_contact(email, &contact_properties(email, payload))
                .await
                .with_context(|| format!("failed to upsert contact {email}"))?;
            ids.push(id);
        }
        if ids.is_empty() {
            bail!("no contacts to add to HubSpot list {}", payload.list_id);
        }

        let vids: Vec<Value> = ids
            .iter()
            .map(|id| id.parse::<i64>().map(Value::from).unwrap_or_else(|_| Value::from(id.as_str())))
            .collect();
        let path = ["contacts", "v1", "lists", payload.list_id.as_str(), "add"];
        let res = self.send(Method::POST, &path, &json!({ "vids": vids })).await?;
        Self::expect_success(res, "list add").await?;

        info!(contacts = ids.len(), "added contacts to HubSpot list");
        Ok(PlatformResponse {
            request_id: format!("hubspot_activation_{}", payload.list_id),
            success: true,
            list_id: payload.list_id.clone(),
            list_name: None,
            contacts_processed: ids.len(),
            platform: "hubspot".to_string(),
            mock: false,
            simulated_latency_ms: None,
        })
    }
}
