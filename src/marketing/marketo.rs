use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use reqwest::{Client, Method, StatusCode, Url};
use serde::Deserialize;
use serde_json::{json, Value};
use std::fmt;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

use super::{endpoint, MarketingPlatform};
use crate::config::Marketo;
use crate::model::{ActivationPayload, PlatformResponse};

const TIMEOUT: Duration = Duration::from_secs(30);
/// Refresh the token this long before Marketo says it expires.
const TOKEN_SLACK: Duration = Duration::from_secs(60);

/// Marketo REST client using OAuth client credentials.
pub struct MarketoClient {
    http: Client,
    base_url: Url,
    client_id: String,
    client_secret: String,
    token: Mutex<Option<(String, Instant)>>,
}

impl fmt::Debug for MarketoClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MarketoClient")
            .field("base_url", &self.base_url)
            .field("client_id", &self.client_id)
            .finish_non_exhaustive()
    }
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: u64,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    #[serde(default)]
    code: String,
    #[serde(default)]
    message: String,
}

#[derive(Deserialize)]
struct ApiResponse {
    #[serde(default)]
    success: bool,
    #[serde(default, rename = "requestId")]
    request_id: Option<String>,
    #[serde(default)]
    result: Vec<Value>,
    #[serde(default)]
    errors: Vec<ApiError>,
}

impl ApiResponse {
    fn into_result(self, what: &str) -> Result<Self> {
        if self.success {
            return Ok(self);
        }
        let detail = self
            .errors
            .iter()
            .map(|e| format!("{} {}", e.code, e.message))
            .collect::<Vec<_>>()
            .join("; ");
        Err(anyhow!("marketo {} failed: {}", what, detail))
    }
}

impl MarketoClient {
    pub fn from_config(cfg: &Marketo) -> Result<Self> {
        let base = match &cfg.base_url {
            Some(url) => url.clone(),
            None => format!("https://{}.mktorest.com", cfg.munchkin_id),
        };
        let base_url = Url::parse(&format!("{}/", base.trim_end_matches('/')))
            .with_context(|| format!("invalid Marketo base URL: {base}"))?;
        let http = Client::builder()
            .user_agent("content-activator/0.1")
            .timeout(TIMEOUT)
            .no_proxy()
            .build()
            .context("failed to build Marketo HTTP client")?;
        Ok(Self {
            http,
            base_url,
            client_id: cfg.client_id.clone(),
            client_secret: cfg.client_secret.clone(),
            token: Mutex::new(None),
        })
    }

    pub fn build_token_request(&self) -> Result<reqwest::Request> {
        let mut url = endpoint(&self.base_url, &["identity", "oauth", "token"])?;
        url.query_pairs_mut()
            .append_pair("grant_type", "client_credentials")
            .append_pair("client_id", &self.client_id)
            .append_pair("client_secret", &self.client_secret);
        self.http
            .get(url)
            .build()
            .context("failed to build Marketo token request")
    }

    pub fn build_request(&self, token: &str, path: &[&str], body: &Value) -> Result<reqwest::Request> {
        let url = endpoint(&self.base_url, path)?;
        self.http
            .request(Method::POST, url)
            .bearer_auth(token)
            .json(body)
            .build()
            .context("failed to build Marketo request")
    }

    async fn access_token(&self) -> Result<String> {
        let mut cached = self.token.lock().await;
        if let Some((token, expires)) = cached.as_ref() {
            if Instant::now() < *expires {
                return Ok(token.clone());
            }
        }
        let res = self
            .http
            .execute(self.build_token_request()?)
            .await
            .context("failed to reach Marketo identity endpoint")?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            bail!("marketo auth error {}: {}", status, body);
        }
        let token: TokenResponse = res.json().await.context("invalid Marketo token response")?;
        let ttl = Duration::from_secs(token.expires_in).saturating_sub(TOKEN_SLACK);
        *cached = Some((token.access_token.clone(), Instant::now() + ttl));
        debug!(ttl_secs = ttl.as_secs(), "obtained Marketo access token");
        Ok(token.access_token)
    }

    async fn post(&self, token: &str, path: &[&str], body: &Value, what: &str) -> Result<ApiResponse> {
        let request = self.build_request(token, path, body)?;
        debug!(url = %request.url(), "marketo request");
        let res = self
            .http
            .execute(request)
            .await
            .with_context(|| format!("failed to reach Marketo for {what}"))?;
        if res.status() == StatusCode::TOO_MANY_REQUESTS {
            let body = res.text().await.unwrap_or_default();
            warn!("rate limited by Marketo: {}", body);
            bail!("received 429 from Marketo: {}", body);
        }
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            bail!("marketo error {}: {}", status, body);
        }
        let parsed: ApiResponse = res
            .json()
            .await
            .with_context(|| format!("invalid Marketo {what} response"))?;
        parsed.into_result(what)
    }
}

fn lead_ids(result: &[Value]) -> Vec<i64> {
    result
        .iter()
        .filter_map(|r| r.get("id").and_then(Value::as_i64))
        .collect()
}

#[async_trait]
impl MarketingPlatform for MarketoClient {
    fn name(&self) -> &'static str {
        "marketo"
    }

    #[instrument(skip_all, fields(entry_id = %payload.entry_id, list_id = %payload.list_id))]
    async fn add_to_list(&self, payload: &ActivationPayload) -> Result<PlatformResponse> {
        if payload.contacts.is_empty() {
            bail!("no contacts to add to Marketo list {}", payload.list_id);
        }
        let token = self.access_token().await?;

        let input: Vec<Value> = payload
            .contacts
            .iter()
            .map(|email| json!({ "email": email }))
            .collect();
        let upsert = json!({
            "action": "createOrUpdate",
            "lookupField": "email",
            "input": input,
        });
        let leads = self
            .post(&token, &["rest", "v1", "leads.json"], &upsert, "lead upsert")
            .await?;
        let ids = lead_ids(&leads.result);
        if ids.is_empty() {
            bail!("marketo lead upsert returned no lead ids");
        }

        let path = ["rest", "v1", "lists", payload.list_id.as_str(), "leads.json"];
        let members: Vec<Value> = ids.iter().map(|id| json!({ "id": id })).collect();
        let added = self
            .post(&token, &path, &json!({ "input": members }), "list add")
            .await?;

        info!(leads = ids.len(), "added leads to Marketo list");
        Ok(PlatformResponse {
            request_id: added
                .request_id
                .unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
            success: true,
            list_id: payload.list_id.clone(),
            list_name: None,
            contacts_processed: ids.len(),
            platform: "marketo".to_string(),
            mock: false,
            simulated_latency_ms: None,
        })
    }
}
