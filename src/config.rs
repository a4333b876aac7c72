//! Configuration loader and validator for the content activation service.
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML parse error: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(&'static str),
}

/// Root configuration struct mirroring the YAML schema exactly.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Config {
    pub app: App,
    pub ai: Ai,
    pub marketing: Marketing,
    pub cms: Cms,
    #[serde(default)]
    pub audit: Audit,
}

/// App-level settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct App {
    pub bind: String,
    pub data_dir: String,
    #[serde(default = "default_log_file")]
    pub activation_log_file: String,
    /// Requests per client per minute; `0` disables the limiter.
    #[serde(default)]
    pub rate_limit_per_minute: u32,
}

fn default_log_file() -> String {
    "activation_logs.jsonl".to_string()
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AiProviderKind {
    OpenAi,
    Local,
}

/// AI enrichment settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Ai {
    pub provider: AiProviderKind,
    #[serde(default = "default_meta_max")]
    pub meta_description_max: usize,
    #[serde(default)]
    pub openai: OpenAi,
    #[serde(default)]
    pub local: Local,
}

fn default_meta_max() -> usize {
    160
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct OpenAi {
    #[serde(default)]
    pub api_key: String,
    pub base_url: String,
    pub model: String,
    pub timeout_seconds: u64,
}

impl Default for OpenAi {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: "https://api.openai.com/v1".to_string(),
            model: "gpt-4o-mini".to_string(),
            timeout_seconds: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Local {
    pub base_url: String,
    pub model: String,
    pub timeout_seconds: u64,
}

impl Default for Local {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:11434".to_string(),
            model: "llama3.2:latest".to_string(),
            timeout_seconds: 30,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PlatformKind {
    Mock,
    Marketo,
    HubSpot,
}

impl PlatformKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlatformKind::Mock => "mock",
            PlatformKind::Marketo => "marketo",
            PlatformKind::HubSpot => "hubspot",
        }
    }
}

/// Marketing platform settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Marketing {
    pub platform: PlatformKind,
    /// Audience contacts pushed to the target list on every activation.
    pub contacts: Vec<String>,
    #[serde(default)]
    pub mock: MockPlatform,
    #[serde(default)]
    pub marketo: Marketo,
    #[serde(default)]
    pub hubspot: HubSpot,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MockPlatform {
    pub latency_ms: u64,
}

impl Default for MockPlatform {
    fn default() -> Self {
        Self { latency_ms: 250 }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Marketo {
    pub munchkin_id: String,
    pub client_id: String,
    pub client_secret: String,
    /// Overrides `https://{munchkin_id}.mktorest.com`.
    #[serde(default)]
    pub base_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HubSpot {
    pub access_token: String,
    pub base_url: String,
}

impl Default for HubSpot {
    fn default() -> Self {
        Self {
            access_token: String::new(),
            base_url: "https://api.hubapi.com".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Mock,
    Contentful,
}

/// Content source settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Cms {
    pub source: SourceKind,
    #[serde(default)]
    pub contentful: Contentful,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Contentful {
    pub space_id: String,
    pub environment: String,
    pub delivery_token: String,
    #[serde(default)]
    pub management_token: String,
    pub delivery_base_url: String,
    pub management_base_url: String,
    pub locale: String,
    pub log_content_type: String,
}

impl Default for Contentful {
    fn default() -> Self {
        Self {
            space_id: String::new(),
            environment: "master".to_string(),
            delivery_token: String::new(),
            management_token: String::new(),
            delivery_base_url: "https://cdn.contentful.com".to_string(),
            management_base_url: "https://api.contentful.com".to_string(),
            locale: "en-US".to_string(),
            log_content_type: "activationLog".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AuditDestination {
    #[default]
    File,
    Cms,
}

/// Where activation logs are persisted.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Audit {
    pub destination: AuditDestination,
}

impl Config {
    /// Ensure required directories exist (creates `app.data_dir` if missing).
    pub fn ensure_dirs(&self) -> Result<(), std::io::Error> {
        if self.app.data_dir.trim().is_empty() {
            return Ok(());
        }
        fs::create_dir_all(&self.app.data_dir)
    }

    /// Full path of the JSON-lines activation log.
    pub fn activation_log_path(&self) -> PathBuf {
        Path::new(&self.app.data_dir).join(&self.app.activation_log_file)
    }

    /// Fill secrets left empty in the file from the environment.
    fn apply_env(&mut self) {
        if self.ai.openai.api_key.trim().is_empty() {
            if let Ok(key) = std::env::var("OPENAI_API_KEY") {
                self.ai.openai.api_key = key;
            }
        }
    }
}

/// Load configuration from a YAML file and validate it.
/// - If `path` is None, uses `config.yaml` in the current working directory.
pub fn load(path: Option<&Path>) -> Result<Config, ConfigError> {
    let path = path.unwrap_or_else(|| Path::new("config.yaml"));
    let content = fs::read_to_string(path)?;
    let mut cfg: Config = serde_yaml::from_str(&content)?;
    cfg.apply_env();
    validate(&cfg)?;
    Ok(cfg)
}

/// Validate a configuration instance. Credentials are only required for the
/// variants that are actually selected.
pub fn validate(cfg: &Config) -> Result<(), ConfigError> {
    if cfg.app.bind.trim().is_empty() {
        return Err(ConfigError::Invalid("app.bind must be non-empty"));
    }
    if cfg.app.data_dir.trim().is_empty() {
        return Err(ConfigError::Invalid("app.data_dir must be non-empty"));
    }
    if cfg.app.activation_log_file.trim().is_empty() {
        return Err(ConfigError::Invalid("app.activation_log_file must be non-empty"));
    }

    if cfg.ai.meta_description_max == 0 {
        return Err(ConfigError::Invalid("ai.meta_description_max must be > 0"));
    }
    match cfg.ai.provider {
        AiProviderKind::OpenAi => {
            if cfg.ai.openai.base_url.trim().is_empty() {
                return Err(ConfigError::Invalid("ai.openai.base_url must be non-empty"));
            }
            if cfg.ai.openai.timeout_seconds == 0 {
                return Err(ConfigError::Invalid("ai.openai.timeout_seconds must be > 0"));
            }
        }
        AiProviderKind::Local => {
            if cfg.ai.local.base_url.trim().is_empty() {
                return Err(ConfigError::Invalid("ai.local.base_url must be non-empty"));
            }
            if cfg.ai.local.timeout_seconds == 0 {
                return Err(ConfigError::Invalid("ai.local.timeout_seconds must be > 0"));
            }
        }
    }

    if cfg.marketing.contacts.iter().any(|c| c.trim().is_empty()) {
        return Err(ConfigError::Invalid("marketing.contacts must not contain empty entries"));
    }
    match cfg.marketing.platform {
        PlatformKind::Mock => {}
        PlatformKind::Marketo => {
            let m = &cfg.marketing.marketo;
            if m.munchkin_id.trim().is_empty() && m.base_url.is_none() {
                return Err(ConfigError::Invalid("marketing.marketo.munchkin_id must be non-empty"));
            }
            if m.client_id.trim().is_empty() {
                return Err(ConfigError::Invalid("marketing.marketo.client_id must be non-empty"));
            }
            if m.client_secret.trim().is_empty() {
                return Err(ConfigError::Invalid("marketing.marketo.client_secret must be non-empty"));
            }
        }
        PlatformKind::HubSpot => {
            if cfg.marketing.hubspot.access_token.trim().is_empty() {
                return Err(ConfigError::Invalid("marketing.hubspot.access_token must be non-empty"));
            }
        }
    }

    if cfg.cms.source == SourceKind::Contentful {
        let c = &cfg.cms.contentful;
        if c.space_id.trim().is_empty() {
            return Err(ConfigError::Invalid("cms.contentful.space_id must be non-empty"));
        }
        if c.delivery_token.trim().is_empty() {
            return Err(ConfigError::Invalid("cms.contentful.delivery_token must be non-empty"));
        }
    }
    // The mock source accepts log writes, so only the live client needs a token.
    if cfg.audit.destination == AuditDestination::Cms
        && cfg.cms.source == SourceKind::Contentful
        && cfg.cms.contentful.management_token.trim().is_empty()
    {
        return Err(ConfigError::Invalid(
            "cms.contentful.management_token must be non-empty when audit.destination is cms",
        ));
    }

    Ok(())
}

/// Returns the example YAML configuration.
pub fn example() -> &'static str {
    r#"app:
  bind: "127.0.0.1:8001"
  data_dir: "./data"
  activation_log_file: "activation_logs.jsonl"
  rate_limit_per_minute: 30

ai:
  provider: openai
  meta_description_max: 160
  openai:
    api_key: "YOUR_OPENAI_API_KEY"
    base_url: "https://api.openai.com/v1"
    model: "gpt-4o-mini"
    timeout_seconds: 30
  local:
    base_url: "http://localhost:11434"
    model: "llama3.2:latest"
    timeout_seconds: 30

marketing:
  platform: mock
  contacts:
    - "demo@example.com"
  mock:
    latency_ms: 250
  marketo:
    munchkin_id: "YOUR_MUNCHKIN_ID"
    client_id: "YOUR_MARKETO_CLIENT_ID"
    client_secret: "YOUR_MARKETO_CLIENT_SECRET"
  hubspot:
    access_token: "YOUR_HUBSPOT_ACCESS_TOKEN"
    base_url: "https://api.hubapi.com"

cms:
  source: mock
  contentful:
    space_id: "YOUR_SPACE_ID"
    environment: "master"
    delivery_token: "YOUR_DELIVERY_TOKEN"
    management_token: "YOUR_MANAGEMENT_TOKEN"
    delivery_base_url: "https://cdn.contentful.com"
    management_base_url: "https://api.contentful.com"
    locale: "en-US"
    log_content_type: "activationLog"

audit:
  destination: file
"#
}
