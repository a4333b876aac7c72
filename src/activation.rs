//! Activation pipeline: `Validating -> Enriching -> Publishing -> Logging`.
//!
//! Stages run strictly in order and never go back. Each one appends a
//! [`Transition`] to the audit record, which is persisted exactly once at the
//! end of every attempt, failed attempts included.
use chrono::Utc;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::audit::{AuditError, FileLogStore};
use crate::cms::{self, CmsError, ContentSource};
use crate::config::{AuditDestination, Config};
use crate::enrichment::{self, EnrichmentProvider};
use crate::marketing::{self, MarketingPlatform};
use crate::model::{
    AIEnrichmentPayload, ActivationLog, ActivationPayload, ActivationRequest, ActivationStatus,
    ArticleIn, Cta, FieldError, PlatformResponse, Stage, StageOutcome, Transition,
    ValidationReport,
};
use crate::validation::{truncate_chars, validate_article};
use crate::vocabulary::map_tags;

/// Why an activation ended in `Failed`.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ActivationFailure {
    #[error(
        "validation failed: {}",
        .0.iter().map(|e| format!("{}: {}", e.field, e.reason)).collect::<Vec<_>>().join("; ")
    )]
    Validation(Vec<FieldError>),
    #[error("content entry '{0}' not found")]
    NotFound(String),
    #[error("content source error: {0}")]
    Source(String),
}

/// The persisted record plus, for failed attempts, the reason.
#[derive(Debug, Clone)]
pub struct Activation {
    pub log: ActivationLog,
    pub failure: Option<ActivationFailure>,
}

pub struct Activator {
    source: Arc<dyn ContentSource>,
    enrichment: Arc<dyn EnrichmentProvider>,
    platform: Arc<dyn MarketingPlatform>,
    store: Arc<FileLogStore>,
    destination: AuditDestination,
    contacts: Vec<String>,
    meta_max: usize,
}

/// Per-attempt bookkeeping.
#[derive(Clone)]
struct Run {
    activation_id: String,
    entry_id: String,
    started: Instant,
    transitions: Vec<Transition>,
    errors: Vec<String>,
    validation: ValidationReport,
    ai_outputs: Option<AIEnrichmentPayload>,
    platform_response: Option<PlatformResponse>,
    platform_error: Option<String>,
    brand_voice: BTreeMap<String, f64>,
}

impl Run {
    fn new(entry_id: &str) -> Self {
        Self {
            activation_id: Uuid::new_v4().to_string(),
            entry_id: entry_id.to_string(),
            started: Instant::now(),
            transitions: Vec::new(),
            errors: Vec::new(),
            validation: ValidationReport::default(),
            ai_outputs: None,
            platform_response: None,
            platform_error: None,
            brand_voice: BTreeMap::new(),
        }
    }

    fn record(&mut self, stage: Stage, outcome: StageOutcome, detail: Option<String>) {
        self.transitions.push(Transition {
            stage,
            outcome,
            detail,
            at: Utc::now(),
        });
    }

    fn finish(&self, status: ActivationStatus, logging: StageOutcome, detail: Option<String>) -> ActivationLog {
        let mut transitions = self.transitions.clone();
        transitions.push(Transition {
            stage: Stage::Logging,
            outcome: logging,
            detail,
            at: Utc::now(),
        });
        ActivationLog {
            activation_id: self.activation_id.clone(),
            entry_id: self.entry_id.clone(),
            timestamp: Utc::now(),
            status,
            ai_outputs: self.ai_outputs.clone(),
            validation: self.validation.clone(),
            platform_response: self.platform_response.clone(),
            platform_error: self.platform_error.clone(),
            brand_voice: self.brand_voice.clone(),
            transitions,
            errors: self.errors.clone(),
            processing_time: (self.started.elapsed().as_secs_f64() * 1000.0).round() / 1000.0,
        }
    }
}

impl Activator {
    pub fn new(
        source: Arc<dyn ContentSource>,
        enrichment: Arc<dyn EnrichmentProvider>,
        platform: Arc<dyn MarketingPlatform>,
        store: Arc<FileLogStore>,
    ) -> Self {
        Self {
            source,
            enrichment,
            platform,
            store,
            destination: AuditDestination::File,
            contacts: Vec::new(),
            meta_max: 160,
        }
    }

    /// Wire every strategy from configuration.
    pub fn from_config(cfg: &Config) -> anyhow::Result<Self> {
        let source = cms::build_source(&cfg.cms)?;
        let provider = enrichment::build_provider(&cfg.ai)?;
        let platform = marketing::build_platform(&cfg.marketing)?;
        let store = Arc::new(FileLogStore::new(cfg.activation_log_path()));
        info!(
            source = source.name(),
            provider = provider.name(),
            platform = platform.name(),
            audit = ?cfg.audit.destination,
            "activation services ready"
        );
        Ok(Self::new(source, provider, platform, store)
            .with_contacts(cfg.marketing.contacts.clone())
            .with_destination(cfg.audit.destination)
            .with_meta_max(cfg.ai.meta_description_max))
    }

    pub fn with_contacts(mut self, contacts: Vec<String>) -> Self {
        self.contacts = contacts;
        self
    }

    pub fn with_destination(mut self, destination: AuditDestination) -> Self {
        self.destination = destination;
        self
    }

    pub fn with_meta_max(mut self, meta_max: usize) -> Self {
        self.meta_max = meta_max;
        self
    }

    /// Latest record for an entry in the flat-file store.
    pub async fn latest(&self, entry_id: &str) -> Result<Option<ActivationLog>, AuditError> {
        self.store.read_latest(entry_id).await
    }

    #[instrument(skip_all, fields(entry_id = %req.entry_id, list_id = %req.marketo_list_id))]
    pub async fn activate(&self, req: &ActivationRequest) -> Activation {
        let mut run = Run::new(&req.entry_id);

        let article = match self.validate(req, &mut run).await {
            Ok(article) => article,
            Err(failure) => {
                warn!(activation_id = %run.activation_id, %failure, "activation failed");
                run.errors.push(failure.to_string());
                run.record(Stage::Enriching, StageOutcome::Skipped, None);
                run.record(Stage::Publishing, StageOutcome::Skipped, None);
                let log = self.persist(&run, ActivationStatus::Failed).await;
                return Activation {
                    log,
                    failure: Some(failure),
                };
            }
        };

        let meta_description = self.enrich(req, &article, &mut run).await;
        let partial = !self.publish(req, &article, meta_description, &mut run).await;

        let status = if partial {
            ActivationStatus::PartiallyCompleted
        } else {
            ActivationStatus::Completed
        };
        let log = self.persist(&run, status).await;
        info!(
            activation_id = %log.activation_id,
            status = log.status.as_str(),
            processing_time = log.processing_time,
            "activation finished"
        );
        Activation { log, failure: None }
    }

    async fn validate(
        &self,
        req: &ActivationRequest,
        run: &mut Run,
    ) -> Result<ArticleIn, ActivationFailure> {
        let result = self.validate_inner(req, run).await;
        match &result {
            Ok(_) => run.record(Stage::Validating, StageOutcome::Ok, None),
            Err(failure) => {
                run.validation.passed = false;
                if let ActivationFailure::Validation(errors) = failure {
                    run.validation.errors = errors.clone();
                }
                run.record(Stage::Validating, StageOutcome::Failed, Some(failure.to_string()));
            }
        }
        result
    }

    async fn validate_inner(
        &self,
        req: &ActivationRequest,
        run: &mut Run,
    ) -> Result<ArticleIn, ActivationFailure> {
        let mut request_errors = Vec::new();
        if req.entry_id.trim().is_empty() {
            request_errors.push(FieldError::new("entry_id", "entry_id must be non-empty"));
        }
        if req.marketo_list_id.trim().is_empty() {
            request_errors.push(FieldError::new(
                "marketo_list_id",
                "marketo_list_id must be non-empty",
            ));
        }
        if !request_errors.is_empty() {
            return Err(ActivationFailure::Validation(request_errors));
        }

        let article = self
            .source
            .get_article(&req.entry_id)
            .await
            .map_err(|err| match err {
                CmsError::NotFound(id) => ActivationFailure::NotFound(id),
                other => ActivationFailure::Source(format!("{other:#}")),
            })?;

        validate_article(&article).map_err(|e| ActivationFailure::Validation(e.errors))?;

        let mapping = map_tags(&article.campaign_tags);
        if !mapping.dropped.is_empty() {
            run.validation
                .advisories
                .push(format!("dropped tags outside vocabulary: {}", mapping.dropped.join(", ")));
        }
        run.validation.passed = true;
        run.validation.dropped_tags = mapping.dropped;
        Ok(ArticleIn {
            campaign_tags: mapping.mapped,
            ..article
        })
    }

    /// Returns the meta description to publish.
    async fn enrich(&self, req: &ActivationRequest, article: &ArticleIn, run: &mut Run) -> String {
        if !req.enrichment_enabled {
            run.record(
                Stage::Enriching,
                StageOutcome::Skipped,
                Some("enrichment disabled by request".to_string()),
            );
            let source = article.summary.as_deref().unwrap_or(&article.body);
            return truncate_chars(source.trim(), self.meta_max);
        }

        let payload = self.enrichment.enrich(article).await;
        if payload.fallback {
            let detail = payload
                .error
                .clone()
                .unwrap_or_else(|| "provider returned fallback output".to_string());
            run.errors.push(format!("enrichment fallback: {detail}"));
            run.record(Stage::Enriching, StageOutcome::Degraded, Some(detail));
        } else {
            run.record(Stage::Enriching, StageOutcome::Ok, payload.provider.clone());
        }
        let meta = truncate_chars(&payload.suggested_meta_description, self.meta_max);
        run.brand_voice = payload.tone_analysis.clone();
        run.ai_outputs = Some(payload);
        meta
    }

    /// Returns false when the platform call failed.
    async fn publish(
        &self,
        req: &ActivationRequest,
        article: &ArticleIn,
        meta_description: String,
        run: &mut Run,
    ) -> bool {
        let cta = (article.cta_text.is_some() || article.cta_url.is_some()).then(|| Cta {
            text: article.cta_text.clone(),
            url: article.cta_url.clone(),
        });
        let payload = ActivationPayload {
            entry_id: req.entry_id.clone(),
            title: article.title.clone(),
            meta_description,
            campaign_tags: article.campaign_tags.clone(),
            dropped_tags: run.validation.dropped_tags.clone(),
            brand_voice: run.brand_voice.clone(),
            cta,
            list_id: req.marketo_list_id.clone(),
            contacts: self.contacts.clone(),
            timestamp: Utc::now(),
        };

        match self.platform.add_to_list(&payload).await {
            Ok(response) => {
                run.record(Stage::Publishing, StageOutcome::Ok, Some(response.request_id.clone()));
                run.platform_response = Some(response);
                true
            }
            Err(err) => {
                let msg = format!("{err:#}");
                warn!(platform = self.platform.name(), error = %msg, "platform push failed");
                run.errors.push(format!("{} error: {msg}", self.platform.name()));
                run.record(Stage::Publishing, StageOutcome::Failed, Some(msg.clone()));
                run.platform_error = Some(msg);
                false
            }
        }
    }

    /// Write the audit record once. A CMS write failure falls back to the
    /// file store and downgrades a completed activation to partial.
    async fn persist(&self, run: &Run, status: ActivationStatus) -> ActivationLog {
        match self.destination {
            AuditDestination::File => {
                let log = run.finish(status, StageOutcome::Ok, Some("file".to_string()));
                self.append_to_file(&log).await;
                log
            }
            AuditDestination::Cms => {
                let log = run.finish(status, StageOutcome::Ok, Some(self.source.name().to_string()));
                let err = match self.source.write_activation_log(&log).await {
                    Ok(receipt) => {
                        info!(destination = %receipt.destination, id = ?receipt.id, "activation log written");
                        return log;
                    }
                    Err(err) => err,
                };
                warn!(error = %err, "CMS log write failed; falling back to file store");
                let status = match status {
                    ActivationStatus::Completed => ActivationStatus::PartiallyCompleted,
                    other => other,
                };
                let mut degraded = run.clone();
                degraded.errors.push(format!("log write error: {err}"));
                let log = degraded.finish(
                    status,
                    StageOutcome::Degraded,
                    Some(format!("CMS write failed, wrote to file: {err}")),
                );
                self.append_to_file(&log).await;
                log
            }
        }
    }

    async fn append_to_file(&self, log: &ActivationLog) {
        if let Err(err) = self.store.append(log).await {
            error!(activation_id = %log.activation_id, error = %err, "failed to write activation log");
        }
    }
}
