//! HTTP surface: router wiring, shared state and error bodies.
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::activation::Activator;
use crate::config::{Config, PlatformKind};
use crate::handlers;
use crate::rate_limit::{self, RateLimiter};

#[derive(Clone)]
pub struct AppState {
    pub activator: Arc<Activator>,
    pub platform: PlatformKind,
}

impl AppState {
    pub fn new(activator: Activator, platform: PlatformKind) -> Self {
        Self {
            activator: Arc::new(activator),
            platform,
        }
    }

    pub fn from_config(cfg: &Config) -> anyhow::Result<Self> {
        Ok(Self::new(Activator::from_config(cfg)?, cfg.marketing.platform))
    }
}

/// Build the router. `rate_limit_per_minute == 0` disables the limiter.
pub fn router(state: AppState, rate_limit_per_minute: u32) -> Router {
    let mut api = Router::new()
        .route("/activate", post(handlers::activate))
        .route("/platform", get(handlers::platform))
        .route("/activations/:entry_id/latest", get(handlers::latest_activation));

    if rate_limit_per_minute > 0 {
        let limiter = Arc::new(RateLimiter::new(
            rate_limit_per_minute,
            Duration::from_secs(60),
        ));
        api = api.layer(axum::middleware::from_fn_with_state(
            limiter,
            rate_limit::rate_limit_middleware,
        ));
    }

    Router::new()
        .route("/health", get(handlers::health))
        .merge(api)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}

pub fn json_error(status: StatusCode, code: &'static str, message: impl Into<String>) -> Response {
    (
        status,
        Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}
