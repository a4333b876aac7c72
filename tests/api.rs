mod common;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::body::{to_bytes, Body};
use axum::extract::ConnectInfo;
use axum::http::{Request, StatusCode};
use axum::Router;
use common::{activator, read_logs, spawn_fake_openai, RecordingPlatform};
use content_activator::cms::MockSource;
use content_activator::config::{OpenAi, PlatformKind};
use content_activator::enrichment::OpenAiProvider;
use content_activator::marketing::{MarketingPlatform, MockPlatform};
use content_activator::server::{router, AppState};
use serde_json::{json, Value};
use tempfile::TempDir;
use tower::ServiceExt;

async fn app_with(platform: Arc<dyn MarketingPlatform>, rate_limit: u32) -> (Router, TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let openai = OpenAiProvider::from_config(
        &OpenAi {
            api_key: "sk-test".into(),
            base_url: spawn_fake_openai().await,
            model: "gpt-4o-mini".into(),
            timeout_seconds: 5,
        },
        160,
    )
    .unwrap();
    let activator = activator(
        dir.path(),
        Arc::new(MockSource::new()),
        Arc::new(openai),
        platform,
    );
    let state = AppState::new(activator, PlatformKind::Mock);
    (router(state, rate_limit), dir)
}

async fn call(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let res = app.clone().oneshot(request).await.unwrap();
    let status = res.status();
    let bytes = to_bytes(res.into_body(), usize::MAX).await.unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

fn activate(body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/activate")
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

#[tokio::test]
async fn getting_started_activates() {
    let (app, dir) = app_with(Arc::new(MockPlatform::new(Duration::ZERO)), 0).await;

    let (status, body) = call(
        &app,
        activate(json!({ "entry_id": "getting-started", "marketo_list_id": "CUSTOM_LIST" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["status"], "completed");
    assert!(!body["activation_id"].as_str().unwrap().is_empty());

    let enrichment = &body["enrichment_data"];
    assert_eq!(enrichment["fallback"], false);
    let meta = enrichment["suggested_meta_description"].as_str().unwrap();
    assert!(!meta.is_empty() && meta.chars().count() <= 160);
    let keywords = enrichment["keywords"].as_array().unwrap();
    assert!((3..=7).contains(&keywords.len()), "{keywords:?}");

    // No known list requested, so the mock routes by the `developer` tag.
    assert_eq!(body["marketing_response"]["list_id"], "ML_DEMO_003");
    assert_eq!(body["marketing_response"]["contacts_processed"], 2);

    let logs = read_logs(dir.path());
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].activation_id, body["activation_id"].as_str().unwrap());
}

#[tokio::test]
async fn launch_article_activates() {
    let (app, dir) = app_with(Arc::new(MockPlatform::new(Duration::ZERO)), 0).await;

    let (status, body) = call(
        &app,
        activate(json!({ "entry_id": "launch-announcement", "marketo_list_id": "ML_DEMO_001" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["status"], "completed");
    assert!(!body["activation_id"].as_str().unwrap().is_empty());
    let meta = body["enrichment_data"]["suggested_meta_description"].as_str().unwrap();
    assert!(!meta.is_empty() && meta.chars().count() <= 160);
    let keywords = body["enrichment_data"]["keywords"].as_array().unwrap();
    assert!((3..=7).contains(&keywords.len()), "{keywords:?}");
    assert_eq!(body["marketing_response"]["list_name"], "Product Launch Prospects");
    assert_eq!(read_logs(dir.path()).len(), 1);
}

#[tokio::test]
async fn missing_alt_text_is_unprocessable() {
    let (app, dir) = app_with(Arc::new(RecordingPlatform::default()), 0).await;

    let (status, body) = call(
        &app,
        activate(json!({ "entry_id": "missing-alt-text", "list_id": "ML_DEMO_002" })),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"], "validation_error");
    assert!(body["activation_id"].is_string());
    let fields: Vec<&str> = body["detail"]
        .as_array()
        .unwrap()
        .iter()
        .map(|d| d["field"].as_str().unwrap())
        .collect();
    assert_eq!(fields, vec!["alt_text"]);

    let logs = read_logs(dir.path());
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].status.as_str(), "failed");
}

#[tokio::test]
async fn platform_outage_is_accepted_as_partial() {
    let (app, dir) = app_with(
        Arc::new(RecordingPlatform::failing("marketing platform unreachable")),
        0,
    )
    .await;

    let (status, body) = call(
        &app,
        activate(json!({ "entry_id": "sample-article", "marketo_list_id": "ML_DEMO_001" })),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body["status"], "partially_completed");
    assert!(body["marketing_response"].is_null());
    assert!(body["errors"]
        .as_array()
        .unwrap()
        .iter()
        .any(|e| e.as_str().unwrap().contains("marketing platform unreachable")));

    let logs = read_logs(dir.path());
    assert_eq!(logs.len(), 1);
    assert_eq!(
        logs[0].platform_error.as_deref(),
        Some("marketing platform unreachable")
    );

    let (status, latest) = call(&app, get("/activations/sample-article/latest")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(latest["activation_id"], body["activation_id"]);
    assert_eq!(latest["platform_error"], "marketing platform unreachable");
}

#[tokio::test]
async fn unknown_entry_is_not_found() {
    let (app, _dir) = app_with(Arc::new(RecordingPlatform::default()), 0).await;
    let (status, body) = call(
        &app,
        activate(json!({ "entry_id": "nope", "marketo_list_id": "ML_DEMO_001" })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "not_found");
    assert!(body["activation_id"].is_string());

    let (status, _) = call(&app, get("/activations/never-activated/latest")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn malformed_body_is_bad_request() {
    let (app, dir) = app_with(Arc::new(RecordingPlatform::default()), 0).await;
    let request = Request::builder()
        .method("POST")
        .uri("/activate")
        .header("content-type", "application/json")
        .body(Body::from("{\"entry_id\": "))
        .unwrap();
    let (status, body) = call(&app, request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "invalid_request");
    assert!(read_logs(dir.path()).is_empty());
}

#[tokio::test]
async fn incomplete_body_names_the_missing_field() {
    let (app, dir) = app_with(Arc::new(RecordingPlatform::default()), 0).await;

    let (status, body) = call(&app, activate(json!({ "entry_id": "getting-started" }))).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY, "{body}");
    assert_eq!(body["error"], "validation_error");
    assert_eq!(body["detail"][0]["field"], "marketo_list_id");

    let (status, body) = call(
        &app,
        activate(json!({ "entry_id": 42, "marketo_list_id": "ML_DEMO_001" })),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY, "{body}");
    assert_eq!(body["detail"][0]["field"], "entry_id");
    assert!(read_logs(dir.path()).is_empty());
}

#[tokio::test]
async fn clients_are_rate_limited_independently() {
    let (app, _dir) = app_with(Arc::new(RecordingPlatform::default()), 1).await;
    let with_client = |client: &str| {
        Request::builder()
            .uri("/platform")
            .header("x-client-id", client)
            .body(Body::empty())
            .unwrap()
    };

    let (status, _) = call(&app, with_client("team-a")).await;
    assert_eq!(status, StatusCode::OK);

    let res = app.clone().oneshot(with_client("team-a")).await.unwrap();
    assert_eq!(res.status(), StatusCode::TOO_MANY_REQUESTS);
    assert!(res.headers().contains_key("retry-after"));

    let (status, _) = call(&app, with_client("team-b")).await;
    assert_eq!(status, StatusCode::OK);

    // Health checks bypass the limiter.
    for _ in 0..3 {
        let (status, body) = call(&app, get("/health")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({ "status": "ok" }));
    }
}

#[tokio::test]
async fn platform_info_describes_configuration() {
    let (app, _dir) = app_with(Arc::new(RecordingPlatform::default()), 0).await;
    let (status, body) = call(&app, get("/platform")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["current_platform"], "mock");
    assert_eq!(body["platform_details"]["name"], "Mock Service");
    assert_eq!(body["available_platforms"], json!(["marketo", "hubspot", "mock"]));
}

#[tokio::test]
async fn anonymous_peers_have_their_own_windows() {
    let (app, _dir) = app_with(Arc::new(RecordingPlatform::default()), 1).await;
    let from = |peer: &str| {
        Request::builder()
            .uri("/platform")
            .extension(ConnectInfo(peer.parse::<SocketAddr>().unwrap()))
            .body(Body::empty())
            .unwrap()
    };

    let (status, _) = call(&app, from("198.51.100.1:40000")).await;
    assert_eq!(status, StatusCode::OK);
    // Same host on a new connection shares the window.
    let (status, _) = call(&app, from("198.51.100.1:40001")).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);

    let (status, _) = call(&app, from("198.51.100.2:40000")).await;
    assert_eq!(status, StatusCode::OK);
}
