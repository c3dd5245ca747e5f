//! Server Startup Tests
//!
//! Tests for application assembly, configuration loading, and the HTTP surface
//! of the relay.

mod mock_providers;

use std::net::SocketAddr;
use std::time::Duration;

use axum::{
    body::Body,
    extract::ConnectInfo,
    http::{Request, StatusCode},
};
use http_body_util::BodyExt;
use serial_test::serial;
use tempfile::TempDir;
use tower::util::ServiceExt;

use mock_providers::{ScriptedCompletion, spawn_relay, test_config};
use voice_relay::{AppState, ServerConfig, routes};

fn request_from(uri: &str, origin: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().uri(uri);
    if let Some(origin) = origin {
        builder = builder.header("origin", origin);
    }
    let mut request = builder.body(Body::empty()).unwrap();
    request
        .extensions_mut()
        .insert(ConnectInfo(SocketAddr::from(([127, 0, 0, 1], 50000))));
    request
}

/// Test that the full application answers health checks
#[tokio::test]
async fn test_health_check_through_full_stack() {
    let state = AppState::new(test_config(), ScriptedCompletion::new());
    let app = routes::create_app(state).unwrap();

    let response = app.oneshot(request_from("/health", None)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let headers = response.headers().clone();
    assert_eq!(headers["x-content-type-options"], "nosniff");
    assert_eq!(headers["x-frame-options"], "DENY");

    let body = response.into_body().collect().await.unwrap().to_bytes();
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["status"], "ok");
    assert!(json["timestamp"].is_string());
}

/// Test that CORS allows any origin when none is configured
#[tokio::test]
async fn test_cors_any_origin_by_default() {
    let state = AppState::new(test_config(), ScriptedCompletion::new());
    let app = routes::create_app(state).unwrap();

    let response = app
        .oneshot(request_from("/health", Some("https://client.example.com")))
        .await
        .unwrap();
    assert_eq!(response.headers()["access-control-allow-origin"], "*");
}

/// Test that a configured origin list is enforced
#[tokio::test]
async fn test_cors_restricted_origins() {
    let mut config = test_config();
    config.cors_allowed_origins = Some("https://app.example.com".to_string());
    let app = routes::create_app(AppState::new(config, ScriptedCompletion::new())).unwrap();

    let allowed = app
        .clone()
        .oneshot(request_from("/health", Some("https://app.example.com")))
        .await
        .unwrap();
    assert_eq!(
        allowed.headers()["access-control-allow-origin"],
        "https://app.example.com"
    );

    let denied = app
        .oneshot(request_from("/health", Some("https://evil.example.com")))
        .await
        .unwrap();
    assert!(
        denied
            .headers()
            .get("access-control-allow-origin")
            .is_none()
    );
}

/// Test that the relay endpoint refuses plain HTTP requests
#[tokio::test]
async fn test_relay_requires_websocket_upgrade() {
    let state = AppState::new(test_config(), ScriptedCompletion::new());
    let app = routes::create_app(state.clone()).unwrap();

    let response = app.oneshot(request_from("/ws", None)).await.unwrap();
    assert!(response.status().is_client_error());
    assert_eq!(state.ws_connection_count(), 0);
}

/// Test that the HTTP rate limiter rejects bursts beyond its budget
#[tokio::test]
async fn test_rate_limiter_rejects_burst() {
    let mut config = test_config();
    config.rate_limit_requests_per_second = 1;
    config.rate_limit_burst_size = 2;
    let app = routes::create_app(AppState::new(config, ScriptedCompletion::new())).unwrap();

    let mut statuses = Vec::new();
    for _ in 0..4 {
        let response = app
            .clone()
            .oneshot(request_from("/health", None))
            .await
            .unwrap();
        statuses.push(response.status());
    }

    assert_eq!(statuses[0], StatusCode::OK);
    assert!(statuses.contains(&StatusCode::TOO_MANY_REQUESTS));
}

/// Test that a served instance accepts TCP connections on its port
#[tokio::test]
async fn test_server_binds_and_serves() {
    let addr = spawn_relay(test_config(), ScriptedCompletion::new()).await;
    let stream = tokio::time::timeout(
        Duration::from_secs(2),
        tokio::net::TcpStream::connect(addr),
    )
    .await
    .unwrap();
    assert!(stream.is_ok());
}

/// Test loading a YAML file layered over the environment
#[test]
#[serial]
fn test_config_from_yaml_file() {
    for key in ["HOST", "PORT", "BEDROCK_MODEL_ID", "SESSION_IDLE_TIMEOUT_SECONDS"] {
        unsafe { std::env::remove_var(key) };
    }
    unsafe { std::env::set_var("BEDROCK_MODEL_ID", "env-model") };

    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("relay.yaml");
    std::fs::write(
        &path,
        r#"
server:
  host: "127.0.0.1"
  port: 4321
completion:
  system_prompt: "Answer in one sentence."
session:
  idle_timeout_seconds: 90
"#,
    )
    .unwrap();

    let config = ServerConfig::from_file(&path).unwrap();
    assert_eq!(config.address(), "127.0.0.1:4321");
    assert_eq!(config.completion.model_id, "env-model");
    assert_eq!(config.completion.system_prompt, "Answer in one sentence.");
    assert_eq!(config.idle_timeout_secs, 90);

    unsafe { std::env::remove_var("BEDROCK_MODEL_ID") };
}

/// Test that invalid sampling parameters stop startup
#[test]
#[serial]
fn test_config_rejects_invalid_top_p() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("relay.yaml");
    std::fs::write(&path, "completion:\n  top_p: 1.5\n").unwrap();

    let err = ServerConfig::from_file(&path).unwrap_err();
    assert!(err.to_string().contains("top_p"));
}
