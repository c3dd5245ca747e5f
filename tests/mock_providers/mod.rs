//! Shared test doubles and server helpers for integration tests.
#![allow(dead_code)]

use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::net::TcpListener;

use voice_relay::client::RelayClient;
use voice_relay::core::{CompletionModel, CompletionRequest, CompletionResult};
use voice_relay::handlers::relay::messages::RelayOutgoingMessage;
use voice_relay::{AppState, ServerConfig, routes};

/// Completion model that records prompts and replies from a script, falling
/// back to `reply N` once the script is exhausted.
pub struct ScriptedCompletion {
    prompts: Mutex<Vec<String>>,
    systems: Mutex<Vec<String>>,
    script: Mutex<VecDeque<CompletionResult<String>>>,
    delay: Duration,
}

impl ScriptedCompletion {
    pub fn new() -> Arc<Self> {
        Self::with_script(Vec::new(), Duration::ZERO)
    }

    pub fn with_delay(delay: Duration) -> Arc<Self> {
        Self::with_script(Vec::new(), delay)
    }

    pub fn with_script(script: Vec<CompletionResult<String>>, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            prompts: Mutex::new(Vec::new()),
            systems: Mutex::new(Vec::new()),
            script: Mutex::new(script.into()),
            delay,
        })
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().clone()
    }

    pub fn systems(&self) -> Vec<String> {
        self.systems.lock().clone()
    }
}

#[async_trait]
impl CompletionModel for ScriptedCompletion {
    async fn complete(&self, request: CompletionRequest) -> CompletionResult<String> {
        let call = {
            let mut prompts = self.prompts.lock();
            prompts.push(request.prompt.clone());
            prompts.len()
        };
        self.systems.lock().push(request.system.clone());

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        self.script
            .lock()
            .pop_front()
            .unwrap_or_else(|| Ok(format!("reply {call}")))
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

/// Minimal configuration for a local test server.
pub fn test_config() -> ServerConfig {
    let mut config = ServerConfig::default();
    config.host = "127.0.0.1".to_string();
    config.port = 0;
    config
}

/// Start the full application on an ephemeral port.
pub async fn spawn_relay(config: ServerConfig, model: Arc<dyn CompletionModel>) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let state = AppState::new(config, model);
    let app = routes::create_app(state).unwrap();

    tokio::spawn(async move {
        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await
        .unwrap();
    });

    addr
}

pub fn ws_url(addr: SocketAddr) -> String {
    format!("ws://{addr}/ws")
}

pub async fn connect(addr: SocketAddr) -> RelayClient {
    RelayClient::connect(&ws_url(addr), Duration::from_secs(5))
        .await
        .unwrap()
}

/// Next server event, failing the test after five seconds.
pub async fn next_event(client: &mut RelayClient) -> RelayOutgoingMessage {
    tokio::time::timeout(Duration::from_secs(5), client.next_event())
        .await
        .expect("timed out waiting for server event")
        .expect("relay connection error")
        .expect("relay closed the connection")
}

pub fn reply_text(event: RelayOutgoingMessage) -> String {
    match event {
        RelayOutgoingMessage::AiResponse { text, .. } => text,
        other => panic!("expected ai-response, got {other:?}"),
    }
}
