//! Relay WebSocket route configuration

use axum::{Router, routing::get};
use tower_http::trace::TraceLayer;

use crate::handlers::relay::relay_handler;
use crate::state::AppState;
use std::sync::Arc;

/// Create the relay WebSocket router
///
/// # Endpoint
///
/// `GET /ws` - WebSocket upgrade for one voice conversation
///
/// # Example
///
/// ```json
/// // Client sends a finished utterance
/// {"type": "speech-text", "text": "What's the weather like on Mars?", "isFinal": true}
///
/// // Server replies
/// {"type": "ai-response", "text": "Cold and dusty.", "timestamp": "2024-05-01T12:00:00Z"}
/// ```
pub fn create_relay_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/ws", get(relay_handler))
        .layer(TraceLayer::new_for_http())
}
