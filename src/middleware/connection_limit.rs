//! Admission control for relay sessions.
//!
//! Every relay session holds one slot from [`AppState`] for as long as its
//! socket is open. Slots are counted globally and per client address. The
//! middleware takes the slot before the upgrade runs; from then on it belongs
//! to whichever side finishes the request:
//!
//! - upgrade succeeded (`101`): the relay handler returns it on disconnect
//! - anything else: the middleware returns it immediately
//!
//! Plain HTTP requests on the same router are never counted.

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{HeaderMap, Request, StatusCode, header::UPGRADE},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::state::{AppState, ConnectionLimitError};

/// Address owning the admission slot, handed to the relay handler.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ClientIp(pub IpAddr);

impl IntoResponse for ConnectionLimitError {
    fn into_response(self) -> Response {
        match self {
            ConnectionLimitError::GlobalLimitReached => (
                StatusCode::SERVICE_UNAVAILABLE,
                "Relay is at capacity. Please try again later.",
            )
                .into_response(),
            ConnectionLimitError::PerIpLimitReached => (
                StatusCode::TOO_MANY_REQUESTS,
                "Too many open relay sessions from this address.",
            )
                .into_response(),
        }
    }
}

/// True when the request asks to switch to the WebSocket protocol.
fn wants_websocket(headers: &HeaderMap) -> bool {
    headers
        .get(UPGRADE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.eq_ignore_ascii_case("websocket"))
}

/// Reserve a session slot for WebSocket upgrades, answering 503 (global
/// limit) or 429 (per-address limit) when none is free.
pub async fn connection_limit_middleware(
    State(state): State<Arc<AppState>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    if !wants_websocket(request.headers()) {
        return next.run(request).await;
    }

    let ip = addr.ip();
    if let Err(rejection) = state.try_acquire_connection(ip) {
        warn!(
            client_ip = %ip,
            active_sessions = state.ws_connection_count(),
            reason = %rejection,
            "Refusing relay session"
        );
        return rejection.into_response();
    }

    request.extensions_mut().insert(ClientIp(ip));
    let response = next.run(request).await;

    if response.status() != StatusCode::SWITCHING_PROTOCOLS {
        debug!(client_ip = %ip, status = %response.status(), "Upgrade not completed, releasing slot");
        state.release_connection(ip);
    }
    response
}
