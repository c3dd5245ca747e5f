//! Route assembly.
//!
//! - `api` - public HTTP endpoints (health)
//! - `relay` - relay WebSocket endpoint
//!
//! [`create_app`] layers the shared middleware stack on top of both.

pub mod api;
pub mod relay;

use std::sync::Arc;
use std::time::Duration;

use anyhow::anyhow;
use axum::{Router, middleware};
use http::{Method, header::CONTENT_TYPE};
use tower_governor::{
    GovernorLayer, governor::GovernorConfigBuilder, key_extractor::SmartIpKeyExtractor,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::set_header::SetResponseHeaderLayer;
use tracing::info;

use crate::middleware::connection_limit_middleware;
use crate::state::AppState;

/// Rates at or above this disable the HTTP rate limiter
const RATE_LIMIT_DISABLED_AT: u32 = 100_000;

/// Interval after which one rate-limit token is replenished.
///
/// Nanosecond resolution keeps rates above 1000/s distinct.
fn replenish_period(requests_per_second: u32) -> Duration {
    let nanos = 1_000_000_000 / u64::from(requests_per_second.max(1));
    Duration::from_nanos(nanos.max(1))
}

/// Build the complete application router.
///
/// Layer order (outer to inner): security headers -> rate limit -> CORS ->
/// routes. The relay route additionally runs the connection limit middleware.
/// Serve with `into_make_service_with_connect_info::<SocketAddr>()` so client
/// addresses are available to the limiters.
pub fn create_app(app_state: Arc<AppState>) -> anyhow::Result<Router> {
    let rate_limit_rps = app_state.config.rate_limit_requests_per_second;
    let rate_limit_burst = app_state.config.rate_limit_burst_size;

    let relay_routes = relay::create_relay_router().layer(middleware::from_fn_with_state(
        app_state.clone(),
        connection_limit_middleware,
    ));

    let governor_layer = if rate_limit_rps < RATE_LIMIT_DISABLED_AT {
        let governor_config = GovernorConfigBuilder::default()
            .period(replenish_period(rate_limit_rps))
            .burst_size(rate_limit_burst)
            .key_extractor(SmartIpKeyExtractor)
            .finish()
            .ok_or_else(|| anyhow!("Failed to build rate limiter config"))?;
        Some(GovernorLayer::new(governor_config))
    } else {
        info!("Rate limiting disabled (rate >= {RATE_LIMIT_DISABLED_AT}/s)");
        None
    };

    let cors_layer = match app_state.config.allowed_origins() {
        None => CorsLayer::new()
            .allow_origin(Any)
            .allow_methods([Method::GET, Method::OPTIONS])
            .allow_headers([CONTENT_TYPE])
            .allow_credentials(false),
        Some(origins) => {
            let origins: Vec<_> = origins
                .iter()
                .filter_map(|origin| origin.parse().ok())
                .collect();
            CorsLayer::new()
                .allow_origin(origins)
                .allow_methods([Method::GET, Method::OPTIONS])
                .allow_headers([CONTENT_TYPE])
                .allow_credentials(true)
        }
    };

    let security_headers = tower::ServiceBuilder::new()
        .layer(SetResponseHeaderLayer::overriding(
            http::header::X_CONTENT_TYPE_OPTIONS,
            http::HeaderValue::from_static("nosniff"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            http::header::X_FRAME_OPTIONS,
            http::HeaderValue::from_static("DENY"),
        ));

    Ok(api::create_api_router()
        .merge(relay_routes)
        .with_state(app_state)
        .layer(cors_layer)
        .layer(tower::util::option_layer(governor_layer))
        .layer(security_headers))
}
