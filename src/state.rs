//! Shared application state.

use dashmap::DashMap;
use std::net::IpAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use thiserror::Error;

use crate::config::ServerConfig;
use crate::core::completion::{CompletionGateway, SharedCompletionModel};

/// Why a new WebSocket connection was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ConnectionLimitError {
    #[error("global WebSocket connection limit reached")]
    GlobalLimitReached,
    #[error("per-IP connection limit reached")]
    PerIpLimitReached,
}

/// State shared by every route and session.
///
/// The completion gateway is the only model client in the process; sessions
/// hold clones of it and never construct their own.
pub struct AppState {
    pub config: ServerConfig,
    pub gateway: CompletionGateway,
    ws_connections: AtomicUsize,
    ip_connections: DashMap<IpAddr, u32>,
}

impl AppState {
    pub fn new(config: ServerConfig, model: SharedCompletionModel) -> Arc<Self> {
        let gateway = CompletionGateway::new(
            model,
            &config.completion.system_prompt,
            config.completion.timeout(),
        );

        Arc::new(Self {
            config,
            gateway,
            ws_connections: AtomicUsize::new(0),
            ip_connections: DashMap::new(),
        })
    }

    /// Reserve a connection slot for `ip`.
    ///
    /// The global limit is checked before the per-IP limit. A slot taken here
    /// must be returned with [`AppState::release_connection`].
    pub fn try_acquire_connection(&self, ip: IpAddr) -> Result<(), ConnectionLimitError> {
        if let Some(max) = self.config.max_websocket_connections {
            self.ws_connections
                .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                    (current < max).then_some(current + 1)
                })
                .map_err(|_| ConnectionLimitError::GlobalLimitReached)?;
        } else {
            self.ws_connections.fetch_add(1, Ordering::AcqRel);
        }

        let per_ip_limit = self.config.max_connections_per_ip;
        let mut entry = self.ip_connections.entry(ip).or_insert(0);
        if *entry >= per_ip_limit {
            drop(entry);
            self.ws_connections.fetch_sub(1, Ordering::AcqRel);
            return Err(ConnectionLimitError::PerIpLimitReached);
        }
        *entry += 1;

        Ok(())
    }

    /// Return a slot previously taken by [`AppState::try_acquire_connection`].
    pub fn release_connection(&self, ip: IpAddr) {
        let _ = self
            .ws_connections
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                current.checked_sub(1)
            });

        let now_idle = match self.ip_connections.get_mut(&ip) {
            Some(mut count) => {
                *count = count.saturating_sub(1);
                *count == 0
            }
            None => false,
        };
        if now_idle {
            self.ip_connections.remove_if(&ip, |_, count| *count == 0);
        }
    }

    pub fn ws_connection_count(&self) -> usize {
        self.ws_connections.load(Ordering::Acquire)
    }

    pub fn ip_connection_count(&self, ip: &IpAddr) -> u32 {
        self.ip_connections.get(ip).map(|count| *count).unwrap_or(0)
    }
}
