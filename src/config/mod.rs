//! Configuration module for the voice relay server
//!
//! This module handles server configuration from various sources: .env files, YAML files,
//! and environment variables. Priority: YAML > ENV vars > .env values > defaults.
//!
//! # Modules
//! - `yaml`: YAML configuration file loading
//! - `env`: Environment variable loading
//! - `merge`: Merging YAML and environment configurations
//! - `validation`: Configuration validation logic
//! - `utils`: Utility functions for configuration parsing
//!
//! # Example
//! ```rust,no_run
//! use voice_relay::config::ServerConfig;
//! use std::path::PathBuf;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! // Load from environment variables only
//! let config = ServerConfig::from_env()?;
//!
//! // Load from YAML file with environment variable overrides
//! let config = ServerConfig::from_file(&PathBuf::from("config.yaml"))?;
//!
//! println!("Server listening on {}", config.address());
//! # Ok(())
//! # }
//! ```

use std::path::PathBuf;
use std::time::Duration;

mod env;
mod merge;
mod utils;
mod validation;
mod yaml;

use crate::core::completion::CompletionConfig;

pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 3000;
pub const DEFAULT_RATE_LIMIT_RPS: u32 = 60;
pub const DEFAULT_RATE_LIMIT_BURST: u32 = 10;
pub const DEFAULT_MAX_CONNECTIONS_PER_IP: u32 = 100;
pub const DEFAULT_IDLE_TIMEOUT_SECS: u64 = 300;

/// TLS configuration for HTTPS and WSS
#[derive(Debug, Clone)]
pub struct TlsConfig {
    /// Path to the TLS certificate file (PEM format)
    pub cert_path: PathBuf,
    /// Path to the TLS private key file (PEM format)
    pub key_path: PathBuf,
}

/// Server configuration
///
/// Holds everything the relay needs at startup:
/// - Listener address and optional TLS
/// - Completion model settings (model, region, credentials, sampling, timeout)
/// - Security settings (CORS, rate limiting, connection limits)
/// - Session idle timeout
#[derive(Debug, Clone)]
pub struct ServerConfig {
    // Server settings
    pub host: String,
    pub port: u16,

    // TLS configuration (optional)
    pub tls: Option<TlsConfig>,

    // Completion model
    pub completion: CompletionConfig,

    // Security settings
    /// Comma-separated list of allowed origins, "*" for any. `None` allows any.
    pub cors_allowed_origins: Option<String>,
    pub rate_limit_requests_per_second: u32,
    pub rate_limit_burst_size: u32,
    /// Global cap on concurrent WebSocket sessions. `None` means unlimited.
    pub max_websocket_connections: Option<usize>,
    pub max_connections_per_ip: u32,

    // Session settings
    pub idle_timeout_secs: u64,
}

/// Zeroize credential fields when the configuration is dropped.
impl Drop for ServerConfig {
    fn drop(&mut self) {
        use zeroize::Zeroize;

        if let Some(ref mut key) = self.completion.aws_access_key_id {
            key.zeroize();
        }
        if let Some(ref mut secret) = self.completion.aws_secret_access_key {
            secret.zeroize();
        }
        if let Some(ref mut token) = self.completion.aws_session_token {
            token.zeroize();
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            tls: None,
            completion: CompletionConfig::default(),
            cors_allowed_origins: None,
            rate_limit_requests_per_second: DEFAULT_RATE_LIMIT_RPS,
            rate_limit_burst_size: DEFAULT_RATE_LIMIT_BURST,
            max_websocket_connections: None,
            max_connections_per_ip: DEFAULT_MAX_CONNECTIONS_PER_IP,
            idle_timeout_secs: DEFAULT_IDLE_TIMEOUT_SECS,
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables and defaults.
    ///
    /// `.env` is loaded into the environment in `main` before this is called.
    ///
    /// # Errors
    /// Returns an error if an environment variable has an invalid format or
    /// the merged configuration fails validation.
    pub fn from_env() -> Result<Self, Box<dyn std::error::Error>> {
        let config = merge::merge_config(None)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a YAML file with environment variable base
    ///
    /// Priority order (highest to lowest):
    /// 1. YAML file values
    /// 2. Environment variables (actual ENV vars override .env values)
    /// 3. .env file values
    /// 4. Default values
    ///
    /// # Errors
    /// Returns an error if:
    /// - The YAML file cannot be read or is malformed
    /// - Environment variables have invalid formats
    /// - Configuration validation fails
    pub fn from_file(path: &PathBuf) -> Result<Self, Box<dyn std::error::Error>> {
        let yaml_config = yaml::YamlConfig::from_file(path)?;
        let config = merge::merge_config(Some(yaml_config))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), Box<dyn std::error::Error>> {
        validation::validate_completion(&self.completion)?;
        validation::validate_limits(
            self.idle_timeout_secs,
            self.rate_limit_requests_per_second,
            self.max_connections_per_ip,
        )?;
        Ok(())
    }

    /// Get the server address as a string
    ///
    /// Returns the address in the format "host:port"
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Check if TLS is enabled
    pub fn is_tls_enabled(&self) -> bool {
        self.tls.is_some()
    }

    /// Idle time after which a silent session is closed.
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }

    /// Allowed CORS origins, or `None` when any origin is allowed.
    pub fn allowed_origins(&self) -> Option<Vec<String>> {
        match self.cors_allowed_origins.as_deref().map(str::trim) {
            None | Some("") | Some("*") => None,
            Some(list) => Some(
                list.split(',')
                    .map(|origin| origin.trim().to_string())
                    .filter(|origin| !origin.is_empty())
                    .collect(),
            ),
        }
    }
}
