//! Environment variable loading.
//!
//! `.env` files are loaded into the process environment by `main` before this
//! runs, so real environment variables and `.env` values look the same here.

use super::utils::{env_var, parse_env};

/// Raw values read from the environment. `None` means "not set".
#[derive(Debug, Clone, Default)]
pub(super) struct EnvConfig {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub tls_cert_path: Option<String>,
    pub tls_key_path: Option<String>,

    pub aws_region: Option<String>,
    pub aws_access_key_id: Option<String>,
    pub aws_secret_access_key: Option<String>,
    pub aws_session_token: Option<String>,
    pub bedrock_model_id: Option<String>,
    pub system_prompt: Option<String>,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
    pub top_p: Option<f32>,
    pub completion_timeout_seconds: Option<u64>,

    pub cors_allowed_origins: Option<String>,
    pub rate_limit_requests_per_second: Option<u32>,
    pub rate_limit_burst_size: Option<u32>,
    pub max_websocket_connections: Option<usize>,
    pub max_connections_per_ip: Option<u32>,

    pub session_idle_timeout_seconds: Option<u64>,
}

impl EnvConfig {
    /// Read every supported variable.
    ///
    /// # Errors
    /// Returns an error when a numeric variable is set but does not parse.
    pub fn load() -> Result<Self, Box<dyn std::error::Error>> {
        Ok(Self {
            host: env_var("HOST"),
            port: parse_env("PORT")?,
            tls_cert_path: env_var("TLS_CERT_PATH"),
            tls_key_path: env_var("TLS_KEY_PATH"),

            aws_region: env_var("AWS_REGION"),
            aws_access_key_id: env_var("AWS_ACCESS_KEY_ID"),
            aws_secret_access_key: env_var("AWS_SECRET_ACCESS_KEY"),
            aws_session_token: env_var("AWS_SESSION_TOKEN"),
            bedrock_model_id: env_var("BEDROCK_MODEL_ID"),
            system_prompt: env_var("SYSTEM_PROMPT"),
            max_tokens: parse_env("COMPLETION_MAX_TOKENS")?,
            temperature: parse_env("COMPLETION_TEMPERATURE")?,
            top_p: parse_env("COMPLETION_TOP_P")?,
            completion_timeout_seconds: parse_env("COMPLETION_TIMEOUT_SECONDS")?,

            cors_allowed_origins: env_var("CORS_ALLOWED_ORIGINS"),
            rate_limit_requests_per_second: parse_env("RATE_LIMIT_REQUESTS_PER_SECOND")?,
            rate_limit_burst_size: parse_env("RATE_LIMIT_BURST_SIZE")?,
            max_websocket_connections: parse_env("MAX_WEBSOCKET_CONNECTIONS")?,
            max_connections_per_ip: parse_env("MAX_CONNECTIONS_PER_IP")?,

            session_idle_timeout_seconds: parse_env("SESSION_IDLE_TIMEOUT_SECONDS")?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn clear_vars() {
        for key in [
            "HOST",
            "PORT",
            "BEDROCK_MODEL_ID",
            "COMPLETION_TEMPERATURE",
            "MAX_WEBSOCKET_CONNECTIONS",
        ] {
            unsafe { std::env::remove_var(key) };
        }
    }

    #[test]
    #[serial]
    fn test_load_reads_values() {
        clear_vars();
        unsafe {
            std::env::set_var("HOST", "127.0.0.1");
            std::env::set_var("PORT", "4000");
            std::env::set_var("BEDROCK_MODEL_ID", "test-model");
            std::env::set_var("COMPLETION_TEMPERATURE", "0.3");
        }

        let env = EnvConfig::load().unwrap();
        assert_eq!(env.host.as_deref(), Some("127.0.0.1"));
        assert_eq!(env.port, Some(4000));
        assert_eq!(env.bedrock_model_id.as_deref(), Some("test-model"));
        assert_eq!(env.temperature, Some(0.3));
        assert!(env.max_websocket_connections.is_none());

        clear_vars();
    }

    #[test]
    #[serial]
    fn test_load_rejects_bad_number() {
        clear_vars();
        unsafe { std::env::set_var("PORT", "not-a-port") };

        let err = EnvConfig::load().unwrap_err();
        assert!(err.to_string().contains("PORT"));

        clear_vars();
    }
}
