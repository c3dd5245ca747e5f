//! Merging of YAML and environment configuration.
//!
//! Priority: YAML > environment (including `.env`) > defaults.

use std::path::PathBuf;

use super::env::EnvConfig;
use super::yaml::YamlConfig;
use super::{
    DEFAULT_HOST, DEFAULT_IDLE_TIMEOUT_SECS, DEFAULT_MAX_CONNECTIONS_PER_IP, DEFAULT_PORT,
    DEFAULT_RATE_LIMIT_BURST, DEFAULT_RATE_LIMIT_RPS, ServerConfig, TlsConfig,
};
use crate::core::completion::CompletionConfig;

/// Build a [`ServerConfig`] from the environment and an optional YAML overlay.
///
/// # Errors
/// Fails when an environment variable does not parse or the TLS section is
/// half configured.
pub(super) fn merge_config(
    yaml: Option<YamlConfig>,
) -> Result<ServerConfig, Box<dyn std::error::Error>> {
    let env = EnvConfig::load()?;
    let yaml = yaml.unwrap_or_default();

    let server = yaml.server.unwrap_or_default();
    let completion = yaml.completion.unwrap_or_default();
    let security = yaml.security.unwrap_or_default();
    let session = yaml.session.unwrap_or_default();

    let host = server
        .host
        .or(env.host)
        .unwrap_or_else(|| DEFAULT_HOST.to_string());
    let port = server.port.or(env.port).unwrap_or(DEFAULT_PORT);

    let tls = merge_tls(
        server.tls.as_ref().and_then(|t| t.enabled),
        server.tls.as_ref().and_then(|t| t.cert_path.clone()),
        server.tls.as_ref().and_then(|t| t.key_path.clone()),
        env.tls_cert_path,
        env.tls_key_path,
    )?;

    let defaults = CompletionConfig::default();
    let completion = CompletionConfig {
        model_id: completion
            .model_id
            .or(env.bedrock_model_id)
            .unwrap_or(defaults.model_id.clone()),
        region: completion
            .region
            .or(env.aws_region)
            .unwrap_or(defaults.region.clone()),
        aws_access_key_id: completion.aws_access_key_id.or(env.aws_access_key_id),
        aws_secret_access_key: completion
            .aws_secret_access_key
            .or(env.aws_secret_access_key),
        aws_session_token: completion.aws_session_token.or(env.aws_session_token),
        system_prompt: completion
            .system_prompt
            .or(env.system_prompt)
            .unwrap_or(defaults.system_prompt.clone()),
        max_tokens: completion
            .max_tokens
            .or(env.max_tokens)
            .unwrap_or(defaults.max_tokens),
        temperature: completion
            .temperature
            .or(env.temperature)
            .unwrap_or(defaults.temperature),
        top_p: completion.top_p.or(env.top_p).unwrap_or(defaults.top_p),
        timeout_secs: completion
            .timeout_seconds
            .or(env.completion_timeout_seconds)
            .unwrap_or(defaults.timeout_secs),
    };

    Ok(ServerConfig {
        host,
        port,
        tls,
        completion,
        cors_allowed_origins: security.cors_allowed_origins.or(env.cors_allowed_origins),
        rate_limit_requests_per_second: security
            .rate_limit_requests_per_second
            .or(env.rate_limit_requests_per_second)
            .unwrap_or(DEFAULT_RATE_LIMIT_RPS),
        rate_limit_burst_size: security
            .rate_limit_burst_size
            .or(env.rate_limit_burst_size)
            .unwrap_or(DEFAULT_RATE_LIMIT_BURST),
        max_websocket_connections: security
            .max_websocket_connections
            .or(env.max_websocket_connections),
        max_connections_per_ip: security
            .max_connections_per_ip
            .or(env.max_connections_per_ip)
            .unwrap_or(DEFAULT_MAX_CONNECTIONS_PER_IP),
        idle_timeout_secs: session
            .idle_timeout_seconds
            .or(env.session_idle_timeout_seconds)
            .unwrap_or(DEFAULT_IDLE_TIMEOUT_SECS),
    })
}

fn merge_tls(
    yaml_enabled: Option<bool>,
    yaml_cert: Option<String>,
    yaml_key: Option<String>,
    env_cert: Option<String>,
    env_key: Option<String>,
) -> Result<Option<TlsConfig>, Box<dyn std::error::Error>> {
    if yaml_enabled == Some(false) {
        return Ok(None);
    }

    let cert = yaml_cert.or(env_cert);
    let key = yaml_key.or(env_key);

    match (cert, key) {
        (Some(cert), Some(key)) => Ok(Some(TlsConfig {
            cert_path: PathBuf::from(cert),
            key_path: PathBuf::from(key),
        })),
        (None, None) if yaml_enabled == Some(true) => {
            Err("TLS is enabled but cert_path and key_path are not set".into())
        }
        (None, None) => Ok(None),
        (Some(_), None) => Err("TLS certificate path is set but key path is missing".into()),
        (None, Some(_)) => Err("TLS key path is set but certificate path is missing".into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::yaml::{CompletionYaml, SecurityYaml, ServerYaml, TlsYaml};
    use serial_test::serial;

    const VARS: &[&str] = &[
        "HOST",
        "PORT",
        "TLS_CERT_PATH",
        "TLS_KEY_PATH",
        "AWS_REGION",
        "BEDROCK_MODEL_ID",
        "COMPLETION_MAX_TOKENS",
        "RATE_LIMIT_REQUESTS_PER_SECOND",
        "SESSION_IDLE_TIMEOUT_SECONDS",
    ];

    fn clear_vars() {
        for key in VARS {
            unsafe { std::env::remove_var(key) };
        }
    }

    #[test]
    #[serial]
    fn test_defaults_without_sources() {
        clear_vars();
        let config = merge_config(None).unwrap();

        assert_eq!(config.host, DEFAULT_HOST);
        assert_eq!(config.port, DEFAULT_PORT);
        assert!(config.tls.is_none());
        assert_eq!(config.rate_limit_requests_per_second, DEFAULT_RATE_LIMIT_RPS);
        assert_eq!(config.idle_timeout_secs, DEFAULT_IDLE_TIMEOUT_SECS);
        assert_eq!(config.completion.max_tokens, 500);
    }

    #[test]
    #[serial]
    fn test_env_overrides_defaults() {
        clear_vars();
        unsafe {
            std::env::set_var("PORT", "4100");
            std::env::set_var("BEDROCK_MODEL_ID", "env-model");
            std::env::set_var("SESSION_IDLE_TIMEOUT_SECONDS", "60");
        }

        let config = merge_config(None).unwrap();
        assert_eq!(config.port, 4100);
        assert_eq!(config.completion.model_id, "env-model");
        assert_eq!(config.idle_timeout_secs, 60);

        clear_vars();
    }

    #[test]
    #[serial]
    fn test_yaml_overrides_env() {
        clear_vars();
        unsafe {
            std::env::set_var("PORT", "4100");
            std::env::set_var("BEDROCK_MODEL_ID", "env-model");
            std::env::set_var("RATE_LIMIT_REQUESTS_PER_SECOND", "7");
        }

        let yaml = YamlConfig {
            server: Some(ServerYaml {
                port: Some(5200),
                ..Default::default()
            }),
            completion: Some(CompletionYaml {
                model_id: Some("yaml-model".to_string()),
                ..Default::default()
            }),
            security: Some(SecurityYaml::default()),
            session: None,
        };

        let config = merge_config(Some(yaml)).unwrap();
        assert_eq!(config.port, 5200);
        assert_eq!(config.completion.model_id, "yaml-model");
        // Not in YAML, so the environment still wins over the default.
        assert_eq!(config.rate_limit_requests_per_second, 7);

        clear_vars();
    }

    #[test]
    #[serial]
    fn test_tls_from_env() {
        clear_vars();
        unsafe {
            std::env::set_var("TLS_CERT_PATH", "/tmp/cert.pem");
            std::env::set_var("TLS_KEY_PATH", "/tmp/key.pem");
        }

        let config = merge_config(None).unwrap();
        let tls = config.tls.as_ref().unwrap();
        assert_eq!(tls.cert_path, PathBuf::from("/tmp/cert.pem"));
        assert_eq!(tls.key_path, PathBuf::from("/tmp/key.pem"));

        clear_vars();
    }

    #[test]
    #[serial]
    fn test_tls_half_configured_fails() {
        clear_vars();
        unsafe { std::env::set_var("TLS_CERT_PATH", "/tmp/cert.pem") };

        let err = merge_config(None).unwrap_err();
        assert!(err.to_string().contains("key path is missing"));

        clear_vars();
    }

    #[test]
    #[serial]
    fn test_tls_disabled_in_yaml() {
        clear_vars();
        unsafe {
            std::env::set_var("TLS_CERT_PATH", "/tmp/cert.pem");
            std::env::set_var("TLS_KEY_PATH", "/tmp/key.pem");
        }

        let yaml = YamlConfig {
            server: Some(ServerYaml {
                tls: Some(TlsYaml {
                    enabled: Some(false),
                    ..Default::default()
                }),
                ..Default::default()
            }),
            ..Default::default()
        };

        let config = merge_config(Some(yaml)).unwrap();
        assert!(config.tls.is_none());

        clear_vars();
    }
}
