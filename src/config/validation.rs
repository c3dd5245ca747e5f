//! Validation of the merged configuration.

use crate::core::completion::CompletionConfig;

/// Validate completion model parameters.
///
/// # Errors
/// Returns an error when a sampling parameter is out of range, the token or
/// timeout budget is zero, or only one half of an explicit AWS key pair is set.
pub(super) fn validate_completion(
    config: &CompletionConfig,
) -> Result<(), Box<dyn std::error::Error>> {
    if config.model_id.trim().is_empty() {
        return Err("Completion model id must not be empty".into());
    }

    if config.max_tokens == 0 {
        return Err("Completion max_tokens must be greater than 0".into());
    }

    if !(0.0..=1.0).contains(&config.temperature) {
        return Err(format!(
            "Completion temperature must be between 0.0 and 1.0, got {}",
            config.temperature
        )
        .into());
    }

    if !(config.top_p > 0.0 && config.top_p <= 1.0) {
        return Err(format!(
            "Completion top_p must be in (0.0, 1.0], got {}",
            config.top_p
        )
        .into());
    }

    if config.timeout_secs == 0 {
        return Err("Completion timeout must be greater than 0 seconds".into());
    }

    match (&config.aws_access_key_id, &config.aws_secret_access_key) {
        (Some(_), None) => Err("AWS_ACCESS_KEY_ID is set but AWS_SECRET_ACCESS_KEY is missing".into()),
        (None, Some(_)) => Err("AWS_SECRET_ACCESS_KEY is set but AWS_ACCESS_KEY_ID is missing".into()),
        _ => Ok(()),
    }
}

/// Validate session and admission limits.
///
/// # Errors
/// Returns an error when a limit that must be positive is zero.
pub(super) fn validate_limits(
    idle_timeout_secs: u64,
    rate_limit_requests_per_second: u32,
    max_connections_per_ip: u32,
) -> Result<(), Box<dyn std::error::Error>> {
    if idle_timeout_secs == 0 {
        return Err("Session idle timeout must be greater than 0 seconds".into());
    }
    if rate_limit_requests_per_second == 0 {
        return Err("Rate limit must allow at least 1 request per second".into());
    }
    if max_connections_per_ip == 0 {
        return Err("max_connections_per_ip must be greater than 0".into());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_completion_is_valid() {
        assert!(validate_completion(&CompletionConfig::default()).is_ok());
    }

    #[test]
    fn test_temperature_out_of_range() {
        let config = CompletionConfig {
            temperature: 1.5,
            ..Default::default()
        };
        let err = validate_completion(&config).unwrap_err();
        assert!(err.to_string().contains("temperature"));
    }

    #[test]
    fn test_top_p_zero_rejected() {
        let config = CompletionConfig {
            top_p: 0.0,
            ..Default::default()
        };
        assert!(validate_completion(&config).is_err());
    }

    #[test]
    fn test_zero_max_tokens_rejected() {
        let config = CompletionConfig {
            max_tokens: 0,
            ..Default::default()
        };
        assert!(validate_completion(&config).is_err());
    }

    #[test]
    fn test_half_credentials_rejected() {
        let config = CompletionConfig {
            aws_access_key_id: Some("AKIA".to_string()),
            ..Default::default()
        };
        let err = validate_completion(&config).unwrap_err();
        assert!(err.to_string().contains("AWS_SECRET_ACCESS_KEY"));
    }

    #[test]
    fn test_limits() {
        assert!(validate_limits(300, 60, 100).is_ok());
        assert!(validate_limits(0, 60, 100).is_err());
        assert!(validate_limits(300, 0, 100).is_err());
        assert!(validate_limits(300, 60, 0).is_err());
    }
}
