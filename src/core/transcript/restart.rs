//! Bounded restart policy for recognizers and relay connections.
//!
//! Continuous recognizers end on their own (silence, browser limits) and fail
//! with a mix of transient and permanent errors. Restarting them, or the relay
//! connection they feed, uses exponential backoff with a ceiling on
//! consecutive attempts so a persistent failure cannot become a tight loop.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Error codes reported by a speech recognizer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecognitionErrorKind {
    NoSpeech,
    Aborted,
    AudioCapture,
    NotAllowed,
    Network,
    ServiceNotAllowed,
    Other(String),
}

impl RecognitionErrorKind {
    /// Parse a recognizer error code (e.g. `"no-speech"`).
    pub fn from_code(code: &str) -> Self {
        match code {
            "no-speech" => Self::NoSpeech,
            "aborted" => Self::Aborted,
            "audio-capture" => Self::AudioCapture,
            "not-allowed" => Self::NotAllowed,
            "network" => Self::Network,
            "service-not-allowed" => Self::ServiceNotAllowed,
            other => Self::Other(other.to_string()),
        }
    }

    /// Whether restarting the recognizer can help.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::NoSpeech | Self::Aborted)
    }
}

impl fmt::Display for RecognitionErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoSpeech => write!(f, "no-speech"),
            Self::Aborted => write!(f, "aborted"),
            Self::AudioCapture => write!(f, "audio-capture"),
            Self::NotAllowed => write!(f, "not-allowed"),
            Self::Network => write!(f, "network"),
            Self::ServiceNotAllowed => write!(f, "service-not-allowed"),
            Self::Other(code) => write!(f, "{code}"),
        }
    }
}

/// Backoff configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RestartPolicy {
    /// Consecutive restarts allowed before giving up
    pub max_consecutive_restarts: u32,
    /// Delay before the first restart (milliseconds)
    pub initial_delay_ms: u64,
    /// Upper bound on any single delay (milliseconds)
    pub max_delay_ms: u64,
    pub backoff_multiplier: f32,
    /// Add up to ±25% jitter to each delay
    pub jitter: bool,
}

impl Default for RestartPolicy {
    fn default() -> Self {
        Self {
            max_consecutive_restarts: 5,
            initial_delay_ms: 100,
            max_delay_ms: 5000,
            backoff_multiplier: 2.0,
            jitter: true,
        }
    }
}

impl RestartPolicy {
    /// Delay for the given attempt number (1-based).
    pub fn calculate_delay(&self, attempt: u32) -> Duration {
        let base = self.initial_delay_ms as f64;
        let multiplier = self.backoff_multiplier as f64;

        let delay = base * multiplier.powi(attempt.saturating_sub(1) as i32);
        let delay = delay.min(self.max_delay_ms as f64);

        let delay = if self.jitter {
            (delay + rand_jitter(delay * 0.25)).max(0.0)
        } else {
            delay
        };
        Duration::from_millis(delay as u64)
    }

    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_consecutive_restarts
    }
}

/// Pseudo-random value in `[-range, range]` from the system clock.
fn rand_jitter(range: f64) -> f64 {
    use std::time::SystemTime;
    let seed = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos() as u64;
    let random = ((seed.wrapping_mul(1103515245).wrapping_add(12345)) % (1 << 31)) as f64;
    let normalized = random / (1u64 << 31) as f64;
    (normalized - 0.5) * 2.0 * range
}

/// Outcome of a restart decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RestartDecision {
    /// Restart after the given delay
    Restart(Duration),
    /// Stop; the reason is suitable for display
    GiveUp(String),
}

/// Tracks consecutive restarts against a [`RestartPolicy`].
#[derive(Debug, Clone)]
pub struct RestartTracker {
    policy: RestartPolicy,
    consecutive: u32,
}

impl RestartTracker {
    pub fn new(policy: RestartPolicy) -> Self {
        Self {
            policy,
            consecutive: 0,
        }
    }

    pub fn consecutive_restarts(&self) -> u32 {
        self.consecutive
    }

    /// Recognition produced output; the failure streak is over.
    pub fn on_success(&mut self) {
        self.consecutive = 0;
    }

    /// The recognizer (or connection) ended without an error.
    pub fn on_end(&mut self) -> RestartDecision {
        self.next("ended repeatedly without recovering")
    }

    /// The recognizer reported an error.
    pub fn on_error(&mut self, kind: &RecognitionErrorKind) -> RestartDecision {
        if !kind.is_transient() {
            return RestartDecision::GiveUp(format!("recognition error: {kind}"));
        }
        self.next("too many consecutive recognition errors")
    }

    fn next(&mut self, reason: &str) -> RestartDecision {
        if !self.policy.should_retry(self.consecutive) {
            return RestartDecision::GiveUp(format!(
                "{reason} ({} restarts)",
                self.consecutive
            ));
        }
        self.consecutive += 1;
        RestartDecision::Restart(self.policy.calculate_delay(self.consecutive))
    }
}
