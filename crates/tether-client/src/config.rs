//! Client configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use tether_protocol::{PeerCapabilities, PeerInfo};

/// Main client configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ClientConfig {
    /// Client identification reported in the handshake
    pub client_info: PeerInfo,

    /// Capabilities declared to the server: the methods this client answers
    /// for server-initiated traffic and its willingness to accept
    /// event-stream delivery
    pub capabilities: PeerCapabilities,

    /// Timeout configurations
    pub timeouts: TimeoutConfig,

    /// Retry configurations
    pub retry: RetryConfig,
}

/// Timeout configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeoutConfig {
    /// Connection establishment timeout
    #[serde(with = "duration_serde")]
    pub connect: Duration,

    /// Per-request timeout; also arms the session's pending-entry timer
    #[serde(with = "duration_serde")]
    pub request: Duration,

    /// Handshake exchange timeout
    #[serde(with = "duration_serde")]
    pub handshake: Duration,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect: Duration::from_secs(10),
            request: Duration::from_secs(30),
            handshake: Duration::from_secs(15),
        }
    }
}

/// Retry configuration for retryable transport failures
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of attempts (1 = no retries)
    pub max_attempts: u32,

    /// Initial retry delay
    #[serde(with = "duration_serde")]
    pub initial_delay: Duration,

    /// Maximum retry delay
    #[serde(with = "duration_serde")]
    pub max_delay: Duration,

    /// Exponential backoff multiplier
    pub backoff_multiplier: f64,

    /// Jitter factor (0.0 to 1.0)
    pub jitter: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(10),
            backoff_multiplier: 2.0,
            jitter: 0.1,
        }
    }
}

impl RetryConfig {
    /// Calculate the delay before a given attempt number
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }

        let multiplier = self.backoff_multiplier.powi(attempt.saturating_sub(1) as i32);
        let mut delay = Duration::from_millis(
            (self.initial_delay.as_millis() as f64 * multiplier) as u64,
        );
        if delay > self.max_delay {
            delay = self.max_delay;
        }

        if self.jitter > 0.0 {
            let jitter_ms = (delay.as_millis() as f64 * self.jitter) as u64;
            let offset = (rand::random::<f64>() * jitter_ms as f64) as u64;
            delay = Duration::from_millis(delay.as_millis() as u64 + offset);
        }

        delay.min(self.max_delay)
    }

    /// Check whether another attempt is allowed
    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }
}

// Durations serialize as milliseconds
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}
