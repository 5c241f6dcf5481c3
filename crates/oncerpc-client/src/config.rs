use std::time::Duration;

/// Resend policy for transport failures.
///
/// Only transport-level failures are retried; encode/decode failures and
/// remote faults are terminal (see the error taxonomy in `oncerpc-common`).
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Total send attempts for one logical call, first try included.
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    /// Backoff is multiplied by this after every failed attempt.
    pub backoff_multiplier: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            max_attempts: 4,
            initial_backoff: Duration::from_millis(50),
            backoff_multiplier: 2,
        }
    }
}

/// Client-wide timeouts and retry policy.
#[derive(Debug, Clone, Copy)]
pub struct ClientConfig {
    /// Per-attempt deadline for the send/receive exchange.
    pub call_timeout: Duration,
    /// Bounded wait for a pooled connection.
    pub acquire_timeout: Duration,
    pub retry: RetryPolicy,
}

impl Default for ClientConfig {
    fn default() -> Self {
        ClientConfig {
            call_timeout: Duration::from_secs(30),
            acquire_timeout: Duration::from_secs(30),
            retry: RetryPolicy::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = ClientConfig::default();
        assert_eq!(config.call_timeout, Duration::from_secs(30));
        assert_eq!(config.acquire_timeout, Duration::from_secs(30));
        assert_eq!(config.retry.max_attempts, 4);
        assert_eq!(config.retry.initial_backoff, Duration::from_millis(50));
    }
}
