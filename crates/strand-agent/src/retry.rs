//! Retry policy for retryable provider failures.
//!
//! When the most recent assistant message carries an error the classifier
//! marks retryable, the host may re-enter the loop with no new prompt.
//! Backoff is exponential with a ceiling; this counter is distinct from
//! the loop's bounded-turns counter.

use std::time::Duration;

use tracing::info;

use crate::agent::Agent;
use crate::error::Result;

/// Retry configuration.
#[derive(Debug, Clone, Copy)]
pub struct RetryConfig {
    /// First delay.
    pub base: Duration,
    /// Delay ceiling.
    pub max: Duration,
    /// Maximum retry attempts.
    pub attempts: u32,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            base: Duration::from_millis(2000),
            max: Duration::from_millis(60_000),
            attempts: 3,
        }
    }
}

/// `min(base * 2^(attempt-1), max)` for 1-based attempts.
pub fn backoff_delay(config: &RetryConfig, attempt: u32) -> Duration {
    let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
    config.base.saturating_mul(factor).min(config.max)
}

/// Re-run the agent while its last assistant message carries a retryable
/// error, sleeping the backoff delay between attempts. Returns after the
/// first clean run, a non-retryable error, or attempt exhaustion.
pub async fn run_with_retry(agent: &mut Agent, config: &RetryConfig) -> Result<()> {
    agent.run().await?;

    for attempt in 1..=config.attempts {
        let retryable = agent
            .last_error()
            .map(|error| error.kind.is_retryable())
            .unwrap_or(false);
        if !retryable {
            return Ok(());
        }

        let delay = backoff_delay(config, attempt);
        info!(attempt, delay_ms = delay.as_millis() as u64, "retrying after error");
        tokio::time::sleep(delay).await;
        agent.run().await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_until_the_ceiling() {
        let config = RetryConfig::default();
        assert_eq!(backoff_delay(&config, 1), Duration::from_millis(2000));
        assert_eq!(backoff_delay(&config, 2), Duration::from_millis(4000));
        assert_eq!(backoff_delay(&config, 3), Duration::from_millis(8000));
        assert_eq!(backoff_delay(&config, 6), Duration::from_millis(60_000));
        assert_eq!(backoff_delay(&config, 30), Duration::from_millis(60_000));
    }

    #[test]
    fn defaults_match_policy() {
        let config = RetryConfig::default();
        assert_eq!(config.base, Duration::from_millis(2000));
        assert_eq!(config.max, Duration::from_millis(60_000));
        assert_eq!(config.attempts, 3);
    }
}
