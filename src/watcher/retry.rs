use crate::config::ReconnectConfig;
use std::time::Duration;
use tokio::time::sleep;

/// Exponential backoff for re-opening a dropped progress channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconnectPolicy {
    max_attempts: u32,
    base_delay: Duration,
    max_delay: Duration,
    stable_after: Duration,
}

const DEFAULT_STABLE_AFTER: Duration = Duration::from_secs(30);

impl ReconnectPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
            max_delay: max_delay.max(base_delay),
            stable_after: DEFAULT_STABLE_AFTER,
        }
    }

    /// Minimum uptime before a dropped connection counts as a fresh start
    pub fn with_stable_after(mut self, stable_after: Duration) -> Self {
        self.stable_after = stable_after;
        self
    }

    pub fn from_config(config: &ReconnectConfig) -> Self {
        Self::new(
            config.max_attempts,
            Duration::from_millis(config.base_delay_ms),
            Duration::from_millis(config.max_delay_ms),
        )
        .with_stable_after(Duration::from_millis(config.stable_after_ms))
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }

    pub fn is_stable(&self, uptime: Duration) -> bool {
        uptime >= self.stable_after
    }

    /// base * 2^attempt, capped at `max_delay`
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let multiplier = 2u32.saturating_pow(attempt);
        self.base_delay
            .checked_mul(multiplier)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }

    pub async fn wait_before_retry(&self, attempt: u32) {
        let delay = self.delay_for(attempt);

        tracing::info!(
            "Reconnecting in {}ms (attempt {}/{})",
            delay.as_millis(),
            attempt + 1,
            self.max_attempts
        );
        sleep(delay).await;
    }
}
