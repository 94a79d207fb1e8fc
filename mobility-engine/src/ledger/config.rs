use std::time::Duration;

/// Retry policy for ledger submissions.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Retries after the first submission before giving up.
    pub max_retries: u32,

    /// Delay before the first retry.
    pub initial_delay: Duration,

    /// Growth factor applied to the delay on each further retry.
    pub multiplier: f64,

    /// Upper bound on any single delay.
    pub max_delay: Duration,

    /// Percentage added to the fee after an underpriced rejection.
    pub fee_bump_percent: u32,

    /// Status polls before a submission counts as timed out.
    pub confirm_polls: u32,

    /// Pause between status polls.
    pub poll_interval: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 5,
            initial_delay: Duration::from_millis(100),
            multiplier: 2.0,
            max_delay: Duration::from_secs(5),
            fee_bump_percent: 25,
            confirm_polls: 3,
            poll_interval: Duration::from_millis(50),
        }
    }
}

impl RetryConfig {
    pub fn new(
        max_retries: u32,
        initial_delay: Duration,
        multiplier: f64,
        max_delay: Duration,
        fee_bump_percent: u32,
        confirm_polls: u32,
        poll_interval: Duration,
    ) -> Self {
        Self {
            max_retries,
            initial_delay,
            multiplier,
            max_delay,
            fee_bump_percent,
            confirm_polls,
            poll_interval,
        }
    }

    /// Backoff before retry number `attempt` (1-based).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let secs = self.initial_delay.as_secs_f64() * self.multiplier.powi(exponent);
        if !secs.is_finite() || secs >= self.max_delay.as_secs_f64() {
            return self.max_delay;
        }
        Duration::from_secs_f64(secs)
    }

    /// Fee to offer after an underpriced rejection. Always strictly higher.
    pub fn bumped_fee(&self, fee: u64) -> u64 {
        let bumped = fee.saturating_mul(100 + u64::from(self.fee_bump_percent)).div_ceil(100);
        bumped.max(fee.saturating_add(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = RetryConfig::default();
        assert_eq!(config.max_retries, 5);
        assert_eq!(config.initial_delay, Duration::from_millis(100));
        assert_eq!(config.fee_bump_percent, 25);
        assert_eq!(config.confirm_polls, 3);
    }

    #[test]
    fn custom_config() {
        let config = RetryConfig::new(
            2,
            Duration::from_millis(1),
            3.0,
            Duration::from_millis(5),
            10,
            1,
            Duration::from_millis(1),
        );
        assert_eq!(config.max_retries, 2);
        assert_eq!(config.multiplier, 3.0);
        assert_eq!(config.poll_interval, Duration::from_millis(1));
    }

    #[test]
    fn exponential_backoff_is_capped() {
        let config = RetryConfig::new(
            10,
            Duration::from_secs(1),
            2.0,
            Duration::from_secs(10),
            25,
            3,
            Duration::from_millis(50),
        );
        assert_eq!(config.delay_for_attempt(1), Duration::from_secs(1));
        assert_eq!(config.delay_for_attempt(2), Duration::from_secs(2));
        assert_eq!(config.delay_for_attempt(3), Duration::from_secs(4));
        assert_eq!(config.delay_for_attempt(4), Duration::from_secs(8));
        assert_eq!(config.delay_for_attempt(5), Duration::from_secs(10));
        assert_eq!(config.delay_for_attempt(60), Duration::from_secs(10));
    }

    #[test]
    fn fee_bump_always_increases() {
        let config = RetryConfig::default();
        assert_eq!(config.bumped_fee(8), 10);
        assert_eq!(config.bumped_fee(100), 125);
        assert_eq!(config.bumped_fee(1), 2);
        assert_eq!(config.bumped_fee(0), 1);
    }
}
