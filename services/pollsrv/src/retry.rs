//! Connection retry policy
//!
//! A fixed number of attempts with either a constant or an exponentially
//! growing delay between them, optionally jittered by ±25%.

use errors::{invalid_config, GridpollResult};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backoff {
    #[default]
    Fixed,
    Exponential,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total attempts, including the first one
    pub max_attempts: u32,
    pub initial_delay_ms: u64,
    /// Cap for exponential backoff
    pub max_delay_ms: u64,
    pub backoff: Backoff,
    pub backoff_multiplier: f64,
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 2,
            initial_delay_ms: 3000,
            max_delay_ms: 60_000,
            backoff: Backoff::Fixed,
            backoff_multiplier: 2.0,
            jitter: false,
        }
    }
}

impl RetryPolicy {
    pub fn fixed(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            initial_delay_ms: delay.as_millis() as u64,
            max_delay_ms: delay.as_millis() as u64,
            backoff: Backoff::Fixed,
            ..Self::default()
        }
    }

    pub fn exponential(
        max_attempts: u32,
        initial_delay: Duration,
        max_delay: Duration,
        multiplier: f64,
    ) -> Self {
        Self {
            max_attempts,
            initial_delay_ms: initial_delay.as_millis() as u64,
            max_delay_ms: max_delay.as_millis() as u64,
            backoff: Backoff::Exponential,
            backoff_multiplier: multiplier,
            jitter: false,
        }
    }

    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    pub fn validate(&self) -> GridpollResult<()> {
        if self.max_attempts == 0 {
            return Err(invalid_config!("retry.max_attempts", "must be at least 1"));
        }
        if self.backoff == Backoff::Exponential {
            if !(self.backoff_multiplier.is_finite() && self.backoff_multiplier >= 1.0) {
                return Err(invalid_config!(
                    "retry.backoff_multiplier",
                    "must be a finite number >= 1.0, got {}",
                    self.backoff_multiplier
                ));
            }
            if self.max_delay_ms < self.initial_delay_ms {
                return Err(invalid_config!(
                    "retry.max_delay_ms",
                    "{} is below initial_delay_ms {}",
                    self.max_delay_ms,
                    self.initial_delay_ms
                ));
            }
        }
        Ok(())
    }

    /// Attempts actually made; a zero in the config still tries once
    pub fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }

    /// Delay to wait after failed attempt number `attempt` (1-based)
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let initial = Duration::from_millis(self.initial_delay_ms);
        let mut delay = match self.backoff {
            Backoff::Fixed => initial,
            Backoff::Exponential => {
                let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
                let grown = self.initial_delay_ms as f64 * self.backoff_multiplier.powi(exponent);
                if grown.is_finite() && grown < self.max_delay_ms as f64 {
                    Duration::from_millis(grown as u64)
                } else {
                    Duration::from_millis(self.max_delay_ms)
                }
            },
        };

        if self.jitter && !delay.is_zero() {
            let range = delay.as_millis() as f64 * 0.25;
            let jitter = rand::thread_rng().gen_range(-range..range);
            delay = Duration::from_millis((delay.as_millis() as f64 + jitter).max(0.0) as u64);
        }

        delay
    }
}
