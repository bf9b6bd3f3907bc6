//! Additive backoff for status polling

use std::time::Duration;

use mu_core::PollingConfig;

/// Delay grows by a fixed step on each transient failure, capped, and snaps
/// back to the base after any successful poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    base: Duration,
    step: Duration,
    max: Duration,
    current: Duration,
}

impl Backoff {
    pub fn new(config: &PollingConfig) -> Self {
        let base = Duration::from_millis(config.base_delay_ms);
        Self {
            base,
            step: Duration::from_millis(config.step_ms),
            max: Duration::from_millis(config.max_delay_ms),
            current: base,
        }
    }

    pub fn current(&self) -> Duration {
        self.current
    }

    pub fn reset(&mut self) -> Duration {
        self.current = self.base;
        self.current
    }

    pub fn grow(&mut self) -> Duration {
        self.current = (self.current + self.step).min(self.max);
        self.current
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new(&PollingConfig::default())
    }
}
