use std::time::Duration;

/// Exponential backoff schedule for socket reconnect attempts.
///
/// Reconnects are unbounded in count but bounded in delay: attempt `n`
/// waits `min(base * 2^n, max)`.
#[derive(Debug, Clone, Copy)]
pub struct ReconnectPolicy {
    base_delay_ms: u64,
    max_delay_ms: u64,
}

impl ReconnectPolicy {
    pub fn new(base_delay_ms: u64, max_delay_ms: u64) -> Self {
        Self {
            base_delay_ms,
            max_delay_ms,
        }
    }

    pub fn base_delay_ms(&self) -> u64 {
        self.base_delay_ms
    }

    pub fn max_delay_ms(&self) -> u64 {
        self.max_delay_ms
    }

    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let shift = attempt.min(20);
        let multiplier = 1_u64 << shift;
        let calculated = self.base_delay_ms.saturating_mul(multiplier);
        Duration::from_millis(calculated.min(self.max_delay_ms))
    }
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self::new(500, 15_000)
    }
}
