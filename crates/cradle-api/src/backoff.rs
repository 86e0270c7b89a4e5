//! Reconnection backoff policy.
//!
//! `delay = min(base * 2^min(attempt, cap), max) + jitter`, where jitter
//! is drawn uniformly from `[0, base]`. With the default base = max = 5s
//! the exponential term is always clamped, giving the 5-10s reconnect
//! cadence the devices expect while still spreading out simultaneous
//! reconnects from multiple clients.

use std::time::Duration;

/// Exponent cap -- beyond this the shift would overflow anyway and the
/// `max` clamp has long since taken over.
const ATTEMPT_CAP: u32 = 16;

/// Exponential backoff configuration for transport reconnection.
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    /// Base delay, also the jitter range. Default: 5s.
    pub base_delay: Duration,

    /// Upper bound on the exponential term (pre-jitter). Default: 5s.
    pub max_delay: Duration,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs(5),
            max_delay: Duration::from_secs(5),
        }
    }
}

impl ReconnectConfig {
    /// Delay to wait before reconnection attempt number `attempt`
    /// (zero-based). Pure apart from the jitter draw.
    pub fn next_delay(&self, attempt: u32) -> Duration {
        let base_ms = self.base_delay.as_millis() as u64;
        let exp_ms = base_ms.saturating_mul(1u64 << attempt.min(ATTEMPT_CAP));
        let capped_ms = exp_ms.min(self.max_delay.as_millis() as u64);
        let jitter_ms = fastrand::u64(0..=base_ms);
        Duration::from_millis(capped_ms + jitter_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_five_seconds_base_and_max() {
        let config = ReconnectConfig::default();
        assert_eq!(config.base_delay, Duration::from_secs(5));
        assert_eq!(config.max_delay, Duration::from_secs(5));
    }

    #[test]
    fn delay_stays_within_jitter_envelope() {
        let config = ReconnectConfig::default();
        for attempt in [0, 1, 5, 100] {
            let d = config.next_delay(attempt);
            assert!(d >= Duration::from_secs(5), "attempt {attempt}: {d:?}");
            assert!(d <= Duration::from_secs(10), "attempt {attempt}: {d:?}");
        }
    }

    #[test]
    fn exponential_phase_before_the_clamp() {
        let config = ReconnectConfig {
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
        };
        // jitter adds at most `base`, so attempt 3 (8s) always exceeds
        // the attempt 0 envelope (1s + 1s).
        let d0 = config.next_delay(0);
        let d3 = config.next_delay(3);
        assert!(d3 > d0, "d3 ({d3:?}) should exceed d0 ({d0:?})");
        assert!(d3 >= Duration::from_secs(8));
    }

    #[test]
    fn huge_attempt_counts_do_not_overflow() {
        let config = ReconnectConfig::default();
        let d = config.next_delay(u32::MAX);
        assert!(d <= Duration::from_secs(10));
    }
}
