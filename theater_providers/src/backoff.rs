use std::time::Duration;

/// Linear backoff capped at a maximum: `initial * attempt`, never above `max`.
///
/// With the defaults this yields 2s, 4s, 6s, 8s, 10s, 10s, ...
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    pub initial: Duration,
    pub max: Duration,
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            initial: Duration::from_secs(2),
            max: Duration::from_secs(10),
        }
    }
}

impl Backoff {
    #[must_use]
    pub const fn new(initial: Duration, max: Duration) -> Self {
        Self { initial, max }
    }

    /// Delay before retrying after the `attempt`-th consecutive failure (1-based).
    #[must_use]
    pub fn delay(&self, attempt: u32) -> Duration {
        self.initial
            .checked_mul(attempt.max(1))
            .map_or(self.max, |delay| delay.min(self.max))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delays_grow_linearly_until_capped() {
        let backoff = Backoff::default();
        let delays: Vec<u64> = (1..=7).map(|i| backoff.delay(i).as_secs()).collect();
        assert_eq!(delays, vec![2, 4, 6, 8, 10, 10, 10]);
    }

    #[test]
    fn zeroth_attempt_is_treated_as_first() {
        let backoff = Backoff::new(Duration::from_millis(5), Duration::from_millis(50));
        assert_eq!(backoff.delay(0), Duration::from_millis(5));
    }

    #[test]
    fn overflow_saturates_to_max() {
        let backoff = Backoff::new(Duration::MAX, Duration::from_secs(3));
        assert_eq!(backoff.delay(u32::MAX), Duration::from_secs(3));
    }
}
