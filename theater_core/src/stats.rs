//! Per-tier attempt/success counters.
//!
//! A session owns one [`TierStats`] behind an `Arc`; the loop task writes
//! through it during a completion call while status reporting reads
//! snapshots without waiting for the call to finish.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use serde::Serialize;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TierCounter {
    pub attempts: u64,
    pub successes: u64,
}

#[derive(Debug, Default)]
pub struct TierStats {
    tiers: Mutex<BTreeMap<String, TierCounter>>,
}

impl TierStats {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<String, TierCounter>> {
        self.tiers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn record_attempt(&self, tier: &str) {
        self.lock().entry(tier.to_string()).or_default().attempts += 1;
    }

    pub fn record_success(&self, tier: &str) {
        self.lock().entry(tier.to_string()).or_default().successes += 1;
    }

    #[must_use]
    pub fn get(&self, tier: &str) -> TierCounter {
        self.lock().get(tier).copied().unwrap_or_default()
    }

    #[must_use]
    pub fn snapshot(&self) -> BTreeMap<String, TierCounter> {
        self.lock().clone()
    }

    pub fn reset(&self) {
        self.lock().clear();
    }
}

/// Sum several snapshots into one.
#[must_use]
pub fn merge<'a>(
    snapshots: impl IntoIterator<Item = &'a BTreeMap<String, TierCounter>>,
) -> BTreeMap<String, TierCounter> {
    let mut total: BTreeMap<String, TierCounter> = BTreeMap::new();
    for snapshot in snapshots {
        for (tier, counter) in snapshot {
            let entry = total.entry(tier.clone()).or_default();
            entry.attempts += counter.attempts;
            entry.successes += counter.successes;
        }
    }
    total
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_accumulate_per_tier() {
        let stats = TierStats::new();
        stats.record_attempt("primary");
        stats.record_attempt("secondary");
        stats.record_success("secondary");

        assert_eq!(
            stats.get("primary"),
            TierCounter {
                attempts: 1,
                successes: 0
            }
        );
        assert_eq!(stats.get("secondary").successes, 1);
        assert_eq!(stats.get("unknown"), TierCounter::default());

        stats.reset();
        assert!(stats.snapshot().is_empty());
    }

    #[test]
    fn merge_sums_snapshots() {
        let a = TierStats::new();
        a.record_attempt("primary");
        a.record_success("primary");
        let b = TierStats::new();
        b.record_attempt("primary");

        let total = merge([&a.snapshot(), &b.snapshot()]);
        assert_eq!(
            total["primary"],
            TierCounter {
                attempts: 2,
                successes: 1
            }
        );
    }
}
