//! Probe result hysteresis.
//!
//! # State Transitions
//! ```text
//! → Unhealthy: consecutive failures >= unhealthy_threshold
//! → Healthy:   consecutive successes >= healthy_threshold
//! otherwise:   Pending (no write to the registry)
//! ```
//!
//! # Design Decisions
//! - Streaks live in-process; the registry only sees settled verdicts
//! - A result of the opposite kind resets the other streak
//! - Streaks for instances that disappear are dropped each round

use std::collections::HashSet;

use dashmap::DashMap;

/// What the monitor should do after a probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Healthy,
    Unhealthy,
    Pending,
}

#[derive(Debug, Default, Clone, Copy)]
struct Streak {
    successes: u32,
    failures: u32,
}

/// Consecutive probe results per instance key.
#[derive(Debug)]
pub struct HealthTracker {
    streaks: DashMap<String, Streak>,
    healthy_threshold: u32,
    unhealthy_threshold: u32,
}

impl HealthTracker {
    pub fn new(healthy_threshold: u32, unhealthy_threshold: u32) -> Self {
        Self {
            streaks: DashMap::new(),
            healthy_threshold: healthy_threshold.max(1),
            unhealthy_threshold: unhealthy_threshold.max(1),
        }
    }

    pub fn record(&self, key: &str, healthy: bool) -> Verdict {
        let mut streak = self.streaks.entry(key.to_string()).or_default();
        if healthy {
            streak.failures = 0;
            streak.successes = streak.successes.saturating_add(1);
            if streak.successes >= self.healthy_threshold {
                return Verdict::Healthy;
            }
        } else {
            streak.successes = 0;
            streak.failures = streak.failures.saturating_add(1);
            if streak.failures >= self.unhealthy_threshold {
                return Verdict::Unhealthy;
            }
        }
        Verdict::Pending
    }

    /// Forget every key not in `live`.
    pub fn retain(&self, live: &HashSet<String>) {
        self.streaks.retain(|key, _| live.contains(key));
    }

    pub fn len(&self) -> usize {
        self.streaks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.streaks.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unhealthy_after_threshold() {
        let tracker = HealthTracker::new(1, 2);
        assert_eq!(tracker.record("a", false), Verdict::Pending);
        assert_eq!(tracker.record("a", false), Verdict::Unhealthy);
        assert_eq!(tracker.record("a", false), Verdict::Unhealthy);
    }

    #[test]
    fn test_success_resets_failures() {
        let tracker = HealthTracker::new(2, 2);
        assert_eq!(tracker.record("a", false), Verdict::Pending);
        assert_eq!(tracker.record("a", true), Verdict::Pending);
        assert_eq!(tracker.record("a", false), Verdict::Pending);
        assert_eq!(tracker.record("a", true), Verdict::Pending);
        assert_eq!(tracker.record("a", true), Verdict::Healthy);
    }

    #[test]
    fn test_zero_thresholds_act_as_one() {
        let tracker = HealthTracker::new(0, 0);
        assert_eq!(tracker.record("a", true), Verdict::Healthy);
        assert_eq!(tracker.record("a", false), Verdict::Unhealthy);
    }

    #[test]
    fn test_retain_drops_unknown_keys() {
        let tracker = HealthTracker::new(1, 1);
        tracker.record("a", true);
        tracker.record("b", true);
        let live: HashSet<String> = ["a".to_string()].into_iter().collect();
        tracker.retain(&live);
        assert_eq!(tracker.len(), 1);
    }
}
