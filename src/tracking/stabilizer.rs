use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

/// Confirms a plate reading once the same exact string has been observed
/// `threshold` times within the trailing `window`.
#[derive(Debug)]
pub struct TemporalStabilizer {
    threshold: usize,
    window: Duration,
    max_observations: usize,
    entries: HashMap<String, VecDeque<Instant>>,
}

impl TemporalStabilizer {
    pub fn new(threshold: usize, window: Duration, max_observations: usize) -> Self {
        Self {
            threshold: threshold.max(1),
            window,
            max_observations: max_observations.max(threshold.max(1)),
            entries: HashMap::new(),
        }
    }

    pub fn observe(&mut self, text: &str) -> bool {
        self.observe_at(text, Instant::now())
    }

    /// Record an observation at `now` and report whether the reading is
    /// confirmed.
    pub fn observe_at(&mut self, text: &str, now: Instant) -> bool {
        let window = self.window;
        let seen = self.entries.entry(text.to_string()).or_default();

        while let Some(oldest) = seen.front() {
            if now.saturating_duration_since(*oldest) > window {
                seen.pop_front();
            } else {
                break;
            }
        }

        seen.push_back(now);
        if seen.len() > self.max_observations {
            seen.pop_front();
        }
        seen.len() >= self.threshold
    }

    /// Number of plate strings currently tracked.
    pub fn tracked(&self) -> usize {
        self.entries.len()
    }

    /// Drop every key whose observations have all aged out of the window.
    pub fn forget_stale(&mut self, now: Instant) {
        let window = self.window;
        self.entries.retain(|_, seen| {
            seen.back()
                .is_some_and(|last| now.saturating_duration_since(*last) <= window)
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stabilizer() -> TemporalStabilizer {
        TemporalStabilizer::new(2, Duration::from_secs(3), 32)
    }

    #[test]
    fn test_two_observations_within_window_confirm() {
        let mut s = stabilizer();
        let t0 = Instant::now();
        assert!(!s.observe_at("KA01AB1234", t0));
        assert!(s.observe_at("KA01AB1234", t0 + Duration::from_millis(500)));
    }

    #[test]
    fn test_single_observation_never_confirms() {
        let mut s = stabilizer();
        assert!(!s.observe_at("KA01AB1234", Instant::now()));
    }

    #[test]
    fn test_observations_outside_window_do_not_confirm() {
        let mut s = stabilizer();
        let t0 = Instant::now();
        assert!(!s.observe_at("KA01AB1234", t0));
        assert!(!s.observe_at("KA01AB1234", t0 + Duration::from_secs(4)));
        assert!(s.observe_at("KA01AB1234", t0 + Duration::from_secs(5)));
    }

    #[test]
    fn test_exact_string_match_only() {
        let mut s = stabilizer();
        let t0 = Instant::now();
        assert!(!s.observe_at("KA01AB1234", t0));
        assert!(!s.observe_at("KA01AB1284", t0));
        assert_eq!(s.tracked(), 2);
    }

    #[test]
    fn test_observation_history_is_bounded() {
        let mut s = TemporalStabilizer::new(2, Duration::from_secs(60), 4);
        let t0 = Instant::now();
        for i in 0..10 {
            s.observe_at("X", t0 + Duration::from_millis(i));
        }
        assert_eq!(s.entries["X"].len(), 4);
    }

    #[test]
    fn test_forget_stale_drops_expired_keys() {
        let mut s = stabilizer();
        let t0 = Instant::now();
        s.observe_at("OLD", t0);
        s.observe_at("NEW", t0 + Duration::from_secs(4));
        s.forget_stale(t0 + Duration::from_secs(5));
        assert_eq!(s.tracked(), 1);
        assert!(s.entries.contains_key("NEW"));
    }
}
