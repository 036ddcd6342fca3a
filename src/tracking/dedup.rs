use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Rate-limits how often the same plate is persisted.
#[derive(Debug)]
pub struct DedupGate {
    window: Duration,
    last_accepted: HashMap<String, Instant>,
}

impl DedupGate {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            last_accepted: HashMap::new(),
        }
    }

    pub fn should_persist(&mut self, text: &str) -> bool {
        self.should_persist_at(text, Instant::now())
    }

    /// True, and remember `now`, when `text` was never accepted or was last
    /// accepted more than one window ago.
    pub fn should_persist_at(&mut self, text: &str, now: Instant) -> bool {
        match self.last_accepted.get(text) {
            Some(last) if now.saturating_duration_since(*last) <= self.window => false,
            _ => {
                self.last_accepted.insert(text.to_string(), now);
                true
            }
        }
    }

    /// Undo an acceptance made at `accepted_at`. A later acceptance of the
    /// same plate is left alone.
    pub fn release(&mut self, text: &str, accepted_at: Instant) {
        if self.last_accepted.get(text) == Some(&accepted_at) {
            self.last_accepted.remove(text);
        }
    }

    /// Number of plates currently held back.
    pub fn tracked(&self) -> usize {
        self.last_accepted.len()
    }

    /// Drop plates whose window has passed.
    pub fn forget_stale(&mut self, now: Instant) {
        let window = self.window;
        self.last_accepted
            .retain(|_, last| now.saturating_duration_since(*last) <= window);
    }
}
