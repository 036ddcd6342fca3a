//! Cross-frame plate state shared by every stream session.

mod dedup;
mod stabilizer;

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio::task::JoinHandle;

use crate::config::TrackingSettings;

pub use dedup::DedupGate;
pub use stabilizer::TemporalStabilizer;

/// Outcome of observing one plate reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrackDecision {
    pub confirmed: bool,
    pub persist: bool,
    /// When the reading was observed; pass back to [`PlateTracker::release`].
    pub observed_at: Instant,
}

#[derive(Debug)]
struct TrackerState {
    stabilizer: TemporalStabilizer,
    dedup: DedupGate,
}

/// Owns the stabilizer and the dedup gate behind one lock, so a reading is
/// counted and gated atomically even when several connections see the same
/// plate at once.
#[derive(Debug)]
pub struct PlateTracker {
    state: Mutex<TrackerState>,
}

impl PlateTracker {
    pub fn new(settings: &TrackingSettings) -> Self {
        Self {
            state: Mutex::new(TrackerState {
                stabilizer: TemporalStabilizer::new(
                    settings.confirm_threshold,
                    settings.confirm_window(),
                    settings.max_observations,
                ),
                dedup: DedupGate::new(settings.dedup_window()),
            }),
        }
    }

    pub fn observe(&self, text: &str) -> TrackDecision {
        self.observe_at(text, Instant::now())
    }

    pub fn observe_at(&self, text: &str, now: Instant) -> TrackDecision {
        let mut state = self.state.lock();
        let confirmed = state.stabilizer.observe_at(text, now);
        // The gate only records plates that passed confirmation.
        let persist = confirmed && state.dedup.should_persist_at(text, now);
        TrackDecision {
            confirmed,
            persist,
            observed_at: now,
        }
    }

    /// Give back a persist decision whose write did not happen, so the next
    /// confirmed reading of `text` may persist.
    pub fn release(&self, text: &str, decision: &TrackDecision) {
        if decision.persist {
            self.state.lock().dedup.release(text, decision.observed_at);
        }
    }

    /// Plates held by the stabilizer and by the dedup gate.
    pub fn tracked(&self) -> (usize, usize) {
        let state = self.state.lock();
        (state.stabilizer.tracked(), state.dedup.tracked())
    }

    pub fn forget_stale_at(&self, now: Instant) {
        let mut state = self.state.lock();
        state.stabilizer.forget_stale(now);
        state.dedup.forget_stale(now);
    }

    /// Sweep expired plates every `period` until the task is aborted.
    pub fn spawn_sweeper(self: &Arc<Self>, period: Duration) -> JoinHandle<()> {
        let weak = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(tracker) = weak.upgrade() else {
                    break;
                };
                tracker.forget_stale_at(Instant::now());
                let (observed, held) = tracker.tracked();
                tracing::debug!(observed, held, "Plate tracker swept");
            }
        })
    }
}
