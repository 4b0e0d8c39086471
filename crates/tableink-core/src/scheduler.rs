//! Host-driven timing: the animation clock and deferred cleanup writes.

use crate::Millis;
use crate::store::StoreCommand;
use std::collections::BTreeMap;

/// Animation clock that only advances while something animates.
#[derive(Debug, Clone, Default)]
pub struct AnimationScheduler {
    /// Seconds of animation time elapsed while running.
    clock: f64,
    last_tick: Option<Millis>,
    stopped: bool,
}

impl AnimationScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Advance the clock. Returns the animation time in seconds when a frame
    /// should be drawn, or `None` when there is nothing to animate.
    pub fn tick(&mut self, now: Millis, animating: bool) -> Option<f64> {
        if self.stopped || !animating {
            if self.last_tick.take().is_some() {
                log::debug!("Animation idle, skipping frames");
            }
            return None;
        }
        if let Some(last) = self.last_tick {
            self.clock += now.saturating_sub(last) as f64 / 1000.0;
        }
        self.last_tick = Some(now);
        Some(self.clock)
    }

    /// Current animation time in seconds.
    pub fn time(&self) -> f64 {
        self.clock
    }

    pub fn is_running(&self) -> bool {
        self.last_tick.is_some()
    }

    /// Stop for good; later ticks are ignored.
    pub fn stop(&mut self) {
        self.stopped = true;
        self.last_tick = None;
    }
}

/// Writes scheduled for a later time, such as hard deletes of temporary
/// annotations. Fire and forget: nothing is retried.
#[derive(Debug, Clone, Default)]
pub struct CleanupTimers {
    due: BTreeMap<Millis, Vec<StoreCommand>>,
}

impl CleanupTimers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn schedule(&mut self, at: Millis, command: StoreCommand) {
        self.due.entry(at).or_default().push(command);
    }

    /// Remove and return every command due at or before `now`.
    pub fn take_due(&mut self, now: Millis) -> Vec<StoreCommand> {
        let later = self.due.split_off(&now.saturating_add(1));
        let ready = std::mem::replace(&mut self.due, later);
        ready.into_values().flatten().collect()
    }

    pub fn len(&self) -> usize {
        self.due.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.due.is_empty()
    }

    /// Drop every pending timer.
    pub fn clear(&mut self) {
        self.due.clear();
    }
}
