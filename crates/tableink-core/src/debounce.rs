//! Debounced persistence of map edits.
//!
//! Grid edits are applied locally at once; the store only sees the merged
//! patch after the user has been quiet for the debounce interval.

use crate::Millis;
use crate::map::MapPatch;

#[derive(Debug, Clone)]
pub struct MapPatchDebouncer {
    interval_ms: Millis,
    pending: Option<MapPatch>,
    last_edit: Millis,
}

impl MapPatchDebouncer {
    pub fn new(interval_ms: Millis) -> Self {
        Self {
            interval_ms,
            pending: None,
            last_edit: 0,
        }
    }

    /// Buffer an edit, restarting the quiet period.
    pub fn push(&mut self, patch: MapPatch, now: Millis) {
        match &mut self.pending {
            Some(pending) => pending.merge(patch),
            None => self.pending = Some(patch),
        }
        self.last_edit = now;
    }

    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Edits not yet handed out.
    pub fn pending(&self) -> Option<&MapPatch> {
        self.pending.as_ref()
    }

    /// The merged patch, once the quiet period has passed.
    pub fn poll(&mut self, now: Millis) -> Option<MapPatch> {
        if now.saturating_sub(self.last_edit) >= self.interval_ms {
            self.pending.take().filter(|p| !p.is_empty())
        } else {
            None
        }
    }

    /// Take whatever is pending right away, e.g. on teardown.
    pub fn flush(&mut self) -> Option<MapPatch> {
        self.pending.take().filter(|p| !p.is_empty())
    }
}
