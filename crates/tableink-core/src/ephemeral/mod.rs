//! Lifecycle of temporary annotations: shapes, pen strokes, arrows and pings.
//!
//! Every temporary object fades on a fixed schedule measured from its
//! `created_at` timestamp and is deleted from the store once the schedule
//! ends. Deletion is idempotent, so any client that notices first may issue
//! it; [`Annotations::sweep`] makes sure each client asks only once.

mod drawing;
mod ping;
mod shape;

pub use drawing::{Drawing, DrawingId, DrawingKind};
pub use ping::{Ping, PingAppearance, PingId, PingPhase};
pub use shape::{Shape, ShapeGeometry, ShapeId, ShapeKind, Visibility};

use crate::Millis;
use crate::config::{LifecycleConfig, PingConfig};
use crate::map::{Role, UserId};
use crate::store::StoreCommand;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use uuid::Uuid;

/// A linear fade: fully opaque until `start_ms`, transparent at
/// `start_ms + duration_ms`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FadeWindow {
    pub start_ms: Millis,
    pub duration_ms: Millis,
}

impl FadeWindow {
    pub const fn new(start_ms: Millis, duration_ms: Millis) -> Self {
        Self {
            start_ms,
            duration_ms,
        }
    }

    /// Age at which the object is fully transparent.
    pub const fn end_ms(&self) -> Millis {
        self.start_ms + self.duration_ms
    }

    /// Opacity multiplier at `age`; non-increasing, exactly 0 at `end_ms`.
    pub fn opacity(&self, age: Millis) -> f64 {
        if age <= self.start_ms {
            1.0
        } else if age >= self.end_ms() {
            0.0
        } else {
            1.0 - (age - self.start_ms) as f64 / self.duration_ms as f64
        }
    }

    /// Whether the object has run its full course.
    pub fn is_expired(&self, age: Millis) -> bool {
        age >= self.end_ms()
    }
}

/// Age of an object created at `created_at`, saturating for clock skew.
pub fn age(created_at: Millis, now: Millis) -> Millis {
    now.saturating_sub(created_at)
}

/// Local cache of every temporary annotation on the map.
#[derive(Debug, Default)]
pub struct Annotations {
    shapes: HashMap<ShapeId, Shape>,
    drawings: HashMap<DrawingId, Drawing>,
    pings: HashMap<PingId, Ping>,
    /// Objects this client already asked the store to delete.
    deleting: HashSet<Uuid>,
}

impl Annotations {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the shape cache with a fresh store snapshot.
    pub fn replace_shapes(&mut self, shapes: Vec<Shape>) {
        self.shapes = shapes.into_iter().map(|s| (s.id, s)).collect();
        self.forget_deleted();
    }

    pub fn replace_drawings(&mut self, drawings: Vec<Drawing>) {
        self.drawings = drawings.into_iter().map(|d| (d.id, d)).collect();
        self.forget_deleted();
    }

    pub fn replace_pings(&mut self, pings: Vec<Ping>) {
        self.pings = pings.into_iter().map(|p| (p.id, p)).collect();
        self.forget_deleted();
    }

    /// Drop delete markers for objects the store no longer reports.
    fn forget_deleted(&mut self) {
        let shapes = &self.shapes;
        let drawings = &self.drawings;
        let pings = &self.pings;
        self.deleting.retain(|id| {
            shapes.contains_key(id) || drawings.contains_key(id) || pings.contains_key(id)
        });
    }

    /// Optimistically add a locally created shape.
    pub fn insert_shape(&mut self, shape: Shape) {
        self.shapes.insert(shape.id, shape);
    }

    pub fn insert_drawing(&mut self, drawing: Drawing) {
        self.drawings.insert(drawing.id, drawing);
    }

    pub fn insert_ping(&mut self, ping: Ping) {
        self.pings.insert(ping.id, ping);
    }

    pub fn shape(&self, id: ShapeId) -> Option<&Shape> {
        self.shapes.get(&id)
    }

    pub fn shapes(&self) -> impl Iterator<Item = &Shape> {
        self.shapes.values()
    }

    /// Shapes the given role may see, oldest first.
    pub fn visible_shapes(&self, role: Role) -> Vec<&Shape> {
        let mut shapes: Vec<&Shape> = self
            .shapes
            .values()
            .filter(|s| s.is_visible_to(role))
            .collect();
        shapes.sort_by_key(|s| (s.created_at, s.id));
        shapes
    }

    pub fn drawings(&self) -> Vec<&Drawing> {
        let mut drawings: Vec<&Drawing> = self.drawings.values().collect();
        drawings.sort_by_key(|d| (d.created_at, d.id));
        drawings
    }

    pub fn pings(&self) -> Vec<&Ping> {
        let mut pings: Vec<&Ping> = self.pings.values().collect();
        pings.sort_by_key(|p| (p.created_at, p.id));
        pings
    }

    pub fn is_empty(&self) -> bool {
        self.shapes.is_empty() && self.drawings.is_empty() && self.pings.is_empty()
    }

    /// Whether anything is currently fading or animating.
    pub fn has_animated(&self) -> bool {
        self.shapes.values().any(|s| !s.persistent) || !self.drawings.is_empty() || !self.pings.is_empty()
    }

    /// Remove expired objects and return delete commands for each one this
    /// client has not already requested.
    pub fn sweep(
        &mut self,
        now: Millis,
        lifecycle: &LifecycleConfig,
        ping_config: &PingConfig,
    ) -> Vec<StoreCommand> {
        let mut commands = Vec::new();

        let expired: Vec<ShapeId> = self
            .shapes
            .values()
            .filter(|s| s.is_expired(now, &lifecycle.shape_fade))
            .map(|s| s.id)
            .collect();
        for id in expired {
            self.shapes.remove(&id);
            if self.deleting.insert(id) {
                commands.push(StoreCommand::DeleteShape { id });
            }
        }

        let expired: Vec<DrawingId> = self
            .drawings
            .values()
            .filter(|d| d.is_expired(now, lifecycle))
            .map(|d| d.id)
            .collect();
        for id in expired {
            self.drawings.remove(&id);
            if self.deleting.insert(id) {
                commands.push(StoreCommand::DeleteDrawing { id });
            }
        }

        let expired: Vec<PingId> = self
            .pings
            .values()
            .filter(|p| p.is_expired(now, ping_config))
            .map(|p| p.id)
            .collect();
        for id in expired {
            self.pings.remove(&id);
            if self.deleting.insert(id) {
                commands.push(StoreCommand::DeletePing { id });
            }
        }

        if !commands.is_empty() {
            log::debug!("Sweeping {} expired annotations", commands.len());
        }
        commands
    }

    /// Drop an object whose scheduled hard delete fired. Returns whether
    /// this client still needs to ask the store to delete it.
    pub fn claim_delete(&mut self, id: Uuid) -> bool {
        self.shapes.remove(&id);
        self.drawings.remove(&id);
        self.pings.remove(&id);
        self.deleting.insert(id)
    }

    /// Locally drop everything non-persistent.
    pub fn clear_temporary(&mut self) {
        self.shapes.retain(|_, s| s.persistent);
        self.drawings.clear();
        self.pings.clear();
    }

    pub fn clear_all(&mut self) {
        self.shapes.clear();
        self.drawings.clear();
        self.pings.clear();
    }

    pub fn clear_by_user(&mut self, user: &UserId) {
        self.shapes.retain(|_, s| &s.created_by != user);
        self.drawings.retain(|_, d| &d.created_by != user);
        self.pings.retain(|_, p| &p.created_by != user);
    }
}
