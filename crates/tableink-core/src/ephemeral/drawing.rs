//! Short-lived pen strokes and arrows.

use super::{FadeWindow, age};
use crate::Millis;
use crate::color::Rgba8;
use crate::config::LifecycleConfig;
use crate::map::UserId;
use kurbo::{Point, Vec2};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for drawings.
pub type DrawingId = Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DrawingKind {
    Pen,
    Arrow,
}

/// A freehand trail or a two-point arrow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Drawing {
    pub id: DrawingId,
    pub kind: DrawingKind,
    /// Map-space points; arrows use the first and last.
    pub points: Vec<Point>,
    pub color: Rgba8,
    pub width: f64,
    pub created_by: UserId,
    pub created_at: Millis,
}

impl Drawing {
    pub fn pen(points: Vec<Point>, color: Rgba8, created_by: UserId, created_at: Millis) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind: DrawingKind::Pen,
            points,
            color,
            width: 3.0,
            created_by,
            created_at,
        }
    }

    pub fn arrow(start: Point, end: Point, color: Rgba8, created_by: UserId, created_at: Millis) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind: DrawingKind::Arrow,
            points: vec![start, end],
            color,
            width: 4.0,
            created_by,
            created_at,
        }
    }

    pub fn fade(&self, lifecycle: &LifecycleConfig) -> FadeWindow {
        match self.kind {
            DrawingKind::Pen => lifecycle.pen_fade,
            DrawingKind::Arrow => lifecycle.arrow_fade,
        }
    }

    /// Age at which the drawing is removed regardless of its fade.
    pub fn hard_delete_ms(&self, lifecycle: &LifecycleConfig) -> Millis {
        match self.kind {
            DrawingKind::Pen => lifecycle.pen_hard_delete_ms,
            DrawingKind::Arrow => lifecycle.arrow_hard_delete_ms,
        }
    }

    pub fn current_opacity(&self, now: Millis, lifecycle: &LifecycleConfig) -> f64 {
        self.fade(lifecycle).opacity(age(self.created_at, now))
    }

    pub fn is_expired(&self, now: Millis, lifecycle: &LifecycleConfig) -> bool {
        age(self.created_at, now) >= self.hard_delete_ms(lifecycle)
    }

    /// Arrowhead triangle `[tip, left, right]`, or `None` for pens and
    /// zero-length arrows.
    pub fn arrow_head(&self, head_size: f64) -> Option<[Point; 3]> {
        if self.kind != DrawingKind::Arrow {
            return None;
        }
        let (start, end) = (*self.points.first()?, *self.points.last()?);
        let along = end - start;
        let len = along.hypot();
        if len < f64::EPSILON {
            return None;
        }
        let dir = along / len;
        let perp = Vec2::new(-dir.y, dir.x);
        let back = end - dir * head_size;
        Some([
            end,
            back + perp * (head_size * 0.5),
            back - perp * (head_size * 0.5),
        ])
    }
}
