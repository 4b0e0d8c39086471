//! Area-of-effect shapes placed on the map.

use super::{FadeWindow, age};
use crate::Millis;
use crate::color::Rgba8;
use crate::map::{Role, UserId};
use kurbo::{Point, Rect, Vec2};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;
use uuid::Uuid;

/// Unique identifier for shapes.
pub type ShapeId = Uuid;

/// Default cone spread, `2 * atan(0.5)`: a flat end at distance `L` would be `L` wide.
pub const DEFAULT_CONE_SPREAD: f64 = 0.927_295_218_001_612_2;

/// Default stroke width of line shapes, in pixels.
pub const DEFAULT_LINE_WIDTH: f64 = 10.0;

/// The kind of shape a placement tool draws.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShapeKind {
    Circle,
    Rectangle,
    Cone,
    Line,
}

/// Shape geometry in map space.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ShapeGeometry {
    Circle {
        center: Point,
        radius: f64,
    },
    Rectangle {
        origin: Point,
        width: f64,
        height: f64,
    },
    Cone {
        apex: Point,
        /// Direction of the cone axis, in radians.
        direction: f64,
        length: f64,
        /// Full opening angle, in radians.
        spread: f64,
    },
    Line {
        start: Point,
        end: Point,
        width: f64,
    },
}

impl ShapeGeometry {
    /// Build geometry from the two clicks of a placement gesture.
    pub fn from_drag(kind: ShapeKind, start: Point, end: Point) -> Self {
        match kind {
            ShapeKind::Circle => ShapeGeometry::Circle {
                center: start,
                radius: start.distance(end),
            },
            ShapeKind::Rectangle => {
                let rect = Rect::from_points(start, end);
                ShapeGeometry::Rectangle {
                    origin: Point::new(rect.x0, rect.y0),
                    width: rect.width(),
                    height: rect.height(),
                }
            }
            ShapeKind::Cone => {
                let axis = end - start;
                ShapeGeometry::Cone {
                    apex: start,
                    direction: axis.y.atan2(axis.x),
                    length: axis.hypot(),
                    spread: DEFAULT_CONE_SPREAD,
                }
            }
            ShapeKind::Line => ShapeGeometry::Line {
                start,
                end,
                width: DEFAULT_LINE_WIDTH,
            },
        }
    }

    pub fn kind(&self) -> ShapeKind {
        match self {
            ShapeGeometry::Circle { .. } => ShapeKind::Circle,
            ShapeGeometry::Rectangle { .. } => ShapeKind::Rectangle,
            ShapeGeometry::Cone { .. } => ShapeKind::Cone,
            ShapeGeometry::Line { .. } => ShapeKind::Line,
        }
    }

    /// Outline polygon; circles and cones are approximated with `segments`
    /// points along their arcs.
    pub fn outline(&self, segments: usize) -> Vec<Point> {
        let segments = segments.max(3);
        match *self {
            ShapeGeometry::Circle { center, radius } => (0..segments)
                .map(|i| {
                    let a = 2.0 * PI * i as f64 / segments as f64;
                    center + Vec2::from_angle(a) * radius
                })
                .collect(),
            ShapeGeometry::Rectangle {
                origin,
                width,
                height,
            } => vec![
                origin,
                Point::new(origin.x + width, origin.y),
                Point::new(origin.x + width, origin.y + height),
                Point::new(origin.x, origin.y + height),
            ],
            ShapeGeometry::Cone {
                apex,
                direction,
                length,
                spread,
            } => {
                let mut points = Vec::with_capacity(segments + 1);
                points.push(apex);
                let first = direction - spread / 2.0;
                for i in 0..segments {
                    let a = first + spread * i as f64 / (segments - 1) as f64;
                    points.push(apex + Vec2::from_angle(a) * length);
                }
                points
            }
            ShapeGeometry::Line { start, end, width } => {
                let along = end - start;
                let len = along.hypot();
                let normal = if len > f64::EPSILON {
                    Vec2::new(-along.y / len, along.x / len) * (width / 2.0)
                } else {
                    Vec2::ZERO
                };
                vec![start + normal, end + normal, end - normal, start - normal]
            }
        }
    }

    /// Axis-aligned bounds in map space.
    pub fn bounds(&self) -> Rect {
        match *self {
            ShapeGeometry::Circle { center, radius } => {
                Rect::from_center_size(center, (radius * 2.0, radius * 2.0))
            }
            ShapeGeometry::Rectangle {
                origin,
                width,
                height,
            } => Rect::from_origin_size(origin, (width, height)),
            _ => {
                let outline = self.outline(16);
                outline
                    .iter()
                    .skip(1)
                    .fold(Rect::from_points(outline[0], outline[0]), |r, p| r.union_pt(*p))
            }
        }
    }

    /// Anchor point: the center for circles, apex for cones, start for lines.
    pub fn anchor(&self) -> Point {
        match *self {
            ShapeGeometry::Circle { center, .. } => center,
            ShapeGeometry::Rectangle { .. } => self.bounds().center(),
            ShapeGeometry::Cone { apex, .. } => apex,
            ShapeGeometry::Line { start, .. } => start,
        }
    }
}

/// Who may see a shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    #[default]
    All,
    Dm,
}

/// A shape annotation. Non-persistent shapes fade out and are deleted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Shape {
    pub id: ShapeId,
    pub geometry: ShapeGeometry,
    pub color: Rgba8,
    pub opacity: f64,
    pub persistent: bool,
    #[serde(default)]
    pub visible_to: Visibility,
    pub created_by: UserId,
    pub created_at: Millis,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<Millis>,
}

impl Shape {
    /// Create a persistent, half-transparent shape visible to everyone.
    pub fn new(geometry: ShapeGeometry, color: Rgba8, created_by: UserId, created_at: Millis) -> Self {
        Self {
            id: Uuid::new_v4(),
            geometry,
            color,
            opacity: 0.5,
            persistent: true,
            visible_to: Visibility::All,
            created_by,
            created_at,
            expires_at: None,
        }
    }

    /// Set persistence; temporary shapes get an expiry at the end of `fade`.
    pub fn with_persistent(mut self, persistent: bool, fade: &FadeWindow) -> Self {
        self.persistent = persistent;
        self.expires_at = (!persistent).then(|| self.created_at + fade.end_ms());
        self
    }

    pub fn with_opacity(mut self, opacity: f64) -> Self {
        self.opacity = opacity.clamp(0.0, 1.0);
        self
    }

    pub fn with_visibility(mut self, visible_to: Visibility) -> Self {
        self.visible_to = visible_to;
        self
    }

    /// Opacity to render at `now`, including the fade.
    pub fn current_opacity(&self, now: Millis, fade: &FadeWindow) -> f64 {
        if self.persistent {
            self.opacity
        } else {
            self.opacity * fade.opacity(age(self.created_at, now))
        }
    }

    pub fn is_expired(&self, now: Millis, fade: &FadeWindow) -> bool {
        !self.persistent && fade.is_expired(age(self.created_at, now))
    }

    pub fn is_visible_to(&self, role: Role) -> bool {
        self.visible_to == Visibility::All || role.is_dm()
    }
}
