//! Tool system for the tabletop.

use crate::Millis;
use crate::color::Rgba8;
use crate::ephemeral::{ShapeKind, Visibility};
use kurbo::Point;
use serde::{Deserialize, Serialize};

/// Minimum pointer travel, in map pixels, before a stroke records a point.
const MIN_STROKE_STEP: f64 = 2.0;

/// Available tools.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum ToolKind {
    /// Drag tokens; dragging empty space pans.
    #[default]
    Select,
    Pan,
    FogReveal,
    FogHide,
    Shape(ShapeKind),
    Pen,
    Arrow,
    Ping,
    Ruler,
    Light,
}

/// How a tool consumes pointer input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GestureKind {
    /// Acts on press.
    Click,
    /// Press, move, release; every point matters.
    Stroke,
    /// Press, move, release; only the endpoints matter.
    Drag,
    /// First click anchors, second click completes.
    TwoClick,
}

impl ToolKind {
    pub fn gesture(self) -> GestureKind {
        match self {
            ToolKind::Select | ToolKind::Pan => GestureKind::Drag,
            ToolKind::FogReveal | ToolKind::FogHide | ToolKind::Pen => GestureKind::Stroke,
            ToolKind::Shape(_) | ToolKind::Ruler | ToolKind::Arrow => GestureKind::TwoClick,
            ToolKind::Ping | ToolKind::Light => GestureKind::Click,
        }
    }

    /// Tools only the DM may use.
    pub fn is_dm_only(self) -> bool {
        matches!(self, ToolKind::FogReveal | ToolKind::FogHide | ToolKind::Light)
    }
}

/// State of a tool interaction.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum ToolState {
    /// Tool is idle, waiting for interaction.
    #[default]
    Idle,
    /// A gesture is in progress.
    Active {
        start: Point,
        current: Point,
        /// Stroke points, for stroke tools.
        points: Vec<Point>,
        last_activity: Millis,
    },
}

/// What a pointer event meant for the current tool.
#[derive(Debug, Clone, PartialEq)]
pub enum ToolEvent {
    Nothing,
    Click(Point),
    Started(Point),
    Moved { start: Point, current: Point },
    StrokeFinished(Vec<Point>),
    Completed { start: Point, end: Point },
}

/// Manages the current tool and its state.
#[derive(Debug, Clone)]
pub struct ToolManager {
    /// Currently selected tool.
    pub current_tool: ToolKind,
    /// Current state of the tool.
    pub state: ToolState,
    /// Color applied to new annotations.
    pub color: Rgba8,
    /// Whether new shapes stay until deleted.
    pub persistent_shapes: bool,
    /// Who sees new shapes.
    pub shape_visibility: Visibility,
}

impl Default for ToolManager {
    fn default() -> Self {
        Self {
            current_tool: ToolKind::default(),
            state: ToolState::default(),
            color: Rgba8::rgb(230, 57, 70),
            persistent_shapes: false,
            shape_visibility: Visibility::All,
        }
    }
}

impl ToolManager {
    /// Create a new tool manager.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the current tool, dropping any gesture in progress. Returns
    /// whether the tool changed.
    pub fn set_tool(&mut self, tool: ToolKind) -> bool {
        let changed = self.current_tool != tool;
        self.current_tool = tool;
        self.state = ToolState::Idle;
        changed
    }

    pub fn is_active(&self) -> bool {
        matches!(self.state, ToolState::Active { .. })
    }

    fn start(&mut self, point: Point, now: Millis) -> ToolEvent {
        self.state = ToolState::Active {
            start: point,
            current: point,
            points: vec![point],
            last_activity: now,
        };
        ToolEvent::Started(point)
    }

    /// Pointer pressed at a map-space point.
    pub fn press(&mut self, point: Point, now: Millis) -> ToolEvent {
        match (self.current_tool.gesture(), &self.state) {
            (GestureKind::Click, _) => ToolEvent::Click(point),
            (GestureKind::TwoClick, ToolState::Active { start, .. }) => {
                let start = *start;
                self.state = ToolState::Idle;
                ToolEvent::Completed { start, end: point }
            }
            _ => self.start(point, now),
        }
    }

    /// Pointer moved.
    pub fn motion(&mut self, point: Point, now: Millis) -> ToolEvent {
        let stroke = self.current_tool.gesture() == GestureKind::Stroke;
        match &mut self.state {
            ToolState::Active {
                start,
                current,
                points,
                last_activity,
            } => {
                *current = point;
                *last_activity = now;
                if stroke && points.last().is_none_or(|last| last.distance(point) >= MIN_STROKE_STEP) {
                    points.push(point);
                }
                ToolEvent::Moved {
                    start: *start,
                    current: point,
                }
            }
            ToolState::Idle => ToolEvent::Nothing,
        }
    }

    /// Pointer released.
    pub fn release(&mut self, point: Point, _now: Millis) -> ToolEvent {
        let gesture = self.current_tool.gesture();
        let ToolState::Active { start, points, .. } = &mut self.state else {
            return ToolEvent::Nothing;
        };
        match gesture {
            GestureKind::Stroke => {
                if points.last() != Some(&point) {
                    points.push(point);
                }
                let points = std::mem::take(points);
                self.state = ToolState::Idle;
                ToolEvent::StrokeFinished(points)
            }
            GestureKind::Drag => {
                let start = *start;
                self.state = ToolState::Idle;
                ToolEvent::Completed { start, end: point }
            }
            GestureKind::TwoClick | GestureKind::Click => ToolEvent::Nothing,
        }
    }

    /// Drop the gesture in progress.
    pub fn cancel(&mut self) {
        self.state = ToolState::Idle;
    }

    /// Cancel an unfinished two-click gesture that has been idle for
    /// `timeout` ms. Returns whether it was cancelled.
    pub fn expire(&mut self, now: Millis, timeout: Millis) -> bool {
        if self.current_tool.gesture() != GestureKind::TwoClick {
            return false;
        }
        match self.state {
            ToolState::Active { last_activity, .. } if now.saturating_sub(last_activity) >= timeout => {
                log::debug!("Cancelling idle {:?} gesture", self.current_tool);
                self.state = ToolState::Idle;
                true
            }
            _ => false,
        }
    }
}
