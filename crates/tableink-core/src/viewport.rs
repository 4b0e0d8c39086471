//! Viewport module for pan/zoom transforms between screen and map space.

use crate::config::ViewportConfig;
use kurbo::{Affine, Point, Size, Vec2};
use serde::{Deserialize, Serialize};

/// Viewport manages the view transform for the map.
///
/// `map_to_screen(p) = p * scale + offset` and its inverse. The scale is
/// always kept inside `[min_scale, max_scale]`, both of which are positive.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Viewport {
    /// Current translation offset (pan), in screen pixels.
    pub offset: Vec2,
    /// Current zoom level.
    scale: f64,
    pub min_scale: f64,
    pub max_scale: f64,
    /// Zoom multiplier per wheel notch.
    pub zoom_step: f64,
    /// Last screen position of an active drag gesture.
    #[serde(skip)]
    drag_anchor: Option<Point>,
}

impl Default for Viewport {
    fn default() -> Self {
        Self::from_config(&ViewportConfig::default())
    }
}

impl Viewport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(config: &ViewportConfig) -> Self {
        Self {
            offset: Vec2::ZERO,
            scale: 1.0_f64.clamp(config.min_scale, config.max_scale),
            min_scale: config.min_scale,
            max_scale: config.max_scale,
            zoom_step: config.zoom_step,
            drag_anchor: None,
        }
    }

    pub fn scale(&self) -> f64 {
        self.scale
    }

    /// Set the scale directly, clamped to the allowed range.
    pub fn set_scale(&mut self, scale: f64) {
        if scale.is_finite() {
            self.scale = scale.clamp(self.min_scale, self.max_scale);
        }
    }

    /// Map-to-screen transform for rendering.
    pub fn transform(&self) -> Affine {
        Affine::translate(self.offset) * Affine::scale(self.scale)
    }

    /// Screen-to-map transform for input handling.
    pub fn inverse_transform(&self) -> Affine {
        Affine::scale(1.0 / self.scale) * Affine::translate(-self.offset)
    }

    pub fn screen_to_map(&self, screen: Point) -> Point {
        Point::new(
            (screen.x - self.offset.x) / self.scale,
            (screen.y - self.offset.y) / self.scale,
        )
    }

    pub fn map_to_screen(&self, map: Point) -> Point {
        Point::new(
            map.x * self.scale + self.offset.x,
            map.y * self.scale + self.offset.y,
        )
    }

    /// Pan by a delta in screen coordinates.
    pub fn pan(&mut self, delta: Vec2) {
        self.offset += delta;
    }

    /// Zoom by `factor`, keeping the map point under `pointer` fixed.
    pub fn zoom_at(&mut self, pointer: Point, factor: f64) {
        let old = self.scale;
        let new = (old * factor).clamp(self.min_scale, self.max_scale);
        if (new - old).abs() < f64::EPSILON {
            return;
        }

        // offset' = pointer - (pointer - offset) / scale * scale'
        let anchored = (pointer.to_vec2() - self.offset) / old;
        self.offset = pointer.to_vec2() - anchored * new;
        self.scale = new;
    }

    /// Apply a wheel event: one zoom step per event, direction from the sign
    /// of `delta_y` (negative scrolls zoom in).
    pub fn wheel(&mut self, pointer: Point, delta_y: f64) {
        if delta_y < 0.0 {
            self.zoom_at(pointer, self.zoom_step);
        } else if delta_y > 0.0 {
            self.zoom_at(pointer, 1.0 / self.zoom_step);
        }
    }

    /// Start a pan drag at a screen position.
    pub fn begin_drag(&mut self, screen: Point) {
        self.drag_anchor = Some(screen);
    }

    /// Move an active pan drag. Ignored when no drag is active.
    pub fn drag_to(&mut self, screen: Point) {
        if let Some(anchor) = self.drag_anchor {
            self.pan(screen - anchor);
            self.drag_anchor = Some(screen);
        }
    }

    pub fn end_drag(&mut self) {
        self.drag_anchor = None;
    }

    pub fn is_dragging(&self) -> bool {
        self.drag_anchor.is_some()
    }

    /// Reset to identity.
    pub fn reset(&mut self) {
        self.offset = Vec2::ZERO;
        self.scale = 1.0_f64.clamp(self.min_scale, self.max_scale);
        self.drag_anchor = None;
    }

    /// Fit and center a map of `map_size` inside the viewport.
    pub fn fit_to_map(&mut self, map_size: Size, viewport: Size, padding: f64) {
        if map_size.width <= 0.0 || map_size.height <= 0.0 {
            self.reset();
            return;
        }

        let available = Size::new(
            (viewport.width - padding * 2.0).max(1.0),
            (viewport.height - padding * 2.0).max(1.0),
        );

        let scale_x = available.width / map_size.width;
        let scale_y = available.height / map_size.height;
        self.scale = scale_x.min(scale_y).clamp(self.min_scale, self.max_scale);

        self.offset = Vec2::new(
            viewport.width / 2.0 - map_size.width / 2.0 * self.scale,
            viewport.height / 2.0 - map_size.height / 2.0 * self.scale,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: Point, b: Point) -> bool {
        (a.x - b.x).abs() < 1e-9 && (a.y - b.y).abs() < 1e-9
    }

    #[test]
    fn test_identity_by_default() {
        let viewport = Viewport::new();
        let p = Point::new(100.0, 200.0);
        assert!(close(viewport.screen_to_map(p), p));
    }

    #[test]
    fn test_screen_to_map_with_offset_and_scale() {
        let mut viewport = Viewport::new();
        viewport.offset = Vec2::new(50.0, 100.0);
        viewport.set_scale(2.0);
        let map = viewport.screen_to_map(Point::new(150.0, 300.0));
        assert!(close(map, Point::new(50.0, 100.0)));
    }

    #[test]
    fn test_roundtrip_over_scales_and_offsets() {
        let mut viewport = Viewport::new();
        for &scale in &[0.2, 0.37, 1.0, 2.5, 5.0] {
            for &offset in &[Vec2::ZERO, Vec2::new(-340.5, 12.25), Vec2::new(1e4, -1e4)] {
                viewport.set_scale(scale);
                viewport.offset = offset;
                for &p in &[Point::new(0.0, 0.0), Point::new(123.4, -56.7), Point::new(1920.0, 1080.0)] {
                    let back = viewport.map_to_screen(viewport.screen_to_map(p));
                    assert!((back.x - p.x).abs() < 1e-6 && (back.y - p.y).abs() < 1e-6);
                }
            }
        }
    }

    #[test]
    fn test_transform_matches_point_math() {
        let mut viewport = Viewport::new();
        viewport.offset = Vec2::new(30.0, -20.0);
        viewport.set_scale(1.5);
        let p = Point::new(7.0, 9.0);
        assert!(close(viewport.transform() * p, viewport.map_to_screen(p)));
        assert!(close(viewport.inverse_transform() * p, viewport.screen_to_map(p)));
    }

    #[test]
    fn test_zoom_keeps_pointer_anchored() {
        let mut viewport = Viewport::new();
        viewport.offset = Vec2::new(40.0, 10.0);
        let pointer = Point::new(300.0, 200.0);
        let before = viewport.screen_to_map(pointer);

        viewport.wheel(pointer, -120.0);
        assert!((viewport.scale() - 1.05).abs() < 1e-12);
        assert!(close(viewport.screen_to_map(pointer), before));

        viewport.wheel(pointer, 120.0);
        assert!((viewport.scale() - 1.0).abs() < 1e-12);
        assert!(close(viewport.screen_to_map(pointer), before));
    }

    #[test]
    fn test_scale_clamped() {
        let mut viewport = Viewport::new();
        viewport.zoom_at(Point::ZERO, 0.0001);
        assert_eq!(viewport.scale(), 0.2);
        viewport.zoom_at(Point::ZERO, 1e6);
        assert_eq!(viewport.scale(), 5.0);
        viewport.set_scale(-3.0);
        assert_eq!(viewport.scale(), 0.2);
        viewport.set_scale(f64::NAN);
        assert_eq!(viewport.scale(), 0.2);
    }

    #[test]
    fn test_drag_only_while_active() {
        let mut viewport = Viewport::new();
        viewport.drag_to(Point::new(50.0, 50.0));
        assert_eq!(viewport.offset, Vec2::ZERO);

        viewport.begin_drag(Point::new(10.0, 10.0));
        viewport.drag_to(Point::new(30.0, 5.0));
        viewport.drag_to(Point::new(40.0, 5.0));
        viewport.end_drag();
        viewport.drag_to(Point::new(100.0, 100.0));

        assert_eq!(viewport.offset, Vec2::new(30.0, -5.0));
    }

    #[test]
    fn test_fit_to_map_centers() {
        let mut viewport = Viewport::new();
        viewport.fit_to_map(Size::new(1000.0, 500.0), Size::new(800.0, 600.0), 0.0);
        assert!((viewport.scale() - 0.8).abs() < 1e-12);
        let center = viewport.map_to_screen(Point::new(500.0, 250.0));
        assert!(close(center, Point::new(400.0, 300.0)));
    }
}
