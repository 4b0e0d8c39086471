//! Grid geometry and snapping.
//!
//! Two snap families live here: free-point snapping to grid intersections
//! (optionally captured by a nearby token center) and token placement, which
//! aligns a token's footprint to whole cells.

use kurbo::{Point, Size, Vec2};
use serde::{Deserialize, Serialize};

/// A grid cell index in map space. May be negative for points left of or
/// above the grid origin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GridCell {
    pub x: i64,
    pub y: i64,
}

impl GridCell {
    pub const fn new(x: i64, y: i64) -> Self {
        Self { x, y }
    }
}

/// Grid geometry: cell size and origin offset, both in map pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Grid {
    pub size: f64,
    pub offset: Vec2,
}

impl Grid {
    pub fn new(size: f64, offset: Vec2) -> Self {
        Self { size, offset }
    }

    /// Snap a point to the nearest grid intersection.
    pub fn snap_to_intersection(&self, p: Point) -> Point {
        Point::new(
            ((p.x - self.offset.x) / self.size).round() * self.size + self.offset.x,
            ((p.y - self.offset.y) / self.size).round() * self.size + self.offset.y,
        )
    }

    /// The cell containing a map-space point.
    pub fn cell_at(&self, p: Point) -> GridCell {
        GridCell::new(
            ((p.x - self.offset.x) / self.size).floor() as i64,
            ((p.y - self.offset.y) / self.size).floor() as i64,
        )
    }

    /// Top-left corner of a cell.
    pub fn cell_origin(&self, cell: GridCell) -> Point {
        Point::new(
            cell.x as f64 * self.size + self.offset.x,
            cell.y as f64 * self.size + self.offset.y,
        )
    }

    pub fn cell_center(&self, cell: GridCell) -> Point {
        self.cell_origin(cell) + Vec2::new(self.size / 2.0, self.size / 2.0)
    }

    /// Number of whole cells needed to span `extent` pixels.
    pub fn cells_spanning(&self, extent: f64) -> usize {
        if self.size <= 0.0 || extent <= 0.0 {
            return 0;
        }
        (extent / self.size).ceil() as usize
    }

    /// Number of cells a token footprint covers along one axis (at least one).
    pub fn footprint_cells(&self, extent: f64) -> i64 {
        ((extent / self.size).round() as i64).max(1)
    }

    /// Snap a token center so its footprint covers whole cells.
    ///
    /// A one-cell token lands on the center of the cell under the pointer;
    /// an N-cell token is shifted by `(N-1)/2` cells so the footprint is
    /// split evenly around the pointer.
    pub fn snap_token_center(&self, p: Point, footprint: Size) -> Point {
        let axis = |value: f64, offset: f64, extent: f64| {
            let n = self.footprint_cells(extent) as f64;
            let cell = ((value - offset - (n - 1.0) * self.size / 2.0) / self.size).floor();
            cell * self.size + n * self.size / 2.0 + offset
        };
        Point::new(
            axis(p.x, self.offset.x, footprint.width),
            axis(p.y, self.offset.y, footprint.height),
        )
    }

    /// Reveal radius in cells for a pixel radius.
    pub fn radius_in_cells(&self, pixel_radius: f64) -> u32 {
        if self.size <= 0.0 || pixel_radius <= 0.0 {
            return 0;
        }
        (pixel_radius / self.size).ceil() as u32
    }

    /// Measure the distance between two map points.
    pub fn measure(&self, from: Point, to: Point, scale_in_feet: f64) -> Measurement {
        let pixels = from.distance(to);
        let cells = if self.size > 0.0 { pixels / self.size } else { 0.0 };
        Measurement {
            pixels,
            cells,
            feet: cells * scale_in_feet,
        }
    }
}

/// Result of a ruler measurement.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Measurement {
    pub pixels: f64,
    pub cells: f64,
    pub feet: f64,
}

/// Whether snapping applies, given the toggle and the invert modifier.
///
/// Holding the modifier disables snapping when it is on and enables it when
/// it is off.
pub fn snap_active(enabled: bool, invert_held: bool) -> bool {
    enabled != invert_held
}

/// What a snapped point was captured by.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapTargetKind<Id> {
    /// Point was left where it was.
    None,
    /// Grid intersection.
    Grid,
    /// An existing token's center.
    TokenCenter(Id),
}

/// Result of a snap operation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SnapResult<Id> {
    pub point: Point,
    pub target: SnapTargetKind<Id>,
}

impl<Id> SnapResult<Id> {
    pub fn none(point: Point) -> Self {
        Self {
            point,
            target: SnapTargetKind::None,
        }
    }

    pub fn is_snapped(&self) -> bool {
        !matches!(self.target, SnapTargetKind::None)
    }
}

/// Find the nearest token center within `threshold` pixels.
pub fn nearest_token_center<Id: Copy>(
    p: Point,
    centers: impl IntoIterator<Item = (Id, Point)>,
    threshold: f64,
) -> Option<(Id, Point)> {
    centers
        .into_iter()
        .map(|(id, c)| (id, c, c.distance(p)))
        .filter(|(_, _, d)| *d <= threshold)
        .min_by(|a, b| a.2.total_cmp(&b.2))
        .map(|(id, c, _)| (id, c))
}

/// Snap a free point: a token center within `threshold` wins, otherwise the
/// nearest grid intersection. Returns the point unchanged when inactive.
pub fn snap_point<Id: Copy>(
    p: Point,
    grid: &Grid,
    active: bool,
    centers: impl IntoIterator<Item = (Id, Point)>,
    threshold: f64,
) -> SnapResult<Id> {
    if !active {
        return SnapResult::none(p);
    }
    if let Some((id, center)) = nearest_token_center(p, centers, threshold) {
        return SnapResult {
            point: center,
            target: SnapTargetKind::TokenCenter(id),
        };
    }
    SnapResult {
        point: grid.snap_to_intersection(p),
        target: SnapTargetKind::Grid,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid50() -> Grid {
        Grid::new(50.0, Vec2::ZERO)
    }

    #[test]
    fn test_intersection_snap_exact() {
        let p = grid50().snap_to_intersection(Point::new(74.0, 126.0));
        assert_eq!(p, Point::new(50.0, 150.0));
    }

    #[test]
    fn test_token_placement_snap_exact() {
        let p = grid50().snap_token_center(Point::new(74.0, 126.0), Size::new(50.0, 50.0));
        assert_eq!(p, Point::new(75.0, 125.0));
    }

    #[test]
    fn test_snap_idempotent_with_offset() {
        let grid = Grid::new(64.0, Vec2::new(13.0, -7.0));
        for &p in &[Point::new(0.0, 0.0), Point::new(101.3, 77.7), Point::new(-250.0, 999.9)] {
            let once = grid.snap_to_intersection(p);
            assert_eq!(grid.snap_to_intersection(once), once);

            let footprint = Size::new(128.0, 64.0);
            let once = grid.snap_token_center(p, footprint);
            assert_eq!(grid.snap_token_center(once, footprint), once);
        }
    }

    #[test]
    fn test_large_token_lands_on_intersection() {
        let p = grid50().snap_token_center(Point::new(112.0, 88.0), Size::new(100.0, 100.0));
        assert_eq!(p, Point::new(100.0, 100.0));

        let p = grid50().snap_token_center(Point::new(112.0, 88.0), Size::new(150.0, 150.0));
        assert_eq!(p, Point::new(125.0, 75.0));
    }

    #[test]
    fn test_cell_math() {
        let grid = Grid::new(50.0, Vec2::new(10.0, 10.0));
        assert_eq!(grid.cell_at(Point::new(9.0, 60.0)), GridCell::new(-1, 1));
        assert_eq!(grid.cell_center(GridCell::new(0, 0)), Point::new(35.0, 35.0));
        assert_eq!(grid.cells_spanning(101.0), 3);
    }

    #[test]
    fn test_radius_in_cells() {
        assert_eq!(grid50().radius_in_cells(40.0), 1);
        assert_eq!(grid50().radius_in_cells(50.0), 1);
        assert_eq!(grid50().radius_in_cells(51.0), 2);
        assert_eq!(grid50().radius_in_cells(0.0), 0);
    }

    #[test]
    fn test_token_center_capture() {
        let centers = [(1u32, Point::new(100.0, 100.0)), (2u32, Point::new(120.0, 100.0))];
        let result = snap_point(Point::new(118.0, 104.0), &grid50(), true, centers, 30.0);
        assert_eq!(result.target, SnapTargetKind::TokenCenter(2));
        assert_eq!(result.point, Point::new(120.0, 100.0));

        let result = snap_point(Point::new(190.0, 190.0), &grid50(), true, centers, 30.0);
        assert_eq!(result.target, SnapTargetKind::Grid);
        assert_eq!(result.point, Point::new(200.0, 200.0));
    }

    #[test]
    fn test_inactive_snap_is_identity() {
        let p = Point::new(12.0, 13.0);
        let result = snap_point::<u32>(p, &grid50(), false, std::iter::empty(), 30.0);
        assert_eq!(result.point, p);
        assert!(!result.is_snapped());
    }

    #[test]
    fn test_modifier_inverts() {
        assert!(snap_active(true, false));
        assert!(!snap_active(true, true));
        assert!(snap_active(false, true));
        assert!(!snap_active(false, false));
    }

    #[test]
    fn test_measure_in_feet() {
        let m = grid50().measure(Point::new(0.0, 0.0), Point::new(150.0, 200.0), 5.0);
        assert_eq!(m.pixels, 250.0);
        assert_eq!(m.cells, 5.0);
        assert_eq!(m.feet, 25.0);
    }
}
