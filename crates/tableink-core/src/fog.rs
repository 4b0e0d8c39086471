//! Fog-of-war visibility grid.
//!
//! The visibility array carries a one-cell border on every side: fog cell
//! `(gx, gy)` covers map cell `(gx - 1, gy - 1)`. Reveals near the map edge
//! may land in the border, never outside the array.

use crate::config::FogConfig;
use crate::grid::{Grid, GridCell};
use crate::map::MapSettings;
use kurbo::Point;
use serde::{Deserialize, Serialize};

/// Fog document as stored per map.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FogData {
    /// `visibility[gy][gx]`, `grid_height + 2` rows of `grid_width + 2`.
    pub visibility: Vec<Vec<bool>>,
    pub grid_width: usize,
    pub grid_height: usize,
}

impl FogData {
    /// Fog covering every cell of a `grid_width x grid_height` grid.
    pub fn hidden(grid_width: usize, grid_height: usize) -> Self {
        Self::filled(grid_width, grid_height, false)
    }

    pub fn revealed(grid_width: usize, grid_height: usize) -> Self {
        Self::filled(grid_width, grid_height, true)
    }

    fn filled(grid_width: usize, grid_height: usize, value: bool) -> Self {
        Self {
            visibility: vec![vec![value; grid_width + 2]; grid_height + 2],
            grid_width,
            grid_height,
        }
    }

    /// Fog sized for a map's current grid.
    pub fn for_map(map: &MapSettings) -> Self {
        let (w, h) = map.grid_dimensions();
        Self::hidden(w, h)
    }

    /// Whether the array dimensions agree with the declared grid size.
    pub fn is_well_formed(&self) -> bool {
        self.visibility.len() == self.grid_height + 2
            && self.visibility.iter().all(|row| row.len() == self.grid_width + 2)
    }

    /// Array index of a fog cell, if inside the padded array.
    fn index(&self, gx: i64, gy: i64) -> Option<(usize, usize)> {
        let row = self.visibility.get(usize::try_from(gy).ok()?)?;
        let x = usize::try_from(gx).ok()?;
        (x < row.len()).then_some((x, gy as usize))
    }

    /// Whether the given map cell is revealed. Cells outside the array are fogged.
    pub fn is_revealed(&self, cell: GridCell) -> bool {
        self.index(cell.x + 1, cell.y + 1)
            .map(|(x, y)| self.visibility[y][x])
            .unwrap_or(false)
    }

    /// Set every fog cell within a Euclidean `radius` of fog cell `(gx, gy)`.
    /// Returns whether anything changed.
    fn set_circle(&mut self, gx: i64, gy: i64, radius: u32, value: bool) -> bool {
        let r = radius as i64;
        let mut changed = false;
        for dy in -r..=r {
            for dx in -r..=r {
                if dx * dx + dy * dy > r * r {
                    continue;
                }
                if let Some((x, y)) = self.index(gx + dx, gy + dy) {
                    let cell = &mut self.visibility[y][x];
                    if *cell != value {
                        *cell = value;
                        changed = true;
                    }
                }
            }
        }
        changed
    }

    /// Reveal every cell within `radius` cells of a map cell.
    pub fn reveal_area(&mut self, center: GridCell, radius: u32) -> bool {
        self.set_circle(center.x + 1, center.y + 1, radius, true)
    }

    pub fn hide_area(&mut self, center: GridCell, radius: u32) -> bool {
        self.set_circle(center.x + 1, center.y + 1, radius, false)
    }

    pub fn hide_all(&mut self) {
        self.visibility.iter_mut().for_each(|row| row.fill(false));
    }

    pub fn reveal_all(&mut self) {
        self.visibility.iter_mut().for_each(|row| row.fill(true));
    }

    /// Resize to a new grid, keeping the state of overlapping map cells.
    /// New cells start hidden.
    pub fn resize(&mut self, grid_width: usize, grid_height: usize) {
        if grid_width == self.grid_width && grid_height == self.grid_height && self.is_well_formed() {
            return;
        }
        let mut resized = Self::hidden(grid_width, grid_height);
        for y in 0..grid_height.min(self.grid_height) {
            for x in 0..grid_width.min(self.grid_width) {
                let cell = GridCell::new(x as i64, y as i64);
                resized.visibility[y + 1][x + 1] = self.is_revealed(cell);
            }
        }
        *self = resized;
    }

    /// Map cells inside the grid with their revealed flag, row by row.
    /// Border cells are skipped.
    pub fn map_cells(&self) -> impl Iterator<Item = (GridCell, bool)> + '_ {
        (0..self.grid_height).flat_map(move |y| {
            (0..self.grid_width).map(move |x| {
                let cell = GridCell::new(x as i64, y as i64);
                (cell, self.is_revealed(cell))
            })
        })
    }

    pub fn revealed_count(&self) -> usize {
        self.map_cells().filter(|(_, revealed)| *revealed).count()
    }

    pub fn state(&self, enabled: bool) -> FogState {
        if !enabled {
            FogState::Disabled
        } else if self.revealed_count() == 0 {
            FogState::Hidden
        } else {
            FogState::PartiallyRevealed
        }
    }
}

/// Lifecycle of the fog on a map.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FogState {
    Disabled,
    /// Enabled, nothing revealed yet.
    Hidden,
    PartiallyRevealed,
}

/// What a brush stroke does to the cells it touches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BrushMode {
    #[default]
    Reveal,
    Hide,
}

/// DM fog brush. Consecutive paints in the same cell are skipped.
#[derive(Debug, Clone, Default)]
pub struct FogBrush {
    pub size: u32,
    pub mode: BrushMode,
    last_cell: Option<GridCell>,
}

impl FogBrush {
    pub fn new(size: u32, mode: BrushMode) -> Self {
        Self {
            size,
            mode,
            last_cell: None,
        }
    }

    /// Paint at a map-space pointer. Returns whether the fog changed and
    /// needs to be written.
    pub fn paint(&mut self, fog: &mut FogData, grid: &Grid, pointer: Point) -> bool {
        let cell = grid.cell_at(pointer);
        if self.last_cell == Some(cell) {
            return false;
        }
        self.last_cell = Some(cell);
        let radius = self.size / 2;
        match self.mode {
            BrushMode::Reveal => fog.reveal_area(cell, radius),
            BrushMode::Hide => fog.hide_area(cell, radius),
        }
    }

    /// Forget the last painted cell so the next stroke always paints.
    pub fn end_stroke(&mut self) {
        self.last_cell = None;
    }
}

/// Reveal radius in cells around a player token: the torch radius when any
/// light sits within pickup distance of it.
pub fn token_reveal_radius(
    token: Point,
    lights: impl IntoIterator<Item = Point>,
    config: &FogConfig,
) -> u32 {
    let carrying = lights
        .into_iter()
        .any(|light| light.distance(token) <= config.torch_pickup_distance);
    if carrying {
        config.torch_reveal_radius
    } else {
        config.token_reveal_radius
    }
}

/// Reveal around every player token and every light. Returns whether the
/// fog changed.
pub fn reveal_for_vision(
    fog: &mut FogData,
    grid: &Grid,
    player_tokens: &[Point],
    lights: &[(Point, f64)],
    config: &FogConfig,
) -> bool {
    let mut changed = false;
    for &token in player_tokens {
        let radius = token_reveal_radius(token, lights.iter().map(|(p, _)| *p), config);
        changed |= fog.reveal_area(grid.cell_at(token), radius);
    }
    for &(position, pixel_radius) in lights {
        changed |= fog.reveal_area(grid.cell_at(position), grid.radius_in_cells(pixel_radius));
    }
    changed
}

#[cfg(test)]
mod tests {
    use super::*;
    use kurbo::Vec2;

    fn grid50() -> Grid {
        Grid::new(50.0, Vec2::ZERO)
    }

    #[test]
    fn test_padding_invariant() {
        let mut fog = FogData::hidden(4, 3);
        assert_eq!(fog.visibility.len(), 5);
        assert!(fog.visibility.iter().all(|r| r.len() == 6));

        fog.reveal_area(GridCell::new(0, 0), 5);
        fog.reveal_area(GridCell::new(3, 2), 5);
        fog.resize(2, 2);
        assert!(fog.is_well_formed());
    }

    #[test]
    fn test_corner_reveal_touches_border_only() {
        let mut fog = FogData::hidden(4, 4);
        assert!(fog.reveal_area(GridCell::new(0, 0), 1));
        // Map (0,0) is fog (1,1); radius 1 reaches the border at fog (0,1) and (1,0).
        assert!(fog.visibility[0][1]);
        assert!(fog.visibility[1][0]);
        assert!(!fog.visibility[0][0]);
        assert!(fog.is_revealed(GridCell::new(0, 0)));
        assert!(fog.is_revealed(GridCell::new(-1, 0)));
        assert!(!fog.is_revealed(GridCell::new(-5, 0)));
    }

    #[test]
    fn test_euclidean_radius() {
        let mut fog = FogData::hidden(10, 10);
        fog.reveal_area(GridCell::new(5, 5), 2);
        assert!(fog.is_revealed(GridCell::new(7, 5)));
        assert!(fog.is_revealed(GridCell::new(6, 6)));
        assert!(!fog.is_revealed(GridCell::new(7, 7)));
        assert_eq!(fog.revealed_count(), 13);
        assert!(!fog.reveal_area(GridCell::new(5, 5), 2));
    }

    #[test]
    fn test_same_cell_paints_once() {
        let mut fog = FogData::hidden(10, 10);
        let mut brush = FogBrush::new(3, BrushMode::Reveal);
        let grid = grid50();
        let mut writes = 0;
        for p in [Point::new(120.0, 120.0), Point::new(121.0, 124.0)] {
            if brush.paint(&mut fog, &grid, p) {
                writes += 1;
            }
        }
        assert_eq!(writes, 1);
        assert!(fog.is_revealed(GridCell::new(2, 2)));
        assert!(fog.is_revealed(GridCell::new(3, 2)));
    }

    #[test]
    fn test_hide_brush() {
        let mut fog = FogData::revealed(6, 6);
        let mut brush = FogBrush::new(1, BrushMode::Hide);
        assert!(brush.paint(&mut fog, &grid50(), Point::new(60.0, 60.0)));
        assert!(!fog.is_revealed(GridCell::new(1, 1)));
        assert!(fog.is_revealed(GridCell::new(2, 1)));
    }

    #[test]
    fn test_torch_radius() {
        let config = FogConfig::default();
        let token = Point::new(100.0, 100.0);
        assert_eq!(token_reveal_radius(token, [Point::new(500.0, 0.0)], &config), 3);
        assert_eq!(token_reveal_radius(token, [Point::new(120.0, 110.0)], &config), 5);
    }

    #[test]
    fn test_state_machine() {
        let mut fog = FogData::hidden(3, 3);
        assert_eq!(fog.state(false), FogState::Disabled);
        assert_eq!(fog.state(true), FogState::Hidden);
        fog.reveal_area(GridCell::new(1, 1), 0);
        assert_eq!(fog.state(true), FogState::PartiallyRevealed);
        fog.hide_all();
        assert_eq!(fog.state(true), FogState::Hidden);
    }

    #[test]
    fn test_resize_keeps_overlap() {
        let mut fog = FogData::hidden(3, 3);
        fog.reveal_area(GridCell::new(1, 1), 0);
        fog.resize(5, 4);
        assert_eq!((fog.grid_width, fog.grid_height), (5, 4));
        assert!(fog.is_revealed(GridCell::new(1, 1)));
        assert!(!fog.is_revealed(GridCell::new(4, 3)));
    }

    #[test]
    fn test_vision_reveal() {
        let mut fog = FogData::hidden(20, 20);
        let config = FogConfig::default();
        let changed = reveal_for_vision(
            &mut fog,
            &grid50(),
            &[Point::new(275.0, 275.0)],
            &[(Point::new(800.0, 800.0), 40.0)],
            &config,
        );
        assert!(changed);
        assert!(fog.is_revealed(GridCell::new(8, 5)));
        assert!(!fog.is_revealed(GridCell::new(9, 5)));
        assert!(fog.is_revealed(GridCell::new(17, 16)));
        assert!(!fog.is_revealed(GridCell::new(18, 16)));
    }
}
