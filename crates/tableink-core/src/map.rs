//! Map document: dimensions, grid configuration and session roles.

use crate::color::Rgba8;
use crate::grid::Grid;
use kurbo::{Rect, Size, Vec2};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique map identifier.
pub type MapId = Uuid;

/// User identifier, as issued by the external auth system.
pub type UserId = String;

/// Session role of the local user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Session host; may edit map, grid, lighting and fog.
    Dm,
    Player,
}

impl Role {
    pub fn is_dm(self) -> bool {
        self == Role::Dm
    }
}

/// The map document shared by every client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MapSettings {
    pub id: MapId,
    /// Pixel width of the map image.
    pub width: f64,
    /// Pixel height of the map image.
    pub height: f64,
    pub grid_size: f64,
    pub grid_color: Rgba8,
    pub grid_opacity: f64,
    pub grid_enabled: bool,
    #[serde(default)]
    pub grid_offset_x: f64,
    #[serde(default)]
    pub grid_offset_y: f64,
    /// Distance one grid cell represents.
    pub scale_in_feet: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(default)]
    pub fog_enabled: bool,
}

impl MapSettings {
    /// Create a map with default grid settings.
    pub fn new(width: f64, height: f64) -> Self {
        Self {
            id: Uuid::new_v4(),
            width,
            height,
            grid_size: 50.0,
            grid_color: Rgba8::black(),
            grid_opacity: 0.3,
            grid_enabled: true,
            grid_offset_x: 0.0,
            grid_offset_y: 0.0,
            scale_in_feet: 5.0,
            image_url: None,
            fog_enabled: false,
        }
    }

    /// Grid geometry for snapping and cell math.
    pub fn grid(&self) -> Grid {
        Grid::new(
            self.grid_size,
            Vec2::new(self.grid_offset_x, self.grid_offset_y),
        )
    }

    /// Pixel extent of the map.
    pub fn size(&self) -> Size {
        Size::new(self.width, self.height)
    }

    /// Map bounds in map space.
    pub fn bounds(&self) -> Rect {
        Rect::new(0.0, 0.0, self.width, self.height)
    }

    /// Number of grid columns and rows covering the map.
    pub fn grid_dimensions(&self) -> (usize, usize) {
        let grid = self.grid();
        (grid.cells_spanning(self.width), grid.cells_spanning(self.height))
    }

    /// Whether fog reveals should run (fog needs the grid for cell math).
    pub fn fog_active(&self) -> bool {
        self.fog_enabled && self.grid_enabled
    }

    /// Positive finite size and grid pitch; anything else cannot be laid out.
    pub fn is_well_formed(&self) -> bool {
        [self.width, self.height, self.grid_size]
            .iter()
            .all(|v| v.is_finite() && *v > 0.0)
    }

    /// Apply a partial update in place.
    pub fn apply(&mut self, patch: &MapPatch) {
        if let Some(v) = patch.width {
            self.width = v;
        }
        if let Some(v) = patch.height {
            self.height = v;
        }
        if let Some(v) = patch.grid_size {
            if v > 0.0 {
                self.grid_size = v;
            } else {
                log::debug!("Ignoring non-positive grid size {}", v);
            }
        }
        if let Some(v) = patch.grid_color {
            self.grid_color = v;
        }
        if let Some(v) = patch.grid_opacity {
            self.grid_opacity = v.clamp(0.0, 1.0);
        }
        if let Some(v) = patch.grid_enabled {
            self.grid_enabled = v;
        }
        if let Some(v) = patch.grid_offset_x {
            self.grid_offset_x = v;
        }
        if let Some(v) = patch.grid_offset_y {
            self.grid_offset_y = v;
        }
        if let Some(v) = patch.scale_in_feet {
            self.scale_in_feet = v;
        }
        if let Some(v) = &patch.image_url {
            self.image_url = Some(v.clone());
        }
        if let Some(v) = patch.fog_enabled {
            self.fog_enabled = v;
        }
    }
}

/// Partial map update; unset fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MapPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grid_size: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grid_color: Option<Rgba8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grid_opacity: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grid_enabled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grid_offset_x: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grid_offset_y: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scale_in_feet: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fog_enabled: Option<bool>,
}

impl MapPatch {
    /// Fold a later patch into this one; later values win.
    pub fn merge(&mut self, later: MapPatch) {
        macro_rules! take {
            ($($field:ident),*) => {
                $(if later.$field.is_some() { self.$field = later.$field; })*
            };
        }
        take!(
            width,
            height,
            grid_size,
            grid_color,
            grid_opacity,
            grid_enabled,
            grid_offset_x,
            grid_offset_y,
            scale_in_feet,
            image_url,
            fog_enabled
        );
    }

    pub fn is_empty(&self) -> bool {
        *self == MapPatch::default()
    }
}
