//! Engine configuration.
//!
//! Every tunable constant the engine uses lives here, with defaults matching
//! the behaviour players are used to. A host may override any subset from a
//! JSON file; missing fields keep their defaults.

use crate::Millis;
use crate::color::Rgba8;
use crate::ephemeral::FadeWindow;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Configuration loading errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Parse error: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("Invalid value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// Pan/zoom limits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ViewportConfig {
    pub min_scale: f64,
    pub max_scale: f64,
    /// Zoom multiplier per wheel notch.
    pub zoom_step: f64,
}

impl Default for ViewportConfig {
    fn default() -> Self {
        Self {
            min_scale: 0.2,
            max_scale: 5.0,
            zoom_step: 1.05,
        }
    }
}

/// Snapping behaviour.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SnapConfig {
    /// Whether grid snapping is on before any modifier is held.
    pub enabled_by_default: bool,
    /// Pixel distance within which a token center captures the pointer.
    pub token_snap_threshold: f64,
}

impl Default for SnapConfig {
    fn default() -> Self {
        Self {
            enabled_by_default: true,
            token_snap_threshold: 30.0,
        }
    }
}

/// Fog-of-war reveal defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct FogConfig {
    /// Cells revealed around a player token.
    pub token_reveal_radius: u32,
    /// Cells revealed around a player token carrying a light.
    pub torch_reveal_radius: u32,
    /// Pixel distance at which a light counts as carried by a token.
    pub torch_pickup_distance: f64,
    /// Brush diameter in cells.
    pub default_brush_size: u32,
}

impl Default for FogConfig {
    fn default() -> Self {
        Self {
            token_reveal_radius: 3,
            torch_reveal_radius: 5,
            torch_pickup_distance: 30.0,
            default_brush_size: 3,
        }
    }
}

/// Fade windows and hard-delete deadlines for temporary annotations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct LifecycleConfig {
    pub shape_fade: FadeWindow,
    pub pen_fade: FadeWindow,
    pub pen_hard_delete_ms: Millis,
    pub arrow_fade: FadeWindow,
    pub arrow_hard_delete_ms: Millis,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            shape_fade: FadeWindow::new(3000, 2000),
            pen_fade: FadeWindow::new(1000, 2000),
            pen_hard_delete_ms: 3000,
            arrow_fade: FadeWindow::new(2000, 1000),
            arrow_hard_delete_ms: 3000,
        }
    }
}

/// Ping phase boundaries, as offsets from creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PingConfig {
    pub flash_end_ms: Millis,
    pub transition_end_ms: Millis,
    pub hold_end_ms: Millis,
    pub fade_end_ms: Millis,
}

impl Default for PingConfig {
    fn default() -> Self {
        Self {
            flash_end_ms: 200,
            transition_end_ms: 500,
            hold_end_ms: 2500,
            fade_end_ms: 3500,
        }
    }
}

/// Preview bus behaviour.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PreviewConfig {
    pub ttl_ms: Millis,
    /// Opacity multiplier applied to other users' previews.
    pub opacity_factor: f64,
}

impl Default for PreviewConfig {
    fn default() -> Self {
        Self {
            ttl_ms: 30_000,
            opacity_factor: 0.6,
        }
    }
}

/// Synthetic "natural vision" light given to player tokens in the dark.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct VisionConfig {
    /// Ambient level below which natural vision kicks in.
    pub ambient_threshold: f64,
    pub radius: f64,
    pub intensity: f64,
    pub color: Rgba8,
}

impl Default for VisionConfig {
    fn default() -> Self {
        Self {
            ambient_threshold: 0.4,
            radius: 120.0,
            intensity: 0.5,
            color: Rgba8::rgb(255, 214, 170),
        }
    }
}

/// Interaction timing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct InteractionConfig {
    /// Inactivity after which an unfinished two-click gesture is dropped.
    pub gesture_timeout_ms: Millis,
    /// Quiet period before buffered map edits are persisted.
    pub map_edit_debounce_ms: Millis,
    /// Distance beyond the map edge at which a token drop is rejected.
    pub off_limits_margin: f64,
}

impl Default for InteractionConfig {
    fn default() -> Self {
        Self {
            gesture_timeout_ms: 30_000,
            map_edit_debounce_ms: 180,
            off_limits_margin: 100.0,
        }
    }
}

/// Top-level engine configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EngineConfig {
    pub viewport: ViewportConfig,
    pub snap: SnapConfig,
    pub fog: FogConfig,
    pub lifecycle: LifecycleConfig,
    pub ping: PingConfig,
    pub preview: PreviewConfig,
    pub vision: VisionConfig,
    pub interaction: InteractionConfig,
}

impl EngineConfig {
    /// Parse a configuration from JSON, filling in defaults.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    /// Reject values the engine cannot work with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let v = &self.viewport;
        if !(v.min_scale > 0.0) {
            return Err(ConfigError::Invalid {
                field: "viewport.minScale",
                reason: format!("must be positive, got {}", v.min_scale),
            });
        }
        if v.max_scale < v.min_scale {
            return Err(ConfigError::Invalid {
                field: "viewport.maxScale",
                reason: format!("{} is below minScale {}", v.max_scale, v.min_scale),
            });
        }
        if !(v.zoom_step > 1.0) {
            return Err(ConfigError::Invalid {
                field: "viewport.zoomStep",
                reason: format!("must be greater than 1, got {}", v.zoom_step),
            });
        }
        let p = &self.ping;
        if !(p.flash_end_ms <= p.transition_end_ms
            && p.transition_end_ms <= p.hold_end_ms
            && p.hold_end_ms <= p.fade_end_ms)
        {
            return Err(ConfigError::Invalid {
                field: "ping",
                reason: "phase boundaries must be non-decreasing".to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.viewport.min_scale, 0.2);
        assert_eq!(config.viewport.max_scale, 5.0);
        assert_eq!(config.snap.token_snap_threshold, 30.0);
        assert_eq!(config.lifecycle.shape_fade, FadeWindow::new(3000, 2000));
        assert_eq!(config.preview.ttl_ms, 30_000);
        assert_eq!(config.interaction.map_edit_debounce_ms, 180);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_override() {
        let config = EngineConfig::from_json_str(
            r#"{ "viewport": { "maxScale": 8.0 }, "fog": { "tokenRevealRadius": 4 } }"#,
        )
        .unwrap();
        assert_eq!(config.viewport.max_scale, 8.0);
        assert_eq!(config.viewport.min_scale, 0.2);
        assert_eq!(config.fog.token_reveal_radius, 4);
        assert_eq!(config.fog.torch_reveal_radius, 5);
    }

    #[test]
    fn test_invalid_scale_rejected() {
        let result = EngineConfig::from_json_str(r#"{ "viewport": { "minScale": 0.0 } }"#);
        assert!(matches!(result, Err(ConfigError::Invalid { .. })));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{ "preview": {{ "ttlMs": 10000 }} }}"#).unwrap();

        let config = EngineConfig::load(file.path()).unwrap();
        assert_eq!(config.preview.ttl_ms, 10_000);
    }

    #[test]
    fn test_load_missing_file() {
        let result = EngineConfig::load("/definitely/not/here.json");
        assert!(matches!(result, Err(ConfigError::Io(_))));
    }
}
