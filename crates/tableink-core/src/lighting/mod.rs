//! Dynamic lighting: ambient level, point lights and their animation.
//!
//! Lights are visual only. A [`LightingFrame`] is recomputed every render
//! from the stored lights, the global settings and the animation clock.

mod ambient;
mod animation;

pub use ambient::{
    AmbientLevel, DAY_LIGHT, DayPeriod, NIGHT_LIGHT, compute_ambient, darkness_opacity, day_period, fog_tint,
    time_based_light,
};
pub use animation::{FLICKER_RATE, PULSE_RATE, flicker_factor, pulse_factor};

use crate::color::Rgba8;
use crate::config::VisionConfig;
use kurbo::Point;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::f64::consts::TAU;
use uuid::Uuid;

/// Unique identifier for lights.
pub type LightId = Uuid;

/// A point light placed by the DM.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Light {
    pub id: LightId,
    pub position: Point,
    /// Reach of the light, in map pixels.
    pub radius: f64,
    pub intensity: f64,
    pub color: Rgba8,
    #[serde(default)]
    pub flicker: bool,
    #[serde(default)]
    pub flicker_intensity: f64,
    #[serde(default)]
    pub animated: bool,
    #[serde(default)]
    pub pulse_intensity: f64,
}

impl Light {
    /// A steady warm light.
    pub fn new(position: Point, radius: f64) -> Self {
        Self {
            id: Uuid::new_v4(),
            position,
            radius,
            intensity: 1.0,
            color: Rgba8::rgb(255, 200, 120),
            flicker: false,
            flicker_intensity: 0.0,
            animated: false,
            pulse_intensity: 0.0,
        }
    }

    pub fn with_flicker(mut self, intensity: f64) -> Self {
        self.flicker = true;
        self.flicker_intensity = intensity.clamp(0.0, 1.0);
        self
    }

    pub fn with_pulse(mut self, intensity: f64) -> Self {
        self.animated = true;
        self.pulse_intensity = intensity.clamp(0.0, 1.0);
        self
    }

    /// Stable per-light phase in `[0, 2π)`, so lights do not move in lockstep.
    pub fn phase_offset(&self) -> f64 {
        (self.id.as_u128() % 1000) as f64 / 1000.0 * TAU
    }

    pub fn is_animated(&self) -> bool {
        self.flicker || self.animated
    }

    /// Radius and intensity at animation time `t` seconds.
    pub fn sample(&self, t: f64) -> LightSample {
        let phase = self.phase_offset();
        let mut factor = 1.0;
        if self.flicker {
            factor *= flicker_factor(t, self.flicker_intensity, phase);
        }
        if self.animated {
            factor *= pulse_factor(t, self.pulse_intensity, phase);
        }
        LightSample {
            position: self.position,
            radius: (self.radius * factor).max(0.0),
            intensity: (self.intensity * factor).clamp(0.0, 1.0),
            color: self.color,
            natural: false,
        }
    }
}

/// Map-wide lighting settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GlobalLighting {
    pub enabled: bool,
    /// Hour of the day in `[0, 24)`.
    pub time_of_day: f64,
    /// Manual ambient override in `[0, 1]`; 0.5 follows the clock.
    pub ambient_light: f64,
}

impl Default for GlobalLighting {
    fn default() -> Self {
        Self {
            enabled: false,
            time_of_day: 12.0,
            ambient_light: 0.5,
        }
    }
}

impl GlobalLighting {
    pub fn ambient(&self) -> AmbientLevel {
        compute_ambient(self.time_of_day, self.ambient_light)
    }
}

/// A light as it should be drawn this frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LightSample {
    pub position: Point,
    pub radius: f64,
    pub intensity: f64,
    pub color: Rgba8,
    /// Synthetic player vision rather than a placed light.
    pub natural: bool,
}

impl LightSample {
    /// Darkness cutout strength at a point: 1 at the center, 0 at the radius.
    pub fn cutout_alpha(&self, p: Point) -> f64 {
        if self.radius <= 0.0 {
            return 0.0;
        }
        (1.0 - p.distance(self.position) / self.radius).clamp(0.0, 1.0)
    }
}

/// Synthetic vision lights for player tokens when the map is dark.
pub fn natural_vision_lights(player_tokens: &[Point], ambient: f64, config: &VisionConfig) -> Vec<LightSample> {
    if ambient >= config.ambient_threshold {
        return Vec::new();
    }
    player_tokens
        .iter()
        .map(|&position| LightSample {
            position,
            radius: config.radius,
            intensity: config.intensity,
            color: config.color,
            natural: true,
        })
        .collect()
}

/// Local cache of the lights on the map.
#[derive(Debug, Default)]
pub struct LightSet {
    lights: HashMap<LightId, Light>,
}

impl LightSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn replace(&mut self, lights: Vec<Light>) {
        self.lights = lights.into_iter().map(|l| (l.id, l)).collect();
    }

    pub fn insert(&mut self, light: Light) {
        self.lights.insert(light.id, light);
    }

    pub fn remove(&mut self, id: LightId) -> Option<Light> {
        self.lights.remove(&id)
    }

    pub fn get(&self, id: LightId) -> Option<&Light> {
        self.lights.get(&id)
    }

    pub fn get_mut(&mut self, id: LightId) -> Option<&mut Light> {
        self.lights.get_mut(&id)
    }

    /// Lights in a stable order.
    pub fn iter(&self) -> impl Iterator<Item = &Light> {
        let mut lights: Vec<&Light> = self.lights.values().collect();
        lights.sort_by_key(|l| l.id);
        lights.into_iter()
    }

    pub fn len(&self) -> usize {
        self.lights.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lights.is_empty()
    }

    /// Light nearest to `p` within `threshold` pixels.
    pub fn hit_test(&self, p: Point, threshold: f64) -> Option<LightId> {
        self.lights
            .values()
            .map(|l| (l.id, l.position.distance(p)))
            .filter(|(_, d)| *d <= threshold)
            .min_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(id, _)| id)
    }

    pub fn positions(&self) -> Vec<(Point, f64)> {
        self.iter().map(|l| (l.position, l.radius)).collect()
    }

    /// Whether the animation loop needs to run.
    pub fn needs_animation(&self, global: &GlobalLighting) -> bool {
        global.enabled && self.lights.values().any(Light::is_animated)
    }
}

/// Everything the lighting layer draws for one frame.
#[derive(Debug, Clone, PartialEq)]
pub struct LightingFrame {
    pub ambient: AmbientLevel,
    pub lights: Vec<LightSample>,
}

impl LightingFrame {
    /// Compose a frame, or `None` when lighting is off.
    pub fn compose(
        global: &GlobalLighting,
        lights: &LightSet,
        player_tokens: &[Point],
        t: f64,
        vision: &VisionConfig,
    ) -> Option<Self> {
        if !global.enabled {
            return None;
        }
        let ambient = global.ambient();
        let mut samples: Vec<LightSample> = lights.iter().map(|l| l.sample(t)).collect();
        samples.extend(natural_vision_lights(player_tokens, ambient.effective, vision));
        Some(Self {
            ambient,
            lights: samples,
        })
    }
}
