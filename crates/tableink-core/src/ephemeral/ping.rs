//! Ping markers with a fixed four-phase animation.

use super::age;
use crate::Millis;
use crate::color::Rgba8;
use crate::config::PingConfig;
use crate::map::UserId;
use kurbo::Point;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for pings.
pub type PingId = Uuid;

/// A single-point attention marker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Ping {
    pub id: PingId,
    pub position: Point,
    pub color: Rgba8,
    pub created_by: UserId,
    pub created_at: Millis,
}

/// Where a ping is in its animation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PingPhase {
    /// Full white with doubled glow.
    Flash,
    /// White blending into the ping colour; `progress` in `[0, 1]`.
    Transition { progress: f64 },
    Hold,
    /// Fading out; `progress` in `[0, 1]`.
    Fade { progress: f64 },
    Done,
}

/// Render parameters for a ping at a given instant.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PingAppearance {
    pub color: Rgba8,
    pub opacity: f64,
    /// Glow radius multiplier.
    pub glow_scale: f64,
}

fn progress(age: Millis, from: Millis, to: Millis) -> f64 {
    if to <= from {
        return 1.0;
    }
    ((age - from) as f64 / (to - from) as f64).clamp(0.0, 1.0)
}

impl Ping {
    pub fn new(position: Point, color: Rgba8, created_by: UserId, created_at: Millis) -> Self {
        Self {
            id: Uuid::new_v4(),
            position,
            color,
            created_by,
            created_at,
        }
    }

    pub fn phase(&self, now: Millis, config: &PingConfig) -> PingPhase {
        let age = age(self.created_at, now);
        if age < config.flash_end_ms {
            PingPhase::Flash
        } else if age < config.transition_end_ms {
            PingPhase::Transition {
                progress: progress(age, config.flash_end_ms, config.transition_end_ms),
            }
        } else if age < config.hold_end_ms {
            PingPhase::Hold
        } else if age < config.fade_end_ms {
            PingPhase::Fade {
                progress: progress(age, config.hold_end_ms, config.fade_end_ms),
            }
        } else {
            PingPhase::Done
        }
    }

    pub fn appearance(&self, now: Millis, config: &PingConfig) -> PingAppearance {
        match self.phase(now, config) {
            PingPhase::Flash => PingAppearance {
                color: Rgba8::white(),
                opacity: 1.0,
                glow_scale: 2.0,
            },
            PingPhase::Transition { progress } => PingAppearance {
                color: Rgba8::white().lerp(self.color, progress),
                opacity: 1.0,
                glow_scale: 2.0 - progress,
            },
            PingPhase::Hold => PingAppearance {
                color: self.color,
                opacity: 1.0,
                glow_scale: 1.0,
            },
            PingPhase::Fade { progress } => PingAppearance {
                color: self.color,
                opacity: 1.0 - progress,
                glow_scale: 1.0,
            },
            PingPhase::Done => PingAppearance {
                color: self.color,
                opacity: 0.0,
                glow_scale: 1.0,
            },
        }
    }

    pub fn is_expired(&self, now: Millis, config: &PingConfig) -> bool {
        self.phase(now, config) == PingPhase::Done
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ping() -> Ping {
        Ping::new(Point::new(5.0, 5.0), Rgba8::rgb(0, 0, 255), "u".into(), 1000)
    }

    #[test]
    fn test_phase_boundaries() {
        let config = PingConfig::default();
        let ping = ping();
        assert_eq!(ping.phase(1000, &config), PingPhase::Flash);
        assert_eq!(ping.phase(1199, &config), PingPhase::Flash);
        assert_eq!(ping.phase(1200, &config), PingPhase::Transition { progress: 0.0 });
        assert_eq!(ping.phase(1350, &config), PingPhase::Transition { progress: 0.5 });
        assert_eq!(ping.phase(1500, &config), PingPhase::Hold);
        assert_eq!(ping.phase(3500, &config), PingPhase::Fade { progress: 0.0 });
        assert_eq!(ping.phase(4000, &config), PingPhase::Fade { progress: 0.5 });
        assert_eq!(ping.phase(4500, &config), PingPhase::Done);
        assert!(ping.is_expired(4500, &config));
        assert!(!ping.is_expired(4499, &config));
    }

    #[test]
    fn test_flash_is_white_with_double_glow() {
        let config = PingConfig::default();
        let look = ping().appearance(1100, &config);
        assert_eq!(look.color, Rgba8::white());
        assert_eq!(look.glow_scale, 2.0);
    }

    #[test]
    fn test_fade_opacity() {
        let config = PingConfig::default();
        let look = ping().appearance(4000, &config);
        assert_eq!(look.color, Rgba8::rgb(0, 0, 255));
        assert!((look.opacity - 0.5).abs() < 1e-12);
    }
}
