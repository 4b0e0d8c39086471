//! Ambient light from time of day and the DM's manual override.

use crate::color::Rgba8;

/// Ambient level at night.
pub const NIGHT_LIGHT: f64 = 0.15;
/// Ambient level in full daylight.
pub const DAY_LIGHT: f64 = 0.9;

const SUNRISE: (f64, f64) = (5.0, 7.0);
const SUNSET: (f64, f64) = (17.0, 19.0);

/// Coarse time-of-day period, used to pick the fog tint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DayPeriod {
    Day,
    /// Sunrise or sunset ramp.
    Dusk,
    Night,
}

/// Wrap an hour value into `[0, 24)`.
fn wrap_hours(time_of_day: f64) -> f64 {
    if time_of_day.is_finite() {
        time_of_day.rem_euclid(24.0)
    } else {
        0.0
    }
}

pub fn day_period(time_of_day: f64) -> DayPeriod {
    let t = wrap_hours(time_of_day);
    if (SUNRISE.0..SUNRISE.1).contains(&t) || (SUNSET.0..SUNSET.1).contains(&t) {
        DayPeriod::Dusk
    } else if (SUNRISE.1..SUNSET.0).contains(&t) {
        DayPeriod::Day
    } else {
        DayPeriod::Night
    }
}

/// Five-segment daylight curve: night, sunrise ramp, day, sunset ramp, night.
pub fn time_based_light(time_of_day: f64) -> f64 {
    let t = wrap_hours(time_of_day);
    let ramp = |from: f64, to: f64, (start, end): (f64, f64)| from + (to - from) * (t - start) / (end - start);
    if t < SUNRISE.0 {
        NIGHT_LIGHT
    } else if t < SUNRISE.1 {
        ramp(NIGHT_LIGHT, DAY_LIGHT, SUNRISE)
    } else if t < SUNSET.0 {
        DAY_LIGHT
    } else if t < SUNSET.1 {
        ramp(DAY_LIGHT, NIGHT_LIGHT, SUNSET)
    } else {
        NIGHT_LIGHT
    }
}

/// Opacity of the darkness overlay for an effective ambient level.
pub fn darkness_opacity(effective: f64) -> f64 {
    (1.0 - effective.clamp(0.0, 1.0)).powf(1.15)
}

/// Tint used for fogged cells at a given ambient level.
pub fn fog_tint(effective: f64, period: DayPeriod) -> Rgba8 {
    const NEAR_BLACK: Rgba8 = Rgba8::rgb(10, 10, 15);
    const DARK_BLUE: Rgba8 = Rgba8::rgb(25, 30, 45);
    const DIM_GRAY: Rgba8 = Rgba8::rgb(70, 75, 90);
    const WARM: Rgba8 = Rgba8::rgb(120, 100, 90);
    const COOL: Rgba8 = Rgba8::rgb(110, 115, 130);
    const LIGHT_GRAY: Rgba8 = Rgba8::rgb(160, 160, 165);

    let e = effective.clamp(0.0, 1.0);
    if e < 0.2 {
        NEAR_BLACK
    } else if e < 0.35 {
        DARK_BLUE
    } else if e < 0.55 {
        DARK_BLUE.lerp(DIM_GRAY, (e - 0.35) / 0.2)
    } else if e < 0.75 {
        let target = if period == DayPeriod::Dusk { WARM } else { COOL };
        DIM_GRAY.lerp(target, (e - 0.55) / 0.2)
    } else {
        LIGHT_GRAY
    }
}

/// Result of blending the time curve with the manual override.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AmbientLevel {
    pub time_based: f64,
    /// How strongly the manual value wins; 0 at a manual value of 0.5.
    pub blend_weight: f64,
    pub effective: f64,
    pub darkness_opacity: f64,
    pub period: DayPeriod,
    pub fog_tint: Rgba8,
}

impl AmbientLevel {
    pub fn is_day(&self) -> bool {
        self.period == DayPeriod::Day
    }

    pub fn is_dusk(&self) -> bool {
        self.period == DayPeriod::Dusk
    }

    pub fn is_night(&self) -> bool {
        self.period == DayPeriod::Night
    }
}

/// Blend the time-of-day curve with a manual ambient value in `[0, 1]`.
///
/// A manual value of 0.5 defers entirely to the clock; 0 or 1 override it.
pub fn compute_ambient(time_of_day: f64, manual_ambient: f64) -> AmbientLevel {
    let manual = if manual_ambient.is_finite() {
        manual_ambient.clamp(0.0, 1.0)
    } else {
        0.5
    };
    let time_based = time_based_light(time_of_day);
    let blend_weight = (manual - 0.5).abs() * 2.0;
    let effective = (manual * blend_weight + time_based * (1.0 - blend_weight)).clamp(0.0, 1.0);
    let period = day_period(time_of_day);
    AmbientLevel {
        time_based,
        blend_weight,
        effective,
        darkness_opacity: darkness_opacity(effective),
        period,
        fog_tint: fog_tint(effective, period),
    }
}
