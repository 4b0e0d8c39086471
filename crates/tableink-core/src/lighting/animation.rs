//! Flicker and pulse modulation for point lights.
//!
//! Both return a multiplier around 1 that the composer applies to a light's
//! radius and intensity. `t` is the animation clock in seconds.

use std::f64::consts::TAU;

/// Angular rate of the flicker base wave, in radians per second.
pub const FLICKER_RATE: f64 = 10.0;
/// Angular rate of the pulse wave: one cycle every six seconds.
pub const PULSE_RATE: f64 = TAU / 6.0;

/// Flicker multiplier: two detuned sines scaled by `intensity`, which is
/// clamped to `[0, 1]`.
pub fn flicker_factor(t: f64, intensity: f64, phase: f64) -> f64 {
    let intensity = intensity.clamp(0.0, 1.0);
    let wave = 0.04 * (t * FLICKER_RATE + phase).sin() + 0.03 * (t * 1.7 * FLICKER_RATE + phase).sin();
    1.0 + wave * intensity
}

/// Pulse multiplier, swinging between `1 - 0.5 * intensity` and 1.
/// `intensity` is clamped to `[0, 1]`.
pub fn pulse_factor(t: f64, intensity: f64, phase: f64) -> f64 {
    let amplitude = 0.25 * intensity.clamp(0.0, 1.0);
    amplitude * (t * PULSE_RATE + phase).sin() + (1.0 - amplitude)
}
