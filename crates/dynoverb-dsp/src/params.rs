//! Parameter set shared by every reverb engine.
//!
//! A `ReverbParams` is a plain `Copy` snapshot. The host side builds one per
//! block and pushes it into the active engines; engines never mutate it while
//! processing. Every setter clamps to the documented range, so out-of-range
//! values are accepted silently rather than rejected.

use std::ops::RangeInclusive;

pub const PRE_DELAY_MS: RangeInclusive<f32> = 0.0..=500.0;
pub const DECAY_SECONDS: RangeInclusive<f32> = 0.1..=30.0;
pub const UNIT: RangeInclusive<f32> = 0.0..=1.0;
pub const WIDTH: RangeInclusive<f32> = 0.0..=2.0;
pub const MOD_RATE_HZ: RangeInclusive<f32> = 0.01..=5.0;
pub const HIGH_PASS_HZ: RangeInclusive<f32> = 20.0..=2000.0;
pub const LOW_PASS_HZ: RangeInclusive<f32> = 1000.0..=20000.0;

/// Decay time at or above which the tail is treated as infinite.
pub const INFINITE_DECAY_SECONDS: f32 = 30.0;

/// Clamp into `range`; NaN maps to the range minimum.
pub fn clamp_to(value: f32, range: &RangeInclusive<f32>) -> f32 {
    if value.is_nan() {
        *range.start()
    } else {
        value.clamp(*range.start(), *range.end())
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ReverbParams {
    pre_delay_ms: f32,
    decay_seconds: f32,
    damping: f32,
    size: f32,
    diffusion: f32,
    mod_rate_hz: f32,
    mod_depth: f32,
    early_level: f32,
    width: f32,
    high_pass_hz: f32,
    low_pass_hz: f32,
    mix: f32,
    freeze: bool,
    bypass: bool,
}

impl Default for ReverbParams {
    fn default() -> Self {
        Self {
            pre_delay_ms: 0.0,
            decay_seconds: 2.0,
            damping: 0.5,
            size: 0.5,
            diffusion: 0.7,
            mod_rate_hz: 0.5,
            mod_depth: 0.3,
            early_level: 0.5,
            width: 1.0,
            high_pass_hz: 20.0,
            low_pass_hz: 20000.0,
            mix: 0.5,
            freeze: false,
            bypass: false,
        }
    }
}

impl ReverbParams {
    pub fn set_pre_delay_ms(&mut self, ms: f32) {
        self.pre_delay_ms = clamp_to(ms, &PRE_DELAY_MS);
    }

    pub fn set_decay_seconds(&mut self, seconds: f32) {
        self.decay_seconds = clamp_to(seconds, &DECAY_SECONDS);
    }

    pub fn set_damping(&mut self, damping: f32) {
        self.damping = clamp_to(damping, &UNIT);
    }

    pub fn set_size(&mut self, size: f32) {
        self.size = clamp_to(size, &UNIT);
    }

    pub fn set_diffusion(&mut self, diffusion: f32) {
        self.diffusion = clamp_to(diffusion, &UNIT);
    }

    pub fn set_mod_rate_hz(&mut self, hz: f32) {
        self.mod_rate_hz = clamp_to(hz, &MOD_RATE_HZ);
    }

    pub fn set_mod_depth(&mut self, depth: f32) {
        self.mod_depth = clamp_to(depth, &UNIT);
    }

    pub fn set_early_level(&mut self, level: f32) {
        self.early_level = clamp_to(level, &UNIT);
    }

    pub fn set_width(&mut self, width: f32) {
        self.width = clamp_to(width, &WIDTH);
    }

    pub fn set_high_pass_hz(&mut self, hz: f32) {
        self.high_pass_hz = clamp_to(hz, &HIGH_PASS_HZ);
    }

    pub fn set_low_pass_hz(&mut self, hz: f32) {
        self.low_pass_hz = clamp_to(hz, &LOW_PASS_HZ);
    }

    pub fn set_mix(&mut self, mix: f32) {
        self.mix = clamp_to(mix, &UNIT);
    }

    pub fn set_freeze(&mut self, freeze: bool) {
        self.freeze = freeze;
    }

    pub fn set_bypass(&mut self, bypass: bool) {
        self.bypass = bypass;
    }

    pub fn pre_delay_ms(&self) -> f32 {
        self.pre_delay_ms
    }

    pub fn decay_seconds(&self) -> f32 {
        self.decay_seconds
    }

    pub fn damping(&self) -> f32 {
        self.damping
    }

    pub fn size(&self) -> f32 {
        self.size
    }

    pub fn diffusion(&self) -> f32 {
        self.diffusion
    }

    pub fn mod_rate_hz(&self) -> f32 {
        self.mod_rate_hz
    }

    pub fn mod_depth(&self) -> f32 {
        self.mod_depth
    }

    pub fn early_level(&self) -> f32 {
        self.early_level
    }

    pub fn width(&self) -> f32 {
        self.width
    }

    pub fn high_pass_hz(&self) -> f32 {
        self.high_pass_hz
    }

    pub fn low_pass_hz(&self) -> f32 {
        self.low_pass_hz
    }

    pub fn mix(&self) -> f32 {
        self.mix
    }

    pub fn freeze(&self) -> bool {
        self.freeze
    }

    pub fn bypass(&self) -> bool {
        self.bypass
    }

    /// True when the tail should sustain indefinitely (freeze or maximum decay).
    pub fn sustains(&self) -> bool {
        self.freeze || self.decay_seconds >= INFINITE_DECAY_SECONDS
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_setters_clamp() {
        let mut p = ReverbParams::default();
        p.set_pre_delay_ms(900.0);
        p.set_decay_seconds(0.0);
        p.set_width(-1.0);
        p.set_mix(1.5);
        p.set_high_pass_hz(5.0);
        p.set_low_pass_hz(96000.0);
        p.set_mod_rate_hz(100.0);
        assert_eq!(p.pre_delay_ms(), 500.0);
        assert_eq!(p.decay_seconds(), 0.1);
        assert_eq!(p.width(), 0.0);
        assert_eq!(p.mix(), 1.0);
        assert_eq!(p.high_pass_hz(), 20.0);
        assert_eq!(p.low_pass_hz(), 20000.0);
        assert_eq!(p.mod_rate_hz(), 5.0);
    }

    #[test]
    fn test_nan_maps_to_minimum() {
        let mut p = ReverbParams::default();
        p.set_size(f32::NAN);
        p.set_decay_seconds(f32::NAN);
        assert_eq!(p.size(), 0.0);
        assert_eq!(p.decay_seconds(), 0.1);
    }

    #[test]
    fn test_sustains() {
        let mut p = ReverbParams::default();
        assert!(!p.sustains());
        p.set_decay_seconds(30.0);
        assert!(p.sustains());
        p.set_decay_seconds(2.0);
        p.set_freeze(true);
        assert!(p.sustains());
    }
}
