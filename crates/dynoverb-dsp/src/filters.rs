//! Shared filter primitives for the reverb engines.
//!
//! All filters: `process(sample) -> sample`, `reset()`. Coefficient setters
//! clamp their inputs so every derived filter stays stable.

use std::f32::consts::PI;

/// Highest cutoff handed to a coefficient calculator, as a fraction of the sample rate.
const MAX_CUTOFF_RATIO: f32 = 0.49;
/// Lowest cutoff handed to a coefficient calculator.
const MIN_CUTOFF_HZ: f32 = 1.0;

fn clamp_cutoff(freq_hz: f32, sample_rate: f32) -> f32 {
    let max = (sample_rate * MAX_CUTOFF_RATIO).max(MIN_CUTOFF_HZ);
    if freq_hz.is_nan() {
        return MIN_CUTOFF_HZ;
    }
    freq_hz.clamp(MIN_CUTOFF_HZ, max)
}

/// Normalized biquad coefficients (a0 = 1).
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BiquadCoeffs {
    pub b0: f32,
    pub b1: f32,
    pub b2: f32,
    pub a1: f32,
    pub a2: f32,
}

impl Default for BiquadCoeffs {
    /// Identity (pass-through).
    fn default() -> Self {
        Self {
            b0: 1.0,
            b1: 0.0,
            b2: 0.0,
            a1: 0.0,
            a2: 0.0,
        }
    }
}

impl BiquadCoeffs {
    /// Low-pass filter (Audio EQ Cookbook).
    pub fn lowpass(cutoff_hz: f32, q: f32, sample_rate: f32) -> Self {
        let w0 = 2.0 * PI * clamp_cutoff(cutoff_hz, sample_rate) / sample_rate;
        let alpha = w0.sin() / (2.0 * q.max(0.01));
        let cos_w0 = w0.cos();

        let b1 = 1.0 - cos_w0;
        let b0 = b1 / 2.0;
        let a0 = 1.0 + alpha;

        Self {
            b0: b0 / a0,
            b1: b1 / a0,
            b2: b0 / a0,
            a1: -2.0 * cos_w0 / a0,
            a2: (1.0 - alpha) / a0,
        }
    }

    /// High-pass filter (Audio EQ Cookbook).
    pub fn highpass(cutoff_hz: f32, q: f32, sample_rate: f32) -> Self {
        let w0 = 2.0 * PI * clamp_cutoff(cutoff_hz, sample_rate) / sample_rate;
        let alpha = w0.sin() / (2.0 * q.max(0.01));
        let cos_w0 = w0.cos();

        let b1 = -(1.0 + cos_w0);
        let b0 = -b1 / 2.0;
        let a0 = 1.0 + alpha;

        Self {
            b0: b0 / a0,
            b1: b1 / a0,
            b2: b0 / a0,
            a1: -2.0 * cos_w0 / a0,
            a2: (1.0 - alpha) / a0,
        }
    }

    /// Peaking EQ (Audio EQ Cookbook), gain in dB.
    pub fn peaking(center_hz: f32, q: f32, gain_db: f32, sample_rate: f32) -> Self {
        let w0 = 2.0 * PI * clamp_cutoff(center_hz, sample_rate) / sample_rate;
        let alpha = w0.sin() / (2.0 * q.max(0.01));
        let cos_w0 = w0.cos();
        let a = 10.0f32.powf(gain_db / 40.0);

        let a0 = 1.0 + alpha / a;

        Self {
            b0: (1.0 + alpha * a) / a0,
            b1: -2.0 * cos_w0 / a0,
            b2: (1.0 - alpha * a) / a0,
            a1: -2.0 * cos_w0 / a0,
            a2: (1.0 - alpha / a) / a0,
        }
    }
}

/// Biquad filter, Direct Form II Transposed.
///
/// Coefficients can be swapped without touching the filter state, so the
/// engines retune their input/output filters once per block without clicks.
#[derive(Clone, Debug, Default)]
pub struct Biquad {
    c: BiquadCoeffs,
    s1: f32,
    s2: f32,
}

impl Biquad {
    pub fn new(coeffs: BiquadCoeffs) -> Self {
        Self {
            c: coeffs,
            s1: 0.0,
            s2: 0.0,
        }
    }

    pub fn set_coefficients(&mut self, coeffs: BiquadCoeffs) {
        self.c = coeffs;
    }

    /// Update coefficients to lowpass (Q = 0.707) without resetting filter state.
    pub fn set_lowpass(&mut self, cutoff_hz: f32, sample_rate: f32) {
        self.c = BiquadCoeffs::lowpass(cutoff_hz, std::f32::consts::FRAC_1_SQRT_2, sample_rate);
    }

    /// Update coefficients to highpass (Q = 0.707) without resetting filter state.
    pub fn set_highpass(&mut self, cutoff_hz: f32, sample_rate: f32) {
        self.c = BiquadCoeffs::highpass(cutoff_hz, std::f32::consts::FRAC_1_SQRT_2, sample_rate);
    }

    pub fn coefficients(&self) -> BiquadCoeffs {
        self.c
    }

    #[inline]
    pub fn process(&mut self, x: f32) -> f32 {
        let y = self.c.b0 * x + self.s1;
        self.s1 = self.c.b1 * x - self.c.a1 * y + self.s2;
        self.s2 = self.c.b2 * x - self.c.a2 * y;
        y
    }

    pub fn reset(&mut self) {
        self.s1 = 0.0;
        self.s2 = 0.0;
    }
}

/// 1-pole low-pass filter: y[n] = a0 * x[n] + (1 - a0) * y[n-1]
#[derive(Clone, Debug)]
pub struct OnePoleLpf {
    a0: f32,
    z1: f32,
}

impl Default for OnePoleLpf {
    fn default() -> Self {
        Self { a0: 0.1, z1: 0.0 }
    }
}

impl OnePoleLpf {
    pub fn new(cutoff_hz: f32, sample_rate: f32) -> Self {
        let mut f = Self::default();
        f.set_cutoff(cutoff_hz, sample_rate);
        f
    }

    /// Set the input coefficient directly, clamped to [0, 1].
    pub fn set_coefficient(&mut self, a0: f32) {
        self.a0 = if a0.is_nan() { 0.0 } else { a0.clamp(0.0, 1.0) };
    }

    pub fn set_cutoff(&mut self, cutoff_hz: f32, sample_rate: f32) {
        let w = 2.0 * PI * clamp_cutoff(cutoff_hz, sample_rate) / sample_rate;
        self.set_coefficient(w / (1.0 + w));
    }

    #[inline]
    pub fn process(&mut self, x: f32) -> f32 {
        self.z1 = self.a0 * x + (1.0 - self.a0) * self.z1;
        self.z1
    }

    pub fn reset(&mut self) {
        self.z1 = 0.0;
    }
}

/// Smoothing coefficient for a one-pole follower with the given time constant.
///
/// Zero or negative times give an instant (coefficient 1) response.
pub fn time_coefficient(time_ms: f32, sample_rate: f32) -> f32 {
    if time_ms <= 0.0 || sample_rate <= 0.0 {
        return 1.0;
    }
    1.0 - (-1.0 / (sample_rate * time_ms * 0.001)).exp()
}

/// Peak envelope follower with separate attack and release times.
#[derive(Clone, Debug)]
pub struct EnvelopeFollower {
    attack: f32,
    release: f32,
    envelope: f32,
}

impl Default for EnvelopeFollower {
    fn default() -> Self {
        Self {
            attack: 0.1,
            release: 0.01,
            envelope: 0.0,
        }
    }
}

impl EnvelopeFollower {
    pub fn new(attack_ms: f32, release_ms: f32, sample_rate: f32) -> Self {
        let mut f = Self::default();
        f.set_times(attack_ms, release_ms, sample_rate);
        f
    }

    pub fn set_times(&mut self, attack_ms: f32, release_ms: f32, sample_rate: f32) {
        self.attack = time_coefficient(attack_ms, sample_rate);
        self.release = time_coefficient(release_ms, sample_rate);
    }

    #[inline]
    pub fn process(&mut self, x: f32) -> f32 {
        let level = x.abs();
        let coeff = if level > self.envelope {
            self.attack
        } else {
            self.release
        };
        self.envelope += coeff * (level - self.envelope);
        self.envelope
    }

    pub fn envelope(&self) -> f32 {
        self.envelope
    }

    pub fn reset(&mut self) {
        self.envelope = 0.0;
    }
}
