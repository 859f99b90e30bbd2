//! Phase-accumulator sine LFO used for delay-line modulation.
//!
//! Phase lives in [0, 1) and wraps on overflow; the increment is
//! `rate / sample_rate` per sample.

use std::f32::consts::TAU;

#[derive(Clone, Debug, Default)]
pub struct Lfo {
    /// Normalized phase (0..1)
    phase: f32,
    /// Phase increment per sample
    increment: f32,
}

impl Lfo {
    pub fn new(rate_hz: f32, sample_rate: f32) -> Self {
        let mut lfo = Self::default();
        lfo.set_rate(rate_hz, sample_rate);
        lfo
    }

    /// Set the LFO rate. Negative or non-finite rates stop the LFO.
    pub fn set_rate(&mut self, rate_hz: f32, sample_rate: f32) {
        self.increment = if sample_rate > 0.0 && rate_hz.is_finite() {
            (rate_hz.max(0.0) / sample_rate).min(0.5)
        } else {
            0.0
        };
    }

    pub fn phase(&self) -> f32 {
        self.phase
    }

    /// Return two sines a quarter cycle apart, then advance one sample.
    #[inline]
    pub fn next_quadrature(&mut self) -> (f32, f32) {
        let a = (self.phase * TAU).sin();
        let b = ((self.phase + 0.25) * TAU).sin();
        self.phase += self.increment;
        if self.phase >= 1.0 {
            self.phase -= 1.0;
        }
        (a, b)
    }

    pub fn reset(&mut self) {
        self.phase = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phase_stays_in_unit_interval() {
        let mut lfo = Lfo::new(5.0, 1000.0);
        for _ in 0..10_000 {
            lfo.next_quadrature();
            assert!((0.0..1.0).contains(&lfo.phase()));
        }
    }

    #[test]
    fn test_quadrature_offset() {
        let mut lfo = Lfo::new(1.0, 48000.0);
        let (a, b) = lfo.next_quadrature();
        assert!(a.abs() < 1e-6);
        assert!((b - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_one_cycle_per_period() {
        let sr = 1000.0;
        let mut lfo = Lfo::new(2.0, sr);
        let mut crossings = 0;
        let mut prev = 0.0;
        // Two full periods plus a margin past the second wrap.
        for n in 0..1100 {
            let (a, _) = lfo.next_quadrature();
            if n > 0 && prev < 0.0 && a >= 0.0 {
                crossings += 1;
            }
            prev = a;
        }
        assert_eq!(crossings, 2);
    }
}
