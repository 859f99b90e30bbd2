//! Circular-buffer delay primitives: plain delay line, allpass diffuser,
//! damped comb, and a modulated (fractional-read) delay line.
//!
//! Buffers are sized once (`allocate`) and never grow afterwards. Every index
//! is reduced modulo capacity, and a zero-capacity line reads as silence.

/// Fixed-capacity circular delay line.
///
/// `read(d)` returns the sample pushed `d` pushes before the next one, so a
/// read followed by a push of the same tick gives a delay of exactly `d`.
#[derive(Clone, Debug, Default)]
pub struct DelayLine {
    buffer: Vec<f32>,
    write: usize,
}

impl DelayLine {
    pub fn new(capacity: usize) -> Self {
        Self {
            buffer: vec![0.0; capacity],
            write: 0,
        }
    }

    /// Resize to `capacity` and clear. Only called from `prepare`.
    pub fn allocate(&mut self, capacity: usize) {
        self.buffer.clear();
        self.buffer.resize(capacity, 0.0);
        self.write = 0;
    }

    pub fn capacity(&self) -> usize {
        self.buffer.len()
    }

    /// Largest delay `read` can return without wrapping onto itself.
    pub fn max_delay(&self) -> usize {
        self.buffer.len().saturating_sub(1)
    }

    /// Next write position.
    pub fn write_index(&self) -> usize {
        self.write
    }

    #[inline]
    pub fn push(&mut self, x: f32) {
        let len = self.buffer.len();
        if len == 0 {
            return;
        }
        self.buffer[self.write] = x;
        self.write += 1;
        if self.write >= len {
            self.write = 0;
        }
    }

    #[inline]
    pub fn read(&self, delay: usize) -> f32 {
        let len = self.buffer.len();
        if len == 0 {
            return 0.0;
        }
        let d = delay % len;
        let idx = if self.write >= d {
            self.write - d
        } else {
            self.write + len - d
        };
        self.buffer[idx]
    }

    /// Linear-interpolated read at a fractional delay, clamped to `[1, capacity - 2]`.
    #[inline]
    pub fn read_frac(&self, delay: f32) -> f32 {
        let len = self.buffer.len();
        if len < 3 {
            return 0.0;
        }
        let d = if delay.is_nan() {
            1.0
        } else {
            delay.clamp(1.0, (len - 2) as f32)
        };
        let whole = d as usize;
        let frac = d - whole as f32;
        // One sample further back is the "next" point of the interpolation.
        let a = self.read(whole);
        let b = self.read(whole + 1);
        a + (b - a) * frac
    }

    /// Linear-interpolated read at an absolute (fractional) buffer position.
    #[inline]
    pub fn read_at(&self, position: f32) -> f32 {
        let len = self.buffer.len();
        if len == 0 {
            return 0.0;
        }
        let pos = if position.is_finite() {
            position.rem_euclid(len as f32)
        } else {
            0.0
        };
        let i0 = (pos as usize) % len;
        let i1 = (i0 + 1) % len;
        let frac = pos - pos.floor();
        self.buffer[i0] + (self.buffer[i1] - self.buffer[i0]) * frac
    }

    pub fn reset(&mut self) {
        self.buffer.fill(0.0);
        self.write = 0;
    }
}

/// Schroeder allpass diffuser: H(z) = (-g + z^-D) / (1 - g z^-D).
#[derive(Clone, Debug)]
pub struct Allpass {
    line: DelayLine,
    delay: usize,
    feedback: f32,
}

impl Allpass {
    /// Highest allowed feedback coefficient.
    pub const MAX_FEEDBACK: f32 = 0.99;

    pub fn new(max_delay: usize) -> Self {
        Self {
            line: DelayLine::new(max_delay),
            delay: 100.min(max_delay.saturating_sub(1)).max(1),
            feedback: 0.5,
        }
    }

    /// Set delay in samples, clamped to `[1, max_delay - 1]`.
    pub fn set_delay(&mut self, samples: usize) {
        self.delay = samples.clamp(1, self.line.max_delay().max(1));
    }

    /// Set feedback, clamped to `[0, 0.99]`.
    pub fn set_feedback(&mut self, g: f32) {
        self.feedback = if g.is_nan() {
            0.0
        } else {
            g.clamp(0.0, Self::MAX_FEEDBACK)
        };
    }

    pub fn set_parameters(&mut self, delay_samples: usize, feedback: f32) {
        self.set_delay(delay_samples);
        self.set_feedback(feedback);
    }

    pub fn delay(&self) -> usize {
        self.delay
    }

    pub fn feedback(&self) -> f32 {
        self.feedback
    }

    #[inline]
    pub fn process(&mut self, x: f32) -> f32 {
        let delayed = self.line.read(self.delay);
        let v = x + self.feedback * delayed;
        self.line.push(v);
        delayed - self.feedback * v
    }

    pub fn reset(&mut self) {
        self.line.reset();
    }
}

/// Feedback comb with a one-pole low-pass in the loop.
#[derive(Clone, Debug)]
pub struct Comb {
    line: DelayLine,
    delay: usize,
    feedback: f32,
    damping: f32,
    filter_state: f32,
}

impl Comb {
    pub fn new(max_delay: usize) -> Self {
        Self {
            line: DelayLine::new(max_delay),
            delay: 1000.min(max_delay.saturating_sub(1)).max(1),
            feedback: 0.8,
            damping: 0.5,
            filter_state: 0.0,
        }
    }

    pub fn set_delay(&mut self, samples: usize) {
        self.delay = samples.clamp(1, self.line.max_delay().max(1));
    }

    /// Feedback clamped to `[0, 0.99]`.
    pub fn set_feedback(&mut self, g: f32) {
        self.feedback = if g.is_nan() { 0.0 } else { g.clamp(0.0, 0.99) };
    }

    /// Damping clamped to `[0, 1]`; 0 = bright, 1 = fully damped.
    pub fn set_damping(&mut self, d: f32) {
        self.damping = if d.is_nan() { 0.0 } else { d.clamp(0.0, 1.0) };
    }

    pub fn set_parameters(&mut self, delay_samples: usize, feedback: f32, damping: f32) {
        self.set_delay(delay_samples);
        self.set_feedback(feedback);
        self.set_damping(damping);
    }

    #[inline]
    pub fn process(&mut self, x: f32) -> f32 {
        let out = self.line.read(self.delay);
        self.filter_state = out * (1.0 - self.damping) + self.filter_state * self.damping;
        self.line.push(x + self.filter_state * self.feedback);
        out
    }

    pub fn reset(&mut self) {
        self.line.reset();
        self.filter_state = 0.0;
    }
}

/// Delay line with a modulated, linearly interpolated read position.
#[derive(Clone, Debug)]
pub struct ModulatedDelay {
    line: DelayLine,
    base_delay: f32,
    mod_depth: f32,
}

impl ModulatedDelay {
    pub fn new(max_delay: usize) -> Self {
        Self {
            line: DelayLine::new(max_delay),
            base_delay: 1000.0,
            mod_depth: 10.0,
        }
    }

    pub fn allocate(&mut self, max_delay: usize) {
        self.line.allocate(max_delay);
    }

    /// Base delay in samples, clamped to `[1, capacity - 2]`.
    pub fn set_delay(&mut self, samples: f32) {
        let max = (self.line.capacity().saturating_sub(2)).max(1) as f32;
        self.base_delay = if samples.is_nan() {
            1.0
        } else {
            samples.clamp(1.0, max)
        };
    }

    /// Peak modulation excursion in samples.
    pub fn set_mod_depth(&mut self, samples: f32) {
        self.mod_depth = if samples.is_nan() { 0.0 } else { samples.max(0.0) };
    }

    pub fn set_parameters(&mut self, delay_samples: f32, mod_depth_samples: f32) {
        self.set_delay(delay_samples);
        self.set_mod_depth(mod_depth_samples);
    }

    /// `modulation` is a bipolar LFO value in [-1, 1].
    #[inline]
    pub fn process(&mut self, x: f32, modulation: f32) -> f32 {
        let y = self
            .line
            .read_frac(self.base_delay + modulation * self.mod_depth);
        self.line.push(x);
        y
    }

    pub fn reset(&mut self) {
        self.line.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delay_line_exact_delay() {
        let mut line = DelayLine::new(16);
        let mut out = Vec::new();
        for n in 0..10 {
            out.push(line.read(5));
            line.push(if n == 0 { 1.0 } else { 0.0 });
        }
        assert_eq!(out[5], 1.0);
        assert_eq!(out.iter().filter(|&&s| s != 0.0).count(), 1);
    }

    #[test]
    fn test_delay_line_wraps() {
        let mut line = DelayLine::new(4);
        for n in 0..11 {
            line.push(n as f32);
        }
        assert_eq!(line.read(1), 10.0);
        assert_eq!(line.read(4), 7.0);
        // Delays larger than capacity wrap instead of indexing out of bounds.
        assert_eq!(line.read(5), line.read(1));
    }

    #[test]
    fn test_empty_line_is_silent() {
        let mut line = DelayLine::default();
        line.push(1.0);
        assert_eq!(line.read(1), 0.0);
        assert_eq!(line.read_frac(3.5), 0.0);
        assert_eq!(line.read_at(2.0), 0.0);
    }

    #[test]
    fn test_read_frac_interpolates() {
        let mut line = DelayLine::new(8);
        line.push(0.0);
        line.push(1.0);
        // read(1) = 1.0, read(2) = 0.0
        assert!((line.read_frac(1.25) - 0.75).abs() < 1e-6);
    }

    #[test]
    fn test_allpass_preserves_energy() {
        let mut ap = Allpass::new(512);
        ap.set_parameters(37, 0.7);
        let mut energy = 0.0f64;
        for n in 0..20_000 {
            let y = ap.process(if n == 0 { 1.0 } else { 0.0 });
            energy += (y as f64) * (y as f64);
        }
        assert!((energy - 1.0).abs() < 1e-3, "allpass energy {energy}");
    }

    #[test]
    fn test_allpass_clamps() {
        let mut ap = Allpass::new(64);
        ap.set_feedback(3.0);
        assert_eq!(ap.feedback(), Allpass::MAX_FEEDBACK);
        ap.set_delay(10_000);
        assert_eq!(ap.delay(), 63);
        ap.set_delay(0);
        assert_eq!(ap.delay(), 1);
    }

    #[test]
    fn test_comb_decays() {
        let mut comb = Comb::new(256);
        comb.set_parameters(50, 0.9, 0.2);
        let mut early = 0.0f32;
        let mut late = 0.0f32;
        for n in 0..20_000 {
            let y = comb.process(if n == 0 { 1.0 } else { 0.0 });
            if n < 1000 {
                early = early.max(y.abs());
            } else if n > 15_000 {
                late = late.max(y.abs());
            }
        }
        assert!(early > 0.5);
        assert!(late < 1e-3);
    }

    #[test]
    fn test_modulated_delay_static_is_pure_delay() {
        let mut md = ModulatedDelay::new(128);
        md.set_parameters(20.0, 0.0);
        let mut hit = None;
        for n in 0..64 {
            let y = md.process(if n == 0 { 1.0 } else { 0.0 }, 0.0);
            if y != 0.0 {
                hit = Some(n);
                break;
            }
        }
        assert_eq!(hit, Some(20));
    }

    #[test]
    fn test_modulated_delay_extreme_modulation_stays_in_bounds() {
        let mut md = ModulatedDelay::new(64);
        md.set_parameters(30.0, 1000.0);
        for n in 0..1000 {
            let m = if n % 2 == 0 { 1.0 } else { -1.0 };
            assert!(md.process(0.5, m).is_finite());
        }
    }
}
