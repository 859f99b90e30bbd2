//! Feedback delay network building blocks.
//!
//! Fixed orthogonal mixing matrices, the decay-time to feedback-gain law, and
//! a bank of N delay lines with per-line one-pole damping. The engines own one
//! `DelayNetwork` each and decide themselves how it is injected and tapped.

use crate::delay::DelayLine;

/// Build an N×N normalized Sylvester Hadamard matrix (N a power of two).
const fn hadamard<const N: usize>() -> [[f32; N]; N] {
    // 1/sqrt(N) for the sizes used here; const fn cannot call sqrt.
    let scale = match N {
        4 => 0.5,
        8 => 0.353_553_4,
        16 => 0.25,
        _ => 1.0,
    };
    let mut m = [[0.0f32; N]; N];
    let mut i = 0;
    while i < N {
        let mut j = 0;
        while j < N {
            m[i][j] = if (i & j).count_ones() % 2 == 0 {
                scale
            } else {
                -scale
            };
            j += 1;
        }
        i += 1;
    }
    m
}

/// Build the N×N Householder reflection I - (2/N)·11ᵀ.
const fn householder<const N: usize>() -> [[f32; N]; N] {
    let off = -2.0 / N as f32;
    let mut m = [[off; N]; N];
    let mut i = 0;
    while i < N {
        m[i][i] = 1.0 + off;
        i += 1;
    }
    m
}

pub const HADAMARD_8: [[f32; 8]; 8] = hadamard::<8>();
pub const HOUSEHOLDER_6: [[f32; 6]; 6] = householder::<6>();

/// y = M·x
#[inline]
pub fn mix<const N: usize>(matrix: &[[f32; N]; N], x: &[f32; N]) -> [f32; N] {
    let mut y = [0.0f32; N];
    for i in 0..N {
        let mut acc = 0.0;
        for j in 0..N {
            acc += matrix[i][j] * x[j];
        }
        y[i] = acc;
    }
    y
}

/// Feedback gain giving a 60 dB decay over `decay_seconds` for a loop of
/// `loop_samples`: `10^(-3·loop / (decay·sr))`, clamped to `[0, ceiling]`.
///
/// When `sustain` is set (freeze / infinite) the gain is pinned at `ceiling`.
/// `ceiling` itself is clamped below 1 so no caller can build a lossless loop.
pub fn feedback_gain(
    loop_samples: f32,
    decay_seconds: f32,
    sample_rate: f32,
    sustain: bool,
    ceiling: f32,
) -> f32 {
    let ceiling = ceiling.clamp(0.0, MAX_FEEDBACK);
    if sustain {
        return ceiling;
    }
    let denom = decay_seconds * sample_rate;
    if !(denom > 0.0) || !loop_samples.is_finite() {
        return 0.0;
    }
    let g = 10.0f32.powf(-3.0 * loop_samples.max(0.0) / denom);
    g.clamp(0.0, ceiling)
}

/// Absolute upper bound for any recirculating gain.
pub const MAX_FEEDBACK: f32 = 0.999;

/// N delay lines with per-line damping state.
#[derive(Clone, Debug)]
pub struct DelayNetwork<const N: usize> {
    lines: [DelayLine; N],
    lengths: [usize; N],
    damping_state: [f32; N],
    /// Samples kept free at the end of each line for read modulation.
    headroom: usize,
}

impl<const N: usize> Default for DelayNetwork<N> {
    fn default() -> Self {
        Self {
            lines: std::array::from_fn(|_| DelayLine::default()),
            lengths: [1; N],
            damping_state: [0.0; N],
            headroom: 0,
        }
    }
}

impl<const N: usize> DelayNetwork<N> {
    /// Size every line to `capacity` samples, reserving `headroom` for modulation.
    pub fn allocate(&mut self, capacity: usize, headroom: usize) {
        for line in &mut self.lines {
            line.allocate(capacity);
        }
        self.headroom = headroom;
        self.damping_state = [0.0; N];
        let lengths = self.lengths;
        self.set_lengths(&lengths);
    }

    /// Longest base length a line may take.
    pub fn max_length(&self) -> usize {
        let cap = self.lines[0].capacity();
        cap.saturating_sub(self.headroom + 2).max(1)
    }

    /// Set per-line lengths in samples, clamped to `[1, max_length]`.
    pub fn set_lengths(&mut self, lengths: &[usize; N]) {
        let max = self.max_length();
        for i in 0..N {
            self.lengths[i] = lengths[i].clamp(1, max);
        }
    }

    pub fn lengths(&self) -> &[usize; N] {
        &self.lengths
    }

    pub fn average_length(&self) -> f32 {
        self.lengths.iter().sum::<usize>() as f32 / N as f32
    }

    /// Read every line at its base length.
    #[inline]
    pub fn read(&self) -> [f32; N] {
        std::array::from_fn(|i| self.lines[i].read(self.lengths[i]))
    }

    /// Read every line at its base length plus `offsets[i]` (fractional) samples.
    #[inline]
    pub fn read_modulated(&self, offsets: &[f32; N]) -> [f32; N] {
        std::array::from_fn(|i| {
            self.lines[i].read_frac(self.lengths[i] as f32 + offsets[i])
        })
    }

    /// One-pole low-pass on each line, blending with the previous output by `amount`.
    #[inline]
    pub fn damp(&mut self, x: &[f32; N], amount: f32) -> [f32; N] {
        let a = amount.clamp(0.0, 1.0);
        for i in 0..N {
            self.damping_state[i] = x[i] * (1.0 - a) + self.damping_state[i] * a;
        }
        self.damping_state
    }

    #[inline]
    pub fn write(&mut self, samples: &[f32; N]) {
        for i in 0..N {
            self.lines[i].push(samples[i]);
        }
    }

    pub fn reset(&mut self) {
        for line in &mut self.lines {
            line.reset();
        }
        self.damping_state = [0.0; N];
    }
}
