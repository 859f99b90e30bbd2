//! Multi-mode algorithmic reverb: early reflections + 8-line Hadamard FDN.
//!
//! Signal flow per sample:
//!   high-pass -> pre-delay -> 4 allpass diffusers
//!     -> { 8-tap early reflections  ||  8-line modulated FDN }
//!     -> sum -> low-pass -> dry/wet
//!
//! The four modes only change geometry (tap spacing, FDN base length and
//! spread, diffuser density); the topology is the same for all of them.

use crate::delay::{Allpass, DelayLine};
use crate::fdn::{self, DelayNetwork, HADAMARD_8, MAX_FEEDBACK};
use crate::filters::Biquad;
use crate::lfo::Lfo;
use crate::params::ReverbParams;
use crate::reverb::{self, Reverb};

const EARLY_TAPS: usize = 8;
const FDN_SIZE: usize = 8;
const DIFFUSERS: usize = 4;

/// Diffuser buffer length; covers the longest scaled delay up to 192 kHz.
const DIFFUSER_MAX: usize = 4096;
const DIFFUSER_BASE: [f32; DIFFUSERS] = [142.0, 379.0, 573.0, 809.0];
const DIFFUSER_STEREO: f32 = 1.08;

/// FDN base lengths at 44.1 kHz (primes, mutually incommensurate).
const FDN_PRIMES: [f32; FDN_SIZE] = [
    1009.0, 1277.0, 1499.0, 1777.0, 1999.0, 2281.0, 2557.0, 2851.0,
];
/// Longest FDN line in seconds (Hall at size 1 needs ~0.54 s).
const FDN_MAX_SECONDS: f32 = 0.6;
/// Peak modulation excursion at modDepth = 1, in milliseconds.
const MOD_MAX_MS: f32 = 1.0;
/// Input gain into each FDN line (half of each channel spread over 4 lines).
const FDN_INJECTION: f32 = 0.25;

const EARLY_MAX_MS: f32 = 100.0;
const EARLY_STEREO: f32 = 1.1;
const EARLY_TAP_DECAY: f32 = 0.7;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum AlgorithmicMode {
    Room,
    #[default]
    Hall,
    Plate,
    Chamber,
}

impl AlgorithmicMode {
    pub const ALL: [AlgorithmicMode; 4] = [
        AlgorithmicMode::Room,
        AlgorithmicMode::Hall,
        AlgorithmicMode::Plate,
        AlgorithmicMode::Chamber,
    ];

    fn geometry(self) -> ModeGeometry {
        match self {
            AlgorithmicMode::Room => ModeGeometry {
                early_spacing_ms: 5.0,
                fdn_base_ms: 20.0,
                fdn_spread: 1.2,
                density: 0.8,
            },
            AlgorithmicMode::Hall => ModeGeometry {
                early_spacing_ms: 15.0,
                fdn_base_ms: 60.0,
                fdn_spread: 1.5,
                density: 1.0,
            },
            AlgorithmicMode::Plate => ModeGeometry {
                early_spacing_ms: 8.0,
                fdn_base_ms: 35.0,
                fdn_spread: 1.1,
                density: 1.2,
            },
            AlgorithmicMode::Chamber => ModeGeometry {
                early_spacing_ms: 12.0,
                fdn_base_ms: 45.0,
                fdn_spread: 1.3,
                density: 0.9,
            },
        }
    }
}

#[derive(Clone, Copy, Debug)]
struct ModeGeometry {
    early_spacing_ms: f32,
    /// Scales the prime lengths; 30 ms is unity.
    fdn_base_ms: f32,
    /// Line i is stretched by spread^(i/2).
    fdn_spread: f32,
    /// Multiplies the diffuser feedback.
    density: f32,
}

pub struct AlgorithmicReverb {
    params: ReverbParams,
    mode: AlgorithmicMode,
    sample_rate: f32,

    high_pass: [Biquad; 2],
    low_pass: [Biquad; 2],

    pre_delay: [DelayLine; 2],
    pre_delay_samples: usize,

    diffusers: [[Allpass; DIFFUSERS]; 2],

    early: [DelayLine; 2],
    early_taps: [[usize; EARLY_TAPS]; 2],
    early_gains: [[f32; EARLY_TAPS]; 2],

    fdn: DelayNetwork<FDN_SIZE>,
    feedback: f32,
    /// Modulation excursion in samples for this block.
    mod_samples: f32,
    lfo: Lfo,
}

impl Default for AlgorithmicReverb {
    fn default() -> Self {
        Self::new()
    }
}

impl AlgorithmicReverb {
    pub fn new() -> Self {
        Self {
            params: ReverbParams::default(),
            mode: AlgorithmicMode::default(),
            sample_rate: 44100.0,
            high_pass: Default::default(),
            low_pass: Default::default(),
            pre_delay: Default::default(),
            pre_delay_samples: 0,
            diffusers: std::array::from_fn(|_| std::array::from_fn(|_| Allpass::new(DIFFUSER_MAX))),
            early: Default::default(),
            early_taps: [[1; EARLY_TAPS]; 2],
            early_gains: [[0.0; EARLY_TAPS]; 2],
            fdn: DelayNetwork::default(),
            feedback: 0.0,
            mod_samples: 0.0,
            lfo: Lfo::default(),
        }
    }

    pub fn set_mode(&mut self, mode: AlgorithmicMode) {
        self.mode = mode;
    }

    pub fn mode(&self) -> AlgorithmicMode {
        self.mode
    }

    /// FDN feedback gain derived for the current block.
    pub fn feedback_gain(&self) -> f32 {
        self.feedback
    }

    /// Recompute every block-rate quantity from the parameter snapshot.
    fn update_parameters(&mut self) {
        let p = self.params;
        let sr = self.sample_rate;
        let geo = self.mode.geometry();
        let size = p.size();

        let pre_max = self.pre_delay[0].max_delay().saturating_sub(1);
        self.pre_delay_samples = reverb::ms_to_samples(p.pre_delay_ms(), sr).min(pre_max);

        let early_max = self.early[0].max_delay().saturating_sub(1).max(1);
        for i in 0..EARLY_TAPS {
            let delay_ms = geo.early_spacing_ms * (i + 1) as f32 * (1.0 + size * 0.5);
            self.early_taps[0][i] = reverb::ms_to_samples(delay_ms, sr).clamp(1, early_max);
            self.early_taps[1][i] =
                reverb::ms_to_samples(delay_ms * EARLY_STEREO, sr).clamp(1, early_max);

            let tap_decay = EARLY_TAP_DECAY.powi(i as i32);
            self.early_gains[0][i] = tap_decay * (1.0 - (i % 2) as f32 * 0.3);
            self.early_gains[1][i] = tap_decay * (1.0 - ((i + 1) % 2) as f32 * 0.3);
        }

        let scale = geo.fdn_base_ms / 30.0 * (0.3 + 0.7 * size) * sr / 44100.0;
        let lengths: [usize; FDN_SIZE] = std::array::from_fn(|i| {
            (FDN_PRIMES[i] * scale * geo.fdn_spread.powf(i as f32 * 0.5)) as usize
        });
        self.fdn.set_lengths(&lengths);
        self.feedback = fdn::feedback_gain(
            self.fdn.average_length(),
            p.decay_seconds(),
            sr,
            p.sustains(),
            MAX_FEEDBACK,
        );

        let diffuser_feedback = (0.3 + 0.4 * p.diffusion()) * geo.density;
        for i in 0..DIFFUSERS {
            let delay = (DIFFUSER_BASE[i] * size * sr / 44100.0) as usize;
            self.diffusers[0][i].set_parameters(delay, diffuser_feedback);
            self.diffusers[1][i]
                .set_parameters((delay as f32 * DIFFUSER_STEREO) as usize, diffuser_feedback);
        }

        for ch in 0..2 {
            self.high_pass[ch].set_highpass(p.high_pass_hz(), sr);
            self.low_pass[ch].set_lowpass(p.low_pass_hz(), sr);
        }

        self.lfo.set_rate(p.mod_rate_hz(), sr);
        self.mod_samples = p.mod_depth() * MOD_MAX_MS * 0.001 * sr;
    }

    fn early_reflections(&mut self, input: [f32; 2]) -> [f32; 2] {
        let level = self.params.early_level();
        let mut out = [0.0f32; 2];
        for ch in 0..2 {
            let line = &mut self.early[ch];
            line.push(input[ch]);
            let mut acc = 0.0;
            for i in 0..EARLY_TAPS {
                acc += line.read(self.early_taps[ch][i] + 1) * self.early_gains[ch][i];
            }
            out[ch] = acc * level;
        }
        out
    }

    fn late_reverb(&mut self, input: [f32; 2]) -> [f32; 2] {
        let (lfo1, lfo2) = self.lfo.next_quadrature();
        let offsets: [f32; FDN_SIZE] = std::array::from_fn(|i| {
            let lfo = if i < FDN_SIZE / 2 { lfo1 } else { lfo2 };
            lfo * self.mod_samples
        });

        let taps = self.fdn.read_modulated(&offsets);
        let mixed = fdn::mix(&HADAMARD_8, &taps);
        let damped = self.fdn.damp(&mixed, self.params.damping());

        let writes: [f32; FDN_SIZE] = std::array::from_fn(|i| {
            let x = if i < FDN_SIZE / 2 { input[0] } else { input[1] };
            x * FDN_INJECTION + damped[i] * self.feedback
        });
        self.fdn.write(&writes);

        // Even lines feed L, odd lines R; width bleeds each into its neighbour.
        let w = self.params.width();
        let (mut l, mut r) = (0.0f32, 0.0f32);
        for i in 0..FDN_SIZE {
            let next = mixed[(i + 1) % FDN_SIZE];
            if i % 2 == 0 {
                l += mixed[i];
                r += mixed[i] * (1.0 - w) + next * w;
            } else {
                r += mixed[i];
                l += mixed[i] * (1.0 - w) + next * w;
            }
        }
        [l * 0.25, r * 0.25]
    }

    #[inline]
    fn process_frame(&mut self, in_l: f32, in_r: f32) -> (f32, f32) {
        let filtered = [
            self.high_pass[0].process(in_l),
            self.high_pass[1].process(in_r),
        ];

        let mut diffused = [0.0f32; 2];
        for ch in 0..2 {
            self.pre_delay[ch].push(filtered[ch]);
            let mut s = self.pre_delay[ch].read(self.pre_delay_samples + 1);
            for ap in &mut self.diffusers[ch] {
                s = ap.process(s);
            }
            diffused[ch] = s;
        }

        let early = self.early_reflections(diffused);
        let late = self.late_reverb(diffused);

        (
            self.low_pass[0].process(early[0] + late[0]),
            self.low_pass[1].process(early[1] + late[1]),
        )
    }
}

impl Reverb for AlgorithmicReverb {
    fn prepare(&mut self, sample_rate: f32, _max_block_size: usize) {
        self.sample_rate = sample_rate;
        for ch in 0..2 {
            self.pre_delay[ch].allocate(reverb::capacity_for_ms(500.0, sample_rate, 2));
            self.early[ch].allocate(reverb::capacity_for_ms(EARLY_MAX_MS, sample_rate, 2));
        }
        let headroom = (MOD_MAX_MS * 0.001 * sample_rate).ceil() as usize + 2;
        self.fdn.allocate(
            reverb::capacity_for_ms(FDN_MAX_SECONDS * 1000.0, sample_rate, headroom + 2),
            headroom,
        );
        self.update_parameters();
        self.reset();
    }

    fn process(&mut self, channels: &mut [&mut [f32]]) {
        if self.params.bypass() {
            return;
        }
        self.update_parameters();
        let mix = self.params.mix();
        reverb::process_frames(channels, mix, |l, r| self.process_frame(l, r));
    }

    fn reset(&mut self) {
        for ch in 0..2 {
            self.high_pass[ch].reset();
            self.low_pass[ch].reset();
            self.pre_delay[ch].reset();
            self.early[ch].reset();
            for ap in &mut self.diffusers[ch] {
                ap.reset();
            }
        }
        self.fdn.reset();
        self.lfo.reset();
    }

    fn params(&self) -> &ReverbParams {
        &self.params
    }

    fn params_mut(&mut self) -> &mut ReverbParams {
        &mut self.params
    }
}
