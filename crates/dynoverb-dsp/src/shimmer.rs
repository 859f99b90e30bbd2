//! Shimmer reverb: granular pitch shifter inside an externally fed-back loop.
//!
//! Signal flow per sample:
//!   high-pass -> pre-delay -> (+ tanh(previous output · feedback))
//!     -> 4 diffusers -> grain shifter (blended by amount)
//!     -> 2 modulated delays -> 4-line delay network -> output
//!   output -> next sample's loop input; output -> width -> low-pass -> dry/wet
//!
//! The delay network has no recirculation of its own. Every pass of the tail
//! goes back through the pitch shifter, so each repeat is shifted again.

use crate::delay::{Allpass, DelayLine, ModulatedDelay};
use crate::fdn::{self, DelayNetwork};
use crate::filters::Biquad;
use crate::lfo::Lfo;
use crate::params::{ReverbParams, UNIT, clamp_to};
use crate::reverb::{self, Reverb};
use std::f32::consts::{FRAC_1_SQRT_2, FRAC_PI_2, TAU};

const GRAIN_BUFFER: usize = 8192;
const GRAINS: usize = 4;
const GRAIN_SIZE: usize = 2048;
/// Staggered Hann windows sum to 2; this brings the overlap back to unity.
const GRAIN_GAIN: f32 = 2.0 / GRAINS as f32;

const DIFFUSERS: usize = 4;
const DIFFUSER_MAX: usize = 4096;
const DIFFUSER_BASE: [f32; DIFFUSERS] = [113.0, 337.0, 509.0, 701.0];
const DIFFUSER_STEREO: f32 = 1.12;

const MOD_DELAY_MS: [f32; 2] = [25.0, 28.0];
const MOD_DEPTH_MS: f32 = 2.0;

const NETWORK_SIZE: usize = 4;
const NETWORK_PRIMES: [f32; NETWORK_SIZE] = [1087.0, 1423.0, 1777.0, 2131.0];
const NETWORK_MAX_MS: f32 = 150.0;

/// Lines 0/1 take the loop signal, lines 2/3 take the first rotation; the
/// second rotation is the output. Block-diagonal, so orthogonal.
const H: f32 = FRAC_1_SQRT_2;
const PAIRED_MIX: [[f32; NETWORK_SIZE]; NETWORK_SIZE] = [
    [H, H, 0.0, 0.0],
    [H, -H, 0.0, 0.0],
    [0.0, 0.0, H, H],
    [0.0, 0.0, H, -H],
];

const FEEDBACK_CEILING: f32 = 0.995;
const SUSTAIN_FEEDBACK: f32 = 0.998;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ShimmerPitch {
    #[default]
    OctaveUp,
    FifthUp,
    OctaveDown,
    FifthDown,
    /// Even grains an octave up, odd grains a fifth up.
    Mixed,
}

impl ShimmerPitch {
    pub const ALL: [ShimmerPitch; 5] = [
        ShimmerPitch::OctaveUp,
        ShimmerPitch::FifthUp,
        ShimmerPitch::OctaveDown,
        ShimmerPitch::FifthDown,
        ShimmerPitch::Mixed,
    ];

    /// Playback ratios for (even, odd) grains.
    pub fn ratios(self) -> (f32, f32) {
        match self {
            ShimmerPitch::OctaveUp => (2.0, 2.0),
            ShimmerPitch::FifthUp => (1.5, 1.5),
            ShimmerPitch::OctaveDown => (0.5, 0.5),
            ShimmerPitch::FifthDown => (0.667, 0.667),
            ShimmerPitch::Mixed => (2.0, 1.5),
        }
    }
}

/// One read head of the shifter. There is no per-grain amplitude: the Hann
/// windows of the staggered grains overlap-add to a constant, so each grain's
/// weight is its window value times `GRAIN_GAIN`, and a grain starting at
/// phase zero fades in from silence.
#[derive(Clone, Copy, Debug, Default)]
struct Grain {
    /// Fractional read position in the grain buffer.
    position: f32,
    /// Samples into the current window.
    age: usize,
}

/// Overlapping-grain pitch shifter for one channel.
///
/// Grains read the buffer at `ratio` samples per sample under a Hann window.
/// When a window completes the grain jumps back to half a grain behind the
/// write head, so a new window always starts where the old one faded out.
#[derive(Clone, Debug)]
pub struct GrainShifter {
    buffer: DelayLine,
    window: Vec<f32>,
    grains: [Grain; GRAINS],
}

impl Default for GrainShifter {
    fn default() -> Self {
        Self::new()
    }
}

impl GrainShifter {
    pub fn new() -> Self {
        let window = (0..GRAIN_SIZE)
            .map(|i| 0.5 * (1.0 - (TAU * i as f32 / (GRAIN_SIZE - 1) as f32).cos()))
            .collect();
        let mut shifter = Self {
            buffer: DelayLine::new(GRAIN_BUFFER),
            window,
            grains: [Grain::default(); GRAINS],
        };
        shifter.reset();
        shifter
    }

    #[inline]
    pub fn process(&mut self, x: f32, even_ratio: f32, odd_ratio: f32) -> f32 {
        self.buffer.push(x);
        let len = GRAIN_BUFFER as f32;
        let written = (self.buffer.write_index() + GRAIN_BUFFER - 1) % GRAIN_BUFFER;
        let restart = ((written + GRAIN_BUFFER - GRAIN_SIZE / 2) % GRAIN_BUFFER) as f32;

        let mut out = 0.0f32;
        for (g, grain) in self.grains.iter_mut().enumerate() {
            out += self.buffer.read_at(grain.position) * self.window[grain.age] * GRAIN_GAIN;

            let ratio = if g % 2 == 0 { even_ratio } else { odd_ratio };
            grain.position += ratio;
            if grain.position >= len {
                grain.position -= len;
            }
            grain.age += 1;
            if grain.age >= GRAIN_SIZE {
                grain.age = 0;
                grain.position = restart;
            }
        }
        out
    }

    pub fn reset(&mut self) {
        self.buffer.reset();
        let start = (GRAIN_BUFFER - GRAIN_SIZE / 2) as f32;
        for (g, grain) in self.grains.iter_mut().enumerate() {
            grain.position = start;
            grain.age = g * (GRAIN_SIZE / GRAINS);
        }
    }
}

pub struct ShimmerReverb {
    params: ReverbParams,
    sample_rate: f32,

    pitch: ShimmerPitch,
    amount: f32,
    infinite: bool,

    high_pass: [Biquad; 2],
    low_pass: [Biquad; 2],

    pre_delay: [DelayLine; 2],
    pre_delay_samples: usize,
    diffusers: [[Allpass; DIFFUSERS]; 2],
    shifters: [GrainShifter; 2],
    /// Equal-power gains for the unshifted and shifted signal.
    blend_gains: (f32, f32),

    mod_delays: [ModulatedDelay; 2],
    lfo: Lfo,
    network: DelayNetwork<NETWORK_SIZE>,

    feedback: f32,
    /// Previous sample's output, fed back into the loop input.
    recirculation: [f32; 2],
}

impl Default for ShimmerReverb {
    fn default() -> Self {
        Self::new()
    }
}

impl ShimmerReverb {
    pub fn new() -> Self {
        let mut reverb = Self {
            params: ReverbParams::default(),
            sample_rate: 44100.0,
            pitch: ShimmerPitch::default(),
            amount: 0.5,
            infinite: false,
            high_pass: Default::default(),
            low_pass: Default::default(),
            pre_delay: Default::default(),
            pre_delay_samples: 0,
            diffusers: std::array::from_fn(|_| std::array::from_fn(|_| Allpass::new(DIFFUSER_MAX))),
            shifters: Default::default(),
            blend_gains: (1.0, 0.0),
            mod_delays: std::array::from_fn(|_| ModulatedDelay::new(0)),
            lfo: Lfo::default(),
            network: DelayNetwork::default(),
            feedback: 0.0,
            recirculation: [0.0; 2],
        };
        reverb.blend_gains = blend_gains(reverb.amount);
        reverb
    }

    pub fn set_pitch(&mut self, pitch: ShimmerPitch) {
        self.pitch = pitch;
    }

    pub fn pitch(&self) -> ShimmerPitch {
        self.pitch
    }

    /// Share of pitch-shifted signal in the loop, clamped to [0, 1].
    pub fn set_amount(&mut self, amount: f32) {
        self.amount = clamp_to(amount, &UNIT);
    }

    pub fn amount(&self) -> f32 {
        self.amount
    }

    /// Pin the loop gain at its maximum regardless of decay time.
    pub fn set_infinite(&mut self, infinite: bool) {
        self.infinite = infinite;
    }

    pub fn infinite(&self) -> bool {
        self.infinite
    }

    pub fn feedback_gain(&self) -> f32 {
        self.feedback
    }

    fn update_parameters(&mut self) {
        let p = self.params;
        let sr = self.sample_rate;
        let size = p.size();

        let pre_max = self.pre_delay[0].max_delay().saturating_sub(1);
        self.pre_delay_samples = reverb::ms_to_samples(p.pre_delay_ms(), sr).min(pre_max);

        let diffuser_feedback = 0.4 + 0.35 * p.diffusion();
        for i in 0..DIFFUSERS {
            let delay = (DIFFUSER_BASE[i] * size * sr / 44100.0) as usize;
            self.diffusers[0][i].set_parameters(delay, diffuser_feedback);
            self.diffusers[1][i]
                .set_parameters((delay as f32 * DIFFUSER_STEREO) as usize, diffuser_feedback);
        }

        self.blend_gains = blend_gains(self.amount);

        let depth = MOD_DEPTH_MS * 0.001 * sr * p.mod_depth();
        for ch in 0..2 {
            let base = MOD_DELAY_MS[ch] * 0.001 * sr * size;
            self.mod_delays[ch].set_parameters(base, depth);
        }
        self.lfo.set_rate(p.mod_rate_hz(), sr);

        let scale = (0.3 + 0.7 * size) * sr / 44100.0;
        let lengths: [usize; NETWORK_SIZE] =
            std::array::from_fn(|i| (NETWORK_PRIMES[i] * scale) as usize);
        self.network.set_lengths(&lengths);

        // One trip round the loop crosses both network stages and a modulated delay.
        let loop_samples = self.network.average_length() * 2.0
            + MOD_DELAY_MS[0] * 0.001 * sr * size;
        self.feedback = if self.infinite || p.sustains() {
            SUSTAIN_FEEDBACK
        } else {
            fdn::feedback_gain(loop_samples, p.decay_seconds(), sr, false, FEEDBACK_CEILING)
        };

        for ch in 0..2 {
            self.high_pass[ch].set_highpass(p.high_pass_hz(), sr);
            self.low_pass[ch].set_lowpass(p.low_pass_hz(), sr);
        }
    }

    #[inline]
    fn process_frame(&mut self, in_l: f32, in_r: f32) -> (f32, f32) {
        let filtered = [
            self.high_pass[0].process(in_l),
            self.high_pass[1].process(in_r),
        ];
        let (even, odd) = self.pitch.ratios();
        let (dry_gain, shift_gain) = self.blend_gains;
        let (lfo1, lfo2) = self.lfo.next_quadrature();
        let lfo = [lfo1, lfo2];

        let mut delayed = [0.0f32; 2];
        for ch in 0..2 {
            self.pre_delay[ch].push(filtered[ch]);
            let mut s = self.pre_delay[ch].read(self.pre_delay_samples + 1)
                + (self.recirculation[ch] * self.feedback).tanh();
            for ap in &mut self.diffusers[ch] {
                s = ap.process(s);
            }
            let shifted = self.shifters[ch].process(s, even, odd);
            let blended = s * dry_gain + shifted * shift_gain;
            delayed[ch] = self.mod_delays[ch].process(blended, lfo[ch]);
        }

        let taps = self.network.read();
        let mixed = fdn::mix(&PAIRED_MIX, &taps);
        let damped = self.network.damp(&mixed, self.params.damping());
        self.network
            .write(&[delayed[0], delayed[1], damped[0], damped[1]]);

        let out = [damped[2], damped[3]];
        self.recirculation = out;

        let (wl, wr) = reverb::apply_width(out[0], out[1], self.params.width());
        (self.low_pass[0].process(wl), self.low_pass[1].process(wr))
    }
}

/// Equal-power crossfade gains (unshifted, shifted) for a shimmer amount.
fn blend_gains(amount: f32) -> (f32, f32) {
    let theta = amount * FRAC_PI_2;
    (theta.cos(), theta.sin())
}

impl Reverb for ShimmerReverb {
    fn prepare(&mut self, sample_rate: f32, _max_block_size: usize) {
        self.sample_rate = sample_rate;
        let mod_capacity = reverb::capacity_for_ms(
            MOD_DELAY_MS[1] + MOD_DEPTH_MS + 2.0,
            sample_rate,
            4,
        );
        for ch in 0..2 {
            self.pre_delay[ch].allocate(reverb::capacity_for_ms(500.0, sample_rate, 2));
            self.mod_delays[ch].allocate(mod_capacity);
        }
        self.network
            .allocate(reverb::capacity_for_ms(NETWORK_MAX_MS, sample_rate, 2), 0);
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
            for ap in &mut self.diffusers[ch] {
                ap.reset();
            }
            self.shifters[ch].reset();
            self.mod_delays[ch].reset();
        }
        self.network.reset();
        self.lfo.reset();
        self.recirculation = [0.0; 2];
    }

    fn params(&self) -> &ReverbParams {
        &self.params
    }

    fn params_mut(&mut self) -> &mut ReverbParams {
        &mut self.params
    }
}
