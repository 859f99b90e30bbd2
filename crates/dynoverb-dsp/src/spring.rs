//! Spring tank model: 3 dispersive delay lines per channel.
//!
//! Each spring is a feedback delay whose output passes through two cascaded
//! first-order allpass "chirp" stages. The allpass group delay falls with
//! frequency, so highs come back before lows, the way they travel faster
//! along a real spring. Tension sets both the chirp coefficient and the line
//! lengths (tighter = shorter = higher pitched boing).
//!
//! Signal flow per sample:
//!   high-pass -> pre-delay -> 3 diffusers -> springs -> spring low-pass
//!     -> blend with diffused (springMix) -> low-pass -> width -> dry/wet
//!
//! "Drip" is a seeded random kick to the loop gain that decays over a few
//! hundred samples, giving the irregular clatter of a struck tank.

use crate::delay::{Allpass, DelayLine};
use crate::fdn;
use crate::filters::{Biquad, OnePoleLpf};
use crate::noise::{DEFAULT_SEED, Lcg};
use crate::params::{ReverbParams, UNIT, clamp_to};
use crate::reverb::{self, Reverb};

const SPRINGS: usize = 3;
/// Spring lengths at 44.1 kHz, size 0.5, tension 0.5 (primes, so the springs beat).
const SPRING_BASE: [f32; SPRINGS] = [1103.0, 1327.0, 1559.0];
const SPRING_STEREO: f32 = 1.07;
const SPRING_MIN: usize = 100;
const SPRING_MAX_MS: f32 = 150.0;

const FEEDBACK_CEILING: f32 = 0.98;
/// Hard limit on the loop gain after drip modulation.
const MAX_LOOP_GAIN: f32 = 0.99;

/// Chance per sample of a new drip, at drip = 1.
const DRIP_RATE: f32 = 0.005;
const DRIP_DECAY: f32 = 0.995;
/// Peak loop-gain deviation at drip = 1.
const DRIP_DEPTH: f32 = 0.3;

const DIFFUSERS: usize = 3;
const DIFFUSER_MAX: usize = 2048;
const DIFFUSER_BASE: [f32; DIFFUSERS] = [97.0, 211.0, 367.0];
const DIFFUSER_STEREO: f32 = 1.1;

/// First-order allpass with negative coefficient: more delay at low frequencies.
#[derive(Clone, Copy, Debug, Default)]
struct ChirpStage {
    x1: f32,
    y1: f32,
}

impl ChirpStage {
    /// y[n] = -a·x[n] + x[n-1] + a·y[n-1]
    #[inline]
    fn process(&mut self, x: f32, a: f32) -> f32 {
        let y = -a * x + self.x1 + a * self.y1;
        self.x1 = x;
        self.y1 = y;
        y
    }

    fn reset(&mut self) {
        *self = Self::default();
    }
}

#[derive(Clone, Debug, Default)]
struct Spring {
    line: DelayLine,
    length: usize,
    chirp: [ChirpStage; 2],
    damping_state: f32,
}

impl Spring {
    /// One sample through the spring; returns its damped output.
    #[inline]
    fn process(&mut self, input: f32, loop_gain: f32, tension: f32, chirp: f32, damping: f32) -> f32 {
        let delayed = self.line.read(self.length);
        let first = self.chirp[0].process(delayed, chirp);
        let dispersed = self.chirp[1].process(first, chirp);
        let blended = delayed * (1.0 - tension * 0.5) + dispersed * tension * 0.5;
        self.damping_state = blended * (1.0 - damping) + self.damping_state * damping;
        self.line.push(input + self.damping_state * loop_gain);
        self.damping_state
    }

    fn reset(&mut self) {
        self.line.reset();
        for stage in &mut self.chirp {
            stage.reset();
        }
        self.damping_state = 0.0;
    }
}

pub struct SpringReverb {
    params: ReverbParams,
    sample_rate: f32,

    tension: f32,
    drip: f32,
    spring_mix: f32,

    high_pass: [Biquad; 2],
    low_pass: [Biquad; 2],
    spring_tone: [OnePoleLpf; 2],

    pre_delay: [DelayLine; 2],
    pre_delay_samples: usize,
    diffusers: [[Allpass; DIFFUSERS]; 2],

    springs: [[Spring; SPRINGS]; 2],
    feedback: f32,
    chirp_coeff: f32,

    rng: Lcg,
    drip_noise: f32,
}

impl Default for SpringReverb {
    fn default() -> Self {
        Self::new()
    }
}

impl SpringReverb {
    pub fn new() -> Self {
        Self::with_seed(DEFAULT_SEED)
    }

    /// Build with a fixed drip seed; `reset` restarts the same sequence.
    pub fn with_seed(seed: u32) -> Self {
        Self {
            params: ReverbParams::default(),
            sample_rate: 44100.0,
            tension: 0.5,
            drip: 0.3,
            spring_mix: 0.7,
            high_pass: Default::default(),
            low_pass: Default::default(),
            spring_tone: Default::default(),
            pre_delay: Default::default(),
            pre_delay_samples: 0,
            diffusers: std::array::from_fn(|_| std::array::from_fn(|_| Allpass::new(DIFFUSER_MAX))),
            springs: Default::default(),
            feedback: 0.0,
            chirp_coeff: 0.5,
            rng: Lcg::new(seed),
            drip_noise: 0.0,
        }
    }

    pub fn set_seed(&mut self, seed: u32) {
        self.rng.set_seed(seed);
    }

    pub fn set_tension(&mut self, tension: f32) {
        self.tension = clamp_to(tension, &UNIT);
    }

    pub fn set_drip(&mut self, drip: f32) {
        self.drip = clamp_to(drip, &UNIT);
    }

    pub fn set_spring_mix(&mut self, mix: f32) {
        self.spring_mix = clamp_to(mix, &UNIT);
    }

    pub fn tension(&self) -> f32 {
        self.tension
    }

    pub fn drip(&self) -> f32 {
        self.drip
    }

    pub fn spring_mix(&self) -> f32 {
        self.spring_mix
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

        let tension_factor = 0.7 + self.tension * 0.6;
        let size_factor = 0.5 + size;
        let scale = size_factor / tension_factor * sr / 44100.0;
        let max_len = self.springs[0][0].line.max_delay().max(SPRING_MIN);
        let mut total = 0usize;
        for ch in 0..2 {
            let stereo = if ch == 0 { 1.0 } else { SPRING_STEREO };
            for s in 0..SPRINGS {
                let len = (SPRING_BASE[s] * stereo * scale) as usize;
                self.springs[ch][s].length = len.clamp(SPRING_MIN, max_len);
                total += self.springs[ch][s].length;
            }
        }
        let average = total as f32 / (2 * SPRINGS) as f32;
        self.feedback = fdn::feedback_gain(
            average,
            p.decay_seconds(),
            sr,
            p.sustains(),
            FEEDBACK_CEILING,
        );
        self.chirp_coeff = 0.3 + self.tension * 0.4;

        let diffuser_feedback = 0.3 + 0.35 * p.diffusion();
        for i in 0..DIFFUSERS {
            let delay = (DIFFUSER_BASE[i] * size * sr / 44100.0) as usize;
            self.diffusers[0][i].set_parameters(delay, diffuser_feedback);
            self.diffusers[1][i]
                .set_parameters((delay as f32 * DIFFUSER_STEREO) as usize, diffuser_feedback);
        }

        let tone_hz = 2000.0 + self.tension * 3000.0;
        for ch in 0..2 {
            self.high_pass[ch].set_highpass(p.high_pass_hz(), sr);
            self.low_pass[ch].set_lowpass(p.low_pass_hz(), sr);
            self.spring_tone[ch].set_cutoff(tone_hz, sr);
        }
    }

    /// Advance the drip noise one sample and return the loop-gain multiplier.
    #[inline]
    fn next_drip(&mut self) -> f32 {
        if self.drip <= 0.0 {
            return 1.0;
        }
        if self.rng.next_unit() < self.drip * DRIP_RATE {
            self.drip_noise = self.rng.next_bipolar();
        }
        self.drip_noise *= DRIP_DECAY;
        1.0 + self.drip_noise * self.drip * DRIP_DEPTH
    }

    #[inline]
    fn process_frame(&mut self, in_l: f32, in_r: f32) -> (f32, f32) {
        let loop_gain = (self.feedback * self.next_drip()).clamp(0.0, MAX_LOOP_GAIN);
        let damping = self.params.damping();
        let input = [
            self.high_pass[0].process(in_l),
            self.high_pass[1].process(in_r),
        ];

        let mut wet = [0.0f32; 2];
        for ch in 0..2 {
            self.pre_delay[ch].push(input[ch]);
            let mut diffused = self.pre_delay[ch].read(self.pre_delay_samples + 1);
            for ap in &mut self.diffusers[ch] {
                diffused = ap.process(diffused);
            }

            let spring_in = diffused / SPRINGS as f32;
            let mut tank = 0.0f32;
            for (s, spring) in self.springs[ch].iter_mut().enumerate() {
                let out = spring.process(spring_in, loop_gain, self.tension, self.chirp_coeff, damping);
                tank += out * (1.0 - s as f32 * 0.2);
            }
            let tank = self.spring_tone[ch].process(tank / SPRINGS as f32);

            let blended = diffused * (1.0 - self.spring_mix) + tank * self.spring_mix;
            wet[ch] = self.low_pass[ch].process(blended);
        }
        reverb::apply_width(wet[0], wet[1], self.params.width())
    }
}

impl Reverb for SpringReverb {
    fn prepare(&mut self, sample_rate: f32, _max_block_size: usize) {
        self.sample_rate = sample_rate;
        let spring_capacity = reverb::capacity_for_ms(SPRING_MAX_MS, sample_rate, 2);
        for ch in 0..2 {
            self.pre_delay[ch].allocate(reverb::capacity_for_ms(500.0, sample_rate, 2));
            for spring in &mut self.springs[ch] {
                spring.line.allocate(spring_capacity);
            }
        }
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
            self.spring_tone[ch].reset();
            self.pre_delay[ch].reset();
            for ap in &mut self.diffusers[ch] {
                ap.reset();
            }
            for spring in &mut self.springs[ch] {
                spring.reset();
            }
        }
        self.rng.reseed();
        self.drip_noise = 0.0;
    }

    fn params(&self) -> &ReverbParams {
        &self.params
    }

    fn params_mut(&mut self) -> &mut ReverbParams {
        &mut self.params
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reverb::test_support::*;

    fn spring() -> SpringReverb {
        let mut r = SpringReverb::with_seed(1234);
        r.params_mut().set_mix(1.0);
        r.prepare(SR, BLOCK);
        r
    }

    #[test]
    fn test_chirp_stage_is_allpass() {
        let mut stage = ChirpStage::default();
        let mut energy = 0.0f64;
        for n in 0..10_000 {
            let y = stage.process(if n == 0 { 1.0 } else { 0.0 }, 0.6);
            energy += (y as f64) * (y as f64);
        }
        assert!((energy - 1.0).abs() < 1e-4, "chirp energy {energy}");
    }

    /// Phase delay in samples of the two-stage chirp for a sine at `freq`.
    fn chirp_phase_delay(freq: f32) -> f32 {
        let sr = 48000.0;
        let mut stages = [ChirpStage::default(); 2];
        let a = 0.7;
        let w = std::f32::consts::TAU * freq / sr;
        let mut prev_y = 0.0f32;
        let mut crossing = None;
        for n in 0..20_000 {
            let x = (w * n as f32).sin();
            let first = stages[0].process(x, a);
            let y = stages[1].process(first, a);
            if n > 10_000 && prev_y < 0.0 && y >= 0.0 {
                let t = n as f32 - y / (y - prev_y);
                crossing = Some(t);
                break;
            }
            prev_y = y;
        }
        let t = crossing.expect("no crossing");
        let period = sr / freq;
        // Input crosses upward at multiples of the period.
        t.rem_euclid(period)
    }

    #[test]
    fn test_chirp_delays_lows_more_than_highs() {
        let low = chirp_phase_delay(200.0);
        let high = chirp_phase_delay(8000.0);
        assert!(low > high, "low {low:.2} samples, high {high:.2} samples");
        // DC-limit delay of two stages is 2(1+a)/(1-a) ≈ 11.3 samples.
        assert!((low - 11.3).abs() < 1.0, "low-frequency delay {low:.2}");
    }

    #[test]
    fn test_drip_is_reproducible_from_seed() {
        let run = || {
            let mut r = spring();
            r.set_drip(1.0);
            impulse_response(&mut r, 0.5)
        };
        assert_eq!(run(), run());
    }

    #[test]
    fn test_drip_changes_the_tail() {
        let mut calm = spring();
        calm.set_drip(0.0);
        let mut dripping = spring();
        dripping.set_drip(1.0);
        let a = impulse_response(&mut calm, 1.0);
        let b = impulse_response(&mut dripping, 1.0);
        assert_ne!(a, b);
    }

    #[test]
    fn test_tension_shortens_springs() {
        let mut r = spring();
        r.set_tension(0.0);
        r.update_parameters();
        let slack = r.springs[0][0].length;
        r.set_tension(1.0);
        r.update_parameters();
        let tight = r.springs[0][0].length;
        assert!(tight < slack, "tight {tight} slack {slack}");
        assert!(r.springs[1][0].length > r.springs[0][0].length);
    }

    #[test]
    fn test_feedback_ceiling() {
        let mut r = spring();
        r.params_mut().set_decay_seconds(30.0);
        r.update_parameters();
        assert_eq!(r.feedback_gain(), FEEDBACK_CEILING);
        r.params_mut().set_decay_seconds(1.0);
        r.update_parameters();
        assert!(r.feedback_gain() < FEEDBACK_CEILING);
    }

    #[test]
    fn test_stable_with_full_drip_and_freeze() {
        for tension in [0.0, 0.5, 1.0] {
            let mut r = spring();
            r.set_tension(tension);
            r.set_drip(1.0);
            r.set_spring_mix(1.0);
            r.params_mut().set_freeze(true);
            r.params_mut().set_damping(0.0);
            r.params_mut().set_width(2.0);
            let (l, rr) = impulse_response(&mut r, 10.0);
            let p = peak(&l, &rr);
            assert!(p.is_finite() && p < 4.0, "tension {tension}: peak {p}");
        }
    }

    #[test]
    fn test_silent_after_reset() {
        let mut r = spring();
        r.set_drip(1.0);
        assert_silent_after_reset(&mut r);
    }

    #[test]
    fn test_bypass_is_identity() {
        let mut r = spring();
        assert_bypass_is_identity(&mut r);
    }
}
