//! Gated reverb: dense 12-tap early field + 6-line Householder FDN, cut off by
//! an input-triggered gate.
//!
//! Signal flow per sample:
//!   input -> envelope followers (gate trigger)
//!   input -> high-pass -> pre-delay -> 4 diffusers -> early taps -> FDN
//!     -> × gate level -> mid boost -> low-pass -> width -> dry/wet
//!
//! The gate only scales the wet signal; the network keeps running underneath
//! it so a retrigger opens onto a live tail.

use crate::delay::{Allpass, DelayLine};
use crate::fdn::{self, DelayNetwork, HOUSEHOLDER_6};
use crate::filters::{Biquad, BiquadCoeffs, EnvelopeFollower};
use crate::params::{ReverbParams, UNIT, clamp_to};
use crate::reverb::{self, Reverb};
use std::ops::RangeInclusive;

pub const THRESHOLD_DB: RangeInclusive<f32> = -60.0..=0.0;
pub const GATE_TIME_MS: RangeInclusive<f32> = 10.0..=500.0;

const EARLY_TAPS: usize = 12;
const EARLY_MAX_MS: f32 = 150.0;
const EARLY_STEREO: f32 = 1.08;

const FDN_SIZE: usize = 6;
const FDN_PRIMES: [f32; FDN_SIZE] = [701.0, 887.0, 1013.0, 1153.0, 1301.0, 1451.0];
const FDN_MAX_MS: f32 = 100.0;
/// Dense tail; the gate ends it long before a higher gain would matter.
const FDN_CEILING: f32 = 0.95;
const FDN_INJECTION: f32 = 0.3;
const LATE_GAIN: f32 = 0.4;

const DIFFUSERS: usize = 4;
const DIFFUSER_MAX: usize = 4096;
const DIFFUSER_BASE: [f32; DIFFUSERS] = [107.0, 251.0, 379.0, 503.0];
const DIFFUSER_STEREO: f32 = 1.1;

const MID_BOOST_HZ: f32 = 2500.0;
const MID_BOOST_Q: f32 = 1.0;
const MID_BOOST_DB: f32 = 3.0;

const TRIGGER_ATTACK_MS: f32 = 1.0;
const TRIGGER_RELEASE_MS: f32 = 50.0;

/// Gate level below which the release is considered finished.
const GATE_FLOOR: f32 = 0.001;

#[derive(Clone, Copy, Debug, PartialEq)]
enum GateState {
    Closed,
    /// Held fully open; `remaining` counts the samples left at level 1.
    Open { remaining: usize },
    /// Linear ramp from 1 toward 0, shaped on output.
    Release { ramp: f32 },
}

/// Closed → open → release state machine driven by an input envelope.
#[derive(Clone, Debug)]
pub struct Gate {
    state: GateState,
    level: f32,
    threshold: f32,
    hold_samples: usize,
    release_step: f32,
    shape: f32,
}

impl Default for Gate {
    fn default() -> Self {
        Self {
            state: GateState::Closed,
            level: 0.0,
            threshold: db_to_linear(-30.0),
            hold_samples: 4410,
            release_step: 1.0 / 4410.0,
            shape: 0.5,
        }
    }
}

fn db_to_linear(db: f32) -> f32 {
    10.0f32.powf(db / 20.0)
}

impl Gate {
    pub fn configure(
        &mut self,
        threshold_db: f32,
        hold_ms: f32,
        release_ms: f32,
        shape: f32,
        sample_rate: f32,
    ) {
        self.threshold = db_to_linear(threshold_db);
        self.hold_samples = reverb::ms_to_samples(hold_ms, sample_rate).max(1);
        let release_samples = reverb::ms_to_samples(release_ms, sample_rate).max(1);
        self.release_step = 1.0 / release_samples as f32;
        self.shape = shape;
    }

    /// Advance one sample with the current trigger envelope; returns the gate level.
    #[inline]
    pub fn process(&mut self, envelope: f32) -> f32 {
        let above = envelope > self.threshold;
        self.state = match self.state {
            GateState::Closed | GateState::Release { .. } if above => GateState::Open {
                remaining: self.hold_samples,
            },
            GateState::Closed => GateState::Closed,
            GateState::Open { remaining } if remaining > 1 => GateState::Open {
                remaining: remaining - 1,
            },
            // Hold ran out while the input is still loud: keep holding.
            GateState::Open { .. } if above => GateState::Open {
                remaining: self.hold_samples,
            },
            GateState::Open { .. } => GateState::Release {
                ramp: 1.0 - self.release_step,
            },
            GateState::Release { ramp } => GateState::Release {
                ramp: ramp - self.release_step,
            },
        };

        self.level = match self.state {
            GateState::Closed => 0.0,
            GateState::Open { .. } => 1.0,
            GateState::Release { ramp } if ramp <= GATE_FLOOR => {
                self.state = GateState::Closed;
                0.0
            }
            GateState::Release { ramp } => {
                let curved = ramp.powf(1.0 + self.shape * 3.0);
                ramp * (1.0 - self.shape) + curved * self.shape
            }
        };
        self.level
    }

    pub fn level(&self) -> f32 {
        self.level
    }

    pub fn is_open(&self) -> bool {
        self.state != GateState::Closed
    }

    pub fn reset(&mut self) {
        self.state = GateState::Closed;
        self.level = 0.0;
    }
}

pub struct GatedReverb {
    params: ReverbParams,
    sample_rate: f32,

    threshold_db: f32,
    hold_ms: f32,
    release_ms: f32,
    shape: f32,

    trigger: [EnvelopeFollower; 2],
    gate: Gate,

    high_pass: [Biquad; 2],
    low_pass: [Biquad; 2],
    mid_boost: [Biquad; 2],

    pre_delay: [DelayLine; 2],
    pre_delay_samples: usize,
    diffusers: [[Allpass; DIFFUSERS]; 2],

    early: [DelayLine; 2],
    early_taps: [[usize; EARLY_TAPS]; 2],

    fdn: DelayNetwork<FDN_SIZE>,
    feedback: f32,
}

impl Default for GatedReverb {
    fn default() -> Self {
        Self::new()
    }
}

impl GatedReverb {
    pub fn new() -> Self {
        Self {
            params: ReverbParams::default(),
            sample_rate: 44100.0,
            threshold_db: -30.0,
            hold_ms: 100.0,
            release_ms: 100.0,
            shape: 0.5,
            trigger: Default::default(),
            gate: Gate::default(),
            high_pass: Default::default(),
            low_pass: Default::default(),
            mid_boost: Default::default(),
            pre_delay: Default::default(),
            pre_delay_samples: 0,
            diffusers: std::array::from_fn(|_| std::array::from_fn(|_| Allpass::new(DIFFUSER_MAX))),
            early: Default::default(),
            early_taps: [[1; EARLY_TAPS]; 2],
            fdn: DelayNetwork::default(),
            feedback: 0.0,
        }
    }

    /// Trigger threshold in dB, clamped to [-60, 0].
    pub fn set_threshold_db(&mut self, db: f32) {
        self.threshold_db = clamp_to(db, &THRESHOLD_DB);
    }

    /// Hold time in ms, clamped to [10, 500].
    pub fn set_hold_ms(&mut self, ms: f32) {
        self.hold_ms = clamp_to(ms, &GATE_TIME_MS);
    }

    /// Release time in ms, clamped to [10, 500].
    pub fn set_release_ms(&mut self, ms: f32) {
        self.release_ms = clamp_to(ms, &GATE_TIME_MS);
    }

    /// 0 = linear release, 1 = strongly curved.
    pub fn set_shape(&mut self, shape: f32) {
        self.shape = clamp_to(shape, &UNIT);
    }

    pub fn threshold_db(&self) -> f32 {
        self.threshold_db
    }

    pub fn hold_ms(&self) -> f32 {
        self.hold_ms
    }

    pub fn release_ms(&self) -> f32 {
        self.release_ms
    }

    pub fn shape(&self) -> f32 {
        self.shape
    }

    /// Gate level after the last processed sample, in [0, 1].
    pub fn gate_level(&self) -> f32 {
        self.gate.level()
    }

    fn update_parameters(&mut self) {
        let p = self.params;
        let sr = self.sample_rate;
        let size = p.size();

        self.gate
            .configure(self.threshold_db, self.hold_ms, self.release_ms, self.shape, sr);

        let pre_max = self.pre_delay[0].max_delay().saturating_sub(1);
        self.pre_delay_samples = reverb::ms_to_samples(p.pre_delay_ms(), sr).min(pre_max);

        let early_max = self.early[0].max_delay().saturating_sub(1).max(1);
        for i in 0..EARLY_TAPS {
            let delay_ms = 5.0 + i as f32 * 8.0 * size;
            self.early_taps[0][i] = reverb::ms_to_samples(delay_ms, sr).clamp(1, early_max);
            self.early_taps[1][i] =
                reverb::ms_to_samples(delay_ms * EARLY_STEREO, sr).clamp(1, early_max);
        }

        let scale = (0.3 + 0.7 * size) * sr / 44100.0;
        let lengths: [usize; FDN_SIZE] =
            std::array::from_fn(|i| (FDN_PRIMES[i] * scale) as usize);
        self.fdn.set_lengths(&lengths);
        self.feedback = fdn::feedback_gain(
            self.fdn.average_length(),
            p.decay_seconds(),
            sr,
            p.sustains(),
            FDN_CEILING,
        );

        let diffuser_feedback = 0.5 + 0.3 * p.diffusion();
        for i in 0..DIFFUSERS {
            let delay = (DIFFUSER_BASE[i] * size * sr / 44100.0) as usize;
            self.diffusers[0][i].set_parameters(delay, diffuser_feedback);
            self.diffusers[1][i]
                .set_parameters((delay as f32 * DIFFUSER_STEREO) as usize, diffuser_feedback);
        }

        let boost = BiquadCoeffs::peaking(MID_BOOST_HZ, MID_BOOST_Q, MID_BOOST_DB, sr);
        for ch in 0..2 {
            self.high_pass[ch].set_highpass(p.high_pass_hz(), sr);
            self.low_pass[ch].set_lowpass(p.low_pass_hz(), sr);
            self.mid_boost[ch].set_coefficients(boost);
        }
    }

    /// Early field plus FDN tail for one diffused frame.
    fn reverb_network(&mut self, input: [f32; 2]) -> [f32; 2] {
        // Flat gain, alternating polarity; R is the mirror of L.
        let tap_gain = 0.8 / (EARLY_TAPS as f32).sqrt();
        let mut early = [0.0f32; 2];
        for ch in 0..2 {
            let line = &mut self.early[ch];
            line.push(input[ch]);
            let mut acc = 0.0;
            for i in 0..EARLY_TAPS {
                let negative = if ch == 0 { i % 2 == 1 } else { i % 2 == 0 };
                let g = if negative { -tap_gain } else { tap_gain };
                acc += line.read(self.early_taps[ch][i] + 1) * g;
            }
            early[ch] = acc;
        }

        let taps = self.fdn.read();
        let mixed = fdn::mix(&HOUSEHOLDER_6, &taps);
        let damped = self.fdn.damp(&mixed, self.params.damping() * 0.5);
        let writes: [f32; FDN_SIZE] = std::array::from_fn(|i| {
            let e = if i < FDN_SIZE / 2 { early[0] } else { early[1] };
            e * FDN_INJECTION + damped[i] * self.feedback
        });
        self.fdn.write(&writes);

        let late_l = (mixed[0] + mixed[2] + mixed[4]) * LATE_GAIN;
        let late_r = (mixed[1] + mixed[3] + mixed[5]) * LATE_GAIN;

        let early_level = self.params.early_level();
        let late_level = 1.0 - early_level * 0.5;
        [
            early[0] * early_level + late_l * late_level,
            early[1] * early_level + late_r * late_level,
        ]
    }

    #[inline]
    fn process_frame(&mut self, in_l: f32, in_r: f32) -> (f32, f32) {
        let envelope = self.trigger[0].process(in_l).max(self.trigger[1].process(in_r));
        let gate = self.gate.process(envelope);

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

        let wet = self.reverb_network(diffused);
        let mut out = [0.0f32; 2];
        for ch in 0..2 {
            let boosted = self.mid_boost[ch].process(wet[ch] * gate);
            out[ch] = self.low_pass[ch].process(boosted);
        }
        reverb::apply_width(out[0], out[1], self.params.width())
    }
}

impl Reverb for GatedReverb {
    fn prepare(&mut self, sample_rate: f32, _max_block_size: usize) {
        self.sample_rate = sample_rate;
        for ch in 0..2 {
            self.pre_delay[ch].allocate(reverb::capacity_for_ms(500.0, sample_rate, 2));
            self.early[ch].allocate(reverb::capacity_for_ms(EARLY_MAX_MS, sample_rate, 2));
            self.trigger[ch].set_times(TRIGGER_ATTACK_MS, TRIGGER_RELEASE_MS, sample_rate);
        }
        self.fdn
            .allocate(reverb::capacity_for_ms(FDN_MAX_MS, sample_rate, 2), 0);
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
            self.trigger[ch].reset();
            self.high_pass[ch].reset();
            self.low_pass[ch].reset();
            self.mid_boost[ch].reset();
            self.pre_delay[ch].reset();
            self.early[ch].reset();
            for ap in &mut self.diffusers[ch] {
                ap.reset();
            }
        }
        self.fdn.reset();
        self.gate.reset();
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

    fn gated() -> GatedReverb {
        let mut r = GatedReverb::new();
        r.params_mut().set_mix(1.0);
        r.set_threshold_db(-40.0);
        r.set_hold_ms(50.0);
        r.set_release_ms(100.0);
        r.prepare(SR, BLOCK);
        r
    }

    /// Impulse then silence, one sample per block; returns the gate level per sample.
    fn gate_trace(r: &mut GatedReverb, samples: usize) -> Vec<f32> {
        let mut levels = Vec::with_capacity(samples);
        for n in 0..samples {
            let mut l = [if n == 0 { 1.0f32 } else { 0.0 }];
            let mut rr = [0.0f32];
            let mut chans: [&mut [f32]; 2] = [&mut l, &mut rr];
            r.process(&mut chans);
            levels.push(r.gate_level());
        }
        levels
    }

    #[test]
    fn test_gate_opens_holds_and_releases() {
        let mut r = gated();
        let levels = gate_trace(&mut r, 20_000);

        assert_eq!(levels[0], 1.0, "gate must open on the impulse sample");

        let hold = (0.050 * SR) as usize;
        let held = levels.iter().take_while(|&&g| g == 1.0).count();
        assert!(
            held.abs_diff(hold) <= 1,
            "held {held} samples, expected {hold}"
        );

        let release = &levels[held..];
        for w in release.windows(2) {
            assert!(w[1] <= w[0], "release not monotonic: {} -> {}", w[0], w[1]);
        }
        let closed_at = release.iter().position(|&g| g == 0.0).map(|i| i + held);
        let expected = hold + (0.100 * SR) as usize;
        let closed_at = closed_at.expect("gate never closed");
        assert!(
            closed_at.abs_diff(expected) < (0.005 * SR) as usize,
            "closed at {closed_at}, expected about {expected}"
        );
    }

    #[test]
    fn test_gate_state_machine_direct() {
        let mut g = Gate::default();
        g.configure(-20.0, 10.0, 10.0, 0.0, 1000.0);
        // 10 samples hold, 10 samples linear release at 1 kHz.
        assert_eq!(g.process(0.0), 0.0);
        assert_eq!(g.process(1.0), 1.0);
        let mut trace = Vec::new();
        for _ in 0..30 {
            trace.push(g.process(0.0));
        }
        assert_eq!(trace.iter().take_while(|&&v| v == 1.0).count(), 9);
        assert!((trace[9] - 0.9).abs() < 1e-5);
        assert!(!g.is_open());
        assert_eq!(g.level(), 0.0);
    }

    #[test]
    fn test_gate_retriggers_during_release() {
        let mut g = Gate::default();
        g.configure(-20.0, 10.0, 100.0, 0.5, 1000.0);
        g.process(1.0);
        for _ in 0..20 {
            g.process(0.0);
        }
        assert!(g.level() < 1.0 && g.level() > 0.0);
        assert_eq!(g.process(1.0), 1.0);
    }

    #[test]
    fn test_sustained_input_keeps_gate_open() {
        let mut g = Gate::default();
        g.configure(-20.0, 10.0, 10.0, 0.0, 1000.0);
        for _ in 0..100 {
            assert_eq!(g.process(0.5), 1.0);
        }
    }

    #[test]
    fn test_gate_mutes_wet_when_closed() {
        let mut r = gated();
        r.set_hold_ms(10.0);
        r.set_release_ms(10.0);
        let (l, rr) = impulse_response(&mut r, 0.5);
        let tail = (0.1 * SR) as usize;
        // Only the output filters' own decay may remain once the gate is shut.
        let leak = peak(&l[tail..], &rr[tail..]);
        assert!(leak < 1e-6, "wet tail leaked past the gate: {leak}");
        assert!(peak(&l[..tail], &rr[..tail]) > 0.0);
    }

    #[test]
    fn test_stable_at_infinite_decay() {
        for freeze in [false, true] {
            let mut r = gated();
            r.set_threshold_db(-60.0);
            r.set_hold_ms(500.0);
            r.params_mut().set_decay_seconds(30.0);
            r.params_mut().set_freeze(freeze);
            r.params_mut().set_size(1.0);
            r.params_mut().set_damping(0.0);
            r.params_mut().set_early_level(1.0);
            r.params_mut().set_width(2.0);
            let (l, rr) = impulse_response(&mut r, 10.0);
            let p = peak(&l, &rr);
            assert!(p.is_finite() && p < 4.0, "freeze={freeze}: peak {p}");
        }
    }

    #[test]
    fn test_silent_after_reset() {
        let mut r = gated();
        assert_silent_after_reset(&mut r);
        assert_eq!(r.gate_level(), 0.0);
    }

    #[test]
    fn test_bypass_is_identity() {
        let mut r = gated();
        assert_bypass_is_identity(&mut r);
    }

    #[test]
    fn test_setters_clamp() {
        let mut r = GatedReverb::new();
        r.set_threshold_db(-90.0);
        r.set_hold_ms(1.0);
        r.set_release_ms(9000.0);
        r.set_shape(2.0);
        assert_eq!(r.threshold_db(), -60.0);
        assert_eq!(r.hold_ms(), 10.0);
        assert_eq!(r.release_ms(), 500.0);
        assert_eq!(r.shape(), 1.0);
    }
}
