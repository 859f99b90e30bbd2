//! Engine selector: owns one instance of every reverb, crossfades between them
//! when the type changes, ducks the wet signal under the dry input and keeps
//! peak meters for the host.
//!
//! All four engines stay resident and prepared; only the active one (or the
//! two sides of a crossfade) processes audio.

use crate::algorithmic::{AlgorithmicMode, AlgorithmicReverb};
use crate::filters::EnvelopeFollower;
use crate::gated::GatedReverb;
use crate::params::{ReverbParams, UNIT, clamp_to};
use crate::reverb::Reverb;
use crate::shimmer::{ShimmerPitch, ShimmerReverb};
use crate::spring::SpringReverb;

/// Length of a type-change crossfade in samples (fade rate 0.002 per sample).
pub const CROSSFADE_SAMPLES: usize = 500;

const DUCK_ATTACK_MS: f32 = 5.0;
const DUCK_RELEASE_MS: f32 = 100.0;
/// Envelope-to-attenuation slope: an envelope of 1/3 fully mutes the wet path at amount 1.
const DUCK_SLOPE: f32 = 3.0;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ReverbType {
    #[default]
    Algorithmic,
    Shimmer,
    Spring,
    Gated,
}

impl ReverbType {
    pub const ALL: [ReverbType; 4] = [
        ReverbType::Algorithmic,
        ReverbType::Shimmer,
        ReverbType::Spring,
        ReverbType::Gated,
    ];

    pub fn name(self) -> &'static str {
        match self {
            ReverbType::Algorithmic => "algorithmic",
            ReverbType::Shimmer => "shimmer",
            ReverbType::Spring => "spring",
            ReverbType::Gated => "gated",
        }
    }
}

/// The four resident engines.
struct Engines {
    algorithmic: AlgorithmicReverb,
    shimmer: ShimmerReverb,
    spring: SpringReverb,
    gated: GatedReverb,
}

impl Engines {
    fn get_mut(&mut self, ty: ReverbType) -> &mut dyn Reverb {
        match ty {
            ReverbType::Algorithmic => &mut self.algorithmic,
            ReverbType::Shimmer => &mut self.shimmer,
            ReverbType::Spring => &mut self.spring,
            ReverbType::Gated => &mut self.gated,
        }
    }

    fn for_each(&mut self, mut f: impl FnMut(&mut dyn Reverb)) {
        f(&mut self.algorithmic);
        f(&mut self.shimmer);
        f(&mut self.spring);
        f(&mut self.gated);
    }
}

#[derive(Clone, Copy, Debug)]
struct Crossfade {
    target: ReverbType,
    elapsed: usize,
}

impl Crossfade {
    /// Blend fraction toward the target for the sample `offset` into the block.
    #[inline]
    fn fraction_at(&self, offset: usize) -> f32 {
        ((self.elapsed + offset) as f32 / CROSSFADE_SAMPLES as f32).min(1.0)
    }
}

pub struct DynoverbEngine {
    params: ReverbParams,
    engines: Engines,

    current: ReverbType,
    fade: Option<Crossfade>,
    /// Selection that arrived mid-fade; starts as soon as the running fade ends.
    pending: Option<ReverbType>,

    ducking: f32,
    duck_followers: [EnvelopeFollower; 2],

    max_block_size: usize,
    fade_scratch: [Vec<f32>; 2],
    dry_scratch: [Vec<f32>; 2],

    input_peak: f32,
    output_peak: f32,
}

impl Default for DynoverbEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl DynoverbEngine {
    pub fn new() -> Self {
        Self {
            params: ReverbParams::default(),
            engines: Engines {
                algorithmic: AlgorithmicReverb::new(),
                shimmer: ShimmerReverb::new(),
                spring: SpringReverb::new(),
                gated: GatedReverb::new(),
            },
            current: ReverbType::default(),
            fade: None,
            pending: None,
            ducking: 0.0,
            duck_followers: Default::default(),
            max_block_size: 0,
            fade_scratch: Default::default(),
            dry_scratch: Default::default(),
            input_peak: 0.0,
            output_peak: 0.0,
        }
    }

    /// Select the engine. A change starts a crossfade from the engine that is
    /// currently audible; the fade always runs to completion.
    ///
    /// Mid-fade, reselecting the engine being faded out reverses the fade from
    /// the blend point it has reached. Any other new selection does not
    /// retarget the running fade: it is queued (replacing an earlier queued
    /// one) and fades in from the old target once the running fade ends.
    pub fn set_reverb_type(&mut self, ty: ReverbType) {
        match self.fade {
            None => {
                self.pending = None;
                if ty != self.current {
                    self.start_fade(ty);
                }
            }
            Some(fade) if ty == fade.target => self.pending = None,
            Some(fade) if ty == self.current => {
                self.pending = None;
                self.current = fade.target;
                self.fade = Some(Crossfade {
                    target: ty,
                    elapsed: CROSSFADE_SAMPLES - fade.elapsed.min(CROSSFADE_SAMPLES),
                });
            }
            Some(_) => self.pending = Some(ty),
        }
    }

    /// The most recent selection (the engine that will be audible once any
    /// fades have finished).
    pub fn reverb_type(&self) -> ReverbType {
        self.pending
            .or(self.fade.map(|f| f.target))
            .unwrap_or(self.current)
    }

    /// The engine being faded out, or the only audible engine when steady.
    pub fn active_type(&self) -> ReverbType {
        self.current
    }

    /// Blend fraction of the running fade, `None` when steady.
    pub fn crossfade_progress(&self) -> Option<f32> {
        self.fade.map(|f| f.fraction_at(0))
    }

    /// Wet ducking depth in [0, 1]; 0 disables the ducking stage.
    pub fn set_ducking(&mut self, amount: f32) {
        self.ducking = clamp_to(amount, &UNIT);
    }

    pub fn ducking(&self) -> f32 {
        self.ducking
    }

    pub fn set_algorithmic_mode(&mut self, mode: AlgorithmicMode) {
        self.engines.algorithmic.set_mode(mode);
    }

    pub fn set_shimmer_pitch(&mut self, pitch: ShimmerPitch) {
        self.engines.shimmer.set_pitch(pitch);
    }

    pub fn set_shimmer_amount(&mut self, amount: f32) {
        self.engines.shimmer.set_amount(amount);
    }

    pub fn set_infinite(&mut self, infinite: bool) {
        self.engines.shimmer.set_infinite(infinite);
    }

    pub fn set_spring_tension(&mut self, tension: f32) {
        self.engines.spring.set_tension(tension);
    }

    pub fn set_spring_drip(&mut self, drip: f32) {
        self.engines.spring.set_drip(drip);
    }

    pub fn set_spring_mix(&mut self, mix: f32) {
        self.engines.spring.set_spring_mix(mix);
    }

    pub fn set_spring_seed(&mut self, seed: u32) {
        self.engines.spring.set_seed(seed);
    }

    pub fn set_gate_threshold_db(&mut self, db: f32) {
        self.engines.gated.set_threshold_db(db);
    }

    pub fn set_gate_hold_ms(&mut self, ms: f32) {
        self.engines.gated.set_hold_ms(ms);
    }

    pub fn set_gate_release_ms(&mut self, ms: f32) {
        self.engines.gated.set_release_ms(ms);
    }

    pub fn set_gate_shape(&mut self, shape: f32) {
        self.engines.gated.set_shape(shape);
    }

    /// Current gate envelope of the gated engine, in [0, 1].
    pub fn gate_level(&self) -> f32 {
        self.engines.gated.gate_level()
    }

    /// Peak absolute input level of the last block.
    pub fn input_peak(&self) -> f32 {
        self.input_peak
    }

    /// Peak absolute output level of the last block.
    pub fn output_peak(&self) -> f32 {
        self.output_peak
    }

    fn start_fade(&mut self, target: ReverbType) {
        self.engines.get_mut(target).reset();
        self.fade = Some(Crossfade { target, elapsed: 0 });
    }

    /// Process at most `max_block_size` frames of a mono or stereo block.
    fn process_chunk(&mut self, chans: &mut [&mut [f32]]) {
        let n = chans[0].len();
        let stereo = chans.len() > 1;
        let ducking = self.ducking;

        if ducking > 0.0 {
            for (ch, dry) in chans.iter().zip(self.dry_scratch.iter_mut()) {
                dry[..n].copy_from_slice(ch);
            }
        }

        self.engines.for_each(|e| e.set_params(&self.params));

        match self.fade {
            Some(mut fade) => {
                let [fade_l, fade_r] = &mut self.fade_scratch;
                fade_l[..n].copy_from_slice(&chans[0][..]);
                if stereo {
                    fade_r[..n].copy_from_slice(&chans[1][..]);
                }
                let mut target_chans: [&mut [f32]; 2] = [&mut fade_l[..n], &mut fade_r[..n]];
                let target_chans = &mut target_chans[..chans.len()];

                self.engines.get_mut(self.current).process(chans);
                self.engines.get_mut(fade.target).process(target_chans);

                for (out, target) in chans.iter_mut().zip(target_chans.iter()) {
                    for (i, (o, t)) in out.iter_mut().zip(target.iter()).enumerate() {
                        let f = fade.fraction_at(i);
                        *o = *o * (1.0 - f) + *t * f;
                    }
                }

                fade.elapsed += n;
                if fade.elapsed >= CROSSFADE_SAMPLES {
                    self.current = fade.target;
                    self.fade = None;
                    if let Some(next) = self.pending.take() {
                        if next != self.current {
                            self.start_fade(next);
                        }
                    }
                } else {
                    self.fade = Some(fade);
                }
            }
            None => self.engines.get_mut(self.current).process(chans),
        }

        if ducking > 0.0 {
            self.apply_ducking(chans, n);
        }
    }

    /// Scale the wet share of each output sample by the dry-input envelope.
    fn apply_ducking(&mut self, chans: &mut [&mut [f32]], n: usize) {
        let dry_gain = 1.0 - self.params.mix();
        let [dry_l, dry_r] = &self.dry_scratch;
        let dry_r = if chans.len() > 1 { dry_r } else { dry_l };

        for i in 0..n {
            let env_l = self.duck_followers[0].process(dry_l[i]);
            let env_r = self.duck_followers[1].process(dry_r[i]);
            let gain = (1.0 - env_l.max(env_r) * self.ducking * DUCK_SLOPE).max(0.0);

            let dry = [dry_l[i], dry_r[i]];
            for (ch, out) in chans.iter_mut().enumerate() {
                let dry_part = dry[ch] * dry_gain;
                out[i] = dry_part + (out[i] - dry_part) * gain;
            }
        }
    }
}

fn block_peak(channels: &[&mut [f32]]) -> f32 {
    channels
        .iter()
        .flat_map(|ch| ch.iter())
        .fold(0.0f32, |m, s| m.max(s.abs()))
}

impl Reverb for DynoverbEngine {
    fn prepare(&mut self, sample_rate: f32, max_block_size: usize) {
        let max_block_size = max_block_size.max(1);
        self.engines
            .for_each(|e| e.prepare(sample_rate, max_block_size));
        for f in &mut self.duck_followers {
            f.set_times(DUCK_ATTACK_MS, DUCK_RELEASE_MS, sample_rate);
        }
        self.max_block_size = max_block_size;
        for buf in self.fade_scratch.iter_mut().chain(self.dry_scratch.iter_mut()) {
            *buf = vec![0.0; max_block_size];
        }
        self.reset();
    }

    /// Mono or stereo block in place; larger blocks than prepared are split.
    fn process(&mut self, channels: &mut [&mut [f32]]) {
        self.input_peak = block_peak(channels);
        if self.params.bypass() {
            self.output_peak = self.input_peak;
            return;
        }
        if self.max_block_size == 0 {
            for ch in channels.iter_mut().take(2) {
                ch.fill(0.0);
            }
            self.output_peak = 0.0;
            return;
        }

        let (left, right): (&mut [f32], Option<&mut [f32]>) = match channels {
            [] => {
                self.output_peak = 0.0;
                return;
            }
            [l] => (&mut **l, None),
            [l, r, ..] => (&mut **l, Some(&mut **r)),
        };
        let len = match &right {
            Some(r) => left.len().min(r.len()),
            None => left.len(),
        };

        let mut right = right;
        let mut start = 0;
        while start < len {
            let end = (start + self.max_block_size).min(len);
            match right.as_deref_mut() {
                Some(r) => {
                    let mut chunk: [&mut [f32]; 2] = [&mut left[start..end], &mut r[start..end]];
                    self.process_chunk(&mut chunk);
                }
                None => {
                    let mut chunk: [&mut [f32]; 1] = [&mut left[start..end]];
                    self.process_chunk(&mut chunk);
                }
            }
            start = end;
        }

        self.output_peak = block_peak(channels);
    }

    /// Silence every engine and settle on the latest selection.
    fn reset(&mut self) {
        self.current = self.reverb_type();
        self.fade = None;
        self.pending = None;
        self.engines.for_each(|e| e.reset());
        for f in &mut self.duck_followers {
            f.reset();
        }
        self.input_peak = 0.0;
        self.output_peak = 0.0;
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
    use crate::reverb::test_support::{self, BLOCK, SR};

    fn prepared() -> DynoverbEngine {
        let mut e = DynoverbEngine::new();
        e.params_mut().set_mix(1.0);
        e.prepare(SR, BLOCK);
        e
    }

    /// Block `k` of a deterministic test signal: an impulse, then a burst of noise.
    fn test_block(k: usize) -> (Vec<f32>, Vec<f32>) {
        let mut seed = 7u32.wrapping_add(k as u32 * 7919);
        let mut l = vec![0.0f32; BLOCK];
        let mut r = vec![0.0f32; BLOCK];
        if k == 0 {
            l[0] = 1.0;
        }
        if k < 4 {
            for (a, b) in l.iter_mut().zip(r.iter_mut()) {
                seed = seed.wrapping_mul(1664525).wrapping_add(1013904223);
                let v = (seed >> 8) as f32 / 16_777_216.0 - 0.5;
                *a += v * 0.3;
                *b += -v * 0.2;
            }
        }
        (l, r)
    }

    fn run_block<R: Reverb>(engine: &mut R, k: usize) -> (Vec<f32>, Vec<f32>) {
        let (mut l, mut r) = test_block(k);
        let mut chans: [&mut [f32]; 2] = [&mut l, &mut r];
        engine.process(&mut chans);
        (l, r)
    }

    #[test]
    fn test_crossfade_completes_onto_fresh_target() {
        let mut selector = prepared();
        for k in 0..20 {
            run_block(&mut selector, k);
        }

        selector.set_reverb_type(ReverbType::Gated);
        let mut reference = GatedReverb::new();
        reference.params_mut().set_mix(1.0);
        reference.prepare(SR, BLOCK);

        // 500-sample fade fits inside the first 512-sample block.
        let _ = run_block(&mut selector, 0);
        let _ = run_block(&mut reference, 0);
        assert_eq!(selector.crossfade_progress(), None);
        assert_eq!(selector.active_type(), ReverbType::Gated);

        for k in 1..40 {
            let got = run_block(&mut selector, k);
            let want = run_block(&mut reference, k);
            assert_eq!(got, want, "block {k} still carries the old engine");
        }
    }

    #[test]
    fn test_crossfade_progress_is_monotonic() {
        let mut selector = DynoverbEngine::new();
        selector.prepare(SR, 64);
        selector.set_reverb_type(ReverbType::Spring);

        let mut last = -1.0f32;
        let mut blocks = 0;
        while let Some(p) = selector.crossfade_progress() {
            assert!(p >= last, "progress went backwards: {last} -> {p}");
            assert!((0.0..1.0).contains(&p));
            last = p;
            let mut l = vec![0.1f32; 64];
            let mut r = vec![0.1f32; 64];
            let mut chans: [&mut [f32]; 2] = [&mut l, &mut r];
            selector.process(&mut chans);
            blocks += 1;
            assert!(blocks < 100, "fade never finished");
        }
        assert_eq!(blocks, CROSSFADE_SAMPLES.div_ceil(64));
        assert_eq!(selector.active_type(), ReverbType::Spring);
    }

    #[test]
    fn test_reversal_mid_fade_keeps_blend_point() {
        let mut selector = DynoverbEngine::new();
        selector.prepare(SR, 100);
        selector.set_reverb_type(ReverbType::Shimmer);
        let mut l = vec![0.0f32; 100];
        let mut chans: [&mut [f32]; 1] = [&mut l];
        selector.process(&mut chans);
        let before = selector.crossfade_progress().unwrap_or(0.0);
        assert!((before - 0.2).abs() < 1e-6);

        selector.set_reverb_type(ReverbType::Algorithmic);
        let after = selector.crossfade_progress().unwrap_or(0.0);
        assert!((after - 0.8).abs() < 1e-6, "reversal jumped to {after}");
        assert_eq!(selector.active_type(), ReverbType::Shimmer);
        assert_eq!(selector.reverb_type(), ReverbType::Algorithmic);
    }

    #[test]
    fn test_selection_mid_fade_is_queued() {
        let mut selector = DynoverbEngine::new();
        selector.prepare(SR, 128);
        selector.set_reverb_type(ReverbType::Shimmer);
        selector.set_reverb_type(ReverbType::Gated);
        assert_eq!(selector.reverb_type(), ReverbType::Gated);

        let mut l = vec![0.0f32; 128];
        for _ in 0..4 {
            let mut chans: [&mut [f32]; 1] = [&mut l];
            selector.process(&mut chans);
        }
        // First fade done, second one started toward the queued engine.
        assert_eq!(selector.active_type(), ReverbType::Shimmer);
        assert!(selector.crossfade_progress().is_some());
        for _ in 0..4 {
            let mut chans: [&mut [f32]; 1] = [&mut l];
            selector.process(&mut chans);
        }
        assert_eq!(selector.active_type(), ReverbType::Gated);
        assert_eq!(selector.crossfade_progress(), None);
    }

    #[test]
    fn test_later_selection_replaces_queued_one() {
        let mut selector = DynoverbEngine::new();
        selector.prepare(SR, 100);
        selector.set_reverb_type(ReverbType::Shimmer);

        let mut l = vec![0.0f32; 100];
        let mut chans: [&mut [f32]; 1] = [&mut l];
        selector.process(&mut chans);
        assert_eq!(selector.crossfade_progress(), Some(0.2));

        selector.set_reverb_type(ReverbType::Gated);
        selector.set_reverb_type(ReverbType::Spring);
        assert_eq!(selector.reverb_type(), ReverbType::Spring);
        // The running fade keeps its target and its blend point.
        assert_eq!(selector.active_type(), ReverbType::Algorithmic);
        assert_eq!(selector.crossfade_progress(), Some(0.2));

        for _ in 0..4 {
            let mut chans: [&mut [f32]; 1] = [&mut l];
            selector.process(&mut chans);
        }
        assert_eq!(selector.active_type(), ReverbType::Shimmer);
        for _ in 0..5 {
            let mut chans: [&mut [f32]; 1] = [&mut l];
            selector.process(&mut chans);
        }
        assert_eq!(selector.active_type(), ReverbType::Spring);
        assert_eq!(selector.crossfade_progress(), None);
    }

    #[test]
    fn test_ducking_mutes_wet_under_loud_input() {
        let mut selector = prepared();
        selector.set_ducking(1.0);
        let mut last = (Vec::new(), Vec::new());
        for _ in 0..20 {
            let mut l = vec![0.5f32; BLOCK];
            let mut r = vec![0.5f32; BLOCK];
            let mut chans: [&mut [f32]; 2] = [&mut l, &mut r];
            selector.process(&mut chans);
            last = (l, r);
        }
        assert!(last.0.iter().chain(last.1.iter()).all(|&s| s == 0.0));
    }

    #[test]
    fn test_ducking_keeps_dry_share() {
        let mut selector = DynoverbEngine::new();
        selector.params_mut().set_mix(0.5);
        selector.set_ducking(1.0);
        selector.prepare(SR, BLOCK);
        let mut out = Vec::new();
        for _ in 0..20 {
            let mut l = vec![0.5f32; BLOCK];
            let mut chans: [&mut [f32]; 1] = [&mut l];
            selector.process(&mut chans);
            out = l;
        }
        assert!(out.iter().all(|&s| s == 0.25), "dry share altered by ducking");
    }

    #[test]
    fn test_no_ducking_leaves_wet() {
        let mut selector = prepared();
        let (l, r) = test_support::impulse_response(&mut selector, 0.5);
        assert!(test_support::peak(&l[4800..], &r[4800..]) > 1e-4);
    }

    #[test]
    fn test_meters_follow_block_peaks() {
        let mut selector = prepared();
        let mut l = vec![0.0f32; BLOCK];
        l[10] = -0.75;
        let mut chans: [&mut [f32]; 1] = [&mut l];
        selector.process(&mut chans);
        assert_eq!(selector.input_peak(), 0.75);
        assert!(selector.output_peak() < 0.75, "dry leaked at mix 1");
    }

    #[test]
    fn test_bypass_meters_input() {
        let mut selector = prepared();
        test_support::assert_bypass_is_identity(&mut selector);
        assert!(selector.input_peak() > 0.0);
        assert_eq!(selector.input_peak(), selector.output_peak());
    }

    #[test]
    fn test_empty_channel_list_clears_meters() {
        let mut selector = prepared();
        let mut l = vec![0.0f32; 64];
        l[0] = 0.8;
        let mut chans: [&mut [f32]; 1] = [&mut l];
        selector.process(&mut chans);
        assert!(selector.output_peak() > 0.0);

        let mut none: [&mut [f32]; 0] = [];
        selector.process(&mut none);
        assert_eq!(selector.input_peak(), 0.0);
        assert_eq!(selector.output_peak(), 0.0);
    }

    #[test]
    fn test_silent_after_reset_every_type() {
        for ty in ReverbType::ALL {
            let mut selector = prepared();
            selector.set_reverb_type(ty);
            test_support::assert_silent_after_reset(&mut selector);
            assert_eq!(selector.active_type(), ty);
        }
    }

    #[test]
    fn test_oversized_block_is_split() {
        let mut a = DynoverbEngine::new();
        a.prepare(SR, 64);
        let mut b = DynoverbEngine::new();
        b.prepare(SR, 256);
        let (mut la, _) = test_block(0);
        let mut lb = la.clone();
        let mut chans: [&mut [f32]; 1] = [&mut la];
        a.process(&mut chans);
        let mut chans: [&mut [f32]; 1] = [&mut lb];
        b.process(&mut chans);
        for (x, y) in la.iter().zip(lb.iter()) {
            assert!((x - y).abs() < 1e-6);
        }
    }

    #[test]
    fn test_unprepared_is_silent() {
        let mut selector = DynoverbEngine::new();
        let mut l = vec![0.3f32; 32];
        let mut chans: [&mut [f32]; 1] = [&mut l];
        selector.process(&mut chans);
        assert!(l.iter().all(|&s| s == 0.0));
    }
}
