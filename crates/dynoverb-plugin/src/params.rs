//! nih-plug parameter declarations. Ids match the saved-state names of
//! earlier Dynoverb releases so sessions keep loading.
//!
//! Smoothing is left off everywhere: the engine reads one snapshot per block.

use dynoverb_dsp::algorithmic::AlgorithmicMode;
use dynoverb_dsp::engine::ReverbType;
use dynoverb_dsp::params::ReverbParams;
use dynoverb_dsp::shimmer::ShimmerPitch;
use nih_plug::prelude::*;

/// Pre-delay ceiling in milliseconds, also applied to tempo-synced values.
pub const MAX_PRE_DELAY_MS: f32 = 500.0;
/// Tempo assumed when the host transport reports none.
pub const DEFAULT_BPM: f64 = 120.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Enum)]
pub enum ReverbTypeParam {
    #[name = "Algorithmic"]
    Algorithmic,
    #[name = "Shimmer"]
    Shimmer,
    #[name = "Spring"]
    Spring,
    #[name = "Gated"]
    Gated,
}

impl From<ReverbTypeParam> for ReverbType {
    fn from(value: ReverbTypeParam) -> Self {
        match value {
            ReverbTypeParam::Algorithmic => ReverbType::Algorithmic,
            ReverbTypeParam::Shimmer => ReverbType::Shimmer,
            ReverbTypeParam::Spring => ReverbType::Spring,
            ReverbTypeParam::Gated => ReverbType::Gated,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Enum)]
pub enum AlgoModeParam {
    #[name = "Room"]
    Room,
    #[name = "Hall"]
    Hall,
    #[name = "Plate"]
    Plate,
    #[name = "Chamber"]
    Chamber,
}

impl From<AlgoModeParam> for AlgorithmicMode {
    fn from(value: AlgoModeParam) -> Self {
        match value {
            AlgoModeParam::Room => AlgorithmicMode::Room,
            AlgoModeParam::Hall => AlgorithmicMode::Hall,
            AlgoModeParam::Plate => AlgorithmicMode::Plate,
            AlgoModeParam::Chamber => AlgorithmicMode::Chamber,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Enum)]
pub enum ShimmerPitchParam {
    #[name = "Octave Up"]
    OctaveUp,
    #[name = "Fifth Up"]
    FifthUp,
    #[name = "Octave Down"]
    OctaveDown,
    #[name = "Fifth Down"]
    FifthDown,
    #[name = "Mixed"]
    Mixed,
}

impl From<ShimmerPitchParam> for ShimmerPitch {
    fn from(value: ShimmerPitchParam) -> Self {
        match value {
            ShimmerPitchParam::OctaveUp => ShimmerPitch::OctaveUp,
            ShimmerPitchParam::FifthUp => ShimmerPitch::FifthUp,
            ShimmerPitchParam::OctaveDown => ShimmerPitch::OctaveDown,
            ShimmerPitchParam::FifthDown => ShimmerPitch::FifthDown,
            ShimmerPitchParam::Mixed => ShimmerPitch::Mixed,
        }
    }
}

/// Musical pre-delay divisions (T = triplet).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Enum)]
pub enum SyncDivision {
    #[name = "1/32"]
    ThirtySecond,
    #[name = "1/16T"]
    SixteenthTriplet,
    #[name = "1/16"]
    Sixteenth,
    #[name = "1/8T"]
    EighthTriplet,
    #[name = "1/8"]
    Eighth,
    #[name = "1/4T"]
    QuarterTriplet,
    #[name = "1/4"]
    Quarter,
    #[name = "1/2"]
    Half,
    #[name = "1/1"]
    Whole,
}

impl SyncDivision {
    /// Length in quarter-note beats.
    pub fn beats(self) -> f32 {
        match self {
            SyncDivision::ThirtySecond => 0.125,
            SyncDivision::SixteenthTriplet => 0.167,
            SyncDivision::Sixteenth => 0.25,
            SyncDivision::EighthTriplet => 0.333,
            SyncDivision::Eighth => 0.5,
            SyncDivision::QuarterTriplet => 0.667,
            SyncDivision::Quarter => 1.0,
            SyncDivision::Half => 2.0,
            SyncDivision::Whole => 4.0,
        }
    }

    /// Division length in milliseconds at `bpm`, capped at the pre-delay ceiling.
    /// A missing or non-positive tempo falls back to 120 BPM.
    pub fn to_ms(self, bpm: Option<f64>) -> f32 {
        let bpm = bpm.filter(|b| b.is_finite() && *b > 0.0).unwrap_or(DEFAULT_BPM);
        let ms = (60_000.0 / bpm) as f32 * self.beats();
        ms.min(MAX_PRE_DELAY_MS)
    }
}

fn percent(name: &str, default: f32) -> FloatParam {
    FloatParam::new(name, default, FloatRange::Linear { min: 0.0, max: 1.0 })
        .with_unit(" %")
        .with_value_to_string(formatters::v2s_f32_percentage(1))
        .with_string_to_value(formatters::s2v_f32_percentage())
}

fn skewed(name: &str, default: f32, min: f32, max: f32, factor: f32, unit: &'static str) -> FloatParam {
    FloatParam::new(
        name,
        default,
        FloatRange::Skewed {
            min,
            max,
            factor: FloatRange::skew_factor(factor),
        },
    )
    .with_unit(unit)
}

#[derive(Params)]
pub struct DynoverbParams {
    #[id = "reverbType"]
    pub reverb_type: EnumParam<ReverbTypeParam>,

    #[id = "algoMode"]
    pub algo_mode: EnumParam<AlgoModeParam>,

    // --- Shimmer ---
    #[id = "shimmerPitch"]
    pub shimmer_pitch: EnumParam<ShimmerPitchParam>,

    /// Share of the pitch-shifted signal in the shimmer loop.
    #[id = "shimmerAmount"]
    pub shimmer_amount: FloatParam,

    #[id = "shimmerInfinite"]
    pub shimmer_infinite: BoolParam,

    // --- Spring ---
    #[id = "springTension"]
    pub spring_tension: FloatParam,

    #[id = "springDrip"]
    pub spring_drip: FloatParam,

    /// Spring tank vs. diffused signal.
    #[id = "springMix"]
    pub spring_mix: FloatParam,

    // --- Gate ---
    #[id = "gateThreshold"]
    pub gate_threshold: FloatParam,

    #[id = "gateHold"]
    pub gate_hold: FloatParam,

    #[id = "gateRelease"]
    pub gate_release: FloatParam,

    /// 0 = linear release, 1 = exponential.
    #[id = "gateShape"]
    pub gate_shape: FloatParam,

    // --- Global ---
    #[id = "preDelay"]
    pub pre_delay: FloatParam,

    #[id = "preDelayTempoSync"]
    pub pre_delay_sync: BoolParam,

    #[id = "preDelaySyncDiv"]
    pub pre_delay_division: EnumParam<SyncDivision>,

    #[id = "decay"]
    pub decay: FloatParam,

    #[id = "damping"]
    pub damping: FloatParam,

    #[id = "size"]
    pub size: FloatParam,

    #[id = "diffusion"]
    pub diffusion: FloatParam,

    #[id = "modRate"]
    pub mod_rate: FloatParam,

    #[id = "modDepth"]
    pub mod_depth: FloatParam,

    #[id = "earlyLevel"]
    pub early_level: FloatParam,

    /// Stereo width: 0 % mono, 100 % unchanged, 200 % doubled side.
    #[id = "width"]
    pub width: FloatParam,

    #[id = "highPass"]
    pub high_pass: FloatParam,

    #[id = "lowPass"]
    pub low_pass: FloatParam,

    /// Wet attenuation under loud dry input.
    #[id = "ducking"]
    pub ducking: FloatParam,

    #[id = "mix"]
    pub mix: FloatParam,

    #[id = "freeze"]
    pub freeze: BoolParam,

    #[id = "bypass"]
    pub bypass: BoolParam,
}

impl Default for DynoverbParams {
    fn default() -> Self {
        Self {
            reverb_type: EnumParam::new("Reverb Type", ReverbTypeParam::Algorithmic),
            algo_mode: EnumParam::new("Algorithm Mode", AlgoModeParam::Hall),

            shimmer_pitch: EnumParam::new("Shimmer Pitch", ShimmerPitchParam::OctaveUp),
            shimmer_amount: percent("Shimmer Amount", 0.5),
            shimmer_infinite: BoolParam::new("Shimmer Infinite", false),

            spring_tension: percent("Spring Tension", 0.5),
            spring_drip: percent("Spring Drip", 0.3),
            spring_mix: percent("Spring Mix", 0.7),

            gate_threshold: FloatParam::new(
                "Gate Threshold",
                -30.0,
                FloatRange::Linear {
                    min: -60.0,
                    max: 0.0,
                },
            )
            .with_unit(" dB")
            .with_step_size(0.1),
            gate_hold: skewed("Gate Hold", 100.0, 10.0, 500.0, -1.0, " ms").with_step_size(1.0),
            gate_release: skewed("Gate Release", 100.0, 10.0, 500.0, -1.0, " ms")
                .with_step_size(1.0),
            gate_shape: percent("Gate Shape", 0.5),

            pre_delay: skewed("Pre-Delay", 20.0, 0.0, MAX_PRE_DELAY_MS, -1.0, " ms")
                .with_step_size(0.1),
            pre_delay_sync: BoolParam::new("Pre-Delay Sync", false),
            pre_delay_division: EnumParam::new("Sync Division", SyncDivision::Eighth),
            decay: skewed("Decay", 2.0, 0.1, 30.0, -1.3, " s").with_step_size(0.01),
            damping: percent("Damping", 0.5),
            size: percent("Size", 0.5),
            diffusion: percent("Diffusion", 0.7),
            mod_rate: skewed("Mod Rate", 0.5, 0.01, 5.0, -1.0, " Hz").with_step_size(0.01),
            mod_depth: percent("Mod Depth", 0.3),
            early_level: percent("Early Reflections", 0.5),
            width: FloatParam::new("Width", 1.0, FloatRange::Linear { min: 0.0, max: 2.0 })
                .with_unit(" %")
                .with_value_to_string(formatters::v2s_f32_percentage(0))
                .with_string_to_value(formatters::s2v_f32_percentage()),
            high_pass: skewed("High Pass", 20.0, 20.0, 2000.0, -1.3, " Hz").with_step_size(1.0),
            low_pass: skewed("Low Pass", 12000.0, 1000.0, 20000.0, -1.3, " Hz")
                .with_step_size(1.0),
            ducking: percent("Ducking", 0.0),
            mix: percent("Mix", 0.3),
            freeze: BoolParam::new("Freeze", false),
            bypass: BoolParam::new("Bypass", false).make_bypass(),
        }
    }
}

impl DynoverbParams {
    /// Pre-delay for this block: the free-running knob, or the synced division.
    pub fn pre_delay_ms(&self, bpm: Option<f64>) -> f32 {
        if self.pre_delay_sync.value() {
            self.pre_delay_division.value().to_ms(bpm)
        } else {
            self.pre_delay.value()
        }
    }

    /// Shared engine parameters as one block-constant snapshot.
    pub fn snapshot(&self, bpm: Option<f64>) -> ReverbParams {
        let mut p = ReverbParams::default();
        p.set_pre_delay_ms(self.pre_delay_ms(bpm));
        p.set_decay_seconds(self.decay.value());
        p.set_damping(self.damping.value());
        p.set_size(self.size.value());
        p.set_diffusion(self.diffusion.value());
        p.set_mod_rate_hz(self.mod_rate.value());
        p.set_mod_depth(self.mod_depth.value());
        p.set_early_level(self.early_level.value());
        p.set_width(self.width.value());
        p.set_high_pass_hz(self.high_pass.value());
        p.set_low_pass_hz(self.low_pass.value());
        p.set_mix(self.mix.value());
        p.set_freeze(self.freeze.value());
        p.set_bypass(self.bypass.value());
        p
    }
}
