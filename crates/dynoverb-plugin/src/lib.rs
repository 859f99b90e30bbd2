// Dynoverb: multi-engine reverb effect plugin (CLAP + VST3).

use atomic_float::AtomicF32;
use dynoverb_dsp::engine::DynoverbEngine;
use dynoverb_dsp::reverb::Reverb;
use nih_plug::prelude::*;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::sync::atomic::Ordering;

mod params;
use params::DynoverbParams;

/// Reverb tail reported to the host after input stops.
const TAIL_SECONDS: f32 = 10.0;

// ── Metering ────────────────────────────────────────────────────────────────

/// Levels published once per block for a UI thread to poll.
pub struct Meters {
    pub input_peak: AtomicF32,
    pub output_peak: AtomicF32,
    pub gate_level: AtomicF32,
}

impl Default for Meters {
    fn default() -> Self {
        Self {
            input_peak: AtomicF32::new(0.0),
            output_peak: AtomicF32::new(0.0),
            gate_level: AtomicF32::new(0.0),
        }
    }
}

impl Meters {
    fn publish(&self, engine: &DynoverbEngine) {
        self.input_peak
            .store(engine.input_peak(), Ordering::Relaxed);
        self.output_peak
            .store(engine.output_peak(), Ordering::Relaxed);
        self.gate_level
            .store(engine.gate_level(), Ordering::Relaxed);
    }

    fn clear(&self) {
        self.input_peak.store(0.0, Ordering::Relaxed);
        self.output_peak.store(0.0, Ordering::Relaxed);
        self.gate_level.store(0.0, Ordering::Relaxed);
    }
}

// ── Plugin ──────────────────────────────────────────────────────────────────

pub struct Dynoverb {
    params: Arc<DynoverbParams>,
    meters: Arc<Meters>,
    engine: DynoverbEngine,
    tail_samples: u32,
}

impl Default for Dynoverb {
    fn default() -> Self {
        Self {
            params: Arc::new(DynoverbParams::default()),
            meters: Arc::new(Meters::default()),
            engine: DynoverbEngine::new(),
            tail_samples: (TAIL_SECONDS * 44100.0) as u32,
        }
    }
}

impl Dynoverb {
    /// Shared handle to the level meters.
    pub fn meters(&self) -> Arc<Meters> {
        self.meters.clone()
    }

    /// Copy the host parameters into the engine. Called once per block;
    /// values hold for the whole block.
    fn push_parameters(&mut self, bpm: Option<f64>) {
        let p = &self.params;
        self.engine.set_params(&p.snapshot(bpm));
        self.engine.set_reverb_type(p.reverb_type.value().into());
        self.engine.set_ducking(p.ducking.value());

        self.engine.set_algorithmic_mode(p.algo_mode.value().into());

        self.engine.set_shimmer_pitch(p.shimmer_pitch.value().into());
        self.engine.set_shimmer_amount(p.shimmer_amount.value());
        self.engine.set_infinite(p.shimmer_infinite.value());

        self.engine.set_spring_tension(p.spring_tension.value());
        self.engine.set_spring_drip(p.spring_drip.value());
        self.engine.set_spring_mix(p.spring_mix.value());

        self.engine.set_gate_threshold_db(p.gate_threshold.value());
        self.engine.set_gate_hold_ms(p.gate_hold.value());
        self.engine.set_gate_release_ms(p.gate_release.value());
        self.engine.set_gate_shape(p.gate_shape.value());
    }
}

impl Plugin for Dynoverb {
    const NAME: &'static str = "Dynoverb";
    const VENDOR: &'static str = "Dynoverb";
    const URL: &'static str = "";
    const EMAIL: &'static str = "";
    const VERSION: &'static str = env!("CARGO_PKG_VERSION");

    const AUDIO_IO_LAYOUTS: &'static [AudioIOLayout] = &[
        AudioIOLayout {
            main_input_channels: NonZeroU32::new(2),
            main_output_channels: NonZeroU32::new(2),
            ..AudioIOLayout::const_default()
        },
        AudioIOLayout {
            main_input_channels: NonZeroU32::new(1),
            main_output_channels: NonZeroU32::new(1),
            ..AudioIOLayout::const_default()
        },
    ];

    // Parameters are read once per block.
    const SAMPLE_ACCURATE_AUTOMATION: bool = false;

    type SysExMessage = ();
    type BackgroundTask = ();

    fn params(&self) -> Arc<dyn Params> {
        self.params.clone()
    }

    fn initialize(
        &mut self,
        audio_io_layout: &AudioIOLayout,
        buffer_config: &BufferConfig,
        _context: &mut impl InitContext<Self>,
    ) -> bool {
        let sample_rate = buffer_config.sample_rate;
        let max_block = buffer_config.max_buffer_size as usize;
        nih_log!(
            "Dynoverb initialize: {} Hz, max block {}, {} channel(s)",
            sample_rate,
            max_block,
            audio_io_layout
                .main_output_channels
                .map_or(0, NonZeroU32::get)
        );

        self.push_parameters(None);
        self.engine.prepare(sample_rate, max_block);
        self.tail_samples = (TAIL_SECONDS * sample_rate) as u32;
        true
    }

    fn reset(&mut self) {
        nih_log!("Dynoverb reset");
        self.engine.reset();
        self.meters.clear();
    }

    fn process(
        &mut self,
        buffer: &mut Buffer,
        _aux: &mut AuxiliaryBuffers,
        context: &mut impl ProcessContext<Self>,
    ) -> ProcessStatus {
        nih_debug_assert!(buffer.channels() <= 2);

        let bpm = context.transport().tempo;
        self.push_parameters(bpm);

        self.engine.process(buffer.as_slice());
        self.meters.publish(&self.engine);

        if self.params.bypass.value() {
            ProcessStatus::Normal
        } else {
            ProcessStatus::Tail(self.tail_samples)
        }
    }
}

impl ClapPlugin for Dynoverb {
    const CLAP_ID: &'static str = "com.dynoverb.dynoverb";
    const CLAP_DESCRIPTION: Option<&'static str> =
        Some("Algorithmic, shimmer, spring and gated reverb with crossfading engine switch");
    const CLAP_MANUAL_URL: Option<&'static str> = None;
    const CLAP_SUPPORT_URL: Option<&'static str> = None;
    const CLAP_FEATURES: &'static [ClapFeature] = &[
        ClapFeature::AudioEffect,
        ClapFeature::Stereo,
        ClapFeature::Mono,
        ClapFeature::Reverb,
    ];
}

impl Vst3Plugin for Dynoverb {
    const VST3_CLASS_ID: [u8; 16] = *b"DynoverbReverbFx";
    const VST3_SUBCATEGORIES: &'static [Vst3SubCategory] =
        &[Vst3SubCategory::Fx, Vst3SubCategory::Reverb];
}

nih_export_clap!(Dynoverb);
nih_export_vst3!(Dynoverb);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_meters_publish_engine_levels() {
        let plugin = Dynoverb::default();
        let mut engine = DynoverbEngine::new();
        engine.prepare(48000.0, 64);
        let mut l = vec![0.0f32; 64];
        l[3] = 0.6;
        let mut chans: [&mut [f32]; 1] = [&mut l];
        engine.process(&mut chans);

        let meters = plugin.meters();
        plugin.meters.publish(&engine);
        assert_eq!(meters.input_peak.load(Ordering::Relaxed), 0.6);
        assert_eq!(
            meters.output_peak.load(Ordering::Relaxed),
            engine.output_peak()
        );
        plugin.meters.clear();
        assert_eq!(meters.input_peak.load(Ordering::Relaxed), 0.0);
    }

    #[test]
    fn test_push_parameters_selects_engine() {
        let mut plugin = Dynoverb::default();
        plugin.push_parameters(Some(90.0));
        assert_eq!(
            plugin.engine.reverb_type(),
            dynoverb_dsp::engine::ReverbType::Algorithmic
        );
        assert_eq!(plugin.engine.params().mix(), 0.3);
        assert_eq!(plugin.engine.ducking(), 0.0);
    }
}
