//! IR Renderer: Dynoverb impulse response WAV renderer.
//!
//! Feeds a unit impulse into one (or every) reverb engine, writes the wet
//! stereo response as a 24-bit WAV and prints its peak level and a T60
//! estimate from the Schroeder energy decay curve.

use dynoverb_dsp::algorithmic::AlgorithmicMode;
use dynoverb_dsp::engine::{DynoverbEngine, ReverbType};
use dynoverb_dsp::noise::DEFAULT_SEED;
use dynoverb_dsp::reverb::Reverb;
use dynoverb_dsp::shimmer::ShimmerPitch;

const BLOCK: usize = 512;

#[derive(Debug)]
struct Options {
    types: Vec<ReverbType>,
    mode: AlgorithmicMode,
    pitch: ShimmerPitch,
    decay: f32,
    size: f32,
    sample_rate: u32,
    duration: f32,
    seed: u32,
    output_file: Option<String>,
    output_dir: String,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            types: Vec::new(),
            mode: AlgorithmicMode::Hall,
            pitch: ShimmerPitch::OctaveUp,
            decay: 2.0,
            size: 0.5,
            sample_rate: 48000,
            duration: 3.0,
            seed: DEFAULT_SEED,
            output_file: None,
            output_dir: String::from("."),
        }
    }
}

fn main() {
    let args: Vec<String> = std::env::args().collect();
    let opts = match parse_args(&args[1..]) {
        Ok(Some(opts)) => opts,
        Ok(None) => {
            print_usage();
            return;
        }
        Err(msg) => {
            eprintln!("{msg}");
            print_usage();
            std::process::exit(1);
        }
    };

    for &ty in &opts.types {
        let filename = match &opts.output_file {
            Some(f) if opts.types.len() == 1 => f.clone(),
            _ => format!("{}/ir_{}.wav", opts.output_dir, ty.name()),
        };

        eprintln!(
            "Rendering {} decay={}s size={} sr={} dur={}s → {filename}",
            ty.name(),
            opts.decay,
            opts.size,
            opts.sample_rate,
            opts.duration
        );

        let (left, right) = render_impulse(ty, &opts);

        let peak = left
            .iter()
            .chain(right.iter())
            .fold(0.0f32, |m, s| m.max(s.abs()));
        println!(
            "{}: peak {peak:.6} ({:.1} dBFS)",
            ty.name(),
            20.0 * peak.max(1e-12).log10()
        );
        match estimate_t60(&left, &right, opts.sample_rate as f32) {
            Some(t60) => println!("{}: T60 ≈ {t60:.2} s", ty.name()),
            None => println!("{}: T60 not measurable (tail under 25 dB)", ty.name()),
        }

        if let Err(e) = write_wav(&filename, &left, &right, opts.sample_rate) {
            eprintln!("Failed to write {filename}: {e}");
            std::process::exit(1);
        }
        eprintln!("  Written: {filename}");
    }
}

/// `Ok(None)` means help was requested.
fn parse_args(args: &[String]) -> Result<Option<Options>, String> {
    let mut opts = Options::default();
    let mut all = false;

    let mut i = 0;
    while i < args.len() {
        let flag = args[i].as_str();
        let mut value = || {
            i += 1;
            args.get(i)
                .map(String::as_str)
                .ok_or_else(|| format!("Missing value for {flag}"))
        };
        match flag {
            "--type" | "-t" => opts.types.push(parse_type(value()?)?),
            "--mode" | "-m" => opts.mode = parse_mode(value()?)?,
            "--pitch" | "-p" => opts.pitch = parse_pitch(value()?)?,
            "--decay" => opts.decay = parse_number(flag, value()?)?,
            "--size" => opts.size = parse_number(flag, value()?)?,
            "--sample-rate" | "-r" => opts.sample_rate = parse_number(flag, value()?)?,
            "--duration" | "-d" => opts.duration = parse_number(flag, value()?)?,
            "--seed" => opts.seed = parse_number(flag, value()?)?,
            "--output" | "-o" => opts.output_file = Some(value()?.to_string()),
            "--output-dir" => opts.output_dir = value()?.to_string(),
            "--all" => all = true,
            "--help" | "-h" => return Ok(None),
            other => return Err(format!("Unknown argument: {other}")),
        }
        i += 1;
    }

    if all {
        opts.types = ReverbType::ALL.to_vec();
    } else if opts.types.is_empty() {
        opts.types.push(ReverbType::Algorithmic);
    }
    if opts.sample_rate < 8000 {
        return Err(format!("Sample rate {} too low (min 8000)", opts.sample_rate));
    }
    if !(opts.duration > 0.0 && opts.duration <= 120.0) {
        return Err(format!("Duration {} out of range (0-120 s)", opts.duration));
    }
    Ok(Some(opts))
}

fn parse_number<T: std::str::FromStr>(flag: &str, s: &str) -> Result<T, String> {
    s.trim()
        .parse()
        .map_err(|_| format!("Invalid value for {flag}: {s}"))
}

fn parse_type(s: &str) -> Result<ReverbType, String> {
    ReverbType::ALL
        .into_iter()
        .find(|t| t.name() == s)
        .ok_or_else(|| format!("Unknown reverb type: {s}"))
}

fn parse_mode(s: &str) -> Result<AlgorithmicMode, String> {
    match s {
        "room" => Ok(AlgorithmicMode::Room),
        "hall" => Ok(AlgorithmicMode::Hall),
        "plate" => Ok(AlgorithmicMode::Plate),
        "chamber" => Ok(AlgorithmicMode::Chamber),
        other => Err(format!("Unknown algorithmic mode: {other}")),
    }
}

fn parse_pitch(s: &str) -> Result<ShimmerPitch, String> {
    match s {
        "octave-up" => Ok(ShimmerPitch::OctaveUp),
        "fifth-up" => Ok(ShimmerPitch::FifthUp),
        "octave-down" => Ok(ShimmerPitch::OctaveDown),
        "fifth-down" => Ok(ShimmerPitch::FifthDown),
        "mixed" => Ok(ShimmerPitch::Mixed),
        other => Err(format!("Unknown shimmer pitch: {other}")),
    }
}

/// Fully wet stereo response to a unit impulse on both channels.
fn render_impulse(ty: ReverbType, opts: &Options) -> (Vec<f32>, Vec<f32>) {
    let sr = opts.sample_rate as f32;
    let mut engine = DynoverbEngine::new();
    {
        let p = engine.params_mut();
        p.set_decay_seconds(opts.decay);
        p.set_size(opts.size);
        p.set_pre_delay_ms(0.0);
        p.set_mix(1.0);
    }
    engine.set_algorithmic_mode(opts.mode);
    engine.set_shimmer_pitch(opts.pitch);
    engine.set_spring_seed(opts.seed);
    engine.set_reverb_type(ty);
    engine.prepare(sr, BLOCK);

    let total = (opts.duration * sr) as usize;
    let mut left = vec![0.0f32; total];
    let mut right = vec![0.0f32; total];
    if total > 0 {
        left[0] = 1.0;
        right[0] = 1.0;
    }
    for (l, r) in left.chunks_mut(BLOCK).zip(right.chunks_mut(BLOCK)) {
        let mut chans: [&mut [f32]; 2] = [l, r];
        engine.process(&mut chans);
    }
    (left, right)
}

/// T60 from the Schroeder backward-integrated energy curve, extrapolated
/// from the -5 dB to -25 dB span. `None` if the curve never reaches -25 dB.
fn estimate_t60(left: &[f32], right: &[f32], sample_rate: f32) -> Option<f32> {
    let energy: Vec<f64> = left
        .iter()
        .zip(right.iter())
        .map(|(&l, &r)| (l as f64).powi(2) + (r as f64).powi(2))
        .collect();

    let mut edc = vec![0.0f64; energy.len()];
    let mut acc = 0.0f64;
    for (e, out) in energy.iter().zip(edc.iter_mut()).rev() {
        acc += e;
        *out = acc;
    }
    let total = *edc.first()?;
    if total <= 0.0 {
        return None;
    }

    let db = |v: f64| 10.0 * (v / total).max(1e-30).log10();
    let t5 = edc.iter().position(|&v| db(v) <= -5.0)?;
    let t25 = edc.iter().position(|&v| db(v) <= -25.0)?;
    if t25 <= t5 {
        return None;
    }
    Some((t25 - t5) as f32 / sample_rate * 3.0)
}

fn write_wav(path: &str, left: &[f32], right: &[f32], sample_rate: u32) -> Result<(), hound::Error> {
    let spec = hound::WavSpec {
        channels: 2,
        sample_rate,
        bits_per_sample: 24,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(path, spec)?;
    let scale = (1 << 23) as f32 - 1.0;
    for (&l, &r) in left.iter().zip(right.iter()) {
        writer.write_sample((l.clamp(-1.0, 1.0) * scale) as i32)?;
        writer.write_sample((r.clamp(-1.0, 1.0) * scale) as i32)?;
    }
    writer.finalize()
}

fn print_usage() {
    eprintln!(
        r#"IR Renderer: Dynoverb impulse response WAV renderer

USAGE:
    ir-renderer [OPTIONS]

OPTIONS:
    -t, --type <TYPE>          algorithmic | shimmer | spring | gated (default: algorithmic)
    -m, --mode <MODE>          room | hall | plate | chamber (default: hall)
    -p, --pitch <PITCH>        octave-up | fifth-up | octave-down | fifth-down | mixed
        --decay <SECS>         Decay time, 0.1-30 (default: 2.0)
        --size <0-1>           Room size (default: 0.5)
    -r, --sample-rate <HZ>     Sample rate (default: 48000)
    -d, --duration <SECS>      Render length (default: 3.0)
        --seed <N>             Spring drip seed
    -o, --output <PATH>        Output WAV file (single type only)
        --output-dir <DIR>     Output directory, files named ir_<type>.wav (default: .)
        --all                  Render every engine
    -h, --help                 Print this help

EXAMPLES:
    ir-renderer -t algorithmic -m plate --decay 4 -o plate.wav
    ir-renderer --all --duration 5 --output-dir irs
    ir-renderer -t spring --seed 42 -o spring.wav"#
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(s: &str) -> Vec<String> {
        s.split_whitespace().map(String::from).collect()
    }

    #[test]
    fn test_parse_defaults() {
        let opts = parse_args(&[]).unwrap().unwrap();
        assert_eq!(opts.types, vec![ReverbType::Algorithmic]);
        assert_eq!(opts.sample_rate, 48000);
        assert_eq!(opts.seed, DEFAULT_SEED);
    }

    #[test]
    fn test_parse_flags() {
        let opts = parse_args(&args("-t spring --seed 42 -m room -p mixed --decay 4 -o x.wav"))
            .unwrap()
            .unwrap();
        assert_eq!(opts.types, vec![ReverbType::Spring]);
        assert_eq!(opts.seed, 42);
        assert_eq!(opts.mode, AlgorithmicMode::Room);
        assert_eq!(opts.pitch, ShimmerPitch::Mixed);
        assert_eq!(opts.decay, 4.0);
        assert_eq!(opts.output_file.as_deref(), Some("x.wav"));

        let all = parse_args(&args("--all")).unwrap().unwrap();
        assert_eq!(all.types, ReverbType::ALL.to_vec());
    }

    #[test]
    fn test_parse_errors() {
        assert!(parse_args(&args("--type bogus")).is_err());
        assert!(parse_args(&args("--decay")).is_err());
        assert!(parse_args(&args("--size big")).is_err());
        assert!(parse_args(&args("--frobnicate")).is_err());
        assert!(parse_args(&args("-h")).unwrap().is_none());
    }

    #[test]
    fn test_t60_of_exponential_decay() {
        let sr = 8000.0;
        let t60 = 1.5f32;
        let n = (4.0 * sr) as usize;
        // Amplitude falls 60 dB over t60; alternating sign keeps it broadband.
        let l: Vec<f32> = (0..n)
            .map(|i| {
                let a = 10f32.powf(-3.0 * i as f32 / (t60 * sr));
                if i % 2 == 0 { a } else { -a }
            })
            .collect();
        let r = l.clone();
        let est = estimate_t60(&l, &r, sr).unwrap();
        assert!((est - t60).abs() < 0.05 * t60, "estimated {est}, expected {t60}");
    }

    #[test]
    fn test_t60_of_silence_is_none() {
        let z = vec![0.0f32; 100];
        assert_eq!(estimate_t60(&z, &z, 48000.0), None);
    }
}
