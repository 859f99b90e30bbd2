//! Engine contract shared by the four reverberators, plus the small helpers
//! every engine uses (ms→samples, mid/side width, dry/wet blend, channel
//! splitting for mono-or-stereo blocks).

use crate::params::ReverbParams;

/// Lifecycle every engine implements.
///
/// `prepare` sizes all buffers once; `process` never allocates; `reset` zeroes
/// state without touching sizes. Parameters are pushed as a snapshot before a
/// block and held fixed while it is processed.
pub trait Reverb {
    fn prepare(&mut self, sample_rate: f32, max_block_size: usize);

    /// In-place transform of a mono (1 channel) or stereo (2 channels) block.
    /// Channels past the second are left untouched.
    fn process(&mut self, channels: &mut [&mut [f32]]);

    fn reset(&mut self);

    fn params(&self) -> &ReverbParams;

    fn params_mut(&mut self) -> &mut ReverbParams;

    fn set_params(&mut self, params: &ReverbParams) {
        *self.params_mut() = *params;
    }
}

/// Milliseconds to a whole number of samples (truncating, never negative).
#[inline]
pub fn ms_to_samples(ms: f32, sample_rate: f32) -> usize {
    let s = ms * sample_rate / 1000.0;
    if s.is_finite() && s > 0.0 { s as usize } else { 0 }
}

/// Buffer capacity for a maximum delay of `ms` milliseconds, plus `extra` samples.
#[inline]
pub fn capacity_for_ms(ms: f32, sample_rate: f32, extra: usize) -> usize {
    (ms * sample_rate / 1000.0).ceil().max(0.0) as usize + extra
}

/// Mid/side width: 0 = mono, 1 = unchanged, 2 = doubled side.
#[inline]
pub fn apply_width(left: f32, right: f32, width: f32) -> (f32, f32) {
    let mid = (left + right) * 0.5;
    let side = (left - right) * 0.5 * width;
    (mid + side, mid - side)
}

/// Linear dry/wet blend.
#[inline]
pub fn blend(dry: f32, wet: f32, mix: f32) -> f32 {
    dry * (1.0 - mix) + wet * mix
}

/// Run `frame` over every sample frame of a mono or stereo block in place.
///
/// `frame` receives the dry (L, R) pair, with R = L for mono input, and
/// returns the wet pair; the result is blended with the dry signal by `mix`.
/// Mono blocks keep only the left output.
pub fn process_frames<F>(channels: &mut [&mut [f32]], mix: f32, mut frame: F)
where
    F: FnMut(f32, f32) -> (f32, f32),
{
    let Some((first, rest)) = channels.split_first_mut() else {
        return;
    };
    let left: &mut [f32] = first;
    match rest.first_mut() {
        Some(right) => {
            let right: &mut [f32] = right;
            for (l, r) in left.iter_mut().zip(right.iter_mut()) {
                let (wl, wr) = frame(*l, *r);
                *l = blend(*l, wl, mix);
                *r = blend(*r, wr, mix);
            }
        }
        None => {
            for l in left.iter_mut() {
                let (wl, _) = frame(*l, *l);
                *l = blend(*l, wl, mix);
            }
        }
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ms_to_samples() {
        assert_eq!(ms_to_samples(10.0, 48000.0), 480);
        assert_eq!(ms_to_samples(-5.0, 48000.0), 0);
        assert_eq!(ms_to_samples(f32::NAN, 48000.0), 0);
    }

    #[test]
    fn test_width_extremes() {
        let (l, r) = apply_width(1.0, 0.0, 0.0);
        assert_eq!((l, r), (0.5, 0.5));
        let (l, r) = apply_width(0.3, -0.2, 1.0);
        assert!((l - 0.3).abs() < 1e-6 && (r + 0.2).abs() < 1e-6);
    }

    #[test]
    fn test_process_frames_mono_duplicates_input() {
        let mut mono = vec![0.25f32, -0.5];
        let mut seen = Vec::new();
        {
            let mut chans: [&mut [f32]; 1] = [&mut mono];
            process_frames(&mut chans, 1.0, |l, r| {
                seen.push((l, r));
                (l * 2.0, 0.0)
            });
        }
        assert_eq!(seen, vec![(0.25, 0.25), (-0.5, -0.5)]);
        assert_eq!(mono, vec![0.5, -1.0]);
    }

    #[test]
    fn test_process_frames_leaves_extra_channels() {
        let mut a = vec![1.0f32; 4];
        let mut b = vec![1.0f32; 4];
        let mut c = vec![1.0f32; 4];
        {
            let mut chans: [&mut [f32]; 3] = [&mut a, &mut b, &mut c];
            process_frames(&mut chans, 1.0, |_, _| (0.0, 0.0));
        }
        assert!(a.iter().chain(b.iter()).all(|&s| s == 0.0));
        assert!(c.iter().all(|&s| s == 1.0));
    }

    #[test]
    fn test_process_frames_empty_block() {
        let mut chans: [&mut [f32]; 0] = [];
        process_frames(&mut chans, 1.0, |l, r| (l, r));
    }
}
