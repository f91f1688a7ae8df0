//! Per-chunk loudness analysis and normalization.
//!
//! Integrated loudness follows ITU-R BS.1770: K-weighting (a +4 dB high
//! shelf followed by a 38 Hz high-pass), per-channel mean square, channel
//! weighting and the absolute -70 LUFS gate. A whole chunk is measured as a
//! single gating block, so the relative gate never removes anything.

use std::f64::consts::PI;

use crate::config::NormalizationParams;

/// Stand-in for exact zeros so peak normalization never divides by zero.
pub const SILENCE_EPSILON: f32 = 1e-12;

const ABSOLUTE_GATE_LUFS: f64 = -70.0;
const SURROUND_WEIGHT: f64 = 1.41;

/// Replace exact-zero samples with [`SILENCE_EPSILON`].
pub fn replace_silence(samples: &mut [f32]) {
    for s in samples.iter_mut().filter(|s| **s == 0.0) {
        *s = SILENCE_EPSILON;
    }
}

/// Transposed direct-form II biquad, coefficients normalized by a0.
#[derive(Clone, Copy, Debug)]
struct Biquad {
    b0: f64,
    b1: f64,
    b2: f64,
    a1: f64,
    a2: f64,
    z1: f64,
    z2: f64,
}

impl Biquad {
    fn from_raw(b: [f64; 3], a: [f64; 3]) -> Self {
        Self {
            b0: b[0] / a[0],
            b1: b[1] / a[0],
            b2: b[2] / a[0],
            a1: a[1] / a[0],
            a2: a[2] / a[0],
            z1: 0.0,
            z2: 0.0,
        }
    }

    /// Stage 1: high shelf, +4 dB above ~1.5 kHz.
    fn high_shelf(sample_rate: f64) -> Self {
        let gain_db = 4.0;
        let q = 1.0 / 2f64.sqrt();
        let fc = 1500.0;

        let a = 10f64.powf(gain_db / 40.0);
        let w0 = 2.0 * PI * fc / sample_rate;
        let alpha = w0.sin() / (2.0 * q);
        let cos = w0.cos();
        let root = 2.0 * a.sqrt() * alpha;

        Self::from_raw(
            [
                a * ((a + 1.0) + (a - 1.0) * cos + root),
                -2.0 * a * ((a - 1.0) + (a + 1.0) * cos),
                a * ((a + 1.0) + (a - 1.0) * cos - root),
            ],
            [
                (a + 1.0) - (a - 1.0) * cos + root,
                2.0 * ((a - 1.0) - (a + 1.0) * cos),
                (a + 1.0) - (a - 1.0) * cos - root,
            ],
        )
    }

    /// Stage 2: RLB high-pass at 38 Hz.
    fn high_pass(sample_rate: f64) -> Self {
        let q = 0.5;
        let fc = 38.0;

        let w0 = 2.0 * PI * fc / sample_rate;
        let alpha = w0.sin() / (2.0 * q);
        let cos = w0.cos();

        Self::from_raw(
            [(1.0 + cos) / 2.0, -(1.0 + cos), (1.0 + cos) / 2.0],
            [1.0 + alpha, -2.0 * cos, 1.0 - alpha],
        )
    }

    #[inline(always)]
    fn process(&mut self, x: f64) -> f64 {
        let y = self.b0 * x + self.z1;
        self.z1 = self.b1 * x - self.a1 * y + self.z2;
        self.z2 = self.b2 * x - self.a2 * y;
        y
    }
}

/// Integrated loudness of an interleaved block in LUFS.
///
/// Returns `None` for an empty block or one below the absolute gate.
pub fn integrated_loudness(samples: &[f32], channels: usize, sample_rate: u32) -> Option<f64> {
    if channels == 0 || sample_rate == 0 || samples.len() < channels {
        return None;
    }
    let frames = samples.len() / channels;
    let fs = sample_rate as f64;

    let mut weighted_power = 0.0;
    for ch in 0..channels {
        let mut shelf = Biquad::high_shelf(fs);
        let mut hp = Biquad::high_pass(fs);
        let sum_sq: f64 = samples
            .iter()
            .skip(ch)
            .step_by(channels)
            .take(frames)
            .map(|&s| {
                let y = hp.process(shelf.process(s as f64));
                y * y
            })
            .sum();
        let weight = if (3..5).contains(&ch) { SURROUND_WEIGHT } else { 1.0 };
        weighted_power += weight * sum_sq / frames as f64;
    }

    if weighted_power <= 0.0 {
        return None;
    }
    let loudness = -0.691 + 10.0 * weighted_power.log10();
    (loudness >= ABSOLUTE_GATE_LUFS).then_some(loudness)
}

/// Population standard deviation of the sample magnitudes.
pub fn amplitude_std(samples: &[f32]) -> f64 {
    if samples.is_empty() {
        return 0.0;
    }
    let n = samples.len() as f64;
    let mean = samples.iter().map(|s| s.abs() as f64).sum::<f64>() / n;
    let var = samples
        .iter()
        .map(|s| {
            let d = s.abs() as f64 - mean;
            d * d
        })
        .sum::<f64>()
        / n;
    var.sqrt()
}

/// Map a measured loudness (clamped to `[-input_range, 0]`) onto the target
/// loudness curve, in dB.
pub fn loudness_curve(loudness: f64, params: &NormalizationParams) -> f64 {
    let ir = params.input_range;
    let tdr = params.target_dynamic_range;
    let exponent = 1.0 / params.loudness_compression_factor;
    let point = loudness.clamp(-ir, 0.0);

    ((tdr - params.loudness_upper_limit) / tdr)
        * tdr
        * (point + ir).powf(exponent)
        * (ir - 1.0).powf(-exponent)
        - tdr
}

/// Map the amplitude spread onto a multiplier in `[std_compression_max, 1]`.
pub fn std_multiplier(std: f64, params: &NormalizationParams) -> f64 {
    let floor = params.std_compression_max;
    let m = (1.0 - floor)
        * std.max(0.0).powf(params.std_compression_factor)
        * params.expected_std_max.powf(-params.std_compression_factor)
        + floor;
    m.clamp(floor, 1.0)
}

/// Per-chunk values behind the normalization target. Never outlives a chunk.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NormalizationContext {
    pub loudness: f64,
    pub std: f64,
    pub target_loudness: f64,
}

impl NormalizationContext {
    /// Measure an interleaved chunk and derive its target loudness.
    pub fn measure(
        samples: &[f32],
        channels: usize,
        sample_rate: u32,
        params: &NormalizationParams,
    ) -> Self {
        let loudness = integrated_loudness(samples, channels, sample_rate)
            .unwrap_or(-params.input_range)
            .clamp(-params.input_range, 0.0);
        let std = amplitude_std(samples);
        let target_loudness =
            (loudness_curve(loudness, params) * std_multiplier(std, params)).min(0.0);
        Self {
            loudness,
            std,
            target_loudness,
        }
    }
}

/// Peak-normalize `samples` to `target_db`, then mix with the raw signal:
/// `mix * normalized + (1 - mix) * raw`.
pub fn normalize_and_blend(samples: &mut [f32], target_db: f64, mix: f32) {
    let peak = samples.iter().fold(0.0f32, |acc, s| acc.max(s.abs()));
    if peak <= 0.0 || !peak.is_finite() {
        return;
    }
    let gain = (10f64.powf(target_db / 20.0) / peak as f64) as f32;
    let raw = 1.0 - mix;
    for s in samples.iter_mut() {
        *s = mix * (*s * gain) + raw * *s;
    }
}
