use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Parameters of the adaptive loudness target.
///
/// `input_range`, `target_dynamic_range` and `loudness_upper_limit` are in dB.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NormalizationParams {
    pub input_range: f64,
    pub target_dynamic_range: f64,
    pub loudness_compression_factor: f64,
    pub loudness_upper_limit: f64,
    pub std_compression_max: f64,
    pub std_compression_factor: f64,
    pub expected_std_max: f64,
    /// Share of the peak-normalized signal in the output; the rest is raw.
    pub normalized_mix: f32,
}

impl Default for NormalizationParams {
    fn default() -> Self {
        Self {
            input_range: 70.0,
            target_dynamic_range: 50.0,
            loudness_compression_factor: 1.0,
            loudness_upper_limit: 10.0,
            std_compression_max: 0.975,
            std_compression_factor: 0.8,
            expected_std_max: 3.5,
            normalized_mix: 0.9,
        }
    }
}

/// Player configuration, loadable from TOML.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerConfig {
    /// Frames requested per chunk from the output device.
    pub chunk_size: usize,
    pub volume: f32,
    /// Display lookahead length as a multiple of the chunk length.
    pub display_frame_chunk_ratio: usize,
    /// Keep every n-th frame of the lookahead.
    pub display_skip_rate: usize,
    pub normalization: NormalizationParams,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            chunk_size: 2048,
            volume: 1.0,
            display_frame_chunk_ratio: 20,
            display_skip_rate: 4,
            normalization: NormalizationParams::default(),
        }
    }
}

impl PlayerConfig {
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Self =
            toml::from_str(text).map_err(|e| Error::Config(format!("Invalid config: {e}")))?;
        config.validated()
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Failed to read {}: {e}", path.display())))?;
        Self::from_toml_str(&text)
    }

    /// Check ranges and coerce the values the engine tolerates.
    pub fn validated(mut self) -> Result<Self> {
        if self.chunk_size == 0 {
            return Err(Error::Config("chunk_size must be at least 1".into()));
        }
        if !self.volume.is_finite() {
            return Err(Error::Config("volume must be a finite number".into()));
        }
        self.volume = self.volume.clamp(0.0, 1.0);
        self.display_skip_rate = self.display_skip_rate.max(1);

        let n = &self.normalization;
        if n.input_range <= 1.0 {
            return Err(Error::Config("input_range must be greater than 1 dB".into()));
        }
        if n.target_dynamic_range <= 0.0 {
            return Err(Error::Config("target_dynamic_range must be positive".into()));
        }
        if n.loudness_compression_factor <= 0.0 || n.std_compression_factor < 0.0 {
            return Err(Error::Config("compression factors must be positive".into()));
        }
        if !(0.0..=1.0).contains(&n.std_compression_max) {
            return Err(Error::Config("std_compression_max must lie in [0, 1]".into()));
        }
        if n.expected_std_max <= 0.0 {
            return Err(Error::Config("expected_std_max must be positive".into()));
        }
        if !(0.0..=1.0).contains(&n.normalized_mix) {
            return Err(Error::Config("normalized_mix must lie in [0, 1]".into()));
        }
        Ok(self)
    }
}
