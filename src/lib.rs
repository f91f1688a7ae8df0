//! Streaming audio playback with per-chunk adaptive loudness normalization.

pub mod app;
pub mod audio;
pub mod config;
pub mod display;
pub mod error;
pub mod playlist;

pub use audio::output::{CpalDevice, OutputDevice, OutputSink};
pub use audio::types::{DisplayBuffer, PlaybackStatus};
pub use audio::AudioPlayer;
pub use config::{NormalizationParams, PlayerConfig};
pub use error::{Error, Result};
pub use playlist::Playlist;
