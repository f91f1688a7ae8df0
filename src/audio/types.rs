use std::path::PathBuf;

/// Mutable playback context shared between the controller and the stream task.
///
/// Always accessed through the player's session lock.
#[derive(Debug, Clone)]
pub struct Session {
    pub audio_path: Option<PathBuf>,
    pub sample_rate: u32,
    pub channel_count: u16,
    pub total_frames: u64,
    /// Cursor into the file, in frames. Stays within `0..=total_frames`.
    pub current_frame: u64,
    /// Always within `[0, 1]`.
    pub volume: f32,
    pub display: Option<DisplayBuffer>,
}

impl Session {
    pub fn new(volume: f32) -> Self {
        Self {
            audio_path: None,
            sample_rate: 0,
            channel_count: 0,
            total_frames: 0,
            current_frame: 0,
            volume: volume.clamp(0.0, 1.0),
            display: None,
        }
    }

    pub fn is_loaded(&self) -> bool {
        self.total_frames > 0
    }

    /// Drop all file-scoped fields. Volume survives.
    pub fn unload(&mut self) {
        self.audio_path = None;
        self.sample_rate = 0;
        self.channel_count = 0;
        self.total_frames = 0;
        self.current_frame = 0;
        self.display = None;
    }
}

/// Downsampled copy of recent audio for visualization, one row per channel.
#[derive(Debug, Clone, PartialEq)]
pub struct DisplayBuffer {
    pub channels: Vec<Vec<f32>>,
}

impl DisplayBuffer {
    /// Split interleaved samples into per-channel rows, keeping every
    /// `skip_rate`-th frame.
    pub fn from_interleaved(samples: &[f32], channel_count: usize, skip_rate: usize) -> Self {
        let skip_rate = skip_rate.max(1);
        let mut channels = vec![Vec::new(); channel_count];
        if channel_count == 0 {
            return Self { channels };
        }
        for frame in samples.chunks_exact(channel_count).step_by(skip_rate) {
            for (row, &sample) in channels.iter_mut().zip(frame) {
                row.push(sample);
            }
        }
        Self { channels }
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    /// Number of (downsampled) frames per channel.
    pub fn len(&self) -> usize {
        self.channels.first().map_or(0, Vec::len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Result of producing one chunk.
#[derive(Debug, Clone, PartialEq)]
pub enum ChunkOutcome {
    /// Interleaved samples to hand to the device.
    Continue(Vec<f32>),
    /// End of file or stop request. Nothing more will be produced.
    Complete,
}

/// Current playback status, derived from the lifecycle signals.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PlaybackStatus {
    Stopped,
    Playing,
    Paused,
}
