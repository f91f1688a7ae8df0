#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use normplay::{Error, OutputDevice, OutputSink, Result};
use parking_lot::Mutex;
use tempfile::TempDir;

/// Write a 16-bit stereo-or-mono WAV with a sine of `freq` Hz.
pub fn write_sine_wav(
    dir: &TempDir,
    name: &str,
    frames: usize,
    channels: u16,
    sample_rate: u32,
    freq: f32,
) -> PathBuf {
    let path = dir.path().join(name);
    let spec = hound::WavSpec {
        channels,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(&path, spec).unwrap();
    for i in 0..frames {
        let t = i as f32 / sample_rate as f32;
        let v = (0.5 * (2.0 * std::f32::consts::PI * freq * t).sin() * i16::MAX as f32) as i16;
        for _ in 0..channels {
            writer.write_sample(v).unwrap();
        }
    }
    writer.finalize().unwrap();
    path
}

/// Write a mono WAV whose sample at frame `i` is `i % 1000` (as i16).
pub fn write_counter_wav(dir: &TempDir, name: &str, frames: usize) -> PathBuf {
    let path = dir.path().join(name);
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: 8000,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(&path, spec).unwrap();
    for i in 0..frames {
        writer.write_sample((i % 1000) as i16).unwrap();
    }
    writer.finalize().unwrap();
    path
}

/// Decode a counter sample back to its integer value.
pub fn counter_value(sample: f32) -> i32 {
    (sample * 32768.0).round() as i32
}

#[derive(Debug, Clone, PartialEq)]
pub struct OpenRequest {
    pub channels: u16,
    pub sample_rate: u32,
    pub chunk_size: usize,
}

/// Output device that records every chunk. With `paced`, each write takes
/// as long as the chunk would take to play.
#[derive(Clone, Default)]
pub struct RecordingDevice {
    pub paced: bool,
    pub opened: Arc<Mutex<Vec<OpenRequest>>>,
    pub chunks: Arc<Mutex<Vec<Vec<f32>>>>,
    pub finished: Arc<Mutex<Vec<bool>>>,
}

impl RecordingDevice {
    pub fn instant() -> Self {
        Self::default()
    }

    pub fn paced() -> Self {
        Self {
            paced: true,
            ..Self::default()
        }
    }

    pub fn samples(&self) -> Vec<f32> {
        self.chunks.lock().iter().flatten().copied().collect()
    }
}

struct RecordingSink {
    device: RecordingDevice,
    channels: usize,
    sample_rate: u32,
}

impl OutputDevice for RecordingDevice {
    fn open(&self, channels: u16, sample_rate: u32, chunk_size: usize) -> Result<Box<dyn OutputSink>> {
        self.opened.lock().push(OpenRequest {
            channels,
            sample_rate,
            chunk_size,
        });
        Ok(Box::new(RecordingSink {
            device: self.clone(),
            channels: channels as usize,
            sample_rate,
        }))
    }
}

impl OutputSink for RecordingSink {
    fn write(&mut self, samples: Vec<f32>) -> Result<()> {
        if self.device.paced {
            let frames = samples.len() / self.channels;
            std::thread::sleep(Duration::from_secs_f64(
                frames as f64 / self.sample_rate as f64,
            ));
        }
        self.device.chunks.lock().push(samples);
        Ok(())
    }

    fn finish(self: Box<Self>, drain: bool) {
        self.device.finished.lock().push(drain);
    }
}

/// Output device that cannot be opened.
pub struct BrokenDevice;

impl OutputDevice for BrokenDevice {
    fn open(&self, _: u16, _: u32, _: usize) -> Result<Box<dyn OutputSink>> {
        Err(Error::OutputDevice("device unplugged".into()))
    }
}

/// Output device whose stream dies after `ok_writes` chunks.
pub struct FlakyDevice {
    pub ok_writes: usize,
}

struct FlakySink {
    remaining: usize,
}

impl OutputDevice for FlakyDevice {
    fn open(&self, _: u16, _: u32, _: usize) -> Result<Box<dyn OutputSink>> {
        Ok(Box::new(FlakySink {
            remaining: self.ok_writes,
        }))
    }
}

impl OutputSink for FlakySink {
    fn write(&mut self, _samples: Vec<f32>) -> Result<()> {
        if self.remaining == 0 {
            return Err(Error::OutputDevice("stream lost".into()));
        }
        self.remaining -= 1;
        Ok(())
    }

    fn finish(self: Box<Self>, _drain: bool) {}
}
