use crate::error::Result;

/// A seekable, frame-indexed audio source.
///
/// Samples are interleaved f32 in `[-1.0, 1.0]`.
pub trait FrameSource: Send {
    fn channels(&self) -> u16;
    fn sample_rate(&self) -> u32;
    /// Total number of frames in the source.
    fn frames(&self) -> u64;
    /// Position the read cursor. Seeking past the end is allowed; the next
    /// read then returns nothing.
    fn seek(&mut self, frame: u64) -> Result<()>;
    /// Replace the contents of `out` with up to `frames` frames read from the
    /// cursor, advancing it. Returns the number of frames read, 0 at the end.
    fn read(&mut self, frames: usize, out: &mut Vec<f32>) -> Result<usize>;
}

/// Audio held entirely in memory.
#[derive(Clone, Debug)]
pub struct MemorySource {
    samples: Vec<f32>,
    sample_rate: u32,
    channels: u16,
    position: u64,
}

impl MemorySource {
    pub fn new(samples: Vec<f32>, sample_rate: u32, channels: u16) -> Self {
        let channels = channels.max(1);
        let mut samples = samples;
        samples.truncate(samples.len() - samples.len() % channels as usize);
        Self {
            samples,
            sample_rate,
            channels,
            position: 0,
        }
    }
}

impl FrameSource for MemorySource {
    fn channels(&self) -> u16 {
        self.channels
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn frames(&self) -> u64 {
        (self.samples.len() / self.channels as usize) as u64
    }

    fn seek(&mut self, frame: u64) -> Result<()> {
        self.position = frame;
        Ok(())
    }

    fn read(&mut self, frames: usize, out: &mut Vec<f32>) -> Result<usize> {
        out.clear();
        let total = self.frames();
        if self.position >= total {
            return Ok(0);
        }
        let count = (frames as u64).min(total - self.position) as usize;
        let ch = self.channels as usize;
        let start = self.position as usize * ch;
        out.extend_from_slice(&self.samples[start..start + count * ch]);
        self.position += count as u64;
        Ok(count)
    }
}
