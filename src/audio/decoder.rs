use std::fs::File;
use std::path::Path;

use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{Decoder, DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader, SeekMode, SeekTo, Track};
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use symphonia::core::units::TimeBase;

use super::source::{FrameSource, MemorySource};
use crate::error::{Error, Result};

/// Decoded frames kept behind the read cursor so short backward seeks avoid
/// a container seek.
const HISTORY_FRAMES: u64 = 1 << 18;

/// Open `path` as a seekable frame source.
///
/// Streams from disk when the container reports its length; otherwise the
/// whole file is decoded into memory so the frame count is exact.
pub fn open_source(path: &Path) -> Result<Box<dyn FrameSource>> {
    let (reader, track) = probe(path)?;
    if track.codec_params.n_frames.is_some() {
        let source = StreamingSource::new(reader, &track)?;
        log::debug!(
            "Streaming {} ({} frames, {} Hz, {} ch)",
            path.display(),
            source.frames(),
            source.sample_rate(),
            source.channels()
        );
        Ok(Box::new(source))
    } else {
        log::debug!("{} has no frame count, decoding into memory", path.display());
        drop(reader);
        Ok(Box::new(decode_file(path)?))
    }
}

fn probe(path: &Path) -> Result<(Box<dyn FormatReader>, Track)> {
    let file = File::open(path)?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|e| Error::UnsupportedFormat(format!("{}: {e}", path.display())))?;

    let format = probed.format;
    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .cloned()
        .ok_or_else(|| Error::NoTrack(path.display().to_string()))?;

    if track.codec_params.sample_rate.is_none() {
        return Err(Error::Decode(format!(
            "No sample rate in track of {}",
            path.display()
        )));
    }

    Ok((format, track))
}

fn make_decoder(track: &Track) -> Result<Box<dyn Decoder>> {
    symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|e| Error::UnsupportedFormat(format!("Failed to create decoder: {e}")))
}

fn track_channels(track: &Track) -> u16 {
    track
        .codec_params
        .channels
        .map(|c| c.count() as u16)
        .unwrap_or(2)
}

/// Decode an audio file into memory.
pub fn decode_file(path: &Path) -> Result<MemorySource> {
    let (mut format, track) = probe(path)?;
    let sample_rate = track.codec_params.sample_rate.unwrap_or_default();
    let channels = track_channels(&track);
    let mut decoder = make_decoder(&track)?;

    let mut samples: Vec<f32> = Vec::new();

    loop {
        let packet = match format.next_packet() {
            Ok(p) => p,
            Err(SymphoniaError::IoError(ref e))
                if e.kind() == std::io::ErrorKind::UnexpectedEof =>
            {
                break;
            }
            Err(SymphoniaError::ResetRequired) => {
                decoder.reset();
                continue;
            }
            Err(e) => return Err(e.into()),
        };

        if packet.track_id() != track.id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(d) => d,
            Err(SymphoniaError::DecodeError(e)) => {
                log::warn!("Decode warning in {}: {e}", path.display());
                continue;
            }
            Err(e) => return Err(e.into()),
        };

        let spec = *decoded.spec();
        let num_frames = decoded.capacity();

        let mut sample_buf = SampleBuffer::<f32>::new(num_frames as u64, spec);
        sample_buf.copy_interleaved_ref(decoded);
        samples.extend_from_slice(sample_buf.samples());
    }

    Ok(MemorySource::new(samples, sample_rate, channels))
}

/// Incrementally decoding source over a symphonia format reader.
///
/// Holds a contiguous window of decoded frames `[buffer_start, buffered_end)`.
/// Seeks inside the window only move the cursor; anything else goes through
/// an accurate container seek.
pub struct StreamingSource {
    reader: Box<dyn FormatReader>,
    decoder: Box<dyn Decoder>,
    track_id: u32,
    time_base: Option<TimeBase>,
    sample_rate: u32,
    channels: u16,
    frames: u64,
    buffer: Vec<f32>,
    buffer_start: u64,
    cursor: u64,
    exhausted: bool,
}

impl StreamingSource {
    pub fn new(reader: Box<dyn FormatReader>, track: &Track) -> Result<Self> {
        let decoder = make_decoder(track)?;
        Ok(Self {
            reader,
            decoder,
            track_id: track.id,
            time_base: track.codec_params.time_base,
            sample_rate: track.codec_params.sample_rate.unwrap_or_default(),
            channels: track_channels(track).max(1),
            frames: track.codec_params.n_frames.unwrap_or_default(),
            buffer: Vec::new(),
            buffer_start: 0,
            cursor: 0,
            exhausted: false,
        })
    }

    fn buffered_end(&self) -> u64 {
        self.buffer_start + (self.buffer.len() / self.channels as usize) as u64
    }

    /// Keep at most `HISTORY_FRAMES` decoded frames behind the cursor.
    fn trim_history(&mut self) {
        if self.cursor - self.buffer_start > HISTORY_FRAMES {
            let keep_from = self.cursor - HISTORY_FRAMES;
            self.discard_before(keep_from);
        }
    }

    /// Drop buffered frames before `frame`.
    fn discard_before(&mut self, frame: u64) {
        if frame <= self.buffer_start {
            return;
        }
        let drop_frames = (frame - self.buffer_start).min(self.buffered_end() - self.buffer_start);
        self.buffer.drain(..drop_frames as usize * self.channels as usize);
        self.buffer_start += drop_frames;
    }

    fn ts_to_frame(&self, ts: u64) -> u64 {
        match self.time_base {
            Some(tb) if tb.denom != 0 => {
                (ts as u128 * tb.numer as u128 * self.sample_rate as u128 / tb.denom as u128)
                    as u64
            }
            _ => ts,
        }
    }

    fn frame_to_ts(&self, frame: u64) -> u64 {
        match self.time_base {
            Some(tb) if tb.numer != 0 && self.sample_rate != 0 => {
                (frame as u128 * tb.denom as u128
                    / (tb.numer as u128 * self.sample_rate as u128)) as u64
            }
            _ => frame,
        }
    }

    /// Decode one packet of our track and append it to the window.
    fn decode_next_packet(&mut self) -> Result<()> {
        loop {
            let packet = match self.reader.next_packet() {
                Ok(p) => p,
                Err(SymphoniaError::IoError(ref e))
                    if e.kind() == std::io::ErrorKind::UnexpectedEof =>
                {
                    self.exhausted = true;
                    return Ok(());
                }
                Err(SymphoniaError::ResetRequired) => {
                    self.decoder.reset();
                    continue;
                }
                Err(e) => return Err(e.into()),
            };

            if packet.track_id() != self.track_id {
                continue;
            }
            let packet_start = self.ts_to_frame(packet.ts());

            let decoded = match self.decoder.decode(&packet) {
                Ok(d) => d,
                Err(SymphoniaError::DecodeError(e)) => {
                    log::warn!("Skipping undecodable packet: {e}");
                    continue;
                }
                Err(e) => return Err(e.into()),
            };
            if decoded.frames() == 0 {
                continue;
            }
            if decoded.spec().channels.count() != self.channels as usize {
                return Err(Error::Decode(format!(
                    "Channel count changed mid-stream to {}",
                    decoded.spec().channels.count()
                )));
            }

            let spec = *decoded.spec();
            let mut sample_buf = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
            sample_buf.copy_interleaved_ref(decoded);

            let refilling = self.buffer.is_empty();
            if refilling {
                self.buffer_start = packet_start;
            }
            self.buffer.extend_from_slice(sample_buf.samples());

            // After a container seek the first packet may start before the target.
            if refilling {
                if self.buffer_start < self.cursor {
                    let target = self.cursor;
                    self.discard_before(target);
                } else if self.buffer_start > self.cursor {
                    self.cursor = self.buffer_start;
                }
            }
            return Ok(());
        }
    }
}

impl FrameSource for StreamingSource {
    fn channels(&self) -> u16 {
        self.channels
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn frames(&self) -> u64 {
        self.frames
    }

    fn seek(&mut self, frame: u64) -> Result<()> {
        if frame >= self.buffer_start && frame <= self.buffered_end() {
            self.cursor = frame;
            self.trim_history();
            return Ok(());
        }

        self.buffer.clear();
        self.buffer_start = frame;
        self.cursor = frame;

        if frame >= self.frames {
            self.exhausted = true;
            return Ok(());
        }

        let ts = self.frame_to_ts(frame);
        let seek_to = SeekTo::TimeStamp {
            ts,
            track_id: self.track_id,
        };
        match self.reader.seek(SeekMode::Accurate, seek_to) {
            Ok(_) => {
                self.decoder.reset();
                self.exhausted = false;
                Ok(())
            }
            Err(SymphoniaError::SeekError(e)) => {
                log::debug!("Seek to frame {frame} failed ({e:?}), treating as end of file");
                self.exhausted = true;
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    fn read(&mut self, frames: usize, out: &mut Vec<f32>) -> Result<usize> {
        out.clear();
        let wanted_end = self.cursor + frames as u64;
        while self.buffered_end() < wanted_end && !self.exhausted {
            self.decode_next_packet()?;
        }

        let ch = self.channels as usize;
        let available = self.buffered_end().saturating_sub(self.cursor).min(frames as u64);
        if available == 0 {
            return Ok(0);
        }
        let offset = (self.cursor - self.buffer_start) as usize * ch;
        out.extend_from_slice(&self.buffer[offset..offset + available as usize * ch]);
        self.cursor += available;
        self.trim_history();
        Ok(available as usize)
    }
}
