use std::sync::Arc;

use super::loudness::{normalize_and_blend, replace_silence, NormalizationContext};
use super::player::Shared;
use super::source::FrameSource;
use super::types::{ChunkOutcome, DisplayBuffer};
use crate::config::{NormalizationParams, PlayerConfig};
use crate::error::Result;

/// Produces normalized chunks from a frame source, one per device request.
pub struct StreamingNormalizer {
    shared: Arc<Shared>,
    source: Box<dyn FrameSource>,
    params: NormalizationParams,
    channels: usize,
    sample_rate: u32,
    display_frame_chunk_ratio: usize,
    display_skip_rate: usize,
    display_scratch: Vec<f32>,
}

impl StreamingNormalizer {
    pub(crate) fn new(
        shared: Arc<Shared>,
        source: Box<dyn FrameSource>,
        config: &PlayerConfig,
    ) -> Self {
        let channels = source.channels() as usize;
        let sample_rate = source.sample_rate();
        Self {
            shared,
            source,
            params: config.normalization,
            channels,
            sample_rate,
            display_frame_chunk_ratio: config.display_frame_chunk_ratio,
            display_skip_rate: config.display_skip_rate.max(1),
            display_scratch: Vec::new(),
        }
    }

    /// Produce the next chunk of `frame_count` frames.
    ///
    /// Blocks while playback is paused. A seek or volume change made while a
    /// chunk is in flight applies from the next chunk on.
    pub fn next_chunk(&mut self, frame_count: usize) -> Result<ChunkOutcome> {
        self.shared.unpaused.wait();
        if self.shared.stopped.is_set() {
            return Ok(ChunkOutcome::Complete);
        }

        let mut data = Vec::with_capacity(frame_count * self.channels);
        let read = {
            let mut session = self.shared.session.lock();
            if session.current_frame >= session.total_frames {
                return Ok(ChunkOutcome::Complete);
            }
            self.source.seek(session.current_frame)?;
            session.current_frame =
                (session.current_frame + frame_count as u64).min(session.total_frames);
            self.source.read(frame_count, &mut data)?
        };

        replace_silence(&mut data);
        if read == 0 {
            return Ok(ChunkOutcome::Complete);
        }

        let context =
            NormalizationContext::measure(&data, self.channels, self.sample_rate, &self.params);
        normalize_and_blend(&mut data, context.target_loudness, self.params.normalized_mix);

        if self.shared.visualizer_visible.is_set() {
            self.refresh_display(frame_count, context.target_loudness);
        }

        let volume = self.shared.session.lock().volume;
        for s in data.iter_mut() {
            *s *= volume;
        }
        Ok(ChunkOutcome::Continue(data))
    }

    /// Read the window following the chunk just produced and publish it as
    /// the display buffer. Best effort: short reads and errors leave the
    /// previous buffer in place.
    fn refresh_display(&mut self, frame_count: usize, target_loudness: f64) {
        let wanted = self.display_frame_chunk_ratio * frame_count;
        if wanted == 0 {
            return;
        }
        match self.source.read(wanted, &mut self.display_scratch) {
            Ok(read) if read == wanted => {}
            Ok(read) => {
                log::trace!("Display lookahead got {read} of {wanted} frames, skipping");
                return;
            }
            Err(e) => {
                log::trace!("Display lookahead failed: {e}");
                return;
            }
        }

        let ch = self.channels;
        let mut downsampled: Vec<f32> = self
            .display_scratch
            .chunks_exact(ch)
            .step_by(self.display_skip_rate)
            .flatten()
            .copied()
            .collect();
        replace_silence(&mut downsampled);
        normalize_and_blend(&mut downsampled, target_loudness, self.params.normalized_mix);

        let display = DisplayBuffer::from_interleaved(&downsampled, ch, 1);
        self.shared.session.lock().display = Some(display);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::source::MemorySource;

    fn shared_with(source: &MemorySource, volume: f32) -> Arc<Shared> {
        let shared = Arc::new(Shared::new(volume));
        {
            let mut session = shared.session.lock();
            session.sample_rate = source.sample_rate();
            session.channel_count = source.channels();
            session.total_frames = source.frames();
        }
        shared.no_audio_loaded.clear();
        shared
    }

    fn ramp_source(frames: usize, channels: u16) -> MemorySource {
        let samples = (0..frames * channels as usize)
            .map(|i| ((i % 200) as f32 / 100.0) - 1.0)
            .collect();
        MemorySource::new(samples, 8000, channels)
    }

    fn config(chunk_size: usize) -> PlayerConfig {
        PlayerConfig {
            chunk_size,
            display_frame_chunk_ratio: 2,
            display_skip_rate: 2,
            ..PlayerConfig::default()
        }
    }

    #[test]
    fn advances_cursor_and_completes_at_end() {
        let source = ramp_source(250, 2);
        let shared = shared_with(&source, 1.0);
        let mut normalizer =
            StreamingNormalizer::new(Arc::clone(&shared), Box::new(source), &config(100));

        for expected in [100, 200, 250] {
            let outcome = normalizer.next_chunk(100).unwrap();
            assert!(matches!(outcome, ChunkOutcome::Continue(_)));
            assert_eq!(shared.session.lock().current_frame, expected);
        }
        assert_eq!(normalizer.next_chunk(100).unwrap(), ChunkOutcome::Complete);
    }

    #[test]
    fn last_chunk_may_be_short() {
        let source = ramp_source(150, 1);
        let shared = shared_with(&source, 1.0);
        let mut normalizer = StreamingNormalizer::new(shared, Box::new(source), &config(100));
        normalizer.next_chunk(100).unwrap();
        match normalizer.next_chunk(100).unwrap() {
            ChunkOutcome::Continue(data) => assert_eq!(data.len(), 50),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn stop_request_completes_without_reading() {
        let source = ramp_source(1000, 2);
        let shared = shared_with(&source, 1.0);
        shared.stopped.set();
        let mut normalizer =
            StreamingNormalizer::new(Arc::clone(&shared), Box::new(source), &config(100));
        assert_eq!(normalizer.next_chunk(100).unwrap(), ChunkOutcome::Complete);
        assert_eq!(shared.session.lock().current_frame, 0);
    }

    #[test]
    fn seek_applies_at_next_chunk() {
        let source = ramp_source(1000, 1);
        let shared = shared_with(&source, 1.0);
        let mut normalizer =
            StreamingNormalizer::new(Arc::clone(&shared), Box::new(source), &config(100));
        normalizer.next_chunk(100).unwrap();
        shared.session.lock().current_frame = 700;
        normalizer.next_chunk(100).unwrap();
        assert_eq!(shared.session.lock().current_frame, 800);
    }

    #[test]
    fn volume_scales_output() {
        let source = ramp_source(400, 2);
        let full = shared_with(&source, 1.0);
        let half = shared_with(&source, 0.5);
        let mut a = StreamingNormalizer::new(full, Box::new(source.clone()), &config(100));
        let mut b = StreamingNormalizer::new(half, Box::new(source), &config(100));

        let (ChunkOutcome::Continue(loud), ChunkOutcome::Continue(soft)) =
            (a.next_chunk(100).unwrap(), b.next_chunk(100).unwrap())
        else {
            panic!("expected audio");
        };
        for (l, s) in loud.iter().zip(&soft) {
            assert!((l * 0.5 - s).abs() < 1e-6);
        }
    }

    #[test]
    fn silent_source_produces_tiny_output() {
        let source = MemorySource::new(vec![0.0; 400], 8000, 1);
        let shared = shared_with(&source, 1.0);
        let mut normalizer = StreamingNormalizer::new(shared, Box::new(source), &config(100));
        match normalizer.next_chunk(100).unwrap() {
            ChunkOutcome::Continue(data) => {
                assert!(data.iter().all(|s| s.is_finite() && s.abs() < 0.01));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn display_updates_only_when_visible() {
        let source = ramp_source(1000, 2);
        let shared = shared_with(&source, 1.0);
        let mut normalizer =
            StreamingNormalizer::new(Arc::clone(&shared), Box::new(source), &config(100));

        normalizer.next_chunk(100).unwrap();
        assert!(shared.session.lock().display.is_none());

        shared.visualizer_visible.set();
        normalizer.next_chunk(100).unwrap();
        let display = shared.session.lock().display.clone().unwrap();
        assert_eq!(display.channel_count(), 2);
        // 2 chunks of lookahead, every 2nd frame kept.
        assert_eq!(display.len(), 100);
        // The lookahead never moves the playback cursor.
        assert_eq!(shared.session.lock().current_frame, 200);
    }

    #[test]
    fn short_display_read_keeps_previous_buffer() {
        let source = ramp_source(500, 1);
        let shared = shared_with(&source, 1.0);
        shared.visualizer_visible.set();
        let mut normalizer =
            StreamingNormalizer::new(Arc::clone(&shared), Box::new(source), &config(100));

        normalizer.next_chunk(100).unwrap();
        let first = shared.session.lock().display.clone().unwrap();
        // Only 100 frames remain after the chunk at 300..400, fewer than 200.
        shared.session.lock().current_frame = 300;
        assert!(matches!(normalizer.next_chunk(100).unwrap(), ChunkOutcome::Continue(_)));
        assert_eq!(shared.session.lock().display.clone().unwrap(), first);
    }
}
