use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam_channel::Sender;
use parking_lot::Mutex;

use super::decoder;
use super::normalizer::StreamingNormalizer;
use super::output::{CpalDevice, OutputDevice, OutputSink};
use super::signal::Signal;
use super::types::{ChunkOutcome, DisplayBuffer, PlaybackStatus, Session};
use crate::config::PlayerConfig;
use crate::error::{Error, Result};

/// State shared between the controller and the stream task.
pub(crate) struct Shared {
    /// Guards the cursor, file fields, volume and display buffer.
    pub(crate) session: Mutex<Session>,
    /// Set while audio should advance. Cleared by pause.
    pub(crate) unpaused: Signal,
    /// Set to make the running stream end at its next chunk.
    pub(crate) stopped: Signal,
    /// Set once no stream task holds the session.
    pub(crate) no_audio_loaded: Signal,
    pub(crate) visualizer_visible: Signal,
    /// Streams that played through to the end of their file.
    pub(crate) completed: AtomicU64,
}

impl Shared {
    pub(crate) fn new(volume: f32) -> Self {
        Self {
            session: Mutex::new(Session::new(volume)),
            unpaused: Signal::new(true),
            stopped: Signal::new(false),
            no_audio_loaded: Signal::new(true),
            visualizer_visible: Signal::new(false),
            completed: AtomicU64::new(0),
        }
    }
}

/// Streaming player with loudness normalization.
///
/// All methods take `&self` and may be called from any thread. At most one
/// stream runs at a time.
pub struct AudioPlayer {
    shared: Arc<Shared>,
    device: Arc<dyn OutputDevice>,
    config: PlayerConfig,
    /// Serializes start and stop.
    admission: Mutex<()>,
    last_path: Mutex<Option<PathBuf>>,
    stream_thread: Mutex<Option<JoinHandle<()>>>,
}

impl AudioPlayer {
    /// Player on the default cpal output device.
    pub fn new(config: PlayerConfig) -> Self {
        Self::with_device(config, Arc::new(CpalDevice))
    }

    pub fn with_device(config: PlayerConfig, device: Arc<dyn OutputDevice>) -> Self {
        Self {
            shared: Arc::new(Shared::new(config.volume)),
            device,
            config,
            admission: Mutex::new(()),
            last_path: Mutex::new(None),
            stream_thread: Mutex::new(None),
        }
    }

    /// Start playing `path`, or the last started file when `None`.
    ///
    /// Any running stream is stopped first. The pause state carries over:
    /// starting while paused loads the new file paused at frame 0. Returns
    /// once the file is open and the device stream is running.
    pub fn start(&self, path: Option<&Path>) -> Result<()> {
        self.start_with_chunk_size(path, self.config.chunk_size)
    }

    /// Like [`start`](Self::start) with an explicit device chunk size in frames.
    pub fn start_with_chunk_size(&self, path: Option<&Path>, chunk_size: usize) -> Result<()> {
        if chunk_size == 0 {
            return Err(Error::Config("chunk_size must be at least 1".into()));
        }
        let _admission = self.admission.lock();

        let path = match path {
            Some(p) => p.to_path_buf(),
            None => self
                .last_path
                .lock()
                .clone()
                .ok_or_else(|| Error::Stream("Nothing has been played yet".into()))?,
        };

        self.wait_for_stream_exit();

        {
            let mut session = self.shared.session.lock();
            session.audio_path = Some(path.clone());
            self.shared.no_audio_loaded.clear();
            self.shared.stopped.clear();
        }
        *self.last_path.lock() = Some(path.clone());

        let (ready_tx, ready_rx) = crossbeam_channel::bounded(1);
        let shared = Arc::clone(&self.shared);
        let device = Arc::clone(&self.device);
        let config = PlayerConfig {
            chunk_size,
            ..self.config.clone()
        };
        let stream_path = path.clone();
        let spawned = std::thread::Builder::new()
            .name("audio-stream".into())
            .spawn(move || run_stream(&shared, device.as_ref(), &stream_path, &config, ready_tx));

        let handle = match spawned {
            Ok(handle) => handle,
            Err(e) => {
                self.shared.session.lock().unload();
                self.shared.no_audio_loaded.set();
                return Err(Error::Stream(format!("Failed to spawn stream thread: {e}")));
            }
        };

        match ready_rx.recv() {
            Ok(Ok(())) => {
                *self.stream_thread.lock() = Some(handle);
                log::info!("Playing {}", path.display());
                Ok(())
            }
            Ok(Err(e)) => {
                let _ = handle.join();
                Err(e)
            }
            Err(_) => {
                let _ = handle.join();
                Err(Error::Stream("Stream task exited before opening".into()))
            }
        }
    }

    /// Stop the running stream, if any. The pause state is kept.
    pub fn stop(&self) {
        let _admission = self.admission.lock();
        self.wait_for_stream_exit();
    }

    /// Ask the running stream to stop and wait until it has cleaned up.
    ///
    /// A paused stream is parked on the pause signal and would never see the
    /// stop request, so playback is forced on for the wait and the previous
    /// pause state restored afterwards.
    fn wait_for_stream_exit(&self) {
        self.shared.stopped.set();
        let was_unpaused = self.shared.unpaused.is_set();
        self.shared.unpaused.set();
        self.shared.no_audio_loaded.wait();
        if !was_unpaused {
            self.shared.unpaused.clear();
        }

        if let Some(handle) = self.stream_thread.lock().take() {
            if handle.join().is_err() {
                log::error!("Stream thread panicked");
            }
        }
    }

    pub fn pause(&self) {
        if self.is_loaded() {
            self.shared.unpaused.clear();
        }
    }

    pub fn unpause(&self) {
        if self.is_loaded() {
            self.shared.unpaused.set();
        }
    }

    pub fn toggle_pause(&self) {
        if self.shared.unpaused.is_set() {
            self.pause();
        } else {
            self.unpause();
        }
    }

    /// Move the cursor to a fraction of the file (`as_percentage`) or to an
    /// absolute frame. Clamped to `[0, total_frames]`; ignored when nothing
    /// is loaded. Takes effect at the next chunk.
    pub fn seek(&self, position: f64, as_percentage: bool) {
        if position.is_nan() {
            return;
        }
        let mut session = self.shared.session.lock();
        if session.total_frames == 0 {
            return;
        }
        let total = session.total_frames as f64;
        let target = if as_percentage {
            total * position
        } else {
            position
        };
        session.current_frame = target.clamp(0.0, total) as u64;
    }

    /// Set the output volume, clamped to `[0, 1]`. Takes effect at the next chunk.
    pub fn set_volume(&self, volume: f32) {
        let volume = if volume.is_nan() { 0.0 } else { volume.clamp(0.0, 1.0) };
        self.shared.session.lock().volume = volume;
    }

    pub fn volume(&self) -> f32 {
        self.shared.session.lock().volume
    }

    /// Snapshot of the latest display buffer, `None` when nothing is loaded.
    pub fn get_display_frames(&self) -> Option<DisplayBuffer> {
        let session = self.shared.session.lock();
        if !session.is_loaded() {
            return None;
        }
        session.display.clone()
    }

    /// Tell the stream whether anyone is looking at the display buffer.
    pub fn set_visualizer_visible(&self, visible: bool) {
        if visible {
            self.shared.visualizer_visible.set();
        } else {
            self.shared.visualizer_visible.clear();
        }
    }

    pub fn current_frame(&self) -> u64 {
        self.shared.session.lock().current_frame
    }

    pub fn total_frames(&self) -> u64 {
        self.shared.session.lock().total_frames
    }

    pub fn sample_rate(&self) -> u32 {
        self.shared.session.lock().sample_rate
    }

    pub fn audio_path(&self) -> Option<PathBuf> {
        self.shared.session.lock().audio_path.clone()
    }

    /// Playback position as a fraction in `[0, 1]`, 0 when unloaded.
    pub fn progress(&self) -> f64 {
        let session = self.shared.session.lock();
        if session.total_frames == 0 {
            return 0.0;
        }
        session.current_frame as f64 / session.total_frames as f64
    }

    pub fn is_loaded(&self) -> bool {
        self.shared.session.lock().is_loaded()
    }

    pub fn is_paused(&self) -> bool {
        !self.shared.unpaused.is_set()
    }

    /// True while a stream task holds the session.
    pub fn is_stream_active(&self) -> bool {
        !self.shared.no_audio_loaded.is_set()
    }

    pub fn status(&self) -> PlaybackStatus {
        if !self.is_stream_active() {
            PlaybackStatus::Stopped
        } else if self.is_paused() {
            PlaybackStatus::Paused
        } else {
            PlaybackStatus::Playing
        }
    }

    /// Number of streams that ended by reaching the end of their file.
    ///
    /// Bumped before the session resets, so once a stream is no longer
    /// active a natural end is already counted.
    pub fn completed_streams(&self) -> u64 {
        self.shared.completed.load(Ordering::Acquire)
    }

    /// Block until no stream is active or `timeout` elapses. Returns true if idle.
    pub fn wait_until_idle(&self, timeout: Duration) -> bool {
        self.shared.no_audio_loaded.wait_timeout(timeout)
    }
}

impl Drop for AudioPlayer {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Resets the session and releases the next start when the stream task ends,
/// however it ends.
struct StreamCleanup<'a> {
    shared: &'a Shared,
}

impl Drop for StreamCleanup<'_> {
    fn drop(&mut self) {
        self.shared.session.lock().unload();
        self.shared.no_audio_loaded.set();
    }
}

fn open_stream(
    shared: &Arc<Shared>,
    device: &dyn OutputDevice,
    path: &Path,
    config: &PlayerConfig,
) -> Result<(StreamingNormalizer, Box<dyn OutputSink>)> {
    let source = decoder::open_source(path)?;
    let sink = device.open(source.channels(), source.sample_rate(), config.chunk_size)?;

    {
        let mut session = shared.session.lock();
        session.sample_rate = source.sample_rate();
        session.channel_count = source.channels();
        session.total_frames = source.frames();
        session.current_frame = 0;
        session.display = None;
    }

    let normalizer = StreamingNormalizer::new(Arc::clone(shared), source, config);
    Ok((normalizer, sink))
}

/// Body of the stream thread: open, pump chunks into the device until the
/// file ends or a stop is requested, then close.
fn run_stream(
    shared: &Arc<Shared>,
    device: &dyn OutputDevice,
    path: &Path,
    config: &PlayerConfig,
    ready: Sender<Result<()>>,
) {
    let _cleanup = StreamCleanup { shared };

    let (mut normalizer, mut sink) = match open_stream(shared, device, path, config) {
        Ok(parts) => parts,
        Err(e) => {
            log::error!("Failed to start {}: {e}", path.display());
            let _ = ready.send(Err(e));
            return;
        }
    };
    let _ = ready.send(Ok(()));

    let drain = loop {
        match normalizer.next_chunk(config.chunk_size) {
            Ok(ChunkOutcome::Continue(chunk)) => {
                if let Err(e) = sink.write(chunk) {
                    log::error!("Output failed for {}: {e}", path.display());
                    break false;
                }
            }
            Ok(ChunkOutcome::Complete) => break !shared.stopped.is_set(),
            Err(e) => {
                log::error!("Reading {} failed: {e}", path.display());
                break false;
            }
        }
    };

    sink.finish(drain);
    if drain {
        shared.completed.fetch_add(1, Ordering::Release);
    }
    log::debug!(
        "Stream for {} closed ({})",
        path.display(),
        if drain { "end of file" } else { "stopped" }
    );
}
