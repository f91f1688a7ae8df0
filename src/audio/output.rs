use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use crossbeam_channel::{Receiver, SendTimeoutError, Sender, TryRecvError};

use crate::error::{Error, Result};

/// Chunks queued between the stream task and the device callback.
const QUEUE_CHUNKS: usize = 2;
/// How long a write may wait on a device that consumes nothing.
const STALL_TIMEOUT: Duration = Duration::from_secs(2);

/// Something that can open an output stream for a given format.
pub trait OutputDevice: Send + Sync {
    /// Open and start a stream of `channels` interleaved f32 at `sample_rate`,
    /// asking the device for `chunk_size` frames per period.
    fn open(&self, channels: u16, sample_rate: u32, chunk_size: usize)
        -> Result<Box<dyn OutputSink>>;
}

/// A running output stream, owned by the stream task.
pub trait OutputSink {
    /// Queue one chunk of interleaved samples. Blocks while the device is
    /// behind, which paces the producer at the device rate.
    fn write(&mut self, samples: Vec<f32>) -> Result<()>;

    /// Stop and close the stream. With `drain`, queued audio plays out first.
    fn finish(self: Box<Self>, drain: bool);
}

/// The host's default output device.
pub struct CpalDevice;

impl OutputDevice for CpalDevice {
    fn open(
        &self,
        channels: u16,
        sample_rate: u32,
        chunk_size: usize,
    ) -> Result<Box<dyn OutputSink>> {
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or_else(|| Error::OutputDevice("No audio output device found".into()))?;

        let fixed = cpal::StreamConfig {
            channels,
            sample_rate,
            buffer_size: cpal::BufferSize::Fixed(chunk_size as u32),
        };
        let sink = match CpalSink::build(&device, &fixed, chunk_size) {
            Ok(sink) => sink,
            Err(e) => {
                log::warn!("Fixed buffer of {chunk_size} frames rejected ({e}), using device default");
                let config = cpal::StreamConfig {
                    buffer_size: cpal::BufferSize::Default,
                    ..fixed
                };
                CpalSink::build(&device, &config, chunk_size)?
            }
        };

        log::debug!("Opened output stream: {channels} ch @ {sample_rate} Hz");
        Ok(Box::new(sink))
    }
}

/// Plays queued chunks from the cpal callback.
struct CpalSink {
    stream: cpal::Stream,
    tx: Sender<Vec<f32>>,
    failed: Arc<AtomicBool>,
    drained: Receiver<()>,
    chunk_duration: Duration,
}

impl CpalSink {
    fn build(device: &cpal::Device, config: &cpal::StreamConfig, chunk_size: usize) -> Result<Self> {
        let (tx, rx) = crossbeam_channel::bounded::<Vec<f32>>(QUEUE_CHUNKS);
        let (drained_tx, drained) = crossbeam_channel::bounded::<()>(1);
        let failed = Arc::new(AtomicBool::new(false));
        let failed_cb = Arc::clone(&failed);

        let mut current: Vec<f32> = Vec::new();
        let mut pos = 0;

        let stream = device
            .build_output_stream(
                config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    let mut written = 0;
                    while written < data.len() {
                        if pos >= current.len() {
                            match rx.try_recv() {
                                Ok(chunk) => {
                                    current = chunk;
                                    pos = 0;
                                    continue;
                                }
                                Err(TryRecvError::Empty) => break,
                                Err(TryRecvError::Disconnected) => {
                                    let _ = drained_tx.try_send(());
                                    break;
                                }
                            }
                        }
                        let n = (current.len() - pos).min(data.len() - written);
                        data[written..written + n].copy_from_slice(&current[pos..pos + n]);
                        written += n;
                        pos += n;
                    }
                    data[written..].fill(0.0);
                },
                move |err| {
                    log::error!("Audio stream error: {err}");
                    failed_cb.store(true, Ordering::SeqCst);
                },
                None,
            )
            .map_err(|e| Error::OutputDevice(format!("Failed to build output stream: {e}")))?;

        stream
            .play()
            .map_err(|e| Error::OutputDevice(format!("Failed to start stream: {e}")))?;

        let rate = config.sample_rate.max(1) as u64;
        Ok(Self {
            stream,
            tx,
            failed,
            drained,
            chunk_duration: Duration::from_micros(chunk_size as u64 * 1_000_000 / rate),
        })
    }
}

impl OutputSink for CpalSink {
    fn write(&mut self, samples: Vec<f32>) -> Result<()> {
        let mut pending = samples;
        let mut waited = Duration::ZERO;
        let step = self.chunk_duration.max(Duration::from_millis(5));
        loop {
            if self.failed.load(Ordering::SeqCst) {
                return Err(Error::OutputDevice("Device reported an error".into()));
            }
            match self.tx.send_timeout(pending, step) {
                Ok(()) => return Ok(()),
                Err(SendTimeoutError::Timeout(chunk)) => {
                    waited += step;
                    if waited >= STALL_TIMEOUT {
                        return Err(Error::OutputDevice("Device stopped consuming audio".into()));
                    }
                    pending = chunk;
                }
                Err(SendTimeoutError::Disconnected(_)) => {
                    return Err(Error::OutputDevice("Device callback is gone".into()));
                }
            }
        }
    }

    fn finish(self: Box<Self>, drain: bool) {
        let CpalSink {
            stream,
            tx,
            failed,
            drained,
            chunk_duration,
        } = *self;
        drop(tx);
        if drain && !failed.load(Ordering::SeqCst) {
            let budget = chunk_duration * (QUEUE_CHUNKS as u32 + 2) + Duration::from_millis(50);
            if drained.recv_timeout(budget).is_err() {
                log::debug!("Output did not drain within {budget:?}");
            }
        }
        if let Err(e) = stream.pause() {
            log::debug!("Failed to pause stream on close: {e}");
        }
    }
}
