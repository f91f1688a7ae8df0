use thiserror::Error;

/// Errors surfaced by the playback engine.
#[derive(Error, Debug)]
pub enum Error {
    /// The file could not be decoded.
    #[error("Decode error: {0}")]
    Decode(String),

    /// The container was probed but holds nothing we can play.
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("No playable audio track in {0}")]
    NoTrack(String),

    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Symphonia error: {0}")]
    Symphonia(#[from] symphonia::core::errors::Error),

    /// Opening, starting or feeding the output device failed.
    #[error("Audio output error: {0}")]
    OutputDevice(String),

    #[error("Configuration error: {0}")]
    Config(String),

    /// The stream task could not be started or died before reporting.
    #[error("Stream error: {0}")]
    Stream(String),
}

pub type Result<T> = std::result::Result<T, Error>;
