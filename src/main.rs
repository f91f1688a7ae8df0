use std::fs::File;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use simplelog::{ColorChoice, Config, LevelFilter, TermLogger, TerminalMode, WriteLogger};

use normplay::{app, AudioPlayer, PlayerConfig};

#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, ValueEnum, Debug)]
#[value(rename_all = "lower")]
enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<LogLevel> for LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Error => LevelFilter::Error,
            LogLevel::Warn => LevelFilter::Warn,
            LogLevel::Info => LevelFilter::Info,
            LogLevel::Debug => LevelFilter::Debug,
            LogLevel::Trace => LevelFilter::Trace,
        }
    }
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Streaming audio player with adaptive loudness normalization")]
struct Args {
    /// Audio files to queue; playback starts with the first
    #[arg(value_name = "FILE")]
    files: Vec<PathBuf>,

    /// TOML file with player and normalization settings
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Frames per chunk requested from the output device
    #[arg(long, value_name = "FRAMES")]
    chunk_size: Option<usize>,

    /// Initial volume between 0.0 and 1.0
    #[arg(long)]
    volume: Option<f32>,

    /// Set the application log level
    #[arg(long, value_name = "LEVEL", default_value = "warn")]
    log_level: LogLevel,

    /// Write the log to this file instead of the terminal
    #[arg(long, value_name = "PATH")]
    log_file: Option<PathBuf>,
}

fn init_logging(args: &Args) -> Result<()> {
    let level = LevelFilter::from(args.log_level);
    match &args.log_file {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("Failed to create log file {}", path.display()))?;
            WriteLogger::init(level, Config::default(), file)?;
        }
        None => TermLogger::init(
            level,
            Config::default(),
            TerminalMode::Stderr,
            ColorChoice::Auto,
        )?,
    }
    Ok(())
}

fn load_config(args: &Args) -> Result<PlayerConfig> {
    let mut config = match &args.config {
        Some(path) => PlayerConfig::load(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => PlayerConfig::default(),
    };
    if let Some(chunk_size) = args.chunk_size {
        config.chunk_size = chunk_size;
    }
    if let Some(volume) = args.volume {
        config.volume = volume;
    }
    Ok(config.validated()?)
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(&args)?;

    let config = load_config(&args)?;
    log::info!("Starting with {config:?}");

    let player = AudioPlayer::new(config);
    app::run(&player, &args.files).context("Player session failed")?;
    Ok(())
}
