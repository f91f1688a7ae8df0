use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::time::Duration;

use crossbeam_channel::RecvTimeoutError;

use crate::audio::types::PlaybackStatus;
use crate::audio::AudioPlayer;
use crate::display;
use crate::error::{Error, Result};
use crate::playlist::Playlist;

const METER_WIDTH: usize = 48;

/// How often the prompt loop checks for a finished track.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// A command typed at the prompt.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Load(PathBuf),
    Resume,
    Pause,
    Toggle,
    Stop,
    Restart,
    Next,
    Shuffle(bool),
    Queue,
    /// Fraction of the file in `[0, 1]`.
    Seek(f64),
    /// Absolute frame index.
    SeekFrame(u64),
    Volume(f32),
    Visualizer(bool),
    Status,
    Help,
    Quit,
}

/// Parse one input line. An empty line toggles pause.
pub fn parse_command(line: &str) -> std::result::Result<Command, String> {
    let line = line.trim();
    let (word, arg) = match line.split_once(char::is_whitespace) {
        Some((w, a)) => (w, a.trim()),
        None => (line, ""),
    };

    let number = |what: &str| -> std::result::Result<f64, String> {
        arg.parse::<f64>()
            .map_err(|_| format!("{what} needs a number, got {arg:?}"))
    };

    match word {
        "" | "toggle" | "t" => Ok(Command::Toggle),
        "load" | "l" if !arg.is_empty() => Ok(Command::Load(PathBuf::from(arg))),
        "load" | "l" => Err("load needs a file path".into()),
        "play" | "resume" => Ok(Command::Resume),
        "pause" => Ok(Command::Pause),
        "stop" => Ok(Command::Stop),
        "restart" => Ok(Command::Restart),
        "next" | "n" => Ok(Command::Next),
        "shuffle" => match arg {
            "on" => Ok(Command::Shuffle(true)),
            "off" => Ok(Command::Shuffle(false)),
            _ => Err("shuffle takes on or off".into()),
        },
        "queue" | "ls" => Ok(Command::Queue),
        "seek" => Ok(Command::Seek(number("seek")?)),
        "frame" => {
            let frame = number("frame")?;
            if frame < 0.0 {
                return Err("frame must not be negative".into());
            }
            Ok(Command::SeekFrame(frame as u64))
        }
        "vol" | "volume" => Ok(Command::Volume(number("vol")? as f32)),
        "viz" => match arg {
            "on" => Ok(Command::Visualizer(true)),
            "off" => Ok(Command::Visualizer(false)),
            _ => Err("viz takes on or off".into()),
        },
        "status" | "s" => Ok(Command::Status),
        "help" | "?" => Ok(Command::Help),
        "quit" | "q" | "exit" => Ok(Command::Quit),
        other => Err(format!("Unknown command {other:?}, try help")),
    }
}

/// The prompt session: a player plus its play queue.
pub struct App<'a> {
    player: &'a AudioPlayer,
    playlist: Playlist,
    seen_completed: u64,
}

impl<'a> App<'a> {
    pub fn new(player: &'a AudioPlayer, files: Vec<PathBuf>) -> Self {
        Self {
            player,
            playlist: Playlist::new(files),
            seen_completed: player.completed_streams(),
        }
    }

    pub fn playlist(&self) -> &Playlist {
        &self.playlist
    }

    /// Start the current queue entry, or the first one.
    pub fn play_queue(&mut self) -> Result<()> {
        let path = self
            .playlist
            .current_or_first()
            .map(|p| p.to_path_buf())
            .ok_or_else(|| Error::Stream("The queue is empty".into()))?;
        self.player.start(Some(&path))
    }

    /// Advance the queue and start the new entry. Returns false when the
    /// queue has nothing to move to.
    pub fn play_next(&mut self) -> Result<bool> {
        let Some(path) = self.playlist.advance().map(|p| p.to_path_buf()) else {
            return Ok(false);
        };
        self.player.start(Some(&path))?;
        Ok(true)
    }

    /// Start the next entry if the last stream ran to the end of its file.
    ///
    /// A stopped stream or one already replaced by a new start is left alone.
    pub fn poll_track_end(&mut self) -> Result<bool> {
        let completed = self.player.completed_streams();
        if completed == self.seen_completed {
            return Ok(false);
        }
        self.seen_completed = completed;
        if self.player.is_stream_active() {
            return Ok(false);
        }
        log::debug!("Track finished, advancing the queue");
        self.play_next()
    }

    /// Apply a command. Returns false when the session should end.
    pub fn update(&mut self, command: Command, out: &mut impl Write) -> Result<bool> {
        let player = self.player;
        match command {
            Command::Load(path) => {
                let path = self.playlist.select(&path).to_path_buf();
                player.start(Some(&path))?;
            }
            Command::Resume => player.unpause(),
            Command::Pause => player.pause(),
            Command::Toggle => player.toggle_pause(),
            Command::Stop => player.stop(),
            Command::Restart => player.start(None)?,
            Command::Next => {
                if !self.play_next()? {
                    writeln!(out, "Nothing else queued")?;
                }
            }
            Command::Shuffle(on) => self.playlist.set_shuffle(on),
            Command::Queue => write_queue(&self.playlist, out)?,
            Command::Seek(fraction) => player.seek(fraction, true),
            Command::SeekFrame(frame) => player.seek(frame as f64, false),
            Command::Volume(v) => player.set_volume(v),
            Command::Visualizer(on) => player.set_visualizer_visible(on),
            Command::Status => writeln!(out, "{}", status_line(player, &self.playlist))?,
            Command::Help => writeln!(out, "{HELP}")?,
            Command::Quit => return Ok(false),
        }
        Ok(true)
    }
}

const HELP: &str = "\
load <path>   play a file            restart      replay the last file
play | pause  resume or pause        <enter>      toggle pause
stop          stop playback          next         skip to the next file
seek <0..1>   jump to a fraction     frame <n>    jump to a frame
vol <0..1>    set volume             shuffle on|off
viz on|off    level meter feed       queue        list queued files
status        show position          quit";

fn write_queue(playlist: &Playlist, out: &mut impl Write) -> io::Result<()> {
    if playlist.is_empty() {
        return writeln!(out, "Queue is empty");
    }
    for (i, track) in playlist.tracks().iter().enumerate() {
        let marker = if playlist.current_index() == Some(i) { '>' } else { ' ' };
        writeln!(out, "{marker} {:>3}  {}", i + 1, track.display())?;
    }
    Ok(())
}

fn format_time(seconds: f64) -> String {
    let total_secs = seconds as u64;
    format!("{}:{:02}", total_secs / 60, total_secs % 60)
}

/// One-line summary of the player: state, position, volume, queue and level meter.
pub fn status_line(player: &AudioPlayer, playlist: &Playlist) -> String {
    let state = match player.status() {
        PlaybackStatus::Stopped => "stopped",
        PlaybackStatus::Playing => "playing",
        PlaybackStatus::Paused => "paused",
    };
    let rate = player.sample_rate();
    let (pos, dur) = if rate > 0 {
        (
            player.current_frame() as f64 / rate as f64,
            player.total_frames() as f64 / rate as f64,
        )
    } else {
        (0.0, 0.0)
    };
    let name = player
        .audio_path()
        .and_then(|p| p.file_name().map(|n| n.to_string_lossy().into_owned()))
        .unwrap_or_else(|| "-".into());

    let mut line = format!(
        "[{state}] {name} {} / {} ({:.0}%) vol {:.0}%",
        format_time(pos),
        format_time(dur),
        player.progress() * 100.0,
        player.volume() * 100.0
    );
    if let Some(i) = playlist.current_index() {
        line.push_str(&format!(" #{}/{}", i + 1, playlist.len()));
    }
    if playlist.is_shuffled() {
        line.push_str(" shuffle");
    }
    if let Some(frames) = player.get_display_frames() {
        line.push_str(" |");
        line.push_str(&display::level_meter(&frames, METER_WIDTH));
        line.push('|');
    }
    line
}

/// Read commands from stdin until `quit` or end of input, advancing the
/// queue whenever a file plays to its end.
pub fn run(player: &AudioPlayer, files: &[PathBuf]) -> Result<()> {
    let stdout = io::stdout();
    let mut out = stdout.lock();
    let mut app = App::new(player, files.to_vec());

    if !app.playlist().is_empty() {
        if let Err(e) = app.play_queue() {
            writeln!(out, "Could not play queue: {e}")?;
        }
    }
    writeln!(out, "Type help for commands.")?;
    out.flush()?;

    let (line_tx, line_rx) = crossbeam_channel::unbounded();
    std::thread::Builder::new()
        .name("stdin".into())
        .spawn(move || {
            for line in io::stdin().lock().lines() {
                if line_tx.send(line).is_err() {
                    break;
                }
            }
        })?;

    loop {
        match line_rx.recv_timeout(POLL_INTERVAL) {
            Ok(line) => match parse_command(&line?) {
                Ok(command) => match app.update(command, &mut out) {
                    Ok(true) => {}
                    Ok(false) => break,
                    Err(e) => writeln!(out, "Error: {e}")?,
                },
                Err(msg) => writeln!(out, "{msg}")?,
            },
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }
        if let Err(e) = app.poll_track_end() {
            writeln!(out, "Could not play next file: {e}")?;
        }
        out.flush()?;
    }

    player.stop();
    Ok(())
}
