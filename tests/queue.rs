mod common;

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use common::{write_counter_wav, write_sine_wav, RecordingDevice};
use normplay::app::{App, Command};
use normplay::{AudioPlayer, PlayerConfig};

const IDLE_TIMEOUT: Duration = Duration::from_secs(10);

fn config() -> PlayerConfig {
    PlayerConfig {
        chunk_size: 500,
        ..PlayerConfig::default()
    }
}

#[test]
fn queued_files_play_back_to_back() {
    let dir = tempfile::tempdir().unwrap();
    let first = write_counter_wav(&dir, "first.wav", 3_000);
    let second = write_sine_wav(&dir, "second.wav", 2_000, 2, 22_050, 440.0);
    let device = RecordingDevice::instant();
    let player = AudioPlayer::with_device(config(), Arc::new(device.clone()));
    let mut app = App::new(&player, vec![first.clone(), second.clone()]);

    app.play_queue().unwrap();
    assert!(player.wait_until_idle(IDLE_TIMEOUT));
    assert_eq!(player.completed_streams(), 1);

    assert!(app.poll_track_end().unwrap());
    assert_eq!(app.playlist().current(), Some(second.as_path()));
    assert!(player.wait_until_idle(IDLE_TIMEOUT));

    let rates: Vec<u32> = device.opened.lock().iter().map(|o| o.sample_rate).collect();
    assert_eq!(rates, vec![8_000, 22_050]);
    assert_eq!(device.finished.lock().clone(), vec![true, true]);
    assert_eq!(device.samples().len(), 3_000 + 2_000 * 2);
}

#[test]
fn stopping_does_not_advance_the_queue() {
    let dir = tempfile::tempdir().unwrap();
    let first = write_sine_wav(&dir, "long.wav", 40_000, 1, 8_000, 220.0);
    let second = write_sine_wav(&dir, "next.wav", 1_000, 1, 8_000, 440.0);
    let device = RecordingDevice::paced();
    let player = AudioPlayer::with_device(config(), Arc::new(device.clone()));
    let mut app = App::new(&player, vec![first.clone(), second]);

    app.play_queue().unwrap();
    thread::sleep(Duration::from_millis(50));
    app.update(Command::Stop, &mut Vec::new()).unwrap();

    assert!(!player.is_stream_active());
    assert!(!app.poll_track_end().unwrap());
    assert_eq!(player.completed_streams(), 0);
    assert_eq!(app.playlist().current(), Some(first.as_path()));
    assert_eq!(device.opened.lock().len(), 1);
    assert_eq!(device.finished.lock().clone(), vec![false]);
}

#[test]
fn next_and_load_move_through_the_queue() {
    let dir = tempfile::tempdir().unwrap();
    let first = write_sine_wav(&dir, "a.wav", 1_000, 1, 8_000, 440.0);
    let second = write_sine_wav(&dir, "b.wav", 1_000, 1, 8_000, 330.0);
    let extra = write_sine_wav(&dir, "c.wav", 1_000, 1, 8_000, 550.0);
    let device = RecordingDevice::instant();
    let player = AudioPlayer::with_device(config(), Arc::new(device.clone()));
    let mut app = App::new(&player, vec![first.clone(), second.clone()]);
    let mut out = Vec::new();

    app.play_queue().unwrap();
    assert!(player.wait_until_idle(IDLE_TIMEOUT));

    // Shuffled with two entries, the only other choice is the second file.
    app.update(Command::Shuffle(true), &mut out).unwrap();
    app.update(Command::Next, &mut out).unwrap();
    assert_eq!(app.playlist().current(), Some(second.as_path()));
    assert!(player.wait_until_idle(IDLE_TIMEOUT));

    app.update(Command::Load(extra.clone()), &mut out).unwrap();
    assert_eq!(app.playlist().len(), 3);
    assert_eq!(app.playlist().current(), Some(extra.as_path()));
    assert!(player.wait_until_idle(IDLE_TIMEOUT));

    app.update(Command::Queue, &mut out).unwrap();
    let listing = String::from_utf8(out).unwrap();
    assert!(listing.contains(">   3"));
    assert_eq!(device.opened.lock().len(), 3);
}
