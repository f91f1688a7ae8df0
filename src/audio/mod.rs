pub mod decoder;
pub mod loudness;
pub mod normalizer;
pub mod output;
pub mod player;
pub mod signal;
pub mod source;
pub mod types;

pub use player::AudioPlayer;
