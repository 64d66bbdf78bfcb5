mod process_audio;

pub use process_audio::*;
