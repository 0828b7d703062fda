pub mod srt;
pub mod transcript;

pub use srt::{format_timestamp, parse_srt, parse_timestamp, read_srt_file, renumber, write_srt, write_srt_file};
pub use transcript::{cues_from_transcription, no_speech_cue};
