pub mod executor;
pub mod recognizer;
pub mod translator;

pub use executor::SubtitlePipeline;
pub use recognizer::{CloudRecognizer, SpeechRecognizer};
pub use translator::SubtitleTranslator;
