pub mod config;
pub mod error;
pub mod models;
pub mod retry;
pub mod oss;
pub mod llm;
pub mod asr;
pub mod subtitle;
pub mod media;
pub mod pipeline;
pub mod storage;

#[cfg(test)]
mod testing;

pub use config::{Config, PipelineConfig};
pub use error::{Error, Result};
pub use oss::OssClient;
pub use llm::{DashScopeProvider, LLMProvider};
pub use asr::TranscriptionClient;
pub use media::FFmpeg;
pub use pipeline::{CloudRecognizer, SubtitlePipeline};
pub use storage::Storage;
