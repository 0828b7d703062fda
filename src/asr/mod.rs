pub mod client;
pub mod task;

pub use client::{assemble_cues, TranscriptionClient};
pub use task::{SubmittedTask, TaskOutput, TaskStatus};
