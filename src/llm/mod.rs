pub mod provider;
pub mod dashscope;
pub mod prompts;
pub mod parser;
pub mod batcher;
pub mod rate_limiter;

pub use provider::{LLMProvider, TextStream};
pub use dashscope::DashScopeProvider;
pub use prompts::{ChatMessage, CompletionRequest, TranslationOptions, TranslationRequest};
pub use parser::parse_translated_batch;
pub use batcher::SubtitleBatcher;
pub use rate_limiter::RateLimiter;
