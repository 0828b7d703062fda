use serde::{Deserialize, Serialize};

/// One numbered SRT block. Times are milliseconds from the start of the media.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cue {
    pub index: u32,
    pub start_ms: u64,
    pub end_ms: u64,
    pub text: String,
}

impl Cue {
    pub fn new(index: u32, start_ms: u64, end_ms: u64, text: impl Into<String>) -> Self {
        Self {
            index,
            start_ms,
            end_ms,
            text: text.into(),
        }
    }

    pub fn with_text(&self, text: impl Into<String>) -> Self {
        Self {
            index: self.index,
            start_ms: self.start_ms,
            end_ms: self.end_ms,
            text: text.into(),
        }
    }

    pub fn char_len(&self) -> usize {
        self.text.chars().count()
    }
}
