use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TranscriptionDocument {
    #[serde(default)]
    pub file_url: Option<String>,
    #[serde(default)]
    pub transcripts: Vec<Transcript>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Transcript {
    #[serde(default)]
    pub channel_id: Option<u32>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub sentences: Vec<Sentence>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Sentence {
    #[serde(default)]
    pub begin_time: Option<u64>,
    #[serde(default)]
    pub end_time: Option<u64>,
    #[serde(default)]
    pub text: Option<String>,
}
