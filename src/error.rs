use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Object storage error: {0}")]
    ObjectStore(String),

    #[error("Rate limit exceeded, retry after {0} seconds")]
    RateLimited(u64),

    #[error("Server error ({0}): {1}")]
    ServerError(u16, String),

    #[error("LLM API error: {0}")]
    LLMApi(String),

    #[error("Speech recognition error: {0}")]
    Transcription(String),

    #[error("FFmpeg error: {0}")]
    FFmpeg(String),

    #[error("Operation timed out after {0} seconds")]
    Timeout(u64),

    #[error("Failed to parse response: {0}")]
    ParseError(String),

    #[error("Invalid subtitle file: {0}")]
    InvalidSubtitle(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Unsupported file: {0}")]
    UnsupportedFile(String),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Invalid header value: {0}")]
    InvalidHeader(#[from] reqwest::header::InvalidHeaderValue),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::RateLimited(_) | Error::ServerError(..) | Error::Network(_)
        )
    }

    pub fn hint(&self) -> Option<&'static str> {
        match self {
            Error::Config(msg) if msg.contains("API key") => Some(
                "Set the key in config.yaml (speech_recognition.dashscope.api_key / \
                 translation.dashscope.api_key) or export DASHSCOPE_API_KEY",
            ),
            Error::Config(msg) if msg.contains("OSS") => Some(
                "Check the file_upload section of config.yaml or the OSS_* environment variables",
            ),
            Error::ObjectStore(_) => Some(
                "Check the network connection, the OSS endpoint and bucket, and that the credentials are valid",
            ),
            Error::InvalidSubtitle(_) => Some("Make sure the input is a valid SRT subtitle file"),
            Error::FFmpeg(msg) if msg.contains("not found") => Some(
                "Install FFmpeg or point ffmpeg.path in config.yaml at the executable",
            ),
            _ => None,
        }
    }
}
