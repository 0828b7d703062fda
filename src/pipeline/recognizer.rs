use std::path::Path;

use async_trait::async_trait;

use crate::asr::TranscriptionClient;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::models::Cue;
use crate::oss::OssClient;

#[async_trait]
pub trait SpeechRecognizer: Send + Sync {
    async fn recognize(&self, audio: &Path) -> Result<Vec<Cue>>;
    fn model(&self) -> &str;
}

/// Uploads the audio to object storage, transcribes the public URL and
/// removes the upload again.
pub struct CloudRecognizer {
    oss: OssClient,
    asr: TranscriptionClient,
}

impl CloudRecognizer {
    pub fn new(oss: OssClient, asr: TranscriptionClient) -> Self {
        Self { oss, asr }
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self::new(
            OssClient::new(&config.file_upload)?,
            TranscriptionClient::new(config)?,
        ))
    }
}

#[async_trait]
impl SpeechRecognizer for CloudRecognizer {
    async fn recognize(&self, audio: &Path) -> Result<Vec<Cue>> {
        let uploaded = self.oss.upload_file(audio).await?;
        if uploaded.url.trim().is_empty() {
            return Err(Error::ObjectStore(
                "upload succeeded but produced no file URL".to_string(),
            ));
        }

        let result = self.asr.transcribe_url(&uploaded.url).await;

        if self.oss.delete_uploaded(&uploaded).await {
            tracing::debug!("Removed {} from OSS", uploaded.key);
        }

        result
    }

    fn model(&self) -> &str {
        self.asr.model()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_config_requires_credentials() {
        let mut config = Config::default();
        let err = CloudRecognizer::from_config(&config).err().unwrap();
        assert!(matches!(err, Error::Config(_)));

        config.file_upload.access_key_id = "ak".into();
        config.file_upload.access_key_secret = "sk".into();
        config.speech_recognition.dashscope.api_key = "key".into();
        let recognizer = CloudRecognizer::from_config(&config).unwrap();
        assert_eq!(recognizer.model(), "paraformer-v2");
    }
}
