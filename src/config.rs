use serde::Deserialize;
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Error, Result};

const DEFAULT_CONFIG_FILE: &str = "config.yaml";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub application: ApplicationConfig,
    pub file_upload: OssConfig,
    pub speech_recognition: SpeechRecognitionConfig,
    pub translation: TranslationConfig,
    pub dashscope: DashScopeConfig,
    pub ffmpeg: FFmpegConfig,
    pub storage: StorageConfig,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ApplicationConfig {
    pub debug_mode: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OssConfig {
    pub access_key_id: String,
    pub access_key_secret: String,
    pub endpoint: String,
    pub region: Option<String>,
    pub bucket_name: String,
    pub object_key_prefix: String,
    pub use_https: bool,
    /// `endpoint/bucket/key` instead of `bucket.endpoint/key`.
    pub path_style: bool,
    /// Milliseconds.
    pub connection_timeout: u64,
    /// Milliseconds.
    pub socket_timeout: u64,
    pub max_connections: usize,
    pub multipart_threshold: u64,
    pub part_size: u64,
    pub upload_concurrency: usize,
    pub max_retries: u32,
    pub presign_expiry_secs: Option<u64>,
}

impl Default for OssConfig {
    fn default() -> Self {
        Self {
            access_key_id: String::new(),
            access_key_secret: String::new(),
            endpoint: "https://oss-cn-hangzhou.aliyuncs.com".to_string(),
            region: None,
            bucket_name: String::new(),
            object_key_prefix: "uploads/".to_string(),
            use_https: true,
            path_style: false,
            connection_timeout: 30_000,
            socket_timeout: 60_000,
            max_connections: 100,
            multipart_threshold: 32 * 1024 * 1024,
            part_size: 8 * 1024 * 1024,
            upload_concurrency: 4,
            max_retries: 3,
            presign_expiry_secs: None,
        }
    }
}

impl OssConfig {
    pub fn validate(&self) -> Result<()> {
        if self.access_key_id.trim().is_empty() || self.access_key_secret.trim().is_empty() {
            return Err(Error::Config(
                "OSS access key id or access key secret is not configured".to_string(),
            ));
        }
        if self.endpoint.trim().is_empty() {
            return Err(Error::Config("OSS endpoint is not configured".to_string()));
        }
        Ok(())
    }

    pub fn require_bucket(&self) -> Result<&str> {
        let bucket = self.bucket_name.trim();
        if bucket.is_empty() {
            return Err(Error::Config("OSS bucket name is not configured".to_string()));
        }
        Ok(bucket)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connection_timeout)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.socket_timeout)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SpeechRecognitionConfig {
    pub dashscope: SpeechDashScopeConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SpeechDashScopeConfig {
    pub api_key: String,
    pub model: String,
    pub language_hints: Vec<String>,
    pub poll_interval_ms: u64,
    pub timeout_secs: u64,
}

impl Default for SpeechDashScopeConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            model: "paraformer-v2".to_string(),
            language_hints: vec!["zh".to_string(), "ja".to_string(), "en".to_string()],
            poll_interval_ms: 2_000,
            timeout_secs: 1_800,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct TranslationConfig {
    pub dashscope: TranslationDashScopeConfig,
    pub default_languages: DefaultLanguages,
    pub supported_languages: Vec<LanguageEntry>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TranslationDashScopeConfig {
    pub api_key: String,
    pub model: String,
    pub batch_size: usize,
    /// Milliseconds between two batch calls.
    pub api_delay: u64,
    pub max_batch_chars: usize,
}

impl Default for TranslationDashScopeConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            model: "qwen-mt-plus".to_string(),
            batch_size: 10,
            api_delay: 1_000,
            max_batch_chars: 6_000,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DefaultLanguages {
    pub source_lang: String,
    pub target_lang: String,
}

impl Default for DefaultLanguages {
    fn default() -> Self {
        Self {
            source_lang: "Chinese".to_string(),
            target_lang: "English".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct LanguageEntry {
    pub name: String,
    pub code: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DashScopeConfig {
    pub base_url: String,
    pub max_retries: u32,
    /// Minimum spacing between generation calls, in milliseconds.
    pub min_interval_ms: u64,
}

impl Default for DashScopeConfig {
    fn default() -> Self {
        Self {
            base_url: "https://dashscope.aliyuncs.com".to_string(),
            max_retries: 3,
            min_interval_ms: 0,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct FFmpegConfig {
    pub path: Option<PathBuf>,
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub database_path: String,
    pub history: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: "y7converter.db".to_string(),
            history: true,
        }
    }
}

impl Config {
    /// Loads the YAML config and applies environment overrides.
    ///
    /// An explicit `path` must exist. Otherwise `Y7_CONFIG` and then
    /// `./config.yaml` are tried, falling back to built-in defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match Self::resolve_path(path)? {
            Some(path) => {
                tracing::debug!("Loading configuration from {}", path.display());
                let text = std::fs::read_to_string(&path).map_err(|e| {
                    Error::Config(format!("Failed to read {}: {}", path.display(), e))
                })?;
                Self::from_yaml_str(&text)?
            }
            None => {
                tracing::warn!("No config.yaml found, using defaults and environment variables");
                Self::default()
            }
        };

        config.apply_env_with(|key| env::var(key).ok());
        Ok(config)
    }

    pub fn from_yaml_str(text: &str) -> Result<Self> {
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(text)?)
    }

    fn resolve_path(path: Option<&Path>) -> Result<Option<PathBuf>> {
        if let Some(path) = path {
            if !path.is_file() {
                return Err(Error::Config(format!(
                    "Config file {} not found",
                    path.display()
                )));
            }
            return Ok(Some(path.to_path_buf()));
        }

        if let Ok(from_env) = env::var("Y7_CONFIG") {
            let candidate = PathBuf::from(from_env);
            if candidate.is_file() {
                return Ok(Some(candidate));
            }
            tracing::warn!("Y7_CONFIG points to missing file {}", candidate.display());
        }

        let default = PathBuf::from(DEFAULT_CONFIG_FILE);
        Ok(default.is_file().then_some(default))
    }

    pub fn apply_env_with<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(key) = non_empty("DASHSCOPE_API_KEY") {
            if self.speech_recognition.dashscope.api_key.trim().is_empty() {
                self.speech_recognition.dashscope.api_key = key.clone();
            }
            if self.translation.dashscope.api_key.trim().is_empty() {
                self.translation.dashscope.api_key = key;
            }
        }

        if let Some(v) = non_empty("OSS_ACCESS_KEY_ID") {
            self.file_upload.access_key_id = v;
        }
        if let Some(v) = non_empty("OSS_ACCESS_KEY_SECRET") {
            self.file_upload.access_key_secret = v;
        }
        if let Some(v) = non_empty("OSS_BUCKET") {
            self.file_upload.bucket_name = v;
        }
        if let Some(v) = non_empty("OSS_ENDPOINT") {
            self.file_upload.endpoint = v;
        }
    }

    pub fn speech_api_key(&self) -> Option<&str> {
        non_blank(&self.speech_recognition.dashscope.api_key)
    }

    pub fn translation_api_key(&self) -> Option<&str> {
        non_blank(&self.translation.dashscope.api_key)
    }

    pub fn is_debug(&self) -> bool {
        self.application.debug_mode
    }
}

fn non_blank(value: &str) -> Option<&str> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then_some(trimmed)
}

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub source_lang: String,
    pub target_lang: String,
    pub batch_size: usize,
    pub max_batch_chars: usize,
    pub api_delay: Duration,
    pub translation_model: String,
    pub speech_model: String,
    pub use_transcript_cache: bool,
}

impl From<&Config> for PipelineConfig {
    fn from(config: &Config) -> Self {
        Self {
            source_lang: config.translation.default_languages.source_lang.clone(),
            target_lang: config.translation.default_languages.target_lang.clone(),
            batch_size: config.translation.dashscope.batch_size.max(1),
            max_batch_chars: config.translation.dashscope.max_batch_chars,
            api_delay: Duration::from_millis(config.translation.dashscope.api_delay),
            translation_model: config.translation.dashscope.model.clone(),
            speech_model: config.speech_recognition.dashscope.model.clone(),
            use_transcript_cache: config.storage.history,
        }
    }
}
