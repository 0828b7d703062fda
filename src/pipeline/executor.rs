use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;

use crate::config::PipelineConfig;
use crate::error::{Error, Result};
use crate::llm::LLMProvider;
use crate::media::{base_name, content_hash, FFmpeg};
use crate::models::{format_elapsed, Action, Cue, JobRecord, JobResult, JobStatus};
use crate::pipeline::recognizer::SpeechRecognizer;
use crate::pipeline::translator::SubtitleTranslator;
use crate::storage::Storage;
use crate::subtitle::{read_srt_file, write_srt_file};

/// Runs the three file jobs. Every collaborator is optional so a job only
/// needs what it actually touches.
pub struct SubtitlePipeline {
    config: PipelineConfig,
    storage: Option<Storage>,
    ffmpeg: Option<FFmpeg>,
    recognizer: Option<Box<dyn SpeechRecognizer>>,
    translator: Option<SubtitleTranslator>,
}

impl SubtitlePipeline {
    pub fn new(config: PipelineConfig) -> Self {
        Self {
            config,
            storage: None,
            ffmpeg: None,
            recognizer: None,
            translator: None,
        }
    }

    pub fn with_storage(mut self, storage: Storage) -> Self {
        self.storage = Some(storage);
        self
    }

    pub fn with_ffmpeg(mut self, ffmpeg: FFmpeg) -> Self {
        self.ffmpeg = Some(ffmpeg);
        self
    }

    pub fn with_recognizer(mut self, recognizer: impl SpeechRecognizer + 'static) -> Self {
        self.recognizer = Some(Box::new(recognizer));
        self
    }

    pub fn with_translator(mut self, llm: Arc<dyn LLMProvider>, show_progress: bool) -> Self {
        self.translator = Some(SubtitleTranslator::new(llm, &self.config).with_progress(show_progress));
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn storage(&self) -> Option<&Storage> {
        self.storage.as_ref()
    }

    pub async fn execute(&self, action: Action, source: &Path, dest: &Path) -> Result<JobResult> {
        let started = Instant::now();
        tracing::info!("{} started: {}", action.description(), source.display());

        let outcome = self.dispatch(action, source, dest).await;
        let elapsed = started.elapsed();
        let result = match &outcome {
            Ok(output) => JobResult::success(action, dest.to_path_buf(), elapsed, output.clone()),
            Err(e) => JobResult::failure(action, dest.to_path_buf(), elapsed, e),
        };
        self.record(source, &result);

        outcome?;
        tracing::info!(
            "{} finished in {}: {}",
            action.description(),
            format_elapsed(elapsed),
            dest.display()
        );
        Ok(result)
    }

    async fn dispatch(&self, action: Action, source: &Path, dest: &Path) -> Result<String> {
        if !source.is_file() {
            return Err(Error::UnsupportedFile(format!(
                "{} does not exist or is not a file",
                source.display()
            )));
        }
        if same_file(source, dest) {
            return Err(Error::UnsupportedFile(format!(
                "refusing to overwrite the input file {}",
                source.display()
            )));
        }

        match action {
            Action::ExtractAudio => self.extract_audio(source, dest).await,
            Action::GenerateSubtitle => self.generate_subtitle(source, dest).await,
            Action::TranslateSubtitle => self.translate_subtitle(source, dest).await,
        }
    }

    fn ffmpeg(&self) -> Result<&FFmpeg> {
        self.ffmpeg.as_ref().ok_or_else(|| {
            Error::FFmpeg("FFmpeg not found; install it or set ffmpeg.path".to_string())
        })
    }

    async fn extract_audio(&self, source: &Path, dest: &Path) -> Result<String> {
        let output = self.ffmpeg()?.extract_audio(source, dest).await?;
        Ok(output.stderr)
    }

    fn speech_model(&self) -> &str {
        self.recognizer
            .as_ref()
            .map(|r| r.model())
            .unwrap_or(self.config.speech_model.as_str())
    }

    async fn generate_subtitle(&self, source: &Path, dest: &Path) -> Result<String> {
        let cache = self
            .storage
            .as_ref()
            .filter(|_| self.config.use_transcript_cache);

        let hash = match cache {
            Some(_) => Some(content_hash(source).await?),
            None => None,
        };

        if let (Some(storage), Some(hash)) = (cache, hash.as_deref()) {
            if let Some(cues) = storage.cached_transcript(hash, self.speech_model())? {
                tracing::info!("Using cached transcript for {}", source.display());
                write_srt_file(dest, &cues).await?;
                return Ok(format!("{} subtitles (cached)", cues.len()));
            }
        }

        let cues = self.recognize(source).await?;

        if let (Some(storage), Some(hash)) = (cache, hash.as_deref()) {
            if let Err(e) = storage.save_transcript(hash, self.speech_model(), &cues) {
                tracing::warn!("Failed to cache transcript: {}", e);
            }
        }

        write_srt_file(dest, &cues).await?;
        Ok(format!("{} subtitles", cues.len()))
    }

    async fn recognize(&self, source: &Path) -> Result<Vec<Cue>> {
        let ffmpeg = self.ffmpeg()?;
        let recognizer = self.recognizer.as_ref().ok_or_else(|| {
            Error::Config(
                "speech recognition is not configured; check the OSS credentials and the \
                 DashScope API key"
                    .to_string(),
            )
        })?;

        // Removed together with the directory on drop.
        let workdir = tempfile::Builder::new().prefix("y7converter").tempdir()?;
        let audio = workdir.path().join(format!(
            "{}{}",
            base_name(source),
            Action::ExtractAudio.output_suffix()
        ));

        ffmpeg.extract_audio(source, &audio).await?;
        recognizer.recognize(&audio).await
    }

    async fn translate_subtitle(&self, source: &Path, dest: &Path) -> Result<String> {
        let translator = self.translator.as_ref().ok_or_else(|| {
            Error::Config(
                "DashScope translation API key is not configured; set translation.dashscope.api_key \
                 or the DASHSCOPE_API_KEY environment variable"
                    .to_string(),
            )
        })?;

        let cues = read_srt_file(source).await?;
        if cues.is_empty() {
            return Err(Error::InvalidSubtitle(format!(
                "no subtitles found in {}",
                source.display()
            )));
        }

        let translated = translator
            .translate(&cues, &self.config.source_lang, &self.config.target_lang)
            .await?;
        write_srt_file(dest, &translated).await?;
        Ok(format!(
            "{} subtitles translated from {} to {}",
            translated.len(),
            self.config.source_lang,
            self.config.target_lang
        ))
    }

    fn record(&self, source: &Path, result: &JobResult) {
        let Some(storage) = &self.storage else {
            return;
        };

        let (status, message) = if result.is_success() {
            (JobStatus::Succeeded, &result.output)
        } else {
            (JobStatus::Failed, &result.error)
        };
        let record = JobRecord {
            id: None,
            action: result.action,
            source_path: source.display().to_string(),
            dest_path: result.result_file.display().to_string(),
            status,
            processing_ms: result.processing_ms(),
            message: Some(message.clone()),
            created_at: Utc::now(),
        };

        if let Err(e) = storage.record_job(&record) {
            tracing::warn!("Failed to record job history: {}", e);
        }
    }
}

fn same_file(a: &Path, b: &Path) -> bool {
    match (a.canonicalize(), b.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => a == b,
    }
}
