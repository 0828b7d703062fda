use std::sync::Arc;
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use tokio::time::{sleep, timeout};

use crate::config::PipelineConfig;
use crate::error::{Error, Result};
use crate::llm::{parse_translated_batch, LLMProvider, SubtitleBatcher, TranslationRequest};
use crate::models::{Action, Cue};

pub struct SubtitleTranslator {
    llm: Arc<dyn LLMProvider>,
    batcher: SubtitleBatcher,
    model: String,
    api_delay: Duration,
    batch_timeout: Duration,
    show_progress: bool,
}

impl SubtitleTranslator {
    pub fn new(llm: Arc<dyn LLMProvider>, config: &PipelineConfig) -> Self {
        Self {
            llm,
            batcher: SubtitleBatcher::new(config.batch_size, config.max_batch_chars),
            model: config.translation_model.clone(),
            api_delay: config.api_delay,
            batch_timeout: Action::TranslateSubtitle.timeout(),
            show_progress: true,
        }
    }

    pub fn with_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    pub async fn translate(
        &self,
        cues: &[Cue],
        source_lang: &str,
        target_lang: &str,
    ) -> Result<Vec<Cue>> {
        let batches = self.batcher.create_batches(cues.to_vec());
        let total = batches.len();
        tracing::info!(
            "Translating {} subtitles in {} batches with {} ({} -> {})",
            cues.len(),
            total,
            self.llm.name(),
            source_lang,
            target_lang
        );

        let pb = if self.show_progress {
            ProgressBar::new(total as u64)
        } else {
            ProgressBar::hidden()
        };
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} batches")
                .unwrap()
                .progress_chars("#>-"),
        );

        let mut translated = Vec::with_capacity(cues.len());

        for (i, batch) in batches.into_iter().enumerate() {
            let request = TranslationRequest::new(batch, source_lang, target_lang);
            let completion = request.to_completion_request(&self.model);

            let outcome = timeout(self.batch_timeout, self.llm.complete(completion))
                .await
                .unwrap_or_else(|_| Err(Error::Timeout(self.batch_timeout.as_secs())));
            let response = match outcome {
                Ok(response) => response,
                Err(e) => {
                    pb.abandon_with_message("Translation failed");
                    return Err(e);
                }
            };

            translated.extend(parse_translated_batch(&request.cues, &response));
            pb.inc(1);
            tracing::debug!("Batch {}/{} translated", i + 1, total);

            if i + 1 < total && !self.api_delay.is_zero() {
                sleep(self.api_delay).await;
            }
        }

        pb.finish_with_message("Translation complete");
        Ok(translated)
    }
}
