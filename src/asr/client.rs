use std::time::Duration;

use reqwest::{Client, Response, StatusCode};
use serde_json::json;
use tokio::time::{sleep, Instant};

use crate::asr::task::{SubmittedTask, TaskOutput, TaskResponse, TaskStatus};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::models::{Action, Cue, TranscriptionDocument};
use crate::retry::RetryPolicy;
use crate::subtitle::{cues_from_transcription, no_speech_cue, renumber};

const TRANSCRIPTION_PATH: &str = "/api/v1/services/audio/asr/transcription";
const TASKS_PATH: &str = "/api/v1/tasks";

pub struct TranscriptionClient {
    client: Client,
    fetch_client: Client,
    api_key: String,
    base_url: String,
    model: String,
    language_hints: Vec<String>,
    poll_interval: Duration,
    timeout: Duration,
    retry: RetryPolicy,
}

impl TranscriptionClient {
    pub fn new(config: &Config) -> Result<Self> {
        let api_key = config.speech_api_key().ok_or_else(|| {
            Error::Config(
                "DashScope API key is not configured; set speech_recognition.dashscope.api_key \
                 or the DASHSCOPE_API_KEY environment variable"
                    .to_string(),
            )
        })?;
        let speech = &config.speech_recognition.dashscope;

        let client = Client::builder()
            .connect_timeout(Duration::from_secs(30))
            .timeout(Duration::from_secs(60))
            .build()?;
        let fetch_client = Client::builder()
            .connect_timeout(Duration::from_secs(30))
            .timeout(Action::GenerateSubtitle.timeout())
            .build()?;

        Ok(Self {
            client,
            fetch_client,
            api_key: api_key.to_string(),
            base_url: config.dashscope.base_url.trim_end_matches('/').to_string(),
            model: speech.model.clone(),
            language_hints: speech.language_hints.clone(),
            poll_interval: Duration::from_millis(speech.poll_interval_ms.max(100)),
            timeout: Duration::from_secs(speech.timeout_secs),
            retry: RetryPolicy::default(),
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub async fn submit(&self, file_url: &str) -> Result<SubmittedTask> {
        let body = json!({
            "model": self.model,
            "input": { "file_urls": [file_url] },
            "parameters": { "language_hints": self.language_hints },
        });
        let url = format!("{}{}", self.base_url, TRANSCRIPTION_PATH);
        let body = &body;
        let url = url.as_str();

        let response: TaskResponse = self
            .retry
            .run("Submit transcription", move || async move {
                let response = self
                    .client
                    .post(url)
                    .bearer_auth(&self.api_key)
                    .header("X-DashScope-Async", "enable")
                    .json(body)
                    .send()
                    .await?;
                let response = check_status(response).await?;
                Ok(response.json::<TaskResponse>().await?)
            })
            .await?;

        let output = response.output.ok_or_else(|| {
            Error::Transcription(
                response
                    .message
                    .unwrap_or_else(|| "submit response has no task".to_string()),
            )
        })?;

        tracing::info!("Transcription task {} submitted ({})", output.task_id, output.task_status);
        Ok(SubmittedTask {
            task_id: output.task_id,
            request_id: response.request_id,
        })
    }

    pub async fn query(&self, task_id: &str) -> Result<TaskOutput> {
        let url = format!("{}{}/{}", self.base_url, TASKS_PATH, task_id);
        let url = url.as_str();

        let response: TaskResponse = self
            .retry
            .run("Query transcription", move || async move {
                let response = self
                    .client
                    .get(url)
                    .bearer_auth(&self.api_key)
                    .send()
                    .await?;
                let response = check_status(response).await?;
                Ok(response.json::<TaskResponse>().await?)
            })
            .await?;

        response.output.ok_or_else(|| {
            Error::Transcription(format!("task {} returned no output", task_id))
        })
    }

    pub async fn wait(&self, task_id: &str) -> Result<TaskOutput> {
        let started = Instant::now();

        loop {
            let output = self.query(task_id).await?;
            match output.task_status {
                TaskStatus::Succeeded => {
                    tracing::info!("Transcription finished in {:?}", started.elapsed());
                    return Ok(output);
                }
                TaskStatus::Pending | TaskStatus::Running => {
                    tracing::debug!("Task {} is {}", task_id, output.task_status);
                }
                _ => return Err(Error::Transcription(output.failure_message())),
            }

            if started.elapsed() + self.poll_interval > self.timeout {
                return Err(Error::Timeout(self.timeout.as_secs()));
            }
            sleep(self.poll_interval).await;
        }
    }

    pub async fn fetch_transcription(&self, url: &str) -> Result<TranscriptionDocument> {
        let response = self.fetch_client.get(url).send().await?;
        if response.status() != StatusCode::OK {
            return Err(Error::Transcription(format!(
                "Failed to fetch transcription result: HTTP {}",
                response.status()
            )));
        }
        let text = response.text().await?;
        serde_json::from_str(&text)
            .map_err(|e| Error::ParseError(format!("Invalid transcription document: {}", e)))
    }

    pub async fn transcribe_url(&self, file_url: &str) -> Result<Vec<Cue>> {
        let task = self.submit(file_url).await?;
        let output = self.wait(&task.task_id).await?;

        let mut documents = Vec::new();
        for url in output.transcription_urls() {
            documents.push(self.fetch_transcription(url).await?);
        }
        Ok(assemble_cues(&documents))
    }
}

/// Cues of all documents numbered from 1; a placeholder cue when nothing was heard.
pub fn assemble_cues(documents: &[TranscriptionDocument]) -> Vec<Cue> {
    let mut cues: Vec<Cue> = documents.iter().flat_map(cues_from_transcription).collect();
    if cues.is_empty() {
        tracing::warn!("No speech recognized");
        return vec![no_speech_cue()];
    }
    renumber(&mut cues);
    cues
}

async fn check_status(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let retry_after = response
        .headers()
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(5);
    let text = response.text().await.unwrap_or_default();
    let detail = serde_json::from_str::<TaskResponse>(&text)
        .ok()
        .and_then(|r| match (r.code, r.message) {
            (Some(code), Some(message)) => Some(format!("{}: {}", code, message)),
            (Some(code), None) => Some(code),
            (None, message) => message,
        })
        .unwrap_or(text);

    if status == StatusCode::TOO_MANY_REQUESTS {
        return Err(Error::RateLimited(retry_after));
    }
    if status.is_server_error() {
        return Err(Error::ServerError(status.as_u16(), detail));
    }
    Err(Error::Transcription(format!("HTTP {}: {}", status, detail)))
}
