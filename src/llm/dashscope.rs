use async_trait::async_trait;
use futures::StreamExt;
use reqwest::{Client, Response, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::config::DashScopeConfig;
use crate::error::{Error, Result};
use crate::llm::prompts::{ChatMessage, CompletionRequest, TranslationOptions};
use crate::llm::provider::{LLMProvider, TextStream};
use crate::llm::rate_limiter::RateLimiter;
use crate::retry::RetryPolicy;

const GENERATION_PATH: &str = "/api/v1/services/aigc/text-generation/generation";

pub struct DashScopeProvider {
    client: Client,
    api_key: String,
    base_url: String,
    rate_limiter: RateLimiter,
    retry: RetryPolicy,
}

#[derive(Serialize)]
struct GenerationRequest<'a> {
    model: &'a str,
    input: GenerationInput<'a>,
    parameters: GenerationParameters<'a>,
}

#[derive(Serialize)]
struct GenerationInput<'a> {
    messages: &'a [ChatMessage],
}

#[derive(Serialize)]
struct GenerationParameters<'a> {
    result_format: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    translation_options: Option<&'a TranslationOptions>,
    #[serde(skip_serializing_if = "Option::is_none")]
    incremental_output: Option<bool>,
}

#[derive(Debug, Deserialize, Default)]
struct GenerationResponse {
    #[serde(default)]
    output: Option<GenerationOutput>,
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct GenerationOutput {
    #[serde(default)]
    choices: Vec<Choice>,
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    #[serde(default)]
    message: Option<ChoiceMessage>,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: String,
}

impl GenerationResponse {
    fn error(&self) -> Option<String> {
        let code = self.code.as_deref().filter(|c| !c.is_empty())?;
        Some(match &self.message {
            Some(message) => format!("{}: {}", code, message),
            None => code.to_string(),
        })
    }

    fn into_text(self) -> Option<String> {
        let output = self.output?;
        output
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message)
            .map(|m| m.content)
            .or(output.text)
    }
}

impl DashScopeProvider {
    pub fn new(api_key: impl Into<String>, base_url: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(30))
            .timeout(Duration::from_secs(300))
            .build()?;

        Ok(Self {
            client,
            api_key: api_key.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            rate_limiter: RateLimiter::default(),
            retry: RetryPolicy::default(),
        })
    }

    pub fn from_config(config: &DashScopeConfig, api_key: impl Into<String>) -> Result<Self> {
        Ok(Self::new(api_key, config.base_url.clone())?
            .with_retry(RetryPolicy::new(config.max_retries))
            .with_rate_limiter(RateLimiter::new(Duration::from_millis(
                config.min_interval_ms,
            ))))
    }

    pub fn with_rate_limiter(mut self, rate_limiter: RateLimiter) -> Self {
        self.rate_limiter = rate_limiter;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    fn endpoint(&self) -> String {
        format!("{}{}", self.base_url, GENERATION_PATH)
    }

    async fn send(&self, request: &CompletionRequest, stream: bool) -> Result<Response> {
        let body = build_body(request, stream);
        tracing::debug!(
            "Sending {} chars to DashScope model {}",
            request.estimate_chars(),
            request.model
        );

        let body = &body;
        self.retry
            .run("DashScope generation", move || async move {
                self.rate_limiter.wait().await;

                let mut builder = self
                    .client
                    .post(self.endpoint())
                    .bearer_auth(&self.api_key)
                    .json(body);
                if stream {
                    builder = builder
                        .header("X-DashScope-SSE", "enable")
                        .header(reqwest::header::ACCEPT, "text/event-stream");
                }

                let response = builder.send().await?;
                self.check_status(response).await
            })
            .await
    }

    async fn check_status(&self, response: Response) -> Result<Response> {
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
        let detail = serde_json::from_str::<GenerationResponse>(&text)
            .ok()
            .and_then(|r| r.error())
            .unwrap_or(text);

        if status == StatusCode::TOO_MANY_REQUESTS {
            self.rate_limiter
                .penalize(Duration::from_secs(retry_after))
                .await;
            return Err(Error::RateLimited(retry_after));
        }
        if status.is_server_error() {
            return Err(Error::ServerError(status.as_u16(), detail));
        }
        Err(Error::LLMApi(format!("DashScope API error ({}): {}", status, detail)))
    }
}

fn build_body(request: &CompletionRequest, stream: bool) -> serde_json::Value {
    let body = GenerationRequest {
        model: &request.model,
        input: GenerationInput {
            messages: &request.messages,
        },
        parameters: GenerationParameters {
            result_format: "message",
            translation_options: request.translation_options.as_ref(),
            incremental_output: stream.then_some(true),
        },
    };
    serde_json::to_value(&body).unwrap_or_default()
}

fn parse_completion(text: &str) -> Result<String> {
    let response: GenerationResponse = serde_json::from_str(text)
        .map_err(|e| Error::LLMApi(format!("Failed to parse DashScope response: {}", e)))?;

    if let Some(error) = response.error() {
        return Err(Error::LLMApi(error));
    }

    match response.into_text() {
        Some(content) if !content.trim().is_empty() => Ok(content),
        _ => Err(Error::LLMApi("Empty response from DashScope".to_string())),
    }
}

/// Line-oriented decoder for the `text/event-stream` body. Lines may be
/// split across chunks; a blank line ends an event.
#[derive(Default)]
struct EventDecoder {
    pending: Vec<u8>,
    data: Vec<String>,
}

impl EventDecoder {
    fn feed(&mut self, chunk: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(chunk);
        let mut events = Vec::new();

        while let Some(pos) = self.pending.iter().position(|&b| b == b'\n') {
            let raw: Vec<u8> = self.pending.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&raw[..pos]);
            let line = line.strip_suffix('\r').unwrap_or(&line);
            if let Some(event) = self.line(line) {
                events.push(event);
            }
        }
        events
    }

    /// Flushes an event left open when the body ends without a blank line.
    fn finish(&mut self) -> Option<String> {
        if !self.pending.is_empty() {
            let raw = std::mem::take(&mut self.pending);
            let line = String::from_utf8_lossy(&raw);
            let line = line.strip_suffix('\r').unwrap_or(&line);
            if let Some(event) = self.line(line) {
                return Some(event);
            }
        }
        self.dispatch()
    }

    fn line(&mut self, line: &str) -> Option<String> {
        if line.is_empty() {
            return self.dispatch();
        }
        if let Some(rest) = line.strip_prefix("data:") {
            self.data.push(rest.strip_prefix(' ').unwrap_or(rest).to_string());
        }
        None
    }

    fn dispatch(&mut self) -> Option<String> {
        if self.data.is_empty() {
            return None;
        }
        Some(std::mem::take(&mut self.data).join("\n"))
    }
}

/// Text carried by one SSE event; `None` for keep-alives and empty deltas.
fn parse_stream_event(data: &str) -> Result<Option<String>> {
    let data = data.trim();
    if data.is_empty() || data == "[DONE]" {
        return Ok(None);
    }

    let event: GenerationResponse = serde_json::from_str(data)
        .map_err(|e| Error::ParseError(format!("Bad stream event: {}", e)))?;

    if let Some(error) = event.error() {
        return Err(Error::LLMApi(error));
    }
    Ok(event.into_text().filter(|t| !t.is_empty()))
}

#[async_trait]
impl LLMProvider for DashScopeProvider {
    async fn complete(&self, request: CompletionRequest) -> Result<String> {
        let response = self.send(&request, false).await?;
        let text = response.text().await?;
        parse_completion(&text)
    }

    async fn complete_stream(&self, request: CompletionRequest) -> Result<TextStream> {
        let response = self.send(&request, true).await?;
        let mut body = Box::pin(response.bytes_stream());

        Ok(Box::pin(async_stream::stream! {
            let mut decoder = EventDecoder::default();
            loop {
                let (events, ended) = match body.next().await {
                    Some(Ok(chunk)) => (decoder.feed(&chunk), false),
                    Some(Err(e)) => {
                        yield Err(Error::from(e));
                        return;
                    }
                    None => (decoder.finish().into_iter().collect(), true),
                };
                for data in events {
                    match parse_stream_event(&data) {
                        Ok(Some(text)) => yield Ok(text),
                        Ok(None) => {}
                        Err(e) => {
                            yield Err(e);
                            return;
                        }
                    }
                }
                if ended {
                    return;
                }
            }
        }))
    }

    fn name(&self) -> &str {
        "DashScope"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{CannedResponse, StubServer};
    use serde_json::json;

    #[test]
    fn test_body_for_translation() {
        let request = CompletionRequest::prompt("qwen-mt-plus", "[1] 你好").with_translation(
            TranslationOptions {
                source_lang: "Chinese".into(),
                target_lang: "English".into(),
            },
        );
        assert_eq!(
            build_body(&request, false),
            json!({
                "model": "qwen-mt-plus",
                "input": {"messages": [{"role": "user", "content": "[1] 你好"}]},
                "parameters": {
                    "result_format": "message",
                    "translation_options": {"source_lang": "Chinese", "target_lang": "English"}
                }
            })
        );
    }

    #[test]
    fn test_body_for_stream() {
        let request = CompletionRequest::prompt("qwen-plus", "hi");
        let body = build_body(&request, true);
        assert_eq!(body["parameters"]["incremental_output"], json!(true));
        assert!(body["parameters"].get("translation_options").is_none());
    }

    #[test]
    fn test_parse_completion() {
        let body = r#"{"output":{"choices":[{"finish_reason":"stop","message":{"role":"assistant","content":"[1] Hello"}}]},"request_id":"r1"}"#;
        assert_eq!(parse_completion(body).unwrap(), "[1] Hello");
    }

    #[test]
    fn test_parse_completion_errors() {
        let body = r#"{"code":"InvalidApiKey","message":"Invalid API-key provided.","request_id":"r2"}"#;
        let err = parse_completion(body).unwrap_err();
        assert!(err.to_string().contains("InvalidApiKey"));

        let empty = r#"{"output":{"choices":[]}}"#;
        assert!(matches!(parse_completion(empty), Err(Error::LLMApi(_))));
    }

    #[test]
    fn test_parse_stream_event() {
        let event = r#"{"output":{"choices":[{"message":{"content":"Hel","role":"assistant"},"finish_reason":"null"}]}}"#;
        assert_eq!(parse_stream_event(event).unwrap().as_deref(), Some("Hel"));

        let done = r#"{"output":{"choices":[{"message":{"content":"","role":"assistant"},"finish_reason":"stop"}]}}"#;
        assert_eq!(parse_stream_event(done).unwrap(), None);

        let failed = r#"{"code":"Throttling","message":"Requests rate limit exceeded"}"#;
        assert!(matches!(parse_stream_event(failed), Err(Error::LLMApi(_))));
        assert!(parse_stream_event("not json").is_err());
    }

    #[test]
    fn test_decoder_joins_lines_split_across_chunks() {
        let mut decoder = EventDecoder::default();
        assert!(decoder.feed(b"id:1\nevent:result\ndata: hel").is_empty());
        assert!(decoder.feed(b"lo").is_empty());
        assert_eq!(decoder.feed(b"\n\n: keep-alive\n\ndata: wor"), vec!["hello"]);
        assert_eq!(decoder.feed(b"ld\r\n\r\n"), vec!["world"]);
        assert_eq!(decoder.finish(), None);
    }

    #[test]
    fn test_decoder_multi_line_data_and_tail() {
        let mut decoder = EventDecoder::default();
        assert_eq!(decoder.feed(b"data: one\ndata:two\n\n"), vec!["one\ntwo"]);
        assert!(decoder.feed(b"data: {\"x\":1}").is_empty());
        assert_eq!(decoder.finish().as_deref(), Some("{\"x\":1}"));
    }

    #[tokio::test]
    async fn test_too_many_requests_penalizes_limiter() {
        let server = StubServer::start(vec![CannedResponse::new(
            429,
            r#"{"code":"Throttling","message":"slow down"}"#,
        )
        .header("Retry-After", "7")])
        .await;
        let limiter = RateLimiter::default();
        let provider = DashScopeProvider::new("key", server.base_url.clone())
            .unwrap()
            .with_retry(RetryPolicy::new(1))
            .with_rate_limiter(limiter.clone());

        let err = provider
            .complete(CompletionRequest::prompt("qwen-plus", "hi"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::RateLimited(7)));
        assert!(limiter.is_blocked().await);
        assert_eq!(server.requests().len(), 1);
    }

    #[tokio::test]
    async fn test_client_error_is_not_retried() {
        let server = StubServer::start(vec![CannedResponse::new(
            401,
            r#"{"code":"InvalidApiKey","message":"bad key"}"#,
        )])
        .await;
        let provider = DashScopeProvider::new("key", server.base_url.clone()).unwrap();

        let err = provider
            .complete(CompletionRequest::prompt("qwen-plus", "hi"))
            .await
            .unwrap_err();
        match err {
            Error::LLMApi(msg) => assert!(msg.contains("InvalidApiKey: bad key")),
            other => panic!("unexpected error: {:?}", other),
        }
        assert_eq!(server.requests().len(), 1);
    }

    #[tokio::test]
    async fn test_complete_stream_yields_deltas() {
        let body = concat!(
            "id:1\nevent:result\ndata:{\"output\":{\"choices\":[{\"message\":{\"content\":\"Hel\"}}]}}\n\n",
            ": ping\n\n",
            "id:2\nevent:result\ndata:{\"output\":{\"choices\":[{\"message\":{\"content\":\"lo\"}}]}}\n\n",
        );
        let server = StubServer::start(vec![CannedResponse::new(200, body)
            .header("content-type", "text/event-stream")])
        .await;
        let provider = DashScopeProvider::new("key", server.base_url.clone()).unwrap();

        let stream = provider
            .complete_stream(CompletionRequest::prompt("qwen-plus", "hi"))
            .await
            .unwrap();
        let parts: Vec<String> = stream.map(|r| r.unwrap()).collect().await;
        assert_eq!(parts, vec!["Hel", "lo"]);
        assert!(server.requests()[0]
            .starts_with("POST /api/v1/services/aigc/text-generation/generation"));
    }

    #[test]
    fn test_from_config_applies_settings() {
        let config = DashScopeConfig {
            base_url: "https://example.com/".into(),
            max_retries: 5,
            min_interval_ms: 250,
        };
        let provider = DashScopeProvider::from_config(&config, "key").unwrap();
        assert_eq!(provider.base_url, "https://example.com");
        assert_eq!(provider.retry.max_attempts, 5);
    }
}
