use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::error::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Action {
    ExtractAudio,
    GenerateSubtitle,
    TranslateSubtitle,
}

impl Action {
    pub fn description(&self) -> &'static str {
        match self {
            Action::ExtractAudio => "Audio extraction",
            Action::GenerateSubtitle => "Subtitle generation",
            Action::TranslateSubtitle => "Subtitle translation",
        }
    }

    pub fn timeout(&self) -> Duration {
        match self {
            Action::ExtractAudio => Duration::from_secs(120),
            Action::TranslateSubtitle => Duration::from_secs(300),
            Action::GenerateSubtitle => Duration::from_secs(60),
        }
    }

    pub fn output_suffix(&self) -> &'static str {
        match self {
            Action::ExtractAudio => "_extracted.aac",
            Action::GenerateSubtitle => "_subtitle.srt",
            Action::TranslateSubtitle => "_translated.srt",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Action::ExtractAudio => "extract_audio",
            Action::GenerateSubtitle => "generate_subtitle",
            Action::TranslateSubtitle => "translate_subtitle",
        };
        f.write_str(name)
    }
}

impl FromStr for Action {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "extract_audio" => Ok(Action::ExtractAudio),
            "generate_subtitle" => Ok(Action::GenerateSubtitle),
            "translate_subtitle" => Ok(Action::TranslateSubtitle),
            other => Err(Error::ParseError(format!("unknown action '{}'", other))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct JobResult {
    pub result_file: PathBuf,
    pub processing_time: Duration,
    pub action: Action,
    pub output: String,
    pub error: String,
    pub exit_code: i32,
}

impl JobResult {
    pub fn success(action: Action, result_file: PathBuf, processing_time: Duration, output: String) -> Self {
        Self {
            result_file,
            processing_time,
            action,
            output,
            error: String::new(),
            exit_code: 0,
        }
    }

    pub fn failure(action: Action, result_file: PathBuf, processing_time: Duration, error: &Error) -> Self {
        Self {
            result_file,
            processing_time,
            action,
            output: String::new(),
            error: error.to_string(),
            exit_code: 1,
        }
    }

    pub fn is_success(&self) -> bool {
        self.exit_code == 0
    }

    pub fn processing_ms(&self) -> u64 {
        self.processing_time.as_millis() as u64
    }

    pub fn formatted_time(&self) -> String {
        format_elapsed(self.processing_time)
    }
}

pub fn format_elapsed(elapsed: Duration) -> String {
    let ms = elapsed.as_millis();
    if ms < 1000 {
        format!("{} ms", ms)
    } else {
        format!("{:.2} s", elapsed.as_secs_f64())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobStatus {
    Succeeded,
    Failed,
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobStatus::Succeeded => f.write_str("Succeeded"),
            JobStatus::Failed => f.write_str("Failed"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRecord {
    pub id: Option<i64>,
    pub action: Action,
    pub source_path: String,
    pub dest_path: String,
    pub status: JobStatus,
    pub processing_ms: u64,
    pub message: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_formatted_time() {
        assert_eq!(format_elapsed(Duration::from_millis(999)), "999 ms");
        assert_eq!(format_elapsed(Duration::from_millis(1500)), "1.50 s");
        assert_eq!(format_elapsed(Duration::from_millis(61_234)), "61.23 s");
    }

    #[test]
    fn test_action_round_trip_and_timeouts() {
        for action in [Action::ExtractAudio, Action::GenerateSubtitle, Action::TranslateSubtitle] {
            assert_eq!(action.to_string().parse::<Action>().unwrap(), action);
        }
        assert_eq!(Action::ExtractAudio.timeout(), Duration::from_secs(120));
        assert_eq!(Action::TranslateSubtitle.timeout(), Duration::from_secs(300));
        assert_eq!(Action::GenerateSubtitle.output_suffix(), "_subtitle.srt");
        assert!("convert".parse::<Action>().is_err());
    }

    #[test]
    fn test_job_result_success() {
        let result = JobResult::success(
            Action::TranslateSubtitle,
            PathBuf::from("out.srt"),
            Duration::from_millis(20),
            "done".into(),
        );
        assert!(result.is_success());
        assert_eq!(result.formatted_time(), "20 ms");
        assert_eq!(result.processing_ms(), 20);
    }

    #[test]
    fn test_job_result_failure() {
        let result = JobResult::failure(
            Action::ExtractAudio,
            PathBuf::from("out.aac"),
            Duration::from_millis(5),
            &Error::FFmpeg("exited with status 1".into()),
        );
        assert!(!result.is_success());
        assert_eq!(result.exit_code, 1);
        assert!(result.error.contains("exited with status 1"));
        assert!(result.output.is_empty());
    }
}
