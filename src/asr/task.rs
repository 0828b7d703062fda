use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
    Canceled,
    #[serde(other)]
    Unknown,
}

impl TaskStatus {
    pub fn is_finished(&self) -> bool {
        !matches!(self, TaskStatus::Pending | TaskStatus::Running)
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TaskStatus::Pending => "PENDING",
            TaskStatus::Running => "RUNNING",
            TaskStatus::Succeeded => "SUCCEEDED",
            TaskStatus::Failed => "FAILED",
            TaskStatus::Canceled => "CANCELED",
            TaskStatus::Unknown => "UNKNOWN",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TaskResponse {
    #[serde(default)]
    pub request_id: Option<String>,
    #[serde(default)]
    pub output: Option<TaskOutput>,
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TaskOutput {
    pub task_id: String,
    pub task_status: TaskStatus,
    #[serde(default)]
    pub results: Vec<SubtaskResult>,
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

impl TaskOutput {
    pub fn failure_message(&self) -> String {
        if let Some(message) = self.message.as_deref().filter(|m| !m.is_empty()) {
            return match &self.code {
                Some(code) => format!("{}: {}", code, message),
                None => message.to_string(),
            };
        }
        self.results
            .iter()
            .find_map(|r| r.message.clone().filter(|m| !m.is_empty()))
            .unwrap_or_else(|| format!("task ended with status {}", self.task_status))
    }

    pub fn transcription_urls(&self) -> Vec<&str> {
        self.results
            .iter()
            .filter(|r| {
                r.subtask_status
                    .map_or(true, |s| s == TaskStatus::Succeeded)
            })
            .filter_map(|r| r.transcription_url.as_deref())
            .filter(|url| !url.is_empty())
            .collect()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SubtaskResult {
    #[serde(default)]
    pub file_url: Option<String>,
    #[serde(default)]
    pub transcription_url: Option<String>,
    #[serde(default)]
    pub subtask_status: Option<TaskStatus>,
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmittedTask {
    pub task_id: String,
    pub request_id: Option<String>,
}
