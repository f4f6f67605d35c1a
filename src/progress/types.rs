use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

const MAX_TASK_ID_LEN: usize = 128;

/// Correlates a submission request with its progress stream subscription
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TaskId(String);

#[derive(Debug, Error, PartialEq, Eq)]
pub enum InvalidTaskId {
    #[error("task id must not be empty")]
    Empty,
    #[error("task id exceeds {MAX_TASK_ID_LEN} characters")]
    TooLong,
    #[error("task id may only contain letters, digits, '-', '_' and '.'")]
    InvalidCharacter,
}

impl TaskId {
    /// Server-side identifier for requests that did not bring their own
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn parse(value: impl Into<String>) -> Result<Self, InvalidTaskId> {
        let value = value.into();
        let value = value.trim();

        if value.is_empty() {
            return Err(InvalidTaskId::Empty);
        }
        if value.len() > MAX_TASK_ID_LEN {
            return Err(InvalidTaskId::TooLong);
        }
        if !value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
        {
            return Err(InvalidTaskId::InvalidCharacter);
        }

        Ok(Self(value.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for TaskId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for TaskId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for TaskId {
    type Error = InvalidTaskId;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        TaskId::parse(value)
    }
}

impl From<TaskId> for String {
    fn from(value: TaskId) -> Self {
        value.0
    }
}

/// Lifecycle phase of a task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Starting,
    Processing,
    Downloading,
    Complete,
    Error,
}

impl TaskStatus {
    /// `complete` and `error` end the task; nothing is written after them
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskStatus::Complete | TaskStatus::Error)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TaskStatus::Starting => "starting",
            TaskStatus::Processing => "processing",
            TaskStatus::Downloading => "downloading",
            TaskStatus::Complete => "complete",
            TaskStatus::Error => "error",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Latest known state of one task. Serialized as the SSE payload
/// `{"progress": 42, "status": "processing", "message": "..."}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressRecord {
    pub progress: u8,
    pub status: TaskStatus,
    pub message: String,
}

impl ProgressRecord {
    /// Builds a record, clamping `progress` to 100
    pub fn new(progress: u8, status: TaskStatus, message: impl Into<String>) -> Self {
        Self {
            progress: progress.min(100),
            status,
            message: message.into(),
        }
    }

    pub fn starting(message: impl Into<String>) -> Self {
        Self::new(0, TaskStatus::Starting, message)
    }

    pub fn processing(progress: u8, message: impl Into<String>) -> Self {
        Self::new(progress, TaskStatus::Processing, message)
    }

    pub fn downloading(progress: u8, message: impl Into<String>) -> Self {
        Self::new(progress, TaskStatus::Downloading, message)
    }

    pub fn complete(message: impl Into<String>) -> Self {
        Self::new(100, TaskStatus::Complete, message)
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::new(0, TaskStatus::Error, message)
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}
