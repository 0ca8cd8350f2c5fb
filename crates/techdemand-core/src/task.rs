use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::config::{CityConfig, TechnologyConfig};

/// Lifecycle state of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    /// Not fetched yet.
    Pending,
    /// A positive count was obtained.
    Resolved,
    /// Every attempt reached the endpoint but none produced a positive count.
    Exhausted,
    /// The last attempt ended in a fetch failure.
    Failed,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Resolved => "resolved",
            TaskStatus::Exhausted => "exhausted",
            TaskStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, TaskStatus::Pending)
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for TaskStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(TaskStatus::Pending),
            "resolved" => Ok(TaskStatus::Resolved),
            "exhausted" => Ok(TaskStatus::Exhausted),
            "failed" => Ok(TaskStatus::Failed),
            _ => Err(format!("Unknown task status: {}", s)),
        }
    }
}

/// Classification of a failed fetch attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Connection refused/reset or DNS failure.
    Connectivity,
    /// The per-call timeout elapsed.
    Timeout,
    /// The body could not be read.
    BodyRead,
    /// Non-success HTTP status.
    HttpStatus,
    /// The request could not be built or sent for another reason.
    Request,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::Connectivity => "connectivity",
            FailureKind::Timeout => "timeout",
            FailureKind::BodyRead => "body_read",
            FailureKind::HttpStatus => "http_status",
            FailureKind::Request => "request",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A fetch failure recorded on a task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskFailure {
    pub kind: FailureKind,
    pub message: String,
}

/// Lookup key for a task: technology display name and city code.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TaskKey {
    pub technology: String,
    pub city_code: u32,
}

impl TaskKey {
    pub fn new(technology: impl Into<String>, city_code: u32) -> Self {
        Self {
            technology: technology.into(),
            city_code,
        }
    }
}

/// One (technology, city) unit of work and its resolved count.
#[derive(Debug, Clone)]
pub struct Task {
    pub technology_name: String,
    pub search_term: String,
    pub city_code: u32,
    pub count: u64,
    pub attempts: u32,
    pub status: TaskStatus,
    pub failure: Option<TaskFailure>,
}

impl Task {
    pub fn new(
        technology_name: impl Into<String>,
        search_term: impl Into<String>,
        city_code: u32,
    ) -> Self {
        Self {
            technology_name: technology_name.into(),
            search_term: search_term.into(),
            city_code,
            count: 0,
            attempts: 0,
            status: TaskStatus::Pending,
            failure: None,
        }
    }

    pub fn key(&self) -> TaskKey {
        TaskKey::new(self.technology_name.clone(), self.city_code)
    }

    /// Store a positive count. Returns false (and leaves the task untouched)
    /// if the count is zero or one was already stored.
    pub fn record_count(&mut self, count: u64) -> bool {
        if count == 0 || self.count > 0 {
            return false;
        }
        self.count = count;
        self.status = TaskStatus::Resolved;
        self.failure = None;
        true
    }

    pub fn can_retry(&self, max_attempts: u32) -> bool {
        self.status == TaskStatus::Pending && self.attempts < max_attempts
    }

    pub fn is_failed(&self) -> bool {
        self.status == TaskStatus::Failed
    }
}

/// Build the task set: one task per enabled city × enabled technology,
/// cities in the outer loop.
pub fn build_tasks(cities: &[CityConfig], technologies: &[TechnologyConfig]) -> Vec<Task> {
    let mut tasks = Vec::with_capacity(cities.len() * technologies.len());
    for city in cities {
        for tech in technologies {
            tasks.push(Task::new(&tech.name, &tech.search, city.code));
        }
    }
    tasks
}
