use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Defines when and how often a task should run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Schedule {
    /// Run exactly once at the given UTC instant.
    Once { at: DateTime<Utc> },

    /// Run repeatedly with a fixed interval in seconds.
    Interval { every_secs: u64 },

    /// Classical 5-field cron expression (minute hour day-of-month month
    /// day-of-week), evaluated in UTC.
    Cron { expression: String },
}

impl Schedule {
    pub fn type_name(&self) -> &'static str {
        match self {
            Schedule::Once { .. } => "once",
            Schedule::Interval { .. } => "interval",
            Schedule::Cron { .. } => "cron",
        }
    }
}

/// Lifecycle state of a task execution slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Waiting for its next_run time.
    Pending,
    /// Currently being executed.
    Running,
    /// Finished successfully (used for Once tasks after their single run).
    Completed,
    /// Last execution returned an error.
    Failed,
    /// The scheduled window was skipped (e.g. engine was offline).
    Missed,
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Missed => "missed",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "pending" => Ok(JobStatus::Pending),
            "running" => Ok(JobStatus::Running),
            "completed" => Ok(JobStatus::Completed),
            "failed" => Ok(JobStatus::Failed),
            "missed" => Ok(JobStatus::Missed),
            other => Err(format!("unknown job status: {other}")),
        }
    }
}

/// A persisted scheduled task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    /// UUID v4 string — primary key.
    pub id: String,
    /// Human-readable label.
    pub name: String,
    /// Serialised schedule definition.
    pub schedule: Schedule,
    /// The message injected as a synthetic user turn when the task fires.
    pub payload: String,
    /// Whether the task is currently eligible to fire. `enable`/`disable`
    /// toggle this without touching `status`.
    pub enabled: bool,
    /// Current lifecycle state.
    pub status: JobStatus,
    /// Platform user id of whoever created the task, if known.
    pub created_by: Option<String>,
    /// ISO-8601 timestamp of the most recent execution start, if any.
    pub last_run: Option<String>,
    /// ISO-8601 timestamp of the next planned execution, if any.
    pub next_run: Option<String>,
    /// Total number of completed runs.
    pub run_count: u32,
    /// ISO-8601 timestamp of task creation.
    pub created_at: String,
    /// ISO-8601 timestamp of the last metadata update.
    pub updated_at: String,
}
