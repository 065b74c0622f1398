//! Job state machine and read-side snapshots.

use chrono::{DateTime, Duration, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use uuid::Uuid;

use crate::quality::JobPriority;

/// Unique identifier for a job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct JobId(pub String);

impl JobId {
    /// Generate a new random job ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Create from an existing string.
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Get the inner string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Job lifecycle state.
///
/// `Pending -> Processing -> {Completed | Failed | Cancelled}`, with a
/// lazily applied `Expired` transition from any non-terminal state once
/// the TTL elapses. Terminal states never transition again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Waiting for a concurrency slot
    #[default]
    Pending,
    /// Timeline build and render in flight
    Processing,
    /// Output and preview available
    Completed,
    /// Render or resolution failed; see `error_message`
    Failed,
    /// Caller-cancelled before completion
    Cancelled,
    /// TTL elapsed before reaching a terminal state
    Expired,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Cancelled => "cancelled",
            JobStatus::Expired => "expired",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled | JobStatus::Expired
        )
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result data recorded when a job completes.
#[derive(Debug, Clone, PartialEq)]
pub struct JobOutput {
    pub output_path: PathBuf,
    pub preview_path: PathBuf,
    pub file_size: u64,
    pub duration_seconds: f64,
}

/// A unit of orchestration work, exclusively owned by the scheduler.
///
/// External readers only ever see [`JobSnapshot`]s.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Job {
    pub id: JobId,

    pub status: JobStatus,

    pub priority: JobPriority,

    pub created_at: DateTime<Utc>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,

    /// Fixed TTL from creation
    pub expires_at: DateTime<Utc>,

    /// Progress (0-100), monotonically non-decreasing while processing
    pub progress: u8,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_path: Option<PathBuf>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub preview_path: Option<PathBuf>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,

    /// Output size in bytes (set on completion)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_size: Option<u64>,

    /// Rendered duration in seconds (set on completion)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_seconds: Option<f64>,

    /// Completion notification endpoint
    #[serde(skip_serializing_if = "Option::is_none")]
    pub webhook_url: Option<String>,

    /// Free-form metadata echoed back to callers
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl Job {
    /// Create a new pending job with a fixed TTL from now.
    pub fn new(
        priority: JobPriority,
        ttl: Duration,
        webhook_url: Option<String>,
        metadata: HashMap<String, serde_json::Value>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: JobId::new(),
            status: JobStatus::Pending,
            priority,
            created_at: now,
            started_at: None,
            completed_at: None,
            expires_at: now + ttl,
            progress: 0,
            output_path: None,
            preview_path: None,
            error_message: None,
            file_size: None,
            duration_seconds: None,
            webhook_url,
            metadata,
        }
    }

    /// Begin processing.
    pub fn start(&mut self) {
        self.status = JobStatus::Processing;
        self.started_at = Some(Utc::now());
    }

    /// Record successful completion.
    pub fn complete(&mut self, output: JobOutput) {
        self.status = JobStatus::Completed;
        self.completed_at = Some(Utc::now());
        self.progress = 100;
        self.output_path = Some(output.output_path);
        self.preview_path = Some(output.preview_path);
        self.file_size = Some(output.file_size);
        self.duration_seconds = Some(output.duration_seconds);
    }

    /// Record failure with a human-readable message.
    pub fn fail(&mut self, error: impl Into<String>) {
        self.status = JobStatus::Failed;
        self.error_message = Some(error.into());
        self.completed_at = Some(Utc::now());
    }

    /// Record caller-initiated cancellation.
    pub fn cancel(&mut self) {
        self.status = JobStatus::Cancelled;
        self.completed_at = Some(Utc::now());
    }

    /// Record TTL expiry.
    pub fn expire(&mut self) {
        self.status = JobStatus::Expired;
    }

    /// Advance progress; never moves backwards.
    pub fn advance_progress(&mut self, progress: u8) {
        self.progress = self.progress.max(progress.min(100));
    }

    /// True when the TTL has elapsed and the job is still non-terminal.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        !self.status.is_terminal() && now > self.expires_at
    }

    /// Read-only view for status-polling callers.
    pub fn snapshot(&self) -> JobSnapshot {
        JobSnapshot {
            job_id: self.id.clone(),
            status: self.status,
            priority: self.priority,
            created_at: self.created_at,
            started_at: self.started_at,
            completed_at: self.completed_at,
            expires_at: self.expires_at,
            progress: self.progress,
            output_path: self.output_path.clone(),
            preview_path: self.preview_path.clone(),
            error_message: self.error_message.clone(),
            file_size: self.file_size,
            duration_seconds: self.duration_seconds,
            metadata: self.metadata.clone(),
        }
    }

    /// Webhook payload for terminal-state notification.
    pub fn webhook_payload(&self) -> WebhookPayload {
        WebhookPayload {
            job_id: self.id.clone(),
            status: self.status,
            completed_at: self.completed_at,
            output_path: self.output_path.clone(),
            preview_path: self.preview_path.clone(),
            error_message: self.error_message.clone(),
            file_size: self.file_size,
            duration_seconds: self.duration_seconds,
            metadata: self.metadata.clone(),
        }
    }
}

/// Read-only job view returned by every status endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct JobSnapshot {
    pub job_id: JobId,
    pub status: JobStatus,
    pub priority: JobPriority,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    pub expires_at: DateTime<Utc>,
    pub progress: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_path: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preview_path: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_size: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_seconds: Option<f64>,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

/// One page of job snapshots.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct JobPage {
    pub jobs: Vec<JobSnapshot>,
    pub total: usize,
    pub page: usize,
    pub per_page: usize,
    pub total_pages: usize,
}

/// Payload delivered to a caller-supplied webhook on terminal transitions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct WebhookPayload {
    pub job_id: JobId,
    pub status: JobStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_path: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preview_path: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_size: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_seconds: Option<f64>,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_job() -> Job {
        Job::new(JobPriority::Normal, Duration::hours(24), None, HashMap::new())
    }

    #[test]
    fn test_job_creation() {
        let job = new_job();
        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(job.progress, 0);
        assert!(job.expires_at > job.created_at);
    }

    #[test]
    fn test_job_state_transitions() {
        let mut job = new_job();

        job.start();
        assert_eq!(job.status, JobStatus::Processing);
        assert!(job.started_at.is_some());

        job.complete(JobOutput {
            output_path: PathBuf::from("generated/out.mp4"),
            preview_path: PathBuf::from("generated/out_preview.mp4"),
            file_size: 1024,
            duration_seconds: 8.0,
        });
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.progress, 100);
        assert!(job.completed_at.is_some());
    }

    #[test]
    fn test_progress_is_monotone() {
        let mut job = new_job();
        job.start();
        job.advance_progress(40);
        job.advance_progress(20);
        assert_eq!(job.progress, 40);
        job.advance_progress(120);
        assert_eq!(job.progress, 100);
    }

    #[test]
    fn test_expiry_only_from_non_terminal() {
        let mut job = new_job();
        let later = job.expires_at + Duration::seconds(1);
        assert!(job.is_expired(later));

        job.fail("boom");
        assert!(!job.is_expired(later));
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(!JobStatus::Pending.is_terminal());
        assert!(!JobStatus::Processing.is_terminal());
        assert!(JobStatus::Completed.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
        assert!(JobStatus::Cancelled.is_terminal());
        assert!(JobStatus::Expired.is_terminal());
    }
}
