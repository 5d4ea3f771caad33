//! Durable job lifecycle types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::domain::Operation;

/// Persisted job status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Accepted and enqueued, not yet claimed by a worker.
    Queued,
    /// Claimed by a worker and being driven through the dispatcher.
    Processing,
    /// Terminal: every record was processed.
    Completed,
    /// Terminal: setup failed, the job was cancelled, or shutdown drained it.
    Failed,
}

impl JobStatus {
    /// Whether the status is terminal.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Wire identifier.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

/// Edge-facing display hint layered over the persisted status.
///
/// The Job Store is the source of truth; the queue is only a delivery
/// mechanism, so a missing queue entry refines how the row is reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum DisplayStatus {
    /// Mirrors the persisted status.
    Queued,
    /// Mirrors the persisted status.
    Processing,
    /// Mirrors the persisted status.
    Completed,
    /// Mirrors the persisted status.
    Failed,
    /// Terminal row whose queue entry aged out of retention.
    Expired,
    /// `processing` row with no live queue entry; recovery required.
    Stale,
}

impl DisplayStatus {
    /// Derive the display hint from the persisted status and queue presence.
    #[must_use]
    pub fn derive(status: JobStatus, queue_entry_present: bool) -> Self {
        match (status, queue_entry_present) {
            (JobStatus::Queued, _) => Self::Queued,
            (JobStatus::Processing, true) => Self::Processing,
            (JobStatus::Processing, false) => Self::Stale,
            (JobStatus::Completed, true) => Self::Completed,
            (JobStatus::Failed, true) => Self::Failed,
            (JobStatus::Completed | JobStatus::Failed, false) => Self::Expired,
        }
    }
}

/// Monotonic progress counters.
///
/// Invariant: `processed == successful + failed` and `processed <= total`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ToSchema)]
pub struct JobProgress {
    /// Records in the input snapshot.
    pub total: u32,
    /// Records driven through the dispatcher so far.
    pub processed: u32,
    /// Records that produced data.
    pub successful: u32,
    /// Records that ended in a normalized error.
    pub failed: u32,
}

impl JobProgress {
    /// Completion percentage, rounded down.
    #[must_use]
    pub fn pct(&self) -> u32 {
        if self.total == 0 {
            return 100;
        }
        self.processed.saturating_mul(100) / self.total
    }
}

/// One durable job row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRecord {
    /// Job identifier.
    pub id: Uuid,
    /// Owning tenant.
    pub tenant_id: Uuid,
    /// Provider the batch targets.
    pub provider_id: String,
    /// Operation applied to every record.
    pub operation: Operation,
    /// Persisted status.
    pub status: JobStatus,
    /// Progress counters.
    pub progress: JobProgress,
    /// Input records as submitted (post-validation snapshot).
    pub input_snapshot: Vec<Value>,
    /// Request options applied to every record dispatch.
    pub options: crate::domain::RequestOptions,
    /// Encoded outputs, populated at completion.
    pub output: Option<Value>,
    /// Failure details for failed jobs.
    pub error_details: Option<String>,
    /// Submission instant.
    pub created_at: DateTime<Utc>,
    /// First claim instant.
    pub started_at: Option<DateTime<Utc>>,
    /// Terminal transition instant.
    pub completed_at: Option<DateTime<Utc>>,
}

/// Log severity for job log entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum JobLogLevel {
    /// Informational progress notes.
    Info,
    /// Recoverable anomalies.
    Warn,
    /// Per-record or job-level failures.
    Error,
}

impl JobLogLevel {
    /// Wire identifier.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }
}

/// One append-only job log line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct JobLogEntry {
    /// Owning job.
    pub job_id: Uuid,
    /// Severity.
    pub level: JobLogLevel,
    /// Message, including the record index for per-record failures.
    pub message: String,
    /// Append instant.
    pub ts: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(JobStatus::Queued, true, DisplayStatus::Queued)]
    #[case(JobStatus::Queued, false, DisplayStatus::Queued)]
    #[case(JobStatus::Processing, true, DisplayStatus::Processing)]
    #[case(JobStatus::Processing, false, DisplayStatus::Stale)]
    #[case(JobStatus::Completed, true, DisplayStatus::Completed)]
    #[case(JobStatus::Completed, false, DisplayStatus::Expired)]
    #[case(JobStatus::Failed, true, DisplayStatus::Failed)]
    #[case(JobStatus::Failed, false, DisplayStatus::Expired)]
    fn display_status_derivation(
        #[case] status: JobStatus,
        #[case] in_queue: bool,
        #[case] expected: DisplayStatus,
    ) {
        assert_eq!(DisplayStatus::derive(status, in_queue), expected);
    }

    #[test]
    fn pct_rounds_down_and_handles_empty_totals() {
        let progress = JobProgress {
            total: 3,
            processed: 1,
            successful: 1,
            failed: 0,
        };
        assert_eq!(progress.pct(), 33);
        assert_eq!(JobProgress::default().pct(), 100);
    }
}
