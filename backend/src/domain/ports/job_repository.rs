//! Driven port for durable job rows and their append-only logs.
//!
//! The Job Store is the source of truth for job state. Counter updates are
//! atomic single-row writes; transitions out of a terminal state are
//! rejected at this boundary.

use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use uuid::Uuid;

use crate::domain::{JobLogEntry, JobLogLevel, JobProgress, JobRecord, JobStatus, Operation};

use super::define_port_error;

/// Insertable job row; persisted with status `queued`.
#[derive(Debug, Clone, PartialEq)]
pub struct NewJob {
    /// Pre-assigned job identifier.
    pub id: Uuid,
    /// Owning tenant.
    pub tenant_id: Uuid,
    /// Target provider (lowercase id).
    pub provider_id: String,
    /// Operation applied to every record.
    pub operation: Operation,
    /// Validated input records.
    pub input_snapshot: Vec<Value>,
    /// Request options applied to every record dispatch.
    pub options: crate::domain::RequestOptions,
}

/// Outcome of claiming a job for processing.
#[derive(Debug, Clone, PartialEq)]
pub enum ProcessingStart {
    /// The job transitioned to (or already was) `processing`.
    Started {
        /// Current row, including any prior progress.
        job: JobRecord,
    },
    /// The job is already terminal; redelivery must be acked as a no-op.
    AlreadyTerminal {
        /// The terminal status observed.
        status: JobStatus,
    },
}

define_port_error! {
    /// Errors surfaced by job persistence.
    pub enum JobRepositoryError {
        /// Pool or connection failure.
        Connection { message: String } =>
            "job store connection failed: {message}",
        /// Query execution failure.
        Query { message: String } =>
            "job store query failed: {message}",
        /// The addressed job does not exist.
        MissingJob { id: Uuid } =>
            "job {id} not found",
        /// A terminal row was addressed by a mutating transition.
        TerminalState { id: Uuid } =>
            "job {id} is already terminal",
    }
}

/// Port for durable job state.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait JobRepository: Send + Sync {
    /// Insert a job with status `queued` and `total` set from the snapshot.
    async fn create(&self, job: NewJob) -> Result<JobRecord, JobRepositoryError>;

    /// Claim the job: transition to `processing`, stamping `started_at` on
    /// first claim. Terminal rows report [`ProcessingStart::AlreadyTerminal`].
    async fn mark_processing(&self, job_id: Uuid) -> Result<ProcessingStart, JobRepositoryError>;

    /// Flush progress counters. Updates are monotonic; a flush carrying
    /// smaller counters than the row is ignored.
    async fn update_progress(
        &self,
        job_id: Uuid,
        progress: JobProgress,
    ) -> Result<(), JobRepositoryError>;

    /// Terminal success: persist outputs and final counters.
    async fn complete(
        &self,
        job_id: Uuid,
        output: Value,
        progress: JobProgress,
    ) -> Result<(), JobRepositoryError>;

    /// Terminal failure: persist error details and final counters.
    async fn fail(
        &self,
        job_id: Uuid,
        error_details: String,
        progress: JobProgress,
    ) -> Result<(), JobRepositoryError>;

    /// Fetch one job scoped by tenant.
    async fn get(
        &self,
        tenant_id: Uuid,
        job_id: Uuid,
    ) -> Result<Option<JobRecord>, JobRepositoryError>;

    /// List a tenant's jobs, newest first.
    async fn list(&self, tenant_id: Uuid) -> Result<Vec<JobRecord>, JobRepositoryError>;

    /// Append one log line.
    async fn append_log(
        &self,
        job_id: Uuid,
        level: JobLogLevel,
        message: String,
    ) -> Result<(), JobRepositoryError>;

    /// Fetch a job's log lines in append order.
    async fn logs(&self, job_id: Uuid) -> Result<Vec<JobLogEntry>, JobRepositoryError>;
}

/// In-memory fixture used by service and worker tests.
#[derive(Debug, Default)]
pub struct FixtureJobRepository {
    state: Mutex<FixtureState>,
}

#[derive(Debug, Default)]
struct FixtureState {
    jobs: Vec<JobRecord>,
    logs: Vec<JobLogEntry>,
}

impl FixtureJobRepository {
    /// Empty fixture.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, FixtureState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

#[async_trait]
impl JobRepository for FixtureJobRepository {
    async fn create(&self, job: NewJob) -> Result<JobRecord, JobRepositoryError> {
        let total = u32::try_from(job.input_snapshot.len())
            .map_err(|_| JobRepositoryError::query("input snapshot exceeds u32 range"))?;
        let record = JobRecord {
            id: job.id,
            tenant_id: job.tenant_id,
            provider_id: job.provider_id,
            operation: job.operation,
            status: JobStatus::Queued,
            progress: JobProgress {
                total,
                ..JobProgress::default()
            },
            input_snapshot: job.input_snapshot,
            options: job.options,
            output: None,
            error_details: None,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
        };
        self.lock().jobs.push(record.clone());
        Ok(record)
    }

    async fn mark_processing(&self, job_id: Uuid) -> Result<ProcessingStart, JobRepositoryError> {
        let mut state = self.lock();
        let job = state
            .jobs
            .iter_mut()
            .find(|job| job.id == job_id)
            .ok_or(JobRepositoryError::MissingJob { id: job_id })?;
        if job.status.is_terminal() {
            return Ok(ProcessingStart::AlreadyTerminal { status: job.status });
        }
        job.status = JobStatus::Processing;
        job.started_at.get_or_insert_with(Utc::now);
        Ok(ProcessingStart::Started { job: job.clone() })
    }

    async fn update_progress(
        &self,
        job_id: Uuid,
        progress: JobProgress,
    ) -> Result<(), JobRepositoryError> {
        let mut state = self.lock();
        let job = state
            .jobs
            .iter_mut()
            .find(|job| job.id == job_id)
            .ok_or(JobRepositoryError::MissingJob { id: job_id })?;
        if job.status.is_terminal() {
            return Err(JobRepositoryError::TerminalState { id: job_id });
        }
        if progress.processed >= job.progress.processed {
            job.progress = JobProgress {
                total: job.progress.total,
                ..progress
            };
        }
        Ok(())
    }

    async fn complete(
        &self,
        job_id: Uuid,
        output: Value,
        progress: JobProgress,
    ) -> Result<(), JobRepositoryError> {
        let mut state = self.lock();
        let job = state
            .jobs
            .iter_mut()
            .find(|job| job.id == job_id)
            .ok_or(JobRepositoryError::MissingJob { id: job_id })?;
        if job.status.is_terminal() {
            return Err(JobRepositoryError::TerminalState { id: job_id });
        }
        job.status = JobStatus::Completed;
        job.progress = JobProgress {
            total: job.progress.total,
            ..progress
        };
        job.output = Some(output);
        job.completed_at = Some(Utc::now());
        Ok(())
    }

    async fn fail(
        &self,
        job_id: Uuid,
        error_details: String,
        progress: JobProgress,
    ) -> Result<(), JobRepositoryError> {
        let mut state = self.lock();
        let job = state
            .jobs
            .iter_mut()
            .find(|job| job.id == job_id)
            .ok_or(JobRepositoryError::MissingJob { id: job_id })?;
        if job.status.is_terminal() {
            return Err(JobRepositoryError::TerminalState { id: job_id });
        }
        job.status = JobStatus::Failed;
        job.progress = JobProgress {
            total: job.progress.total,
            ..progress
        };
        job.error_details = Some(error_details);
        job.completed_at = Some(Utc::now());
        Ok(())
    }

    async fn get(
        &self,
        tenant_id: Uuid,
        job_id: Uuid,
    ) -> Result<Option<JobRecord>, JobRepositoryError> {
        Ok(self
            .lock()
            .jobs
            .iter()
            .find(|job| job.id == job_id && job.tenant_id == tenant_id)
            .cloned())
    }

    async fn list(&self, tenant_id: Uuid) -> Result<Vec<JobRecord>, JobRepositoryError> {
        let mut jobs: Vec<JobRecord> = self
            .lock()
            .jobs
            .iter()
            .filter(|job| job.tenant_id == tenant_id)
            .cloned()
            .collect();
        jobs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(jobs)
    }

    async fn append_log(
        &self,
        job_id: Uuid,
        level: JobLogLevel,
        message: String,
    ) -> Result<(), JobRepositoryError> {
        self.lock().logs.push(JobLogEntry {
            job_id,
            level,
            message,
            ts: Utc::now(),
        });
        Ok(())
    }

    async fn logs(&self, job_id: Uuid) -> Result<Vec<JobLogEntry>, JobRepositoryError> {
        Ok(self
            .lock()
            .logs
            .iter()
            .filter(|entry| entry.job_id == job_id)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_job(records: usize) -> NewJob {
        NewJob {
            id: Uuid::new_v4(),
            tenant_id: Uuid::new_v4(),
            provider_id: "hunter".to_owned(),
            operation: Operation::FindEmail,
            input_snapshot: vec![serde_json::json!({}); records],
            options: crate::domain::RequestOptions::default(),
        }
    }

    #[tokio::test]
    async fn terminal_rows_reject_further_transitions() {
        let repo = FixtureJobRepository::new();
        let job = repo.create(new_job(1)).await.expect("create");
        repo.mark_processing(job.id).await.expect("claim");
        repo.complete(job.id, serde_json::json!([]), job.progress)
            .await
            .expect("complete");

        let err = repo
            .fail(job.id, "late".to_owned(), job.progress)
            .await
            .expect_err("terminal row must reject fail");
        assert!(matches!(err, JobRepositoryError::TerminalState { .. }));

        let redelivery = repo.mark_processing(job.id).await.expect("redelivery");
        assert!(matches!(
            redelivery,
            ProcessingStart::AlreadyTerminal {
                status: JobStatus::Completed
            }
        ));
    }

    #[tokio::test]
    async fn progress_updates_are_monotonic() {
        let repo = FixtureJobRepository::new();
        let job = repo.create(new_job(10)).await.expect("create");
        repo.mark_processing(job.id).await.expect("claim");

        let forward = JobProgress {
            total: 10,
            processed: 5,
            successful: 4,
            failed: 1,
        };
        repo.update_progress(job.id, forward).await.expect("flush");

        let stale = JobProgress {
            total: 10,
            processed: 2,
            successful: 2,
            failed: 0,
        };
        repo.update_progress(job.id, stale).await.expect("flush");

        let row = repo
            .get(job.tenant_id, job.id)
            .await
            .expect("query")
            .expect("exists");
        assert_eq!(row.progress.processed, 5, "stale flush must be ignored");
    }
}
