//! Driven port for the durable FIFO job queue.
//!
//! Delivery is at-least-once: a message claimed by a worker that dies is
//! requeued by the stale sweep and delivered again, so the worker must stay
//! idempotent relative to the Job Store.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::define_port_error;

/// Queue entry state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueEntryState {
    /// Waiting for a worker.
    Queued,
    /// Claimed by a worker.
    Running,
    /// Finished successfully; retained per policy.
    Completed,
    /// Finished in failure; retained per policy.
    Failed,
}

impl QueueEntryState {
    /// Wire identifier.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

/// A claimed delivery handed to a worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueMessage {
    /// Queue entry identifier (ack handle).
    pub id: Uuid,
    /// Job the message drives.
    pub job_id: Uuid,
    /// Delivery count including this one.
    pub attempts: u32,
}

/// One queue row, as visible to status lookups.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueEntry {
    /// Queue entry identifier.
    pub id: Uuid,
    /// Job the entry drives.
    pub job_id: Uuid,
    /// Higher values are claimed first within the FIFO.
    pub priority: i32,
    /// Entry state.
    pub state: QueueEntryState,
    /// Delivery count.
    pub attempts: u32,
    /// Enqueue instant.
    pub enqueued_at: DateTime<Utc>,
    /// Latest claim instant.
    pub started_at: Option<DateTime<Utc>>,
    /// Terminal instant.
    pub finished_at: Option<DateTime<Utc>>,
}

/// Retention caps applied by the periodic sweep.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetentionPolicy {
    /// Maximum age of completed entries.
    pub completed_max_age: Duration,
    /// Maximum number of completed entries.
    pub completed_max_entries: usize,
    /// Maximum age of failed entries.
    pub failed_max_age: Duration,
    /// Maximum number of failed entries.
    pub failed_max_entries: usize,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self {
            completed_max_age: Duration::from_secs(60 * 60),
            completed_max_entries: 100,
            failed_max_age: Duration::from_secs(24 * 60 * 60),
            failed_max_entries: 50,
        }
    }
}

define_port_error! {
    /// Errors surfaced by the durable queue.
    pub enum JobQueueError {
        /// Pool or connection failure.
        Connection { message: String } =>
            "job queue connection failed: {message}",
        /// Query execution failure.
        Query { message: String } =>
            "job queue query failed: {message}",
        /// The addressed queue entry does not exist.
        MissingEntry { id: Uuid } =>
            "queue entry {id} not found",
    }
}

/// Port for the durable job queue.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait JobQueue: Send + Sync {
    /// Enqueue one message for `job_id`.
    async fn enqueue(&self, job_id: Uuid, priority: i32) -> Result<(), JobQueueError>;

    /// Claim the next queued entry (highest priority, then FIFO), or `None`
    /// when the queue is empty. Claims are exclusive across workers.
    async fn claim_next(&self) -> Result<Option<QueueMessage>, JobQueueError>;

    /// Ack a claimed entry as completed.
    async fn complete(&self, entry_id: Uuid) -> Result<(), JobQueueError>;

    /// Ack a claimed entry as failed.
    async fn fail(&self, entry_id: Uuid, reason: String) -> Result<(), JobQueueError>;

    /// Look up the queue entry for a job, newest first when redelivered.
    async fn find(&self, job_id: Uuid) -> Result<Option<QueueEntry>, JobQueueError>;

    /// Requeue running entries older than `claim_timeout` (crashed workers).
    /// Returns the number of entries requeued.
    async fn requeue_stale(&self, claim_timeout: Duration) -> Result<u64, JobQueueError>;

    /// Delete terminal entries beyond the retention caps. Returns the
    /// number of entries removed.
    async fn sweep_retention(&self, policy: RetentionPolicy) -> Result<u64, JobQueueError>;
}

/// In-memory FIFO fixture used by worker and service tests.
#[derive(Debug, Default)]
pub struct FixtureJobQueue {
    state: Mutex<FixtureQueueState>,
}

#[derive(Debug, Default)]
struct FixtureQueueState {
    pending: VecDeque<QueueEntry>,
    entries: Vec<QueueEntry>,
}

impl FixtureJobQueue {
    /// Empty fixture.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, FixtureQueueState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Drop a job's entries entirely, simulating retention eviction.
    pub fn evict_job(&self, job_id: Uuid) {
        let mut state = self.lock();
        state.pending.retain(|entry| entry.job_id != job_id);
        state.entries.retain(|entry| entry.job_id != job_id);
    }
}

#[async_trait]
impl JobQueue for FixtureJobQueue {
    async fn enqueue(&self, job_id: Uuid, priority: i32) -> Result<(), JobQueueError> {
        let entry = QueueEntry {
            id: Uuid::new_v4(),
            job_id,
            priority,
            state: QueueEntryState::Queued,
            attempts: 0,
            enqueued_at: Utc::now(),
            started_at: None,
            finished_at: None,
        };
        let mut state = self.lock();
        state.entries.push(entry.clone());
        state.pending.push_back(entry);
        Ok(())
    }

    async fn claim_next(&self) -> Result<Option<QueueMessage>, JobQueueError> {
        let mut state = self.lock();
        let Some(mut entry) = state.pending.pop_front() else {
            return Ok(None);
        };
        entry.state = QueueEntryState::Running;
        entry.attempts += 1;
        entry.started_at = Some(Utc::now());
        let message = QueueMessage {
            id: entry.id,
            job_id: entry.job_id,
            attempts: entry.attempts,
        };
        if let Some(stored) = state.entries.iter_mut().find(|e| e.id == entry.id) {
            *stored = entry;
        }
        Ok(Some(message))
    }

    async fn complete(&self, entry_id: Uuid) -> Result<(), JobQueueError> {
        self.finish(entry_id, QueueEntryState::Completed)
    }

    async fn fail(&self, entry_id: Uuid, _reason: String) -> Result<(), JobQueueError> {
        self.finish(entry_id, QueueEntryState::Failed)
    }

    async fn find(&self, job_id: Uuid) -> Result<Option<QueueEntry>, JobQueueError> {
        Ok(self
            .lock()
            .entries
            .iter()
            .filter(|entry| entry.job_id == job_id)
            .max_by_key(|entry| entry.enqueued_at)
            .cloned())
    }

    async fn requeue_stale(&self, claim_timeout: Duration) -> Result<u64, JobQueueError> {
        let cutoff = Utc::now()
            - chrono::Duration::from_std(claim_timeout)
                .unwrap_or_else(|_| chrono::Duration::seconds(0));
        let mut state = self.lock();
        let mut requeued = 0;
        let mut pending = Vec::new();
        for entry in state
            .entries
            .iter_mut()
            .filter(|e| e.state == QueueEntryState::Running)
        {
            if entry.started_at.is_some_and(|at| at < cutoff) {
                entry.state = QueueEntryState::Queued;
                entry.started_at = None;
                pending.push(entry.clone());
                requeued += 1;
            }
        }
        state.pending.extend(pending);
        Ok(requeued)
    }

    async fn sweep_retention(&self, policy: RetentionPolicy) -> Result<u64, JobQueueError> {
        let now = Utc::now();
        let expired = |entry: &QueueEntry, max_age: Duration| {
            entry.finished_at.is_some_and(|at| {
                now - at
                    > chrono::Duration::from_std(max_age)
                        .unwrap_or_else(|_| chrono::Duration::MAX)
            })
        };
        let mut state = self.lock();
        let before = state.entries.len();
        state.entries.retain(|entry| match entry.state {
            QueueEntryState::Completed => !expired(entry, policy.completed_max_age),
            QueueEntryState::Failed => !expired(entry, policy.failed_max_age),
            QueueEntryState::Queued | QueueEntryState::Running => true,
        });
        for (cap, terminal) in [
            (policy.completed_max_entries, QueueEntryState::Completed),
            (policy.failed_max_entries, QueueEntryState::Failed),
        ] {
            let mut terminal_entries: Vec<Uuid> = state
                .entries
                .iter()
                .filter(|e| e.state == terminal)
                .map(|e| e.id)
                .collect();
            if terminal_entries.len() > cap {
                terminal_entries.truncate(terminal_entries.len() - cap);
                state.entries.retain(|e| !terminal_entries.contains(&e.id));
            }
        }
        Ok(u64::try_from(before - state.entries.len()).unwrap_or(u64::MAX))
    }
}

impl FixtureJobQueue {
    fn finish(&self, entry_id: Uuid, state: QueueEntryState) -> Result<(), JobQueueError> {
        let mut guard = self.lock();
        let entry = guard
            .entries
            .iter_mut()
            .find(|entry| entry.id == entry_id)
            .ok_or(JobQueueError::MissingEntry { id: entry_id })?;
        entry.state = state;
        entry.finished_at = Some(Utc::now());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn claims_are_fifo_and_exclusive() {
        let queue = FixtureJobQueue::new();
        let first = Uuid::new_v4();
        let second = Uuid::new_v4();
        queue.enqueue(first, 0).await.expect("enqueue");
        queue.enqueue(second, 0).await.expect("enqueue");

        let a = queue.claim_next().await.expect("claim").expect("message");
        let b = queue.claim_next().await.expect("claim").expect("message");
        assert_eq!(a.job_id, first);
        assert_eq!(b.job_id, second);
        assert!(queue.claim_next().await.expect("claim").is_none());
    }

    #[tokio::test]
    async fn eviction_leaves_no_entry_behind() {
        let queue = FixtureJobQueue::new();
        let job_id = Uuid::new_v4();
        queue.enqueue(job_id, 0).await.expect("enqueue");
        let message = queue.claim_next().await.expect("claim").expect("message");
        queue.complete(message.id).await.expect("ack");

        queue.evict_job(job_id);
        assert!(queue.find(job_id).await.expect("find").is_none());
    }
}
