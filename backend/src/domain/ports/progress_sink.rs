//! Driven port for job progress events consumed by the edge.
//!
//! Delivery is best-effort; the Job Store remains the canonical state.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::domain::{JobProgress, JobStatus};

/// One progress or terminal event for a job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ProgressEvent {
    /// Job the event describes.
    pub job_id: Uuid,
    /// Owning tenant.
    pub tenant_id: Uuid,
    /// Current persisted status.
    pub status: JobStatus,
    /// Counter snapshot.
    pub progress: JobProgress,
    /// Completion percentage.
    pub pct: u32,
}

impl ProgressEvent {
    /// Build an event from a counter snapshot.
    #[must_use]
    pub fn new(job_id: Uuid, tenant_id: Uuid, status: JobStatus, progress: JobProgress) -> Self {
        Self {
            job_id,
            tenant_id,
            status,
            progress,
            pct: progress.pct(),
        }
    }
}

/// Port for publishing progress events.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ProgressSink: Send + Sync {
    /// Publish one event; failures are swallowed by callers.
    async fn publish(&self, event: ProgressEvent);
}

/// Fixture sink that discards events.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopProgressSink;

#[async_trait]
impl ProgressSink for NoopProgressSink {
    async fn publish(&self, _event: ProgressEvent) {}
}
