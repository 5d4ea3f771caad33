//! Driven port for per-call usage analytics rows.
//!
//! Recording is best-effort: a failed append never fails the dispatch that
//! produced it.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::{ErrorCode, Operation};

use super::define_port_error;

/// One dispatched-call sample.
#[derive(Debug, Clone, PartialEq)]
pub struct UsageSample {
    /// Calling tenant.
    pub tenant_id: Uuid,
    /// Provider that served the call.
    pub provider_id: String,
    /// Operation executed.
    pub operation: Operation,
    /// Normalized outcome; `None` for success.
    pub error_code: Option<ErrorCode>,
    /// Wall-clock elapsed for the dispatch.
    pub response_time_ms: u64,
    /// Credits charged.
    pub credits_used: u32,
    /// Sample instant.
    pub ts: DateTime<Utc>,
}

define_port_error! {
    /// Errors surfaced by usage persistence.
    pub enum UsageRecorderError {
        /// Pool or connection failure.
        Connection { message: String } =>
            "usage store connection failed: {message}",
        /// Query execution failure.
        Query { message: String } =>
            "usage store query failed: {message}",
    }
}

/// Port for appending usage samples.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait UsageRecorder: Send + Sync {
    /// Append one sample.
    async fn record(&self, sample: UsageSample) -> Result<(), UsageRecorderError>;
}

/// Fixture recorder that drops samples.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopUsageRecorder;

#[async_trait]
impl UsageRecorder for NoopUsageRecorder {
    async fn record(&self, _sample: UsageSample) -> Result<(), UsageRecorderError> {
        Ok(())
    }
}
