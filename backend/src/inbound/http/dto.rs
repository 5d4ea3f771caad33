//! Wire DTOs for the thin HTTP edge.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::domain::jobs::JobDetails;
use crate::domain::{
    DisplayStatus, JobLogEntry, JobProgress, JobRecord, JobStatus, Operation, RequestOptions,
};

/// Single-record execution request.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct ExecuteRequestDto {
    /// Target provider id.
    pub provider_id: String,
    /// Operation to execute.
    pub operation: Operation,
    /// Normalized operation parameters.
    #[schema(value_type = Object)]
    pub params: Map<String, Value>,
    /// Caller options.
    #[serde(default)]
    pub options: RequestOptions,
}

/// Bulk submission request.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct BulkRequestDto {
    /// Target provider id.
    pub provider_id: String,
    /// Operation applied to every record.
    pub operation: Operation,
    /// Input records (1..=10000).
    #[schema(value_type = Vec<Object>)]
    pub records: Vec<Map<String, Value>>,
    /// Caller options applied to every record.
    #[serde(default)]
    pub options: RequestOptions,
}

/// Credential creation request.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct AddCredentialDto {
    /// Tenant-chosen label.
    pub label: String,
    /// Raw secret material (encrypted at rest).
    pub api_key: String,
}

/// Credential patch request.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct UpdateCredentialDto {
    /// Replacement label.
    #[serde(default)]
    pub label: Option<String>,
    /// Replacement secret material.
    #[serde(default)]
    pub api_key: Option<String>,
}

/// Job view returned by the detail endpoint.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct JobDetailsDto {
    /// Job identifier.
    pub id: Uuid,
    /// Persisted status.
    pub status: JobStatus,
    /// Display hint derived from queue presence.
    pub display_status: DisplayStatus,
    /// Target provider.
    pub provider_id: String,
    /// Operation applied to every record.
    pub operation: Operation,
    /// Counter snapshot.
    pub progress: JobProgress,
    /// Submission instant.
    pub created_at: DateTime<Utc>,
    /// Terminal instant, when reached.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    /// Append-only log lines.
    pub logs: Vec<JobLogEntry>,
    /// Persisted outputs.
    pub results: Vec<Value>,
}

impl From<JobDetails> for JobDetailsDto {
    fn from(details: JobDetails) -> Self {
        Self {
            id: details.job.id,
            status: details.job.status,
            display_status: details.display_status,
            provider_id: details.job.provider_id,
            operation: details.job.operation,
            progress: details.job.progress,
            created_at: details.job.created_at,
            completed_at: details.job.completed_at,
            logs: details.logs,
            results: details.results,
        }
    }
}

/// Compact job view returned by the list endpoint.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct JobSummaryDto {
    /// Job identifier.
    pub id: Uuid,
    /// Persisted status.
    pub status: JobStatus,
    /// Target provider.
    pub provider_id: String,
    /// Operation applied to every record.
    pub operation: Operation,
    /// Counter snapshot.
    pub progress: JobProgress,
    /// Submission instant.
    pub created_at: DateTime<Utc>,
    /// Terminal instant, when reached.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl From<JobRecord> for JobSummaryDto {
    fn from(job: JobRecord) -> Self {
        Self {
            id: job.id,
            status: job.status,
            provider_id: job.provider_id,
            operation: job.operation,
            progress: job.progress,
            created_at: job.created_at,
            completed_at: job.completed_at,
        }
    }
}

/// Catalog entry returned by the provider list endpoint.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ProviderSummaryDto {
    /// Canonical provider id.
    pub id: String,
    /// Display name.
    pub display_name: String,
    /// Catalog category.
    pub category: crate::domain::ProviderCategory,
    /// Operations the provider exposes.
    pub operations: Vec<Operation>,
}

impl From<&crate::domain::ProviderDescriptor> for ProviderSummaryDto {
    fn from(descriptor: &crate::domain::ProviderDescriptor) -> Self {
        Self {
            id: descriptor.id.clone(),
            display_name: descriptor.display_name.clone(),
            category: descriptor.category,
            operations: descriptor.supported_operations(),
        }
    }
}

/// Provider health probe result.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ProviderHealthDto {
    /// Whether the provider answered the probe.
    pub ok: bool,
    /// Optional diagnostic message.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Cancellation acknowledgement.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct CancelAckDto {
    /// Job identifier.
    pub job_id: Uuid,
    /// Status observed when the cancel was accepted.
    pub status: JobStatus,
}
