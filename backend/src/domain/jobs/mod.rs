//! Job submission service and supporting types.
//!
//! The service validates submissions, persists the job row, and enqueues
//! exactly one queue message; the worker (see [`worker`]) drives the batch.
//! Single-record execution shares the registry/dispatcher pipeline without
//! touching the Job Store.

mod progress;
mod worker;

pub use progress::BroadcastProgressSink;
pub use worker::{JobWorkerPool, WorkerPoolConfig};

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use serde_json::{Map, Value};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::domain::dispatch::Dispatcher;
use crate::domain::normalize;
use crate::domain::ports::{JobQueue, JobRepository, NewJob};
use crate::domain::registry::ProviderRegistry;
use crate::domain::{
    CancelToken, DisplayStatus, EnrichmentRequest, EnrichmentResponse, Error, ErrorCode,
    JobLogEntry, JobRecord, JobStatus, Operation, RequestOptions, ResponseMetadata,
};

/// Upper bound on records per bulk submission.
pub const MAX_BULK_RECORDS: usize = 10_000;

/// Cooperative cancel flags shared between the service and workers.
#[derive(Debug, Clone, Default)]
pub struct CancellationRegistry {
    tokens: Arc<Mutex<HashMap<Uuid, CancelToken>>>,
}

impl CancellationRegistry {
    /// Empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fetch (or create) the token observed by a job's worker.
    #[must_use]
    pub fn token_for(&self, job_id: Uuid) -> CancelToken {
        let mut tokens = self.lock();
        tokens.entry(job_id).or_default().clone()
    }

    /// Trigger a job's token, if the job is known or future.
    pub fn cancel(&self, job_id: Uuid) {
        self.lock().entry(job_id).or_default().cancel();
    }

    /// Drop a terminal job's token.
    pub fn remove(&self, job_id: Uuid) {
        self.lock().remove(&job_id);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<Uuid, CancelToken>> {
        match self.tokens.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

/// Acknowledgement returned by a bulk submission.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, ToSchema)]
pub struct BulkSubmission {
    /// Durable job identifier.
    pub job_id: Uuid,
    /// Always `queued` at submission.
    pub status: JobStatus,
    /// Records accepted.
    pub total: u32,
}

/// Full job view served to the edge.
#[derive(Debug, Clone, PartialEq)]
pub struct JobDetails {
    /// The persisted row.
    pub job: JobRecord,
    /// Display hint derived from queue presence.
    pub display_status: DisplayStatus,
    /// Append-only log lines.
    pub logs: Vec<JobLogEntry>,
    /// Persisted outputs (empty until completion).
    pub results: Vec<Value>,
}

/// Submission-facing service over jobs and single executions.
pub struct JobService {
    jobs: Arc<dyn JobRepository>,
    queue: Arc<dyn JobQueue>,
    registry: Arc<ProviderRegistry>,
    dispatcher: Arc<Dispatcher>,
    cancellations: CancellationRegistry,
}

impl JobService {
    /// Build the service.
    pub fn new(
        jobs: Arc<dyn JobRepository>,
        queue: Arc<dyn JobQueue>,
        registry: Arc<ProviderRegistry>,
        dispatcher: Arc<Dispatcher>,
        cancellations: CancellationRegistry,
    ) -> Self {
        Self {
            jobs,
            queue,
            registry,
            dispatcher,
            cancellations,
        }
    }

    /// Execute one record synchronously through the full pipeline.
    ///
    /// Always returns a normalized response; setup failures (unknown
    /// provider, missing credential, invalid input) are carried in `error`.
    pub async fn execute_single(
        &self,
        tenant_id: Uuid,
        provider_id: &str,
        request: EnrichmentRequest,
    ) -> EnrichmentResponse {
        let operation = request.operation;
        let request = match normalize::normalize_request(&request) {
            Ok(request) => request,
            Err(error) => return edge_failure(provider_id, operation, error),
        };

        let instance = match self.registry.get(tenant_id, provider_id).await {
            Ok(instance) => instance,
            Err(error) => return edge_failure(provider_id, operation, error),
        };

        let cancel = CancelToken::new();
        let response = self.dispatcher.execute(&instance, &request, &cancel).await;
        match response.error.as_ref().map(Error::code) {
            Some(ErrorCode::Auth) => self.registry.note_auth_failure(&instance),
            None => self.registry.note_auth_success(&instance),
            Some(_) => {}
        }
        response
    }

    /// Accept a bulk submission: persist the job row and enqueue one
    /// message.
    ///
    /// # Errors
    ///
    /// `INVALID_INPUT` for an empty or oversized batch, `NOT_FOUND` for an
    /// unknown provider, `OPERATION_UNSUPPORTED` when the provider does not
    /// expose the operation. Per-record validation is deferred to the
    /// worker so one bad row cannot reject the batch.
    pub async fn submit_bulk(
        &self,
        tenant_id: Uuid,
        provider_id: &str,
        operation: Operation,
        records: Vec<Map<String, Value>>,
        options: RequestOptions,
    ) -> Result<BulkSubmission, Error> {
        if records.is_empty() {
            return Err(Error::invalid_input("bulk submissions require at least one record"));
        }
        if records.len() > MAX_BULK_RECORDS {
            return Err(Error::invalid_input(format!(
                "bulk submissions are capped at {MAX_BULK_RECORDS} records, got {}",
                records.len()
            )));
        }

        let descriptor = self
            .registry
            .catalog()
            .get(provider_id)
            .ok_or_else(|| Error::not_found(format!("unknown provider \"{provider_id}\"")))?;
        if !descriptor.supports(operation) {
            return Err(Error::operation_unsupported(format!(
                "provider \"{}\" does not support {operation}",
                descriptor.id
            )));
        }

        let job_id = Uuid::new_v4();
        let job = self
            .jobs
            .create(NewJob {
                id: job_id,
                tenant_id,
                provider_id: descriptor.id.clone(),
                operation,
                input_snapshot: records.into_iter().map(Value::Object).collect(),
                options,
            })
            .await
            .map_err(|error| Error::internal(error.to_string()))?;

        self.queue
            .enqueue(job.id, 0)
            .await
            .map_err(|error| Error::internal(error.to_string()))?;

        Ok(BulkSubmission {
            job_id: job.id,
            status: JobStatus::Queued,
            total: job.progress.total,
        })
    }

    /// Fetch a job with its logs, results, and display hint.
    ///
    /// # Errors
    ///
    /// `NOT_FOUND` when the Job Store has no row for the tenant.
    pub async fn get_job(&self, tenant_id: Uuid, job_id: Uuid) -> Result<JobDetails, Error> {
        let job = self
            .jobs
            .get(tenant_id, job_id)
            .await
            .map_err(|error| Error::internal(error.to_string()))?
            .ok_or_else(|| Error::not_found(format!("job {job_id} not found")))?;

        let queue_entry_present = self
            .queue
            .find(job_id)
            .await
            .map_err(|error| Error::internal(error.to_string()))?
            .is_some();
        let logs = self
            .jobs
            .logs(job_id)
            .await
            .map_err(|error| Error::internal(error.to_string()))?;

        let results = match &job.output {
            Some(Value::Array(items)) => items.clone(),
            Some(other) => vec![other.clone()],
            None => Vec::new(),
        };

        Ok(JobDetails {
            display_status: DisplayStatus::derive(job.status, queue_entry_present),
            job,
            logs,
            results,
        })
    }

    /// List the tenant's jobs in reverse chronological order.
    ///
    /// # Errors
    ///
    /// Propagates Job Store failures as `INTERNAL`.
    pub async fn list_jobs(&self, tenant_id: Uuid) -> Result<Vec<JobRecord>, Error> {
        self.jobs
            .list(tenant_id)
            .await
            .map_err(|error| Error::internal(error.to_string()))
    }

    /// Catalog descriptors visible to the edge.
    #[must_use]
    pub fn list_providers(&self) -> Vec<Arc<crate::domain::ProviderDescriptor>> {
        let mut descriptors = self.registry.catalog().list();
        descriptors.sort_by(|a, b| a.id.cmp(&b.id));
        descriptors
    }

    /// Probe one provider's reachability under the tenant's credential.
    ///
    /// # Errors
    ///
    /// Propagates resolution failures (`NOT_FOUND`, `AUTH`, ...).
    pub async fn provider_health(
        &self,
        tenant_id: Uuid,
        provider_id: &str,
    ) -> Result<crate::domain::ports::ProviderHealth, Error> {
        let instance = self.registry.get(tenant_id, provider_id).await?;
        Ok(instance.provider.health_check().await)
    }

    /// Request cooperative cancellation of a job.
    ///
    /// The worker observes the flag between records; an unclaimed job is
    /// cancelled as soon as a worker picks it up.
    ///
    /// # Errors
    ///
    /// `NOT_FOUND` when the tenant owns no such job.
    pub async fn cancel_job(&self, tenant_id: Uuid, job_id: Uuid) -> Result<JobStatus, Error> {
        let job = self
            .jobs
            .get(tenant_id, job_id)
            .await
            .map_err(|error| Error::internal(error.to_string()))?
            .ok_or_else(|| Error::not_found(format!("job {job_id} not found")))?;
        if !job.status.is_terminal() {
            self.cancellations.cancel(job_id);
        }
        Ok(job.status)
    }
}

fn edge_failure(provider_id: &str, operation: Operation, error: Error) -> EnrichmentResponse {
    EnrichmentResponse::failure(
        error,
        ResponseMetadata {
            provider: provider_id.to_ascii_lowercase(),
            operation,
            credits_used: 0,
            response_time_ms: 0,
            request_id: Uuid::new_v4(),
        },
    )
}

#[cfg(test)]
mod tests;
