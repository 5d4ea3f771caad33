//! Queue worker pool: claims queue messages and drives each job's records
//! through the dispatcher.
//!
//! The worker is idempotent relative to the Job Store: redelivery of a
//! terminal job acks without touching the row, and redelivery of an
//! interrupted job resumes at the persisted counter. A cooperative cancel
//! flag and the process shutdown signal are both checked between records.

use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;
use serde_json::{Value, json};
use tracing::{debug, error, info, warn};

use crate::domain::dispatch::Dispatcher;
use crate::domain::normalize;
use crate::domain::ports::{
    JobQueue, JobRepository, ProcessingStart, ProgressEvent, ProgressSink, QueueMessage,
    RetentionPolicy,
};
use crate::domain::registry::ProviderRegistry;
use crate::domain::{
    CancelToken, EnrichmentRequest, Error, ErrorCode, JobLogLevel, JobRecord, JobStatus,
};

use super::CancellationRegistry;

/// Counter flush cadence in records.
const FLUSH_EVERY: u32 = 10;

/// Worker pool tuning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerPoolConfig {
    /// Jobs processed in parallel.
    pub concurrency: usize,
    /// Idle delay between queue polls.
    pub poll_interval: Duration,
    /// Running entries older than this are requeued (crashed workers).
    pub claim_timeout: Duration,
    /// Cadence of retention and stale sweeps.
    pub sweep_interval: Duration,
    /// Retention caps for terminal queue entries.
    pub retention: RetentionPolicy,
}

impl Default for WorkerPoolConfig {
    fn default() -> Self {
        Self {
            concurrency: 5,
            poll_interval: Duration::from_millis(500),
            claim_timeout: Duration::from_secs(10 * 60),
            sweep_interval: Duration::from_secs(60),
            retention: RetentionPolicy::default(),
        }
    }
}

enum MessageOutcome {
    Completed,
    Failed(String),
}

enum RecordOutcome {
    Success(Value),
    Failure(Error),
}

/// Pool of queue workers plus the queue maintenance loop.
pub struct JobWorkerPool {
    jobs: Arc<dyn JobRepository>,
    queue: Arc<dyn JobQueue>,
    registry: Arc<ProviderRegistry>,
    dispatcher: Arc<Dispatcher>,
    progress: Arc<dyn ProgressSink>,
    cancellations: CancellationRegistry,
    config: WorkerPoolConfig,
}

impl JobWorkerPool {
    /// Build a pool.
    pub fn new(
        jobs: Arc<dyn JobRepository>,
        queue: Arc<dyn JobQueue>,
        registry: Arc<ProviderRegistry>,
        dispatcher: Arc<Dispatcher>,
        progress: Arc<dyn ProgressSink>,
        cancellations: CancellationRegistry,
        config: WorkerPoolConfig,
    ) -> Self {
        Self {
            jobs,
            queue,
            registry,
            dispatcher,
            progress,
            cancellations,
            config,
        }
    }

    /// Run the pool until `shutdown` fires, then drain: workers stop
    /// claiming and finish their in-flight job at the next record boundary.
    pub async fn run(self: Arc<Self>, shutdown: CancelToken) {
        let mut handles = Vec::with_capacity(self.config.concurrency.max(1) + 1);
        for worker_index in 0..self.config.concurrency.max(1) {
            let pool = Arc::clone(&self);
            let shutdown = shutdown.clone();
            handles.push(tokio::spawn(async move {
                pool.worker_loop(worker_index, &shutdown).await;
            }));
        }
        let maintenance_pool = Arc::clone(&self);
        let maintenance_shutdown = shutdown.clone();
        handles.push(tokio::spawn(async move {
            maintenance_pool.maintenance_loop(&maintenance_shutdown).await;
        }));

        for outcome in join_all(handles).await {
            if let Err(join_error) = outcome {
                error!(%join_error, "worker task aborted");
            }
        }
    }

    /// Process one claimed message end to end. Exposed for worker tests.
    pub async fn process_message(&self, message: QueueMessage, shutdown: &CancelToken) {
        let outcome = self.run_message(message, shutdown).await;
        let ack = match outcome {
            MessageOutcome::Completed => self.queue.complete(message.id).await,
            MessageOutcome::Failed(reason) => self.queue.fail(message.id, reason).await,
        };
        if let Err(ack_error) = ack {
            warn!(job = %message.job_id, %ack_error, "queue acknowledgement failed");
        }
    }

    async fn worker_loop(&self, worker_index: usize, shutdown: &CancelToken) {
        debug!(worker_index, "queue worker started");
        while !shutdown.is_cancelled() {
            match self.queue.claim_next().await {
                Ok(Some(message)) => {
                    self.process_message(message, shutdown).await;
                }
                Ok(None) => {
                    tokio::select! {
                        () = shutdown.cancelled() => {}
                        () = tokio::time::sleep(self.config.poll_interval) => {}
                    }
                }
                Err(claim_error) => {
                    warn!(worker_index, %claim_error, "queue claim failed");
                    tokio::select! {
                        () = shutdown.cancelled() => {}
                        () = tokio::time::sleep(self.config.poll_interval) => {}
                    }
                }
            }
        }
        debug!(worker_index, "queue worker drained");
    }

    async fn maintenance_loop(&self, shutdown: &CancelToken) {
        while !shutdown.is_cancelled() {
            tokio::select! {
                () = shutdown.cancelled() => break,
                () = tokio::time::sleep(self.config.sweep_interval) => {}
            }
            match self.queue.requeue_stale(self.config.claim_timeout).await {
                Ok(0) => {}
                Ok(requeued) => info!(requeued, "requeued stale queue entries"),
                Err(sweep_error) => warn!(%sweep_error, "stale requeue failed"),
            }
            match self.queue.sweep_retention(self.config.retention).await {
                Ok(0) => {}
                Ok(removed) => debug!(removed, "queue retention sweep removed entries"),
                Err(sweep_error) => warn!(%sweep_error, "retention sweep failed"),
            }
        }
    }

    async fn run_message(&self, message: QueueMessage, shutdown: &CancelToken) -> MessageOutcome {
        let job = match self.jobs.mark_processing(message.job_id).await {
            Ok(ProcessingStart::Started { job }) => job,
            Ok(ProcessingStart::AlreadyTerminal { status }) => {
                debug!(job = %message.job_id, status = status.as_str(), "redelivery of terminal job acked");
                return MessageOutcome::Completed;
            }
            Err(store_error) => {
                return MessageOutcome::Failed(format!("job claim failed: {store_error}"));
            }
        };

        let cancel = self.cancellations.token_for(job.id);
        self.emit(&job, JobStatus::Processing).await;

        // Setup gate: a job that cannot resolve its provider at all aborts
        // before any record is processed.
        if let Err(setup_error) = self.registry.get(job.tenant_id, &job.provider_id).await {
            let reason = format!("provider resolution failed: {setup_error}");
            return self.abort_job(&job, reason).await;
        }

        let mut progress = job.progress;
        let mut outputs: Vec<Value> = Vec::new();
        let start_index = progress.processed as usize;
        if start_index > 0 {
            info!(
                job = %job.id,
                resumed_at = start_index,
                "resuming redelivered job at the persisted counter"
            );
        }

        for (index, record) in job.input_snapshot.iter().enumerate().skip(start_index) {
            if shutdown.is_cancelled() {
                let reason = "worker shut down while the job was processing".to_owned();
                return self.abort_job_with_progress(&job, progress, reason).await;
            }
            if cancel.is_cancelled() {
                let reason = "job cancelled by tenant request".to_owned();
                return self.abort_job_with_progress(&job, progress, reason).await;
            }

            match self.process_record(&job, index, record, &cancel).await {
                RecordOutcome::Success(data) => {
                    outputs.push(json!({ "record": index, "data": data }));
                    progress.successful += 1;
                }
                RecordOutcome::Failure(record_error) => {
                    let log_line = format!(
                        "record {index} failed: {}: {}",
                        record_error.code().as_str(),
                        record_error.message()
                    );
                    if let Err(log_error) =
                        self.jobs.append_log(job.id, JobLogLevel::Error, log_line).await
                    {
                        warn!(job = %job.id, %log_error, "job log append failed");
                    }
                    progress.failed += 1;
                }
            }
            progress.processed += 1;

            if progress.processed % FLUSH_EVERY == 0
                && let Err(flush_error) = self.jobs.update_progress(job.id, progress).await
            {
                warn!(job = %job.id, %flush_error, "progress flush failed");
            }
            self.progress
                .publish(ProgressEvent::new(
                    job.id,
                    job.tenant_id,
                    JobStatus::Processing,
                    progress,
                ))
                .await;
        }

        let summary = format!(
            "completed: {} successful, {} failed of {} records",
            progress.successful, progress.failed, progress.total
        );
        if let Err(log_error) = self.jobs.append_log(job.id, JobLogLevel::Info, summary).await {
            warn!(job = %job.id, %log_error, "job log append failed");
        }
        if let Err(complete_error) = self
            .jobs
            .complete(job.id, Value::Array(outputs), progress)
            .await
        {
            return MessageOutcome::Failed(format!("job completion failed: {complete_error}"));
        }

        let mut terminal = job.clone();
        terminal.progress = progress;
        self.emit(&terminal, JobStatus::Completed).await;
        self.cancellations.remove(job.id);
        MessageOutcome::Completed
    }

    async fn process_record(
        &self,
        job: &JobRecord,
        index: usize,
        record: &Value,
        cancel: &CancelToken,
    ) -> RecordOutcome {
        let Some(params) = record.as_object() else {
            return RecordOutcome::Failure(Error::invalid_input(format!(
                "record {index} is not a JSON object"
            )));
        };
        let params = match normalize::normalize_record(job.operation, params) {
            Ok(params) => params,
            Err(validation_error) => return RecordOutcome::Failure(validation_error),
        };

        // Re-resolve per record: a cache hit when nothing changed, a fresh
        // instance after a credential rotation invalidated the pair.
        let instance = match self.registry.get(job.tenant_id, &job.provider_id).await {
            Ok(instance) => instance,
            Err(resolution_error) => return RecordOutcome::Failure(resolution_error),
        };

        let request = EnrichmentRequest {
            operation: job.operation,
            params,
            options: job.options.clone(),
        };
        let response = self.dispatcher.execute(&instance, &request, cancel).await;
        match (response.data, response.error) {
            (Some(data), _) => {
                self.registry.note_auth_success(&instance);
                RecordOutcome::Success(data)
            }
            (None, Some(dispatch_error)) => {
                if dispatch_error.code() == ErrorCode::Auth {
                    self.registry.note_auth_failure(&instance);
                }
                RecordOutcome::Failure(dispatch_error)
            }
            (None, None) => RecordOutcome::Failure(Error::internal(
                "dispatcher produced a response with neither data nor error",
            )),
        }
    }

    async fn abort_job(&self, job: &JobRecord, reason: String) -> MessageOutcome {
        self.abort_job_with_progress(job, job.progress, reason).await
    }

    async fn abort_job_with_progress(
        &self,
        job: &JobRecord,
        progress: crate::domain::JobProgress,
        reason: String,
    ) -> MessageOutcome {
        if let Err(log_error) = self
            .jobs
            .append_log(job.id, JobLogLevel::Error, reason.clone())
            .await
        {
            warn!(job = %job.id, %log_error, "job log append failed");
        }
        if let Err(fail_error) = self.jobs.fail(job.id, reason.clone(), progress).await {
            warn!(job = %job.id, %fail_error, "job fail transition failed");
        }
        let mut terminal = job.clone();
        terminal.progress = progress;
        self.emit(&terminal, JobStatus::Failed).await;
        self.cancellations.remove(job.id);
        MessageOutcome::Failed(reason)
    }

    async fn emit(&self, job: &JobRecord, status: JobStatus) {
        self.progress
            .publish(ProgressEvent::new(job.id, job.tenant_id, status, job.progress))
            .await;
    }
}

/// Queue worker handle used by tests to drive a single message without the
/// polling loop.
impl JobWorkerPool {
    /// Process whatever is currently claimable, once. Returns whether a
    /// message was found.
    pub async fn drain_one(&self, shutdown: &CancelToken) -> bool {
        match self.queue.claim_next().await {
            Ok(Some(message)) => {
                self.process_message(message, shutdown).await;
                true
            }
            Ok(None) => false,
            Err(claim_error) => {
                warn!(%claim_error, "queue claim failed");
                false
            }
        }
    }
}
