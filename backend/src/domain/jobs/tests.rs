//! Behaviour tests for the job service and queue worker.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::{Map, Value, json};
use uuid::Uuid;

use crate::domain::credentials::{CredentialStore, EncryptionKey, KEY_BYTES, MaterialCodec};
use crate::domain::dispatch::Dispatcher;
use crate::domain::ports::{
    FixtureCredentialRepository, FixtureJobQueue, FixtureJobRepository, FixtureProvider,
    JobQueue, JobRepository, NoopProgressSink, NoopUsageRecorder, Provider, ProviderContext,
};
use crate::domain::registry::{ProviderCatalog, ProviderRegistry};
use crate::domain::{
    CancelToken, DisplayStatus, ErrorCode, JobLogLevel, JobStatus, Operation, ProviderCategory,
    ProviderDescriptor, ProviderFeature, RequestOptions,
};
use crate::outbound::cache::MemoryResponseCache;

use super::worker::{JobWorkerPool, WorkerPoolConfig};
use super::{CancellationRegistry, JobService, MAX_BULK_RECORDS};

fn fixture_descriptor() -> ProviderDescriptor {
    let feature = |operation: Operation, endpoint: &str| ProviderFeature {
        operation,
        name: endpoint.trim_start_matches('/').to_owned(),
        endpoint: endpoint.to_owned(),
        http_method: "POST".to_owned(),
        credits_per_request: 1,
    };
    ProviderDescriptor {
        id: "fixture".to_owned(),
        display_name: "Fixture".to_owned(),
        category: ProviderCategory::MajorDatabase,
        base_url: "https://api.fixture.invalid".to_owned(),
        requests_per_second: 1_000.0,
        burst_size: 60_000,
        daily_quota: None,
        max_concurrent: 4,
        features: vec![
            feature(Operation::FindEmail, "/email-finder"),
            feature(Operation::EnrichPerson, "/people/enrich"),
            feature(Operation::EnrichCompany, "/companies/enrich"),
        ],
        config: BTreeMap::new(),
    }
}

struct Harness {
    tenant: Uuid,
    service: JobService,
    pool: Arc<JobWorkerPool>,
    queue: Arc<FixtureJobQueue>,
}

async fn harness() -> Harness {
    let tenant = Uuid::new_v4();

    let credential_repository = Arc::new(FixtureCredentialRepository::new());
    let credentials = Arc::new(CredentialStore::new(
        credential_repository,
        MaterialCodec::new(EncryptionKey::from_bytes([11_u8; KEY_BYTES])),
    ));
    let added = credentials
        .add(tenant, "fixture", "primary", "sk-fixture")
        .await
        .expect("add credential");
    credentials.activate(tenant, added.id).await.expect("activate");

    let catalog = Arc::new(ProviderCatalog::new(vec![fixture_descriptor()]));
    let registry = Arc::new(ProviderRegistry::new(catalog, credentials));
    registry.register(
        "fixture",
        Arc::new(|ctx: ProviderContext| {
            Ok(Arc::new(FixtureProvider::new(ctx.descriptor)) as Arc<dyn Provider>)
        }),
    );

    let jobs = Arc::new(FixtureJobRepository::new());
    let queue = Arc::new(FixtureJobQueue::new());
    let dispatcher = Arc::new(Dispatcher::new(
        Arc::new(MemoryResponseCache::new()),
        Arc::new(NoopUsageRecorder),
    ));
    let cancellations = CancellationRegistry::new();

    let service = JobService::new(
        Arc::clone(&jobs) as Arc<dyn JobRepository>,
        Arc::clone(&queue) as Arc<dyn crate::domain::ports::JobQueue>,
        Arc::clone(&registry),
        Arc::clone(&dispatcher),
        cancellations.clone(),
    );
    let pool = Arc::new(JobWorkerPool::new(
        Arc::clone(&jobs) as Arc<dyn JobRepository>,
        Arc::clone(&queue) as Arc<dyn crate::domain::ports::JobQueue>,
        registry,
        dispatcher,
        Arc::new(NoopProgressSink),
        cancellations.clone(),
        WorkerPoolConfig::default(),
    ));

    Harness {
        tenant,
        service,
        pool,
        queue,
    }
}

fn person(email: &str) -> Map<String, Value> {
    let mut record = Map::new();
    record.insert("email".to_owned(), json!(email));
    record
}

#[tokio::test]
async fn bulk_submissions_enforce_the_record_bounds() {
    let harness = harness().await;

    let err = harness
        .service
        .submit_bulk(
            harness.tenant,
            "fixture",
            Operation::EnrichPerson,
            Vec::new(),
            RequestOptions::default(),
        )
        .await
        .expect_err("empty batch");
    assert_eq!(err.code(), ErrorCode::InvalidInput);

    let oversized = vec![person("a@x.com"); MAX_BULK_RECORDS + 1];
    let err = harness
        .service
        .submit_bulk(
            harness.tenant,
            "fixture",
            Operation::EnrichPerson,
            oversized,
            RequestOptions::default(),
        )
        .await
        .expect_err("oversized batch");
    assert_eq!(err.code(), ErrorCode::InvalidInput);
}

#[tokio::test]
async fn unknown_provider_and_unsupported_operation_are_rejected_at_submit() {
    let harness = harness().await;

    let err = harness
        .service
        .submit_bulk(
            harness.tenant,
            "nonesuch",
            Operation::EnrichPerson,
            vec![person("a@x.com")],
            RequestOptions::default(),
        )
        .await
        .expect_err("unknown provider");
    assert_eq!(err.code(), ErrorCode::NotFound);

    let err = harness
        .service
        .submit_bulk(
            harness.tenant,
            "fixture",
            Operation::FindLookalike,
            vec![person("a@x.com")],
            RequestOptions::default(),
        )
        .await
        .expect_err("unsupported operation");
    assert_eq!(err.code(), ErrorCode::OperationUnsupported);
}

#[tokio::test]
async fn bulk_job_with_one_bad_row_counts_and_logs_the_failure() {
    let harness = harness().await;
    let submission = harness
        .service
        .submit_bulk(
            harness.tenant,
            "fixture",
            Operation::EnrichPerson,
            vec![person("a@x.com"), person(""), person("c@x.com")],
            RequestOptions::default(),
        )
        .await
        .expect("submit");
    assert_eq!(submission.status, JobStatus::Queued);
    assert_eq!(submission.total, 3);

    assert!(harness.pool.drain_one(&CancelToken::new()).await);

    let details = harness
        .service
        .get_job(harness.tenant, submission.job_id)
        .await
        .expect("job exists");
    assert_eq!(details.job.status, JobStatus::Completed);
    assert_eq!(details.job.progress.total, 3);
    assert_eq!(details.job.progress.processed, 3);
    assert_eq!(details.job.progress.successful, 2);
    assert_eq!(details.job.progress.failed, 1);
    assert_eq!(
        details.job.progress.processed,
        details.job.progress.successful + details.job.progress.failed
    );
    assert_eq!(details.results.len(), 2);

    let record_errors: Vec<_> = details
        .logs
        .iter()
        .filter(|entry| entry.level == JobLogLevel::Error)
        .collect();
    assert_eq!(record_errors.len(), 1, "exactly one record failure");
    assert!(record_errors[0].message.contains("record 1"));
    assert!(record_errors[0].message.contains("INVALID_INPUT"));
}

#[tokio::test]
async fn redelivery_of_a_terminal_job_is_a_no_op() {
    let harness = harness().await;
    let submission = harness
        .service
        .submit_bulk(
            harness.tenant,
            "fixture",
            Operation::EnrichPerson,
            vec![person("a@x.com")],
            RequestOptions::default(),
        )
        .await
        .expect("submit");

    assert!(harness.pool.drain_one(&CancelToken::new()).await);
    let first = harness
        .service
        .get_job(harness.tenant, submission.job_id)
        .await
        .expect("job");

    // Simulate at-least-once redelivery of the same job.
    harness
        .queue
        .enqueue(submission.job_id, 0)
        .await
        .expect("re-enqueue");
    assert!(harness.pool.drain_one(&CancelToken::new()).await);

    let second = harness
        .service
        .get_job(harness.tenant, submission.job_id)
        .await
        .expect("job");
    assert_eq!(first.job.progress, second.job.progress);
    assert_eq!(first.job.output, second.job.output);
    assert_eq!(second.job.status, JobStatus::Completed);
}

#[tokio::test]
async fn job_row_survives_queue_eviction_with_an_expired_hint() {
    let harness = harness().await;
    let submission = harness
        .service
        .submit_bulk(
            harness.tenant,
            "fixture",
            Operation::EnrichPerson,
            vec![person("a@x.com")],
            RequestOptions::default(),
        )
        .await
        .expect("submit");
    assert!(harness.pool.drain_one(&CancelToken::new()).await);

    harness.queue.evict_job(submission.job_id);

    let details = harness
        .service
        .get_job(harness.tenant, submission.job_id)
        .await
        .expect("row outlives the queue");
    assert_eq!(details.job.status, JobStatus::Completed);
    assert_eq!(details.display_status, DisplayStatus::Expired);
    assert_eq!(details.results.len(), 1);
}

#[tokio::test]
async fn cancellation_is_observed_before_the_first_record() {
    let harness = harness().await;
    let submission = harness
        .service
        .submit_bulk(
            harness.tenant,
            "fixture",
            Operation::EnrichPerson,
            vec![person("a@x.com"), person("b@x.com")],
            RequestOptions::default(),
        )
        .await
        .expect("submit");

    harness
        .service
        .cancel_job(harness.tenant, submission.job_id)
        .await
        .expect("cancel accepted");
    assert!(harness.pool.drain_one(&CancelToken::new()).await);

    let details = harness
        .service
        .get_job(harness.tenant, submission.job_id)
        .await
        .expect("job");
    assert_eq!(details.job.status, JobStatus::Failed);
    assert!(
        details
            .job
            .error_details
            .as_deref()
            .is_some_and(|reason| reason.contains("cancelled")),
        "failure reason must name the cancellation"
    );
    assert_eq!(details.job.progress.processed, 0);
}

#[tokio::test]
async fn shutdown_drains_the_job_as_failed() {
    let harness = harness().await;
    harness
        .service
        .submit_bulk(
            harness.tenant,
            "fixture",
            Operation::EnrichPerson,
            vec![person("a@x.com")],
            RequestOptions::default(),
        )
        .await
        .expect("submit");

    let shutdown = CancelToken::new();
    shutdown.cancel();
    assert!(harness.pool.drain_one(&shutdown).await);

    let jobs = harness.service.list_jobs(harness.tenant).await.expect("list");
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0].status, JobStatus::Failed);
    assert!(
        jobs[0]
            .error_details
            .as_deref()
            .is_some_and(|reason| reason.contains("shut down"))
    );
}

#[tokio::test]
async fn missing_credential_fails_the_job_at_setup() {
    // A tenant with no active credential: submission is accepted (the
    // catalog knows the provider) but provider resolution fails in the
    // worker and the whole job aborts before any record is processed.
    let harness = harness().await;
    let tenant_without_credential = Uuid::new_v4();
    let submission = harness
        .service
        .submit_bulk(
            tenant_without_credential,
            "fixture",
            Operation::EnrichPerson,
            vec![person("a@x.com"), person("b@x.com")],
            RequestOptions::default(),
        )
        .await
        .expect("submit");

    assert!(harness.pool.drain_one(&CancelToken::new()).await);

    let details = harness
        .service
        .get_job(tenant_without_credential, submission.job_id)
        .await
        .expect("job");
    assert_eq!(details.job.status, JobStatus::Failed);
    assert_eq!(details.job.progress.processed, 0);
    assert!(
        details
            .job
            .error_details
            .as_deref()
            .is_some_and(|reason| reason.contains("provider resolution failed")),
    );
}

#[tokio::test]
async fn execute_single_round_trips_and_validates() {
    let harness = harness().await;

    let mut params = Map::new();
    params.insert("email".to_owned(), json!("jane@acme.com"));
    let ok = harness
        .service
        .execute_single(
            harness.tenant,
            "fixture",
            crate::domain::EnrichmentRequest::new(Operation::EnrichPerson, params),
        )
        .await;
    assert!(ok.success);
    assert_eq!(ok.metadata.provider, "fixture");
    assert_eq!(ok.metadata.credits_used, 1);

    let invalid = harness
        .service
        .execute_single(
            harness.tenant,
            "fixture",
            crate::domain::EnrichmentRequest::new(Operation::EnrichPerson, Map::new()),
        )
        .await;
    assert!(!invalid.success);
    assert_eq!(
        invalid.error.as_ref().map(crate::domain::Error::code),
        Some(ErrorCode::InvalidInput)
    );

    let unknown = harness
        .service
        .execute_single(
            harness.tenant,
            "nonesuch",
            crate::domain::EnrichmentRequest::new(Operation::EnrichCompany, {
                let mut params = Map::new();
                params.insert("domain".to_owned(), json!("acme.com"));
                params
            }),
        )
        .await;
    assert!(!unknown.success);
    assert_eq!(
        unknown.error.as_ref().map(crate::domain::Error::code),
        Some(ErrorCode::NotFound)
    );
}

#[tokio::test]
async fn jobs_list_newest_first() {
    let harness = harness().await;
    let first = harness
        .service
        .submit_bulk(
            harness.tenant,
            "fixture",
            Operation::EnrichPerson,
            vec![person("a@x.com")],
            RequestOptions::default(),
        )
        .await
        .expect("submit");
    tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    let second = harness
        .service
        .submit_bulk(
            harness.tenant,
            "fixture",
            Operation::EnrichPerson,
            vec![person("b@x.com")],
            RequestOptions::default(),
        )
        .await
        .expect("submit");

    let jobs = harness.service.list_jobs(harness.tenant).await.expect("list");
    assert_eq!(jobs.len(), 2);
    assert_eq!(jobs[0].id, second.job_id, "newest first");
    assert_eq!(jobs[1].id, first.job_id);
}

#[tokio::test]
async fn progress_is_flushed_in_batches_and_at_completion() {
    let harness = harness().await;
    let records: Vec<_> = (0..25).map(|i| person(&format!("user{i}@x.com"))).collect();
    let submission = harness
        .service
        .submit_bulk(
            harness.tenant,
            "fixture",
            Operation::EnrichPerson,
            records,
            RequestOptions::default(),
        )
        .await
        .expect("submit");

    assert!(harness.pool.drain_one(&CancelToken::new()).await);

    let details = harness
        .service
        .get_job(harness.tenant, submission.job_id)
        .await
        .expect("job");
    assert_eq!(details.job.status, JobStatus::Completed);
    assert_eq!(details.job.progress.processed, 25);
    assert_eq!(details.job.progress.successful, 25);
    assert_eq!(details.results.len(), 25);
}
