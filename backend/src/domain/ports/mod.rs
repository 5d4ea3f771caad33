//! Domain ports and supporting types for the hexagonal boundary.

mod macros;
pub(crate) use macros::define_port_error;

mod credential_repository;
mod job_queue;
mod job_repository;
mod progress_sink;
mod provider;
mod provider_catalog;
mod response_cache;
mod usage_recorder;

#[cfg(test)]
pub use credential_repository::MockCredentialRepository;
pub use credential_repository::{
    CredentialPatch, CredentialRecord, CredentialRepository, CredentialRepositoryError,
    FixtureCredentialRepository, NewCredential,
};
#[cfg(test)]
pub use job_queue::MockJobQueue;
pub use job_queue::{
    FixtureJobQueue, JobQueue, JobQueueError, QueueEntry, QueueEntryState, QueueMessage,
    RetentionPolicy,
};
#[cfg(test)]
pub use job_repository::MockJobRepository;
pub use job_repository::{
    FixtureJobRepository, JobRepository, JobRepositoryError, NewJob, ProcessingStart,
};
#[cfg(test)]
pub use progress_sink::MockProgressSink;
pub use progress_sink::{NoopProgressSink, ProgressEvent, ProgressSink};
pub use provider::{
    FixtureProvider, Provider, ProviderContext, ProviderFactory, ProviderHealth, ProviderSecret,
};
#[cfg(test)]
pub use provider_catalog::MockProviderCatalogRepository;
pub use provider_catalog::{
    FixtureProviderCatalogRepository, ProviderCatalogError, ProviderCatalogRepository,
};
#[cfg(test)]
pub use response_cache::MockResponseCache;
pub use response_cache::{
    NoopResponseCache, ResponseCache, ResponseCacheError, ResponseCacheKey, canonical_json,
};
#[cfg(test)]
pub use usage_recorder::MockUsageRecorder;
pub use usage_recorder::{NoopUsageRecorder, UsageRecorder, UsageRecorderError, UsageSample};
