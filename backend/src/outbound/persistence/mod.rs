//! PostgreSQL persistence adapters (Diesel async).

pub mod diesel_helpers;
mod diesel_credential_repository;
mod diesel_job_queue;
mod diesel_job_repository;
mod diesel_provider_catalog;
mod diesel_usage_recorder;
mod pool;
pub mod schema;

pub use diesel_credential_repository::DieselCredentialRepository;
pub use diesel_job_queue::DieselJobQueue;
pub use diesel_job_repository::DieselJobRepository;
pub use diesel_provider_catalog::DieselProviderCatalogRepository;
pub use diesel_usage_recorder::DieselUsageRecorder;
pub use pool::{DbPool, PoolConfig, PoolError};
