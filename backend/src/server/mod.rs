//! Process wiring: dependency container, worker pool, HTTP server, and
//! graceful shutdown.
//!
//! Everything is constructed here at startup and handed down as explicit
//! `Arc`s; no component is reachable as module-global state.

mod config;

pub use config::AppConfig;

use std::sync::Arc;
use std::time::Duration;

use actix_web::{App, HttpServer, web};
use diesel::Connection;
use diesel::pg::PgConnection;
use diesel_migrations::{EmbeddedMigrations, MigrationHarness, embed_migrations};
use tracing::{error, info, warn};
use zeroize::Zeroize;

use backend::domain::CancelToken;
use backend::domain::credentials::{
    CredentialService, CredentialStore, EncryptionKey, MaterialCodec,
};
use backend::domain::dispatch::Dispatcher;
use backend::domain::jobs::{
    BroadcastProgressSink, CancellationRegistry, JobService, JobWorkerPool, WorkerPoolConfig,
};
use backend::domain::ports::{JobQueue, JobRepository, ProviderCatalogRepository};
use backend::domain::registry::{ProviderCatalog, ProviderRegistry};
use backend::inbound::http::{AppState, HealthState, configure_api, configure_health};
use backend::outbound::cache::MemoryResponseCache;
use backend::outbound::persistence::{
    DbPool, DieselCredentialRepository, DieselJobQueue, DieselJobRepository,
    DieselProviderCatalogRepository, DieselUsageRecorder, PoolConfig,
};
use backend::outbound::providers::{register_builtin_providers, seed_descriptors};

const MIGRATIONS: EmbeddedMigrations = embed_migrations!();

/// Run the process to completion: wire dependencies, serve, drain.
///
/// # Errors
///
/// Returns a human-readable description of whichever startup step refused:
/// unusable encryption key, unreachable database, failed migrations, or a
/// bind failure.
pub async fn run(mut config: AppConfig) -> Result<(), String> {
    let encryption_key = EncryptionKey::parse(&config.encryption_key)
        .map_err(|error| format!("ENCRYPTION_KEY is unusable: {error}"))?;
    // The codec owns the key from here; drop the raw environment copy.
    config.encryption_key.zeroize();

    run_migrations(config.database_url.clone()).await?;

    let pool = DbPool::new(PoolConfig::new(config.database_url.clone()))
        .await
        .map_err(|error| format!("database pool construction failed: {error}"))?;

    // Provider catalog: seed on first boot, then load into memory.
    let catalog_repository = DieselProviderCatalogRepository::new(pool.clone());
    let seeded = catalog_repository
        .seed_if_empty(&seed_descriptors())
        .await
        .map_err(|error| format!("provider catalog seeding failed: {error}"))?;
    if seeded > 0 {
        info!(seeded, "provider catalog seeded");
    }
    let descriptors = catalog_repository
        .load_all()
        .await
        .map_err(|error| format!("provider catalog load failed: {error}"))?;
    info!(providers = descriptors.len(), "provider catalog loaded");
    let catalog = Arc::new(ProviderCatalog::new(descriptors));

    // Core container.
    let credential_store = Arc::new(CredentialStore::new(
        Arc::new(DieselCredentialRepository::new(pool.clone())),
        MaterialCodec::new(encryption_key),
    ));
    let registry = Arc::new(ProviderRegistry::new(catalog, Arc::clone(&credential_store)));
    register_builtin_providers(&registry);

    let dispatcher = Arc::new(Dispatcher::new(
        Arc::new(MemoryResponseCache::new()),
        Arc::new(DieselUsageRecorder::new(pool.clone())),
    ));
    let jobs: Arc<dyn JobRepository> = Arc::new(DieselJobRepository::new(pool.clone()));
    let queue: Arc<dyn JobQueue> = Arc::new(DieselJobQueue::new(pool.clone()));
    let cancellations = CancellationRegistry::new();
    let progress = Arc::new(BroadcastProgressSink::default());

    let job_service = Arc::new(JobService::new(
        Arc::clone(&jobs),
        Arc::clone(&queue),
        Arc::clone(&registry),
        Arc::clone(&dispatcher),
        cancellations.clone(),
    ));
    let credential_service = Arc::new(CredentialService::new(
        Arc::clone(&credential_store),
        Arc::clone(&registry),
    ));

    // Queue worker pool.
    let shutdown = CancelToken::new();
    let pool_config = WorkerPoolConfig {
        concurrency: config.worker_concurrency.max(1),
        ..WorkerPoolConfig::default()
    };
    let worker_pool = Arc::new(JobWorkerPool::new(
        jobs,
        queue,
        Arc::clone(&registry),
        dispatcher,
        progress,
        cancellations,
        pool_config,
    ));
    let worker_shutdown = shutdown.clone();
    let worker_handle = tokio::spawn(async move {
        worker_pool.run(worker_shutdown).await;
    });
    info!(
        concurrency = config.worker_concurrency,
        "queue worker pool started"
    );

    // Thin HTTP edge.
    let health = web::Data::new(HealthState::new());
    let state = web::Data::new(AppState {
        jobs: job_service,
        credentials: credential_service,
    });
    let server = HttpServer::new({
        let health = health.clone();
        let state = state.clone();
        move || {
            App::new()
                .app_data(health.clone())
                .app_data(state.clone())
                .configure(configure_health)
                .service(web::scope("/api/v1").configure(|config| configure_api(config)))
        }
    })
    .bind(config.bind_addr)
    .map_err(|error| format!("bind to {} failed: {error}", config.bind_addr))?
    .run();
    let server_handle = server.handle();
    let server_task = tokio::spawn(server);
    health.mark_ready();
    info!(bind_addr = %config.bind_addr, "http edge listening");

    wait_for_shutdown_signal().await;
    info!("shutdown signal received; draining");
    health.mark_unhealthy();

    // Stop accepting work, then give in-flight jobs a bounded window to
    // reach a record boundary.
    shutdown.cancel();
    server_handle.stop(true).await;
    let drain = Duration::from_secs(config.shutdown_drain_seconds);
    if tokio::time::timeout(drain, worker_handle).await.is_err() {
        warn!(
            drain_seconds = config.shutdown_drain_seconds,
            "worker pool did not drain within the window"
        );
    }
    if let Err(join_error) = server_task.await {
        error!(%join_error, "http server task aborted");
    }
    info!("shutdown complete");
    Ok(())
}

async fn run_migrations(database_url: String) -> Result<(), String> {
    tokio::task::spawn_blocking(move || {
        let mut connection = PgConnection::establish(&database_url)
            .map_err(|error| format!("database connection failed: {error}"))?;
        connection
            .run_pending_migrations(MIGRATIONS)
            .map(|versions| {
                if !versions.is_empty() {
                    info!(applied = versions.len(), "database migrations applied");
                }
            })
            .map_err(|error| format!("migrations failed: {error}"))
    })
    .await
    .map_err(|join_error| format!("migration task aborted: {join_error}"))?
}

async fn wait_for_shutdown_signal() {
    #[cfg(unix)]
    {
        let mut sigterm = match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
        {
            Ok(signal) => signal,
            Err(error) => {
                error!(%error, "SIGTERM handler installation failed; falling back to ctrl-c");
                let _ = tokio::signal::ctrl_c().await;
                return;
            }
        };
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
