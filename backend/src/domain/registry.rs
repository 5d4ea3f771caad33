//! Provider registry: factory table plus the per-`(provider, tenant)`
//! authenticated instance cache.
//!
//! The instance map is the only mutable structure shared across workers.
//! Construction is single-flighted per key so concurrent misses produce
//! exactly one instance; failed authentication is never cached.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use tokio::sync::Semaphore;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::domain::credentials::CredentialStore;
use crate::domain::dispatch::TokenBucket;
use crate::domain::ports::{Provider, ProviderContext, ProviderFactory};
use crate::domain::{Error, ProviderDescriptor};

/// Consecutive AUTH failures tolerated before the instance is evicted.
const AUTH_FAILURE_EVICTION_THRESHOLD: u32 = 3;

/// In-memory catalog of provider descriptors, loaded once at startup.
#[derive(Debug, Default)]
pub struct ProviderCatalog {
    descriptors: HashMap<String, Arc<ProviderDescriptor>>,
}

impl ProviderCatalog {
    /// Build a catalog from loaded descriptors, keyed by lowercase id.
    #[must_use]
    pub fn new(descriptors: Vec<ProviderDescriptor>) -> Self {
        Self {
            descriptors: descriptors
                .into_iter()
                .map(|descriptor| (descriptor.id.to_ascii_lowercase(), Arc::new(descriptor)))
                .collect(),
        }
    }

    /// Look up a descriptor by (case-insensitive) provider id.
    #[must_use]
    pub fn get(&self, provider_id: &str) -> Option<Arc<ProviderDescriptor>> {
        self.descriptors
            .get(&provider_id.to_ascii_lowercase())
            .cloned()
    }

    /// All descriptors, unordered.
    #[must_use]
    pub fn list(&self) -> Vec<Arc<ProviderDescriptor>> {
        self.descriptors.values().cloned().collect()
    }
}

/// Cache key: `(provider_id_lowercase, tenant_id)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct InstanceKey {
    provider_id: String,
    tenant_id: Uuid,
}

impl InstanceKey {
    fn new(provider_id: &str, tenant_id: Uuid) -> Self {
        Self {
            provider_id: provider_id.to_ascii_lowercase(),
            tenant_id,
        }
    }
}

/// Authenticated runtime object for one `(provider, tenant)` pair.
///
/// Carries the adapter plus the rate-limiter and concurrency state the
/// dispatcher consults on every call.
pub struct ProviderInstance {
    /// The authenticated provider adapter.
    pub provider: Arc<dyn Provider>,
    /// Descriptor the instance was built from.
    pub descriptor: Arc<ProviderDescriptor>,
    /// Tenant the instance is bound to.
    pub tenant_id: Uuid,
    /// Token bucket guarding call starts.
    pub limiter: TokenBucket,
    /// In-flight call ceiling.
    pub concurrency: Arc<Semaphore>,
    auth_failures: AtomicU32,
}

impl std::fmt::Debug for ProviderInstance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderInstance")
            .field("descriptor", &self.descriptor)
            .field("tenant_id", &self.tenant_id)
            .finish_non_exhaustive()
    }
}

impl ProviderInstance {
    /// Build an instance; normally only the registry calls this.
    #[must_use]
    pub fn new(
        provider: Arc<dyn Provider>,
        descriptor: Arc<ProviderDescriptor>,
        tenant_id: Uuid,
    ) -> Self {
        let limiter = TokenBucket::new(descriptor.requests_per_second, descriptor.burst_size);
        let concurrency = Arc::new(Semaphore::new(descriptor.max_concurrent.max(1) as usize));
        Self {
            provider,
            descriptor,
            tenant_id,
            limiter,
            concurrency,
            auth_failures: AtomicU32::new(0),
        }
    }
}

/// Factory table and instance cache.
pub struct ProviderRegistry {
    catalog: Arc<ProviderCatalog>,
    credentials: Arc<CredentialStore>,
    factories: RwLock<HashMap<String, ProviderFactory>>,
    instances: Mutex<HashMap<InstanceKey, Arc<ProviderInstance>>>,
    construction_locks: Mutex<HashMap<InstanceKey, Arc<tokio::sync::Mutex<()>>>>,
}

impl ProviderRegistry {
    /// Build an empty registry over the catalog and credential store.
    pub fn new(catalog: Arc<ProviderCatalog>, credentials: Arc<CredentialStore>) -> Self {
        Self {
            catalog,
            credentials,
            factories: RwLock::new(HashMap::new()),
            instances: Mutex::new(HashMap::new()),
            construction_locks: Mutex::new(HashMap::new()),
        }
    }

    /// Register a provider factory. Called once per implementation at
    /// process start; re-registration overwrites with a warning.
    pub fn register(&self, provider_id: &str, factory: ProviderFactory) {
        let key = provider_id.to_ascii_lowercase();
        let mut factories = match self.factories.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if factories.insert(key.clone(), factory).is_some() {
            warn!(provider = %key, "provider factory re-registered; previous factory replaced");
        }
    }

    /// Resolve (constructing if needed) the authenticated instance for a
    /// `(tenant, provider)` pair.
    ///
    /// # Errors
    ///
    /// `NOT_FOUND` for an unknown provider id (no credential is consulted),
    /// `AUTH` when no usable credential exists, and whatever
    /// `validate_config`/`authenticate` surface. Failures are never cached.
    pub async fn get(
        &self,
        tenant_id: Uuid,
        provider_id: &str,
    ) -> Result<Arc<ProviderInstance>, Error> {
        let key = InstanceKey::new(provider_id, tenant_id);

        if let Some(instance) = self.cached(&key) {
            return Ok(instance);
        }

        // Single-flight: concurrent misses for the same key serialize on a
        // per-key lock and re-check the cache before constructing.
        let construction_lock = self.construction_lock(&key);
        let _guard = construction_lock.lock().await;
        if let Some(instance) = self.cached(&key) {
            return Ok(instance);
        }

        let instance = self.construct(&key).await?;
        self.lock_instances().insert(key.clone(), Arc::clone(&instance));
        debug!(provider = %key.provider_id, tenant = %tenant_id, "provider instance constructed");
        Ok(instance)
    }

    /// Drop the cached instance for a pair. Required after credential
    /// mutations and applied automatically after repeated AUTH failures.
    pub async fn invalidate(&self, tenant_id: Uuid, provider_id: &str) {
        let key = InstanceKey::new(provider_id, tenant_id);
        if self.lock_instances().remove(&key).is_some() {
            debug!(provider = %key.provider_id, tenant = %tenant_id, "provider instance invalidated");
        }
    }

    /// Record an AUTH failure observed through `instance`; evicts the
    /// cached entry once failures repeat.
    pub fn note_auth_failure(&self, instance: &ProviderInstance) {
        let failures = instance.auth_failures.fetch_add(1, Ordering::AcqRel) + 1;
        if failures >= AUTH_FAILURE_EVICTION_THRESHOLD {
            let key = InstanceKey::new(&instance.descriptor.id, instance.tenant_id);
            if self.lock_instances().remove(&key).is_some() {
                warn!(
                    provider = %key.provider_id,
                    tenant = %instance.tenant_id,
                    failures,
                    "provider instance evicted after repeated AUTH failures"
                );
            }
        }
    }

    /// Reset the AUTH failure streak after a successful call.
    pub fn note_auth_success(&self, instance: &ProviderInstance) {
        instance.auth_failures.store(0, Ordering::Release);
    }

    /// The descriptor catalog backing this registry.
    #[must_use]
    pub fn catalog(&self) -> &ProviderCatalog {
        &self.catalog
    }

    async fn construct(&self, key: &InstanceKey) -> Result<Arc<ProviderInstance>, Error> {
        let descriptor = self.catalog.get(&key.provider_id).ok_or_else(|| {
            Error::not_found(format!("unknown provider \"{}\"", key.provider_id))
        })?;

        let factory = {
            let factories = match self.factories.read() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            factories.get(&key.provider_id).cloned()
        }
        .ok_or_else(|| {
            Error::internal(format!(
                "no adapter registered for provider \"{}\"",
                key.provider_id
            ))
        })?;

        let secret = self
            .credentials
            .get_active_secret(key.tenant_id, &key.provider_id)
            .await?;

        let provider = factory(ProviderContext {
            descriptor: Arc::clone(&descriptor),
            tenant_id: key.tenant_id,
            secret,
        })?;
        provider.validate_config()?;
        provider.authenticate().await?;

        Ok(Arc::new(ProviderInstance::new(
            provider,
            descriptor,
            key.tenant_id,
        )))
    }

    fn cached(&self, key: &InstanceKey) -> Option<Arc<ProviderInstance>> {
        self.lock_instances().get(key).cloned()
    }

    fn construction_lock(&self, key: &InstanceKey) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = match self.construction_locks.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        Arc::clone(locks.entry(key.clone()).or_default())
    }

    fn lock_instances(&self) -> std::sync::MutexGuard<'_, HashMap<InstanceKey, Arc<ProviderInstance>>> {
        match self.instances.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;

    use crate::domain::credentials::{EncryptionKey, KEY_BYTES, MaterialCodec};
    use crate::domain::ports::{FixtureCredentialRepository, FixtureProvider};
    use crate::domain::{Operation, ProviderCategory};

    fn descriptor(id: &str) -> ProviderDescriptor {
        ProviderDescriptor {
            id: id.to_owned(),
            display_name: id.to_owned(),
            category: ProviderCategory::EmailFinder,
            base_url: "https://api.example.com".to_owned(),
            requests_per_second: 10.0,
            burst_size: 60,
            daily_quota: None,
            max_concurrent: 2,
            features: vec![crate::domain::ProviderFeature {
                operation: Operation::FindEmail,
                name: "finder".to_owned(),
                endpoint: "/find".to_owned(),
                http_method: "GET".to_owned(),
                credits_per_request: 1,
            }],
            config: std::collections::BTreeMap::new(),
        }
    }

    async fn registry_with_credential(tenant: Uuid) -> ProviderRegistry {
        let repository = Arc::new(FixtureCredentialRepository::new());
        let store = Arc::new(CredentialStore::new(
            repository,
            MaterialCodec::new(EncryptionKey::from_bytes([5_u8; KEY_BYTES])),
        ));
        let added = store
            .add(tenant, "hunter", "primary", "sk-live")
            .await
            .expect("add credential");
        store.activate(tenant, added.id).await.expect("activate");

        let catalog = Arc::new(ProviderCatalog::new(vec![descriptor("hunter")]));
        let registry = ProviderRegistry::new(catalog, store);
        registry.register(
            "hunter",
            Arc::new(|ctx: ProviderContext| {
                Ok(Arc::new(FixtureProvider::new(ctx.descriptor)) as Arc<dyn Provider>)
            }),
        );
        registry
    }

    #[tokio::test]
    async fn lookup_is_case_insensitive_and_cached() {
        let tenant = Uuid::new_v4();
        let registry = registry_with_credential(tenant).await;

        let first = registry.get(tenant, "Hunter").await.expect("instance");
        let second = registry.get(tenant, "hunter").await.expect("instance");
        assert!(
            Arc::ptr_eq(&first, &second),
            "same key must share one instance"
        );
    }

    #[tokio::test]
    async fn unknown_provider_is_not_found_without_consulting_credentials() {
        let tenant = Uuid::new_v4();
        let repository = Arc::new(FixtureCredentialRepository::new());
        let store = Arc::new(CredentialStore::new(
            repository,
            MaterialCodec::new(EncryptionKey::from_bytes([5_u8; KEY_BYTES])),
        ));
        let registry = ProviderRegistry::new(Arc::new(ProviderCatalog::new(vec![])), store);

        let err = registry.get(tenant, "nonesuch").await.expect_err("unknown");
        assert_eq!(err.code(), crate::domain::ErrorCode::NotFound);
    }

    #[tokio::test]
    async fn missing_credential_is_auth_and_not_cached() {
        let tenant = Uuid::new_v4();
        let repository = Arc::new(FixtureCredentialRepository::new());
        let store = Arc::new(CredentialStore::new(
            repository,
            MaterialCodec::new(EncryptionKey::from_bytes([5_u8; KEY_BYTES])),
        ));
        let catalog = Arc::new(ProviderCatalog::new(vec![descriptor("hunter")]));
        let registry = ProviderRegistry::new(catalog, Arc::clone(&store));
        registry.register(
            "hunter",
            Arc::new(|ctx: ProviderContext| {
                Ok(Arc::new(FixtureProvider::new(ctx.descriptor)) as Arc<dyn Provider>)
            }),
        );

        let err = registry.get(tenant, "hunter").await.expect_err("no credential");
        assert_eq!(err.code(), crate::domain::ErrorCode::Auth);

        // Add and activate a credential; the next get must succeed because
        // the failure was not cached.
        let added = store
            .add(tenant, "hunter", "primary", "sk-live")
            .await
            .expect("add");
        store.activate(tenant, added.id).await.expect("activate");
        registry.get(tenant, "hunter").await.expect("resolves now");
    }

    #[tokio::test]
    async fn invalidation_forces_a_fresh_instance() {
        let tenant = Uuid::new_v4();
        let registry = registry_with_credential(tenant).await;

        let first = registry.get(tenant, "hunter").await.expect("instance");
        registry.invalidate(tenant, "HUNTER").await;
        let second = registry.get(tenant, "hunter").await.expect("instance");
        assert!(
            !Arc::ptr_eq(&first, &second),
            "invalidate must drop the cached instance"
        );
    }

    #[tokio::test]
    async fn concurrent_misses_single_flight_to_one_instance() {
        let tenant = Uuid::new_v4();
        let repository = Arc::new(FixtureCredentialRepository::new());
        let store = Arc::new(CredentialStore::new(
            repository,
            MaterialCodec::new(EncryptionKey::from_bytes([5_u8; KEY_BYTES])),
        ));
        let added = store
            .add(tenant, "hunter", "primary", "sk-live")
            .await
            .expect("add");
        store.activate(tenant, added.id).await.expect("activate");

        let constructions = Arc::new(AtomicU32::new(0));
        let catalog = Arc::new(ProviderCatalog::new(vec![descriptor("hunter")]));
        let registry = Arc::new(ProviderRegistry::new(catalog, store));
        let factory_counter = Arc::clone(&constructions);
        registry.register(
            "hunter",
            Arc::new(move |ctx: ProviderContext| {
                factory_counter.fetch_add(1, Ordering::SeqCst);
                Ok(Arc::new(FixtureProvider::new(ctx.descriptor)) as Arc<dyn Provider>)
            }),
        );

        let mut handles = Vec::new();
        for _ in 0..8 {
            let registry = Arc::clone(&registry);
            handles.push(tokio::spawn(
                async move { registry.get(tenant, "hunter").await },
            ));
        }
        for handle in handles {
            handle.await.expect("join").expect("instance");
        }
        assert_eq!(
            constructions.load(Ordering::SeqCst),
            1,
            "parallel misses must construct exactly once"
        );
    }

    #[tokio::test]
    async fn repeated_auth_failures_evict_the_instance() {
        let tenant = Uuid::new_v4();
        let registry = registry_with_credential(tenant).await;
        let instance = registry.get(tenant, "hunter").await.expect("instance");

        registry.note_auth_failure(&instance);
        registry.note_auth_failure(&instance);
        let still_cached = registry.get(tenant, "hunter").await.expect("instance");
        assert!(Arc::ptr_eq(&instance, &still_cached));

        registry.note_auth_failure(&instance);
        let fresh = registry.get(tenant, "hunter").await.expect("instance");
        assert!(
            !Arc::ptr_eq(&instance, &fresh),
            "third consecutive AUTH failure must evict"
        );
    }
}
