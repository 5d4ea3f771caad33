//! Driven port for the persisted provider catalog.
//!
//! Descriptors are static configuration: loaded once at startup into an
//! in-memory [`ProviderCatalog`](crate::domain::registry::ProviderCatalog)
//! and auto-seeded when the table is empty.

use async_trait::async_trait;

use crate::domain::ProviderDescriptor;

use super::define_port_error;

define_port_error! {
    /// Errors surfaced by catalog persistence.
    pub enum ProviderCatalogError {
        /// Pool or connection failure.
        Connection { message: String } =>
            "provider catalog connection failed: {message}",
        /// Query execution failure.
        Query { message: String } =>
            "provider catalog query failed: {message}",
    }
}

/// Port for loading and seeding provider descriptors.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ProviderCatalogRepository: Send + Sync {
    /// Load every active descriptor with its features.
    async fn load_all(&self) -> Result<Vec<ProviderDescriptor>, ProviderCatalogError>;

    /// Insert seed descriptors when the catalog is empty. Returns the
    /// number of descriptors inserted (zero when already populated).
    async fn seed_if_empty(
        &self,
        descriptors: &[ProviderDescriptor],
    ) -> Result<usize, ProviderCatalogError>;
}

/// Fixture repository serving a fixed descriptor list.
#[derive(Debug, Clone, Default)]
pub struct FixtureProviderCatalogRepository {
    descriptors: Vec<ProviderDescriptor>,
}

impl FixtureProviderCatalogRepository {
    /// Fixture serving `descriptors`.
    #[must_use]
    pub fn new(descriptors: Vec<ProviderDescriptor>) -> Self {
        Self { descriptors }
    }
}

#[async_trait]
impl ProviderCatalogRepository for FixtureProviderCatalogRepository {
    async fn load_all(&self) -> Result<Vec<ProviderDescriptor>, ProviderCatalogError> {
        Ok(self.descriptors.clone())
    }

    async fn seed_if_empty(
        &self,
        _descriptors: &[ProviderDescriptor],
    ) -> Result<usize, ProviderCatalogError> {
        Ok(0)
    }
}
