//! Provider descriptor: static, seedable configuration for one provider.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::{Operation, ProviderCategory};

/// Per-operation feature entry, mirroring one `provider_features` row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderFeature {
    /// Operation the feature exposes.
    pub operation: Operation,
    /// Human-readable feature name.
    pub name: String,
    /// Provider endpoint path.
    pub endpoint: String,
    /// HTTP method used by the endpoint.
    pub http_method: String,
    /// Credits charged per request.
    pub credits_per_request: u32,
}

/// Static configuration for one provider, loaded from durable storage at
/// startup and seedable when the catalog is empty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderDescriptor {
    /// Canonical lowercase identifier (`hunter`, `apollo`, ...).
    pub id: String,
    /// Display name for the edge.
    pub display_name: String,
    /// Catalog category.
    pub category: ProviderCategory,
    /// API base URL.
    pub base_url: String,
    /// Sustained request rate in requests per second.
    pub requests_per_second: f64,
    /// Token bucket reservoir refilled every 60 s.
    pub burst_size: u32,
    /// Daily request quota, when the provider enforces one.
    pub daily_quota: Option<u32>,
    /// In-flight call ceiling per provider instance.
    pub max_concurrent: u32,
    /// Features and per-operation credit costs.
    pub features: Vec<ProviderFeature>,
    /// Free-form provider configuration.
    #[serde(default)]
    pub config: BTreeMap<String, Value>,
}

impl ProviderDescriptor {
    /// Operations this provider supports, in feature order.
    #[must_use]
    pub fn supported_operations(&self) -> Vec<Operation> {
        self.features.iter().map(|f| f.operation).collect()
    }

    /// Whether the provider supports `operation`.
    #[must_use]
    pub fn supports(&self, operation: Operation) -> bool {
        self.features.iter().any(|f| f.operation == operation)
    }

    /// Credits charged for `operation`; defaults to 1 when the feature is
    /// not listed.
    #[must_use]
    pub fn credits_for(&self, operation: Operation) -> u32 {
        self.features
            .iter()
            .find(|f| f.operation == operation)
            .map_or(1, |f| f.credits_per_request)
    }

    /// Whether cache keys must be scoped by tenant for this provider.
    ///
    /// Set `configuration.cache_per_tenant = true` for providers whose
    /// responses depend on the calling key.
    #[must_use]
    pub fn cache_per_tenant(&self) -> bool {
        self.config
            .get("cache_per_tenant")
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor() -> ProviderDescriptor {
        ProviderDescriptor {
            id: "hunter".to_owned(),
            display_name: "Hunter".to_owned(),
            category: ProviderCategory::EmailFinder,
            base_url: "https://api.hunter.io/v2".to_owned(),
            requests_per_second: 10.0,
            burst_size: 60,
            daily_quota: Some(5_000),
            max_concurrent: 1,
            features: vec![ProviderFeature {
                operation: Operation::FindEmail,
                name: "Email finder".to_owned(),
                endpoint: "/email-finder".to_owned(),
                http_method: "GET".to_owned(),
                credits_per_request: 1,
            }],
            config: BTreeMap::new(),
        }
    }

    #[test]
    fn credits_default_to_one_for_unlisted_operations() {
        let descriptor = descriptor();
        assert_eq!(descriptor.credits_for(Operation::FindEmail), 1);
        assert_eq!(descriptor.credits_for(Operation::SearchPeople), 1);
        assert!(descriptor.supports(Operation::FindEmail));
        assert!(!descriptor.supports(Operation::SearchPeople));
    }

    #[test]
    fn tenant_scoped_caching_reads_the_config_flag() {
        let mut descriptor = descriptor();
        assert!(!descriptor.cache_per_tenant());
        descriptor
            .config
            .insert("cache_per_tenant".to_owned(), serde_json::json!(true));
        assert!(descriptor.cache_per_tenant());
    }
}
