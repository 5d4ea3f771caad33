//! Driven port for the content-addressed provider response cache.
//!
//! Keys are SHA-256 digests over `(provider, operation, canonical params)`;
//! params are canonicalized by sorting object keys recursively before JSON
//! encoding, so logically-equal requests share an entry. Correctness never
//! depends on the cache: every error is treated as a miss by callers.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::domain::Operation;

use super::define_port_error;

/// Content-addressed cache key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResponseCacheKey(String);

impl ResponseCacheKey {
    /// Derive the key for a request.
    ///
    /// `tenant_id` is folded in only for providers that gate responses by
    /// calling key (`cache_per_tenant`).
    #[must_use]
    pub fn derive(
        provider_id: &str,
        operation: Operation,
        params: &Map<String, Value>,
        tenant_id: Option<Uuid>,
    ) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(provider_id.as_bytes());
        hasher.update(b"\x1f");
        hasher.update(operation.as_str().as_bytes());
        hasher.update(b"\x1f");
        hasher.update(canonical_json(&Value::Object(params.clone())).as_bytes());
        if let Some(tenant_id) = tenant_id {
            hasher.update(b"\x1f");
            hasher.update(tenant_id.as_bytes());
        }
        let digest = hasher.finalize();
        let mut hex = String::with_capacity(digest.len() * 2);
        for byte in digest {
            hex.push_str(&format!("{byte:02x}"));
        }
        Self(hex)
    }

    /// Hex digest string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Deterministic JSON encoding: object keys sorted recursively.
#[must_use]
pub fn canonical_json(value: &Value) -> String {
    fn canonicalize(value: &Value, out: &mut String) {
        match value {
            Value::Object(map) => {
                out.push('{');
                let mut keys: Vec<&String> = map.keys().collect();
                keys.sort();
                for (i, key) in keys.iter().enumerate() {
                    if i > 0 {
                        out.push(',');
                    }
                    out.push_str(&Value::String((*key).clone()).to_string());
                    out.push(':');
                    if let Some(nested) = map.get(*key) {
                        canonicalize(nested, out);
                    }
                }
                out.push('}');
            }
            Value::Array(items) => {
                out.push('[');
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        out.push(',');
                    }
                    canonicalize(item, out);
                }
                out.push(']');
            }
            other => out.push_str(&other.to_string()),
        }
    }

    let mut out = String::new();
    canonicalize(value, &mut out);
    out
}

define_port_error! {
    /// Errors surfaced by cache adapters.
    pub enum ResponseCacheError {
        /// Backend failure; callers treat it as a miss.
        Backend { message: String } =>
            "response cache backend failed: {message}",
    }
}

/// Port for cached provider responses.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ResponseCache: Send + Sync {
    /// Fetch a non-expired entry.
    async fn get(&self, key: &ResponseCacheKey) -> Result<Option<Value>, ResponseCacheError>;

    /// Store an entry with the given time to live.
    async fn put(
        &self,
        key: &ResponseCacheKey,
        value: Value,
        ttl: Duration,
    ) -> Result<(), ResponseCacheError>;
}

/// Fixture cache that always misses and discards writes.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopResponseCache;

#[async_trait]
impl ResponseCache for NoopResponseCache {
    async fn get(&self, _key: &ResponseCacheKey) -> Result<Option<Value>, ResponseCacheError> {
        Ok(None)
    }

    async fn put(
        &self,
        _key: &ResponseCacheKey,
        _value: Value,
        _ttl: Duration,
    ) -> Result<(), ResponseCacheError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(json: Value) -> Map<String, Value> {
        match json {
            Value::Object(map) => map,
            _ => Map::new(),
        }
    }

    #[test]
    fn key_is_insensitive_to_object_key_order() {
        let a = params(serde_json::json!({ "first_name": "Jane", "domain": "acme.com" }));
        let b = params(serde_json::json!({ "domain": "acme.com", "first_name": "Jane" }));
        assert_eq!(
            ResponseCacheKey::derive("hunter", Operation::FindEmail, &a, None),
            ResponseCacheKey::derive("hunter", Operation::FindEmail, &b, None),
        );
    }

    #[test]
    fn key_separates_provider_operation_and_tenant() {
        let p = params(serde_json::json!({ "domain": "acme.com" }));
        let base = ResponseCacheKey::derive("surfe", Operation::EnrichCompany, &p, None);
        assert_ne!(
            base,
            ResponseCacheKey::derive("apollo", Operation::EnrichCompany, &p, None)
        );
        assert_ne!(
            base,
            ResponseCacheKey::derive("surfe", Operation::FindLookalike, &p, None)
        );
        assert_ne!(
            base,
            ResponseCacheKey::derive("surfe", Operation::EnrichCompany, &p, Some(Uuid::new_v4()))
        );
    }

    #[test]
    fn canonical_json_sorts_nested_objects() {
        let value = serde_json::json!({ "b": { "y": 2, "x": 1 }, "a": [true, null] });
        assert_eq!(
            canonical_json(&value),
            r#"{"a":[true,null],"b":{"x":1,"y":2}}"#
        );
    }
}
