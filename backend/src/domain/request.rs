//! Normalized enrichment request consumed by the dispatcher and providers.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use utoipa::ToSchema;

use crate::domain::Operation;

/// Default per-request deadline.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Caller-tunable request options.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case", deny_unknown_fields)]
pub struct RequestOptions {
    /// Overall deadline in milliseconds; defaults to 30 000.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
    /// Maximum dispatch attempts for retryable failures; defaults to 3.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retries: Option<u32>,
    /// Webhook notified by asynchronous providers, where supported.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub webhook_url: Option<String>,
}

impl RequestOptions {
    /// Effective request deadline.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.timeout_ms
            .map_or(DEFAULT_REQUEST_TIMEOUT, Duration::from_millis)
    }
}

/// One normalized provider call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct EnrichmentRequest {
    /// Logical operation to execute.
    pub operation: Operation,
    /// Operation parameters in normalized field names.
    #[schema(value_type = Object)]
    pub params: Map<String, Value>,
    /// Caller options.
    #[serde(default)]
    pub options: RequestOptions,
}

impl EnrichmentRequest {
    /// Build a request with default options.
    #[must_use]
    pub fn new(operation: Operation, params: Map<String, Value>) -> Self {
        Self {
            operation,
            params,
            options: RequestOptions::default(),
        }
    }

    /// Fetch a string parameter, treating blank values as absent.
    #[must_use]
    pub fn param_str(&self, key: &str) -> Option<&str> {
        self.params
            .get(key)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|value| !value.is_empty())
    }
}
