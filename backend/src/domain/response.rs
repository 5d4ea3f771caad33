//! Normalized enrichment response returned by the dispatcher.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::domain::{Error, Operation};

/// Per-call metadata, populated on success and failure alike.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ResponseMetadata {
    /// Provider identifier that served (or failed) the call.
    pub provider: String,
    /// Operation executed.
    pub operation: Operation,
    /// Credits charged; zero for cache hits and failed calls.
    pub credits_used: u32,
    /// Wall-clock elapsed for the whole dispatch, including retries and
    /// asynchronous polling.
    pub response_time_ms: u64,
    /// Stable dispatch identifier, also present in logs.
    pub request_id: Uuid,
}

/// Outcome of one normalized provider call.
///
/// Exactly one of `data`/`error` is populated; `metadata` always is.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct EnrichmentResponse {
    /// Whether the call produced data.
    pub success: bool,
    /// Normalized payload on success.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    /// Normalized error on failure.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<Error>,
    /// Per-call metadata.
    pub metadata: ResponseMetadata,
}

impl EnrichmentResponse {
    /// Build a success response.
    #[must_use]
    pub fn success(data: Value, metadata: ResponseMetadata) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            metadata,
        }
    }

    /// Build a failure response.
    #[must_use]
    pub fn failure(error: Error, metadata: ResponseMetadata) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error),
            metadata,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metadata() -> ResponseMetadata {
        ResponseMetadata {
            provider: "hunter".to_owned(),
            operation: Operation::FindEmail,
            credits_used: 1,
            response_time_ms: 42,
            request_id: Uuid::new_v4(),
        }
    }

    #[test]
    fn exactly_one_of_data_and_error_is_populated() {
        let ok = EnrichmentResponse::success(serde_json::json!({ "email": "a@b.c" }), metadata());
        assert!(ok.success && ok.data.is_some() && ok.error.is_none());

        let failed = EnrichmentResponse::failure(Error::timeout("deadline"), metadata());
        assert!(!failed.success && failed.data.is_none() && failed.error.is_some());
    }
}
