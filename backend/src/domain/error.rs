//! Normalized error representation shared across component boundaries.
//!
//! Every adapter (provider clients, persistence, queue, HTTP edge) maps its
//! raw failures into this shape, so callers never see provider status codes
//! or driver errors directly.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use utoipa::ToSchema;

/// Stable machine-readable error code.
///
/// This enumeration is the single source of truth for the error taxonomy;
/// provider adapters map raw HTTP/transport failures into it and the
/// dispatcher keys its retry decisions off it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// Authentication with the provider failed or no credential is active.
    Auth,
    /// The provider rejected the call for exceeding its rate limit.
    RateLimit,
    /// The tenant or provider account has exhausted its quota.
    Quota,
    /// The request payload is malformed or missing required identifiers.
    InvalidInput,
    /// The requested entity (provider, job, record) does not exist.
    NotFound,
    /// The provider is unreachable or returned a server-side failure.
    ProviderUnavailable,
    /// The provider does not support the requested operation.
    OperationUnsupported,
    /// The call exceeded its deadline.
    Timeout,
    /// An unexpected internal failure.
    Internal,
}

impl ErrorCode {
    /// Stable SCREAMING_SNAKE wire identifier, as used in logs.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Auth => "AUTH",
            Self::RateLimit => "RATE_LIMIT",
            Self::Quota => "QUOTA",
            Self::InvalidInput => "INVALID_INPUT",
            Self::NotFound => "NOT_FOUND",
            Self::ProviderUnavailable => "PROVIDER_UNAVAILABLE",
            Self::OperationUnsupported => "OPERATION_UNSUPPORTED",
            Self::Timeout => "TIMEOUT",
            Self::Internal => "INTERNAL",
        }
    }

    /// Return whether the dispatcher may retry a call failing with this code.
    ///
    /// # Examples
    /// ```
    /// use backend::domain::ErrorCode;
    ///
    /// assert!(ErrorCode::RateLimit.is_retryable());
    /// assert!(!ErrorCode::Auth.is_retryable());
    /// ```
    #[must_use]
    pub fn is_retryable(self) -> bool {
        matches!(
            self,
            Self::RateLimit | Self::ProviderUnavailable | Self::Timeout
        )
    }
}

/// Normalized error payload carried through responses, logs, and job rows.
///
/// ## Invariants
/// - `message` is non-empty once trimmed of whitespace.
///
/// # Examples
/// ```
/// use backend::domain::{Error, ErrorCode};
///
/// let err = Error::not_found("unknown provider \"acme\"");
/// assert_eq!(err.code(), ErrorCode::NotFound);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema, Error)]
#[serde(rename_all = "snake_case")]
#[error("{message}")]
pub struct Error {
    code: ErrorCode,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<Value>,
}

impl Error {
    /// Create a new error, falling back to a generic message when the
    /// supplied one is blank.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        let message = message.into();
        let message = if message.trim().is_empty() {
            "unspecified error".to_owned()
        } else {
            message
        };
        Self {
            code,
            message,
            details: None,
        }
    }

    /// Stable machine-readable error code.
    #[must_use]
    pub fn code(&self) -> ErrorCode {
        self.code
    }

    /// Human-readable message.
    #[must_use]
    pub fn message(&self) -> &str {
        self.message.as_str()
    }

    /// Supplementary structured details, when present.
    #[must_use]
    pub fn details(&self) -> Option<&Value> {
        self.details.as_ref()
    }

    /// Attach structured details to the error.
    ///
    /// # Examples
    /// ```
    /// use backend::domain::Error;
    /// use serde_json::json;
    ///
    /// let err = Error::invalid_input("missing domain")
    ///     .with_details(json!({ "field": "company_domain" }));
    /// assert!(err.details().is_some());
    /// ```
    #[must_use]
    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }

    /// Return whether the dispatcher may retry this error.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        self.code.is_retryable()
    }

    /// Convenience constructor for [`ErrorCode::Auth`].
    pub fn auth(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Auth, message)
    }

    /// Convenience constructor for [`ErrorCode::RateLimit`].
    pub fn rate_limit(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::RateLimit, message)
    }

    /// Convenience constructor for [`ErrorCode::Quota`].
    pub fn quota(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Quota, message)
    }

    /// Convenience constructor for [`ErrorCode::InvalidInput`].
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidInput, message)
    }

    /// Convenience constructor for [`ErrorCode::NotFound`].
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::NotFound, message)
    }

    /// Convenience constructor for [`ErrorCode::ProviderUnavailable`].
    pub fn provider_unavailable(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ProviderUnavailable, message)
    }

    /// Convenience constructor for [`ErrorCode::OperationUnsupported`].
    pub fn operation_unsupported(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::OperationUnsupported, message)
    }

    /// Convenience constructor for [`ErrorCode::Timeout`].
    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Timeout, message)
    }

    /// Convenience constructor for [`ErrorCode::Internal`].
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Internal, message)
    }

    /// Redact server-side detail so the payload is safe to hand to clients.
    ///
    /// Internal errors keep their code but replace the message with a
    /// generic explanation and drop structured details. Stack traces never
    /// reach this type in the first place.
    #[must_use]
    pub fn redacted_for_clients(&self) -> Self {
        if !matches!(self.code, ErrorCode::Internal) {
            return self.clone();
        }
        Self {
            code: self.code,
            message: "internal error".to_owned(),
            details: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::rate_limit(ErrorCode::RateLimit, true)]
    #[case::unavailable(ErrorCode::ProviderUnavailable, true)]
    #[case::timeout(ErrorCode::Timeout, true)]
    #[case::auth(ErrorCode::Auth, false)]
    #[case::quota(ErrorCode::Quota, false)]
    #[case::invalid(ErrorCode::InvalidInput, false)]
    #[case::not_found(ErrorCode::NotFound, false)]
    #[case::unsupported(ErrorCode::OperationUnsupported, false)]
    #[case::internal(ErrorCode::Internal, false)]
    fn retryability_follows_the_taxonomy(#[case] code: ErrorCode, #[case] retryable: bool) {
        assert_eq!(code.is_retryable(), retryable);
    }

    #[test]
    fn blank_messages_are_replaced() {
        let err = Error::new(ErrorCode::Internal, "   ");
        assert_eq!(err.message(), "unspecified error");
    }

    #[test]
    fn redaction_strips_internal_detail_only() {
        let internal = Error::internal("db constraint violated")
            .with_details(serde_json::json!({ "table": "enrichment_jobs" }));
        let redacted = internal.redacted_for_clients();
        assert_eq!(redacted.message(), "internal error");
        assert!(redacted.details().is_none());

        let user_facing = Error::invalid_input("records must not be empty");
        assert_eq!(user_facing.redacted_for_clients(), user_facing);
    }

    #[test]
    fn codes_serialize_screaming_snake() {
        let json = serde_json::to_value(ErrorCode::OperationUnsupported).expect("serializes");
        assert_eq!(json, serde_json::json!("OPERATION_UNSUPPORTED"));
    }
}
