//! Shared transport plumbing for provider adapters.
//!
//! Raw HTTP failures are mapped into the normalized taxonomy here so no
//! status code ever leaks past an adapter: 401/403 become `AUTH`, 404
//! `NOT_FOUND`, 400/422 `INVALID_INPUT`, 429 `RATE_LIMIT`, 5xx and
//! transport failures `PROVIDER_UNAVAILABLE`, timeouts `TIMEOUT`.

use std::time::Duration;

use reqwest::{Client, StatusCode};

use crate::domain::Error;

/// Outbound HTTP timeout per provider call; the dispatcher enforces the
/// request-level deadline on top.
pub(crate) const PROVIDER_HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Build the shared reqwest client for one provider instance.
pub(crate) fn build_client() -> Result<Client, Error> {
    Client::builder()
        .timeout(PROVIDER_HTTP_TIMEOUT)
        .build()
        .map_err(|error| Error::internal(format!("http client construction failed: {error}")))
}

/// Map a reqwest transport failure into the taxonomy.
pub(crate) fn map_transport_error(error: &reqwest::Error) -> Error {
    if error.is_timeout() {
        Error::timeout(error.to_string())
    } else {
        Error::provider_unavailable(error.to_string())
    }
}

/// Map a non-success HTTP status (with body context) into the taxonomy.
pub(crate) fn map_status_error(status: StatusCode, body: &[u8]) -> Error {
    let preview = body_preview(body);
    let message = if preview.is_empty() {
        format!("status {}", status.as_u16())
    } else {
        format!("status {}: {preview}", status.as_u16())
    };

    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Error::auth(message),
        StatusCode::NOT_FOUND => Error::not_found(message),
        StatusCode::TOO_MANY_REQUESTS => Error::rate_limit(message),
        StatusCode::PAYMENT_REQUIRED => Error::quota(message),
        StatusCode::REQUEST_TIMEOUT | StatusCode::GATEWAY_TIMEOUT => Error::timeout(message),
        StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => {
            Error::invalid_input(message)
        }
        _ if status.is_client_error() => Error::invalid_input(message),
        _ => Error::provider_unavailable(message),
    }
}

/// Decode failure for a provider payload.
pub(crate) fn map_decode_error(provider: &str, error: &serde_json::Error) -> Error {
    Error::provider_unavailable(format!("{provider} returned an undecodable payload: {error}"))
}

/// Compact, length-bounded body excerpt for error messages.
pub(crate) fn body_preview(body: &[u8]) -> String {
    const PREVIEW_CHAR_LIMIT: usize = 160;

    let compact = String::from_utf8_lossy(body)
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ");
    let preview = compact.chars().take(PREVIEW_CHAR_LIMIT).collect::<String>();
    if compact.chars().count() > PREVIEW_CHAR_LIMIT {
        format!("{preview}...")
    } else {
        preview
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    use crate::domain::ErrorCode;

    #[rstest]
    #[case(StatusCode::UNAUTHORIZED, ErrorCode::Auth)]
    #[case(StatusCode::FORBIDDEN, ErrorCode::Auth)]
    #[case(StatusCode::NOT_FOUND, ErrorCode::NotFound)]
    #[case(StatusCode::TOO_MANY_REQUESTS, ErrorCode::RateLimit)]
    #[case(StatusCode::PAYMENT_REQUIRED, ErrorCode::Quota)]
    #[case(StatusCode::BAD_REQUEST, ErrorCode::InvalidInput)]
    #[case(StatusCode::UNPROCESSABLE_ENTITY, ErrorCode::InvalidInput)]
    #[case(StatusCode::REQUEST_TIMEOUT, ErrorCode::Timeout)]
    #[case(StatusCode::GATEWAY_TIMEOUT, ErrorCode::Timeout)]
    #[case(StatusCode::CONFLICT, ErrorCode::InvalidInput)]
    #[case(StatusCode::INTERNAL_SERVER_ERROR, ErrorCode::ProviderUnavailable)]
    #[case(StatusCode::BAD_GATEWAY, ErrorCode::ProviderUnavailable)]
    fn statuses_map_into_the_taxonomy(#[case] status: StatusCode, #[case] expected: ErrorCode) {
        let error = map_status_error(status, b"{\"error\":\"nope\"}");
        assert_eq!(error.code(), expected);
    }

    #[test]
    fn previews_are_compacted_and_bounded() {
        let long_body = "x".repeat(500);
        let preview = body_preview(long_body.as_bytes());
        assert!(preview.ends_with("..."));
        assert!(preview.chars().count() <= 163);

        assert_eq!(body_preview(b"  spaced\n out  "), "spaced out");
    }
}
