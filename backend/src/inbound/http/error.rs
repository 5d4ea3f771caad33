//! Adapter-level error mapping from domain errors to HTTP responses.
//!
//! The domain error stays framework-free; this wrapper picks the status
//! code per taxonomy entry and redacts internal detail before the payload
//! leaves the process.

use actix_web::{HttpResponse, ResponseError, http::StatusCode};
use thiserror::Error;
use tracing::error;

use crate::domain::{Error as DomainError, ErrorCode};

/// HTTP-facing error wrapper that renders the normalized JSON payload.
#[derive(Debug, Clone, Error)]
#[error("{0}")]
pub struct ApiError(pub DomainError);

impl ApiError {
    fn http_status(&self) -> StatusCode {
        match self.0.code() {
            ErrorCode::Auth => StatusCode::UNAUTHORIZED,
            ErrorCode::RateLimit | ErrorCode::Quota => StatusCode::TOO_MANY_REQUESTS,
            ErrorCode::InvalidInput | ErrorCode::OperationUnsupported => StatusCode::BAD_REQUEST,
            ErrorCode::NotFound => StatusCode::NOT_FOUND,
            ErrorCode::ProviderUnavailable => StatusCode::BAD_GATEWAY,
            ErrorCode::Timeout => StatusCode::GATEWAY_TIMEOUT,
            ErrorCode::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        self.http_status()
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.http_status()).json(self.0.redacted_for_clients())
    }
}

impl From<DomainError> for ApiError {
    fn from(value: DomainError) -> Self {
        Self(value)
    }
}

impl From<actix_web::Error> for ApiError {
    fn from(err: actix_web::Error) -> Self {
        error!(error = %err, "actix error promoted to API error");
        Self(DomainError::internal("internal error"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(ErrorCode::Auth, StatusCode::UNAUTHORIZED)]
    #[case(ErrorCode::RateLimit, StatusCode::TOO_MANY_REQUESTS)]
    #[case(ErrorCode::Quota, StatusCode::TOO_MANY_REQUESTS)]
    #[case(ErrorCode::InvalidInput, StatusCode::BAD_REQUEST)]
    #[case(ErrorCode::OperationUnsupported, StatusCode::BAD_REQUEST)]
    #[case(ErrorCode::NotFound, StatusCode::NOT_FOUND)]
    #[case(ErrorCode::ProviderUnavailable, StatusCode::BAD_GATEWAY)]
    #[case(ErrorCode::Timeout, StatusCode::GATEWAY_TIMEOUT)]
    #[case(ErrorCode::Internal, StatusCode::INTERNAL_SERVER_ERROR)]
    fn taxonomy_maps_to_http_statuses(#[case] code: ErrorCode, #[case] status: StatusCode) {
        let error = ApiError(DomainError::new(code, "boom"));
        assert_eq!(error.status_code(), status);
    }
}
