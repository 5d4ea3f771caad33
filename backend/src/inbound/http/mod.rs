//! Thin HTTP edge adapter.
//!
//! Authentication lives outside this service; the edge consumes only the
//! tenant identity injected via the `x-tenant-id` header.

mod credentials;
mod dto;
mod enrichment;
mod error;
mod health;

pub use dto::{JobDetailsDto, JobSummaryDto};
pub use error::ApiError;
pub use health::HealthState;

use std::sync::Arc;

use actix_web::{HttpRequest, web};
use uuid::Uuid;

use crate::domain::credentials::CredentialService;
use crate::domain::jobs::JobService;

/// Header the edge reads the tenant identity from.
pub const TENANT_HEADER: &str = "x-tenant-id";

/// Shared handler state.
pub struct AppState {
    /// Job submission service.
    pub jobs: Arc<JobService>,
    /// Credential management service.
    pub credentials: Arc<CredentialService>,
}

/// Extract the tenant identity injected by the (out-of-scope) auth edge.
///
/// # Errors
///
/// Returns `AUTH` when the header is missing or not a UUID.
pub fn tenant_id(request: &HttpRequest) -> Result<Uuid, ApiError> {
    let raw = request
        .headers()
        .get(TENANT_HEADER)
        .and_then(|value| value.to_str().ok())
        .ok_or_else(|| {
            ApiError(crate::domain::Error::auth(format!(
                "missing {TENANT_HEADER} header"
            )))
        })?;
    Uuid::parse_str(raw).map_err(|_| {
        ApiError(crate::domain::Error::auth(format!(
            "{TENANT_HEADER} header is not a valid UUID"
        )))
    })
}

/// Mount the versioned API surface onto a service config.
pub fn configure_api(config: &mut web::ServiceConfig) {
    config
        .service(enrichment::execute_single)
        .service(enrichment::submit_bulk)
        .service(enrichment::get_job)
        .service(enrichment::list_jobs)
        .service(enrichment::cancel_job)
        .service(enrichment::list_providers)
        .service(enrichment::provider_health)
        .service(credentials::list_credentials)
        .service(credentials::add_credential)
        .service(credentials::activate_credential)
        .service(credentials::update_credential)
        .service(credentials::delete_credential);
}

/// Mount the health probes (outside the versioned scope).
pub fn configure_health(config: &mut web::ServiceConfig) {
    config.service(health::live).service(health::ready);
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::test::TestRequest;

    #[test]
    fn tenant_header_is_required_and_must_be_a_uuid() {
        let missing = TestRequest::default().to_http_request();
        let err = tenant_id(&missing).expect_err("missing header");
        assert_eq!(err.0.code(), crate::domain::ErrorCode::Auth);

        let malformed = TestRequest::default()
            .insert_header((TENANT_HEADER, "not-a-uuid"))
            .to_http_request();
        let err = tenant_id(&malformed).expect_err("malformed header");
        assert_eq!(err.0.code(), crate::domain::ErrorCode::Auth);

        let tenant = Uuid::new_v4();
        let valid = TestRequest::default()
            .insert_header((TENANT_HEADER, tenant.to_string()))
            .to_http_request();
        assert_eq!(tenant_id(&valid).expect("valid header"), tenant);
    }
}
