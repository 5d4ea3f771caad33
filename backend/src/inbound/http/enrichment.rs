//! Enrichment and job HTTP handlers.

use actix_web::{HttpRequest, HttpResponse, get, post, web};
use uuid::Uuid;

use crate::domain::EnrichmentRequest;

use super::dto::{
    BulkRequestDto, CancelAckDto, ExecuteRequestDto, JobDetailsDto, JobSummaryDto,
    ProviderHealthDto, ProviderSummaryDto,
};
use super::error::ApiError;
use super::{AppState, tenant_id};

/// Execute a single record synchronously.
#[utoipa::path(
    post,
    path = "/api/v1/enrich",
    request_body = ExecuteRequestDto,
    responses(
        (status = 200, description = "Normalized enrichment response"),
        (status = 401, description = "Missing tenant identity")
    ),
    tags = ["enrichment"],
    operation_id = "executeSingle"
)]
#[post("/enrich")]
pub async fn execute_single(
    request: HttpRequest,
    state: web::Data<AppState>,
    payload: web::Json<ExecuteRequestDto>,
) -> Result<HttpResponse, ApiError> {
    let tenant = tenant_id(&request)?;
    let payload = payload.into_inner();

    let response = state
        .jobs
        .execute_single(
            tenant,
            &payload.provider_id,
            EnrichmentRequest {
                operation: payload.operation,
                params: payload.params,
                options: payload.options,
            },
        )
        .await;
    Ok(HttpResponse::Ok().json(response))
}

/// Submit a bulk enrichment job.
#[utoipa::path(
    post,
    path = "/api/v1/jobs",
    request_body = BulkRequestDto,
    responses(
        (status = 202, description = "Job accepted"),
        (status = 400, description = "Invalid batch"),
        (status = 404, description = "Unknown provider")
    ),
    tags = ["jobs"],
    operation_id = "submitBulk"
)]
#[post("/jobs")]
pub async fn submit_bulk(
    request: HttpRequest,
    state: web::Data<AppState>,
    payload: web::Json<BulkRequestDto>,
) -> Result<HttpResponse, ApiError> {
    let tenant = tenant_id(&request)?;
    let payload = payload.into_inner();

    let submission = state
        .jobs
        .submit_bulk(
            tenant,
            &payload.provider_id,
            payload.operation,
            payload.records,
            payload.options,
        )
        .await?;
    Ok(HttpResponse::Accepted().json(submission))
}

/// Fetch one job with logs and results.
#[utoipa::path(
    get,
    path = "/api/v1/jobs/{id}",
    responses(
        (status = 200, description = "Job detail", body = JobDetailsDto),
        (status = 404, description = "Unknown job")
    ),
    tags = ["jobs"],
    operation_id = "getJob"
)]
#[get("/jobs/{id}")]
pub async fn get_job(
    request: HttpRequest,
    state: web::Data<AppState>,
    path: web::Path<Uuid>,
) -> Result<web::Json<JobDetailsDto>, ApiError> {
    let tenant = tenant_id(&request)?;
    let details = state.jobs.get_job(tenant, path.into_inner()).await?;
    Ok(web::Json(details.into()))
}

/// List the tenant's jobs, newest first.
#[utoipa::path(
    get,
    path = "/api/v1/jobs",
    responses((status = 200, description = "Jobs", body = [JobSummaryDto])),
    tags = ["jobs"],
    operation_id = "listJobs"
)]
#[get("/jobs")]
pub async fn list_jobs(
    request: HttpRequest,
    state: web::Data<AppState>,
) -> Result<web::Json<Vec<JobSummaryDto>>, ApiError> {
    let tenant = tenant_id(&request)?;
    let jobs = state.jobs.list_jobs(tenant).await?;
    Ok(web::Json(jobs.into_iter().map(JobSummaryDto::from).collect()))
}

/// List catalogued providers.
#[utoipa::path(
    get,
    path = "/api/v1/providers",
    responses((status = 200, description = "Providers", body = [ProviderSummaryDto])),
    tags = ["providers"],
    operation_id = "listProviders"
)]
#[get("/providers")]
pub async fn list_providers(
    state: web::Data<AppState>,
) -> Result<web::Json<Vec<ProviderSummaryDto>>, ApiError> {
    let providers = state
        .jobs
        .list_providers()
        .iter()
        .map(|descriptor| ProviderSummaryDto::from(descriptor.as_ref()))
        .collect();
    Ok(web::Json(providers))
}

/// Probe one provider under the tenant's active credential.
#[utoipa::path(
    get,
    path = "/api/v1/providers/{provider_id}/health",
    responses(
        (status = 200, description = "Probe result", body = ProviderHealthDto),
        (status = 404, description = "Unknown provider")
    ),
    tags = ["providers"],
    operation_id = "providerHealth"
)]
#[get("/providers/{provider_id}/health")]
pub async fn provider_health(
    request: HttpRequest,
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<web::Json<ProviderHealthDto>, ApiError> {
    let tenant = tenant_id(&request)?;
    let health = state
        .jobs
        .provider_health(tenant, &path.into_inner())
        .await?;
    Ok(web::Json(ProviderHealthDto {
        ok: health.ok,
        message: health.message,
    }))
}

/// Request cooperative cancellation of a job.
#[utoipa::path(
    post,
    path = "/api/v1/jobs/{id}/cancel",
    responses(
        (status = 202, description = "Cancellation requested", body = CancelAckDto),
        (status = 404, description = "Unknown job")
    ),
    tags = ["jobs"],
    operation_id = "cancelJob"
)]
#[post("/jobs/{id}/cancel")]
pub async fn cancel_job(
    request: HttpRequest,
    state: web::Data<AppState>,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, ApiError> {
    let tenant = tenant_id(&request)?;
    let job_id = path.into_inner();
    let status = state.jobs.cancel_job(tenant, job_id).await?;
    Ok(HttpResponse::Accepted().json(CancelAckDto { job_id, status }))
}
