//! Credential management HTTP handlers.

use actix_web::{HttpRequest, HttpResponse, delete, get, patch, post, web};
use uuid::Uuid;

use crate::domain::credentials::CredentialView;

use super::dto::{AddCredentialDto, UpdateCredentialDto};
use super::error::ApiError;
use super::{AppState, tenant_id};

/// List the pair's credentials (material withheld).
#[utoipa::path(
    get,
    path = "/api/v1/providers/{provider_id}/keys",
    responses((status = 200, description = "Credentials", body = [CredentialView])),
    tags = ["credentials"],
    operation_id = "listCredentials"
)]
#[get("/providers/{provider_id}/keys")]
pub async fn list_credentials(
    request: HttpRequest,
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<web::Json<Vec<CredentialView>>, ApiError> {
    let tenant = tenant_id(&request)?;
    let views = state.credentials.list(tenant, &path.into_inner()).await?;
    Ok(web::Json(views))
}

/// Store a credential (inactive until activated).
#[utoipa::path(
    post,
    path = "/api/v1/providers/{provider_id}/keys",
    request_body = AddCredentialDto,
    responses((status = 201, description = "Credential stored", body = CredentialView)),
    tags = ["credentials"],
    operation_id = "addCredential"
)]
#[post("/providers/{provider_id}/keys")]
pub async fn add_credential(
    request: HttpRequest,
    state: web::Data<AppState>,
    path: web::Path<String>,
    payload: web::Json<AddCredentialDto>,
) -> Result<HttpResponse, ApiError> {
    let tenant = tenant_id(&request)?;
    let payload = payload.into_inner();
    let view = state
        .credentials
        .add(tenant, &path.into_inner(), &payload.label, &payload.api_key)
        .await?;
    Ok(HttpResponse::Created().json(view))
}

/// Make a credential the pair's active one.
#[utoipa::path(
    post,
    path = "/api/v1/providers/{provider_id}/keys/{id}/activate",
    responses(
        (status = 200, description = "Credential activated", body = CredentialView),
        (status = 404, description = "Unknown credential")
    ),
    tags = ["credentials"],
    operation_id = "activateCredential"
)]
#[post("/providers/{provider_id}/keys/{id}/activate")]
pub async fn activate_credential(
    request: HttpRequest,
    state: web::Data<AppState>,
    path: web::Path<(String, Uuid)>,
) -> Result<web::Json<CredentialView>, ApiError> {
    let tenant = tenant_id(&request)?;
    let (_provider_id, credential_id) = path.into_inner();
    let view = state.credentials.activate(tenant, credential_id).await?;
    Ok(web::Json(view))
}

/// Update a credential's label and/or material.
#[utoipa::path(
    patch,
    path = "/api/v1/providers/{provider_id}/keys/{id}",
    request_body = UpdateCredentialDto,
    responses(
        (status = 200, description = "Credential updated", body = CredentialView),
        (status = 404, description = "Unknown credential")
    ),
    tags = ["credentials"],
    operation_id = "updateCredential"
)]
#[patch("/providers/{provider_id}/keys/{id}")]
pub async fn update_credential(
    request: HttpRequest,
    state: web::Data<AppState>,
    path: web::Path<(String, Uuid)>,
    payload: web::Json<UpdateCredentialDto>,
) -> Result<web::Json<CredentialView>, ApiError> {
    let tenant = tenant_id(&request)?;
    let (_provider_id, credential_id) = path.into_inner();
    let payload = payload.into_inner();
    let view = state
        .credentials
        .update(tenant, credential_id, payload.label, payload.api_key)
        .await?;
    Ok(web::Json(view))
}

/// Delete a credential.
#[utoipa::path(
    delete,
    path = "/api/v1/providers/{provider_id}/keys/{id}",
    responses(
        (status = 204, description = "Credential deleted"),
        (status = 404, description = "Unknown credential")
    ),
    tags = ["credentials"],
    operation_id = "deleteCredential"
)]
#[delete("/providers/{provider_id}/keys/{id}")]
pub async fn delete_credential(
    request: HttpRequest,
    state: web::Data<AppState>,
    path: web::Path<(String, Uuid)>,
) -> Result<HttpResponse, ApiError> {
    let tenant = tenant_id(&request)?;
    let (_provider_id, credential_id) = path.into_inner();
    state.credentials.delete(tenant, credential_id).await?;
    Ok(HttpResponse::NoContent().finish())
}
