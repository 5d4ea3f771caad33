//! Surfe adapter: asynchronous company enrichment and lookalike search.
//!
//! Company enrichment is asynchronous on Surfe's side: the initial POST
//! returns an enrichment id with status `PENDING`, and the adapter polls
//! the status endpoint to completion from inside `execute`, so the whole
//! sequence counts as one dispatch attempt.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Client;
use url::Url;
use serde::Deserialize;
use serde_json::{Value, json};

use crate::domain::dispatch::{PollSchedule, PollStatus, poll_until_complete};
use crate::domain::ports::{Provider, ProviderContext, ProviderSecret};
use crate::domain::{
    CancelToken, CanonicalCompany, EnrichmentRequest, Error, Operation, ProviderDescriptor,
};

use super::http::{build_client, map_decode_error, map_status_error, map_transport_error};

/// Surfe adapter.
pub struct SurfeProvider {
    descriptor: Arc<ProviderDescriptor>,
    client: Client,
    base_url: Url,
    secret: ProviderSecret,
}

impl SurfeProvider {
    /// Build an authenticated adapter from registry context.
    ///
    /// # Errors
    ///
    /// Returns `INVALID_INPUT` for an unparsable base URL and `INTERNAL`
    /// when the HTTP client cannot be constructed.
    pub fn new(context: ProviderContext) -> Result<Self, Error> {
        let base_url = Url::parse(&context.descriptor.base_url).map_err(|error| {
            Error::invalid_input(format!(
                "surfe base_url \"{}\" is invalid: {error}",
                context.descriptor.base_url
            ))
        })?;
        Ok(Self {
            descriptor: context.descriptor,
            client: build_client()?,
            base_url,
            secret: context.secret,
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url, Error> {
        let mut url = self.base_url.clone();
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|()| Error::invalid_input("surfe base_url cannot be a base"))?;
            segments.pop_if_empty();
            for part in path.split('/').filter(|part| !part.is_empty()) {
                segments.push(part);
            }
        }
        Ok(url)
    }

    async fn request_json(
        &self,
        builder: reqwest::RequestBuilder,
    ) -> Result<Vec<u8>, Error> {
        let response = builder
            .bearer_auth(self.secret.expose())
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await
            .map_err(|error| map_transport_error(&error))?;

        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|error| map_transport_error(&error))?;
        if !status.is_success() {
            return Err(map_status_error(status, body.as_ref()));
        }
        Ok(body.to_vec())
    }

    async fn fetch_enrichment_status(&self, enrichment_id: &str) -> Result<PollStatus, Error> {
        let url = self.endpoint(&format!("organizations/enrich/{enrichment_id}"))?;
        let body = self.request_json(self.client.get(url)).await?;
        parse_enrichment_status(&body)
    }

    async fn enrich_company(
        &self,
        request: &EnrichmentRequest,
        cancel: &CancelToken,
    ) -> Result<Value, Error> {
        let domain = request
            .param_str("domain")
            .ok_or_else(|| Error::invalid_input("enrich-company requires domain"))?;

        let mut submit_body = serde_json::Map::new();
        submit_body.insert("domain".to_owned(), json!(domain));
        if let Some(webhook_url) = &request.options.webhook_url {
            submit_body.insert("webhookUrl".to_owned(), json!(webhook_url));
        }

        let url = self.endpoint("organizations/enrich")?;
        let body = self
            .request_json(self.client.post(url).json(&Value::Object(submit_body)))
            .await?;
        let accepted: EnrichmentAccepted =
            serde_json::from_slice(&body).map_err(|error| map_decode_error("surfe", &error))?;

        // Some lookups complete synchronously; only poll when Surfe says
        // the enrichment is still running.
        match parse_status_fields(accepted.status.as_deref(), accepted.organization)? {
            PollStatus::Completed(payload) => return Ok(payload),
            PollStatus::Failed(reason) => {
                return Err(Error::provider_unavailable(format!(
                    "surfe enrichment failed: {reason}"
                )));
            }
            PollStatus::Pending | PollStatus::InProgress => {}
        }

        let enrichment_id = accepted
            .enrichment_id
            .ok_or_else(|| Error::provider_unavailable("surfe returned no enrichment id"))?;

        poll_until_complete(PollSchedule::default(), cancel, |_poll| {
            let enrichment_id = enrichment_id.clone();
            async move { self.fetch_enrichment_status(&enrichment_id).await }
        })
        .await
    }

    async fn find_lookalikes(&self, request: &EnrichmentRequest) -> Result<Value, Error> {
        let domain = request
            .param_str("domain")
            .ok_or_else(|| Error::invalid_input("find-lookalike requires domain"))?;
        let limit = request
            .params
            .get("limit")
            .and_then(Value::as_u64)
            .unwrap_or(10);

        let url = self.endpoint("organizations/lookalikes")?;
        let body = self
            .request_json(
                self.client
                    .post(url)
                    .json(&json!({ "domain": domain, "limit": limit })),
            )
            .await?;
        map_lookalikes_payload(&body)
    }
}

#[derive(Debug, Deserialize)]
struct EnrichmentAccepted {
    #[serde(alias = "id")]
    enrichment_id: Option<String>,
    status: Option<String>,
    organization: Option<OrganizationDto>,
}

#[derive(Debug, Deserialize)]
struct EnrichmentStatusDto {
    status: Option<String>,
    organization: Option<OrganizationDto>,
    #[serde(alias = "error")]
    failure_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct LookalikesEnvelope {
    #[serde(default)]
    organizations: Vec<OrganizationDto>,
}

#[derive(Debug, Deserialize)]
struct OrganizationDto {
    name: Option<String>,
    #[serde(alias = "website")]
    domain: Option<String>,
    description: Option<String>,
    industry: Option<String>,
    #[serde(alias = "employee_count")]
    size: Option<Value>,
    #[serde(alias = "hq_country")]
    location: Option<String>,
    linkedin_url: Option<String>,
    #[serde(default)]
    technologies: Vec<String>,
}

fn organization_to_canonical(dto: OrganizationDto) -> CanonicalCompany {
    CanonicalCompany {
        name: dto.name.unwrap_or_default(),
        domain: dto.domain.unwrap_or_default(),
        description: dto.description,
        industry: dto.industry,
        size: dto.size.map(|size| match size {
            Value::String(text) => text,
            other => other.to_string(),
        }),
        location: dto.location,
        linkedin_url: dto.linkedin_url,
        technologies: dto.technologies,
        ..CanonicalCompany::default()
    }
}

fn organization_payload(dto: OrganizationDto) -> Result<Value, Error> {
    serde_json::to_value(organization_to_canonical(dto))
        .map_err(|error| Error::internal(format!("company serialization failed: {error}")))
}

fn parse_status_fields(
    status: Option<&str>,
    organization: Option<OrganizationDto>,
) -> Result<PollStatus, Error> {
    match status.unwrap_or("PENDING") {
        "COMPLETED" => {
            let organization = organization.ok_or_else(|| {
                Error::provider_unavailable("surfe reported COMPLETED without a payload")
            })?;
            Ok(PollStatus::Completed(organization_payload(organization)?))
        }
        "FAILED" => Ok(PollStatus::Failed("surfe reported FAILED".to_owned())),
        "IN_PROGRESS" => Ok(PollStatus::InProgress),
        _ => Ok(PollStatus::Pending),
    }
}

fn parse_enrichment_status(body: &[u8]) -> Result<PollStatus, Error> {
    let dto: EnrichmentStatusDto =
        serde_json::from_slice(body).map_err(|error| map_decode_error("surfe", &error))?;
    if let Some(reason) = dto.failure_reason {
        return Ok(PollStatus::Failed(reason));
    }
    parse_status_fields(dto.status.as_deref(), dto.organization)
}

fn map_lookalikes_payload(body: &[u8]) -> Result<Value, Error> {
    let envelope: LookalikesEnvelope =
        serde_json::from_slice(body).map_err(|error| map_decode_error("surfe", &error))?;
    let companies: Vec<CanonicalCompany> = envelope
        .organizations
        .into_iter()
        .map(organization_to_canonical)
        .collect();
    let count = companies.len();
    Ok(json!({ "companies": companies, "count": count }))
}

#[async_trait]
impl Provider for SurfeProvider {
    fn descriptor(&self) -> &ProviderDescriptor {
        &self.descriptor
    }

    fn validate_config(&self) -> Result<(), Error> {
        if self.base_url.host_str().is_none() {
            return Err(Error::invalid_input("surfe base_url is missing a host"));
        }
        Ok(())
    }

    async fn execute(
        &self,
        request: &EnrichmentRequest,
        cancel: &CancelToken,
    ) -> Result<Value, Error> {
        match request.operation {
            Operation::EnrichCompany => self.enrich_company(request, cancel).await,
            Operation::FindLookalike => self.find_lookalikes(request).await,
            Operation::CheckEnrichmentStatus => {
                let enrichment_id = request
                    .param_str("enrichment_id")
                    .ok_or_else(|| Error::invalid_input("check-enrichment-status requires enrichment_id"))?;
                match self.fetch_enrichment_status(enrichment_id).await? {
                    PollStatus::Completed(payload) => {
                        Ok(json!({ "status": "COMPLETED", "data": payload }))
                    }
                    PollStatus::Failed(reason) => {
                        Ok(json!({ "status": "FAILED", "reason": reason }))
                    }
                    PollStatus::InProgress => Ok(json!({ "status": "IN_PROGRESS" })),
                    PollStatus::Pending => Ok(json!({ "status": "PENDING" })),
                }
            }
            other => Err(Error::operation_unsupported(format!(
                "surfe does not implement {other}"
            ))),
        }
    }
}
