//! CompanyEnrich adapter: synchronous company enrichment.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Client;
use url::Url;
use serde::Deserialize;
use serde_json::Value;

use crate::domain::ports::{Provider, ProviderContext, ProviderSecret};
use crate::domain::{
    CancelToken, CanonicalCompany, EnrichmentRequest, Error, Operation, ProviderDescriptor,
};

use super::http::{build_client, map_decode_error, map_status_error, map_transport_error};

/// CompanyEnrich adapter.
pub struct CompanyEnrichProvider {
    descriptor: Arc<ProviderDescriptor>,
    client: Client,
    base_url: Url,
    secret: ProviderSecret,
}

impl CompanyEnrichProvider {
    /// Build an authenticated adapter from registry context.
    ///
    /// # Errors
    ///
    /// Returns `INVALID_INPUT` for an unparsable base URL and `INTERNAL`
    /// when the HTTP client cannot be constructed.
    pub fn new(context: ProviderContext) -> Result<Self, Error> {
        let base_url = Url::parse(&context.descriptor.base_url).map_err(|error| {
            Error::invalid_input(format!(
                "companyenrich base_url \"{}\" is invalid: {error}",
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
}

#[derive(Debug, Deserialize)]
struct CompanyDto {
    name: Option<String>,
    domain: Option<String>,
    description: Option<String>,
    industry: Option<String>,
    #[serde(alias = "employees")]
    size: Option<Value>,
    #[serde(alias = "country")]
    location: Option<String>,
    linkedin_url: Option<String>,
    #[serde(default)]
    technologies: Vec<String>,
}

fn map_company_payload(body: &[u8], requested_domain: &str) -> Result<Value, Error> {
    let dto: CompanyDto =
        serde_json::from_slice(body).map_err(|error| map_decode_error("companyenrich", &error))?;
    let company = CanonicalCompany {
        name: dto.name.unwrap_or_default(),
        domain: dto.domain.unwrap_or_else(|| requested_domain.to_owned()),
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
    };
    serde_json::to_value(company)
        .map_err(|error| Error::internal(format!("company serialization failed: {error}")))
}

#[async_trait]
impl Provider for CompanyEnrichProvider {
    fn descriptor(&self) -> &ProviderDescriptor {
        &self.descriptor
    }

    fn validate_config(&self) -> Result<(), Error> {
        if self.base_url.host_str().is_none() {
            return Err(Error::invalid_input(
                "companyenrich base_url is missing a host",
            ));
        }
        Ok(())
    }

    async fn execute(
        &self,
        request: &EnrichmentRequest,
        _cancel: &CancelToken,
    ) -> Result<Value, Error> {
        match request.operation {
            Operation::EnrichCompany => {
                let domain = request
                    .param_str("domain")
                    .ok_or_else(|| Error::invalid_input("enrich-company requires domain"))?;

                let mut url = self.base_url.clone();
                {
                    let mut segments = url.path_segments_mut().map_err(|()| {
                        Error::invalid_input("companyenrich base_url cannot be a base")
                    })?;
                    segments.pop_if_empty().push("companies").push("enrich");
                }
                url.query_pairs_mut().append_pair("domain", domain);

                let response = self
                    .client
                    .get(url)
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
                map_company_payload(body.as_ref(), domain)
            }
            other => Err(Error::operation_unsupported(format!(
                "companyenrich does not implement {other}"
            ))),
        }
    }
}
