//! Apollo adapter: person enrichment and people search.
//!
//! Apollo authenticates with an `X-Api-Key` header. Person matches come
//! back under `person`, searches under `people`; both map into
//! `CanonicalPerson`.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Client;
use url::Url;
use serde::Deserialize;
use serde_json::{Value, json};

use crate::domain::ports::{Provider, ProviderContext, ProviderSecret};
use crate::domain::{
    CancelToken, CanonicalPerson, EnrichmentRequest, Error, Operation, ProviderDescriptor,
};

use super::http::{build_client, map_decode_error, map_status_error, map_transport_error};

/// Apollo adapter.
pub struct ApolloProvider {
    descriptor: Arc<ProviderDescriptor>,
    client: Client,
    base_url: Url,
    secret: ProviderSecret,
}

impl ApolloProvider {
    /// Build an authenticated adapter from registry context.
    ///
    /// # Errors
    ///
    /// Returns `INVALID_INPUT` for an unparsable base URL and `INTERNAL`
    /// when the HTTP client cannot be constructed.
    pub fn new(context: ProviderContext) -> Result<Self, Error> {
        let base_url = Url::parse(&context.descriptor.base_url).map_err(|error| {
            Error::invalid_input(format!(
                "apollo base_url \"{}\" is invalid: {error}",
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

    async fn post_json(&self, path: &str, body: &Value) -> Result<Vec<u8>, Error> {
        let mut url = self.base_url.clone();
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|()| Error::invalid_input("apollo base_url cannot be a base"))?;
            segments.pop_if_empty();
            for part in path.split('/').filter(|part| !part.is_empty()) {
                segments.push(part);
            }
        }

        let response = self
            .client
            .post(url)
            .header("X-Api-Key", self.secret.expose())
            .header(reqwest::header::ACCEPT, "application/json")
            .json(body)
            .send()
            .await
            .map_err(|error| map_transport_error(&error))?;

        let status = response.status();
        let bytes = response
            .bytes()
            .await
            .map_err(|error| map_transport_error(&error))?;
        if !status.is_success() {
            return Err(map_status_error(status, bytes.as_ref()));
        }
        Ok(bytes.to_vec())
    }
}

#[derive(Debug, Deserialize)]
struct PersonMatchEnvelope {
    person: Option<PersonDto>,
}

#[derive(Debug, Deserialize)]
struct PeopleSearchEnvelope {
    #[serde(default)]
    people: Vec<PersonDto>,
}

#[derive(Debug, Deserialize)]
struct PersonDto {
    first_name: Option<String>,
    last_name: Option<String>,
    name: Option<String>,
    email: Option<String>,
    title: Option<String>,
    linkedin_url: Option<String>,
    city: Option<String>,
    country: Option<String>,
    organization: Option<OrganizationDto>,
}

#[derive(Debug, Deserialize)]
struct OrganizationDto {
    name: Option<String>,
    primary_domain: Option<String>,
}

fn person_to_canonical(dto: PersonDto) -> CanonicalPerson {
    let location = match (dto.city, dto.country) {
        (Some(city), Some(country)) => Some(format!("{city}, {country}")),
        (Some(single), None) | (None, Some(single)) => Some(single),
        (None, None) => None,
    };
    let (company, company_domain) = dto
        .organization
        .map_or((None, None), |org| (org.name, org.primary_domain));

    CanonicalPerson {
        first_name: dto.first_name,
        last_name: dto.last_name,
        full_name: dto.name,
        email: dto.email,
        title: dto.title,
        company,
        company_domain,
        linkedin_url: dto.linkedin_url,
        location,
        ..CanonicalPerson::default()
    }
}

fn map_match_payload(body: &[u8]) -> Result<Value, Error> {
    let envelope: PersonMatchEnvelope =
        serde_json::from_slice(body).map_err(|error| map_decode_error("apollo", &error))?;
    let person = envelope
        .person
        .ok_or_else(|| Error::not_found("apollo matched no person"))?;
    serde_json::to_value(person_to_canonical(person))
        .map_err(|error| Error::internal(format!("person serialization failed: {error}")))
}

fn map_search_payload(body: &[u8]) -> Result<Value, Error> {
    let envelope: PeopleSearchEnvelope =
        serde_json::from_slice(body).map_err(|error| map_decode_error("apollo", &error))?;
    let people: Vec<CanonicalPerson> = envelope
        .people
        .into_iter()
        .map(person_to_canonical)
        .collect();
    let count = people.len();
    Ok(json!({ "people": people, "count": count }))
}

fn match_body(request: &EnrichmentRequest) -> Value {
    let mut body = serde_json::Map::new();
    if let Some(email) = request.param_str("email") {
        body.insert("email".to_owned(), json!(email));
    }
    if let Some(linkedin_url) = request.param_str("linkedin_url") {
        body.insert("linkedin_url".to_owned(), json!(linkedin_url));
    }
    body.insert("reveal_personal_emails".to_owned(), json!(false));
    Value::Object(body)
}

fn search_body(request: &EnrichmentRequest) -> Value {
    let mut body = serde_json::Map::new();
    if let Some(keywords) = request.param_str("keywords") {
        body.insert("q_keywords".to_owned(), json!(keywords));
    }
    if let Some(titles) = request.params.get("titles").and_then(Value::as_array) {
        body.insert("person_titles".to_owned(), Value::Array(titles.clone()));
    }
    if let Some(domain) = request.param_str("company_domain") {
        body.insert("q_organization_domains".to_owned(), json!([domain]));
    }
    let page = request
        .params
        .get("page")
        .and_then(Value::as_u64)
        .unwrap_or(1);
    body.insert("page".to_owned(), json!(page));
    Value::Object(body)
}

#[async_trait]
impl Provider for ApolloProvider {
    fn descriptor(&self) -> &ProviderDescriptor {
        &self.descriptor
    }

    fn validate_config(&self) -> Result<(), Error> {
        if self.base_url.host_str().is_none() {
            return Err(Error::invalid_input("apollo base_url is missing a host"));
        }
        Ok(())
    }

    async fn execute(
        &self,
        request: &EnrichmentRequest,
        _cancel: &CancelToken,
    ) -> Result<Value, Error> {
        match request.operation {
            Operation::EnrichPerson => {
                let body = self.post_json("people/match", &match_body(request)).await?;
                map_match_payload(&body)
            }
            Operation::SearchPeople => {
                let body = self
                    .post_json("mixed_people/search", &search_body(request))
                    .await?;
                map_search_payload(&body)
            }
            other => Err(Error::operation_unsupported(format!(
                "apollo does not implement {other}"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn match_body_prefers_normalized_identifiers() {
        let mut params = serde_json::Map::new();
        params.insert("email".to_owned(), json!("jane@acme.com"));
        let request = EnrichmentRequest::new(Operation::EnrichPerson, params);

        let body = match_body(&request);
        assert_eq!(body["email"], json!("jane@acme.com"));
        assert_eq!(body["reveal_personal_emails"], json!(false));
    }

    #[test]
    fn match_payload_maps_into_the_canonical_person() {
        let body = json!({
            "person": {
                "first_name": "Jane",
                "last_name": "Doe",
                "name": "Jane Doe",
                "email": "jane@acme.com",
                "title": "CTO",
                "linkedin_url": "https://linkedin.com/in/janedoe",
                "city": "Berlin",
                "country": "Germany",
                "organization": { "name": "ACME", "primary_domain": "acme.com" }
            }
        });
        let payload = map_match_payload(body.to_string().as_bytes()).expect("maps");
        assert_eq!(payload["email"], json!("jane@acme.com"));
        assert_eq!(payload["company"], json!("ACME"));
        assert_eq!(payload["company_domain"], json!("acme.com"));
        assert_eq!(payload["location"], json!("Berlin, Germany"));
    }

    #[test]
    fn empty_match_maps_to_not_found() {
        let error = map_match_payload(json!({ "person": null }).to_string().as_bytes())
            .expect_err("no person");
        assert_eq!(error.code(), crate::domain::ErrorCode::NotFound);
    }

    #[test]
    fn search_payload_counts_results() {
        let body = json!({
            "people": [
                { "first_name": "Jane", "email": "jane@acme.com" },
                { "first_name": "John", "email": "john@acme.com" }
            ]
        });
        let payload = map_search_payload(body.to_string().as_bytes()).expect("maps");
        assert_eq!(payload["count"], json!(2));
        assert_eq!(payload["people"][1]["first_name"], json!("John"));
    }

    #[test]
    fn search_body_folds_filters() {
        let mut params = serde_json::Map::new();
        params.insert("keywords".to_owned(), json!("rust engineer"));
        params.insert("titles".to_owned(), json!(["CTO", "VP Engineering"]));
        params.insert("company_domain".to_owned(), json!("acme.com"));
        let request = EnrichmentRequest::new(Operation::SearchPeople, params);

        let body = search_body(&request);
        assert_eq!(body["q_keywords"], json!("rust engineer"));
        assert_eq!(body["person_titles"], json!(["CTO", "VP Engineering"]));
        assert_eq!(body["q_organization_domains"], json!(["acme.com"]));
        assert_eq!(body["page"], json!(1));
    }
}
