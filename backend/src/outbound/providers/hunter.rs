//! Hunter adapter: email finding over the v2 REST API.
//!
//! Hunter authenticates with an `api_key` query parameter and reports a
//! 0..100 confidence score; the adapter normalizes that to a 0..1 fraction
//! and folds the verification status into a boolean.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Client;
use url::Url;
use serde::Deserialize;
use serde_json::Value;

use crate::domain::ports::{Provider, ProviderContext, ProviderHealth, ProviderSecret};
use crate::domain::{
    CancelToken, CanonicalPerson, EnrichmentRequest, Error, Operation, ProviderDescriptor,
};

use super::http::{build_client, map_decode_error, map_status_error, map_transport_error};

/// Hunter v2 adapter.
pub struct HunterProvider {
    descriptor: Arc<ProviderDescriptor>,
    client: Client,
    base_url: Url,
    secret: ProviderSecret,
}

impl HunterProvider {
    /// Build an authenticated adapter from registry context.
    ///
    /// # Errors
    ///
    /// Returns `INVALID_INPUT` for an unparsable base URL and `INTERNAL`
    /// when the HTTP client cannot be constructed.
    pub fn new(context: ProviderContext) -> Result<Self, Error> {
        let base_url = Url::parse(&context.descriptor.base_url).map_err(|error| {
            Error::invalid_input(format!(
                "hunter base_url \"{}\" is invalid: {error}",
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

    fn email_finder_url(&self, request: &EnrichmentRequest) -> Result<Url, Error> {
        let mut url = join_path(&self.base_url, "email-finder")?;
        {
            let mut query = url.query_pairs_mut();
            if let Some(domain) = request.param_str("company_domain") {
                query.append_pair("domain", domain);
            }
            if let Some(full_name) = request.param_str("full_name") {
                query.append_pair("full_name", full_name);
            } else {
                if let Some(first_name) = request.param_str("first_name") {
                    query.append_pair("first_name", first_name);
                }
                if let Some(last_name) = request.param_str("last_name") {
                    query.append_pair("last_name", last_name);
                }
            }
            query.append_pair("api_key", self.secret.expose());
        }
        Ok(url)
    }
}

fn join_path(base: &Url, segment: &str) -> Result<Url, Error> {
    let mut url = base.clone();
    {
        let mut segments = url
            .path_segments_mut()
            .map_err(|()| Error::invalid_input("hunter base_url cannot be a base"))?;
        segments.pop_if_empty().push(segment);
    }
    Ok(url)
}

#[derive(Debug, Deserialize)]
struct EmailFinderEnvelope {
    data: EmailFinderData,
}

#[derive(Debug, Deserialize)]
struct EmailFinderData {
    email: Option<String>,
    score: Option<f64>,
    first_name: Option<String>,
    last_name: Option<String>,
    position: Option<String>,
    company: Option<String>,
    domain: Option<String>,
    linkedin_url: Option<String>,
    verification: Option<EmailVerification>,
}

#[derive(Debug, Deserialize)]
struct EmailVerification {
    status: Option<String>,
}

fn map_email_finder_payload(body: &[u8]) -> Result<Value, Error> {
    let envelope: EmailFinderEnvelope =
        serde_json::from_slice(body).map_err(|error| map_decode_error("hunter", &error))?;
    let data = envelope.data;

    let Some(email) = data.email.filter(|email| !email.is_empty()) else {
        return Err(Error::not_found("hunter found no email for this person"));
    };

    let person = CanonicalPerson {
        first_name: data.first_name,
        last_name: data.last_name,
        email: Some(email),
        title: data.position,
        company: data.company,
        company_domain: data.domain,
        linkedin_url: data.linkedin_url,
        ..CanonicalPerson::default()
    };

    let mut payload = serde_json::to_value(&person)
        .map_err(|error| Error::internal(format!("person serialization failed: {error}")))?;
    if let Value::Object(object) = &mut payload {
        let confidence = data.score.map_or(0.0, |score| score / 100.0);
        object.insert("confidence".to_owned(), Value::from(confidence));
        let verified = data
            .verification
            .and_then(|verification| verification.status)
            .is_some_and(|status| status == "valid");
        object.insert("verified".to_owned(), Value::Bool(verified));
    }
    Ok(payload)
}

#[async_trait]
impl Provider for HunterProvider {
    fn descriptor(&self) -> &ProviderDescriptor {
        &self.descriptor
    }

    fn validate_config(&self) -> Result<(), Error> {
        if self.base_url.host_str().is_none() {
            return Err(Error::invalid_input("hunter base_url is missing a host"));
        }
        Ok(())
    }

    async fn execute(
        &self,
        request: &EnrichmentRequest,
        _cancel: &CancelToken,
    ) -> Result<Value, Error> {
        match request.operation {
            Operation::FindEmail => {
                let url = self.email_finder_url(request)?;
                let response = self
                    .client
                    .get(url)
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
                map_email_finder_payload(body.as_ref())
            }
            other => Err(Error::operation_unsupported(format!(
                "hunter does not implement {other}"
            ))),
        }
    }

    async fn health_check(&self) -> ProviderHealth {
        let Ok(mut url) = join_path(&self.base_url, "account") else {
            return ProviderHealth::unhealthy("hunter base_url cannot be a base");
        };
        url.query_pairs_mut()
            .append_pair("api_key", self.secret.expose());
        match self.client.get(url).send().await {
            Ok(response) if response.status().is_success() => ProviderHealth::healthy(),
            Ok(response) => {
                ProviderHealth::unhealthy(format!("hunter account probe: {}", response.status()))
            }
            Err(error) => ProviderHealth::unhealthy(error.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::BTreeMap;

    use crate::domain::{ProviderCategory, ProviderFeature};

    fn context() -> ProviderContext {
        ProviderContext {
            descriptor: Arc::new(ProviderDescriptor {
                id: "hunter".to_owned(),
                display_name: "Hunter".to_owned(),
                category: ProviderCategory::EmailFinder,
                base_url: "https://api.hunter.io/v2".to_owned(),
                requests_per_second: 10.0,
                burst_size: 600,
                daily_quota: Some(5_000),
                max_concurrent: 2,
                features: vec![ProviderFeature {
                    operation: Operation::FindEmail,
                    name: "Email finder".to_owned(),
                    endpoint: "/email-finder".to_owned(),
                    http_method: "GET".to_owned(),
                    credits_per_request: 1,
                }],
                config: BTreeMap::new(),
            }),
            tenant_id: uuid::Uuid::new_v4(),
            secret: ProviderSecret::new("sk-hunter"),
        }
    }

    fn request() -> EnrichmentRequest {
        let mut params = serde_json::Map::new();
        params.insert("first_name".to_owned(), json!("Jane"));
        params.insert("last_name".to_owned(), json!("Doe"));
        params.insert("company_domain".to_owned(), json!("acme.com"));
        EnrichmentRequest::new(Operation::FindEmail, params)
    }

    #[test]
    fn email_finder_url_carries_identity_and_key() {
        let provider = HunterProvider::new(context()).expect("constructs");
        let url = provider.email_finder_url(&request()).expect("builds");

        assert_eq!(url.path(), "/v2/email-finder");
        let query: Vec<(String, String)> = url
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        assert!(query.contains(&("domain".to_owned(), "acme.com".to_owned())));
        assert!(query.contains(&("first_name".to_owned(), "Jane".to_owned())));
        assert!(query.contains(&("api_key".to_owned(), "sk-hunter".to_owned())));
    }

    #[test]
    fn payload_normalizes_score_and_verification() {
        let body = json!({
            "data": {
                "email": "jane@acme.com",
                "score": 90,
                "first_name": "Jane",
                "last_name": "Doe",
                "position": "CTO",
                "company": "ACME",
                "domain": "acme.com",
                "verification": { "status": "valid" }
            }
        });
        let payload =
            map_email_finder_payload(body.to_string().as_bytes()).expect("maps");
        assert_eq!(payload["email"], json!("jane@acme.com"));
        assert_eq!(payload["confidence"], json!(0.9));
        assert_eq!(payload["verified"], json!(true));
        assert_eq!(payload["title"], json!("CTO"));
    }

    #[test]
    fn missing_email_maps_to_not_found() {
        let body = json!({ "data": { "email": null, "score": 0 } });
        let error = map_email_finder_payload(body.to_string().as_bytes()).expect_err("fails");
        assert_eq!(error.code(), crate::domain::ErrorCode::NotFound);
    }

    #[test]
    fn undecodable_payloads_map_to_provider_unavailable() {
        let error = map_email_finder_payload(b"<html>gateway error</html>").expect_err("fails");
        assert_eq!(error.code(), crate::domain::ErrorCode::ProviderUnavailable);
    }
}
