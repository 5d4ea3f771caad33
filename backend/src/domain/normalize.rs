//! Input cleaning applied before a record reaches the dispatcher.
//!
//! Cleaning is idempotent: `clean_domain(clean_domain(d)) == clean_domain(d)`.

use serde_json::{Map, Value};

use crate::domain::{EnrichmentRequest, Error, Operation};

/// Normalize a company domain: lowercase, strip scheme, `www.` prefix, path,
/// port, and surrounding whitespace.
///
/// # Errors
///
/// Returns `INVALID_INPUT` when the remainder is not a plausible DNS name.
///
/// # Examples
/// ```
/// use backend::domain::normalize::clean_domain;
///
/// assert_eq!(clean_domain("https://WWW.Acme.com/about").unwrap(), "acme.com");
/// assert_eq!(clean_domain("acme.com").unwrap(), "acme.com");
/// ```
pub fn clean_domain(raw: &str) -> Result<String, Error> {
    let mut domain = raw.trim().to_ascii_lowercase();
    for scheme in ["https://", "http://"] {
        if let Some(rest) = domain.strip_prefix(scheme) {
            domain = rest.to_owned();
            break;
        }
    }
    if let Some(rest) = domain.strip_prefix("www.") {
        domain = rest.to_owned();
    }
    if let Some((host, _path)) = domain.split_once('/') {
        domain = host.to_owned();
    }
    if let Some((host, _port)) = domain.split_once(':') {
        domain = host.to_owned();
    }

    if is_valid_domain(&domain) {
        Ok(domain)
    } else {
        Err(Error::invalid_input(format!(
            "\"{raw}\" is not a valid domain"
        )))
    }
}

/// Validate a cleaned DNS name: dot-separated labels of alphanumerics and
/// inner hyphens, with an alphabetic top-level label of at least two chars.
fn is_valid_domain(domain: &str) -> bool {
    let labels: Vec<&str> = domain.split('.').collect();
    if labels.len() < 2 {
        return false;
    }
    let valid_label = |label: &&str| {
        !label.is_empty()
            && label.len() <= 63
            && !label.starts_with('-')
            && !label.ends_with('-')
            && label
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-')
    };
    if !labels.iter().all(valid_label) {
        return false;
    }
    labels
        .last()
        .is_some_and(|tld| tld.len() >= 2 && tld.chars().all(|c| c.is_ascii_alphabetic()))
}

/// Lightweight shape check for an email address.
#[must_use]
pub fn is_plausible_email(email: &str) -> bool {
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    !local.is_empty() && !local.contains(char::is_whitespace) && is_valid_domain(domain)
}

/// Validate and normalize one record's parameters for `operation`.
///
/// Missing required identifiers fail with `INVALID_INPUT` before any
/// credits are consumed; domain-bearing fields are cleaned in place.
///
/// # Errors
///
/// Returns `INVALID_INPUT` naming the offending field.
pub fn normalize_record(
    operation: Operation,
    params: &Map<String, Value>,
) -> Result<Map<String, Value>, Error> {
    let mut normalized = params.clone();

    let clean_field = |normalized: &mut Map<String, Value>, key: &str| -> Result<(), Error> {
        if let Some(raw) = param_str(params, key) {
            let cleaned = clean_domain(raw)?;
            normalized.insert(key.to_owned(), Value::String(cleaned));
        }
        Ok(())
    };
    clean_field(&mut normalized, "domain")?;
    clean_field(&mut normalized, "company_domain")?;

    match operation {
        Operation::FindEmail => {
            let has_name = param_str(params, "full_name").is_some()
                || (param_str(params, "first_name").is_some()
                    && param_str(params, "last_name").is_some());
            if !has_name {
                return Err(Error::invalid_input(
                    "find-email requires full_name or first_name and last_name",
                ));
            }
            require(&normalized, "company_domain", "find-email")?;
        }
        Operation::EnrichPerson => {
            let email_ok = param_str(params, "email").is_some_and(is_plausible_email);
            let linkedin_ok = param_str(params, "linkedin_url").is_some();
            if !email_ok && !linkedin_ok {
                return Err(Error::invalid_input(
                    "enrich-person requires a valid email or linkedin_url",
                ));
            }
        }
        Operation::EnrichCompany | Operation::FindLookalike => {
            require(&normalized, "domain", operation.as_str())?;
        }
        Operation::SearchPeople | Operation::SearchCompanies => {
            if normalized.values().all(is_blank) {
                return Err(Error::invalid_input(format!(
                    "{operation} requires at least one filter"
                )));
            }
        }
        Operation::CheckEnrichmentStatus => {
            require(&normalized, "enrichment_id", operation.as_str())?;
        }
    }

    Ok(normalized)
}

/// Validate a full request, returning it with cleaned params.
///
/// # Errors
///
/// Propagates the `INVALID_INPUT` produced by [`normalize_record`].
pub fn normalize_request(request: &EnrichmentRequest) -> Result<EnrichmentRequest, Error> {
    let params = normalize_record(request.operation, &request.params)?;
    Ok(EnrichmentRequest {
        operation: request.operation,
        params,
        options: request.options.clone(),
    })
}

fn param_str<'a>(params: &'a Map<String, Value>, key: &str) -> Option<&'a str> {
    params
        .get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|value| !value.is_empty())
}

fn require(params: &Map<String, Value>, key: &str, operation: &str) -> Result<(), Error> {
    if param_str(params, key).is_some() {
        Ok(())
    } else {
        Err(Error::invalid_input(format!("{operation} requires {key}")))
    }
}

fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.is_empty(),
        Value::Bool(_) | Value::Number(_) => false,
    }
}
