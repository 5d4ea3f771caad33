//! Canonical output records all provider payloads are mapped into.
//!
//! Providers return heterogeneous shapes; adapters normalize into these two
//! records and stash anything without a canonical home in `additional`.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::ToSchema;

/// Normalized person record.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize, ToSchema)]
pub struct CanonicalPerson {
    /// Given name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    /// Family name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    /// Full display name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub full_name: Option<String>,
    /// Work email address.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    /// Phone number.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    /// Job title.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Current employer name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub company: Option<String>,
    /// Current employer primary domain.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub company_domain: Option<String>,
    /// LinkedIn profile URL.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub linkedin_url: Option<String>,
    /// Free-form location string.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    /// Provider-specific fields with no canonical home.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub additional: BTreeMap<String, Value>,
}

/// Normalized company record.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize, ToSchema)]
pub struct CanonicalCompany {
    /// Legal or trading name.
    pub name: String,
    /// Primary domain.
    pub domain: String,
    /// Short description.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Industry label.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub industry: Option<String>,
    /// Headcount band or employee count.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<String>,
    /// Free-form location string.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    /// LinkedIn company URL.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub linkedin_url: Option<String>,
    /// Detected technology names.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub technologies: Vec<String>,
    /// Provider-specific fields with no canonical home.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub additional: BTreeMap<String, Value>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_optionals_are_omitted_from_wire_form() {
        let person = CanonicalPerson {
            email: Some("jane@acme.com".to_owned()),
            ..CanonicalPerson::default()
        };
        let json = serde_json::to_value(&person).expect("serializes");
        assert_eq!(json, serde_json::json!({ "email": "jane@acme.com" }));
    }

    #[test]
    fn additional_fields_survive_round_trip() {
        let mut company = CanonicalCompany {
            name: "ACME".to_owned(),
            domain: "acme.com".to_owned(),
            ..CanonicalCompany::default()
        };
        company
            .additional
            .insert("funding_stage".to_owned(), serde_json::json!("series-b"));

        let json = serde_json::to_value(&company).expect("serializes");
        let decoded: CanonicalCompany = serde_json::from_value(json).expect("deserializes");
        assert_eq!(decoded, company);
    }
}
