//! Provider adapters and their registration table.
//!
//! `register_builtin_providers` is the single init function that populates
//! the registry's factory table; no adapter registers itself through import
//! side effects.

mod apollo;
mod companyenrich;
mod http;
mod hunter;
mod surfe;

pub use apollo::ApolloProvider;
pub use companyenrich::CompanyEnrichProvider;
pub use hunter::HunterProvider;
pub use surfe::SurfeProvider;

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::domain::ports::{Provider, ProviderContext};
use crate::domain::registry::ProviderRegistry;
use crate::domain::{Operation, ProviderCategory, ProviderDescriptor, ProviderFeature};

/// Install every built-in provider factory. Called once at startup.
pub fn register_builtin_providers(registry: &ProviderRegistry) {
    registry.register(
        "hunter",
        Arc::new(|context: ProviderContext| {
            Ok(Arc::new(HunterProvider::new(context)?) as Arc<dyn Provider>)
        }),
    );
    registry.register(
        "apollo",
        Arc::new(|context: ProviderContext| {
            Ok(Arc::new(ApolloProvider::new(context)?) as Arc<dyn Provider>)
        }),
    );
    registry.register(
        "surfe",
        Arc::new(|context: ProviderContext| {
            Ok(Arc::new(SurfeProvider::new(context)?) as Arc<dyn Provider>)
        }),
    );
    registry.register(
        "companyenrich",
        Arc::new(|context: ProviderContext| {
            Ok(Arc::new(CompanyEnrichProvider::new(context)?) as Arc<dyn Provider>)
        }),
    );
}

fn feature(
    operation: Operation,
    name: &str,
    endpoint: &str,
    http_method: &str,
    credits: u32,
) -> ProviderFeature {
    ProviderFeature {
        operation,
        name: name.to_owned(),
        endpoint: endpoint.to_owned(),
        http_method: http_method.to_owned(),
        credits_per_request: credits,
    }
}

/// Built-in provider descriptors inserted when the catalog table is empty.
#[must_use]
pub fn seed_descriptors() -> Vec<ProviderDescriptor> {
    vec![
        ProviderDescriptor {
            id: "hunter".to_owned(),
            display_name: "Hunter".to_owned(),
            category: ProviderCategory::EmailFinder,
            base_url: "https://api.hunter.io/v2".to_owned(),
            requests_per_second: 10.0,
            burst_size: 600,
            daily_quota: Some(5_000),
            max_concurrent: 2,
            features: vec![feature(
                Operation::FindEmail,
                "Email finder",
                "/email-finder",
                "GET",
                1,
            )],
            config: BTreeMap::new(),
        },
        ProviderDescriptor {
            id: "apollo".to_owned(),
            display_name: "Apollo".to_owned(),
            category: ProviderCategory::MajorDatabase,
            base_url: "https://api.apollo.io/v1".to_owned(),
            requests_per_second: 5.0,
            burst_size: 300,
            daily_quota: Some(10_000),
            max_concurrent: 2,
            features: vec![
                feature(
                    Operation::EnrichPerson,
                    "People match",
                    "/people/match",
                    "POST",
                    1,
                ),
                feature(
                    Operation::SearchPeople,
                    "People search",
                    "/mixed_people/search",
                    "POST",
                    1,
                ),
            ],
            config: BTreeMap::new(),
        },
        ProviderDescriptor {
            id: "surfe".to_owned(),
            display_name: "Surfe".to_owned(),
            category: ProviderCategory::CompanyIntelligence,
            base_url: "https://api.surfe.com/v2".to_owned(),
            requests_per_second: 5.0,
            burst_size: 300,
            daily_quota: None,
            max_concurrent: 2,
            features: vec![
                feature(
                    Operation::EnrichCompany,
                    "Company enrichment",
                    "/organizations/enrich",
                    "POST",
                    2,
                ),
                feature(
                    Operation::FindLookalike,
                    "Company lookalikes",
                    "/organizations/lookalikes",
                    "POST",
                    5,
                ),
                feature(
                    Operation::CheckEnrichmentStatus,
                    "Enrichment status",
                    "/organizations/enrich/{id}",
                    "GET",
                    0,
                ),
            ],
            config: BTreeMap::new(),
        },
        ProviderDescriptor {
            id: "companyenrich".to_owned(),
            display_name: "CompanyEnrich".to_owned(),
            category: ProviderCategory::CompanyData,
            base_url: "https://api.companyenrich.com".to_owned(),
            requests_per_second: 10.0,
            burst_size: 600,
            daily_quota: Some(2_000),
            max_concurrent: 1,
            features: vec![feature(
                Operation::EnrichCompany,
                "Company enrichment",
                "/companies/enrich",
                "GET",
                1,
            )],
            config: BTreeMap::new(),
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seed_descriptors_carry_supported_operations() {
        let descriptors = seed_descriptors();
        assert_eq!(descriptors.len(), 4);

        let surfe = descriptors
            .iter()
            .find(|descriptor| descriptor.id == "surfe")
            .expect("surfe seeded");
        assert!(surfe.supports(Operation::EnrichCompany));
        assert!(surfe.supports(Operation::CheckEnrichmentStatus));
        assert_eq!(surfe.credits_for(Operation::FindLookalike), 5);
        assert_eq!(surfe.credits_for(Operation::CheckEnrichmentStatus), 0);
    }

    #[test]
    fn seeded_ids_are_lowercase_and_unique() {
        let descriptors = seed_descriptors();
        let mut ids: Vec<&str> = descriptors
            .iter()
            .map(|descriptor| descriptor.id.as_str())
            .collect();
        assert!(ids.iter().all(|id| *id == id.to_ascii_lowercase()));
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), descriptors.len());
    }
}
