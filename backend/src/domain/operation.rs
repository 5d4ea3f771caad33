//! Normalized operation and provider category enumerations.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::domain::Error;

/// Logical operation a provider may expose.
///
/// The wire form uses kebab-case identifiers (`find-email`,
/// `enrich-person`, ...), matching the serialized representation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "kebab-case")]
pub enum Operation {
    /// Find a work email for a named person at a company.
    FindEmail,
    /// Enrich a person record from an email or profile URL.
    EnrichPerson,
    /// Enrich a company record from its domain.
    EnrichCompany,
    /// Search people by filter criteria.
    SearchPeople,
    /// Search companies by filter criteria.
    SearchCompanies,
    /// Find companies similar to a seed company.
    FindLookalike,
    /// Poll the terminal state of an asynchronous enrichment.
    CheckEnrichmentStatus,
}

impl Operation {
    /// All operations, in declaration order.
    pub const ALL: [Self; 7] = [
        Self::FindEmail,
        Self::EnrichPerson,
        Self::EnrichCompany,
        Self::SearchPeople,
        Self::SearchCompanies,
        Self::FindLookalike,
        Self::CheckEnrichmentStatus,
    ];

    /// Kebab-case wire identifier.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::FindEmail => "find-email",
            Self::EnrichPerson => "enrich-person",
            Self::EnrichCompany => "enrich-company",
            Self::SearchPeople => "search-people",
            Self::SearchCompanies => "search-companies",
            Self::FindLookalike => "find-lookalike",
            Self::CheckEnrichmentStatus => "check-enrichment-status",
        }
    }

    /// Parse a kebab-case wire identifier.
    ///
    /// # Errors
    ///
    /// Returns `INVALID_INPUT` when the identifier is unknown.
    pub fn parse(raw: &str) -> Result<Self, Error> {
        Self::ALL
            .into_iter()
            .find(|operation| operation.as_str() == raw)
            .ok_or_else(|| Error::invalid_input(format!("unknown operation \"{raw}\"")))
    }
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Provider catalog category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "kebab-case")]
pub enum ProviderCategory {
    /// Large multi-purpose contact databases.
    MajorDatabase,
    /// Email discovery and verification services.
    EmailFinder,
    /// Firmographic intelligence services.
    CompanyIntelligence,
    /// LLM-backed research services.
    AiResearch,
    /// Social profile enrichment services.
    SocialEnrichment,
    /// Contact verification services.
    Verification,
    /// Raw company data vendors.
    CompanyData,
}

impl ProviderCategory {
    /// Kebab-case wire identifier.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::MajorDatabase => "major-database",
            Self::EmailFinder => "email-finder",
            Self::CompanyIntelligence => "company-intelligence",
            Self::AiResearch => "ai-research",
            Self::SocialEnrichment => "social-enrichment",
            Self::Verification => "verification",
            Self::CompanyData => "company-data",
        }
    }

    /// Parse a kebab-case wire identifier.
    ///
    /// # Errors
    ///
    /// Returns `INVALID_INPUT` when the identifier is unknown.
    pub fn parse(raw: &str) -> Result<Self, Error> {
        [
            Self::MajorDatabase,
            Self::EmailFinder,
            Self::CompanyIntelligence,
            Self::AiResearch,
            Self::SocialEnrichment,
            Self::Verification,
            Self::CompanyData,
        ]
        .into_iter()
        .find(|category| category.as_str() == raw)
        .ok_or_else(|| Error::invalid_input(format!("unknown provider category \"{raw}\"")))
    }
}

impl std::fmt::Display for ProviderCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(Operation::FindEmail, "find-email")]
    #[case(Operation::EnrichCompany, "enrich-company")]
    #[case(Operation::CheckEnrichmentStatus, "check-enrichment-status")]
    fn operation_identifiers_round_trip(#[case] operation: Operation, #[case] wire: &str) {
        assert_eq!(operation.as_str(), wire);
        assert_eq!(Operation::parse(wire).expect("parses"), operation);
    }

    #[test]
    fn operation_serde_matches_wire_form() {
        let json = serde_json::to_value(Operation::SearchPeople).expect("serializes");
        assert_eq!(json, serde_json::json!("search-people"));
    }

    #[test]
    fn unknown_operation_is_invalid_input() {
        let err = Operation::parse("transmogrify").expect_err("must fail");
        assert_eq!(err.code(), crate::domain::ErrorCode::InvalidInput);
    }

    #[test]
    fn category_identifiers_round_trip() {
        for category in [
            ProviderCategory::MajorDatabase,
            ProviderCategory::EmailFinder,
            ProviderCategory::CompanyIntelligence,
            ProviderCategory::AiResearch,
            ProviderCategory::SocialEnrichment,
            ProviderCategory::Verification,
            ProviderCategory::CompanyData,
        ] {
            assert_eq!(
                ProviderCategory::parse(category.as_str()).expect("parses"),
                category
            );
        }
    }
}
