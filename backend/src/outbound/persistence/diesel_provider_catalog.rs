//! PostgreSQL-backed adapter for the provider catalog tables.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel_async::scoped_futures::ScopedFutureExt as _;
use diesel_async::{AsyncConnection, RunQueryDsl};
use serde_json::Value;
use tracing::warn;
use uuid::Uuid;

use crate::domain::ports::{ProviderCatalogError, ProviderCatalogRepository};
use crate::domain::{Operation, ProviderCategory, ProviderDescriptor, ProviderFeature};

use super::diesel_helpers::{map_diesel_error_message, map_pool_error_message};
use super::pool::{DbPool, PoolError};
use super::schema::{provider_features, providers};

/// Diesel-backed implementation of [`ProviderCatalogRepository`].
#[derive(Clone)]
pub struct DieselProviderCatalogRepository {
    pool: DbPool,
}

impl DieselProviderCatalogRepository {
    /// Create a repository backed by `pool`.
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = providers)]
struct ProviderRow {
    id: Uuid,
    name: String,
    display_name: String,
    category: String,
    base_url: String,
    rate_limit_rps: f64,
    burst_size: i32,
    daily_quota: Option<i32>,
    max_concurrent: i32,
    configuration: Value,
}

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = provider_features)]
struct FeatureRow {
    provider_id: Uuid,
    feature_id: String,
    feature_name: String,
    endpoint: String,
    http_method: String,
    credits_per_request: i32,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = providers)]
struct NewProviderRow<'a> {
    name: &'a str,
    display_name: &'a str,
    category: &'a str,
    base_url: &'a str,
    rate_limit_rps: f64,
    burst_size: i32,
    daily_quota: Option<i32>,
    max_concurrent: i32,
    is_active: bool,
    configuration: Value,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = provider_features)]
struct NewFeatureRow<'a> {
    provider_id: Uuid,
    feature_id: &'a str,
    feature_name: &'a str,
    category: &'a str,
    endpoint: &'a str,
    http_method: &'a str,
    credits_per_request: i32,
    parameters: Value,
    is_active: bool,
}

fn map_pool_error(error: PoolError) -> ProviderCatalogError {
    ProviderCatalogError::connection(map_pool_error_message(error))
}

fn map_diesel_error(error: &diesel::result::Error) -> ProviderCatalogError {
    ProviderCatalogError::query(map_diesel_error_message(error, "provider catalog operation"))
}

fn row_to_descriptor(row: ProviderRow, features: Vec<FeatureRow>) -> Option<ProviderDescriptor> {
    let category = match ProviderCategory::parse(&row.category) {
        Ok(category) => category,
        Err(_) => {
            warn!(provider = %row.name, category = %row.category, "skipping provider with unknown category");
            return None;
        }
    };
    let config: BTreeMap<String, Value> = serde_json::from_value(row.configuration)
        .unwrap_or_default();

    let features = features
        .into_iter()
        .filter_map(|feature| {
            let Ok(operation) = Operation::parse(&feature.feature_id) else {
                warn!(
                    provider = %row.name,
                    feature = %feature.feature_id,
                    "skipping feature with unknown operation"
                );
                return None;
            };
            Some(ProviderFeature {
                operation,
                name: feature.feature_name,
                endpoint: feature.endpoint,
                http_method: feature.http_method,
                credits_per_request: u32::try_from(feature.credits_per_request).unwrap_or(1),
            })
        })
        .collect();

    Some(ProviderDescriptor {
        id: row.name,
        display_name: row.display_name,
        category,
        base_url: row.base_url,
        requests_per_second: row.rate_limit_rps,
        burst_size: u32::try_from(row.burst_size).unwrap_or(1),
        daily_quota: row.daily_quota.and_then(|quota| u32::try_from(quota).ok()),
        max_concurrent: u32::try_from(row.max_concurrent).unwrap_or(1),
        features,
        config,
    })
}

#[async_trait]
impl ProviderCatalogRepository for DieselProviderCatalogRepository {
    async fn load_all(&self) -> Result<Vec<ProviderDescriptor>, ProviderCatalogError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;

        let provider_rows: Vec<ProviderRow> = providers::table
            .filter(providers::is_active.eq(true))
            .order(providers::name.asc())
            .select(ProviderRow::as_select())
            .load(&mut conn)
            .await
            .map_err(|error| map_diesel_error(&error))?;

        let feature_rows: Vec<FeatureRow> = provider_features::table
            .filter(provider_features::is_active.eq(true))
            .order(provider_features::feature_id.asc())
            .select(FeatureRow::as_select())
            .load(&mut conn)
            .await
            .map_err(|error| map_diesel_error(&error))?;

        let mut features_by_provider: std::collections::HashMap<Uuid, Vec<FeatureRow>> =
            std::collections::HashMap::new();
        for feature in feature_rows {
            features_by_provider
                .entry(feature.provider_id)
                .or_default()
                .push(feature);
        }

        Ok(provider_rows
            .into_iter()
            .filter_map(|row| {
                let features = features_by_provider.remove(&row.id).unwrap_or_default();
                row_to_descriptor(row, features)
            })
            .collect())
    }

    async fn seed_if_empty(
        &self,
        descriptors: &[ProviderDescriptor],
    ) -> Result<usize, ProviderCatalogError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;

        let seeded = conn
            .transaction::<usize, diesel::result::Error, _>(|conn| {
                async move {
                    let existing: i64 = providers::table.count().get_result(conn).await?;
                    if existing > 0 {
                        return Ok(0);
                    }

                    for descriptor in descriptors {
                        let configuration =
                            serde_json::to_value(&descriptor.config).unwrap_or(Value::Null);
                        let inserted: Uuid = diesel::insert_into(providers::table)
                            .values(&NewProviderRow {
                                name: &descriptor.id,
                                display_name: &descriptor.display_name,
                                category: descriptor.category.as_str(),
                                base_url: &descriptor.base_url,
                                rate_limit_rps: descriptor.requests_per_second,
                                burst_size: i32::try_from(descriptor.burst_size)
                                    .unwrap_or(i32::MAX),
                                daily_quota: descriptor
                                    .daily_quota
                                    .and_then(|quota| i32::try_from(quota).ok()),
                                max_concurrent: i32::try_from(descriptor.max_concurrent)
                                    .unwrap_or(1),
                                is_active: true,
                                configuration,
                            })
                            .returning(providers::id)
                            .get_result(conn)
                            .await?;

                        for feature in &descriptor.features {
                            diesel::insert_into(provider_features::table)
                                .values(&NewFeatureRow {
                                    provider_id: inserted,
                                    feature_id: feature.operation.as_str(),
                                    feature_name: &feature.name,
                                    category: descriptor.category.as_str(),
                                    endpoint: &feature.endpoint,
                                    http_method: &feature.http_method,
                                    credits_per_request: i32::try_from(
                                        feature.credits_per_request,
                                    )
                                    .unwrap_or(1),
                                    parameters: Value::Null,
                                    is_active: true,
                                })
                                .execute(conn)
                                .await?;
                        }
                    }
                    Ok(descriptors.len())
                }
                .scope_boxed()
            })
            .await
            .map_err(|error: diesel::result::Error| map_diesel_error(&error))?;

        Ok(seeded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn rows_with_unknown_categories_or_operations_are_skipped() {
        let row = ProviderRow {
            id: Uuid::new_v4(),
            name: "hunter".to_owned(),
            display_name: "Hunter".to_owned(),
            category: "email-finder".to_owned(),
            base_url: "https://api.hunter.io/v2".to_owned(),
            rate_limit_rps: 10.0,
            burst_size: 60,
            daily_quota: Some(5_000),
            max_concurrent: 2,
            configuration: json!({ "cache_per_tenant": false }),
        };
        let features = vec![
            FeatureRow {
                provider_id: row.id,
                feature_id: "find-email".to_owned(),
                feature_name: "Email finder".to_owned(),
                endpoint: "/email-finder".to_owned(),
                http_method: "GET".to_owned(),
                credits_per_request: 1,
            },
            FeatureRow {
                provider_id: row.id,
                feature_id: "launch-rockets".to_owned(),
                feature_name: "Not a real feature".to_owned(),
                endpoint: "/rockets".to_owned(),
                http_method: "POST".to_owned(),
                credits_per_request: 99,
            },
        ];

        let descriptor = row_to_descriptor(row, features).expect("valid provider");
        assert_eq!(descriptor.features.len(), 1, "unknown operation dropped");
        assert_eq!(descriptor.features[0].operation, Operation::FindEmail);

        let bogus = ProviderRow {
            id: Uuid::new_v4(),
            name: "mystery".to_owned(),
            display_name: "Mystery".to_owned(),
            category: "fortune-telling".to_owned(),
            base_url: "https://example.invalid".to_owned(),
            rate_limit_rps: 1.0,
            burst_size: 1,
            daily_quota: None,
            max_concurrent: 1,
            configuration: Value::Null,
        };
        assert!(row_to_descriptor(bogus, Vec::new()).is_none());
    }
}
