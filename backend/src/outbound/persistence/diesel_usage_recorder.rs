//! PostgreSQL-backed adapter for per-call usage analytics rows.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel_async::RunQueryDsl;
use uuid::Uuid;

use crate::domain::ports::{UsageRecorder, UsageRecorderError, UsageSample};

use super::diesel_helpers::{map_diesel_error_message, map_pool_error_message};
use super::pool::{DbPool, PoolError};
use super::schema::api_usage;

/// Diesel-backed implementation of [`UsageRecorder`].
#[derive(Clone)]
pub struct DieselUsageRecorder {
    pool: DbPool,
}

impl DieselUsageRecorder {
    /// Create a recorder backed by `pool`.
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, Insertable)]
#[diesel(table_name = api_usage)]
struct NewUsageRow<'a> {
    tenant_id: Uuid,
    provider_id: &'a str,
    endpoint: &'a str,
    status_code: Option<&'a str>,
    response_time_ms: i64,
    credits_used: i32,
    ts: DateTime<Utc>,
}

fn map_pool_error(error: PoolError) -> UsageRecorderError {
    UsageRecorderError::connection(map_pool_error_message(error))
}

#[async_trait]
impl UsageRecorder for DieselUsageRecorder {
    async fn record(&self, sample: UsageSample) -> Result<(), UsageRecorderError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        diesel::insert_into(api_usage::table)
            .values(&NewUsageRow {
                tenant_id: sample.tenant_id,
                provider_id: &sample.provider_id,
                endpoint: sample.operation.as_str(),
                status_code: sample.error_code.map(|code| code.as_str()),
                response_time_ms: i64::try_from(sample.response_time_ms).unwrap_or(i64::MAX),
                credits_used: i32::try_from(sample.credits_used).unwrap_or(i32::MAX),
                ts: sample.ts,
            })
            .execute(&mut conn)
            .await
            .map(|_| ())
            .map_err(|error| {
                UsageRecorderError::query(map_diesel_error_message(&error, "usage append"))
            })
    }
}
