//! PostgreSQL-backed adapter for durable job rows and logs.
//!
//! Counter updates are single atomic statements keyed by primary key with a
//! monotonic guard; read-modify-write on counters never happens here.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel_async::RunQueryDsl;
use serde_json::Value;
use uuid::Uuid;

use crate::domain::ports::{
    JobRepository, JobRepositoryError, NewJob, ProcessingStart,
};
use crate::domain::{
    JobLogEntry, JobLogLevel, JobProgress, JobRecord, JobStatus, Operation, RequestOptions,
};

use super::diesel_helpers::{map_diesel_error_message, map_pool_error_message};
use super::pool::{DbPool, PoolError};
use super::schema::{enrichment_jobs, job_logs};

/// Diesel-backed implementation of [`JobRepository`].
#[derive(Clone)]
pub struct DieselJobRepository {
    pool: DbPool,
}

impl DieselJobRepository {
    /// Create a repository backed by `pool`.
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = enrichment_jobs)]
struct JobRow {
    id: Uuid,
    tenant_id: Uuid,
    provider_id: String,
    job_type: String,
    status: String,
    total_records: i32,
    processed_records: i32,
    successful_records: i32,
    failed_records: i32,
    input_data: Value,
    output_data: Option<Value>,
    configuration: Option<Value>,
    error_details: Option<String>,
    created_at: DateTime<Utc>,
    started_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = enrichment_jobs)]
struct NewJobRow<'a> {
    id: Uuid,
    tenant_id: Uuid,
    provider_id: &'a str,
    job_type: &'a str,
    status: &'a str,
    total_records: i32,
    processed_records: i32,
    successful_records: i32,
    failed_records: i32,
    input_data: Value,
    configuration: Option<Value>,
}

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = job_logs)]
struct JobLogRow {
    job_id: Uuid,
    level: String,
    message: String,
    ts: DateTime<Utc>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = job_logs)]
struct NewJobLogRow<'a> {
    job_id: Uuid,
    level: &'a str,
    message: &'a str,
}

fn map_pool_error(error: PoolError) -> JobRepositoryError {
    JobRepositoryError::connection(map_pool_error_message(error))
}

fn map_diesel_error(error: &diesel::result::Error) -> JobRepositoryError {
    JobRepositoryError::query(map_diesel_error_message(error, "job store operation"))
}

fn status_to_str(status: JobStatus) -> &'static str {
    status.as_str()
}

fn status_from_str(raw: &str) -> Result<JobStatus, JobRepositoryError> {
    match raw {
        "queued" => Ok(JobStatus::Queued),
        "processing" => Ok(JobStatus::Processing),
        "completed" => Ok(JobStatus::Completed),
        "failed" => Ok(JobStatus::Failed),
        other => Err(JobRepositoryError::query(format!(
            "unknown job status \"{other}\""
        ))),
    }
}

fn level_from_str(raw: &str) -> JobLogLevel {
    match raw {
        "warn" => JobLogLevel::Warn,
        "error" => JobLogLevel::Error,
        _ => JobLogLevel::Info,
    }
}

fn counter_to_db(counter: u32) -> i32 {
    i32::try_from(counter).unwrap_or(i32::MAX)
}

fn counter_from_db(counter: i32) -> u32 {
    u32::try_from(counter).unwrap_or(0)
}

impl TryFrom<JobRow> for JobRecord {
    type Error = JobRepositoryError;

    fn try_from(row: JobRow) -> Result<Self, Self::Error> {
        let operation = Operation::parse(&row.job_type)
            .map_err(|_| JobRepositoryError::query(format!("unknown job type \"{}\"", row.job_type)))?;
        let status = status_from_str(&row.status)?;
        let input_snapshot = match row.input_data {
            Value::Array(items) => items,
            other => vec![other],
        };
        let options = row
            .configuration
            .and_then(|value| serde_json::from_value::<RequestOptions>(value).ok())
            .unwrap_or_default();

        Ok(Self {
            id: row.id,
            tenant_id: row.tenant_id,
            provider_id: row.provider_id,
            operation,
            status,
            progress: JobProgress {
                total: counter_from_db(row.total_records),
                processed: counter_from_db(row.processed_records),
                successful: counter_from_db(row.successful_records),
                failed: counter_from_db(row.failed_records),
            },
            input_snapshot,
            options,
            output: row.output_data,
            error_details: row.error_details,
            created_at: row.created_at,
            started_at: row.started_at,
            completed_at: row.completed_at,
        })
    }
}

impl DieselJobRepository {
    async fn fetch_row(&self, job_id: Uuid) -> Result<Option<JobRow>, JobRepositoryError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        enrichment_jobs::table
            .find(job_id)
            .select(JobRow::as_select())
            .first(&mut conn)
            .await
            .optional()
            .map_err(|error| map_diesel_error(&error))
    }

    /// Disambiguate a zero-row terminal transition: terminal row or missing
    /// row.
    async fn terminal_or_missing(&self, job_id: Uuid) -> JobRepositoryError {
        match self.fetch_row(job_id).await {
            Ok(Some(_)) => JobRepositoryError::TerminalState { id: job_id },
            Ok(None) => JobRepositoryError::MissingJob { id: job_id },
            Err(error) => error,
        }
    }
}

#[async_trait]
impl JobRepository for DieselJobRepository {
    async fn create(&self, job: NewJob) -> Result<JobRecord, JobRepositoryError> {
        let total = i32::try_from(job.input_snapshot.len())
            .map_err(|_| JobRepositoryError::query("input snapshot exceeds i32 range"))?;
        let configuration = serde_json::to_value(&job.options)
            .map_err(|error| JobRepositoryError::query(error.to_string()))?;
        let row = NewJobRow {
            id: job.id,
            tenant_id: job.tenant_id,
            provider_id: &job.provider_id,
            job_type: job.operation.as_str(),
            status: status_to_str(JobStatus::Queued),
            total_records: total,
            processed_records: 0,
            successful_records: 0,
            failed_records: 0,
            input_data: Value::Array(job.input_snapshot.clone()),
            configuration: Some(configuration),
        };

        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let inserted: JobRow = diesel::insert_into(enrichment_jobs::table)
            .values(&row)
            .returning(JobRow::as_returning())
            .get_result(&mut conn)
            .await
            .map_err(|error| map_diesel_error(&error))?;
        inserted.try_into()
    }

    async fn mark_processing(&self, job_id: Uuid) -> Result<ProcessingStart, JobRepositoryError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;

        let claimed = diesel::update(
            enrichment_jobs::table
                .find(job_id)
                .filter(enrichment_jobs::status.eq_any(["queued", "processing"])),
        )
        .set(enrichment_jobs::status.eq(status_to_str(JobStatus::Processing)))
        .execute(&mut conn)
        .await
        .map_err(|error| map_diesel_error(&error))?;

        if claimed == 0 {
            return match self.fetch_row(job_id).await? {
                Some(row) => Ok(ProcessingStart::AlreadyTerminal {
                    status: status_from_str(&row.status)?,
                }),
                None => Err(JobRepositoryError::MissingJob { id: job_id }),
            };
        }

        // Stamp started_at on first claim only.
        diesel::update(
            enrichment_jobs::table
                .find(job_id)
                .filter(enrichment_jobs::started_at.is_null()),
        )
        .set(enrichment_jobs::started_at.eq(Utc::now()))
        .execute(&mut conn)
        .await
        .map_err(|error| map_diesel_error(&error))?;

        let row = self
            .fetch_row(job_id)
            .await?
            .ok_or(JobRepositoryError::MissingJob { id: job_id })?;
        Ok(ProcessingStart::Started {
            job: row.try_into()?,
        })
    }

    async fn update_progress(
        &self,
        job_id: Uuid,
        progress: JobProgress,
    ) -> Result<(), JobRepositoryError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        // Monotonic guard: stale flushes (smaller processed count) are
        // silently ignored, matching at-least-once redelivery semantics.
        diesel::update(
            enrichment_jobs::table
                .find(job_id)
                .filter(enrichment_jobs::status.eq(status_to_str(JobStatus::Processing)))
                .filter(enrichment_jobs::processed_records.le(counter_to_db(progress.processed))),
        )
        .set((
            enrichment_jobs::processed_records.eq(counter_to_db(progress.processed)),
            enrichment_jobs::successful_records.eq(counter_to_db(progress.successful)),
            enrichment_jobs::failed_records.eq(counter_to_db(progress.failed)),
        ))
        .execute(&mut conn)
        .await
        .map(|_| ())
        .map_err(|error| map_diesel_error(&error))
    }

    async fn complete(
        &self,
        job_id: Uuid,
        output: Value,
        progress: JobProgress,
    ) -> Result<(), JobRepositoryError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let updated = diesel::update(
            enrichment_jobs::table
                .find(job_id)
                .filter(enrichment_jobs::status.eq_any(["queued", "processing"])),
        )
        .set((
            enrichment_jobs::status.eq(status_to_str(JobStatus::Completed)),
            enrichment_jobs::processed_records.eq(counter_to_db(progress.processed)),
            enrichment_jobs::successful_records.eq(counter_to_db(progress.successful)),
            enrichment_jobs::failed_records.eq(counter_to_db(progress.failed)),
            enrichment_jobs::output_data.eq(Some(output)),
            enrichment_jobs::completed_at.eq(Some(Utc::now())),
        ))
        .execute(&mut conn)
        .await
        .map_err(|error| map_diesel_error(&error))?;

        if updated == 0 {
            return Err(self.terminal_or_missing(job_id).await);
        }
        Ok(())
    }

    async fn fail(
        &self,
        job_id: Uuid,
        error_details: String,
        progress: JobProgress,
    ) -> Result<(), JobRepositoryError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let updated = diesel::update(
            enrichment_jobs::table
                .find(job_id)
                .filter(enrichment_jobs::status.eq_any(["queued", "processing"])),
        )
        .set((
            enrichment_jobs::status.eq(status_to_str(JobStatus::Failed)),
            enrichment_jobs::processed_records.eq(counter_to_db(progress.processed)),
            enrichment_jobs::successful_records.eq(counter_to_db(progress.successful)),
            enrichment_jobs::failed_records.eq(counter_to_db(progress.failed)),
            enrichment_jobs::error_details.eq(Some(error_details)),
            enrichment_jobs::completed_at.eq(Some(Utc::now())),
        ))
        .execute(&mut conn)
        .await
        .map_err(|error| map_diesel_error(&error))?;

        if updated == 0 {
            return Err(self.terminal_or_missing(job_id).await);
        }
        Ok(())
    }

    async fn get(
        &self,
        tenant_id: Uuid,
        job_id: Uuid,
    ) -> Result<Option<JobRecord>, JobRepositoryError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let row: Option<JobRow> = enrichment_jobs::table
            .find(job_id)
            .filter(enrichment_jobs::tenant_id.eq(tenant_id))
            .select(JobRow::as_select())
            .first(&mut conn)
            .await
            .optional()
            .map_err(|error| map_diesel_error(&error))?;
        row.map(JobRecord::try_from).transpose()
    }

    async fn list(&self, tenant_id: Uuid) -> Result<Vec<JobRecord>, JobRepositoryError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let rows: Vec<JobRow> = enrichment_jobs::table
            .filter(enrichment_jobs::tenant_id.eq(tenant_id))
            .order((
                enrichment_jobs::created_at.desc(),
                enrichment_jobs::id.desc(),
            ))
            .select(JobRow::as_select())
            .load(&mut conn)
            .await
            .map_err(|error| map_diesel_error(&error))?;
        rows.into_iter().map(JobRecord::try_from).collect()
    }

    async fn append_log(
        &self,
        job_id: Uuid,
        level: JobLogLevel,
        message: String,
    ) -> Result<(), JobRepositoryError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        diesel::insert_into(job_logs::table)
            .values(&NewJobLogRow {
                job_id,
                level: level.as_str(),
                message: &message,
            })
            .execute(&mut conn)
            .await
            .map(|_| ())
            .map_err(|error| map_diesel_error(&error))
    }

    async fn logs(&self, job_id: Uuid) -> Result<Vec<JobLogEntry>, JobRepositoryError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let rows: Vec<JobLogRow> = job_logs::table
            .filter(job_logs::job_id.eq(job_id))
            .order(job_logs::ts.asc())
            .select(JobLogRow::as_select())
            .load(&mut conn)
            .await
            .map_err(|error| map_diesel_error(&error))?;
        Ok(rows
            .into_iter()
            .map(|row| JobLogEntry {
                job_id: row.job_id,
                level: level_from_str(&row.level),
                message: row.message,
                ts: row.ts,
            })
            .collect())
    }
}
