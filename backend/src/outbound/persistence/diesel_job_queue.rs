//! PostgreSQL-backed durable FIFO queue adapter.
//!
//! Claims use `FOR UPDATE SKIP LOCKED` so parallel workers never receive
//! the same entry; everything else is plain Diesel DSL. Delivery stays
//! at-least-once: entries claimed by a crashed worker return to `queued`
//! through the stale sweep.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel::sql_types::{BigInt, Double, Text};
use diesel_async::RunQueryDsl;
use uuid::Uuid;

use crate::domain::ports::{
    JobQueue, JobQueueError, QueueEntry, QueueEntryState, QueueMessage, RetentionPolicy,
};

use super::diesel_helpers::{map_diesel_error_message, map_pool_error_message};
use super::pool::{DbPool, PoolError};
use super::schema::job_queue;

/// Diesel-backed implementation of [`JobQueue`].
#[derive(Clone)]
pub struct DieselJobQueue {
    pool: DbPool,
}

impl DieselJobQueue {
    /// Create a queue backed by `pool`.
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, Clone, Queryable, Selectable, QueryableByName)]
#[diesel(table_name = job_queue)]
struct QueueRow {
    id: Uuid,
    job_id: Uuid,
    priority: i32,
    state: String,
    attempts: i32,
    fail_reason: Option<String>,
    enqueued_at: DateTime<Utc>,
    started_at: Option<DateTime<Utc>>,
    finished_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = job_queue)]
struct NewQueueRow {
    job_id: Uuid,
    priority: i32,
    state: &'static str,
    attempts: i32,
}

fn map_pool_error(error: PoolError) -> JobQueueError {
    JobQueueError::connection(map_pool_error_message(error))
}

fn map_diesel_error(error: &diesel::result::Error) -> JobQueueError {
    JobQueueError::query(map_diesel_error_message(error, "job queue operation"))
}

fn state_from_str(raw: &str) -> QueueEntryState {
    match raw {
        "running" => QueueEntryState::Running,
        "completed" => QueueEntryState::Completed,
        "failed" => QueueEntryState::Failed,
        _ => QueueEntryState::Queued,
    }
}

impl From<QueueRow> for QueueEntry {
    fn from(row: QueueRow) -> Self {
        Self {
            id: row.id,
            job_id: row.job_id,
            priority: row.priority,
            state: state_from_str(&row.state),
            attempts: u32::try_from(row.attempts).unwrap_or(0),
            enqueued_at: row.enqueued_at,
            started_at: row.started_at,
            finished_at: row.finished_at,
        }
    }
}

impl DieselJobQueue {
    async fn finish(
        &self,
        entry_id: Uuid,
        state: &'static str,
        fail_reason: Option<String>,
    ) -> Result<(), JobQueueError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let updated = diesel::update(job_queue::table.find(entry_id))
            .set((
                job_queue::state.eq(state),
                job_queue::fail_reason.eq(fail_reason),
                job_queue::finished_at.eq(Some(Utc::now())),
            ))
            .execute(&mut conn)
            .await
            .map_err(|error| map_diesel_error(&error))?;
        if updated == 0 {
            return Err(JobQueueError::MissingEntry { id: entry_id });
        }
        Ok(())
    }
}

#[async_trait]
impl JobQueue for DieselJobQueue {
    async fn enqueue(&self, job_id: Uuid, priority: i32) -> Result<(), JobQueueError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        diesel::insert_into(job_queue::table)
            .values(&NewQueueRow {
                job_id,
                priority,
                state: "queued",
                attempts: 0,
            })
            .execute(&mut conn)
            .await
            .map(|_| ())
            .map_err(|error| map_diesel_error(&error))
    }

    async fn claim_next(&self) -> Result<Option<QueueMessage>, JobQueueError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        // Claim exclusivity across workers comes from SKIP LOCKED: two
        // concurrent claims select disjoint candidate rows.
        let claimed: Vec<QueueRow> = diesel::sql_query(
            "UPDATE job_queue SET state = 'running', attempts = attempts + 1, started_at = NOW() \
             WHERE id = ( \
                 SELECT id FROM job_queue WHERE state = 'queued' \
                 ORDER BY priority DESC, enqueued_at ASC \
                 LIMIT 1 \
                 FOR UPDATE SKIP LOCKED \
             ) \
             RETURNING *",
        )
        .load(&mut conn)
        .await
        .map_err(|error| map_diesel_error(&error))?;

        Ok(claimed.into_iter().next().map(|row| QueueMessage {
            id: row.id,
            job_id: row.job_id,
            attempts: u32::try_from(row.attempts).unwrap_or(0),
        }))
    }

    async fn complete(&self, entry_id: Uuid) -> Result<(), JobQueueError> {
        self.finish(entry_id, "completed", None).await
    }

    async fn fail(&self, entry_id: Uuid, reason: String) -> Result<(), JobQueueError> {
        self.finish(entry_id, "failed", Some(reason)).await
    }

    async fn find(&self, job_id: Uuid) -> Result<Option<QueueEntry>, JobQueueError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let row: Option<QueueRow> = job_queue::table
            .filter(job_queue::job_id.eq(job_id))
            .order(job_queue::enqueued_at.desc())
            .select(QueueRow::as_select())
            .first(&mut conn)
            .await
            .optional()
            .map_err(|error| map_diesel_error(&error))?;
        Ok(row.map(QueueEntry::from))
    }

    async fn requeue_stale(&self, claim_timeout: Duration) -> Result<u64, JobQueueError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let requeued = diesel::sql_query(
            "UPDATE job_queue SET state = 'queued', started_at = NULL \
             WHERE state = 'running' AND started_at < NOW() - make_interval(secs => $1)",
        )
        .bind::<Double, _>(claim_timeout.as_secs_f64())
        .execute(&mut conn)
        .await
        .map_err(|error| map_diesel_error(&error))?;
        Ok(requeued as u64)
    }

    async fn sweep_retention(&self, policy: RetentionPolicy) -> Result<u64, JobQueueError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let mut removed: u64 = 0;

        for (state, max_age, max_entries) in [
            (
                "completed",
                policy.completed_max_age,
                policy.completed_max_entries,
            ),
            ("failed", policy.failed_max_age, policy.failed_max_entries),
        ] {
            let aged = diesel::sql_query(
                "DELETE FROM job_queue \
                 WHERE state = $1 AND finished_at < NOW() - make_interval(secs => $2)",
            )
            .bind::<Text, _>(state)
            .bind::<Double, _>(max_age.as_secs_f64())
            .execute(&mut conn)
            .await
            .map_err(|error| map_diesel_error(&error))?;

            let capped = diesel::sql_query(
                "DELETE FROM job_queue \
                 WHERE state = $1 AND id NOT IN ( \
                     SELECT id FROM job_queue WHERE state = $1 \
                     ORDER BY finished_at DESC NULLS LAST \
                     LIMIT $2 \
                 )",
            )
            .bind::<Text, _>(state)
            .bind::<BigInt, _>(i64::try_from(max_entries).unwrap_or(i64::MAX))
            .execute(&mut conn)
            .await
            .map_err(|error| map_diesel_error(&error))?;

            removed += (aged + capped) as u64;
        }
        Ok(removed)
    }
}
