//! PostgreSQL-backed adapter for per-tenant credential rows.
//!
//! The activate path swaps the pair's active flag inside one transaction so
//! at most one row per `(tenant, provider)` is active at any time.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel_async::scoped_futures::ScopedFutureExt as _;
use diesel_async::{AsyncConnection, RunQueryDsl};
use uuid::Uuid;

use crate::domain::ports::{
    CredentialPatch, CredentialRecord, CredentialRepository, CredentialRepositoryError,
    NewCredential,
};

use super::diesel_helpers::{map_diesel_error_message, map_pool_error_message};
use super::pool::{DbPool, PoolError};
use super::schema::api_keys;

/// Diesel-backed implementation of [`CredentialRepository`].
#[derive(Clone)]
pub struct DieselCredentialRepository {
    pool: DbPool,
}

impl DieselCredentialRepository {
    /// Create a repository backed by `pool`.
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = api_keys)]
struct CredentialRow {
    id: Uuid,
    tenant_id: Uuid,
    provider_id: String,
    label: String,
    key_material: String,
    is_active: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = api_keys)]
struct NewCredentialRow<'a> {
    tenant_id: Uuid,
    provider_id: &'a str,
    label: &'a str,
    key_material: &'a str,
    is_active: bool,
}

fn map_pool_error(error: PoolError) -> CredentialRepositoryError {
    CredentialRepositoryError::connection(map_pool_error_message(error))
}

fn map_diesel_error(error: &diesel::result::Error) -> CredentialRepositoryError {
    CredentialRepositoryError::query(map_diesel_error_message(error, "credential store operation"))
}

impl From<CredentialRow> for CredentialRecord {
    fn from(row: CredentialRow) -> Self {
        Self {
            id: row.id,
            tenant_id: row.tenant_id,
            provider_id: row.provider_id,
            label: row.label,
            encrypted_material: row.key_material,
            is_active: row.is_active,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[async_trait]
impl CredentialRepository for DieselCredentialRepository {
    async fn get_active(
        &self,
        tenant_id: Uuid,
        provider_id: &str,
    ) -> Result<Option<CredentialRecord>, CredentialRepositoryError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let row: Option<CredentialRow> = api_keys::table
            .filter(api_keys::tenant_id.eq(tenant_id))
            .filter(api_keys::provider_id.eq(provider_id))
            .filter(api_keys::is_active.eq(true))
            .select(CredentialRow::as_select())
            .first(&mut conn)
            .await
            .optional()
            .map_err(|error| map_diesel_error(&error))?;
        Ok(row.map(CredentialRecord::from))
    }

    async fn list(
        &self,
        tenant_id: Uuid,
        provider_id: &str,
    ) -> Result<Vec<CredentialRecord>, CredentialRepositoryError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let rows: Vec<CredentialRow> = api_keys::table
            .filter(api_keys::tenant_id.eq(tenant_id))
            .filter(api_keys::provider_id.eq(provider_id))
            .order(api_keys::created_at.desc())
            .select(CredentialRow::as_select())
            .load(&mut conn)
            .await
            .map_err(|error| map_diesel_error(&error))?;
        Ok(rows.into_iter().map(CredentialRecord::from).collect())
    }

    async fn insert(
        &self,
        credential: NewCredential,
    ) -> Result<CredentialRecord, CredentialRepositoryError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let inserted: CredentialRow = diesel::insert_into(api_keys::table)
            .values(&NewCredentialRow {
                tenant_id: credential.tenant_id,
                provider_id: &credential.provider_id,
                label: &credential.label,
                key_material: &credential.encrypted_material,
                is_active: false,
            })
            .returning(CredentialRow::as_returning())
            .get_result(&mut conn)
            .await
            .map_err(|error| map_diesel_error(&error))?;
        Ok(inserted.into())
    }

    async fn activate(
        &self,
        tenant_id: Uuid,
        credential_id: Uuid,
    ) -> Result<CredentialRecord, CredentialRepositoryError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;

        let activated: Option<CredentialRow> = conn
            .transaction::<Option<CredentialRow>, diesel::result::Error, _>(|conn| {
                async move {
                    let target: Option<CredentialRow> = api_keys::table
                        .find(credential_id)
                        .filter(api_keys::tenant_id.eq(tenant_id))
                        .select(CredentialRow::as_select())
                        .first(conn)
                        .await
                        .optional()?;
                    let Some(target) = target else {
                        return Ok(None);
                    };

                    diesel::update(
                        api_keys::table
                            .filter(api_keys::tenant_id.eq(tenant_id))
                            .filter(api_keys::provider_id.eq(&target.provider_id)),
                    )
                    .set((
                        api_keys::is_active.eq(false),
                        api_keys::updated_at.eq(Utc::now()),
                    ))
                    .execute(conn)
                    .await?;

                    let activated: CredentialRow = diesel::update(api_keys::table.find(credential_id))
                        .set((
                            api_keys::is_active.eq(true),
                            api_keys::updated_at.eq(Utc::now()),
                        ))
                        .returning(CredentialRow::as_returning())
                        .get_result(conn)
                        .await?;
                    Ok(Some(activated))
                }
                .scope_boxed()
            })
            .await
            .map_err(|error: diesel::result::Error| map_diesel_error(&error))?;

        activated
            .map(CredentialRecord::from)
            .ok_or(CredentialRepositoryError::MissingCredential { id: credential_id })
    }

    async fn update(
        &self,
        tenant_id: Uuid,
        credential_id: Uuid,
        patch: CredentialPatch,
    ) -> Result<CredentialRecord, CredentialRepositoryError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;

        // Build the changeset from the patch; untouched fields keep their
        // current value.
        let updated: Option<CredentialRow> = diesel::update(
            api_keys::table
                .find(credential_id)
                .filter(api_keys::tenant_id.eq(tenant_id)),
        )
        .set((
            patch
                .label
                .map(|label| api_keys::label.eq(label)),
            patch
                .encrypted_material
                .map(|material| api_keys::key_material.eq(material)),
            api_keys::updated_at.eq(Utc::now()),
        ))
        .returning(CredentialRow::as_returning())
        .get_result(&mut conn)
        .await
        .optional()
        .map_err(|error| map_diesel_error(&error))?;

        updated
            .map(CredentialRecord::from)
            .ok_or(CredentialRepositoryError::MissingCredential { id: credential_id })
    }

    async fn delete(
        &self,
        tenant_id: Uuid,
        credential_id: Uuid,
    ) -> Result<CredentialRecord, CredentialRepositoryError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let deleted: Option<CredentialRow> = diesel::delete(
            api_keys::table
                .find(credential_id)
                .filter(api_keys::tenant_id.eq(tenant_id)),
        )
        .returning(CredentialRow::as_returning())
        .get_result(&mut conn)
        .await
        .optional()
        .map_err(|error| map_diesel_error(&error))?;

        deleted
            .map(CredentialRecord::from)
            .ok_or(CredentialRepositoryError::MissingCredential { id: credential_id })
    }

    async fn deactivate(&self, credential_id: Uuid) -> Result<(), CredentialRepositoryError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        diesel::update(api_keys::table.find(credential_id))
            .set((
                api_keys::is_active.eq(false),
                api_keys::updated_at.eq(Utc::now()),
            ))
            .execute(&mut conn)
            .await
            .map(|_| ())
            .map_err(|error| map_diesel_error(&error))
    }
}
