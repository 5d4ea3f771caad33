//! Per-tenant credential store and its tenant-facing service.
//!
//! The store owns the material codec; repositories only ever see opaque
//! encrypted strings, and providers only ever see decrypted secrets. The
//! service layers registry invalidation on top of every mutation so a
//! credential change is observed by the next dispatch.

mod codec;

pub use codec::{CodecError, EncryptionKey, KEY_BYTES, MaterialCodec};

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::domain::ports::{
    CredentialPatch, CredentialRecord, CredentialRepository, CredentialRepositoryError,
    NewCredential, ProviderSecret,
};
use crate::domain::registry::ProviderRegistry;
use crate::domain::{Error, ErrorCode};

/// Credential row view with the material withheld.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct CredentialView {
    /// Row identifier.
    pub id: Uuid,
    /// Provider the credential belongs to.
    pub provider_id: String,
    /// Tenant-chosen label.
    pub label: String,
    /// Whether this row is the pair's active credential.
    pub is_active: bool,
    /// Creation instant.
    pub created_at: DateTime<Utc>,
    /// Last mutation instant.
    pub updated_at: DateTime<Utc>,
}

impl From<CredentialRecord> for CredentialView {
    fn from(record: CredentialRecord) -> Self {
        Self {
            id: record.id,
            provider_id: record.provider_id,
            label: record.label,
            is_active: record.is_active,
            created_at: record.created_at,
            updated_at: record.updated_at,
        }
    }
}

/// Encrypting store over credential rows.
pub struct CredentialStore {
    repository: Arc<dyn CredentialRepository>,
    codec: MaterialCodec,
}

impl CredentialStore {
    /// Build a store over `repository` with the process codec.
    pub fn new(repository: Arc<dyn CredentialRepository>, codec: MaterialCodec) -> Self {
        Self { repository, codec }
    }

    /// Resolve the pair's active secret for provider authentication.
    ///
    /// Decryption failure is self-healing: the offending row is
    /// deactivated so the next resolution can pick a different active
    /// credential (or surface `AUTH` cleanly).
    ///
    /// # Errors
    ///
    /// Returns `AUTH` when no usable active credential exists.
    pub async fn get_active_secret(
        &self,
        tenant_id: Uuid,
        provider_id: &str,
    ) -> Result<ProviderSecret, Error> {
        let record = self
            .repository
            .get_active(tenant_id, provider_id)
            .await
            .map_err(map_repository_error)?
            .ok_or_else(|| {
                Error::auth(format!("no active credential for provider \"{provider_id}\""))
            })?;

        match self.codec.decrypt(&record.encrypted_material) {
            Ok(secret) => Ok(ProviderSecret::new(secret.as_str())),
            Err(error) => {
                warn!(
                    credential_id = %record.id,
                    provider = provider_id,
                    %error,
                    "credential material failed decryption; deactivating row"
                );
                if let Err(deactivate_error) = self.repository.deactivate(record.id).await {
                    warn!(
                        credential_id = %record.id,
                        error = %deactivate_error,
                        "failed to deactivate unreadable credential"
                    );
                }
                Err(Error::auth(format!(
                    "active credential for provider \"{provider_id}\" is unreadable and was deactivated"
                )))
            }
        }
    }

    /// List the pair's credentials, newest first.
    ///
    /// # Errors
    ///
    /// Propagates repository failures as `INTERNAL`.
    pub async fn list(
        &self,
        tenant_id: Uuid,
        provider_id: &str,
    ) -> Result<Vec<CredentialView>, Error> {
        let rows = self
            .repository
            .list(tenant_id, provider_id)
            .await
            .map_err(map_repository_error)?;
        Ok(rows.into_iter().map(CredentialView::from).collect())
    }

    /// Store a new credential, encrypted and inactive.
    ///
    /// # Errors
    ///
    /// Returns `INVALID_INPUT` for blank material, `INTERNAL` for storage
    /// failures.
    pub async fn add(
        &self,
        tenant_id: Uuid,
        provider_id: &str,
        label: &str,
        raw_material: &str,
    ) -> Result<CredentialView, Error> {
        if raw_material.trim().is_empty() {
            return Err(Error::invalid_input("credential material must not be blank"));
        }
        let encrypted_material = self
            .codec
            .encrypt(raw_material)
            .map_err(|error| Error::internal(format!("credential encryption failed: {error}")))?;
        let record = self
            .repository
            .insert(NewCredential {
                tenant_id,
                provider_id: provider_id.to_ascii_lowercase(),
                label: label.to_owned(),
                encrypted_material,
            })
            .await
            .map_err(map_repository_error)?;
        Ok(record.into())
    }

    /// Make `credential_id` the pair's only active row. Returns the view
    /// and the provider id for invalidation.
    ///
    /// # Errors
    ///
    /// Returns `NOT_FOUND` for an unknown row.
    pub async fn activate(
        &self,
        tenant_id: Uuid,
        credential_id: Uuid,
    ) -> Result<CredentialView, Error> {
        let record = self
            .repository
            .activate(tenant_id, credential_id)
            .await
            .map_err(map_repository_error)?;
        Ok(record.into())
    }

    /// Apply a label and/or material update.
    ///
    /// # Errors
    ///
    /// Returns `NOT_FOUND` for an unknown row.
    pub async fn update(
        &self,
        tenant_id: Uuid,
        credential_id: Uuid,
        label: Option<String>,
        raw_material: Option<String>,
    ) -> Result<CredentialView, Error> {
        let encrypted_material = match raw_material {
            Some(raw) if raw.trim().is_empty() => {
                return Err(Error::invalid_input("credential material must not be blank"));
            }
            Some(raw) => Some(self.codec.encrypt(&raw).map_err(|error| {
                Error::internal(format!("credential encryption failed: {error}"))
            })?),
            None => None,
        };
        let record = self
            .repository
            .update(
                tenant_id,
                credential_id,
                CredentialPatch {
                    label,
                    encrypted_material,
                },
            )
            .await
            .map_err(map_repository_error)?;
        Ok(record.into())
    }

    /// Delete a credential, returning the removed view.
    ///
    /// # Errors
    ///
    /// Returns `NOT_FOUND` for an unknown row.
    pub async fn delete(
        &self,
        tenant_id: Uuid,
        credential_id: Uuid,
    ) -> Result<CredentialView, Error> {
        let record = self
            .repository
            .delete(tenant_id, credential_id)
            .await
            .map_err(map_repository_error)?;
        Ok(record.into())
    }
}

/// Tenant-facing credential operations with registry invalidation.
///
/// Every mutation invalidates the `(tenant, provider)` instance after the
/// store commit so the next dispatch re-authenticates with fresh material.
pub struct CredentialService {
    store: Arc<CredentialStore>,
    registry: Arc<ProviderRegistry>,
}

impl CredentialService {
    /// Build the service.
    pub fn new(store: Arc<CredentialStore>, registry: Arc<ProviderRegistry>) -> Self {
        Self { store, registry }
    }

    /// List the pair's credentials.
    ///
    /// # Errors
    ///
    /// Propagates store failures.
    pub async fn list(
        &self,
        tenant_id: Uuid,
        provider_id: &str,
    ) -> Result<Vec<CredentialView>, Error> {
        self.store.list(tenant_id, provider_id).await
    }

    /// Add a credential (stored inactive).
    ///
    /// # Errors
    ///
    /// Propagates store failures.
    pub async fn add(
        &self,
        tenant_id: Uuid,
        provider_id: &str,
        label: &str,
        raw_material: &str,
    ) -> Result<CredentialView, Error> {
        let view = self.store.add(tenant_id, provider_id, label, raw_material).await?;
        self.registry.invalidate(tenant_id, provider_id).await;
        Ok(view)
    }

    /// Activate a credential for its pair.
    ///
    /// # Errors
    ///
    /// Propagates store failures.
    pub async fn activate(
        &self,
        tenant_id: Uuid,
        credential_id: Uuid,
    ) -> Result<CredentialView, Error> {
        let view = self.store.activate(tenant_id, credential_id).await?;
        self.registry.invalidate(tenant_id, &view.provider_id).await;
        Ok(view)
    }

    /// Update a credential's label and/or material.
    ///
    /// # Errors
    ///
    /// Propagates store failures.
    pub async fn update(
        &self,
        tenant_id: Uuid,
        credential_id: Uuid,
        label: Option<String>,
        raw_material: Option<String>,
    ) -> Result<CredentialView, Error> {
        let view = self
            .store
            .update(tenant_id, credential_id, label, raw_material)
            .await?;
        self.registry.invalidate(tenant_id, &view.provider_id).await;
        Ok(view)
    }

    /// Delete a credential.
    ///
    /// # Errors
    ///
    /// Propagates store failures.
    pub async fn delete(
        &self,
        tenant_id: Uuid,
        credential_id: Uuid,
    ) -> Result<CredentialView, Error> {
        let view = self.store.delete(tenant_id, credential_id).await?;
        self.registry.invalidate(tenant_id, &view.provider_id).await;
        Ok(view)
    }
}

fn map_repository_error(error: CredentialRepositoryError) -> Error {
    match error {
        CredentialRepositoryError::MissingCredential { id } => {
            Error::not_found(format!("credential {id} not found"))
        }
        other => Error::new(ErrorCode::Internal, other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ports::FixtureCredentialRepository;

    fn store() -> CredentialStore {
        CredentialStore::new(
            Arc::new(FixtureCredentialRepository::new()),
            MaterialCodec::new(EncryptionKey::from_bytes([3_u8; KEY_BYTES])),
        )
    }

    #[tokio::test]
    async fn active_secret_round_trips_through_the_codec() {
        let store = store();
        let tenant = Uuid::new_v4();
        let view = store
            .add(tenant, "Hunter", "primary", "sk-hunter-1")
            .await
            .expect("add");
        assert_eq!(view.provider_id, "hunter", "provider ids are lowercased");
        store.activate(tenant, view.id).await.expect("activate");

        let secret = store
            .get_active_secret(tenant, "hunter")
            .await
            .expect("resolves");
        assert_eq!(secret.expose(), "sk-hunter-1");
    }

    #[tokio::test]
    async fn missing_active_credential_is_auth() {
        let store = store();
        let err = store
            .get_active_secret(Uuid::new_v4(), "hunter")
            .await
            .expect_err("no credential");
        assert_eq!(err.code(), ErrorCode::Auth);
    }

    #[tokio::test]
    async fn unreadable_material_deactivates_the_row() {
        let repository = Arc::new(FixtureCredentialRepository::new());
        let tenant = Uuid::new_v4();

        // Encrypt under a different process key to simulate key rotation
        // without credential re-encryption.
        let other_codec = MaterialCodec::new(EncryptionKey::from_bytes([9_u8; KEY_BYTES]));
        let record = repository
            .insert(NewCredential {
                tenant_id: tenant,
                provider_id: "hunter".to_owned(),
                label: "stale".to_owned(),
                encrypted_material: other_codec.encrypt("sk-old").expect("encrypts"),
            })
            .await
            .expect("insert");
        repository.activate(tenant, record.id).await.expect("activate");

        let store = CredentialStore::new(
            Arc::clone(&repository) as Arc<dyn crate::domain::ports::CredentialRepository>,
            MaterialCodec::new(EncryptionKey::from_bytes([3_u8; KEY_BYTES])),
        );
        let err = store
            .get_active_secret(tenant, "hunter")
            .await
            .expect_err("unreadable material");
        assert_eq!(err.code(), ErrorCode::Auth);

        let rows = store.list(tenant, "hunter").await.expect("list");
        assert!(
            rows.iter().all(|row| !row.is_active),
            "self-healing must deactivate the unreadable row"
        );
    }

    #[tokio::test]
    async fn blank_material_is_rejected() {
        let store = store();
        let err = store
            .add(Uuid::new_v4(), "hunter", "blank", "   ")
            .await
            .expect_err("blank material");
        assert_eq!(err.code(), ErrorCode::InvalidInput);
    }
}
