//! Driven port for the per-tenant credential rows.
//!
//! Encryption never crosses this boundary knowingly: the repository stores
//! whatever opaque `encrypted_material` the credential store hands it.

use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::define_port_error;

/// One persisted credential row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CredentialRecord {
    /// Row identifier.
    pub id: Uuid,
    /// Owning tenant.
    pub tenant_id: Uuid,
    /// Provider the credential belongs to (lowercase id).
    pub provider_id: String,
    /// Tenant-chosen label.
    pub label: String,
    /// Encrypted secret material (opaque to the repository).
    pub encrypted_material: String,
    /// Whether this row is the pair's active credential.
    pub is_active: bool,
    /// Creation instant.
    pub created_at: DateTime<Utc>,
    /// Last mutation instant.
    pub updated_at: DateTime<Utc>,
}

/// Insertable credential row (stored inactive).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewCredential {
    /// Owning tenant.
    pub tenant_id: Uuid,
    /// Provider the credential belongs to (lowercase id).
    pub provider_id: String,
    /// Tenant-chosen label.
    pub label: String,
    /// Encrypted secret material.
    pub encrypted_material: String,
}

/// Partial update applied to one credential row.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CredentialPatch {
    /// Replacement label.
    pub label: Option<String>,
    /// Replacement encrypted material.
    pub encrypted_material: Option<String>,
}

define_port_error! {
    /// Errors surfaced by credential persistence.
    pub enum CredentialRepositoryError {
        /// Pool or connection failure.
        Connection { message: String } =>
            "credential store connection failed: {message}",
        /// Query execution failure.
        Query { message: String } =>
            "credential store query failed: {message}",
        /// The addressed credential row does not exist for the tenant.
        MissingCredential { id: Uuid } =>
            "credential {id} not found",
    }
}

/// Port for credential row persistence.
///
/// `activate` must atomically clear the pair's other active rows and set
/// the addressed one, inside a single transaction.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CredentialRepository: Send + Sync {
    /// Fetch the pair's active credential, if any.
    async fn get_active(
        &self,
        tenant_id: Uuid,
        provider_id: &str,
    ) -> Result<Option<CredentialRecord>, CredentialRepositoryError>;

    /// List the pair's credentials, newest first.
    async fn list(
        &self,
        tenant_id: Uuid,
        provider_id: &str,
    ) -> Result<Vec<CredentialRecord>, CredentialRepositoryError>;

    /// Insert a credential (inactive).
    async fn insert(
        &self,
        credential: NewCredential,
    ) -> Result<CredentialRecord, CredentialRepositoryError>;

    /// Atomically make `credential_id` the pair's only active row.
    async fn activate(
        &self,
        tenant_id: Uuid,
        credential_id: Uuid,
    ) -> Result<CredentialRecord, CredentialRepositoryError>;

    /// Apply a partial update.
    async fn update(
        &self,
        tenant_id: Uuid,
        credential_id: Uuid,
        patch: CredentialPatch,
    ) -> Result<CredentialRecord, CredentialRepositoryError>;

    /// Delete a credential, returning the removed row.
    async fn delete(
        &self,
        tenant_id: Uuid,
        credential_id: Uuid,
    ) -> Result<CredentialRecord, CredentialRepositoryError>;

    /// Clear the active flag on one row (self-healing recovery path).
    async fn deactivate(&self, credential_id: Uuid) -> Result<(), CredentialRepositoryError>;
}

/// In-memory fixture keeping credential rows in a mutexed vector.
#[derive(Debug, Default)]
pub struct FixtureCredentialRepository {
    rows: Mutex<Vec<CredentialRecord>>,
}

impl FixtureCredentialRepository {
    /// Empty fixture.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<CredentialRecord>> {
        match self.rows.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

#[async_trait]
impl CredentialRepository for FixtureCredentialRepository {
    async fn get_active(
        &self,
        tenant_id: Uuid,
        provider_id: &str,
    ) -> Result<Option<CredentialRecord>, CredentialRepositoryError> {
        Ok(self
            .lock()
            .iter()
            .find(|row| {
                row.tenant_id == tenant_id && row.provider_id == provider_id && row.is_active
            })
            .cloned())
    }

    async fn list(
        &self,
        tenant_id: Uuid,
        provider_id: &str,
    ) -> Result<Vec<CredentialRecord>, CredentialRepositoryError> {
        let mut rows: Vec<CredentialRecord> = self
            .lock()
            .iter()
            .filter(|row| row.tenant_id == tenant_id && row.provider_id == provider_id)
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(rows)
    }

    async fn insert(
        &self,
        credential: NewCredential,
    ) -> Result<CredentialRecord, CredentialRepositoryError> {
        let now = Utc::now();
        let record = CredentialRecord {
            id: Uuid::new_v4(),
            tenant_id: credential.tenant_id,
            provider_id: credential.provider_id,
            label: credential.label,
            encrypted_material: credential.encrypted_material,
            is_active: false,
            created_at: now,
            updated_at: now,
        };
        self.lock().push(record.clone());
        Ok(record)
    }

    async fn activate(
        &self,
        tenant_id: Uuid,
        credential_id: Uuid,
    ) -> Result<CredentialRecord, CredentialRepositoryError> {
        let mut rows = self.lock();
        let provider_id = rows
            .iter()
            .find(|row| row.tenant_id == tenant_id && row.id == credential_id)
            .map(|row| row.provider_id.clone())
            .ok_or(CredentialRepositoryError::MissingCredential { id: credential_id })?;

        let now = Utc::now();
        let mut activated = None;
        for row in rows
            .iter_mut()
            .filter(|row| row.tenant_id == tenant_id && row.provider_id == provider_id)
        {
            row.is_active = row.id == credential_id;
            row.updated_at = now;
            if row.is_active {
                activated = Some(row.clone());
            }
        }
        activated.ok_or(CredentialRepositoryError::MissingCredential { id: credential_id })
    }

    async fn update(
        &self,
        tenant_id: Uuid,
        credential_id: Uuid,
        patch: CredentialPatch,
    ) -> Result<CredentialRecord, CredentialRepositoryError> {
        let mut rows = self.lock();
        let row = rows
            .iter_mut()
            .find(|row| row.tenant_id == tenant_id && row.id == credential_id)
            .ok_or(CredentialRepositoryError::MissingCredential { id: credential_id })?;
        if let Some(label) = patch.label {
            row.label = label;
        }
        if let Some(material) = patch.encrypted_material {
            row.encrypted_material = material;
        }
        row.updated_at = Utc::now();
        Ok(row.clone())
    }

    async fn delete(
        &self,
        tenant_id: Uuid,
        credential_id: Uuid,
    ) -> Result<CredentialRecord, CredentialRepositoryError> {
        let mut rows = self.lock();
        let position = rows
            .iter()
            .position(|row| row.tenant_id == tenant_id && row.id == credential_id)
            .ok_or(CredentialRepositoryError::MissingCredential { id: credential_id })?;
        Ok(rows.remove(position))
    }

    async fn deactivate(&self, credential_id: Uuid) -> Result<(), CredentialRepositoryError> {
        let mut rows = self.lock();
        if let Some(row) = rows.iter_mut().find(|row| row.id == credential_id) {
            row.is_active = false;
            row.updated_at = Utc::now();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_credential(tenant: Uuid, provider: &str, label: &str) -> NewCredential {
        NewCredential {
            tenant_id: tenant,
            provider_id: provider.to_owned(),
            label: label.to_owned(),
            encrypted_material: "v1:opaque".to_owned(),
        }
    }

    #[tokio::test]
    async fn activation_is_exclusive_per_pair() {
        let repo = FixtureCredentialRepository::new();
        let tenant = Uuid::new_v4();
        let first = repo
            .insert(new_credential(tenant, "hunter", "primary"))
            .await
            .expect("insert");
        let second = repo
            .insert(new_credential(tenant, "hunter", "rotation"))
            .await
            .expect("insert");

        repo.activate(tenant, first.id).await.expect("activate");
        repo.activate(tenant, second.id).await.expect("activate");

        let rows = repo.list(tenant, "hunter").await.expect("list");
        let active: Vec<_> = rows.iter().filter(|row| row.is_active).collect();
        assert_eq!(active.len(), 1, "at most one active row per pair");
        assert_eq!(active[0].id, second.id);
    }

    #[tokio::test]
    async fn inserted_rows_start_inactive() {
        let repo = FixtureCredentialRepository::new();
        let tenant = Uuid::new_v4();
        let row = repo
            .insert(new_credential(tenant, "apollo", "only"))
            .await
            .expect("insert");
        assert!(!row.is_active);
        assert!(
            repo.get_active(tenant, "apollo")
                .await
                .expect("query")
                .is_none()
        );
    }
}
