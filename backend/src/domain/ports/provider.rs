//! The provider contract: the uniform capability set every third-party
//! data provider adapter implements.
//!
//! `execute` is the only hot path. Adapters convert normalized params into
//! their wire form, issue the HTTP call(s), and map the response back into
//! canonical records; raw HTTP status codes never leak upward.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use uuid::Uuid;
use zeroize::Zeroizing;

use crate::domain::{
    CancelToken, EnrichmentRequest, Error, Operation, ProviderDescriptor,
};

/// Health probe outcome for one provider instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderHealth {
    /// Whether the provider answered the probe.
    pub ok: bool,
    /// Optional diagnostic message.
    pub message: Option<String>,
}

impl ProviderHealth {
    /// Healthy probe result.
    #[must_use]
    pub fn healthy() -> Self {
        Self {
            ok: true,
            message: None,
        }
    }

    /// Unhealthy probe result with a diagnostic.
    pub fn unhealthy(message: impl Into<String>) -> Self {
        Self {
            ok: false,
            message: Some(message.into()),
        }
    }
}

/// Decrypted credential material handed to provider factories.
///
/// Debug output is redacted; the inner secret is zeroized on drop.
#[derive(Clone)]
pub struct ProviderSecret(Zeroizing<String>);

impl ProviderSecret {
    /// Wrap raw secret material.
    pub fn new(secret: impl Into<String>) -> Self {
        Self(Zeroizing::new(secret.into()))
    }

    /// Expose the plaintext secret for explicit use sites.
    #[must_use]
    pub fn expose(&self) -> &str {
        self.0.as_str()
    }
}

impl std::fmt::Debug for ProviderSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("ProviderSecret(<redacted>)")
    }
}

/// Construction inputs for one authenticated provider instance.
#[derive(Debug, Clone)]
pub struct ProviderContext {
    /// Static provider configuration.
    pub descriptor: Arc<ProviderDescriptor>,
    /// Tenant the instance is bound to.
    pub tenant_id: Uuid,
    /// Decrypted credential material.
    pub secret: ProviderSecret,
}

/// Uniform provider capability set.
///
/// Implementations never retry internally; the dispatcher owns retry
/// policy. Errors are mapped into the normalized taxonomy before they
/// leave `execute`.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Static descriptor for this instance.
    fn descriptor(&self) -> &ProviderDescriptor;

    /// Validate provider-specific configuration at construction time.
    ///
    /// # Errors
    ///
    /// Returns `INVALID_INPUT` when the descriptor configuration is
    /// unusable (for example, a malformed base URL).
    fn validate_config(&self) -> Result<(), Error>;

    /// Operations this instance can execute.
    fn supported_operations(&self) -> Vec<Operation> {
        self.descriptor().supported_operations()
    }

    /// Confirm the credential is usable.
    ///
    /// Cheap by default: adapters override this only when the provider
    /// offers an inexpensive verification endpoint.
    ///
    /// # Errors
    ///
    /// Returns `AUTH` when the credential is rejected.
    async fn authenticate(&self) -> Result<(), Error> {
        Ok(())
    }

    /// Execute one normalized request, returning the canonical payload.
    ///
    /// # Errors
    ///
    /// Returns a normalized [`Error`]; the dispatcher decides retryability
    /// from its code.
    async fn execute(&self, request: &EnrichmentRequest, cancel: &CancelToken)
    -> Result<Value, Error>;

    /// Credits charged for `operation`.
    fn calculate_credits(&self, operation: Operation) -> u32 {
        self.descriptor().credits_for(operation)
    }

    /// Probe provider reachability.
    async fn health_check(&self) -> ProviderHealth {
        ProviderHealth::healthy()
    }
}

/// Factory constructing an authenticated provider adapter.
///
/// Registered once per provider implementation at process start; the
/// registry invokes it on instance-cache misses.
pub type ProviderFactory =
    Arc<dyn Fn(ProviderContext) -> Result<Arc<dyn Provider>, Error> + Send + Sync>;

/// Fixture provider echoing its request parameters as the payload.
///
/// Used by service and worker tests that need a deterministic provider
/// without HTTP.
pub struct FixtureProvider {
    descriptor: Arc<ProviderDescriptor>,
}

impl FixtureProvider {
    /// Build a fixture over `descriptor`.
    #[must_use]
    pub fn new(descriptor: Arc<ProviderDescriptor>) -> Self {
        Self { descriptor }
    }
}

#[async_trait]
impl Provider for FixtureProvider {
    fn descriptor(&self) -> &ProviderDescriptor {
        &self.descriptor
    }

    fn validate_config(&self) -> Result<(), Error> {
        Ok(())
    }

    async fn execute(
        &self,
        request: &EnrichmentRequest,
        _cancel: &CancelToken,
    ) -> Result<Value, Error> {
        Ok(Value::Object(request.params.clone()))
    }
}
