//! The rate-limited, retrying dispatcher wrapping every provider call.
//!
//! Composition order for one dispatch: cache probe, token bucket,
//! concurrency gate, provider call with the remaining deadline, retry with
//! exponential backoff for retryable codes only. One request id is assigned
//! at entry and wall-clock elapsed is recorded regardless of outcome. This
//! module is the only place retry decisions are made.

mod poller;
mod rate_limiter;
mod retry;

pub use poller::{PollSchedule, PollStatus, poll_until_complete};
pub use rate_limiter::{AcquireError, TokenBucket};
pub use retry::RetryPolicy;

use std::sync::Arc;
use std::time::Duration;

use mockable::{Clock, DefaultClock};
use serde_json::Value;
use tokio::time::Instant;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::domain::ports::{ResponseCache, ResponseCacheKey, UsageRecorder, UsageSample};
use crate::domain::registry::ProviderInstance;
use crate::domain::{
    CancelToken, EnrichmentRequest, EnrichmentResponse, Error, Operation, ProviderDescriptor,
    ResponseMetadata,
};

/// Per-operation cache time-to-live, honouring descriptor overrides
/// (`configuration.cache_ttl_seconds.<operation>`). `None` disables
/// caching for the operation.
#[must_use]
pub fn cache_ttl(descriptor: &ProviderDescriptor, operation: Operation) -> Option<Duration> {
    if let Some(overrides) = descriptor
        .config
        .get("cache_ttl_seconds")
        .and_then(Value::as_object)
        && let Some(seconds) = overrides.get(operation.as_str()).and_then(Value::as_u64)
    {
        return (seconds > 0).then(|| Duration::from_secs(seconds));
    }
    match operation {
        Operation::FindEmail | Operation::EnrichCompany => {
            Some(Duration::from_secs(24 * 60 * 60))
        }
        Operation::EnrichPerson
        | Operation::SearchPeople
        | Operation::SearchCompanies
        | Operation::FindLookalike => Some(Duration::from_secs(60 * 60)),
        Operation::CheckEnrichmentStatus => None,
    }
}

/// Rate-limited, retrying request dispatcher.
pub struct Dispatcher {
    cache: Arc<dyn ResponseCache>,
    usage: Arc<dyn UsageRecorder>,
    clock: Arc<dyn Clock>,
    retry: RetryPolicy,
}

impl Dispatcher {
    /// Build a dispatcher with the default retry policy and system clock.
    pub fn new(cache: Arc<dyn ResponseCache>, usage: Arc<dyn UsageRecorder>) -> Self {
        Self::with_retry(cache, usage, RetryPolicy::default())
    }

    /// Build a dispatcher with an explicit retry policy.
    pub fn with_retry(
        cache: Arc<dyn ResponseCache>,
        usage: Arc<dyn UsageRecorder>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            cache,
            usage,
            clock: Arc::new(DefaultClock),
            retry,
        }
    }

    /// Execute one normalized request against a provider instance.
    ///
    /// Always returns a normalized response; failures are carried in
    /// `error`, never as a Rust-level `Err`.
    pub async fn execute(
        &self,
        instance: &ProviderInstance,
        request: &EnrichmentRequest,
        cancel: &CancelToken,
    ) -> EnrichmentResponse {
        let request_id = Uuid::new_v4();
        let started = Instant::now();
        let deadline = started + request.options.timeout();
        let operation = request.operation;
        let provider_id = instance.descriptor.id.clone();

        let metadata = |credits_used: u32, started: Instant| ResponseMetadata {
            provider: provider_id.clone(),
            operation,
            credits_used,
            response_time_ms: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
            request_id,
        };

        if !instance.descriptor.supports(operation) {
            return EnrichmentResponse::failure(
                Error::operation_unsupported(format!(
                    "provider \"{provider_id}\" does not support {operation}"
                )),
                metadata(0, started),
            );
        }

        let tenant_scope = instance
            .descriptor
            .cache_per_tenant()
            .then_some(instance.tenant_id);
        let cache_key =
            ResponseCacheKey::derive(&provider_id, operation, &request.params, tenant_scope);
        match self.cache.get(&cache_key).await {
            Ok(Some(data)) => {
                debug!(%request_id, provider = %provider_id, %operation, "cache hit");
                return EnrichmentResponse::success(data, metadata(0, started));
            }
            Ok(None) => {}
            Err(error) => {
                debug!(%request_id, %error, "cache probe failed; treating as miss");
            }
        }

        let max_attempts = request.options.retries.unwrap_or(self.retry.max_attempts).max(1);
        let mut final_error: Error;
        let mut attempt: u32 = 1;

        loop {
            match self
                .single_attempt(instance, request, deadline, cancel)
                .await
            {
                Ok(data) => {
                    if let Some(ttl) = cache_ttl(&instance.descriptor, operation)
                        && let Err(error) = self.cache.put(&cache_key, data.clone(), ttl).await
                    {
                        debug!(%request_id, %error, "cache write failed");
                    }
                    let credits = instance.provider.calculate_credits(operation);
                    let response = EnrichmentResponse::success(data, metadata(credits, started));
                    self.record_usage(instance, &response).await;
                    return response;
                }
                Err(error) => {
                    debug!(
                        %request_id,
                        provider = %provider_id,
                        %operation,
                        attempt,
                        code = ?error.code(),
                        "dispatch attempt failed: {error}"
                    );
                    final_error = error;
                }
            }

            if !final_error.is_retryable() || attempt >= max_attempts {
                break;
            }
            let backoff = self.retry.delay_after(attempt);
            if Instant::now() + backoff > deadline {
                // Retrying would overrun the request deadline.
                break;
            }
            tokio::select! {
                () = cancel.cancelled() => {
                    final_error = Error::internal("dispatch cancelled");
                    break;
                }
                () = tokio::time::sleep(backoff) => {}
            }
            attempt += 1;
        }

        let response = EnrichmentResponse::failure(final_error, metadata(0, started));
        self.record_usage(instance, &response).await;
        response
    }

    async fn single_attempt(
        &self,
        instance: &ProviderInstance,
        request: &EnrichmentRequest,
        deadline: Instant,
        cancel: &CancelToken,
    ) -> Result<Value, Error> {
        match instance.limiter.acquire(deadline, cancel).await {
            Ok(()) => {}
            Err(AcquireError::DeadlineExceeded) => {
                return Err(Error::timeout(
                    "rate limiter could not grant a slot before the deadline",
                ));
            }
            Err(AcquireError::Cancelled) => {
                return Err(Error::internal("dispatch cancelled"));
            }
        }

        let _permit = tokio::select! {
            () = cancel.cancelled() => {
                return Err(Error::internal("dispatch cancelled"));
            }
            () = tokio::time::sleep_until(deadline) => {
                return Err(Error::timeout(
                    "concurrency slot was not granted before the deadline",
                ));
            }
            permit = instance.concurrency.acquire() => {
                permit.map_err(|_| Error::internal("provider concurrency gate closed"))?
            }
        };

        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Err(Error::timeout("request deadline exhausted before the call"));
        }
        match tokio::time::timeout(remaining, instance.provider.execute(request, cancel)).await {
            Ok(outcome) => outcome,
            Err(_elapsed) => Err(Error::timeout(format!(
                "provider call exceeded the {} ms deadline",
                request.options.timeout().as_millis()
            ))),
        }
    }

    async fn record_usage(&self, instance: &ProviderInstance, response: &EnrichmentResponse) {
        let sample = UsageSample {
            tenant_id: instance.tenant_id,
            provider_id: instance.descriptor.id.clone(),
            operation: response.metadata.operation,
            error_code: response.error.as_ref().map(Error::code),
            response_time_ms: response.metadata.response_time_ms,
            credits_used: response.metadata.credits_used,
            ts: self.clock.utc(),
        };
        if let Err(error) = self.usage.record(sample).await {
            // Analytics must never fail a dispatch.
            warn!(%error, "usage sample was not recorded");
        }
    }
}
