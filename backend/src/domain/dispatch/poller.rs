//! Poll-to-completion helper for asynchronous providers.
//!
//! Providers whose operations return an enrichment id call this from inside
//! `execute`, so the whole polling sequence counts as a single dispatch
//! attempt and shares the dispatcher's timing and retry envelope.

use std::future::Future;
use std::time::Duration;

use serde_json::Value;
use tokio::time::Instant;

use crate::domain::{CancelToken, Error};

/// Observed state of one asynchronous enrichment.
#[derive(Debug, Clone, PartialEq)]
pub enum PollStatus {
    /// Accepted, not started.
    Pending,
    /// Being processed by the provider.
    InProgress,
    /// Finished; carries the payload.
    Completed(Value),
    /// Failed provider-side; carries the provider's reason.
    Failed(String),
}

/// Poll pacing parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PollSchedule {
    /// Delay before the first poll.
    pub initial_interval: Duration,
    /// Interval multiplier per poll.
    pub multiplier: f64,
    /// Interval ceiling.
    pub max_interval: Duration,
    /// Overall budget for the whole sequence.
    pub overall_cap: Duration,
}

impl Default for PollSchedule {
    fn default() -> Self {
        Self {
            initial_interval: Duration::from_secs(1),
            multiplier: 1.5,
            max_interval: Duration::from_secs(5),
            overall_cap: Duration::from_secs(30),
        }
    }
}

/// Poll `fetch` until the enrichment reaches a terminal state.
///
/// `fetch` receives the 1-based poll number. `COMPLETED` yields the
/// payload; `FAILED` yields `PROVIDER_UNAVAILABLE`; exhausting the overall
/// budget yields `TIMEOUT`.
///
/// # Errors
///
/// Propagates `fetch` errors unchanged; produces the terminal mappings
/// above otherwise.
pub async fn poll_until_complete<F, Fut>(
    schedule: PollSchedule,
    cancel: &CancelToken,
    fetch: F,
) -> Result<Value, Error>
where
    F: Fn(u32) -> Fut,
    Fut: Future<Output = Result<PollStatus, Error>>,
{
    let deadline = Instant::now() + schedule.overall_cap;
    let mut interval = schedule.initial_interval;

    for poll in 1_u32.. {
        let wake = Instant::now() + interval;
        if wake > deadline {
            return Err(Error::timeout(format!(
                "enrichment did not complete within {} ms",
                schedule.overall_cap.as_millis()
            )));
        }
        tokio::select! {
            () = cancel.cancelled() => {
                return Err(Error::internal("enrichment polling was cancelled"));
            }
            () = tokio::time::sleep_until(wake) => {}
        }

        match fetch(poll).await? {
            PollStatus::Completed(payload) => return Ok(payload),
            PollStatus::Failed(reason) => {
                return Err(Error::provider_unavailable(format!(
                    "asynchronous enrichment failed: {reason}"
                )));
            }
            PollStatus::Pending | PollStatus::InProgress => {}
        }

        interval = interval.mul_f64(schedule.multiplier).min(schedule.max_interval);
    }

    Err(Error::internal("poll loop exhausted its counter"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test(start_paused = true)]
    async fn completes_after_several_polls_with_growing_intervals() {
        let calls = Arc::new(AtomicU32::new(0));
        let fetch_calls = Arc::clone(&calls);
        let begin = Instant::now();

        let payload = poll_until_complete(PollSchedule::default(), &CancelToken::new(), |poll| {
            let calls = Arc::clone(&fetch_calls);
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(match poll {
                    1 => PollStatus::Pending,
                    2 | 3 => PollStatus::InProgress,
                    _ => PollStatus::Completed(serde_json::json!({ "name": "ACME" })),
                })
            }
        })
        .await
        .expect("completes");

        assert_eq!(payload, serde_json::json!({ "name": "ACME" }));
        assert_eq!(calls.load(Ordering::SeqCst), 4);
        // Polls land at 1, 2.5, 4.75, and 8.125 seconds.
        let elapsed = begin.elapsed();
        assert!(
            elapsed >= Duration::from_millis(8_125),
            "elapsed {elapsed:?} must cover the full poll sequence"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn provider_side_failure_maps_to_unavailable() {
        let err = poll_until_complete(PollSchedule::default(), &CancelToken::new(), |_| async {
            Ok(PollStatus::Failed("worker crashed".to_owned()))
        })
        .await
        .expect_err("fails");
        assert_eq!(err.code(), crate::domain::ErrorCode::ProviderUnavailable);
    }

    #[tokio::test(start_paused = true)]
    async fn overall_cap_yields_timeout() {
        let begin = Instant::now();
        let err = poll_until_complete(PollSchedule::default(), &CancelToken::new(), |_| async {
            Ok(PollStatus::Pending)
        })
        .await
        .expect_err("times out");
        assert_eq!(err.code(), crate::domain::ErrorCode::Timeout);
        assert!(begin.elapsed() <= Duration::from_secs(31));
    }

    #[tokio::test(start_paused = true)]
    async fn fetch_errors_propagate_unchanged() {
        let err = poll_until_complete(PollSchedule::default(), &CancelToken::new(), |_| async {
            Err(Error::auth("key revoked"))
        })
        .await
        .expect_err("propagates");
        assert_eq!(err.code(), crate::domain::ErrorCode::Auth);
    }
}
