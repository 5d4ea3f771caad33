//! Per-instance token bucket used by the dispatcher.
//!
//! Two gates compose:
//! - a minimum spacing of `1000 / rps` ms between adjacent call starts;
//! - a reservoir of starts per 60 s window, refilled in full at each window
//!   boundary. The reservoir is floored at the sustained rate
//!   (`rps * 60`) so a small burst setting cannot starve a stream the
//!   spacing gate already admits.
//!
//! Acquisition suspends until a token is available, bounded by the caller's
//! deadline, and honours cooperative cancellation.

use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::domain::CancelToken;

/// Reservoir refill window.
const WINDOW: Duration = Duration::from_secs(60);

/// Why an acquisition did not produce a token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum AcquireError {
    /// The token would only become available after the deadline.
    #[error("rate limiter wait would exceed the request deadline")]
    DeadlineExceeded,
    /// The caller was cancelled while waiting.
    #[error("rate limiter wait was cancelled")]
    Cancelled,
}

#[derive(Debug)]
struct BucketState {
    window_start: Option<Instant>,
    used_in_window: u32,
    last_start: Option<Instant>,
}

/// Token bucket guarding one provider instance.
#[derive(Debug)]
pub struct TokenBucket {
    min_spacing: Duration,
    window_allowance: u32,
    state: Mutex<BucketState>,
}

impl TokenBucket {
    /// Build a bucket from the descriptor's rate parameters.
    #[must_use]
    pub fn new(requests_per_second: f64, burst_size: u32) -> Self {
        let rps = if requests_per_second > 0.0 {
            requests_per_second
        } else {
            1.0
        };
        let sustained_per_window = (rps * WINDOW.as_secs_f64())
            .ceil()
            .min(f64::from(u32::MAX)) as u32;
        Self {
            min_spacing: Duration::from_secs_f64(1.0 / rps),
            window_allowance: burst_size.max(1).max(sustained_per_window),
            state: Mutex::new(BucketState {
                window_start: None,
                used_in_window: 0,
                last_start: None,
            }),
        }
    }

    /// Acquire one token, waiting as needed.
    ///
    /// # Errors
    ///
    /// [`AcquireError::DeadlineExceeded`] when the earliest available slot
    /// lies beyond `deadline`; [`AcquireError::Cancelled`] when `cancel`
    /// fires first.
    pub async fn acquire(
        &self,
        deadline: Instant,
        cancel: &CancelToken,
    ) -> Result<(), AcquireError> {
        loop {
            if cancel.is_cancelled() {
                return Err(AcquireError::Cancelled);
            }

            let earliest = {
                let mut state = self.state.lock().await;
                let now = Instant::now();

                match state.window_start {
                    Some(start) if now.duration_since(start) >= WINDOW => {
                        state.window_start = Some(now);
                        state.used_in_window = 0;
                    }
                    Some(_) => {}
                    None => {
                        state.window_start = Some(now);
                        state.used_in_window = 0;
                    }
                }

                let mut earliest = now;
                if state.used_in_window >= self.window_allowance
                    && let Some(start) = state.window_start
                {
                    earliest = earliest.max(start + WINDOW);
                }
                if let Some(last) = state.last_start {
                    earliest = earliest.max(last + self.min_spacing);
                }

                if earliest <= now {
                    state.used_in_window = state.used_in_window.saturating_add(1);
                    state.last_start = Some(now);
                    return Ok(());
                }
                earliest
            };

            if earliest > deadline {
                return Err(AcquireError::DeadlineExceeded);
            }
            tokio::select! {
                () = cancel.cancelled() => return Err(AcquireError::Cancelled),
                () = tokio::time::sleep_until(earliest) => {}
            }
        }
    }
}
