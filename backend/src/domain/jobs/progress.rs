//! In-process broadcast implementation of the progress sink.

use async_trait::async_trait;
use tokio::sync::broadcast;

use crate::domain::ports::{ProgressEvent, ProgressSink};

/// Default event buffer per subscriber.
const DEFAULT_CAPACITY: usize = 256;

/// Broadcast-backed progress sink the edge subscribes to.
///
/// Delivery is best-effort: lagging subscribers lose the oldest events and
/// an absent subscriber drops events entirely. The Job Store remains the
/// canonical state either way.
#[derive(Debug, Clone)]
pub struct BroadcastProgressSink {
    sender: broadcast::Sender<ProgressEvent>,
}

impl Default for BroadcastProgressSink {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl BroadcastProgressSink {
    /// Build a sink with an explicit per-subscriber buffer.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _receiver) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Subscribe to future events.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<ProgressEvent> {
        self.sender.subscribe()
    }
}

#[async_trait]
impl ProgressSink for BroadcastProgressSink {
    async fn publish(&self, event: ProgressEvent) {
        // An error only means no subscriber is listening right now.
        let _ = self.sender.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    use crate::domain::{JobProgress, JobStatus};

    #[tokio::test]
    async fn subscribers_receive_published_events() {
        let sink = BroadcastProgressSink::default();
        let mut receiver = sink.subscribe();

        let event = ProgressEvent::new(
            Uuid::new_v4(),
            Uuid::new_v4(),
            JobStatus::Processing,
            JobProgress {
                total: 4,
                processed: 2,
                successful: 2,
                failed: 0,
            },
        );
        sink.publish(event.clone()).await;

        let received = receiver.recv().await.expect("event arrives");
        assert_eq!(received, event);
        assert_eq!(received.pct, 50);
    }

    #[tokio::test]
    async fn publishing_without_subscribers_is_a_no_op() {
        let sink = BroadcastProgressSink::default();
        sink.publish(ProgressEvent::new(
            Uuid::new_v4(),
            Uuid::new_v4(),
            JobStatus::Queued,
            JobProgress::default(),
        ))
        .await;
    }
}
