use tokio::sync::mpsc;
use tracing::{info, warn};

use super::{Event, EventType, NotificationError, Notifier, format_event};

const ASYNC_QUEUE_SIZE: usize = 100;

/// TracingNotifier writes events to the log from a background worker.
///
/// Stands in for push/SMS delivery; `send_async` only enqueues.
pub struct TracingNotifier {
    sender: mpsc::Sender<Event>,
}

impl TracingNotifier {
    /// Creates the notifier and spawns its worker. Must run inside a tokio runtime.
    pub fn new() -> Self {
        let (sender, receiver) = mpsc::channel(ASYNC_QUEUE_SIZE);
        Self::spawn_worker(receiver);
        Self { sender }
    }

    fn spawn_worker(mut receiver: mpsc::Receiver<Event>) {
        tokio::spawn(async move {
            while let Some(event) = receiver.recv().await {
                Self::log(&event);
            }
        });
    }

    fn log(event: &Event) {
        info!(
            event = %event.event_type,
            order_id = %event.order_id(),
            recipient = %event.recipient(),
            message = %format_event(event),
            "Notification"
        );
    }
}

#[async_trait::async_trait]
impl Notifier for TracingNotifier {
    async fn send(&self, event: &Event) -> Result<(), NotificationError> {
        Self::log(event);
        Ok(())
    }

    fn send_async(&self, event: Event) {
        // A full queue drops the event rather than blocking the caller
        if let Err(e) = self.sender.try_send(event) {
            warn!(error = %e, "Failed to queue notification");
        }
    }

    fn is_enabled(&self, _event_type: EventType) -> bool {
        true
    }

    async fn close(&self) -> Result<(), NotificationError> {
        // Wait until the worker has drained the queue
        while self.sender.capacity() < ASYNC_QUEUE_SIZE {
            tokio::task::yield_now().await;
        }
        Ok(())
    }
}
