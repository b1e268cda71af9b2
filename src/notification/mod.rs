//! Order lifecycle notifications.
//!
//! Delivery is always fire-and-forget: a failing or slow sink never affects
//! the response of the operation that raised the event.

mod log_sink;
mod notifier;

pub use log_sink::TracingNotifier;
pub use notifier::{
    CourierAssignedData, Event, EventData, EventType, MultiNotifier, NoopNotifier,
    NotificationError, Notifier, OrderPlacedData, PaymentUpdatedData, StatusChangedData,
    format_event,
};

#[cfg(test)]
pub(crate) use notifier::RecordingNotifier;
