use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::fmt;
use std::sync::Arc;

use crate::domain::{OrderStatus, PaymentStatus, Role};

/// Kind of notification event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventType {
    /// A new order was persisted
    OrderPlaced,
    /// An order moved to a new status
    StatusChanged,
    /// A courier accepted an order
    CourierAssigned,
    /// Payment status changed
    PaymentUpdated,
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventType::OrderPlaced => write!(f, "order_placed"),
            EventType::StatusChanged => write!(f, "status_changed"),
            EventType::CourierAssigned => write!(f, "courier_assigned"),
            EventType::PaymentUpdated => write!(f, "payment_updated"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderPlacedData {
    pub order_id: String,
    pub order_number: String,
    pub customer_id: String,
    pub restaurant_id: String,
    pub grand_total: Decimal,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StatusChangedData {
    pub order_id: String,
    pub customer_id: String,
    pub from: OrderStatus,
    pub to: OrderStatus,
    pub changed_by: Role,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CourierAssignedData {
    pub order_id: String,
    pub customer_id: String,
    pub courier_id: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PaymentUpdatedData {
    pub order_id: String,
    pub customer_id: String,
    pub status: PaymentStatus,
}

/// Event payload.
#[derive(Debug, Clone, PartialEq)]
pub enum EventData {
    OrderPlaced(OrderPlacedData),
    StatusChanged(StatusChangedData),
    CourierAssigned(CourierAssignedData),
    PaymentUpdated(PaymentUpdatedData),
}

/// Notification event.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    pub event_type: EventType,
    pub timestamp: DateTime<Utc>,
    pub data: EventData,
}

impl Event {
    pub fn new(event_type: EventType, data: EventData) -> Self {
        Self {
            event_type,
            timestamp: Utc::now(),
            data,
        }
    }

    pub fn order_placed(data: OrderPlacedData) -> Self {
        Self::new(EventType::OrderPlaced, EventData::OrderPlaced(data))
    }

    pub fn status_changed(data: StatusChangedData) -> Self {
        Self::new(EventType::StatusChanged, EventData::StatusChanged(data))
    }

    pub fn courier_assigned(data: CourierAssignedData) -> Self {
        Self::new(EventType::CourierAssigned, EventData::CourierAssigned(data))
    }

    pub fn payment_updated(data: PaymentUpdatedData) -> Self {
        Self::new(EventType::PaymentUpdated, EventData::PaymentUpdated(data))
    }

    /// Order the event refers to.
    pub fn order_id(&self) -> &str {
        match &self.data {
            EventData::OrderPlaced(d) => &d.order_id,
            EventData::StatusChanged(d) => &d.order_id,
            EventData::CourierAssigned(d) => &d.order_id,
            EventData::PaymentUpdated(d) => &d.order_id,
        }
    }

    /// User who should be told about the event.
    pub fn recipient(&self) -> &str {
        match &self.data {
            EventData::OrderPlaced(d) => &d.customer_id,
            EventData::StatusChanged(d) => &d.customer_id,
            EventData::CourierAssigned(d) => &d.customer_id,
            EventData::PaymentUpdated(d) => &d.customer_id,
        }
    }
}

/// Sink for notification events.
#[async_trait::async_trait]
pub trait Notifier: Send + Sync {
    /// Delivers the event and waits for the result.
    async fn send(&self, event: &Event) -> Result<(), NotificationError>;

    /// Queues the event without waiting.
    fn send_async(&self, event: Event);

    /// Whether this sink wants events of the given type.
    fn is_enabled(&self, event_type: EventType) -> bool;

    /// Flushes and releases resources.
    async fn close(&self) -> Result<(), NotificationError>;
}

/// Notification delivery error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("NotificationError: {message}")]
pub struct NotificationError {
    pub message: String,
}

impl NotificationError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// MultiNotifier fans events out to several sinks.
pub struct MultiNotifier {
    notifiers: Vec<Arc<dyn Notifier>>,
}

impl MultiNotifier {
    pub fn new(notifiers: Vec<Arc<dyn Notifier>>) -> Self {
        Self { notifiers }
    }
}

#[async_trait::async_trait]
impl Notifier for MultiNotifier {
    async fn send(&self, event: &Event) -> Result<(), NotificationError> {
        let mut errors = Vec::new();
        for notifier in &self.notifiers {
            if notifier.is_enabled(event.event_type) {
                if let Err(e) = notifier.send(event).await {
                    errors.push(e.message);
                }
            }
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(NotificationError::new(errors.join("; ")))
        }
    }

    fn send_async(&self, event: Event) {
        for notifier in &self.notifiers {
            if notifier.is_enabled(event.event_type) {
                notifier.send_async(event.clone());
            }
        }
    }

    fn is_enabled(&self, event_type: EventType) -> bool {
        self.notifiers.iter().any(|n| n.is_enabled(event_type))
    }

    async fn close(&self) -> Result<(), NotificationError> {
        let mut errors = Vec::new();
        for notifier in &self.notifiers {
            if let Err(e) = notifier.close().await {
                errors.push(e.message);
            }
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(NotificationError::new(errors.join("; ")))
        }
    }
}

/// NoopNotifier drops every event.
pub struct NoopNotifier;

impl NoopNotifier {
    pub fn new() -> Self {
        Self
    }
}

impl Default for NoopNotifier {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl Notifier for NoopNotifier {
    async fn send(&self, _event: &Event) -> Result<(), NotificationError> {
        Ok(())
    }

    fn send_async(&self, _event: Event) {}

    fn is_enabled(&self, _event_type: EventType) -> bool {
        false
    }

    async fn close(&self) -> Result<(), NotificationError> {
        Ok(())
    }
}

/// Keeps every event in memory so tests can inspect them.
#[cfg(test)]
#[derive(Default)]
pub(crate) struct RecordingNotifier {
    events: std::sync::Mutex<Vec<Event>>,
}

#[cfg(test)]
impl RecordingNotifier {
    pub(crate) fn events(&self) -> Vec<Event> {
        self.events.lock().unwrap().clone()
    }

    pub(crate) fn types(&self) -> Vec<EventType> {
        self.events().iter().map(|e| e.event_type).collect()
    }
}

#[cfg(test)]
#[async_trait::async_trait]
impl Notifier for RecordingNotifier {
    async fn send(&self, event: &Event) -> Result<(), NotificationError> {
        self.events.lock().unwrap().push(event.clone());
        Ok(())
    }

    fn send_async(&self, event: Event) {
        self.events.lock().unwrap().push(event);
    }

    fn is_enabled(&self, _event_type: EventType) -> bool {
        true
    }

    async fn close(&self) -> Result<(), NotificationError> {
        Ok(())
    }
}

// === Formatting ===

/// Formats an event as a short human-readable message.
pub fn format_event(event: &Event) -> String {
    match &event.data {
        EventData::OrderPlaced(d) => format!(
            "Order {} placed, total {}",
            d.order_number,
            format_amount(d.grand_total)
        ),
        EventData::StatusChanged(d) => format!(
            "Order {} is now {} (was {}, by {})",
            d.order_id,
            humanize(d.to.as_str()),
            humanize(d.from.as_str()),
            d.changed_by
        ),
        EventData::CourierAssigned(d) => {
            format!("Courier {} accepted order {}", d.courier_id, d.order_id)
        }
        EventData::PaymentUpdated(d) => format!("Payment for order {} is {}", d.order_id, d.status),
    }
}

/// Formats a money amount with two decimals.
fn format_amount(amount: Decimal) -> String {
    format!("{:.2}", amount)
}

/// "out_for_delivery" -> "out for delivery"
fn humanize(s: &str) -> String {
    s.replace('_', " ")
}

#[cfg(test)]
#[path = "tests.rs"]
mod tests;
