use serde::Deserialize;

use crate::domain::PaymentStatus;

/// Webhook event kinds the service acts on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebhookKind {
    PaymentCaptured,
    PaymentFailed,
    RefundProcessed,
    Other(String),
}

impl WebhookKind {
    fn parse(event: &str) -> Self {
        match event {
            "payment.captured" => WebhookKind::PaymentCaptured,
            "payment.failed" => WebhookKind::PaymentFailed,
            "refund.processed" => WebhookKind::RefundProcessed,
            other => WebhookKind::Other(other.to_string()),
        }
    }

    /// Payment status the event moves to, `None` for ignored events.
    pub fn target_status(&self) -> Option<PaymentStatus> {
        match self {
            WebhookKind::PaymentCaptured => Some(PaymentStatus::Paid),
            WebhookKind::PaymentFailed => Some(PaymentStatus::Failed),
            WebhookKind::RefundProcessed => Some(PaymentStatus::Refunded),
            WebhookKind::Other(_) => None,
        }
    }
}

/// Parsed webhook body.
#[derive(Debug, Clone, PartialEq)]
pub struct WebhookEvent {
    pub kind: WebhookKind,
    pub event: String,
    pub payment_id: Option<String>,
    pub gateway_order_id: Option<String>,
}

#[derive(Deserialize)]
struct Envelope {
    event: String,
    #[serde(default)]
    payload: Payload,
}

#[derive(Deserialize, Default)]
struct Payload {
    #[serde(default)]
    payment: Option<Wrapped>,
}

#[derive(Deserialize)]
struct Wrapped {
    entity: PaymentEntity,
}

#[derive(Deserialize)]
struct PaymentEntity {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    order_id: Option<String>,
}

impl WebhookEvent {
    pub fn parse(raw: &[u8]) -> Result<Self, serde_json::Error> {
        let envelope: Envelope = serde_json::from_slice(raw)?;
        let entity = envelope.payload.payment.map(|p| p.entity);
        let (payment_id, gateway_order_id) = match entity {
            Some(e) => (e.id, e.order_id),
            None => (None, None),
        };

        Ok(Self {
            kind: WebhookKind::parse(&envelope.event),
            event: envelope.event,
            payment_id: payment_id.filter(|s| !s.is_empty()),
            gateway_order_id: gateway_order_id.filter(|s| !s.is_empty()),
        })
    }
}
