//! Payment initiation, client callback verification and gateway webhooks.
//!
//! Payment status only moves forward (see [`PaymentStatus::can_become`]), so
//! replayed callbacks and webhooks are no-ops.

mod gateway;
mod signature;
mod webhook;

pub use gateway::{GatewayError, GatewayOrder, HttpPaymentGateway, PaymentGateway};
pub use signature::{SignatureVerifier, sign};
pub use webhook::{WebhookEvent, WebhookKind};

use chrono::Utc;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::PaymentConfig;
use crate::deadline::{Deadline, DeadlineExceeded};
use crate::documents::{Collection, DocumentStore, DocumentStoreExt, StoreError};
use crate::domain::{Actor, Order, OrderPatch, PaymentPatch, PaymentRecord, PaymentStatus};
use crate::error::{ApiError, ErrorKind};
use crate::notification::{Event, Notifier, PaymentUpdatedData};

/// Payment operation failure.
#[derive(Debug, Error)]
pub enum PaymentError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("order {0} not found")]
    OrderNotFound(String),

    #[error("payment {0} not found")]
    PaymentNotFound(String),

    #[error("order {0} does not belong to the caller")]
    Forbidden(String),

    #[error("order {0} is already paid")]
    AlreadyPaid(String),

    #[error("order total must be positive, got {0}")]
    InvalidAmount(Decimal),

    #[error("payment signature mismatch")]
    InvalidSignature,

    #[error("webhook signature mismatch")]
    InvalidWebhookSignature,

    #[error("malformed webhook payload: {0}")]
    InvalidPayload(#[from] serde_json::Error),

    #[error("payment gateway: {0}")]
    Gateway(#[from] GatewayError),

    #[error(transparent)]
    Deadline(#[from] DeadlineExceeded),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl ApiError for PaymentError {
    fn kind(&self) -> ErrorKind {
        match self {
            PaymentError::Validation(_)
            | PaymentError::InvalidAmount(_)
            | PaymentError::InvalidSignature
            | PaymentError::InvalidPayload(_) => ErrorKind::Validation,
            PaymentError::OrderNotFound(_) | PaymentError::PaymentNotFound(_) => {
                ErrorKind::NotFound
            }
            PaymentError::Forbidden(_) => ErrorKind::Forbidden,
            PaymentError::AlreadyPaid(_) => ErrorKind::Conflict,
            PaymentError::InvalidWebhookSignature => ErrorKind::Unauthorized,
            PaymentError::Gateway(_) => ErrorKind::UpstreamUnavailable,
            PaymentError::Deadline(e) => e.kind(),
            PaymentError::Store(e) => e.kind(),
        }
    }

    fn reason(&self) -> &'static str {
        match self {
            PaymentError::Validation(_) => "validation_error",
            PaymentError::OrderNotFound(_) => "order_not_found",
            PaymentError::PaymentNotFound(_) => "payment_not_found",
            PaymentError::Forbidden(_) => "forbidden",
            PaymentError::AlreadyPaid(_) => "already_paid",
            PaymentError::InvalidAmount(_) => "invalid_amount",
            PaymentError::InvalidSignature => "invalid_signature",
            PaymentError::InvalidWebhookSignature => "invalid_webhook_signature",
            PaymentError::InvalidPayload(_) => "invalid_payload",
            PaymentError::Gateway(_) => "payment_gateway_unavailable",
            PaymentError::Deadline(e) => e.reason(),
            PaymentError::Store(e) => e.reason(),
        }
    }
}

/// Returned to the client to open the gateway's checkout widget.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PaymentInitiation {
    pub gateway_order_id: String,
    pub key_id: String,
    /// Minor currency units.
    pub amount: i64,
    pub currency: String,
    pub order_id: String,
}

/// Client callback after the gateway checkout completes.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PaymentCallback {
    pub gateway_order_id: String,
    pub payment_id: String,
    pub signature: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PaymentVerification {
    pub verified: bool,
    pub order_id: String,
    pub payment_id: String,
    pub status: PaymentStatus,
}

/// Result of processing one webhook delivery.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WebhookOutcome {
    pub event: String,
    /// Whether a payment status changed.
    pub applied: bool,
}

/// Converts a money amount to minor units (two decimal places).
pub fn to_minor_units(amount: Decimal) -> Option<i64> {
    (amount * Decimal::ONE_HUNDRED)
        .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
        .to_i64()
}

pub struct PaymentService {
    documents: Arc<dyn DocumentStore>,
    gateway: Arc<dyn PaymentGateway>,
    verifier: SignatureVerifier,
    notifier: Arc<dyn Notifier>,
    currency: String,
}

impl PaymentService {
    pub fn new(
        documents: Arc<dyn DocumentStore>,
        gateway: Arc<dyn PaymentGateway>,
        notifier: Arc<dyn Notifier>,
        config: &PaymentConfig,
    ) -> Self {
        Self {
            documents,
            gateway,
            verifier: SignatureVerifier::new(&config.key_secret, &config.webhook_secret),
            notifier,
            currency: config.currency.clone(),
        }
    }

    /// Creates a gateway order for the caller's order and records the attempt.
    ///
    /// The gateway call is not retried.
    pub async fn initiate(
        &self,
        customer: &Actor,
        order_id: &str,
        deadline: Deadline,
    ) -> Result<PaymentInitiation, PaymentError> {
        deadline
            .run(async {
                let order = self.owned_order(customer, order_id).await?;
                if order.payment_status == PaymentStatus::Paid {
                    return Err(PaymentError::AlreadyPaid(order.id));
                }

                let amount = match to_minor_units(order.grand_total) {
                    Some(amount) if amount > 0 => amount,
                    _ => return Err(PaymentError::InvalidAmount(order.grand_total)),
                };

                let gateway_order = self
                    .gateway
                    .create_order(amount, &self.currency, &order.order_number)
                    .await?;

                let now = Utc::now();
                let record = PaymentRecord {
                    id: gateway_order.id.clone(),
                    order_id: order.id.clone(),
                    customer_id: order.customer_id.clone(),
                    amount_minor: amount,
                    currency: self.currency.clone(),
                    status: PaymentStatus::Pending,
                    payment_id: None,
                    created_at: now,
                    updated_at: now,
                };
                self.documents
                    .create_from(Collection::Payments, &record.id, &record)
                    .await?;

                let patch = OrderPatch {
                    gateway_order_id: Some(gateway_order.id.clone()),
                    updated_at: Some(now),
                    ..OrderPatch::default()
                };
                self.documents
                    .update_with::<Order, _>(Collection::Orders, &order.id, &patch)
                    .await?;

                info!(
                    order_id = %order.id,
                    gateway_order_id = %gateway_order.id,
                    amount,
                    "Payment initiated"
                );

                Ok::<_, PaymentError>(PaymentInitiation {
                    gateway_order_id: gateway_order.id,
                    key_id: self.gateway.key_id().to_string(),
                    amount,
                    currency: self.currency.clone(),
                    order_id: order.id,
                })
            })
            .await?
    }

    /// Verifies a client callback and marks the payment captured.
    pub async fn verify(
        &self,
        customer: &Actor,
        callback: &PaymentCallback,
        deadline: Deadline,
    ) -> Result<PaymentVerification, PaymentError> {
        if callback.gateway_order_id.trim().is_empty()
            || callback.payment_id.trim().is_empty()
            || callback.signature.trim().is_empty()
        {
            return Err(PaymentError::Validation(
                "gateway_order_id, payment_id and signature are required".into(),
            ));
        }

        if !self.verifier.verify_payment(
            &callback.gateway_order_id,
            &callback.payment_id,
            &callback.signature,
        ) {
            warn!(gateway_order_id = %callback.gateway_order_id, "Payment signature mismatch");
            return Err(PaymentError::InvalidSignature);
        }

        deadline
            .run(async {
                let record = self
                    .documents
                    .find_by_id::<PaymentRecord>(Collection::Payments, &callback.gateway_order_id)
                    .await?
                    .ok_or_else(|| PaymentError::PaymentNotFound(callback.gateway_order_id.clone()))?;

                if record.customer_id != customer.user_id {
                    return Err(PaymentError::Forbidden(record.order_id));
                }

                let record = self
                    .transition(record, PaymentStatus::Paid, Some(&callback.payment_id))
                    .await?;

                Ok::<_, PaymentError>(PaymentVerification {
                    verified: true,
                    order_id: record.order_id,
                    payment_id: callback.payment_id.clone(),
                    status: record.status,
                })
            })
            .await?
    }

    /// Applies a signed gateway webhook.
    ///
    /// Unknown events and events for unknown payments are acknowledged without
    /// changes.
    pub async fn handle_webhook(
        &self,
        raw_body: &[u8],
        signature: &str,
        deadline: Deadline,
    ) -> Result<WebhookOutcome, PaymentError> {
        if !self.verifier.verify_webhook(raw_body, signature) {
            warn!("Webhook signature mismatch");
            return Err(PaymentError::InvalidWebhookSignature);
        }

        let event = WebhookEvent::parse(raw_body)?;
        info!(
            event = %event.event,
            gateway_order_id = ?event.gateway_order_id,
            "Webhook received"
        );

        let (Some(target), Some(gateway_order_id)) =
            (event.kind.target_status(), event.gateway_order_id.as_deref())
        else {
            return Ok(WebhookOutcome {
                event: event.event,
                applied: false,
            });
        };

        deadline
            .run(async {
                let Some(record) = self
                    .documents
                    .find_by_id::<PaymentRecord>(Collection::Payments, gateway_order_id)
                    .await?
                else {
                    warn!(gateway_order_id = %gateway_order_id, "Webhook for unknown payment");
                    return Ok(WebhookOutcome {
                        event: event.event.clone(),
                        applied: false,
                    });
                };

                let before = record.status;
                let record = self
                    .transition(record, target, event.payment_id.as_deref())
                    .await?;

                Ok::<_, PaymentError>(WebhookOutcome {
                    event: event.event.clone(),
                    applied: record.status != before,
                })
            })
            .await?
    }

    async fn owned_order(&self, customer: &Actor, order_id: &str) -> Result<Order, PaymentError> {
        let order = self
            .documents
            .find_by_id::<Order>(Collection::Orders, order_id)
            .await?
            .ok_or_else(|| PaymentError::OrderNotFound(order_id.to_string()))?;

        if order.customer_id != customer.user_id {
            return Err(PaymentError::Forbidden(order.id));
        }
        Ok(order)
    }

    /// Moves the payment and its order to `to` when allowed; otherwise a no-op.
    async fn transition(
        &self,
        record: PaymentRecord,
        to: PaymentStatus,
        payment_id: Option<&str>,
    ) -> Result<PaymentRecord, PaymentError> {
        if !record.status.can_become(to) {
            debug!(
                gateway_order_id = %record.id,
                from = %record.status,
                to = %to,
                "Payment status unchanged"
            );
            return Ok(record);
        }

        let now = Utc::now();
        let payment_id = payment_id.map(str::to_string);

        let record: PaymentRecord = self
            .documents
            .update_with(
                Collection::Payments,
                &record.id,
                &PaymentPatch {
                    status: Some(to),
                    payment_id: payment_id.clone(),
                    updated_at: Some(now),
                },
            )
            .await?;

        let patch = OrderPatch {
            payment_status: Some(to),
            payment_id,
            updated_at: Some(now),
            ..OrderPatch::default()
        };
        self.documents
            .update_with::<Order, _>(Collection::Orders, &record.order_id, &patch)
            .await?;

        info!(
            order_id = %record.order_id,
            gateway_order_id = %record.id,
            status = %to,
            "Payment status updated"
        );

        self.notifier.send_async(Event::payment_updated(PaymentUpdatedData {
            order_id: record.order_id.clone(),
            customer_id: record.customer_id.clone(),
            status: to,
        }));

        Ok(record)
    }
}

#[cfg(test)]
#[path = "tests.rs"]
mod tests;
