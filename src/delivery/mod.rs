//! Courier assignment guarded by a short-lived distributed claim.
//!
//! The claim only serializes concurrent accepts. The order's status and
//! courier fields are re-checked under it and remain the final guard.

use chrono::Utc;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::api::PageRequest;
use crate::config::DeliveryConfig;
use crate::coordination::{CoordinationError, CoordinationStore};
use crate::deadline::{Deadline, DeadlineExceeded};
use crate::documents::{
    Collection, DocumentStore, DocumentStoreExt, Filter, Page, Query, StoreError,
};
use crate::domain::{Actor, CourierPatch, DeliveryPartner, Order, OrderPatch, OrderStatus, Role};
use crate::geo::GeoPoint;
use crate::error::{ApiError, ErrorKind};
use crate::notification::{CourierAssignedData, Event, Notifier};

/// Delivery action failure.
#[derive(Debug, Error)]
pub enum AcceptError {
    #[error("only couriers may perform delivery actions")]
    NotACourier,

    #[error("order {0} is being accepted by another courier")]
    AlreadyBeingAccepted(String),

    #[error("order {0} not found")]
    OrderNotFound(String),

    #[error("order {order_id} is not available for pickup (status: {status})")]
    OrderNotAvailable { order_id: String, status: OrderStatus },

    #[error("order {0} is already assigned to a courier")]
    AlreadyAssigned(String),

    #[error("courier profile for {0} not found")]
    ProfileNotFound(String),

    #[error("courier {0} must be online to accept orders")]
    NotOnline(String),

    #[error("invalid location: latitude {latitude}, longitude {longitude}")]
    InvalidLocation { latitude: f64, longitude: f64 },

    #[error(transparent)]
    Coordination(#[from] CoordinationError),

    #[error(transparent)]
    Deadline(#[from] DeadlineExceeded),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl ApiError for AcceptError {
    fn kind(&self) -> ErrorKind {
        match self {
            AcceptError::NotACourier | AcceptError::ProfileNotFound(_) => ErrorKind::Forbidden,
            AcceptError::AlreadyBeingAccepted(_)
            | AcceptError::OrderNotAvailable { .. }
            | AcceptError::AlreadyAssigned(_) => ErrorKind::Conflict,
            AcceptError::OrderNotFound(_) => ErrorKind::NotFound,
            AcceptError::NotOnline(_) | AcceptError::InvalidLocation { .. } => {
                ErrorKind::Validation
            }
            AcceptError::Coordination(e) => e.kind(),
            AcceptError::Deadline(e) => e.kind(),
            AcceptError::Store(e) => e.kind(),
        }
    }

    fn reason(&self) -> &'static str {
        match self {
            AcceptError::NotACourier => "forbidden",
            AcceptError::AlreadyBeingAccepted(_) => "already_being_accepted",
            AcceptError::OrderNotFound(_) => "order_not_found",
            AcceptError::OrderNotAvailable { .. } => "order_not_available",
            AcceptError::AlreadyAssigned(_) => "already_assigned",
            AcceptError::ProfileNotFound(_) => "courier_profile_not_found",
            AcceptError::NotOnline(_) => "not_online",
            AcceptError::InvalidLocation { .. } => "validation_error",
            AcceptError::Coordination(e) => e.reason(),
            AcceptError::Deadline(e) => e.reason(),
            AcceptError::Store(e) => e.reason(),
        }
    }
}

pub struct DeliveryService {
    documents: Arc<dyn DocumentStore>,
    coordination: Arc<dyn CoordinationStore>,
    notifier: Arc<dyn Notifier>,
    claim_ttl: Duration,
}

impl DeliveryService {
    pub fn new(
        documents: Arc<dyn DocumentStore>,
        coordination: Arc<dyn CoordinationStore>,
        notifier: Arc<dyn Notifier>,
        config: &DeliveryConfig,
    ) -> Self {
        Self {
            documents,
            coordination,
            notifier,
            claim_ttl: config.claim_ttl,
        }
    }

    fn lock_key(order_id: &str) -> String {
        format!("delivery_lock:{}", order_id)
    }

    /// Assigns a ready, unassigned order to the calling courier.
    ///
    /// The order status is left unchanged; pickup is a separate transition.
    pub async fn accept_order(
        &self,
        courier: &Actor,
        order_id: &str,
        deadline: Deadline,
    ) -> Result<Order, AcceptError> {
        ensure_courier(courier)?;
        deadline.run(self.claim_and_assign(courier, order_id)).await?
    }

    async fn claim_and_assign(&self, courier: &Actor, order_id: &str) -> Result<Order, AcceptError> {
        let key = Self::lock_key(order_id);

        // A coordination failure denies the accept
        let acquired = self
            .coordination
            .set_if_absent(&key, &courier.user_id, self.claim_ttl)
            .await?;
        if !acquired {
            debug!(order_id = %order_id, courier_id = %courier.user_id, "Delivery claim contended");
            return Err(AcceptError::AlreadyBeingAccepted(order_id.to_string()));
        }

        let result = self.assign(courier, order_id).await;

        if let Err(e) = self.coordination.compare_and_delete(&key, &courier.user_id).await {
            warn!(order_id = %order_id, error = %e, "Failed to release delivery claim, it will expire");
        }

        result
    }

    async fn assign(&self, courier: &Actor, order_id: &str) -> Result<Order, AcceptError> {
        let order: Order = self
            .documents
            .find_by_id(Collection::Orders, order_id)
            .await?
            .ok_or_else(|| AcceptError::OrderNotFound(order_id.to_string()))?;

        if order.status != OrderStatus::Ready {
            return Err(AcceptError::OrderNotAvailable {
                order_id: order.id,
                status: order.status,
            });
        }
        if order.courier_id.is_some() {
            return Err(AcceptError::AlreadyAssigned(order.id));
        }

        let profile = self.profile(&courier.user_id).await?;
        if !profile.is_online {
            return Err(AcceptError::NotOnline(courier.user_id.clone()));
        }

        let now = Utc::now();
        let patch = OrderPatch {
            courier_id: Some(courier.user_id.clone()),
            accepted_at: Some(now),
            updated_at: Some(now),
            ..Default::default()
        };
        let order: Order = self
            .documents
            .update_with(Collection::Orders, &order.id, &patch)
            .await?;

        info!(order_id = %order.id, courier_id = %courier.user_id, "Courier assigned");

        self.notifier.send_async(Event::courier_assigned(CourierAssignedData {
            order_id: order.id.clone(),
            customer_id: order.customer_id.clone(),
            courier_id: courier.user_id.clone(),
        }));

        Ok(order)
    }

    /// Toggles whether the courier takes new orders.
    pub async fn set_online(
        &self,
        courier: &Actor,
        is_online: bool,
        deadline: Deadline,
    ) -> Result<DeliveryPartner, AcceptError> {
        ensure_courier(courier)?;
        deadline
            .run(async {
                let profile = self.profile(&courier.user_id).await?;
                let patch = CourierPatch {
                    is_online: Some(is_online),
                    updated_at: Some(Utc::now()),
                    ..Default::default()
                };
                let updated: DeliveryPartner = self
                    .documents
                    .update_with(Collection::DeliveryPartners, &profile.id, &patch)
                    .await?;
                info!(courier_id = %courier.user_id, is_online = is_online, "Courier availability changed");
                Ok::<_, AcceptError>(updated)
            })
            .await?
    }

    /// Records the courier's current position on their profile.
    pub async fn update_location(
        &self,
        courier: &Actor,
        location: GeoPoint,
        deadline: Deadline,
    ) -> Result<DeliveryPartner, AcceptError> {
        ensure_courier(courier)?;
        if !location.is_valid() {
            return Err(AcceptError::InvalidLocation {
                latitude: location.latitude,
                longitude: location.longitude,
            });
        }
        deadline
            .run(async {
                let profile = self.profile(&courier.user_id).await?;
                let now = Utc::now();
                let patch = CourierPatch {
                    current_latitude: Some(location.latitude),
                    current_longitude: Some(location.longitude),
                    last_location_at: Some(now),
                    updated_at: Some(now),
                    ..Default::default()
                };
                let updated: DeliveryPartner = self
                    .documents
                    .update_with(Collection::DeliveryPartners, &profile.id, &patch)
                    .await?;
                debug!(
                    courier_id = %courier.user_id,
                    latitude = location.latitude,
                    longitude = location.longitude,
                    "Courier location updated"
                );
                Ok::<_, AcceptError>(updated)
            })
            .await?
    }

    /// Ready orders nobody has accepted yet, oldest first.
    pub async fn available_orders(
        &self,
        courier: &Actor,
        page: PageRequest,
        deadline: Deadline,
    ) -> Result<Page<Order>, AcceptError> {
        ensure_courier(courier)?;
        let query = Query::new()
            .filter(Filter::eq("status", OrderStatus::Ready.as_str()))
            .filter(Filter::eq("courier_id", Value::Null))
            .sort_asc("placed_at");
        self.list(page.apply(query), deadline).await
    }

    /// The courier's orders that are not yet finished, newest first.
    pub async fn assigned_orders(
        &self,
        courier: &Actor,
        page: PageRequest,
        deadline: Deadline,
    ) -> Result<Page<Order>, AcceptError> {
        ensure_courier(courier)?;
        let query = Query::new()
            .filter(Filter::eq("courier_id", courier.user_id.as_str()))
            .filter(Filter::ne("status", OrderStatus::Delivered.as_str()))
            .filter(Filter::ne("status", OrderStatus::Cancelled.as_str()))
            .sort_desc("placed_at");
        self.list(page.apply(query), deadline).await
    }

    async fn list(&self, query: Query, deadline: Deadline) -> Result<Page<Order>, AcceptError> {
        let page = deadline
            .run(self.documents.list_as(Collection::Orders, &query))
            .await??;
        Ok(page)
    }

    async fn profile(&self, user_id: &str) -> Result<DeliveryPartner, AcceptError> {
        self.documents
            .find_one(
                Collection::DeliveryPartners,
                Query::new().filter(Filter::eq("user_id", user_id)),
            )
            .await?
            .ok_or_else(|| AcceptError::ProfileNotFound(user_id.to_string()))
    }
}

fn ensure_courier(actor: &Actor) -> Result<(), AcceptError> {
    if actor.role == Role::Courier {
        Ok(())
    } else {
        Err(AcceptError::NotACourier)
    }
}
