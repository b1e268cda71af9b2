//! Order state machine and role-scoped order access.
//!
//! Transitions are checked against the fixed adjacency table in
//! [`OrderStatus::next_statuses`]; authorization is layered on top.

use chrono::Utc;
use std::sync::Arc;
use thiserror::Error;
use tracing::info;

use crate::api::PageRequest;
use crate::deadline::{Deadline, DeadlineExceeded};
use crate::documents::{
    Collection, DocumentStore, DocumentStoreExt, Filter, Page, Query, StoreError,
};
use crate::domain::{Actor, Order, OrderPatch, OrderStatus, Restaurant, Role};
use crate::error::{ApiError, ErrorKind};
use crate::notification::{Event, Notifier, StatusChangedData};

/// Order access or transition failure.
#[derive(Debug, Error)]
pub enum TransitionError {
    #[error("invalid status transition from {from} to {to}")]
    InvalidTransition { from: OrderStatus, to: OrderStatus },

    #[error("order {0} not found")]
    NotFound(String),

    #[error("{role} may not access order {order_id}")]
    Forbidden { role: Role, order_id: String },

    #[error("{role} may not set status {to}")]
    RoleNotAllowed { role: Role, to: OrderStatus },

    #[error("cancellation reason is required")]
    MissingReason,

    #[error(transparent)]
    Deadline(#[from] DeadlineExceeded),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl ApiError for TransitionError {
    fn kind(&self) -> ErrorKind {
        match self {
            TransitionError::InvalidTransition { .. } => ErrorKind::Conflict,
            TransitionError::NotFound(_) => ErrorKind::NotFound,
            TransitionError::Forbidden { .. } | TransitionError::RoleNotAllowed { .. } => {
                ErrorKind::Forbidden
            }
            TransitionError::MissingReason => ErrorKind::Validation,
            TransitionError::Deadline(e) => e.kind(),
            TransitionError::Store(e) => e.kind(),
        }
    }

    fn reason(&self) -> &'static str {
        match self {
            TransitionError::InvalidTransition { .. } => "invalid_transition",
            TransitionError::NotFound(_) => "order_not_found",
            TransitionError::Forbidden { .. } => "forbidden",
            TransitionError::RoleNotAllowed { .. } => "role_not_allowed",
            TransitionError::MissingReason => "validation_error",
            TransitionError::Deadline(e) => e.reason(),
            TransitionError::Store(e) => e.reason(),
        }
    }
}

/// Fails unless `to` is directly reachable from `from`.
pub fn validate_transition(from: OrderStatus, to: OrderStatus) -> Result<(), TransitionError> {
    if from.can_transition_to(to) {
        Ok(())
    } else {
        Err(TransitionError::InvalidTransition { from, to })
    }
}

/// Restaurant owned by `owner_id`, if any.
pub(crate) async fn restaurant_for_owner(
    documents: &dyn DocumentStore,
    owner_id: &str,
) -> Result<Option<Restaurant>, StoreError> {
    documents
        .find_one(
            Collection::Restaurants,
            Query::new().filter(Filter::eq("owner_id", owner_id)),
        )
        .await
}

pub struct OrderService {
    documents: Arc<dyn DocumentStore>,
    notifier: Arc<dyn Notifier>,
}

impl OrderService {
    pub fn new(documents: Arc<dyn DocumentStore>, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            documents,
            notifier,
        }
    }

    /// Loads an order visible to `actor`: customers see their own, restaurant
    /// owners their restaurant's, couriers the ones assigned to them.
    pub async fn get_order(
        &self,
        actor: &Actor,
        order_id: &str,
        deadline: Deadline,
    ) -> Result<Order, TransitionError> {
        deadline
            .run(async {
                let order = self.load(order_id).await?;
                self.ensure_visible(actor, &order).await?;
                Ok::<_, TransitionError>(order)
            })
            .await?
    }

    /// Orders visible to `actor`, newest first.
    pub async fn list_orders(
        &self,
        actor: &Actor,
        status: Option<OrderStatus>,
        page: PageRequest,
        deadline: Deadline,
    ) -> Result<Page<Order>, TransitionError> {
        deadline
            .run(async {
                let scope = match actor.role {
                    Role::Customer => Filter::eq("customer_id", actor.user_id.as_str()),
                    Role::Courier => Filter::eq("courier_id", actor.user_id.as_str()),
                    Role::Restaurant => {
                        match restaurant_for_owner(self.documents.as_ref(), &actor.user_id).await? {
                            Some(restaurant) => Filter::eq("restaurant_id", restaurant.id),
                            None => {
                                return Ok(Page {
                                    items: Vec::new(),
                                    total: 0,
                                });
                            }
                        }
                    }
                };

                let mut query = Query::new().filter(scope).sort_desc("placed_at");
                if let Some(status) = status {
                    query = query.filter(Filter::eq("status", status.as_str()));
                }

                let orders = self
                    .documents
                    .list_as(Collection::Orders, &page.apply(query))
                    .await?;
                Ok::<_, TransitionError>(orders)
            })
            .await?
    }

    /// Customer cancellation. Only reachable before the food is ready.
    pub async fn cancel(
        &self,
        actor: &Actor,
        order_id: &str,
        reason: &str,
        deadline: Deadline,
    ) -> Result<Order, TransitionError> {
        let reason = reason.trim();
        if reason.is_empty() {
            return Err(TransitionError::MissingReason);
        }
        if actor.role != Role::Customer {
            return Err(TransitionError::RoleNotAllowed {
                role: actor.role,
                to: OrderStatus::Cancelled,
            });
        }

        deadline
            .run(async {
                let order = self.load(order_id).await?;
                if order.customer_id != actor.user_id {
                    return Err(self.forbidden(actor, &order));
                }
                validate_transition(order.status, OrderStatus::Cancelled)?;

                let mut patch = OrderPatch::transition(OrderStatus::Cancelled, Utc::now());
                patch.cancellation_reason = Some(reason.to_string());
                patch.cancelled_by = Some(Role::Customer);

                self.apply(actor, order, patch).await
            })
            .await?
    }

    /// Moves an order to `to` on behalf of the restaurant or assigned courier.
    pub async fn update_status(
        &self,
        actor: &Actor,
        order_id: &str,
        to: OrderStatus,
        deadline: Deadline,
    ) -> Result<Order, TransitionError> {
        if to == OrderStatus::Cancelled {
            return Err(TransitionError::MissingReason);
        }
        if to.required_role() != Some(actor.role) {
            return Err(TransitionError::RoleNotAllowed {
                role: actor.role,
                to,
            });
        }

        deadline
            .run(async {
                let order = self.load(order_id).await?;
                self.ensure_owner(actor, &order).await?;
                validate_transition(order.status, to)?;

                self.apply(actor, order, OrderPatch::transition(to, Utc::now()))
                    .await
            })
            .await?
    }

    async fn load(&self, order_id: &str) -> Result<Order, TransitionError> {
        self.documents
            .find_by_id(Collection::Orders, order_id)
            .await?
            .ok_or_else(|| TransitionError::NotFound(order_id.to_string()))
    }

    async fn apply(
        &self,
        actor: &Actor,
        order: Order,
        patch: OrderPatch,
    ) -> Result<Order, TransitionError> {
        let from = order.status;
        let updated: Order = self
            .documents
            .update_with(Collection::Orders, &order.id, &patch)
            .await?;

        info!(
            order_id = %updated.id,
            from = %from,
            to = %updated.status,
            role = %actor.role,
            "Order status changed"
        );

        self.notifier.send_async(Event::status_changed(StatusChangedData {
            order_id: updated.id.clone(),
            customer_id: updated.customer_id.clone(),
            from,
            to: updated.status,
            changed_by: actor.role,
        }));

        Ok(updated)
    }

    async fn ensure_visible(&self, actor: &Actor, order: &Order) -> Result<(), TransitionError> {
        match actor.role {
            Role::Customer if order.customer_id == actor.user_id => Ok(()),
            _ => self.ensure_owner(actor, order).await,
        }
    }

    /// Restaurant owners act on their restaurant's orders, couriers on orders
    /// assigned to them.
    async fn ensure_owner(&self, actor: &Actor, order: &Order) -> Result<(), TransitionError> {
        let allowed = match actor.role {
            Role::Customer => order.customer_id == actor.user_id,
            Role::Courier => order.is_assigned_to(&actor.user_id),
            Role::Restaurant => {
                let restaurant: Option<Restaurant> = self
                    .documents
                    .find_by_id(Collection::Restaurants, &order.restaurant_id)
                    .await?;
                restaurant.is_some_and(|r| r.owner_id == actor.user_id)
            }
        };

        if allowed {
            Ok(())
        } else {
            Err(self.forbidden(actor, order))
        }
    }

    fn forbidden(&self, actor: &Actor, order: &Order) -> TransitionError {
        TransitionError::Forbidden {
            role: actor.role,
            order_id: order.id.clone(),
        }
    }
}
