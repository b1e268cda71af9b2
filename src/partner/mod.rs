//! Restaurant-owner controls over their own restaurant.

use chrono::Utc;
use std::sync::Arc;
use thiserror::Error;
use tracing::info;

use crate::deadline::{Deadline, DeadlineExceeded};
use crate::documents::{Collection, DocumentStore, DocumentStoreExt, StoreError};
use crate::domain::{Actor, Restaurant, RestaurantPatch, Role};
use crate::error::{ApiError, ErrorKind};
use crate::lifecycle::restaurant_for_owner;

#[derive(Debug, Error)]
pub enum PartnerError {
    #[error("only restaurant owners may manage a restaurant")]
    NotAnOwner,

    #[error("no restaurant is registered to {0}")]
    RestaurantNotFound(String),

    #[error(transparent)]
    Deadline(#[from] DeadlineExceeded),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl ApiError for PartnerError {
    fn kind(&self) -> ErrorKind {
        match self {
            PartnerError::NotAnOwner => ErrorKind::Forbidden,
            PartnerError::RestaurantNotFound(_) => ErrorKind::NotFound,
            PartnerError::Deadline(e) => e.kind(),
            PartnerError::Store(e) => e.kind(),
        }
    }

    fn reason(&self) -> &'static str {
        match self {
            PartnerError::NotAnOwner => "forbidden",
            PartnerError::RestaurantNotFound(_) => "restaurant_not_found",
            PartnerError::Deadline(e) => e.reason(),
            PartnerError::Store(e) => e.reason(),
        }
    }
}

pub struct PartnerService {
    documents: Arc<dyn DocumentStore>,
}

impl PartnerService {
    pub fn new(documents: Arc<dyn DocumentStore>) -> Self {
        Self { documents }
    }

    /// Opens or closes the caller's restaurant for new orders.
    ///
    /// `None` flips the current state.
    pub async fn set_online(
        &self,
        owner: &Actor,
        is_online: Option<bool>,
        deadline: Deadline,
    ) -> Result<Restaurant, PartnerError> {
        if owner.role != Role::Restaurant {
            return Err(PartnerError::NotAnOwner);
        }
        deadline
            .run(async {
                let restaurant = restaurant_for_owner(self.documents.as_ref(), &owner.user_id)
                    .await?
                    .ok_or_else(|| PartnerError::RestaurantNotFound(owner.user_id.clone()))?;

                let is_online = is_online.unwrap_or(!restaurant.is_online);
                let patch = RestaurantPatch {
                    is_online: Some(is_online),
                    updated_at: Some(Utc::now()),
                    ..Default::default()
                };
                let updated: Restaurant = self
                    .documents
                    .update_with(Collection::Restaurants, &restaurant.id, &patch)
                    .await?;

                info!(
                    restaurant_id = %updated.id,
                    owner_id = %owner.user_id,
                    is_online = is_online,
                    "Restaurant availability changed"
                );
                Ok::<_, PartnerError>(updated)
            })
            .await?
    }
}
