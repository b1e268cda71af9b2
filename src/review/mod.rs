//! Reviews of delivered orders and restaurant rating upkeep.

use chrono::Utc;
use serde::Deserialize;
use std::sync::Arc;
use thiserror::Error;
use tracing::info;

use crate::api::PageRequest;
use crate::background::BackgroundTasks;
use crate::deadline::{Deadline, DeadlineExceeded};
use crate::documents::{
    Collection, DocumentStore, DocumentStoreExt, Filter, Page, Query, StoreError,
};
use crate::domain::{Actor, Order, OrderStatus, Restaurant, RestaurantPatch, Review};
use crate::error::{ApiError, ErrorKind};

const MAX_TAGS: usize = 10;

#[derive(Debug, Error)]
pub enum ReviewError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("order {0} not found")]
    OrderNotFound(String),

    #[error("order {0} does not belong to the caller")]
    Forbidden(String),

    #[error("order {order_id} is {status}, only delivered orders can be reviewed")]
    NotDelivered { order_id: String, status: OrderStatus },

    #[error("order {0} has already been reviewed")]
    AlreadyReviewed(String),

    #[error(transparent)]
    Deadline(#[from] DeadlineExceeded),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl ApiError for ReviewError {
    fn kind(&self) -> ErrorKind {
        match self {
            ReviewError::Validation(_) | ReviewError::NotDelivered { .. } => ErrorKind::Validation,
            ReviewError::OrderNotFound(_) => ErrorKind::NotFound,
            ReviewError::Forbidden(_) => ErrorKind::Forbidden,
            ReviewError::AlreadyReviewed(_) => ErrorKind::Conflict,
            ReviewError::Deadline(e) => e.kind(),
            ReviewError::Store(e) => e.kind(),
        }
    }

    fn reason(&self) -> &'static str {
        match self {
            ReviewError::Validation(_) => "validation_error",
            ReviewError::OrderNotFound(_) => "order_not_found",
            ReviewError::Forbidden(_) => "forbidden",
            ReviewError::NotDelivered { .. } => "order_not_delivered",
            ReviewError::AlreadyReviewed(_) => "already_reviewed",
            ReviewError::Deadline(e) => e.reason(),
            ReviewError::Store(e) => e.reason(),
        }
    }
}

/// Review as submitted by a customer.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ReviewSubmission {
    pub food_rating: u8,
    pub delivery_rating: u8,
    #[serde(default)]
    pub review_text: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl ReviewSubmission {
    fn validate(&self) -> Result<(), ReviewError> {
        for (field, rating) in [
            ("food_rating", self.food_rating),
            ("delivery_rating", self.delivery_rating),
        ] {
            if !(1..=5).contains(&rating) {
                return Err(ReviewError::Validation(format!(
                    "{} must be between 1 and 5, got {}",
                    field, rating
                )));
            }
        }
        if self.tags.len() > MAX_TAGS {
            return Err(ReviewError::Validation(format!(
                "at most {} tags allowed",
                MAX_TAGS
            )));
        }
        Ok(())
    }
}

pub struct ReviewService {
    documents: Arc<dyn DocumentStore>,
    background: BackgroundTasks,
}

impl ReviewService {
    pub fn new(documents: Arc<dyn DocumentStore>, background: BackgroundTasks) -> Self {
        Self {
            documents,
            background,
        }
    }

    /// Records the caller's review of a delivered order.
    ///
    /// The restaurant rating is refreshed afterwards in the background.
    pub async fn submit(
        &self,
        customer: &Actor,
        order_id: &str,
        submission: &ReviewSubmission,
        deadline: Deadline,
    ) -> Result<Review, ReviewError> {
        submission.validate()?;

        let review = deadline
            .run(async {
                let order = self
                    .documents
                    .find_by_id::<Order>(Collection::Orders, order_id)
                    .await?
                    .ok_or_else(|| ReviewError::OrderNotFound(order_id.to_string()))?;

                if order.customer_id != customer.user_id {
                    return Err(ReviewError::Forbidden(order.id));
                }
                if order.status != OrderStatus::Delivered {
                    return Err(ReviewError::NotDelivered {
                        order_id: order.id,
                        status: order.status,
                    });
                }

                let review = Review {
                    id: order.id.clone(),
                    order_id: order.id.clone(),
                    customer_id: order.customer_id.clone(),
                    restaurant_id: order.restaurant_id.clone(),
                    courier_id: order.courier_id.clone(),
                    food_rating: submission.food_rating,
                    delivery_rating: submission.delivery_rating,
                    review_text: submission.review_text.trim().to_string(),
                    tags: submission.tags.clone(),
                    created_at: Utc::now(),
                };

                match self
                    .documents
                    .create_from(Collection::Reviews, &review.id, &review)
                    .await
                {
                    Ok(review) => Ok(review),
                    Err(StoreError::Conflict { .. }) => Err(ReviewError::AlreadyReviewed(order.id)),
                    Err(e) => Err(e.into()),
                }
            })
            .await??;

        info!(
            order_id = %review.order_id,
            restaurant_id = %review.restaurant_id,
            food_rating = review.food_rating,
            "Review submitted"
        );

        let documents = self.documents.clone();
        let restaurant_id = review.restaurant_id.clone();
        self.background.spawn("restaurant_rating", async move {
            refresh_restaurant_rating(documents.as_ref(), &restaurant_id)
                .await
                .map(|_| ())
        });

        Ok(review)
    }

    /// Reviews of a restaurant, newest first.
    pub async fn restaurant_reviews(
        &self,
        restaurant_id: &str,
        page: PageRequest,
        deadline: Deadline,
    ) -> Result<Page<Review>, ReviewError> {
        let query = page.apply(
            Query::new()
                .filter(Filter::eq("restaurant_id", restaurant_id))
                .sort_desc("created_at"),
        );
        Ok(deadline
            .run(self.documents.list_as(Collection::Reviews, &query))
            .await??)
    }
}

/// Average food rating to one decimal place.
pub fn average_rating(ratings: &[u8]) -> f64 {
    if ratings.is_empty() {
        return 0.0;
    }
    let sum: u32 = ratings.iter().map(|&r| u32::from(r)).sum();
    (f64::from(sum) / ratings.len() as f64 * 10.0).round() / 10.0
}

/// Recomputes a restaurant's rating from all of its reviews.
pub async fn refresh_restaurant_rating(
    documents: &dyn DocumentStore,
    restaurant_id: &str,
) -> Result<Restaurant, StoreError> {
    let reviews = documents
        .list_as::<Review>(
            Collection::Reviews,
            &Query::new().filter(Filter::eq("restaurant_id", restaurant_id)),
        )
        .await?;

    let ratings: Vec<u8> = reviews.items.iter().map(|r| r.food_rating).collect();
    let patch = RestaurantPatch {
        rating: Some(average_rating(&ratings)),
        total_ratings: Some(ratings.len() as u32),
        updated_at: Some(Utc::now()),
        ..RestaurantPatch::default()
    };

    documents
        .update_with(Collection::Restaurants, restaurant_id, &patch)
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{self, Stores};
    use std::time::Duration;

    const CUSTOMER: &str = "cust-1";

    fn submission(food: u8, delivery: u8) -> ReviewSubmission {
        ReviewSubmission {
            food_rating: food,
            delivery_rating: delivery,
            review_text: "  Hot and quick  ".into(),
            tags: vec!["tasty".into()],
        }
    }

    fn deadline() -> Deadline {
        Deadline::after(Duration::from_secs(5))
    }

    async fn setup() -> (Stores, BackgroundTasks, ReviewService) {
        let stores = Stores::new();
        stores
            .seed(Collection::Restaurants, "rest-1", &testing::restaurant("rest-1", "owner-1"))
            .await;
        for (id, status) in [
            ("order-1", OrderStatus::Delivered),
            ("order-2", OrderStatus::Delivered),
            ("order-3", OrderStatus::Preparing),
        ] {
            stores
                .seed(Collection::Orders, id, &testing::order(id, CUSTOMER, "rest-1", status))
                .await;
        }
        let background = BackgroundTasks::new();
        let service = ReviewService::new(stores.document_store(), background.clone());
        (stores, background, service)
    }

    // ==================== Submission tests ====================

    #[tokio::test]
    async fn test_submit_review_and_refresh_rating() {
        let (stores, background, service) = setup().await;
        let customer = Actor::customer(CUSTOMER);

        let review = service
            .submit(&customer, "order-1", &submission(5, 4), deadline())
            .await
            .unwrap();
        assert_eq!(review.review_text, "Hot and quick");
        assert_eq!(review.restaurant_id, "rest-1");

        service
            .submit(&customer, "order-2", &submission(4, 4), deadline())
            .await
            .unwrap();
        background.wait_idle().await;

        let restaurant: Restaurant = stores.load(Collection::Restaurants, "rest-1").await;
        assert_eq!(restaurant.total_ratings, 2);
        assert!((restaurant.rating - 4.5).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_one_review_per_order() {
        let (_stores, background, service) = setup().await;
        let customer = Actor::customer(CUSTOMER);

        service
            .submit(&customer, "order-1", &submission(5, 5), deadline())
            .await
            .unwrap();
        let err = service
            .submit(&customer, "order-1", &submission(1, 1), deadline())
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Conflict);
        assert_eq!(err.reason(), "already_reviewed");
        background.wait_idle().await;
    }

    #[tokio::test]
    async fn test_only_delivered_orders() {
        let (_stores, _background, service) = setup().await;
        let err = service
            .submit(&Actor::customer(CUSTOMER), "order-3", &submission(5, 5), deadline())
            .await
            .unwrap_err();
        assert_eq!(err.reason(), "order_not_delivered");
    }

    #[tokio::test]
    async fn test_only_the_ordering_customer() {
        let (_stores, _background, service) = setup().await;
        let err = service
            .submit(&Actor::customer("other"), "order-1", &submission(5, 5), deadline())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Forbidden);
    }

    #[tokio::test]
    async fn test_ratings_must_be_in_range() {
        let (stores, _background, service) = setup().await;
        let customer = Actor::customer(CUSTOMER);

        for (food, delivery) in [(0, 3), (3, 6)] {
            let err = service
                .submit(&customer, "order-1", &submission(food, delivery), deadline())
                .await
                .unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Validation);
        }
        assert_eq!(stores.documents.count(Collection::Reviews), 0);
    }

    #[tokio::test]
    async fn test_unknown_order() {
        let (_stores, _background, service) = setup().await;
        let err = service
            .submit(&Actor::customer(CUSTOMER), "missing", &submission(5, 5), deadline())
            .await
            .unwrap_err();
        assert_eq!(err.reason(), "order_not_found");
    }

    #[tokio::test]
    async fn test_failed_refresh_does_not_fail_submission() {
        let (stores, background, service) = setup().await;
        let order = testing::order("order-9", CUSTOMER, "rest-gone", OrderStatus::Delivered);
        stores.seed(Collection::Orders, "order-9", &order).await;

        let review = service
            .submit(&Actor::customer(CUSTOMER), "order-9", &submission(3, 3), deadline())
            .await;
        assert!(review.is_ok());
        background.wait_idle().await;
        assert_eq!(background.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_restaurant_reviews_listing() {
        let (_stores, background, service) = setup().await;
        let customer = Actor::customer(CUSTOMER);
        service.submit(&customer, "order-1", &submission(5, 5), deadline()).await.unwrap();
        service.submit(&customer, "order-2", &submission(3, 3), deadline()).await.unwrap();
        background.wait_idle().await;

        let page = service
            .restaurant_reviews("rest-1", PageRequest::new(1, 10), deadline())
            .await
            .unwrap();
        assert_eq!(page.total, 2);
    }

    #[test]
    fn test_average_rating() {
        assert_eq!(average_rating(&[]), 0.0);
        assert_eq!(average_rating(&[5, 4, 4]), 4.3);
        assert_eq!(average_rating(&[1]), 1.0);
    }
}
