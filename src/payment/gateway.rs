//! Payment gateway client.

use async_trait::async_trait;
use reqwest::{Client as HttpClient, StatusCode};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::config::PaymentConfig;

/// Gateway errors.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("request error: {0}")]
    Request(#[from] reqwest::Error),

    #[error("gateway error {status}: {body}")]
    Api { status: u16, body: String },

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Order created on the gateway side.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct GatewayOrder {
    pub id: String,
    pub amount: i64,
    pub currency: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub receipt: String,
}

#[derive(Serialize)]
struct CreateOrderBody<'a> {
    amount: i64,
    currency: &'a str,
    receipt: &'a str,
}

/// Payment provider operations. Calls are never retried automatically.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Creates a gateway order for `amount_minor` (e.g. paise).
    async fn create_order(
        &self,
        amount_minor: i64,
        currency: &str,
        reference: &str,
    ) -> Result<GatewayOrder, GatewayError>;

    /// Public key handed to clients for the checkout widget.
    fn key_id(&self) -> &str;
}

/// HTTP client for the gateway's REST API.
pub struct HttpPaymentGateway {
    http_client: HttpClient,
    base_url: String,
    key_id: String,
    key_secret: String,
}

impl HttpPaymentGateway {
    pub fn new(config: &PaymentConfig) -> Result<Self, GatewayError> {
        let http_client = HttpClient::builder().timeout(config.timeout).build()?;
        Ok(Self {
            http_client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            key_id: config.key_id.clone(),
            key_secret: config.key_secret.clone(),
        })
    }

    fn orders_url(&self) -> String {
        format!("{}/v1/orders", self.base_url)
    }
}

#[async_trait]
impl PaymentGateway for HttpPaymentGateway {
    async fn create_order(
        &self,
        amount_minor: i64,
        currency: &str,
        reference: &str,
    ) -> Result<GatewayOrder, GatewayError> {
        let body = CreateOrderBody {
            amount: amount_minor,
            currency,
            receipt: reference,
        };

        debug!(amount = amount_minor, currency = %currency, reference = %reference, "creating gateway order");

        let response = self
            .http_client
            .post(self.orders_url())
            .basic_auth(&self.key_id, Some(&self.key_secret))
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        let bytes = response.bytes().await?;

        if status != StatusCode::OK {
            return Err(GatewayError::Api {
                status: status.as_u16(),
                body: String::from_utf8_lossy(&bytes).into_owned(),
            });
        }

        Ok(serde_json::from_slice(&bytes)?)
    }

    fn key_id(&self) -> &str {
        &self.key_id
    }
}
