//! Service host error types.

use crate::config::ConfigError;
use crate::coordination::CoordinationError;
use crate::documents::StoreError;
use crate::payment::GatewayError;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("service is already running")]
    AlreadyRunning,
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    #[error("document store error: {0}")]
    Store(#[from] StoreError),
    #[error("coordination store error: {0}")]
    Coordination(#[from] CoordinationError),
    #[error("payment gateway error: {0}")]
    Gateway(#[from] GatewayError),
    #[error("redis coordination requires the `redis-store` feature")]
    RedisUnsupported,
    #[error("signal error: {0}")]
    Signal(#[from] std::io::Error),
}
