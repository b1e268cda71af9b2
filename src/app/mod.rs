//! Service host.
//!
//! Wires configuration, stores, governors and services, and owns the
//! process-level background work (bucket sweeper, expired-key purge).

mod error;

pub use error::AppError;

use std::sync::Arc;
use std::time::Duration;

use serde_json::value::RawValue;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::api::{ApiResponse, error_headers, failure};
use crate::background::BackgroundTasks;
use crate::checkout::{CheckoutService, PlaceOrderRequest};
use crate::config::{Config, CoordinationBackend};
use crate::coordination::{CoordinationStore, InMemoryCoordinationStore};
use crate::coupon::CouponLedger;
use crate::deadline::Deadline;
use crate::delivery::DeliveryService;
use crate::documents::{
    DocumentStore, RetryPolicy, RetryingDocumentStore, SqliteDocumentStore, SqliteStoreConfig,
    StoreError,
};
use crate::fees::FeeEngine;
use crate::lifecycle::OrderService;
use crate::notification::{Notifier, TracingNotifier};
use crate::partner::PartnerService;
use crate::payment::{HttpPaymentGateway, PaymentGateway, PaymentService};
use crate::ratelimit::{RateLimiters, Tier};
use crate::review::ReviewService;

/// How long shutdown waits for fire-and-forget jobs.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

/// Every user-facing service, sharing one set of stores.
pub struct Services {
    pub checkout: CheckoutService,
    pub coupons: Arc<CouponLedger>,
    pub orders: OrderService,
    pub delivery: DeliveryService,
    pub partners: PartnerService,
    pub payments: PaymentService,
    pub reviews: ReviewService,
}

/// Handler output: status, extra headers and the response envelope.
#[derive(Debug)]
pub struct Reply<T> {
    pub status: u16,
    pub headers: Vec<(&'static str, String)>,
    pub body: ApiResponse<T>,
}

/// Stores and transports the host wires in.
pub struct Components {
    pub documents: Arc<dyn DocumentStore>,
    pub coordination: Arc<dyn CoordinationStore>,
    pub gateway: Arc<dyn PaymentGateway>,
    pub notifier: Arc<dyn Notifier>,
}

pub struct App {
    config: Config,
    services: Services,
    rate_limiters: RateLimiters,
    notifier: Arc<dyn Notifier>,
    background: BackgroundTasks,
    sqlite: Option<Arc<RetryingDocumentStore<SqliteDocumentStore>>>,
    memory_coordination: Option<Arc<InMemoryCoordinationStore>>,

    // Runtime state
    started_at: Mutex<Option<Instant>>,
    running: Mutex<bool>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl App {
    /// Builds the host from already-constructed components.
    pub fn new(config: Config, components: Components) -> Self {
        let Components {
            documents,
            coordination,
            gateway,
            notifier,
        } = components;

        let background = BackgroundTasks::new();
        let coupons = Arc::new(CouponLedger::new(
            documents.clone(),
            coordination.clone(),
            &config.coupons,
        ));

        let services = Services {
            checkout: CheckoutService::new(
                documents.clone(),
                coordination.clone(),
                coupons.clone(),
                FeeEngine::new(&config.fees),
                notifier.clone(),
                &config.checkout,
            ),
            coupons,
            orders: OrderService::new(documents.clone(), notifier.clone()),
            delivery: DeliveryService::new(
                documents.clone(),
                coordination.clone(),
                notifier.clone(),
                &config.delivery,
            ),
            partners: PartnerService::new(documents.clone()),
            payments: PaymentService::new(
                documents.clone(),
                gateway,
                notifier.clone(),
                &config.payment,
            ),
            reviews: ReviewService::new(documents, background.clone()),
        };

        let rate_limiters = RateLimiters::from_config(&config.rate_limit, coordination);

        Self {
            config,
            services,
            rate_limiters,
            notifier,
            background,
            sqlite: None,
            memory_coordination: None,
            started_at: Mutex::new(None),
            running: Mutex::new(false),
            tasks: Mutex::new(Vec::new()),
        }
    }

    /// Loads the config file and connects every store.
    pub async fn from_config_path(path: &str) -> Result<Self, AppError> {
        let config = Config::load(path)?;

        let sqlite = SqliteDocumentStore::new(SqliteStoreConfig::from(&config.storage)).await?;
        let sqlite = Arc::new(RetryingDocumentStore::new(
            sqlite,
            RetryPolicy::from(&config.storage.retry),
        ));

        let (coordination, memory_coordination) = connect_coordination(&config).await?;
        let gateway: Arc<dyn PaymentGateway> = Arc::new(HttpPaymentGateway::new(&config.payment)?);
        let notifier: Arc<dyn Notifier> = Arc::new(TracingNotifier::new());

        let mut app = Self::new(
            config,
            Components {
                documents: sqlite.clone(),
                coordination,
                gateway,
                notifier,
            },
        );
        app.sqlite = Some(sqlite);
        app.memory_coordination = memory_coordination;
        Ok(app)
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn services(&self) -> &Services {
        &self.services
    }

    pub fn rate_limiters(&self) -> &RateLimiters {
        &self.rate_limiters
    }

    pub fn background(&self) -> &BackgroundTasks {
        &self.background
    }

    /// Deadline for one request, from `checkout.request_timeout`.
    pub fn request_deadline(&self) -> Deadline {
        Deadline::after(self.config.checkout.request_timeout)
    }

    /// Checkout endpoint: rate limit, place the order, wrap the result.
    ///
    /// New orders answer 201, idempotent replays 200. The order travels as the
    /// exact body cached for replay, so both answers carry the same bytes.
    pub async fn handle_checkout(
        &self,
        client_key: &str,
        customer_id: &str,
        request: &PlaceOrderRequest,
        idempotency_token: Option<&str>,
    ) -> Reply<Box<RawValue>> {
        let admission = match self.rate_limiters.check(Tier::Checkout, client_key).await {
            Ok(admission) => admission,
            Err(e) => {
                let (status, body) = failure(&e);
                return Reply {
                    status,
                    headers: e.admission.headers(),
                    body,
                };
            }
        };

        let result = self
            .services
            .checkout
            .place_order(customer_id, request, idempotency_token, self.request_deadline())
            .await;

        let (status, body, mut headers) = match result {
            Ok(outcome) => {
                let status = if outcome.replayed { 200 } else { 201 };
                match RawValue::from_string(outcome.body) {
                    Ok(raw) => (status, ApiResponse::ok(raw), Vec::new()),
                    Err(e) => {
                        let (status, body) = failure(&StoreError::from(e));
                        (status, body, Vec::new())
                    }
                }
            }
            Err(e) => {
                let (status, body) = failure(&e);
                (status, body, error_headers(&e))
            }
        };
        headers.extend(admission.headers());

        Reply {
            status,
            headers,
            body,
        }
    }

    /// Starts periodic maintenance tasks.
    pub async fn start(&self) -> Result<(), AppError> {
        {
            let mut running = self.running.lock().await;
            if *running {
                return Err(AppError::AlreadyRunning);
            }
            *running = true;
        }
        *self.started_at.lock().await = Some(Instant::now());

        let sweep_interval = self.config.rate_limit.sweep_interval;
        let mut tasks = self.tasks.lock().await;

        if let Some(handle) = self.rate_limiters.spawn_sweeper(sweep_interval) {
            tasks.push(handle);
        }
        if let Some(store) = self.memory_coordination.clone() {
            tasks.push(spawn_purge(store, sweep_interval));
        }

        info!(
            name = %self.config.app.name,
            env = %self.config.app.env,
            strategy = ?self.config.rate_limit.strategy,
            coordination = ?self.config.coordination.backend,
            "Service started"
        );
        Ok(())
    }

    /// Runs until ctrl-c, then shuts down.
    pub async fn run(&self) -> Result<(), AppError> {
        self.start().await?;
        tokio::signal::ctrl_c().await?;
        info!("Shutdown signal received");
        self.stop().await;
        Ok(())
    }

    /// Stops maintenance, drains background jobs and closes stores.
    pub async fn stop(&self) {
        {
            let mut running = self.running.lock().await;
            if !*running {
                return;
            }
            *running = false;
        }

        info!("Stopping service...");

        for handle in self.tasks.lock().await.drain(..) {
            handle.abort();
        }

        if tokio::time::timeout(DRAIN_TIMEOUT, self.background.wait_idle())
            .await
            .is_err()
        {
            warn!(
                in_flight = self.background.in_flight(),
                "Background tasks still running at shutdown"
            );
        }

        if let Err(e) = self.notifier.close().await {
            warn!(error = %e, "Failed to flush notifications");
        }

        if let Some(ref sqlite) = self.sqlite {
            sqlite.inner().close().await;
        }

        info!(uptime = ?self.uptime().await, "Service stopped");
    }

    pub async fn is_running(&self) -> bool {
        *self.running.lock().await
    }

    pub async fn uptime(&self) -> Duration {
        self.started_at
            .lock()
            .await
            .map(|s| s.elapsed())
            .unwrap_or(Duration::ZERO)
    }
}

type Coordination = (
    Arc<dyn CoordinationStore>,
    Option<Arc<InMemoryCoordinationStore>>,
);

async fn connect_coordination(config: &Config) -> Result<Coordination, AppError> {
    match config.coordination.backend {
        CoordinationBackend::Memory => {
            let store = Arc::new(InMemoryCoordinationStore::new());
            Ok((store.clone(), Some(store)))
        }
        #[cfg(feature = "redis-store")]
        CoordinationBackend::Redis => {
            let store =
                crate::coordination::RedisCoordinationStore::connect(&config.coordination.redis_url)
                    .await?;
            Ok((Arc::new(store), None))
        }
        #[cfg(not(feature = "redis-store"))]
        CoordinationBackend::Redis => Err(AppError::RedisUnsupported),
    }
}

fn spawn_purge(store: Arc<InMemoryCoordinationStore>, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval.max(Duration::from_secs(1)));
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let before = store.len();
            store.purge_expired();
            let purged = before.saturating_sub(store.len());
            if purged > 0 {
                debug!(purged, "Purged expired coordination keys");
            }
        }
    })
}
