//! Application startup and lifecycle management.

use crate::config::{BillingConfig, RetailConfig, StoreBackend};
use crate::handlers::{
    allocate_rental, checkout, get_sale, health_check, metrics_handler, readiness_check,
    record_rent_payment, rental_summary, run_reminders, update_stock,
};
use crate::services::{
    build_notifier, init_metrics, AccrualOptions, CheckoutService, Clock, InventoryService,
    MemoryStore, Notifier, PgStore, ReminderScheduler, RentalService, StockAlertQueue,
    StockAlertService, Store, SystemClock,
};
use axum::{
    middleware,
    routing::{get, post, put},
    Router,
};
use service_core::error::AppError;
use service_core::middleware::{http_trace_layer, request_id_middleware};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub checkout: Arc<CheckoutService>,
    pub rentals: Arc<RentalService>,
    pub inventory: Arc<InventoryService>,
    pub reminders: Arc<ReminderScheduler>,
}

impl AppState {
    pub fn new(
        store: Arc<dyn Store>,
        notifier: Arc<dyn Notifier>,
        clock: Arc<dyn Clock>,
        alerts: StockAlertQueue,
        billing: BillingConfig,
    ) -> Self {
        let options = AccrualOptions {
            grace_days: billing.grace_days,
        };

        Self {
            checkout: Arc::new(CheckoutService::new(
                store.clone(),
                clock.clone(),
                alerts.clone(),
            )),
            rentals: Arc::new(RentalService::new(store.clone(), clock.clone(), options)),
            inventory: Arc::new(InventoryService::new(store.clone(), clock.clone(), alerts)),
            reminders: Arc::new(ReminderScheduler::new(
                store.clone(),
                notifier,
                clock,
                options,
            )),
            store,
        }
    }
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/ready", get(readiness_check))
        .route("/metrics", get(metrics_handler))
        .route("/checkout", post(checkout))
        .route("/sales/:sale_id", get(get_sale))
        .route("/rentals", post(allocate_rental))
        .route("/rentals/:rental_id/summary", get(rental_summary))
        .route("/rentals/:rental_id/payments", post(record_rent_payment))
        .route("/variants/:variant_id/stock", put(update_stock))
        .route("/reminders/run", post(run_reminders))
        .layer(http_trace_layer())
        .layer(middleware::from_fn(request_id_middleware))
        .with_state(state)
}

/// Application container for managing server lifecycle.
pub struct Application {
    port: u16,
    listener: TcpListener,
    state: AppState,
    alerts: Arc<StockAlertService>,
    notifier: Arc<dyn Notifier>,
}

impl Application {
    /// Connect the store, start the stock alert worker and bind the listener.
    pub async fn build(config: RetailConfig) -> Result<Self, AppError> {
        init_metrics();

        let store: Arc<dyn Store> = match config.store {
            StoreBackend::Postgres => {
                let store = PgStore::connect(&config.database).await.map_err(|e| {
                    tracing::error!(error = %e, "Failed to connect to PostgreSQL");
                    e
                })?;
                store.run_migrations().await.map_err(|e| {
                    tracing::error!(error = %e, "Failed to run migrations");
                    e
                })?;
                Arc::new(store)
            }
            StoreBackend::Memory => {
                tracing::warn!("Using in-memory store; state is lost on restart");
                Arc::new(MemoryStore::new())
            }
        };

        let notifier = build_notifier(&config.smtp).map_err(|e| {
            AppError::ConfigError(anyhow::anyhow!("Failed to build notifier: {}", e))
        })?;

        let alerts = Arc::new(StockAlertService::new(
            &config.alerts,
            store.clone(),
            notifier.clone(),
        ));
        alerts.start().await;

        let state = AppState::new(
            store,
            notifier.clone(),
            Arc::new(SystemClock),
            alerts.queue(),
            config.billing,
        );

        let addr = SocketAddr::from(([0, 0, 0, 0], config.common.port));
        let listener = TcpListener::bind(addr).await.map_err(|e| {
            tracing::error!(error = %e, addr = %addr, "Failed to bind HTTP listener");
            AppError::from(e)
        })?;
        let port = listener.local_addr()?.port();

        tracing::info!(port = port, "Retail service listener bound");

        Ok(Self {
            port,
            listener,
            state,
            alerts,
            notifier,
        })
    }

    /// Get the port the server is listening on.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Serve until `shutdown` resolves, then stop the alert worker and the
    /// notifier.
    pub async fn run_until_stopped<F>(self, shutdown: F) -> std::io::Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let router = build_router(self.state);

        tracing::info!(
            service = "retail-service",
            version = env!("CARGO_PKG_VERSION"),
            port = self.port,
            "Service ready to accept connections"
        );

        let result = axum::serve(self.listener, router)
            .with_graceful_shutdown(shutdown)
            .await;

        self.alerts.shutdown().await;
        self.notifier.shutdown().await;

        if let Err(e) = result {
            tracing::error!(error = %e, "HTTP server error");
            return Err(std::io::Error::other(format!("HTTP server error: {}", e)));
        }

        Ok(())
    }
}
