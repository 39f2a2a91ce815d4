//! Post-commit stock alerts.
//!
//! Stock writers enqueue a [`StockAlertJob`] with the variant's post-commit
//! stock. A single background worker evaluates each job and emails the
//! owning tenant. The queue is bounded; when it is full the job is dropped
//! with a warning so writers never wait on alert delivery.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::config::AlertConfig;
use crate::models::ProductVariant;
use crate::services::metrics::record_stock_alert;
use crate::services::notifier::{deliver, EmailMessage, Notifier};
use crate::services::store::Store;
use crate::services::templates::{render_stock_alert, StockAlertTemplateData};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StockAlertKind {
    OutOfStock,
    LowStock,
}

impl StockAlertKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StockAlertKind::OutOfStock => "out_of_stock",
            StockAlertKind::LowStock => "low_stock",
        }
    }
}

/// Decide which alert, if any, a stock level warrants. Out of stock wins
/// over low stock.
pub fn evaluate(stock: i32, threshold: i32) -> Option<StockAlertKind> {
    if stock == 0 {
        Some(StockAlertKind::OutOfStock)
    } else if stock > 0 && stock <= threshold {
        Some(StockAlertKind::LowStock)
    } else {
        None
    }
}

/// Snapshot of a variant after a committed stock write.
#[derive(Debug, Clone, PartialEq)]
pub struct StockAlertJob {
    pub tenant_id: Uuid,
    pub variant_id: Uuid,
    pub product_name: String,
    pub variant_name: String,
    pub barcode: Option<String>,
    pub stock: i32,
    pub threshold: i32,
}

impl StockAlertJob {
    pub fn for_variant(variant: &ProductVariant, stock: i32) -> Self {
        Self {
            tenant_id: variant.tenant_id,
            variant_id: variant.variant_id,
            product_name: variant.product_name.clone(),
            variant_name: variant.variant_name.clone(),
            barcode: variant.barcode.clone(),
            stock,
            threshold: variant.low_stock_threshold,
        }
    }
}

/// Sending half of the alert queue, handed to stock writers.
#[derive(Debug, Clone)]
pub struct StockAlertQueue {
    tx: mpsc::Sender<StockAlertJob>,
}

impl StockAlertQueue {
    /// Enqueue without waiting. Returns false when the job was dropped.
    pub fn enqueue(&self, job: StockAlertJob) -> bool {
        match self.tx.try_send(job) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(job)) => {
                tracing::warn!(
                    variant_id = %job.variant_id,
                    "Stock alert queue full, dropping alert"
                );
                record_stock_alert("none", "dropped");
                false
            }
            Err(mpsc::error::TrySendError::Closed(job)) => {
                tracing::warn!(
                    variant_id = %job.variant_id,
                    "Stock alert worker stopped, dropping alert"
                );
                record_stock_alert("none", "dropped");
                false
            }
        }
    }
}

/// Owns the alert queue and its worker task.
pub struct StockAlertService {
    dispatcher: Arc<AlertDispatcher>,
    tx: mpsc::Sender<StockAlertJob>,
    rx: Mutex<Option<mpsc::Receiver<StockAlertJob>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
    shutdown_token: CancellationToken,
}

impl StockAlertService {
    pub fn new(config: &AlertConfig, store: Arc<dyn Store>, notifier: Arc<dyn Notifier>) -> Self {
        let (tx, rx) = mpsc::channel(config.queue_size.max(1));

        Self {
            dispatcher: Arc::new(AlertDispatcher {
                store,
                notifier,
                timeout: Duration::from_secs(config.dispatch_timeout_secs),
            }),
            tx,
            rx: Mutex::new(Some(rx)),
            worker: Mutex::new(None),
            shutdown_token: CancellationToken::new(),
        }
    }

    pub fn queue(&self) -> StockAlertQueue {
        StockAlertQueue {
            tx: self.tx.clone(),
        }
    }

    /// Spawn the worker. Later calls are no-ops.
    pub async fn start(&self) {
        let Some(mut rx) = self.rx.lock().await.take() else {
            return;
        };

        let dispatcher = self.dispatcher.clone();
        let shutdown = self.shutdown_token.clone();

        tracing::info!("Starting stock alert worker");

        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => {
                        // Alerts already queued still go out.
                        while let Ok(job) = rx.try_recv() {
                            dispatcher.dispatch_with_timeout(job).await;
                        }
                        tracing::info!("Stock alert worker shutting down");
                        break;
                    }
                    job = rx.recv() => {
                        match job {
                            Some(job) => dispatcher.dispatch_with_timeout(job).await,
                            None => {
                                tracing::info!("Stock alert queue closed, worker exiting");
                                break;
                            }
                        }
                    }
                }
            }
        });

        *self.worker.lock().await = Some(handle);
    }

    /// Stop the worker after it flushes queued jobs.
    pub async fn shutdown(&self) {
        tracing::info!("Initiating stock alert worker shutdown");
        self.shutdown_token.cancel();

        if let Some(handle) = self.worker.lock().await.take() {
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "Stock alert worker panicked");
            }
        }
    }
}

struct AlertDispatcher {
    store: Arc<dyn Store>,
    notifier: Arc<dyn Notifier>,
    timeout: Duration,
}

impl AlertDispatcher {
    async fn dispatch_with_timeout(&self, job: StockAlertJob) {
        let variant_id = job.variant_id;
        if tokio::time::timeout(self.timeout, self.dispatch(job))
            .await
            .is_err()
        {
            tracing::warn!(variant_id = %variant_id, "Stock alert dispatch timed out");
            record_stock_alert("unknown", "timeout");
        }
    }

    async fn dispatch(&self, job: StockAlertJob) {
        let Some(kind) = evaluate(job.stock, job.threshold) else {
            return;
        };

        let tenant = match self.store.get_tenant(job.tenant_id).await {
            Ok(Some(tenant)) => tenant,
            Ok(None) => {
                tracing::warn!(tenant_id = %job.tenant_id, "Stock alert for unknown tenant");
                record_stock_alert(kind.as_str(), "skipped");
                return;
            }
            Err(e) => {
                tracing::error!(tenant_id = %job.tenant_id, error = %e, "Failed to load tenant for stock alert");
                record_stock_alert(kind.as_str(), "failed");
                return;
            }
        };

        if tenant.contact_email.trim().is_empty() {
            tracing::warn!(tenant_id = %tenant.tenant_id, "Tenant has no contact email");
            record_stock_alert(kind.as_str(), "skipped");
            return;
        }

        let rendered = render_stock_alert(&StockAlertTemplateData {
            tenant_name: &tenant.business_name,
            product_name: &job.product_name,
            variant_name: &job.variant_name,
            barcode: job.barcode.as_deref(),
            stock: job.stock,
            threshold: job.threshold,
            kind,
        });

        let report = deliver(
            self.notifier.as_ref(),
            &EmailMessage {
                to: tenant.contact_email.clone(),
                subject: rendered.subject,
                body_html: rendered.html,
                body_text: rendered.text,
            },
        )
        .await;

        tracing::info!(
            tenant_id = %job.tenant_id,
            variant_id = %job.variant_id,
            kind = kind.as_str(),
            stock = job.stock,
            delivered = report.success,
            "Stock alert processed"
        );
        record_stock_alert(
            kind.as_str(),
            if report.success { "sent" } else { "failed" },
        );
    }
}
