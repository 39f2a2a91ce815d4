//! Outbound email notifications.
//!
//! Notifiers never retry. Callers record the observed outcome and move on;
//! [`deliver`] turns every provider failure into an unsuccessful
//! [`DeliveryReport`] so nothing above this layer sees a delivery error.

pub mod mock;
pub mod smtp;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

use crate::config::SmtpConfig;
use crate::services::metrics::record_notification;

pub use mock::MockNotifier;
pub use smtp::SmtpNotifier;

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Send error: {0}")]
    SendFailed(String),

    #[error("Invalid recipient: {0}")]
    InvalidRecipient(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailMessage {
    pub to: String,
    pub subject: String,
    pub body_html: String,
    pub body_text: String,
}

/// Outcome of one send attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryReport {
    pub success: bool,
    pub message_id: Option<String>,
    pub error: Option<String>,
}

impl DeliveryReport {
    pub fn delivered(message_id: Option<String>) -> Self {
        Self {
            success: true,
            message_id,
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            message_id: None,
            error: Some(error.into()),
        }
    }
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, email: &EmailMessage) -> Result<DeliveryReport, ProviderError>;

    async fn health_check(&self) -> Result<(), ProviderError>;

    fn name(&self) -> &'static str;

    /// Release transport resources. Called once during service shutdown.
    async fn shutdown(&self) {}
}

/// Send `email` once and report the outcome. Provider errors are logged and
/// folded into the report.
pub async fn deliver(notifier: &dyn Notifier, email: &EmailMessage) -> DeliveryReport {
    let report = match notifier.send(email).await {
        Ok(report) => report,
        Err(e) => {
            tracing::warn!(
                provider = notifier.name(),
                to = %email.to,
                error = %e,
                "Notification delivery failed"
            );
            DeliveryReport::failed(e.to_string())
        }
    };

    record_notification(
        notifier.name(),
        if report.success { "delivered" } else { "failed" },
    );

    report
}

/// Build the configured notifier: SMTP when enabled, otherwise the logging
/// mock.
pub fn build_notifier(config: &SmtpConfig) -> Result<Arc<dyn Notifier>, ProviderError> {
    if config.enabled {
        tracing::info!(host = %config.host, port = config.port, "Using SMTP notifier");
        Ok(Arc::new(SmtpNotifier::new(config.clone())?))
    } else {
        tracing::warn!("SMTP disabled; notifications are logged only");
        Ok(Arc::new(MockNotifier::new()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn email() -> EmailMessage {
        EmailMessage {
            to: "tenant@example.com".to_string(),
            subject: "Hello".to_string(),
            body_html: "<p>Hello</p>".to_string(),
            body_text: "Hello".to_string(),
        }
    }

    #[tokio::test]
    async fn test_deliver_reports_success() {
        let notifier = MockNotifier::new();
        let report = deliver(&notifier, &email()).await;
        assert!(report.success);
        assert!(report.message_id.is_some());
        assert_eq!(notifier.sent_count(), 1);
    }

    #[tokio::test]
    async fn test_deliver_absorbs_provider_errors() {
        let notifier = MockNotifier::failing();
        let report = deliver(&notifier, &email()).await;
        assert!(!report.success);
        assert!(report.error.is_some());
        assert_eq!(notifier.sent_count(), 0);
    }
}
