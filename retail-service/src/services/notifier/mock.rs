use super::{DeliveryReport, EmailMessage, Notifier, ProviderError};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;

/// Number of accepted messages the outbox keeps.
pub const OUTBOX_CAPACITY: usize = 256;

/// Notifier that logs instead of sending. Used when SMTP is disabled and in
/// tests, where it keeps the most recent messages and can be told to fail.
#[derive(Debug, Default)]
pub struct MockNotifier {
    failing: AtomicBool,
    send_count: AtomicU64,
    outbox: Mutex<VecDeque<EmailMessage>>,
}

impl MockNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// A notifier whose every send fails.
    pub fn failing() -> Self {
        let notifier = Self::default();
        notifier.set_failing(true);
        notifier
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn sent_count(&self) -> u64 {
        self.send_count.load(Ordering::SeqCst)
    }

    /// The last [`OUTBOX_CAPACITY`] accepted messages, oldest first.
    pub fn sent_messages(&self) -> Vec<EmailMessage> {
        self.outbox
            .lock()
            .map(|outbox| outbox.iter().cloned().collect())
            .unwrap_or_default()
    }
}

#[async_trait]
impl Notifier for MockNotifier {
    async fn send(&self, email: &EmailMessage) -> Result<DeliveryReport, ProviderError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(ProviderError::SendFailed(
                "Mock notifier configured to fail".to_string(),
            ));
        }

        let count = self.send_count.fetch_add(1, Ordering::SeqCst) + 1;
        if let Ok(mut outbox) = self.outbox.lock() {
            if outbox.len() == OUTBOX_CAPACITY {
                outbox.pop_front();
            }
            outbox.push_back(email.clone());
        }

        tracing::info!(
            to = %email.to,
            subject = %email.subject,
            "[MOCK] Email would be sent"
        );

        Ok(DeliveryReport::delivered(Some(format!("mock-email-{}", count))))
    }

    async fn health_check(&self) -> Result<(), ProviderError> {
        Ok(())
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}
