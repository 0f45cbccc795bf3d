//! In-memory provider for tests and local runs without an SMTP server

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use super::EmailProvider;
use crate::error::{EmailError, EmailResult};
use crate::models::{EmailMessage, SentEmail};

/// Mock email provider that captures sent emails
///
/// Failures are scripted: queued errors are returned by the next sends in
/// order, and a `failing` provider returns its error on every send.
#[derive(Default)]
pub struct MockProvider {
    sent: Mutex<Vec<EmailMessage>>,
    scripted: Mutex<VecDeque<EmailError>>,
    always_fail: Option<EmailError>,
    configured: bool,
    delay: Option<Duration>,
    calls: AtomicUsize,
}

impl MockProvider {
    /// Create a new mock provider
    pub fn new() -> Self {
        Self {
            configured: true,
            ..Self::default()
        }
    }

    /// Create a mock provider that always fails with `error`
    pub fn failing(error: EmailError) -> Self {
        Self {
            always_fail: Some(error),
            ..Self::new()
        }
    }

    /// Mock that reports itself as unconfigured
    pub fn unconfigured() -> Self {
        Self::default()
    }

    /// Sleep this long inside every send
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Fail the next send with `error`
    pub fn fail_next(&self, error: EmailError) {
        self.scripted.lock().push_back(error);
    }

    /// Get all sent emails
    pub fn sent_emails(&self) -> Vec<EmailMessage> {
        self.sent.lock().clone()
    }

    pub fn sent_count(&self) -> usize {
        self.sent.lock().len()
    }

    /// Sends attempted, successful or not
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Check if an email was sent to a specific address
    pub fn was_sent_to(&self, address: &str) -> bool {
        self.sent.lock().iter().any(|m| m.to == address)
    }

    pub fn clear(&self) {
        self.sent.lock().clear();
    }
}

#[async_trait]
impl EmailProvider for MockProvider {
    async fn send(&self, message: &EmailMessage) -> EmailResult<SentEmail> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(error) = &self.always_fail {
            return Err(error.clone());
        }
        if let Some(error) = self.scripted.lock().pop_front() {
            return Err(error);
        }

        self.sent.lock().push(message.clone());
        Ok(SentEmail {
            message_id: format!("mock-{call}"),
        })
    }

    async fn test_connection(&self) -> EmailResult<()> {
        match &self.always_fail {
            Some(_) => Err(EmailError::Connection("mock connection refused".into())),
            None => Ok(()),
        }
    }

    fn validate_configuration(&self) -> bool {
        self.configured
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}
