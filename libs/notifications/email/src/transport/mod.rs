//! Email transport: one provider behind a circuit breaker.
//!
//! [`EmailTransport::send_email`] makes exactly one delivery attempt. Retrying
//! is the queue's job.

pub mod mock;
pub mod smtp;

pub use mock::MockProvider;
pub use smtp::SmtpProvider;

use async_trait::async_trait;
use job_queue::{CircuitBreaker, CircuitBreakerConfig, CircuitSnapshot};
use lettre::message::Mailbox;
use metrics::counter;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::error::{EmailError, EmailResult};
use crate::models::{mask_email, EmailMessage, SendResult, SentEmail};

/// Trait for email providers
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait EmailProvider: Send + Sync {
    /// Deliver one message
    async fn send(&self, message: &EmailMessage) -> EmailResult<SentEmail>;

    /// Open a connection to the server without sending anything
    async fn test_connection(&self) -> EmailResult<()>;

    /// Whether the provider has what it needs to send. No network.
    fn validate_configuration(&self) -> bool;

    /// Get provider name
    fn name(&self) -> &'static str;
}

pub struct EmailTransport {
    provider: Arc<dyn EmailProvider>,
    breaker: CircuitBreaker,
}

impl EmailTransport {
    pub fn new(provider: Arc<dyn EmailProvider>, breaker: CircuitBreakerConfig) -> Self {
        Self {
            breaker: CircuitBreaker::new(provider.name(), breaker),
            provider,
        }
    }

    pub fn provider_name(&self) -> &'static str {
        self.provider.name()
    }

    pub fn validate_configuration(&self) -> bool {
        self.provider.validate_configuration()
    }

    /// Check the server connection. Failures are logged and reported as `false`.
    pub async fn test_connection(&self) -> bool {
        match self.provider.test_connection().await {
            Ok(()) => true,
            Err(e) => {
                warn!(provider = self.provider.name(), error = %e, "Connection test failed");
                false
            }
        }
    }

    /// One delivery attempt.
    ///
    /// An open circuit fails fast without touching the provider or the failure
    /// counter. Every other attempt is recorded on the breaker, including one
    /// abandoned mid-flight when the caller's deadline drops this future.
    pub async fn send_email(&self, message: &EmailMessage, attempt: u32) -> SendResult {
        let Some(permit) = self.breaker.try_acquire() else {
            counter!("email_transport_short_circuited_total").increment(1);
            return SendResult::from_error(
                message,
                &EmailError::Connection("circuit breaker open".to_string()),
                attempt,
            );
        };

        match self.deliver(message).await {
            Ok(sent) => {
                permit.success();
                counter!("email_transport_sends_total", "status" => "success").increment(1);
                debug!(
                    to = %mask_email(&message.to),
                    message_id = %sent.message_id,
                    attempt,
                    "Email delivered"
                );
                SendResult::sent(message, sent.message_id, attempt)
            }
            Err(e) => {
                permit.failure();
                counter!("email_transport_sends_total", "status" => "failure").increment(1);
                warn!(
                    to = %mask_email(&message.to),
                    kind = %e.kind(),
                    attempt,
                    error = %e,
                    "Email delivery failed"
                );
                SendResult::from_error(message, &e, attempt)
            }
        }
    }

    async fn deliver(&self, message: &EmailMessage) -> EmailResult<SentEmail> {
        if !self.provider.validate_configuration() {
            return Err(EmailError::Configuration(format!(
                "{} provider is not configured",
                self.provider.name()
            )));
        }
        validate_message(message)?;
        self.provider.send(message).await
    }

    pub fn circuit_state(&self) -> CircuitSnapshot {
        self.breaker.snapshot()
    }

    pub fn reset_circuit_breaker(&self) {
        self.breaker.reset();
    }
}

/// Check the recipient, subject and body before handing a message to a provider.
pub fn validate_message(message: &EmailMessage) -> EmailResult<()> {
    message
        .to
        .parse::<Mailbox>()
        .map_err(|e| EmailError::Validation(format!("invalid recipient address: {e}")))?;

    if message.subject.trim().is_empty() {
        return Err(EmailError::Validation("subject is empty".to_string()));
    }
    if !message.has_body() {
        return Err(EmailError::Validation(
            "email must have a text or HTML body".to_string(),
        ));
    }
    if let Some(reply_to) = &message.reply_to {
        reply_to
            .parse::<Mailbox>()
            .map_err(|e| EmailError::Validation(format!("invalid reply-to address: {e}")))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EmailErrorKind;
    use std::time::Duration;

    fn message() -> EmailMessage {
        EmailMessage::new("user@example.com", "Hello").with_text("Body")
    }

    fn configured_mock() -> MockEmailProvider {
        let mut provider = MockEmailProvider::new();
        provider.expect_name().return_const("mock");
        provider.expect_validate_configuration().return_const(true);
        provider
    }

    fn transport(provider: MockEmailProvider, threshold: u32) -> EmailTransport {
        EmailTransport::new(
            Arc::new(provider),
            CircuitBreakerConfig::default()
                .with_failure_threshold(threshold)
                .with_cool_down(Duration::from_secs(60)),
        )
    }

    #[tokio::test]
    async fn test_success_resets_failure_counter() {
        let mut provider = configured_mock();
        let mut seq = mockall::Sequence::new();
        provider
            .expect_send()
            .times(2)
            .in_sequence(&mut seq)
            .returning(|_| Err(EmailError::Connection("refused".into())));
        provider
            .expect_send()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| {
                Ok(SentEmail {
                    message_id: "abc".into(),
                })
            });
        let transport = transport(provider, 5);

        transport.send_email(&message(), 1).await;
        transport.send_email(&message(), 2).await;
        assert_eq!(transport.circuit_state().consecutive_failures, 2);

        let result = transport.send_email(&message(), 3).await;
        assert!(result.success);
        assert_eq!(result.message_id.as_deref(), Some("abc"));
        assert_eq!(result.retry_count, 2);
        assert_eq!(transport.circuit_state().consecutive_failures, 0);
    }

    #[tokio::test]
    async fn test_open_circuit_short_circuits_provider() {
        let mut provider = configured_mock();
        provider
            .expect_send()
            .times(3)
            .returning(|_| Err(EmailError::Connection("refused".into())));
        let transport = transport(provider, 3);

        for attempt in 1..=5 {
            let result = transport.send_email(&message(), attempt).await;
            assert!(!result.success);
        }

        let state = transport.circuit_state();
        assert!(state.open);
        assert_eq!(state.consecutive_failures, 3);

        let result = transport.send_email(&message(), 1).await;
        let error = result.error.unwrap();
        assert_eq!(error.kind, EmailErrorKind::Connection);
        assert!(error.message.contains("circuit breaker open"));
    }

    #[tokio::test]
    async fn test_reset_closes_circuit() {
        let mut provider = configured_mock();
        provider
            .expect_send()
            .returning(|_| Err(EmailError::Connection("refused".into())));
        let transport = transport(provider, 1);

        transport.send_email(&message(), 1).await;
        assert!(transport.circuit_state().open);

        transport.reset_circuit_breaker();
        let state = transport.circuit_state();
        assert!(!state.open);
        assert_eq!(state.consecutive_failures, 0);
    }

    #[tokio::test]
    async fn test_unconfigured_provider_is_configuration_error() {
        let mut provider = MockEmailProvider::new();
        provider.expect_name().return_const("mock");
        provider.expect_validate_configuration().return_const(false);
        provider.expect_send().never();
        let transport = transport(provider, 5);

        let result = transport.send_email(&message(), 1).await;
        let error = result.error.unwrap();
        assert_eq!(error.kind, EmailErrorKind::Configuration);
        assert!(!error.retryable);
        assert!(!transport.validate_configuration());
    }

    #[tokio::test]
    async fn test_invalid_message_never_reaches_provider() {
        let mut provider = configured_mock();
        provider.expect_send().never();
        let transport = transport(provider, 5);

        let bad_recipient = EmailMessage::new("not an address", "Hi").with_text("Body");
        let no_subject = EmailMessage::new("user@example.com", " ").with_text("Body");
        let no_body = EmailMessage::new("user@example.com", "Hi");

        for message in [bad_recipient, no_subject, no_body] {
            let error = transport.send_email(&message, 1).await.error.unwrap();
            assert_eq!(error.kind, EmailErrorKind::Validation);
            assert!(!error.retryable);
        }
    }

    #[tokio::test]
    async fn test_connection_failure_is_false() {
        let mut provider = configured_mock();
        provider
            .expect_test_connection()
            .returning(|| Err(EmailError::Connection("timed out".into())));
        let transport = transport(provider, 5);

        assert!(!transport.test_connection().await);
    }
}
