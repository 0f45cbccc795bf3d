//! SMTP email provider using lettre

use async_trait::async_trait;
use lettre::{
    message::{header::ContentType, Mailbox, MultiPart, SinglePart},
    transport::smtp::{authentication::Credentials, Error as SmtpError},
    Address, AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use tracing::info;
use uuid::Uuid;

use super::EmailProvider;
use crate::config::SmtpConfig;
use crate::error::{EmailError, EmailResult};
use crate::models::{mask_email, EmailMessage, SentEmail};

/// SMTP email provider
///
/// An unconfigured provider can still be built; it reports itself through
/// [`EmailProvider::validate_configuration`] and never opens a connection.
pub struct SmtpProvider {
    transport: Option<AsyncSmtpTransport<Tokio1Executor>>,
    config: SmtpConfig,
}

impl SmtpProvider {
    /// Create a new SMTP provider
    pub fn new(config: SmtpConfig) -> EmailResult<Self> {
        let transport = if config.is_configured() {
            Some(build_transport(&config)?)
        } else {
            None
        };

        Ok(Self { transport, config })
    }

    /// Provider for Mailpit/MailHog on `host:port` (local development)
    pub fn mailpit(host: impl Into<String>, port: u16) -> EmailResult<Self> {
        Self::new(SmtpConfig::local(host, port))
    }

    pub fn config(&self) -> &SmtpConfig {
        &self.config
    }

    fn transport(&self) -> EmailResult<&AsyncSmtpTransport<Tokio1Executor>> {
        self.transport
            .as_ref()
            .ok_or_else(|| EmailError::Configuration("SMTP host or sender address not set".into()))
    }

    /// Build the MIME message along with the Message-ID it carries.
    fn build_message(&self, email: &EmailMessage) -> EmailResult<(Message, String)> {
        let from = Mailbox::new(
            Some(self.config.from_name.clone()),
            self.config
                .from_address
                .parse::<Address>()
                .map_err(|e| EmailError::Configuration(format!("invalid from address: {e}")))?,
        );

        let to_address = email
            .to
            .parse::<Address>()
            .map_err(|e| EmailError::Validation(format!("invalid recipient address: {e}")))?;
        let to = Mailbox::new(email.to_name.clone(), to_address);

        let message_id = format!("<{}@{}>", Uuid::new_v4(), self.sender_domain());
        let mut builder = Message::builder()
            .from(from)
            .to(to)
            .subject(&email.subject)
            .message_id(Some(message_id.clone()));

        if let Some(reply_to) = &email.reply_to {
            let reply_to = reply_to
                .parse::<Mailbox>()
                .map_err(|e| EmailError::Validation(format!("invalid reply-to address: {e}")))?;
            builder = builder.reply_to(reply_to);
        }

        let built = match (&email.text, &email.html) {
            (Some(text), Some(html)) => builder.multipart(
                MultiPart::alternative()
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_PLAIN)
                            .body(text.clone()),
                    )
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_HTML)
                            .body(html.clone()),
                    ),
            ),
            (Some(text), None) => builder.header(ContentType::TEXT_PLAIN).body(text.clone()),
            (None, Some(html)) => builder.header(ContentType::TEXT_HTML).body(html.clone()),
            (None, None) => {
                return Err(EmailError::Validation(
                    "email must have either text or HTML body".into(),
                ));
            }
        };

        let message =
            built.map_err(|e| EmailError::Validation(format!("failed to build message: {e}")))?;
        Ok((message, message_id))
    }

    fn sender_domain(&self) -> &str {
        self.config
            .from_address
            .split_once('@')
            .map(|(_, domain)| domain)
            .unwrap_or("localhost")
    }
}

fn build_transport(config: &SmtpConfig) -> EmailResult<AsyncSmtpTransport<Tokio1Executor>> {
    let mut builder = if config.use_tls {
        AsyncSmtpTransport::<Tokio1Executor>::relay(&config.host)
            .map_err(|e| EmailError::Configuration(format!("failed to create SMTP relay: {e}")))?
    } else {
        // Plain connection for Mailpit/MailHog
        AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&config.host)
    };

    builder = builder.port(config.port).timeout(Some(config.timeout));

    if let Some((username, password)) = config.credentials() {
        builder = builder.credentials(Credentials::new(username.to_string(), password.to_string()));
    }

    Ok(builder.build())
}

/// Map a lettre SMTP error onto an email error kind.
///
/// Permanent (5xx) rejections will fail the same way on retry; everything else
/// is treated as a connection problem.
fn map_smtp_error(err: SmtpError) -> EmailError {
    if err.is_permanent() {
        EmailError::Validation(format!("SMTP rejected the message: {err}"))
    } else {
        EmailError::Connection(format!("SMTP delivery failed: {err}"))
    }
}

#[async_trait]
impl EmailProvider for SmtpProvider {
    async fn send(&self, email: &EmailMessage) -> EmailResult<SentEmail> {
        let transport = self.transport()?;
        let (message, fallback_id) = self.build_message(email)?;

        let response = transport.send(message).await.map_err(map_smtp_error)?;

        let message_id = response
            .message()
            .next()
            .map(|s| s.to_string())
            .unwrap_or(fallback_id);

        info!(
            to = %mask_email(&email.to),
            subject = %email.subject,
            "Email sent via SMTP"
        );

        Ok(SentEmail { message_id })
    }

    async fn test_connection(&self) -> EmailResult<()> {
        let connected = self
            .transport()?
            .test_connection()
            .await
            .map_err(map_smtp_error)?;

        if connected {
            Ok(())
        } else {
            Err(EmailError::Connection("SMTP server did not accept NOOP".into()))
        }
    }

    fn validate_configuration(&self) -> bool {
        self.config.is_configured()
    }

    fn name(&self) -> &'static str {
        "smtp"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EmailErrorKind;

    #[tokio::test]
    async fn test_unconfigured_provider_refuses_to_send() {
        let provider = SmtpProvider::new(SmtpConfig::default()).unwrap();
        assert!(!provider.validate_configuration());

        let email = EmailMessage::new("user@example.com", "Hi").with_text("Body");
        let err = provider.send(&email).await.unwrap_err();
        assert_eq!(err.kind(), EmailErrorKind::Configuration);
    }

    #[test]
    fn test_build_multipart_message() {
        let provider = SmtpProvider::mailpit("localhost", 1025).unwrap();
        assert!(provider.validate_configuration());

        let email = EmailMessage::new("user@example.com", "Hi")
            .with_to_name("User")
            .with_text("Body")
            .with_html("<p>Body</p>")
            .with_reply_to("sender@example.com");

        let (message, message_id) = provider.build_message(&email).unwrap();
        assert!(message_id.ends_with("@localhost>"));
        let formatted = String::from_utf8(message.formatted()).unwrap();
        assert!(formatted.contains("Subject: Hi"));
        assert!(formatted.contains("Reply-To: sender@example.com"));
        assert!(formatted.contains("multipart/alternative"));
    }

    #[test]
    fn test_build_rejects_bad_recipient() {
        let provider = SmtpProvider::mailpit("localhost", 1025).unwrap();
        let email = EmailMessage::new("nope", "Hi").with_text("Body");

        let err = provider.build_message(&email).unwrap_err();
        assert_eq!(err.kind(), EmailErrorKind::Validation);
    }
}
