//! Send one test email through the full pipeline and wait for the result
//!
//! Run with: cargo run -p aero_email --bin send_test_email -- recipient@example.com
//!
//! Uses the same provider selection as the service (`APP_ENV`, `EMAIL_PROVIDER`,
//! `SMTP_*`), so in development it targets Mailpit/MailHog on localhost:1025.

use core_config::{Environment, FromEnv};
use email::{EmailMessage, EmailService, EmailServiceConfig, Priority};
use eyre::{Result, WrapErr, eyre};
use std::sync::Arc;
use tokio::sync::watch;

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let recipient = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "test@example.com".to_string());

    let environment = Environment::from_env();
    let provider = aero_email::build_provider(&environment)?;
    let config = EmailServiceConfig::from_env().wrap_err("Failed to load configuration")?;
    let service = Arc::new(EmailService::new(config, provider)?);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let runner = tokio::spawn({
        let service = service.clone();
        async move { service.run(shutdown_rx).await }
    });

    let message = EmailMessage::new(&recipient, "Test email from Aero")
        .with_text("Hello! This is a test email sent through the email queue.")
        .with_html("<h1>Hello!</h1><p>This is a test email sent through the email queue.</p>");

    println!("Sending test email to: {}", recipient);
    println!("Subject: {}", message.subject);

    let handle = service.send_email(message, Priority::High);
    println!("Queued with id {}", handle.id());

    let outcome = handle.outcome().await?;

    let _ = shutdown_tx.send(true);
    runner.await?;

    match outcome.result {
        Ok(result) => {
            println!(
                "Email sent after {} attempt(s), message id: {}",
                outcome.attempts,
                result.message_id.unwrap_or_default()
            );
            Ok(())
        }
        Err(e) => Err(eyre!("Email failed after {} attempt(s): {}", outcome.attempts, e)),
    }
}
