//! Email Dispatch Service
//!
//! Hosts the email queue in-process and exposes its status and admin actions
//! over HTTP.
//!
//! ## Architecture
//!
//! ```text
//! EmailService (forms, direct sends)
//!   ↓ (renders through TemplateCache)
//! JobQueue<EmailJob, TransportProcessor>
//!   ↓ (priority, rate limit, retry/backoff)
//! EmailTransport (circuit breaker)
//!   ↓
//! SmtpProvider (lettre) / MockProvider
//! ```
//!
//! ## Features
//!
//! - Drain loop woken on enqueue, retry deadlines and a fallback poll
//! - Graceful shutdown on SIGINT/SIGTERM
//! - Status, queue and template cache endpoints
//! - Prometheus metrics
//! - Operator admin actions (`POST /admin/{action}`)

pub mod routes;

use core_config::{Environment, FromEnv, env_or_default, env_parse};
use email::{EmailProvider, EmailService, EmailServiceConfig, MockProvider, SmtpConfig, SmtpProvider};
use eyre::{Result, WrapErr};
use job_queue::init_metrics;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;
use tokio::sync::watch;
use tracing::{error, info, warn};

pub use routes::{AppState, router};

/// Pick the email provider.
///
/// `EMAIL_PROVIDER=mock` keeps everything in memory. Otherwise production
/// reads the full SMTP configuration and development targets Mailpit/MailHog.
pub fn build_provider(environment: &Environment) -> Result<Arc<dyn EmailProvider>> {
    if env_or_default("EMAIL_PROVIDER", "smtp").eq_ignore_ascii_case("mock") {
        info!("Using in-memory mock email provider");
        return Ok(Arc::new(MockProvider::new()));
    }

    let config = match environment {
        Environment::Production => {
            SmtpConfig::from_env().wrap_err("Failed to load SMTP configuration")?
        }
        Environment::Development => {
            let host = env_or_default("SMTP_HOST", "localhost");
            let port = env_parse("SMTP_PORT", 1025u16).wrap_err("Invalid SMTP_PORT")?;
            info!(%host, port, "Using SMTP provider for development (Mailpit/MailHog)");
            SmtpConfig::local(host, port)
        }
    };

    let provider = SmtpProvider::new(config).wrap_err("Failed to create SMTP provider")?;
    Ok(Arc::new(provider))
}

/// Run the email service
///
/// 1. Sets up structured logging (env-aware: JSON for prod, pretty for dev)
/// 2. Installs the Prometheus recorder
/// 3. Builds the email service from the environment
/// 4. Spawns the queue drain loop
/// 5. Serves HTTP until a shutdown signal, then stops the drain loop
///
/// # Errors
///
/// Returns an error if configuration is invalid, templates fail to compile,
/// or the HTTP listener cannot be bound.
pub async fn run() -> Result<()> {
    let environment = Environment::from_env();
    core_config::tracing::init_tracing(&environment);

    init_metrics();

    let name = env!("CARGO_PKG_NAME");
    let version = env!("CARGO_PKG_VERSION");
    info!(%name, %version, ?environment, "Starting email service");

    let port: u16 = env_parse("EMAIL_SERVICE_PORT", 8082).wrap_err("Invalid EMAIL_SERVICE_PORT")?;
    let config =
        EmailServiceConfig::from_env().wrap_err("Failed to load email service configuration")?;
    let provider = build_provider(&environment)?;

    let service = Arc::new(
        EmailService::new(config, provider).wrap_err("Failed to initialize email service")?,
    );
    if !service.transport().validate_configuration() {
        warn!("Email provider is not configured; queued emails will fail with a configuration error");
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let queue_task = tokio::spawn({
        let service = service.clone();
        async move { service.run(shutdown_rx).await }
    });

    let app = router(AppState::new(service.clone(), name, version));
    let addr = format!("0.0.0.0:{}", port);
    let listener = TcpListener::bind(&addr)
        .await
        .wrap_err_with(|| format!("Failed to bind HTTP server to {}", addr))?;
    info!(port = %port, "Status and admin server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            let _ = shutdown_tx.send(true);
        })
        .await
        .wrap_err("HTTP server failed")?;

    queue_task.await.wrap_err("Queue drain loop panicked")?;

    let status = service.queue_status();
    if status.queue_size > 0 {
        warn!(pending = status.queue_size, "Shutting down with undelivered emails");
    }
    info!("Email service stopped");
    Ok(())
}

/// Wait for a shutdown signal (SIGINT or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating shutdown...");
        },
        _ = terminate => {
            info!("Received SIGTERM, initiating shutdown...");
        },
    }
}
