//! Email dispatch library
//!
//! Renders transactional emails from templates and delivers them through an
//! in-process priority queue with rate limiting, retry backoff and a circuit
//! breaker in front of the provider.
//!
//! ## Components
//!
//! - **Templates**: Handlebars-based `TemplateEngine` with HTML-escaped and plain variants
//! - **Cache**: `TemplateCache`, an LRU of rendered emails keyed by template and data fingerprint
//! - **Transport**: `EmailTransport` wraps an `EmailProvider` (SMTP or mock) and a circuit breaker
//! - **Service**: `EmailService`, the public API for form notifications and status
//! - **Admin**: `AdminAction` commands for operators
//!
//! ## Usage
//!
//! ```ignore
//! use email::{EmailService, EmailServiceConfig, SmtpProvider, SmtpConfig};
//!
//! let provider = Arc::new(SmtpProvider::new(SmtpConfig::from_env()?)?);
//! let service = Arc::new(EmailService::new(EmailServiceConfig::from_env()?, provider)?);
//!
//! tokio::spawn({
//!     let service = service.clone();
//!     async move { service.run(shutdown_rx).await }
//! });
//!
//! let ids = service.send_contact_emails_async(&form, None)?;
//! ```

pub mod admin;
pub mod cache;
pub mod config;
pub mod error;
pub mod job;
pub mod models;
pub mod processor;
pub mod service;
pub mod templates;
pub mod transport;

// Re-export main types
pub use admin::AdminAction;
pub use cache::{CacheStats, TemplateCache};
pub use config::{BrandingConfig, EmailServiceConfig, SmtpConfig};
pub use error::{EmailError, EmailErrorKind, EmailResult, SendError};
pub use job::{EmailJob, EmailJobSummary};
pub use models::{
    ContactFormData, DroneInquiryData, EmailMessage, EnrollmentData, NewsletterData, SendResult,
    SentEmail,
};
pub use processor::TransportProcessor;
pub use service::{
    ContactQueueIds, EmailQueue, EmailService, EnrollmentQueueIds, InquiryQueueIds,
    NewsletterQueueIds, SendCallback, ServiceStatus,
};
pub use templates::{RenderedEmail, TemplateEngine, TemplateId};
pub use transport::{EmailProvider, EmailTransport, MockProvider, SmtpProvider};

// Queue types callers need alongside the service
pub use job_queue::{JobHandle, JobId, Priority};
