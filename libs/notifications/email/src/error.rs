//! Error types for the email subsystem.
//!
//! Every failure maps onto an [`EmailErrorKind`], which decides whether the
//! queue may try again:
//! - **Configuration**: host or sender missing; not retryable
//! - **Connection**: network or transient SMTP failure; retryable
//! - **Validation**: malformed recipient, subject or body; not retryable
//! - **RateLimit**: budget exceeded; deferred, never terminal on its own
//! - **Unknown**: anything else; retried with the normal attempt cap

use core_config::ConfigError;
use job_queue::{ErrorCategory, JobError};
use serde::Serialize;
use strum::{AsRefStr, Display, EnumString};
use thiserror::Error;

/// Result type for email operations.
pub type EmailResult<T> = Result<T, EmailError>;

/// Failure kind, shared by errors and [`SendError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[derive(Display, AsRefStr, EnumString)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum EmailErrorKind {
    Configuration,
    Connection,
    Validation,
    RateLimit,
    Unknown,
}

impl EmailErrorKind {
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            EmailErrorKind::Connection | EmailErrorKind::RateLimit | EmailErrorKind::Unknown
        )
    }

    /// Queue error category for this kind.
    pub fn category(&self) -> ErrorCategory {
        match self {
            EmailErrorKind::Configuration | EmailErrorKind::Validation => ErrorCategory::Permanent,
            EmailErrorKind::RateLimit => ErrorCategory::RateLimited,
            EmailErrorKind::Connection | EmailErrorKind::Unknown => ErrorCategory::Transient,
        }
    }
}

/// Errors that can occur in the email subsystem.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EmailError {
    /// Render input is missing a required field or failed validation
    #[error("Invalid template input: {0}")]
    InvalidTemplateInput(String),

    /// Template could not be registered or rendered
    #[error("Template error: {0}")]
    Template(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Rate limited: {0}")]
    RateLimit(String),

    /// Admin action name not recognized
    #[error("Unknown admin action: {0}")]
    UnknownAction(String),

    #[error("Unexpected error: {0}")]
    Unknown(String),
}

impl EmailError {
    pub fn kind(&self) -> EmailErrorKind {
        match self {
            EmailError::InvalidTemplateInput(_)
            | EmailError::Template(_)
            | EmailError::Validation(_)
            | EmailError::UnknownAction(_) => EmailErrorKind::Validation,
            EmailError::Configuration(_) => EmailErrorKind::Configuration,
            EmailError::Connection(_) => EmailErrorKind::Connection,
            EmailError::RateLimit(_) => EmailErrorKind::RateLimit,
            EmailError::Unknown(_) => EmailErrorKind::Unknown,
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.kind().is_retryable()
    }
}

impl From<ConfigError> for EmailError {
    fn from(err: ConfigError) -> Self {
        Self::Configuration(err.to_string())
    }
}

impl From<validator::ValidationErrors> for EmailError {
    fn from(err: validator::ValidationErrors) -> Self {
        Self::InvalidTemplateInput(err.to_string())
    }
}

impl From<handlebars::RenderError> for EmailError {
    fn from(err: handlebars::RenderError) -> Self {
        Self::Template(err.to_string())
    }
}

impl From<handlebars::TemplateError> for EmailError {
    fn from(err: handlebars::TemplateError) -> Self {
        Self::Template(err.to_string())
    }
}

/// Error carried by a failed [`SendResult`](crate::models::SendResult).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SendError {
    pub kind: EmailErrorKind,
    pub message: String,
    pub retryable: bool,
}

impl From<&EmailError> for SendError {
    fn from(err: &EmailError) -> Self {
        Self {
            kind: err.kind(),
            message: err.to_string(),
            retryable: err.is_retryable(),
        }
    }
}

impl SendError {
    /// Queue error for this failure; the kind travels as the error code.
    pub fn to_job_error(&self) -> JobError {
        let error = match self.kind.category() {
            ErrorCategory::Permanent => JobError::permanent(self.message.clone()),
            ErrorCategory::RateLimited => JobError::rate_limited(self.message.clone()),
            ErrorCategory::Transient => JobError::transient(self.message.clone()),
        };
        error.with_code(self.kind.as_ref())
    }

    /// Rebuild a send error from a terminal queue error.
    pub fn from_job_error(err: &JobError) -> Self {
        let kind = match err {
            JobError::Timeout(_) => EmailErrorKind::Connection,
            JobError::Processing { .. } => err
                .code()
                .and_then(|code| code.parse().ok())
                .unwrap_or(EmailErrorKind::Unknown),
        };

        Self {
            kind,
            message: err.to_string(),
            retryable: kind.is_retryable(),
        }
    }
}
