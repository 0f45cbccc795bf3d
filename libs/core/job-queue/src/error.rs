//! Job error types and error categorization
//!
//! Errors are categorized to determine retry behavior:
//! - **Transient**: Temporary failures, rescheduled with backoff
//! - **Permanent**: Unrecoverable errors, finalized on the first attempt
//! - **RateLimited**: Downstream asked us to slow down, rescheduled with backoff

use thiserror::Error;

use crate::job::JobId;

/// Category of error for determining retry behavior
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Temporary failure - retry with backoff
    Transient,
    /// Unrecoverable error - fail the job immediately
    Permanent,
    /// Rate limit hit - retry with backoff, never terminal on its own
    RateLimited,
}

impl ErrorCategory {
    /// Whether a failure in this category may be attempted again
    pub fn is_retryable(&self) -> bool {
        !matches!(self, ErrorCategory::Permanent)
    }

    /// Label used for metrics and logs
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCategory::Transient => "transient",
            ErrorCategory::Permanent => "permanent",
            ErrorCategory::RateLimited => "rate_limited",
        }
    }
}

/// Failure of a single job attempt
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum JobError {
    /// Processor reported a failure
    #[error("{message}")]
    Processing {
        message: String,
        category: ErrorCategory,
        /// Optional machine-readable code set by the processor
        code: Option<String>,
    },

    /// Attempt did not finish within the configured timeout
    #[error("Job timed out after {0} ms")]
    Timeout(u64),
}

impl JobError {
    /// Create a transient processing error
    pub fn transient(message: impl Into<String>) -> Self {
        JobError::Processing {
            message: message.into(),
            category: ErrorCategory::Transient,
            code: None,
        }
    }

    /// Create a permanent processing error
    pub fn permanent(message: impl Into<String>) -> Self {
        JobError::Processing {
            message: message.into(),
            category: ErrorCategory::Permanent,
            code: None,
        }
    }

    /// Create a rate limited processing error
    pub fn rate_limited(message: impl Into<String>) -> Self {
        JobError::Processing {
            message: message.into(),
            category: ErrorCategory::RateLimited,
            code: None,
        }
    }

    /// Attach a machine-readable code to a processing error
    pub fn with_code(mut self, new_code: impl Into<String>) -> Self {
        if let JobError::Processing { code, .. } = &mut self {
            *code = Some(new_code.into());
        }
        self
    }

    /// Code attached by the processor, if any
    pub fn code(&self) -> Option<&str> {
        match self {
            JobError::Processing { code, .. } => code.as_deref(),
            _ => None,
        }
    }

    /// Get the error category
    pub fn category(&self) -> ErrorCategory {
        match self {
            JobError::Processing { category, .. } => *category,
            JobError::Timeout(_) => ErrorCategory::Transient,
        }
    }

    /// Whether the queue may schedule another attempt
    pub fn is_retryable(&self) -> bool {
        self.category().is_retryable()
    }
}

/// Errors surfaced by the queue API itself
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QueueError {
    /// The job was dropped by `clear()` before it resolved
    #[error("Job {0} was abandoned before completion")]
    Abandoned(JobId),
}
