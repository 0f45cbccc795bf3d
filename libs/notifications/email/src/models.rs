use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::error::{EmailError, SendError};

/// Rendered message handed to the queue. Immutable once enqueued.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EmailMessage {
    /// Recipient email address
    pub to: String,
    /// Recipient display name
    pub to_name: Option<String>,
    pub subject: String,
    /// HTML body
    pub html: Option<String>,
    /// Plain text body
    pub text: Option<String>,
    /// Reply-to address
    pub reply_to: Option<String>,
}

impl EmailMessage {
    /// Create a new message with required fields
    pub fn new(to: impl Into<String>, subject: impl Into<String>) -> Self {
        Self {
            to: to.into(),
            to_name: None,
            subject: subject.into(),
            html: None,
            text: None,
            reply_to: None,
        }
    }

    /// Set HTML body
    pub fn with_html(mut self, html: impl Into<String>) -> Self {
        self.html = Some(html.into());
        self
    }

    /// Set plain text body
    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    pub fn with_to_name(mut self, name: impl Into<String>) -> Self {
        self.to_name = Some(name.into());
        self
    }

    pub fn with_reply_to(mut self, reply_to: impl Into<String>) -> Self {
        self.reply_to = Some(reply_to.into());
        self
    }

    /// Whether at least one non-empty body is present
    pub fn has_body(&self) -> bool {
        let present = |body: &Option<String>| body.as_deref().is_some_and(|b| !b.trim().is_empty());
        present(&self.html) || present(&self.text)
    }
}

/// Provider acknowledgement of an accepted message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentEmail {
    /// Provider-specific message ID
    pub message_id: String,
}

/// Outcome of one delivery, as reported to callbacks and status endpoints.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct SendResult {
    pub success: bool,
    pub message_id: Option<String>,
    pub error: Option<SendError>,
    /// Attempts made beyond the first
    pub retry_count: u32,
    pub timestamp: DateTime<Utc>,
    pub recipient: String,
    pub subject: String,
}

impl SendResult {
    pub fn sent(message: &EmailMessage, message_id: impl Into<String>, attempt: u32) -> Self {
        Self {
            success: true,
            message_id: Some(message_id.into()),
            error: None,
            retry_count: attempt.saturating_sub(1),
            timestamp: Utc::now(),
            recipient: message.to.clone(),
            subject: message.subject.clone(),
        }
    }

    pub fn failed(message: &EmailMessage, error: SendError, attempt: u32) -> Self {
        Self {
            success: false,
            message_id: None,
            error: Some(error),
            retry_count: attempt.saturating_sub(1),
            timestamp: Utc::now(),
            recipient: message.to.clone(),
            subject: message.subject.clone(),
        }
    }

    pub fn from_error(message: &EmailMessage, error: &EmailError, attempt: u32) -> Self {
        Self::failed(message, SendError::from(error), attempt)
    }
}

/// Contact form submission.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ContactFormData {
    #[validate(length(min = 1, max = 200))]
    pub name: String,
    #[validate(email)]
    pub email: String,
    pub phone: Option<String>,
    pub company: Option<String>,
    pub subject: Option<String>,
    pub service: Option<String>,
    #[validate(length(min = 1, max = 5000))]
    pub message: String,
}

/// Drone services inquiry (quote request).
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct DroneInquiryData {
    #[validate(length(min = 1, max = 200))]
    pub name: String,
    #[validate(email)]
    pub email: String,
    pub phone: Option<String>,
    pub company: Option<String>,
    #[validate(length(min = 1))]
    pub service_type: String,
    pub location: Option<String>,
    pub project_date: Option<String>,
    pub budget: Option<String>,
    #[validate(length(min = 1, max = 5000))]
    pub details: String,
}

/// Training program enrollment.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct EnrollmentData {
    #[validate(length(min = 1, max = 200))]
    pub name: String,
    #[validate(email)]
    pub email: String,
    pub phone: Option<String>,
    #[validate(length(min = 1))]
    pub program_id: String,
    pub preferred_start: Option<String>,
    pub experience_level: Option<String>,
    pub message: Option<String>,
}

/// Newsletter signup.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct NewsletterData {
    #[validate(email)]
    pub email: String,
    pub name: Option<String>,
    #[serde(default)]
    pub interests: Vec<String>,
}

/// Mask an address for logs and status output: `jane@example.com` → `j***@example.com`.
pub fn mask_email(address: &str) -> String {
    match address.split_once('@') {
        Some((local, domain)) => {
            let first = local.chars().next().map(String::from).unwrap_or_default();
            format!("{first}***@{domain}")
        }
        None => "***".to_string(),
    }
}
