//! EmailJob - the payload stored in the email queue

use job_queue::QueueJob;
use serde::Serialize;

use crate::models::{mask_email, EmailMessage};

/// One outbound email waiting in the queue.
#[derive(Debug, Clone)]
pub struct EmailJob {
    /// What produced the email, e.g. `contact_admin` or `direct`
    pub label: String,
    pub message: EmailMessage,
}

impl EmailJob {
    pub fn new(label: impl Into<String>, message: EmailMessage) -> Self {
        Self {
            label: label.into(),
            message,
        }
    }
}

/// Status-endpoint view of a queued email; the recipient is masked.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct EmailJobSummary {
    pub label: String,
    pub to: String,
    pub subject: String,
}

impl QueueJob for EmailJob {
    type Summary = EmailJobSummary;

    fn summary(&self) -> EmailJobSummary {
        EmailJobSummary {
            label: self.label.clone(),
            to: mask_email(&self.message.to),
            subject: self.message.subject.clone(),
        }
    }
}
