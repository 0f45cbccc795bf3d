//! TransportProcessor - delivers queued emails through the transport

use async_trait::async_trait;
use job_queue::{JobError, JobProcessor};
use std::sync::Arc;
use tracing::debug;

use crate::error::{EmailErrorKind, SendError};
use crate::job::EmailJob;
use crate::models::SendResult;
use crate::transport::EmailTransport;

/// Queue processor making one transport attempt per call.
///
/// A failed [`SendResult`] becomes a [`JobError`] whose category follows the
/// error kind, so the queue retries connection failures and defers rate limits.
pub struct TransportProcessor {
    transport: Arc<EmailTransport>,
}

impl TransportProcessor {
    pub fn new(transport: Arc<EmailTransport>) -> Self {
        Self { transport }
    }

    pub fn transport(&self) -> &Arc<EmailTransport> {
        &self.transport
    }
}

#[async_trait]
impl JobProcessor<EmailJob> for TransportProcessor {
    type Output = SendResult;

    async fn process(&self, job: &EmailJob, attempt: u32) -> Result<SendResult, JobError> {
        let result = self.transport.send_email(&job.message, attempt).await;
        if result.success {
            return Ok(result);
        }

        let error = result.error.unwrap_or_else(|| SendError {
            kind: EmailErrorKind::Unknown,
            message: "send failed without an error".to_string(),
            retryable: true,
        });
        debug!(label = %job.label, attempt, kind = %error.kind, "Email attempt failed");
        Err(error.to_job_error())
    }

    fn name(&self) -> &'static str {
        "email-transport"
    }
}
