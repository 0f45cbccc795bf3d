//! EmailService - the public API of the email subsystem.
//!
//! Form senders render every email through the template cache before anything
//! is enqueued, so a validation or render error is returned synchronously and
//! leaves the queue untouched. Delivery errors never surface here; they reach
//! callers through callbacks, handles and the status views.

use job_queue::{
    CircuitSnapshot, JobHandle, JobId, JobOutcome, JobQueue, MetricsSnapshot, Priority,
    QueueStatus, QueuedJobView,
};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info};

use crate::cache::{CacheStats, TemplateCache};
use crate::config::EmailServiceConfig;
use crate::error::{EmailResult, SendError};
use crate::job::{EmailJob, EmailJobSummary};
use crate::models::{
    mask_email, ContactFormData, DroneInquiryData, EmailMessage, EnrollmentData, NewsletterData,
    SendResult,
};
use crate::processor::TransportProcessor;
use crate::templates::{context, RenderedEmail, TemplateEngine, TemplateId};
use crate::transport::{EmailProvider, EmailTransport};

/// Called once with the terminal result of each queued email.
pub type SendCallback = Arc<dyn Fn(SendResult) + Send + Sync>;

/// Queue type used by the service.
pub type EmailQueue = JobQueue<EmailJob, TransportProcessor>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ContactQueueIds {
    pub admin_queue_id: JobId,
    pub customer_queue_id: JobId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct InquiryQueueIds {
    pub admin_queue_id: JobId,
    pub customer_queue_id: JobId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct EnrollmentQueueIds {
    pub admin_queue_id: JobId,
    pub student_queue_id: JobId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct NewsletterQueueIds {
    pub welcome_queue_id: JobId,
    /// Set only when admin notifications for signups are enabled
    pub admin_queue_id: Option<JobId>,
}

/// Combined health view for the `/status` endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct ServiceStatus {
    pub configured: bool,
    pub provider: &'static str,
    pub circuit_breaker: CircuitSnapshot,
    pub queue: QueueStatus,
    pub templates: CacheStats,
}

/// Email service: templates, cache, transport and queue behind one API.
///
/// Construct once and share through an `Arc`; spawn [`EmailService::run`] to
/// start delivering.
pub struct EmailService {
    config: EmailServiceConfig,
    templates: TemplateCache,
    transport: Arc<EmailTransport>,
    queue: EmailQueue,
}

impl EmailService {
    pub fn new(config: EmailServiceConfig, provider: Arc<dyn EmailProvider>) -> EmailResult<Self> {
        let templates = TemplateCache::new(TemplateEngine::new()?, config.template_cache_size);
        let transport = Arc::new(EmailTransport::new(provider, config.breaker.clone()));
        let queue = JobQueue::new(
            config.queue.clone(),
            TransportProcessor::new(transport.clone()),
        );

        info!(
            provider = transport.provider_name(),
            configured = transport.validate_configuration(),
            cache_size = config.template_cache_size,
            "Email service created"
        );

        Ok(Self {
            config,
            templates,
            transport,
            queue,
        })
    }

    pub fn config(&self) -> &EmailServiceConfig {
        &self.config
    }

    pub fn transport(&self) -> &EmailTransport {
        &self.transport
    }

    pub fn templates(&self) -> &TemplateCache {
        &self.templates
    }

    pub fn queue(&self) -> &EmailQueue {
        &self.queue
    }

    /// Run the delivery loop until `shutdown` flips to `true`.
    pub async fn run(&self, shutdown: watch::Receiver<bool>) {
        self.queue.run(shutdown).await;
    }

    // ========================================================================
    // Sending
    // ========================================================================

    /// Queue a pre-rendered message. Returns immediately with the job id.
    pub fn send_email_async(
        &self,
        message: EmailMessage,
        priority: Priority,
        callback: Option<SendCallback>,
    ) -> JobId {
        self.enqueue("direct", message, priority, callback)
    }

    /// Queue a pre-rendered message and get a handle to await its outcome.
    pub fn send_email(&self, message: EmailMessage, priority: Priority) -> JobHandle<SendResult> {
        debug!(to = %mask_email(&message.to), %priority, "Queueing email with handle");
        self.queue.enqueue(EmailJob::new("direct", message), priority)
    }

    pub fn send_contact_emails_async(
        &self,
        form: &ContactFormData,
        callback: Option<SendCallback>,
    ) -> EmailResult<ContactQueueIds> {
        let data = context::contact(form, &self.config.branding)?;
        let admin = self.render(TemplateId::ContactAdmin, &data)?;
        let customer = self.render(TemplateId::ContactConfirmation, &data)?;

        Ok(ContactQueueIds {
            admin_queue_id: self.enqueue_admin(
                TemplateId::ContactAdmin,
                &admin,
                &form.email,
                callback.clone(),
            ),
            customer_queue_id: self.enqueue(
                TemplateId::ContactConfirmation.as_ref(),
                to_submitter(&customer, &form.email, Some(&form.name)),
                Priority::Normal,
                callback,
            ),
        })
    }

    pub fn send_drone_inquiry_emails_async(
        &self,
        form: &DroneInquiryData,
        callback: Option<SendCallback>,
    ) -> EmailResult<InquiryQueueIds> {
        let data = context::drone_inquiry(form, &self.config.branding)?;
        let admin = self.render(TemplateId::InquiryAdmin, &data)?;
        let customer = self.render(TemplateId::InquiryConfirmation, &data)?;

        Ok(InquiryQueueIds {
            admin_queue_id: self.enqueue_admin(
                TemplateId::InquiryAdmin,
                &admin,
                &form.email,
                callback.clone(),
            ),
            customer_queue_id: self.enqueue(
                TemplateId::InquiryConfirmation.as_ref(),
                to_submitter(&customer, &form.email, Some(&form.name)),
                Priority::Normal,
                callback,
            ),
        })
    }

    pub fn send_enrollment_emails_async(
        &self,
        form: &EnrollmentData,
        callback: Option<SendCallback>,
    ) -> EmailResult<EnrollmentQueueIds> {
        let data = context::enrollment(form, &self.config.branding)?;
        let admin = self.render(TemplateId::EnrollmentAdmin, &data)?;
        let student = self.render(TemplateId::EnrollmentConfirmation, &data)?;

        Ok(EnrollmentQueueIds {
            admin_queue_id: self.enqueue_admin(
                TemplateId::EnrollmentAdmin,
                &admin,
                &form.email,
                callback.clone(),
            ),
            student_queue_id: self.enqueue(
                TemplateId::EnrollmentConfirmation.as_ref(),
                to_submitter(&student, &form.email, Some(&form.name)),
                Priority::Normal,
                callback,
            ),
        })
    }

    /// Queue the welcome email, plus an admin copy when
    /// `notify_admin_on_newsletter` is set.
    pub fn send_newsletter_emails_async(
        &self,
        form: &NewsletterData,
        confirmation_url: &str,
        callback: Option<SendCallback>,
    ) -> EmailResult<NewsletterQueueIds> {
        let data = context::newsletter(form, confirmation_url, &self.config.branding)?;
        let welcome = self.render(TemplateId::NewsletterWelcome, &data)?;
        let admin = if self.config.notify_admin_on_newsletter {
            Some(self.render(TemplateId::NewsletterAdmin, &data)?)
        } else {
            None
        };

        let admin_queue_id = admin.map(|admin| {
            self.enqueue_admin(TemplateId::NewsletterAdmin, &admin, &form.email, callback.clone())
        });
        let welcome_queue_id = self.enqueue(
            TemplateId::NewsletterWelcome.as_ref(),
            to_submitter(&welcome, &form.email, form.name.as_deref()),
            Priority::Low,
            callback,
        );

        Ok(NewsletterQueueIds {
            welcome_queue_id,
            admin_queue_id,
        })
    }

    fn render(&self, id: TemplateId, data: &serde_json::Value) -> EmailResult<Arc<RenderedEmail>> {
        self.templates.render_cached(id, data)
    }

    /// Admin notifications go out first and reply straight to the submitter.
    fn enqueue_admin(
        &self,
        id: TemplateId,
        rendered: &RenderedEmail,
        submitter: &str,
        callback: Option<SendCallback>,
    ) -> JobId {
        let message = EmailMessage {
            to: self.config.branding.admin_email.clone(),
            to_name: None,
            subject: rendered.subject.clone(),
            html: Some(rendered.html.clone()),
            text: Some(rendered.text.clone()),
            reply_to: Some(submitter.to_string()),
        };
        self.enqueue(id.as_ref(), message, Priority::High, callback)
    }

    fn enqueue(
        &self,
        label: &str,
        message: EmailMessage,
        priority: Priority,
        callback: Option<SendCallback>,
    ) -> JobId {
        let job = EmailJob::new(label, message);
        let id = match callback {
            Some(callback) => {
                let message = job.message.clone();
                self.queue
                    .enqueue_with_callback(job, priority, move |outcome| {
                        callback(outcome_to_result(&message, outcome));
                    })
            }
            None => self.queue.enqueue_detached(job, priority),
        };
        debug!(job_id = %id, label, %priority, "Email queued");
        id
    }

    // ========================================================================
    // Observability
    // ========================================================================

    pub fn service_status(&self) -> ServiceStatus {
        ServiceStatus {
            configured: self.transport.validate_configuration(),
            provider: self.transport.provider_name(),
            circuit_breaker: self.transport.circuit_state(),
            queue: self.queue.status(),
            templates: self.templates.stats(),
        }
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.queue.metrics()
    }

    pub fn queue_status(&self) -> QueueStatus {
        self.queue.status()
    }

    /// Pending emails in dispatch order, recipients masked.
    pub fn queued_emails(&self) -> Vec<QueuedJobView<EmailJobSummary>> {
        self.queue.queued_jobs()
    }

    pub fn template_stats(&self) -> CacheStats {
        self.templates.stats()
    }
}

fn to_submitter(rendered: &RenderedEmail, to: &str, name: Option<&str>) -> EmailMessage {
    EmailMessage {
        to: to.to_string(),
        to_name: name.map(str::to_string),
        subject: rendered.subject.clone(),
        html: Some(rendered.html.clone()),
        text: Some(rendered.text.clone()),
        reply_to: None,
    }
}

/// Terminal queue outcome as a [`SendResult`].
pub fn outcome_to_result(message: &EmailMessage, outcome: JobOutcome<SendResult>) -> SendResult {
    match outcome.result {
        Ok(result) => result,
        Err(error) => {
            SendResult::failed(message, SendError::from_job_error(&error), outcome.attempts)
        }
    }
}
