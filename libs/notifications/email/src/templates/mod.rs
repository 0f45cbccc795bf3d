//! Email template rendering with Handlebars
//!
//! This module provides:
//! - `TemplateId`: the fixed set of templates the service sends
//! - `TemplateEngine`: renders a template id and JSON data into subject, HTML and text
//! - `context`: builders that turn validated form payloads into template data
//! - `programs`: the training program catalog embedded in enrollment emails
//!
//! Two registries are used. The HTML registry keeps Handlebars' default HTML
//! escaping, so user input such as `<script>` renders as `&lt;script&gt;`. The
//! text registry (plain bodies and subjects) uses `no_escape`, so the same
//! input appears verbatim.

pub mod context;
pub mod programs;

use handlebars::Handlebars;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use strum::{AsRefStr, Display, EnumIter, EnumString, IntoEnumIterator};

use crate::error::{EmailError, EmailResult};

pub use programs::{program_info, ProgramInfo};

/// Templates known to the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[derive(Display, AsRefStr, EnumString, EnumIter)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum TemplateId {
    ContactAdmin,
    ContactConfirmation,
    InquiryAdmin,
    InquiryConfirmation,
    EnrollmentAdmin,
    EnrollmentConfirmation,
    NewsletterWelcome,
    NewsletterAdmin,
}

impl TemplateId {
    /// Fields that must be present and non-empty in the render data.
    pub fn required_fields(&self) -> &'static [&'static str] {
        match self {
            TemplateId::ContactAdmin | TemplateId::ContactConfirmation => {
                &["name", "email", "message"]
            }
            TemplateId::InquiryAdmin | TemplateId::InquiryConfirmation => {
                &["name", "email", "service_type", "details"]
            }
            TemplateId::EnrollmentAdmin | TemplateId::EnrollmentConfirmation => {
                &["name", "email", "program_id", "program"]
            }
            TemplateId::NewsletterWelcome => &["email", "confirmation_url"],
            TemplateId::NewsletterAdmin => &["email"],
        }
    }

    fn source(&self) -> TemplateSource {
        match self {
            TemplateId::ContactAdmin => TemplateSource {
                subject: "New contact form submission from {{name}}",
                text: CONTACT_ADMIN_TEXT,
                html: CONTACT_ADMIN_HTML,
            },
            TemplateId::ContactConfirmation => TemplateSource {
                subject: "Thanks for contacting {{brand.company_name}}",
                text: CONTACT_CONFIRMATION_TEXT,
                html: CONTACT_CONFIRMATION_HTML,
            },
            TemplateId::InquiryAdmin => TemplateSource {
                subject: "New {{service_type}} inquiry from {{name}}",
                text: INQUIRY_ADMIN_TEXT,
                html: INQUIRY_ADMIN_HTML,
            },
            TemplateId::InquiryConfirmation => TemplateSource {
                subject: "We received your {{service_type}} inquiry",
                text: INQUIRY_CONFIRMATION_TEXT,
                html: INQUIRY_CONFIRMATION_HTML,
            },
            TemplateId::EnrollmentAdmin => TemplateSource {
                subject: "New enrollment: {{program.name}} ({{name}})",
                text: ENROLLMENT_ADMIN_TEXT,
                html: ENROLLMENT_ADMIN_HTML,
            },
            TemplateId::EnrollmentConfirmation => TemplateSource {
                subject: "Your enrollment in {{program.name}}",
                text: ENROLLMENT_CONFIRMATION_TEXT,
                html: ENROLLMENT_CONFIRMATION_HTML,
            },
            TemplateId::NewsletterWelcome => TemplateSource {
                subject: "Welcome to the {{brand.company_name}} newsletter",
                text: NEWSLETTER_WELCOME_TEXT,
                html: NEWSLETTER_WELCOME_HTML,
            },
            TemplateId::NewsletterAdmin => TemplateSource {
                subject: "New newsletter subscriber: {{email}}",
                text: NEWSLETTER_ADMIN_TEXT,
                html: NEWSLETTER_ADMIN_HTML,
            },
        }
    }
}

struct TemplateSource {
    subject: &'static str,
    text: &'static str,
    html: &'static str,
}

/// Rendered email content
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RenderedEmail {
    pub subject: String,
    pub html: String,
    pub text: String,
}

/// Handlebars-based template engine
///
/// Supports:
/// - Variables: `{{name}}`, nested `{{brand.company_name}}`
/// - Conditionals: `{{#if phone}}...{{/if}}`
/// - Loops: `{{#each interests}}...{{/each}}`
pub struct TemplateEngine {
    html: Handlebars<'static>,
    plain: Handlebars<'static>,
}

impl TemplateEngine {
    /// Create an engine with every [`TemplateId`] registered
    pub fn new() -> EmailResult<Self> {
        let mut html = Handlebars::new();
        let mut plain = Handlebars::new();
        plain.register_escape_fn(handlebars::no_escape);

        html.register_partial("header", HTML_HEADER)?;
        html.register_partial("footer", HTML_FOOTER)?;
        plain.register_partial("footer", TEXT_FOOTER)?;

        for id in TemplateId::iter() {
            let source = id.source();
            plain.register_template_string(&subject_key(id), source.subject)?;
            plain.register_template_string(&text_key(id), source.text)?;
            html.register_template_string(&html_key(id), source.html)?;
        }

        Ok(Self { html, plain })
    }

    /// Render all three parts of a template.
    ///
    /// Either every part renders or an error is returned.
    pub fn render(&self, id: TemplateId, data: &Value) -> EmailResult<RenderedEmail> {
        check_required(id, data)?;

        let subject = self.plain.render(&subject_key(id), data)?;
        let text = self.plain.render(&text_key(id), data)?;
        let html = self.html.render(&html_key(id), data)?;

        Ok(RenderedEmail {
            subject: subject.trim().to_string(),
            html,
            text,
        })
    }

    /// List all registered templates
    pub fn list_templates(&self) -> Vec<TemplateId> {
        TemplateId::iter().collect()
    }
}

fn subject_key(id: TemplateId) -> String {
    format!("{id}.subject")
}

fn text_key(id: TemplateId) -> String {
    format!("{id}.text")
}

fn html_key(id: TemplateId) -> String {
    format!("{id}.html")
}

fn check_required(id: TemplateId, data: &Value) -> EmailResult<()> {
    let Some(map) = data.as_object() else {
        return Err(EmailError::InvalidTemplateInput(format!(
            "{id}: template data must be a JSON object"
        )));
    };

    let missing: Vec<&str> = id
        .required_fields()
        .iter()
        .copied()
        .filter(|field| match map.get(*field) {
            None | Some(Value::Null) => true,
            Some(Value::String(s)) => s.trim().is_empty(),
            Some(_) => false,
        })
        .collect();

    if missing.is_empty() {
        Ok(())
    } else {
        Err(EmailError::InvalidTemplateInput(format!(
            "{id}: missing required field(s): {}",
            missing.join(", ")
        )))
    }
}

// ============================================================================
// Shared partials
// ============================================================================

const HTML_HEADER: &str = r#"<!DOCTYPE html>
<html>
<head>
    <meta charset="utf-8">
    <title>{{brand.company_name}}</title>
</head>
<body style="font-family: Arial, sans-serif; line-height: 1.6; color: #333; max-width: 600px; margin: 0 auto; padding: 20px;">
    {{#if brand.logo_url}}
    <p><img src="{{brand.logo_url}}" alt="{{brand.company_name}}" style="max-height: 48px;"></p>
    {{/if}}"#;

const HTML_FOOTER: &str = r#"    <hr style="border: none; border-top: 1px solid #e5e7eb; margin: 30px 0;">
    <p style="color: #666; font-size: 12px;">
        {{brand.company_name}}{{#if brand.phone}} &middot; {{brand.phone}}{{/if}}<br>
        <a href="{{brand.website}}" style="color: #2563eb;">{{brand.website}}</a>
    </p>
</body>
</html>"#;

const TEXT_FOOTER: &str = r#"--
{{brand.company_name}}
{{brand.website}}
{{#if brand.phone}}{{brand.phone}}
{{/if}}"#;

// ============================================================================
// Contact
// ============================================================================

const CONTACT_ADMIN_TEXT: &str = r#"New contact form submission

Name: {{name}}
Email: {{email}}
{{#if phone}}Phone: {{phone}}
{{/if}}{{#if company}}Company: {{company}}
{{/if}}{{#if subject}}Subject: {{subject}}
{{/if}}{{#if service}}Service: {{service}}
{{/if}}
Message:
{{message}}

Reply directly to this email to respond to {{name}}.
"#;

const CONTACT_ADMIN_HTML: &str = r#"{{> header}}
    <h1 style="color: #2563eb;">New Contact Form Submission</h1>
    <table style="border-collapse: collapse; width: 100%;">
        <tr><td style="padding: 4px 8px; font-weight: bold;">Name</td><td style="padding: 4px 8px;">{{name}}</td></tr>
        <tr><td style="padding: 4px 8px; font-weight: bold;">Email</td><td style="padding: 4px 8px;"><a href="mailto:{{email}}">{{email}}</a></td></tr>
        {{#if phone}}<tr><td style="padding: 4px 8px; font-weight: bold;">Phone</td><td style="padding: 4px 8px;">{{phone}}</td></tr>{{/if}}
        {{#if company}}<tr><td style="padding: 4px 8px; font-weight: bold;">Company</td><td style="padding: 4px 8px;">{{company}}</td></tr>{{/if}}
        {{#if subject}}<tr><td style="padding: 4px 8px; font-weight: bold;">Subject</td><td style="padding: 4px 8px;">{{subject}}</td></tr>{{/if}}
        {{#if service}}<tr><td style="padding: 4px 8px; font-weight: bold;">Service</td><td style="padding: 4px 8px;">{{service}}</td></tr>{{/if}}
    </table>
    <h2 style="font-size: 16px;">Message</h2>
    <p style="white-space: pre-wrap; background: #f9fafb; padding: 12px; border-radius: 6px;">{{message}}</p>
    <p style="color: #666; font-size: 14px;">Reply directly to this email to respond to {{name}}.</p>
{{> footer}}"#;

const CONTACT_CONFIRMATION_TEXT: &str = r#"Hello {{name}},

Thank you for contacting {{brand.company_name}}. We received your message and will get back to you within one business day.

Your message:
{{message}}

Best regards,
The {{brand.company_name}} Team

{{> footer}}"#;

const CONTACT_CONFIRMATION_HTML: &str = r#"{{> header}}
    <h1 style="color: #2563eb;">Thanks for reaching out, {{name}}!</h1>
    <p>We received your message and will get back to you within one business day.</p>
    <p style="color: #666; font-size: 14px;">Your message:</p>
    <p style="white-space: pre-wrap; background: #f9fafb; padding: 12px; border-radius: 6px;">{{message}}</p>
    <p>Best regards,<br>The {{brand.company_name}} Team</p>
{{> footer}}"#;

// ============================================================================
// Drone services inquiry
// ============================================================================

const INQUIRY_ADMIN_TEXT: &str = r#"New drone services inquiry

Service: {{service_type}}
Name: {{name}}
Email: {{email}}
{{#if phone}}Phone: {{phone}}
{{/if}}{{#if company}}Company: {{company}}
{{/if}}{{#if location}}Location: {{location}}
{{/if}}{{#if project_date}}Project date: {{project_date}}
{{/if}}{{#if budget}}Budget: {{budget}}
{{/if}}
Project details:
{{details}}
"#;

const INQUIRY_ADMIN_HTML: &str = r#"{{> header}}
    <h1 style="color: #2563eb;">New {{service_type}} Inquiry</h1>
    <table style="border-collapse: collapse; width: 100%;">
        <tr><td style="padding: 4px 8px; font-weight: bold;">Name</td><td style="padding: 4px 8px;">{{name}}</td></tr>
        <tr><td style="padding: 4px 8px; font-weight: bold;">Email</td><td style="padding: 4px 8px;"><a href="mailto:{{email}}">{{email}}</a></td></tr>
        {{#if phone}}<tr><td style="padding: 4px 8px; font-weight: bold;">Phone</td><td style="padding: 4px 8px;">{{phone}}</td></tr>{{/if}}
        {{#if company}}<tr><td style="padding: 4px 8px; font-weight: bold;">Company</td><td style="padding: 4px 8px;">{{company}}</td></tr>{{/if}}
        {{#if location}}<tr><td style="padding: 4px 8px; font-weight: bold;">Location</td><td style="padding: 4px 8px;">{{location}}</td></tr>{{/if}}
        {{#if project_date}}<tr><td style="padding: 4px 8px; font-weight: bold;">Project date</td><td style="padding: 4px 8px;">{{project_date}}</td></tr>{{/if}}
        {{#if budget}}<tr><td style="padding: 4px 8px; font-weight: bold;">Budget</td><td style="padding: 4px 8px;">{{budget}}</td></tr>{{/if}}
    </table>
    <h2 style="font-size: 16px;">Project details</h2>
    <p style="white-space: pre-wrap; background: #f9fafb; padding: 12px; border-radius: 6px;">{{details}}</p>
{{> footer}}"#;

const INQUIRY_CONFIRMATION_TEXT: &str = r#"Hello {{name}},

Thank you for your interest in our {{service_type}} services. Our team is reviewing your project details and will follow up with a quote within two business days.

Project details:
{{details}}
{{#if location}}
Location: {{location}}
{{/if}}{{#if project_date}}Preferred date: {{project_date}}
{{/if}}
Best regards,
The {{brand.company_name}} Team

{{> footer}}"#;

const INQUIRY_CONFIRMATION_HTML: &str = r#"{{> header}}
    <h1 style="color: #2563eb;">We received your inquiry, {{name}}</h1>
    <p>Thank you for your interest in our <strong>{{service_type}}</strong> services. Our team is reviewing your project details and will follow up with a quote within two business days.</p>
    <p style="white-space: pre-wrap; background: #f9fafb; padding: 12px; border-radius: 6px;">{{details}}</p>
    {{#if location}}<p><strong>Location:</strong> {{location}}</p>{{/if}}
    {{#if project_date}}<p><strong>Preferred date:</strong> {{project_date}}</p>{{/if}}
    <p>Best regards,<br>The {{brand.company_name}} Team</p>
{{> footer}}"#;

// ============================================================================
// Training enrollment
// ============================================================================

const ENROLLMENT_ADMIN_TEXT: &str = r#"New training enrollment

Program: {{program.name}} ({{program_id}})
Name: {{name}}
Email: {{email}}
{{#if phone}}Phone: {{phone}}
{{/if}}{{#if preferred_start}}Preferred start: {{preferred_start}}
{{/if}}{{#if experience_level}}Experience: {{experience_level}}
{{/if}}{{#if message}}
Message:
{{message}}
{{/if}}"#;

const ENROLLMENT_ADMIN_HTML: &str = r#"{{> header}}
    <h1 style="color: #2563eb;">New Enrollment: {{program.name}}</h1>
    <table style="border-collapse: collapse; width: 100%;">
        <tr><td style="padding: 4px 8px; font-weight: bold;">Program</td><td style="padding: 4px 8px;">{{program.name}} ({{program_id}})</td></tr>
        <tr><td style="padding: 4px 8px; font-weight: bold;">Name</td><td style="padding: 4px 8px;">{{name}}</td></tr>
        <tr><td style="padding: 4px 8px; font-weight: bold;">Email</td><td style="padding: 4px 8px;"><a href="mailto:{{email}}">{{email}}</a></td></tr>
        {{#if phone}}<tr><td style="padding: 4px 8px; font-weight: bold;">Phone</td><td style="padding: 4px 8px;">{{phone}}</td></tr>{{/if}}
        {{#if preferred_start}}<tr><td style="padding: 4px 8px; font-weight: bold;">Preferred start</td><td style="padding: 4px 8px;">{{preferred_start}}</td></tr>{{/if}}
        {{#if experience_level}}<tr><td style="padding: 4px 8px; font-weight: bold;">Experience</td><td style="padding: 4px 8px;">{{experience_level}}</td></tr>{{/if}}
    </table>
    {{#if message}}<p style="white-space: pre-wrap; background: #f9fafb; padding: 12px; border-radius: 6px;">{{message}}</p>{{/if}}
{{> footer}}"#;

const ENROLLMENT_CONFIRMATION_TEXT: &str = r#"Hello {{name}},

Thank you for enrolling in {{program.name}}.

Duration: {{program.duration}}
Price: {{program.price}}
Certification: {{program.certification}}
{{#if program.requirements}}
Requirements:
{{#each program.requirements}}- {{this}}
{{/each}}{{/if}}{{#if preferred_start}}
Preferred start: {{preferred_start}}
{{/if}}
We will contact you shortly to confirm your schedule.

Best regards,
The {{brand.company_name}} Team

{{> footer}}"#;

const ENROLLMENT_CONFIRMATION_HTML: &str = r#"{{> header}}
    <h1 style="color: #2563eb;">Welcome aboard, {{name}}!</h1>
    <p>Thank you for enrolling in <strong>{{program.name}}</strong>.</p>
    <table style="border-collapse: collapse; width: 100%;">
        <tr><td style="padding: 4px 8px; font-weight: bold;">Duration</td><td style="padding: 4px 8px;">{{program.duration}}</td></tr>
        <tr><td style="padding: 4px 8px; font-weight: bold;">Price</td><td style="padding: 4px 8px;">{{program.price}}</td></tr>
        <tr><td style="padding: 4px 8px; font-weight: bold;">Certification</td><td style="padding: 4px 8px;">{{program.certification}}</td></tr>
    </table>
    {{#if program.requirements}}
    <h2 style="font-size: 16px;">Requirements</h2>
    <ul>
        {{#each program.requirements}}<li>{{this}}</li>{{/each}}
    </ul>
    {{/if}}
    {{#if preferred_start}}<p><strong>Preferred start:</strong> {{preferred_start}}</p>{{/if}}
    <p>We will contact you shortly to confirm your schedule.</p>
    <p>Best regards,<br>The {{brand.company_name}} Team</p>
{{> footer}}"#;

// ============================================================================
// Newsletter
// ============================================================================

const NEWSLETTER_WELCOME_TEXT: &str = r#"Hello{{#if name}} {{name}}{{/if}},

Thanks for subscribing to the {{brand.company_name}} newsletter.

Please confirm your subscription by opening the link below:

{{confirmation_url}}
{{#if interests}}
You told us you are interested in:
{{#each interests}}- {{this}}
{{/each}}{{/if}}
If you didn't sign up, you can safely ignore this email.

{{> footer}}"#;

const NEWSLETTER_WELCOME_HTML: &str = r#"{{> header}}
    <h1 style="color: #2563eb;">Welcome{{#if name}}, {{name}}{{/if}}!</h1>
    <p>Thanks for subscribing to the <strong>{{brand.company_name}}</strong> newsletter.</p>
    <p style="text-align: center; margin: 30px 0;">
        <a href="{{confirmation_url}}"
           style="background-color: #2563eb; color: white; padding: 12px 24px; text-decoration: none; border-radius: 6px; display: inline-block;">
            Confirm Subscription
        </a>
    </p>
    {{#if interests}}
    <p>You told us you are interested in:</p>
    <ul>
        {{#each interests}}<li>{{this}}</li>{{/each}}
    </ul>
    {{/if}}
    <p style="color: #666; font-size: 14px;">If you didn't sign up, you can safely ignore this email.</p>
{{> footer}}"#;

const NEWSLETTER_ADMIN_TEXT: &str = r#"New newsletter subscriber

Email: {{email}}
{{#if name}}Name: {{name}}
{{/if}}{{#if interests}}Interests:
{{#each interests}}- {{this}}
{{/each}}{{/if}}"#;

const NEWSLETTER_ADMIN_HTML: &str = r#"{{> header}}
    <h1 style="color: #2563eb;">New Newsletter Subscriber</h1>
    <p><strong>Email:</strong> {{email}}</p>
    {{#if name}}<p><strong>Name:</strong> {{name}}</p>{{/if}}
    {{#if interests}}
    <ul>
        {{#each interests}}<li>{{this}}</li>{{/each}}
    </ul>
    {{/if}}
{{> footer}}"#;
