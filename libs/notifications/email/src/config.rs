//! Email service configuration, loaded from the environment via [`FromEnv`].

use core_config::{env_flag, env_optional, env_or_default, env_parse, ConfigError, FromEnv};
use job_queue::{CircuitBreakerConfig, QueueConfig};
use serde::Serialize;
use std::time::Duration;

/// SMTP provider configuration
///
/// An unset `SMTP_HOST` is not an error here; the transport reports itself as
/// unconfigured instead.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    pub from_address: String,
    pub from_name: String,
    pub use_tls: bool,
    /// Per-command SMTP timeout
    pub timeout: Duration,
}

impl Default for SmtpConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: 587,
            username: None,
            password: None,
            from_address: String::new(),
            from_name: "Notifications".to_string(),
            use_tls: true,
            timeout: Duration::from_secs(10),
        }
    }
}

impl SmtpConfig {
    /// Config for a local Mailpit/MailHog server: no TLS, no auth.
    pub fn local(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            from_address: "noreply@localhost".to_string(),
            from_name: "Development".to_string(),
            use_tls: false,
            ..Self::default()
        }
    }

    /// Host and sender are present
    pub fn is_configured(&self) -> bool {
        !self.host.trim().is_empty() && !self.from_address.trim().is_empty()
    }

    /// Credentials, when both username and password are set
    pub fn credentials(&self) -> Option<(&str, &str)> {
        match (&self.username, &self.password) {
            (Some(user), Some(pass)) => Some((user.as_str(), pass.as_str())),
            _ => None,
        }
    }
}

impl FromEnv for SmtpConfig {
    fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            host: env_or_default("SMTP_HOST", ""),
            port: env_parse("SMTP_PORT", 587u16)?,
            username: env_optional("SMTP_USERNAME"),
            password: env_optional("SMTP_PASSWORD"),
            from_address: env_or_default("EMAIL_FROM_ADDRESS", ""),
            from_name: env_or_default("EMAIL_FROM_NAME", "Notifications"),
            use_tls: env_flag("SMTP_USE_TLS", true),
            timeout: Duration::from_secs(env_parse("SMTP_TIMEOUT_SECS", 10u64)?),
        })
    }
}

/// Company details rendered into every template as `brand`.
#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
pub struct BrandingConfig {
    pub company_name: String,
    pub website: String,
    pub phone: Option<String>,
    /// Where admin notifications are delivered
    pub admin_email: String,
    pub logo_url: Option<String>,
}

impl Default for BrandingConfig {
    fn default() -> Self {
        Self {
            company_name: "Aero Drone Services".to_string(),
            website: "https://localhost:3000".to_string(),
            phone: None,
            admin_email: "admin@localhost".to_string(),
            logo_url: None,
        }
    }
}

impl FromEnv for BrandingConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        Ok(Self {
            company_name: env_or_default("COMPANY_NAME", &defaults.company_name),
            website: env_or_default("COMPANY_WEBSITE", &defaults.website),
            phone: env_optional("COMPANY_PHONE"),
            admin_email: env_or_default("ADMIN_EMAIL", &defaults.admin_email),
            logo_url: env_optional("LOGO_URL"),
        })
    }
}

/// Configuration for [`EmailService`](crate::EmailService)
#[derive(Clone, Debug)]
pub struct EmailServiceConfig {
    pub branding: BrandingConfig,
    pub queue: QueueConfig,
    pub breaker: CircuitBreakerConfig,
    /// Maximum cached renders
    pub template_cache_size: usize,
    /// Also notify the admin on newsletter signups
    pub notify_admin_on_newsletter: bool,
}

impl Default for EmailServiceConfig {
    fn default() -> Self {
        Self {
            branding: BrandingConfig::default(),
            queue: QueueConfig::new("email"),
            breaker: CircuitBreakerConfig::default(),
            template_cache_size: 100,
            notify_admin_on_newsletter: false,
        }
    }
}

impl EmailServiceConfig {
    pub fn with_branding(mut self, branding: BrandingConfig) -> Self {
        self.branding = branding;
        self
    }

    pub fn with_queue(mut self, queue: QueueConfig) -> Self {
        self.queue = queue;
        self
    }

    pub fn with_breaker(mut self, breaker: CircuitBreakerConfig) -> Self {
        self.breaker = breaker;
        self
    }

    pub fn with_template_cache_size(mut self, size: usize) -> Self {
        self.template_cache_size = size;
        self
    }

    pub fn with_newsletter_admin_notifications(mut self, enabled: bool) -> Self {
        self.notify_admin_on_newsletter = enabled;
        self
    }
}

impl FromEnv for EmailServiceConfig {
    fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            branding: BrandingConfig::from_env()?,
            queue: QueueConfig::from_env()?,
            breaker: CircuitBreakerConfig::from_env()?,
            template_cache_size: env_parse("EMAIL_TEMPLATE_CACHE_SIZE", 100usize)?,
            notify_admin_on_newsletter: env_flag("NEWSLETTER_NOTIFY_ADMIN", false),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_smtp_from_env_defaults() {
        temp_env::with_vars(
            [
                ("SMTP_HOST", Some("smtp.example.com")),
                ("EMAIL_FROM_ADDRESS", Some("noreply@example.com")),
                ("SMTP_PORT", None),
                ("SMTP_USE_TLS", None),
                ("SMTP_USERNAME", None),
                ("SMTP_PASSWORD", None),
            ],
            || {
                let config = SmtpConfig::from_env().unwrap();
                assert_eq!(config.port, 587);
                assert!(config.use_tls);
                assert!(config.is_configured());
                assert_eq!(config.credentials(), None);
            },
        );
    }

    #[test]
    fn test_smtp_unset_host_is_unconfigured() {
        temp_env::with_vars(
            [("SMTP_HOST", None::<&str>), ("EMAIL_FROM_ADDRESS", Some("a@b.c"))],
            || {
                let config = SmtpConfig::from_env().unwrap();
                assert!(!config.is_configured());
            },
        );
    }

    #[test]
    fn test_smtp_bad_port_is_error() {
        temp_env::with_var("SMTP_PORT", Some("not-a-port"), || {
            let err = SmtpConfig::from_env().unwrap_err();
            assert!(err.to_string().contains("SMTP_PORT"));
        });
    }

    #[test]
    fn test_service_config_from_env() {
        temp_env::with_vars(
            [
                ("COMPANY_NAME", Some("Skyline Drones")),
                ("ADMIN_EMAIL", Some("ops@skyline.example")),
                ("EMAIL_TEMPLATE_CACHE_SIZE", Some("25")),
                ("NEWSLETTER_NOTIFY_ADMIN", Some("true")),
                ("EMAIL_BREAKER_THRESHOLD", Some("3")),
            ],
            || {
                let config = EmailServiceConfig::from_env().unwrap();
                assert_eq!(config.branding.company_name, "Skyline Drones");
                assert_eq!(config.branding.admin_email, "ops@skyline.example");
                assert_eq!(config.template_cache_size, 25);
                assert!(config.notify_admin_on_newsletter);
                assert_eq!(config.breaker.failure_threshold, 3);
                assert_eq!(config.queue.name, "email");
            },
        );
    }
}
