//! Operator actions exposed as `POST /admin/{action}`.

use serde_json::{json, Value};
use std::str::FromStr;
use strum::{AsRefStr, Display, EnumIter, EnumString, IntoEnumIterator};
use tracing::info;

use crate::error::{EmailError, EmailResult};
use crate::service::EmailService;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, AsRefStr, EnumString, EnumIter)]
#[strum(serialize_all = "snake_case")]
pub enum AdminAction {
    ResetCircuitBreaker,
    ClearTemplateCache,
    ClearQueue,
    TestConnection,
    ResetMetrics,
}

impl AdminAction {
    /// Every accepted action name.
    pub fn names() -> Vec<String> {
        Self::iter().map(|action| action.to_string()).collect()
    }
}

impl EmailService {
    /// Run an admin action by name.
    ///
    /// Returns a JSON status body; an unrecognized name is
    /// [`EmailError::UnknownAction`].
    pub async fn run_admin_action(&self, action: &str) -> EmailResult<Value> {
        let action = AdminAction::from_str(action)
            .map_err(|_| EmailError::UnknownAction(action.to_string()))?;
        info!(%action, "Running admin action");

        let body = match action {
            AdminAction::ResetCircuitBreaker => {
                self.transport().reset_circuit_breaker();
                json!({
                    "success": true,
                    "message": "Circuit breaker reset",
                    "circuit_breaker": self.transport().circuit_state(),
                })
            }
            AdminAction::ClearTemplateCache => {
                let cleared = self.templates().clear();
                json!({
                    "success": true,
                    "message": "Template cache cleared",
                    "cleared": cleared,
                })
            }
            AdminAction::ClearQueue => {
                let dropped = self.queue().clear();
                json!({
                    "success": true,
                    "message": "Queue cleared",
                    "dropped": dropped,
                })
            }
            AdminAction::TestConnection => {
                let connected = self.transport().test_connection().await;
                let message = if connected {
                    "Connection OK"
                } else {
                    "Connection failed"
                };
                json!({
                    "success": connected,
                    "message": message,
                    "provider": self.transport().provider_name(),
                })
            }
            AdminAction::ResetMetrics => {
                self.queue().reset_metrics();
                json!({
                    "success": true,
                    "message": "Queue metrics reset",
                    "metrics": self.metrics(),
                })
            }
        };

        Ok(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EmailServiceConfig;
    use crate::models::EmailMessage;
    use crate::transport::MockProvider;
    use job_queue::Priority;
    use std::sync::Arc;

    fn service() -> EmailService {
        EmailService::new(EmailServiceConfig::default(), Arc::new(MockProvider::new())).unwrap()
    }

    #[test]
    fn test_action_names() {
        assert_eq!(
            AdminAction::names(),
            [
                "reset_circuit_breaker",
                "clear_template_cache",
                "clear_queue",
                "test_connection",
                "reset_metrics"
            ]
        );
    }

    #[tokio::test]
    async fn test_unknown_action() {
        let err = service().run_admin_action("reboot").await.unwrap_err();
        assert_eq!(err, EmailError::UnknownAction("reboot".to_string()));
    }

    #[tokio::test]
    async fn test_clear_queue_reports_dropped() {
        let service = service();
        for _ in 0..2 {
            service.send_email_async(
                EmailMessage::new("user@example.com", "Hi").with_text("Body"),
                Priority::Normal,
                None,
            );
        }

        let body = service.run_admin_action("clear_queue").await.unwrap();
        assert_eq!(body["dropped"], 2);
        assert_eq!(service.queue_status().queue_size, 0);
        assert_eq!(service.metrics().total_dropped, 2);
    }

    #[tokio::test]
    async fn test_connection_action() {
        let body = service().run_admin_action("test_connection").await.unwrap();
        assert_eq!(body["success"], true);
        assert_eq!(body["provider"], "mock");
    }
}
