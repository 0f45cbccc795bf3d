//! HTTP handlers for status, metrics and admin actions.
//!
//! - Liveness: `/health`
//! - Service, queue and template cache status: `/status`, `/queue`, `/queue/emails`, `/templates/stats`
//! - Queue metrics as JSON: `/metrics`; Prometheus text: `/metrics/prometheus`
//! - Admin: `POST /admin/{action}`

use axum::{
    Json, Router,
    extract::{Path, State},
    http::{StatusCode, header},
    response::IntoResponse,
    routing::{get, post},
};
use email::{AdminAction, EmailError, EmailService};
use serde_json::{Value, json};
use std::sync::Arc;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::{Level, error};

/// Shared state for the handlers.
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<EmailService>,
    pub app_name: &'static str,
    pub app_version: &'static str,
}

impl AppState {
    pub fn new(service: Arc<EmailService>, app_name: &'static str, app_version: &'static str) -> Self {
        Self {
            service,
            app_name,
            app_version,
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/status", get(status_handler))
        .route("/metrics", get(metrics_handler))
        .route("/metrics/prometheus", get(prometheus_handler))
        .route("/queue", get(queue_handler))
        .route("/queue/emails", get(queued_emails_handler))
        .route("/templates/stats", get(template_stats_handler))
        .route("/admin/{action}", post(admin_handler))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .with_state(state)
}

/// Always OK while the process is serving.
async fn health_handler(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "name": state.app_name,
        "version": state.app_version,
    }))
}

async fn status_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.service.service_status())
}

async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.service.metrics())
}

/// Prometheus text format for scraping.
async fn prometheus_handler() -> impl IntoResponse {
    match job_queue::metrics::prometheus_handle() {
        Some(handle) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
            handle.render(),
        )
            .into_response(),
        None => (
            StatusCode::SERVICE_UNAVAILABLE,
            [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
            "Metrics not initialized".to_string(),
        )
            .into_response(),
    }
}

async fn queue_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.service.queue_status())
}

async fn queued_emails_handler(State(state): State<AppState>) -> Json<Value> {
    let emails = state.service.queued_emails();
    Json(json!({
        "count": emails.len(),
        "emails": emails,
    }))
}

async fn template_stats_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.service.template_stats())
}

async fn admin_handler(
    State(state): State<AppState>,
    Path(action): Path<String>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    match state.service.run_admin_action(&action).await {
        Ok(body) => Ok(Json(body)),
        Err(e @ EmailError::UnknownAction(_)) => {
            Err((
                StatusCode::BAD_REQUEST,
                Json(json!({ "error": e.to_string(), "valid_actions": AdminAction::names() })),
            ))
        }
        Err(e) => {
            error!(%action, error = %e, "Admin action failed");
            Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": e.to_string() })),
            ))
        }
    }
}
