//! Queue metrics
//!
//! Two views of the same events:
//! - [`QueueMetrics`] emits Prometheus series through the `metrics` facade.
//! - `QueueStats` keeps in-process counters that back [`MetricsSnapshot`],
//!   the JSON shape served by status endpoints.

use chrono::{DateTime, Utc};
use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;
use serde::Serialize;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{info, warn};

static PROMETHEUS_HANDLE: OnceCell<PrometheusHandle> = OnceCell::new();

/// Install the Prometheus recorder.
///
/// Call this once at startup. Subsequent calls are no-ops; a failure to
/// install (another recorder already set) is logged and metrics stay local.
pub fn init_metrics() {
    if PROMETHEUS_HANDLE.get().is_some() {
        return;
    }

    match PrometheusBuilder::new().install_recorder() {
        Ok(handle) => {
            let _ = PROMETHEUS_HANDLE.set(handle);
            info!("Prometheus metrics initialized");
        }
        Err(e) => warn!(error = %e, "Failed to install Prometheus recorder"),
    }
}

/// Get the Prometheus handle for rendering metrics
pub fn prometheus_handle() -> Option<&'static PrometheusHandle> {
    PROMETHEUS_HANDLE.get()
}

/// Render metrics in Prometheus text format
pub fn render_metrics() -> String {
    prometheus_handle().map(|h| h.render()).unwrap_or_default()
}

/// Prometheus recorder for one queue.
///
/// Series are prefixed with the queue name, so a queue named `email` emits
/// `email_queue_jobs_enqueued_total` and friends.
#[derive(Clone, Debug)]
pub struct QueueMetrics {
    prefix: String,
}

impl QueueMetrics {
    pub fn new(queue_name: &str) -> Self {
        Self {
            prefix: format!("{queue_name}_queue"),
        }
    }

    fn name(&self, suffix: &str) -> String {
        format!("{}_{}", self.prefix, suffix)
    }

    pub fn job_enqueued(&self, priority: &'static str) {
        counter!(self.name("jobs_enqueued_total"), "priority" => priority).increment(1);
    }

    pub fn job_succeeded(&self, duration: Duration) {
        counter!(self.name("jobs_processed_total"), "status" => "success").increment(1);
        histogram!(self.name("job_duration_seconds")).record(duration.as_secs_f64());
    }

    pub fn job_failed(&self, category: &'static str, duration: Duration) {
        counter!(self.name("jobs_processed_total"), "status" => "failed").increment(1);
        counter!(self.name("job_errors_total"), "category" => category).increment(1);
        histogram!(self.name("job_duration_seconds")).record(duration.as_secs_f64());
    }

    pub fn job_retried(&self) {
        counter!(self.name("jobs_retried_total")).increment(1);
    }

    pub fn jobs_dropped(&self, count: usize) {
        counter!(self.name("jobs_dropped_total")).increment(count as u64);
    }

    pub fn rate_limited(&self) {
        counter!(self.name("rate_limited_total")).increment(1);
    }

    pub fn depth(&self, depth: usize) {
        gauge!(self.name("depth")).set(depth as f64);
    }
}

/// Point-in-time queue counters.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct MetricsSnapshot {
    pub total_queued: u64,
    pub total_processed: u64,
    pub total_failed: u64,
    pub total_retried: u64,
    pub total_dropped: u64,
    pub processing_rate_per_minute: f64,
    pub average_processing_time_ms: f64,
    pub last_processed_at: Option<DateTime<Utc>>,
}

#[derive(Debug)]
pub(crate) struct QueueStats {
    pub total_queued: u64,
    pub total_processed: u64,
    pub total_failed: u64,
    pub total_retried: u64,
    pub total_dropped: u64,
    attempt_count: u64,
    attempt_time: Duration,
    since: Instant,
    last_processed_at: Option<DateTime<Utc>>,
}

impl QueueStats {
    pub fn new(now: Instant) -> Self {
        Self {
            total_queued: 0,
            total_processed: 0,
            total_failed: 0,
            total_retried: 0,
            total_dropped: 0,
            attempt_count: 0,
            attempt_time: Duration::ZERO,
            since: now,
            last_processed_at: None,
        }
    }

    pub fn record_attempt(&mut self, elapsed: Duration) {
        self.attempt_count += 1;
        self.attempt_time += elapsed;
    }

    pub fn record_processed(&mut self) {
        self.total_processed += 1;
        self.last_processed_at = Some(Utc::now());
    }

    /// Zero every counter. Jobs still held by the queue are counted as queued
    /// again so the accounting identity keeps holding after a reset.
    pub fn reset(&mut self, now: Instant, outstanding: usize) {
        *self = Self::new(now);
        self.total_queued = outstanding as u64;
    }

    pub fn snapshot(&self, now: Instant) -> MetricsSnapshot {
        let elapsed_secs = now.saturating_duration_since(self.since).as_secs_f64();
        let processing_rate_per_minute = if elapsed_secs > 0.0 {
            self.total_processed as f64 * 60.0 / elapsed_secs
        } else {
            0.0
        };
        let average_processing_time_ms = if self.attempt_count > 0 {
            self.attempt_time.as_secs_f64() * 1000.0 / self.attempt_count as f64
        } else {
            0.0
        };

        MetricsSnapshot {
            total_queued: self.total_queued,
            total_processed: self.total_processed,
            total_failed: self.total_failed,
            total_retried: self.total_retried,
            total_dropped: self.total_dropped,
            processing_rate_per_minute,
            average_processing_time_ms,
            last_processed_at: self.last_processed_at,
        }
    }
}
