//! Job Queue Framework
//!
//! An in-process job queue for work that must not block the caller, such as
//! outbound email.
//!
//! ## Features
//!
//! - **Generic queue**: `JobQueue<J, P>` dispatches any payload to any processor
//! - **Priorities**: `High` before `Normal` before `Low`, FIFO within a tier
//! - **Rate limiting**: sliding window; excess jobs are deferred, never rejected
//! - **Retry with backoff**: exponential, linear or fixed, bounded attempts
//! - **Circuit breaker**: protect downstream services
//! - **Prometheus metrics**: built-in observability
//!
//! ## Example
//!
//! ```ignore
//! use job_queue::{JobProcessor, JobQueue, Priority, QueueConfig, QueueJob};
//!
//! struct Note { text: String }
//!
//! impl QueueJob for Note {
//!     type Summary = usize;
//!     fn summary(&self) -> usize { self.text.len() }
//! }
//!
//! let queue = Arc::new(JobQueue::new(QueueConfig::new("notes"), NotePrinter));
//! let handle = queue.enqueue(Note { text: "hi".into() }, Priority::High);
//!
//! tokio::spawn({
//!     let queue = queue.clone();
//!     async move { queue.run(shutdown_rx).await }
//! });
//!
//! let outcome = handle.outcome().await?;
//! ```

mod config;
mod error;
mod job;
pub mod metrics;
mod queue;
mod rate_limit;
mod resilience;

// Re-export main types
pub use config::{Backoff, QueueConfig, RetryPolicy};
pub use error::{ErrorCategory, JobError, QueueError};
pub use job::{
    CompletionCallback, JobHandle, JobId, JobOutcome, JobProcessor, Priority, QueueJob,
    QueuedJobView,
};
pub use metrics::{init_metrics, render_metrics, MetricsSnapshot, QueueMetrics};
pub use queue::{CurrentJob, DrainReport, DrainSummary, JobQueue, QueueStatus};
pub use rate_limit::{RateLimitStatus, RateLimiter};
pub use resilience::{CallPermit, CircuitBreaker, CircuitBreakerConfig, CircuitSnapshot, CircuitState};
