//! In-process priority job queue.
//!
//! Jobs are ordered by priority, then by enqueue order, among those whose
//! `scheduled_at` has passed. A single drain runs at a time; it stops when no
//! job is eligible or the rate limit budget is spent and reports when it should
//! be woken again. [`JobQueue::run`] wraps this in the long-lived drain loop.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use std::cmp::Reverse;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::{oneshot, watch, Notify};
use tokio::time::{sleep_until, Instant};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::QueueConfig;
use crate::error::{ErrorCategory, JobError};
use crate::job::{
    Completion, JobHandle, JobId, JobOutcome, JobProcessor, Priority, QueueJob, QueuedJobView,
};
use crate::metrics::{MetricsSnapshot, QueueMetrics, QueueStats};
use crate::rate_limit::{RateLimitStatus, RateLimiter};

type PendingKey = (Reverse<Priority>, u64);

struct QueuedJob<J, O> {
    id: JobId,
    payload: J,
    priority: Priority,
    attempts: u32,
    scheduled_at: Instant,
    created_at: DateTime<Utc>,
    seq: u64,
    completion: Completion<O>,
}

impl<J, O> QueuedJob<J, O> {
    fn key(&self) -> PendingKey {
        (Reverse(self.priority), self.seq)
    }
}

/// Job currently being attempted.
#[derive(Debug, Clone, Serialize)]
pub struct CurrentJob {
    pub id: JobId,
    pub priority: Priority,
    pub attempt: u32,
    pub started_at: DateTime<Utc>,
}

/// Queue status for observability endpoints.
#[derive(Debug, Clone, Serialize)]
pub struct QueueStatus {
    pub name: String,
    pub processing: bool,
    pub current_job: Option<CurrentJob>,
    pub queue_size: usize,
    pub next_scheduled_at: Option<DateTime<Utc>>,
    pub rate_limit: RateLimitStatus,
}

/// Summary of one [`JobQueue::drain`] call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DrainSummary {
    /// Attempts made during this drain.
    pub attempted: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub retried: usize,
    /// Stopped because the rate limit budget was spent.
    pub rate_limited: bool,
    /// When pending work becomes eligible again, if any is left.
    pub next_wake: Option<Instant>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DrainReport {
    /// Another drain was already running; nothing was done.
    Busy,
    Completed(DrainSummary),
}

struct QueueState<J, O> {
    pending: BTreeMap<PendingKey, QueuedJob<J, O>>,
    next_seq: u64,
    limiter: RateLimiter,
    stats: QueueStats,
    current: Option<CurrentJob>,
}

impl<J, O> QueueState<J, O> {
    fn next_eligible(&self, now: Instant) -> Option<PendingKey> {
        self.pending
            .iter()
            .find(|(_, job)| job.scheduled_at <= now)
            .map(|(key, _)| *key)
    }

    fn next_scheduled(&self) -> Option<Instant> {
        self.pending.values().map(|job| job.scheduled_at).min()
    }

    fn outstanding(&self) -> usize {
        self.pending.len() + usize::from(self.current.is_some())
    }
}

/// Clears the draining flag when a drain ends, including on cancellation.
struct DrainGuard<'a>(&'a AtomicBool);

impl Drop for DrainGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Job taken out of `pending` for an attempt.
///
/// If the attempt is dropped before it resolves (the drain future was
/// cancelled), the job goes back to `pending` as if that attempt never
/// started, and the in-flight marker is cleared.
struct InFlight<'a, J, O> {
    state: &'a Mutex<QueueState<J, O>>,
    job: Option<QueuedJob<J, O>>,
}

impl<J, O> InFlight<'_, J, O> {
    fn job(&self) -> Option<&QueuedJob<J, O>> {
        self.job.as_ref()
    }

    /// Take the job back once the attempt has resolved.
    fn finish(mut self) -> Option<QueuedJob<J, O>> {
        self.job.take()
    }
}

impl<J, O> Drop for InFlight<'_, J, O> {
    fn drop(&mut self) {
        let Some(mut job) = self.job.take() else {
            return;
        };
        job.attempts = job.attempts.saturating_sub(1);
        job.scheduled_at = Instant::now();
        warn!(job_id = %job.id, "Attempt cancelled, returning job to the queue");

        let mut state = self.state.lock();
        state.current = None;
        state.pending.insert(job.key(), job);
    }
}

/// Priority, rate-limited job queue with retry and backoff.
///
/// # Example
///
/// ```rust,ignore
/// let queue = Arc::new(JobQueue::new(QueueConfig::new("email"), processor));
///
/// let handle = queue.enqueue(job, Priority::High);
/// tokio::spawn({
///     let queue = queue.clone();
///     async move { queue.run(shutdown_rx).await }
/// });
///
/// let outcome = handle.outcome().await?;
/// ```
pub struct JobQueue<J, P>
where
    J: QueueJob,
    P: JobProcessor<J>,
{
    config: QueueConfig,
    processor: P,
    state: Mutex<QueueState<J, P::Output>>,
    wake: Notify,
    draining: AtomicBool,
    metrics: QueueMetrics,
}

impl<J, P> JobQueue<J, P>
where
    J: QueueJob,
    P: JobProcessor<J>,
{
    pub fn new(config: QueueConfig, processor: P) -> Self {
        let now = Instant::now();
        let state = QueueState {
            pending: BTreeMap::new(),
            next_seq: 0,
            limiter: RateLimiter::new(config.rate_limit, config.rate_window),
            stats: QueueStats::new(now),
            current: None,
        };

        Self {
            metrics: QueueMetrics::new(&config.name),
            config,
            processor,
            state: Mutex::new(state),
            wake: Notify::new(),
            draining: AtomicBool::new(false),
        }
    }

    pub fn config(&self) -> &QueueConfig {
        &self.config
    }

    pub fn processor(&self) -> &P {
        &self.processor
    }

    /// Enqueue a job and get a handle that resolves with its outcome.
    pub fn enqueue(&self, payload: J, priority: Priority) -> JobHandle<P::Output> {
        let (tx, rx) = oneshot::channel();
        let id = self.push(payload, priority, Completion::Channel(tx));
        JobHandle::new(id, rx)
    }

    /// Enqueue a job whose outcome is delivered to `callback`.
    pub fn enqueue_with_callback<F>(&self, payload: J, priority: Priority, callback: F) -> JobId
    where
        F: FnOnce(JobOutcome<P::Output>) + Send + 'static,
    {
        self.push(payload, priority, Completion::Callback(Box::new(callback)))
    }

    /// Enqueue a job nobody waits on.
    pub fn enqueue_detached(&self, payload: J, priority: Priority) -> JobId {
        self.push(payload, priority, Completion::None)
    }

    fn push(&self, payload: J, priority: Priority, completion: Completion<P::Output>) -> JobId {
        let id = Uuid::new_v4();
        let depth = {
            let mut state = self.state.lock();
            let seq = state.next_seq;
            state.next_seq += 1;

            let job = QueuedJob {
                id,
                payload,
                priority,
                attempts: 0,
                scheduled_at: Instant::now(),
                created_at: Utc::now(),
                seq,
                completion,
            };
            state.pending.insert(job.key(), job);
            state.stats.total_queued += 1;
            state.pending.len()
        };

        self.metrics.job_enqueued(priority.as_str());
        self.metrics.depth(depth);
        debug!(queue = %self.config.name, job_id = %id, %priority, depth, "Job enqueued");

        self.wake.notify_one();
        id
    }

    /// Process every eligible job, one at a time.
    ///
    /// Returns [`DrainReport::Busy`] immediately when another drain is running.
    pub async fn drain(&self) -> DrainReport {
        if self
            .draining
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return DrainReport::Busy;
        }
        let _guard = DrainGuard(&self.draining);

        let mut summary = DrainSummary::default();

        loop {
            let now = Instant::now();
            let next = {
                let mut state = self.state.lock();
                match state.next_eligible(now) {
                    None => {
                        summary.next_wake = state.next_scheduled();
                        None
                    }
                    Some(key) => match state.limiter.try_acquire(now) {
                        Err(wait) => {
                            summary.rate_limited = true;
                            summary.next_wake = Some(now + wait);
                            None
                        }
                        Ok(()) => state.pending.remove(&key).map(|mut job| {
                            job.attempts += 1;
                            state.current = Some(CurrentJob {
                                id: job.id,
                                priority: job.priority,
                                attempt: job.attempts,
                                started_at: Utc::now(),
                            });
                            job
                        }),
                    },
                }
            };

            let Some(job) = next else {
                if summary.rate_limited {
                    self.metrics.rate_limited();
                    debug!(queue = %self.config.name, "Rate limit reached, deferring remaining jobs");
                }
                break;
            };

            summary.attempted += 1;
            let in_flight = InFlight {
                state: &self.state,
                job: Some(job),
            };
            self.attempt(in_flight, &mut summary).await;
        }

        DrainReport::Completed(summary)
    }

    async fn attempt(
        &self,
        in_flight: InFlight<'_, J, P::Output>,
        summary: &mut DrainSummary,
    ) {
        let Some(pending) = in_flight.job() else {
            return;
        };
        let started = Instant::now();
        let result = match tokio::time::timeout(
            self.config.job_timeout,
            self.processor.process(&pending.payload, pending.attempts),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(JobError::Timeout(self.config.job_timeout.as_millis() as u64)),
        };
        let elapsed = started.elapsed();
        let Some(mut job) = in_flight.finish() else {
            return;
        };

        let finished = {
            let mut state = self.state.lock();
            state.current = None;
            state.stats.record_attempt(elapsed);

            match result {
                Ok(output) => {
                    state.stats.record_processed();
                    summary.succeeded += 1;
                    self.metrics.job_succeeded(elapsed);
                    info!(
                        queue = %self.config.name,
                        processor = self.processor.name(),
                        job_id = %job.id,
                        attempt = job.attempts,
                        duration_ms = elapsed.as_millis() as u64,
                        "Job completed"
                    );
                    Some((job, Ok(output)))
                }
                Err(error) if self.should_retry(&error, job.attempts) => {
                    let delay = self.config.retry.delay_for(job.attempts);
                    job.scheduled_at = Instant::now() + delay;
                    state.stats.total_retried += 1;
                    summary.retried += 1;
                    self.metrics.job_retried();
                    warn!(
                        queue = %self.config.name,
                        job_id = %job.id,
                        attempt = job.attempts,
                        retry_in_ms = delay.as_millis() as u64,
                        error = %error,
                        "Job failed, scheduling retry"
                    );
                    state.pending.insert(job.key(), job);
                    None
                }
                Err(error) => {
                    state.stats.total_failed += 1;
                    summary.failed += 1;
                    self.metrics.job_failed(error.category().as_str(), elapsed);
                    warn!(
                        queue = %self.config.name,
                        job_id = %job.id,
                        attempts = job.attempts,
                        category = error.category().as_str(),
                        error = %error,
                        "Job failed permanently"
                    );
                    Some((job, Err(error)))
                }
            }
        };

        self.metrics.depth(self.size());

        // Completions run outside the lock so they may call back into the queue
        if let Some((job, result)) = finished {
            job.completion.fire(JobOutcome {
                job_id: job.id,
                attempts: job.attempts,
                result,
                finished_at: Utc::now(),
            });
        }
    }

    fn should_retry(&self, error: &JobError, attempts: u32) -> bool {
        match error.category() {
            ErrorCategory::Permanent => false,
            // Downstream pushback defers the job without consuming the attempt cap
            ErrorCategory::RateLimited => true,
            ErrorCategory::Transient => self.config.retry.allows_another(attempts),
        }
    }

    /// Run the drain loop until `shutdown` flips to `true` or its sender drops.
    ///
    /// Wakes on enqueue, on the next scheduled retry or rate-limit slot, and
    /// at least every `poll_interval`.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(
            queue = %self.config.name,
            processor = self.processor.name(),
            rate_limit = self.config.rate_limit,
            rate_window_secs = self.config.rate_window.as_secs(),
            "Queue drain loop started"
        );

        loop {
            if *shutdown.borrow() {
                break;
            }

            let next_wake = match self.drain().await {
                DrainReport::Completed(summary) => summary.next_wake,
                DrainReport::Busy => None,
            };

            let poll_at = Instant::now() + self.config.poll_interval;
            let deadline = next_wake.map_or(poll_at, |at| at.min(poll_at));

            tokio::select! {
                _ = self.wake.notified() => {}
                _ = sleep_until(deadline) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }

        info!(queue = %self.config.name, pending = self.size(), "Queue drain loop stopped");
    }

    /// Wake the drain loop without enqueueing anything.
    pub fn wake(&self) {
        self.wake.notify_one();
    }

    /// Number of pending jobs, excluding the one in flight.
    pub fn size(&self) -> usize {
        self.state.lock().pending.len()
    }

    pub fn is_processing(&self) -> bool {
        self.draining.load(Ordering::Acquire)
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.state.lock().stats.snapshot(Instant::now())
    }

    pub fn status(&self) -> QueueStatus {
        let now = Instant::now();
        let mut state = self.state.lock();
        let next_scheduled_at = state.next_scheduled().map(|at| to_wall_clock(at, now));

        QueueStatus {
            name: self.config.name.clone(),
            processing: self.is_processing() || state.current.is_some(),
            current_job: state.current.clone(),
            queue_size: state.pending.len(),
            next_scheduled_at,
            rate_limit: state.limiter.status(now),
        }
    }

    /// Pending jobs in dispatch order.
    pub fn queued_jobs(&self) -> Vec<QueuedJobView<J::Summary>> {
        let now = Instant::now();
        let state = self.state.lock();
        state
            .pending
            .values()
            .map(|job| QueuedJobView {
                id: job.id,
                priority: job.priority,
                attempts: job.attempts,
                scheduled_at: to_wall_clock(job.scheduled_at, now),
                created_at: job.created_at,
                summary: job.payload.summary(),
            })
            .collect()
    }

    /// Drop every pending job. Completions are not invoked; awaiting handles
    /// resolve to `QueueError::Abandoned`. The in-flight job is unaffected.
    pub fn clear(&self) -> usize {
        let dropped = {
            let mut state = self.state.lock();
            let dropped = std::mem::take(&mut state.pending);
            state.stats.total_dropped += dropped.len() as u64;
            dropped
        };
        let count = dropped.len();
        // Senders and callbacks are dropped here, outside the lock
        drop(dropped);

        self.metrics.jobs_dropped(count);
        self.metrics.depth(0);
        info!(queue = %self.config.name, dropped = count, "Queue cleared");
        count
    }

    pub fn reset_metrics(&self) {
        let mut state = self.state.lock();
        let outstanding = state.outstanding();
        state.stats.reset(Instant::now(), outstanding);
        info!(queue = %self.config.name, "Queue metrics reset");
    }
}

fn to_wall_clock(at: Instant, now: Instant) -> DateTime<Utc> {
    let offset = at.saturating_duration_since(now);
    Utc::now() + chrono::Duration::from_std(offset).unwrap_or(chrono::Duration::zero())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct Note(&'static str);

    impl QueueJob for Note {
        type Summary = &'static str;

        fn summary(&self) -> Self::Summary {
            self.0
        }
    }

    struct Echo;

    #[async_trait]
    impl JobProcessor<Note> for Echo {
        type Output = &'static str;

        async fn process(&self, job: &Note, _attempt: u32) -> Result<&'static str, JobError> {
            Ok(job.0)
        }

        fn name(&self) -> &'static str {
            "echo"
        }
    }

    #[test]
    fn test_pending_key_orders_priority_then_seq() {
        let mut keys = vec![
            (Reverse(Priority::Low), 0),
            (Reverse(Priority::High), 2),
            (Reverse(Priority::Normal), 1),
            (Reverse(Priority::High), 3),
        ];
        keys.sort();
        assert_eq!(
            keys,
            vec![
                (Reverse(Priority::High), 2),
                (Reverse(Priority::High), 3),
                (Reverse(Priority::Normal), 1),
                (Reverse(Priority::Low), 0),
            ]
        );
    }

    #[tokio::test]
    async fn test_enqueue_does_not_process() {
        let queue = JobQueue::new(QueueConfig::new("test"), Echo);
        queue.enqueue_detached(Note("a"), Priority::Normal);

        assert_eq!(queue.size(), 1);
        assert_eq!(queue.metrics().total_processed, 0);
        assert!(!queue.status().processing);
    }

    #[tokio::test]
    async fn test_queued_jobs_lists_dispatch_order() {
        let queue = JobQueue::new(QueueConfig::new("test"), Echo);
        queue.enqueue_detached(Note("low"), Priority::Low);
        queue.enqueue_detached(Note("high"), Priority::High);

        let summaries: Vec<_> = queue.queued_jobs().into_iter().map(|j| j.summary).collect();
        assert_eq!(summaries, vec!["high", "low"]);
    }

    #[tokio::test]
    async fn test_handle_resolves_after_drain() {
        let queue = JobQueue::new(QueueConfig::new("test"), Echo);
        let handle = queue.enqueue(Note("hello"), Priority::Normal);

        assert!(matches!(queue.drain().await, DrainReport::Completed(_)));
        let outcome = handle.outcome().await.unwrap();
        assert_eq!(outcome.result, Ok("hello"));
        assert_eq!(outcome.attempts, 1);
    }
}
