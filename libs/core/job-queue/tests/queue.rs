//! Integration tests for the job queue
//!
//! Time-dependent scenarios run on a paused clock so backoff and rate-limit
//! windows are advanced explicitly.

use async_trait::async_trait;
use job_queue::{
    Backoff, DrainReport, DrainSummary, JobError, JobProcessor, JobQueue, Priority, QueueConfig,
    QueueError, QueueJob, RetryPolicy,
};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

struct Task(&'static str);

impl QueueJob for Task {
    type Summary = String;

    fn summary(&self) -> String {
        self.0.to_string()
    }
}

/// Processor that records every attempt and replays scripted failures.
#[derive(Default)]
struct Scripted {
    attempts: Mutex<Vec<(&'static str, u32)>>,
    failures: Mutex<HashMap<&'static str, VecDeque<JobError>>>,
    delay: Option<Duration>,
}

impl Scripted {
    fn failing(self, label: &'static str, errors: Vec<JobError>) -> Self {
        self.failures.lock().insert(label, errors.into());
        self
    }

    fn slow(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    fn order(&self) -> Vec<&'static str> {
        self.attempts.lock().iter().map(|(label, _)| *label).collect()
    }
}

#[async_trait]
impl JobProcessor<Task> for Scripted {
    type Output = &'static str;

    async fn process(&self, job: &Task, attempt: u32) -> Result<&'static str, JobError> {
        self.attempts.lock().push((job.0, attempt));

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let scripted = self
            .failures
            .lock()
            .get_mut(job.0)
            .and_then(|errors| errors.pop_front());
        match scripted {
            Some(error) => Err(error),
            None => Ok(job.0),
        }
    }

    fn name(&self) -> &'static str {
        "scripted"
    }
}

fn config() -> QueueConfig {
    QueueConfig::new("test").with_rate_limit(100, Duration::from_secs(60))
}

fn completed(report: DrainReport) -> DrainSummary {
    match report {
        DrainReport::Completed(summary) => summary,
        DrainReport::Busy => panic!("drain unexpectedly busy"),
    }
}

#[tokio::test]
async fn test_drains_by_priority() {
    let queue = JobQueue::new(config(), Scripted::default());

    queue.enqueue_detached(Task("low"), Priority::Low);
    queue.enqueue_detached(Task("high"), Priority::High);
    queue.enqueue_detached(Task("normal"), Priority::Normal);

    let summary = completed(queue.drain().await);
    assert_eq!(summary.succeeded, 3);
    assert_eq!(queue.processor().order(), vec!["high", "normal", "low"]);
}

#[tokio::test]
async fn test_fifo_within_priority() {
    let queue = JobQueue::new(config(), Scripted::default());

    queue.enqueue_detached(Task("n1"), Priority::Normal);
    queue.enqueue_detached(Task("h1"), Priority::High);
    queue.enqueue_detached(Task("n2"), Priority::Normal);
    queue.enqueue_detached(Task("h2"), Priority::High);
    queue.enqueue_detached(Task("n3"), Priority::Normal);

    queue.drain().await;
    assert_eq!(queue.processor().order(), vec!["h1", "h2", "n1", "n2", "n3"]);
}

#[tokio::test(start_paused = true)]
async fn test_transient_failure_is_retried_with_backoff() {
    let processor = Scripted::default().failing("flaky", vec![JobError::transient("timeout")]);
    let queue = JobQueue::new(config(), processor);
    let handle = queue.enqueue(Task("flaky"), Priority::Normal);

    let first = completed(queue.drain().await);
    assert_eq!(first.retried, 1);
    assert_eq!(queue.size(), 1);
    assert!(first.next_wake.is_some());

    // Not eligible until the 1 s base delay has passed
    let early = completed(queue.drain().await);
    assert_eq!(early.attempted, 0);

    tokio::time::advance(Duration::from_secs(1)).await;
    let second = completed(queue.drain().await);
    assert_eq!(second.succeeded, 1);

    let outcome = handle.outcome().await.unwrap();
    assert_eq!(outcome.result, Ok("flaky"));
    assert_eq!(outcome.attempts, 2);
    assert_eq!(queue.metrics().total_retried, 1);
}

#[tokio::test(start_paused = true)]
async fn test_retry_keeps_priority_position() {
    let processor = Scripted::default().failing("a", vec![JobError::transient("busy")]);
    let queue = JobQueue::new(config(), processor);

    queue.enqueue_detached(Task("a"), Priority::Normal);
    queue.drain().await;

    queue.enqueue_detached(Task("b"), Priority::Normal);
    tokio::time::advance(Duration::from_secs(1)).await;
    queue.drain().await;

    // "a" was enqueued first, so its retry goes ahead of "b"
    assert_eq!(queue.processor().order(), vec!["a", "a", "b"]);
}

#[tokio::test]
async fn test_permanent_failure_is_not_retried() {
    let processor = Scripted::default().failing("bad", vec![JobError::permanent("invalid address")]);
    let queue = JobQueue::new(config(), processor);
    let handle = queue.enqueue(Task("bad"), Priority::High);

    let summary = completed(queue.drain().await);
    assert_eq!(summary.failed, 1);
    assert_eq!(summary.retried, 0);

    let outcome = handle.outcome().await.unwrap();
    assert_eq!(outcome.attempts, 1);
    assert_eq!(outcome.result, Err(JobError::permanent("invalid address")));
    assert_eq!(queue.size(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_gives_up_after_max_attempts() {
    let processor = Scripted::default().failing(
        "down",
        vec![
            JobError::transient("refused"),
            JobError::transient("refused"),
            JobError::transient("refused"),
            JobError::transient("refused"),
        ],
    );
    let queue = JobQueue::new(config(), processor);
    let handle = queue.enqueue(Task("down"), Priority::Normal);

    queue.drain().await;
    tokio::time::advance(Duration::from_secs(1)).await;
    queue.drain().await;
    tokio::time::advance(Duration::from_secs(2)).await;
    let last = completed(queue.drain().await);
    assert_eq!(last.failed, 1);

    let outcome = handle.outcome().await.unwrap();
    assert_eq!(outcome.attempts, 3);
    assert!(outcome.result.is_err());

    let metrics = queue.metrics();
    assert_eq!(metrics.total_failed, 1);
    assert_eq!(metrics.total_retried, 2);
    assert_eq!(queue.size(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_rate_limited_error_does_not_consume_attempts() {
    let processor = Scripted::default().failing(
        "throttled",
        vec![
            JobError::rate_limited("slow down"),
            JobError::rate_limited("slow down"),
        ],
    );
    let retry = RetryPolicy {
        max_attempts: 1,
        backoff: Backoff::Fixed,
        ..RetryPolicy::default()
    };
    let queue = JobQueue::new(config().with_retry(retry), processor);
    let handle = queue.enqueue(Task("throttled"), Priority::Normal);

    for _ in 0..3 {
        queue.drain().await;
        tokio::time::advance(Duration::from_secs(1)).await;
    }

    let outcome = handle.outcome().await.unwrap();
    assert_eq!(outcome.result, Ok("throttled"));
    assert_eq!(outcome.attempts, 3);
}

#[tokio::test(start_paused = true)]
async fn test_attempt_timeout_is_transient() {
    let retry = RetryPolicy {
        max_attempts: 1,
        ..RetryPolicy::default()
    };
    let queue = JobQueue::new(
        config()
            .with_job_timeout(Duration::from_millis(50))
            .with_retry(retry),
        Scripted::default().slow(Duration::from_secs(5)),
    );
    let handle = queue.enqueue(Task("stuck"), Priority::Normal);

    queue.drain().await;

    let outcome = handle.outcome().await.unwrap();
    let error = outcome.result.unwrap_err();
    assert_eq!(error, JobError::Timeout(50));
    assert!(error.is_retryable());
}

#[tokio::test(start_paused = true)]
async fn test_cancelled_drain_returns_job_to_queue() {
    let queue = JobQueue::new(config(), Scripted::default().slow(Duration::from_secs(5)));
    let handle = queue.enqueue(Task("slow"), Priority::High);

    let cancelled = tokio::time::timeout(Duration::from_secs(1), queue.drain()).await;
    assert!(cancelled.is_err());

    let status = queue.status();
    assert_eq!(status.queue_size, 1);
    assert!(!status.processing);
    assert!(status.current_job.is_none());
    assert_eq!(queue.queued_jobs()[0].attempts, 0);

    completed(queue.drain().await);

    let outcome = handle.outcome().await.unwrap();
    assert_eq!(outcome.result, Ok("slow"));
    assert_eq!(outcome.attempts, 1);
    assert_eq!(queue.metrics().total_processed, 1);
    assert_eq!(queue.processor().order(), vec!["slow", "slow"]);
}

#[tokio::test(start_paused = true)]
async fn test_rate_limit_defers_excess_jobs() {
    let queue = JobQueue::new(
        QueueConfig::new("test").with_rate_limit(2, Duration::from_secs(60)),
        Scripted::default(),
    );
    for label in ["a", "b", "c"] {
        queue.enqueue_detached(Task(label), Priority::Normal);
    }

    let first = completed(queue.drain().await);
    assert_eq!(first.succeeded, 2);
    assert!(first.rate_limited);
    assert_eq!(queue.size(), 1);
    assert_eq!(queue.status().rate_limit.available, 0);

    tokio::time::advance(Duration::from_secs(30)).await;
    assert_eq!(completed(queue.drain().await).attempted, 0);

    tokio::time::advance(Duration::from_secs(30)).await;
    let second = completed(queue.drain().await);
    assert_eq!(second.succeeded, 1);
    assert_eq!(queue.processor().order(), vec!["a", "b", "c"]);
}

#[tokio::test]
async fn test_clear_drops_pending_without_callbacks() {
    let queue = JobQueue::new(config(), Scripted::default());
    let fired = Arc::new(AtomicU32::new(0));

    for label in ["one", "two"] {
        let fired = fired.clone();
        queue.enqueue_with_callback(Task(label), Priority::Normal, move |_| {
            fired.fetch_add(1, Ordering::SeqCst);
        });
    }
    let handle = queue.enqueue(Task("three"), Priority::Low);
    let id = handle.id();

    assert_eq!(queue.clear(), 3);
    assert_eq!(queue.size(), 0);

    queue.drain().await;
    assert_eq!(fired.load(Ordering::SeqCst), 0);
    assert!(queue.processor().order().is_empty());
    assert_eq!(handle.outcome().await.unwrap_err(), QueueError::Abandoned(id));
    assert_eq!(queue.metrics().total_dropped, 3);
}

#[tokio::test]
async fn test_callback_fires_once_with_outcome() {
    let queue = JobQueue::new(config(), Scripted::default());
    let outcomes = Arc::new(Mutex::new(Vec::new()));

    let sink = outcomes.clone();
    let id = queue.enqueue_with_callback(Task("cb"), Priority::High, move |outcome| {
        sink.lock().push(outcome);
    });

    queue.drain().await;
    queue.drain().await;

    let outcomes = outcomes.lock();
    assert_eq!(outcomes.len(), 1);
    assert_eq!(outcomes[0].job_id, id);
    assert!(outcomes[0].is_success());
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_drain_reports_busy() {
    let queue = Arc::new(JobQueue::new(
        config(),
        Scripted::default().slow(Duration::from_secs(1)),
    ));
    queue.enqueue_detached(Task("slow"), Priority::Normal);

    let background = tokio::spawn({
        let queue = queue.clone();
        async move { queue.drain().await }
    });
    while !queue.is_processing() {
        tokio::task::yield_now().await;
    }

    assert_eq!(queue.drain().await, DrainReport::Busy);
    let status = queue.status();
    assert!(status.processing);
    assert_eq!(status.current_job.map(|job| job.attempt), Some(1));

    let summary = completed(background.await.unwrap());
    assert_eq!(summary.succeeded, 1);
    assert!(!queue.is_processing());
}

#[tokio::test(start_paused = true)]
async fn test_run_loop_processes_until_shutdown() {
    let queue = Arc::new(JobQueue::new(config(), Scripted::default()));
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let worker = tokio::spawn({
        let queue = queue.clone();
        async move { queue.run(shutdown_rx).await }
    });

    let handle = queue.enqueue(Task("looped"), Priority::Normal);
    let outcome = handle.outcome().await.unwrap();
    assert_eq!(outcome.result, Ok("looped"));

    shutdown_tx.send(true).unwrap();
    worker.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_run_loop_wakes_for_scheduled_retry() {
    let processor = Scripted::default().failing("retry", vec![JobError::transient("reset")]);
    let queue = Arc::new(JobQueue::new(
        config().with_poll_interval(Duration::from_secs(3600)),
        processor,
    ));
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let worker = tokio::spawn({
        let queue = queue.clone();
        async move { queue.run(shutdown_rx).await }
    });

    let outcome = queue
        .enqueue(Task("retry"), Priority::Normal)
        .outcome()
        .await
        .unwrap();
    assert_eq!(outcome.attempts, 2);

    drop(shutdown_tx);
    worker.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_metrics_accounting_identity() {
    let processor = Scripted::default()
        .failing("bad", vec![JobError::permanent("rejected")])
        .failing("flaky", vec![JobError::transient("reset")]);
    let queue = JobQueue::new(config(), processor);

    for (label, priority) in [
        ("ok", Priority::High),
        ("bad", Priority::Normal),
        ("flaky", Priority::Low),
        ("later", Priority::Low),
    ] {
        queue.enqueue_detached(Task(label), priority);
    }
    queue.drain().await;

    let metrics = queue.metrics();
    assert_eq!(metrics.total_queued, 4);
    assert_eq!(metrics.total_processed, 2);
    assert_eq!(metrics.total_failed, 1);
    assert_eq!(
        metrics.total_queued,
        metrics.total_processed
            + metrics.total_failed
            + metrics.total_dropped
            + queue.size() as u64
    );
    assert!(metrics.last_processed_at.is_some());

    queue.reset_metrics();
    let reset = queue.metrics();
    assert_eq!(reset.total_processed, 0);
    assert_eq!(reset.total_queued, queue.size() as u64);
}
