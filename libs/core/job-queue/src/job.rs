//! Job and processor traits, priorities and completion plumbing.
//!
//! A queue is parameterized by a payload implementing [`QueueJob`] and a
//! processor implementing [`JobProcessor`]. The processor performs exactly one
//! attempt per call; retry scheduling belongs to the queue.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;
use uuid::Uuid;

use crate::error::{JobError, QueueError};

/// Identifier assigned to a job at enqueue time.
pub type JobId = Uuid;

/// Job priority. `High` jobs are always dispatched before `Normal`, and
/// `Normal` before `Low`.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Normal,
    High,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::High => "high",
            Priority::Normal => "normal",
            Priority::Low => "low",
        }
    }
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Payload stored in a queue.
///
/// `summary` is what status endpoints expose; keep personal data out of it.
pub trait QueueJob: Send + Sync + 'static {
    type Summary: Serialize + Clone + Send + 'static;

    fn summary(&self) -> Self::Summary;
}

/// Performs one attempt of a job.
///
/// # Example
///
/// ```rust,ignore
/// struct Printer;
///
/// #[async_trait]
/// impl JobProcessor<Note> for Printer {
///     type Output = ();
///
///     async fn process(&self, job: &Note, _attempt: u32) -> Result<(), JobError> {
///         println!("{}", job.text);
///         Ok(())
///     }
///
///     fn name(&self) -> &'static str {
///         "printer"
///     }
/// }
/// ```
#[async_trait]
pub trait JobProcessor<J: QueueJob>: Send + Sync + 'static {
    /// Value handed to the completion on success.
    type Output: Send + 'static;

    /// Run a single attempt. `attempt` starts at 1.
    async fn process(&self, job: &J, attempt: u32) -> Result<Self::Output, JobError>;

    /// Processor name for logs.
    fn name(&self) -> &'static str;
}

/// Terminal result of a job.
#[derive(Debug, Clone)]
pub struct JobOutcome<O> {
    pub job_id: JobId,
    /// Attempts made, including the final one.
    pub attempts: u32,
    pub result: Result<O, JobError>,
    pub finished_at: DateTime<Utc>,
}

impl<O> JobOutcome<O> {
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }
}

/// Boxed completion callback.
pub type CompletionCallback<O> = Box<dyn FnOnce(JobOutcome<O>) + Send + 'static>;

/// How a job reports its terminal outcome. Fired at most once.
pub(crate) enum Completion<O> {
    Callback(CompletionCallback<O>),
    Channel(oneshot::Sender<JobOutcome<O>>),
    None,
}

impl<O> Completion<O> {
    pub(crate) fn fire(self, outcome: JobOutcome<O>) {
        match self {
            Completion::Callback(callback) => callback(outcome),
            Completion::Channel(tx) => {
                // Receiver may have been dropped by a caller that stopped waiting
                let _ = tx.send(outcome);
            }
            Completion::None => {}
        }
    }
}

/// Awaitable handle returned by [`JobQueue::enqueue`](crate::JobQueue::enqueue).
#[derive(Debug)]
pub struct JobHandle<O> {
    id: JobId,
    rx: oneshot::Receiver<JobOutcome<O>>,
}

impl<O> JobHandle<O> {
    pub(crate) fn new(id: JobId, rx: oneshot::Receiver<JobOutcome<O>>) -> Self {
        Self { id, rx }
    }

    pub fn id(&self) -> JobId {
        self.id
    }

    /// Wait for the job to finish.
    ///
    /// Resolves to [`QueueError::Abandoned`] when the job was cleared from the
    /// queue (or the queue was dropped) before reaching a terminal state.
    pub async fn outcome(self) -> Result<JobOutcome<O>, QueueError> {
        self.rx.await.map_err(|_| QueueError::Abandoned(self.id))
    }
}

/// Public view of a pending job.
#[derive(Debug, Clone, Serialize)]
pub struct QueuedJobView<S> {
    pub id: JobId,
    pub priority: Priority,
    pub attempts: u32,
    pub scheduled_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub summary: S,
}
