//! Task layer: schedule functions as queue entries and collect their results.
//!
//! This module builds a task-dispatch protocol on top of the queue engine.
//!
//! ## What
//!
//! - [`Tasker`] binds a stable name to an async handler function.
//! - [`Tasker::call`] captures arguments into a [`Task`], which
//!   [`Task::schedule`] turns into a queue entry and a [`QueuedTask`] handle.
//! - [`QueuedTask::result`] polls the response table for the outcome.
//! - [`HandlerRegistry`] resolves names back to handlers on the worker side;
//!   it is populated explicitly at process start, never by reflection.
//!
//! ## How
//!
//! ```no_run
//! use relq::tasks::{HandlerRegistry, ScheduleOptions, TaskError, TaskInfo, Tasker, Worker};
//! use std::sync::Arc;
//!
//! # async fn example(queue: relq::Queue) -> relq::Result<()> {
//! let double = Tasker::new("examples.double", |_info: TaskInfo, n: i64| async move {
//!     Ok::<_, TaskError>(n * 2)
//! });
//!
//! let mut registry = HandlerRegistry::new();
//! double.register(&mut registry)?;
//!
//! let queued = double.call(21).schedule(&queue, ScheduleOptions::default()).await?;
//!
//! let worker = Worker::new(queue.clone(), Arc::new(registry));
//! worker.work_one(true).await?;
//!
//! assert_eq!(queued.result().await?, Some(Ok(42)));
//! # Ok(())
//! # }
//! ```

mod worker;

pub use worker::Worker;

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::queue::{PutOptions, Queue};

/// Meta description of the current task, passed to handlers as their first
/// argument.
#[derive(Debug, Clone, Copy)]
pub struct TaskInfo {
    /// Id of the originating entry. Stable across retries: a re-delivered
    /// attempt sees the id of the entry that first scheduled the task, so
    /// results stay correlated.
    pub entry_id: i64,
    /// Re-deliveries so far; 0 on the first attempt
    pub retries: u32,
    /// Retry budget this task was scheduled with
    pub max_retries: u32,
}

/// A handler failure, tagged with whether re-delivery could help.
#[derive(Debug, Clone)]
pub struct TaskError {
    pub message: String,
    /// Fatal failures are never retried, regardless of remaining budget
    pub fatal: bool,
}

impl TaskError {
    /// A failure that may succeed on re-delivery.
    pub fn retryable(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            fatal: false,
        }
    }

    /// A failure that re-delivery cannot fix.
    pub fn fatal(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            fatal: true,
        }
    }
}

impl fmt::Display for TaskError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for TaskError {}

/// Terminal failure of a queued task, as reported through its response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskFailure {
    pub message: String,
}

impl fmt::Display for TaskFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "task failed: {}", self.message)
    }
}

impl std::error::Error for TaskFailure {}

/// Entry payload carried by a scheduled task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskPayload {
    /// Registered handler name
    pub function: String,
    /// Captured handler arguments, encoded
    pub args: serde_json::Value,
    /// Re-deliveries so far; monotone across attempts
    pub retries: u32,
    pub max_retries: u32,
    /// Delay before a retry becomes visible, if configured
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_in_ms: Option<i64>,
    /// Set on retry re-deliveries: the id of the original entry, used to
    /// correlate the eventual response
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_of: Option<i64>,
}

/// Response payload delivered for a finished task: either the handler's
/// result or a terminal failure description.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum TaskOutcome {
    #[serde(rename = "result")]
    Result(serde_json::Value),
    #[serde(rename = "error")]
    Error(String),
}

/// Type-erased task handler, as stored in the registry.
#[async_trait]
pub trait TaskHandler: Send + Sync {
    async fn call(
        &self,
        info: TaskInfo,
        args: serde_json::Value,
    ) -> std::result::Result<serde_json::Value, TaskError>;
}

struct FnHandler<F, A, R> {
    handler: F,
    _marker: PhantomData<fn(A) -> R>,
}

#[async_trait]
impl<F, Fut, A, R> TaskHandler for FnHandler<F, A, R>
where
    F: Fn(TaskInfo, A) -> Fut + Send + Sync,
    Fut: Future<Output = std::result::Result<R, TaskError>> + Send,
    A: DeserializeOwned + Send + Sync + 'static,
    R: Serialize + Send + Sync + 'static,
{
    async fn call(
        &self,
        info: TaskInfo,
        args: serde_json::Value,
    ) -> std::result::Result<serde_json::Value, TaskError> {
        // Malformed arguments will not improve on re-delivery
        let args: A = serde_json::from_value(args)
            .map_err(|e| TaskError::fatal(format!("invalid task arguments: {e}")))?;
        let value = (self.handler)(info, args).await?;
        serde_json::to_value(value)
            .map_err(|e| TaskError::fatal(format!("unencodable task result: {e}")))
    }
}

/// Name-to-handler map used by workers to resolve claimed tasks.
///
/// Populate it at process start with every [`Tasker`] the worker should
/// execute; a claimed task whose name is absent fails terminally.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: HashMap<String, Arc<dyn TaskHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler under its stable name.
    ///
    /// # Errors
    /// Returns [`Error::HandlerAlreadyRegistered`] when the name is taken.
    pub fn register(&mut self, name: &str, handler: Arc<dyn TaskHandler>) -> Result<()> {
        if self.handlers.contains_key(name) {
            return Err(Error::HandlerAlreadyRegistered {
                name: name.to_string(),
            });
        }
        self.handlers.insert(name.to_string(), handler);
        Ok(())
    }

    /// Resolve a name to its handler, or `None` if unregistered.
    pub fn resolve(&self, name: &str) -> Option<Arc<dyn TaskHandler>> {
        self.handlers.get(name).cloned()
    }
}

/// A registered, callable task template bound to a handler.
///
/// The name must be stable across producer and worker processes; a
/// namespaced string such as `"billing.send_invoice"` works well.
pub struct Tasker<A, R> {
    name: Arc<str>,
    handler: Arc<dyn TaskHandler>,
    _marker: PhantomData<fn(A) -> R>,
}

impl<A, R> Clone for Tasker<A, R> {
    fn clone(&self) -> Self {
        Self {
            name: Arc::clone(&self.name),
            handler: Arc::clone(&self.handler),
            _marker: PhantomData,
        }
    }
}

impl<A, R> Tasker<A, R>
where
    A: Serialize + DeserializeOwned + Send + Sync + 'static,
    R: Serialize + DeserializeOwned + Send + Sync + 'static,
{
    /// Wrap an async handler function into a schedulable task template.
    ///
    /// The handler receives a [`TaskInfo`] first, then its decoded
    /// arguments.
    pub fn new<F, Fut>(name: impl Into<String>, handler: F) -> Self
    where
        F: Fn(TaskInfo, A) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<R, TaskError>> + Send + 'static,
    {
        Self {
            name: Arc::from(name.into()),
            handler: Arc::new(FnHandler {
                handler,
                _marker: PhantomData,
            }),
            _marker: PhantomData,
        }
    }

    /// The stable name this tasker registers and schedules under.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Add this tasker's handler to a registry.
    pub fn register(&self, registry: &mut HandlerRegistry) -> Result<()> {
        registry.register(&self.name, Arc::clone(&self.handler))
    }

    /// Capture arguments into an unscheduled [`Task`].
    pub fn call(&self, args: A) -> Task<A, R> {
        Task {
            name: Arc::clone(&self.name),
            args,
            _marker: PhantomData,
        }
    }

    /// Reconstruct a handle for a task already in flight, by entry id,
    /// without re-scheduling it.
    pub fn retrieve(&self, queue: &Queue, entry_id: i64) -> QueuedTask<R> {
        QueuedTask {
            queue: queue.clone(),
            entry_id,
            _marker: PhantomData,
        }
    }
}

/// Options for [`Task::schedule`].
#[derive(Debug, Clone, Copy, Default)]
pub struct ScheduleOptions {
    /// Earliest instant the task becomes claimable
    pub schedule_at: Option<DateTime<Utc>>,
    /// Claim priority; higher runs first
    pub priority: i32,
    /// Retry budget; 0 means a single attempt
    pub max_retries: u32,
    /// Delay between a failed attempt and its retry becoming visible
    pub retry_in: Option<Duration>,
}

/// A task with captured arguments, not yet queued.
pub struct Task<A, R> {
    name: Arc<str>,
    args: A,
    _marker: PhantomData<fn() -> R>,
}

impl<A, R> Task<A, R>
where
    A: Serialize + Send + Sync,
    R: DeserializeOwned,
{
    /// Schedule this task on a queue.
    pub async fn schedule(&self, queue: &Queue, options: ScheduleOptions) -> Result<QueuedTask<R>> {
        let payload = TaskPayload {
            function: self.name.to_string(),
            args: serde_json::to_value(&self.args)?,
            retries: 0,
            max_retries: options.max_retries,
            retry_in_ms: options
                .retry_in
                .map(|delay| delay.as_millis().min(i64::MAX as u128) as i64),
            retry_of: None,
        };
        let receipt = queue
            .put_with(
                &payload,
                PutOptions {
                    schedule_at: options.schedule_at,
                    priority: options.priority,
                },
            )
            .await?;
        Ok(QueuedTask {
            queue: queue.clone(),
            entry_id: receipt.entry_id,
            _marker: PhantomData,
        })
    }
}

/// Handle to a scheduled task instance, used to poll for its result.
pub struct QueuedTask<R> {
    queue: Queue,
    entry_id: i64,
    _marker: PhantomData<fn() -> R>,
}

impl<R> Clone for QueuedTask<R> {
    fn clone(&self) -> Self {
        Self {
            queue: self.queue.clone(),
            entry_id: self.entry_id,
            _marker: PhantomData,
        }
    }
}

impl<R: DeserializeOwned> QueuedTask<R> {
    /// The entry id this task was scheduled as.
    pub fn entry_id(&self) -> i64 {
        self.entry_id
    }

    /// Poll for the task's outcome.
    ///
    /// `None` means no response has been delivered yet; a task that is
    /// still retrying reports nothing until its final attempt settles.
    pub async fn result(&self) -> Result<Option<std::result::Result<R, TaskFailure>>> {
        let responses = self.queue.responses(self.entry_id).await?;
        let Some(first) = responses.first() else {
            return Ok(None);
        };
        match first.decode::<TaskOutcome>()? {
            TaskOutcome::Result(value) => Ok(Some(Ok(serde_json::from_value(value)?))),
            TaskOutcome::Error(message) => Ok(Some(Err(TaskFailure { message }))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outcome_serializes_as_tagged_object() {
        let success = serde_json::to_value(TaskOutcome::Result(serde_json::json!(7))).unwrap();
        assert_eq!(success, serde_json::json!({"result": 7}));

        let failure = serde_json::to_value(TaskOutcome::Error("boom".into())).unwrap();
        assert_eq!(failure, serde_json::json!({"error": "boom"}));
    }

    #[test]
    fn payload_roundtrips_without_optional_fields() {
        let payload = TaskPayload {
            function: "ns.task".into(),
            args: serde_json::json!([1, 2]),
            retries: 0,
            max_retries: 3,
            retry_in_ms: None,
            retry_of: None,
        };
        let encoded = serde_json::to_value(&payload).unwrap();
        assert!(encoded.get("retry_of").is_none());
        let decoded: TaskPayload = serde_json::from_value(encoded).unwrap();
        assert_eq!(decoded.function, "ns.task");
        assert_eq!(decoded.max_retries, 3);
        assert_eq!(decoded.retry_of, None);
    }

    #[test]
    fn duplicate_registration_is_rejected() {
        let tasker = Tasker::new("dup.task", |_info: TaskInfo, n: i64| async move {
            Ok::<_, TaskError>(n)
        });
        let mut registry = HandlerRegistry::new();
        tasker.register(&mut registry).unwrap();
        assert!(matches!(
            tasker.register(&mut registry),
            Err(crate::Error::HandlerAlreadyRegistered { .. })
        ));
    }
}
