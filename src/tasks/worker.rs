//! Worker loop: claim entries from one queue and drive their handlers.
//!
//! A [`Worker`] is a single-threaded, blocking loop; run several workers
//! against the same store for parallelism. Handler failures never escape the
//! loop: they become scheduled retries or terminal failure responses. Store
//! failures do escape, so a persistent outage surfaces as an error out of
//! [`Worker::work`] and process-level restart is the expected recovery.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::constants::DEFAULT_POLL_INTERVAL;
use crate::error::Result;
use crate::queue::{Entry, PutOptions, Queue};
use crate::tasks::{HandlerRegistry, TaskError, TaskInfo, TaskOutcome, TaskPayload};

/// Worker that takes tasks from one queue and executes them inline.
pub struct Worker {
    queue: Queue,
    registry: Arc<HandlerRegistry>,
    poll_every: Duration,
    shutdown: CancellationToken,
}

impl Worker {
    pub fn new(queue: Queue, registry: Arc<HandlerRegistry>) -> Self {
        Self {
            queue,
            registry,
            poll_every: DEFAULT_POLL_INTERVAL,
            shutdown: CancellationToken::new(),
        }
    }

    /// Idle-poll interval used when the queue is empty.
    pub fn poll_every(mut self, interval: Duration) -> Self {
        self.poll_every = interval;
        self
    }

    /// Use an externally owned shutdown token.
    pub fn with_shutdown(mut self, token: CancellationToken) -> Self {
        self.shutdown = token;
        self
    }

    /// Token that cancels this worker between claims. A task already
    /// running is finished first; no timeout is enforced on handlers.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Run tasks until the shutdown token is cancelled.
    ///
    /// Claims repeatedly; sleeps for the poll interval whenever the queue
    /// is empty. Store errors propagate out immediately.
    pub async fn work(&self) -> Result<()> {
        info!(queue = self.queue.name(), "worker starting");

        loop {
            if self.shutdown.is_cancelled() {
                info!(queue = self.queue.name(), "worker stopping");
                return Ok(());
            }
            match self.queue.get::<TaskPayload>().await? {
                Some(entry) => self.perform(entry).await?,
                None => {
                    tokio::select! {
                        _ = self.shutdown.cancelled() => {
                            info!(queue = self.queue.name(), "worker stopping");
                            return Ok(());
                        }
                        _ = tokio::time::sleep(self.poll_every) => {}
                    }
                }
            }
        }
    }

    /// Run at most one task.
    ///
    /// With `block` set, polls until a task arrives or the worker is
    /// cancelled; otherwise returns immediately when the queue is empty.
    /// Returns whether a task was performed.
    pub async fn work_one(&self, block: bool) -> Result<bool> {
        loop {
            if let Some(entry) = self.queue.get::<TaskPayload>().await? {
                self.perform(entry).await?;
                return Ok(true);
            }
            if !block {
                return Ok(false);
            }
            tokio::select! {
                _ = self.shutdown.cancelled() => return Ok(false),
                _ = tokio::time::sleep(self.poll_every) => {}
            }
        }
    }

    /// Execute one claimed entry.
    ///
    /// Handler outcomes are handled locally; only store errors from
    /// respond/re-put bubble up.
    async fn perform(&self, entry: Entry<TaskPayload>) -> Result<()> {
        let priority = entry.priority;
        let payload = entry.data;

        // A retry re-delivery responds against the entry that first
        // scheduled the task, not the re-queued row.
        let entry_id = payload.retry_of.unwrap_or(entry.entry_id);

        debug!(
            queue = self.queue.name(),
            entry_id,
            function = payload.function.as_str(),
            retries = payload.retries,
            "performing task"
        );

        let Some(handler) = self.registry.resolve(&payload.function) else {
            // Re-delivery cannot conjure up a handler; fail terminally.
            warn!(
                entry_id,
                function = payload.function.as_str(),
                "task handler not registered"
            );
            let outcome = TaskOutcome::Error(format!(
                "task handler `{}` is not registered",
                payload.function
            ));
            self.queue.respond(entry_id, &outcome, None).await?;
            return Ok(());
        };

        let info = TaskInfo {
            entry_id,
            retries: payload.retries,
            max_retries: payload.max_retries,
        };

        match handler.call(info, payload.args.clone()).await {
            Ok(value) => {
                self.queue
                    .respond(entry_id, &TaskOutcome::Result(value), None)
                    .await?;
                Ok(())
            }
            Err(error) => self.fail(entry_id, priority, payload, error).await,
        }
    }

    /// Fail one attempt: schedule a retry while budget remains, otherwise
    /// deliver a terminal failure response.
    async fn fail(
        &self,
        entry_id: i64,
        priority: i32,
        mut payload: TaskPayload,
        error: TaskError,
    ) -> Result<()> {
        if !error.fatal && payload.retries < payload.max_retries {
            payload.retries += 1;
            payload.retry_of = Some(entry_id);
            let retry_at = Utc::now()
                + payload
                    .retry_in_ms
                    .map(chrono::Duration::milliseconds)
                    .unwrap_or_else(chrono::Duration::zero);

            let requeued = self
                .queue
                .put_with(
                    &payload,
                    PutOptions {
                        schedule_at: Some(retry_at),
                        priority,
                    },
                )
                .await?;

            info!(
                entry_id,
                requeued_as = requeued.entry_id,
                retries = payload.retries,
                max_retries = payload.max_retries,
                "retrying failed task"
            );
            return Ok(());
        }

        warn!(entry_id, error = error.message.as_str(), "task failed");
        self.queue
            .respond(entry_id, &TaskOutcome::Error(error.message), None)
            .await?;
        Ok(())
    }
}
