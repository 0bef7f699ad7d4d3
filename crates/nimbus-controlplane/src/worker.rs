//! Queue-fed task worker
//!
//! ```text
//!  queue.pop(5s) ──► load task ──► pending → running
//!                                      │
//!                    credential ──► adapter ──► parse params ──► dispatch
//!                                                                  │
//!                         finish(task, completed | failed) ◄───────┘
//! ```
//!
//! Every early exit ends the task `failed` with a short reason. Adapter
//! errors are recorded verbatim; nothing is retried automatically.

use std::sync::Arc;
use std::time::Duration;

use nimbus_cloud::CloudCredentials;
use tokio::sync::watch;

use crate::db::{self, Database, credential_repo, task_repo};
use crate::error::{ControlPlaneError, Result};
use crate::model::{Task, TaskOutcome, TaskStatus};
use crate::operation::{self, Operation};
use crate::provider::ProviderFactory;
use crate::queue::TaskQueue;
use crate::secrets::SecretCipher;

pub const IDLE_BACKOFF: Duration = Duration::from_secs(5);
pub const POP_TIMEOUT: Duration = Duration::from_secs(5);
/// Pause after a failed pop so a broken queue does not spin
pub const ERROR_BACKOFF: Duration = Duration::from_secs(1);

pub const CREDENTIAL_NOT_FOUND: &str = "Credential not found";
pub const ADAPTER_INIT_FAILED: &str = "Failed to create cloud provider";

/// What [`Worker::process`] did with an id
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Processed {
    /// No task with that id; the id was stale
    Missing,
    /// The task was already terminal (a redelivery after completion)
    Skipped(TaskStatus),
    /// The task reached this terminal status
    Finished(TaskStatus),
}

#[derive(Clone)]
pub struct Worker {
    db: Database,
    queue: Option<Arc<dyn TaskQueue>>,
    factory: Arc<dyn ProviderFactory>,
    cipher: SecretCipher,
    idle_backoff: Duration,
    pop_timeout: Duration,
}

impl Worker {
    pub fn new(
        db: Database,
        queue: Option<Arc<dyn TaskQueue>>,
        factory: Arc<dyn ProviderFactory>,
        cipher: SecretCipher,
    ) -> Self {
        Self {
            db,
            queue,
            factory,
            cipher,
            idle_backoff: IDLE_BACKOFF,
            pop_timeout: POP_TIMEOUT,
        }
    }

    pub fn with_pop_timeout(mut self, pop_timeout: Duration) -> Self {
        self.pop_timeout = pop_timeout;
        self
    }

    pub fn with_idle_backoff(mut self, idle_backoff: Duration) -> Self {
        self.idle_backoff = idle_backoff;
        self
    }

    /// Consume the queue until `shutdown` turns true (or its sender is gone)
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        tracing::info!(
            queue = self.queue.as_ref().map(|q| q.backend()).unwrap_or("none"),
            "worker started"
        );

        loop {
            if *shutdown.borrow() {
                break;
            }

            let Some(queue) = self.queue.as_ref() else {
                tokio::select! {
                    _ = tokio::time::sleep(self.idle_backoff) => continue,
                    _ = shutdown.changed() => break,
                }
            };

            let popped = tokio::select! {
                popped = queue.pop(self.pop_timeout) => popped,
                _ = shutdown.changed() => break,
            };

            let delivery = match popped {
                Ok(Some(delivery)) => delivery,
                Ok(None) => continue,
                Err(e) => {
                    tracing::warn!(error = %e, "failed to pop task");
                    tokio::time::sleep(ERROR_BACKOFF).await;
                    continue;
                }
            };

            // Not cancellable mid-task: shutdown is only observed between tasks
            match self.process(&delivery.task_id).await {
                Ok(processed) => {
                    tracing::debug!(task_id = %delivery.task_id, ?processed, "task processed");
                    if let Err(e) = queue.ack(&delivery).await {
                        tracing::warn!(task_id = %delivery.task_id, error = %e, "ack failed");
                    }
                }
                Err(e) => {
                    // left unacked; the queue hands it out again
                    tracing::error!(task_id = %delivery.task_id, error = %e, "task processing failed");
                }
            }
        }

        tracing::info!("worker stopped");
    }

    /// Run one task to a terminal status
    pub async fn process(&self, task_id: &str) -> Result<Processed> {
        let Some(task) = task_repo::get(&self.db, task_id)? else {
            tracing::debug!(task_id, "dropping stale task id");
            return Ok(Processed::Missing);
        };

        let task = match task.status {
            status if status.is_terminal() => {
                tracing::info!(task_id, %status, "task already finished; skipping");
                return Ok(Processed::Skipped(status));
            }
            TaskStatus::Pending => {
                match task_repo::update_status(&self.db, task_id, TaskStatus::Running, &db::now()) {
                    Ok(task) => task,
                    Err(ControlPlaneError::Conflict(_)) => return self.reload_skipped(task_id),
                    Err(e) => return Err(e),
                }
            }
            // redelivered after a crash: run again, start_time stays
            _ => {
                tracing::info!(task_id, "resuming task left running");
                task
            }
        };

        let outcome = self.execute(&task).await;
        self.finish(&task, outcome)
    }

    fn reload_skipped(&self, task_id: &str) -> Result<Processed> {
        let status = task_repo::get(&self.db, task_id)?
            .map(|t| t.status)
            .ok_or_else(|| ControlPlaneError::not_found("Task"))?;
        Ok(Processed::Skipped(status))
    }

    async fn execute(&self, task: &Task) -> TaskOutcome {
        let credential = match credential_repo::find_by_id(&self.db, &task.credential_id) {
            Ok(Some(cred)) if cred.user_id == task.user_id => cred,
            Ok(_) => return TaskOutcome::Failed(CREDENTIAL_NOT_FOUND.to_string()),
            Err(e) => {
                tracing::error!(task_id = %task.id, error = %e, "credential lookup failed");
                return TaskOutcome::Failed(CREDENTIAL_NOT_FOUND.to_string());
            }
        };

        let secret = match self.cipher.open(&credential.sealed_secret) {
            Ok(secret) => secret,
            Err(e) => {
                tracing::error!(task_id = %task.id, error = %e, "credential secret unreadable");
                return TaskOutcome::Failed(ADAPTER_INIT_FAILED.to_string());
            }
        };

        let credentials = CloudCredentials::new(
            credential.access_key.clone(),
            secret,
            Some(credential.region.clone()),
        );
        let adapter = match self.factory.build(&credential.provider, credentials).await {
            Ok(adapter) => adapter,
            Err(e) => {
                tracing::error!(
                    task_id = %task.id,
                    provider = %credential.provider,
                    error = %e,
                    "error creating cloud provider"
                );
                return TaskOutcome::Failed(ADAPTER_INIT_FAILED.to_string());
            }
        };

        let op = match Operation::from_task(&task.task_type, &task.parameters) {
            Ok(op) => op,
            Err(e) => return TaskOutcome::Failed(operation::failure_reason(&e)),
        };

        tracing::info!(
            task_id = %task.id,
            user_id = %task.user_id,
            provider = %credential.provider,
            task_type = %op.task_type(),
            "executing task"
        );

        match op.run(adapter.as_ref()).await {
            Ok(payload) => TaskOutcome::Completed(payload),
            Err(e) => TaskOutcome::Failed(e.to_string()),
        }
    }

    fn finish(&self, task: &Task, outcome: TaskOutcome) -> Result<Processed> {
        if let TaskOutcome::Failed(reason) = &outcome {
            tracing::error!(task_id = %task.id, user_id = %task.user_id, reason, "task failed");
        }
        match task_repo::finish(&self.db, &task.id, &outcome, &db::now()) {
            Ok((task, _)) => Ok(Processed::Finished(task.status)),
            // another pass got there first; its status stands
            Err(ControlPlaneError::Conflict(msg)) => {
                tracing::warn!(task_id = %task.id, %msg, "task finished concurrently");
                self.reload_skipped(&task.id)
            }
            Err(e) => Err(e),
        }
    }
}
