//! Durable lease queue stored next to the tasks
//!
//! `pop` claims the oldest entry whose lease is empty or expired and leases
//! it; `ack` deletes it. A worker that dies between the two leaves the
//! lease to run out, after which the id is delivered again.

use async_trait::async_trait;
use std::time::Duration;
use tokio::sync::Notify;

use super::{DEFAULT_LEASE, Delivery, TaskQueue};
use crate::db::{Database, queue_repo};
use crate::error::{ControlPlaneError, Result};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(250);

pub struct SqliteQueue {
    db: Database,
    lease: Duration,
    poll_interval: Duration,
    notify: Notify,
}

fn stamp(at: chrono::DateTime<chrono::Utc>) -> String {
    at.to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

fn unavailable(err: impl std::fmt::Display) -> ControlPlaneError {
    ControlPlaneError::QueueUnavailable(err.to_string())
}

impl SqliteQueue {
    pub fn new(db: Database) -> Self {
        Self {
            db,
            lease: DEFAULT_LEASE,
            poll_interval: DEFAULT_POLL_INTERVAL,
            notify: Notify::new(),
        }
    }

    pub fn with_lease(mut self, lease: Duration) -> Self {
        self.lease = lease;
        self
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    fn try_claim(&self) -> Result<Option<Delivery>> {
        let now = chrono::Utc::now();
        let lease = chrono::Duration::from_std(self.lease).map_err(unavailable)?;
        let claimed =
            queue_repo::claim(&self.db, &stamp(now), &stamp(now + lease)).map_err(unavailable)?;
        Ok(claimed.map(|(task_id, attempt)| Delivery { task_id, attempt }))
    }

    pub fn len(&self) -> Result<u64> {
        queue_repo::len(&self.db).map_err(unavailable)
    }
}

#[async_trait]
impl TaskQueue for SqliteQueue {
    async fn push(&self, task_id: &str) -> Result<()> {
        let inserted =
            queue_repo::push(&self.db, task_id, &stamp(chrono::Utc::now())).map_err(unavailable)?;
        if inserted {
            self.notify.notify_one();
        } else {
            tracing::debug!(task_id, "already queued");
        }
        Ok(())
    }

    async fn pop(&self, timeout: Duration) -> Result<Option<Delivery>> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let notified = self.notify.notified();
            if let Some(delivery) = self.try_claim()? {
                if delivery.attempt > 1 {
                    tracing::info!(
                        task_id = %delivery.task_id,
                        attempt = delivery.attempt,
                        "redelivering task after expired lease"
                    );
                }
                return Ok(Some(delivery));
            }

            let now = tokio::time::Instant::now();
            if now >= deadline {
                return Ok(None);
            }
            // other processes may push too, so poll as well as listen
            let wait = self.poll_interval.min(deadline - now);
            let _ = tokio::time::timeout(wait, notified).await;
        }
    }

    async fn ack(&self, delivery: &Delivery) -> Result<()> {
        queue_repo::ack(&self.db, &delivery.task_id).map_err(unavailable)
    }

    fn backend(&self) -> &'static str {
        "sqlite"
    }
}
