//! Task queue
//!
//! A FIFO of task ids with blocking pop. Delivery is at-least-once: a
//! popped id that is never acknowledged comes back. The queue is optional;
//! see [`open`] and [`crate::worker::Worker`].

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use crate::db::Database;
use crate::error::Result;
use nimbus_config::QueueBackend;

pub mod memory;
pub mod sqlite;

pub use memory::MemoryQueue;
pub use sqlite::SqliteQueue;

/// How long a popped id stays invisible before it is handed out again
///
/// Longer than any single task run: the execute ceremony and the bulk S3
/// listing both finish well inside it, so a live worker never loses its
/// task to a second consumer.
pub const DEFAULT_LEASE: Duration = Duration::from_secs(10 * 60);

/// A popped task id
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub task_id: String,
    /// 1 on the first delivery, higher on redelivery
    pub attempt: u32,
}

#[async_trait]
pub trait TaskQueue: Send + Sync {
    /// Enqueue an id; pushing an id that is still queued is a no-op
    async fn push(&self, task_id: &str) -> Result<()>;

    /// Wait up to `timeout` for the next id
    async fn pop(&self, timeout: Duration) -> Result<Option<Delivery>>;

    /// Mark a delivery as done so it is not redelivered
    async fn ack(&self, delivery: &Delivery) -> Result<()>;

    fn backend(&self) -> &'static str;
}

/// Queue for the configured backend, `None` when queueing is disabled
pub fn open(backend: QueueBackend, db: &Database) -> Option<Arc<dyn TaskQueue>> {
    match backend {
        QueueBackend::Sqlite => Some(Arc::new(SqliteQueue::new(db.clone()))),
        QueueBackend::Memory => Some(Arc::new(MemoryQueue::new())),
        QueueBackend::None => {
            tracing::warn!("task queue disabled; submitted tasks stay pending");
            None
        }
    }
}
