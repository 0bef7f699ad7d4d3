//! Process-local queue
//!
//! Popped ids are held in flight until acked. One that is still in flight
//! after the lease goes back to the front of the line, so delivery stays
//! at-least-once like the SQLite queue.

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::time::Duration;
use tokio::sync::{Mutex, Notify};
use tokio::time::Instant;

use super::{DEFAULT_LEASE, Delivery, TaskQueue};
use crate::error::Result;

#[derive(Default)]
struct Inner {
    ready: VecDeque<String>,
    /// popped, not yet acked; value is the lease expiry
    in_flight: HashMap<String, Instant>,
    /// deliveries so far per queued id
    attempts: HashMap<String, u32>,
}

impl Inner {
    /// Requeue ids whose lease ran out; returns the next expiry still pending
    fn reclaim(&mut self, now: Instant) -> Option<Instant> {
        let expired: Vec<String> = self
            .in_flight
            .iter()
            .filter(|(_, until)| **until <= now)
            .map(|(id, _)| id.clone())
            .collect();
        for task_id in expired {
            self.in_flight.remove(&task_id);
            if !self.ready.contains(&task_id) {
                self.ready.push_front(task_id);
            }
        }
        self.in_flight.values().min().copied()
    }
}

/// In-memory FIFO; contents are lost with the process
pub struct MemoryQueue {
    inner: Mutex<Inner>,
    notify: Notify,
    lease: Duration,
}

impl Default for MemoryQueue {
    fn default() -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            notify: Notify::new(),
            lease: DEFAULT_LEASE,
        }
    }
}

impl MemoryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_lease(mut self, lease: Duration) -> Self {
        self.lease = lease;
        self
    }

    /// Ids waiting to be popped; in-flight ids are not counted
    pub async fn len(&self) -> usize {
        self.inner.lock().await.ready.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    pub async fn in_flight(&self) -> usize {
        self.inner.lock().await.in_flight.len()
    }
}

#[async_trait]
impl TaskQueue for MemoryQueue {
    async fn push(&self, task_id: &str) -> Result<()> {
        let mut inner = self.inner.lock().await;
        if inner.ready.iter().any(|id| id == task_id) {
            return Ok(());
        }
        inner.ready.push_back(task_id.to_string());
        inner.attempts.entry(task_id.to_string()).or_insert(0);
        drop(inner);
        self.notify.notify_one();
        Ok(())
    }

    async fn pop(&self, timeout: Duration) -> Result<Option<Delivery>> {
        let deadline = Instant::now() + timeout;
        loop {
            let notified = self.notify.notified();
            let next_expiry = {
                let mut inner = self.inner.lock().await;
                let now = Instant::now();
                let next_expiry = inner.reclaim(now);
                if let Some(task_id) = inner.ready.pop_front() {
                    inner.in_flight.insert(task_id.clone(), now + self.lease);
                    let attempt = inner.attempts.entry(task_id.clone()).or_insert(0);
                    *attempt += 1;
                    if *attempt > 1 {
                        tracing::info!(task_id = %task_id, attempt = *attempt, "redelivering task");
                    }
                    return Ok(Some(Delivery {
                        task_id,
                        attempt: *attempt,
                    }));
                }
                next_expiry
            };

            let wake_at = next_expiry.map_or(deadline, |expiry| expiry.min(deadline));
            if tokio::time::timeout_at(wake_at, notified).await.is_err()
                && Instant::now() >= deadline
            {
                return Ok(None);
            }
        }
    }

    async fn ack(&self, delivery: &Delivery) -> Result<()> {
        let mut inner = self.inner.lock().await;
        inner.in_flight.remove(&delivery.task_id);
        if !inner.ready.iter().any(|id| *id == delivery.task_id) {
            inner.attempts.remove(&delivery.task_id);
        }
        Ok(())
    }

    fn backend(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_fifo_order() {
        let queue = MemoryQueue::new();
        queue.push("a").await.unwrap();
        queue.push("b").await.unwrap();

        let first = queue.pop(Duration::from_millis(10)).await.unwrap().unwrap();
        let second = queue.pop(Duration::from_millis(10)).await.unwrap().unwrap();
        assert_eq!(first.task_id, "a");
        assert_eq!(second.task_id, "b");
        assert_eq!(first.attempt, 1);
    }

    #[tokio::test]
    async fn test_push_is_idempotent_while_queued() {
        let queue = MemoryQueue::new();
        queue.push("a").await.unwrap();
        queue.push("a").await.unwrap();
        assert_eq!(queue.len().await, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_pop_times_out_when_empty() {
        let queue = MemoryQueue::new();
        let started = tokio::time::Instant::now();
        assert!(queue.pop(Duration::from_secs(5)).await.unwrap().is_none());
        assert!(started.elapsed() >= Duration::from_secs(5));
    }

    #[tokio::test(start_paused = true)]
    async fn test_pop_wakes_on_push() {
        let queue = Arc::new(MemoryQueue::new());
        let waiter = {
            let queue = queue.clone();
            tokio::spawn(async move { queue.pop(Duration::from_secs(5)).await })
        };
        tokio::time::sleep(Duration::from_secs(1)).await;
        queue.push("late").await.unwrap();

        let delivery = waiter.await.unwrap().unwrap().unwrap();
        assert_eq!(delivery.task_id, "late");
    }

    #[tokio::test]
    async fn test_repush_counts_attempts() {
        let queue = MemoryQueue::new();
        queue.push("a").await.unwrap();
        let first = queue.pop(Duration::from_millis(10)).await.unwrap().unwrap();
        queue.push("a").await.unwrap();
        let second = queue.pop(Duration::from_millis(10)).await.unwrap().unwrap();
        assert_eq!(first.attempt, 1);
        assert_eq!(second.attempt, 2);

        queue.ack(&second).await.unwrap();
        assert!(queue.is_empty().await);
        assert_eq!(queue.in_flight().await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unacked_delivery_returns_after_lease() {
        let queue = MemoryQueue::new();
        queue.push("a").await.unwrap();

        let first = queue.pop(Duration::from_millis(10)).await.unwrap().unwrap();
        assert_eq!(first.attempt, 1);
        // still leased
        assert!(queue.pop(Duration::from_secs(1)).await.unwrap().is_none());

        tokio::time::advance(DEFAULT_LEASE).await;
        let again = queue.pop(Duration::from_millis(10)).await.unwrap().unwrap();
        assert_eq!(again.task_id, "a");
        assert_eq!(again.attempt, 2);

        queue.ack(&again).await.unwrap();
        assert_eq!(queue.in_flight().await, 0);
        tokio::time::advance(DEFAULT_LEASE * 2).await;
        assert!(queue.pop(Duration::from_millis(10)).await.unwrap().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_waiting_pop_picks_up_expired_lease() {
        let queue = MemoryQueue::new().with_lease(Duration::from_secs(2));
        queue.push("a").await.unwrap();
        queue.pop(Duration::from_millis(10)).await.unwrap().unwrap();

        let started = Instant::now();
        let again = queue.pop(Duration::from_secs(5)).await.unwrap().unwrap();
        assert_eq!(again.attempt, 2);
        assert!(started.elapsed() >= Duration::from_secs(1));
        assert!(started.elapsed() < Duration::from_secs(5));
    }
}
