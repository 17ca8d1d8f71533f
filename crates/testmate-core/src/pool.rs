//! Task pool bounding the number of concurrently running test processes
//!
//! The pool is a plain counting semaphore without a wait queue. Callers that
//! fail to get a slot retry after [`ACQUIRE_RETRY_INTERVAL`]; there is no
//! fairness between waiters.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tracing::error;

/// Delay between two acquisition attempts
pub const ACQUIRE_RETRY_INTERVAL: Duration = Duration::from_millis(64);

/// Counting semaphore with a fixed capacity
#[derive(Debug)]
pub struct TaskPool {
    capacity: usize,
    outstanding: AtomicUsize,
}

impl TaskPool {
    /// Create a pool; a capacity of 0 is raised to 1
    pub fn new(capacity: usize) -> Arc<Self> {
        Arc::new(Self {
            capacity: capacity.max(1),
            outstanding: AtomicUsize::new(0),
        })
    }

    /// Maximum number of slots
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of slots currently taken
    pub fn outstanding(&self) -> usize {
        self.outstanding.load(Ordering::Acquire)
    }

    /// Take one slot without waiting
    pub fn try_acquire(&self) -> bool {
        self.outstanding
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                (n < self.capacity).then_some(n + 1)
            })
            .is_ok()
    }

    /// Give one slot back
    pub fn release(&self) {
        let released = self
            .outstanding
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1));
        if released.is_err() {
            error!("TaskPool released more slots than were acquired");
        }
        debug_assert!(released.is_ok(), "TaskPool release without matching acquire");
    }

    /// Take one slot as a guard that releases it on drop
    pub fn try_acquire_permit(self: &Arc<Self>) -> Option<TaskPermit> {
        self.try_acquire().then(|| TaskPermit {
            pool: Arc::clone(self),
        })
    }

    /// Poll until a slot is free
    ///
    /// `cancelled` is checked before every attempt; once it returns true the
    /// wait ends with `None`.
    pub async fn acquire(self: &Arc<Self>, cancelled: impl Fn() -> bool) -> Option<TaskPermit> {
        loop {
            if cancelled() {
                return None;
            }
            if let Some(permit) = self.try_acquire_permit() {
                return Some(permit);
            }
            tokio::time::sleep(ACQUIRE_RETRY_INTERVAL).await;
        }
    }
}

/// One acquired pool slot
#[derive(Debug)]
pub struct TaskPermit {
    pool: Arc<TaskPool>,
}

impl Drop for TaskPermit {
    fn drop(&mut self) {
        self.pool.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicBool;

    #[test]
    fn test_capacity_is_respected() {
        let pool = TaskPool::new(2);
        assert!(pool.try_acquire());
        assert!(pool.try_acquire());
        assert!(!pool.try_acquire());
        assert_eq!(pool.outstanding(), 2);

        pool.release();
        assert_eq!(pool.outstanding(), 1);
        assert!(pool.try_acquire());
    }

    #[test]
    fn test_zero_capacity_is_raised() {
        let pool = TaskPool::new(0);
        assert_eq!(pool.capacity(), 1);
        assert!(pool.try_acquire());
    }

    #[test]
    fn test_permit_releases_on_drop() {
        let pool = TaskPool::new(1);
        {
            let permit = pool.try_acquire_permit();
            assert!(permit.is_some());
            assert!(pool.try_acquire_permit().is_none());
        }
        assert_eq!(pool.outstanding(), 0);
    }

    #[tokio::test]
    async fn test_acquire_waits_for_release() {
        let pool = TaskPool::new(1);
        let first = pool.try_acquire_permit().unwrap();

        let waiter = {
            let pool = Arc::clone(&pool);
            tokio::spawn(async move { pool.acquire(|| false).await.is_some() })
        };

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert!(!waiter.is_finished());
        drop(first);

        assert!(waiter.await.unwrap());
        assert_eq!(pool.outstanding(), 0);
    }

    #[tokio::test]
    async fn test_acquire_observes_cancellation() {
        let pool = TaskPool::new(1);
        let _held = pool.try_acquire_permit().unwrap();
        let cancelled = Arc::new(AtomicBool::new(false));

        let waiter = {
            let pool = Arc::clone(&pool);
            let cancelled = Arc::clone(&cancelled);
            tokio::spawn(async move { pool.acquire(|| cancelled.load(Ordering::SeqCst)).await })
        };

        tokio::time::sleep(Duration::from_millis(100)).await;
        cancelled.store(true, Ordering::SeqCst);
        assert!(waiter.await.unwrap().is_none());
        assert_eq!(pool.outstanding(), 1);
    }

    #[tokio::test]
    async fn test_outstanding_never_exceeds_capacity() {
        let pool = TaskPool::new(3);
        let peak = Arc::new(AtomicUsize::new(0));

        let tasks: Vec<_> = (0..12)
            .map(|_| {
                let pool = Arc::clone(&pool);
                let peak = Arc::clone(&peak);
                tokio::spawn(async move {
                    let _permit = pool.acquire(|| false).await.unwrap();
                    peak.fetch_max(pool.outstanding(), Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(20)).await;
                })
            })
            .collect();
        for task in tasks {
            task.await.unwrap();
        }

        assert!(peak.load(Ordering::SeqCst) <= 3);
        assert_eq!(pool.outstanding(), 0);
    }
}
