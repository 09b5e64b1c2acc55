use std::future::Future;
use std::sync::Arc;
use tokio::sync::{Semaphore, TryAcquireError};
use tokio::task::JoinHandle;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolRejection {
    Saturated,
    Closed,
}

/// Fixed number of execution slots for job bodies.
///
/// Spawning never waits for a slot: a full pool rejects the task.
pub struct WorkerPool {
    slots: Arc<Semaphore>,
    capacity: usize,
}

impl WorkerPool {
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: Arc::new(Semaphore::new(capacity)),
            capacity,
        }
    }

    /// Run `task` on its own tokio task if a slot is free. The slot is held
    /// until the task completes.
    pub fn try_spawn<F>(&self, task: F) -> Result<JoinHandle<()>, PoolRejection>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let permit = self.slots.clone().try_acquire_owned().map_err(|e| match e {
            TryAcquireError::NoPermits => PoolRejection::Saturated,
            TryAcquireError::Closed => PoolRejection::Closed,
        })?;
        Ok(tokio::spawn(async move {
            let _permit = permit;
            task.await;
        }))
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of tasks currently holding a slot.
    pub fn busy(&self) -> usize {
        self.capacity - self.slots.available_permits()
    }

    /// Refuse all further tasks. Running tasks are left alone.
    pub fn close(&self) {
        self.slots.close();
    }

    pub fn is_closed(&self) -> bool {
        self.slots.is_closed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::oneshot;

    #[tokio::test]
    async fn test_saturated_pool_rejects() {
        let pool = WorkerPool::new(1);
        let (release_tx, release_rx) = oneshot::channel::<()>();

        let handle = pool
            .try_spawn(async move {
                let _ = release_rx.await;
            })
            .unwrap();
        assert_eq!(pool.busy(), 1);
        assert_eq!(
            pool.try_spawn(async {}).unwrap_err(),
            PoolRejection::Saturated
        );

        release_tx.send(()).unwrap();
        handle.await.unwrap();
        assert_eq!(pool.busy(), 0);
        pool.try_spawn(async {}).unwrap().await.unwrap();
    }

    #[tokio::test]
    async fn test_closed_pool_rejects_but_running_tasks_finish() {
        let pool = WorkerPool::new(2);
        let (release_tx, release_rx) = oneshot::channel::<()>();
        let (done_tx, done_rx) = oneshot::channel::<()>();

        pool.try_spawn(async move {
            let _ = release_rx.await;
            let _ = done_tx.send(());
        })
        .unwrap();

        pool.close();
        assert!(pool.is_closed());
        assert_eq!(pool.try_spawn(async {}).unwrap_err(), PoolRejection::Closed);

        release_tx.send(()).unwrap();
        done_rx.await.unwrap();
    }
}
