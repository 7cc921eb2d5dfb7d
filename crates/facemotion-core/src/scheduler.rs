use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::types::CoreError;

/// RAII guard for one unit of accelerator capacity.
///
/// Dropping the permit returns the slot to the pool; holders must keep it
/// alive for the full duration of the synthesis run, including failure paths.
pub struct SlotPermit {
    #[allow(dead_code)]
    permit: OwnedSemaphorePermit,
}

impl std::fmt::Debug for SlotPermit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SlotPermit").finish()
    }
}

/// Bounds concurrent synthesis runs to the number of execution slots.
///
/// Built on a tokio [`Semaphore`], which queues waiters fairly: permits are
/// granted in the order `acquire` was called, so admission is FIFO among
/// queued tasks and no task can starve.
#[derive(Debug, Clone)]
pub struct SlotPool {
    semaphore: Arc<Semaphore>,
    capacity: usize,
}

impl SlotPool {
    /// Create a pool with `slots` units of capacity (typically one per GPU).
    pub fn new(slots: usize) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(slots)),
            capacity: slots,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Slots not currently held.
    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// Wait for a slot.  Suspends the caller until one frees up; only the
    /// execution driver calls this, never the request path.
    pub async fn acquire(&self) -> Result<SlotPermit, CoreError> {
        Arc::clone(&self.semaphore)
            .acquire_owned()
            .await
            .map(|permit| SlotPermit { permit })
            .map_err(|_| CoreError::Shutdown)
    }

    /// Take a slot only if one is free right now.
    pub fn try_acquire(&self) -> Option<SlotPermit> {
        Arc::clone(&self.semaphore)
            .try_acquire_owned()
            .ok()
            .map(|permit| SlotPermit { permit })
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn permit_acquired_and_released() {
        let pool = SlotPool::new(2);

        let p1 = pool.try_acquire().expect("first permit");
        let p2 = pool.try_acquire().expect("second permit");
        assert!(pool.try_acquire().is_none(), "third permit should be denied");

        drop(p1);
        // After releasing one permit, a new acquisition should succeed.
        let _p3 = pool.try_acquire().expect("permit after release");
        drop(p2);
    }

    #[tokio::test]
    async fn acquire_waits_for_a_free_slot() {
        let pool = SlotPool::new(1);
        let held = pool.try_acquire().expect("first permit");

        // Release the slot after a short delay.
        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(50)).await;
            drop(held);
        });

        let acquired = tokio::time::timeout(
            std::time::Duration::from_secs(2),
            pool.acquire(),
        )
        .await
        .expect("acquire should not hang")
        .expect("pool is not shut down");
        drop(acquired);
    }

    #[test]
    fn capacity_is_reported() {
        let pool = SlotPool::new(3);
        assert_eq!(pool.capacity(), 3);
        assert_eq!(pool.available(), 3);
        let _p = pool.try_acquire().expect("permit");
        assert_eq!(pool.available(), 2);
    }
}
