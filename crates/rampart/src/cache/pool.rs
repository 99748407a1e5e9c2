// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Bounded pool for background rebuilds.

use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
};

use anyspawn::Spawner;
use tokio::sync::Semaphore;

/// Runs at most `workers` tasks at once and holds at most `queue` more waiting for a
/// worker. Anything beyond that is refused up front, so the pool never grows without
/// bound.
#[derive(Debug, Clone)]
pub(crate) struct RebuildPool {
    spawner: Spawner,
    workers: Arc<Semaphore>,
    pending: Arc<AtomicUsize>,
    capacity: usize,
}

impl RebuildPool {
    pub(crate) fn new(spawner: Spawner, workers: usize, queue: usize) -> Self {
        let workers = workers.max(1);
        Self {
            spawner,
            workers: Arc::new(Semaphore::new(workers)),
            pending: Arc::new(AtomicUsize::new(0)),
            capacity: workers.saturating_add(queue),
        }
    }

    /// Claims a slot for one task, or returns `None` if the pool is full.
    pub(crate) fn reserve(&self) -> Option<Slot> {
        let current = self.pending.load(Ordering::Acquire);
        if current < self.capacity {
            let prev = self.pending.fetch_add(1, Ordering::AcqRel);
            if prev < self.capacity {
                return Some(Slot { pool: self.clone() });
            }
            // Lost the race for the last slot
            self.pending.fetch_sub(1, Ordering::AcqRel);
        }
        None
    }

    /// Tasks queued or running.
    pub(crate) fn pending(&self) -> usize {
        self.pending.load(Ordering::Acquire)
    }
}

/// A claimed place in the pool. Dropping it without spawning frees the place.
#[derive(Debug)]
pub(crate) struct Slot {
    pool: RebuildPool,
}

impl Slot {
    /// Spawns `task`; it starts once a worker is free and frees the slot when it ends.
    pub(crate) fn spawn<F>(self, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let spawner = self.pool.spawner.clone();
        let workers = Arc::clone(&self.pool.workers);
        // Fire-and-forget; the slot travels with the task and is released on drop.
        drop(spawner.spawn(async move {
            let _slot = self;
            let Ok(_permit) = workers.acquire_owned().await else {
                return;
            };
            task.await;
        }));
    }
}

impl Drop for Slot {
    fn drop(&mut self) {
        self.pool.pending.fetch_sub(1, Ordering::AcqRel);
    }
}
