// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Builder for [`CacheAsideStore`].

use std::{sync::Arc, time::Duration};

use anyspawn::Spawner;
use rampart_store::RemoteStore;
use tick::Clock;

use super::{CacheAsideStore, Inner, MutexRetry, Settings, pool::RebuildPool};
use crate::DistributedLock;

const DEFAULT_NULL_TTL: Duration = Duration::from_secs(2 * 60);
const DEFAULT_LOCK_TTL: Duration = Duration::from_secs(10);
const DEFAULT_REBUILD_WORKERS: usize = 10;
const DEFAULT_REBUILD_QUEUE: usize = 64;
const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(50);
const DEFAULT_RETRY_ATTEMPTS: u32 = 20;

/// Configures and creates a [`CacheAsideStore`].
///
/// Created by [`CacheAsideStore::builder`]. Every setting has a default:
///
/// | setting | default |
/// |---|---|
/// | [`null_ttl`](Self::null_ttl) | 2 minutes |
/// | [`lock_ttl`](Self::lock_ttl) | 10 seconds |
/// | [`rebuild_timeout`](Self::rebuild_timeout) | the lock TTL |
/// | [`rebuild_workers`](Self::rebuild_workers) | 10 |
/// | [`rebuild_queue`](Self::rebuild_queue) | 64 |
/// | [`spawner`](Self::spawner) | Tokio |
/// | [`mutex_retry`](Self::mutex_retry) | 50 ms, 20 attempts |
///
/// # Examples
///
/// ```
/// use std::time::Duration;
///
/// use rampart::CacheAsideStore;
/// use rampart_memory::MemoryStore;
/// use tick::Clock;
///
/// let clock = Clock::new_frozen();
/// let cache = CacheAsideStore::builder(MemoryStore::new(clock.clone()), clock)
///     .null_ttl(Duration::from_secs(30))
///     .lock_ttl(Duration::from_secs(5))
///     .rebuild_workers(4)
///     .build();
/// ```
#[derive(Debug)]
pub struct CacheAsideStoreBuilder<S> {
    store: S,
    clock: Clock,
    null_ttl: Duration,
    lock_ttl: Duration,
    rebuild_timeout: Option<Duration>,
    rebuild_workers: usize,
    rebuild_queue: usize,
    spawner: Option<Spawner>,
    mutex_retry: MutexRetry,
}

impl<S: RemoteStore + Clone> CacheAsideStoreBuilder<S> {
    pub(super) fn new(store: S, clock: Clock) -> Self {
        Self {
            store,
            clock,
            null_ttl: DEFAULT_NULL_TTL,
            lock_ttl: DEFAULT_LOCK_TTL,
            rebuild_timeout: None,
            rebuild_workers: DEFAULT_REBUILD_WORKERS,
            rebuild_queue: DEFAULT_REBUILD_QUEUE,
            spawner: None,
            mutex_retry: MutexRetry {
                delay: DEFAULT_RETRY_DELAY,
                attempts: DEFAULT_RETRY_ATTEMPTS,
            },
        }
    }

    /// Sets how long a null marker is kept for a key the loader reported absent.
    ///
    /// The loader runs at most once per key per window of this length.
    #[must_use]
    pub fn null_ttl(mut self, ttl: Duration) -> Self {
        self.null_ttl = ttl;
        self
    }

    /// Sets the TTL of rebuild locks.
    ///
    /// A background rebuild is abandoned once its lock would expire, counting the
    /// time it waited for a worker, so this should exceed the slowest expected loader.
    #[must_use]
    pub fn lock_ttl(mut self, ttl: Duration) -> Self {
        self.lock_ttl = ttl;
        self
    }

    /// Sets how long a background rebuild may run before it is abandoned.
    ///
    /// Defaults to the lock TTL. Whatever the setting, a rebuild gives up no later
    /// than its lock would expire.
    #[must_use]
    pub fn rebuild_timeout(mut self, timeout: Duration) -> Self {
        self.rebuild_timeout = Some(timeout);
        self
    }

    /// Sets how many background rebuilds may run at once. Zero is treated as one.
    #[must_use]
    pub fn rebuild_workers(mut self, workers: usize) -> Self {
        self.rebuild_workers = workers;
        self
    }

    /// Sets how many rebuilds may wait for a worker before new ones are refused.
    #[must_use]
    pub fn rebuild_queue(mut self, queue: usize) -> Self {
        self.rebuild_queue = queue;
        self
    }

    /// Sets the spawner background rebuilds run on.
    #[must_use]
    pub fn spawner(mut self, spawner: Spawner) -> Self {
        self.spawner = Some(spawner);
        self
    }

    /// Sets the pause between lock attempts in
    /// [`read_with_mutex`](CacheAsideStore::read_with_mutex) and how many attempts are
    /// made before giving up. Zero attempts is treated as one.
    #[must_use]
    pub fn mutex_retry(mut self, delay: Duration, attempts: u32) -> Self {
        self.mutex_retry = MutexRetry {
            delay,
            attempts: attempts.max(1),
        };
        self
    }

    /// Builds the store.
    #[must_use]
    pub fn build(self) -> CacheAsideStore<S> {
        let settings = Settings {
            null_ttl: self.null_ttl,
            lock_ttl: self.lock_ttl,
            rebuild_timeout: self.rebuild_timeout.unwrap_or(self.lock_ttl),
            mutex_retry: self.mutex_retry,
        };
        let pool = RebuildPool::new(
            self.spawner.unwrap_or_else(Spawner::new_tokio),
            self.rebuild_workers,
            self.rebuild_queue,
        );

        CacheAsideStore {
            inner: Arc::new(Inner {
                lock: DistributedLock::new(self.store.clone()),
                store: self.store,
                clock: self.clock,
                settings,
                pool,
            }),
        }
    }
}
