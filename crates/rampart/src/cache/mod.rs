// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Read-through caching that shields the source of truth.
//!
//! [`CacheAsideStore`] offers three read strategies over the same store:
//!
//! - [`read`](CacheAsideStore::read) caches absence as a null marker, so a key that
//!   never exists reaches the loader at most once per null TTL (cache penetration).
//! - [`read_with_logical_expire`](CacheAsideStore::read_with_logical_expire) serves
//!   hot keys from entries that never physically expire. An expired entry is served
//!   stale while one background task, guarded by a [`DistributedLock`], rebuilds it
//!   (cache breakdown).
//! - [`read_with_mutex`](CacheAsideStore::read_with_mutex) makes concurrent callers
//!   wait for one rebuild instead of serving stale data.

mod builder;
mod entry;
mod pool;

use std::{
    panic::AssertUnwindSafe,
    sync::Arc,
    time::{Duration, Instant},
};

use futures::FutureExt as _;
use rampart_store::{Error, ErrorKind, RemoteStore, Result};
use serde::{Serialize, de::DeserializeOwned};
use tick::{Clock, FutureExt as _};
use tracing::{Instrument as _, debug, error, warn};

pub use builder::CacheAsideStoreBuilder;
use entry::{Lookup, NULL_MARKER};
use pool::RebuildPool;

use crate::{CacheKey, DistributedLock, LockToken};

/// Error type loaders may fail with.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

const REBUILD_HOLDER: &str = "rebuild";
const MUTEX_HOLDER: &str = "mutex";

#[derive(Debug, Clone, Copy)]
struct MutexRetry {
    delay: Duration,
    attempts: u32,
}

#[derive(Debug)]
struct Settings {
    null_ttl: Duration,
    lock_ttl: Duration,
    rebuild_timeout: Duration,
    mutex_retry: MutexRetry,
}

/// A cache-aside layer over a [`RemoteStore`].
///
/// Loaders are async closures returning `Ok(Some(value))` for a present entity,
/// `Ok(None)` for one the source of truth does not have, and `Err` when the lookup
/// itself failed. Values travel as JSON.
///
/// Clones share the store, the settings and the rebuild pool.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
///
/// use rampart::{CacheAsideStore, CacheKey};
/// use rampart_memory::MemoryStore;
/// use tick::Clock;
/// # futures::executor::block_on(async {
///
/// let clock = Clock::new_frozen();
/// let cache = CacheAsideStore::builder(MemoryStore::new(clock.clone()), clock).build();
/// let key = CacheKey::new("shop", 1);
///
/// let name = cache
///     .read(&key, || async { Ok::<_, std::io::Error>(Some("Noodles".to_string())) }, Duration::from_secs(60))
///     .await?;
/// assert_eq!(name.as_deref(), Some("Noodles"));
///
/// // Served from the cache; the second loader is never called.
/// let name = cache
///     .read(&key, || async { Ok::<_, std::io::Error>(Some("Burgers".to_string())) }, Duration::from_secs(60))
///     .await?;
/// assert_eq!(name.as_deref(), Some("Noodles"));
/// # Ok::<(), rampart::Error>(())
/// # });
/// ```
#[derive(Debug)]
pub struct CacheAsideStore<S> {
    inner: Arc<Inner<S>>,
}

impl<S> Clone for CacheAsideStore<S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

#[derive(Debug)]
struct Inner<S> {
    store: S,
    lock: DistributedLock<S>,
    clock: Clock,
    settings: Settings,
    pool: RebuildPool,
}

impl<S: RemoteStore + Clone> CacheAsideStore<S> {
    /// Starts configuring a cache over `store`, taking time from `clock`.
    pub fn builder(store: S, clock: Clock) -> CacheAsideStoreBuilder<S> {
        CacheAsideStoreBuilder::new(store, clock)
    }
}

impl<S: RemoteStore + 'static> CacheAsideStore<S> {
    /// Reads a plain entry, calling `loader` on a miss.
    ///
    /// A hit returns the cached value. A null marker returns `None` without calling
    /// the loader. On a miss the loader's value is cached for `ttl`, or a null marker
    /// for the configured null TTL if the loader found nothing.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::LoaderFailure`] if the loader fails, in which case
    /// nothing is cached, [`ErrorKind::Corrupted`] if the cached value cannot be
    /// decoded, and [`ErrorKind::RemoteStoreUnavailable`] if the store is down.
    pub async fn read<V, F, Fut, E>(&self, key: &CacheKey, loader: F, ttl: Duration) -> Result<Option<V>>
    where
        V: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = std::result::Result<Option<V>, E>>,
        E: Into<BoxError>,
    {
        match self.inner.lookup(key).await? {
            Lookup::Hit(value) => Ok(Some(value)),
            Lookup::Absent => Ok(None),
            Lookup::Miss => self.inner.fill(key, loader, ttl).await,
        }
    }

    /// Reads a wrapped entry, rebuilding it in the background once its logical
    /// expiry has passed.
    ///
    /// Never waits for the loader. A fresh entry is returned without touching the
    /// lock. An expired one is returned as is; if this caller wins the rebuild lock,
    /// a background task loads a new value, wraps it with an expiry `ttl` from now
    /// and releases the lock whether the loader succeeds, fails, panics or times out.
    ///
    /// A missing entry returns `None` and never calls the loader: hot keys are
    /// expected to be warmed with
    /// [`set_with_logical_expire`](Self::set_with_logical_expire) beforehand.
    ///
    /// If the rebuild pool is saturated the lock is given back at once and the stale
    /// value is served. If the loader reports the entity gone, the entry is deleted.
    ///
    /// A rebuild never outlives its lock: time spent queued for a worker counts
    /// against the lock TTL, and a rebuild whose lock lapsed while queued is dropped.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::Corrupted`] if the entry cannot be decoded and
    /// [`ErrorKind::RemoteStoreUnavailable`] if the store is down. Loader failures are
    /// logged, never returned.
    pub async fn read_with_logical_expire<V, F, Fut, E>(&self, key: &CacheKey, loader: F, ttl: Duration) -> Result<Option<V>>
    where
        V: Serialize + DeserializeOwned + Send + Sync + 'static,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = std::result::Result<Option<V>, E>> + Send + 'static,
        E: Into<BoxError> + Send + 'static,
    {
        let Some(stale) = entry::decode_wrapped::<V>(self.inner.store.get(key.as_str()).await?)? else {
            debug!(key = %key, "hot key not warmed");
            return Ok(None);
        };
        if stale.is_fresh(self.inner.now_ms()) {
            return Ok(Some(stale.data));
        }

        let acquired_at = self.inner.clock.instant();
        let Some(token) = self
            .inner
            .lock
            .try_acquire(key.name(), REBUILD_HOLDER, self.inner.settings.lock_ttl)
            .await?
        else {
            debug!(key = %key, "rebuild in progress, serving stale");
            return Ok(Some(stale.data));
        };

        // A rebuild may have finished between the read and the acquire.
        match self.inner.store.get(key.as_str()).await.and_then(entry::decode_wrapped::<V>) {
            Ok(Some(current)) if current.is_fresh(self.inner.now_ms()) => {
                self.inner.release(&token).await;
                return Ok(Some(current.data));
            }
            Ok(_) => {}
            Err(error) => {
                self.inner.release(&token).await;
                return Err(error);
            }
        }

        if let Some(slot) = self.inner.pool.reserve() {
            debug!(key = %key, "rebuild scheduled, serving stale");
            let inner = Arc::clone(&self.inner);
            let key = key.clone();
            slot.spawn(async move { inner.rebuild(&key, token, acquired_at, loader, ttl).await }.in_current_span());
        } else {
            warn!(
                key = %key,
                kind = %ErrorKind::Rejected,
                pending = self.inner.pool.pending(),
                "rebuild pool saturated, serving stale"
            );
            self.inner.release(&token).await;
        }
        Ok(Some(stale.data))
    }

    /// Reads a plain entry; on a miss exactly one caller loads it while the others
    /// wait and re-read.
    ///
    /// Callers that lose the lock sleep for the configured retry delay and read
    /// again, up to the configured number of attempts. The winner checks the cache
    /// once more, calls the loader, caches the value or a null marker, and releases
    /// the lock on every path, including a panicking loader.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::LockUnavailable`] once the attempts run out, plus the
    /// errors of [`read`](Self::read).
    pub async fn read_with_mutex<V, F, Fut, E>(&self, key: &CacheKey, loader: F, ttl: Duration) -> Result<Option<V>>
    where
        V: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = std::result::Result<Option<V>, E>>,
        E: Into<BoxError>,
    {
        let retry = self.inner.settings.mutex_retry;
        let mut attempt = 0;
        let token = loop {
            match self.inner.lookup(key).await? {
                Lookup::Hit(value) => return Ok(Some(value)),
                Lookup::Absent => return Ok(None),
                Lookup::Miss => {}
            }
            if let Some(token) = self
                .inner
                .lock
                .try_acquire(key.name(), MUTEX_HOLDER, self.inner.settings.lock_ttl)
                .await?
            {
                break token;
            }
            attempt += 1;
            if attempt >= retry.attempts {
                debug!(key = %key, attempts = attempt, "gave up waiting for rebuild lock");
                return Err(Error::lock_unavailable());
            }
            self.inner.clock.delay(retry.delay).await;
        };

        let outcome = AssertUnwindSafe(async {
            match self.inner.lookup(key).await? {
                Lookup::Hit(value) => Ok(Some(value)),
                Lookup::Absent => Ok(None),
                Lookup::Miss => self.inner.fill(key, loader, ttl).await,
            }
        })
        .catch_unwind()
        .await;

        self.inner.release(&token).await;
        match outcome {
            Ok(result) => result,
            Err(panic) => std::panic::resume_unwind(panic),
        }
    }

    /// Caches `value` as a plain entry that physically expires after `ttl`.
    ///
    /// # Errors
    ///
    /// Returns an error if the value cannot be encoded or the store is down.
    pub async fn set<V: Serialize>(&self, key: &CacheKey, value: &V, ttl: Duration) -> Result<()> {
        self.inner
            .store
            .set(key.as_str(), &entry::encode_plain(value)?, Some(ttl))
            .await
    }

    /// Caches `value` as a wrapped entry that logically expires `ttl` from now and
    /// never physically expires. Used to warm hot keys.
    ///
    /// # Errors
    ///
    /// Returns an error if the value cannot be encoded or the store is down.
    pub async fn set_with_logical_expire<V: Serialize>(&self, key: &CacheKey, value: &V, ttl: Duration) -> Result<()> {
        self.inner.write_wrapped(key, value, ttl).await
    }

    /// Deletes the entry for `key`, typically right after a write to the source of
    /// truth. Returns `true` if an entry existed.
    ///
    /// # Errors
    ///
    /// Returns an error if the store is down.
    pub async fn invalidate(&self, key: &CacheKey) -> Result<bool> {
        let removed = self.inner.store.delete(key.as_str()).await?;
        debug!(key = %key, removed, "cache invalidated");
        Ok(removed)
    }

    /// Returns how many background rebuilds are queued or running.
    #[must_use]
    pub fn pending_rebuilds(&self) -> usize {
        self.inner.pool.pending()
    }
}

impl<S: RemoteStore> Inner<S> {
    fn now_ms(&self) -> u64 {
        entry::unix_millis(self.clock.system_time())
    }

    async fn lookup<V: DeserializeOwned>(&self, key: &CacheKey) -> Result<Lookup<V>> {
        let lookup = entry::decode_plain(self.store.get(key.as_str()).await?)?;
        match &lookup {
            Lookup::Hit(_) => debug!(key = %key, "cache hit"),
            Lookup::Absent => debug!(key = %key, "null marker hit"),
            Lookup::Miss => debug!(key = %key, "cache miss"),
        }
        Ok(lookup)
    }

    /// Runs the loader and caches what it returns, value or null marker.
    async fn fill<V, F, Fut, E>(&self, key: &CacheKey, loader: F, ttl: Duration) -> Result<Option<V>>
    where
        V: Serialize,
        F: FnOnce() -> Fut,
        Fut: Future<Output = std::result::Result<Option<V>, E>>,
        E: Into<BoxError>,
    {
        match loader().await.map_err(Error::loader)? {
            Some(value) => {
                self.store
                    .set(key.as_str(), &entry::encode_plain(&value)?, Some(ttl))
                    .await?;
                Ok(Some(value))
            }
            None => {
                debug!(key = %key, ttl = ?self.settings.null_ttl, "caching null marker");
                self.store
                    .set(key.as_str(), NULL_MARKER, Some(self.settings.null_ttl))
                    .await?;
                Ok(None)
            }
        }
    }

    async fn write_wrapped<V: Serialize>(&self, key: &CacheKey, value: &V, ttl: Duration) -> Result<()> {
        let ttl_ms = u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX);
        let expire_at_ms = self.now_ms().saturating_add(ttl_ms);
        self.store
            .set(key.as_str(), &entry::encode_wrapped(value, expire_at_ms)?, None)
            .await
    }

    /// Runs a rebuild whose lock was taken at `acquired_at`.
    ///
    /// The deadline is the earlier of the rebuild timeout and the lock's own expiry,
    /// so the loader is dropped before another caller can win the lock.
    async fn rebuild<V, F, Fut, E>(&self, key: &CacheKey, token: LockToken, acquired_at: Instant, loader: F, ttl: Duration)
    where
        V: Serialize,
        F: FnOnce() -> Fut,
        Fut: Future<Output = std::result::Result<Option<V>, E>>,
        E: Into<BoxError>,
    {
        let queued = self.clock.instant().saturating_duration_since(acquired_at);
        let lock_left = self.settings.lock_ttl.saturating_sub(queued);
        if lock_left.is_zero() {
            warn!(key = %key, queued = ?queued, "rebuild lock expired while queued, rebuild dropped");
            self.release(&token).await;
            return;
        }
        let deadline = self.settings.rebuild_timeout.min(lock_left);

        let load = AssertUnwindSafe(async move { loader().await }).catch_unwind();

        match load.timeout(&self.clock, deadline).await {
            Ok(Ok(Ok(Some(value)))) => match self.write_wrapped(key, &value, ttl).await {
                Ok(()) => debug!(key = %key, "rebuild complete"),
                Err(error) => warn!(key = %key, error = ?error, "rebuild could not write back"),
            },
            Ok(Ok(Ok(None))) => match self.store.delete(key.as_str()).await {
                Ok(_) => debug!(key = %key, "entity gone, hot key removed"),
                Err(error) => warn!(key = %key, error = ?error, "rebuild could not remove hot key"),
            },
            Ok(Ok(Err(error))) => {
                let error: BoxError = error.into();
                warn!(key = %key, error = %error, "rebuild loader failed");
            }
            Ok(Err(_panic)) => warn!(key = %key, "rebuild loader panicked"),
            Err(_elapsed) => warn!(key = %key, timeout = ?deadline, "rebuild timed out"),
        }

        self.release(&token).await;
    }

    /// Releases a lock this process holds, logging instead of failing.
    async fn release(&self, token: &LockToken) {
        match self.lock.release(token).await {
            Ok(true) => {}
            Ok(false) => warn!(lock = token.key(), "lock expired before release"),
            Err(error) => error!(lock = token.key(), error = ?error, "failed to release lock"),
        }
    }
}
