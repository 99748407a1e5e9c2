// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Crash-safe mutual exclusion across processes.

use std::time::Duration;

use rampart_store::{RemoteStore, Result};
use tracing::debug;
use uuid::Uuid;

use crate::keys;

/// Proof of one successful acquisition.
///
/// The owner string is unique per acquisition attempt, so a token can only release
/// the exact acquisition it came from, never a later one by another holder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockToken {
    key: String,
    owner: String,
}

impl LockToken {
    /// Returns the store key of the lock, `lock:<name>`.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Returns the owner value stored under the key.
    #[must_use]
    pub fn owner(&self) -> &str {
        &self.owner
    }
}

/// An advisory, non-reentrant lock held in the remote store.
///
/// [`try_acquire`](Self::try_acquire) makes exactly one attempt and never waits;
/// retries, if any, belong to the caller. The TTL is the only crash-safety
/// mechanism: a holder that dies without releasing loses the lock once the TTL
/// elapses, so the TTL must exceed the critical section it guards.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
///
/// use rampart::DistributedLock;
/// use rampart_memory::MemoryStore;
/// use tick::Clock;
/// # futures::executor::block_on(async {
///
/// let lock = DistributedLock::new(MemoryStore::new(Clock::new_frozen()));
///
/// let token = lock.try_acquire("shop:1", "worker-1", Duration::from_secs(10)).await?;
/// let token = token.expect("lock is free");
/// assert!(lock.try_acquire("shop:1", "worker-2", Duration::from_secs(10)).await?.is_none());
///
/// assert!(lock.release(&token).await?);
/// # Ok::<(), rampart::Error>(())
/// # });
/// ```
#[derive(Debug, Clone)]
pub struct DistributedLock<S> {
    store: S,
}

impl<S: RemoteStore> DistributedLock<S> {
    /// Creates a lock client over `store`.
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Makes a single attempt to take the lock `lock:<name>` for `ttl`.
    ///
    /// `holder` identifies the caller (a worker, task or user id) and becomes part of
    /// the owner value. Returns `Ok(None)` if someone else holds the lock.
    ///
    /// # Errors
    ///
    /// Returns an error if the remote store is unavailable.
    pub async fn try_acquire(&self, name: &str, holder: &str, ttl: Duration) -> Result<Option<LockToken>> {
        let key = keys::lock_key(name);
        let owner = format!("{}-{holder}", Uuid::new_v4().simple());

        if self.store.set_if_absent(&key, &owner, ttl).await? {
            debug!(lock = %key, holder, "lock acquired");
            Ok(Some(LockToken { key, owner }))
        } else {
            debug!(lock = %key, holder, "lock held elsewhere");
            Ok(None)
        }
    }

    /// Releases the acquisition `token` came from.
    ///
    /// The owner check and the delete happen as one operation in the store. Returns
    /// `false` if the lock had already expired or now belongs to someone else, in
    /// which case nothing is deleted.
    ///
    /// # Errors
    ///
    /// Returns an error if the remote store is unavailable.
    pub async fn release(&self, token: &LockToken) -> Result<bool> {
        let released = self.store.compare_and_delete(&token.key, &token.owner).await?;
        debug!(lock = %token.key, released, "lock release");
        Ok(released)
    }
}
