// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Follow relations between users.

use rampart_store::{RemoteStore, Result};
use tracing::debug;

use crate::{FollowerSource, keys};

/// Who follows whom, kept in both directions.
///
/// `follows:<user>` holds the users `user` follows and `followers:<user>` the users
/// following `user`. The two sets are written one after the other, not atomically.
///
/// # Examples
///
/// ```
/// use rampart::FollowGraph;
/// use rampart_memory::MemoryStore;
/// use tick::Clock;
/// # futures::executor::block_on(async {
///
/// let graph = FollowGraph::new(MemoryStore::new(Clock::new_frozen()));
/// graph.follow(1, 3).await?;
/// graph.follow(2, 3).await?;
/// graph.follow(2, 4).await?;
///
/// assert_eq!(graph.followers(3).await?, [1, 2]);
/// assert_eq!(graph.common_followees(1, 2).await?, [3]);
/// # Ok::<(), rampart::Error>(())
/// # });
/// ```
#[derive(Debug, Clone)]
pub struct FollowGraph<S> {
    store: S,
}

impl<S: RemoteStore> FollowGraph<S> {
    /// Creates a graph over `store`.
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Makes `user` follow `target`. Returns `false` if it already did.
    ///
    /// # Errors
    ///
    /// Returns an error if the store is unavailable.
    pub async fn follow(&self, user: u64, target: u64) -> Result<bool> {
        let added = self.store.set_add(&keys::follows_key(user), &target.to_string()).await?;
        self.store.set_add(&keys::followers_key(target), &user.to_string()).await?;
        debug!(user, target, added, "follow");
        Ok(added)
    }

    /// Makes `user` stop following `target`. Returns `false` if it did not follow.
    ///
    /// # Errors
    ///
    /// Returns an error if the store is unavailable.
    pub async fn unfollow(&self, user: u64, target: u64) -> Result<bool> {
        let removed = self.store.set_remove(&keys::follows_key(user), &target.to_string()).await?;
        self.store.set_remove(&keys::followers_key(target), &user.to_string()).await?;
        debug!(user, target, removed, "unfollow");
        Ok(removed)
    }

    /// Returns `true` if `user` follows `target`.
    ///
    /// # Errors
    ///
    /// Returns an error if the store is unavailable.
    pub async fn is_following(&self, user: u64, target: u64) -> Result<bool> {
        self.store.set_contains(&keys::follows_key(user), &target.to_string()).await
    }

    /// Returns the users `user` follows, in ascending id order.
    ///
    /// # Errors
    ///
    /// Returns an error if the store is unavailable or holds a non-numeric member.
    pub async fn followees(&self, user: u64) -> Result<Vec<u64>> {
        self.sorted_members(&keys::follows_key(user)).await
    }

    /// Returns the users following `user`, in ascending id order.
    ///
    /// # Errors
    ///
    /// Returns an error if the store is unavailable or holds a non-numeric member.
    pub async fn followers(&self, user: u64) -> Result<Vec<u64>> {
        self.sorted_members(&keys::followers_key(user)).await
    }

    /// Returns the users both `a` and `b` follow, in ascending id order.
    ///
    /// # Errors
    ///
    /// Returns an error if the store is unavailable or holds a non-numeric member.
    pub async fn common_followees(&self, a: u64, b: u64) -> Result<Vec<u64>> {
        let (a, b) = (keys::follows_key(a), keys::follows_key(b));
        let common = self.store.set_intersect(&[a.as_str(), b.as_str()]).await?;
        let mut ids = keys::parse_ids(&common)?;
        ids.sort_unstable();
        Ok(ids)
    }

    async fn sorted_members(&self, key: &str) -> Result<Vec<u64>> {
        let mut ids = keys::parse_ids(&self.store.set_members(key).await?)?;
        ids.sort_unstable();
        Ok(ids)
    }
}

impl<S: RemoteStore> FollowerSource for FollowGraph<S> {
    async fn followers(&self, producer: u64) -> Result<Vec<u64>> {
        Self::followers(self, producer).await
    }
}
