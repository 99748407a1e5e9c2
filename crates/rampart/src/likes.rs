// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Per-item likes ordered by when they happened.

use rampart_store::{RemoteStore, Result};
use tracing::debug;

use crate::keys;

/// Likes of items, one ordered set per item at `likes:<item>` scored by like time.
///
/// # Examples
///
/// ```
/// use rampart::LikeBoard;
/// use rampart_memory::MemoryStore;
/// use tick::Clock;
/// # futures::executor::block_on(async {
///
/// let likes = LikeBoard::new(MemoryStore::new(Clock::new_frozen()));
///
/// assert!(likes.toggle(9, 2, 1_000).await?);
/// assert!(likes.toggle(9, 1, 2_000).await?);
/// assert_eq!(likes.top_likers(9, 5).await?, [2, 1]);
///
/// // A second toggle takes the like back.
/// assert!(!likes.toggle(9, 2, 3_000).await?);
/// assert!(!likes.is_liked(9, 2).await?);
/// # Ok::<(), rampart::Error>(())
/// # });
/// ```
#[derive(Debug, Clone)]
pub struct LikeBoard<S> {
    store: S,
}

impl<S: RemoteStore> LikeBoard<S> {
    /// Creates a board over `store`.
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Likes `item` for `user` at `now_ms`, or takes back an existing like.
    ///
    /// Returns `true` if the item is now liked.
    ///
    /// # Errors
    ///
    /// Returns an error if the store is unavailable.
    pub async fn toggle(&self, item: u64, user: u64, now_ms: u64) -> Result<bool> {
        let key = keys::likes_key(item);
        let member = user.to_string();

        let liked = if self.store.sorted_score(&key, &member).await?.is_some() {
            self.store.sorted_remove(&key, &member).await?;
            false
        } else {
            #[expect(clippy::cast_precision_loss, reason = "millisecond timestamps stay below 2^53")]
            self.store.sorted_add(&key, &member, now_ms as f64).await?;
            true
        };

        debug!(item, user, liked, "like toggled");
        Ok(liked)
    }

    /// Returns `true` if `user` likes `item`.
    ///
    /// # Errors
    ///
    /// Returns an error if the store is unavailable.
    pub async fn is_liked(&self, item: u64, user: u64) -> Result<bool> {
        Ok(self
            .store
            .sorted_score(&keys::likes_key(item), &user.to_string())
            .await?
            .is_some())
    }

    /// Returns up to `count` users who liked `item`, earliest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the store is unavailable or holds a non-numeric member.
    pub async fn top_likers(&self, item: u64, count: usize) -> Result<Vec<u64>> {
        let Some(stop) = count.checked_sub(1) else {
            return Ok(Vec::new());
        };
        let members = self.store.sorted_range(&keys::likes_key(item), 0, stop).await?;
        keys::parse_ids(&members)
    }
}
