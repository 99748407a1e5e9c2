// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Recording store wrapper for testing.
//!
//! This module provides `MockStore`, which wraps any [`RemoteStore`], records every
//! operation issued against it, and supports failure injection for testing error paths.

use std::{sync::Arc, time::Duration};

use parking_lot::Mutex;

use crate::{Error, GeoMatch, GeoPoint, RemoteStore, Result, ScoredMember};

/// Recorded store operation with full context.
#[derive(Debug, Clone, PartialEq)]
pub enum StoreOp {
    /// A string read of the given key.
    Get(String),
    /// A string write.
    Set {
        /// The key written.
        key: String,
        /// The value written.
        value: String,
        /// The physical TTL, if any.
        ttl: Option<Duration>,
    },
    /// A conditional write used for lock acquisition.
    SetIfAbsent {
        /// The key written.
        key: String,
        /// The value written.
        value: String,
        /// The physical TTL.
        ttl: Duration,
    },
    /// An atomic compare-and-delete.
    CompareAndDelete {
        /// The key targeted.
        key: String,
        /// The value the key had to hold.
        expected: String,
    },
    /// An unconditional delete.
    Delete(String),
    /// An atomic increment.
    Increment(String),
    /// An ordered-set add.
    SortedAdd {
        /// The ordered set.
        key: String,
        /// The member added.
        member: String,
        /// The member's score.
        score: f64,
    },
    /// An ordered-set removal.
    SortedRemove {
        /// The ordered set.
        key: String,
        /// The member removed.
        member: String,
    },
    /// An ordered-set score lookup.
    SortedScore {
        /// The ordered set.
        key: String,
        /// The member looked up.
        member: String,
    },
    /// An ordered-set rank range read.
    SortedRange(String),
    /// An ordered-set reverse score range read.
    SortedRevRangeByScore {
        /// The ordered set.
        key: String,
        /// Upper score bound.
        max: f64,
        /// Number of matches skipped.
        offset: usize,
        /// Maximum number of matches returned.
        count: usize,
    },
    /// A plain-set add.
    SetAdd {
        /// The set.
        key: String,
        /// The member added.
        member: String,
    },
    /// A plain-set removal.
    SetRemove {
        /// The set.
        key: String,
        /// The member removed.
        member: String,
    },
    /// A plain-set membership check.
    SetContains {
        /// The set.
        key: String,
        /// The member looked up.
        member: String,
    },
    /// A plain-set members read.
    SetMembers(String),
    /// A plain-set intersection.
    SetIntersect(Vec<String>),
    /// A bitmap write.
    BitSet {
        /// The bitmap.
        key: String,
        /// The bit offset.
        offset: u32,
    },
    /// A bitmap range read.
    BitField(String),
    /// A geo index write.
    GeoAdd {
        /// The geo index.
        key: String,
        /// The member added.
        member: String,
    },
    /// A geo radius search.
    GeoSearch(String),
}

impl StoreOp {
    /// Returns the first key this operation touches.
    #[must_use]
    pub fn key(&self) -> &str {
        match self {
            Self::Get(key)
            | Self::Delete(key)
            | Self::Increment(key)
            | Self::SortedRange(key)
            | Self::SetMembers(key)
            | Self::BitField(key)
            | Self::GeoSearch(key)
            | Self::Set { key, .. }
            | Self::SetIfAbsent { key, .. }
            | Self::CompareAndDelete { key, .. }
            | Self::SortedAdd { key, .. }
            | Self::SortedRemove { key, .. }
            | Self::SortedScore { key, .. }
            | Self::SortedRevRangeByScore { key, .. }
            | Self::SetAdd { key, .. }
            | Self::SetRemove { key, .. }
            | Self::SetContains { key, .. }
            | Self::BitSet { key, .. }
            | Self::GeoAdd { key, .. } => key,
            Self::SetIntersect(keys) => keys.first().map_or("", String::as_str),
        }
    }
}

type FailPredicate = Box<dyn Fn(&StoreOp) -> bool + Send + Sync>;

/// A recording wrapper around another store.
///
/// Every operation is recorded before it is forwarded to the inner store, so tests can
/// count lock acquisition attempts or assert that a loader result was written back.
/// A failure predicate turns matching operations into
/// [`ErrorKind::RemoteStoreUnavailable`](crate::ErrorKind::RemoteStoreUnavailable)
/// errors without touching the inner store.
///
/// Clones share the recorded operations and the failure predicate.
///
/// # Examples
///
/// ```ignore
/// use rampart_store::testing::{MockStore, StoreOp};
///
/// let store = MockStore::new(inner);
/// store.fail_when(|op| matches!(op, StoreOp::Get(_)));
/// assert!(store.get("key").await.is_err());
/// assert_eq!(store.count(|op| matches!(op, StoreOp::Get(_))), 1);
/// ```
pub struct MockStore<S> {
    inner: Arc<S>,
    operations: Arc<Mutex<Vec<StoreOp>>>,
    fail_when: Arc<Mutex<Option<FailPredicate>>>,
}

impl<S: std::fmt::Debug> std::fmt::Debug for MockStore<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockStore")
            .field("inner", &self.inner)
            .field("operations", &self.operations)
            .field("fail_when", &self.fail_when.lock().is_some())
            .finish()
    }
}

impl<S> Clone for MockStore<S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            operations: Arc::clone(&self.operations),
            fail_when: Arc::clone(&self.fail_when),
        }
    }
}

impl<S> MockStore<S> {
    /// Wraps `inner`, starting with no recorded operations and no failures.
    #[must_use]
    pub fn new(inner: S) -> Self {
        Self {
            inner: Arc::new(inner),
            operations: Arc::new(Mutex::new(Vec::new())),
            fail_when: Arc::new(Mutex::new(None)),
        }
    }

    /// Returns the wrapped store.
    #[must_use]
    pub fn inner(&self) -> &S {
        &self.inner
    }

    /// Sets a predicate that decides which operations fail.
    ///
    /// # Examples
    ///
    /// ```ignore
    /// // Fail every write to lock keys
    /// store.fail_when(|op| matches!(op, StoreOp::SetIfAbsent { key, .. } if key.starts_with("lock:")));
    /// ```
    pub fn fail_when<F>(&self, predicate: F)
    where
        F: Fn(&StoreOp) -> bool + Send + Sync + 'static,
    {
        *self.fail_when.lock() = Some(Box::new(predicate));
    }

    /// Clears the failure predicate, allowing all operations to succeed.
    pub fn clear_failures(&self) {
        *self.fail_when.lock() = None;
    }

    /// Returns a clone of all recorded operations.
    #[must_use]
    pub fn operations(&self) -> Vec<StoreOp> {
        self.operations.lock().clone()
    }

    /// Returns how many recorded operations match the predicate.
    #[must_use]
    pub fn count(&self, predicate: impl Fn(&StoreOp) -> bool) -> usize {
        self.operations.lock().iter().filter(|op| predicate(op)).count()
    }

    /// Clears all recorded operations.
    pub fn clear_operations(&self) {
        self.operations.lock().clear();
    }

    fn admit(&self, op: StoreOp) -> Result<()> {
        let fail = self.fail_when.lock().as_ref().is_some_and(|predicate| predicate(&op));
        let key = op.key().to_owned();
        self.operations.lock().push(op);
        if fail {
            return Err(Error::unavailable(format!("mock: operation on {key} failed")));
        }
        Ok(())
    }
}

impl<S: RemoteStore> RemoteStore for MockStore<S> {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        self.admit(StoreOp::Get(key.to_owned()))?;
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<()> {
        self.admit(StoreOp::Set {
            key: key.to_owned(),
            value: value.to_owned(),
            ttl,
        })?;
        self.inner.set(key, value, ttl).await
    }

    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> Result<bool> {
        self.admit(StoreOp::SetIfAbsent {
            key: key.to_owned(),
            value: value.to_owned(),
            ttl,
        })?;
        self.inner.set_if_absent(key, value, ttl).await
    }

    async fn compare_and_delete(&self, key: &str, expected: &str) -> Result<bool> {
        self.admit(StoreOp::CompareAndDelete {
            key: key.to_owned(),
            expected: expected.to_owned(),
        })?;
        self.inner.compare_and_delete(key, expected).await
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        self.admit(StoreOp::Delete(key.to_owned()))?;
        self.inner.delete(key).await
    }

    async fn increment(&self, key: &str) -> Result<i64> {
        self.admit(StoreOp::Increment(key.to_owned()))?;
        self.inner.increment(key).await
    }

    async fn sorted_add(&self, key: &str, member: &str, score: f64) -> Result<()> {
        self.admit(StoreOp::SortedAdd {
            key: key.to_owned(),
            member: member.to_owned(),
            score,
        })?;
        self.inner.sorted_add(key, member, score).await
    }

    async fn sorted_remove(&self, key: &str, member: &str) -> Result<bool> {
        self.admit(StoreOp::SortedRemove {
            key: key.to_owned(),
            member: member.to_owned(),
        })?;
        self.inner.sorted_remove(key, member).await
    }

    async fn sorted_score(&self, key: &str, member: &str) -> Result<Option<f64>> {
        self.admit(StoreOp::SortedScore {
            key: key.to_owned(),
            member: member.to_owned(),
        })?;
        self.inner.sorted_score(key, member).await
    }

    async fn sorted_range(&self, key: &str, start: usize, stop: usize) -> Result<Vec<String>> {
        self.admit(StoreOp::SortedRange(key.to_owned()))?;
        self.inner.sorted_range(key, start, stop).await
    }

    async fn sorted_rev_range_by_score(&self, key: &str, max: f64, min: f64, offset: usize, count: usize) -> Result<Vec<ScoredMember>> {
        self.admit(StoreOp::SortedRevRangeByScore {
            key: key.to_owned(),
            max,
            offset,
            count,
        })?;
        self.inner.sorted_rev_range_by_score(key, max, min, offset, count).await
    }

    async fn set_add(&self, key: &str, member: &str) -> Result<bool> {
        self.admit(StoreOp::SetAdd {
            key: key.to_owned(),
            member: member.to_owned(),
        })?;
        self.inner.set_add(key, member).await
    }

    async fn set_remove(&self, key: &str, member: &str) -> Result<bool> {
        self.admit(StoreOp::SetRemove {
            key: key.to_owned(),
            member: member.to_owned(),
        })?;
        self.inner.set_remove(key, member).await
    }

    async fn set_contains(&self, key: &str, member: &str) -> Result<bool> {
        self.admit(StoreOp::SetContains {
            key: key.to_owned(),
            member: member.to_owned(),
        })?;
        self.inner.set_contains(key, member).await
    }

    async fn set_members(&self, key: &str) -> Result<Vec<String>> {
        self.admit(StoreOp::SetMembers(key.to_owned()))?;
        self.inner.set_members(key).await
    }

    async fn set_intersect(&self, keys: &[&str]) -> Result<Vec<String>> {
        self.admit(StoreOp::SetIntersect(keys.iter().map(|key| (*key).to_owned()).collect()))?;
        self.inner.set_intersect(keys).await
    }

    async fn bit_set(&self, key: &str, offset: u32, value: bool) -> Result<bool> {
        self.admit(StoreOp::BitSet {
            key: key.to_owned(),
            offset,
        })?;
        self.inner.bit_set(key, offset, value).await
    }

    async fn bit_field_unsigned(&self, key: &str, width: u8, offset: u32) -> Result<u64> {
        self.admit(StoreOp::BitField(key.to_owned()))?;
        self.inner.bit_field_unsigned(key, width, offset).await
    }

    async fn geo_add(&self, key: &str, member: &str, point: GeoPoint) -> Result<()> {
        self.admit(StoreOp::GeoAdd {
            key: key.to_owned(),
            member: member.to_owned(),
        })?;
        self.inner.geo_add(key, member, point).await
    }

    async fn geo_search(&self, key: &str, center: GeoPoint, radius_m: f64, limit: usize) -> Result<Vec<GeoMatch>> {
        self.admit(StoreOp::GeoSearch(key.to_owned()))?;
        self.inner.geo_search(key, center, radius_m, limit).await
    }
}
