// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! The core trait for remote store backends.
//!
//! [`RemoteStore`] names the primitives the caching and coordination layer is
//! built from. Every method is a single atomic operation against the backend;
//! nothing above this trait performs a local read-modify-write.

use std::time::Duration;

use crate::{GeoMatch, GeoPoint, Result, ScoredMember};

/// Trait for remote store implementations.
///
/// All state the layer relies on lives behind this trait so that several processes
/// can share it. Implementations must make each call atomic with respect to every
/// other call on the same key.
///
/// Any transport or server failure surfaces as
/// [`ErrorKind::RemoteStoreUnavailable`](crate::ErrorKind::RemoteStoreUnavailable).
pub trait RemoteStore: Send + Sync {
    /// Reads a string value.
    fn get(&self, key: &str) -> impl Future<Output = Result<Option<String>>> + Send;

    /// Writes a string value, replacing any previous one.
    ///
    /// `ttl` of `None` stores the value without a physical expiry.
    fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> impl Future<Output = Result<()>> + Send;

    /// Writes a string value only if the key does not exist.
    ///
    /// Returns `true` if the value was written.
    fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> impl Future<Output = Result<bool>> + Send;

    /// Deletes the key only if its current value equals `expected`.
    ///
    /// The comparison and the delete are one indivisible operation on the backend.
    /// Returns `true` if the key was deleted.
    fn compare_and_delete(&self, key: &str, expected: &str) -> impl Future<Output = Result<bool>> + Send;

    /// Deletes the key unconditionally. Returns `true` if it existed.
    fn delete(&self, key: &str) -> impl Future<Output = Result<bool>> + Send;

    /// Atomically increments the integer stored at `key` and returns the new value.
    ///
    /// A missing key counts from zero.
    fn increment(&self, key: &str) -> impl Future<Output = Result<i64>> + Send;

    /// Adds a member to an ordered set or updates its score.
    fn sorted_add(&self, key: &str, member: &str, score: f64) -> impl Future<Output = Result<()>> + Send;

    /// Removes a member from an ordered set. Returns `true` if it was present.
    fn sorted_remove(&self, key: &str, member: &str) -> impl Future<Output = Result<bool>> + Send;

    /// Returns the score of a member of an ordered set.
    fn sorted_score(&self, key: &str, member: &str) -> impl Future<Output = Result<Option<f64>>> + Send;

    /// Returns members by ascending rank, `start` and `stop` inclusive.
    fn sorted_range(&self, key: &str, start: usize, stop: usize) -> impl Future<Output = Result<Vec<String>>> + Send;

    /// Returns members with `min <= score <= max` in descending score order,
    /// skipping `offset` matches and returning at most `count`.
    fn sorted_rev_range_by_score(
        &self,
        key: &str,
        max: f64,
        min: f64,
        offset: usize,
        count: usize,
    ) -> impl Future<Output = Result<Vec<ScoredMember>>> + Send;

    /// Adds a member to a plain set. Returns `true` if it was not present.
    fn set_add(&self, key: &str, member: &str) -> impl Future<Output = Result<bool>> + Send;

    /// Removes a member from a plain set. Returns `true` if it was present.
    fn set_remove(&self, key: &str, member: &str) -> impl Future<Output = Result<bool>> + Send;

    /// Returns `true` if `member` belongs to a plain set.
    fn set_contains(&self, key: &str, member: &str) -> impl Future<Output = Result<bool>> + Send;

    /// Returns every member of a plain set, in no particular order.
    fn set_members(&self, key: &str) -> impl Future<Output = Result<Vec<String>>> + Send;

    /// Returns the members present in every one of the given sets.
    fn set_intersect(&self, keys: &[&str]) -> impl Future<Output = Result<Vec<String>>> + Send;

    /// Sets or clears a single bit and returns its previous value.
    ///
    /// Bit 0 is the most significant bit of the first byte.
    fn bit_set(&self, key: &str, offset: u32, value: bool) -> impl Future<Output = Result<bool>> + Send;

    /// Reads `width` bits starting at bit `offset` as an unsigned big-endian integer.
    ///
    /// `width` must be between 1 and 63. Bits past the end of the value read as zero.
    fn bit_field_unsigned(&self, key: &str, width: u8, offset: u32) -> impl Future<Output = Result<u64>> + Send;

    /// Adds or moves a member of a geo index.
    fn geo_add(&self, key: &str, member: &str, point: GeoPoint) -> impl Future<Output = Result<()>> + Send;

    /// Returns up to `limit` members within `radius_m` metres of `center`, nearest first.
    fn geo_search(
        &self,
        key: &str,
        center: GeoPoint,
        radius_m: f64,
        limit: usize,
    ) -> impl Future<Output = Result<Vec<GeoMatch>>> + Send;
}
