// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Key namespaces shared by the components.

use std::fmt::{self, Display};

use rampart_store::{Error, Result};

/// Prefix for cached entries, plain or wrapped.
pub(crate) const CACHE_PREFIX: &str = "cache:";
/// Prefix for distributed locks.
pub(crate) const LOCK_PREFIX: &str = "lock:";
/// Prefix for per-day id counters.
pub(crate) const SEQ_PREFIX: &str = "seq:";
/// Prefix for personal timelines.
pub(crate) const TIMELINE_PREFIX: &str = "timeline:";
const FOLLOWS_PREFIX: &str = "follows:";
const FOLLOWERS_PREFIX: &str = "followers:";
const LIKES_PREFIX: &str = "likes:";
const SIGN_PREFIX: &str = "sign:";
const GEO_PREFIX: &str = "geo:";

/// Identifies one cached entity.
///
/// The cache entry lives at `cache:<entity>:<id>`, and rebuilds of that entry are
/// guarded by the lock `lock:<entity>:<id>`.
///
/// # Examples
///
/// ```
/// use rampart::CacheKey;
///
/// let key = CacheKey::new("shop", 42);
/// assert_eq!(key.as_str(), "cache:shop:42");
/// assert_eq!(key.name(), "shop:42");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    full: String,
}

impl CacheKey {
    /// Creates the key for entity `id` of kind `entity`.
    pub fn new(entity: &str, id: impl Display) -> Self {
        Self {
            full: format!("{CACHE_PREFIX}{entity}:{id}"),
        }
    }

    /// Returns the full store key.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.full
    }

    /// Returns `<entity>:<id>`, the name the rebuild lock is taken under.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.full[CACHE_PREFIX.len()..]
    }
}

impl Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.full)
    }
}

pub(crate) fn lock_key(name: &str) -> String {
    format!("{LOCK_PREFIX}{name}")
}

pub(crate) fn seq_key(sequence: &str, date: &str) -> String {
    format!("{SEQ_PREFIX}{sequence}:{date}")
}

pub(crate) fn timeline_key(consumer: u64) -> String {
    format!("{TIMELINE_PREFIX}{consumer}")
}

pub(crate) fn follows_key(user: u64) -> String {
    format!("{FOLLOWS_PREFIX}{user}")
}

pub(crate) fn followers_key(user: u64) -> String {
    format!("{FOLLOWERS_PREFIX}{user}")
}

pub(crate) fn likes_key(item: u64) -> String {
    format!("{LIKES_PREFIX}{item}")
}

pub(crate) fn sign_key(user: u64, month: &str) -> String {
    format!("{SIGN_PREFIX}{user}:{month}")
}

pub(crate) fn geo_key(category: &str) -> String {
    format!("{GEO_PREFIX}{category}")
}

/// Parses a numeric id stored as a set member.
pub(crate) fn parse_id(member: &str) -> Result<u64> {
    member.parse().map_err(Error::corrupted)
}

pub(crate) fn parse_ids(members: &[String]) -> Result<Vec<u64>> {
    members.iter().map(String::as_str).map(parse_id).collect()
}
