// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Wire encodings of cached values.
//!
//! A plain entry is the JSON value itself and relies on the store's TTL. A wrapped
//! entry is `{"data": <value>, "expire_at_ms": <unix millis>}` and is stored without a
//! TTL. The empty string marks a key confirmed absent from the source of truth.

use std::time::SystemTime;

use rampart_store::{Error, Result};
use serde::{Deserialize, Serialize, de::DeserializeOwned};

pub(crate) const NULL_MARKER: &str = "";

/// What a plain read found in the store.
#[derive(Debug, PartialEq)]
pub(crate) enum Lookup<V> {
    Hit(V),
    /// The null marker: checked and absent.
    Absent,
    Miss,
}

#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct Wrapped<T> {
    pub(crate) data: T,
    pub(crate) expire_at_ms: u64,
}

impl<T> Wrapped<T> {
    pub(crate) fn is_fresh(&self, now_ms: u64) -> bool {
        self.expire_at_ms > now_ms
    }
}

pub(crate) fn decode_plain<V: DeserializeOwned>(raw: Option<String>) -> Result<Lookup<V>> {
    match raw.as_deref() {
        None => Ok(Lookup::Miss),
        Some(NULL_MARKER) => Ok(Lookup::Absent),
        Some(json) => serde_json::from_str(json).map(Lookup::Hit).map_err(Error::corrupted),
    }
}

pub(crate) fn encode_plain<V: Serialize>(value: &V) -> Result<String> {
    serde_json::to_string(value).map_err(Error::corrupted)
}

/// Decodes a wrapped entry; a missing key and the null marker both read as `None`.
pub(crate) fn decode_wrapped<V: DeserializeOwned>(raw: Option<String>) -> Result<Option<Wrapped<V>>> {
    match raw.as_deref() {
        None | Some(NULL_MARKER) => Ok(None),
        Some(json) => serde_json::from_str(json).map(Some).map_err(Error::corrupted),
    }
}

pub(crate) fn encode_wrapped<V: Serialize>(value: &V, expire_at_ms: u64) -> Result<String> {
    serde_json::to_string(&Wrapped {
        data: value,
        expire_at_ms,
    })
    .map_err(Error::corrupted)
}

/// Milliseconds since the Unix epoch, saturating at both ends.
pub(crate) fn unix_millis(time: SystemTime) -> u64 {
    time.duration_since(SystemTime::UNIX_EPOCH)
        .map_or(0, |d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
}
