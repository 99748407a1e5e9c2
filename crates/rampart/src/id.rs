// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Time-ordered unique ids backed by a per-day counter.

use std::time::{Duration, SystemTime};

use jiff::Timestamp;
use rampart_store::{Error, RemoteStore, Result};
use tick::Clock;

use crate::keys;

/// Default epoch in seconds since the Unix epoch, 2024-01-01T00:00:00Z.
pub const DEFAULT_EPOCH_SECS: u64 = 1_704_067_200;

const COUNTER_BITS: u32 = 32;

/// Generates 63-bit ids: seconds since an epoch in the high bits, a per-day counter in
/// the low 32 bits.
///
/// The counter is one atomic increment of `seq:<sequence>:<yyyy:MM:dd>` (UTC), so ids
/// are unique across processes and strictly increase within a day for one sequence.
/// The counter starts over each day only because the key's date changes.
///
/// More than 2^32 ids for one sequence in one day overflow into the timestamp bits.
/// Clock readings before the epoch count as zero elapsed seconds.
///
/// # Examples
///
/// ```
/// use std::time::{Duration, SystemTime};
///
/// use rampart::{DEFAULT_EPOCH_SECS, IdGenerator, decompose_id};
/// use rampart_memory::MemoryStore;
/// use tick::Clock;
/// # futures::executor::block_on(async {
///
/// let epoch = SystemTime::UNIX_EPOCH + Duration::from_secs(DEFAULT_EPOCH_SECS);
/// let clock = Clock::new_frozen_at(epoch);
/// let ids = IdGenerator::new(MemoryStore::new(clock.clone()), clock);
///
/// let first = ids.next_id("order").await?;
/// let second = ids.next_id("order").await?;
/// assert!(second > first);
/// assert_eq!(decompose_id(second), (0, 2));
/// # Ok::<(), rampart::Error>(())
/// # });
/// ```
#[derive(Debug, Clone)]
pub struct IdGenerator<S> {
    store: S,
    clock: Clock,
    epoch: SystemTime,
}

impl<S: RemoteStore> IdGenerator<S> {
    /// Creates a generator counting from [`DEFAULT_EPOCH_SECS`].
    pub fn new(store: S, clock: Clock) -> Self {
        Self {
            store,
            clock,
            epoch: SystemTime::UNIX_EPOCH + Duration::from_secs(DEFAULT_EPOCH_SECS),
        }
    }

    /// Replaces the epoch elapsed seconds are counted from.
    #[must_use]
    pub fn with_epoch(mut self, epoch: SystemTime) -> Self {
        self.epoch = epoch;
        self
    }

    /// Returns the next id for `sequence`.
    ///
    /// # Errors
    ///
    /// Returns an error if the remote store is unavailable or the counter holds a
    /// non-numeric value.
    pub async fn next_id(&self, sequence: &str) -> Result<u64> {
        let now = self.clock.system_time();
        let elapsed = now.duration_since(self.epoch).map_or(0, |d| d.as_secs());

        let date = Timestamp::try_from(now)
            .map_err(Error::corrupted)?
            .strftime("%Y:%m:%d")
            .to_string();
        let count = self.store.increment(&keys::seq_key(sequence, &date)).await?;
        let count = u64::try_from(count).map_err(Error::corrupted)?;

        Ok((elapsed << COUNTER_BITS) | count)
    }
}

/// Splits an id into elapsed seconds since the epoch and the day counter.
#[must_use]
pub fn decompose_id(id: u64) -> (u64, u32) {
    #[expect(clippy::cast_possible_truncation, reason = "masked to the low 32 bits")]
    let counter = (id & u64::from(u32::MAX)) as u32;
    (id >> COUNTER_BITS, counter)
}
