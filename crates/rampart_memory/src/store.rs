// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! In-process remote store.

use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
    time::{Duration, Instant},
};

use parking_lot::Mutex;
use rampart_store::{Error, GeoMatch, GeoPoint, RemoteStore, Result, ScoredMember};
use tick::Clock;

use crate::{
    geo,
    value::{self, Value},
};

#[derive(Debug)]
struct Slot {
    value: Value,
    expires_at: Option<Instant>,
}

impl Slot {
    const fn new(value: Value) -> Self {
        Self { value, expires_at: None }
    }
}

#[derive(Debug, Default)]
struct Keyspace {
    slots: HashMap<String, Slot>,
}

impl Keyspace {
    /// Drops the key if its physical TTL has elapsed.
    fn purge_expired(&mut self, key: &str, now: Instant) {
        if self
            .slots
            .get(key)
            .is_some_and(|slot| slot.expires_at.is_some_and(|at| at <= now))
        {
            self.slots.remove(key);
        }
    }

    fn live(&mut self, key: &str, now: Instant) -> Option<&mut Slot> {
        self.purge_expired(key, now);
        self.slots.get_mut(key)
    }

    fn live_or_insert(&mut self, key: &str, now: Instant, init: impl FnOnce() -> Value) -> &mut Slot {
        self.purge_expired(key, now);
        self.slots.entry(key.to_owned()).or_insert_with(|| Slot::new(init()))
    }
}

/// A [`RemoteStore`] that keeps all state in process memory.
///
/// Every operation takes one lock over the whole keyspace, so each call is atomic
/// with respect to every other call, matching what a single-threaded remote server
/// provides. Physical TTLs are measured on the supplied [`Clock`], which lets tests
/// expire keys by advancing a `ClockControl`.
///
/// Clones share the same keyspace.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
///
/// use rampart_memory::MemoryStore;
/// use rampart_store::RemoteStore;
/// use tick::Clock;
/// # futures::executor::block_on(async {
///
/// let store = MemoryStore::new(Clock::new_frozen());
///
/// assert!(store.set_if_absent("lock:shop:1", "owner-a", Duration::from_secs(10)).await?);
/// assert!(!store.set_if_absent("lock:shop:1", "owner-b", Duration::from_secs(10)).await?);
/// assert!(store.compare_and_delete("lock:shop:1", "owner-a").await?);
/// # Ok::<(), rampart_store::Error>(())
/// # });
/// ```
#[derive(Debug, Clone)]
pub struct MemoryStore {
    clock: Clock,
    keyspace: Arc<Mutex<Keyspace>>,
}

impl MemoryStore {
    /// Creates an empty store whose TTLs are measured on `clock`.
    #[must_use]
    pub fn new(clock: Clock) -> Self {
        Self {
            clock,
            keyspace: Arc::new(Mutex::new(Keyspace::default())),
        }
    }

    /// Returns the number of live keys.
    #[must_use]
    pub fn len(&self) -> usize {
        let now = self.clock.instant();
        self.keyspace
            .lock()
            .slots
            .values()
            .filter(|slot| slot.expires_at.is_none_or(|at| at > now))
            .count()
    }

    /// Returns `true` if the store holds no live keys.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the remaining physical TTL of a key.
    ///
    /// Returns `None` if the key is missing or has no TTL.
    #[must_use]
    pub fn ttl(&self, key: &str) -> Option<Duration> {
        let now = self.clock.instant();
        let mut keyspace = self.keyspace.lock();
        keyspace
            .live(key, now)
            .and_then(|slot| slot.expires_at)
            .map(|at| at.saturating_duration_since(now))
    }

    fn with_keyspace<T>(&self, f: impl FnOnce(&mut Keyspace, Instant) -> Result<T>) -> Result<T> {
        let now = self.clock.instant();
        let mut keyspace = self.keyspace.lock();
        f(&mut keyspace, now)
    }

    /// Returns the deadline `ttl` from now, or `None` when it lies beyond what an
    /// `Instant` can hold and the key never expires in practice.
    fn expiry(&self, ttl: Duration) -> Result<Option<Instant>> {
        if ttl.is_zero() {
            return Err(Error::unavailable("invalid expire time"));
        }
        Ok(self.clock.instant().checked_add(ttl))
    }
}

impl RemoteStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        self.with_keyspace(|ks, now| match ks.live(key, now) {
            None => Ok(None),
            Some(Slot {
                value: Value::String(s), ..
            }) => Ok(Some(s.clone())),
            Some(slot) => Err(slot.value.wrong_type("string")),
        })
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<()> {
        let expires_at = ttl.map(|ttl| self.expiry(ttl)).transpose()?.flatten();
        self.with_keyspace(|ks, _| {
            ks.slots.insert(
                key.to_owned(),
                Slot {
                    value: Value::String(value.to_owned()),
                    expires_at,
                },
            );
            Ok(())
        })
    }

    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> Result<bool> {
        let expires_at = self.expiry(ttl)?;
        self.with_keyspace(|ks, now| {
            if ks.live(key, now).is_some() {
                return Ok(false);
            }
            ks.slots.insert(
                key.to_owned(),
                Slot {
                    value: Value::String(value.to_owned()),
                    expires_at,
                },
            );
            Ok(true)
        })
    }

    async fn compare_and_delete(&self, key: &str, expected: &str) -> Result<bool> {
        self.with_keyspace(|ks, now| {
            let matches = matches!(ks.live(key, now), Some(Slot { value: Value::String(s), .. }) if s == expected);
            if matches {
                ks.slots.remove(key);
            }
            Ok(matches)
        })
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        self.with_keyspace(|ks, now| {
            ks.purge_expired(key, now);
            Ok(ks.slots.remove(key).is_some())
        })
    }

    async fn increment(&self, key: &str) -> Result<i64> {
        self.with_keyspace(|ks, now| {
            match &mut ks.live_or_insert(key, now, || Value::String("0".to_owned())).value {
                Value::String(raw) => {
                    let current: i64 = raw
                        .parse()
                        .map_err(|_parse| Error::unavailable("value is not an integer or out of range"))?;
                    let next = current
                        .checked_add(1)
                        .ok_or_else(|| Error::unavailable("increment or decrement would overflow"))?;
                    *raw = next.to_string();
                    Ok(next)
                }
                other => Err(other.wrong_type("string")),
            }
        })
    }

    async fn sorted_add(&self, key: &str, member: &str, score: f64) -> Result<()> {
        if score.is_nan() {
            return Err(Error::unavailable("score is not a valid float"));
        }
        self.with_keyspace(|ks, now| {
            match &mut ks.live_or_insert(key, now, || Value::Sorted(HashMap::new())).value {
                Value::Sorted(members) => {
                    members.insert(member.to_owned(), score);
                    Ok(())
                }
                other => Err(other.wrong_type("zset")),
            }
        })
    }

    async fn sorted_remove(&self, key: &str, member: &str) -> Result<bool> {
        self.with_keyspace(|ks, now| {
            let (removed, drained) = match ks.live(key, now) {
                None => return Ok(false),
                Some(Slot {
                    value: Value::Sorted(members),
                    ..
                }) => (members.remove(member).is_some(), members.is_empty()),
                Some(slot) => return Err(slot.value.wrong_type("zset")),
            };
            if drained {
                ks.slots.remove(key);
            }
            Ok(removed)
        })
    }

    async fn sorted_score(&self, key: &str, member: &str) -> Result<Option<f64>> {
        self.with_keyspace(|ks, now| match ks.live(key, now) {
            None => Ok(None),
            Some(Slot {
                value: Value::Sorted(members),
                ..
            }) => Ok(members.get(member).copied()),
            Some(slot) => Err(slot.value.wrong_type("zset")),
        })
    }

    async fn sorted_range(&self, key: &str, start: usize, stop: usize) -> Result<Vec<String>> {
        self.with_keyspace(|ks, now| match ks.live(key, now) {
            None => Ok(Vec::new()),
            Some(Slot {
                value: Value::Sorted(members),
                ..
            }) => {
                if stop < start {
                    return Ok(Vec::new());
                }
                Ok(value::ascending(members)
                    .into_iter()
                    .skip(start)
                    .take(stop.saturating_sub(start).saturating_add(1))
                    .map(|(member, _)| member.clone())
                    .collect())
            }
            Some(slot) => Err(slot.value.wrong_type("zset")),
        })
    }

    async fn sorted_rev_range_by_score(&self, key: &str, max: f64, min: f64, offset: usize, count: usize) -> Result<Vec<ScoredMember>> {
        self.with_keyspace(|ks, now| match ks.live(key, now) {
            None => Ok(Vec::new()),
            Some(Slot {
                value: Value::Sorted(members),
                ..
            }) => Ok(value::ascending(members)
                .into_iter()
                .rev()
                .filter(|(_, score)| *score <= max && *score >= min)
                .skip(offset)
                .take(count)
                .map(|(member, score)| ScoredMember::new(member.clone(), score))
                .collect()),
            Some(slot) => Err(slot.value.wrong_type("zset")),
        })
    }

    async fn set_add(&self, key: &str, member: &str) -> Result<bool> {
        self.with_keyspace(|ks, now| {
            match &mut ks.live_or_insert(key, now, || Value::Set(HashSet::new())).value {
                Value::Set(members) => Ok(members.insert(member.to_owned())),
                other => Err(other.wrong_type("set")),
            }
        })
    }

    async fn set_remove(&self, key: &str, member: &str) -> Result<bool> {
        self.with_keyspace(|ks, now| {
            let (removed, drained) = match ks.live(key, now) {
                None => return Ok(false),
                Some(Slot {
                    value: Value::Set(members), ..
                }) => (members.remove(member), members.is_empty()),
                Some(slot) => return Err(slot.value.wrong_type("set")),
            };
            if drained {
                ks.slots.remove(key);
            }
            Ok(removed)
        })
    }

    async fn set_contains(&self, key: &str, member: &str) -> Result<bool> {
        self.with_keyspace(|ks, now| match ks.live(key, now) {
            None => Ok(false),
            Some(Slot {
                value: Value::Set(members), ..
            }) => Ok(members.contains(member)),
            Some(slot) => Err(slot.value.wrong_type("set")),
        })
    }

    async fn set_members(&self, key: &str) -> Result<Vec<String>> {
        self.with_keyspace(|ks, now| match ks.live(key, now) {
            None => Ok(Vec::new()),
            Some(Slot {
                value: Value::Set(members), ..
            }) => Ok(members.iter().cloned().collect()),
            Some(slot) => Err(slot.value.wrong_type("set")),
        })
    }

    async fn set_intersect(&self, keys: &[&str]) -> Result<Vec<String>> {
        self.with_keyspace(|ks, now| {
            let mut acc: Option<HashSet<String>> = None;
            for key in keys {
                let members = match ks.live(key, now) {
                    None => return Ok(Vec::new()),
                    Some(Slot {
                        value: Value::Set(members), ..
                    }) => members,
                    Some(slot) => return Err(slot.value.wrong_type("set")),
                };
                acc = Some(match acc {
                    None => members.clone(),
                    Some(acc) => acc.into_iter().filter(|m| members.contains(m)).collect(),
                });
            }
            Ok(acc.map(|set| set.into_iter().collect()).unwrap_or_default())
        })
    }

    async fn bit_set(&self, key: &str, offset: u32, value: bool) -> Result<bool> {
        self.with_keyspace(|ks, now| {
            match &mut ks.live_or_insert(key, now, || Value::Bits(Vec::new())).value {
                Value::Bits(bits) => Ok(value::set_bit(bits, offset, value)),
                other => Err(other.wrong_type("bitmap")),
            }
        })
    }

    async fn bit_field_unsigned(&self, key: &str, width: u8, offset: u32) -> Result<u64> {
        self.with_keyspace(|ks, now| match ks.live(key, now) {
            None => value::read_unsigned(&[], width, offset),
            Some(Slot {
                value: Value::Bits(bits), ..
            }) => value::read_unsigned(bits, width, offset),
            Some(slot) => Err(slot.value.wrong_type("bitmap")),
        })
    }

    async fn geo_add(&self, key: &str, member: &str, point: GeoPoint) -> Result<()> {
        if !geo::is_valid(point) {
            return Err(Error::unavailable(format!(
                "invalid longitude,latitude pair {},{}",
                point.longitude, point.latitude
            )));
        }
        self.with_keyspace(|ks, now| {
            match &mut ks.live_or_insert(key, now, || Value::Geo(HashMap::new())).value {
                Value::Geo(points) => {
                    points.insert(member.to_owned(), point);
                    Ok(())
                }
                other => Err(other.wrong_type("geo")),
            }
        })
    }

    async fn geo_search(&self, key: &str, center: GeoPoint, radius_m: f64, limit: usize) -> Result<Vec<GeoMatch>> {
        self.with_keyspace(|ks, now| match ks.live(key, now) {
            None => Ok(Vec::new()),
            Some(Slot {
                value: Value::Geo(points), ..
            }) => {
                let mut hits: Vec<GeoMatch> = points
                    .iter()
                    .map(|(member, point)| GeoMatch::new(member.clone(), geo::distance_m(center, *point)))
                    .filter(|hit| hit.distance_m <= radius_m)
                    .collect();
                hits.sort_by(|a, b| a.distance_m.total_cmp(&b.distance_m).then_with(|| a.member.cmp(&b.member)));
                hits.truncate(limit);
                Ok(hits)
            }
            Some(slot) => Err(slot.value.wrong_type("geo")),
        })
    }
}
