// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::{fmt, time::Duration};

use rampart_store::{Error, GeoMatch, GeoPoint, RemoteStore, Result, ScoredMember};
use redis::{Client, Cmd, FromRedisValue, Script, aio::ConnectionManager, cmd};

use crate::commands::{self, COMPARE_AND_DELETE};

/// A [`RemoteStore`] backed by a Redis server.
///
/// Holds a [`ConnectionManager`], which multiplexes commands over one connection and
/// reconnects on failure. Clones share the connection.
///
/// Every Redis error, including a refused connection, surfaces as
/// [`ErrorKind::RemoteStoreUnavailable`](rampart_store::ErrorKind::RemoteStoreUnavailable).
#[derive(Clone)]
pub struct RedisStore {
    connection: ConnectionManager,
    compare_and_delete: Script,
}

impl fmt::Debug for RedisStore {
    #[cfg_attr(test, mutants::skip)]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedisStore").finish_non_exhaustive()
    }
}

impl RedisStore {
    /// Wraps an existing connection manager.
    #[must_use]
    pub fn new(connection: ConnectionManager) -> Self {
        Self {
            connection,
            compare_and_delete: Script::new(COMPARE_AND_DELETE),
        }
    }

    /// Opens a connection manager for `url`, e.g. `redis://127.0.0.1:6379/0`.
    ///
    /// # Errors
    ///
    /// Returns a remote-store-unavailable error if the URL is invalid or the server
    /// cannot be reached.
    pub async fn connect(url: &str) -> Result<Self> {
        let client = Client::open(url).map_err(Error::unavailable)?;
        let connection = client.get_connection_manager().await.map_err(Error::unavailable)?;
        Ok(Self::new(connection))
    }

    async fn query<T: FromRedisValue>(&self, command: Cmd) -> Result<T> {
        let mut connection = self.connection.clone();
        command.query_async(&mut connection).await.map_err(Error::unavailable)
    }
}

impl RemoteStore for RedisStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        self.query(cmd("GET").arg(key).clone()).await
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<()> {
        let mut command = cmd("SET");
        command.arg(key).arg(value);
        if let Some(ttl) = ttl {
            command.arg("PX").arg(commands::ttl_millis(ttl));
        }
        self.query(command).await
    }

    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> Result<bool> {
        let reply: Option<String> = self
            .query(
                cmd("SET")
                    .arg(key)
                    .arg(value)
                    .arg("NX")
                    .arg("PX")
                    .arg(commands::ttl_millis(ttl))
                    .clone(),
            )
            .await?;
        Ok(reply.is_some())
    }

    async fn compare_and_delete(&self, key: &str, expected: &str) -> Result<bool> {
        let mut connection = self.connection.clone();
        let deleted: i64 = self
            .compare_and_delete
            .key(key)
            .arg(expected)
            .invoke_async(&mut connection)
            .await
            .map_err(Error::unavailable)?;
        Ok(deleted == 1)
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        let deleted: i64 = self.query(cmd("DEL").arg(key).clone()).await?;
        Ok(deleted > 0)
    }

    async fn increment(&self, key: &str) -> Result<i64> {
        self.query(cmd("INCR").arg(key).clone()).await
    }

    async fn sorted_add(&self, key: &str, member: &str, score: f64) -> Result<()> {
        let _added: i64 = self.query(cmd("ZADD").arg(key).arg(score).arg(member).clone()).await?;
        Ok(())
    }

    async fn sorted_remove(&self, key: &str, member: &str) -> Result<bool> {
        let removed: i64 = self.query(cmd("ZREM").arg(key).arg(member).clone()).await?;
        Ok(removed > 0)
    }

    async fn sorted_score(&self, key: &str, member: &str) -> Result<Option<f64>> {
        self.query(cmd("ZSCORE").arg(key).arg(member).clone()).await
    }

    async fn sorted_range(&self, key: &str, start: usize, stop: usize) -> Result<Vec<String>> {
        self.query(cmd("ZRANGE").arg(key).arg(start).arg(stop).clone()).await
    }

    async fn sorted_rev_range_by_score(&self, key: &str, max: f64, min: f64, offset: usize, count: usize) -> Result<Vec<ScoredMember>> {
        if count == 0 {
            return Ok(Vec::new());
        }
        let pairs: Vec<(String, f64)> = self
            .query(
                cmd("ZREVRANGEBYSCORE")
                    .arg(key)
                    .arg(commands::score_bound(max))
                    .arg(commands::score_bound(min))
                    .arg("WITHSCORES")
                    .arg("LIMIT")
                    .arg(offset)
                    .arg(count)
                    .clone(),
            )
            .await?;
        Ok(pairs.into_iter().map(|(member, score)| ScoredMember::new(member, score)).collect())
    }

    async fn set_add(&self, key: &str, member: &str) -> Result<bool> {
        let added: i64 = self.query(cmd("SADD").arg(key).arg(member).clone()).await?;
        Ok(added > 0)
    }

    async fn set_remove(&self, key: &str, member: &str) -> Result<bool> {
        let removed: i64 = self.query(cmd("SREM").arg(key).arg(member).clone()).await?;
        Ok(removed > 0)
    }

    async fn set_contains(&self, key: &str, member: &str) -> Result<bool> {
        let present: i64 = self.query(cmd("SISMEMBER").arg(key).arg(member).clone()).await?;
        Ok(present == 1)
    }

    async fn set_members(&self, key: &str) -> Result<Vec<String>> {
        self.query(cmd("SMEMBERS").arg(key).clone()).await
    }

    async fn set_intersect(&self, keys: &[&str]) -> Result<Vec<String>> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        self.query(cmd("SINTER").arg(keys).clone()).await
    }

    async fn bit_set(&self, key: &str, offset: u32, value: bool) -> Result<bool> {
        let previous: i64 = self
            .query(cmd("SETBIT").arg(key).arg(offset).arg(u8::from(value)).clone())
            .await?;
        Ok(previous == 1)
    }

    async fn bit_field_unsigned(&self, key: &str, width: u8, offset: u32) -> Result<u64> {
        let replies: Vec<i64> = self
            .query(cmd("BITFIELD").arg(key).arg("GET").arg(format!("u{width}")).arg(offset).clone())
            .await?;
        let value = replies
            .into_iter()
            .next()
            .ok_or_else(|| Error::unavailable("BITFIELD returned no reply"))?;
        u64::try_from(value).map_err(Error::corrupted)
    }

    async fn geo_add(&self, key: &str, member: &str, point: GeoPoint) -> Result<()> {
        let _added: i64 = self
            .query(cmd("GEOADD").arg(key).arg(point.longitude).arg(point.latitude).arg(member).clone())
            .await?;
        Ok(())
    }

    async fn geo_search(&self, key: &str, center: GeoPoint, radius_m: f64, limit: usize) -> Result<Vec<GeoMatch>> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let hits: Vec<(String, f64)> = self
            .query(
                cmd("GEOSEARCH")
                    .arg(key)
                    .arg("FROMLONLAT")
                    .arg(center.longitude)
                    .arg(center.latitude)
                    .arg("BYRADIUS")
                    .arg(radius_m)
                    .arg("m")
                    .arg("ASC")
                    .arg("COUNT")
                    .arg(limit)
                    .arg("WITHDIST")
                    .clone(),
            )
            .await?;
        Ok(hits.into_iter().map(|(member, distance)| GeoMatch::new(member, distance)).collect())
    }
}
