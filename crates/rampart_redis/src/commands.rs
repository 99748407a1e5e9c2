// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Argument encoding shared by the Redis commands.

use std::time::Duration;

/// Deletes `KEYS[1]` only while it still holds `ARGV[1]`.
pub(crate) const COMPARE_AND_DELETE: &str = r"
if redis.call('GET', KEYS[1]) == ARGV[1] then
    return redis.call('DEL', KEYS[1])
end
return 0
";

/// Formats a score bound the way `ZRANGEBYSCORE` expects it.
pub(crate) fn score_bound(score: f64) -> String {
    match (score.is_infinite(), score.is_sign_positive()) {
        (true, true) => "+inf".to_owned(),
        (true, false) => "-inf".to_owned(),
        _ => score.to_string(),
    }
}

/// Converts a TTL to whole milliseconds for `PX`.
///
/// Sub-millisecond TTLs round up so that a non-zero TTL never becomes `PX 0`.
pub(crate) fn ttl_millis(ttl: Duration) -> u64 {
    let millis = u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX);
    if millis == 0 && !ttl.is_zero() { 1 } else { millis }
}
