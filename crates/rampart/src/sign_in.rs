// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Daily sign-ins as one bitmap per user and month.

use jiff::civil::Date;
use rampart_store::{RemoteStore, Result};
use tracing::debug;

use crate::keys;

/// Records which days a user signed in.
///
/// Each month is a bitmap at `sign:<user>:<yyyyMM>` where bit `day - 1` is set once
/// the user signed in that day. Dates are civil dates; the caller decides the zone.
///
/// # Examples
///
/// ```
/// use jiff::civil::date;
/// use rampart::SignInCalendar;
/// use rampart_memory::MemoryStore;
/// use tick::Clock;
/// # futures::executor::block_on(async {
///
/// let calendar = SignInCalendar::new(MemoryStore::new(Clock::new_frozen()));
/// calendar.sign(1, date(2024, 3, 4)).await?;
/// calendar.sign(1, date(2024, 3, 5)).await?;
///
/// assert_eq!(calendar.streak(1, date(2024, 3, 5)).await?, 2);
/// assert_eq!(calendar.streak(1, date(2024, 3, 6)).await?, 0);
/// # Ok::<(), rampart::Error>(())
/// # });
/// ```
#[derive(Debug, Clone)]
pub struct SignInCalendar<S> {
    store: S,
}

impl<S: RemoteStore> SignInCalendar<S> {
    /// Creates a calendar over `store`.
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Signs `user` in on `date`. Returns `false` if they had already signed in that day.
    ///
    /// # Errors
    ///
    /// Returns an error if the store is unavailable.
    pub async fn sign(&self, user: u64, date: Date) -> Result<bool> {
        let was_signed = self.store.bit_set(&month_key(user, date), day_bit(date), true).await?;
        debug!(user, %date, first = !was_signed, "signed in");
        Ok(!was_signed)
    }

    /// Returns `true` if `user` signed in on `date`.
    ///
    /// # Errors
    ///
    /// Returns an error if the store is unavailable.
    pub async fn is_signed(&self, user: u64, date: Date) -> Result<bool> {
        let bit = self.store.bit_field_unsigned(&month_key(user, date), 1, day_bit(date)).await?;
        Ok(bit == 1)
    }

    /// Returns how many consecutive days up to and including `date` the user signed
    /// in, counting back no further than the first of the month.
    ///
    /// # Errors
    ///
    /// Returns an error if the store is unavailable.
    pub async fn streak(&self, user: u64, date: Date) -> Result<u32> {
        // The first `day` bits as an integer; the last day is the lowest bit.
        let days = self
            .store
            .bit_field_unsigned(&month_key(user, date), date.day().unsigned_abs(), 0)
            .await?;
        Ok(days.trailing_ones())
    }
}

fn month_key(user: u64, date: Date) -> String {
    keys::sign_key(user, &date.strftime("%Y%m").to_string())
}

fn day_bit(date: Date) -> u32 {
    u32::from(date.day().unsigned_abs()) - 1
}

#[cfg(test)]
mod tests {
    use jiff::civil::date;
    use rampart_memory::MemoryStore;
    use rampart_store::testing::{MockStore, StoreOp};
    use tick::Clock;

    use super::*;

    fn block_on<F: Future>(f: F) -> F::Output {
        futures::executor::block_on(f)
    }

    #[test]
    fn key_and_bit() {
        assert_eq!(month_key(5, date(2024, 3, 9)), "sign:5:202403");
        assert_eq!(day_bit(date(2024, 3, 1)), 0);
        assert_eq!(day_bit(date(2024, 3, 31)), 30);
    }

    #[test]
    fn sign_once_per_day() {
        block_on(async {
            let store = MockStore::new(MemoryStore::new(Clock::new_frozen()));
            let calendar = SignInCalendar::new(store.clone());

            assert!(calendar.sign(1, date(2024, 3, 9)).await.unwrap());
            assert!(!calendar.sign(1, date(2024, 3, 9)).await.unwrap());
            assert!(calendar.is_signed(1, date(2024, 3, 9)).await.unwrap());
            assert!(!calendar.is_signed(1, date(2024, 3, 8)).await.unwrap());
            assert!(!calendar.is_signed(2, date(2024, 3, 9)).await.unwrap());
            assert_eq!(
                store.operations()[0],
                StoreOp::BitSet {
                    key: "sign:1:202403".to_string(),
                    offset: 8
                }
            );
        });
    }

    #[test]
    fn streak_stops_at_gap() {
        block_on(async {
            let calendar = SignInCalendar::new(MemoryStore::new(Clock::new_frozen()));
            for day in [1, 2, 3, 5, 6, 7, 8] {
                calendar.sign(1, date(2024, 3, day)).await.unwrap();
            }

            assert_eq!(calendar.streak(1, date(2024, 3, 8)).await.unwrap(), 4);
            assert_eq!(calendar.streak(1, date(2024, 3, 3)).await.unwrap(), 3);
            assert_eq!(calendar.streak(1, date(2024, 3, 4)).await.unwrap(), 0);
        });
    }

    #[test]
    fn streak_does_not_cross_months() {
        block_on(async {
            let calendar = SignInCalendar::new(MemoryStore::new(Clock::new_frozen()));
            calendar.sign(1, date(2024, 2, 29)).await.unwrap();
            calendar.sign(1, date(2024, 3, 1)).await.unwrap();
            calendar.sign(1, date(2024, 3, 2)).await.unwrap();

            assert_eq!(calendar.streak(1, date(2024, 3, 2)).await.unwrap(), 2);
            assert_eq!(calendar.streak(1, date(2024, 2, 29)).await.unwrap(), 1);
        });
    }

    #[test]
    fn full_month_streak() {
        block_on(async {
            let calendar = SignInCalendar::new(MemoryStore::new(Clock::new_frozen()));
            for day in 1..=31 {
                calendar.sign(1, date(2024, 1, day)).await.unwrap();
            }
            assert_eq!(calendar.streak(1, date(2024, 1, 31)).await.unwrap(), 31);
        });
    }
}
