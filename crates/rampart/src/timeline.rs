// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Fan-out-on-write timelines with score-and-offset scrolling.

use futures::future::try_join_all;
use rampart_store::{RemoteStore, Result, ScoredMember};
use tracing::debug;

use crate::keys;

/// Supplies the current followers of a producer.
///
/// Implemented by [`FollowGraph`](crate::FollowGraph) and by plain id slices.
pub trait FollowerSource: Send + Sync {
    /// Returns the ids following `producer`.
    fn followers(&self, producer: u64) -> impl Future<Output = Result<Vec<u64>>> + Send;
}

impl FollowerSource for [u64] {
    fn followers(&self, _producer: u64) -> impl Future<Output = Result<Vec<u64>>> + Send {
        std::future::ready(Ok(self.to_vec()))
    }
}

/// Where the next page of a scroll starts.
///
/// The next page holds entries scored at most `max_score`, after skipping `offset`
/// entries that carry exactly `max_score` and were already returned.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScrollCursor {
    /// The highest score the next page may contain.
    pub max_score: f64,
    /// How many entries scored `max_score` to skip.
    pub offset: usize,
}

impl ScrollCursor {
    /// The cursor of the first page: everything, nothing skipped.
    #[must_use]
    pub const fn start() -> Self {
        Self::new(f64::INFINITY, 0)
    }

    /// Creates a cursor from a score bound and a same-score offset.
    #[must_use]
    pub const fn new(max_score: f64, offset: usize) -> Self {
        Self { max_score, offset }
    }
}

impl Default for ScrollCursor {
    fn default() -> Self {
        Self::start()
    }
}

/// One entry of a personal timeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimelineItem {
    /// The published item.
    pub item: u64,
    /// The publish timestamp, used as the score.
    pub timestamp: u64,
}

/// A page of a timeline, newest first.
#[derive(Debug, Clone, PartialEq)]
pub struct ScrollPage {
    /// The entries of this page in non-increasing timestamp order.
    pub items: Vec<TimelineItem>,
    /// The cursor of the following page, or `None` once the timeline is exhausted.
    pub next: Option<ScrollCursor>,
}

/// Personal timelines kept as ordered sets at `timeline:<consumer>`.
///
/// # Examples
///
/// ```
/// use rampart::{ScrollCursor, Timeline};
/// use rampart_memory::MemoryStore;
/// use tick::Clock;
/// # futures::executor::block_on(async {
///
/// let timeline = Timeline::new(MemoryStore::new(Clock::new_frozen()));
/// let followers: &[u64] = &[7, 8];
///
/// timeline.publish(1, 100, 1_700_000_000, followers).await?;
/// timeline.publish(1, 101, 1_700_000_060, followers).await?;
///
/// let page = timeline.scroll(7, ScrollCursor::start(), 10).await?;
/// let items: Vec<u64> = page.items.iter().map(|i| i.item).collect();
/// assert_eq!(items, [101, 100]);
/// # Ok::<(), rampart::Error>(())
/// # });
/// ```
#[derive(Debug, Clone)]
pub struct Timeline<S> {
    store: S,
}

impl<S: RemoteStore> Timeline<S> {
    /// Creates timelines over `store`.
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Pushes `item` into the timeline of every follower of `producer`, scored by
    /// `timestamp`. Returns the number of timelines written.
    ///
    /// # Errors
    ///
    /// Returns the follower source's error, or an error if the store is unavailable.
    /// A failure part way leaves the item in some timelines only.
    pub async fn publish<F>(&self, producer: u64, item: u64, timestamp: u64, followers: &F) -> Result<usize>
    where
        F: FollowerSource + ?Sized,
    {
        let followers = followers.followers(producer).await?;
        let member = item.to_string();
        #[expect(clippy::cast_precision_loss, reason = "timestamps stay well below 2^53")]
        let score = timestamp as f64;

        try_join_all(followers.iter().map(|follower| {
            let key = keys::timeline_key(*follower);
            let member = member.as_str();
            async move { self.store.sorted_add(&key, member, score).await }
        }))
        .await?;

        debug!(producer, item, fanout = followers.len(), "item published");
        Ok(followers.len())
    }

    /// Reads one page of `consumer`'s timeline, newest first.
    ///
    /// Entries sharing a score are never skipped or repeated across pages, even when
    /// a run of equal scores is longer than a page. A `page_size` of zero returns an
    /// empty, final page.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::Corrupted`](crate::ErrorKind::Corrupted) if a timeline
    /// member is not a numeric id, or an error if the store is unavailable.
    pub async fn scroll(&self, consumer: u64, cursor: ScrollCursor, page_size: usize) -> Result<ScrollPage> {
        let entries = self
            .store
            .sorted_rev_range_by_score(
                &keys::timeline_key(consumer),
                cursor.max_score,
                f64::NEG_INFINITY,
                cursor.offset,
                page_size,
            )
            .await?;

        let next = next_cursor(&entries, cursor);
        let items = entries
            .into_iter()
            .map(|entry| {
                Ok(TimelineItem {
                    item: keys::parse_id(&entry.member)?,
                    timestamp: score_to_timestamp(entry.score),
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(ScrollPage { items, next })
    }
}

/// Computes the cursor following `page`.
///
/// Entries arrive in non-increasing score order, so the last score is the minimum
/// and the run length counts the entries sharing it. When the whole page shares the
/// incoming bound the run continues from the incoming offset.
fn next_cursor(page: &[ScoredMember], incoming: ScrollCursor) -> Option<ScrollCursor> {
    let mut entries = page.iter();
    let mut min_score = entries.next()?.score;
    let mut run = 1;
    for entry in entries {
        if entry.score.total_cmp(&min_score).is_eq() {
            run += 1;
        } else {
            min_score = entry.score;
            run = 1;
        }
    }

    let offset = if min_score.total_cmp(&incoming.max_score).is_eq() {
        incoming.offset.saturating_add(run)
    } else {
        run
    };
    Some(ScrollCursor::new(min_score, offset))
}

#[expect(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    reason = "scores are written from u64 timestamps"
)]
fn score_to_timestamp(score: f64) -> u64 {
    score as u64
}
