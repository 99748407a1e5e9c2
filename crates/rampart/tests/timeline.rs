// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Integration tests for timeline fan-out and scrolling.

use rampart::{Error, FollowGraph, ScrollCursor, ScrollPage, Timeline, TimelineItem};
use rampart_memory::MemoryStore;
use tick::Clock;

type TestResult = Result<(), Error>;

const CONSUMER: u64 = 7;
const PRODUCER: u64 = 1;

fn block_on<F: Future>(f: F) -> F::Output {
    futures::executor::block_on(f)
}

fn item(item: u64, timestamp: u64) -> TimelineItem {
    TimelineItem { item, timestamp }
}

async fn published(timestamps: &[u64]) -> Result<Timeline<MemoryStore>, Error> {
    let timeline = Timeline::new(MemoryStore::new(Clock::new_frozen()));
    let followers: &[u64] = &[CONSUMER];
    for (item, timestamp) in (1..).zip(timestamps) {
        timeline.publish(PRODUCER, item, *timestamp, followers).await?;
    }
    Ok(timeline)
}

async fn scroll_all(timeline: &Timeline<MemoryStore>, page_size: usize) -> Result<Vec<ScrollPage>, Error> {
    let mut pages = Vec::new();
    let mut cursor = ScrollCursor::start();
    loop {
        let page = timeline.scroll(CONSUMER, cursor, page_size).await?;
        let next = page.next;
        pages.push(page);
        match next {
            Some(next) => cursor = next,
            None => return Ok(pages),
        }
    }
}

#[test]
fn equal_scores_split_across_pages() -> TestResult {
    block_on(async {
        let timeline = published(&[100, 100, 100, 90, 80]).await?;

        let first = timeline.scroll(CONSUMER, ScrollCursor::start(), 2).await?;
        assert_eq!(first.items, [item(3, 100), item(2, 100)]);
        assert_eq!(first.next, Some(ScrollCursor::new(100.0, 2)));

        let second = timeline.scroll(CONSUMER, ScrollCursor::new(100.0, 2), 2).await?;
        assert_eq!(second.items, [item(1, 100), item(4, 90)]);
        assert_eq!(second.next, Some(ScrollCursor::new(90.0, 1)));

        let third = timeline.scroll(CONSUMER, ScrollCursor::new(90.0, 1), 2).await?;
        assert_eq!(third.items, [item(5, 80)]);

        let end = timeline.scroll(CONSUMER, third.next.unwrap(), 2).await?;
        assert!(end.items.is_empty());
        assert_eq!(end.next, None);
        Ok(())
    })
}

#[test]
fn run_longer_than_a_page_is_walked_without_gaps() -> TestResult {
    block_on(async {
        let timeline = published(&[50, 50, 50, 50, 50, 50, 50, 40]).await?;

        let pages = scroll_all(&timeline, 3).await?;
        let items: Vec<u64> = pages.iter().flat_map(|p| p.items.iter().map(|i| i.item)).collect();

        assert_eq!(items, [7, 6, 5, 4, 3, 2, 1, 8]);
        assert_eq!(pages[1].items.first().map(|i| i.timestamp), Some(50));
        assert_eq!(pages[0].next, Some(ScrollCursor::new(50.0, 3)));
        assert_eq!(pages[1].next, Some(ScrollCursor::new(50.0, 6)));
        Ok(())
    })
}

#[test]
fn newer_items_do_not_shift_an_open_scroll() -> TestResult {
    block_on(async {
        let timeline = published(&[30, 20, 10]).await?;
        let followers: &[u64] = &[CONSUMER];

        let first = timeline.scroll(CONSUMER, ScrollCursor::start(), 2).await?;
        timeline.publish(PRODUCER, 99, 40, followers).await?;
        let second = timeline.scroll(CONSUMER, first.next.unwrap(), 2).await?;

        assert_eq!(first.items, [item(1, 30), item(2, 20)]);
        assert_eq!(second.items, [item(3, 10)]);
        Ok(())
    })
}

#[test]
fn follow_graph_drives_fan_out() -> TestResult {
    block_on(async {
        let store = MemoryStore::new(Clock::new_frozen());
        let graph = FollowGraph::new(store.clone());
        let timeline = Timeline::new(store);
        graph.follow(7, PRODUCER).await?;
        graph.follow(8, PRODUCER).await?;
        graph.follow(8, 2).await?;

        assert_eq!(timeline.publish(PRODUCER, 500, 1_000, &graph).await?, 2);
        assert_eq!(timeline.publish(2, 501, 1_001, &graph).await?, 1);

        let seven = timeline.scroll(7, ScrollCursor::start(), 10).await?;
        let eight = timeline.scroll(8, ScrollCursor::start(), 10).await?;
        assert_eq!(seven.items, [item(500, 1_000)]);
        assert_eq!(eight.items, [item(501, 1_001), item(500, 1_000)]);

        graph.unfollow(7, PRODUCER).await?;
        assert_eq!(timeline.publish(PRODUCER, 502, 1_002, &graph).await?, 1);
        Ok(())
    })
}

#[test]
fn empty_timeline_ends_immediately() -> TestResult {
    block_on(async {
        let timeline = Timeline::new(MemoryStore::new(Clock::new_frozen()));
        let page = timeline.scroll(CONSUMER, ScrollCursor::start(), 10).await?;
        assert!(page.items.is_empty());
        assert_eq!(page.next, None);
        Ok(())
    })
}
