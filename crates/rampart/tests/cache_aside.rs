// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Integration tests for the cache-aside read strategies.

use std::{
    io,
    panic::AssertUnwindSafe,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::{Duration, SystemTime},
};

use futures::{FutureExt, future::BoxFuture};
use rampart::{CacheAsideStore, CacheKey, DistributedLock, Error, ErrorKind, RemoteStore};
use rampart_memory::MemoryStore;
use rampart_store::testing::{MockStore, StoreOp};
use serde::{Deserialize, Serialize};
use tick::ClockControl;
use tokio::sync::Notify;
use tracing_test::traced_test;

type TestResult = Result<(), Error>;
type Store = MockStore<MemoryStore>;
type Loader<V> = Box<dyn FnOnce() -> BoxFuture<'static, io::Result<Option<V>>> + Send>;

const TTL: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Shop {
    id: u64,
    name: String,
}

fn shop(name: &str) -> Shop {
    Shop {
        id: 1,
        name: name.to_string(),
    }
}

fn block_on<F: Future>(f: F) -> F::Output {
    futures::executor::block_on(f)
}

fn control() -> ClockControl {
    // 2024-03-05T10:20:30Z
    ClockControl::new_at(SystemTime::UNIX_EPOCH + Duration::from_secs(1_709_634_030))
}

fn setup(control: &ClockControl) -> (Store, CacheAsideStore<Store>) {
    let store = MockStore::new(MemoryStore::new(control.to_clock()));
    let cache = CacheAsideStore::builder(store.clone(), control.to_clock())
        .lock_ttl(Duration::from_secs(3_600))
        .rebuild_timeout(Duration::from_secs(1))
        .build();
    (store, cache)
}

/// A loader that counts its calls and returns `value`.
fn counting<V: Send + 'static>(calls: &Arc<AtomicUsize>, value: Option<V>) -> Loader<V> {
    let calls = Arc::clone(calls);
    Box::new(move || {
        async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(value)
        }
        .boxed()
    })
}

/// A loader that counts its calls and waits for `gate` before returning `value`.
fn gated<V: Send + 'static>(calls: &Arc<AtomicUsize>, gate: &Arc<Notify>, value: Option<V>) -> Loader<V> {
    let calls = Arc::clone(calls);
    let gate = Arc::clone(gate);
    Box::new(move || {
        async move {
            calls.fetch_add(1, Ordering::SeqCst);
            gate.notified().await;
            Ok(value)
        }
        .boxed()
    })
}

fn failing<V: Send + 'static>() -> Loader<V> {
    Box::new(|| async { Err(io::Error::other("database unreachable")) }.boxed())
}

async fn wait_for_rebuilds(cache: &CacheAsideStore<Store>) {
    while cache.pending_rebuilds() > 0 {
        tokio::task::yield_now().await;
    }
}

async fn lock_holder(store: &Store, name: &str) -> Option<String> {
    store.inner().get(&format!("lock:{name}")).await.unwrap()
}

#[test]
fn absent_key_reaches_loader_once_per_null_window() -> TestResult {
    block_on(async {
        let control = control();
        let (store, cache) = setup(&control);
        let calls = Arc::new(AtomicUsize::new(0));
        let key = CacheKey::new("shop", 404);

        for _ in 0..100 {
            assert_eq!(cache.read(&key, counting::<Shop>(&calls, None), TTL).await?, None);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(store.count(|op| matches!(op, StoreOp::Set { .. })), 1);

        control.advance(Duration::from_secs(121));
        assert_eq!(cache.read(&key, counting::<Shop>(&calls, None), TTL).await?, None);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        Ok(())
    })
}

#[test]
fn present_value_is_cached_for_its_ttl() -> TestResult {
    block_on(async {
        let control = control();
        let (_store, cache) = setup(&control);
        let calls = Arc::new(AtomicUsize::new(0));
        let key = CacheKey::new("shop", 1);

        let first = cache.read(&key, counting(&calls, Some(shop("Noodles"))), TTL).await?;
        let second = cache.read(&key, counting(&calls, Some(shop("Burgers"))), TTL).await?;
        assert_eq!(first, Some(shop("Noodles")));
        assert_eq!(second, Some(shop("Noodles")));
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        control.advance(TTL);
        let third = cache.read(&key, counting(&calls, Some(shop("Burgers"))), TTL).await?;
        assert_eq!(third, Some(shop("Burgers")));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        Ok(())
    })
}

#[test]
fn loader_failure_reaches_caller_and_is_retried() -> TestResult {
    block_on(async {
        let control = control();
        let (_store, cache) = setup(&control);
        let calls = Arc::new(AtomicUsize::new(0));
        let key = CacheKey::new("shop", 1);

        let err = cache.read(&key, failing::<Shop>(), TTL).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::LoaderFailure);

        let value = cache.read(&key, counting(&calls, Some(shop("Noodles"))), TTL).await?;
        assert_eq!(value, Some(shop("Noodles")));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        Ok(())
    })
}

#[test]
fn invalidate_forces_a_reload() -> TestResult {
    block_on(async {
        let control = control();
        let (_store, cache) = setup(&control);
        let calls = Arc::new(AtomicUsize::new(0));
        let key = CacheKey::new("shop", 1);

        cache.read(&key, counting(&calls, Some(shop("Noodles"))), TTL).await?;
        assert!(cache.invalidate(&key).await?);
        let value = cache.read(&key, counting(&calls, Some(shop("Burgers"))), TTL).await?;

        assert_eq!(value, Some(shop("Burgers")));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        Ok(())
    })
}

#[test]
fn fresh_wrapped_entry_skips_the_lock() -> TestResult {
    block_on(async {
        let control = control();
        let (store, cache) = setup(&control);
        let calls = Arc::new(AtomicUsize::new(0));
        let key = CacheKey::new("shop", 1);
        cache.set_with_logical_expire(&key, &shop("Noodles"), TTL).await?;
        store.clear_operations();

        for _ in 0..10 {
            let value = cache
                .read_with_logical_expire(&key, counting(&calls, Some(shop("Burgers"))), TTL)
                .await?;
            assert_eq!(value, Some(shop("Noodles")));
        }

        assert_eq!(store.count(|op| matches!(op, StoreOp::SetIfAbsent { .. })), 0);
        assert_eq!(store.operations().len(), 10);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        Ok(())
    })
}

#[tokio::test]
async fn expired_hot_key_is_rebuilt_once_while_stale_is_served() -> TestResult {
    let control = control();
    let (store, cache) = setup(&control);
    let calls = Arc::new(AtomicUsize::new(0));
    let gate = Arc::new(Notify::new());
    let key = CacheKey::new("shop", 1);
    cache.set_with_logical_expire(&key, &shop("Noodles"), TTL).await?;
    control.advance(TTL);

    let reads = (0..20).map(|_| cache.read_with_logical_expire(&key, gated(&calls, &gate, Some(shop("Burgers"))), TTL));
    for value in futures::future::join_all(reads).await {
        assert_eq!(value?, Some(shop("Noodles")));
    }
    assert_eq!(cache.pending_rebuilds(), 1);
    assert!(lock_holder(&store, "shop:1").await.is_some());

    gate.notify_one();
    wait_for_rebuilds(&cache).await;

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(lock_holder(&store, "shop:1").await, None);
    let value = cache
        .read_with_logical_expire(&key, counting(&calls, Some(shop("Pizza"))), TTL)
        .await?;
    assert_eq!(value, Some(shop("Burgers")));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    Ok(())
}

#[tokio::test]
async fn rebuild_writes_a_new_logical_expiry() -> TestResult {
    let control = control();
    let (store, cache) = setup(&control);
    let calls = Arc::new(AtomicUsize::new(0));
    let key = CacheKey::new("shop", 1);
    cache.set_with_logical_expire(&key, &shop("Noodles"), TTL).await?;
    control.advance(TTL);

    cache
        .read_with_logical_expire(&key, counting(&calls, Some(shop("Burgers"))), Duration::from_secs(60))
        .await?;
    wait_for_rebuilds(&cache).await;

    let raw = store.inner().get(key.as_str()).await?.unwrap();
    assert_eq!(
        raw,
        r#"{"data":{"id":1,"name":"Burgers"},"expire_at_ms":1709634120000}"#
    );
    assert_eq!(store.inner().ttl(key.as_str()), None);
    Ok(())
}

#[tokio::test]
async fn rebuild_of_vanished_entity_removes_the_hot_key() -> TestResult {
    let control = control();
    let (store, cache) = setup(&control);
    let calls = Arc::new(AtomicUsize::new(0));
    let key = CacheKey::new("shop", 1);
    cache.set_with_logical_expire(&key, &shop("Noodles"), TTL).await?;
    control.advance(TTL);

    let stale = cache.read_with_logical_expire(&key, counting::<Shop>(&calls, None), TTL).await?;
    assert_eq!(stale, Some(shop("Noodles")));
    wait_for_rebuilds(&cache).await;

    assert_eq!(store.inner().get(key.as_str()).await?, None);
    assert_eq!(lock_holder(&store, "shop:1").await, None);
    Ok(())
}

#[tokio::test]
#[traced_test]
async fn rebuild_failure_is_logged_and_releases_the_lock() -> TestResult {
    let control = control();
    let (store, cache) = setup(&control);
    let key = CacheKey::new("shop", 1);
    cache.set_with_logical_expire(&key, &shop("Noodles"), TTL).await?;
    control.advance(TTL);

    let stale = cache.read_with_logical_expire(&key, failing::<Shop>(), TTL).await?;
    assert_eq!(stale, Some(shop("Noodles")));
    wait_for_rebuilds(&cache).await;

    assert!(logs_contain("rebuild loader failed"));
    assert!(logs_contain("database unreachable"));
    assert_eq!(lock_holder(&store, "shop:1").await, None);

    // The stale entry survives for the next caller to retry.
    let stale = cache.read_with_logical_expire(&key, failing::<Shop>(), TTL).await?;
    assert_eq!(stale, Some(shop("Noodles")));
    Ok(())
}

#[tokio::test]
#[traced_test]
async fn rebuild_panic_is_logged_and_releases_the_lock() -> TestResult {
    let control = control();
    let (store, cache) = setup(&control);
    let key = CacheKey::new("shop", 1);
    cache.set_with_logical_expire(&key, &shop("Noodles"), TTL).await?;
    control.advance(TTL);

    let panicking: Loader<Shop> = Box::new(|| async { panic!("loader bug") }.boxed());
    cache.read_with_logical_expire(&key, panicking, TTL).await?;
    wait_for_rebuilds(&cache).await;

    assert!(logs_contain("rebuild loader panicked"));
    assert_eq!(lock_holder(&store, "shop:1").await, None);
    Ok(())
}

#[tokio::test]
#[traced_test]
async fn rebuild_timeout_is_logged_and_releases_the_lock() -> TestResult {
    let control = control();
    let (store, cache) = setup(&control);
    let key = CacheKey::new("shop", 1);
    cache.set_with_logical_expire(&key, &shop("Noodles"), TTL).await?;
    control.advance(TTL);

    let stuck: Loader<Shop> = Box::new(|| std::future::pending().boxed());
    cache.read_with_logical_expire(&key, stuck, TTL).await?;

    for _ in 0..100 {
        if cache.pending_rebuilds() == 0 {
            break;
        }
        tokio::task::yield_now().await;
        control.advance(Duration::from_millis(500));
    }

    assert_eq!(cache.pending_rebuilds(), 0);
    assert!(logs_contain("rebuild timed out"));
    assert_eq!(lock_holder(&store, "shop:1").await, None);
    Ok(())
}

#[tokio::test]
#[traced_test]
async fn saturated_pool_serves_stale_and_frees_the_lock() -> TestResult {
    let control = control();
    let store = MockStore::new(MemoryStore::new(control.to_clock()));
    let cache = CacheAsideStore::builder(store.clone(), control.to_clock())
        .rebuild_workers(1)
        .rebuild_queue(0)
        .build();
    let calls = Arc::new(AtomicUsize::new(0));
    let gate = Arc::new(Notify::new());
    let (busy, other) = (CacheKey::new("shop", 1), CacheKey::new("shop", 2));
    cache.set_with_logical_expire(&busy, &shop("Noodles"), TTL).await?;
    cache.set_with_logical_expire(&other, &shop("Tacos"), TTL).await?;
    control.advance(TTL);

    cache
        .read_with_logical_expire(&busy, gated(&calls, &gate, Some(shop("Burgers"))), TTL)
        .await?;
    let stale = cache
        .read_with_logical_expire(&other, counting(&calls, Some(shop("Pizza"))), TTL)
        .await?;

    assert_eq!(stale, Some(shop("Tacos")));
    assert!(logs_contain("rebuild pool saturated"));
    assert_eq!(lock_holder(&store, "shop:2").await, None);
    assert!(lock_holder(&store, "shop:1").await.is_some());

    gate.notify_one();
    wait_for_rebuilds(&cache).await;
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    Ok(())
}

#[tokio::test]
#[traced_test]
async fn rebuild_queued_past_its_lock_is_dropped() -> TestResult {
    let control = control();
    let store = MockStore::new(MemoryStore::new(control.to_clock()));
    let cache = CacheAsideStore::builder(store.clone(), control.to_clock())
        .lock_ttl(Duration::from_secs(10))
        .rebuild_timeout(Duration::from_secs(3_600))
        .rebuild_workers(2)
        .rebuild_queue(2)
        .build();
    let (busy_calls, queued_calls) = (Arc::new(AtomicUsize::new(0)), Arc::new(AtomicUsize::new(0)));
    let (gate_1, gate_2) = (Arc::new(Notify::new()), Arc::new(Notify::new()));
    let (key_1, key_2, key_3) = (CacheKey::new("shop", 1), CacheKey::new("shop", 2), CacheKey::new("shop", 3));
    for key in [&key_1, &key_2, &key_3] {
        cache.set_with_logical_expire(key, &shop("Noodles"), TTL).await?;
    }
    control.advance(TTL);

    // Both workers stay busy with gated rebuilds.
    cache
        .read_with_logical_expire(&key_1, gated(&busy_calls, &gate_1, Some(shop("Burgers"))), TTL)
        .await?;
    cache
        .read_with_logical_expire(&key_2, gated(&busy_calls, &gate_2, Some(shop("Burgers"))), TTL)
        .await?;
    while busy_calls.load(Ordering::SeqCst) < 2 {
        tokio::task::yield_now().await;
    }

    // The rebuild of key 3 waits in the queue until its lock has lapsed.
    cache
        .read_with_logical_expire(&key_3, counting(&queued_calls, Some(shop("Pizza"))), TTL)
        .await?;
    control.advance(Duration::from_secs(11));
    cache
        .read_with_logical_expire(&key_3, counting(&queued_calls, Some(shop("Pizza"))), TTL)
        .await?;
    assert_eq!(cache.pending_rebuilds(), 4);

    gate_1.notify_one();
    gate_2.notify_one();
    wait_for_rebuilds(&cache).await;

    assert_eq!(queued_calls.load(Ordering::SeqCst), 1, "only the rebuild holding a live lock may load");
    assert!(logs_contain("rebuild lock expired while queued"));
    assert_eq!(lock_holder(&store, "shop:3").await, None);
    let rebuilt = cache
        .read_with_logical_expire(&key_3, counting(&queued_calls, Some(shop("Tacos"))), TTL)
        .await?;
    assert_eq!(rebuilt, Some(shop("Pizza")));
    Ok(())
}

#[test]
fn mutex_read_loads_once_and_releases() -> TestResult {
    block_on(async {
        let control = control();
        let (store, cache) = setup(&control);
        let calls = Arc::new(AtomicUsize::new(0));
        let key = CacheKey::new("shop", 1);

        let value = cache.read_with_mutex(&key, counting(&calls, Some(shop("Noodles"))), TTL).await?;
        assert_eq!(value, Some(shop("Noodles")));
        let value = cache.read_with_mutex(&key, counting(&calls, Some(shop("Burgers"))), TTL).await?;
        assert_eq!(value, Some(shop("Noodles")));

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(store.count(|op| matches!(op, StoreOp::SetIfAbsent { .. })), 1);
        assert_eq!(store.count(|op| matches!(op, StoreOp::CompareAndDelete { .. })), 1);
        assert_eq!(lock_holder(&store, "shop:1").await, None);
        Ok(())
    })
}

#[test]
fn mutex_read_caches_absence() -> TestResult {
    block_on(async {
        let control = control();
        let (_store, cache) = setup(&control);
        let calls = Arc::new(AtomicUsize::new(0));
        let key = CacheKey::new("shop", 404);

        assert_eq!(cache.read_with_mutex(&key, counting::<Shop>(&calls, None), TTL).await?, None);
        assert_eq!(cache.read_with_mutex(&key, counting::<Shop>(&calls, None), TTL).await?, None);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        Ok(())
    })
}

#[test]
fn mutex_read_gives_up_after_its_attempts() {
    block_on(async {
        let control = ClockControl::new().auto_advance_timers(true);
        let store = MockStore::new(MemoryStore::new(control.to_clock()));
        let cache = CacheAsideStore::builder(store.clone(), control.to_clock())
            .mutex_retry(Duration::from_millis(10), 3)
            .build();
        let held = DistributedLock::new(store.inner().clone())
            .try_acquire("shop:1", "other-process", Duration::from_secs(60))
            .await
            .unwrap();
        assert!(held.is_some());

        let calls = Arc::new(AtomicUsize::new(0));
        let err = cache
            .read_with_mutex(&CacheKey::new("shop", 1), counting(&calls, Some(shop("Noodles"))), TTL)
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::LockUnavailable);
        assert_eq!(store.count(|op| matches!(op, StoreOp::SetIfAbsent { .. })), 3);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    });
}

#[tokio::test]
async fn mutex_waiter_picks_up_the_winners_value() -> TestResult {
    let control = control();
    let (store, cache) = setup(&control);
    let key = CacheKey::new("shop", 1);
    let lock = DistributedLock::new(store.inner().clone());
    let token = lock
        .try_acquire(key.name(), "winner", Duration::from_secs(60))
        .await?
        .unwrap();

    let calls = Arc::new(AtomicUsize::new(0));
    let waiter = {
        let cache = cache.clone();
        let key = key.clone();
        let loader = counting(&calls, Some(shop("Burgers")));
        tokio::spawn(async move { cache.read_with_mutex(&key, loader, TTL).await })
    };
    tokio::task::yield_now().await;

    // The winner fills the cache and lets go.
    cache.set(&key, &shop("Noodles"), TTL).await?;
    assert!(lock.release(&token).await?);

    for _ in 0..100 {
        if waiter.is_finished() {
            break;
        }
        control.advance(Duration::from_millis(50));
        tokio::task::yield_now().await;
    }

    let value = waiter.await.unwrap()?;
    assert_eq!(value, Some(shop("Noodles")));
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    Ok(())
}

#[test]
fn mutex_panic_releases_the_lock_and_resumes() {
    block_on(async {
        let control = control();
        let (store, cache) = setup(&control);
        let key = CacheKey::new("shop", 1);

        let panicking: Loader<Shop> = Box::new(|| async { panic!("loader bug") }.boxed());
        let outcome = AssertUnwindSafe(cache.read_with_mutex(&key, panicking, TTL))
            .catch_unwind()
            .await;

        assert!(outcome.is_err());
        assert_eq!(lock_holder(&store, "shop:1").await, None);
        assert_eq!(store.count(|op| matches!(op, StoreOp::CompareAndDelete { .. })), 1);
    });
}

#[test]
fn store_outage_surfaces_as_unavailable() {
    block_on(async {
        let control = control();
        let (store, cache) = setup(&control);
        let key = CacheKey::new("shop", 1);
        store.fail_when(|_| true);

        let calls = Arc::new(AtomicUsize::new(0));
        let err = cache
            .read(&key, counting(&calls, Some(shop("Noodles"))), TTL)
            .await
            .unwrap_err();
        assert!(err.is_unavailable());

        let err = cache
            .read_with_logical_expire(&key, counting(&calls, Some(shop("Noodles"))), TTL)
            .await
            .unwrap_err();
        assert!(err.is_unavailable());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    });
}
