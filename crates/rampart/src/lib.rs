// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
#![cfg_attr(docsrs, feature(doc_cfg))]

//! Cache-aside reads, distributed locks, ordered ids and fan-out timelines over a
//! shared remote store.
//!
//! Every component is generic over [`RemoteStore`] and keeps all of its state there,
//! so any number of processes can share it. Time is read from an injected
//! [`tick::Clock`], which lets tests drive expiry with `tick::ClockControl`.
//!
//! # Components
//!
//! - [`CacheAsideStore`] shields a source of truth. Absent keys are cached as a null
//!   marker, hot keys expire logically and are rebuilt in the background by one
//!   lock holder while everyone else is served the stale value.
//! - [`DistributedLock`] is a single-shot, TTL-bounded lock released by an atomic
//!   compare-and-delete.
//! - [`IdGenerator`] produces time-ordered 63-bit ids from a per-day counter.
//! - [`Timeline`] pushes items into followers' feeds at publish time and scrolls them
//!   with a [`ScrollCursor`] that handles equal timestamps.
//! - [`FollowGraph`], [`LikeBoard`], [`SignInCalendar`] and [`GeoIndex`] cover follows,
//!   likes, daily sign-ins and proximity search.
//!
//! # Caller identity
//!
//! Operations that act for a user take the user id as a parameter. Nothing is read
//! from ambient request state.
//!
//! # Examples
//!
//! ```
//! use std::time::Duration;
//!
//! use rampart::{CacheAsideStore, CacheKey};
//! use rampart_memory::MemoryStore;
//! use tick::Clock;
//! # futures::executor::block_on(async {
//!
//! let clock = Clock::new_frozen();
//! let cache = CacheAsideStore::builder(MemoryStore::new(clock.clone()), clock).build();
//!
//! // The loader finds nothing, so a null marker is cached.
//! let key = CacheKey::new("shop", 404);
//! let shop = cache
//!     .read(&key, || async { Ok::<Option<String>, std::io::Error>(None) }, Duration::from_secs(60))
//!     .await?;
//! assert_eq!(shop, None);
//! # Ok::<(), rampart::Error>(())
//! # });
//! ```
//!
//! # Errors
//!
//! Every fallible operation returns [`Error`]; branch on [`Error::kind`]. A
//! [`ErrorKind::RemoteStoreUnavailable`] error means the whole layer is down.

mod cache;
mod follow;
mod id;
mod keys;
mod likes;
mod lock;
mod nearby;
mod sign_in;
mod timeline;

#[doc(inline)]
pub use cache::{BoxError, CacheAsideStore, CacheAsideStoreBuilder};
#[doc(inline)]
pub use follow::FollowGraph;
#[doc(inline)]
pub use id::{DEFAULT_EPOCH_SECS, IdGenerator, decompose_id};
#[doc(inline)]
pub use keys::CacheKey;
#[doc(inline)]
pub use likes::LikeBoard;
#[doc(inline)]
pub use lock::{DistributedLock, LockToken};
#[doc(inline)]
pub use nearby::GeoIndex;
#[doc(no_inline)]
pub use rampart_store::{Error, ErrorKind, GeoMatch, GeoPoint, RemoteStore, Result};
#[doc(inline)]
pub use sign_in::SignInCalendar;
#[doc(inline)]
pub use timeline::{FollowerSource, ScrollCursor, ScrollPage, Timeline, TimelineItem};
