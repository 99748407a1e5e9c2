// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
#![cfg_attr(docsrs, feature(doc_cfg))]

//! In-process implementation of the rampart remote store.
//!
//! [`MemoryStore`] implements every [`RemoteStore`](rampart_store::RemoteStore)
//! primitive over a single mutex-guarded keyspace. It is meant for tests and
//! single-process deployments: nothing is shared across processes, but every call is
//! atomic, so locks, counters and ordered sets behave the way they do against a real
//! server.
//!
//! # Quick Start
//!
//! ```
//! use rampart_memory::MemoryStore;
//! use rampart_store::RemoteStore;
//! use tick::Clock;
//!
//! # futures::executor::block_on(async {
//! let store = MemoryStore::new(Clock::new_frozen());
//!
//! assert_eq!(store.increment("seq:order:2024:01:01").await?, 1);
//! assert_eq!(store.increment("seq:order:2024:01:01").await?, 2);
//! # Ok::<(), rampart_store::Error>(())
//! # });
//! ```
//!
//! # Expiry
//!
//! Physical TTLs are measured on the [`tick::Clock`] passed to [`MemoryStore::new`].
//! Expired keys are dropped lazily the next time they are touched.

mod geo;
mod store;
mod value;

#[doc(inline)]
pub use store::MemoryStore;
