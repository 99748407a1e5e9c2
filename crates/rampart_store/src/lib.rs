// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
#![cfg_attr(docsrs, feature(doc_cfg))]

//! Remote store abstractions for the rampart caching and coordination layer.
//!
//! This crate defines the [`RemoteStore`] trait naming every primitive the layer needs
//! from a shared store (strings with TTL, set-if-absent, atomic compare-and-delete,
//! atomic increment, ordered sets, plain sets, bitmaps, geo indexes), together with
//! the [`Error`] type used across the workspace.
//!
//! # Overview
//!
//! Backends implement [`RemoteStore`]; `rampart` builds locks, id generation,
//! cache-aside reads and timelines on top. Two backends ship in sibling crates:
//!
//! - `rampart_memory` keeps everything in-process and is driven by a `tick::Clock`.
//! - `rampart_redis` talks to Redis.
//!
//! # Testing
//!
//! Enable the `test-util` feature for [`testing::MockStore`], which wraps any store,
//! records every operation, and injects failures on demand.

pub mod error;
mod store;
#[cfg(any(feature = "test-util", test))]
pub mod testing;
mod types;

#[doc(inline)]
pub use error::{Error, ErrorKind, Result};
#[doc(inline)]
pub use store::RemoteStore;
#[doc(inline)]
pub use types::{GeoMatch, GeoPoint, ScoredMember};
