// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
#![cfg_attr(docsrs, feature(doc_cfg))]

//! Redis implementation of the rampart remote store.
//!
//! [`RedisStore`] maps each [`RemoteStore`](rampart_store::RemoteStore) primitive onto a
//! single Redis command, so every primitive inherits Redis' per-command atomicity.
//! Compare-and-delete, which Redis has no command for, runs as a Lua script.
//!
//! # Quick Start
//!
//! ```no_run
//! use rampart_redis::RedisStore;
//! use rampart_store::RemoteStore;
//!
//! # async fn example() -> Result<(), rampart_store::Error> {
//! let store = RedisStore::connect("redis://127.0.0.1/").await?;
//! let value = store.get("cache:shop:1").await?;
//! # Ok(())
//! # }
//! ```
//!
//! Geo search uses `GEOSEARCH`, which needs Redis 6.2 or later.

mod commands;
mod store;

#[doc(inline)]
pub use store::RedisStore;
