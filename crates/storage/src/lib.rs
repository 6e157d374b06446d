// SPDX-License-Identifier: MIT

#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! ltap-storage: durable position tracking and the container metadata cache.

pub mod metadata_cache;
pub mod position_store;

pub use metadata_cache::MetadataCache;
pub use position_store::{PositionStore, PositionStoreError};
