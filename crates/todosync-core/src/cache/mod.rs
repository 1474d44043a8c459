//! Reactive in-memory caches.
//!
//! Both caches hold their current snapshot inside a `tokio::sync::watch`
//! channel: the channel's slot is the storage, and every store is also the
//! publication, so no subscriber can observe one without the other.
//! Subscribers joining late receive the latest snapshot immediately.
//!
//! - `LookupCache`: read-only collection refreshed on an interval
//! - `EntityCache`: mutable collection joined against a `LookupCache`, with
//!   create / update / delete that republish as soon as the remote confirms
//! - `SyncStatus`: outcome of the most recent refresh of either cache

pub mod entity;
pub mod error;
pub mod lookup;
pub mod status;
mod store;
pub mod stream;

pub use entity::EntityCache;
pub use error::CacheError;
pub use lookup::LookupCache;
pub use status::SyncStatus;
pub use stream::SnapshotStream;

use serde::de::DeserializeOwned;
use serde_json::Value;

/// Decode raw transport records into typed records.
fn decode_all<R: DeserializeOwned>(collection: &str, values: Vec<Value>) -> Result<Vec<R>, CacheError> {
    values
        .into_iter()
        .map(|value| decode_one(collection, value))
        .collect()
}

fn decode_one<R: DeserializeOwned>(collection: &str, value: Value) -> Result<R, CacheError> {
    serde_json::from_value(value).map_err(|source| CacheError::Decode {
        collection: collection.to_string(),
        source,
    })
}
