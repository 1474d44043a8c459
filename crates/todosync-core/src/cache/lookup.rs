//! Periodically refreshed read-only collection.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::watch;
use tracing::{debug, warn};

use super::store::SnapshotStore;
use super::{decode_all, CacheError, SnapshotStream, SyncStatus};
use crate::api::Transport;
use crate::models::{Origin, Record, Snapshot};
use crate::scheduler::Refreshable;

/// Shared cache of a collection this crate never writes.
///
/// Only complete fetched sets are ever published. A failed fetch leaves the
/// previous set in place and is reported through [`LookupCache::status`];
/// the cache itself never retries, the next scheduled refresh does.
pub struct LookupCache<L: Record> {
    collection: String,
    transport: Arc<dyn Transport>,
    store: SnapshotStore<L>,
}

impl<L: Record> LookupCache<L> {
    pub fn new(collection: impl Into<String>, transport: Arc<dyn Transport>) -> Arc<Self> {
        Arc::new(Self {
            collection: collection.into(),
            transport,
            store: SnapshotStore::new(),
        })
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// Subscribe to published sets, starting with the latest one if any.
    pub fn subscribe(&self) -> SnapshotStream<L> {
        self.store.subscribe()
    }

    /// The latest published set, or `None` before the first successful fetch.
    pub fn current(&self) -> Option<Arc<Snapshot<L>>> {
        let snapshot = self.store.current();
        snapshot.is_published().then_some(snapshot)
    }

    /// The latest published set, waiting for the first fetch if needed.
    pub async fn ready(&self) -> Arc<Snapshot<L>> {
        self.store.wait_published().await
    }

    pub fn status(&self) -> watch::Receiver<SyncStatus> {
        self.store.status()
    }

    /// Fetch the whole collection once, then store and publish it.
    pub async fn refresh(&self) -> Result<usize, CacheError> {
        let refreshing = self.store.begin_refresh();

        let fetched = match self.transport.fetch_all(&self.collection).await {
            Ok(values) => decode_all::<L>(&self.collection, values),
            Err(e) => Err(e.into()),
        };

        match fetched {
            Ok(records) => {
                let snapshot = self.store.replace(records, Origin::Refresh);
                debug!(
                    collection = %self.collection,
                    count = snapshot.len(),
                    generation = snapshot.generation(),
                    "Lookup collection refreshed"
                );
                refreshing.finish(SyncStatus::ready(snapshot.len()));
                Ok(snapshot.len())
            }
            Err(e) => {
                warn!(collection = %self.collection, error = %e, "Lookup refresh failed");
                refreshing.finish(SyncStatus::failed(e.to_string()));
                Err(e)
            }
        }
    }
}

#[async_trait]
impl<L: Record> Refreshable for LookupCache<L> {
    fn name(&self) -> &str {
        &self.collection
    }

    async fn refresh(&self) -> Result<usize, CacheError> {
        LookupCache::refresh(self).await
    }
}
