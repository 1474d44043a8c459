//! The primary cache: a mutable collection joined against a lookup cache.
//!
//! Two paths write the stored snapshot:
//!
//! - refresh: fetch the whole collection, join every record against the
//!   lookup cache's *current* set, store, publish
//! - local mutation: call the transport, join the single returned record,
//!   splice it into the stored snapshot by key, store, publish
//!
//! Both end in the same store-and-publish step and there is no
//! reconciliation between them: whichever completes last wins. A refresh
//! carrying data older than a mutation that completed just before it will
//! overwrite that mutation until the next refresh.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use super::store::SnapshotStore;
use super::{decode_all, decode_one, CacheError, LookupCache, SnapshotStream, SyncStatus};
use crate::api::Transport;
use crate::models::{Joined, Keyed, Origin, Record, References, Snapshot, Versioned};
use crate::scheduler::Refreshable;

type Rows<T, L> = Snapshot<Joined<T, L>>;

pub struct EntityCache<T, L>
where
    T: References<L>,
    L: Record,
{
    collection: String,
    transport: Arc<dyn Transport>,
    lookup: Arc<LookupCache<L>>,
    store: SnapshotStore<Joined<T, L>>,
}

impl<T, L> EntityCache<T, L>
where
    T: References<L>,
    L: Record,
{
    pub fn new(
        collection: impl Into<String>,
        transport: Arc<dyn Transport>,
        lookup: Arc<LookupCache<L>>,
    ) -> Arc<Self> {
        Arc::new(Self {
            collection: collection.into(),
            transport,
            lookup,
            store: SnapshotStore::new(),
        })
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    pub fn lookup(&self) -> &Arc<LookupCache<L>> {
        &self.lookup
    }

    /// Subscribe to the joined collection, starting with the latest snapshot if any.
    pub fn subscribe(&self) -> SnapshotStream<Joined<T, L>> {
        self.store.subscribe()
    }

    /// Raw receiver on the publication channel.
    pub fn watch(&self) -> watch::Receiver<Arc<Rows<T, L>>> {
        self.store.watch()
    }

    /// The stored snapshot (generation 0 before anything was published).
    pub fn current(&self) -> Arc<Rows<T, L>> {
        self.store.current()
    }

    pub fn status(&self) -> watch::Receiver<SyncStatus> {
        self.store.status()
    }

    /// Join one record against the lookup cache's current set, waiting for
    /// its first publication if there has been none yet.
    async fn join(&self, record: T) -> Joined<T, L> {
        let lookups = self.lookup.ready().await;
        Joined::join(record, &lookups)
    }

    /// Fetch the whole collection, join, store and publish.
    pub async fn refresh(&self) -> Result<usize, CacheError> {
        let refreshing = self.store.begin_refresh();

        match self.fetch_joined().await {
            Ok(rows) => {
                let snapshot = self.store.replace(rows, Origin::Refresh);
                debug!(
                    collection = %self.collection,
                    count = snapshot.len(),
                    generation = snapshot.generation(),
                    "Collection refreshed"
                );
                refreshing.finish(SyncStatus::ready(snapshot.len()));
                Ok(snapshot.len())
            }
            Err(e) => {
                warn!(collection = %self.collection, error = %e, "Collection refresh failed");
                refreshing.finish(SyncStatus::failed(e.to_string()));
                Err(e)
            }
        }
    }

    async fn fetch_joined(&self) -> Result<Vec<Joined<T, L>>, CacheError> {
        let values = self.transport.fetch_all(&self.collection).await?;
        let records = decode_all::<T>(&self.collection, values)?;
        let lookups = self.lookup.ready().await;
        Ok(records
            .into_iter()
            .map(|record| Joined::join(record, &lookups))
            .collect())
    }

    /// Create `draft` remotely, then add the confirmed record to the
    /// snapshot and publish. Resolves once, with the joined record.
    pub async fn create(&self, draft: &T::Draft) -> Result<Joined<T, L>, CacheError> {
        let body = serde_json::to_value(draft).map_err(CacheError::Encode)?;
        let created = self
            .transport
            .create(&self.collection, body)
            .await
            .inspect_err(|e| warn!(collection = %self.collection, error = %e, "Create failed"))?;
        let record: T = decode_one(&self.collection, created)?;

        let joined = self.join(record).await;
        let key = joined.key();
        let row = joined.clone();
        let snapshot = self.store.modify(Origin::Create(key.clone()), |rows| rows.upsert(row));
        info!(
            collection = %self.collection,
            id = %key,
            generation = snapshot.generation(),
            "Record created"
        );
        Ok(joined)
    }

    /// Replace `entity` remotely, then swap the confirmed record into the
    /// snapshot (dropping any row with the same key) and publish.
    pub async fn update(&self, entity: &T) -> Result<Joined<T, L>, CacheError> {
        let body = serde_json::to_value(entity).map_err(CacheError::Encode)?;
        let replaced = self
            .transport
            .replace(&self.collection, body)
            .await
            .inspect_err(|e| warn!(collection = %self.collection, id = %entity.key(), error = %e, "Update failed"))?;
        let record: T = decode_one(&self.collection, replaced)?;

        let joined = self.join(record).await;
        let key = joined.key();
        let row = joined.clone();
        let snapshot = self.store.modify(Origin::Update(key.clone()), |rows| rows.upsert(row));
        info!(
            collection = %self.collection,
            id = %key,
            version = %joined.record.version(),
            generation = snapshot.generation(),
            "Record updated"
        );
        Ok(joined)
    }

    /// Delete `entity` remotely, then remove it from the snapshot and publish.
    pub async fn delete(&self, entity: &T) -> Result<(), CacheError> {
        self.delete_key(&entity.key()).await
    }

    pub async fn delete_key(&self, key: &T::Key) -> Result<(), CacheError> {
        self.transport
            .delete(&self.collection, &key.to_string())
            .await
            .inspect_err(|e| warn!(collection = %self.collection, id = %key, error = %e, "Delete failed"))?;

        let mut removed = false;
        let snapshot = self
            .store
            .modify(Origin::Delete(key.clone()), |rows| removed = rows.remove(key));
        info!(
            collection = %self.collection,
            id = %key,
            removed,
            generation = snapshot.generation(),
            "Record deleted"
        );
        Ok(())
    }

    /// Re-emit the stored snapshot unchanged so paused consumers catch up.
    pub fn force_republish(&self) -> Arc<Rows<T, L>> {
        let snapshot = self.store.republish();
        debug!(
            collection = %self.collection,
            generation = snapshot.generation(),
            "Snapshot republished"
        );
        snapshot
    }
}

#[async_trait]
impl<T, L> Refreshable for EntityCache<T, L>
where
    T: References<L>,
    L: Record,
{
    fn name(&self) -> &str {
        &self.collection
    }

    async fn refresh(&self) -> Result<usize, CacheError> {
        EntityCache::refresh(self).await
    }
}
