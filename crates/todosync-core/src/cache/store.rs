//! Storage slot shared by both caches: the snapshot lives in a watch
//! channel so that storing and publishing are one step.

use std::sync::Arc;

use tokio::sync::watch;

use super::{SnapshotStream, SyncStatus};
use crate::models::{Keyed, Origin, Snapshot};

pub(crate) struct SnapshotStore<R: Keyed> {
    snapshot: watch::Sender<Arc<Snapshot<R>>>,
    status: watch::Sender<SyncStatus>,
}

impl<R: Keyed> SnapshotStore<R> {
    pub(crate) fn new() -> Self {
        let (snapshot, _) = watch::channel(Arc::new(Snapshot::empty()));
        let (status, _) = watch::channel(SyncStatus::Pending);
        Self { snapshot, status }
    }

    pub(crate) fn subscribe(&self) -> SnapshotStream<R> {
        SnapshotStream::new(self.snapshot.subscribe())
    }

    pub(crate) fn watch(&self) -> watch::Receiver<Arc<Snapshot<R>>> {
        self.snapshot.subscribe()
    }

    pub(crate) fn status(&self) -> watch::Receiver<SyncStatus> {
        self.status.subscribe()
    }

    pub(crate) fn current(&self) -> Arc<Snapshot<R>> {
        self.snapshot.borrow().clone()
    }

    /// Wait until something has been published.
    pub(crate) async fn wait_published(&self) -> Arc<Snapshot<R>> {
        let mut rx = self.snapshot.subscribe();
        let published = match rx.wait_for(|snapshot| snapshot.is_published()).await {
            Ok(snapshot) => snapshot.clone(),
            // The sender lives in `self`, so the channel cannot close while borrowed
            Err(_) => self.current(),
        };
        published
    }

    /// Store `rows` as the complete new contents and publish.
    pub(crate) fn replace(&self, rows: Vec<R>, origin: Origin<R::Key>) -> Arc<Snapshot<R>> {
        let mut stored = None;
        self.snapshot.send_modify(|current| {
            let next = Arc::new(current.next(rows, origin));
            stored = Some(Arc::clone(&next));
            *current = next;
        });
        stored.unwrap_or_else(|| self.current())
    }

    /// Apply `edit` to a copy of the current contents, stamp it with
    /// `origin` and publish.
    pub(crate) fn modify(
        &self,
        origin: Origin<R::Key>,
        edit: impl FnOnce(&mut Snapshot<R>),
    ) -> Arc<Snapshot<R>> {
        let mut stored = None;
        self.snapshot.send_modify(|current| {
            let mut next = (**current).clone();
            edit(&mut next);
            next.advance(origin);
            let next = Arc::new(next);
            stored = Some(Arc::clone(&next));
            *current = next;
        });
        stored.unwrap_or_else(|| self.current())
    }

    /// Re-emit the current contents under a new generation.
    pub(crate) fn republish(&self) -> Arc<Snapshot<R>> {
        let mut stored = None;
        self.snapshot.send_modify(|current| {
            let next = Arc::new(current.republished());
            stored = Some(Arc::clone(&next));
            *current = next;
        });
        stored.unwrap_or_else(|| self.current())
    }

    /// Mark a refresh as in flight. If the returned guard is dropped
    /// without [`RefreshStatus::finish`] (a superseded refresh), the status
    /// from before the refresh comes back.
    pub(crate) fn begin_refresh(&self) -> RefreshStatus<'_> {
        let previous = self.status.send_replace(SyncStatus::Refreshing);
        RefreshStatus {
            status: &self.status,
            previous: Some(previous),
        }
    }
}

pub(crate) struct RefreshStatus<'a> {
    status: &'a watch::Sender<SyncStatus>,
    previous: Option<SyncStatus>,
}

impl RefreshStatus<'_> {
    pub(crate) fn finish(mut self, outcome: SyncStatus) {
        self.previous = None;
        self.status.send_replace(outcome);
    }
}

impl Drop for RefreshStatus<'_> {
    fn drop(&mut self) {
        if let Some(previous) = self.previous.take() {
            self.status.send_replace(previous);
        }
    }
}
