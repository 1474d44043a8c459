//! Consumer-side gate that holds the view still while a record is edited.
//!
//! An [`EditGuard`] sits between an [`EntityCache`] and whatever renders it.
//! While idle it forwards every publication to its view. While a record is
//! being edited it forwards nothing, so rows do not move under the editor,
//! but it keeps inspecting each suppressed snapshot: if the edited record
//! shows up with a version other than the one captured when editing began,
//! the conflict signal goes up.
//!
//! Ending the edit lifts the gate:
//!
//! - `EditSession::commit` sends the update; its publication is the next
//!   thing the view receives
//! - `EditSession::end` (or dropping the session) forces a republish so that
//!   anything suppressed during the edit reaches the view

use std::sync::Arc;

use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use crate::cache::{CacheError, EntityCache, SnapshotStream};
use crate::models::{Joined, Record, References, Snapshot, Version, Versioned};

#[derive(Error, Debug, PartialEq, Eq)]
pub enum GuardError {
    #[error("Already editing record {id}")]
    AlreadyEditing { id: String },

    #[error("No record {0} in the current view")]
    UnknownEntity(String),
}

/// What the consumer of an [`EditGuard`] reads.
pub type ViewStream<T, L> = SnapshotStream<Joined<T, L>>;

/// Whether the guard is gating its view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EditMode<K> {
    Idle,
    Editing { id: K, version: Version },
}

/// What an edit ended without a commit observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EditOutcome {
    /// The record changed upstream while it was being edited.
    pub upstream_changed: bool,
}

struct GuardState<T, L>
where
    T: References<L>,
    L: Record,
{
    mode: watch::Sender<EditMode<T::Key>>,
    conflict: watch::Sender<bool>,
    view: watch::Sender<Arc<Snapshot<Joined<T, L>>>>,
}

impl<T, L> GuardState<T, L>
where
    T: References<L>,
    L: Record,
{
    /// Deliver or suppress one publication.
    fn observe(&self, snapshot: Arc<Snapshot<Joined<T, L>>>) {
        let mode = self.mode.borrow().clone();
        match mode {
            EditMode::Idle => {
                trace!(generation = snapshot.generation(), "Delivering snapshot");
                self.view.send_replace(snapshot);
            }
            EditMode::Editing { id, version } => {
                self.check(&id, &version, &snapshot);
                trace!(generation = snapshot.generation(), id = %id, "Snapshot suppressed while editing");
            }
        }
    }

    /// Raise the conflict signal if `snapshot` holds `id` at a version other
    /// than `version`. Returns the signal's value afterwards.
    fn check(&self, id: &T::Key, version: &Version, snapshot: &Snapshot<Joined<T, L>>) -> bool {
        let changed = snapshot
            .get(id)
            .is_some_and(|row| row.record.version() != version);
        if changed && !*self.conflict.borrow() {
            warn!(
                id = %id,
                captured = %version,
                generation = snapshot.generation(),
                "Record under edit changed upstream"
            );
            self.conflict.send_replace(true);
        }
        *self.conflict.borrow()
    }

    /// Back to idle; returns whether a conflict was raised during the edit.
    ///
    /// `latest` is checked before the mode flips, so a store the watcher has
    /// not processed yet still counts towards the outcome.
    fn release(&self, id: &T::Key, version: &Version, latest: &Snapshot<Joined<T, L>>) -> bool {
        self.check(id, version, latest);
        self.mode.send_replace(EditMode::Idle);
        self.conflict.send_replace(false)
    }
}

/// Edit-aware view over an [`EntityCache`].
///
/// At most one edit session is active per guard. Dropping the guard stops
/// its watcher task; the cache itself is never gated.
pub struct EditGuard<T, L>
where
    T: References<L>,
    L: Record,
{
    cache: Arc<EntityCache<T, L>>,
    state: Arc<GuardState<T, L>>,
    watcher: JoinHandle<()>,
}

impl<T, L> EditGuard<T, L>
where
    T: References<L>,
    L: Record,
{
    /// Attach to `cache`. If the cache has already published, its current
    /// snapshot is delivered to the view right away.
    pub fn new(cache: Arc<EntityCache<T, L>>) -> Self {
        let (mode, _) = watch::channel(EditMode::Idle);
        let (conflict, _) = watch::channel(false);
        let (view, _) = watch::channel(Arc::new(Snapshot::empty()));
        let state = Arc::new(GuardState { mode, conflict, view });

        let watcher = tokio::spawn(watch_publications(cache.watch(), Arc::clone(&state)));

        Self { cache, state, watcher }
    }

    pub fn cache(&self) -> &Arc<EntityCache<T, L>> {
        &self.cache
    }

    /// The consumer-visible stream: publications that arrived while idle.
    pub fn view(&self) -> ViewStream<T, L> {
        SnapshotStream::new(self.state.view.subscribe())
    }

    /// The snapshot the view currently shows.
    pub fn shown(&self) -> Arc<Snapshot<Joined<T, L>>> {
        self.state.view.borrow().clone()
    }

    /// Raised while editing when the record under edit changed upstream.
    pub fn conflict(&self) -> watch::Receiver<bool> {
        self.state.conflict.subscribe()
    }

    pub fn has_conflict(&self) -> bool {
        *self.state.conflict.borrow()
    }

    pub fn mode(&self) -> EditMode<T::Key> {
        self.state.mode.borrow().clone()
    }

    pub fn is_editing(&self) -> bool {
        matches!(*self.state.mode.borrow(), EditMode::Editing { .. })
    }

    /// Row `id` as the view shows it, or as the cache holds it if the view
    /// has not caught up yet.
    pub fn row(&self, id: &T::Key) -> Option<Joined<T, L>> {
        if let Some(row) = self.shown().get(id) {
            return Some(row.clone());
        }
        self.cache.current().get(id).cloned()
    }

    /// Start editing record `id`, capturing the version [`row`](Self::row)
    /// reports for it.
    pub fn begin_edit(&self, id: &T::Key) -> Result<EditSession<T, L>, GuardError> {
        let version = self
            .row(id)
            .map(|row| row.record.version().clone())
            .ok_or_else(|| GuardError::UnknownEntity(id.to_string()))?;

        let mut busy_with = None;
        self.state.mode.send_if_modified(|mode| match mode {
            EditMode::Idle => {
                *mode = EditMode::Editing {
                    id: id.clone(),
                    version: version.clone(),
                };
                true
            }
            EditMode::Editing { id: current, .. } => {
                busy_with = Some(current.to_string());
                false
            }
        });
        if let Some(current) = busy_with {
            return Err(GuardError::AlreadyEditing { id: current });
        }
        self.state.conflict.send_replace(false);

        info!(id = %id, version = %version, "Edit started");
        Ok(EditSession {
            cache: Arc::clone(&self.cache),
            state: Arc::clone(&self.state),
            id: id.clone(),
            version,
            finished: false,
        })
    }
}

impl<T, L> Drop for EditGuard<T, L>
where
    T: References<L>,
    L: Record,
{
    fn drop(&mut self) {
        self.watcher.abort();
    }
}

async fn watch_publications<T, L>(
    mut source: watch::Receiver<Arc<Snapshot<Joined<T, L>>>>,
    state: Arc<GuardState<T, L>>,
) where
    T: References<L>,
    L: Record,
{
    loop {
        let snapshot = source.borrow_and_update().clone();
        if snapshot.is_published() {
            state.observe(snapshot);
        }
        // The guard keeps the cache alive and aborts this task on drop
        if source.changed().await.is_err() {
            break;
        }
    }
}

/// An active edit. Ends with [`commit`](Self::commit) or
/// [`end`](Self::end); dropping it behaves like `end`, so a torn-down
/// consumer never leaves its view gated.
pub struct EditSession<T, L>
where
    T: References<L>,
    L: Record,
{
    cache: Arc<EntityCache<T, L>>,
    state: Arc<GuardState<T, L>>,
    id: T::Key,
    version: Version,
    finished: bool,
}

impl<T, L> EditSession<T, L>
where
    T: References<L>,
    L: Record,
{
    pub fn id(&self) -> &T::Key {
        &self.id
    }

    /// Version of the record when editing began.
    pub fn version(&self) -> &Version {
        &self.version
    }

    /// Whether the record changed upstream since editing began, judged
    /// against the cache's stored snapshot as well as what the watcher saw.
    pub fn upstream_changed(&self) -> bool {
        self.state.check(&self.id, &self.version, &self.cache.current())
    }

    fn release(&self) -> bool {
        self.state.release(&self.id, &self.version, &self.cache.current())
    }

    /// Finish the edit by sending `entity` as an update. The gate lifts
    /// first, so the update's publication reaches the view. If the update
    /// fails the stored snapshot is republished instead and the error is
    /// returned to the caller.
    pub async fn commit(mut self, entity: T) -> Result<Joined<T, L>, CacheError> {
        self.finished = true;
        let upstream_changed = self.release();
        info!(id = %self.id, upstream_changed, "Edit committed");

        match self.cache.update(&entity).await {
            Ok(joined) => Ok(joined),
            Err(e) => {
                self.cache.force_republish();
                Err(e)
            }
        }
    }

    /// Finish the edit without a change; the stored snapshot is republished
    /// so the view catches up on anything suppressed meanwhile.
    pub fn end(mut self) -> EditOutcome {
        self.finish()
    }

    fn finish(&mut self) -> EditOutcome {
        self.finished = true;
        let upstream_changed = self.release();
        self.cache.force_republish();
        info!(id = %self.id, upstream_changed, "Edit ended without changes");
        EditOutcome { upstream_changed }
    }
}

impl<T, L> Drop for EditSession<T, L>
where
    T: References<L>,
    L: Record,
{
    fn drop(&mut self) {
        if !self.finished {
            debug!(id = %self.id, "Edit session dropped while active");
            self.finish();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::api::{MemoryTransport, Operation, Transport};
    use crate::cache::LookupCache;
    use crate::models::{Origin, Todo, User};

    /// Long enough for the watcher to process anything pending; time is
    /// paused in these tests so this costs nothing.
    const SETTLE: Duration = Duration::from_millis(50);

    struct Fixture {
        transport: Arc<MemoryTransport>,
        cache: Arc<EntityCache<Todo, User>>,
        guard: EditGuard<Todo, User>,
    }

    async fn fixture() -> Fixture {
        let transport = Arc::new(MemoryTransport::seeded());
        let shared = Arc::clone(&transport) as Arc<dyn Transport>;
        let users = LookupCache::new("users", Arc::clone(&shared));
        users.refresh().await.expect("users");
        let cache = EntityCache::new("todos", shared, users);
        cache.refresh().await.expect("todos");
        let guard = EditGuard::new(Arc::clone(&cache));
        Fixture { transport, cache, guard }
    }

    async fn next_within(
        view: &mut ViewStream<Todo, User>,
    ) -> Option<Arc<Snapshot<Joined<Todo, User>>>> {
        tokio::time::timeout(SETTLE, view.next()).await.ok().flatten()
    }

    #[tokio::test(start_paused = true)]
    async fn test_view_replays_published_snapshot() {
        let f = fixture().await;
        let mut view = f.guard.view();

        let snapshot = next_within(&mut view).await.expect("initial snapshot");
        assert_eq!(snapshot.len(), 3);
        assert_eq!(f.guard.mode(), EditMode::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_guard_forwards_every_publication() {
        let f = fixture().await;
        let mut view = f.guard.view();
        next_within(&mut view).await.expect("initial snapshot");

        f.cache.refresh().await.expect("refresh");
        let snapshot = next_within(&mut view).await.expect("forwarded refresh");
        assert_eq!(snapshot.generation(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_editing_suppresses_then_end_emits_exactly_one() {
        let f = fixture().await;
        let mut view = f.guard.view();
        next_within(&mut view).await.expect("initial snapshot");

        let session = f.guard.begin_edit(&1).expect("begin edit");
        assert!(f.guard.is_editing());

        f.cache.refresh().await.expect("refresh");
        f.cache.refresh().await.expect("refresh");
        assert!(next_within(&mut view).await.is_none());

        let outcome = session.end();
        assert!(!outcome.upstream_changed);
        assert_eq!(f.guard.mode(), EditMode::Idle);

        let snapshot = next_within(&mut view).await.expect("republished snapshot");
        assert_eq!(snapshot.origin(), &Origin::Republish);
        assert_eq!(snapshot.generation(), f.cache.current().generation());
        assert!(next_within(&mut view).await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_upstream_change_raises_conflict_without_aborting() {
        let f = fixture().await;
        let mut view = f.guard.view();
        next_within(&mut view).await.expect("initial snapshot");
        let mut conflict = f.guard.conflict();

        let session = f.guard.begin_edit(&3).expect("begin edit");
        f.transport.touch("todos", "3").expect("touch todo 3");
        f.cache.refresh().await.expect("refresh");

        tokio::time::timeout(SETTLE, conflict.wait_for(|raised| *raised))
            .await
            .expect("conflict raised in time")
            .expect("guard alive");
        assert!(session.upstream_changed());
        assert!(f.guard.is_editing());
        assert!(next_within(&mut view).await.is_none());

        let outcome = session.end();
        assert!(outcome.upstream_changed);
        assert!(!f.guard.has_conflict());
    }

    #[tokio::test(start_paused = true)]
    async fn test_end_right_after_refresh_reports_upstream_change() {
        let f = fixture().await;
        let session = f.guard.begin_edit(&3).expect("begin edit");
        f.transport.touch("todos", "3").expect("touch todo 3");
        f.cache.refresh().await.expect("refresh");

        // The watcher has not run since the refresh stored its snapshot
        assert!(session.upstream_changed());
        let outcome = session.end();
        assert!(outcome.upstream_changed);
        assert!(!f.guard.has_conflict());
        assert_eq!(f.guard.mode(), EditMode::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_refresh_without_change_raises_no_conflict() {
        let f = fixture().await;
        let session = f.guard.begin_edit(&3).expect("begin edit");
        f.cache.refresh().await.expect("refresh");
        tokio::time::sleep(SETTLE).await;

        assert!(!session.upstream_changed());
        session.end();
    }

    #[tokio::test(start_paused = true)]
    async fn test_commit_after_conflict_shows_update_version() {
        let f = fixture().await;
        let mut view = f.guard.view();
        let shown = next_within(&mut view).await.expect("initial snapshot");
        let original = shown.get(&3).cloned().expect("todo 3");

        let session = f.guard.begin_edit(&3).expect("begin edit");
        assert_eq!(session.version(), original.record.version());

        let upstream = f.transport.touch("todos", "3").expect("touch todo 3");
        f.cache.refresh().await.expect("refresh");
        tokio::time::sleep(SETTLE).await;
        assert!(f.guard.has_conflict());
        assert!(next_within(&mut view).await.is_none());

        let committed = session
            .commit(original.record.with_title("Go Running Twice"))
            .await
            .expect("commit");
        assert_ne!(committed.record.version().as_str(), upstream);

        let snapshot = next_within(&mut view).await.expect("update publication");
        assert_eq!(snapshot.origin(), &Origin::Update(3));
        let row = snapshot.get(&3).expect("todo 3");
        assert_eq!(row.record.version(), committed.record.version());
        assert_eq!(row.record.title, "Go Running Twice");
        assert!(!f.guard.has_conflict());
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_commit_republishes() {
        let f = fixture().await;
        let mut view = f.guard.view();
        next_within(&mut view).await.expect("initial snapshot");

        let session = f.guard.begin_edit(&1).expect("begin edit");
        let edited = f.cache.current().get(&1).expect("todo 1").record.with_title("lost");
        f.transport.fail_next(Operation::Replace);

        assert!(session.commit(edited).await.is_err());
        let snapshot = next_within(&mut view).await.expect("republished snapshot");
        assert_eq!(snapshot.origin(), &Origin::Republish);
        assert_eq!(snapshot.get(&1).map(|row| row.record.title.as_str()), Some("Buy Groceries"));
        assert_eq!(f.guard.mode(), EditMode::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_session_releases_gate() {
        let f = fixture().await;
        let mut view = f.guard.view();
        next_within(&mut view).await.expect("initial snapshot");

        {
            let _session = f.guard.begin_edit(&2).expect("begin edit");
            f.cache.refresh().await.expect("refresh");
            assert!(next_within(&mut view).await.is_none());
        }

        assert!(!f.guard.is_editing());
        let snapshot = next_within(&mut view).await.expect("snapshot after teardown");
        assert_eq!(snapshot.origin(), &Origin::Republish);
    }

    #[tokio::test(start_paused = true)]
    async fn test_one_session_at_a_time() {
        let f = fixture().await;
        let session = f.guard.begin_edit(&1).expect("begin edit");

        assert_eq!(
            f.guard.begin_edit(&2).err(),
            Some(GuardError::AlreadyEditing { id: "1".to_string() })
        );
        session.end();
        assert!(f.guard.begin_edit(&2).is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_unknown_record_cannot_be_edited() {
        let f = fixture().await;
        assert_eq!(
            f.guard.begin_edit(&99).err(),
            Some(GuardError::UnknownEntity("99".to_string()))
        );
        assert!(!f.guard.is_editing());
    }

    #[tokio::test(start_paused = true)]
    async fn test_delete_of_other_record_during_edit_is_held_back() {
        let f = fixture().await;
        let mut view = f.guard.view();
        next_within(&mut view).await.expect("initial snapshot");

        let session = f.guard.begin_edit(&1).expect("begin edit");
        f.cache.delete_key(&2).await.expect("delete");
        assert!(next_within(&mut view).await.is_none());
        assert!(f.guard.shown().contains(&2));

        session.end();
        let snapshot = next_within(&mut view).await.expect("republished snapshot");
        assert!(!snapshot.contains(&2));
    }
}
