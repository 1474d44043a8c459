use std::sync::Arc;

use tokio::sync::watch;

use crate::models::{Keyed, Snapshot};

/// A subscription to a published snapshot channel.
///
/// If the channel already holds a published snapshot when the stream is
/// created, the first `next()` returns it immediately (replay depth 1).
/// Otherwise the first `next()` waits for the first publication. Publications
/// that land while the subscriber is busy coalesce: `next()` always returns
/// the latest one.
pub struct SnapshotStream<R: Keyed> {
    rx: watch::Receiver<Arc<Snapshot<R>>>,
}

impl<R: Keyed> SnapshotStream<R> {
    pub fn new(mut rx: watch::Receiver<Arc<Snapshot<R>>>) -> Self {
        if rx.borrow().is_published() {
            rx.mark_changed();
        }
        Self { rx }
    }

    /// Wait for the next publication. Returns `None` once the publisher is gone.
    pub async fn next(&mut self) -> Option<Arc<Snapshot<R>>> {
        self.rx.changed().await.ok()?;
        let snapshot = self.rx.borrow_and_update().clone();
        Some(snapshot)
    }

    /// The latest snapshot, whether or not it has been seen.
    pub fn latest(&self) -> Arc<Snapshot<R>> {
        self.rx.borrow().clone()
    }

    /// Whether a publication is waiting to be returned by `next()`.
    pub fn has_pending(&self) -> bool {
        self.rx.has_changed().unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Origin, User};

    fn user(id: i64) -> User {
        User {
            id,
            first_name: "First".to_string(),
            last_name: "Last".to_string(),
        }
    }

    #[tokio::test]
    async fn test_late_subscriber_replays_latest() {
        let (tx, _) = watch::channel(Arc::new(Snapshot::<User>::empty()));
        tx.send_modify(|current| *current = Arc::new(current.next(vec![user(1)], Origin::Refresh)));

        let mut stream = SnapshotStream::new(tx.subscribe());
        assert!(stream.has_pending());
        let snapshot = stream.next().await.expect("replayed snapshot");
        assert_eq!(snapshot.generation(), 1);
        assert!(!stream.has_pending());
    }

    #[tokio::test]
    async fn test_unpublished_channel_is_not_replayed() {
        let (tx, _) = watch::channel(Arc::new(Snapshot::<User>::empty()));
        let stream = SnapshotStream::new(tx.subscribe());
        assert!(!stream.has_pending());
        assert!(!stream.latest().is_published());
    }

    #[tokio::test]
    async fn test_publications_coalesce_to_latest() {
        let (tx, _) = watch::channel(Arc::new(Snapshot::<User>::empty()));
        let mut stream = SnapshotStream::new(tx.subscribe());

        tx.send_modify(|current| *current = Arc::new(current.next(vec![user(1)], Origin::Refresh)));
        tx.send_modify(|current| *current = Arc::new(current.next(vec![user(2)], Origin::Refresh)));

        let snapshot = stream.next().await.expect("snapshot");
        assert_eq!(snapshot.generation(), 2);
        assert!(snapshot.contains(&2));
        assert!(!stream.has_pending());
    }

    #[tokio::test]
    async fn test_next_ends_when_publisher_dropped() {
        let (tx, _) = watch::channel(Arc::new(Snapshot::<User>::empty()));
        let mut stream = SnapshotStream::new(tx.subscribe());
        drop(tx);
        assert!(stream.next().await.is_none());
    }
}
