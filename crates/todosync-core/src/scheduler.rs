//! Periodic refresh driver.
//!
//! A scheduler fires once immediately and then every `interval`. If a tick
//! comes due while the previous refresh is still waiting on the transport,
//! the stale refresh is dropped and a new one starts, so at most one fetch
//! per target is in flight and the latest tick always wins.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::future::{BoxFuture, FutureExt, OptionFuture};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::cache::CacheError;

/// Something that can re-fetch its whole contents.
#[async_trait]
pub trait Refreshable: Send + Sync + 'static {
    /// Name used in logs.
    fn name(&self) -> &str;

    /// Fetch, store and publish. Returns the number of records stored.
    async fn refresh(&self) -> Result<usize, CacheError>;
}

#[derive(Debug, Clone, Copy)]
pub struct RefreshScheduler {
    interval: Duration,
}

impl RefreshScheduler {
    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Start refreshing `target` on a background task.
    pub fn spawn<R: Refreshable>(self, target: Arc<R>) -> RefreshHandle {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(run(target, self.interval, shutdown_rx));
        RefreshHandle {
            shutdown_tx,
            task: Some(task),
        }
    }
}

async fn run<R: Refreshable>(target: Arc<R>, period: Duration, mut shutdown_rx: watch::Receiver<bool>) {
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let mut in_flight: Option<BoxFuture<'static, Result<usize, CacheError>>> = None;

    info!(
        target_name = target.name(),
        interval_ms = period.as_millis() as u64,
        "Refresh scheduler started"
    );

    loop {
        tokio::select! {
            changed = shutdown_rx.changed() => {
                if changed.is_err() || *shutdown_rx.borrow() {
                    break;
                }
            }

            _ = ticker.tick() => {
                if in_flight.is_some() {
                    debug!(target_name = target.name(), "Superseding in-flight refresh");
                }
                let target = Arc::clone(&target);
                in_flight = Some(async move { target.refresh().await }.boxed());
            }

            Some(result) = OptionFuture::from(in_flight.as_mut()), if in_flight.is_some() => {
                in_flight = None;
                match result {
                    Ok(count) => debug!(target_name = target.name(), count, "Scheduled refresh complete"),
                    // The cache already recorded the failure; the next tick retries
                    Err(e) => warn!(target_name = target.name(), error = %e, "Scheduled refresh failed"),
                }
            }
        }
    }

    info!(target_name = target.name(), "Refresh scheduler stopped");
}

/// Owner of a running scheduler. Dropping it stops the schedule.
pub struct RefreshHandle {
    shutdown_tx: watch::Sender<bool>,
    task: Option<JoinHandle<()>>,
}

impl RefreshHandle {
    /// Stop scheduling and wait for the task to exit. A refresh in flight is
    /// dropped without storing anything.
    pub async fn shutdown(mut self) {
        self.shutdown_tx.send_replace(true);
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                warn!(error = %e, "Refresh scheduler task ended abnormally");
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }
}

impl Drop for RefreshHandle {
    fn drop(&mut self) {
        self.shutdown_tx.send_replace(true);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use crate::api::{MemoryTransport, Operation, Transport};
    use crate::cache::{LookupCache, SyncStatus};
    use crate::models::User;

    /// Counts refreshes; optionally takes `delay` to complete each one.
    struct Counter {
        started: AtomicUsize,
        finished: AtomicUsize,
        delay: Duration,
    }

    impl Counter {
        fn new(delay: Duration) -> Arc<Self> {
            Arc::new(Self {
                started: AtomicUsize::new(0),
                finished: AtomicUsize::new(0),
                delay,
            })
        }
    }

    #[async_trait]
    impl Refreshable for Counter {
        fn name(&self) -> &str {
            "counter"
        }

        async fn refresh(&self) -> Result<usize, CacheError> {
            self.started.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            Ok(self.finished.fetch_add(1, Ordering::SeqCst) + 1)
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_fires_immediately_then_on_interval() {
        let counter = Counter::new(Duration::ZERO);
        let handle = RefreshScheduler::new(Duration::from_secs(5)).spawn(Arc::clone(&counter));

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(counter.finished.load(Ordering::SeqCst), 1);

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(counter.finished.load(Ordering::SeqCst), 2);

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(counter.finished.load(Ordering::SeqCst), 4);

        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_refresh_is_superseded_by_next_tick() {
        // Each refresh takes longer than the interval, so none completes
        let counter = Counter::new(Duration::from_secs(8));
        let handle = RefreshScheduler::new(Duration::from_secs(5)).spawn(Arc::clone(&counter));

        tokio::time::sleep(Duration::from_secs(21)).await;
        assert_eq!(counter.started.load(Ordering::SeqCst), 5);
        assert_eq!(counter.finished.load(Ordering::SeqCst), 0);

        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_stops_ticks() {
        let counter = Counter::new(Duration::ZERO);
        let handle = RefreshScheduler::new(Duration::from_secs(1)).spawn(Arc::clone(&counter));
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(handle.is_running());

        handle.shutdown().await;
        let after_shutdown = counter.finished.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(counter.finished.load(Ordering::SeqCst), after_shutdown);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropping_handle_stops_ticks() {
        let counter = Counter::new(Duration::ZERO);
        let handle = RefreshScheduler::new(Duration::from_secs(1)).spawn(Arc::clone(&counter));
        tokio::time::sleep(Duration::from_millis(10)).await;
        drop(handle);

        tokio::time::sleep(Duration::from_millis(10)).await;
        let after_drop = counter.finished.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(counter.finished.load(Ordering::SeqCst), after_drop);
    }

    #[tokio::test(start_paused = true)]
    async fn test_superseded_refresh_does_not_leave_status_refreshing() {
        let transport = Arc::new(MemoryTransport::seeded());
        transport.set_latency(Duration::from_secs(8));
        let users: Arc<LookupCache<User>> =
            LookupCache::new("users", Arc::clone(&transport) as Arc<dyn Transport>);
        let handle = RefreshScheduler::new(Duration::from_secs(5)).spawn(Arc::clone(&users));

        tokio::time::sleep(Duration::from_secs(6)).await;
        assert_eq!(*users.status().borrow(), SyncStatus::Refreshing);

        handle.shutdown().await;
        assert_eq!(*users.status().borrow(), SyncStatus::Pending);
        assert!(users.current().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_tick_is_retried_by_next_tick() {
        let transport = Arc::new(MemoryTransport::seeded());
        transport.fail_next(Operation::FetchAll);
        let users: Arc<LookupCache<User>> =
            LookupCache::new("users", Arc::clone(&transport) as Arc<dyn Transport>);
        let handle = RefreshScheduler::new(Duration::from_secs(12)).spawn(Arc::clone(&users));

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(users.current().is_none());
        assert!(users.status().borrow().is_failed());

        tokio::time::sleep(Duration::from_secs(12)).await;
        assert_eq!(users.current().map(|snapshot| snapshot.len()), Some(4));
        assert!(matches!(*users.status().borrow(), SyncStatus::Ready { .. }));
        assert_eq!(transport.request_count(Operation::FetchAll), 2);

        handle.shutdown().await;
    }
}
