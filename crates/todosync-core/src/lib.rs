//! todosync core - reactive client-side caches for a remote collection store.
//!
//! A read-only lookup collection (users) and a mutable primary collection
//! (todos) are each mirrored in memory and published as snapshots to any
//! number of subscribers. Primary records are joined against the lookup
//! collection before publication. An [`EditGuard`] holds a consumer's view
//! still while one record is being edited and raises a conflict signal if
//! that record changes upstream in the meantime.
//!
//! # Modules
//!
//! - `api`: the [`Transport`] trait with HTTP and in-memory implementations
//! - `cache`: [`LookupCache`], [`EntityCache`], snapshot streams, sync status
//! - `config`: [`SyncConfig`]
//! - `guard`: [`EditGuard`] and [`EditSession`]
//! - `models`: records, joins, snapshots
//! - `scheduler`: periodic refresh driver

pub mod api;
pub mod cache;
pub mod config;
pub mod guard;
pub mod models;
pub mod scheduler;

pub use api::{HttpTransport, MemoryTransport, Transport, TransportError};
pub use cache::{CacheError, EntityCache, LookupCache, SnapshotStream, SyncStatus};
pub use config::SyncConfig;
pub use guard::{EditGuard, EditMode, EditOutcome, EditSession, GuardError, ViewStream};
pub use models::{Joined, Lookup, Origin, Snapshot, Todo, TodoDraft, User};
pub use scheduler::{RefreshHandle, RefreshScheduler, Refreshable};
