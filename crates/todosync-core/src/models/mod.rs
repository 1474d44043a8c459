//! Data models for synchronized collections.
//!
//! This module contains the entity types and the generic building blocks
//! the caches operate on:
//!
//! - `Record`, `Versioned`, `References`: traits describing keyed, versioned
//!   and foreign-key-carrying entities
//! - `Todo`, `TodoDraft`: the primary mutable entity and its pending-create form
//! - `User`: the read-only lookup entity
//! - `Joined`, `Lookup`: an entity paired with its resolved (or unresolved) lookup
//! - `Snapshot`, `Origin`: the published collection and what produced it

pub mod joined;
pub mod record;
pub mod snapshot;
pub mod todo;
pub mod user;

pub use joined::{Joined, Lookup};
pub use record::{Keyed, Record, References, Version, Versioned};
pub use snapshot::{Origin, Snapshot};
pub use todo::{Todo, TodoDraft};
pub use user::User;
