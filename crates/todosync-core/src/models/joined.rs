//! Pairing an entity with the lookup record its foreign key points at.

use super::record::{Keyed, Record, References};
use super::snapshot::Snapshot;
use super::user::User;

/// Placeholder rendered when a foreign key has no matching lookup record.
pub const UNRESOLVED_PLACEHOLDER: &str = "---";

/// Result of resolving a foreign key against the lookup collection.
///
/// An unresolved key is a valid state, not an error: the lookup cache may
/// not have caught up with the primary collection yet.
#[derive(Debug, Clone, PartialEq)]
pub enum Lookup<L: Record> {
    Resolved(L),
    Unresolved { key: L::Key },
}

impl<L: Record> Lookup<L> {
    pub fn resolved(&self) -> Option<&L> {
        match self {
            Lookup::Resolved(found) => Some(found),
            Lookup::Unresolved { .. } => None,
        }
    }

    pub fn is_resolved(&self) -> bool {
        matches!(self, Lookup::Resolved(_))
    }

    /// The foreign key this lookup was resolved from.
    pub fn key(&self) -> L::Key {
        match self {
            Lookup::Resolved(found) => found.key(),
            Lookup::Unresolved { key } => key.clone(),
        }
    }
}

impl Lookup<User> {
    pub fn display_name(&self) -> String {
        match self {
            Lookup::Resolved(user) => user.full_name(),
            Lookup::Unresolved { .. } => UNRESOLVED_PLACEHOLDER.to_string(),
        }
    }
}

/// An entity together with its joined lookup record.
#[derive(Debug, Clone, PartialEq)]
pub struct Joined<T, L: Record> {
    pub record: T,
    pub lookup: Lookup<L>,
}

impl<T, L> Joined<T, L>
where
    T: References<L>,
    L: Record,
{
    /// Join `record` against whatever `lookups` currently holds.
    pub fn join(record: T, lookups: &Snapshot<L>) -> Self {
        let key = record.reference();
        let lookup = match lookups.get(&key) {
            Some(found) => Lookup::Resolved(found.clone()),
            None => Lookup::Unresolved { key },
        };
        Self { record, lookup }
    }
}

impl<T, L> Keyed for Joined<T, L>
where
    T: Keyed,
    L: Record,
{
    type Key = T::Key;

    fn key(&self) -> T::Key {
        self.record.key()
    }
}
