//! The published, immutable view of a cached collection.

use std::collections::HashMap;
use std::fmt;

use super::record::Keyed;

/// The operation that produced a snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Origin<K> {
    /// Placeholder held before anything was published.
    Initial,
    /// Full collection re-fetched from the remote source.
    Refresh,
    Create(K),
    Update(K),
    Delete(K),
    /// Current contents re-emitted unchanged.
    Republish,
}

impl<K: fmt::Display> fmt::Display for Origin<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Origin::Initial => write!(f, "initial"),
            Origin::Refresh => write!(f, "refresh"),
            Origin::Create(key) => write!(f, "create {}", key),
            Origin::Update(key) => write!(f, "update {}", key),
            Origin::Delete(key) => write!(f, "delete {}", key),
            Origin::Republish => write!(f, "republish"),
        }
    }
}

/// A collection of rows, unique by key, stamped with a generation.
///
/// Generation 0 is the unpublished placeholder; every store in a cache
/// bumps the generation by one, so subscribers can tell two publications of
/// identical contents apart.
#[derive(Debug, Clone)]
pub struct Snapshot<R: Keyed> {
    rows: Vec<R>,
    generation: u64,
    origin: Origin<R::Key>,
}

impl<R: Keyed> Snapshot<R> {
    pub fn empty() -> Self {
        Self {
            rows: Vec::new(),
            generation: 0,
            origin: Origin::Initial,
        }
    }

    /// Successor snapshot holding `rows`, deduplicated by key.
    pub fn next(&self, rows: impl IntoIterator<Item = R>, origin: Origin<R::Key>) -> Self {
        Self {
            rows: dedup_by_key(rows),
            generation: self.generation + 1,
            origin,
        }
    }

    /// Successor snapshot with the same rows.
    pub fn republished(&self) -> Self {
        Self {
            rows: self.rows.clone(),
            generation: self.generation + 1,
            origin: Origin::Republish,
        }
    }

    /// Replace the row sharing `row`'s key, or append it.
    pub(crate) fn upsert(&mut self, row: R) {
        let key = row.key();
        self.rows.retain(|existing| existing.key() != key);
        self.rows.push(row);
    }

    /// Remove the row with `key`. Returns whether a row was removed.
    pub(crate) fn remove(&mut self, key: &R::Key) -> bool {
        let before = self.rows.len();
        self.rows.retain(|existing| &existing.key() != key);
        self.rows.len() != before
    }

    /// Stamp an in-place modification as a new publication.
    pub(crate) fn advance(&mut self, origin: Origin<R::Key>) {
        self.generation += 1;
        self.origin = origin;
    }

    pub fn rows(&self) -> &[R] {
        &self.rows
    }

    pub fn get(&self, key: &R::Key) -> Option<&R> {
        self.rows.iter().find(|row| &row.key() == key)
    }

    pub fn contains(&self, key: &R::Key) -> bool {
        self.get(key).is_some()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn origin(&self) -> &Origin<R::Key> {
        &self.origin
    }

    /// Whether this snapshot came from an actual store rather than being
    /// the initial placeholder.
    pub fn is_published(&self) -> bool {
        self.generation > 0
    }
}

impl<R: Keyed> Default for Snapshot<R> {
    fn default() -> Self {
        Self::empty()
    }
}

/// Later rows win over earlier rows with the same key; first-seen order is kept.
fn dedup_by_key<R: Keyed>(rows: impl IntoIterator<Item = R>) -> Vec<R> {
    let mut positions: HashMap<R::Key, usize> = HashMap::new();
    let mut out: Vec<R> = Vec::new();
    for row in rows {
        match positions.get(&row.key()) {
            Some(&index) => out[index] = row,
            None => {
                positions.insert(row.key(), out.len());
                out.push(row);
            }
        }
    }
    out
}
