//! Traits shared by every cached entity.

use std::fmt;
use std::hash::Hash;

use serde::{de::DeserializeOwned, Deserialize, Serialize};

/// Anything that can be addressed by a unique key inside a snapshot.
pub trait Keyed: Clone + Send + Sync + 'static {
    type Key: Clone + Eq + Hash + fmt::Debug + fmt::Display + Send + Sync + 'static;

    fn key(&self) -> Self::Key;
}

/// A keyed entity that travels over the transport as JSON.
pub trait Record: Keyed + Serialize + DeserializeOwned {}

impl<T: Keyed + Serialize + DeserializeOwned> Record for T {}

/// A record whose remote source stamps a version marker on every write.
///
/// Only persisted records implement this: a record with a key always has a
/// version. Pending creates are represented by the associated `Draft` type
/// of [`References`], which carries neither.
pub trait Versioned: Record {
    fn version(&self) -> &Version;
}

/// A versioned record holding a foreign key into a lookup collection `L`.
pub trait References<L: Record>: Versioned {
    /// Pending-create form sent to the transport before a key is assigned.
    type Draft: Serialize + Send + Sync;

    fn reference(&self) -> L::Key;
}

/// Opaque version marker assigned by the remote source.
///
/// Only ever compared for equality; the contents (typically a timestamp)
/// carry no ordering meaning here.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Version(String);

impl Version {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
