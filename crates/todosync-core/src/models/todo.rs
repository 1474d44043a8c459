//! The primary mutable entity.

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::record::{Keyed, References, Version, Versioned};
use super::user::User;

/// A todo that the remote source has persisted.
///
/// The server assigns both `id` and `update_date`; a record received without
/// an `updateDate` fails to decode rather than producing a keyed entity with
/// no version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Todo {
    pub id: i64,
    #[serde(rename = "updateDate")]
    pub update_date: Version,
    pub title: String,
    #[serde(rename = "dueDate")]
    pub due_date: String,
    #[serde(rename = "userId")]
    pub user_id: i64,
    /// Server fields not modelled here (`createDate`, ...), kept so a
    /// replace sends them back unchanged.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Todo {
    /// Copy of this todo with a new title, keeping id and version so the
    /// server can match it on replace.
    pub fn with_title(&self, title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..self.clone()
        }
    }
}

impl Keyed for Todo {
    type Key = i64;

    fn key(&self) -> i64 {
        self.id
    }
}

impl Versioned for Todo {
    fn version(&self) -> &Version {
        &self.update_date
    }
}

impl References<User> for Todo {
    type Draft = TodoDraft;

    fn reference(&self) -> i64 {
        self.user_id
    }
}

/// A todo that has not been created yet: no id, no version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TodoDraft {
    pub title: String,
    #[serde(rename = "dueDate")]
    pub due_date: String,
    #[serde(rename = "userId")]
    pub user_id: i64,
}

impl TodoDraft {
    /// Draft due now, assigned to `user_id`.
    pub fn new(title: impl Into<String>, user_id: i64) -> Self {
        Self {
            title: title.into(),
            due_date: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            user_id,
        }
    }
}
