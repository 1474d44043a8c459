use serde::{Deserialize, Serialize};

use super::record::Keyed;

/// A user referenced by todos. Read-only from this crate's perspective.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    #[serde(rename = "firstName")]
    pub first_name: String,
    #[serde(rename = "lastName")]
    pub last_name: String,
}

impl User {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

impl Keyed for User {
    type Key = i64;

    fn key(&self) -> i64 {
        self.id
    }
}
