//! In-memory collection backend.
//!
//! Behaves like a small JSON collection server: numeric ids are assigned on
//! create (max existing id + 1), versioned collections get a fresh
//! `updateDate` on every create and replace, and with drift enabled every
//! fetch of a versioned collection first rewrites the version of one random
//! record, simulating edits made by someone else.

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use rand::seq::SliceRandom;
use serde_json::{json, Value};
use tracing::debug;

use super::{Transport, TransportError};

/// Field the backend stamps with a fresh version on every write.
const VERSION_FIELD: &str = "updateDate";

/// Transport operations, used to inject failures and count requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    FetchAll,
    Create,
    Replace,
    Delete,
}

#[derive(Default)]
struct MemoryState {
    collections: HashMap<String, Vec<Value>>,
    versioned: HashSet<String>,
    last_version: Option<DateTime<Utc>>,
    pending_failures: HashMap<Operation, u32>,
    requests: HashMap<Operation, usize>,
    latency: Duration,
    drift: bool,
}

impl MemoryState {
    /// Strictly increasing RFC 3339 timestamp, even within one clock tick.
    fn next_version(&mut self) -> String {
        let mut now = Utc::now();
        if let Some(last) = self.last_version {
            if now <= last {
                now = last + chrono::Duration::microseconds(1);
            }
        }
        self.last_version = Some(now);
        now.to_rfc3339_opts(SecondsFormat::Micros, true)
    }

    fn take_failure(&mut self, op: Operation) -> Option<TransportError> {
        *self.requests.entry(op).or_insert(0) += 1;
        match self.pending_failures.get_mut(&op) {
            Some(remaining) if *remaining > 0 => {
                *remaining -= 1;
                Some(TransportError::Unavailable(format!("injected {:?} failure", op)))
            }
            _ => None,
        }
    }

    fn stamp(&mut self, collection: &str, record: &mut Value) {
        if self.versioned.contains(collection) {
            let version = self.next_version();
            if let Value::Object(fields) = record {
                fields.insert(VERSION_FIELD.to_string(), Value::String(version));
            }
        }
    }

    fn drift(&mut self, collection: &str) {
        if !self.drift || !self.versioned.contains(collection) {
            return;
        }
        let len = self.collections.get(collection).map(Vec::len).unwrap_or(0);
        let indices: Vec<usize> = (0..len).collect();
        let Some(&index) = indices.choose(&mut rand::thread_rng()) else {
            return;
        };
        let version = self.next_version();
        if let Some(Value::Object(fields)) = self
            .collections
            .get_mut(collection)
            .and_then(|records| records.get_mut(index))
        {
            debug!(collection, id = ?fields.get("id"), "Drifting record version");
            fields.insert(VERSION_FIELD.to_string(), Value::String(version));
        }
    }
}

/// In-memory backend implementing [`Transport`].
#[derive(Default)]
pub struct MemoryTransport {
    state: Mutex<MemoryState>,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Backend holding the demo users and todos.
    pub fn seeded() -> Self {
        let transport = Self::new();
        transport.insert_collection(
            "users",
            vec![
                json!({ "id": 1, "firstName": "Cameron", "lastName": "D" }),
                json!({ "id": 2, "firstName": "Nic", "lastName": "C" }),
                json!({ "id": 3, "firstName": "Wes", "lastName": "C" }),
                json!({ "id": 4, "firstName": "Zach", "lastName": "W" }),
            ],
            false,
        );
        let now = Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true);
        transport.insert_collection(
            "todos",
            vec![
                json!({ "id": 1, "title": "Buy Groceries", "dueDate": now, "createDate": now, "userId": 1 }),
                json!({ "id": 2, "title": "Exchange Present", "dueDate": now, "createDate": now, "userId": 2 }),
                json!({ "id": 3, "title": "Go Running", "dueDate": now, "createDate": now, "userId": 1 }),
            ],
            true,
        );
        transport
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Replace a collection's contents. Versioned collections get every
    /// record stamped with a fresh version.
    pub fn insert_collection(&self, collection: &str, records: Vec<Value>, versioned: bool) {
        let mut state = self.lock();
        if versioned {
            state.versioned.insert(collection.to_string());
        } else {
            state.versioned.remove(collection);
        }
        let mut stamped = Vec::with_capacity(records.len());
        for mut record in records {
            state.stamp(collection, &mut record);
            stamped.push(record);
        }
        state.collections.insert(collection.to_string(), stamped);
    }

    /// Rewrite one random versioned record on every fetch.
    pub fn with_drift(self, drift: bool) -> Self {
        self.lock().drift = drift;
        self
    }

    /// Delay every response by `latency`.
    pub fn set_latency(&self, latency: Duration) {
        self.lock().latency = latency;
    }

    /// Make the next call of `op` fail with `TransportError::Unavailable`.
    pub fn fail_next(&self, op: Operation) {
        *self.lock().pending_failures.entry(op).or_insert(0) += 1;
    }

    /// Stamp a new version on a stored record, as if another client edited it.
    pub fn touch(&self, collection: &str, id: &str) -> Option<String> {
        let mut state = self.lock();
        let index = state
            .collections
            .get(collection)?
            .iter()
            .position(|record| id_matches(record, id))?;
        let version = state.next_version();
        if let Some(Value::Object(fields)) = state
            .collections
            .get_mut(collection)
            .and_then(|records| records.get_mut(index))
        {
            fields.insert(VERSION_FIELD.to_string(), Value::String(version.clone()));
        }
        Some(version)
    }

    /// Copy of a stored record.
    pub fn record(&self, collection: &str, id: &str) -> Option<Value> {
        self.lock()
            .collections
            .get(collection)?
            .iter()
            .find(|record| id_matches(record, id))
            .cloned()
    }

    /// Number of calls made for `op`, including failed ones.
    pub fn request_count(&self, op: Operation) -> usize {
        self.lock().requests.get(&op).copied().unwrap_or(0)
    }

    /// Count the request and apply injected failures and latency.
    async fn begin(&self, op: Operation) -> Result<(), TransportError> {
        let (failure, latency) = {
            let mut state = self.lock();
            (state.take_failure(op), state.latency)
        };
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
        match failure {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn fetch_all(&self, collection: &str) -> Result<Vec<Value>, TransportError> {
        self.begin(Operation::FetchAll).await?;

        let mut state = self.lock();
        state.drift(collection);
        state
            .collections
            .get(collection)
            .cloned()
            .ok_or_else(|| TransportError::NotFound(format!("collection {}", collection)))
    }

    async fn create(&self, collection: &str, draft: Value) -> Result<Value, TransportError> {
        self.begin(Operation::Create).await?;

        let Value::Object(mut fields) = draft else {
            return Err(TransportError::InvalidRequest(
                "create expects a JSON object".to_string(),
            ));
        };

        let mut state = self.lock();
        let next_id = state
            .collections
            .get(collection)
            .map(|records| {
                records
                    .iter()
                    .filter_map(|record| record.get("id").and_then(Value::as_i64))
                    .max()
                    .unwrap_or(0)
            })
            .unwrap_or(0)
            + 1;
        fields.insert("id".to_string(), json!(next_id));

        let mut record = Value::Object(fields);
        state.stamp(collection, &mut record);
        state
            .collections
            .entry(collection.to_string())
            .or_default()
            .push(record.clone());

        debug!(collection, id = next_id, "Created record");
        Ok(record)
    }

    async fn replace(&self, collection: &str, entity: Value) -> Result<Value, TransportError> {
        self.begin(Operation::Replace).await?;

        let id = entity
            .get("id")
            .map(id_string)
            .ok_or_else(|| TransportError::InvalidRequest("replace requires an id".to_string()))?;

        let mut state = self.lock();
        let index = state
            .collections
            .get(collection)
            .and_then(|records| records.iter().position(|existing| id_matches(existing, &id)))
            .ok_or_else(|| TransportError::NotFound(format!("{} {}", collection, id)))?;

        let mut record = entity;
        state.stamp(collection, &mut record);
        if let Some(slot) = state
            .collections
            .get_mut(collection)
            .and_then(|records| records.get_mut(index))
        {
            *slot = record.clone();
        }

        debug!(collection, id = %id, "Replaced record");
        Ok(record)
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<(), TransportError> {
        self.begin(Operation::Delete).await?;

        // Deleting a missing record succeeds, like a 204 from the server
        if let Some(records) = self.lock().collections.get_mut(collection) {
            records.retain(|record| !id_matches(record, id));
        }
        debug!(collection, id, "Deleted record");
        Ok(())
    }
}

fn id_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn id_matches(record: &Value, id: &str) -> bool {
    record.get("id").map(id_string).as_deref() == Some(id)
}
