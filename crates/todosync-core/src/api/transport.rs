use async_trait::async_trait;
use serde_json::Value;

use super::TransportError;

/// Request/response access to named collections on the remote source.
///
/// Records cross this boundary as JSON so one transport can serve every
/// cache; decoding into typed records is the caches' job. Implementations
/// make no ordering or consistency promises between calls.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Every record currently in `collection`.
    async fn fetch_all(&self, collection: &str) -> Result<Vec<Value>, TransportError>;

    /// Persist a draft; returns the stored record with its assigned id and version.
    async fn create(&self, collection: &str, draft: Value) -> Result<Value, TransportError>;

    /// Replace the record whose id matches `entity`'s; returns the stored record.
    async fn replace(&self, collection: &str, entity: Value) -> Result<Value, TransportError>;

    async fn delete(&self, collection: &str, id: &str) -> Result<(), TransportError>;
}
