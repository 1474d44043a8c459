use thiserror::Error;

use crate::api::TransportError;

#[derive(Error, Debug)]
pub enum CacheError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("Failed to decode {collection} record: {source}")]
    Decode {
        collection: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to encode record: {0}")]
    Encode(#[source] serde_json::Error),
}
