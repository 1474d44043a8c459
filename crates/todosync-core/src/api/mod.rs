//! Transport layer between the caches and the remote source.
//!
//! The caches talk to the remote collection store only through the
//! [`Transport`] trait: fetch a whole collection, create, replace by id,
//! delete by id. Two implementations are provided:
//!
//! - `HttpTransport`: a REST client over `reqwest`
//! - `MemoryTransport`: an in-memory backend that assigns ids and versions
//!   the way a real server would, used by tests and the `--mock` demo

pub mod error;
pub mod http;
pub mod memory;
pub mod transport;

pub use error::TransportError;
pub use http::HttpTransport;
pub use memory::{MemoryTransport, Operation};
pub use transport::Transport;
