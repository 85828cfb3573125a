//! Shared types for the lakecat catalog wire protocol
//!
//! Both the server and the client depend on this crate, so the JSON shapes of requests,
//! responses, and errors, and the path layout, are defined in exactly one place.
pub mod error;
pub mod http;
pub mod paths;
pub mod transport;

pub use error::{ErrorResponse, ResourceType};
pub use paths::{CONFIG_PATH, DEFAULT_PREFIX, ResourcePaths};
pub use transport::{Transport, TransportError};
