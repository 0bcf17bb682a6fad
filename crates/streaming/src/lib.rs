//! Tile data plumbing: wire protocol, request keys and the shared-channel
//! request multiplexer, plus the HTTP fallback used to pull tile payloads.

pub mod config;
pub mod connection;
pub mod error;
pub mod http;
pub mod key;
pub mod multiplexer;
pub mod protocol;
pub mod source;

pub use config::*;
pub use connection::*;
pub use error::*;
pub use http::*;
pub use key::*;
pub use multiplexer::*;
pub use protocol::*;
pub use source::*;
