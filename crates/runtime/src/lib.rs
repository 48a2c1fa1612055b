//! Inspector connection, source maps, and debug session state for jsdap.
//!
//! - [`transport`]: WebSocket transport and the [`transport::Connector`] seam
//! - [`connection`]: id allocation and reply correlation
//! - [`sourcemap`]: inline source map decoding and the per-session registry
//! - [`session`]: engine events to editor events, breakpoints, resume
//! - [`fake_transport`]: in-memory transport for tests

pub mod connection;
pub mod error;
pub mod fake_transport;
pub mod session;
pub mod sourcemap;
pub mod transport;

pub use connection::{Connection, ConnectionEvent, ConnectionOptions, DEFAULT_COMMAND_TIMEOUT};
pub use error::{Error, Result};
pub use session::{InitializedSignal, Session, SessionOptions, SessionState};
pub use transport::{Connector, TransportParts, WebSocketConnector, WebSocketTransport};
