//! Transports, command correlation, and nested session routing.
//!
//! * [`Connection`] correlates top-level commands with their replies and
//!   forwards events, in delivery order, to a single listener.
//! * [`SessionRouter`] layers nested-session routing on top: commands for a
//!   [`SessionChain`] are wrapped once per session and their replies are
//!   correlated when the wrapped messages come back.
//! * [`transport`] abstracts the byte channel; [`websocket`] is the production
//!   implementation and [`fake_transport`] the in-memory one used by tests.

pub mod connection;
pub mod error;
pub mod fake_transport;
pub mod router;
pub mod session;
pub mod transport;
pub mod websocket;

use std::time::Duration;

/// Default bound on how long any correlated command may stay unanswered.
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(30);

pub use connection::Connection;
pub use error::{Error, Result};
pub use fake_transport::{FakeTransportBuilder, FakeTransportController};
pub use router::{SessionRouter, Unwrapped};
pub use session::SessionChain;
pub use transport::{Transport, TransportParts, TransportReceiver};
pub use websocket::WebSocketTransport;
