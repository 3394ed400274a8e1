//! Wire types for the DevTools instrumentation protocol.
//!
//! This crate contains the serde-serializable types exchanged with a browser
//! debugging endpoint. These types represent the "protocol layer": the
//! shapes of commands, replies, and events as they appear on the wire.
//!
//! # Design Philosophy
//!
//! Types in this crate are:
//! * Pure data: No behavior beyond serialization and small decoding helpers
//! * Closed: incoming events parse into the exhaustive [`Event`] enum, with
//!   [`Event::Other`] as the explicit default
//! * Minimal: only the commands and events the recorder consumes
//!
//! Correlation, routing, and transports live in `wr-runtime`.

pub mod commands;
pub mod events;
pub mod message;
pub mod types;

pub use commands::*;
pub use events::*;
pub use message::*;
pub use types::*;
