//! Transport abstraction between the client and a debugging endpoint.
//!
//! A transport is split in two halves so the writer can be shared behind a
//! lock while the reader runs on its own task:
//!
//! * [`Transport`] sends serialized commands.
//! * [`TransportReceiver`] pumps incoming frames into the `message_rx`
//!   channel handed to the [`Connection`](crate::Connection).

use std::future::Future;
use std::pin::Pin;

use serde_json::Value;
use tokio::sync::mpsc;

use crate::error::Result;

/// Sending half of a transport.
pub trait Transport: Send {
	fn send(&mut self, message: Value) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;

	/// Closes the channel. The receiving half ends once the peer acknowledges.
	fn close(&mut self) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
		Box::pin(async { Ok(()) })
	}
}

/// Receiving half of a transport. Runs until the channel closes.
pub trait TransportReceiver: Send {
	fn run(self: Box<Self>) -> Pin<Box<dyn Future<Output = Result<()>> + Send>>;
}

/// Both halves plus the channel incoming messages are delivered on.
pub struct TransportParts {
	pub sender: Box<dyn Transport>,
	pub receiver: Box<dyn TransportReceiver>,
	pub message_rx: mpsc::UnboundedReceiver<Value>,
}
