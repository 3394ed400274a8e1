//! Fake transport for testing command correlation and event routing.
//!
//! Provides an in-memory transport so the protocol layers can be exercised
//! without a browser.
//!
//! # Example
//!
//! ```ignore
//! let (parts, controller) = FakeTransportBuilder::new().build();
//! let connection = Connection::new(parts).start();
//!
//! let fut = connection.send_message("Page.enable", json!({}));
//! controller.inject_response(1, json!({}));
//! let result = fut.await?;
//! ```

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::{Value, json};
use tokio::sync::mpsc;

use crate::error::Result;
use crate::transport::{Transport, TransportParts, TransportReceiver};

/// Builder for fake transport instances.
#[derive(Default)]
pub struct FakeTransportBuilder {}

impl FakeTransportBuilder {
	pub fn new() -> Self {
		Self {}
	}

	/// Builds the fake transport.
	///
	/// Returns [`TransportParts`] for a [`Connection`] and a
	/// [`FakeTransportController`] for injecting messages and inspecting
	/// what was sent.
	///
	/// [`Connection`]: crate::Connection
	pub fn build(self) -> (TransportParts, FakeTransportController) {
		let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
		let (message_tx, message_rx) = mpsc::unbounded_channel();
		let (sent_tx, sent_rx) = mpsc::unbounded_channel();
		let sent_messages = Arc::new(Mutex::new(Vec::new()));

		let sender = FakeTransportSender {
			sent: Arc::clone(&sent_messages),
			sent_tx,
		};

		let receiver = FakeTransportReceiver { inbound_rx, message_tx };

		let controller = FakeTransportController {
			inbound_tx: Mutex::new(Some(inbound_tx)),
			sent: sent_messages,
			sent_rx: tokio::sync::Mutex::new(sent_rx),
		};

		let parts = TransportParts {
			sender: Box::new(sender),
			receiver: Box::new(receiver),
			message_rx,
		};

		(parts, controller)
	}
}

/// Injects inbound messages and observes outbound ones.
pub struct FakeTransportController {
	inbound_tx: Mutex<Option<mpsc::UnboundedSender<Value>>>,
	sent: Arc<Mutex<Vec<Value>>>,
	sent_rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<Value>>,
}

impl FakeTransportController {
	/// Injects a raw JSON message as if the debuggee had sent it.
	pub fn inject(&self, message: Value) {
		if let Some(tx) = self.inbound_tx.lock().as_ref() {
			let _ = tx.send(message);
		}
	}

	pub fn inject_response(&self, id: u64, result: Value) {
		self.inject(json!({
			"id": id,
			"result": result
		}));
	}

	pub fn inject_error(&self, id: u64, code: i64, message: &str) {
		self.inject(json!({
			"id": id,
			"error": {
				"code": code,
				"message": message
			}
		}));
	}

	pub fn inject_event(&self, method: &str, params: Value) {
		self.inject(json!({
			"method": method,
			"params": params
		}));
	}

	/// Simulates the debuggee going away: the receiving half ends.
	pub fn close(&self) {
		self.inbound_tx.lock().take();
	}

	/// Every message sent so far, oldest first.
	pub fn sent(&self) -> Vec<Value> {
		self.sent.lock().clone()
	}

	/// Takes all sent messages, clearing the buffer.
	pub fn take_sent(&self) -> Vec<Value> {
		std::mem::take(&mut *self.sent.lock())
	}

	/// Waits for the next outbound message, in send order.
	///
	/// Independent of [`sent`](Self::sent): each message is seen once here
	/// and stays in the buffer.
	pub async fn next_sent(&self) -> Option<Value> {
		self.sent_rx.lock().await.recv().await
	}
}

struct FakeTransportSender {
	sent: Arc<Mutex<Vec<Value>>>,
	sent_tx: mpsc::UnboundedSender<Value>,
}

impl Transport for FakeTransportSender {
	fn send(&mut self, message: Value) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
		self.sent.lock().push(message.clone());
		let _ = self.sent_tx.send(message);
		Box::pin(async { Ok(()) })
	}
}

struct FakeTransportReceiver {
	inbound_rx: mpsc::UnboundedReceiver<Value>,
	message_tx: mpsc::UnboundedSender<Value>,
}

impl TransportReceiver for FakeTransportReceiver {
	fn run(mut self: Box<Self>) -> Pin<Box<dyn Future<Output = Result<()>> + Send>> {
		Box::pin(async move {
			while let Some(message) = self.inbound_rx.recv().await {
				if self.message_tx.send(message).is_err() {
					break;
				}
			}
			Ok(())
		})
	}
}
