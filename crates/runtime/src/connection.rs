//! JSON-RPC connection to a debuggee.
//!
//! This module implements the request/response correlation layer on top of
//! the transport. It handles:
//! - Generating unique command ids
//! - Correlating replies with pending commands
//! - Distinguishing events from replies
//! - Forwarding events, in delivery order, to the current listener
//!
//! # Message Flow
//!
//! 1. Caller invokes [`Connection::send_message`] with a method and params
//! 2. Connection allocates the next id and parks a oneshot sender under it
//! 3. The command is serialized and written to the transport
//! 4. The caller awaits the oneshot receiver, bounded by the command timeout
//! 5. [`Connection::run`] reads the reply, removes the parked sender by id,
//!    and completes it with the result or the protocol error
//!
//! Nested sub-target sessions are not handled here; see
//! [`SessionRouter`](crate::SessionRouter).

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, trace, warn};
use wr_protocol::{Command, RpcEvent, RpcMessage, RpcRequest};

use crate::DEFAULT_COMMAND_TIMEOUT;
use crate::error::{Error, Result};
use crate::transport::{Transport, TransportParts, TransportReceiver};

struct Callback {
	method: String,
	tx: oneshot::Sender<Result<Value>>,
}

/// Connection to one debuggee.
///
/// Thread-safe; share it with `Arc`. Multiple concurrent commands are
/// supported, and replies may arrive in any order.
pub struct Connection {
	/// Last allocated command id.
	last_id: AtomicU64,
	/// Pending commands keyed by id. Entries are removed exactly once:
	/// on reply, on timeout, on send failure, or on shutdown.
	callbacks: Mutex<HashMap<u64, Callback>>,
	sender: tokio::sync::Mutex<Box<dyn Transport>>,
	receiver: Mutex<Option<Box<dyn TransportReceiver>>>,
	message_rx: Mutex<Option<mpsc::UnboundedReceiver<Value>>>,
	listener: Mutex<Option<mpsc::UnboundedSender<RpcEvent>>>,
	closed: AtomicBool,
	timeout: Duration,
}

impl Connection {
	pub fn new(parts: TransportParts) -> Self {
		Self {
			last_id: AtomicU64::new(0),
			callbacks: Mutex::new(HashMap::new()),
			sender: tokio::sync::Mutex::new(parts.sender),
			receiver: Mutex::new(Some(parts.receiver)),
			message_rx: Mutex::new(Some(parts.message_rx)),
			listener: Mutex::new(None),
			closed: AtomicBool::new(false),
			timeout: DEFAULT_COMMAND_TIMEOUT,
		}
	}

	/// Bounds how long a command may wait for its reply.
	pub fn with_timeout(mut self, timeout: Duration) -> Self {
		self.timeout = timeout;
		self
	}

	/// Wraps the connection in an `Arc` and spawns its message loop.
	pub fn start(self) -> Arc<Self> {
		let connection = Arc::new(self);
		let conn = Arc::clone(&connection);
		tokio::spawn(async move {
			conn.run().await;
		});
		connection
	}

	pub fn timeout(&self) -> Duration {
		self.timeout
	}

	pub fn is_closed(&self) -> bool {
		self.closed.load(Ordering::SeqCst)
	}

	/// Registers the event listener, replacing any previous one.
	///
	/// The returned stream ends when the connection closes or the listener
	/// is replaced or removed.
	pub fn subscribe(&self) -> mpsc::UnboundedReceiver<RpcEvent> {
		let (tx, rx) = mpsc::unbounded_channel();
		if !self.is_closed() {
			*self.listener.lock() = Some(tx);
		}
		rx
	}

	pub fn unsubscribe(&self) {
		self.listener.lock().take();
	}

	/// Sends a typed command and decodes its reply.
	pub async fn send<C: Command>(&self, command: &C) -> Result<C::Response> {
		let params = serde_json::to_value(command)?;
		let result = self.send_message(C::METHOD, params).await?;
		Ok(serde_json::from_value(result)?)
	}

	/// Sends a raw command and awaits its reply.
	///
	/// Fails with [`Error::Protocol`] when the debuggee reports an error,
	/// [`Error::Timeout`] when no reply arrives in time, and
	/// [`Error::ChannelClosed`] when the connection goes away first.
	pub async fn send_message(&self, method: &str, params: Value) -> Result<Value> {
		if self.is_closed() {
			return Err(Error::ChannelClosed);
		}

		let id = self.last_id.fetch_add(1, Ordering::SeqCst) + 1;
		let (tx, rx) = oneshot::channel();
		self.callbacks.lock().insert(
			id,
			Callback {
				method: method.to_string(),
				tx,
			},
		);

		let request = RpcRequest {
			id,
			method: method.to_string(),
			params: if params.is_null() { Value::Object(Default::default()) } else { params },
		};
		trace!(target = "wr.connection", id, %method, "send");

		let sent = match serde_json::to_value(&request) {
			Ok(value) => self.sender.lock().await.send(value).await,
			Err(e) => Err(Error::from(e)),
		};
		if let Err(e) = sent {
			self.callbacks.lock().remove(&id);
			return Err(e);
		}

		match tokio::time::timeout(self.timeout, rx).await {
			Ok(Ok(result)) => result,
			Ok(Err(_)) => Err(Error::ChannelClosed),
			Err(_) => {
				self.callbacks.lock().remove(&id);
				warn!(target = "wr.connection", id, %method, "command timed out");
				Err(Error::Timeout { method: method.to_string() })
			}
		}
	}

	/// Closes the transport. The message loop ends once the peer confirms.
	pub async fn close(&self) -> Result<()> {
		self.sender.lock().await.close().await
	}

	/// Runs the message loop until the transport closes.
	///
	/// Replies complete their pending commands; events go to the listener.
	/// On exit every pending command fails with [`Error::ChannelClosed`].
	pub async fn run(&self) {
		let Some(receiver) = self.receiver.lock().take() else {
			warn!(target = "wr.connection", "message loop already started");
			return;
		};
		let Some(mut message_rx) = self.message_rx.lock().take() else {
			warn!(target = "wr.connection", "message loop already started");
			return;
		};

		let transport_handle = tokio::spawn(async move {
			if let Err(e) = receiver.run().await {
				error!(target = "wr.connection", error = %e, "transport error");
			}
		});

		while let Some(message_value) = message_rx.recv().await {
			match serde_json::from_value::<RpcMessage>(message_value.clone()) {
				Ok(message) => self.dispatch(message),
				Err(e) => {
					error!(target = "wr.connection", error = %e, message = %message_value, "failed to parse message");
				}
			}
		}

		debug!(target = "wr.connection", "message loop ended (transport closed)");
		self.shutdown();

		let _ = transport_handle.await;
	}

	fn dispatch(&self, message: RpcMessage) {
		match message {
			RpcMessage::Response(response) => {
				let Some(callback) = self.callbacks.lock().remove(&response.id) else {
					debug!(target = "wr.connection", id = response.id, "reply for unknown command dropped");
					return;
				};

				let result = match response.error {
					Some(error) => Err(Error::protocol(&callback.method, error)),
					None => Ok(response.result.unwrap_or(Value::Null)),
				};

				// The caller may have stopped waiting; that is fine.
				let _ = callback.tx.send(result);
			}
			RpcMessage::Event(event) => {
				let listener = self.listener.lock();
				match listener.as_ref() {
					Some(tx) => {
						let _ = tx.send(event);
					}
					None => trace!(target = "wr.connection", method = %event.method, "event without listener dropped"),
				}
			}
		}
	}

	fn shutdown(&self) {
		self.closed.store(true, Ordering::SeqCst);
		let pending: Vec<Callback> = self.callbacks.lock().drain().map(|(_, callback)| callback).collect();
		for callback in pending {
			let _ = callback.tx.send(Err(Error::ChannelClosed));
		}
		self.listener.lock().take();
	}
}

#[cfg(test)]
mod tests {
	use std::time::Duration;

	use serde_json::json;
	use wr_protocol::{RpcError, RpcResponse};

	use super::*;
	use crate::fake_transport::FakeTransportBuilder;

	#[test]
	fn test_dispatch_response_success() {
		let (parts, _controller) = FakeTransportBuilder::new().build();
		let connection = Connection::new(parts);

		let (tx, mut rx) = oneshot::channel();
		connection.callbacks.lock().insert(
			1,
			Callback {
				method: "Page.enable".to_string(),
				tx,
			},
		);

		connection.dispatch(RpcMessage::Response(RpcResponse {
			id: 1,
			result: Some(json!({"status": "ok"})),
			error: None,
		}));

		let result = rx.try_recv().unwrap().unwrap();
		assert_eq!(result["status"], "ok");
		assert!(connection.callbacks.lock().is_empty());
	}

	#[test]
	fn test_dispatch_response_error() {
		let (parts, _controller) = FakeTransportBuilder::new().build();
		let connection = Connection::new(parts);

		let (tx, mut rx) = oneshot::channel();
		connection.callbacks.lock().insert(
			4,
			Callback {
				method: "Network.getResponseBody".to_string(),
				tx,
			},
		);

		connection.dispatch(RpcMessage::Response(RpcResponse {
			id: 4,
			result: None,
			error: Some(RpcError {
				code: -32000,
				message: "No data found for resource with given identifier".to_string(),
				data: None,
			}),
		}));

		match rx.try_recv().unwrap() {
			Err(Error::Protocol { method, code, .. }) => {
				assert_eq!(method, "Network.getResponseBody");
				assert_eq!(code, -32000);
			}
			other => panic!("expected protocol error, got {other:?}"),
		}
	}

	#[test]
	fn test_dispatch_unknown_id_is_dropped() {
		let (parts, _controller) = FakeTransportBuilder::new().build();
		let connection = Connection::new(parts);

		connection.dispatch(RpcMessage::Response(RpcResponse {
			id: 999,
			result: Some(Value::Null),
			error: None,
		}));
		assert!(connection.callbacks.lock().is_empty());
	}

	#[tokio::test]
	async fn test_events_reach_listener_in_order() {
		let (parts, controller) = FakeTransportBuilder::new().build();
		let connection = Connection::new(parts).start();
		let mut events = connection.subscribe();

		controller.inject_event("Network.requestWillBeSent", json!({"n": 1}));
		controller.inject_event("Network.responseReceived", json!({"n": 2}));

		let first = events.recv().await.unwrap();
		let second = events.recv().await.unwrap();
		assert_eq!(first.method, "Network.requestWillBeSent");
		assert_eq!(second.params["n"], 2);
	}

	#[tokio::test]
	async fn test_timeout_removes_pending_entry() {
		let (parts, _controller) = FakeTransportBuilder::new().build();
		let connection = Connection::new(parts).with_timeout(Duration::from_millis(20)).start();

		let err = connection.send_message("Page.enable", json!({})).await.unwrap_err();
		assert!(err.is_timeout());
		assert!(connection.callbacks.lock().is_empty());
	}

	#[tokio::test]
	async fn test_close_rejects_pending_commands() {
		let (parts, controller) = FakeTransportBuilder::new().build();
		let connection = Connection::new(parts).start();
		let mut events = connection.subscribe();

		let conn = Arc::clone(&connection);
		let pending = tokio::spawn(async move { conn.send_message("DOM.getDocument", json!({})).await });

		controller.next_sent().await.unwrap();
		controller.close();

		let err = pending.await.unwrap().unwrap_err();
		assert!(err.is_closed());
		assert!(events.recv().await.is_none());
		assert!(connection.is_closed());
	}
}
