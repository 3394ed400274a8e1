//! Command routing through nested sub-target sessions.
//!
//! Sub-targets (iframes, workers) attached without flattening are only
//! reachable by wrapping a command in `Target.sendMessageToTarget`, once per
//! session in the chain. Their replies come back the same way, wrapped in
//! `Target.receivedMessageFromTarget` events, one level per session.
//!
//! # Wrapping
//!
//! For a chain `[s0, s1]` and command `C`:
//!
//! 1. `C` gets correlation id `a` and is serialized as the message for `s1`
//! 2. That `sendMessageToTarget(s1, ..)` gets id `b` and becomes the message for `s0`
//! 3. Only the outermost `sendMessageToTarget(s0, ..)` goes to the connection
//!
//! The caller waits on `a`. Id `b` is resolved by `s0`'s acknowledgement and
//! is awaited by nobody. Every id is registered in the pending table and
//! removed exactly once.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::{Value, json};
use tokio::sync::oneshot;
use tracing::{debug, trace, warn};
use wr_protocol::{Command, RpcMessage, RpcRequest, SendMessageToTarget};

use crate::connection::Connection;
use crate::error::{Error, Result};
use crate::session::SessionChain;

struct PendingReply {
	method: String,
	tx: oneshot::Sender<Result<Value>>,
}

/// Outcome of unwrapping one level of a wrapped message.
#[derive(Debug)]
pub enum Unwrapped {
	/// A reply; its pending entry (if any) was completed and removed.
	Reply { id: u64, matched: bool },
	/// A protocol event emitted inside the session.
	Event { method: String, params: Value },
}

/// Routes commands to the debuggee or through a chain of nested sessions.
pub struct SessionRouter {
	connection: Arc<Connection>,
	last_id: AtomicU64,
	pending: Mutex<HashMap<u64, PendingReply>>,
	timeout: Duration,
}

impl SessionRouter {
	pub fn new(connection: Arc<Connection>) -> Self {
		let timeout = connection.timeout();
		Self {
			connection,
			last_id: AtomicU64::new(0),
			pending: Mutex::new(HashMap::new()),
			timeout,
		}
	}

	pub fn with_timeout(mut self, timeout: Duration) -> Self {
		self.timeout = timeout;
		self
	}

	pub fn connection(&self) -> &Arc<Connection> {
		&self.connection
	}

	/// Number of wrapped commands still waiting for a reply.
	pub fn pending_count(&self) -> usize {
		self.pending.lock().len()
	}

	/// Sends a typed command along `chain` and decodes its reply.
	pub async fn send<C: Command>(&self, command: &C, chain: &SessionChain) -> Result<C::Response> {
		let params = serde_json::to_value(command)?;
		let result = self.send_raw(C::METHOD, params, chain).await?;
		Ok(serde_json::from_value(result)?)
	}

	/// Sends `method` along `chain`.
	///
	/// An empty chain goes straight to the debuggee. Otherwise the command is
	/// wrapped once per session, innermost first, and the reply is awaited
	/// on the innermost correlation id.
	pub async fn send_raw(&self, method: &str, params: Value, chain: &SessionChain) -> Result<Value> {
		if chain.is_root() {
			return self.connection.send_message(method, params).await;
		}

		let mut registered = Vec::with_capacity(chain.depth());
		let mut reply_rx = None;
		let mut method = method.to_string();
		let mut params = params;
		let original_method = method.clone();

		for session in chain.iter().rev() {
			let id = self.last_id.fetch_add(1, Ordering::SeqCst) + 1;
			let (tx, rx) = oneshot::channel();
			self.pending.lock().insert(id, PendingReply { method: method.clone(), tx });
			registered.push(id);
			if reply_rx.is_none() {
				reply_rx = Some(rx);
			}

			let message = serde_json::to_string(&RpcRequest { id, method, params })?;
			params = serde_json::to_value(SendMessageToTarget {
				session_id: session.clone(),
				message,
			})?;
			method = SendMessageToTarget::METHOD.to_string();
		}

		trace!(target = "wr.router", method = %original_method, %chain, ids = ?registered, "send wrapped");

		if let Err(e) = self.connection.send_message(&method, params).await {
			self.forget(&registered);
			return Err(e);
		}

		let Some(reply_rx) = reply_rx else {
			return Err(Error::ChannelClosed);
		};

		match tokio::time::timeout(self.timeout, reply_rx).await {
			Ok(Ok(result)) => result,
			Ok(Err(_)) => Err(Error::ChannelClosed),
			Err(_) => {
				self.forget(&registered);
				warn!(target = "wr.router", method = %original_method, %chain, "wrapped command timed out");
				Err(Error::Timeout { method: original_method })
			}
		}
	}

	/// Unwraps one level of a `Target.receivedMessageFromTarget` payload.
	///
	/// Replies complete their pending command (a reply nobody waits for is
	/// ignored). Events are returned for the caller to dispatch with the
	/// session appended to its chain.
	pub fn receive_from_target(&self, message: &str) -> Result<Unwrapped> {
		match RpcMessage::parse(message)? {
			RpcMessage::Response(response) => {
				let Some(pending) = self.pending.lock().remove(&response.id) else {
					debug!(target = "wr.router", id = response.id, "wrapped reply without pending command");
					return Ok(Unwrapped::Reply {
						id: response.id,
						matched: false,
					});
				};

				let result = match response.error {
					Some(error) => Err(Error::protocol(&pending.method, error)),
					None => Ok(response.result.unwrap_or(Value::Null)),
				};
				let _ = pending.tx.send(result);
				Ok(Unwrapped::Reply {
					id: response.id,
					matched: true,
				})
			}
			RpcMessage::Event(event) => Ok(Unwrapped::Event {
				method: event.method,
				params: event.params,
			}),
		}
	}

	/// Fails every outstanding wrapped command with [`Error::ChannelClosed`].
	pub fn reject_all(&self) {
		let pending: Vec<PendingReply> = self.pending.lock().drain().map(|(_, pending)| pending).collect();
		for reply in pending {
			let _ = reply.tx.send(Err(Error::ChannelClosed));
		}
	}

	fn forget(&self, ids: &[u64]) {
		let mut pending = self.pending.lock();
		for id in ids {
			pending.remove(id);
		}
	}
}

/// Wraps `message` (a serialized reply or event) as it would arrive from
/// the innermost session of `chain`, ready to inject at the top level.
///
/// Used by tests that play the part of the browser.
pub fn wrap_from_chain(message: Value, chain: &SessionChain) -> Value {
	let mut payload = message;
	for session in chain.iter().rev() {
		payload = json!({
			"method": "Target.receivedMessageFromTarget",
			"params": {
				"sessionId": session.as_str(),
				"message": payload.to_string(),
			}
		});
	}
	payload
}
