//! JSON-RPC envelopes exchanged with the debugging endpoint.
//!
//! The same shapes are used at the top level (between the client and the
//! debuggee) and inside `Target.sendMessageToTarget` /
//! `Target.receivedMessageFromTarget` envelopes, where they are carried as
//! serialized strings.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Outgoing command.
///
/// ```json
/// { "id": 42, "method": "Network.enable", "params": {} }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcRequest {
	pub id: u64,
	pub method: String,
	#[serde(default)]
	pub params: Value,
}

/// Structured error reported by the protocol for a failed command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcError {
	#[serde(default)]
	pub code: i64,
	pub message: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub data: Option<String>,
}

/// Reply to a command, correlated by `id`.
///
/// Exactly one of `result` or `error` is present on the wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcResponse {
	pub id: u64,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub result: Option<Value>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub error: Option<RpcError>,
}

/// Unsolicited event. Distinguished from replies by the absence of `id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcEvent {
	pub method: String,
	#[serde(default)]
	pub params: Value,
}

/// Discriminated union of incoming messages.
///
/// Uses serde's `untagged` so messages with an `id` are replies and
/// messages without one are events.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RpcMessage {
	Response(RpcResponse),
	Event(RpcEvent),
}

impl RpcMessage {
	/// Parses a serialized envelope, as carried inside `Target.receivedMessageFromTarget`.
	pub fn parse(message: &str) -> Result<Self, serde_json::Error> {
		serde_json::from_str(message)
	}
}
