//! Commands the recorder issues, with their typed replies.
//!
//! Each command is a serializable params struct implementing [`Command`],
//! which binds the protocol method name and the reply shape together so
//! callers cannot pair a method with the wrong params.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::types::{HeaderEntry, InterceptionId, RequestId, SessionId};

/// A protocol command: params shape, method name, and reply shape.
pub trait Command: Serialize {
	const METHOD: &'static str;
	type Response: DeserializeOwned;
}

/// Reply of commands that return nothing the recorder uses.
///
/// Any result is accepted, `null` and unknown fields such as
/// `Debugger.enable`'s `debuggerId` included.
#[derive(Debug, Clone, Default)]
pub struct Empty {}

impl<'de> Deserialize<'de> for Empty {
	fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
		serde::de::IgnoredAny::deserialize(deserializer)?;
		Ok(Self {})
	}
}

macro_rules! command {
	($ty:ident, $method:literal, $response:ty) => {
		impl Command for $ty {
			const METHOD: &'static str = $method;
			type Response = $response;
		}
	};
}

// ---------------------------------------------------------------------------
// Network

#[derive(Debug, Clone, Default, Serialize)]
pub struct NetworkEnable {}
command!(NetworkEnable, "Network.enable", Empty);

#[derive(Debug, Clone, Default, Serialize)]
pub struct NetworkDisable {}
command!(NetworkDisable, "Network.disable", Empty);

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SetCacheDisabled {
	pub cache_disabled: bool,
}
command!(SetCacheDisabled, "Network.setCacheDisabled", Empty);

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GetResponseBody {
	pub request_id: RequestId,
}
command!(GetResponseBody, "Network.getResponseBody", ResponseBody);

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GetRequestPostData {
	pub request_id: RequestId,
}
command!(GetRequestPostData, "Network.getRequestPostData", RequestPostData);

/// Body returned by `Network.getResponseBody` and `Fetch.getResponseBody`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseBody {
	pub body: String,
	#[serde(default)]
	pub base64_encoded: bool,
}

impl ResponseBody {
	/// Decodes the body into raw bytes, honoring `base64Encoded`.
	pub fn into_bytes(self) -> Result<Vec<u8>, base64::DecodeError> {
		if self.base64_encoded {
			STANDARD.decode(self.body.as_bytes())
		} else {
			Ok(self.body.into_bytes())
		}
	}
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestPostData {
	pub post_data: String,
}

// ---------------------------------------------------------------------------
// Fetch

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestPattern {
	pub url_pattern: String,
	pub request_stage: RequestStage,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RequestStage {
	Request,
	Response,
}

#[derive(Debug, Clone, Serialize)]
pub struct FetchEnable {
	pub patterns: Vec<RequestPattern>,
}
command!(FetchEnable, "Fetch.enable", Empty);

impl FetchEnable {
	/// Intercepts every response before it reaches the page.
	pub fn all_responses() -> Self {
		Self {
			patterns: vec![RequestPattern {
				url_pattern: "*".to_string(),
				request_stage: RequestStage::Response,
			}],
		}
	}
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct FetchDisable {}
command!(FetchDisable, "Fetch.disable", Empty);

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContinueRequest {
	pub request_id: InterceptionId,
}
command!(ContinueRequest, "Fetch.continueRequest", Empty);

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FulfillRequest {
	pub request_id: InterceptionId,
	pub response_code: u16,
	pub response_headers: Vec<HeaderEntry>,
	/// Base64-encoded body.
	pub body: String,
}
command!(FulfillRequest, "Fetch.fulfillRequest", Empty);

impl FulfillRequest {
	pub fn new(request_id: InterceptionId, response_code: u16, response_headers: Vec<HeaderEntry>, body: &[u8]) -> Self {
		Self {
			request_id,
			response_code,
			response_headers,
			body: STANDARD.encode(body),
		}
	}
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FetchGetResponseBody {
	pub request_id: InterceptionId,
}
command!(FetchGetResponseBody, "Fetch.getResponseBody", ResponseBody);

// ---------------------------------------------------------------------------
// Page

#[derive(Debug, Clone, Default, Serialize)]
pub struct PageEnable {}
command!(PageEnable, "Page.enable", Empty);

#[derive(Debug, Clone, Serialize)]
pub struct AddScriptToEvaluateOnNewDocument {
	pub source: String,
}
command!(AddScriptToEvaluateOnNewDocument, "Page.addScriptToEvaluateOnNewDocument", Empty);

#[derive(Debug, Clone, Default, Serialize)]
pub struct GetNavigationHistory {}
command!(GetNavigationHistory, "Page.getNavigationHistory", NavigationHistory);

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NavigationHistory {
	pub current_index: usize,
	#[serde(default)]
	pub entries: Vec<NavigationEntry>,
}

impl NavigationHistory {
	pub fn current(&self) -> Option<&NavigationEntry> {
		self.entries.get(self.current_index)
	}

	/// `true` when the current entry is the top of the history stack.
	pub fn at_top(&self) -> bool {
		self.current_index + 1 == self.entries.len()
	}
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NavigationEntry {
	#[serde(default)]
	pub id: i64,
	pub url: String,
	#[serde(default)]
	pub title: String,
}

// ---------------------------------------------------------------------------
// DOM / Debugger / Runtime

#[derive(Debug, Clone, Serialize)]
pub struct GetDocument {
	pub depth: i32,
	pub pierce: bool,
}
command!(GetDocument, "DOM.getDocument", Document);

impl GetDocument {
	/// Whole tree, piercing iframes and shadow roots.
	pub fn full() -> Self {
		Self { depth: -1, pierce: true }
	}
}

/// DOM snapshot. The node tree is kept as raw JSON for the text extractor.
#[derive(Debug, Clone, Deserialize)]
pub struct Document {
	pub root: Value,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct DebuggerEnable {}
command!(DebuggerEnable, "Debugger.enable", Empty);

#[derive(Debug, Clone, Default, Serialize)]
pub struct DebuggerResume {}
command!(DebuggerResume, "Debugger.resume", Empty);

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SetEventListenerBreakpoint {
	pub event_name: String,
}
command!(SetEventListenerBreakpoint, "DOMDebugger.setEventListenerBreakpoint", Empty);

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoveEventListenerBreakpoint {
	pub event_name: String,
}
command!(RemoveEventListenerBreakpoint, "DOMDebugger.removeEventListenerBreakpoint", Empty);

#[derive(Debug, Clone, Default, Serialize)]
pub struct RunIfWaitingForDebugger {}
command!(RunIfWaitingForDebugger, "Runtime.runIfWaitingForDebugger", Empty);

#[derive(Debug, Clone, Serialize)]
pub struct Evaluate {
	pub expression: String,
}
command!(Evaluate, "Runtime.evaluate", Empty);

// ---------------------------------------------------------------------------
// Target

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SetAutoAttach {
	pub auto_attach: bool,
	pub wait_for_debugger_on_start: bool,
	pub flatten: bool,
}
command!(SetAutoAttach, "Target.setAutoAttach", Empty);

impl SetAutoAttach {
	/// Attach to every new sub-target, paused, with nested (non-flattened) sessions.
	pub fn nested_paused() -> Self {
		Self {
			auto_attach: true,
			wait_for_debugger_on_start: true,
			flatten: false,
		}
	}
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMessageToTarget {
	pub session_id: SessionId,
	/// Serialized [`RpcRequest`](crate::RpcRequest).
	pub message: String,
}
command!(SendMessageToTarget, "Target.sendMessageToTarget", Empty);

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DetachFromTarget {
	pub session_id: SessionId,
}
command!(DetachFromTarget, "Target.detachFromTarget", Empty);

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn params_serialize_in_camel_case() {
		let value = serde_json::to_value(SetAutoAttach::nested_paused()).unwrap();
		assert_eq!(value["autoAttach"], true);
		assert_eq!(value["waitForDebuggerOnStart"], true);
		assert_eq!(value["flatten"], false);

		let value = serde_json::to_value(FetchEnable::all_responses()).unwrap();
		assert_eq!(value["patterns"][0]["urlPattern"], "*");
		assert_eq!(value["patterns"][0]["requestStage"], "Response");
	}

	#[test]
	fn empty_params_serialize_as_object() {
		assert_eq!(serde_json::to_value(NetworkEnable {}).unwrap(), serde_json::json!({}));
	}

	#[test]
	fn empty_reply_accepts_any_result() {
		serde_json::from_value::<Empty>(serde_json::json!({})).unwrap();
		serde_json::from_value::<Empty>(serde_json::json!({"debuggerId": "dbg-1"})).unwrap();
		serde_json::from_value::<Empty>(serde_json::Value::Null).unwrap();
	}

	#[test]
	fn response_body_decodes_base64_and_text() {
		let body: ResponseBody = serde_json::from_value(serde_json::json!({"body": "aGVsbG8=", "base64Encoded": true})).unwrap();
		assert_eq!(body.into_bytes().unwrap(), b"hello");

		let body: ResponseBody = serde_json::from_value(serde_json::json!({"body": "plain", "base64Encoded": false})).unwrap();
		assert_eq!(body.into_bytes().unwrap(), b"plain");
	}

	#[test]
	fn fulfill_encodes_body() {
		let fulfill = FulfillRequest::new(InterceptionId::new("interception-1"), 200, vec![], b"hi");
		assert_eq!(fulfill.body, "aGk=");
		let value = serde_json::to_value(&fulfill).unwrap();
		assert_eq!(value["requestId"], "interception-1");
		assert_eq!(value["responseCode"], 200);
	}

	#[test]
	fn navigation_history_locates_current_entry() {
		let history: NavigationHistory = serde_json::from_value(serde_json::json!({
			"currentIndex": 1,
			"entries": [
				{"id": 1, "url": "https://a.example/", "title": "A"},
				{"id": 2, "url": "https://b.example/", "title": ""}
			]
		}))
		.unwrap();
		assert_eq!(history.current().unwrap().url, "https://b.example/");
		assert!(history.at_top());
	}
}
