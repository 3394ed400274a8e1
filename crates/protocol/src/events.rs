//! Events the recorder consumes, parsed into a closed enum.
//!
//! [`Event::parse`] maps a method name onto its typed params; anything the
//! recorder does not handle lands in [`Event::Other`] instead of failing.

use serde::Deserialize;
use serde_json::Value;

use crate::types::{FrameId, HeaderEntry, Headers, InterceptionId, RequestId, SessionId, TargetId};

/// Network-domain request description.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkRequest {
	pub url: String,
	pub method: String,
	#[serde(default)]
	pub headers: Headers,
	#[serde(default)]
	pub has_post_data: Option<bool>,
	#[serde(default)]
	pub post_data: Option<String>,
}

/// Network-domain response description.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkResponse {
	pub url: String,
	pub status: u16,
	#[serde(default)]
	pub status_text: String,
	#[serde(default)]
	pub headers: Headers,
	#[serde(default)]
	pub mime_type: String,
	#[serde(default)]
	pub protocol: Option<String>,
	#[serde(default, rename = "remoteIPAddress")]
	pub remote_ip_address: Option<String>,
	#[serde(default)]
	pub from_service_worker: Option<bool>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestWillBeSent {
	pub request_id: RequestId,
	pub request: NetworkRequest,
	#[serde(default)]
	pub redirect_response: Option<NetworkResponse>,
	#[serde(default, rename = "type")]
	pub resource_type: Option<String>,
	#[serde(default)]
	pub wall_time: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseReceived {
	pub request_id: RequestId,
	pub response: NetworkResponse,
	#[serde(default, rename = "type")]
	pub resource_type: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseReceivedExtraInfo {
	pub request_id: RequestId,
	#[serde(default)]
	pub headers: Headers,
	#[serde(default)]
	pub status_code: Option<u16>,
	#[serde(default)]
	pub headers_text: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadingFinished {
	pub request_id: RequestId,
	#[serde(default)]
	pub encoded_data_length: f64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadingFailed {
	pub request_id: RequestId,
	#[serde(default)]
	pub error_text: String,
	#[serde(default)]
	pub canceled: Option<bool>,
}

/// `Fetch.requestPaused`: a response held before delivery to the page.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestPaused {
	pub request_id: InterceptionId,
	pub request: NetworkRequest,
	#[serde(default)]
	pub frame_id: Option<FrameId>,
	#[serde(default)]
	pub resource_type: Option<String>,
	#[serde(default)]
	pub response_error_reason: Option<String>,
	#[serde(default)]
	pub response_status_code: Option<u16>,
	#[serde(default)]
	pub response_status_text: Option<String>,
	#[serde(default)]
	pub response_headers: Option<Vec<HeaderEntry>>,
	#[serde(default)]
	pub network_id: Option<RequestId>,
}

impl RequestPaused {
	/// Paused at the response stage, i.e. carries a status or an error reason.
	pub fn is_response_stage(&self) -> bool {
		self.response_status_code.is_some() || self.response_error_reason.is_some()
	}
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Frame {
	pub id: FrameId,
	#[serde(default)]
	pub parent_id: Option<FrameId>,
	pub url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FrameNavigated {
	pub frame: Frame,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoadEventFired {
	#[serde(default)]
	pub timestamp: f64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NavigatedWithinDocument {
	pub frame_id: FrameId,
	pub url: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetInfo {
	pub target_id: TargetId,
	#[serde(rename = "type")]
	pub target_type: String,
	#[serde(default)]
	pub url: String,
	#[serde(default)]
	pub title: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttachedToTarget {
	pub session_id: SessionId,
	pub target_info: TargetInfo,
	#[serde(default)]
	pub waiting_for_debugger: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetachedFromTarget {
	pub session_id: SessionId,
	#[serde(default)]
	pub target_id: Option<TargetId>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReceivedMessageFromTarget {
	pub session_id: SessionId,
	/// Serialized [`RpcMessage`](crate::RpcMessage).
	pub message: String,
	#[serde(default)]
	pub target_id: Option<TargetId>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallFrame {
	#[serde(default)]
	pub call_frame_id: String,
	#[serde(default)]
	pub function_name: String,
	#[serde(default)]
	pub url: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DebuggerPaused {
	#[serde(default)]
	pub call_frames: Vec<CallFrame>,
	#[serde(default)]
	pub reason: String,
	#[serde(default)]
	pub data: Option<Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct InspectorDetached {
	#[serde(default)]
	pub reason: String,
}

macro_rules! events {
	($($variant:ident => $method:literal),+ $(,)?) => {
		/// Incoming protocol event, closed over the methods the recorder handles.
		#[derive(Debug, Clone)]
		pub enum Event {
			$($variant($variant),)+
			/// Any other method. Kept so unknown events are visible, not errors.
			Other { method: String, params: Value },
		}

		impl Event {
			/// Parses `params` according to `method`.
			pub fn parse(method: &str, params: Value) -> Result<Self, serde_json::Error> {
				match method {
					$($method => serde_json::from_value(params).map(Self::$variant),)+
					_ => Ok(Self::Other {
						method: method.to_string(),
						params,
					}),
				}
			}

			pub fn method(&self) -> &str {
				match self {
					$(Self::$variant(_) => $method,)+
					Self::Other { method, .. } => method,
				}
			}
		}
	};
}

events! {
	RequestWillBeSent => "Network.requestWillBeSent",
	ResponseReceived => "Network.responseReceived",
	ResponseReceivedExtraInfo => "Network.responseReceivedExtraInfo",
	LoadingFinished => "Network.loadingFinished",
	LoadingFailed => "Network.loadingFailed",
	RequestPaused => "Fetch.requestPaused",
	FrameNavigated => "Page.frameNavigated",
	LoadEventFired => "Page.loadEventFired",
	NavigatedWithinDocument => "Page.navigatedWithinDocument",
	AttachedToTarget => "Target.attachedToTarget",
	DetachedFromTarget => "Target.detachedFromTarget",
	ReceivedMessageFromTarget => "Target.receivedMessageFromTarget",
	DebuggerPaused => "Debugger.paused",
	InspectorDetached => "Inspector.detached",
}

/// Method name of `Inspector.targetCrashed`, which carries no params.
pub const TARGET_CRASHED: &str = "Inspector.targetCrashed";

#[cfg(test)]
mod tests {
	use serde_json::json;

	use super::*;

	#[test]
	fn parses_known_event_into_variant() {
		let event = Event::parse(
			"Network.requestWillBeSent",
			json!({
				"requestId": "1000.1",
				"request": {"url": "https://example.com/", "method": "POST", "headers": {"Accept": "*/*"}, "hasPostData": true},
				"type": "Document"
			}),
		)
		.unwrap();

		let Event::RequestWillBeSent(sent) = &event else {
			panic!("expected RequestWillBeSent, got {event:?}");
		};
		assert_eq!(sent.request_id.as_str(), "1000.1");
		assert_eq!(sent.request.method, "POST");
		assert_eq!(sent.request.has_post_data, Some(true));
		assert_eq!(sent.resource_type.as_deref(), Some("Document"));
		assert_eq!(event.method(), "Network.requestWillBeSent");
	}

	#[test]
	fn unknown_method_is_kept_as_other() {
		let event = Event::parse("Page.domContentEventFired", json!({"timestamp": 1})).unwrap();
		assert!(matches!(&event, Event::Other { method, .. } if method == "Page.domContentEventFired"));
		assert_eq!(event.method(), "Page.domContentEventFired");
	}

	#[test]
	fn malformed_known_event_is_an_error() {
		assert!(Event::parse("Network.loadingFinished", json!({"nope": 1})).is_err());
	}

	#[test]
	fn request_paused_detects_response_stage() {
		let Event::RequestPaused(paused) = Event::parse(
			"Fetch.requestPaused",
			json!({
				"requestId": "interception-job-1.0",
				"request": {"url": "https://example.com/a.m3u8", "method": "GET", "headers": {}},
				"responseStatusCode": 200,
				"responseHeaders": [{"name": "Content-Type", "value": "application/vnd.apple.mpegurl"}],
				"networkId": "1000.2"
			}),
		)
		.unwrap() else {
			panic!("expected RequestPaused");
		};
		assert!(paused.is_response_stage());
		assert_eq!(paused.network_id.unwrap().as_str(), "1000.2");
	}

	#[test]
	fn remote_ip_uses_protocol_spelling() {
		let response: NetworkResponse = serde_json::from_value(json!({
			"url": "https://example.com/",
			"status": 200,
			"remoteIPAddress": "93.184.216.34"
		}))
		.unwrap();
		assert_eq!(response.remote_ip_address.as_deref(), Some("93.184.216.34"));
	}
}
