use thiserror::Error;
use wr_protocol::RpcError;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
	#[error("Transport error: {0}")]
	Transport(String),

	#[error("WebSocket error: {0}")]
	WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

	#[error("Protocol error {code} for {method}: {message}")]
	Protocol { method: String, code: i64, message: String },

	#[error("Timed out waiting for reply to {method}")]
	Timeout { method: String },

	#[error("Connection closed before a reply arrived")]
	ChannelClosed,

	#[error("Target closed: {0}")]
	TargetClosed(String),

	#[error("Serialization error: {0}")]
	Serde(#[from] serde_json::Error),
}

impl Error {
	pub(crate) fn protocol(method: &str, error: RpcError) -> Self {
		Self::Protocol {
			method: method.to_string(),
			code: error.code,
			message: error.message,
		}
	}

	pub fn is_timeout(&self) -> bool {
		matches!(self, Self::Timeout { .. })
	}

	/// `true` when the failure means the target or the channel to it is gone.
	pub fn is_closed(&self) -> bool {
		matches!(self, Self::ChannelClosed | Self::TargetClosed(_))
	}
}
