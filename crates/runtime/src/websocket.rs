//! WebSocket transport to a DevTools endpoint (`ws://host:port/devtools/page/<id>`).

use std::future::Future;
use std::pin::Pin;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::transport::{Transport, TransportParts, TransportReceiver};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Connects DevTools WebSocket endpoints.
pub struct WebSocketTransport;

impl WebSocketTransport {
	/// Opens `url` and returns the transport halves.
	pub async fn connect(url: &str) -> Result<TransportParts> {
		let (socket, _response) = tokio_tungstenite::connect_async(url).await?;
		debug!(target = "wr.transport", %url, "websocket connected");

		let (sink, stream) = socket.split();
		let (message_tx, message_rx) = mpsc::unbounded_channel();

		Ok(TransportParts {
			sender: Box::new(WebSocketSender { sink }),
			receiver: Box::new(WebSocketReceiver { stream, message_tx }),
			message_rx,
		})
	}
}

struct WebSocketSender {
	sink: SplitSink<Socket, Message>,
}

impl Transport for WebSocketSender {
	fn send(&mut self, message: Value) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
		Box::pin(async move {
			self.sink.send(Message::Text(message.to_string())).await?;
			Ok(())
		})
	}

	fn close(&mut self) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
		Box::pin(async move {
			self.sink.close().await?;
			Ok(())
		})
	}
}

struct WebSocketReceiver {
	stream: SplitStream<Socket>,
	message_tx: mpsc::UnboundedSender<Value>,
}

impl TransportReceiver for WebSocketReceiver {
	fn run(mut self: Box<Self>) -> Pin<Box<dyn Future<Output = Result<()>> + Send>> {
		Box::pin(async move {
			while let Some(frame) = self.stream.next().await {
				let value = match frame? {
					Message::Text(text) => serde_json::from_str::<Value>(&text),
					Message::Binary(bytes) => serde_json::from_slice::<Value>(&bytes),
					Message::Close(frame) => {
						debug!(target = "wr.transport", ?frame, "websocket closed by peer");
						break;
					}
					_ => continue,
				};

				match value {
					Ok(value) => {
						if self.message_tx.send(value).is_err() {
							break;
						}
					}
					Err(e) => warn!(target = "wr.transport", error = %e, "dropping unparseable frame"),
				}
			}
			Ok::<(), Error>(())
		})
	}
}
