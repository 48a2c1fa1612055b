//! Transport layer for the inspector connection.
//!
//! A transport is split into two halves so the [`Connection`] can write
//! while a background task reads:
//! - [`Transport`]: serializes and writes outbound messages
//! - [`TransportReceiver`]: reads frames, decodes JSON and pushes every value
//!   into an unbounded channel in wire order
//!
//! [`WebSocketTransport`] is the production implementation. Tests use the
//! in-memory transport from [`crate::fake_transport`].
//!
//! [`Connection`]: crate::connection::Connection

use std::future::Future;
use std::pin::Pin;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, warn};

use crate::error::{Error, Result};

/// Outbound half of a transport.
pub trait Transport: Send {
	/// Serializes `message` and writes it to the wire.
	fn send(&mut self, message: Value) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;

	/// Closes the connection. Closing twice is not an error.
	fn close(&mut self) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;
}

/// Inbound half of a transport.
///
/// `run` completes when the peer closes the connection; dropping the
/// channel sender at that point is what tells the connection the stream
/// has ended.
pub trait TransportReceiver: Send {
	fn run(self: Box<Self>) -> Pin<Box<dyn Future<Output = Result<()>> + Send>>;
}

/// Both halves plus the channel the receiver feeds.
pub struct TransportParts {
	pub sender: Box<dyn Transport>,
	pub receiver: Box<dyn TransportReceiver>,
	pub message_rx: mpsc::UnboundedReceiver<Value>,
}

/// Opens transports for an address. The adapter owns one of these so tests
/// can substitute an in-memory connector.
pub trait Connector: Send + Sync {
	fn connect<'a>(&'a self, address: &'a str) -> Pin<Box<dyn Future<Output = Result<TransportParts>> + Send + 'a>>;
}

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// WebSocket connection to an inspector endpoint.
pub struct WebSocketTransport {
	stream: WsStream,
	message_tx: mpsc::UnboundedSender<Value>,
}

impl WebSocketTransport {
	/// Connects to `url` (e.g. `ws://127.0.0.1:8081/inspector/debug?device=0&page=1`).
	pub async fn connect(url: &str) -> Result<(Self, mpsc::UnboundedReceiver<Value>)> {
		let (stream, response) = tokio_tungstenite::connect_async(url)
			.await
			.map_err(|e| Error::Transport(format!("failed to connect to {url}: {e}")))?;
		debug!(target = "jsdap.transport", url, status = %response.status(), "inspector socket open");

		let (message_tx, message_rx) = mpsc::unbounded_channel();
		Ok((Self { stream, message_tx }, message_rx))
	}

	/// Splits the socket into the halves consumed by a connection.
	pub fn into_transport_parts(self, message_rx: mpsc::UnboundedReceiver<Value>) -> TransportParts {
		let (sink, stream) = self.stream.split();
		TransportParts {
			sender: Box::new(WebSocketSender { sink }),
			receiver: Box::new(WebSocketReceiver {
				stream,
				message_tx: self.message_tx,
			}),
			message_rx,
		}
	}
}

struct WebSocketSender {
	sink: SplitSink<WsStream, Message>,
}

impl Transport for WebSocketSender {
	fn send(&mut self, message: Value) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
		Box::pin(async move {
			let text = serde_json::to_string(&message)?;
			self.sink.send(Message::Text(text.into())).await?;
			Ok(())
		})
	}

	fn close(&mut self) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
		Box::pin(async move {
			match self.sink.close().await {
				Ok(()) | Err(WsError::ConnectionClosed | WsError::AlreadyClosed) => Ok(()),
				Err(e) => Err(e.into()),
			}
		})
	}
}

struct WebSocketReceiver {
	stream: SplitStream<WsStream>,
	message_tx: mpsc::UnboundedSender<Value>,
}

impl TransportReceiver for WebSocketReceiver {
	fn run(mut self: Box<Self>) -> Pin<Box<dyn Future<Output = Result<()>> + Send>> {
		Box::pin(async move {
			while let Some(frame) = self.stream.next().await {
				let frame = match frame {
					Ok(frame) => frame,
					Err(WsError::ConnectionClosed | WsError::AlreadyClosed) => break,
					Err(e) => return Err(e.into()),
				};

				let decoded = match frame {
					Message::Text(text) => serde_json::from_str::<Value>(&text),
					Message::Binary(bytes) => serde_json::from_slice::<Value>(&bytes),
					Message::Close(reason) => {
						debug!(target = "jsdap.transport", ?reason, "inspector closed the socket");
						break;
					}
					_ => continue,
				};

				match decoded {
					Ok(value) => {
						if self.message_tx.send(value).is_err() {
							break;
						}
					}
					Err(e) => warn!(target = "jsdap.transport", error = %e, "skipping non-JSON frame"),
				}
			}
			Ok(())
		})
	}
}

/// Production connector: one WebSocket per session.
#[derive(Debug, Default, Clone, Copy)]
pub struct WebSocketConnector;

impl Connector for WebSocketConnector {
	fn connect<'a>(&'a self, address: &'a str) -> Pin<Box<dyn Future<Output = Result<TransportParts>> + Send + 'a>> {
		Box::pin(async move {
			let (transport, message_rx) = WebSocketTransport::connect(address).await?;
			Ok(transport.into_transport_parts(message_rx))
		})
	}
}
