//! Fake transport for testing correlation, event routing and session
//! behavior without a JavaScript engine.
//!
//! # Example
//!
//! ```ignore
//! let (parts, controller) = FakeTransportBuilder::new().build();
//! let (connection, _events) = Connection::new(parts, ConnectionOptions::default());
//! let connection = Arc::new(connection);
//!
//! tokio::spawn({
//!     let conn = Arc::clone(&connection);
//!     async move { conn.run().await }
//! });
//!
//! let call = tokio::spawn({
//!     let conn = Arc::clone(&connection);
//!     async move { conn.call("Debugger.resume", json!({})).await }
//! });
//! let sent = controller.next_sent().await.unwrap();
//! controller.inject_reply(1, json!({}));
//! let result = call.await??;
//! ```

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde_json::Value as JsonValue;
use tokio::sync::{Mutex, Notify, mpsc};

use crate::error::{Error, Result};
use crate::transport::{Connector, Transport, TransportParts, TransportReceiver};

/// Builder for creating fake transport instances.
pub struct FakeTransportBuilder;

impl FakeTransportBuilder {
	pub fn new() -> Self {
		Self
	}

	/// Builds the fake transport and returns both parts and a controller.
	///
	/// Returns [`TransportParts`] for creating a [`Connection`] and a
	/// [`FakeTransportController`] for injecting replies/events and
	/// inspecting sent messages.
	///
	/// [`Connection`]: crate::connection::Connection
	pub fn build(self) -> (TransportParts, FakeTransportController) {
		let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
		let (message_tx, message_rx) = mpsc::unbounded_channel();
		let sent_messages = Arc::new(Mutex::new(Vec::new()));
		let closed = Arc::new(Notify::new());
		let (sent_tx, sent_rx) = mpsc::unbounded_channel();
		let write_budget = Arc::new(parking_lot::Mutex::new(None));

		let sender = FakeTransportSender {
			sent: Arc::clone(&sent_messages),
			sent_tx,
			closed: Arc::clone(&closed),
			write_budget: Arc::clone(&write_budget),
		};

		let receiver = FakeTransportReceiver {
			inbound_rx,
			message_tx,
			closed: Arc::clone(&closed),
		};

		let controller = FakeTransportController {
			inbound_tx,
			sent: sent_messages,
			sent_rx: Mutex::new(sent_rx),
			closed,
			write_budget,
		};

		let parts = TransportParts {
			sender: Box::new(sender),
			receiver: Box::new(receiver),
			message_rx,
		};

		(parts, controller)
	}
}

impl Default for FakeTransportBuilder {
	fn default() -> Self {
		Self::new()
	}
}

/// Controller for injecting replies/events and inspecting sent messages.
pub struct FakeTransportController {
	inbound_tx: mpsc::UnboundedSender<JsonValue>,
	sent: Arc<Mutex<Vec<JsonValue>>>,
	sent_rx: Mutex<mpsc::UnboundedReceiver<JsonValue>>,
	closed: Arc<Notify>,
	write_budget: Arc<parking_lot::Mutex<Option<usize>>>,
}

impl FakeTransportController {
	/// Injects a raw JSON message as if the engine had sent it.
	pub fn inject(&self, message: JsonValue) {
		let _ = self.inbound_tx.send(message);
	}

	/// Injects a reply with the given id and result.
	pub fn inject_reply(&self, id: u32, result: JsonValue) {
		self.inject(serde_json::json!({
			"id": id,
			"result": result
		}));
	}

	/// Injects an error reply.
	pub fn inject_error(&self, id: u32, code: i64, message: &str) {
		self.inject(serde_json::json!({
			"id": id,
			"error": {
				"code": code,
				"message": message
			}
		}));
	}

	/// Injects an event.
	pub fn inject_event(&self, method: &str, params: JsonValue) {
		self.inject(serde_json::json!({
			"method": method,
			"params": params
		}));
	}

	/// Simulates the engine closing the socket.
	pub fn close(&self) {
		self.closed.notify_one();
	}

	/// Lets `count` more writes succeed; every write after that fails.
	pub fn fail_writes_after(&self, count: usize) {
		*self.write_budget.lock() = Some(count);
	}

	/// Takes all sent messages, clearing the buffer.
	pub async fn take_sent(&self) -> Vec<JsonValue> {
		std::mem::take(&mut *self.sent.lock().await)
	}

	/// Waits for the next outbound message, in send order.
	///
	/// Unlike [`take_sent`](Self::take_sent) this does not race the task
	/// issuing the command.
	pub async fn next_sent(&self) -> Option<JsonValue> {
		self.sent_rx.lock().await.recv().await
	}
}

struct FakeTransportSender {
	sent: Arc<Mutex<Vec<JsonValue>>>,
	sent_tx: mpsc::UnboundedSender<JsonValue>,
	closed: Arc<Notify>,
	write_budget: Arc<parking_lot::Mutex<Option<usize>>>,
}

impl Transport for FakeTransportSender {
	fn send(&mut self, message: JsonValue) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
		let sent = Arc::clone(&self.sent);
		let sent_tx = self.sent_tx.clone();
		let exhausted = match self.write_budget.lock().as_mut() {
			Some(0) => true,
			Some(remaining) => {
				*remaining -= 1;
				false
			}
			None => false,
		};
		Box::pin(async move {
			if exhausted {
				return Err(Error::Transport("write failed".to_string()));
			}
			sent.lock().await.push(message.clone());
			let _ = sent_tx.send(message);
			Ok(())
		})
	}

	fn close(&mut self) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
		let closed = Arc::clone(&self.closed);
		Box::pin(async move {
			closed.notify_one();
			Ok(())
		})
	}
}

struct FakeTransportReceiver {
	inbound_rx: mpsc::UnboundedReceiver<JsonValue>,
	message_tx: mpsc::UnboundedSender<JsonValue>,
	closed: Arc<Notify>,
}

impl TransportReceiver for FakeTransportReceiver {
	fn run(mut self: Box<Self>) -> Pin<Box<dyn Future<Output = Result<()>> + Send>> {
		Box::pin(async move {
			loop {
				tokio::select! {
					message = self.inbound_rx.recv() => {
						let Some(message) = message else { break };
						if self.message_tx.send(message).is_err() {
							break;
						}
					}
					_ = self.closed.notified() => break,
				}
			}
			Ok(())
		})
	}
}

/// Connector that hands out one prepared fake transport.
pub struct FakeConnector {
	parts: parking_lot::Mutex<Option<TransportParts>>,
	addresses: parking_lot::Mutex<Vec<String>>,
}

impl FakeConnector {
	pub fn new(parts: TransportParts) -> Self {
		Self {
			parts: parking_lot::Mutex::new(Some(parts)),
			addresses: parking_lot::Mutex::new(Vec::new()),
		}
	}

	/// A connector whose every connect attempt fails.
	pub fn refusing() -> Self {
		Self {
			parts: parking_lot::Mutex::new(None),
			addresses: parking_lot::Mutex::new(Vec::new()),
		}
	}

	/// Addresses passed to `connect`, in call order.
	pub fn addresses(&self) -> Vec<String> {
		self.addresses.lock().clone()
	}
}

impl Connector for FakeConnector {
	fn connect<'a>(&'a self, address: &'a str) -> Pin<Box<dyn Future<Output = Result<TransportParts>> + Send + 'a>> {
		Box::pin(async move {
			self.addresses.lock().push(address.to_string());
			self.parts
				.lock()
				.take()
				.ok_or_else(|| Error::Transport(format!("connection refused: {address}")))
		})
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::connection::{Connection, ConnectionEvent, ConnectionOptions};

	#[tokio::test]
	async fn test_fake_transport_send_capture() {
		let (parts, controller) = FakeTransportBuilder::new().build();
		let (connection, _events) = Connection::new(parts, ConnectionOptions::default());
		let connection = Arc::new(connection);

		let conn_clone = Arc::clone(&connection);
		tokio::spawn(async move {
			conn_clone.run().await;
		});

		let conn = Arc::clone(&connection);
		let call = tokio::spawn(async move { conn.call("Debugger.setBlackboxPatterns", serde_json::json!({"patterns": []})).await });

		let outbound = controller.next_sent().await.unwrap();
		controller.inject_reply(1, serde_json::json!({}));

		let result = call.await.unwrap().unwrap();
		assert!(result.is_object());
		assert_eq!(outbound["id"], 1);

		let sent = controller.take_sent().await;
		assert_eq!(sent.len(), 1);
		assert_eq!(sent[0]["method"], "Debugger.setBlackboxPatterns");
		assert_eq!(sent[0]["params"]["patterns"], serde_json::json!([]));
		assert_eq!(sent[0]["id"], 1);
	}

	#[tokio::test]
	async fn test_fake_transport_error_reply() {
		let (parts, controller) = FakeTransportBuilder::new().build();
		let (connection, _events) = Connection::new(parts, ConnectionOptions::default());
		let connection = Arc::new(connection);

		let conn_clone = Arc::clone(&connection);
		tokio::spawn(async move {
			conn_clone.run().await;
		});

		let conn = Arc::clone(&connection);
		let call = tokio::spawn(async move { conn.call("Debugger.setBreakpointByUrl", serde_json::json!({"lineNumber": 1})).await });

		controller.next_sent().await.unwrap();
		controller.inject_error(1, -32000, "Breakpoint at specified location already exists.");

		match call.await.unwrap() {
			Err(Error::Inspector { code, message }) => {
				assert_eq!(code, -32000);
				assert!(message.contains("already exists"));
			}
			other => panic!("Expected Inspector error, got {other:?}"),
		}
	}

	#[tokio::test]
	async fn test_fake_transport_event_injection() {
		let (parts, controller) = FakeTransportBuilder::new().build();
		let (connection, mut events) = Connection::new(parts, ConnectionOptions::default());
		let connection = Arc::new(connection);

		let conn_clone = Arc::clone(&connection);
		tokio::spawn(async move {
			conn_clone.run().await;
		});

		controller.inject_event("Debugger.resumed", serde_json::json!({}));

		match events.recv().await {
			Some(ConnectionEvent::Event(event)) => assert_eq!(event.method, "Debugger.resumed"),
			other => panic!("Expected event, got {other:?}"),
		}
	}

	#[tokio::test]
	async fn test_fake_transport_close_ends_stream() {
		let (parts, controller) = FakeTransportBuilder::new().build();
		let (connection, mut events) = Connection::new(parts, ConnectionOptions::default());
		let connection = Arc::new(connection);

		let conn_clone = Arc::clone(&connection);
		let run = tokio::spawn(async move {
			conn_clone.run().await;
		});

		controller.close();

		assert!(matches!(events.recv().await, Some(ConnectionEvent::Closed)));
		run.await.unwrap();
	}

	#[tokio::test]
	async fn test_fake_connector_hands_out_parts_once() {
		let (parts, _controller) = FakeTransportBuilder::new().build();
		let connector = FakeConnector::new(parts);

		assert!(connector.connect("ws://engine/1").await.is_ok());
		let second = connector.connect("ws://engine/2").await;
		assert!(matches!(second, Err(Error::Transport(_))));
		assert_eq!(connector.addresses(), vec!["ws://engine/1".to_string(), "ws://engine/2".to_string()]);
	}
}
