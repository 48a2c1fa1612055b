//! Command/reply correlation layer for the inspector protocol.
//!
//! This module sits on top of the transport and handles:
//! - Generating correlation ids (first id is 1, strictly increasing)
//! - Correlating replies with pending commands
//! - Distinguishing events from replies
//! - Forwarding events to the session, in wire order
//! - Failing every pending command when the transport closes
//!
//! # Message Flow
//!
//! 1. Caller invokes `call()` (or `send_command()` + `wait()`) with a method and params
//! 2. Connection allocates an id and registers a oneshot channel
//! 3. Command is serialized and written via the transport
//! 4. Caller awaits the oneshot receiver
//! 5. Message loop receives the reply from the transport
//! 6. Reply is correlated by id and sent through the oneshot channel
//! 7. Caller receives the result, or the engine's error
//!
//! Messages without an `id` are events and are forwarded as
//! [`ConnectionEvent::Event`]. When the inbound stream ends, a single
//! [`ConnectionEvent::Closed`] follows the last event.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use jsdap_protocol::cdp::{Command, ErrorPayload, Event, Message};
use parking_lot::Mutex;
use serde::Deserialize;
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, trace, warn};

use crate::error::{Error, Result};
use crate::transport::{Transport, TransportParts, TransportReceiver};

/// Default time to wait for a reply before failing the command.
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy)]
pub struct ConnectionOptions {
	/// `None` waits forever
	pub command_timeout: Option<Duration>,
}

impl Default for ConnectionOptions {
	fn default() -> Self {
		Self {
			command_timeout: Some(DEFAULT_COMMAND_TIMEOUT),
		}
	}
}

/// What the connection forwards to its owner.
#[derive(Debug)]
pub enum ConnectionEvent {
	Event(Event),
	/// The transport ended; sent exactly once
	Closed,
}

type ReplySender = oneshot::Sender<Result<Value>>;

#[derive(Default)]
struct PendingTable {
	closed: bool,
	calls: HashMap<u32, ReplySender>,
}

/// A command that has been written to the wire and awaits its reply.
#[derive(Debug)]
pub struct PendingCall {
	id: u32,
	method: String,
	rx: oneshot::Receiver<Result<Value>>,
}

impl PendingCall {
	pub fn id(&self) -> u32 {
		self.id
	}

	pub fn method(&self) -> &str {
		&self.method
	}
}

/// Inspector connection.
///
/// Shared across tasks behind an `Arc`; multiple commands may be
/// outstanding at once and each is awaited independently.
///
/// - `AtomicU32` for id generation
/// - `parking_lot::Mutex<HashMap>` for the pending table, never held across an await
/// - `tokio::sync::Mutex` around the transport so writes are not interleaved
/// - `tokio::sync::oneshot` for reply delivery
pub struct Connection {
	/// Last id handed out (0 before the first command)
	last_id: AtomicU32,
	pending: Mutex<PendingTable>,
	sender: tokio::sync::Mutex<Box<dyn Transport>>,
	/// Taken by `run`
	inbound: Mutex<Option<(Box<dyn TransportReceiver>, mpsc::UnboundedReceiver<Value>)>>,
	events: mpsc::UnboundedSender<ConnectionEvent>,
	options: ConnectionOptions,
}

impl Connection {
	/// Creates a connection over `parts`, returning the receiver on which
	/// events and the final close notification are delivered.
	pub fn new(parts: TransportParts, options: ConnectionOptions) -> (Self, mpsc::UnboundedReceiver<ConnectionEvent>) {
		let (events, events_rx) = mpsc::unbounded_channel();
		let connection = Self {
			last_id: AtomicU32::new(0),
			pending: Mutex::new(PendingTable::default()),
			sender: tokio::sync::Mutex::new(parts.sender),
			inbound: Mutex::new(Some((parts.receiver, parts.message_rx))),
			events,
			options,
		};
		(connection, events_rx)
	}

	fn next_id(&self) -> u32 {
		self.last_id.fetch_add(1, Ordering::SeqCst) + 1
	}

	/// Sends a command and awaits its reply.
	///
	/// Fails if the transport write fails, the engine answers with an error,
	/// the connection closes first, or the command timeout elapses.
	pub async fn call(&self, method: &str, params: Value) -> Result<Value> {
		let pending = self.send_command(method, params).await?;
		self.wait(pending).await
	}

	/// Writes a command without waiting for the reply.
	///
	/// The id is allocated while the transport is held, so ids appear on
	/// the wire in increasing order.
	pub async fn send_command(&self, method: &str, params: Value) -> Result<PendingCall> {
		let mut sender = self.sender.lock().await;

		let id = self.next_id();
		let (tx, rx) = oneshot::channel();
		{
			let mut pending = self.pending.lock();
			if pending.closed {
				return Err(Error::ConnectionClosed);
			}
			pending.calls.insert(id, tx);
		}

		let command = Command {
			id,
			method: method.to_string(),
			params,
		};
		trace!(target = "jsdap.connection", id, method, "sending command");

		let written = match serde_json::to_value(&command) {
			Ok(value) => sender.send(value).await,
			Err(e) => Err(e.into()),
		};
		if let Err(e) = written {
			self.pending.lock().calls.remove(&id);
			return Err(e);
		}

		Ok(PendingCall {
			id,
			method: command.method,
			rx,
		})
	}

	/// Drops a command nobody will wait for.
	pub fn abandon(&self, call: PendingCall) {
		if self.pending.lock().calls.remove(&call.id).is_some() {
			trace!(target = "jsdap.connection", id = call.id, method = %call.method, "abandoned command");
		}
	}

	/// Waits for the reply to a command sent with [`send_command`](Self::send_command).
	pub async fn wait(&self, call: PendingCall) -> Result<Value> {
		let PendingCall { id, method, rx } = call;

		let outcome = match self.options.command_timeout {
			Some(limit) => match tokio::time::timeout(limit, rx).await {
				Ok(outcome) => outcome,
				Err(_) => {
					self.pending.lock().calls.remove(&id);
					warn!(target = "jsdap.connection", id, method = %method, "command timed out");
					return Err(Error::Timeout(format!("{method} (id={id}) got no reply within {limit:?}")));
				}
			},
			None => rx.await,
		};

		outcome.map_err(|_| Error::ChannelClosed).and_then(|result| result)
	}

	/// Closes the transport. The message loop ends once the peer
	/// acknowledges, which fails anything still pending.
	pub async fn close(&self) -> Result<()> {
		if self.is_closed() {
			return Ok(());
		}
		self.sender.lock().await.close().await
	}

	/// `true` once the inbound stream has ended.
	pub fn is_closed(&self) -> bool {
		self.pending.lock().closed
	}

	/// Number of commands awaiting a reply.
	pub fn pending_count(&self) -> usize {
		self.pending.lock().calls.len()
	}

	/// Runs the message dispatch loop until the transport closes.
	///
	/// Spawn this in a background task; it can only run once.
	pub async fn run(&self) {
		let Some((receiver, mut message_rx)) = self.inbound.lock().take() else {
			error!(target = "jsdap.connection", "message loop already started");
			return;
		};

		let transport_handle = tokio::spawn(async move { receiver.run().await });

		while let Some(message_value) = message_rx.recv().await {
			match Message::deserialize(&message_value) {
				Ok(message) => {
					if let Err(e) = self.dispatch(message) {
						warn!(target = "jsdap.connection", error = %e, "dropping inbound message");
					}
				}
				Err(e) => {
					warn!(target = "jsdap.connection", error = %e, message = %message_value, "failed to parse inbound message");
				}
			}
		}

		match transport_handle.await {
			Ok(Ok(())) => debug!(target = "jsdap.connection", "transport closed"),
			Ok(Err(e)) => warn!(target = "jsdap.connection", error = %e, "transport ended with error"),
			Err(e) => error!(target = "jsdap.connection", error = %e, "transport task failed"),
		}

		self.fail_pending();
		let _ = self.events.send(ConnectionEvent::Closed);
	}

	/// Marks the connection closed and fails every pending command.
	fn fail_pending(&self) {
		let calls = {
			let mut pending = self.pending.lock();
			pending.closed = true;
			std::mem::take(&mut pending.calls)
		};

		for (id, callback) in calls {
			debug!(target = "jsdap.connection", id, "failing pending command");
			let _ = callback.send(Err(Error::ConnectionClosed));
		}
	}

	/// Routes one inbound message.
	///
	/// # Errors
	///
	/// Returns [`Error::ProtocolError`] when a reply's id is not pending:
	/// either it was never issued or it has already been answered.
	fn dispatch(&self, message: Message) -> Result<()> {
		match message {
			Message::Reply(reply) => {
				let callback = self.pending.lock().calls.remove(&reply.id).ok_or_else(|| {
					Error::ProtocolError(format!("no pending command for reply id={}", reply.id))
				})?;

				let result = match reply.error {
					Some(payload) => Err(inspector_error(payload)),
					None => Ok(reply.result.unwrap_or(Value::Null)),
				};

				// Receiver may have been dropped by a timed-out caller
				let _ = callback.send(result);
				Ok(())
			}
			Message::Event(event) => {
				trace!(target = "jsdap.connection", method = %event.method, "event");
				if self.events.send(ConnectionEvent::Event(event)).is_err() {
					debug!(target = "jsdap.connection", "no event listener; event dropped");
				}
				Ok(())
			}
		}
	}
}

fn inspector_error(payload: ErrorPayload) -> Error {
	Error::Inspector {
		code: payload.code,
		message: payload.message,
	}
}
