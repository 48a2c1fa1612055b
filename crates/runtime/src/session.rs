//! Debug session: engine events in, editor events out.
//!
//! A [`Session`] owns one [`Connection`] and reacts to inspector events in
//! wire order. State moves through
//! `Connecting → Initializing → Running ⇄ Paused → Terminated`; the last is
//! terminal and reachable from anywhere.
//!
//! Editor-facing coordinates follow [`SessionOptions`]; everything stored
//! in the registry and sent to the engine is zero-based.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

use futures_util::future::join_all;
use jsdap_protocol::cdp::{self, InspectorEvent, methods};
use jsdap_protocol::dap;
use parking_lot::Mutex;
use serde_json::json;
use tokio::sync::mpsc;
use tracing::{debug, info, trace, warn};

use crate::connection::{Connection, ConnectionEvent, ConnectionOptions, DEFAULT_COMMAND_TIMEOUT};
use crate::error::Result;
use crate::sourcemap::{SourceMapRegistry, normalize_path};
use crate::transport::TransportParts;

/// When to tell the editor it may send configuration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum InitializedSignal {
	/// After every parsed script, so breakpoints are re-sent as code loads
	#[default]
	EveryScript,
	/// After the first parsed script only
	Once,
}

#[derive(Debug, Clone, Copy)]
pub struct SessionOptions {
	pub initialized: InitializedSignal,
	pub lines_start_at1: bool,
	pub columns_start_at1: bool,
	pub command_timeout: Option<Duration>,
}

impl Default for SessionOptions {
	fn default() -> Self {
		Self {
			initialized: InitializedSignal::default(),
			lines_start_at1: true,
			columns_start_at1: true,
			command_timeout: Some(DEFAULT_COMMAND_TIMEOUT),
		}
	}
}

impl SessionOptions {
	fn line_to_editor(&self, line: u32) -> i64 {
		i64::from(line) + i64::from(self.lines_start_at1)
	}

	fn column_to_editor(&self, column: u32) -> i64 {
		i64::from(column) + i64::from(self.columns_start_at1)
	}

	fn line_from_editor(&self, line: i64) -> u32 {
		clamp_u32(line - i64::from(self.lines_start_at1))
	}

	/// A missing column means the first column.
	fn column_from_editor(&self, column: Option<i64>) -> u32 {
		column.map_or(0, |c| clamp_u32(c - i64::from(self.columns_start_at1)))
	}
}

fn clamp_u32(value: i64) -> u32 {
	u32::try_from(value.max(0)).unwrap_or(u32::MAX)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
	Connecting,
	Initializing,
	Running,
	Paused,
	Terminated,
}

#[derive(Debug, Clone)]
struct PlacedBreakpoint {
	dap_id: i64,
	cdp_id: String,
}

struct SessionInner {
	state: SessionState,
	threads: Vec<dap::Thread>,
	frames: Vec<dap::StackFrame>,
	registry: SourceMapRegistry,
	/// Engine breakpoints placed per normalized source path
	breakpoints: HashMap<String, Vec<PlacedBreakpoint>>,
	/// Held for the whole replacement of one source's breakpoints
	source_locks: HashMap<String, Arc<tokio::sync::Mutex<()>>>,
	initialized_sent: bool,
}

/// One attached engine.
pub struct Session {
	connection: Arc<Connection>,
	inner: Mutex<SessionInner>,
	events: mpsc::UnboundedSender<dap::Event>,
	options: SessionOptions,
	next_breakpoint_id: AtomicI64,
}

impl Session {
	/// Takes over an open transport and enables the debugger domains.
	///
	/// Returns once every enablement command has been written; the replies
	/// are collected in the background. Editor events are sent on `events`.
	pub async fn start(parts: TransportParts, events: mpsc::UnboundedSender<dap::Event>, options: SessionOptions) -> Result<Arc<Self>> {
		let (connection, connection_events) = Connection::new(
			parts,
			ConnectionOptions {
				command_timeout: options.command_timeout,
			},
		);
		let session = Arc::new(Self {
			connection: Arc::new(connection),
			inner: Mutex::new(SessionInner {
				state: SessionState::Connecting,
				threads: Vec::new(),
				frames: Vec::new(),
				registry: SourceMapRegistry::new(),
				breakpoints: HashMap::new(),
				source_locks: HashMap::new(),
				initialized_sent: false,
			}),
			events,
			options,
			next_breakpoint_id: AtomicI64::new(0),
		});

		let connection = Arc::clone(&session.connection);
		tokio::spawn(async move { connection.run().await });
		tokio::spawn(Arc::clone(&session).pump(connection_events));

		session.enable().await?;
		Ok(session)
	}

	async fn enable(self: &Arc<Self>) -> Result<()> {
		self.transition(SessionState::Connecting, SessionState::Initializing);

		let commands = [
			(methods::RUNTIME_ENABLE, json!({})),
			(
				methods::DEBUGGER_ENABLE,
				serde_json::to_value(cdp::EnableDebugger {
					max_scripts_cache_size: 100_000_000,
				})?,
			),
			(
				methods::DEBUGGER_SET_PAUSE_ON_EXCEPTIONS,
				serde_json::to_value(cdp::SetPauseOnExceptions { state: "none".to_string() })?,
			),
			(
				methods::DEBUGGER_SET_ASYNC_CALL_STACK_DEPTH,
				serde_json::to_value(cdp::SetAsyncCallStackDepth { max_depth: 32 })?,
			),
			(
				methods::DEBUGGER_SET_BLACKBOX_PATTERNS,
				serde_json::to_value(cdp::SetBlackboxPatterns { patterns: Vec::new() })?,
			),
			(methods::RUNTIME_RUN_IF_WAITING_FOR_DEBUGGER, json!({})),
		];

		let mut pending = Vec::with_capacity(commands.len());
		for (method, params) in commands {
			match self.connection.send_command(method, params).await {
				Ok(call) => pending.push(call),
				Err(e) => {
					warn!(target = "jsdap.session", method, error = %e, "enablement write failed");
					for call in pending {
						self.connection.abandon(call);
					}
					if let Err(close_err) = self.connection.close().await {
						debug!(target = "jsdap.session", error = %close_err, "close after failed enablement");
					}
					return Err(e);
				}
			}
		}

		let session = Arc::clone(self);
		tokio::spawn(async move {
			let connection = &session.connection;
			let replies = join_all(pending.into_iter().map(|call| async move {
				let method = call.method().to_string();
				(method, connection.wait(call).await)
			}))
			.await;

			for (method, reply) in replies {
				if let Err(e) = reply {
					warn!(target = "jsdap.session", method = %method, error = %e, "enablement command failed");
				}
			}
			if session.transition(SessionState::Initializing, SessionState::Running) {
				info!(target = "jsdap.session", "debugger enabled");
			}
		});

		Ok(())
	}

	/// Moves `from → to`; returns whether the session was in `from`.
	fn transition(&self, from: SessionState, to: SessionState) -> bool {
		let mut inner = self.inner.lock();
		if inner.state != from {
			return false;
		}
		trace!(target = "jsdap.session", ?from, ?to, "state change");
		inner.state = to;
		true
	}

	async fn pump(self: Arc<Self>, mut events: mpsc::UnboundedReceiver<ConnectionEvent>) {
		while let Some(event) = events.recv().await {
			match event {
				ConnectionEvent::Event(event) => self.handle_event(&event),
				ConnectionEvent::Closed => break,
			}
		}
		self.terminate();
	}

	fn handle_event(&self, event: &cdp::Event) {
		let decoded = match InspectorEvent::decode(event) {
			Ok(decoded) => decoded,
			Err(e) => {
				warn!(target = "jsdap.session", method = %event.method, error = %e, "undecodable event");
				return;
			}
		};

		match decoded {
			InspectorEvent::ExecutionContextCreated(created) => self.on_context_created(created.context),
			InspectorEvent::ExecutionContextDestroyed(destroyed) => {
				debug!(target = "jsdap.session", context_id = destroyed.execution_context_id, "execution context destroyed");
			}
			InspectorEvent::ScriptParsed(script) => self.on_script_parsed(script),
			InspectorEvent::Paused(paused) => self.on_paused(paused),
			InspectorEvent::Resumed => self.on_resumed(),
			InspectorEvent::ConsoleApiCalled(call) => self.on_console(call),
			InspectorEvent::Other(method) => trace!(target = "jsdap.session", method = %method, "ignored event"),
		}
	}

	fn emit(&self, event: dap::Event) {
		if self.events.send(event).is_err() {
			debug!(target = "jsdap.session", "editor gone; event dropped");
		}
	}

	fn on_context_created(&self, context: cdp::ExecutionContextDescription) {
		let added = {
			let mut inner = self.inner.lock();
			if inner.threads.iter().any(|t| t.id == context.id) {
				false
			} else {
				let name = if context.name.is_empty() { format!("context {}", context.id) } else { context.name };
				inner.threads.push(dap::Thread { id: context.id, name });
				true
			}
		};

		if added {
			self.emit(dap::Event::Thread(dap::ThreadEventBody {
				reason: "started".to_string(),
				thread_id: context.id,
			}));
		} else {
			debug!(target = "jsdap.session", thread_id = context.id, "duplicate execution context");
		}
	}

	fn on_script_parsed(&self, script: cdp::ScriptParsed) {
		let signal = {
			let mut inner = self.inner.lock();
			inner.registry.register(&script.script_id, &script.url, script.source_map_url.as_deref());
			match self.options.initialized {
				InitializedSignal::EveryScript => true,
				InitializedSignal::Once => !std::mem::replace(&mut inner.initialized_sent, true),
			}
		};

		trace!(target = "jsdap.session", script_id = %script.script_id, url = %script.url, "script parsed");
		if signal {
			self.emit(dap::Event::Initialized);
		}
	}

	fn on_paused(&self, paused: cdp::Paused) {
		let call_frames: Vec<cdp::CallFrame> = paused
			.frames()
			.into_iter()
			.enumerate()
			.filter_map(|(index, frame)| {
				frame
					.map_err(|e| warn!(target = "jsdap.session", index, error = %e, "skipping undecodable call frame"))
					.ok()
			})
			.collect();

		let thread_id = {
			let mut inner = self.inner.lock();
			let frames: Vec<dap::StackFrame> = call_frames
				.iter()
				.enumerate()
				.map(|(index, frame)| self.translate_frame(&inner.registry, index, frame))
				.collect();
			inner.frames = frames;
			if inner.state != SessionState::Terminated {
				inner.state = SessionState::Paused;
			}
			inner.threads.first().map(|t| t.id)
		};

		debug!(target = "jsdap.session", reason = %paused.reason, frames = call_frames.len(), "paused");
		self.emit(dap::Event::Stopped(dap::StoppedEventBody {
			reason: "breakpoint".to_string(),
			description: Some(paused.reason).filter(|r| !r.is_empty()),
			thread_id,
			all_threads_stopped: Some(true),
		}));
	}

	fn translate_frame(&self, registry: &SourceMapRegistry, index: usize, frame: &cdp::CallFrame) -> dap::StackFrame {
		let location = &frame.location;
		let position = registry.to_original(&location.script_id, location.line_number, location.column_number.unwrap_or(0));

		let frame_url = frame.url.clone().filter(|u| !u.is_empty());
		let path = Some(position.url).filter(|u| !u.is_empty()).or_else(|| frame_url.clone());
		let script_url = Some(position.script_url).filter(|u| !u.is_empty()).or(frame_url);
		let source = path.map(|path| dap::Source {
			name: script_url,
			path: Some(path),
			source_reference: None,
		});

		let name = if frame.function_name.is_empty() { "(anonymous)".to_string() } else { frame.function_name.clone() };

		dap::StackFrame {
			id: index as i64,
			name,
			source,
			line: self.options.line_to_editor(position.line),
			column: self.options.column_to_editor(position.column),
		}
	}

	fn on_resumed(&self) {
		let thread_id = {
			let mut inner = self.inner.lock();
			inner.frames.clear();
			if inner.state == SessionState::Paused {
				inner.state = SessionState::Running;
			}
			inner.threads.first().map_or(1, |t| t.id)
		};

		self.emit(dap::Event::Continued(dap::ContinuedEventBody {
			thread_id,
			all_threads_continued: Some(true),
		}));
	}

	fn on_console(&self, call: cdp::ConsoleApiCalled) {
		let args = call.args.iter().map(cdp::RemoteObject::display).collect::<Vec<_>>();
		self.emit(dap::Event::Output(dap::OutputEventBody {
			category: Some("console".to_string()),
			output: format!("{}: {}\n", call.kind, args.join(" ")),
		}));
	}

	/// Moves to `Terminated` and emits `terminated` the first time only.
	fn terminate(&self) {
		let first = {
			let mut inner = self.inner.lock();
			if inner.state == SessionState::Terminated {
				false
			} else {
				inner.state = SessionState::Terminated;
				inner.frames.clear();
				true
			}
		};

		if first {
			info!(target = "jsdap.session", "session terminated");
			self.emit(dap::Event::Terminated);
		}
	}

	/// Replaces the breakpoints of one source.
	///
	/// Calls for the same source run one after another; calls for different
	/// sources overlap. Every request is placed concurrently and reported in
	/// input order.
	/// Positions without generated code, and positions the engine refuses,
	/// come back unverified. Only transport failures fail the whole call.
	pub async fn set_breakpoints(&self, path: &str, requested: &[dap::SourceBreakpoint]) -> Result<Vec<dap::Breakpoint>> {
		let key = normalize_path(path);
		let source_lock = Arc::clone(self.inner.lock().source_locks.entry(key.clone()).or_default());
		let _guard = source_lock.lock().await;

		let previous = self.inner.lock().breakpoints.remove(&key).unwrap_or_default();

		let removals = join_all(previous.iter().map(|placed| async move {
			let params = json!({ "breakpointId": placed.cdp_id });
			(placed, self.connection.call(methods::DEBUGGER_REMOVE_BREAKPOINT, params).await)
		}))
		.await;
		for (placed, outcome) in removals {
			match outcome {
				Ok(_) => trace!(target = "jsdap.session", dap_id = placed.dap_id, cdp_id = %placed.cdp_id, "removed breakpoint"),
				Err(e) if e.is_transport() => return Err(e),
				Err(e) => warn!(target = "jsdap.session", cdp_id = %placed.cdp_id, error = %e, "failed to remove breakpoint"),
			}
		}

		let outcomes = join_all(requested.iter().map(|bp| self.place_breakpoint(path, bp))).await;

		let mut breakpoints = Vec::with_capacity(outcomes.len());
		let mut placed = Vec::new();
		for outcome in outcomes {
			let (breakpoint, cdp_id) = outcome?;
			if let (Some(dap_id), Some(cdp_id)) = (breakpoint.id, cdp_id) {
				placed.push(PlacedBreakpoint { dap_id, cdp_id });
			}
			breakpoints.push(breakpoint);
		}

		debug!(
			target = "jsdap.session",
			path,
			requested = requested.len(),
			verified = placed.len(),
			"breakpoints set"
		);
		self.inner.lock().breakpoints.insert(key, placed);
		Ok(breakpoints)
	}

	async fn place_breakpoint(&self, path: &str, requested: &dap::SourceBreakpoint) -> Result<(dap::Breakpoint, Option<String>)> {
		let mut breakpoint = dap::Breakpoint {
			id: Some(self.next_breakpoint_id.fetch_add(1, Ordering::SeqCst) + 1),
			verified: false,
			message: None,
			source: Some(dap::Source {
				path: Some(path.to_string()),
				..Default::default()
			}),
			line: Some(requested.line),
			column: requested.column,
		};

		let line = self.options.line_from_editor(requested.line);
		let column = self.options.column_from_editor(requested.column);
		let generated = self.inner.lock().registry.to_generated(path, line, column);
		let Some(generated) = generated else {
			breakpoint.message = Some(format!("no generated code for {path}:{}", requested.line));
			return Ok((breakpoint, None));
		};

		let params = serde_json::to_value(cdp::SetBreakpointByUrl {
			line_number: generated.line,
			url: generated.script_url,
			column_number: generated.column,
			condition: String::new(),
		})?;

		match self.connection.call(methods::DEBUGGER_SET_BREAKPOINT_BY_URL, params).await {
			Ok(result) => match serde_json::from_value::<cdp::SetBreakpointByUrlResult>(result) {
				Ok(ack) if !ack.breakpoint_id.is_empty() => {
					breakpoint.verified = true;
					Ok((breakpoint, Some(ack.breakpoint_id)))
				}
				_ => {
					breakpoint.message = Some("engine returned no breakpoint id".to_string());
					Ok((breakpoint, None))
				}
			},
			Err(e) if e.is_transport() => Err(e),
			Err(e) => {
				breakpoint.message = Some(e.to_string());
				Ok((breakpoint, None))
			}
		}
	}

	/// Known threads, in creation order.
	pub fn threads(&self) -> Vec<dap::Thread> {
		self.inner.lock().threads.clone()
	}

	/// Frames of the latest pause; empty while running.
	pub fn stack_trace(&self) -> Vec<dap::StackFrame> {
		self.inner.lock().frames.clone()
	}

	pub fn state(&self) -> SessionState {
		self.inner.lock().state
	}

	pub fn is_terminated(&self) -> bool {
		self.state() == SessionState::Terminated
	}

	/// Resumes execution and waits for the engine to acknowledge.
	pub async fn resume(&self) -> Result<()> {
		self.connection.call(methods::DEBUGGER_RESUME, json!({})).await.map(|_| ())
	}

	/// Closes the inspector socket. `terminated` follows once it is down.
	pub async fn disconnect(&self) -> Result<()> {
		info!(target = "jsdap.session", "disconnecting");
		self.connection.close().await
	}
}
