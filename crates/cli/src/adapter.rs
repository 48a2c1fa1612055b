//! Request handling: one DAP request in, one response out.

use std::sync::Arc;
use std::time::Duration;

use jsdap_protocol::dap::{self, Command, LaunchArguments, Request, Response};
use jsdap_runtime::session::{InitializedSignal, Session, SessionOptions};
use jsdap_runtime::transport::Connector;
use jsdap_runtime::DEFAULT_COMMAND_TIMEOUT;
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::error::{AdapterError, Result};

#[derive(Debug, Clone)]
pub struct AdapterConfig {
	/// Engine endpoint used when `launch`/`attach` carry none
	pub endpoint: Option<String>,
	pub command_timeout: Option<Duration>,
	pub initialized: InitializedSignal,
}

impl Default for AdapterConfig {
	fn default() -> Self {
		Self {
			endpoint: None,
			command_timeout: Some(DEFAULT_COMMAND_TIMEOUT),
			initialized: InitializedSignal::default(),
		}
	}
}

#[derive(Debug, Clone, Copy)]
struct Coordinates {
	lines_start_at1: bool,
	columns_start_at1: bool,
}

impl Default for Coordinates {
	fn default() -> Self {
		Self {
			lines_start_at1: true,
			columns_start_at1: true,
		}
	}
}

/// State for one editor connection.
pub struct Adapter {
	connector: Arc<dyn Connector>,
	config: AdapterConfig,
	events: mpsc::UnboundedSender<dap::Event>,
	session: Mutex<Option<Arc<Session>>>,
	coordinates: Mutex<Coordinates>,
}

impl Adapter {
	pub fn new(connector: Arc<dyn Connector>, config: AdapterConfig, events: mpsc::UnboundedSender<dap::Event>) -> Self {
		Self {
			connector,
			config,
			events,
			session: Mutex::new(None),
			coordinates: Mutex::new(Coordinates::default()),
		}
	}

	/// Requests that change session lifecycle and must run in arrival order.
	pub fn is_lifecycle(command: &str) -> bool {
		matches!(command, "initialize" | "launch" | "attach" | "disconnect")
	}

	pub async fn handle(&self, request: &Request) -> Response {
		match self.dispatch(request).await {
			Ok(body) => Response::success(request, body),
			Err(e) => {
				warn!(target = "jsdap.adapter", seq = request.seq, command = %request.command, error = %e, "request failed");
				Response::error(request, e.to_string())
			}
		}
	}

	async fn dispatch(&self, request: &Request) -> Result<Option<Value>> {
		match request.decode()? {
			Command::Initialize(args) => {
				debug!(target = "jsdap.adapter", client = ?args.client_id, "initialize");
				*self.coordinates.lock() = Coordinates {
					lines_start_at1: args.lines_start_at1.unwrap_or(true),
					columns_start_at1: args.columns_start_at1.unwrap_or(true),
				};
				Ok(None)
			}
			Command::Launch(args) | Command::Attach(args) => {
				self.launch(args).await?;
				Ok(None)
			}
			Command::ConfigurationDone => Ok(None),
			Command::SetBreakpoints(args) => {
				let session = self.session()?;
				let path = args
					.source
					.path
					.clone()
					.ok_or_else(|| AdapterError::InvalidRequest("setBreakpoints requires source.path".to_string()))?;
				let breakpoints = session.set_breakpoints(&path, &args.requested()).await?;
				body(dap::SetBreakpointsResponseBody { breakpoints })
			}
			Command::Threads => {
				let threads = self.current_session().map(|s| s.threads()).unwrap_or_default();
				body(dap::ThreadsResponseBody { threads })
			}
			Command::StackTrace(_) => {
				let stack_frames = self.current_session().map(|s| s.stack_trace()).unwrap_or_default();
				let total_frames = Some(stack_frames.len() as i64);
				body(dap::StackTraceResponseBody { stack_frames, total_frames })
			}
			Command::Scopes(_) | Command::Variables(_) => Ok(None),
			Command::Continue(_) => {
				self.session()?.resume().await?;
				body(dap::ContinueResponseBody {
					all_threads_continued: Some(true),
				})
			}
			Command::Disconnect(_) => {
				self.disconnect();
				Ok(None)
			}
			Command::Unsupported(command) => Err(AdapterError::InvalidRequest(format!("unsupported command: {command}"))),
		}
	}

	async fn launch(&self, args: LaunchArguments) -> Result<()> {
		if self.current_session().is_some_and(|s| !s.is_terminated()) {
			return Err(AdapterError::InvalidRequest("a debug session is already active".to_string()));
		}

		let address = args
			.websocket_address
			.filter(|a| !a.is_empty())
			.or_else(|| self.config.endpoint.clone())
			.ok_or_else(|| AdapterError::InvalidRequest("launch requires websocketAddress or a configured endpoint".to_string()))?;

		info!(target = "jsdap.adapter", address = %address, "connecting to inspector");
		let parts = self.connector.connect(&address).await?;

		let coordinates = *self.coordinates.lock();
		let options = SessionOptions {
			initialized: self.config.initialized,
			lines_start_at1: coordinates.lines_start_at1,
			columns_start_at1: coordinates.columns_start_at1,
			command_timeout: self.config.command_timeout,
		};
		let session = Session::start(parts, self.events.clone(), options).await?;
		*self.session.lock() = Some(session);
		Ok(())
	}

	/// Starts closing the inspector socket without waiting for it.
	pub fn disconnect(&self) {
		let Some(session) = self.current_session() else {
			return;
		};
		tokio::spawn(async move {
			if let Err(e) = session.disconnect().await {
				warn!(target = "jsdap.adapter", error = %e, "disconnect failed");
			}
		});
	}

	fn current_session(&self) -> Option<Arc<Session>> {
		self.session.lock().clone()
	}

	fn session(&self) -> Result<Arc<Session>> {
		self.current_session().ok_or(AdapterError::Runtime(jsdap_runtime::Error::NotConnected))
	}
}

fn body<T: serde::Serialize>(value: T) -> Result<Option<Value>> {
	Ok(Some(serde_json::to_value(value)?))
}
