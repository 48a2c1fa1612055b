//! Debug Adapter Protocol envelopes and the request/event bodies the
//! adapter understands.
//!
//! Requests arrive as:
//! ```json
//! { "seq": 3, "type": "request", "command": "setBreakpoints", "arguments": { "source": { "path": "/app/src/App.tsx" }, "breakpoints": [{ "line": 12 }] } }
//! ```
//! and are decoded into a closed [`Command`] set. Responses and events are
//! built by the adapter; their `seq` is assigned by whoever writes them out.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Incoming request envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
	pub seq: i64,
	#[serde(rename = "type", default = "request_kind")]
	pub kind: String,
	pub command: String,
	#[serde(default)]
	pub arguments: Value,
}

fn request_kind() -> String {
	"request".to_string()
}

/// Requests the adapter distinguishes.
///
/// `Scopes` and `Variables` are acknowledged without content; they keep
/// their raw arguments so a later implementation can pick them up.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
	Initialize(InitializeArguments),
	Launch(LaunchArguments),
	Attach(LaunchArguments),
	ConfigurationDone,
	SetBreakpoints(SetBreakpointsArguments),
	Threads,
	StackTrace(StackTraceArguments),
	Scopes(Value),
	Variables(Value),
	Continue(ContinueArguments),
	Disconnect(DisconnectArguments),
	Unsupported(String),
}

impl Request {
	/// Decodes `arguments` according to `command`.
	pub fn decode(&self) -> Result<Command, serde_json::Error> {
		let args = &self.arguments;
		Ok(match self.command.as_str() {
			"initialize" => Command::Initialize(arguments(args)?),
			"launch" => Command::Launch(arguments(args)?),
			"attach" => Command::Attach(arguments(args)?),
			"configurationDone" => Command::ConfigurationDone,
			"setBreakpoints" => Command::SetBreakpoints(arguments(args)?),
			"threads" => Command::Threads,
			"stackTrace" => Command::StackTrace(arguments(args)?),
			"scopes" => Command::Scopes(args.clone()),
			"variables" => Command::Variables(args.clone()),
			"continue" => Command::Continue(arguments(args)?),
			"disconnect" => Command::Disconnect(arguments(args)?),
			other => Command::Unsupported(other.to_string()),
		})
	}
}

/// Absent `arguments` decode to the type's default.
fn arguments<'a, T>(value: &'a Value) -> Result<T, serde_json::Error>
where
	T: Deserialize<'a> + Default,
{
	if value.is_null() { Ok(T::default()) } else { T::deserialize(value) }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeArguments {
	#[serde(rename = "clientID", default, skip_serializing_if = "Option::is_none")]
	pub client_id: Option<String>,
	#[serde(rename = "adapterID", default, skip_serializing_if = "Option::is_none")]
	pub adapter_id: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub lines_start_at1: Option<bool>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub columns_start_at1: Option<bool>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub path_format: Option<String>,
}

/// Arguments of `launch` and `attach`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LaunchArguments {
	/// Inspector endpoint of the running engine
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub websocket_address: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub no_debug: Option<bool>,
	#[serde(flatten)]
	pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Source {
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub name: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub path: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub source_reference: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SourceBreakpoint {
	pub line: i64,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub column: Option<i64>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub condition: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SetBreakpointsArguments {
	pub source: Source,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub breakpoints: Option<Vec<SourceBreakpoint>>,
	/// Deprecated line-only form
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub lines: Option<Vec<i64>>,
}

impl SetBreakpointsArguments {
	/// Requested breakpoints, falling back to the deprecated `lines` field.
	pub fn requested(&self) -> Vec<SourceBreakpoint> {
		match (&self.breakpoints, &self.lines) {
			(Some(breakpoints), _) => breakpoints.clone(),
			(None, Some(lines)) => lines
				.iter()
				.map(|&line| SourceBreakpoint {
					line,
					..Default::default()
				})
				.collect(),
			(None, None) => Vec::new(),
		}
	}
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StackTraceArguments {
	#[serde(default)]
	pub thread_id: i64,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub start_frame: Option<i64>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub levels: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContinueArguments {
	#[serde(default)]
	pub thread_id: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DisconnectArguments {
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub restart: Option<bool>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub terminate_debuggee: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Thread {
	pub id: i64,
	pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StackFrame {
	pub id: i64,
	pub name: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub source: Option<Source>,
	pub line: i64,
	pub column: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Breakpoint {
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub id: Option<i64>,
	pub verified: bool,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub message: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub source: Option<Source>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub line: Option<i64>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub column: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SetBreakpointsResponseBody {
	pub breakpoints: Vec<Breakpoint>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThreadsResponseBody {
	pub threads: Vec<Thread>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StackTraceResponseBody {
	pub stack_frames: Vec<StackFrame>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub total_frames: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContinueResponseBody {
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub all_threads_continued: Option<bool>,
}

/// Outgoing response envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
	pub seq: i64,
	#[serde(rename = "type")]
	pub kind: String,
	pub request_seq: i64,
	pub success: bool,
	pub command: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub message: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub body: Option<Value>,
}

impl Response {
	pub fn success(request: &Request, body: Option<Value>) -> Self {
		Self {
			seq: 0,
			kind: "response".to_string(),
			request_seq: request.seq,
			success: true,
			command: request.command.clone(),
			message: None,
			body,
		}
	}

	pub fn error(request: &Request, message: impl Into<String>) -> Self {
		Self {
			seq: 0,
			kind: "response".to_string(),
			request_seq: request.seq,
			success: false,
			command: request.command.clone(),
			message: Some(message.into()),
			body: None,
		}
	}
}

/// Events raised toward the editor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "body", rename_all = "camelCase")]
pub enum Event {
	Initialized,
	Thread(ThreadEventBody),
	Stopped(StoppedEventBody),
	Continued(ContinuedEventBody),
	Output(OutputEventBody),
	Terminated,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThreadEventBody {
	pub reason: String,
	pub thread_id: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoppedEventBody {
	pub reason: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub description: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub thread_id: Option<i64>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub all_threads_stopped: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContinuedEventBody {
	pub thread_id: i64,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub all_threads_continued: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputEventBody {
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub category: Option<String>,
	pub output: String,
}

/// Outgoing event envelope.
#[derive(Debug, Clone, Serialize)]
pub struct EventMessage {
	pub seq: i64,
	#[serde(rename = "type")]
	pub kind: &'static str,
	#[serde(flatten)]
	pub event: Event,
}

impl EventMessage {
	pub fn new(seq: i64, event: Event) -> Self {
		Self { seq, kind: "event", event }
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use serde_json::json;

	fn request(command: &str, arguments: Value) -> Request {
		Request {
			seq: 1,
			kind: "request".to_string(),
			command: command.to_string(),
			arguments,
		}
	}

	#[test]
	fn decode_set_breakpoints_request() {
		let req = request(
			"setBreakpoints",
			json!({"source": {"path": "/app/src/App.tsx"}, "breakpoints": [{"line": 4}, {"line": 9, "column": 3}]}),
		);
		let Command::SetBreakpoints(args) = req.decode().unwrap() else {
			panic!("Expected SetBreakpoints");
		};
		assert_eq!(args.source.path.as_deref(), Some("/app/src/App.tsx"));
		let requested = args.requested();
		assert_eq!(requested.len(), 2);
		assert_eq!(requested[1].column, Some(3));
	}

	#[test]
	fn deprecated_lines_become_breakpoints() {
		let args = SetBreakpointsArguments {
			lines: Some(vec![2, 5]),
			..Default::default()
		};
		let lines: Vec<i64> = args.requested().iter().map(|bp| bp.line).collect();
		assert_eq!(lines, vec![2, 5]);
	}

	#[test]
	fn missing_arguments_decode_to_defaults() {
		let req: Request = serde_json::from_str(r#"{"seq": 9, "type": "request", "command": "continue"}"#).unwrap();
		assert_eq!(req.decode().unwrap(), Command::Continue(ContinueArguments::default()));
	}

	#[test]
	fn initialize_reads_coordinate_base() {
		let req = request("initialize", json!({"clientID": "vscode", "adapterID": "jsdap", "linesStartAt1": true, "columnsStartAt1": false}));
		let Command::Initialize(args) = req.decode().unwrap() else {
			panic!("Expected Initialize");
		};
		assert_eq!(args.client_id.as_deref(), Some("vscode"));
		assert_eq!(args.lines_start_at1, Some(true));
		assert_eq!(args.columns_start_at1, Some(false));
	}

	#[test]
	fn launch_keeps_websocket_address_and_extra_fields() {
		let req = request("launch", json!({"websocketAddress": "ws://127.0.0.1:8081/inspector", "name": "Debug app"}));
		let Command::Launch(args) = req.decode().unwrap() else {
			panic!("Expected Launch");
		};
		assert_eq!(args.websocket_address.as_deref(), Some("ws://127.0.0.1:8081/inspector"));
		assert_eq!(args.extra["name"], "Debug app");
	}

	#[test]
	fn unknown_command_is_unsupported() {
		assert_eq!(request("stepIn", Value::Null).decode().unwrap(), Command::Unsupported("stepIn".to_string()));
	}

	#[test]
	fn response_envelope_shape() {
		let req = request("threads", Value::Null);
		let response = Response::success(&req, Some(json!({"threads": []})));
		let value = serde_json::to_value(&response).unwrap();
		assert_eq!(value["type"], "response");
		assert_eq!(value["request_seq"], 1);
		assert_eq!(value["success"], true);
		assert_eq!(value["command"], "threads");
		assert!(value.get("message").is_none());

		let failed = serde_json::to_value(Response::error(&req, "no session")).unwrap();
		assert_eq!(failed["success"], false);
		assert_eq!(failed["message"], "no session");
	}

	#[test]
	fn event_envelope_flattens_tag_and_body() {
		let stopped = EventMessage::new(
			4,
			Event::Stopped(StoppedEventBody {
				reason: "breakpoint".to_string(),
				description: None,
				thread_id: Some(1),
				all_threads_stopped: None,
			}),
		);
		assert_eq!(
			serde_json::to_value(&stopped).unwrap(),
			json!({"seq": 4, "type": "event", "event": "stopped", "body": {"reason": "breakpoint", "threadId": 1}})
		);

		let initialized = serde_json::to_value(EventMessage::new(5, Event::Initialized)).unwrap();
		assert_eq!(initialized["event"], "initialized");
		assert!(initialized.get("body").is_none());
	}
}
