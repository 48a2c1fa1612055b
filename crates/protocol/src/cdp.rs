//! Inspector (Chrome DevTools) protocol envelopes and the subset of domain
//! types the adapter consumes.
//!
//! Commands go out as:
//! ```json
//! { "id": 7, "method": "Debugger.setBreakpointByUrl", "params": { "lineNumber": 12, "url": "index.bundle" } }
//! ```
//!
//! The engine answers with either a reply carrying the same id, or an
//! unsolicited event without one:
//! ```json
//! { "id": 7, "result": { "breakpointId": "1:12:0:index.bundle", "locations": [] } }
//! { "method": "Debugger.resumed", "params": {} }
//! ```

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Method names used by the adapter.
pub mod methods {
	pub const RUNTIME_ENABLE: &str = "Runtime.enable";
	pub const RUNTIME_RUN_IF_WAITING_FOR_DEBUGGER: &str = "Runtime.runIfWaitingForDebugger";
	pub const DEBUGGER_ENABLE: &str = "Debugger.enable";
	pub const DEBUGGER_SET_PAUSE_ON_EXCEPTIONS: &str = "Debugger.setPauseOnExceptions";
	pub const DEBUGGER_SET_ASYNC_CALL_STACK_DEPTH: &str = "Debugger.setAsyncCallStackDepth";
	pub const DEBUGGER_SET_BLACKBOX_PATTERNS: &str = "Debugger.setBlackboxPatterns";
	pub const DEBUGGER_SET_BREAKPOINT_BY_URL: &str = "Debugger.setBreakpointByUrl";
	pub const DEBUGGER_REMOVE_BREAKPOINT: &str = "Debugger.removeBreakpoint";
	pub const DEBUGGER_RESUME: &str = "Debugger.resume";

	pub const EXECUTION_CONTEXT_CREATED: &str = "Runtime.executionContextCreated";
	pub const EXECUTION_CONTEXT_DESTROYED: &str = "Runtime.executionContextDestroyed";
	pub const CONSOLE_API_CALLED: &str = "Runtime.consoleAPICalled";
	pub const SCRIPT_PARSED: &str = "Debugger.scriptParsed";
	pub const PAUSED: &str = "Debugger.paused";
	pub const RESUMED: &str = "Debugger.resumed";
}

/// Outbound command envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Command {
	/// Correlation id, unique within a connection
	pub id: u32,
	pub method: String,
	pub params: Value,
}

/// Reply to a previously issued [`Command`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reply {
	pub id: u32,
	/// Success payload (mutually exclusive with error)
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub result: Option<Value>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub error: Option<ErrorPayload>,
}

/// Engine-side failure carried by a [`Reply`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorPayload {
	pub code: i64,
	pub message: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub data: Option<Value>,
}

/// Unsolicited notification from the engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
	pub method: String,
	#[serde(default)]
	pub params: Value,
	#[serde(rename = "sessionId", default, skip_serializing_if = "Option::is_none")]
	pub session_id: Option<String>,
}

/// Discriminated union of inbound messages.
///
/// Messages with an `id` are replies; everything else is an event.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Message {
	Reply(Reply),
	Event(Event),
}

/// Typed view over the events the session reacts to.
#[derive(Debug, Clone, PartialEq)]
pub enum InspectorEvent {
	ExecutionContextCreated(ExecutionContextCreated),
	ExecutionContextDestroyed(ExecutionContextDestroyed),
	ScriptParsed(ScriptParsed),
	Paused(Paused),
	Resumed,
	ConsoleApiCalled(ConsoleApiCalled),
	/// Any method the adapter does not interpret
	Other(String),
}

impl InspectorEvent {
	/// Decodes the params of `event` according to its method name.
	pub fn decode(event: &Event) -> Result<Self, serde_json::Error> {
		let params = &event.params;
		Ok(match event.method.as_str() {
			methods::EXECUTION_CONTEXT_CREATED => Self::ExecutionContextCreated(ExecutionContextCreated::deserialize(params)?),
			methods::EXECUTION_CONTEXT_DESTROYED => Self::ExecutionContextDestroyed(ExecutionContextDestroyed::deserialize(params)?),
			methods::SCRIPT_PARSED => Self::ScriptParsed(ScriptParsed::deserialize(params)?),
			methods::PAUSED => Self::Paused(Paused::deserialize(params)?),
			methods::RESUMED => Self::Resumed,
			methods::CONSOLE_API_CALLED => Self::ConsoleApiCalled(ConsoleApiCalled::deserialize(params)?),
			other => Self::Other(other.to_string()),
		})
	}
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionContextCreated {
	pub context: ExecutionContextDescription,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionContextDescription {
	pub id: i64,
	#[serde(default)]
	pub name: String,
	#[serde(default)]
	pub origin: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionContextDestroyed {
	pub execution_context_id: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScriptParsed {
	pub script_id: String,
	#[serde(default)]
	pub url: String,
	/// Either an inline `data:` URL or a reference to an external map
	#[serde(rename = "sourceMapURL", default, skip_serializing_if = "Option::is_none")]
	pub source_map_url: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub execution_context_id: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Paused {
	/// Raw frames, innermost first. See [`Paused::frames`].
	#[serde(default)]
	pub call_frames: Vec<Value>,
	#[serde(default)]
	pub reason: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub hit_breakpoints: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallFrame {
	#[serde(default)]
	pub call_frame_id: String,
	#[serde(default)]
	pub function_name: String,
	pub location: Location,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub url: Option<String>,
}

impl Paused {
	/// Decodes each call frame on its own, so one bad frame does not hide
	/// the rest of the stack.
	pub fn frames(&self) -> Vec<Result<CallFrame, serde_json::Error>> {
		self.call_frames.iter().map(CallFrame::deserialize).collect()
	}
}

/// Zero-based position inside a parsed script.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Location {
	#[serde(deserialize_with = "string_or_number")]
	pub script_id: String,
	pub line_number: u32,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub column_number: Option<u32>,
}

/// Script ids are strings on the wire, but some engines send numbers.
fn string_or_number<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
	#[derive(Deserialize)]
	#[serde(untagged)]
	enum Id {
		Text(String),
		Number(serde_json::Number),
	}

	Ok(match Id::deserialize(deserializer)? {
		Id::Text(text) => text,
		Id::Number(number) => number.to_string(),
	})
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsoleApiCalled {
	#[serde(rename = "type")]
	pub kind: String,
	#[serde(default)]
	pub args: Vec<RemoteObject>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub execution_context_id: Option<i64>,
}

/// Mirror object for a value living in the engine.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteObject {
	#[serde(rename = "type")]
	pub kind: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub subtype: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub value: Option<Value>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub unserializable_value: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub description: Option<String>,
}

impl RemoteObject {
	/// Best-effort text for console output.
	pub fn display(&self) -> String {
		match &self.value {
			Some(Value::String(text)) => return text.clone(),
			Some(other) => return other.to_string(),
			None => {}
		}
		if let Some(raw) = &self.unserializable_value {
			return raw.clone();
		}
		if let Some(description) = &self.description {
			return description.clone();
		}
		if self.subtype.as_deref() == Some("null") {
			return "null".to_string();
		}
		self.kind.clone()
	}
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnableDebugger {
	pub max_scripts_cache_size: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SetPauseOnExceptions {
	pub state: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetAsyncCallStackDepth {
	pub max_depth: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SetBlackboxPatterns {
	pub patterns: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetBreakpointByUrl {
	pub line_number: u32,
	pub url: String,
	pub column_number: u32,
	pub condition: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetBreakpointByUrlResult {
	pub breakpoint_id: String,
	#[serde(default)]
	pub locations: Vec<Location>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoveBreakpoint {
	pub breakpoint_id: String,
}

#[cfg(test)]
mod tests {
	use super::*;
	use serde_json::json;

	#[test]
	fn reply_is_discriminated_by_id() {
		let message: Message = serde_json::from_str(r#"{"id": 42, "result": {"breakpointId": "1:2:0:a.js"}}"#).unwrap();
		match message {
			Message::Reply(reply) => {
				assert_eq!(reply.id, 42);
				assert!(reply.result.is_some());
				assert!(reply.error.is_none());
			}
			Message::Event(_) => panic!("Expected Reply"),
		}
	}

	#[test]
	fn error_reply_carries_code_and_message() {
		let message: Message = serde_json::from_str(r#"{"id": 3, "error": {"code": -32000, "message": "Breakpoint at specified location already exists."}}"#).unwrap();
		let Message::Reply(reply) = message else {
			panic!("Expected Reply");
		};
		let error = reply.error.unwrap();
		assert_eq!(error.code, -32000);
		assert!(error.message.contains("already exists"));
	}

	#[test]
	fn event_without_params_defaults_to_null() {
		let message: Message = serde_json::from_str(r#"{"method": "Debugger.resumed"}"#).unwrap();
		let Message::Event(event) = message else {
			panic!("Expected Event");
		};
		assert_eq!(event.method, methods::RESUMED);
		assert!(event.params.is_null());
		assert_eq!(InspectorEvent::decode(&event).unwrap(), InspectorEvent::Resumed);
	}

	#[test]
	fn script_parsed_reads_source_map_url() {
		let event = Event {
			method: methods::SCRIPT_PARSED.to_string(),
			params: json!({
				"scriptId": "17",
				"url": "http://localhost:8081/index.bundle",
				"sourceMapURL": "data:application/json;base64,e30=",
				"startLine": 0
			}),
			session_id: None,
		};
		let InspectorEvent::ScriptParsed(parsed) = InspectorEvent::decode(&event).unwrap() else {
			panic!("Expected ScriptParsed");
		};
		assert_eq!(parsed.script_id, "17");
		assert_eq!(parsed.source_map_url.as_deref(), Some("data:application/json;base64,e30="));
	}

	#[test]
	fn paused_decodes_call_frames_in_order() {
		let event = Event {
			method: methods::PAUSED.to_string(),
			params: json!({
				"reason": "other",
				"callFrames": [
					{"callFrameId": "0", "functionName": "inner", "location": {"scriptId": "5", "lineNumber": 10, "columnNumber": 2}},
					{"callFrameId": "1", "functionName": "outer", "location": {"scriptId": "5", "lineNumber": 20}}
				]
			}),
			session_id: None,
		};
		let InspectorEvent::Paused(paused) = InspectorEvent::decode(&event).unwrap() else {
			panic!("Expected Paused");
		};
		assert_eq!(paused.reason, "other");
		let frames = paused.frames().into_iter().collect::<Result<Vec<_>, _>>().unwrap();
		assert_eq!(frames.len(), 2);
		assert_eq!(frames[0].function_name, "inner");
		assert_eq!(frames[1].location.column_number, None);
	}

	#[test]
	fn paused_frames_decode_independently() {
		let event = Event {
			method: methods::PAUSED.to_string(),
			params: json!({
				"reason": "debugCommand",
				"callFrames": [
					{"functionName": "inner", "location": {"scriptId": 9, "lineNumber": 3}},
					{"functionName": "broken", "location": {"scriptId": "9"}},
					{"functionName": "outer", "location": {"scriptId": "9", "lineNumber": 7, "columnNumber": 1}}
				]
			}),
			session_id: None,
		};
		let InspectorEvent::Paused(paused) = InspectorEvent::decode(&event).unwrap() else {
			panic!("Expected Paused");
		};
		let frames = paused.frames();
		assert_eq!(frames.len(), 3);
		assert_eq!(frames[0].as_ref().unwrap().location.script_id, "9");
		assert!(frames[1].is_err());
		assert_eq!(frames[2].as_ref().unwrap().function_name, "outer");
	}

	#[test]
	fn unknown_method_is_kept_by_name() {
		let event = Event {
			method: "Runtime.exceptionThrown".to_string(),
			params: json!({}),
			session_id: None,
		};
		assert_eq!(InspectorEvent::decode(&event).unwrap(), InspectorEvent::Other("Runtime.exceptionThrown".to_string()));
	}

	#[test]
	fn remote_object_display_prefers_value() {
		let text = RemoteObject {
			kind: "string".to_string(),
			value: Some(json!("hello")),
			..Default::default()
		};
		let number = RemoteObject {
			kind: "number".to_string(),
			value: Some(json!(4)),
			..Default::default()
		};
		let object = RemoteObject {
			kind: "object".to_string(),
			description: Some("Object".to_string()),
			..Default::default()
		};
		let null = RemoteObject {
			kind: "object".to_string(),
			subtype: Some("null".to_string()),
			..Default::default()
		};
		let undefined = RemoteObject {
			kind: "undefined".to_string(),
			..Default::default()
		};
		assert_eq!(text.display(), "hello");
		assert_eq!(number.display(), "4");
		assert_eq!(object.display(), "Object");
		assert_eq!(null.display(), "null");
		assert_eq!(undefined.display(), "undefined");
	}

	#[test]
	fn set_breakpoint_params_use_camel_case() {
		let params = serde_json::to_value(SetBreakpointByUrl {
			line_number: 3,
			url: "index.bundle".to_string(),
			column_number: 0,
			condition: String::new(),
		})
		.unwrap();
		assert_eq!(params, json!({"lineNumber": 3, "url": "index.bundle", "columnNumber": 0, "condition": ""}));
	}
}
