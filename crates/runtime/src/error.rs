//! Error types for the inspector connection and debug session.

use thiserror::Error;

/// Result alias used throughout `jsdap-runtime`.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
	/// Transport could not be opened or written to
	#[error("Transport error: {0}")]
	Transport(String),

	#[error("WebSocket error: {0}")]
	WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

	#[error("I/O error: {0}")]
	Io(#[from] std::io::Error),

	#[error("JSON error: {0}")]
	Json(#[from] serde_json::Error),

	/// The engine broke the request/reply contract (unknown or duplicate id)
	#[error("Protocol error: {0}")]
	ProtocolError(String),

	/// The engine rejected a command
	#[error("Inspector error {code}: {message}")]
	Inspector { code: i64, message: String },

	#[error("Timeout: {0}")]
	Timeout(String),

	/// The connection ended before a reply arrived
	#[error("Connection closed")]
	ConnectionClosed,

	/// Reply channel dropped without a value
	#[error("Reply channel closed")]
	ChannelClosed,

	/// No inspector session is active
	#[error("Not connected")]
	NotConnected,
}

impl Error {
	/// Failures of the link itself, as opposed to the engine refusing a
	/// command. These propagate to the request that triggered them.
	pub fn is_transport(&self) -> bool {
		matches!(
			self,
			Error::Transport(_) | Error::WebSocket(_) | Error::Io(_) | Error::ConnectionClosed | Error::ChannelClosed | Error::NotConnected
		)
	}

	pub fn is_timeout(&self) -> bool {
		matches!(self, Error::Timeout(_))
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn transport_classification() {
		assert!(Error::ConnectionClosed.is_transport());
		assert!(Error::Transport("refused".to_string()).is_transport());
		assert!(
			!Error::Inspector {
				code: -32000,
				message: "no script".to_string()
			}
			.is_transport()
		);
		assert!(!Error::Timeout("Debugger.resume".to_string()).is_transport());
	}

	#[test]
	fn inspector_error_display() {
		let err = Error::Inspector {
			code: -32601,
			message: "'Debugger.foo' wasn't found".to_string(),
		};
		assert_eq!(err.to_string(), "Inspector error -32601: 'Debugger.foo' wasn't found");
	}
}
