use thiserror::Error;

#[derive(Debug, Error)]
pub enum AdapterError {
	#[error(transparent)]
	Runtime(#[from] jsdap_runtime::Error),

	#[error("I/O error: {0}")]
	Io(#[from] std::io::Error),

	#[error("JSON error: {0}")]
	Json(#[from] serde_json::Error),

	/// The byte stream from the editor is not valid DAP framing
	#[error("Framing error: {0}")]
	Framing(String),

	/// The request cannot be served as given
	#[error("{0}")]
	InvalidRequest(String),
}

pub type Result<T> = std::result::Result<T, AdapterError>;
