//! `Content-Length` framing used by the debug adapter protocol.
//!
//! ```text
//! Content-Length: 58\r\n
//! \r\n
//! {"seq":1,"type":"request","command":"threads","arguments":{}}
//! ```

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::{AdapterError, Result};

pub struct FrameReader<R> {
	reader: R,
}

impl<R: AsyncBufRead + Unpin> FrameReader<R> {
	pub fn new(reader: R) -> Self {
		Self { reader }
	}

	/// Reads the next frame body. `None` at a clean end of stream.
	///
	/// Headers other than `Content-Length` are ignored.
	pub async fn read_frame(&mut self) -> Result<Option<Vec<u8>>> {
		let mut content_length: Option<usize> = None;
		let mut in_header = false;

		loop {
			let mut line = String::new();
			if self.reader.read_line(&mut line).await? == 0 {
				if in_header {
					return Err(AdapterError::Framing("stream ended inside a header".to_string()));
				}
				return Ok(None);
			}

			let line = line.trim_end_matches(['\r', '\n']);
			if line.is_empty() {
				if in_header {
					break;
				}
				continue;
			}
			in_header = true;

			if let Some((name, value)) = line.split_once(':') {
				if name.trim().eq_ignore_ascii_case("Content-Length") {
					let length = value.trim().parse().map_err(|_| AdapterError::Framing(format!("bad Content-Length {:?}", value.trim())))?;
					content_length = Some(length);
				}
			}
		}

		let length = content_length.ok_or_else(|| AdapterError::Framing("missing Content-Length header".to_string()))?;
		let mut body = vec![0u8; length];
		self.reader.read_exact(&mut body).await?;
		Ok(Some(body))
	}
}

/// Writes one frame and flushes.
pub async fn write_frame<W: AsyncWrite + Unpin>(writer: &mut W, payload: &[u8]) -> Result<()> {
	writer.write_all(format!("Content-Length: {}\r\n\r\n", payload.len()).as_bytes()).await?;
	writer.write_all(payload).await?;
	writer.flush().await?;
	Ok(())
}
