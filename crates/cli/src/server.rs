//! DAP server loop over any byte stream (stdio or a TCP client).
//!
//! Requests are read in order. Lifecycle requests are answered inline so a
//! `launch` finishes before the next request is looked at; everything else
//! runs as its own task. A single writer task owns the output stream and
//! numbers every response and event.

use std::sync::Arc;

use anyhow::Context;
use jsdap_protocol::dap::{self, EventMessage, Request, Response};
use jsdap_runtime::transport::Connector;
use tokio::io::{AsyncRead, AsyncWrite, BufReader};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tracing::{debug, error, info, trace, warn};

use crate::adapter::{Adapter, AdapterConfig};
use crate::error::Result;
use crate::framing::{FrameReader, write_frame};

#[derive(Clone)]
pub struct DapServer {
	connector: Arc<dyn Connector>,
	config: AdapterConfig,
}

impl DapServer {
	pub fn new(connector: Arc<dyn Connector>, config: AdapterConfig) -> Self {
		Self { connector, config }
	}

	/// Serves one editor until it closes its end of the stream.
	pub async fn serve<R, W>(&self, reader: R, writer: W) -> Result<()>
	where
		R: AsyncRead + Unpin,
		W: AsyncWrite + Unpin + Send + 'static,
	{
		let (events_tx, events_rx) = mpsc::unbounded_channel();
		let (responses_tx, responses_rx) = mpsc::unbounded_channel();
		let adapter = Arc::new(Adapter::new(Arc::clone(&self.connector), self.config.clone(), events_tx));

		let writer_task = tokio::spawn(write_loop(writer, responses_rx, events_rx));

		let mut frames = FrameReader::new(BufReader::new(reader));
		let outcome = loop {
			let body = match frames.read_frame().await {
				Ok(Some(body)) => body,
				Ok(None) => break Ok(()),
				Err(e) => break Err(e),
			};

			let request: Request = match serde_json::from_slice(&body) {
				Ok(request) => request,
				Err(e) => {
					warn!(target = "jsdap.server", error = %e, "ignoring undecodable message");
					continue;
				}
			};
			if request.kind != "request" {
				debug!(target = "jsdap.server", kind = %request.kind, "ignoring non-request message");
				continue;
			}

			trace!(target = "jsdap.server", seq = request.seq, command = %request.command, "request");
			if Adapter::is_lifecycle(&request.command) {
				let response = adapter.handle(&request).await;
				let _ = responses_tx.send(response);
			} else {
				let adapter = Arc::clone(&adapter);
				let responses_tx = responses_tx.clone();
				tokio::spawn(async move {
					let response = adapter.handle(&request).await;
					let _ = responses_tx.send(response);
				});
			}
		};

		debug!(target = "jsdap.server", "editor stream ended");
		adapter.disconnect();
		drop(responses_tx);

		match writer_task.await {
			Ok(Ok(())) => {}
			Ok(Err(e)) => warn!(target = "jsdap.server", error = %e, "writer stopped"),
			Err(e) => error!(target = "jsdap.server", error = %e, "writer task failed"),
		}
		outcome
	}

	/// Accepts editors on `addr`, one adapter each.
	pub async fn listen(&self, addr: &str, oneshot: bool) -> anyhow::Result<()> {
		let listener = TcpListener::bind(addr).await.with_context(|| format!("failed to bind {addr}"))?;
		info!(target = "jsdap.server", addr = %listener.local_addr()?, "waiting for DAP clients");

		loop {
			let (stream, peer) = listener.accept().await.context("accept failed")?;
			info!(target = "jsdap.server", peer = %peer, "client connected");
			let (read, write) = stream.into_split();

			if oneshot {
				self.serve(read, write).await?;
				return Ok(());
			}

			let server = self.clone();
			tokio::spawn(async move {
				if let Err(e) = server.serve(read, write).await {
					warn!(target = "jsdap.server", peer = %peer, error = %e, "client session ended with error");
				}
			});
		}
	}
}

/// Writes responses and events in the order they become ready. When both
/// are ready the response goes first.
///
/// Ends once every response sender is gone; events still queued at that
/// point have nobody to read them.
async fn write_loop<W>(mut writer: W, mut responses: mpsc::UnboundedReceiver<Response>, mut events: mpsc::UnboundedReceiver<dap::Event>) -> Result<()>
where
	W: AsyncWrite + Unpin,
{
	let mut seq = 0i64;
	let mut events_open = true;

	loop {
		let payload = tokio::select! {
			biased;

			response = responses.recv() => {
				let Some(mut response) = response else { break };
				seq += 1;
				response.seq = seq;
				serde_json::to_vec(&response)?
			}
			event = events.recv(), if events_open => {
				let Some(event) = event else {
					events_open = false;
					continue;
				};
				seq += 1;
				serde_json::to_vec(&EventMessage::new(seq, event))?
			}
		};
		write_frame(&mut writer, &payload).await?;
	}

	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;
	use serde_json::{Value, json};

	async fn written_frames(buf: &[u8]) -> Vec<Value> {
		let mut reader = FrameReader::new(buf);
		let mut frames = Vec::new();
		while let Some(frame) = reader.read_frame().await.unwrap() {
			frames.push(serde_json::from_slice(&frame).unwrap());
		}
		frames
	}

	#[tokio::test]
	async fn ready_response_is_written_before_ready_event() {
		let (responses_tx, responses_rx) = mpsc::unbounded_channel();
		let (events_tx, events_rx) = mpsc::unbounded_channel();

		let request = Request {
			seq: 4,
			kind: "request".to_string(),
			command: "continue".to_string(),
			arguments: json!({"threadId": 1}),
		};
		events_tx
			.send(dap::Event::Continued(dap::ContinuedEventBody {
				thread_id: 1,
				all_threads_continued: Some(true),
			}))
			.unwrap();
		responses_tx.send(Response::success(&request, None)).unwrap();
		drop(responses_tx);

		let mut out = Vec::new();
		write_loop(&mut out, responses_rx, events_rx).await.unwrap();

		let frames = written_frames(&out).await;
		assert_eq!(frames[0]["type"], "response");
		assert_eq!(frames[0]["command"], "continue");
		assert_eq!(frames[0]["seq"], 1);
		// The writer stops with the last response; the queued event is dropped
		assert_eq!(frames.len(), 1);
		drop(events_tx);
	}

	#[tokio::test]
	async fn responses_and_events_share_one_sequence() {
		let (responses_tx, responses_rx) = mpsc::unbounded_channel();
		let (events_tx, events_rx) = mpsc::unbounded_channel();

		let request = Request {
			seq: 1,
			kind: "request".to_string(),
			command: "threads".to_string(),
			arguments: Value::Null,
		};
		let writer = tokio::spawn(async move {
			let mut out = Vec::new();
			write_loop(&mut out, responses_rx, events_rx).await.map(|_| out)
		});

		responses_tx.send(Response::success(&request, None)).unwrap();
		tokio::time::sleep(std::time::Duration::from_millis(20)).await;
		events_tx.send(dap::Event::Initialized).unwrap();
		tokio::time::sleep(std::time::Duration::from_millis(20)).await;
		drop(responses_tx);

		let out = writer.await.unwrap().unwrap();
		let frames = written_frames(&out).await;
		let seqs: Vec<i64> = frames.iter().map(|f| f["seq"].as_i64().unwrap()).collect();
		assert_eq!(seqs, vec![1, 2]);
		assert_eq!(frames[1]["event"], "initialized");
	}
}
