//! WebSocket transport against a loopback inspector endpoint.

use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use jsdap_runtime::connection::{Connection, ConnectionEvent, ConnectionOptions};
use jsdap_runtime::error::Error;
use jsdap_runtime::transport::{Connector, WebSocketConnector, WebSocketTransport};
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tokio_tungstenite::tungstenite::Message;

#[tokio::test]
async fn websocket_transport_round_trip() {
	let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
	let addr = listener.local_addr().unwrap();

	let server = tokio::spawn(async move {
		let (stream, _) = listener.accept().await.unwrap();
		let ws = tokio_tungstenite::accept_async(stream).await.unwrap();
		let (mut ws_tx, mut ws_rx) = ws.split();

		let incoming = ws_rx.next().await.unwrap().unwrap();
		assert_eq!(incoming, Message::Text("{\"id\":1,\"method\":\"Runtime.enable\",\"params\":{}}".into()));

		ws_tx.send(Message::Text("{\"id\":1,\"result\":{}}".into())).await.unwrap();
	});

	let url = format!("ws://{}", addr);
	let (transport, message_rx) = WebSocketTransport::connect(&url).await.unwrap();
	let parts = transport.into_transport_parts(message_rx);

	let mut sender = parts.sender;
	let receiver = parts.receiver;
	let mut rx = parts.message_rx;

	let recv_task = tokio::spawn(async move { receiver.run().await });

	sender.send(json!({"id": 1, "method": "Runtime.enable", "params": {}})).await.unwrap();

	let reply = rx.recv().await.expect("should receive reply");
	assert_eq!(reply["id"], 1);
	assert!(reply["result"].is_object());

	// Receiver may exit with ConnectionClosed after the server finishes
	recv_task.abort();
	let _ = recv_task.await;
	server.await.unwrap();
}

#[tokio::test]
async fn connection_over_websocket_skips_garbage_and_reports_close() {
	let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
	let addr = listener.local_addr().unwrap();

	let server = tokio::spawn(async move {
		let (stream, _) = listener.accept().await.unwrap();
		let ws = tokio_tungstenite::accept_async(stream).await.unwrap();
		let (mut ws_tx, mut ws_rx) = ws.split();

		let incoming = ws_rx.next().await.unwrap().unwrap();
		let command: Value = serde_json::from_str(incoming.to_text().unwrap()).unwrap();
		assert_eq!(command["method"], "Debugger.resume");

		ws_tx.send(Message::Text("not json".into())).await.unwrap();
		ws_tx.send(Message::Text("{\"method\":\"Debugger.resumed\",\"params\":{}}".into())).await.unwrap();
		let reply = json!({"id": command["id"], "result": {}}).to_string();
		ws_tx.send(Message::Binary(reply.into_bytes().into())).await.unwrap();
		ws_tx.send(Message::Close(None)).await.unwrap();
	});

	let parts = WebSocketConnector.connect(&format!("ws://{}", addr)).await.unwrap();
	let (connection, mut events) = Connection::new(parts, ConnectionOptions::default());
	let connection = Arc::new(connection);

	let conn = Arc::clone(&connection);
	tokio::spawn(async move { conn.run().await });

	let result = connection.call("Debugger.resume", json!({})).await.unwrap();
	assert!(result.is_object());

	match events.recv().await {
		Some(ConnectionEvent::Event(event)) => assert_eq!(event.method, "Debugger.resumed"),
		other => panic!("Expected event, got {other:?}"),
	}

	let closed = tokio::time::timeout(Duration::from_secs(5), events.recv()).await.expect("close should be reported");
	assert!(matches!(closed, Some(ConnectionEvent::Closed)));
	assert!(connection.is_closed());

	server.await.unwrap();
}

#[tokio::test]
async fn connect_failure_is_a_transport_error() {
	let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
	let addr = listener.local_addr().unwrap();
	drop(listener);

	let result = WebSocketTransport::connect(&format!("ws://{}", addr)).await;
	match result {
		Err(Error::Transport(message)) => assert!(message.contains("failed to connect")),
		Err(other) => panic!("Expected Transport error, got {other:?}"),
		Ok(_) => panic!("connect should fail"),
	}
}
