pub mod adapter;
pub mod cli;
pub mod error;
pub mod framing;
pub mod logging;
pub mod server;

use std::sync::Arc;

use jsdap_runtime::transport::WebSocketConnector;

use crate::cli::Cli;
use crate::server::DapServer;

/// Runs the adapter as configured on the command line.
pub async fn run(cli: Cli) -> anyhow::Result<()> {
	let server = DapServer::new(Arc::new(WebSocketConnector), cli.adapter_config());

	match cli.listen {
		Some(addr) => server.listen(&addr, cli.oneshot).await,
		None => {
			server.serve(tokio::io::stdin(), tokio::io::stdout()).await?;
			Ok(())
		}
	}
}
