use clap::Parser;
use jsdap::{cli::Cli, logging};
use tracing::error;

#[tokio::main]
async fn main() {
	let cli = Cli::parse();
	logging::init_logging(cli.verbose);

	if let Err(err) = jsdap::run(cli).await {
		error!(target = "jsdap", error = %err, "adapter failed");
		std::process::exit(1);
	}
}
