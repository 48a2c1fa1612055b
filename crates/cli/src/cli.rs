use std::time::Duration;

use clap::{Parser, ValueEnum};
use jsdap_runtime::session::InitializedSignal;

use crate::adapter::AdapterConfig;

#[derive(Parser, Debug)]
#[command(name = "jsdap")]
#[command(about = "Debug adapter bridging DAP editors to JavaScript engines over the inspector protocol")]
#[command(version)]
pub struct Cli {
	/// Increase verbosity (-v info, -vv debug, -vvv trace)
	#[arg(short, long, action = clap::ArgAction::Count)]
	pub verbose: u8,

	/// Serve DAP over TCP on this address instead of stdio
	#[arg(long, value_name = "ADDR")]
	pub listen: Option<String>,

	/// Exit after the first TCP client disconnects
	#[arg(long, requires = "listen")]
	pub oneshot: bool,

	/// Inspector WebSocket used when launch/attach carry no websocketAddress
	#[arg(long, env = "JSDAP_ENDPOINT", value_name = "URL")]
	pub endpoint: Option<String>,

	/// Time to wait for an engine reply (ms, 0 waits forever)
	#[arg(long, default_value_t = 30_000, value_name = "MS")]
	pub command_timeout_ms: u64,

	/// When to send the `initialized` event
	#[arg(long, value_enum, default_value_t = InitializedMode::EveryScript)]
	pub initialized: InitializedMode,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum InitializedMode {
	/// After every parsed script
	EveryScript,
	/// After the first parsed script
	Once,
}

impl From<InitializedMode> for InitializedSignal {
	fn from(mode: InitializedMode) -> Self {
		match mode {
			InitializedMode::EveryScript => InitializedSignal::EveryScript,
			InitializedMode::Once => InitializedSignal::Once,
		}
	}
}

impl Cli {
	pub fn adapter_config(&self) -> AdapterConfig {
		AdapterConfig {
			endpoint: self.endpoint.clone(),
			command_timeout: (self.command_timeout_ms > 0).then(|| Duration::from_millis(self.command_timeout_ms)),
			initialized: self.initialized.into(),
		}
	}
}
