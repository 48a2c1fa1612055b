use tracing_subscriber::{EnvFilter, fmt};

/// Installs the global subscriber. Output goes to stderr because stdout
/// carries the protocol in stdio mode.
///
/// `RUST_LOG` overrides the verbosity flag.
pub fn init_logging(verbosity: u8) {
	let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive(verbosity)));

	let _ = fmt().with_env_filter(filter).with_writer(std::io::stderr).try_init();
}

fn default_directive(verbosity: u8) -> &'static str {
	match verbosity {
		0 => "warn",
		1 => "info",
		2 => "debug",
		_ => "trace",
	}
}
