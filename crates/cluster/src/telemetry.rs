use tracing_subscriber::EnvFilter;

/// Environment variable holding the log filter.
pub const LOG_ENV: &str = "PGAS_LOG";

/// Installs a stderr `fmt` subscriber.
///
/// The filter comes from `PGAS_LOG`, then `RUST_LOG`, then defaults to
/// `warn`. Does nothing when a global subscriber is already installed.
pub fn init_tracing() {
	let filter = std::env::var(LOG_ENV)
		.ok()
		.and_then(|directives| EnvFilter::try_new(directives).ok())
		.or_else(|| EnvFilter::try_from_default_env().ok())
		.unwrap_or_else(|| EnvFilter::new("warn"));

	let _ = tracing_subscriber::fmt().with_env_filter(filter).with_target(true).try_init();
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn second_install_is_a_no_op() {
		init_tracing();
		init_tracing();
		tracing::warn!("telemetry.test");
	}
}
