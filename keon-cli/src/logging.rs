use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// `RUST_LOG` if set, else `level`, else `info`
pub fn filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Logs go to stderr; stdout carries command output
pub fn init(level: &str) {
    tracing_subscriber::registry()
        .with(filter(level))
        .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
        .init();
}
