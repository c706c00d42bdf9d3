//! Diagnostics go to stderr so narration on stdout stays clean.

use tracing_subscriber::EnvFilter;

const LOG_ENV: &str = "BUGSLAYER_LOG";
const DEFAULT_FILTER: &str = "warn";

pub fn init(directive: Option<&str>) {
    let filter = match directive {
        Some(directive) => EnvFilter::new(directive),
        None => EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER)),
    };
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
