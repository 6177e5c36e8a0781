use tracing_subscriber::{fmt::SubscriberBuilder, EnvFilter};

/// Filter used when `RUST_LOG` is unset: our own events at info, sqlx quiet.
pub const DEFAULT_LOG_FILTER: &str = "info,sqlx=warn";

/// Route log events to stderr for the sync and id-assignment binaries.
///
/// Stdout is left to the run's status lines (`Starting data pull at`,
/// `FINAL ERR:`, `Data pulled at`) so automation can grep them without
/// log noise. `default_filter` is used when `RUST_LOG` is unset or invalid.
/// Fails if a global subscriber is already installed.
pub fn init_tracing(default_filter: &str) -> Result<(), anyhow::Error> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    SubscriberBuilder::default()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_line_number(true)
        .with_file(true)
        .try_init()
        .map_err(|e| anyhow::anyhow!("could not install log subscriber: {e}"))
}
