//! Logging setup shared by the CLI and the tests.
use std::sync::OnceLock;

use tracing::Level;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Install a tracing subscriber, once per process.
///
/// Routing decisions, recoveries and mode switches are logged at info level.
/// With `verbose`, per-file uploads and every LIB fetch failure are shown too,
/// for this crate and `local_crate_name` if given. Otherwise `RUST_LOG`
/// applies on top of info.
pub fn init_logger(verbose: bool, local_crate_name: Option<&str>) {
    static LOGGER_SETUP: OnceLock<()> = OnceLock::new();
    LOGGER_SETUP.get_or_init(|| {
        let env_filter = if verbose {
            match local_crate_name {
                None => format!("{}=debug,info", env!("CARGO_CRATE_NAME")),
                Some(name) => format!("{}=debug,{name}=debug,info", env!("CARGO_CRATE_NAME")),
            }
            .parse()
            .unwrap()
        } else {
            EnvFilter::from_default_env().add_directive(Level::INFO.into())
        };

        tracing_subscriber::registry()
            .with(
                fmt::Layer::default()
                    .log_internal_errors(true)
                    .and_then(env_filter),
            )
            .init();
        tracing::info!("Initialized Logging");
    });
}
