use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize the tracing subscriber for the command line tool.
///
/// Uses RUST_LOG for filtering when set, otherwise "info", or "debug" for
/// this crate when `verbose` is on. Logs go to stderr so stdout stays free
/// for results.
pub fn setup_logging(verbose: bool) {
    let default_filter = if verbose { "info,currency_detector=debug" } else { "info" };
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter.into());

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr).with_target(false))
        .init();
}
