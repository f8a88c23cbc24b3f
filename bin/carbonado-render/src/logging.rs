//! Logging.

use tracing::Subscriber;
use tracing_subscriber::{
    layer::SubscriberExt as _, registry::LookupSpan, util::SubscriberInitExt as _, EnvFilter, Layer,
};

/// Logs a message to standard error and exits the process with a non-zero exit code.
pub fn fatal_and_exit(message: String) -> ! {
    eprintln!("FATAL: {}", message);
    std::process::exit(1);
}

/// Initializes the logging subsystem for `tracing`.
///
/// Logs are always written to standard error, as standard output may carry the encoded reply. When `json` is set, each
/// event is written as a single JSON object; otherwise, a compact human-readable format is used.
///
/// # Errors
///
/// If the logging subsystem was already initialized, an error will be returned.
pub fn initialize_logging(filter: EnvFilter, json: bool) -> anyhow::Result<()> {
    if json {
        tracing_subscriber::registry()
            .with(initialize_tracing_json().with_filter(filter))
            .try_init()?;
    } else {
        tracing_subscriber::registry()
            .with(initialize_tracing_pretty().with_filter(filter))
            .try_init()?;
    }

    Ok(())
}

fn initialize_tracing_json<S>() -> impl Layer<S>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    tracing_subscriber::fmt::Layer::new()
        .json()
        .flatten_event(true)
        .with_target(true)
        .with_file(true)
        .with_line_number(true)
        .with_writer(std::io::stderr)
}

fn initialize_tracing_pretty<S>() -> impl Layer<S>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    tracing_subscriber::fmt::Layer::new()
        .compact()
        .with_target(true)
        .with_writer(std::io::stderr)
}
