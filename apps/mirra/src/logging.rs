use tracing_subscriber::{EnvFilter, Layer, layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::LoggingConfig;

/// Build the global tracing subscriber from config: a stdout layer always,
/// plus a non-blocking daily-rolling file layer under `logs/`. `RUST_LOG`
/// overrides `logging.level` when set, matching `EnvFilter`'s usual
/// precedence.
///
/// Returns the file appender's guard; the caller must keep it alive for the
/// process lifetime or buffered log lines are lost on exit.
pub fn init(config: &LoggingConfig) -> tracing_appender::non_blocking::WorkerGuard {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    let file_appender = tracing_appender::rolling::daily("logs", "mirra.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let stdout_layer = if config.format == "json" {
        tracing_subscriber::fmt::layer().json().boxed()
    } else {
        tracing_subscriber::fmt::layer().boxed()
    };
    let file_layer = tracing_subscriber::fmt::layer()
        .json()
        .with_writer(non_blocking)
        .with_ansi(false);

    tracing_subscriber::registry()
        .with(filter)
        .with(stdout_layer)
        .with(file_layer)
        .init();

    guard
}
