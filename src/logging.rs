use std::fs;
use tracing::Subscriber;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::{fmt, prelude::*, EnvFilter, Layer};

fn env_filter(debug: bool) -> EnvFilter {
    let level = if debug { "debug" } else { "info" };
    let filter = EnvFilter::from_default_env();
    match format!("kepco_capacity={level}").parse() {
        Ok(directive) => filter.add_directive(directive),
        Err(_) => filter,
    }
}

/// Console goes to stderr so `--json` output on stdout stays machine-readable
fn console_layer<S>() -> impl Layer<S>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fmt::layer().with_writer(std::io::stderr).with_target(false)
}

/// Initializes logging with a human console layer and a daily-rotated JSON file in `logs/`.
///
/// The returned guard flushes the file writer when dropped; hold it for the lifetime of `main`.
/// A second call leaves the first subscriber in place.
pub fn init_logging(debug: bool) -> Option<WorkerGuard> {
    if fs::create_dir_all("logs").is_err() {
        let _ = tracing_subscriber::registry()
            .with(env_filter(debug))
            .with(console_layer())
            .try_init();
        return None;
    }

    let file_appender = tracing_appender::rolling::daily("logs", "kepco_capacity.log");
    let (non_blocking_writer, guard) = tracing_appender::non_blocking(file_appender);
    let file_layer = fmt::layer().json().with_writer(non_blocking_writer);

    let _ = tracing_subscriber::registry()
        .with(env_filter(debug))
        .with(file_layer)
        .with(console_layer())
        .try_init();

    Some(guard)
}
