use anyhow::{Result, anyhow};
use tracing::Subscriber;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::{EnvFilter, Layer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::LogFormat;

/// Installs the global tracing subscriber.
///
/// `RUST_LOG` wins when set; otherwise `level` is used, raised to `debug`
/// when `verbose` is on. Both formats write to stderr so stdout stays free
/// for command output.
pub fn init(level: &str, format: LogFormat, verbose: bool) -> Result<()> {
    let filter = build_filter(std::env::var("RUST_LOG").ok().as_deref(), level, verbose)?;
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer(format, std::io::stderr))
        .try_init()
        .map_err(|e| anyhow!("failed to install log subscriber: {e}"))
}

fn fmt_layer<S, W>(format: LogFormat, writer: W) -> Box<dyn Layer<S> + Send + Sync>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    match format {
        LogFormat::Json => tracing_subscriber::fmt::layer()
            .json()
            .with_current_span(true)
            .with_writer(writer)
            .boxed(),
        LogFormat::Pretty => tracing_subscriber::fmt::layer().with_writer(writer).boxed(),
    }
}

fn build_filter(env: Option<&str>, level: &str, verbose: bool) -> Result<EnvFilter> {
    let directives = directives(env, level, verbose);
    EnvFilter::try_new(&directives).map_err(|e| anyhow!("invalid log filter '{directives}': {e}"))
}

fn directives(env: Option<&str>, level: &str, verbose: bool) -> String {
    match env {
        Some(env) if !env.trim().is_empty() => env.to_string(),
        _ if verbose => "debug".to_string(),
        _ => level.to_string(),
    }
}
