use std::str::FromStr;

use tracing_subscriber::fmt::format::JsonFields;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{EnvFilter, Layer};

use crate::config::Cli;

/// Installs the global subscriber and routes `log` records into it.
pub fn init_tracing(cli: &Cli) -> anyhow::Result<()> {
    let filter = EnvFilter::from_str(cli.rust_log.as_deref().unwrap_or("info"))?;

    let layer = if cli.log_json {
        tracing_subscriber::fmt::layer()
            .fmt_fields(JsonFields::default())
            .event_format(
                tracing_subscriber::fmt::format()
                    .json()
                    .flatten_event(true)
                    .with_span_list(false),
            )
            .with_filter(filter)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer()
            .event_format(tracing_subscriber::fmt::format().pretty())
            .with_filter(filter)
            .boxed()
    };

    tracing::subscriber::set_global_default(tracing_subscriber::registry().with(layer))?;
    tracing_log::LogTracer::init()?;
    Ok(())
}
