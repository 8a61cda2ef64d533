//! Tracing subscriber setup.

use crate::config::{LogConfig, LogFormat};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Installs the global subscriber. `RUST_LOG` takes precedence over `config.level`.
pub fn init(config: &LogConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("{},tower_http=debug", config.level).into());

    let registry = tracing_subscriber::registry().with(filter);

    match config.format {
        LogFormat::Json => registry
            .with(
                fmt::layer()
                    .json()
                    .with_file(config.add_source)
                    .with_line_number(config.add_source),
            )
            .init(),
        LogFormat::Text => registry
            .with(
                fmt::layer()
                    .with_file(config.add_source)
                    .with_line_number(config.add_source),
            )
            .init(),
    }
}
