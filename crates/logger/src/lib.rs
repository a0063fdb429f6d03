//! Process-wide tracing subscriber setup.
//!
//! `RUST_LOG` selects what is shown (INFO when unset). `RUST_LOG_FORMAT=json`
//! switches to one JSON object per line for log shippers; anything else gives
//! the compact human format.

use std::env::var;

use tracing::level_filters::LevelFilter;
use tracing_subscriber::{Layer, filter::EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Output format of the subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Compact,
    Json,
}

impl LogFormat {
    /// Read the format from `RUST_LOG_FORMAT`.
    pub fn from_env() -> Self {
        Self::parse(&var("RUST_LOG_FORMAT").unwrap_or_default())
    }

    fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "json" => LogFormat::Json,
            _ => LogFormat::Compact,
        }
    }
}

pub fn init() {
    init_with_level(LevelFilter::INFO);
}

/// Install the global subscriber with `level` as the default directive.
///
/// Only the first call in a process has an effect.
pub fn init_with_level(level: LevelFilter) {
    let _ = try_init(level, LogFormat::from_env());
}

pub fn try_init(
    level: LevelFilter,
    format: LogFormat,
) -> Result<(), tracing_subscriber::util::TryInitError> {
    let env_filter = EnvFilter::builder().with_default_directive(level.into()).from_env_lossy();

    let log_layer = match format {
        LogFormat::Json => tracing_subscriber::fmt::layer().json().with_filter(env_filter).boxed(),
        LogFormat::Compact => tracing_subscriber::fmt::layer()
            .compact()
            .without_time()
            .with_filter(env_filter)
            .boxed(),
    };

    tracing_subscriber::registry().with(log_layer).try_init()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_parsing() {
        assert_eq!(LogFormat::parse("json"), LogFormat::Json);
        assert_eq!(LogFormat::parse(" JSON "), LogFormat::Json);
        assert_eq!(LogFormat::parse(""), LogFormat::Compact);
        assert_eq!(LogFormat::parse("pretty"), LogFormat::Compact);
    }

    #[test]
    fn test_second_init_is_harmless() {
        init();
        init_with_level(LevelFilter::DEBUG);
        assert!(try_init(LevelFilter::INFO, LogFormat::Compact).is_err());
    }
}
